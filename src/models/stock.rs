use super::decimal::Decimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 库存流水方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown movement type '{0}'")]
pub struct UnknownMovementType(pub String);

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

impl TryFrom<String> for MovementType {
    type Error = UnknownMovementType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            _ => Err(UnknownMovementType(value)),
        }
    }
}

/// 库存流水 (只追加, 不修改)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub material_id: i64,
    pub project_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub price_net: Option<Decimal>,
    pub invoice_id: Option<i64>,
    pub invoice_item_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
