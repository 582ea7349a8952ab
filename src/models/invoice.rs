use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use super::decimal::Decimal;
use super::material::NewMaterial;

/// 发票生命周期状态
///
/// PENDING → PARSED → VALIDATED → CONFIRMED, CONFIRMED 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Parsed,
    Validated,
    Confirmed,
}

/// 非法状态迁移
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} an invoice in status {from}")]
pub struct InvalidTransition {
    pub from: InvoiceStatus,
    pub action: &'static str,
}

/// 数据库中出现未知状态值
#[derive(Debug, thiserror::Error)]
#[error("unknown invoice status '{0}'")]
pub struct UnknownStatus(pub String);

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Parsed => "PARSED",
            Self::Validated => "VALIDATED",
            Self::Confirmed => "CONFIRMED",
        }
    }

    /// 解析结果落库: PENDING → PARSED
    pub fn after_parse(self) -> Result<Self, InvalidTransition> {
        match self {
            Self::Pending => Ok(Self::Parsed),
            from => Err(InvalidTransition { from, action: "store parse results for" }),
        }
    }

    /// 应用校验决策后: 全部映射则进入 VALIDATED, 否则保持原状态
    pub fn after_validation(self, unresolved: usize) -> Result<Self, InvalidTransition> {
        match self {
            Self::Parsed | Self::Validated if unresolved == 0 => Ok(Self::Validated),
            Self::Parsed | Self::Validated => Ok(self),
            from => Err(InvalidTransition { from, action: "validate" }),
        }
    }

    /// 确认入库: 要求所有明细已映射
    pub fn after_confirm(self, unresolved: usize) -> Result<Self, InvalidTransition> {
        match self {
            Self::Parsed | Self::Validated if unresolved == 0 => Ok(Self::Confirmed),
            Self::Parsed | Self::Validated => Err(InvalidTransition {
                from: self,
                action: "confirm (items still unmapped)",
            }),
            from => Err(InvalidTransition { from, action: "confirm" }),
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Confirmed
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "PENDING" => Ok(Self::Pending),
            "PARSED" => Ok(Self::Parsed),
            "VALIDATED" => Ok(Self::Validated),
            "CONFIRMED" => Ok(Self::Confirmed),
            _ => Err(UnknownStatus(value)),
        }
    }
}

/// 发票主表
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub filename: Option<String>,
    pub format: String,
    pub supplier: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Option<Decimal>,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// 发票明细
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub line_no: i64,
    pub description: Option<String>,
    pub sku_raw: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub unit_price: Option<Decimal>,
    pub total_price: Option<Decimal>,
    pub material_id: Option<i64>,
    #[serde(skip)]
    pub created_material_id: Option<i64>,
    pub suggested_material_id: Option<i64>,
    pub match_confidence: Option<f64>,
}

/// 明细 + 物料名称 (详情页)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InvoiceItemView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub item: InvoiceItem,
    pub material_name: Option<String>,
    pub suggested_material_name: Option<String>,
}

/// 待处理发票列表行
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InvoiceSummary {
    pub id: i64,
    pub filename: Option<String>,
    pub supplier: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Option<Decimal>,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub item_count: i64,
    pub mapped_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItemView>,
}

/// 上传结果
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

/// 单条校验决策: 复用已有物料或新建物料
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDecision {
    pub item_id: i64,
    #[serde(flatten)]
    pub action: DecisionAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DecisionAction {
    Existing { material_id: i64 },
    CreateNew { new_material: NewMaterial },
}

/// 校验结果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationOutcome {
    pub invoice_id: i64,
    pub created_materials: usize,
    pub updated_items: usize,
    pub unresolved_items: usize,
    pub status: InvoiceStatus,
}

/// 确认结果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfirmOutcome {
    pub invoice_id: i64,
    pub items_processed: usize,
    pub movements_created: usize,
}
