use super::decimal::Decimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 物料目录
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Material {
    pub id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub unit: String,
    pub current_stock: Decimal,
    pub minimum_stock: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Material {
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.minimum_stock
    }
}

/// 校验时新建物料的字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterial {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "Decimal::zero")]
    pub minimum_stock: Decimal,
}

fn default_category() -> String {
    "General".to_string()
}

fn default_unit() -> String {
    "buc".to_string()
}

impl NewMaterial {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sku: None,
            category: default_category(),
            unit: default_unit(),
            minimum_stock: Decimal::zero(),
        }
    }
}
