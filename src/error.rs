use std::time::Duration;

use crate::models::{InvalidTransition, InvoiceStatus};

/// 文档解析错误
///
/// 抬头或明细字段缺失不算错误, 只有完全读不出内容才报 `UnreadableDocument`
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported invoice format: {0}")]
    UnsupportedFormat(String),

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("no invoice content could be extracted: {0}")]
    UnreadableDocument(String),

    #[error("parsing did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invoice {0} not found")]
    InvoiceNotFound(i64),

    #[error("item {item_id} does not belong to invoice {invoice_id}")]
    ItemNotFound { invoice_id: i64, item_id: i64 },

    #[error("material {0} not found")]
    MaterialNotFound(i64),

    #[error("invalid decision for item {item_id}: {reason}")]
    InvalidDecision { item_id: i64, reason: String },

    #[error("invoice {invoice_id}: cannot {action} while {status}{}", unresolved_suffix(.unresolved))]
    InvalidState {
        invoice_id: i64,
        status: InvoiceStatus,
        action: &'static str,
        unresolved: usize,
    },

    /// 确认入库失败, 整个事务已回滚
    #[error("stock application failed and was rolled back: {0}")]
    Persistence(String),

    #[error("csv export failed: {0}")]
    Export(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn unresolved_suffix(unresolved: &usize) -> String {
    if *unresolved == 0 {
        String::new()
    } else {
        format!(" ({unresolved} items unmapped)")
    }
}

impl WorkflowError {
    pub fn invalid_state(invoice_id: i64, err: InvalidTransition, unresolved: usize) -> Self {
        Self::InvalidState {
            invoice_id,
            status: err.from,
            action: err.action,
            unresolved,
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
