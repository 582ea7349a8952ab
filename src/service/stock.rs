use crate::db::queries_stock::{self, NewMovement};
use crate::error::WorkflowError;
use crate::models::{Decimal, InvoiceItem, MovementType};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

/// 发票入库: 每条明细一条 IN 流水, 并累加对应物料库存
///
/// 必须在调用方已持有写锁的事务中执行; 任一步失败返回 `Persistence`, 由调用方回滚。
pub async fn apply_invoice_movements(
    conn: &mut SqliteConnection,
    invoice_id: i64,
    items: &[InvoiceItem],
    applied_at: DateTime<Utc>,
) -> Result<usize, WorkflowError> {
    let mut created = 0;

    for item in items {
        let Some(material_id) = item.material_id else {
            return Err(WorkflowError::Persistence(format!(
                "item {} has no material assigned",
                item.id
            )));
        };

        let quantity = item.quantity.clone().unwrap_or_else(|| {
            tracing::warn!(invoice_id, item_id = item.id, "Item has no quantity, booking 0");
            Decimal::zero()
        });

        let movement = NewMovement {
            material_id,
            project_id: None,
            movement_type: MovementType::In,
            quantity: quantity.clone(),
            price_net: item.unit_price.clone(),
            invoice_id: Some(invoice_id),
            invoice_item_id: Some(item.id),
            created_at: applied_at,
        };

        queries_stock::insert_movement(&mut *conn, &movement)
            .await
            .map_err(|e| persistence(item.id, "insert stock movement", e))?;

        let stock = queries_stock::adjust_stock(&mut *conn, material_id, &quantity.0)
            .await
            .map_err(|e| persistence(item.id, "increment stock", e))?
            .ok_or_else(|| {
                WorkflowError::Persistence(format!(
                    "material {material_id} for item {} disappeared",
                    item.id
                ))
            })?;

        created += 1;
        tracing::debug!(
            invoice_id,
            item_id = item.id,
            material_id,
            quantity = %quantity,
            stock = %stock,
            "Stock movement applied"
        );
    }

    Ok(created)
}

fn persistence(item_id: i64, step: &str, err: sqlx::Error) -> WorkflowError {
    WorkflowError::Persistence(format!("item {item_id}: failed to {step}: {err}"))
}
