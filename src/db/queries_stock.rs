use crate::models::{Decimal, Material, MovementType, NewMaterial, StockMovement};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection};

/// 物料目录 (按名称排序)
pub async fn list_materials<'e, E>(executor: E) -> Result<Vec<Material>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Material>(
        r#"
        SELECT id, name, sku, category, unit, current_stock, minimum_stock, created_at
        FROM materials
        ORDER BY name, id
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn get_material<'e, E>(executor: E, material_id: i64) -> Result<Option<Material>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Material>(
        r#"
        SELECT id, name, sku, category, unit, current_stock, minimum_stock, created_at
        FROM materials
        WHERE id = ?
        "#,
    )
    .bind(material_id)
    .fetch_optional(executor)
    .await
}

/// 新建物料, 初始库存为 0
pub async fn insert_material<'e, E>(
    executor: E,
    material: &NewMaterial,
    created_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO materials (name, sku, category, unit, current_stock, minimum_stock, created_at)
        VALUES (?, ?, ?, ?, '0', ?, ?)
        RETURNING id
        "#,
    )
    .bind(material.name.trim())
    .bind(&material.sku)
    .bind(&material.category)
    .bind(&material.unit)
    .bind(material.minimum_stock.clone())
    .bind(created_at)
    .fetch_one(executor)
    .await
}

/// 待写入的库存流水
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub material_id: i64,
    pub project_id: Option<i64>,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub price_net: Option<Decimal>,
    pub invoice_id: Option<i64>,
    pub invoice_item_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_movement<'e, E>(executor: E, movement: &NewMovement) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO stock_movements (material_id, project_id, movement_type, quantity, price_net,
                                     invoice_id, invoice_item_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(movement.material_id)
    .bind(movement.project_id)
    .bind(movement.movement_type.as_str())
    .bind(&movement.quantity)
    .bind(&movement.price_net)
    .bind(movement.invoice_id)
    .bind(movement.invoice_item_id)
    .bind(movement.created_at)
    .fetch_one(executor)
    .await
}

/// 累加库存, 返回新的库存值 (`None` 表示物料不存在)
///
/// 读-改-写两条语句, 调用方必须已持有写事务。
pub async fn adjust_stock(
    conn: &mut SqliteConnection,
    material_id: i64,
    delta: &BigDecimal,
) -> Result<Option<Decimal>, sqlx::Error> {
    let current = sqlx::query_scalar::<_, Decimal>("SELECT current_stock FROM materials WHERE id = ?")
        .bind(material_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(current) = current else {
        return Ok(None);
    };

    let updated = Decimal(current.0 + delta);
    sqlx::query("UPDATE materials SET current_stock = ? WHERE id = ?")
        .bind(&updated)
        .bind(material_id)
        .execute(&mut *conn)
        .await?;
    Ok(Some(updated))
}

/// 某张发票产生的库存流水
pub async fn list_movements_for_invoice<'e, E>(
    executor: E,
    invoice_id: i64,
) -> Result<Vec<StockMovement>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StockMovement>(
        r#"
        SELECT id, material_id, project_id, movement_type, quantity, price_net,
               invoice_id, invoice_item_id, created_at
        FROM stock_movements
        WHERE invoice_id = ?
        ORDER BY id
        "#,
    )
    .bind(invoice_id)
    .fetch_all(executor)
    .await
}
