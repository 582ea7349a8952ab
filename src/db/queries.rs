use crate::models::{
    Decimal, Invoice, InvoiceItem, InvoiceItemView, InvoiceStatus, InvoiceSummary, MatchSuggestion,
    ParsedHeader, ParsedItem,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};

/// 新建发票主表记录, 返回ID
pub async fn insert_invoice<'e, E>(
    executor: E,
    filename: Option<&str>,
    format: &str,
    header: &ParsedHeader,
    status: InvoiceStatus,
    created_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO invoices (filename, format, supplier, invoice_number, invoice_date,
                              total_amount, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(filename)
    .bind(format)
    .bind(&header.supplier)
    .bind(&header.invoice_number)
    .bind(&header.invoice_date)
    .bind(to_decimal(&header.total_amount))
    .bind(status.as_str())
    .bind(created_at)
    .bind(created_at)
    .fetch_one(executor)
    .await
}

/// 插入一条解析出的明细, 附带匹配建议
pub async fn insert_item<'e, E>(
    executor: E,
    invoice_id: i64,
    line_no: i64,
    item: &ParsedItem,
    suggestion: Option<MatchSuggestion>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO invoice_items (invoice_id, line_no, description, sku_raw, quantity, unit,
                                   unit_price, total_price, suggested_material_id, match_confidence)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(invoice_id)
    .bind(line_no)
    .bind(&item.description)
    .bind(&item.sku_raw)
    .bind(to_decimal(&item.quantity))
    .bind(&item.unit)
    .bind(to_decimal(&item.unit_price))
    .bind(to_decimal(&item.total_price))
    .bind(suggestion.map(|s| s.material_id))
    .bind(suggestion.map(|s| s.confidence))
    .fetch_one(executor)
    .await
}

fn to_decimal(value: &Option<BigDecimal>) -> Option<Decimal> {
    value.clone().map(Decimal::from)
}

/// 查询发票主表
pub async fn get_invoice<'e, E>(executor: E, invoice_id: i64) -> Result<Option<Invoice>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Invoice>(
        r#"
        SELECT id, filename, format, supplier, invoice_number, invoice_date, total_amount,
               status, created_at, updated_at, confirmed_at
        FROM invoices
        WHERE id = ?
        "#,
    )
    .bind(invoice_id)
    .fetch_optional(executor)
    .await
}

/// 更新发票状态 (仅当当前状态等于 `from`)
pub async fn update_status<'e, E>(
    executor: E,
    invoice_id: i64,
    from: InvoiceStatus,
    to: InvoiceStatus,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE invoices SET status = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(invoice_id)
        .bind(from.as_str())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// 开始修改明细映射: 刷新 updated_at, 仅 PARSED/VALIDATED 可修改
///
/// 须作为事务的第一条语句, 使事务从一开始就持有写锁。返回 0 表示发票不存在或不可修改。
pub async fn touch_editable<'e, E>(
    executor: E,
    invoice_id: i64,
    updated_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE invoices SET updated_at = ? WHERE id = ? AND status IN ('PARSED', 'VALIDATED')",
    )
    .bind(updated_at)
    .bind(invoice_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// 确认发票 (状态 CAS): PARSED/VALIDATED 且所有明细均已映射才置为 CONFIRMED
///
/// 须作为事务的第一条语句。返回 0 表示前置条件不满足或已被其他请求确认。
pub async fn mark_confirmed<'e, E>(
    executor: E,
    invoice_id: i64,
    confirmed_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE invoices
        SET status = 'CONFIRMED', confirmed_at = ?, updated_at = ?
        WHERE id = ?
          AND status IN ('PARSED', 'VALIDATED')
          AND NOT EXISTS (
              SELECT 1 FROM invoice_items
              WHERE invoice_id = invoices.id AND material_id IS NULL
          )
        "#,
    )
    .bind(confirmed_at)
    .bind(confirmed_at)
    .bind(invoice_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// 查询发票明细列表 (按行号)
pub async fn list_items<'e, E>(executor: E, invoice_id: i64) -> Result<Vec<InvoiceItem>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, InvoiceItem>(
        r#"
        SELECT id, invoice_id, line_no, description, sku_raw, quantity, unit, unit_price,
               total_price, material_id, created_material_id, suggested_material_id,
               match_confidence
        FROM invoice_items
        WHERE invoice_id = ?
        ORDER BY line_no, id
        "#,
    )
    .bind(invoice_id)
    .fetch_all(executor)
    .await
}

pub async fn get_item<'e, E>(
    executor: E,
    invoice_id: i64,
    item_id: i64,
) -> Result<Option<InvoiceItem>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, InvoiceItem>(
        r#"
        SELECT id, invoice_id, line_no, description, sku_raw, quantity, unit, unit_price,
               total_price, material_id, created_material_id, suggested_material_id,
               match_confidence
        FROM invoice_items
        WHERE invoice_id = ? AND id = ?
        "#,
    )
    .bind(invoice_id)
    .bind(item_id)
    .fetch_optional(executor)
    .await
}

/// 明细 + 已映射物料名 + 建议物料名
pub async fn list_item_views<'e, E>(
    executor: E,
    invoice_id: i64,
) -> Result<Vec<InvoiceItemView>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, InvoiceItemView>(
        r#"
        SELECT ii.id AS id,
               ii.invoice_id AS invoice_id,
               ii.line_no AS line_no,
               ii.description AS description,
               ii.sku_raw AS sku_raw,
               ii.quantity AS quantity,
               ii.unit AS unit,
               ii.unit_price AS unit_price,
               ii.total_price AS total_price,
               ii.material_id AS material_id,
               ii.created_material_id AS created_material_id,
               ii.suggested_material_id AS suggested_material_id,
               ii.match_confidence AS match_confidence,
               m.name AS material_name,
               s.name AS suggested_material_name
        FROM invoice_items ii
        LEFT JOIN materials m ON m.id = ii.material_id
        LEFT JOIN materials s ON s.id = ii.suggested_material_id
        WHERE ii.invoice_id = ?
        ORDER BY ii.line_no, ii.id
        "#,
    )
    .bind(invoice_id)
    .fetch_all(executor)
    .await
}

/// 未确认发票 + 明细数/已映射数
pub async fn list_pending<'e, E>(executor: E) -> Result<Vec<InvoiceSummary>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, InvoiceSummary>(
        r#"
        SELECT i.id AS id,
               i.filename AS filename,
               i.supplier AS supplier,
               i.invoice_number AS invoice_number,
               i.invoice_date AS invoice_date,
               i.total_amount AS total_amount,
               i.status AS status,
               i.created_at AS created_at,
               COUNT(ii.id) AS item_count,
               COUNT(ii.material_id) AS mapped_count
        FROM invoices i
        LEFT JOIN invoice_items ii ON ii.invoice_id = i.id
        WHERE i.status <> 'CONFIRMED'
        GROUP BY i.id
        ORDER BY i.created_at DESC, i.id DESC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 写入明细的物料映射, 同时清除匹配建议
pub async fn assign_material<'e, E>(
    executor: E,
    item_id: i64,
    material_id: i64,
    created_material_id: Option<i64>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE invoice_items
        SET material_id = ?,
            created_material_id = ?,
            suggested_material_id = NULL,
            match_confidence = NULL
        WHERE id = ?
        "#,
    )
    .bind(material_id)
    .bind(created_material_id)
    .bind(item_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// 统计未映射明细数
pub async fn count_unmapped<'e, E>(executor: E, invoice_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM invoice_items WHERE invoice_id = ? AND material_id IS NULL",
    )
    .bind(invoice_id)
    .fetch_one(executor)
    .await
}

fn option_to_csv<T: ToString>(val: &Option<T>) -> String {
    val.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// 导出发票明细为 CSV 文本
pub fn export_items_csv(items: &[InvoiceItem]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record([
        "line_no",
        "description",
        "sku_raw",
        "quantity",
        "unit",
        "unit_price",
        "total_price",
        "material_id",
    ])?;

    for item in items {
        writer.write_record(&[
            item.line_no.to_string(),
            option_to_csv(&item.description),
            option_to_csv(&item.sku_raw),
            option_to_csv(&item.quantity),
            option_to_csv(&item.unit),
            option_to_csv(&item.unit_price),
            option_to_csv(&item.total_price),
            option_to_csv(&item.material_id),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(line_no: i64, description: &str, quantity: Option<&str>) -> InvoiceItem {
        InvoiceItem {
            id: line_no,
            invoice_id: 1,
            line_no,
            description: Some(description.to_string()),
            sku_raw: None,
            quantity: quantity.map(|q| q.parse().unwrap()),
            unit: Some("buc".to_string()),
            unit_price: Some("12.50".parse().unwrap()),
            total_price: None,
            material_id: None,
            created_material_id: None,
            suggested_material_id: None,
            match_confidence: None,
        }
    }

    #[test]
    fn csv_export_quotes_and_blanks() {
        let items = vec![
            item(1, "Panou fotovoltaic 450W, mono", Some("10")),
            item(2, "Conector MC4", None),
        ];
        let csv = export_items_csv(&items).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("line_no,description"));
        assert_eq!(lines[1], "1,\"Panou fotovoltaic 450W, mono\",,10,buc,12.50,,");
        assert_eq!(lines[2], "2,Conector MC4,,,buc,12.50,,");
    }
}
