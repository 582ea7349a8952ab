#![allow(dead_code)]

use chrono::Utc;
use invoice_intake::config::IngestConfig;
use invoice_intake::db::queries_stock;
use invoice_intake::models::{Decimal, NewMaterial};
use invoice_intake::{create_pool, run_migrations, InvoiceWorkflow};
use sqlx::SqlitePool;

pub const INVOICE_TXT: &str = "\
Furnizor: Solar Distrib SRL
Factura nr. FV-1001
Data: 12.03.2024
Panou fotovoltaic 450W 10 buc 500,00 5.000,00
Cablu solar 6mm 3 buc 4,20 12,60
Total de plata: 5.012,60
";

pub async fn memory_pool() -> SqlitePool {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// 文件型库 (WAL, 多连接), 用于并发场景
pub async fn file_pool(dir: &tempfile::TempDir) -> SqlitePool {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("intake.db").display());
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

pub async fn workflow() -> InvoiceWorkflow {
    InvoiceWorkflow::new(memory_pool().await, IngestConfig::default())
}

/// 新建物料并设置初始库存
pub async fn seed_material(pool: &SqlitePool, name: &str, stock: &str) -> i64 {
    let id = queries_stock::insert_material(pool, &NewMaterial::named(name), Utc::now())
        .await
        .unwrap();
    let mut conn = pool.acquire().await.unwrap();
    queries_stock::adjust_stock(&mut *conn, id, &dec(stock).0).await.unwrap();
    id
}

pub async fn stock_of(pool: &SqlitePool, material_id: i64) -> Decimal {
    queries_stock::get_material(pool, material_id)
        .await
        .unwrap()
        .unwrap()
        .current_stock
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}
