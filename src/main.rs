use invoice_intake::{api, create_pool, run_migrations, AppConfig, InvoiceWorkflow};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式, 级别可由 RUST_LOG 覆盖
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env()?;
    info!("Starting server with config: {:?}", config);

    // 创建数据库连接池并执行迁移
    let pool = create_pool(&config.database.url).await?;
    run_migrations(&pool).await?;
    info!("Database pool created, migrations applied");

    let workflow = Arc::new(InvoiceWorkflow::new(pool, config.ingest.clone()));
    let app = api::build_router(workflow);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/invoices/upload              - upload + parse + suggest");
    info!("  GET  /api/invoices/pending             - invoices awaiting confirmation");
    info!("  POST /api/invoices/:id/validate-items  - map items to materials");
    info!("  POST /api/invoices/:id/confirm         - apply stock movements");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
