pub mod handlers;

pub use handlers::*;

use crate::service::InvoiceWorkflow;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

/// multipart 包装开销之外的余量, 超限由解析器报 PayloadTooLarge
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// 组装路由
pub fn build_router(workflow: Arc<InvoiceWorkflow>) -> Router {
    let body_limit = workflow.ingest_config().max_upload_bytes + BODY_LIMIT_SLACK;

    let invoice_routes = Router::new()
        .route("/api/invoices/upload", post(upload_invoice))
        .route("/api/invoices/pending", get(list_pending))
        .route("/api/invoices/:id", get(get_invoice))
        .route("/api/invoices/:id/validate-items", post(validate_items))
        .route("/api/invoices/:id/items/:item_id", put(map_item))
        .route("/api/invoices/:id/confirm", post(confirm_invoice))
        .route("/api/invoices/:id/items.csv", get(export_items_csv))
        .route("/api/materials", get(list_materials))
        .with_state(workflow);

    Router::new()
        .route("/health", get(health_check))
        .merge(invoice_routes)
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(body_limit)))
}
