use crate::error::{ParseError, WorkflowError};
use crate::models::{InvoiceSummary, ItemDecision, Material};
use crate::service::InvoiceWorkflow;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 通用响应体: success + message + 业务数据 (平铺)
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: T,
}

/// 错误响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PendingInvoices {
    pub invoices: Vec<InvoiceSummary>,
}

#[derive(Debug, Serialize)]
pub struct MaterialCatalog {
    pub materials: Vec<Material>,
}

/// `PUT /api/invoices/:id/items/:item_id?material_id=N`
#[derive(Debug, Deserialize)]
pub struct MapItemQuery {
    pub material_id: i64,
}

fn ok<T: Serialize>(status: StatusCode, message: String, data: T) -> Response {
    let body = ApiResponse {
        success: true,
        message,
        data,
    };
    (status, Json(body)).into_response()
}

fn failure(status: StatusCode, message: String) -> Response {
    (status, Json(MessageResponse { success: false, message })).into_response()
}

impl WorkflowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Parse(ParseError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            Self::Parse(ParseError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Parse(ParseError::UnreadableDocument(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Parse(ParseError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::InvoiceNotFound(_) | Self::ItemNotFound { .. } | Self::MaterialNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidDecision { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::Persistence(_) | Self::Export(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::info!(error = %self, status = status.as_u16(), "Request rejected");
        }
        failure(status, self.to_string())
    }
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 上传发票 (multipart 字段 `file`)
pub async fn upload_invoice(
    State(workflow): State<Arc<InvoiceWorkflow>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((filename, bytes.to_vec()));
                        break;
                    }
                    Err(e) => return failure(e.status(), format!("Error: {}", e.body_text())),
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return failure(e.status(), format!("Error: {}", e.body_text())),
        }
    }

    let Some((filename, bytes)) = upload else {
        return failure(StatusCode::BAD_REQUEST, "Error: multipart field 'file' is missing".to_string());
    };

    match workflow.ingest(filename.as_deref(), bytes).await {
        Ok(outcome) => {
            let message = format!(
                "Parsed invoice {} with {} items",
                outcome.invoice.id,
                outcome.items.len()
            );
            ok(StatusCode::CREATED, message, outcome)
        }
        Err(e) => e.into_response(),
    }
}

/// 未确认发票列表
pub async fn list_pending(State(workflow): State<Arc<InvoiceWorkflow>>) -> Response {
    match workflow.list_pending().await {
        Ok(invoices) => {
            let message = format!("{} pending invoices", invoices.len());
            ok(StatusCode::OK, message, PendingInvoices { invoices })
        }
        Err(e) => e.into_response(),
    }
}

/// 发票详情
pub async fn get_invoice(
    State(workflow): State<Arc<InvoiceWorkflow>>,
    Path(invoice_id): Path<i64>,
) -> Response {
    match workflow.get_detail(invoice_id).await {
        Ok(detail) => ok(StatusCode::OK, format!("Invoice {invoice_id}"), detail),
        Err(e) => e.into_response(),
    }
}

/// 提交校验决策
pub async fn validate_items(
    State(workflow): State<Arc<InvoiceWorkflow>>,
    Path(invoice_id): Path<i64>,
    payload: Result<Json<Vec<ItemDecision>>, JsonRejection>,
) -> Response {
    let decisions = match payload {
        Ok(Json(decisions)) => decisions,
        Err(rejection) => return failure(rejection.status(), format!("Error: {}", rejection.body_text())),
    };

    match workflow.validate(invoice_id, decisions).await {
        Ok(outcome) => {
            let message = if outcome.unresolved_items == 0 {
                format!("Invoice {invoice_id} validated")
            } else {
                format!(
                    "Invoice {invoice_id}: {} items still unmapped",
                    outcome.unresolved_items
                )
            };
            ok(StatusCode::OK, message, outcome)
        }
        Err(e) => e.into_response(),
    }
}

/// 单条明细映射
pub async fn map_item(
    State(workflow): State<Arc<InvoiceWorkflow>>,
    Path((invoice_id, item_id)): Path<(i64, i64)>,
    query: Result<Query<MapItemQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return failure(rejection.status(), format!("Error: {}", rejection.body_text())),
    };

    match workflow.map_item(invoice_id, item_id, query.material_id).await {
        Ok(outcome) => ok(
            StatusCode::OK,
            format!("Item {item_id} mapped to material {}", query.material_id),
            outcome,
        ),
        Err(e) => e.into_response(),
    }
}

/// 确认入库
pub async fn confirm_invoice(
    State(workflow): State<Arc<InvoiceWorkflow>>,
    Path(invoice_id): Path<i64>,
) -> Response {
    match workflow.confirm(invoice_id).await {
        Ok(outcome) => {
            let message = format!(
                "Invoice {invoice_id} confirmed, {} stock movements created",
                outcome.movements_created
            );
            ok(StatusCode::OK, message, outcome)
        }
        Err(e) => e.into_response(),
    }
}

/// 明细 CSV 导出
pub async fn export_items_csv(
    State(workflow): State<Arc<InvoiceWorkflow>>,
    Path(invoice_id): Path<i64>,
) -> Response {
    match workflow.export_items_csv(invoice_id).await {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// 物料目录
pub async fn list_materials(State(workflow): State<Arc<InvoiceWorkflow>>) -> Response {
    match workflow.list_materials().await {
        Ok(materials) => {
            let message = format!("{} materials", materials.len());
            ok(StatusCode::OK, message, MaterialCatalog { materials })
        }
        Err(e) => e.into_response(),
    }
}
