use crate::config::IngestConfig;
use crate::db::{queries, queries_stock};
use crate::error::{ParseError, WorkflowError, WorkflowResult};
use crate::models::{
    ConfirmOutcome, DecisionAction, IngestOutcome, Invoice, InvoiceDetail, InvoiceStatus,
    InvoiceSummary, ItemDecision, Material, ValidationOutcome,
};
use crate::parser;
use crate::service::matcher::MaterialMatcher;
use crate::service::stock;
use chrono::Utc;
use dashmap::DashMap;
use indexmap::IndexMap;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 发票生命周期: 上传解析 → 校验映射 → 确认入库
///
/// 同一张发票的 validate / map_item / confirm 串行执行 (按发票ID加锁),
/// 确认时数据库层面还有一次状态 CAS 兜底。
/// 修改型事务的第一条语句都是写语句, 事务一开始就拿到 SQLite 写锁,
/// 不同发票的事务由 busy_timeout 排队, 不会出现读锁升级死锁。
pub struct InvoiceWorkflow {
    pool: SqlitePool,
    locks: DashMap<i64, Arc<Mutex<()>>>,
    ingest: IngestConfig,
}

impl InvoiceWorkflow {
    pub fn new(pool: SqlitePool, ingest: IngestConfig) -> Self {
        Self {
            pool,
            locks: DashMap::new(),
            ingest,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ingest_config(&self) -> &IngestConfig {
        &self.ingest
    }

    async fn lock_invoice(&self, invoice_id: i64) -> InvoiceLock<'_> {
        // 先克隆出 Arc, 不能持有 DashMap 的分片锁跨 await
        let lock = Arc::clone(&self.locks.entry(invoice_id).or_default());
        InvoiceLock {
            locks: &self.locks,
            invoice_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn require_invoice(&self, invoice_id: i64) -> WorkflowResult<Invoice> {
        queries::get_invoice(&self.pool, invoice_id)
            .await?
            .ok_or(WorkflowError::InvoiceNotFound(invoice_id))
    }

    /// 上传发票: 解析 + 匹配建议, 成功后落库为 PARSED
    ///
    /// 解析失败时不写任何记录。
    pub async fn ingest(&self, filename: Option<&str>, bytes: Vec<u8>) -> WorkflowResult<IngestOutcome> {
        let size = bytes.len();
        let format = parser::detect_format(filename, &bytes)?;
        tracing::info!(filename, format = %format, size, "Ingesting invoice");

        let catalog = queries_stock::list_materials(&self.pool).await?;
        let max_bytes = self.ingest.max_upload_bytes;
        let threshold = self.ingest.match_threshold;
        let timeout = self.ingest.parse_timeout();

        let task = tokio::task::spawn_blocking(move || {
            let doc = parser::parse_document(&bytes, format, max_bytes)?;
            let suggestions = MaterialMatcher::new(&catalog, threshold).suggest_all(&doc.items);
            Ok::<_, ParseError>((doc, suggestions))
        });

        // 超时后后台任务的结果直接丢弃
        let (doc, suggestions) = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "Parser task failed");
                return Err(ParseError::UnreadableDocument(format!("parser task failed: {join_err}")).into());
            }
            Err(_) => {
                tracing::warn!(filename, ?timeout, "Parsing timed out");
                return Err(ParseError::Timeout(timeout).into());
            }
        };

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let invoice_id = queries::insert_invoice(
            &mut *tx,
            filename,
            format.as_str(),
            &doc.header,
            InvoiceStatus::Pending,
            now,
        )
        .await?;

        for (idx, (item, suggestion)) in doc.items.iter().zip(suggestions).enumerate() {
            queries::insert_item(&mut *tx, invoice_id, idx as i64 + 1, item, suggestion).await?;
        }

        let parsed = InvoiceStatus::Pending
            .after_parse()
            .map_err(|e| WorkflowError::invalid_state(invoice_id, e, 0))?;
        queries::update_status(&mut *tx, invoice_id, InvoiceStatus::Pending, parsed).await?;

        let invoice = queries::get_invoice(&mut *tx, invoice_id)
            .await?
            .ok_or(WorkflowError::InvoiceNotFound(invoice_id))?;
        let items = queries::list_items(&mut *tx, invoice_id).await?;
        tx.commit().await?;

        let suggested = items.iter().filter(|i| i.suggested_material_id.is_some()).count();
        tracing::info!(
            invoice_id,
            items = items.len(),
            suggested,
            status = %invoice.status,
            "Invoice parsed"
        );

        Ok(IngestOutcome { invoice, items })
    }

    /// 未确认的发票
    pub async fn list_pending(&self) -> WorkflowResult<Vec<InvoiceSummary>> {
        Ok(queries::list_pending(&self.pool).await?)
    }

    /// 发票详情 (含物料名称)
    pub async fn get_detail(&self, invoice_id: i64) -> WorkflowResult<InvoiceDetail> {
        let invoice = self.require_invoice(invoice_id).await?;
        let items = queries::list_item_views(&self.pool, invoice_id).await?;
        Ok(InvoiceDetail { invoice, items })
    }

    /// 应用校验决策
    ///
    /// 同一请求内重复的 item_id 以最后一条为准; 全部明细都有物料后才进入 VALIDATED。
    pub async fn validate(
        &self,
        invoice_id: i64,
        decisions: Vec<ItemDecision>,
    ) -> WorkflowResult<ValidationOutcome> {
        let _lock = self.lock_invoice(invoice_id).await;

        let mut collapsed: IndexMap<i64, DecisionAction> = IndexMap::with_capacity(decisions.len());
        for decision in decisions {
            collapsed.insert(decision.item_id, decision.action);
        }

        let now = Utc::now();
        let mut created_materials = 0;
        let mut updated_items = 0;
        let mut tx = self.pool.begin().await?;

        if queries::touch_editable(&mut *tx, invoice_id, now).await? == 0 {
            let invoice = queries::get_invoice(&mut *tx, invoice_id)
                .await?
                .ok_or(WorkflowError::InvoiceNotFound(invoice_id))?;
            return Err(match invoice.status.after_validation(0) {
                Err(e) => WorkflowError::invalid_state(invoice_id, e, 0),
                Ok(_) => WorkflowError::InvalidState {
                    invoice_id,
                    status: invoice.status,
                    action: "validate",
                    unresolved: 0,
                },
            });
        }
        let invoice = queries::get_invoice(&mut *tx, invoice_id)
            .await?
            .ok_or(WorkflowError::InvoiceNotFound(invoice_id))?;

        for (item_id, action) in collapsed {
            let item = queries::get_item(&mut *tx, invoice_id, item_id)
                .await?
                .ok_or(WorkflowError::ItemNotFound { invoice_id, item_id })?;

            let (material_id, created_material_id) = match action {
                DecisionAction::Existing { material_id } => {
                    if queries_stock::get_material(&mut *tx, material_id).await?.is_none() {
                        return Err(WorkflowError::MaterialNotFound(material_id));
                    }
                    // 改选已有物料时保留此前新建的物料ID, 之后再选新建时复用
                    (material_id, item.created_material_id)
                }
                DecisionAction::CreateNew { new_material } => {
                    let reusable = match item.created_material_id {
                        Some(id) => queries_stock::get_material(&mut *tx, id).await?.map(|m| m.id),
                        None => None,
                    };
                    match reusable {
                        Some(existing) => (existing, Some(existing)),
                        None => {
                            if new_material.name.trim().is_empty() {
                                return Err(WorkflowError::InvalidDecision {
                                    item_id,
                                    reason: "new material name is empty".to_string(),
                                });
                            }
                            let id = queries_stock::insert_material(&mut *tx, &new_material, now).await?;
                            tracing::info!(invoice_id, item_id, material_id = id, name = %new_material.name, "Material created");
                            created_materials += 1;
                            (id, Some(id))
                        }
                    }
                }
            };

            queries::assign_material(&mut *tx, item.id, material_id, created_material_id).await?;
            updated_items += 1;
        }

        let unresolved = queries::count_unmapped(&mut *tx, invoice_id).await?.max(0) as usize;
        let status = invoice
            .status
            .after_validation(unresolved)
            .map_err(|e| WorkflowError::invalid_state(invoice_id, e, unresolved))?;

        if status != invoice.status {
            let changed = queries::update_status(&mut *tx, invoice_id, invoice.status, status).await?;
            if changed == 0 {
                return Err(WorkflowError::InvalidState {
                    invoice_id,
                    status: invoice.status,
                    action: "validate",
                    unresolved,
                });
            }
        }
        tx.commit().await?;

        tracing::info!(
            invoice_id,
            created_materials,
            updated_items,
            unresolved,
            status = %status,
            "Invoice items validated"
        );

        Ok(ValidationOutcome {
            invoice_id,
            created_materials,
            updated_items,
            unresolved_items: unresolved,
            status,
        })
    }

    /// 单条明细映射到已有物料
    pub async fn map_item(
        &self,
        invoice_id: i64,
        item_id: i64,
        material_id: i64,
    ) -> WorkflowResult<ValidationOutcome> {
        let decision = ItemDecision {
            item_id,
            action: DecisionAction::Existing { material_id },
        };
        self.validate(invoice_id, vec![decision]).await
    }

    /// 确认入库
    ///
    /// 状态 CAS、流水写入、库存累加在同一事务内, 任一失败整体回滚。
    pub async fn confirm(&self, invoice_id: i64) -> WorkflowResult<ConfirmOutcome> {
        let _lock = self.lock_invoice(invoice_id).await;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // 状态 CAS 是事务的第一条语句
        if queries::mark_confirmed(&mut *tx, invoice_id, now).await? == 0 {
            let invoice = queries::get_invoice(&mut *tx, invoice_id)
                .await?
                .ok_or(WorkflowError::InvoiceNotFound(invoice_id))?;
            let unresolved = queries::count_unmapped(&mut *tx, invoice_id).await?.max(0) as usize;
            tracing::info!(invoice_id, status = %invoice.status, unresolved, "Confirm rejected");
            return Err(match invoice.status.after_confirm(unresolved) {
                Err(e) => WorkflowError::invalid_state(invoice_id, e, unresolved),
                Ok(_) => WorkflowError::InvalidState {
                    invoice_id,
                    status: invoice.status,
                    action: "confirm",
                    unresolved,
                },
            });
        }

        let items = queries::list_items(&mut *tx, invoice_id).await?;

        let movements_created = match stock::apply_invoice_movements(&mut tx, invoice_id, &items, now).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(invoice_id, error = %e, "Stock application failed, rolling back");
                tx.rollback().await?;
                return Err(e);
            }
        };

        tx.commit()
            .await
            .map_err(|e| WorkflowError::Persistence(format!("commit failed: {e}")))?;

        tracing::info!(
            invoice_id,
            items = items.len(),
            movements = movements_created,
            status = %InvoiceStatus::Confirmed,
            "Invoice confirmed"
        );

        Ok(ConfirmOutcome {
            invoice_id,
            items_processed: items.len(),
            movements_created,
        })
    }

    /// 明细导出为 CSV
    pub async fn export_items_csv(&self, invoice_id: i64) -> WorkflowResult<String> {
        self.require_invoice(invoice_id).await?;
        let items = queries::list_items(&self.pool, invoice_id).await?;
        Ok(queries::export_items_csv(&items)?)
    }

    /// 物料目录
    pub async fn list_materials(&self) -> WorkflowResult<Vec<Material>> {
        Ok(queries_stock::list_materials(&self.pool).await?)
    }
}

/// 发票锁: 释放后若没有其他请求在等待, 从锁表中移除
struct InvoiceLock<'a> {
    locks: &'a DashMap<i64, Arc<Mutex<()>>>,
    invoice_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InvoiceLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.invoice_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
