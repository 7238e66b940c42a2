//! Side effects owed after an order is recorded.
//!
//! Payment verification persists the order together with its tasks, then
//! asks the worker to run them straight away. Whatever fails is picked up
//! again by the periodic drain until it succeeds or runs out of attempts.
//! Delivery is at-least-once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::services::catalog::CatalogService;
use crate::services::fulfillment::FulfillmentService;
use crate::store::{OutboxAction, OutboxTask, Store};

pub const MAX_ATTEMPTS: i32 = 5;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct OutboxWorker {
    store: Arc<dyn Store>,
    catalog: CatalogService,
    fulfillment: FulfillmentService,
    running: Arc<Mutex<()>>,
}

impl OutboxWorker {
    pub fn new(store: Arc<dyn Store>, catalog: CatalogService, fulfillment: FulfillmentService) -> Self {
        Self { store, catalog, fulfillment, running: Arc::new(Mutex::new(())) }
    }

    /// Runs the open tasks of one order, in the order they were queued.
    #[instrument(skip(self))]
    pub async fn run_for_order(&self, order_id: Uuid) -> Result<DrainReport> {
        let _guard = self.running.lock().await;
        let tasks = self.store.tasks_for_order(order_id).await?;
        self.run(tasks.into_iter().filter(|t| !t.is_done() && t.attempts < MAX_ATTEMPTS).collect()).await
    }

    pub async fn drain(&self, limit: i64) -> Result<DrainReport> {
        let _guard = self.running.lock().await;
        let tasks = self.store.pending_tasks(MAX_ATTEMPTS, limit).await?;
        self.run(tasks).await
    }

    /// Periodic retry loop. The first tick fires after one full period.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match self.drain(100).await {
                    Ok(report) if report.completed + report.failed > 0 => {
                        info!(completed = report.completed, failed = report.failed, "outbox drained")
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "outbox drain failed"),
                }
            }
        })
    }

    async fn run(&self, tasks: Vec<OutboxTask>) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        for task in tasks {
            match self.execute(&task).await {
                Ok(()) => {
                    self.store.complete_task(task.id).await?;
                    report.completed += 1;
                }
                Err(e) => {
                    let attempt = task.attempts + 1;
                    if attempt >= MAX_ATTEMPTS {
                        error!(order_id = %task.order_id, step = ?task.action, attempt, error = %e, "order side effect abandoned");
                    } else {
                        warn!(order_id = %task.order_id, step = ?task.action, attempt, error = %e, "order side effect failed");
                    }
                    self.store.fail_task(task.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn execute(&self, task: &OutboxTask) -> Result<()> {
        match &task.action {
            OutboxAction::ClearCart { user_id } => {
                self.store.clear_cart(*user_id).await?;
            }
            OutboxAction::DecrementStock { product_id, quantity, product_name } => {
                self.catalog.record_sale(*product_id, *quantity, format!("Order {} ({})", task.order_id, product_name)).await?;
            }
            OutboxAction::CreateShipment => {
                self.fulfillment.ensure_shipment(task.order_id).await?;
            }
        }
        Ok(())
    }
}
