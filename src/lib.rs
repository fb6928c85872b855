pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod scheduler;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::scheduler::LessonScheduler;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub scheduler: Arc<LessonScheduler>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, scheduler: Arc<LessonScheduler>) -> Self {
        Self {
            config,
            db,
            scheduler,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
