//! Background side effects (search analytics).
//!
//! The search path never awaits these. It hands a [`BackgroundTask`] to an
//! injected [`TaskQueue`]; production spawns it on tokio and logs failures,
//! tests record what was submitted.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    /// Set for metered searches.
    pub tenant_id: Option<Uuid>,
    pub cache_key: String,
    pub total: i64,
    pub returned: usize,
    pub cache_hit: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackgroundTask {
    RecordSearch(SearchEvent),
}

pub trait TaskQueue: Send + Sync {
    /// Schedules `task`. Must not block the caller.
    fn submit(&self, task: BackgroundTask);
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: BackgroundTask) -> Result<(), AppError>;
}

/// Runs each task on its own tokio task.
pub struct SpawningTaskQueue {
    handler: Arc<dyn TaskHandler>,
}

impl SpawningTaskQueue {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        Self { handler }
    }
}

impl TaskQueue for SpawningTaskQueue {
    fn submit(&self, task: BackgroundTask) {
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            if let Err(e) = handler.handle(task).await {
                tracing::warn!("Background task failed: {}", e);
            }
        });
    }
}

/// Keeps submitted tasks in memory.
#[derive(Default)]
pub struct RecordingTaskQueue {
    tasks: Mutex<Vec<BackgroundTask>>,
}

impl RecordingTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<BackgroundTask> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TaskQueue for RecordingTaskQueue {
    fn submit(&self, task: BackgroundTask) {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(task);
    }
}

/// Writes search events to `lead_search_events`.
pub struct PgSearchEventRecorder {
    pool: PgPool,
}

impl PgSearchEventRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskHandler for PgSearchEventRecorder {
    async fn handle(&self, task: BackgroundTask) -> Result<(), AppError> {
        match task {
            BackgroundTask::RecordSearch(event) => {
                sqlx::query(
                    r#"
                    INSERT INTO lead_search_events
                        (tenant_id, cache_key, total, returned, cache_hit, occurred_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(event.tenant_id)
                .bind(&event.cache_key)
                .bind(event.total)
                .bind(event.returned as i32)
                .bind(event.cache_hit)
                .bind(event.occurred_at)
                .execute(&self.pool)
                .await
                .context("record search event")?;
            }
        }
        Ok(())
    }
}
