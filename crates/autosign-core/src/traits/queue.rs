//! Task queue contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// "Execute this policy now". Payload is a serialized [`crate::types::Schedule`].
pub const TASK_TYPE_SCHEDULER: &str = "scheduler:policy";
/// "Cosign this message set". Payload is a serialized [`crate::types::KeysignRequest`].
pub const TASK_TYPE_KEYSIGN: &str = "keysign:sign";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_type: String,
    pub payload: serde_json::Value,
}

impl Task {
    pub fn new<T: Serialize>(task_type: &str, payload: &T) -> Result<Self> {
        Ok(Self {
            task_type: task_type.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Per-enqueue delivery options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub queue: String,
    pub max_retry: u32,
    pub timeout: Duration,
    pub retention: Duration,
}

impl EnqueueOptions {
    /// Fire-once delivery: no retry, 5 minute timeout, 10 minute retention.
    pub fn fire_once(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            max_retry: 0,
            timeout: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: Uuid,
    pub queue: String,
    pub task_type: String,
}

/// Durable at-least-once job queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task, opts: &EnqueueOptions) -> Result<TaskInfo>;
}
