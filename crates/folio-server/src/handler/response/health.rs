use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// True while every worker pool task is running.
    pub healthy: bool,
    pub workers_running: bool,
    /// Workflows currently held in the registry.
    pub workflows: usize,
    pub checked_at: Timestamp,
}
