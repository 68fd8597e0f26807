use folio_queue::job::JobType;
use folio_queue::queue::QueueStats;
use folio_queue::worker::WorkerStats;
use serde::{Deserialize, Serialize};

/// Statistics of every queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllQueueStats {
    pub queues: Vec<QueueStats>,
}

/// Paused state of a queue after pause or resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    pub job_type: JobType,
    pub is_paused: bool,
}

/// Number of finished jobs removed by a clean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCleaned {
    pub job_type: JobType,
    pub removed: usize,
}

/// Statistics of every worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllWorkerStats {
    pub workers: Vec<WorkerStats>,
}
