//! Job type enumeration.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Kind of work a job performs.
///
/// Each type maps to exactly one queue and one fixed worker concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Text extraction from an uploaded image.
    OcrProcessing,
    /// Cleanup of extracted note text.
    TextCleaning,
    /// Semantic clustering of the project's notes.
    Clustering,
    /// Theme summarization across clusters.
    SummaryGeneration,
    /// Rendering of the final document.
    ExportGeneration,
}

impl JobType {
    /// Returns the fixed number of jobs of this type processed concurrently.
    pub const fn concurrency(self) -> usize {
        match self {
            JobType::OcrProcessing => 2,
            JobType::TextCleaning => 4,
            JobType::Clustering => 1,
            JobType::SummaryGeneration => 2,
            JobType::ExportGeneration => 3,
        }
    }

    /// Returns the queue name, usable as a key or subject token.
    pub const fn queue_name(self) -> &'static str {
        match self {
            JobType::OcrProcessing => "ocr_processing",
            JobType::TextCleaning => "text_cleaning",
            JobType::Clustering => "clustering",
            JobType::SummaryGeneration => "summary_generation",
            JobType::ExportGeneration => "export_generation",
        }
    }

    /// Returns all job types in pipeline order.
    pub fn all() -> impl Iterator<Item = JobType> {
        Self::iter()
    }
}
