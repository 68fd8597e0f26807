//! Workflow stages and their progress bands.

use folio_queue::job::JobType;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Phase of a workflow, walked strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    /// Waiting for the project's images to finish uploading.
    Upload,
    OcrProcessing,
    TextCleaning,
    Clustering,
    SummaryGeneration,
    ExportGeneration,
    /// Terminal stage of a successful run.
    Completed,
}

impl WorkflowStage {
    /// Returns the stage following this one, or `None` after `Completed`.
    pub fn next(self) -> Option<Self> {
        Self::iter().skip_while(|stage| *stage != self).nth(1)
    }

    /// Returns the job type submitted by this stage.
    pub const fn job_type(self) -> Option<JobType> {
        match self {
            WorkflowStage::OcrProcessing => Some(JobType::OcrProcessing),
            WorkflowStage::TextCleaning => Some(JobType::TextCleaning),
            WorkflowStage::Clustering => Some(JobType::Clustering),
            WorkflowStage::SummaryGeneration => Some(JobType::SummaryGeneration),
            WorkflowStage::ExportGeneration => Some(JobType::ExportGeneration),
            WorkflowStage::Upload | WorkflowStage::Completed => None,
        }
    }

    /// Returns the overall progress range covered by this stage.
    pub const fn progress_band(self) -> ProgressBand {
        match self {
            WorkflowStage::Upload => ProgressBand::new(5, 20),
            WorkflowStage::OcrProcessing => ProgressBand::new(20, 35),
            WorkflowStage::TextCleaning => ProgressBand::new(35, 55),
            WorkflowStage::Clustering => ProgressBand::new(55, 75),
            WorkflowStage::SummaryGeneration => ProgressBand::new(75, 90),
            WorkflowStage::ExportGeneration => ProgressBand::new(90, 98),
            WorkflowStage::Completed => ProgressBand::new(100, 100),
        }
    }

    /// Returns all stages in order.
    pub fn all() -> impl Iterator<Item = WorkflowStage> {
        Self::iter()
    }
}

/// Inclusive range of overall progress percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressBand {
    pub start: u8,
    pub end: u8,
}

impl ProgressBand {
    const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Interpolates linearly by the fraction of finished units.
    ///
    /// An empty batch maps to the end of the band.
    pub fn interpolate(&self, done: usize, total: usize) -> u8 {
        if total == 0 || done >= total {
            return self.end;
        }

        let span = usize::from(self.end - self.start);
        let offset = u8::try_from(span * done / total).unwrap_or(self.end - self.start);
        self.start + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(WorkflowStage::Upload.next(), Some(WorkflowStage::OcrProcessing));
        assert_eq!(
            WorkflowStage::ExportGeneration.next(),
            Some(WorkflowStage::Completed)
        );
        assert_eq!(WorkflowStage::Completed.next(), None);
        assert!(WorkflowStage::Clustering < WorkflowStage::SummaryGeneration);
    }

    #[test]
    fn test_bands_are_contiguous() {
        let stages: Vec<_> = WorkflowStage::all().collect();
        for pair in stages.windows(2) {
            let (current, next) = (pair[0].progress_band(), pair[1].progress_band());
            assert!(current.start <= current.end);
            assert!(current.end <= next.start);
        }
    }

    #[test]
    fn test_interpolate() {
        let band = WorkflowStage::OcrProcessing.progress_band();
        assert_eq!(band.interpolate(0, 3), 20);
        assert_eq!(band.interpolate(1, 3), 25);
        assert_eq!(band.interpolate(3, 3), 35);
        assert_eq!(band.interpolate(0, 0), 35);
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_string(&WorkflowStage::SummaryGeneration).unwrap();
        assert_eq!(json, "\"SUMMARY_GENERATION\"");
        assert_eq!(WorkflowStage::TextCleaning.job_type(), Some(JobType::TextCleaning));
        assert_eq!(WorkflowStage::Upload.job_type(), None);
    }
}
