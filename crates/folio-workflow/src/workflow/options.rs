//! Caller-supplied workflow options.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Algorithm family requested for note clustering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClusteringMethod {
    /// Embedding similarity.
    #[default]
    Semantic,
    Kmeans,
    Hierarchical,
}

/// Flags forwarded to text cleaning jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextCleaningOptions {
    pub fix_spelling: bool,
    pub normalize_whitespace: bool,
    pub remove_artifacts: bool,
}

impl Default for TextCleaningOptions {
    fn default() -> Self {
        Self {
            fix_spelling: true,
            normalize_whitespace: true,
            remove_artifacts: true,
        }
    }
}

/// Flags forwarded to summary generation jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryOptions {
    pub include_quotes: bool,
    pub include_distribution: bool,
    /// Upper bound on the number of themes in the summary.
    pub max_themes: Option<u32>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            include_quotes: true,
            include_distribution: true,
            max_themes: None,
        }
    }
}

/// Options a workflow is started with.
///
/// The orchestrator does not interpret these beyond forwarding them in the
/// payloads of the jobs they concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Whether stage processors may chain follow-up work on their own.
    pub auto_processing: bool,
    pub clustering_method: ClusteringMethod,
    /// Number of clusters to aim for; the processor decides when unset.
    pub target_clusters: Option<u32>,
    pub text_cleaning: TextCleaningOptions,
    pub summary: SummaryOptions,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            auto_processing: true,
            clustering_method: ClusteringMethod::default(),
            target_clusters: None,
            text_cleaning: TextCleaningOptions::default(),
            summary: SummaryOptions::default(),
        }
    }
}

impl WorkflowConfig {
    /// Sets the clustering method and target cluster count.
    #[must_use]
    pub fn with_clustering(mut self, method: ClusteringMethod, target: Option<u32>) -> Self {
        self.clustering_method = method;
        self.target_clusters = target;
        self
    }

    /// Sets the summary options.
    #[must_use]
    pub fn with_summary(mut self, summary: SummaryOptions) -> Self {
        self.summary = summary;
        self
    }
}
