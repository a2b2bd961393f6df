use serde::{Deserialize, Serialize};

use crate::hypothesis::{ConfidenceLevel, GroupSample, HypothesisTest, Outcome, Verdict};

pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    pub visitors: i64,
    pub conversions: i64,
}

impl From<&GroupSample> for GroupCounts {
    fn from(sample: &GroupSample) -> Self {
        Self {
            visitors: sample.visitors() as i64,
            conversions: sample.conversions() as i64,
        }
    }
}

/// Computed statistics shared by single and batch reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestStatistics {
    pub confidence_level: u32,
    pub critical_value: f64,
    pub control_rate: f64,
    pub treatment_rate: f64,
    pub rate_difference: f64,
    pub standard_error: f64,
    pub z_score: f64,
    pub verdict: Verdict,
    pub label: String,
    pub outcome: Outcome,
}

impl From<&HypothesisTest> for TestStatistics {
    fn from(test: &HypothesisTest) -> Self {
        Self {
            confidence_level: test.confidence_level.percent(),
            critical_value: test.critical_value,
            control_rate: test.control_rate,
            treatment_rate: test.treatment_rate,
            rate_difference: test.rate_difference,
            standard_error: test.standard_error,
            z_score: test.z_score,
            verdict: test.verdict,
            label: test.verdict.label().to_string(),
            outcome: test.verdict.outcome(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub report_version: u32,
    pub generated_at: String,
    pub control: GroupCounts,
    pub treatment: GroupCounts,
    #[serde(flatten)]
    pub statistics: TestStatistics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchInput {
    pub experiments: Vec<ExperimentInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentInput {
    pub name: String,
    pub control: GroupCounts,
    pub treatment: GroupCounts,
    // Kept as a raw integer so an unsupported level fails only its own row.
    #[serde(default = "default_confidence_percent")]
    pub confidence_level: u32,
}

fn default_confidence_percent() -> u32 {
    ConfidenceLevel::default().percent()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResultRow {
    pub name: String,
    pub status: RowStatus,
    pub control: GroupCounts,
    pub treatment: GroupCounts,
    #[serde(flatten)]
    pub statistics: Option<TestStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub report_version: u32,
    pub generated_at: String,
    pub source_path: String,
    pub source_sha256: String,
    pub experiment_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchResultRow>,
}
