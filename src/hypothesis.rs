//! Two-proportion z-test over a control and a treatment group.
//!
//! The standard error is the unpooled one: each group's variance is estimated
//! from its own conversion rate. Switching to the pooled estimate changes
//! verdicts near the critical value, so it is not offered here.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CRITICAL_VALUE_90: f64 = 1.645;
pub const CRITICAL_VALUE_95: f64 = 1.96;
pub const CRITICAL_VALUE_99: f64 = 2.576;

/// Largest visitor count whose rates stay exact in `f64` (2^53).
pub const MAX_VISITORS: i64 = 1 << 53;

pub const LABEL_TREATMENT_BETTER: &str = "Experiment Group is Better";
pub const LABEL_CONTROL_BETTER: &str = "Control Group is Better";
pub const LABEL_INDETERMINATE: &str = "Indeterminate";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("invalid confidence level {0}; expected one of 90, 95, 99")]
    InvalidConfidenceLevel(u32),

    #[error("invalid {group} group input: {reason}")]
    InvalidInput { group: Group, reason: String },

    /// Both rates sit on opposite boundaries (0% and 100%), so the standard
    /// error is zero while the difference is not.
    #[error(
        "standard error is zero with differing rates (control={control_rate}, treatment={treatment_rate})"
    )]
    DegenerateStandardError {
        control_rate: f64,
        treatment_rate: f64,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Control,
    Treatment,
}

impl Group {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Treatment => "treatment",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visitor and conversion counts for one group.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GroupSample {
    visitors: u64,
    conversions: u64,
}

impl GroupSample {
    pub fn new(group: Group, visitors: i64, conversions: i64) -> Result<Self, EvaluationError> {
        let invalid = |reason: String| EvaluationError::InvalidInput { group, reason };

        if visitors < 1 {
            return Err(invalid(format!("visitors must be at least 1, got {visitors}")));
        }
        if visitors > MAX_VISITORS {
            return Err(invalid(format!(
                "visitors must not exceed {MAX_VISITORS}, got {visitors}"
            )));
        }
        if conversions < 0 {
            return Err(invalid(format!(
                "conversions must not be negative, got {conversions}"
            )));
        }
        if conversions > visitors {
            return Err(invalid(format!(
                "conversions ({conversions}) exceed visitors ({visitors})"
            )));
        }

        Ok(Self {
            visitors: visitors as u64,
            conversions: conversions as u64,
        })
    }

    pub fn visitors(&self) -> u64 {
        self.visitors
    }

    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    pub fn rate(&self) -> f64 {
        self.conversions as f64 / self.visitors as f64
    }

    fn variance_of_rate(&self) -> f64 {
        let rate = self.rate();
        rate * (1.0 - rate) / self.visitors as f64
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ConfidenceLevel {
    P90,
    #[default]
    P95,
    P99,
}

impl ConfidenceLevel {
    pub fn percent(self) -> u32 {
        match self {
            Self::P90 => 90,
            Self::P95 => 95,
            Self::P99 => 99,
        }
    }

    pub fn critical_value(self) -> f64 {
        match self {
            Self::P90 => CRITICAL_VALUE_90,
            Self::P95 => CRITICAL_VALUE_95,
            Self::P99 => CRITICAL_VALUE_99,
        }
    }
}

impl TryFrom<u32> for ConfidenceLevel {
    type Error = EvaluationError;

    fn try_from(level: u32) -> Result<Self, Self::Error> {
        match level {
            90 => Ok(Self::P90),
            95 => Ok(Self::P95),
            99 => Ok(Self::P99),
            other => Err(EvaluationError::InvalidConfidenceLevel(other)),
        }
    }
}

impl From<ConfidenceLevel> for u32 {
    fn from(level: ConfidenceLevel) -> Self {
        level.percent()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    TreatmentBetter,
    ControlBetter,
    Indeterminate,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Self::TreatmentBetter => LABEL_TREATMENT_BETTER,
            Self::ControlBetter => LABEL_CONTROL_BETTER,
            Self::Indeterminate => LABEL_INDETERMINATE,
        }
    }

    pub fn outcome(self) -> Outcome {
        match self {
            Self::TreatmentBetter => Outcome::Success,
            Self::ControlBetter => Outcome::Error,
            Self::Indeterminate => Outcome::Warning,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Display style a front end should use for a verdict banner.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    Warning,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// Every intermediate value of one test, plus the verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisTest {
    pub confidence_level: ConfidenceLevel,
    pub critical_value: f64,
    pub control_rate: f64,
    pub treatment_rate: f64,
    pub rate_difference: f64,
    pub standard_error: f64,
    pub z_score: f64,
    pub verdict: Verdict,
}

pub fn evaluate(
    control_visitors: i64,
    control_conversions: i64,
    treatment_visitors: i64,
    treatment_conversions: i64,
    confidence_level: u32,
) -> Result<Verdict, EvaluationError> {
    let control = GroupSample::new(Group::Control, control_visitors, control_conversions)?;
    let treatment = GroupSample::new(Group::Treatment, treatment_visitors, treatment_conversions)?;
    let level = ConfidenceLevel::try_from(confidence_level)?;

    evaluate_samples(&control, &treatment, level)
}

pub fn evaluate_samples(
    control: &GroupSample,
    treatment: &GroupSample,
    level: ConfidenceLevel,
) -> Result<Verdict, EvaluationError> {
    run_test(control, treatment, level).map(|test| test.verdict)
}

pub fn run_test(
    control: &GroupSample,
    treatment: &GroupSample,
    level: ConfidenceLevel,
) -> Result<HypothesisTest, EvaluationError> {
    let control_rate = control.rate();
    let treatment_rate = treatment.rate();
    let rate_difference = treatment_rate - control_rate;
    let standard_error = (control.variance_of_rate() + treatment.variance_of_rate()).sqrt();

    let z_score = if standard_error == 0.0 {
        // Zero variance means each rate is exactly 0 or 1.
        if rate_difference != 0.0 {
            return Err(EvaluationError::DegenerateStandardError {
                control_rate,
                treatment_rate,
            });
        }
        0.0
    } else {
        rate_difference / standard_error
    };

    let critical_value = level.critical_value();
    let verdict = if z_score > critical_value {
        Verdict::TreatmentBetter
    } else if z_score < -critical_value {
        Verdict::ControlBetter
    } else {
        Verdict::Indeterminate
    };

    debug!(
        control_rate,
        treatment_rate,
        rate_difference,
        standard_error,
        z_score,
        critical_value,
        verdict = %verdict,
        "hypothesis test computed"
    );

    Ok(HypothesisTest {
        confidence_level: level,
        critical_value,
        control_rate,
        treatment_rate,
        rate_difference,
        standard_error,
        z_score,
        verdict,
    })
}
