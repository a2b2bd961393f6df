use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::hypothesis::ConfidenceLevel;

#[derive(Parser, Debug)]
#[command(
    name = "abtest",
    version,
    about = "Two-proportion significance testing for A/B experiments"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a single control/treatment pair.
    Evaluate(EvaluateArgs),
    /// Evaluate every experiment in a JSON document and write a report.
    Batch(BatchArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfidenceArg {
    #[value(name = "90")]
    Ninety,
    #[value(name = "95")]
    NinetyFive,
    #[value(name = "99")]
    NinetyNine,
}

impl From<ConfidenceArg> for ConfidenceLevel {
    fn from(value: ConfidenceArg) -> Self {
        match value {
            ConfidenceArg::Ninety => Self::P90,
            ConfidenceArg::NinetyFive => Self::P95,
            ConfidenceArg::NinetyNine => Self::P99,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub control_visitors: i64,

    #[arg(long, allow_negative_numbers = true)]
    pub control_conversions: i64,

    #[arg(long, allow_negative_numbers = true)]
    pub treatment_visitors: i64,

    #[arg(long, allow_negative_numbers = true)]
    pub treatment_conversions: i64,

    #[arg(long, value_enum, default_value_t = ConfidenceArg::NinetyFive)]
    pub confidence_level: ConfidenceArg,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
