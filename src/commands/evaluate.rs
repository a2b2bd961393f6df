use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::EvaluateArgs;
use crate::hypothesis::{ConfidenceLevel, Group, GroupSample, Outcome, run_test};
use crate::model::{EvaluationReport, GroupCounts, REPORT_VERSION, TestStatistics};
use crate::util::{now_utc_string, write_json_pretty, write_json_stdout};

pub fn run(args: EvaluateArgs) -> Result<()> {
    let report = build_report(&args)?;

    if let Some(report_path) = &args.report_path {
        write_json_pretty(report_path, &report)?;
        info!(path = %report_path.display(), "wrote evaluation report");
    }

    if args.json {
        write_json_stdout(&report)?;
    } else {
        let mut output = io::BufWriter::new(io::stdout().lock());
        write_text_report(&mut output, &report)?;
        output.flush()?;
    }

    info!(
        verdict = %report.statistics.label,
        z_score = report.statistics.z_score,
        confidence_level = report.statistics.confidence_level,
        "evaluation completed"
    );

    Ok(())
}

pub fn build_report(args: &EvaluateArgs) -> Result<EvaluationReport> {
    let control = GroupSample::new(
        Group::Control,
        args.control_visitors,
        args.control_conversions,
    )?;
    let treatment = GroupSample::new(
        Group::Treatment,
        args.treatment_visitors,
        args.treatment_conversions,
    )?;
    let level = ConfidenceLevel::from(args.confidence_level);

    let test = run_test(&control, &treatment, level).with_context(|| {
        format!("failed to evaluate experiment at {}% confidence", level.percent())
    })?;

    Ok(EvaluationReport {
        report_version: REPORT_VERSION,
        generated_at: now_utc_string(),
        control: GroupCounts::from(&control),
        treatment: GroupCounts::from(&treatment),
        statistics: TestStatistics::from(&test),
    })
}

pub fn banner_prefix(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "[SUCCESS]",
        Outcome::Error => "[ERROR]",
        Outcome::Warning => "[WARNING]",
    }
}

pub fn write_text_report<W: Write>(output: &mut W, report: &EvaluationReport) -> Result<()> {
    let stats = &report.statistics;

    writeln!(output, "Result:")?;
    writeln!(output, "{} {}", banner_prefix(stats.outcome), stats.label)?;
    writeln!(
        output,
        "\tcontrol: visitors={} conversions={} rate={:.6}",
        report.control.visitors, report.control.conversions, stats.control_rate
    )?;
    writeln!(
        output,
        "\ttreatment: visitors={} conversions={} rate={:.6}",
        report.treatment.visitors, report.treatment.conversions, stats.treatment_rate
    )?;
    writeln!(output, "\trate_difference: {:.6}", stats.rate_difference)?;
    writeln!(output, "\tstandard_error: {:.6}", stats.standard_error)?;
    writeln!(output, "\tz_score: {:.4}", stats.z_score)?;
    writeln!(
        output,
        "\tcritical_value: {} ({}% confidence)",
        stats.critical_value, stats.confidence_level
    )?;

    Ok(())
}
