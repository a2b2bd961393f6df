use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::BatchArgs;
use crate::hypothesis::{ConfidenceLevel, EvaluationError, Group, GroupSample, run_test};
use crate::model::{
    BatchInput, BatchReport, BatchResultRow, ExperimentInput, REPORT_VERSION, RowStatus,
    TestStatistics,
};
use crate::util::{now_utc_string, sha256_bytes, write_json_pretty, write_json_stdout};

pub fn run(args: BatchArgs) -> Result<()> {
    let report = build_report(&args.input)?;

    let output_path = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input));
    write_json_pretty(&output_path, &report)?;
    info!(path = %output_path.display(), "wrote batch report");

    if args.json {
        write_json_stdout(&report)?;
    }

    info!(
        experiments = report.experiment_count,
        succeeded = report.succeeded,
        failed = report.failed,
        "batch completed"
    );

    if report.failed > 0 {
        bail!(
            "{} of {} experiments failed; see {}",
            report.failed,
            report.experiment_count,
            output_path.display()
        );
    }

    Ok(())
}

pub fn build_report(input_path: &Path) -> Result<BatchReport> {
    let raw = fs::read(input_path)
        .with_context(|| format!("failed to read {}", input_path.display()))?;
    let input: BatchInput = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", input_path.display()))?;

    if input.experiments.is_empty() {
        bail!("no experiments found in {}", input_path.display());
    }

    let results: Vec<BatchResultRow> = input.experiments.into_iter().map(evaluate_row).collect();
    let failed = results
        .iter()
        .filter(|row| row.status == RowStatus::Error)
        .count();

    Ok(BatchReport {
        report_version: REPORT_VERSION,
        generated_at: now_utc_string(),
        source_path: input_path.display().to_string(),
        source_sha256: sha256_bytes(&raw),
        experiment_count: results.len(),
        succeeded: results.len() - failed,
        failed,
        results,
    })
}

fn evaluate_row(experiment: ExperimentInput) -> BatchResultRow {
    let outcome = evaluate_experiment(&experiment);

    let (status, statistics, error) = match outcome {
        Ok(statistics) => (RowStatus::Ok, Some(statistics), None),
        Err(err) => {
            warn!(name = %experiment.name, error = %err, "experiment evaluation failed");
            (RowStatus::Error, None, Some(err.to_string()))
        }
    };

    BatchResultRow {
        name: experiment.name,
        status,
        control: experiment.control,
        treatment: experiment.treatment,
        statistics,
        error,
    }
}

fn evaluate_experiment(experiment: &ExperimentInput) -> Result<TestStatistics, EvaluationError> {
    let control = GroupSample::new(
        Group::Control,
        experiment.control.visitors,
        experiment.control.conversions,
    )?;
    let treatment = GroupSample::new(
        Group::Treatment,
        experiment.treatment.visitors,
        experiment.treatment.conversions,
    )?;
    let level = ConfidenceLevel::try_from(experiment.confidence_level)?;

    run_test(&control, &treatment, level).map(|test| TestStatistics::from(&test))
}

fn default_output_path(input_path: &Path) -> PathBuf {
    let stem = input_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("batch");
    input_path.with_file_name(format!("{stem}.report.json"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::{build_report, default_output_path, run};
    use crate::cli::BatchArgs;
    use crate::hypothesis::Verdict;
    use crate::model::RowStatus;
    use crate::util::{ScratchDir, sha256_bytes};

    const MIXED_INPUT: &str = r#"
    {
      "experiments": [
        {
          "name": "checkout-button",
          "control": { "visitors": 1000, "conversions": 100 },
          "treatment": { "visitors": 1000, "conversions": 150 }
        },
        {
          "name": "pricing-copy",
          "control": { "visitors": 500, "conversions": 50 },
          "treatment": { "visitors": 500, "conversions": 65 },
          "confidence_level": 99
        },
        {
          "name": "bad-level",
          "control": { "visitors": 1000, "conversions": 100 },
          "treatment": { "visitors": 1000, "conversions": 150 },
          "confidence_level": 80
        },
        {
          "name": "empty-control",
          "control": { "visitors": 0, "conversions": 0 },
          "treatment": { "visitors": 10, "conversions": 1 }
        }
      ]
    }
    "#;

    #[test]
    fn mixed_batch_records_each_row_outcome() {
        let dir = ScratchDir::new("batch-mixed");
        let input = dir.path().join("experiments.json");
        fs::write(&input, MIXED_INPUT).expect("input should be writable");

        let report = build_report(&input).expect("batch should evaluate");

        assert_eq!(report.experiment_count, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.source_sha256, sha256_bytes(MIXED_INPUT.as_bytes()));

        let first = &report.results[0];
        assert_eq!(first.status, RowStatus::Ok);
        let stats = first.statistics.as_ref().expect("first row has statistics");
        assert_eq!(stats.verdict, Verdict::TreatmentBetter);
        assert_eq!(stats.confidence_level, 95);

        let second = report.results[1]
            .statistics
            .as_ref()
            .expect("second row has statistics");
        assert_eq!(second.verdict, Verdict::Indeterminate);
        assert_eq!(second.critical_value, 2.576);

        let bad_level = &report.results[2];
        assert_eq!(bad_level.status, RowStatus::Error);
        assert!(bad_level.statistics.is_none());
        assert!(
            bad_level
                .error
                .as_deref()
                .is_some_and(|message| message.contains("confidence level 80"))
        );

        let empty = &report.results[3];
        assert_eq!(empty.status, RowStatus::Error);
        assert!(
            empty
                .error
                .as_deref()
                .is_some_and(|message| message.contains("control"))
        );

        let value = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(value["results"][0]["status"], "ok");
        assert_eq!(value["results"][0]["label"], "Experiment Group is Better");
        assert_eq!(value["results"][2]["status"], "error");
        assert!(value["results"][2].get("z_score").is_none());
    }

    #[test]
    fn empty_experiment_list_is_rejected() {
        let dir = ScratchDir::new("batch-empty");
        let input = dir.path().join("empty.json");
        fs::write(&input, r#"{ "experiments": [] }"#).expect("input should be writable");

        let err = build_report(&input).expect_err("empty batch must fail");
        assert!(err.to_string().contains("no experiments"));
    }

    #[test]
    fn malformed_input_reports_the_path() {
        let dir = ScratchDir::new("batch-malformed");
        let input = dir.path().join("broken.json");
        fs::write(&input, "{ not json").expect("input should be writable");

        let err = build_report(&input).expect_err("malformed json must fail");
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn run_writes_report_before_failing_on_bad_rows() {
        let dir = ScratchDir::new("batch-run");
        let input = dir.path().join("weekly.json");
        fs::write(
            &input,
            r#"
            {
              "experiments": [
                {
                  "name": "hero-image",
                  "control": { "visitors": 1000, "conversions": 100 },
                  "treatment": { "visitors": 1000, "conversions": 105 }
                },
                {
                  "name": "overfilled",
                  "control": { "visitors": 10, "conversions": 11 },
                  "treatment": { "visitors": 10, "conversions": 1 }
                }
              ]
            }
            "#,
        )
        .expect("input should be writable");

        let err = run(BatchArgs {
            input: input.clone(),
            output: None,
            json: false,
        })
        .expect_err("a failed row must fail the command");
        assert!(err.to_string().contains("1 of 2 experiments failed"), "{err}");

        let report_path = dir.path().join("weekly.report.json");
        assert!(report_path.exists());
        let raw = fs::read(&report_path).expect("report should be readable");
        let value: serde_json::Value =
            serde_json::from_slice(&raw).expect("report should be valid json");
        assert_eq!(value["failed"], 1);
        assert_eq!(value["succeeded"], 1);
        assert_eq!(value["results"][0]["verdict"], "indeterminate");
        assert_eq!(value["results"][1]["status"], "error");
    }

    #[test]
    fn run_succeeds_and_honors_explicit_output() {
        let dir = ScratchDir::new("batch-run-ok");
        let input = dir.path().join("single.json");
        fs::write(
            &input,
            r#"{ "experiments": [ { "name": "cta", "control": { "visitors": 1000, "conversions": 100 }, "treatment": { "visitors": 1000, "conversions": 150 }, "confidence_level": 90 } ] }"#,
        )
        .expect("input should be writable");
        let output = dir.path().join("out").join("cta.json");

        run(BatchArgs {
            input: input.clone(),
            output: Some(output.clone()),
            json: false,
        })
        .expect("all rows valid");

        assert!(!dir.path().join("single.report.json").exists());
        let raw = fs::read(&output).expect("report should be written");
        let value: serde_json::Value =
            serde_json::from_slice(&raw).expect("report should be valid json");
        assert_eq!(value["failed"], 0);
        assert_eq!(value["results"][0]["outcome"], "success");
    }

    #[test]
    fn default_output_sits_beside_input() {
        let path = default_output_path(Path::new("/data/q3/experiments.json"));
        assert_eq!(path, PathBuf::from("/data/q3/experiments.report.json"));
    }
}
