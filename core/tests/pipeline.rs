#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use stagehand_core::actions::ActionContext;
use stagehand_core::plan::{self, PlanContext};
use stagehand_core::terminal::MemorySink;
use stagehand_core::{
    Config, PipelineError, PipelineOutcome, ProgressSettings, ReporterSettings, RunEntry,
    RunJournal, RunStatus, StageRunner, StatusReporter, StepRunner, Terminal,
};

fn quiet_settings(verbose: bool) -> ReporterSettings {
    ReporterSettings {
        column_width: 40,
        colors: false,
        verbose,
        status_settle: Duration::ZERO,
        progress: ProgressSettings {
            enabled: !verbose,
            colors: false,
            tick: Duration::from_millis(20),
            settle: Duration::ZERO,
        },
    }
}

fn runner(sink: &Arc<MemorySink>, verbose: bool) -> StageRunner {
    let terminal: Terminal = sink.clone();
    let reporter = StatusReporter::new(terminal, quiet_settings(verbose));
    StageRunner::new(StepRunner::new(reporter, verbose))
}

fn context(config: &Config, overrides: &[(String, String)], sink: &Arc<MemorySink>) -> PlanContext {
    PlanContext {
        vars: plan::variables(config, overrides, false),
        proxy_available: false,
        default_timeout: Duration::from_secs(10),
        actions: ActionContext {
            terminal: sink.clone(),
        },
    }
}

const PLAN: &str = r#"
[vars]
code = "0"

[[stage]]
name = "Prerequisites"
banner = "Prerequisites satisfied"

[[stage.step]]
description = "Checking shell"
program = "sh"
args = ["-c", "exit 0"]

[[stage.step]]
description = "Optional cleanup"
program = "sh"
args = ["-c", "exit 22"]
ignore_errors = true

[[stage]]
name = "Install"

[[stage.step]]
description = "Installing"
program = "sh"
args = ["-c", "exit ${code}"]

[[stage.step]]
description = "Configuring"
program = "sh"
args = ["-c", "exit 0"]
"#;

#[tokio::test]
async fn test_plan_runs_to_completion() {
    let config: Config = toml::from_str(PLAN).unwrap();
    let sink = MemorySink::new();
    let stages = plan::build(&config, &context(&config, &[], &sink)).unwrap();

    let mut runner = runner(&sink, false);
    let outcome = runner
        .run_pipeline(stages, 0, std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome, PipelineOutcome::Completed);

    let output = sink.contents();
    assert!(output.contains("Prerequisites satisfied"));
    assert!(output.contains("Install completed"));
    assert!(!output.contains(" Error (22)"));

    let outcomes = runner.step_runner().outcomes();
    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[1].true_status, 22);
    assert_eq!(outcomes[1].effective_status, 0);
    assert!(outcomes[1].ignored);
}

#[tokio::test]
async fn test_cli_override_fails_the_install_stage() {
    let config: Config = toml::from_str(PLAN).unwrap();
    let sink = MemorySink::new();
    let overrides = vec![plan::parse_var("code=100").unwrap()];
    let stages = plan::build(&config, &context(&config, &overrides, &sink)).unwrap();

    let mut runner = runner(&sink, false);
    let outcome = runner
        .run_pipeline(stages, 0, std::future::pending())
        .await
        .unwrap();

    let PipelineOutcome::StageFailed(err) = outcome.clone() else {
        panic!("expected a failed stage, got {outcome:?}");
    };
    assert_eq!(err.stage, "Install");
    assert_eq!(err.description, "Installing");
    assert_eq!(err.status, 100);
    assert!(sink.contents().contains(" Error (100)"));
    assert!(!sink.contents().contains("Configuring"));

    assert_eq!(
        outcome.into_result().unwrap_err().to_string(),
        "Stage 'Install' failed at 'Installing' (status 100)"
    );
}

#[tokio::test]
async fn test_resume_skips_earlier_stages() {
    let config: Config = toml::from_str(PLAN).unwrap();
    let sink = MemorySink::new();
    let stages = plan::build(&config, &context(&config, &[], &sink)).unwrap();

    let mut runner = runner(&sink, true);
    runner
        .run_pipeline(stages, 1, std::future::pending())
        .await
        .unwrap();

    let output = sink.contents();
    assert!(!output.contains("Checking shell"));
    assert!(output.contains("\nStarting stage 1: Install\n"));
    assert_eq!(runner.step_runner().outcomes().len(), 2);
}

#[tokio::test]
async fn test_start_stage_out_of_range() {
    let config: Config = toml::from_str(PLAN).unwrap();
    let sink = MemorySink::new();
    let stages = plan::build(&config, &context(&config, &[], &sink)).unwrap();

    let err = runner(&sink, false)
        .run_pipeline(stages, 2, std::future::pending())
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::InvalidStartStage { index: 2, count: 2 });
    assert!(sink.writes().is_empty());
}

#[tokio::test]
async fn test_interrupt_is_journaled() {
    let config: Config = toml::from_str(
        r#"
        [[stage]]
        name = "Slow"
        [[stage.step]]
        description = "Waiting"
        program = "sleep"
        args = ["5"]
        "#,
    )
    .unwrap();
    let sink = MemorySink::new();
    let stages = plan::build(&config, &context(&config, &[], &sink)).unwrap();

    let mut runner = runner(&sink, false);
    let outcome = runner
        .run_pipeline(stages, 0, tokio::time::sleep(Duration::from_millis(200)))
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Interrupted);

    let dir = tempfile::tempdir().unwrap();
    let mut journal = RunJournal::new(dir.path().join("runs.json"), 5).unwrap();
    let mut entry = RunEntry::new(0);
    for step in runner.step_runner().outcomes() {
        entry.add_step(step);
    }
    entry.finalize(&outcome, 0.2);
    journal.add_entry(entry).unwrap();

    let last = journal.entries().last().unwrap();
    assert_eq!(last.status, RunStatus::Interrupted);
    assert!(last.steps.is_empty());
}
