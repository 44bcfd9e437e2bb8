//! Job lifecycle tests: resume, commit, failure and cleanup, driven through
//! shell scripts standing in for vspipe and ffmpeg.

#![cfg(unix)]

mod common;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;

use autovhs::config::{Config, EncodingConfig};
use autovhs::pipeline::{BatchSummary, Job, JobOutcome, PipelineError, ProcessSide};
use common::{
    wait_for_processes, Durations, Harness, Workspace, FFMPEG_FAIL, FFMPEG_HANG, FFMPEG_NO_OUTPUT,
    FFMPEG_OK, VSPIPE_HANG, VSPIPE_OK,
};

#[tokio::test]
async fn completed_job_commits_atomically() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    let mut h = Harness::new(
        ws.tool("vspipe", VSPIPE_OK),
        ws.tool("ffmpeg", FFMPEG_OK),
        Durations::default(),
    );

    let outcome = h.controller.process(&input).await;

    assert_matches!(outcome, JobOutcome::Completed(ref path) if *path == job.output);
    assert_eq!(fs::read_to_string(&job.output).unwrap(), "frames");
    assert!(!job.temp_output.exists());
    assert!(!job.script.exists());
    assert_eq!(h.scripts.calls(), 1);
    assert!(h.processes.is_empty());

    let updates = h.updates.lock();
    assert_eq!(updates.len(), 2);
    assert!((updates[0].percent - 50.0).abs() < 1e-9);
    assert_eq!(updates[0].elapsed, "00:00:05,000 / 00:00:10,000");
    assert_eq!(updates[0].eta.as_deref(), Some("00:00:02"));
    assert_eq!(updates[0].source, "FFmpeg");
    assert_eq!(updates[1].percent, 100.0);
}

#[tokio::test]
async fn valid_output_is_skipped_without_launching() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    fs::write(&job.output, b"previous run").unwrap();
    fs::write(ws.path().join("tape.avi.ffindex"), b"index").unwrap();

    let marker = ws.path().join("launched");
    let mut h = Harness::new(
        ws.tool("vspipe", &format!("touch '{}'", marker.display())),
        ws.tool("ffmpeg", &format!("touch '{}'", marker.display())),
        Durations::default(),
    );

    let outcome = h.controller.process(&input).await;

    assert_matches!(outcome, JobOutcome::Skipped);
    assert_eq!(h.scripts.calls(), 0);
    assert!(!marker.exists());
    assert_eq!(fs::read_to_string(&job.output).unwrap(), "previous run");
    assert!(!ws.path().join("tape.avi.ffindex").exists());
}

#[tokio::test]
async fn zero_duration_output_is_overwritten() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    fs::write(&job.output, b"").unwrap();

    let mut h = Harness::new(
        ws.tool("vspipe", VSPIPE_OK),
        ws.tool("ffmpeg", FFMPEG_OK),
        Durations {
            output: 0.0,
            ..Durations::default()
        },
    );

    let outcome = h.controller.process(&input).await;

    assert_matches!(outcome, JobOutcome::Completed(_));
    assert_eq!(fs::read_to_string(&job.output).unwrap(), "frames");
}

#[tokio::test]
async fn encoder_failure_leaves_final_output_absent() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    let mut h = Harness::new(
        ws.tool("vspipe", VSPIPE_OK),
        ws.tool("ffmpeg", FFMPEG_FAIL),
        Durations::default(),
    );

    let outcome = h.controller.process(&input).await;

    let (status, tail) = match outcome {
        JobOutcome::Failed(PipelineError::EncoderFailure { status, tail }) => (status, tail),
        other => panic!("expected encoder failure, got {:?}", other),
    };
    assert_eq!(status.code(), Some(1));
    assert_eq!(tail.last().map(String::as_str), Some("Error while opening encoder"));
    assert_eq!(tail.len(), 2);

    assert!(!job.output.exists());
    assert!(!job.script.exists());
    assert!(h.processes.is_empty());
}

#[tokio::test]
async fn missing_generator_fails_and_cleans_up() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    let mut h = Harness::new(
        ws.path().join("bin/no-such-vspipe"),
        ws.tool("ffmpeg", FFMPEG_OK),
        Durations::default(),
    );

    let outcome = h.controller.process(&input).await;

    assert_matches!(
        outcome,
        JobOutcome::Failed(PipelineError::LaunchFailure {
            side: ProcessSide::Generator,
            ..
        })
    );
    assert!(!job.script.exists());
    assert!(!job.output.exists());
}

#[tokio::test]
async fn stale_artifacts_are_removed_before_running() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let stale = [
        "tape_temp_script.vpy",
        "tape_intermediate.mov",
        "tape.avi.lwi",
    ];
    for name in stale {
        fs::write(ws.path().join(name), b"stale").unwrap();
    }
    let unrelated = ws.input("other.avi");

    let mut h = Harness::new(
        ws.tool("vspipe", VSPIPE_OK),
        ws.tool("ffmpeg", FFMPEG_OK),
        Durations::default(),
    );
    let outcome = h.controller.process(&input).await;

    assert_matches!(outcome, JobOutcome::Completed(_));
    for name in stale {
        assert!(!ws.path().join(name).exists(), "{name} should be removed");
    }
    assert!(unrelated.exists());
}

#[tokio::test]
async fn drift_correction_reaches_encoder_arguments() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let h = Harness::new(
        ws.tool("vspipe", VSPIPE_OK),
        ws.tool("ffmpeg", FFMPEG_OK),
        Durations {
            audio: 10.02,
            ..Durations::default()
        },
    );

    let job = Job::new(&input, &EncodingConfig::default());
    let plan = h.controller.plan(&job).await.unwrap();
    assert!((plan.total_duration - 10.0).abs() < 1e-9);
    assert!(plan.drift.is_corrected());
    assert!((plan.drift.factor - 1.002).abs() < 1e-9);

    let (generator, encoder) = h.controller.commands(&job, &plan);
    assert_eq!(
        generator.args,
        vec![job.script.to_string_lossy().into_owned(), "-".to_string()]
    );
    let af = encoder.args.iter().position(|a| a == "-af").unwrap();
    assert_eq!(encoder.args[af + 1], "atempo=1.002000");
    assert_eq!(
        encoder.args.last().map(PathBuf::from),
        Some(job.temp_output.clone())
    );
}

#[tokio::test]
async fn generator_env_is_passed_through() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let mut config = Config::default();
    config
        .tools
        .generator_env
        .insert("AUTOVHS_FRAMES".to_string(), "from-env".to_string());

    let mut h = Harness::with_config(
        config,
        ws.tool("vspipe", "printf '%s' \"$AUTOVHS_FRAMES\""),
        ws.tool("ffmpeg", FFMPEG_OK),
        Durations::default(),
    );
    let outcome = h.controller.process(&input).await;

    let output = match outcome {
        JobOutcome::Completed(output) => output,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(fs::read_to_string(output).unwrap(), "from-env");
}

#[tokio::test]
async fn batch_continues_past_failures() {
    let ws = Workspace::new();
    let done = ws.input("a.avi");
    let skipped = ws.input("b.avi");
    fs::write(
        Job::new(&skipped, &EncodingConfig::default()).output,
        b"existing",
    )
    .unwrap();
    let missing = ws.path().join("c.avi");

    let mut h = Harness::new(
        ws.tool("vspipe", VSPIPE_OK),
        ws.tool("ffmpeg", FFMPEG_OK),
        Durations::default(),
    );
    let summary = h.controller.run_batch(&[missing, done, skipped]).await;

    assert_eq!(
        summary,
        BatchSummary {
            done: 1,
            skipped: 1,
            failed: 1
        }
    );
}

#[tokio::test]
async fn undecodable_generator_diagnostics_do_not_truncate_output() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    let mut h = Harness::new(
        ws.tool(
            "vspipe",
            "printf 'bad \\377 byte\\n' >&2; sleep 0.5; echo 'Output 250 frames' >&2; printf 'frames'",
        ),
        ws.tool("ffmpeg", FFMPEG_OK),
        Durations::default(),
    );

    let outcome = h.controller.process(&input).await;

    assert_matches!(outcome, JobOutcome::Completed(_));
    assert_eq!(fs::read_to_string(&job.output).unwrap(), "frames");
}

#[tokio::test]
async fn failed_commit_leaves_final_output_absent() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    let mut h = Harness::new(
        ws.tool("vspipe", VSPIPE_OK),
        ws.tool("ffmpeg", FFMPEG_NO_OUTPUT),
        Durations::default(),
    );

    let outcome = h.controller.process(&input).await;

    assert_matches!(
        outcome,
        JobOutcome::Failed(PipelineError::CommitFailure { ref to, .. }) if *to == job.output
    );
    assert!(!job.output.exists());
    assert!(!job.script.exists());
    assert!(h.processes.is_empty());
}

#[tokio::test]
async fn script_failure_fails_job_and_cleans_up() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    let marker = ws.path().join("launched");
    let mut h = Harness::new(
        ws.tool("vspipe", &format!("touch '{}'", marker.display())),
        ws.tool("ffmpeg", &format!("touch '{}'", marker.display())),
        Durations::default(),
    );
    h.scripts.fail();

    let outcome = h.controller.process(&input).await;

    assert_matches!(
        outcome,
        JobOutcome::Failed(PipelineError::Script { ref path, .. }) if *path == job.script
    );
    assert_eq!(h.scripts.calls(), 1);
    assert!(!job.script.exists());
    assert!(!job.output.exists());
    assert!(!marker.exists());
}

#[tokio::test]
async fn shutdown_during_encode_fails_the_job() {
    let ws = Workspace::new();
    let input = ws.input("tape.avi");
    let job = Job::new(&input, &EncodingConfig::default());
    let mut h = Harness::new(
        ws.tool("vspipe", VSPIPE_HANG),
        ws.tool("ffmpeg", FFMPEG_HANG),
        Durations::default(),
    );
    let processes = h.processes.clone();

    let sweep = async {
        wait_for_processes(&processes, 2).await;
        processes.shutdown(Duration::from_millis(200)).await
    };
    let (outcome, report) = tokio::time::timeout(Duration::from_secs(20), async {
        tokio::join!(h.controller.process(&input), sweep)
    })
    .await
    .expect("job should end after the sweep");

    assert_eq!(report.terminated, 2);
    assert_matches!(
        outcome,
        JobOutcome::Failed(PipelineError::EncoderFailure { ref status, .. }) if !status.success()
    );
    assert!(!job.output.exists());
    assert!(!job.script.exists());
    assert!(processes.is_empty());
    assert!(processes.is_shutting_down());
}
