//! Integration tests for the session lifecycle driver.
//!
//! Runs start, ping, update, and stop against the in-memory worker and
//! checks registry state, rollback on failure, and shutdown escalation.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use graph_conductor::models::command::{WorkerCommand, UPDATE_QUERYING_COLLECTION};
use graph_conductor::models::request::StartRequest;
use graph_conductor::models::session::SessionState;
use graph_conductor::AppError;
use serde_json::Value;

use super::test_helpers::{build_manager, config_files, test_settings, FakeWorker};

fn english(channel: &str) -> StartRequest {
    StartRequest {
        asr_language: "en-US".into(),
        ..StartRequest::for_channel(channel)
    }
}

fn read_config(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).expect("read config")).expect("json")
}

fn node_property<'a>(doc: &'a Value, graph: &str, node: &str, property: &str) -> &'a Value {
    doc["rte"]["predefined_graphs"]
        .as_array()
        .expect("graphs")
        .iter()
        .find(|g| g["name"] == graph)
        .and_then(|g| g["nodes"].as_array())
        .and_then(|nodes| nodes.iter().find(|n| n["name"] == node))
        .map(|n| &n["property"][property])
        .expect("node present")
}

#[tokio::test]
async fn start_registers_running_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );

    let info = manager.start(english("room-1")).await.expect("start");

    assert_eq!(info.channel_name, "room-1");
    assert_eq!(info.graph_name, "va.openai.azure");
    assert_eq!(info.state, SessionState::Running);
    assert_eq!(info.created_at, info.last_heartbeat_at);
    assert!((10000..=30000).contains(&info.http_port));
    assert_eq!(manager.registry().len(), 1);
    assert_eq!(worker.launches.load(Ordering::SeqCst), 1);

    let session = manager.registry().get("room-1").expect("live session");
    let doc = read_config(session.config_path());
    assert_eq!(
        node_property(&doc, "va.openai.azure", "agora_rtc", "channel"),
        "room-1"
    );
    assert_eq!(
        node_property(&doc, "va.openai.azure", "http_server", "listen_port"),
        &Value::from(info.http_port)
    );
    let token = node_property(&doc, "va.openai.azure", "agora_rtc", "token")
        .as_str()
        .expect("token string");
    assert!(token.starts_with("007"), "subscriber token embedded: {token}");

    let launched = worker.launched.lock().expect("lock");
    assert_eq!(launched[0].config_path, session.config_path());
    assert_eq!(launched[0].callback_port, info.http_port);
}

#[tokio::test]
async fn blank_channel_is_rejected_before_admission() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );

    let err = manager.start(english("   ")).await.expect_err("blank channel");
    assert!(matches!(err, AppError::Validation(_)));
    assert!(manager.registry().is_empty());
    assert_eq!(worker.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn workers_limit_frees_up_after_stop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = build_manager(
        temp.path(),
        FakeWorker::new(),
        test_settings(1, Duration::from_secs(1)),
    );

    manager.start(english("a")).await.expect("first start");
    let err = manager.start(english("b")).await.expect_err("limit");
    assert!(matches!(err, AppError::WorkersLimit(_)));
    assert!(err.is_admission_rejection());
    assert!(!manager.registry().contains("b"));

    manager.stop("a").await.expect("stop a");
    manager.start(english("b")).await.expect("start b after stop");
    assert_eq!(manager.registry().len(), 1);
}

#[tokio::test]
async fn duplicate_start_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = build_manager(
        temp.path(),
        FakeWorker::new(),
        test_settings(5, Duration::from_secs(1)),
    );

    manager.start(english("dup")).await.expect("first start");
    let err = manager.start(english("dup")).await.expect_err("duplicate");
    assert!(matches!(err, AppError::ChannelExists(_)));
    assert_eq!(manager.registry().len(), 1);
}

#[tokio::test]
async fn concurrent_starts_for_one_channel_admit_exactly_one() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new().with_launch_delay(Duration::from_millis(50));
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );

    let (first, second) = tokio::join!(manager.start(english("race")), manager.start(english("race")));

    let outcomes = [first, second];
    let ok = outcomes.iter().filter(|r| r.is_ok()).count();
    let exists = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AppError::ChannelExists(_))))
        .count();
    assert_eq!((ok, exists), (1, 1));
    assert_eq!(worker.launches.load(Ordering::SeqCst), 1);
    assert_eq!(manager.registry().len(), 1);
}

#[tokio::test]
async fn channel_is_reserved_while_launch_is_in_flight() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new().with_launch_delay(Duration::from_millis(200));
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );

    let starter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start(english("slow")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(manager.registry().state("slow"), Some(SessionState::Starting));
    assert!(manager.registry().get("slow").is_none());
    let err = manager.stop("slow").await.expect_err("not yet running");
    assert!(matches!(err, AppError::ChannelNotFound(_)));

    starter.await.expect("join").expect("start");
    assert_eq!(manager.registry().state("slow"), Some(SessionState::Running));
}

#[tokio::test]
async fn launch_failure_rolls_back_reservation_and_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    worker.fail_launch.store(true, Ordering::SeqCst);
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );

    let err = manager.start(english("boom")).await.expect_err("launch fails");
    assert!(matches!(err, AppError::WorkerLaunch(_)));
    assert!(manager.registry().is_empty());
    assert!(config_files(&temp.path().join("work")).is_empty());

    worker.fail_launch.store(false, Ordering::SeqCst);
    manager.start(english("boom")).await.expect("retry succeeds");
}

#[tokio::test]
async fn unknown_graph_rolls_back_without_launch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );

    let mut request = english("lost");
    request.graph_name = "va.missing".into();
    let err = manager.start(request).await.expect_err("unknown graph");
    assert!(matches!(err, AppError::GraphNotFound(_)));
    assert!(manager.registry().is_empty());
    assert_eq!(worker.launches.load(Ordering::SeqCst), 0);

    let mut request = StartRequest::for_channel("lost");
    request.asr_language = "fr-FR".into();
    let err = manager.start(request).await.expect_err("unmapped language");
    assert!(matches!(err, AppError::GraphNotFound(_)));
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn profile_seeds_prompt_and_voice() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = build_manager(
        temp.path(),
        FakeWorker::new(),
        test_settings(5, Duration::from_secs(1)),
    );

    let mut request = english("vip");
    request.customer_id = "c-1".into();
    manager.start(request).await.expect("start");

    let session = manager.registry().get("vip").expect("live");
    let doc = read_config(session.config_path());
    assert_eq!(
        node_property(&doc, "va.openai.azure", "openai_chatgpt", "prompt"),
        "You are helping Ada."
    );
    assert_eq!(
        node_property(&doc, "va.openai.azure", "azure_tts", "azure_synthesis_voice_name"),
        "en-US-BrianNeural"
    );
}

#[tokio::test]
async fn explicit_voice_type_wins_over_profile() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = build_manager(
        temp.path(),
        FakeWorker::new(),
        test_settings(5, Duration::from_secs(1)),
    );

    let mut request = english("picky");
    request.customer_id = "c-1".into();
    request.voice_type = "female".into();
    manager.start(request).await.expect("start");

    let session = manager.registry().get("picky").expect("live");
    let doc = read_config(session.config_path());
    assert_eq!(
        node_property(&doc, "va.openai.azure", "azure_tts", "azure_synthesis_voice_name"),
        "en-US-JaneNeural"
    );
}

#[tokio::test]
async fn ping_advances_heartbeat_monotonically() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = build_manager(
        temp.path(),
        FakeWorker::new(),
        test_settings(5, Duration::from_secs(1)),
    );
    let info = manager.start(english("beat")).await.expect("start");

    let later = info.created_at + 30;
    let pinged = manager.ping("beat", later).expect("ping");
    assert_eq!(pinged.last_heartbeat_at, later);

    let stale = manager.ping("beat", later - 10).expect("late ping");
    assert_eq!(stale.last_heartbeat_at, later);

    let err = manager.ping("ghost", later).expect_err("unknown");
    assert!(matches!(err, AppError::ChannelNotFound(_)));
    let err = manager.ping("", later).expect_err("blank");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn graceful_stop_removes_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );
    manager.start(english("bye")).await.expect("start");

    manager.stop("bye").await.expect("stop");

    assert!(manager.registry().is_empty());
    assert_eq!(worker.signals.load(Ordering::SeqCst), 1);
    assert_eq!(worker.force_kills.load(Ordering::SeqCst), 0);

    let err = manager.stop("bye").await.expect_err("second stop");
    assert!(matches!(err, AppError::ChannelNotFound(_)));
}

#[tokio::test]
async fn stop_escalates_to_forced_termination_after_grace() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    worker.ignore_signal.store(true, Ordering::SeqCst);
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_millis(100)),
    );
    manager.start(english("stubborn")).await.expect("start");

    let started = std::time::Instant::now();
    manager.stop("stubborn").await.expect("stop");

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(worker.force_kills.load(Ordering::SeqCst), 1);
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn concurrent_stop_reports_busy() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    worker.ignore_signal.store(true, Ordering::SeqCst);
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_millis(200)),
    );
    manager.start(english("twice")).await.expect("start");

    let (first, second) = tokio::join!(manager.stop("twice"), manager.stop("twice"));

    assert!(first.is_ok());
    assert!(matches!(second, Err(AppError::ChannelBusy(_))));
    assert_eq!(worker.signals.load(Ordering::SeqCst), 1);
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn abandoned_stop_still_frees_the_channel() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    worker.ignore_signal.store(true, Ordering::SeqCst);
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(1, Duration::from_millis(200)),
    );
    manager.start(english("room-a")).await.expect("start");

    let abandoned = tokio::time::timeout(Duration::from_millis(50), manager.stop("room-a")).await;
    assert!(abandoned.is_err(), "caller gives up before the grace period ends");

    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while manager.registry().contains("room-a") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "teardown finishes without its caller");
    assert_eq!(worker.force_kills.load(Ordering::SeqCst), 1);

    manager.start(english("room-a")).await.expect("channel re-admitted");
    assert_eq!(manager.registry().state("room-a"), Some(SessionState::Running));
}

#[tokio::test]
async fn failed_signal_keeps_session_running() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    worker.fail_signal.store(true, Ordering::SeqCst);
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );
    manager.start(english("sticky")).await.expect("start");

    let err = manager.stop("sticky").await.expect_err("signal fails");
    assert!(matches!(err, AppError::WorkerCommand(_)));
    assert_eq!(manager.registry().state("sticky"), Some(SessionState::Running));

    worker.fail_signal.store(false, Ordering::SeqCst);
    manager.stop("sticky").await.expect("retry stop");
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn update_forwards_command_to_running_worker() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new();
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );
    manager.start(english("docs")).await.expect("start");

    let command = WorkerCommand::update_querying_collection("req-1", "docs", "a1b2", "manual.pdf");
    manager.update("docs", &command).await.expect("update");

    let sent = worker.commands.lock().expect("lock").clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].rte.name, UPDATE_QUERYING_COLLECTION);
    assert_eq!(sent[0].collection.as_deref(), Some("a1b2"));

    let err = manager.update("nobody", &command).await.expect_err("unknown");
    assert!(matches!(err, AppError::ChannelNotFound(_)));

    worker.fail_command.store(true, Ordering::SeqCst);
    let err = manager.update("docs", &command).await.expect_err("delivery fails");
    assert!(matches!(err, AppError::WorkerCommand(_)));
    assert_eq!(manager.registry().state("docs"), Some(SessionState::Running));
}

#[tokio::test]
async fn slow_update_does_not_delay_stop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let worker = FakeWorker::new().with_command_delay(Duration::from_secs(1));
    let manager = build_manager(
        temp.path(),
        Arc::clone(&worker),
        test_settings(5, Duration::from_secs(1)),
    );
    manager.start(english("docs")).await.expect("start");

    let updater = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let command =
                WorkerCommand::update_querying_collection("req-1", "docs", "a1b2", "manual.pdf");
            manager.update("docs", &command).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_millis(500), manager.stop("docs"))
        .await
        .expect("stop is not blocked by the in-flight command")
        .expect("stop");
    assert!(manager.registry().is_empty());

    updater.await.expect("join").expect("update delivered");
}

#[tokio::test]
async fn stop_all_drains_registry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = build_manager(
        temp.path(),
        FakeWorker::new(),
        test_settings(5, Duration::from_secs(1)),
    );
    for channel in ["a", "b", "c"] {
        manager.start(english(channel)).await.expect("start");
    }

    assert_eq!(manager.stop_all().await, 0);
    assert!(manager.registry().is_empty());
    assert!(manager.list().is_empty());
}
