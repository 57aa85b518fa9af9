use std::time::Duration;

use graph_conductor::models::session::{Session, SessionInfo, SessionState};
use graph_conductor::worker::{LaunchSpec, WorkerHandle};

fn make_session(now: i64) -> Session {
    let launch = LaunchSpec {
        channel_name: "room".into(),
        config_path: "/work/property-x.json".into(),
        log_path: "/work/app-x.log".into(),
        callback_port: 12345,
    };
    Session::new(
        &launch,
        "va.qwen.cosy".into(),
        WorkerHandle::detached(12345, Some(42)),
        Duration::from_secs(3),
        now,
    )
}

#[test]
fn new_session_starts_running_with_fresh_heartbeat() {
    let session = make_session(1_000);

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.created_at(), 1_000);
    assert_eq!(session.last_heartbeat_at(), 1_000);
    assert_eq!(session.http_port(), 12345);
    assert_eq!(session.graph_name(), "va.qwen.cosy");
    assert_eq!(session.config_path().to_str(), Some("/work/property-x.json"));
    assert_eq!(session.log_path().to_str(), Some("/work/app-x.log"));
    assert_eq!(session.quit_timeout(), Duration::from_secs(3));
}

#[test]
fn touch_is_monotonic() {
    let session = make_session(1_000);

    assert_eq!(session.touch(1_010), 1_010);
    assert_eq!(session.touch(1_005), 1_010);
    assert_eq!(session.last_heartbeat_at(), 1_010);
    assert_eq!(session.heartbeat_age(1_070), 60);
}

#[test]
fn info_serializes_state_in_snake_case() {
    let session = make_session(7);
    let info = session.info();

    assert_eq!(
        info,
        SessionInfo {
            channel_name: "room".into(),
            graph_name: "va.qwen.cosy".into(),
            http_port: 12345,
            created_at: 7,
            last_heartbeat_at: 7,
            state: SessionState::Running,
        }
    );
    let json = serde_json::to_value(&info).expect("serialize");
    assert_eq!(json["state"], "running");
}

#[test]
fn detached_handle_exposes_port_and_pid() {
    let mut handle = WorkerHandle::detached(9000, Some(77));
    assert_eq!(handle.callback_port(), 9000);
    assert_eq!(handle.pid(), Some(77));
    assert!(handle.child_mut().is_none());
}
