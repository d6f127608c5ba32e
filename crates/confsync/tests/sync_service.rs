//! End-to-end tests of `ConfigSync` driven by in-process channel sources.

mod common;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use common::{assert_quiet, item_pipeline, recv, yaml, Item, TestHarness};
use confsync::source::SourceSink;
use confsync::{
    Action, ConfigFileChange, ConfigSync, NoticeKind, SourceDriver, SyncError,
};

#[test]
fn test_actions_follow_file_events_in_order() {
    let mut h = TestHarness::new();

    h.push(ConfigFileChange::add("a.yaml", yaml(&[("x", 1), ("y", 2)])));
    h.push(ConfigFileChange::update("a.yaml", yaml(&[("y", 3)])));
    h.push(ConfigFileChange::remove("a.yaml"));

    let kinds: Vec<(String, String)> = h
        .next_actions(5)
        .iter()
        .map(|a| (a.kind().to_string(), a.id().to_string()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("add".to_string(), "x".to_string()),
            ("add".to_string(), "y".to_string()),
            ("remove".to_string(), "x".to_string()),
            ("update".to_string(), "y".to_string()),
            ("remove".to_string(), "y".to_string()),
        ]
    );
    assert!(h.sync.current_state().is_empty());
}

#[test]
fn test_current_state_seeds_late_subscribers() {
    let mut h = TestHarness::new();
    h.push(ConfigFileChange::add("a.yaml", yaml(&[("x", 1)])));
    h.next_action();

    let mut late = h.sync.subscribe();
    let state = h.sync.current_state();
    assert_eq!(state["x"].item, Item::new("x", 1));
    assert_eq!(state["x"].filename, "a.yaml");
    assert_quiet(&h.rt, &mut late);

    h.push(ConfigFileChange::update("a.yaml", yaml(&[("x", 2)])));
    let action = recv(&h.rt, &mut late);
    assert!(matches!(action, Action::Update { ref id, .. } if id == "x"));
}

#[test]
fn test_invalid_file_reported_on_notice_channel() {
    let mut h = TestHarness::new();
    h.push(ConfigFileChange::add("a.yaml", yaml(&[("x", 1)])));
    h.next_action();

    h.push(ConfigFileChange::update("a.yaml", "id: x\nval: not-a-number\n"));
    let notice = h.next_notice();
    match notice.kind {
        NoticeKind::ValidationFailed { filename, details } => {
            assert_eq!(filename, "a.yaml");
            assert!(!details.is_empty());
        }
        other => panic!("unexpected notice {:?}", other),
    }
    h.assert_no_actions();
    assert_eq!(h.sync.current_state()["x"].item.val, 1);

    // A later valid version applies against the retained state.
    h.push(ConfigFileChange::update("a.yaml", yaml(&[("x", 4)])));
    assert!(matches!(h.next_action(), Action::Update { .. }));
}

#[test]
fn test_unchanged_content_is_not_reported() {
    let mut h = TestHarness::new();
    let content = yaml(&[("x", 1)]);
    h.push(ConfigFileChange::add("a.yaml", content.clone()));
    h.next_action();

    h.push(ConfigFileChange::update("a.yaml", content));
    h.assert_no_actions();
}

#[test]
fn test_moved_between_files() {
    let mut h = TestHarness::new();
    h.push(ConfigFileChange::add("b.yaml", yaml(&[("y", 7)])));
    h.next_action();

    h.push(ConfigFileChange::add("c.yaml", yaml(&[("y", 7)])));
    h.push(ConfigFileChange::remove("b.yaml"));

    match h.next_action() {
        Action::Moved { id, set } => {
            assert_eq!(id, "y");
            assert_eq!(set.filename, "c.yaml");
        }
        other => panic!("unexpected action {:?}", other),
    }
    h.assert_no_actions();

    match h.next_notice().kind {
        NoticeKind::IdentityReassigned(r) => {
            assert_eq!(r.previous_filename, "b.yaml");
            assert_eq!(r.filename, "c.yaml");
        }
        other => panic!("unexpected notice {:?}", other),
    }
}

#[test]
fn test_multiple_sources_qualify_filenames() {
    let mut h = TestHarness::with_sources(&["left", "right"]);

    h.push_to(0, ConfigFileChange::add("a.yaml", yaml(&[("x", 1)])));
    h.push_to(1, ConfigFileChange::add("a.yaml", yaml(&[("y", 2)])));
    h.next_actions(2);

    let state = h.sync.current_state();
    assert_eq!(state["x"].filename, "left:a.yaml");
    assert_eq!(state["y"].filename, "right:a.yaml");

    h.push_to(1, ConfigFileChange::remove("a.yaml"));
    assert_eq!(h.next_action(), Action::Remove { id: "y".to_string() });
    assert!(h.sync.current_state().contains_key("x"));
}

#[test]
fn test_start_is_idempotent() {
    let h = TestHarness::new();
    assert!(h.sync.is_running());
    h.sync.start().unwrap();
    assert!(h.sync.is_running());
}

#[test]
fn test_stop_is_idempotent_and_final() {
    let h = TestHarness::new();
    h.sync.stop();
    h.sync.stop();
    assert!(!h.sync.is_running());

    h.sync.wait().unwrap();
    h.sync.wait().unwrap();
    assert!(h.sync.current_state().is_empty());
    assert!(matches!(h.sync.start(), Err(SyncError::AlreadyStopped)));
}

#[test]
fn test_no_actions_after_stop() {
    let mut h = TestHarness::new();
    h.push(ConfigFileChange::add("a.yaml", yaml(&[("x", 1)])));
    h.next_action();

    h.sync.stop();
    h.sync.wait().unwrap();

    let _ = h.senders[0].send(ConfigFileChange::add("b.yaml", yaml(&[("y", 1)])));
    h.assert_no_actions();
    assert!(h.sync.current_state().is_empty());
}

#[test]
fn test_stop_before_start() {
    let (driver, _sender) = confsync::ChannelSourceDriver::new("push");
    let sync = ConfigSync::new(item_pipeline(), vec![Box::new(driver)]);
    sync.stop();
    assert!(matches!(sync.start(), Err(SyncError::AlreadyStopped)));
    sync.wait().unwrap();
}

/// A driver that gives up immediately.
struct BrokenDriver;

#[async_trait]
impl SourceDriver for BrokenDriver {
    fn name(&self) -> String {
        "broken".to_string()
    }

    async fn run(&mut self, _sink: SourceSink, _shutdown: watch::Receiver<bool>) -> confsync::Result<()> {
        Err(SyncError::SourceExhausted {
            source_name: "broken".to_string(),
            attempts: 3,
            message: "connection refused".to_string(),
        })
    }
}

#[test]
fn test_terminal_source_failure_is_surfaced() {
    let (driver, sender) = confsync::ChannelSourceDriver::new("push");
    let drivers: Vec<Box<dyn SourceDriver>> = vec![Box::new(driver), Box::new(BrokenDriver)];
    let sync = ConfigSync::new(item_pipeline(), drivers);
    let mut notices = sync.subscribe_notices();
    let mut actions = sync.subscribe();
    sync.start().unwrap();

    let rt = tokio::runtime::Runtime::new().unwrap();
    match recv(&rt, &mut notices).kind {
        NoticeKind::SourceFailed { source, message } => {
            assert_eq!(source, "broken");
            assert!(message.contains("connection refused"));
        }
        other => panic!("unexpected notice {:?}", other),
    }

    // The healthy source keeps working.
    assert!(sync.is_running());
    sender
        .send(ConfigFileChange::add("a.yaml", yaml(&[("x", 1)])))
        .unwrap();
    let action = recv(&rt, &mut actions);
    assert_eq!(action.config_set().unwrap().filename, "push:a.yaml");

    sync.stop();
    sync.wait().unwrap();
}

#[test]
fn test_state_kept_when_every_source_ends() {
    let (driver, sender) = confsync::ChannelSourceDriver::new("push");
    let sync = ConfigSync::new(item_pipeline(), vec![Box::new(driver)]);
    let mut actions = sync.subscribe();
    sync.start().unwrap();

    let rt = tokio::runtime::Runtime::new().unwrap();
    sender
        .send(ConfigFileChange::add("a.yaml", yaml(&[("x", 1)])))
        .unwrap();
    recv(&rt, &mut actions);
    drop(sender);

    std::thread::sleep(Duration::from_millis(200));
    assert!(sync.is_running());
    assert!(sync.current_state().contains_key("x"));

    sync.stop();
    sync.wait().unwrap();
}
