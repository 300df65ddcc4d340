//! FSM unit tests

use stackpilot::deploy::fsm::{StatusEvent, StatusFsm};
use stackpilot::models::deployment::ResourceStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = StatusFsm::new();
    assert_eq!(fsm.state(), ResourceStatus::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.is_failed());
}

#[test]
fn test_fsm_pipeline_flow() {
    let mut fsm = StatusFsm::new();

    for line in [None, Some("PRE-DEPLOY: ok"), Some("COMPILED: api-shop:2"), Some("STARTED: api-shop-2")] {
        let event = StatusEvent::Progress(line.map(str::to_string));
        assert_eq!(fsm.process(&event).unwrap(), ResourceStatus::Processing);
    }

    assert_eq!(fsm.process(&StatusEvent::Succeed).unwrap(), ResourceStatus::Success);
}

#[test]
fn test_fsm_failure_flow() {
    let mut fsm = StatusFsm::new();

    fsm.process(&StatusEvent::Progress(None)).unwrap();
    fsm.process(&StatusEvent::Fail("pipeline panicked".to_string())).unwrap();

    assert_eq!(fsm.state(), ResourceStatus::Failed);
    assert_eq!(fsm.error(), Some("pipeline panicked"));
    assert!(fsm.is_failed());

    assert_eq!(fsm.process(&StatusEvent::Rollback).unwrap(), ResourceStatus::Rollback);
    // Re-running compensation is allowed
    assert_eq!(fsm.process(&StatusEvent::Rollback).unwrap(), ResourceStatus::Rollback);
    assert!(!fsm.is_failed());
}

#[test]
fn test_fsm_error_straight_from_pending() {
    let mut fsm = StatusFsm::new();
    fsm.process(&StatusEvent::Error("context missing".to_string())).unwrap();
    assert_eq!(fsm.state(), ResourceStatus::Error);
}

#[test]
fn test_fsm_cannot_succeed_without_progress() {
    let mut fsm = StatusFsm::new();
    assert!(fsm.process(&StatusEvent::Succeed).is_err());
    assert_eq!(fsm.state(), ResourceStatus::Pending);
}

#[test]
fn test_fsm_resumed_skip_is_terminal() {
    let mut fsm = StatusFsm::from_state(ResourceStatus::Skipped);
    assert!(fsm.process(&StatusEvent::Progress(None)).is_err());
    assert!(fsm.process(&StatusEvent::Rollback).is_err());
    assert_eq!(fsm.state(), ResourceStatus::Skipped);
}

#[test]
fn test_event_log_lines() {
    assert_eq!(StatusEvent::Progress(None).log_line(), None);
    assert_eq!(
        StatusEvent::Progress(Some("COMPILED: x".into())).log_line(),
        Some("COMPILED: x")
    );
    assert_eq!(StatusEvent::Error("boom".into()).log_line(), Some("boom"));
    assert_eq!(StatusEvent::Rollback.log_line(), None);
    assert_eq!(StatusEvent::Skip.target(), ResourceStatus::Skipped);
}
