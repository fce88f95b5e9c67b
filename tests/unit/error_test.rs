//! Tests for error types

use session_agenda::core::{RunStage, SchedulerError};

#[test]
fn test_duplicate_reservation_error() {
    let err = SchedulerError::DuplicateReservation(42);
    assert_eq!(format!("{}", err), "reservation 42 already exists");
    assert_eq!(err.class(), "configuration");
}

#[test]
fn test_unsupported_stage_error_names_stage() {
    let err = SchedulerError::UnsupportedConstraintStage(RunStage::Ready);
    assert!(err.to_string().contains(&RunStage::Ready.to_string()));
}

#[test]
fn test_admission_errors_carry_resource_id() {
    let exhausted = SchedulerError::ResourceExhausted {
        id: 4,
        requested: 2,
        available: 1,
    };
    assert_eq!(exhausted.resource_id(), Some(4));
    assert_eq!(exhausted.class(), "policy");
    assert_eq!(
        SchedulerError::UnknownResource("17".into()).resource_id(),
        Some(17)
    );
    assert_eq!(
        SchedulerError::UnknownResource("/dev/valve".into()).resource_id(),
        None
    );
    assert_eq!(SchedulerError::InvalidSession(3).resource_id(), None);
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
    assert_eq!(err.class(), "io");
}

#[test]
fn test_io_error_converts_to_backend() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: SchedulerError = io.into();
    assert!(matches!(err, SchedulerError::Backend(msg) if msg.contains("missing")));
}
