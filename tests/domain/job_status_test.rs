use murmur::domain::JobStatus;

#[test]
fn given_terminal_statuses_when_checked_then_are_terminal() {
    assert!(JobStatus::Done.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
    assert!(JobStatus::Cancelled.is_terminal());
    assert!(!JobStatus::Queued.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
}

#[test]
fn given_queued_job_when_transitioning_then_only_running_failed_or_cancelled_allowed() {
    assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
    assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
    assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
    assert!(!JobStatus::Queued.can_transition_to(JobStatus::Done));
}

#[test]
fn given_terminal_job_when_transitioning_then_rejected() {
    for terminal in [JobStatus::Done, JobStatus::Failed, JobStatus::Cancelled] {
        for next in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
        }
    }
}

#[test]
fn given_status_string_when_parsing_then_matches_display() {
    let status: JobStatus = "cancelled".parse().unwrap();

    assert_eq!(status, JobStatus::Cancelled);
    assert_eq!(status.to_string(), "cancelled");
    assert!("paused".parse::<JobStatus>().is_err());
}
