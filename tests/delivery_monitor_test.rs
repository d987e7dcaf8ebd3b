//! Monitor runs over projects put under delivery by hand.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{FakeGateway, ProjectFixture};
use delivery_core::config::MonitorConfig;
use delivery_core::error::DeliveryError;
use delivery_core::gateway::TransferStatus;
use delivery_core::orchestration::{DeliveryMonitor, MonitorOutcome};
use delivery_core::state_machine::DeliveryState;

fn monitor(fixture: &ProjectFixture, gateway: &Arc<FakeGateway>, max_hours: u64) -> DeliveryMonitor {
    DeliveryMonitor::new(
        fixture.bookkeeping(),
        gateway.clone(),
        fixture.paths(),
        Duration::from_millis(1),
        Duration::from_secs(max_hours * 3600),
    )
}

fn project_under_delivery() -> ProjectFixture {
    let fixture = ProjectFixture::new("P1");
    fixture
        .add_sample_record("S1", DeliveryState::InProgress)
        .add_sample_record("S2", DeliveryState::InProgress)
        .add_sample_record("S3", DeliveryState::Delivered)
        .add_aborted_sample("S4")
        .set_project_delivery("TKN-0001", Some(Utc::now()));
    fixture
}

#[tokio::test]
async fn test_delivered_transfer_completes_project() {
    let fixture = project_under_delivery();
    let gateway = Arc::new(
        FakeGateway::new().with_probes([TransferStatus::Accepted, TransferStatus::InProgress, TransferStatus::Delivered]),
    );
    let monitor = monitor(&fixture, &gateway, 168);

    let outcome = monitor.monitor_project("P1").await.unwrap();

    assert_eq!(
        outcome,
        MonitorOutcome::Completed {
            outcome: DeliveryState::Delivered,
            project_state: DeliveryState::Delivered,
        }
    );
    assert_eq!(gateway.probes(), 3);
    assert_eq!(fixture.sample_state("S1"), DeliveryState::Delivered);
    assert_eq!(fixture.sample_state("S2"), DeliveryState::Delivered);
    assert!(fixture.sample("S4").is_aborted());

    let project = fixture.project();
    assert!(!project.delivery.delivery_token.is_live());
    assert_eq!(project.delivery.delivery_status, Some(DeliveryState::Delivered));

    // A second run finds nothing to do
    let again = monitor.monitor_project("P1").await.unwrap();
    assert_eq!(again, MonitorOutcome::NotUnderDelivery(DeliveryState::Delivered));
    assert_eq!(gateway.probes(), 3);
}

#[tokio::test]
async fn test_delivered_with_remaining_hard_stage_fails() {
    let fixture = project_under_delivery();
    fixture.add_project_delivery_project("delivery00042");
    fs::create_dir_all(fixture.hard_root().join("S1")).unwrap();
    let gateway = Arc::new(FakeGateway::new().with_probes([TransferStatus::Delivered]));

    let outcome = monitor(&fixture, &gateway, 168)
        .monitor_project("P1")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MonitorOutcome::Completed {
            outcome: DeliveryState::Failed,
            project_state: DeliveryState::Partial,
        }
    );
    assert_eq!(fixture.sample_state("S1"), DeliveryState::Failed);
    assert_eq!(fixture.sample_state("S2"), DeliveryState::Failed);
    assert_eq!(fixture.sample_state("S3"), DeliveryState::Delivered);
    assert!(!fixture.project().delivery.delivery_token.is_live());
}

#[tokio::test]
async fn test_delivery_past_ceiling_fails_after_one_probe() {
    let fixture = project_under_delivery();
    fixture.set_project_delivery("TKN-0001", Some(Utc::now() - ChronoDuration::hours(10)));
    let gateway = Arc::new(FakeGateway::new().with_probe_fallback(TransferStatus::InProgress));

    let outcome = monitor(&fixture, &gateway, 1)
        .monitor_project("P1")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MonitorOutcome::Completed {
            outcome: DeliveryState::Failed,
            project_state: DeliveryState::NotDelivered,
        }
    );
    assert_eq!(gateway.probes(), 1);
    assert_eq!(fixture.sample_state("S1"), DeliveryState::Failed);
    assert!(!fixture.project().delivery.delivery_token.is_live());
}

#[tokio::test]
async fn test_failed_status_keeps_polling() {
    let fixture = project_under_delivery();
    let gateway = Arc::new(FakeGateway::new().with_probes([
        TransferStatus::Failed,
        TransferStatus::Unknown("Paused".to_string()),
        TransferStatus::Delivered,
    ]));

    let outcome = monitor(&fixture, &gateway, 168)
        .monitor_project("P1")
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        MonitorOutcome::Completed {
            outcome: DeliveryState::Delivered,
            ..
        }
    ));
    assert_eq!(gateway.probes(), 3);
}

#[tokio::test]
async fn test_project_without_token_is_not_polled() {
    let fixture = ProjectFixture::new("P1");
    fixture.add_sample_record("S1", DeliveryState::Staged);
    let gateway = Arc::new(FakeGateway::new());

    let outcome = monitor(&fixture, &gateway, 168)
        .monitor_project("P1")
        .await
        .unwrap();

    assert_eq!(outcome, MonitorOutcome::NotUnderDelivery(DeliveryState::NotDelivered));
    assert_eq!(gateway.probes(), 0);
    assert_eq!(fixture.sample_state("S1"), DeliveryState::Staged);
}

#[tokio::test]
async fn test_probe_error_leaves_delivery_untouched() {
    let fixture = project_under_delivery();
    let gateway = Arc::new(FakeGateway::new().with_probe_error("dds status exited with 2"));

    let result = monitor(&fixture, &gateway, 168).monitor_project("P1").await;

    match result {
        Err(e @ DeliveryError::ToolInvocationError(_)) => assert!(e.is_tool_failure()),
        other => panic!("expected tool failure, got {other:?}"),
    }
    assert_eq!(fixture.project().delivery.delivery_token.as_str(), "TKN-0001");
    assert_eq!(fixture.sample_state("S1"), DeliveryState::InProgress);
}

#[tokio::test]
async fn test_incompatible_version_stops_before_polling() {
    let fixture = project_under_delivery();
    let gateway = Arc::new(FakeGateway::new().with_incompatible_version("0.8.0"));

    let result = monitor(&fixture, &gateway, 168).monitor_project("P1").await;

    assert!(matches!(result, Err(DeliveryError::IncompatibleToolVersion { .. })));
    assert_eq!(gateway.probes(), 0);
    assert!(fixture.project().delivery.delivery_token.is_live());
}

#[tokio::test]
async fn test_failed_sample_write_blocks_project_completion() {
    let fixture = project_under_delivery();
    fixture.metadata.fail_writes_for_sample("S2");
    let gateway = Arc::new(FakeGateway::new().with_probes([TransferStatus::Delivered]));

    let outcome = monitor(&fixture, &gateway, 168)
        .monitor_project("P1")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MonitorOutcome::Completed {
            outcome: DeliveryState::Delivered,
            project_state: DeliveryState::NotDelivered,
        }
    );
    assert_eq!(fixture.sample_state("S1"), DeliveryState::Delivered);
    assert_eq!(fixture.sample_state("S2"), DeliveryState::InProgress);
    assert!(!fixture.project().delivery.delivery_token.is_live());
}

#[tokio::test]
async fn test_failed_transfer_never_completes_project() {
    let fixture = ProjectFixture::new("P1");
    fixture
        .add_sample_record("S1", DeliveryState::Delivered)
        .add_aborted_sample("S2")
        .set_project_delivery("TKN-0001", Some(Utc::now() - ChronoDuration::hours(10)));
    let gateway = Arc::new(FakeGateway::new().with_probe_fallback(TransferStatus::InProgress));

    let outcome = monitor(&fixture, &gateway, 1)
        .monitor_project("P1")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MonitorOutcome::Completed {
            outcome: DeliveryState::Failed,
            project_state: DeliveryState::NotDelivered,
        }
    );
    assert_ne!(fixture.project().delivery.delivery_status, Some(DeliveryState::Delivered));
    assert_eq!(fixture.sample_state("S1"), DeliveryState::Delivered);
    assert!(!fixture.project().delivery.delivery_token.is_live());
}

#[tokio::test]
async fn test_delivered_without_in_progress_samples_completes_project() {
    let fixture = ProjectFixture::new("P1");
    fixture
        .add_sample_record("S1", DeliveryState::Delivered)
        .add_aborted_sample("S2")
        .set_project_delivery("TKN-0001", Some(Utc::now()));
    let gateway = Arc::new(FakeGateway::new().with_probes([TransferStatus::Delivered]));

    let outcome = monitor(&fixture, &gateway, 168)
        .monitor_project("P1")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MonitorOutcome::Completed {
            outcome: DeliveryState::Delivered,
            project_state: DeliveryState::Delivered,
        }
    );
}

#[tokio::test]
async fn test_project_without_samples_is_not_completed() {
    let fixture = ProjectFixture::new("P1");
    fixture.set_project_delivery("TKN-0001", Some(Utc::now()));
    let gateway = Arc::new(FakeGateway::new().with_probes([TransferStatus::Delivered]));

    let outcome = monitor(&fixture, &gateway, 168)
        .monitor_project("P1")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MonitorOutcome::Completed {
            outcome: DeliveryState::Delivered,
            project_state: DeliveryState::NotDelivered,
        }
    );
    assert_eq!(fixture.project().delivery.delivery_status, None);
}

#[test]
fn test_monitor_requires_explicit_ceiling() {
    let fixture = ProjectFixture::new("P1");
    let gateway = Arc::new(FakeGateway::new());
    let config = MonitorConfig {
        poll_interval_secs: 900,
        max_delivery_hours: None,
    };

    let result = DeliveryMonitor::from_config(fixture.bookkeeping(), gateway, fixture.paths(), &config);

    match result {
        Err(DeliveryError::ConfigurationError(message)) => {
            assert!(message.contains("168"));
            assert!(message.contains("48"));
        }
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("monitor built without a ceiling"),
    }
}
