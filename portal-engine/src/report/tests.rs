// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use portal_core::test_utils::{ManualClock, setup_logging};
use portal_core::{EntityId, Timestamp};
use portal_store::{MemoryStore, RecordStore, SqliteStore};

use crate::caller::Caller;
use crate::error::PortalError;
use crate::report::{ReportDrafts, ReportPeriod, ReportStatus, Section};

const T0: Timestamp = Timestamp::new(1_700_000_000_000);

fn author() -> Caller {
    Caller::new("erin", "Erin")
}

fn q3() -> ReportPeriod {
    ReportPeriod::new(2025, 3)
}

async fn drafts_are_continued<S>(store: S)
where
    S: RecordStore,
{
    let clock = ManualClock::new(T0);
    let reports = ReportDrafts::new(store, Arc::new(clock.clone()));

    let first = reports
        .save_draft(&author(), q3(), vec![Section::new("Summary", "tbd")])
        .await
        .unwrap();
    assert_eq!(first.record.status, ReportStatus::Draft);
    assert_eq!(first.record.created_at, T0);

    clock.advance(Duration::from_secs(600));
    let second = reports
        .save_draft(
            &author(),
            q3(),
            vec![
                Section::new("Summary", "Revenue grew."),
                Section::new("Risks", "Supply chain."),
            ],
        )
        .await
        .unwrap();

    // Same report, new version, original creation time.
    assert_eq!(second.entity_id, first.entity_id);
    assert_eq!(second.revisions, 2);
    assert_eq!(second.record.created_at, T0);
    assert_eq!(second.record.updated_at, T0 + Duration::from_secs(600));
    assert_eq!(second.record.sections.len(), 2);

    let loaded = reports.draft(&author(), q3()).await.unwrap().unwrap();
    assert_eq!(loaded, second);

    // Another period is another report.
    let other = reports
        .save_draft(&author(), ReportPeriod::new(2025, 4), Vec::new())
        .await
        .unwrap();
    assert_ne!(other.entity_id, first.entity_id);
    assert_eq!(reports.reports_by(&author()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn saving_drafts() {
    setup_logging();
    drafts_are_continued(MemoryStore::new()).await;
    drafts_are_continued(SqliteStore::temporary().await).await;
}

#[tokio::test]
async fn periods_need_a_valid_quarter() {
    let reports = ReportDrafts::new(
        MemoryStore::new(),
        Arc::new(ManualClock::new(T0)),
    );

    let result = reports
        .save_draft(&author(), ReportPeriod::new(2025, 5), Vec::new())
        .await;
    assert!(matches!(result, Err(PortalError::InvalidInput(_))));
    let result = reports.draft(&author(), ReportPeriod::new(2025, 0)).await;
    assert!(matches!(result, Err(PortalError::InvalidInput(_))));

    assert!(reports.draft(&author(), q3()).await.unwrap().is_none());
}

#[tokio::test]
async fn submitting_reports() {
    setup_logging();
    let clock = ManualClock::new(T0);
    let reports = ReportDrafts::new(MemoryStore::new(), Arc::new(clock.clone()));

    let draft = reports
        .save_draft(&author(), q3(), vec![Section::new("Summary", "Done.")])
        .await
        .unwrap();

    let result = reports
        .submit_report(&Caller::new("frank", "Frank"), &draft.entity_id)
        .await;
    assert!(matches!(result, Err(PortalError::Forbidden(_))));

    clock.advance(Duration::from_secs(60));
    let submitted = reports
        .submit_report(&author(), &draft.entity_id)
        .await
        .unwrap();
    assert_eq!(submitted.record.status, ReportStatus::Submitted);
    assert_eq!(
        submitted.record.submitted_at,
        Some(T0 + Duration::from_secs(60))
    );
    assert_eq!(submitted.record.sections, draft.record.sections);
    assert_eq!(submitted.record.created_at, T0);

    // Submitted reports are final.
    let result = reports.submit_report(&author(), &draft.entity_id).await;
    assert!(matches!(result, Err(PortalError::Conflict(_))));
    let result = reports
        .save_draft(&author(), q3(), vec![Section::new("Summary", "Changed.")])
        .await;
    assert!(matches!(result, Err(PortalError::Conflict(_))));

    let result = reports.submit_report(&author(), &EntityId::random()).await;
    assert!(matches!(
        result,
        Err(PortalError::NotFound {
            kind: "report_drafts",
            ..
        })
    ));

    let report = reports.report(&draft.entity_id).await.unwrap();
    assert_eq!(report.revisions, 2);
    assert_eq!(report.record.sections[0].body, "Done.");
}

#[tokio::test]
async fn administrators_read_submitted_reports() {
    let reports = ReportDrafts::new(MemoryStore::new(), Arc::new(ManualClock::new(T0)));
    let other = Caller::new("gina", "Gina");
    let admin = Caller::new("root", "Root").with_admin();

    let submitted = reports.save_draft(&author(), q3(), Vec::new()).await.unwrap();
    reports
        .submit_report(&author(), &submitted.entity_id)
        .await
        .unwrap();
    reports.save_draft(&other, q3(), Vec::new()).await.unwrap();
    let elsewhere = reports
        .save_draft(&other, ReportPeriod::new(2024, 3), Vec::new())
        .await
        .unwrap();
    reports
        .submit_report(&other, &elsewhere.entity_id)
        .await
        .unwrap();

    let result = reports.submitted_for_period(&author(), q3()).await;
    assert!(matches!(result, Err(PortalError::Forbidden(_))));

    let listed = reports.submitted_for_period(&admin, q3()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].entity_id, submitted.entity_id);
    assert_eq!(listed[0].record.author, author().id);
}
