// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portal_core::test_utils::{ManualClock, setup_logging};
use portal_core::{EntityId, Row, Timestamp, Version};
use portal_store::test_utils::InterleavingStore;
use portal_store::{Filter, MemoryStore, Mutation, RecordStore, SqliteStore};

use crate::access::{
    AccessLifecycle, AccessType, NewAccessRequest, RequestStatus, ReviewAction,
};
use crate::caller::Caller;
use crate::config::AccessConfig;
use crate::error::PortalError;

const T0: Timestamp = Timestamp::new(1_700_000_000_000);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn setup() -> (AccessLifecycle<MemoryStore>, ManualClock) {
    setup_logging();
    let clock = ManualClock::new(T0);
    let access = AccessLifecycle::new(
        MemoryStore::new(),
        Arc::new(clock.clone()),
        AccessConfig::default(),
    );
    (access, clock)
}

/// Memory store on which another writer always gets to selected entities first.
#[derive(Clone, Debug, Default)]
struct ContendedStore {
    inner: MemoryStore,
    contended: Arc<Mutex<HashSet<EntityId>>>,
}

impl ContendedStore {
    fn contend(&self, id: EntityId) {
        self.contended.lock().unwrap().insert(id);
    }
}

impl RecordStore for ContendedStore {
    type Error = Infallible;

    async fn insert(&self, rows: Vec<Row>) -> Result<usize, Self::Error> {
        self.inner.insert(rows).await
    }

    async fn insert_if_head(
        &self,
        row: Row,
        expected: Option<&Version>,
    ) -> Result<bool, Self::Error> {
        if self.contended.lock().unwrap().contains(&row.entity_id) {
            return Ok(false);
        }
        self.inner.insert_if_head(row, expected).await
    }

    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, Self::Error> {
        self.inner.query(table, filter).await
    }

    async fn bulk_mutate(
        &self,
        table: &str,
        filter: &Filter,
        mutation: Mutation,
    ) -> Result<u64, Self::Error> {
        self.inner.bulk_mutate(table, filter, mutation).await
    }
}

fn analyst() -> Caller {
    Caller::new("dana", "Dana")
}

fn granter() -> Caller {
    Caller::new("gus", "Gus").with_granter()
}

fn admin() -> Caller {
    Caller::new("root", "Root").with_admin()
}

fn request(tables: &[&str], valid_until: Timestamp) -> NewAccessRequest {
    NewAccessRequest {
        tables: tables.iter().map(|table| table.to_string()).collect(),
        columns: vec!["amount".into(), "region".into()],
        access_types: vec![AccessType::Read],
        valid_until,
        reason: "quarterly numbers".into(),
    }
}

#[tokio::test]
async fn request_validation() {
    let (access, _clock) = setup();

    let result = access.create_request(&analyst(), request(&[], T0 + DAY)).await;
    assert!(matches!(result, Err(PortalError::InvalidInput(_))));

    let result = access.create_request(&analyst(), request(&["sales"], T0)).await;
    assert!(matches!(result, Err(PortalError::InvalidInput(_))));

    let result = access
        .create_request(&analyst(), request(&["sales"], T0 + DAY * 400))
        .await;
    assert!(matches!(result, Err(PortalError::InvalidInput(_))));

    let mut no_types = request(&["sales"], T0 + DAY);
    no_types.access_types.clear();
    let result = access.create_request(&analyst(), no_types).await;
    assert!(matches!(result, Err(PortalError::InvalidInput(_))));

    let created = access
        .create_request(&analyst(), request(&[" sales", "sales", "", "stock"], T0 + DAY))
        .await
        .unwrap();
    assert_eq!(created.record.tables, vec!["sales", "stock"]);
    assert_eq!(created.record.status, RequestStatus::Pending);
    assert_eq!(created.record.valid_from, T0);
}

#[tokio::test]
async fn approval_fans_out_one_grant_per_table() {
    let (access, _clock) = setup();

    let created = access
        .create_request(
            &analyst(),
            request(&["sales", "stock", "returns"], T0 + DAY * 30),
        )
        .await
        .unwrap();

    let review = access
        .review_request(
            &granter(),
            &created.entity_id,
            ReviewAction::Approve,
            Some("ok"),
        )
        .await
        .unwrap();
    assert_eq!(review.request.record.status, RequestStatus::Approved);
    assert_eq!(review.request.record.reviewer, Some(granter().id));
    assert_eq!(review.request.record.review_note.as_deref(), Some("ok"));
    assert_eq!(review.grants.len(), 3);

    let grants = access.grants_for_request(&created.entity_id).await.unwrap();
    assert_eq!(grants.len(), 3);

    let mut tables: Vec<&str> = grants
        .iter()
        .map(|grant| grant.record.table.as_str())
        .collect();
    tables.sort();
    assert_eq!(tables, vec!["returns", "sales", "stock"]);

    for grant in &grants {
        assert_eq!(grant.record.user, analyst().id);
        assert_eq!(grant.record.request_id, Some(created.entity_id));
        assert_eq!(grant.record.columns, vec!["amount", "region"]);
        assert_eq!(grant.record.access_types, vec![AccessType::Read]);
        assert_eq!(grant.record.valid_until, T0 + DAY * 30);
        assert!(grant.record.active);
    }

    // Every grant is its own entity and revoked on its own.
    let revoked = access
        .revoke_grant(&granter(), &grants[0].entity_id, "no longer needed")
        .await
        .unwrap();
    assert!(!revoked.record.active);
    assert_eq!(revoked.record.revoked_by, Some(granter().id));
    assert_eq!(
        revoked.record.revoke_reason.as_deref(),
        Some("no longer needed")
    );

    let active = access.active_grants(&analyst().id).await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(
        active
            .iter()
            .all(|grant| grant.entity_id != grants[0].entity_id)
    );
}

#[tokio::test]
async fn reviewed_requests_stay_reviewed() {
    let (access, _clock) = setup();

    let created = access
        .create_request(&analyst(), request(&["sales"], T0 + DAY))
        .await
        .unwrap();

    let result = access
        .review_request(&analyst(), &created.entity_id, ReviewAction::Approve, None)
        .await;
    assert!(matches!(result, Err(PortalError::Forbidden(_))));

    let review = access
        .review_request(&admin(), &created.entity_id, ReviewAction::Reject, None)
        .await
        .unwrap();
    assert_eq!(review.request.record.status, RequestStatus::Rejected);
    assert!(review.grants.is_empty());

    let result = access
        .review_request(&granter(), &created.entity_id, ReviewAction::Approve, None)
        .await;
    assert!(matches!(result, Err(PortalError::Conflict(_))));
    assert!(
        access
            .grants_for_request(&created.entity_id)
            .await
            .unwrap()
            .is_empty()
    );

    let result = access
        .review_request(&granter(), &EntityId::random(), ReviewAction::Approve, None)
        .await;
    assert!(matches!(result, Err(PortalError::NotFound { .. })));
}

#[tokio::test]
async fn revoking_grants() {
    let (access, _clock) = setup();

    let created = access
        .create_request(&analyst(), request(&["sales"], T0 + DAY))
        .await
        .unwrap();
    let review = access
        .review_request(&granter(), &created.entity_id, ReviewAction::Approve, None)
        .await
        .unwrap();
    let grant_id = review.grants[0].entity_id;

    let result = access.revoke_grant(&analyst(), &grant_id, "").await;
    assert!(matches!(result, Err(PortalError::Forbidden(_))));

    access.revoke_grant(&admin(), &grant_id, "").await.unwrap();

    let result = access.revoke_grant(&granter(), &grant_id, "again").await;
    assert!(matches!(result, Err(PortalError::Conflict(_))));

    let grant = access.grant(&grant_id).await.unwrap();
    assert!(!grant.record.active);
    assert_eq!(grant.record.revoke_reason, None);
    assert_eq!(grant.revisions, 2);
}

#[tokio::test]
async fn bulk_review_counts_successes() {
    let (access, clock) = setup();

    for tables in [vec!["sales"], vec!["stock", "returns"], vec!["hr"]] {
        access
            .create_request(&analyst(), request(&tables, T0 + DAY))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(1));
    }

    // One of them was already reviewed.
    let requests = access.my_requests(&analyst()).await.unwrap();
    let first = &requests[0];
    assert_eq!(first.record.tables, vec!["sales"]);
    access
        .review_request(&granter(), &first.entity_id, ReviewAction::Reject, None)
        .await
        .unwrap();

    let result = access
        .bulk_review_pending(&analyst(), ReviewAction::Approve, None)
        .await;
    assert!(matches!(result, Err(PortalError::Forbidden(_))));

    let reviewed = access
        .bulk_review_pending(&granter(), ReviewAction::Approve, Some("batch"))
        .await
        .unwrap();
    assert_eq!(reviewed, 2);

    assert!(access.pending_requests(&granter()).await.unwrap().is_empty());
    assert_eq!(access.active_grants(&analyst().id).await.unwrap().len(), 3);

    let reviewed = access
        .bulk_review_pending(&granter(), ReviewAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(reviewed, 0);
}

#[tokio::test]
async fn bulk_review_skips_failed_transitions() {
    setup_logging();
    let store = ContendedStore::default();
    let clock = ManualClock::new(T0);
    let access = AccessLifecycle::new(
        store.clone(),
        Arc::new(clock.clone()),
        AccessConfig::default(),
    );

    for tables in [vec!["sales"], vec!["stock", "returns"], vec!["hr"]] {
        access
            .create_request(&analyst(), request(&tables, T0 + DAY))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(1));
    }

    let requests = access.my_requests(&analyst()).await.unwrap();
    let contended = requests[1].entity_id;
    assert_eq!(requests[1].record.tables, vec!["stock", "returns"]);
    store.contend(contended);

    let reviewed = access
        .bulk_review_pending(&granter(), ReviewAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(reviewed, 2);

    // The failed review left the request untouched and created no grants.
    let request = access.request(&contended).await.unwrap();
    assert_eq!(request.record.status, RequestStatus::Pending);
    assert_eq!(request.revisions, 1);
    assert!(access.grants_for_request(&contended).await.unwrap().is_empty());
    assert_eq!(access.active_grants(&analyst().id).await.unwrap().len(), 2);

    let pending = access.pending_requests(&granter()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity_id, contended);

    let result = access
        .review_request(&granter(), &contended, ReviewAction::Approve, None)
        .await;
    assert!(matches!(
        result,
        Err(PortalError::ConcurrentWrite {
            kind: "access_requests",
            ..
        })
    ));
}

#[tokio::test]
async fn concurrent_approvals_fan_out_once() {
    setup_logging();
    let store = InterleavingStore::new(MemoryStore::new());
    let access = AccessLifecycle::new(
        store.clone(),
        Arc::new(ManualClock::new(T0)),
        AccessConfig::default(),
    );

    let created = access
        .create_request(&analyst(), request(&["sales", "stock", "hr"], T0 + DAY))
        .await
        .unwrap();
    let id = created.entity_id;

    // Both reviewers read the pending request before either of them writes.
    let granter_actor = granter();
    let admin_actor = admin();
    let (first, second) = tokio::join!(
        access.review_request(&granter_actor, &id, ReviewAction::Approve, None),
        access.review_request(&admin_actor, &id, ReviewAction::Approve, Some("looks fine")),
    );

    let (accepted, rejected) = match (first, second) {
        (Ok(accepted), Err(rejected)) | (Err(rejected), Ok(accepted)) => (accepted, rejected),
        (first, second) => panic!("expected exactly one approval: {first:?} {second:?}"),
    };
    assert!(matches!(
        rejected,
        PortalError::ConcurrentWrite {
            kind: "access_requests",
            ..
        }
    ));
    assert_eq!(store.rejected_appends(), 1);
    assert_eq!(accepted.grants.len(), 3);

    let request = access.request(&id).await.unwrap();
    assert_eq!(request.record.status, RequestStatus::Approved);
    assert_eq!(request.revisions, 2);
    assert_eq!(access.grants_for_request(&id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn expired_grants_give_no_access() {
    let (access, clock) = setup();

    let created = access
        .create_request(&analyst(), request(&["sales"], T0 + DAY))
        .await
        .unwrap();
    access
        .review_request(&granter(), &created.entity_id, ReviewAction::Approve, None)
        .await
        .unwrap();

    let user = analyst().id;
    assert!(
        access
            .has_access(&user, "sales", "amount", AccessType::Read)
            .await
            .unwrap()
    );
    assert!(
        !access
            .has_access(&user, "sales", "salary", AccessType::Read)
            .await
            .unwrap()
    );
    assert!(
        !access
            .has_access(&user, "sales", "amount", AccessType::Write)
            .await
            .unwrap()
    );
    assert!(
        !access
            .has_access(&user, "stock", "amount", AccessType::Read)
            .await
            .unwrap()
    );

    clock.advance(DAY);

    // Still active, but no longer within its validity window.
    let grants = access.grants_for_request(&created.entity_id).await.unwrap();
    assert!(grants[0].record.active);
    assert!(access.active_grants(&user).await.unwrap().is_empty());
    assert!(
        !access
            .has_access(&user, "sales", "amount", AccessType::Read)
            .await
            .unwrap()
    );
}

async fn purge_revoked<S>(store: S)
where
    S: RecordStore + Clone,
{
    let clock = ManualClock::new(T0);
    let access = AccessLifecycle::new(store, Arc::new(clock), AccessConfig::default());

    let created = access
        .create_request(&analyst(), request(&["sales", "stock"], T0 + DAY))
        .await
        .unwrap();
    let review = access
        .review_request(&granter(), &created.entity_id, ReviewAction::Approve, None)
        .await
        .unwrap();
    let revoked_id = review.grants[0].entity_id;
    let kept_id = review.grants[1].entity_id;
    access
        .revoke_grant(&granter(), &revoked_id, "done")
        .await
        .unwrap();

    let result = access.purge_revoked_grants(&granter()).await;
    assert!(matches!(result, Err(PortalError::Forbidden(_))));

    // Creation row and revocation row are gone.
    assert_eq!(access.purge_revoked_grants(&admin()).await.unwrap(), 2);
    assert!(matches!(
        access.grant(&revoked_id).await,
        Err(PortalError::NotFound { .. })
    ));
    assert!(access.grant(&kept_id).await.unwrap().record.active);
    assert_eq!(access.purge_revoked_grants(&admin()).await.unwrap(), 0);
}

#[tokio::test]
async fn purge_revoked_grants() {
    setup_logging();
    purge_revoked(MemoryStore::new()).await;
    purge_revoked(SqliteStore::temporary().await).await;
}
