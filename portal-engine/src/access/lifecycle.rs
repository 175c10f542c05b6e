// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use portal_core::{Clock, EntityId, Snapshot, Timestamp, UserId};
use portal_store::{Filter, Ledger, Mutation, RecordStore};
use tracing::{debug, warn};

use crate::access::record::{
    AccessGrant, AccessRequest, AccessType, RequestStatus, ReviewAction,
};
use crate::caller::Caller;
use crate::config::AccessConfig;
use crate::error::PortalError;

/// Parameters of a new access request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccessRequest {
    pub tables: Vec<String>,
    pub columns: Vec<String>,
    pub access_types: Vec<AccessType>,
    pub valid_until: Timestamp,
    pub reason: String,
}

/// Result of reviewing a request.
#[derive(Clone, Debug)]
pub struct Review {
    pub request: Snapshot<AccessRequest>,

    /// Grants created by an approval, one per requested table. Empty for rejections.
    pub grants: Vec<Snapshot<AccessGrant>>,
}

/// Trim names, drop empty ones and duplicates while keeping the requested order.
fn normalise(names: &[String]) -> Vec<String> {
    let mut normalised: Vec<String> = Vec::with_capacity(names.len());
    for name in names.iter().map(|name| name.trim()) {
        if !name.is_empty() && !normalised.iter().any(|known| known == name) {
            normalised.push(name.to_string());
        }
    }
    normalised
}

/// Requests for table access, their review and the resulting grants.
#[derive(Debug)]
pub struct AccessLifecycle<S> {
    requests: Ledger<S, AccessRequest>,
    grants: Ledger<S, AccessGrant>,
    clock: Arc<dyn Clock>,
    config: AccessConfig,
}

impl<S> AccessLifecycle<S>
where
    S: RecordStore + Clone,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, config: AccessConfig) -> Self {
        Self {
            requests: Ledger::new(store.clone(), clock.clone()),
            grants: Ledger::new(store, clock.clone()),
            clock,
            config,
        }
    }

    /// Ask for access to the given tables until `valid_until`.
    ///
    /// The validity window starts now. It needs to end in the future and may not be longer than
    /// the configured maximum.
    pub async fn create_request(
        &self,
        caller: &Caller,
        request: NewAccessRequest,
    ) -> Result<Snapshot<AccessRequest>, PortalError<S::Error>> {
        let tables = normalise(&request.tables);
        if tables.is_empty() {
            return Err(PortalError::InvalidInput(
                "at least one table needs to be requested".into(),
            ));
        }

        let mut access_types = request.access_types.clone();
        access_types.sort();
        access_types.dedup();
        if access_types.is_empty() {
            return Err(PortalError::InvalidInput(
                "at least one access type needs to be requested".into(),
            ));
        }

        let now = self.clock.now();
        if request.valid_until <= now {
            return Err(PortalError::InvalidInput(
                "validity window needs to end in the future".into(),
            ));
        }
        if request.valid_until.saturating_since(now) > self.config.max_validity {
            return Err(PortalError::InvalidInput(format!(
                "validity window can not exceed {} days",
                self.config.max_validity.as_secs() / 86_400
            )));
        }

        let snapshot = self
            .requests
            .create(&AccessRequest {
                requester: caller.id.clone(),
                requester_name: caller.name.clone(),
                tables,
                columns: normalise(&request.columns),
                access_types,
                valid_from: now,
                valid_until: request.valid_until,
                reason: request.reason.trim().to_string(),
                status: RequestStatus::Pending,
                reviewer: None,
                review_note: None,
                reviewed_at: None,
                created_at: now,
            })
            .await?;

        debug!(
            request = %snapshot.entity_id,
            requester = %caller.id,
            tables = snapshot.record.tables.len(),
            "created access request"
        );
        Ok(snapshot)
    }

    /// Approve or reject a pending request.
    ///
    /// Approving creates one grant per requested table, each with its own id and carrying the
    /// request's columns, access types and validity window. The request transition is committed
    /// before the grants are written, both steps are not atomic.
    pub async fn review_request(
        &self,
        caller: &Caller,
        id: &EntityId,
        action: ReviewAction,
        note: Option<&str>,
    ) -> Result<Review, PortalError<S::Error>> {
        if !caller.can_review() {
            return Err(PortalError::Forbidden(
                "reviewing access requests requires the granter capability".into(),
            ));
        }

        let prior = self.load_request(id).await?;
        if prior.record.status.is_terminal() {
            return Err(PortalError::Conflict(format!(
                "access request {} is already {}",
                id, prior.record.status
            )));
        }

        let now = self.clock.now();
        let reviewed = AccessRequest {
            status: action.into(),
            reviewer: Some(caller.id.clone()),
            review_note: note
                .map(|note| note.trim().to_string())
                .filter(|note| !note.is_empty()),
            reviewed_at: Some(now),
            ..prior.record.clone()
        };
        let request = self.requests.commit(&prior, &reviewed).await?;

        let grants = match action {
            ReviewAction::Reject => Vec::new(),
            ReviewAction::Approve => {
                let grants: Vec<AccessGrant> = request
                    .record
                    .tables
                    .iter()
                    .map(|table| AccessGrant {
                        user: request.record.requester.clone(),
                        table: table.clone(),
                        columns: request.record.columns.clone(),
                        access_types: request.record.access_types.clone(),
                        valid_from: request.record.valid_from,
                        valid_until: request.record.valid_until,
                        request_id: Some(*id),
                        granted_by: caller.id.clone(),
                        active: true,
                        revoked_by: None,
                        revoke_reason: None,
                        revoked_at: None,
                        created_at: now,
                    })
                    .collect();
                self.grants.create_many(&grants).await?
            }
        };

        debug!(
            request = %id,
            reviewer = %caller.id,
            status = %request.record.status,
            grants = grants.len(),
            "reviewed access request"
        );
        Ok(Review { request, grants })
    }

    /// Apply the same decision to every pending request.
    ///
    /// Requests which fail to transition (for example because someone else reviewed them in the
    /// meantime) are skipped. Returns the number of reviewed requests.
    pub async fn bulk_review_pending(
        &self,
        caller: &Caller,
        action: ReviewAction,
        note: Option<&str>,
    ) -> Result<usize, PortalError<S::Error>> {
        let pending = self.pending_requests(caller).await?;

        let mut reviewed = 0;
        for snapshot in pending {
            match self
                .review_request(caller, &snapshot.entity_id, action, note)
                .await
            {
                Ok(_) => reviewed += 1,
                Err(err) => {
                    warn!(request = %snapshot.entity_id, "skipping access request: {err}");
                }
            }
        }

        Ok(reviewed)
    }

    /// Revoke an active grant.
    pub async fn revoke_grant(
        &self,
        caller: &Caller,
        id: &EntityId,
        reason: &str,
    ) -> Result<Snapshot<AccessGrant>, PortalError<S::Error>> {
        if !caller.can_review() {
            return Err(PortalError::Forbidden(
                "revoking access grants requires the granter capability".into(),
            ));
        }

        let prior = self.load_grant(id).await?;
        if !prior.record.active {
            return Err(PortalError::Conflict(format!(
                "access grant {} is already revoked",
                id
            )));
        }

        let revoked = AccessGrant {
            active: false,
            revoked_by: Some(caller.id.clone()),
            revoke_reason: Some(reason.trim().to_string()).filter(|reason| !reason.is_empty()),
            revoked_at: Some(self.clock.now()),
            ..prior.record.clone()
        };
        let snapshot = self.grants.commit(&prior, &revoked).await?;

        debug!(grant = %id, by = %caller.id, "revoked access grant");
        Ok(snapshot)
    }

    /// Delete the full history of every revoked grant.
    ///
    /// This is an administrative cleanup outside of the versioned lifecycle. Returns the number of
    /// deleted rows.
    pub async fn purge_revoked_grants(&self, caller: &Caller) -> Result<u64, PortalError<S::Error>> {
        if !caller.admin {
            return Err(PortalError::Forbidden(
                "purging grants requires administrator rights".into(),
            ));
        }

        let revoked: Vec<EntityId> = self
            .grants
            .load_where(&Filter::equals("active", false))
            .await?
            .into_iter()
            .filter(|snapshot| !snapshot.record.active)
            .map(|snapshot| snapshot.entity_id)
            .collect();
        if revoked.is_empty() {
            return Ok(0);
        }

        let deleted = self
            .grants
            .store()
            .bulk_mutate("access_grants", &Filter::Entities(revoked), Mutation::Delete)
            .await
            .map_err(PortalError::Store)?;

        debug!(deleted, "purged revoked access grants");
        Ok(deleted)
    }

    pub async fn request(
        &self,
        id: &EntityId,
    ) -> Result<Snapshot<AccessRequest>, PortalError<S::Error>> {
        self.load_request(id).await
    }

    pub async fn grant(&self, id: &EntityId) -> Result<Snapshot<AccessGrant>, PortalError<S::Error>> {
        self.load_grant(id).await
    }

    /// Requests made by the caller, oldest first.
    pub async fn my_requests(
        &self,
        caller: &Caller,
    ) -> Result<Vec<Snapshot<AccessRequest>>, PortalError<S::Error>> {
        Ok(self
            .requests
            .load_where(&Filter::equals("requester_id", &caller.id))
            .await?
            .into_iter()
            .filter(|snapshot| snapshot.record.requester == caller.id)
            .collect())
    }

    /// Requests waiting for review, oldest first. Only visible to reviewers.
    pub async fn pending_requests(
        &self,
        caller: &Caller,
    ) -> Result<Vec<Snapshot<AccessRequest>>, PortalError<S::Error>> {
        if !caller.can_review() {
            return Err(PortalError::Forbidden(
                "listing pending access requests requires the granter capability".into(),
            ));
        }

        Ok(self
            .requests
            .load_where(&Filter::equals("status", RequestStatus::Pending.as_str()))
            .await?
            .into_iter()
            .filter(|snapshot| snapshot.record.status == RequestStatus::Pending)
            .collect())
    }

    /// Grants created from a request, whether they are still active or not.
    pub async fn grants_for_request(
        &self,
        id: &EntityId,
    ) -> Result<Vec<Snapshot<AccessGrant>>, PortalError<S::Error>> {
        Ok(self
            .grants
            .load_where(&Filter::equals("request_id", id))
            .await?
            .into_iter()
            .filter(|snapshot| snapshot.record.request_id.as_ref() == Some(id))
            .collect())
    }

    /// Grants of a user which are in effect right now.
    pub async fn active_grants(
        &self,
        user: &UserId,
    ) -> Result<Vec<Snapshot<AccessGrant>>, PortalError<S::Error>> {
        let now = self.clock.now();
        Ok(self
            .grants
            .load_where(&Filter::equals("user_id", user))
            .await?
            .into_iter()
            .filter(|snapshot| &snapshot.record.user == user && snapshot.record.is_effective(now))
            .collect())
    }

    pub async fn has_access(
        &self,
        user: &UserId,
        table: &str,
        column: &str,
        access_type: AccessType,
    ) -> Result<bool, PortalError<S::Error>> {
        Ok(self
            .active_grants(user)
            .await?
            .iter()
            .any(|snapshot| snapshot.record.permits(table, column, access_type)))
    }

    async fn load_request(
        &self,
        id: &EntityId,
    ) -> Result<Snapshot<AccessRequest>, PortalError<S::Error>> {
        self.requests.load(id).await?.ok_or(PortalError::NotFound {
            kind: "access_requests",
            id: *id,
        })
    }

    async fn load_grant(&self, id: &EntityId) -> Result<Snapshot<AccessGrant>, PortalError<S::Error>> {
        self.grants.load(id).await?.ok_or(PortalError::NotFound {
            kind: "access_grants",
            id: *id,
        })
    }
}
