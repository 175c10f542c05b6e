// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use portal_core::{Clock, EntityId, Snapshot, UserId};
use portal_store::{Filter, Ledger, RecordStore};
use tracing::debug;

use crate::caller::Caller;
use crate::error::PortalError;
use crate::report::record::{ReportDraft, ReportPeriod, ReportStatus, Section};

fn period_filter(period: ReportPeriod) -> Filter {
    Filter::And(vec![
        Filter::equals("year", i64::from(period.year)),
        Filter::equals("quarter", i64::from(period.quarter)),
    ])
}

/// Quarterly reports, written as drafts and submitted once.
///
/// There is one report per author and period. Saving a draft again continues the existing report
/// under its id, keeping its creation time.
#[derive(Debug)]
pub struct ReportDrafts<S> {
    drafts: Ledger<S, ReportDraft>,
    clock: Arc<dyn Clock>,
}

impl<S> ReportDrafts<S>
where
    S: RecordStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            drafts: Ledger::new(store, clock.clone()),
            clock,
        }
    }

    /// Store the current sections of the caller's report for a period.
    ///
    /// Every save appends the full report. Saving onto an already submitted report fails.
    pub async fn save_draft(
        &self,
        caller: &Caller,
        period: ReportPeriod,
        sections: Vec<Section>,
    ) -> Result<Snapshot<ReportDraft>, PortalError<S::Error>> {
        check_period::<S::Error>(period)?;

        let now = self.clock.now();
        let snapshot = match self.latest(&caller.id, period).await? {
            Some(prior) => {
                if prior.record.status == ReportStatus::Submitted {
                    return Err(PortalError::Conflict(format!(
                        "report for {} was already submitted",
                        period
                    )));
                }

                let next = ReportDraft {
                    author_name: caller.name.clone(),
                    sections,
                    updated_at: now,
                    ..prior.record.clone()
                };
                self.drafts.commit(&prior, &next).await?
            }
            None => {
                self.drafts
                    .create(&ReportDraft {
                        author: caller.id.clone(),
                        author_name: caller.name.clone(),
                        period,
                        sections,
                        status: ReportStatus::Draft,
                        submitted_at: None,
                        updated_at: now,
                        created_at: now,
                    })
                    .await?
            }
        };

        debug!(
            report = %snapshot.entity_id,
            author = %caller.id,
            %period,
            revisions = snapshot.revisions,
            "saved report draft"
        );
        Ok(snapshot)
    }

    /// Submit a draft. Only its author can do this, and only once.
    pub async fn submit_report(
        &self,
        caller: &Caller,
        id: &EntityId,
    ) -> Result<Snapshot<ReportDraft>, PortalError<S::Error>> {
        let prior = self.report(id).await?;

        if !caller.is(&prior.record.author) {
            return Err(PortalError::Forbidden(
                "only the author can submit a report".into(),
            ));
        }

        if prior.record.status == ReportStatus::Submitted {
            return Err(PortalError::Conflict(format!(
                "report {} was already submitted",
                id
            )));
        }

        let now = self.clock.now();
        let submitted = ReportDraft {
            status: ReportStatus::Submitted,
            submitted_at: Some(now),
            updated_at: now,
            ..prior.record.clone()
        };
        let snapshot = self.drafts.commit(&prior, &submitted).await?;

        debug!(report = %id, author = %caller.id, "submitted report");
        Ok(snapshot)
    }

    pub async fn report(
        &self,
        id: &EntityId,
    ) -> Result<Snapshot<ReportDraft>, PortalError<S::Error>> {
        self.drafts.load(id).await?.ok_or(PortalError::NotFound {
            kind: "report_drafts",
            id: *id,
        })
    }

    /// The caller's report for a period, if one was started.
    pub async fn draft(
        &self,
        caller: &Caller,
        period: ReportPeriod,
    ) -> Result<Option<Snapshot<ReportDraft>>, PortalError<S::Error>> {
        check_period::<S::Error>(period)?;
        self.latest(&caller.id, period).await
    }

    /// All reports of the caller, oldest first.
    pub async fn reports_by(
        &self,
        caller: &Caller,
    ) -> Result<Vec<Snapshot<ReportDraft>>, PortalError<S::Error>> {
        Ok(self
            .drafts
            .load_where(&Filter::equals("author_id", &caller.id))
            .await?
            .into_iter()
            .filter(|snapshot| snapshot.record.author == caller.id)
            .collect())
    }

    /// Submitted reports of all authors for a period. Administrators only.
    pub async fn submitted_for_period(
        &self,
        caller: &Caller,
        period: ReportPeriod,
    ) -> Result<Vec<Snapshot<ReportDraft>>, PortalError<S::Error>> {
        if !caller.admin {
            return Err(PortalError::Forbidden(
                "reading reports of other authors requires administrator rights".into(),
            ));
        }
        check_period::<S::Error>(period)?;

        Ok(self
            .drafts
            .load_where(&period_filter(period))
            .await?
            .into_iter()
            .filter(|snapshot| {
                snapshot.record.period == period && snapshot.record.status == ReportStatus::Submitted
            })
            .collect())
    }

    /// Most recently written report of an author for a period.
    async fn latest(
        &self,
        author: &UserId,
        period: ReportPeriod,
    ) -> Result<Option<Snapshot<ReportDraft>>, PortalError<S::Error>> {
        let filter = Filter::And(vec![
            Filter::equals("author_id", author),
            period_filter(period),
        ]);

        Ok(self
            .drafts
            .load_where(&filter)
            .await?
            .into_iter()
            .filter(|snapshot| {
                &snapshot.record.author == author && snapshot.record.period == period
            })
            .max_by_key(|snapshot| snapshot.head))
    }
}

fn check_period<E>(period: ReportPeriod) -> Result<(), PortalError<E>>
where
    E: std::error::Error,
{
    if period.is_valid() {
        Ok(())
    } else {
        Err(PortalError::InvalidInput(format!(
            "quarter needs to be between 1 and 4, got {}",
            period.quarter
        )))
    }
}
