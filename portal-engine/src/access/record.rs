// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;

use portal_core::{Column, EntityId, FieldReader, Fields, Record, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::error::UnknownStatus;

/// Kind of access a grant permits on a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Read,
    Write,
    Delete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decision of a reviewer on a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl From<ReviewAction> for RequestStatus {
    fn from(value: ReviewAction) -> Self {
        match value {
            ReviewAction::Approve => RequestStatus::Approved,
            ReviewAction::Reject => RequestStatus::Rejected,
        }
    }
}

/// Request of a user for access to one or more tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessRequest {
    pub requester: UserId,
    pub requester_name: String,
    pub tables: Vec<String>,

    /// Columns the access is limited to, all columns if empty.
    pub columns: Vec<String>,

    pub access_types: Vec<AccessType>,
    pub valid_from: Timestamp,
    pub valid_until: Timestamp,
    pub reason: String,
    pub status: RequestStatus,
    pub reviewer: Option<UserId>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Record for AccessRequest {
    const TABLE: &'static str = "access_requests";

    const COLUMNS: &'static [Column] = &[
        Column::lww("requester_id"),
        Column::lww("requester_name"),
        Column::lww("tables"),
        Column::lww("columns"),
        Column::lww("access_types"),
        Column::lww("valid_from"),
        Column::lww("valid_until"),
        Column::lww("reason"),
        Column::lww("status"),
        Column::lww("reviewer_id"),
        Column::lww("review_note"),
        Column::lww("reviewed_at"),
        Column::fww("created_at"),
    ];

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("requester_id", &self.requester)
            .with_text("requester_name", &self.requester_name)
            .with_json("tables", &self.tables)
            .with_json("columns", &self.columns)
            .with_json("access_types", &self.access_types)
            .with_timestamp("valid_from", self.valid_from)
            .with_timestamp("valid_until", self.valid_until)
            .with_text("reason", &self.reason)
            .with_text("status", self.status.as_str())
            .with_optional_text("reviewer_id", self.reviewer.as_ref().map(UserId::as_str))
            .with_optional_text("review_note", self.review_note.as_deref())
            .with_optional_timestamp("reviewed_at", self.reviewed_at)
            .with_timestamp("created_at", self.created_at)
    }

    fn from_fields(fields: &FieldReader<'_>) -> Self {
        Self {
            requester: fields.user("requester_id"),
            requester_name: fields.text("requester_name"),
            tables: fields.json("tables"),
            columns: fields.json("columns"),
            access_types: fields.json("access_types"),
            valid_from: fields.timestamp("valid_from"),
            valid_until: fields.timestamp("valid_until"),
            reason: fields.text("reason"),
            status: fields.parse("status"),
            reviewer: fields.optional_user("reviewer_id"),
            review_note: fields.optional_text("review_note"),
            reviewed_at: fields.optional_timestamp("reviewed_at"),
            created_at: fields.timestamp("created_at"),
        }
    }
}

/// Access of one user to one table, created by approving a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub user: UserId,
    pub table: String,

    /// Columns the access is limited to, all columns if empty.
    pub columns: Vec<String>,

    pub access_types: Vec<AccessType>,
    pub valid_from: Timestamp,
    pub valid_until: Timestamp,

    /// Request this grant was created from.
    pub request_id: Option<EntityId>,

    pub granted_by: UserId,
    pub active: bool,
    pub revoked_by: Option<UserId>,
    pub revoke_reason: Option<String>,
    pub revoked_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl AccessGrant {
    /// Returns `true` if the grant is active and `now` lies within its validity window.
    ///
    /// A grant which was never revoked is still not in effect once its window has passed.
    pub fn is_effective(&self, now: Timestamp) -> bool {
        self.active && self.valid_from <= now && now < self.valid_until
    }

    pub fn permits(&self, table: &str, column: &str, access_type: AccessType) -> bool {
        self.table == table
            && (self.columns.is_empty() || self.columns.iter().any(|name| name == column))
            && self.access_types.contains(&access_type)
    }
}

impl Record for AccessGrant {
    const TABLE: &'static str = "access_grants";

    const COLUMNS: &'static [Column] = &[
        Column::lww("user_id"),
        Column::lww("table_name"),
        Column::lww("columns"),
        Column::lww("access_types"),
        Column::lww("valid_from"),
        Column::lww("valid_until"),
        Column::lww("request_id"),
        Column::lww("granted_by"),
        Column::lww("active"),
        Column::lww("revoked_by"),
        Column::lww("revoke_reason"),
        Column::lww("revoked_at"),
        Column::fww("created_at"),
    ];

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("user_id", &self.user)
            .with_text("table_name", &self.table)
            .with_json("columns", &self.columns)
            .with_json("access_types", &self.access_types)
            .with_timestamp("valid_from", self.valid_from)
            .with_timestamp("valid_until", self.valid_until)
            .with_optional_text(
                "request_id",
                self.request_id.map(|id| id.to_hex()).as_deref(),
            )
            .with("granted_by", &self.granted_by)
            .with_bool("active", self.active)
            .with_optional_text("revoked_by", self.revoked_by.as_ref().map(UserId::as_str))
            .with_optional_text("revoke_reason", self.revoke_reason.as_deref())
            .with_optional_timestamp("revoked_at", self.revoked_at)
            .with_timestamp("created_at", self.created_at)
    }

    fn from_fields(fields: &FieldReader<'_>) -> Self {
        Self {
            user: fields.user("user_id"),
            table: fields.text("table_name"),
            columns: fields.json("columns"),
            access_types: fields.json("access_types"),
            valid_from: fields.timestamp("valid_from"),
            valid_until: fields.timestamp("valid_until"),
            request_id: fields.entity_id("request_id"),
            granted_by: fields.user("granted_by"),
            active: fields.bool("active"),
            revoked_by: fields.optional_user("revoked_by"),
            revoke_reason: fields.optional_text("revoke_reason"),
            revoked_at: fields.optional_timestamp("revoked_at"),
            created_at: fields.timestamp("created_at"),
        }
    }
}
