// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;

use portal_core::{Column, FieldReader, Fields, Record, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::error::UnknownStatus;

/// Quarter of a year a report is written for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ReportPeriod {
    pub year: u16,
    pub quarter: u8,
}

impl ReportPeriod {
    pub fn new(year: u16, quarter: u8) -> Self {
        Self { year, quarter }
    }

    pub fn is_valid(&self) -> bool {
        (1..=4).contains(&self.quarter)
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

/// Titled free-text part of a report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub body: String,
}

impl Section {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Draft,
    Submitted,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "draft",
            ReportStatus::Submitted => "submitted",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(ReportStatus::Draft),
            "submitted" => Ok(ReportStatus::Submitted),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quarterly report of one author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportDraft {
    pub author: UserId,
    pub author_name: String,
    pub period: ReportPeriod,
    pub sections: Vec<Section>,
    pub status: ReportStatus,
    pub submitted_at: Option<Timestamp>,
    pub updated_at: Timestamp,
    pub created_at: Timestamp,
}

impl Record for ReportDraft {
    const TABLE: &'static str = "report_drafts";

    const COLUMNS: &'static [Column] = &[
        Column::lww("author_id"),
        Column::lww("author_name"),
        Column::lww("year"),
        Column::lww("quarter"),
        Column::lww("sections"),
        Column::lww("status"),
        Column::lww("submitted_at"),
        Column::lww("updated_at"),
        Column::fww("created_at"),
    ];

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("author_id", &self.author)
            .with_text("author_name", &self.author_name)
            .with_integer("year", i64::from(self.period.year))
            .with_integer("quarter", i64::from(self.period.quarter))
            .with_json("sections", &self.sections)
            .with_text("status", self.status.as_str())
            .with_optional_timestamp("submitted_at", self.submitted_at)
            .with_timestamp("updated_at", self.updated_at)
            .with_timestamp("created_at", self.created_at)
    }

    fn from_fields(fields: &FieldReader<'_>) -> Self {
        Self {
            author: fields.user("author_id"),
            author_name: fields.text("author_name"),
            period: ReportPeriod {
                year: u16::try_from(fields.integer("year")).unwrap_or_default(),
                quarter: u8::try_from(fields.integer("quarter")).unwrap_or_default(),
            },
            sections: fields.json("sections"),
            status: fields.parse("status"),
            submitted_at: fields.optional_timestamp("submitted_at"),
            updated_at: fields.timestamp("updated_at"),
            created_at: fields.timestamp("created_at"),
        }
    }
}
