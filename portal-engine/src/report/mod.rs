// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quarterly reports with a draft-then-submit lifecycle.
mod drafts;
mod record;
#[cfg(test)]
mod tests;

pub use drafts::ReportDrafts;
pub use record::{ReportDraft, ReportPeriod, ReportStatus, Section};
