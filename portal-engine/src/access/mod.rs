// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access requests and the grants they fan out into.
//!
//! A request moves from `pending` to `approved` or `rejected`. Approving a request creates one
//! independent grant per requested table which stays active until it is revoked. Grants are only
//! in effect within their validity window, an active grant whose window has passed no longer
//! gives access.
mod lifecycle;
mod record;
#[cfg(test)]
mod tests;

pub use lifecycle::{AccessLifecycle, NewAccessRequest, Review};
pub use record::{AccessGrant, AccessRequest, AccessType, RequestStatus, ReviewAction};
