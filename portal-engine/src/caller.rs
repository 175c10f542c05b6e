// SPDX-License-Identifier: MIT OR Apache-2.0

use portal_core::UserId;

/// Authenticated identity on whose behalf an operation runs.
///
/// Authentication happens in the surrounding web layer, the portal only checks participation
/// and capability flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    pub name: String,
    pub admin: bool,
    pub granter: bool,
}

impl Caller {
    pub fn new(id: impl Into<UserId>, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            admin: false,
            granter: false,
        }
    }

    pub fn with_admin(mut self) -> Self {
        self.admin = true;
        self
    }

    pub fn with_granter(mut self) -> Self {
        self.granter = true;
        self
    }

    /// Administrators and explicit granters may review access requests and revoke grants.
    pub fn can_review(&self) -> bool {
        self.admin || self.granter
    }

    pub fn is(&self, user: &UserId) -> bool {
        &self.id == user
    }
}
