// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;

use portal_core::EntityId;
use portal_core::cbor::EncodeError;
use portal_store::LedgerError;
use thiserror::Error;

/// Failures of portal operations, generic over the error type of the storage collaborator.
///
/// Validation always happens against a freshly reconstructed snapshot. When it fails nothing is
/// appended.
#[derive(Debug, Error)]
pub enum PortalError<E>
where
    E: Error,
{
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: EntityId },

    /// Caller is neither a stated participant nor holds the required capability.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Current state does not admit the requested transition.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Another writer appended a version between reading and writing. Nothing was written, the
    /// caller may re-read and try again.
    #[error("{kind} {id} was changed concurrently")]
    ConcurrentWrite { kind: &'static str, id: EntityId },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Storage failure, surfaced unchanged.
    #[error(transparent)]
    Store(E),
}

impl<E> PortalError<E>
where
    E: Error,
{
    /// Returns `true` if the caller can correct the failure, `false` for opaque storage or
    /// encoding failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PortalError::Encode(_) | PortalError::Store(_))
    }
}

impl<E> From<LedgerError<E>> for PortalError<E>
where
    E: Error,
{
    fn from(value: LedgerError<E>) -> Self {
        match value {
            LedgerError::Store(err) => PortalError::Store(err),
            LedgerError::Encode(err) => PortalError::Encode(err),
            LedgerError::NotFound(kind, id) => PortalError::NotFound { kind, id },
            LedgerError::Stale(kind, id) => PortalError::ConcurrentWrite { kind, id },
        }
    }
}

/// Status text stored in a row which does not name any known variant.
#[derive(Debug, Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);
