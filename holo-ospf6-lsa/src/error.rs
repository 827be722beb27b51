//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::packet::error::DecodeError;
use crate::packet::lsa::LsaKey;

// LSA lifecycle errors.
#[derive(Debug)]
pub enum Error {
    // Malformed or oversized wire data.
    InvalidFormat(DecodeError),
    // MinLSArrival or MinLSInterval window not elapsed yet.
    SuppressedByPolicy(LsaKey, Duration),
    // The candidate instance isn't more recent than the installed one.
    StaleReplacement(LsaKey),
    LsaKeyNotFound(LsaKey),
    // Broken invariant elsewhere in the system. Never recoverable locally.
    LifecycleViolation(LsaKey, LifecycleViolation),
}

// Reason for a lifecycle violation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleViolation {
    ExpiryOnRetired,
    RefreshOnRetired,
    TimerOnDestroyed,
    RxmtCountUnderflow,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::InvalidFormat(error) => {
                warn!(%error, "{}", self);
            }
            Error::SuppressedByPolicy(lsa, remaining) => {
                debug!(%lsa, ?remaining, "{}", self);
            }
            Error::StaleReplacement(lsa) => {
                debug!(%lsa, "{}", self);
            }
            Error::LsaKeyNotFound(lsa) => {
                warn!(%lsa, "{}", self);
            }
            Error::LifecycleViolation(lsa, violation) => {
                error!(%lsa, ?violation, "{}", self);
            }
        }
    }

    // Returns whether the error indicates a broken invariant that must be
    // escalated by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::LifecycleViolation(..))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidFormat(..) => {
                write!(f, "failed to decode LSA")
            }
            Error::SuppressedByPolicy(..) => {
                write!(f, "LSA suppressed by rate-limiting policy")
            }
            Error::StaleReplacement(..) => {
                write!(f, "LSA isn't more recent than the database copy")
            }
            Error::LsaKeyNotFound(..) => {
                write!(f, "LSA not found")
            }
            Error::LifecycleViolation(_, violation) => violation.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidFormat(error) => Some(error),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(error: DecodeError) -> Error {
        Error::InvalidFormat(error)
    }
}

// ===== impl LifecycleViolation =====

impl std::fmt::Display for LifecycleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleViolation::ExpiryOnRetired => {
                write!(f, "expiry timer fired on a retired LSA")
            }
            LifecycleViolation::RefreshOnRetired => {
                write!(f, "refresh timer fired on a retired LSA")
            }
            LifecycleViolation::TimerOnDestroyed => {
                write!(f, "timer fired on a destroyed LSA")
            }
            LifecycleViolation::RxmtCountUnderflow => {
                write!(f, "unbalanced retransmission list release")
            }
        }
    }
}

impl std::error::Error for LifecycleViolation {}
