//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::lsdb::{
    LSA_MAX_AGE, LSA_MAX_AGE_DIFF, LSA_MIN_ARRIVAL, LSA_MIN_INTERVAL,
    LSA_REFRESH_TIME, LSA_TRANSMIT_DELAY,
};

// LSDB timers and comparison tunables.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LsdbCfg {
    // Re-origination interval of self-originated LSAs, in seconds.
    pub refresh_interval: u16,
    // Age difference above which two otherwise identical LSA instances are
    // considered different, in seconds.
    pub max_age_diff: u16,
    // MinLSArrival, in seconds.
    pub min_arrival: u64,
    // MinLSInterval, in seconds.
    pub min_interval: u64,
    // Interface transmit delay added to the LSA age on transmission, in
    // seconds.
    pub transmit_delay: u16,
    // Enabled debug message categories.
    pub debug: DebugFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct DebugFlags: u8 {
        const SEND = 0x01;
        const RECV = 0x02;
        const ORIGINATE = 0x04;
        const TIMER = 0x08;
        const DATABASE = 0x10;
        const MEMORY = 0x80;
    }
}

// LSDB configuration errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsdbCfgError {
    InvalidRefreshInterval(u16),
    InvalidMaxAgeDiff(u16),
}

// ===== impl LsdbCfg =====

impl LsdbCfg {
    pub fn validate(&self) -> Result<(), LsdbCfgError> {
        if self.refresh_interval == 0 || self.refresh_interval >= LSA_MAX_AGE {
            return Err(LsdbCfgError::InvalidRefreshInterval(
                self.refresh_interval,
            ));
        }
        if self.max_age_diff >= LSA_MAX_AGE {
            return Err(LsdbCfgError::InvalidMaxAgeDiff(self.max_age_diff));
        }

        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.into())
    }

    pub fn min_arrival(&self) -> Duration {
        Duration::from_secs(self.min_arrival)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval)
    }
}

impl Default for LsdbCfg {
    fn default() -> LsdbCfg {
        LsdbCfg {
            refresh_interval: LSA_REFRESH_TIME,
            max_age_diff: LSA_MAX_AGE_DIFF,
            min_arrival: LSA_MIN_ARRIVAL,
            min_interval: LSA_MIN_INTERVAL,
            transmit_delay: LSA_TRANSMIT_DELAY,
            debug: DebugFlags::default(),
        }
    }
}

// ===== impl DebugFlags =====

impl Default for DebugFlags {
    fn default() -> DebugFlags {
        DebugFlags::SEND
            | DebugFlags::RECV
            | DebugFlags::ORIGINATE
            | DebugFlags::TIMER
    }
}

// ===== impl LsdbCfgError =====

impl std::fmt::Display for LsdbCfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LsdbCfgError::InvalidRefreshInterval(interval) => {
                write!(f, "invalid LSA refresh interval: {}", interval)
            }
            LsdbCfgError::InvalidMaxAgeDiff(diff) => {
                write!(f, "invalid LSA MaxAgeDiff: {}", diff)
            }
        }
    }
}

impl std::error::Error for LsdbCfgError {}

// ===== unit tests =====
