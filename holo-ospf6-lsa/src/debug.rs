//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::config::DebugFlags;
use crate::packet::lsa::LsaHdr;

// LSA lifecycle debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Memory
    LsaCreate(&'a str),
    LsaDestroy(&'a str),
    // Reception
    LsaMinArrivalDiscard(&'a LsaHdr),
    LsaStaleDiscard(&'a LsaHdr),
    // Transmission
    LsaTransmit(&'a LsaHdr, u16),
    // Origination
    LsaOriginate(&'a LsaHdr),
    LsaOriginateMinInterval(&'a LsaHdr),
    LsaPrefixFilter(&'a Ipv6Addr, &'static str),
    // LSDB maintenance
    LsaInstall(&'a LsaHdr),
    LsaRetire(&'a LsaHdr),
    LsaFlush(&'a LsaHdr, LsaFlushReason),
    // Timers
    LsaExpire(&'a LsaHdr),
    LsaRefresh(&'a LsaHdr),
    LsaRefreshSkip(&'a LsaHdr),
}

// Reason why an LSA is being flushed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaFlushReason {
    Expiry,
    PrematureAging,
    SeqNoWrapping,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API, unless its category is
    // disabled in `flags`.
    pub fn log(&self, flags: DebugFlags) {
        if !flags.intersects(self.category()) {
            return;
        }

        debug_span!("lsa").in_scope(|| match self {
            Debug::LsaCreate(name) | Debug::LsaDestroy(name) => {
                debug!(%name, "{}", self);
            }
            Debug::LsaMinArrivalDiscard(lsa_hdr)
            | Debug::LsaStaleDiscard(lsa_hdr)
            | Debug::LsaOriginate(lsa_hdr)
            | Debug::LsaOriginateMinInterval(lsa_hdr)
            | Debug::LsaInstall(lsa_hdr)
            | Debug::LsaRetire(lsa_hdr)
            | Debug::LsaExpire(lsa_hdr)
            | Debug::LsaRefresh(lsa_hdr)
            | Debug::LsaRefreshSkip(lsa_hdr) => {
                debug!(%lsa_hdr, "{}", self);
            }
            Debug::LsaTransmit(lsa_hdr, age) => {
                debug!(%lsa_hdr, %age, "{}", self);
            }
            Debug::LsaPrefixFilter(prefix, reason) => {
                debug!(%prefix, %reason, "{}", self);
            }
            Debug::LsaFlush(lsa_hdr, reason) => {
                debug!(%lsa_hdr, %reason, "{}", self);
            }
        })
    }

    // Returns the debug category this message belongs to.
    pub fn category(&self) -> DebugFlags {
        match self {
            Debug::LsaCreate(..) | Debug::LsaDestroy(..) => DebugFlags::MEMORY,
            Debug::LsaMinArrivalDiscard(..) | Debug::LsaStaleDiscard(..) => {
                DebugFlags::RECV
            }
            Debug::LsaTransmit(..) => DebugFlags::SEND,
            Debug::LsaOriginate(..)
            | Debug::LsaOriginateMinInterval(..)
            | Debug::LsaPrefixFilter(..) => DebugFlags::ORIGINATE,
            Debug::LsaInstall(..)
            | Debug::LsaRetire(..)
            | Debug::LsaFlush(..) => DebugFlags::DATABASE,
            Debug::LsaExpire(..)
            | Debug::LsaRefresh(..)
            | Debug::LsaRefreshSkip(..) => DebugFlags::TIMER,
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::LsaCreate(..) => {
                write!(f, "LSA created")
            }
            Debug::LsaDestroy(..) => {
                write!(f, "LSA destroyed")
            }
            Debug::LsaMinArrivalDiscard(..) => {
                write!(f, "discarding LSA due to the MinLSArrival check")
            }
            Debug::LsaStaleDiscard(..) => {
                write!(f, "discarding LSA older than the database copy")
            }
            Debug::LsaTransmit(..) => {
                write!(f, "encoding LSA for transmission")
            }
            Debug::LsaOriginate(..) => {
                write!(f, "originating LSA")
            }
            Debug::LsaOriginateMinInterval(..) => {
                write!(
                    f,
                    "postponing LSA origination due to the MinLSInterval check"
                )
            }
            Debug::LsaPrefixFilter(..) => {
                write!(f, "ignoring prefix not suitable for origination")
            }
            Debug::LsaInstall(..) => {
                write!(f, "installing LSA")
            }
            Debug::LsaRetire(..) => {
                write!(f, "retiring LSA")
            }
            Debug::LsaFlush(..) => {
                write!(f, "flushing LSA")
            }
            Debug::LsaExpire(..) => {
                write!(f, "LSA reached MaxAge")
            }
            Debug::LsaRefresh(..) => {
                write!(f, "refreshing LSA")
            }
            Debug::LsaRefreshSkip(..) => {
                write!(f, "skipping refresh of LSA not self-originated")
            }
        }
    }
}

// ===== impl LsaFlushReason =====

impl std::fmt::Display for LsaFlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LsaFlushReason::Expiry => write!(f, "expiry"),
            LsaFlushReason::PrematureAging => write!(f, "premature aging"),
            LsaFlushReason::SeqNoWrapping => {
                write!(f, "sequence number wrapping")
            }
        }
    }
}
