//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::{Mutex, Weak};
use std::time::{Duration, Instant};

use holo_utils::task::{TimeoutTask, TimerQueue};

use crate::lsa::{Lsa, LsaHandle};
use crate::packet::lsa::LsaKey;

//
// LSA timers diagram:
//
//                                    +--------------+
//           lsa_expiry_timer (Nx) -> |              |
//                                    |  TimerQueue  | -> process_timers()
//          lsa_refresh_timer (Nx) -> |              |
//                                    +--------------+
//
// Every timer is owned by the LSA it refers to. Dropping the LSA (or
// replacing the timer handle) removes the pending message from the queue
// synchronously.
//

// Message delivered when an LSA timer expires.
#[derive(Debug)]
pub struct LsaTimerMsg {
    pub kind: LsaTimerKind,
    pub key: LsaKey,
    pub lsa: Weak<Mutex<Lsa>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsaTimerKind {
    Expiry,
    Refresh,
}

// ===== LSA tasks =====

// LSA expiry timer task.
pub(crate) fn lsa_expiry_timer(
    lsa: &LsaHandle,
    key: LsaKey,
    timeout: Duration,
    timers: &TimerQueue<LsaTimerMsg>,
    now: Instant,
) -> TimeoutTask<LsaTimerMsg> {
    let msg = LsaTimerMsg {
        kind: LsaTimerKind::Expiry,
        key,
        lsa: lsa.downgrade(),
    };
    timers.timeout(now, timeout, msg)
}

// LSA refresh timer task.
pub(crate) fn lsa_refresh_timer(
    lsa: &LsaHandle,
    key: LsaKey,
    timeout: Duration,
    timers: &TimerQueue<LsaTimerMsg>,
    now: Instant,
) -> TimeoutTask<LsaTimerMsg> {
    let msg = LsaTimerMsg {
        kind: LsaTimerKind::Refresh,
        key,
        lsa: lsa.downgrade(),
    };
    timers.timeout(now, timeout, msg)
}
