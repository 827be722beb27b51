//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Instant;

use crate::debug::Debug;
use crate::error::{Error, LifecycleViolation};
use crate::lsa::{LsaHandle, LsaState};
use crate::lsdb::{Lifecycle, Lsdb};
use crate::tasks::{LsaTimerKind, LsaTimerMsg};

// ===== Timer dispatch =====

// Processes all LSA timers that expired by `now`, in deadline order.
//
// Recoverable errors are logged and don't prevent the remaining timers from
// being processed. The first lifecycle violation, if any, is returned to the
// caller once all expired timers were dispatched.
pub fn process_timers<L: Lsdb>(
    lc: &Lifecycle,
    lsdb: &mut L,
    now: Instant,
) -> Result<(), Error> {
    let mut fatal = None;

    for msg in lc.timers.expired(now) {
        let result = match msg.kind {
            LsaTimerKind::Expiry => process_lsa_expiry(lc, lsdb, msg, now),
            LsaTimerKind::Refresh => process_lsa_refresh(lc, lsdb, msg, now),
        };
        if let Err(error) = result {
            error.log();
            if error.is_fatal() && fatal.is_none() {
                fatal = Some(error);
            }
        }
    }

    match fatal {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

// ===== LSA expiry =====

pub(crate) fn process_lsa_expiry<L: Lsdb>(
    lc: &Lifecycle,
    lsdb: &mut L,
    msg: LsaTimerMsg,
    now: Instant,
) -> Result<(), Error> {
    let lsa = LsaHandle::upgrade(&msg.lsa).ok_or(Error::LifecycleViolation(
        msg.key,
        LifecycleViolation::TimerOnDestroyed,
    ))?;

    {
        let mut lsa = lsa.lock();
        if lsa.state == LsaState::Retired {
            return Err(Error::LifecycleViolation(
                msg.key,
                LifecycleViolation::ExpiryOnRetired,
            ));
        }

        lsa.expiry_timer = None;
        lsa.refresh_timer = None;
        lsa.set_maxage(now);
        lsa.state = LsaState::MaxAged;
        Debug::LsaExpire(&lsa.hdr).log(lc.config.debug);
    }

    // Hand the LSA over to the LSDB for flushing.
    if lsa.lock().lsdb == Some(lsdb.id()) {
        lsdb.maxage(&lsa);
    }

    Ok(())
}

// ===== LSA refresh =====

pub(crate) fn process_lsa_refresh<L: Lsdb>(
    lc: &Lifecycle,
    lsdb: &mut L,
    msg: LsaTimerMsg,
    now: Instant,
) -> Result<(), Error> {
    let lsa = LsaHandle::upgrade(&msg.lsa).ok_or(Error::LifecycleViolation(
        msg.key,
        LifecycleViolation::TimerOnDestroyed,
    ))?;

    {
        let mut lsa = lsa.lock();
        if lsa.state == LsaState::Retired {
            return Err(Error::LifecycleViolation(
                msg.key,
                LifecycleViolation::RefreshOnRetired,
            ));
        }
        lsa.refresh_timer = None;

        // Skip the refresh if the LSA is no longer owned by this router, or
        // if it's already being flushed.
        if !lsa.is_self_originated()
            || lsa.hdr.adv_rtr != lc.router_id
            || lsa.is_maxage(now)
        {
            Debug::LsaRefreshSkip(&lsa.hdr).log(lc.config.debug);
            return Ok(());
        }

        Debug::LsaRefresh(&lsa.hdr).log(lc.config.debug);
    }

    lc.reoriginate(lsdb, &lsa, now)
}

// ===== unit tests =====
