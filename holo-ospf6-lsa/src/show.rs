//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt::Write;
use std::time::Instant;

use holo_utils::task::TimeoutTask;

use crate::handler::HandlerRegistry;
use crate::lsa::{Lsa, LsaHandle};
use crate::tasks::LsaTimerMsg;

// Number of bytes per line of the hex dump.
const DUMP_LINE_SIZE: usize = 16;

// Returns the header line of the LSA summary table.
pub fn summary_header() -> String {
    format!(
        "{:<16} {:<15} {:<15} {:>4} {:>10} {:>6} {:>5}",
        "Type", "LSId", "AdvRouter", "Age", "SeqNum", "Cksum", "Len"
    )
}

// Returns a one-line summary of the LSA.
pub fn summary(lsa: &LsaHandle, now: Instant) -> String {
    let lsa = lsa.lock();
    format!(
        "{:<16} {:<15} {:<15} {:>4} {:#010x} {:#06x} {:>5}",
        lsa.hdr.lsa_type.name(),
        lsa.hdr.lsa_id,
        lsa.hdr.adv_rtr,
        lsa.logical_age(now),
        lsa.hdr.seq_no,
        lsa.hdr.cksum,
        lsa.hdr.length
    )
}

// Writes a hex dump of the raw LSA.
pub fn dump(lsa: &LsaHandle, f: &mut dyn Write) -> std::fmt::Result {
    let lsa = lsa.lock();
    dump_raw(&lsa, f)
}

// Writes the internal state of the LSA.
pub fn internal(
    lsa: &LsaHandle,
    now: Instant,
    f: &mut dyn Write,
) -> std::fmt::Result {
    let refcount = lsa.refcount();
    let lsa = lsa.lock();

    writeln!(f, "{}", lsa.name)?;
    writeln!(f, "    State: {:?}", lsa.state)?;
    writeln!(f, "    Flags: {:?}", lsa.flags)?;
    writeln!(f, "    Birth: {}s ago", elapsed(lsa.birth, now))?;
    writeln!(f, "    Installed: {}s ago", elapsed(lsa.installed, now))?;
    match lsa.originated {
        Some(originated) => {
            writeln!(f, "    Originated: {}s ago", elapsed(originated, now))?
        }
        None => writeln!(f, "    Originated: never")?,
    }
    writeln!(f, "    Refcount: {}", refcount)?;
    writeln!(f, "    Retransmissions: {}", lsa.rxmt_count)?;
    writeln!(f, "    Expiry timer: {}", timer(&lsa.expiry_timer, now))?;
    writeln!(f, "    Refresh timer: {}", timer(&lsa.refresh_timer, now))?;
    Ok(())
}

// Writes the LSA header followed by the output of the type-specific handler,
// or by a hex dump when the LSA type has no handler.
pub fn detail(
    lsa: &LsaHandle,
    registry: &HandlerRegistry,
    now: Instant,
    f: &mut dyn Write,
) -> std::fmt::Result {
    let lsa = lsa.lock();

    writeln!(f, "Age: {}", lsa.logical_age(now))?;
    writeln!(f, "Type: {} ({:#06x})", lsa.hdr.lsa_type, lsa.hdr.lsa_type.0)?;
    writeln!(f, "Scope: {:?}", lsa.hdr.lsa_type.scope())?;
    writeln!(f, "Link State ID: {}", lsa.hdr.lsa_id)?;
    writeln!(f, "Advertising Router: {}", lsa.hdr.adv_rtr)?;
    writeln!(f, "LS Sequence Number: {:#010x}", lsa.hdr.seq_no)?;
    writeln!(f, "Checksum: {:#06x} Length: {}", lsa.hdr.cksum, lsa.hdr.length)?;

    match registry.handler_for(lsa.hdr.lsa_type) {
        Some(handler) => (handler.display)(&lsa, f),
        None => dump_raw(&lsa, f),
    }
}

// ===== helper functions =====

fn dump_raw(lsa: &Lsa, f: &mut dyn Write) -> std::fmt::Result {
    for line in lsa.raw.chunks(DUMP_LINE_SIZE) {
        let line = line
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(f, "    {}", line)?;
    }
    Ok(())
}

fn elapsed(instant: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(instant).as_secs()
}

fn timer(task: &Option<TimeoutTask<LsaTimerMsg>>, now: Instant) -> String {
    match task {
        Some(task) => format!("{}s", task.remaining(now).as_secs()),
        None => "off".to_owned(),
    }
}

// ===== unit tests =====
