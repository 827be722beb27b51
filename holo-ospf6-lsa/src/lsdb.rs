//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use holo_utils::task::TimerQueue;

use crate::config::{DebugFlags, LsdbCfg};
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::lsa::{LsaFlags, LsaHandle, LsaState};
use crate::packet::error::DecodeError;
use crate::packet::lsa::{LsaHdr, LsaKey, LsaType, lsa_checksum};
use crate::tasks::{self, LsaTimerMsg};

// LSA architectural constants.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 300;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_INTERVAL: u64 = 5;
pub const LSA_MIN_ARRIVAL: u64 = 1;
pub const LSA_TRANSMIT_DELAY: u16 = 1;

pub type LsdbId = u32;

// Keyed LSA container.
//
// The LSDB owns the reference it's given on insertion and returns it on
// removal. The lifecycle controller never indexes LSAs itself.
pub trait Lsdb {
    // Returns the LSDB identifier.
    fn id(&self) -> LsdbId;

    // Looks up an LSA by its key.
    fn get(&self, key: &LsaKey) -> Option<&LsaHandle>;

    // Stores an LSA, returning the previous instance with the same key.
    fn insert(&mut self, key: LsaKey, lsa: LsaHandle) -> Option<LsaHandle>;

    // Removes an LSA.
    fn remove(&mut self, key: &LsaKey) -> Option<LsaHandle>;

    // Notifies that an installed LSA has reached MaxAge and is eligible for
    // flushing.
    fn maxage(&mut self, lsa: &LsaHandle);
}

// LSDB backed by an ordered map.
#[derive(Debug, Default)]
pub struct LsdbMap {
    id: LsdbId,
    lsas: BTreeMap<LsaKey, LsaHandle>,
    maxage_lsas: Vec<LsaKey>,
}

// LSA lifecycle controller.
//
// Installs, originates, ages and retires LSAs on behalf of an LSDB. All LSA
// timers are armed in `timers`, whose expired messages must be dispatched
// using `events::process_timers`.
#[derive(Debug)]
pub struct Lifecycle {
    pub router_id: Ipv4Addr,
    pub config: LsdbCfg,
    pub timers: TimerQueue<LsaTimerMsg>,
    // Bodies of self-originated LSAs waiting for the current instance, which
    // used the last sequence number, to be flushed.
    seqno_wrapping: Mutex<BTreeMap<LsaKey, Bytes>>,
}

// Outcome of a self-originated LSA origination.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsaOrigination {
    // A new instance was installed.
    Originated(LsaHdr),
    // The installed instance already has the same content.
    Unchanged,
    // The sequence number space is exhausted. The new instance is originated
    // once the current one is flushed and retired.
    Deferred,
}

// Fields of an LSA used by the freshness comparison.
#[derive(Clone, Copy, Debug)]
struct LsaSnapshot {
    hdr: LsaHdr,
    age: u16,
}

// ===== impl LsdbMap =====

impl LsdbMap {
    pub fn new(id: LsdbId) -> LsdbMap {
        LsdbMap {
            id,
            ..Default::default()
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LsaKey, &LsaHandle)> + '_ {
        self.lsas.iter()
    }

    pub fn len(&self) -> usize {
        self.lsas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lsas.is_empty()
    }

    // Returns the keys of the LSAs that reached MaxAge since the last call.
    pub fn take_maxage(&mut self) -> Vec<LsaKey> {
        std::mem::take(&mut self.maxage_lsas)
    }
}

impl Lsdb for LsdbMap {
    fn id(&self) -> LsdbId {
        self.id
    }

    fn get(&self, key: &LsaKey) -> Option<&LsaHandle> {
        self.lsas.get(key)
    }

    fn insert(&mut self, key: LsaKey, lsa: LsaHandle) -> Option<LsaHandle> {
        self.lsas.insert(key, lsa)
    }

    fn remove(&mut self, key: &LsaKey) -> Option<LsaHandle> {
        self.lsas.remove(key)
    }

    fn maxage(&mut self, lsa: &LsaHandle) {
        let key = lsa.key();
        if !self.maxage_lsas.contains(&key) {
            self.maxage_lsas.push(key);
        }
    }
}

// ===== impl LsaOrigination =====

impl LsaOrigination {
    // Returns the header of the originated instance, if any.
    pub fn hdr(&self) -> Option<LsaHdr> {
        match self {
            LsaOrigination::Originated(hdr) => Some(*hdr),
            LsaOrigination::Unchanged | LsaOrigination::Deferred => None,
        }
    }
}

// ===== impl Lifecycle =====

impl Lifecycle {
    pub fn new(router_id: Ipv4Addr, config: LsdbCfg) -> Lifecycle {
        Lifecycle {
            router_id,
            config,
            timers: TimerQueue::new(),
            seqno_wrapping: Default::default(),
        }
    }

    // Returns whether an origination is waiting for the installed instance
    // with the given key to be flushed.
    pub fn is_seqno_wrapping(&self, key: &LsaKey) -> bool {
        self.seqno_wrapping().contains_key(key)
    }

    fn seqno_wrapping(&self) -> MutexGuard<'_, BTreeMap<LsaKey, Bytes>> {
        self.seqno_wrapping
            .lock()
            .unwrap_or_else(|error| error.into_inner())
    }

    // Installs the provided LSA into the LSDB, retiring the previous instance
    // if any.
    //
    // The expiry timer is armed for the time left until MaxAge, and the
    // refresh timer for self-originated LSAs. LSAs installed with MaxAge are
    // handed to the LSDB for flushing right away.
    pub fn install<L: Lsdb>(&self, lsdb: &mut L, lsa: LsaHandle, now: Instant) {
        let key = lsa.key();
        let (old_installed, reinstall) = match lsdb.get(&key) {
            Some(old) => (Some(old.lock().installed), old.ptr_eq(&lsa)),
            None => (None, false),
        };

        let maxage = {
            let mut lsa_mut = lsa.lock();
            lsa_mut.rebase_age(now);
            if let Some(old_installed) = old_installed {
                lsa_mut.installed =
                    std::cmp::max(lsa_mut.installed, old_installed);
            }
            lsa_mut.lsdb = Some(lsdb.id());
            lsa_mut.debug = self.config.debug;
            lsa_mut.disarm_timers();

            let maxage = lsa_mut.is_maxage(now);
            if maxage {
                lsa_mut.state = LsaState::MaxAged;
            } else {
                lsa_mut.state = LsaState::Expiring;
                let timeout = lsa_mut.maxage_remaining(now);
                lsa_mut.expiry_timer = Some(tasks::lsa_expiry_timer(
                    &lsa,
                    key,
                    timeout,
                    &self.timers,
                    now,
                ));
                if lsa_mut.is_self_originated() {
                    lsa_mut.refresh_timer = Some(tasks::lsa_refresh_timer(
                        &lsa,
                        key,
                        self.config.refresh_interval(),
                        &self.timers,
                        now,
                    ));
                }
            }
            Debug::LsaInstall(&lsa_mut.hdr).log(self.config.debug);
            maxage
        };

        // Replace the old instance.
        if let Some(old) = lsdb.insert(key, lsa) {
            if reinstall {
                old.release();
            } else {
                lsa_retire(old, self.config.debug);
            }
        }

        if maxage && let Some(lsa) = lsdb.get(&key).map(LsaHandle::retain) {
            lsdb.maxage(&lsa);
        }
    }

    // Processes an LSA received from the network.
    //
    // The LSA is discarded when the installed instance was installed less
    // than MinLSArrival ago, or when it isn't more recent than the installed
    // instance.
    pub fn receive<L: Lsdb>(
        &self,
        lsdb: &mut L,
        lsa: LsaHandle,
        now: Instant,
    ) -> Result<(), Error> {
        let (key, hdr) = {
            let lsa = lsa.lock();
            lsa.validate()?;
            (lsa.key(), lsa.hdr)
        };

        if let Some(old) = lsdb.get(&key) {
            let remaining = self.min_arrival_remaining(old, now);
            if !remaining.is_zero() {
                Debug::LsaMinArrivalDiscard(&hdr).log(self.config.debug);
                return Err(Error::SuppressedByPolicy(key, remaining));
            }

            if lsa_compare(&lsa, old, now, self.config.max_age_diff)
                != Ordering::Greater
            {
                Debug::LsaStaleDiscard(&hdr).log(self.config.debug);
                return Err(Error::StaleReplacement(key));
            }
        }

        lsa.lock().flags.insert(LsaFlags::RECEIVED);
        self.install(lsdb, lsa, now);
        Ok(())
    }

    // Originates a new instance of a self-originated LSA.
    //
    // Nothing is originated when the content of the installed instance
    // didn't change. When the installed instance used the last sequence
    // number, it's flushed first and the origination is deferred until it's
    // retired.
    pub fn originate<L: Lsdb>(
        &self,
        lsdb: &mut L,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        body: &[u8],
        now: Instant,
    ) -> Result<LsaOrigination, Error> {
        let key = LsaKey::new(lsa_type, self.router_id, lsa_id);

        let mut seq_no = LSA_INIT_SEQ_NO;
        if let Some(old) = lsdb.get(&key) {
            let old_lsa = old.lock();
            let old_seq_no = old_lsa.hdr.seq_no;
            let old_maxage = old_lsa.is_maxage(now);

            // Check if the LSA content has changed.
            if !old_maxage
                && old_lsa.is_self_originated()
                && !old_lsa.is_header_only()
                && old_lsa.body() == body
            {
                return Ok(LsaOrigination::Unchanged);
            }

            // Check the MinLSInterval.
            let remaining =
                self.min_interval_remaining(old_lsa.originated, now);
            if !remaining.is_zero() {
                Debug::LsaOriginateMinInterval(&old_lsa.hdr)
                    .log(self.config.debug);
                return Err(Error::SuppressedByPolicy(key, remaining));
            }
            drop(old_lsa);

            // The current instance must be flushed before the sequence number
            // can start over.
            if old_seq_no == LSA_MAX_SEQ_NO {
                self.seqno_wrapping()
                    .insert(key, Bytes::copy_from_slice(body));
                if !old_maxage {
                    self.lsa_flush(old, LsaFlushReason::SeqNoWrapping, now);
                }
                return Ok(LsaOrigination::Deferred);
            }

            seq_no = old_seq_no.wrapping_add(1);
        }

        let hdr =
            self.originate_instance(lsdb, lsa_type, lsa_id, seq_no, body, now)?;
        Ok(LsaOrigination::Originated(hdr))
    }

    // Re-originates a self-originated LSA with the same content and the next
    // sequence number.
    pub(crate) fn reoriginate<L: Lsdb>(
        &self,
        lsdb: &mut L,
        lsa: &LsaHandle,
        now: Instant,
    ) -> Result<(), Error> {
        let (hdr, body) = {
            let lsa = lsa.lock();
            (lsa.hdr, lsa.raw.slice(LsaHdr::LENGTH as usize..))
        };

        if hdr.seq_no == LSA_MAX_SEQ_NO {
            self.seqno_wrapping().insert(hdr.key(), body);
            self.lsa_flush(lsa, LsaFlushReason::SeqNoWrapping, now);
            return Ok(());
        }

        let seq_no = hdr.seq_no.wrapping_add(1);
        self.originate_instance(
            lsdb,
            hdr.lsa_type,
            hdr.lsa_id,
            seq_no,
            &body,
            now,
        )?;
        Ok(())
    }

    fn originate_instance<L: Lsdb>(
        &self,
        lsdb: &mut L,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        seq_no: u32,
        body: &[u8],
        now: Instant,
    ) -> Result<LsaHdr, Error> {
        let length = LsaHdr::LENGTH as usize + body.len();
        let length = u16::try_from(length)
            .ok()
            .filter(|length| *length <= LsaHdr::MAX_LSA_LENGTH)
            .ok_or(DecodeError::LsaTooLarge(
                length.try_into().unwrap_or(u16::MAX),
            ))?;

        let mut hdr =
            LsaHdr::new(0, lsa_type, lsa_id, self.router_id, seq_no, 0, length);
        hdr.cksum = lsa_body_checksum(&hdr, body);

        let lsa = LsaHandle::create(hdr, body, now)?;
        {
            let mut lsa = lsa.lock();
            lsa.flags.insert(LsaFlags::SELF_ORIGINATED);
            lsa.originated = Some(now);
            Debug::LsaCreate(&lsa.name).log(self.config.debug);
        }
        Debug::LsaOriginate(&hdr).log(self.config.debug);
        self.seqno_wrapping().remove(&hdr.key());

        self.install(lsdb, lsa, now);
        Ok(hdr)
    }

    // Returns the time left before a new instance of the given self-originated
    // LSA can be originated, or zero if it can be originated right away.
    pub fn prohibited_duration<L: Lsdb>(
        &self,
        lsdb: &L,
        key: &LsaKey,
        now: Instant,
    ) -> Duration {
        let originated = lsdb.get(key).and_then(|lsa| lsa.lock().originated);
        self.min_interval_remaining(originated, now)
    }

    fn min_interval_remaining(
        &self,
        originated: Option<Instant>,
        now: Instant,
    ) -> Duration {
        match originated {
            Some(originated) => self
                .config
                .min_interval()
                .saturating_sub(now.saturating_duration_since(originated)),
            None => Duration::ZERO,
        }
    }

    fn min_arrival_remaining(&self, old: &LsaHandle, now: Instant) -> Duration {
        let installed = old.lock().installed;
        self.config
            .min_arrival()
            .saturating_sub(now.saturating_duration_since(installed))
    }

    // Checks whether the given IPv6 address can be advertised in a prefix
    // originated by this router.
    pub fn prefix_is_originable(&self, addr: &Ipv6Addr) -> bool {
        let reason = if addr.is_unspecified() {
            Some("unspecified address")
        } else if addr.is_loopback() {
            Some("loopback address")
        } else if addr.is_unicast_link_local() {
            Some("link-local address")
        } else if addr.to_ipv4_mapped().is_some() {
            Some("IPv4-mapped address")
        } else if addr.segments()[0..6].iter().all(|segment| *segment == 0) {
            Some("IPv4-compatible address")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                Debug::LsaPrefixFilter(addr, reason).log(self.config.debug);
                false
            }
            None => true,
        }
    }

    // Prematurely ages the LSA so that it gets flushed ahead of its natural
    // expiration.
    //
    // The age is set to MaxAge right away, and the expiry path runs on the
    // next dispatch of the timer queue.
    pub fn premature_age(&self, lsa: &LsaHandle, now: Instant) {
        self.lsa_flush(lsa, LsaFlushReason::PrematureAging, now);
    }

    // Prematurely ages the installed LSA with the given key.
    pub fn flush<L: Lsdb>(
        &self,
        lsdb: &L,
        key: &LsaKey,
        now: Instant,
    ) -> Result<(), Error> {
        let lsa = lsdb.get(key).ok_or(Error::LsaKeyNotFound(*key))?;
        self.premature_age(lsa, now);
        Ok(())
    }

    fn lsa_flush(&self, lsa: &LsaHandle, reason: LsaFlushReason, now: Instant) {
        let mut lsa_mut = lsa.lock();
        Debug::LsaFlush(&lsa_mut.hdr, reason).log(self.config.debug);

        lsa_mut.set_maxage(now);
        lsa_mut.refresh_timer = None;
        if lsa_mut.state != LsaState::Retired {
            let key = lsa_mut.key();
            lsa_mut.state = LsaState::Expiring;
            lsa_mut.expiry_timer = Some(tasks::lsa_expiry_timer(
                lsa,
                key,
                Duration::ZERO,
                &self.timers,
                now,
            ));
        }
    }

    // Removes the LSA from the LSDB and retires it.
    //
    // If an origination was deferred until this LSA was flushed, the new
    // instance is originated with the initial sequence number.
    pub fn retire<L: Lsdb>(
        &self,
        lsdb: &mut L,
        key: &LsaKey,
        now: Instant,
    ) -> Result<(), Error> {
        let lsa = lsdb.remove(key).ok_or(Error::LsaKeyNotFound(*key))?;
        lsa_retire(lsa, self.config.debug);

        let pending = self.seqno_wrapping().remove(key);
        if let Some(body) = pending
            && key.adv_rtr == self.router_id
        {
            self.originate_instance(
                lsdb,
                key.lsa_type,
                key.lsa_id,
                LSA_INIT_SEQ_NO,
                &body,
                now,
            )?;
        }

        Ok(())
    }

    // Returns the LSA encoded for transmission, with the age field updated.
    pub fn encode_for_transmission(
        &self,
        lsa: &LsaHandle,
        now: Instant,
    ) -> Bytes {
        let lsa = lsa.lock();
        let raw = lsa.raw_for_transmission(now, self.config.transmit_delay);
        let age = lsa.age_for_transmission(now, self.config.transmit_delay);
        Debug::LsaTransmit(&lsa.hdr, age).log(self.config.debug);
        raw
    }
}

// ===== global functions =====

// Compares two LSA headers, given their current ages, to determine which one
// is more recent. This follows the algorithm described in Section 13.1 of RFC
// 2328, with sequence numbers compared in circular space.
//
// Returns:
// - Ordering::Greater when `a` is more recent
// - Ordering::Less when `b` is more recent
// - Ordering::Equal when the two LSAs are considered to be identical
pub fn lsa_hdr_compare(
    a: &LsaHdr,
    a_age: u16,
    b: &LsaHdr,
    b_age: u16,
    max_age_diff: u16,
) -> Ordering {
    let seq_no_diff = a.seq_no.wrapping_sub(b.seq_no) as i32;
    let cmp = seq_no_diff.cmp(&0);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let cmp = a.cksum.cmp(&b.cksum);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let a_maxage = a_age == LSA_MAX_AGE;
    let b_maxage = b_age == LSA_MAX_AGE;
    if a_maxage && !b_maxage {
        return Ordering::Greater;
    } else if !a_maxage && b_maxage {
        return Ordering::Less;
    }

    if a_age.abs_diff(b_age) > max_age_diff {
        return b_age.cmp(&a_age);
    }

    Ordering::Equal
}

// Compares two instances of the same LSA using their current ages.
pub fn lsa_compare(
    a: &LsaHandle,
    b: &LsaHandle,
    now: Instant,
    max_age_diff: u16,
) -> Ordering {
    let a = lsa_snapshot(a, now);
    let b = lsa_snapshot(b, now);
    lsa_hdr_compare(&a.hdr, a.age, &b.hdr, b.age, max_age_diff)
}

// Checks whether two LSAs share the same identity.
pub fn lsa_is_same(a: &LsaHandle, b: &LsaHandle) -> bool {
    a.ptr_eq(b) || a.key() == b.key()
}

// Checks whether two instances of the same LSA differ in any of the fields
// used to determine freshness.
pub fn lsa_is_differ(
    a: &LsaHandle,
    b: &LsaHandle,
    now: Instant,
    max_age_diff: u16,
) -> bool {
    lsa_compare(a, b, now, max_age_diff) != Ordering::Equal
}

// Checks whether the contents of two instances of the same LSA differ.
pub fn lsa_is_changed(a: &LsaHandle, b: &LsaHandle) -> bool {
    let (a_length, a_raw) = lsa_content(a);
    let (b_length, b_raw) = lsa_content(b);
    if a_length != b_length {
        return true;
    }

    let hdr_length = LsaHdr::LENGTH as usize;
    a_raw[hdr_length..] != b_raw[hdr_length..]
}

// Computes the checksum of an LSA about to be originated.
pub fn lsa_body_checksum(hdr: &LsaHdr, body: &[u8]) -> u16 {
    let mut buf = BytesMut::with_capacity(LsaHdr::LENGTH as usize + body.len());
    hdr.encode(&mut buf);
    buf.extend_from_slice(body);
    lsa_checksum(&buf)
}

// ===== helper functions =====

fn lsa_retire(lsa: LsaHandle, debug: DebugFlags) {
    {
        let mut lsa = lsa.lock();
        lsa.state = LsaState::Retired;
        lsa.disarm_timers();
        lsa.lsdb = None;
        Debug::LsaRetire(&lsa.hdr).log(debug);
    }
    lsa.release();
}

fn lsa_snapshot(lsa: &LsaHandle, now: Instant) -> LsaSnapshot {
    let lsa = lsa.lock();
    LsaSnapshot {
        hdr: lsa.hdr,
        age: lsa.logical_age(now),
    }
}

fn lsa_content(lsa: &LsaHandle) -> (u16, Bytes) {
    let lsa = lsa.lock();
    (lsa.hdr.length, lsa.raw.clone())
}

// ===== unit tests =====
