//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use bitflags::bitflags;
use bytes::{Buf, Bytes, BytesMut};
use holo_utils::task::TimeoutTask;
use serde::{Deserialize, Serialize};

use crate::config::DebugFlags;
use crate::debug::Debug;
use crate::error::{Error, LifecycleViolation};
use crate::lsdb::{LSA_MAX_AGE, LSA_RESERVED_SEQ_NO, LsdbId};
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lsa::{LsaHdr, LsaKey, lsa_checksum_is_valid};
use crate::tasks::LsaTimerMsg;

// Maximum size of the LSA diagnostic name.
const LSA_NAME_MAX_SIZE: usize = 64;

// OSPFv3 LSA instance.
#[derive(Debug)]
pub struct Lsa {
    // LSA header.
    pub(crate) hdr: LsaHdr,
    // LSA raw bytes (header followed by the body). The body never changes
    // once the LSA is created; only the age field may be rewritten.
    pub(crate) raw: Bytes,
    // Diagnostic name.
    pub(crate) name: String,
    // LSA flags.
    pub(crate) flags: LsaFlags,
    // Lifecycle state.
    pub(crate) state: LsaState,
    // Time at which the LSA had age zero.
    pub(crate) birth: Instant,
    // Time the LSA was installed. The age field in the header is relative to
    // this instant.
    pub(crate) installed: Instant,
    // Time the LSA was self-originated.
    pub(crate) originated: Option<Instant>,
    // Number of retransmission lists holding this LSA.
    pub(crate) rxmt_count: u32,
    // LSDB the LSA is installed in, if any.
    pub(crate) lsdb: Option<LsdbId>,
    // Expiry timer that triggers when the LSA age reaches MaxAge.
    pub(crate) expiry_timer: Option<TimeoutTask<LsaTimerMsg>>,
    // Refresh timer of self-originated LSAs.
    pub(crate) refresh_timer: Option<TimeoutTask<LsaTimerMsg>>,
    // Debug categories enabled by the lifecycle owning the LSA.
    pub(crate) debug: DebugFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaFlags: u8 {
        const HEADER_ONLY = 0x01;
        const FLOOD_BACK = 0x02;
        const DUPLICATE = 0x04;
        const IMPLIED_ACK = 0x08;
        const RECEIVED = 0x10;
        const SELF_ORIGINATED = 0x20;
    }
}

// Flags that flooding decisions are allowed to update.
const LSA_FLOOD_FLAGS: LsaFlags = LsaFlags::FLOOD_BACK
    .union(LsaFlags::DUPLICATE)
    .union(LsaFlags::IMPLIED_ACK);

// LSA lifecycle state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaState {
    Fresh,
    Expiring,
    MaxAged,
    Retired,
}

// Reference-counted handle to an LSA instance.
//
// The handle returned on creation holds the first reference, which is
// normally given to the LSDB. Any other component keeping the LSA around must
// obtain its own handle using `retain`. The LSA is destroyed, and its pending
// timers canceled, when the last handle is released.
#[derive(Debug)]
pub struct LsaHandle(Arc<Mutex<Lsa>>);

// ===== impl Lsa =====

impl Lsa {
    fn new(hdr: LsaHdr, raw: Bytes, flags: LsaFlags, now: Instant) -> Lsa {
        let birth = now
            .checked_sub(Duration::from_secs(hdr.age.into()))
            .unwrap_or(now);

        Lsa {
            hdr,
            raw,
            name: lsa_name(&hdr.key()),
            flags,
            state: LsaState::Fresh,
            birth,
            installed: now,
            originated: None,
            rxmt_count: 0,
            lsdb: None,
            expiry_timer: None,
            refresh_timer: None,
            debug: DebugFlags::empty(),
        }
    }

    pub fn hdr(&self) -> &LsaHdr {
        &self.hdr
    }

    pub fn key(&self) -> LsaKey {
        self.hdr.key()
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> LsaFlags {
        self.flags
    }

    pub fn state(&self) -> LsaState {
        self.state
    }

    pub fn installed(&self) -> Instant {
        self.installed
    }

    pub fn originated(&self) -> Option<Instant> {
        self.originated
    }

    pub fn rxmt_count(&self) -> u32 {
        self.rxmt_count
    }

    pub fn lsdb(&self) -> Option<LsdbId> {
        self.lsdb
    }

    // Returns the time left before the expiry timer fires, if armed.
    pub fn expiry_remaining(&self, now: Instant) -> Option<Duration> {
        self.expiry_timer.as_ref().map(|timer| timer.remaining(now))
    }

    // Returns the time left before the refresh timer fires, if armed.
    pub fn refresh_remaining(&self, now: Instant) -> Option<Duration> {
        self.refresh_timer.as_ref().map(|timer| timer.remaining(now))
    }

    // Returns the LSA body. Header-only LSAs have an empty body.
    pub fn body(&self) -> &[u8] {
        &self.raw[LsaHdr::LENGTH as usize..]
    }

    pub fn is_header_only(&self) -> bool {
        self.flags.contains(LsaFlags::HEADER_ONLY)
    }

    pub fn is_self_originated(&self) -> bool {
        self.flags.contains(LsaFlags::SELF_ORIGINATED)
    }

    pub fn validate(&self) -> DecodeResult<()> {
        if self.hdr.age > LSA_MAX_AGE {
            return Err(DecodeError::InvalidLsaAge(self.hdr.age));
        }
        if self.hdr.seq_no == LSA_RESERVED_SEQ_NO {
            return Err(DecodeError::InvalidLsaSeqNo(self.hdr.seq_no));
        }
        if !self.is_header_only() && !lsa_checksum_is_valid(&self.raw) {
            return Err(DecodeError::InvalidChecksum);
        }

        Ok(())
    }

    // Cancels the expiry and refresh timers, if armed.
    pub(crate) fn disarm_timers(&mut self) {
        self.expiry_timer = None;
        self.refresh_timer = None;
    }
}

impl Drop for Lsa {
    fn drop(&mut self) {
        Debug::LsaDestroy(&self.name).log(self.debug);
    }
}

// ===== impl LsaHandle =====

impl LsaHandle {
    // Creates an LSA from its header and body.
    //
    // The header length must match the body size. The age field is reset to
    // zero. The checksum is stored as given and is never recomputed here.
    pub fn create(
        mut hdr: LsaHdr,
        body: &[u8],
        now: Instant,
    ) -> DecodeResult<LsaHandle> {
        if hdr.length < LsaHdr::LENGTH {
            return Err(DecodeError::InvalidLsaLength(hdr.length));
        }
        if hdr.length > LsaHdr::MAX_LSA_LENGTH {
            return Err(DecodeError::LsaTooLarge(hdr.length));
        }
        if hdr.body_length() as usize != body.len() {
            return Err(DecodeError::InvalidLsaLength(hdr.length));
        }
        hdr.age = 0;

        let mut buf = BytesMut::with_capacity(hdr.length as usize);
        hdr.encode(&mut buf);
        buf.extend_from_slice(body);

        let lsa = Lsa::new(hdr, buf.freeze(), LsaFlags::empty(), now);
        Ok(LsaHandle::new(lsa))
    }

    // Creates a placeholder LSA consisting of the header only.
    pub fn create_header_only(hdr: LsaHdr, now: Instant) -> LsaHandle {
        let mut buf = BytesMut::with_capacity(LsaHdr::LENGTH as usize);
        hdr.encode(&mut buf);

        let lsa = Lsa::new(hdr, buf.freeze(), LsaFlags::HEADER_ONLY, now);
        LsaHandle::new(lsa)
    }

    // Decodes an LSA from a bytes buffer.
    pub fn decode(buf: &mut Bytes, now: Instant) -> DecodeResult<LsaHandle> {
        let buf_orig = buf.clone();
        let hdr = LsaHdr::decode(buf)?;

        let body_len = hdr.body_length() as usize;
        if buf.remaining() < body_len {
            return Err(DecodeError::TruncatedLsa(hdr.length, buf_orig.len()));
        }
        buf.advance(body_len);

        let raw = buf_orig.slice(0..hdr.length as usize);
        let lsa = Lsa::new(hdr, raw, LsaFlags::empty(), now);
        Ok(LsaHandle::new(lsa))
    }

    fn new(lsa: Lsa) -> LsaHandle {
        LsaHandle(Arc::new(Mutex::new(lsa)))
    }

    // Returns a new handle to the same LSA.
    pub fn retain(&self) -> LsaHandle {
        LsaHandle(self.0.clone())
    }

    // Releases this handle. Releasing the last handle destroys the LSA.
    pub fn release(self) {
        drop(self);
    }

    // Returns an independent copy of the LSA. The copy has its own reference
    // count and shares no mutable state with the original.
    pub fn copy(&self, now: Instant) -> LsaHandle {
        let lsa = self.lock();
        let raw = Bytes::copy_from_slice(&lsa.raw);
        let mut copy = Lsa::new(lsa.hdr, raw, lsa.flags, now);
        copy.birth = lsa.birth;
        copy.installed = lsa.installed;
        copy.originated = lsa.originated;
        copy.debug = lsa.debug;
        drop(lsa);

        LsaHandle::new(copy)
    }

    // Returns the number of live handles to this LSA.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    // Returns whether both handles refer to the same LSA.
    pub fn ptr_eq(&self, other: &LsaHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Lsa> {
        self.0.lock().unwrap_or_else(|error| error.into_inner())
    }

    pub fn hdr(&self) -> LsaHdr {
        self.lock().hdr
    }

    pub fn key(&self) -> LsaKey {
        self.lock().key()
    }

    pub fn raw(&self) -> Bytes {
        self.lock().raw.clone()
    }

    pub fn state(&self) -> LsaState {
        self.lock().state
    }

    pub fn flags(&self) -> LsaFlags {
        self.lock().flags
    }

    pub fn body(&self) -> Bytes {
        self.lock().raw.slice(LsaHdr::LENGTH as usize..)
    }

    pub fn validate(&self) -> DecodeResult<()> {
        self.lock().validate()
    }

    pub fn logical_age(&self, now: Instant) -> u16 {
        self.lock().logical_age(now)
    }

    pub fn is_maxage(&self, now: Instant) -> bool {
        self.lock().is_maxage(now)
    }

    // Runs `f` with read-only access to the LSA.
    pub fn with<R>(&self, f: impl FnOnce(&Lsa) -> R) -> R {
        f(&self.lock())
    }

    // Updates the flags set by flooding decisions. The remaining flags are
    // owned by the lifecycle and are left untouched.
    pub fn set_flood_flags(&self, flags: LsaFlags) {
        let mut lsa = self.lock();
        lsa.flags.remove(LSA_FLOOD_FLAGS);
        lsa.flags.insert(flags & LSA_FLOOD_FLAGS);
    }

    // Retains the LSA on behalf of a retransmission list.
    pub fn rxmt_retain(&self) -> LsaHandle {
        self.lock().rxmt_count += 1;
        self.retain()
    }

    // Releases a handle previously obtained with `rxmt_retain`.
    //
    // The handle is released even when the retransmission counter is
    // already zero, in which case a lifecycle violation is returned.
    pub fn rxmt_release(self) -> Result<(), Error> {
        let result = {
            let mut lsa = self.lock();
            match lsa.rxmt_count.checked_sub(1) {
                Some(rxmt_count) => {
                    lsa.rxmt_count = rxmt_count;
                    Ok(())
                }
                None => Err(Error::LifecycleViolation(
                    lsa.key(),
                    LifecycleViolation::RxmtCountUnderflow,
                )),
            }
        };
        self.release();
        result
    }

    pub(crate) fn downgrade(&self) -> Weak<Mutex<Lsa>> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<Mutex<Lsa>>) -> Option<LsaHandle> {
        weak.upgrade().map(LsaHandle)
    }
}

// ===== helper functions =====

fn lsa_name(key: &LsaKey) -> String {
    let mut name = key.to_string();
    name.truncate(LSA_NAME_MAX_SIZE);
    name
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::packet::lsa::LsaType;

    fn hdr(length: u16) -> LsaHdr {
        LsaHdr::new(
            0,
            LsaType::ROUTER,
            Ipv4Addr::new(0, 0, 0, 1),
            Ipv4Addr::new(1, 1, 1, 1),
            0x80000001,
            0xabcd,
            length,
        )
    }

    #[test]
    fn create_checks_length() {
        let now = Instant::now();
        assert_eq!(
            LsaHandle::create(hdr(28), &[0; 4], now).unwrap_err(),
            DecodeError::InvalidLsaLength(28)
        );
        assert_eq!(
            LsaHandle::create(hdr(8), &[], now).unwrap_err(),
            DecodeError::InvalidLsaLength(8)
        );

        let lsa = LsaHandle::create(hdr(24), &[1, 2, 3, 4], now).unwrap();
        assert_eq!(lsa.refcount(), 1);
        assert_eq!(lsa.lock().body(), &[1, 2, 3, 4]);
        assert_eq!(lsa.raw().len(), 24);
        assert_eq!(lsa.state(), LsaState::Fresh);
        assert_eq!(lsa.lock().name, "Router Id:0.0.0.1 Adv:1.1.1.1");
    }

    #[test]
    fn create_header_only() {
        let lsa = LsaHandle::create_header_only(hdr(64), Instant::now());
        assert!(lsa.flags().contains(LsaFlags::HEADER_ONLY));
        assert!(lsa.lock().body().is_empty());
        assert_eq!(lsa.hdr().length, 64);
    }

    #[test]
    fn create_resets_age() {
        let now = Instant::now();
        let mut hdr = hdr(20);
        hdr.age = 100;
        let lsa = LsaHandle::create(hdr, &[], now).unwrap();
        let lsa = lsa.lock();
        assert_eq!(lsa.hdr.age, 0);
        assert_eq!(&lsa.raw[0..2], &[0, 0]);
        assert_eq!(lsa.birth, now);
    }

    #[test]
    fn decode_keeps_wire_age() {
        let now = Instant::now() + Duration::from_secs(1000);
        let mut hdr = hdr(20);
        hdr.age = 100;
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);

        let lsa = LsaHandle::decode(&mut buf.freeze(), now).unwrap();
        let lsa = lsa.lock();
        assert_eq!(lsa.hdr.age, 100);
        assert_eq!(lsa.installed, now);
        assert_eq!(lsa.birth, now - Duration::from_secs(100));
    }

    #[test]
    fn retain_release() {
        let lsa = LsaHandle::create(hdr(20), &[], Instant::now()).unwrap();
        let handles = (0..3).map(|_| lsa.retain()).collect::<Vec<_>>();
        assert_eq!(lsa.refcount(), 4);
        assert!(handles.iter().all(|handle| handle.ptr_eq(&lsa)));

        for handle in handles {
            handle.release();
        }
        assert_eq!(lsa.refcount(), 1);
    }

    #[test]
    fn rxmt_counter() {
        let lsa = LsaHandle::create(hdr(20), &[], Instant::now()).unwrap();
        let rxmt1 = lsa.rxmt_retain();
        let rxmt2 = lsa.rxmt_retain();
        assert_eq!(lsa.lock().rxmt_count, 2);
        assert_eq!(lsa.refcount(), 3);

        rxmt1.rxmt_release().unwrap();
        rxmt2.rxmt_release().unwrap();
        assert_eq!(lsa.lock().rxmt_count, 0);
        assert_eq!(lsa.refcount(), 1);
    }

    #[test]
    fn rxmt_release_unbalanced() {
        let lsa = LsaHandle::create(hdr(20), &[], Instant::now()).unwrap();
        let error = lsa.retain().rxmt_release().unwrap_err();
        assert!(error.is_fatal());
        assert!(matches!(
            error,
            Error::LifecycleViolation(_, LifecycleViolation::RxmtCountUnderflow)
        ));
        assert_eq!(lsa.lock().rxmt_count, 0);
        assert_eq!(lsa.refcount(), 1);
    }

    #[test]
    fn flood_flags() {
        let lsa = LsaHandle::create(hdr(20), &[], Instant::now()).unwrap();
        lsa.lock().flags.insert(LsaFlags::RECEIVED);

        lsa.set_flood_flags(LsaFlags::FLOOD_BACK | LsaFlags::SELF_ORIGINATED);
        assert_eq!(lsa.flags(), LsaFlags::RECEIVED | LsaFlags::FLOOD_BACK);

        lsa.set_flood_flags(LsaFlags::DUPLICATE | LsaFlags::IMPLIED_ACK);
        assert_eq!(
            lsa.flags(),
            LsaFlags::RECEIVED | LsaFlags::DUPLICATE | LsaFlags::IMPLIED_ACK
        );

        lsa.set_flood_flags(LsaFlags::empty());
        assert_eq!(lsa.flags(), LsaFlags::RECEIVED);
    }

    #[test]
    fn copy_is_independent() {
        let now = Instant::now();
        let lsa = LsaHandle::create(hdr(22), &[7, 7], now).unwrap();
        lsa.lock().flags.insert(LsaFlags::FLOOD_BACK);

        let copy = lsa.copy(now);
        assert!(!copy.ptr_eq(&lsa));
        assert_eq!(copy.refcount(), 1);
        assert_eq!(copy.raw(), lsa.raw());
        assert_eq!(copy.lock().installed, lsa.lock().installed);

        copy.lock().flags.insert(LsaFlags::DUPLICATE);
        lsa.lock().hdr.age = LSA_MAX_AGE;
        assert!(!lsa.flags().contains(LsaFlags::DUPLICATE));
        assert_eq!(copy.hdr().age, 0);
    }

    #[test]
    fn decode_truncated() {
        let mut buf = BytesMut::new();
        hdr(30).encode(&mut buf);
        buf.extend_from_slice(&[0; 4]);
        assert_eq!(
            LsaHandle::decode(&mut buf.freeze(), Instant::now()).unwrap_err(),
            DecodeError::TruncatedLsa(30, 24)
        );
    }

    #[test]
    fn validate_reserved_seqno() {
        let mut hdr = hdr(20);
        hdr.seq_no = LSA_RESERVED_SEQ_NO;
        let lsa = LsaHandle::create_header_only(hdr, Instant::now());
        assert_eq!(
            lsa.lock().validate(),
            Err(DecodeError::InvalidLsaSeqNo(LSA_RESERVED_SEQ_NO))
        );
    }
}
