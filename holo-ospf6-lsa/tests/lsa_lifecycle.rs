//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock as Lazy;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use holo_ospf6_lsa::config::LsdbCfg;
use holo_ospf6_lsa::error::Error;
use holo_ospf6_lsa::events;
use holo_ospf6_lsa::lsa::{LsaFlags, LsaHandle, LsaState};
use holo_ospf6_lsa::lsdb::{
    LSA_INIT_SEQ_NO, LSA_MAX_SEQ_NO, Lifecycle, Lsdb, LsaOrigination, LsdbMap,
    lsa_body_checksum,
};
use holo_ospf6_lsa::packet::error::DecodeError;
use holo_ospf6_lsa::packet::lsa::{LsaHdr, LsaKey, LsaType};

//
// Helper functions.
//

fn router_id() -> Ipv4Addr {
    Ipv4Addr::from_str("1.1.1.1").unwrap()
}

fn decode(bytes: &[u8], now: Instant) -> LsaHandle {
    let mut buf = Bytes::copy_from_slice(bytes);
    let lsa = LsaHandle::decode(&mut buf, now).unwrap();
    assert!(buf.is_empty());
    lsa
}

fn with_age(bytes: &[u8], age: u16) -> Vec<u8> {
    let mut bytes = bytes.to_vec();
    bytes[0..2].copy_from_slice(&age.to_be_bytes());
    bytes
}

// Current time as seen by the (possibly paused) tokio clock.
fn tokio_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

//
// Test LSAs.
//

static LINK_LSA: Lazy<(Vec<u8>, LsaHdr)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x04, 0x00, 0x08, 0x00, 0x00, 0x00, 0x03, 0x02, 0x02, 0x02,
            0x02, 0x80, 0x00, 0x00, 0x01, 0x16, 0x3a, 0x00, 0x2c, 0x01, 0x00,
            0x00, 0x13, 0xfe, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xcc,
            0x81, 0x6e, 0xff, 0xfe, 0xa8, 0x26, 0xd0, 0x00, 0x00, 0x00, 0x00,
        ],
        LsaHdr::new(
            4,
            LsaType::LINK,
            Ipv4Addr::from_str("0.0.0.3").unwrap(),
            Ipv4Addr::from_str("2.2.2.2").unwrap(),
            0x80000001,
            0x163a,
            44,
        ),
    )
});

static INTRA_AREA_PREFIX_LSA: Lazy<(Vec<u8>, LsaHdr)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x0a, 0x20, 0x09, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x02,
            0x02, 0x80, 0x00, 0x00, 0x03, 0xe0, 0xed, 0x00, 0x28, 0x00, 0x01,
            0x20, 0x01, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x02, 0x02, 0x20,
            0x02, 0x00, 0x00, 0x02, 0x02, 0x02, 0x02,
        ],
        LsaHdr::new(
            10,
            LsaType::INTRA_AREA_PREFIX,
            Ipv4Addr::from_str("0.0.0.0").unwrap(),
            Ipv4Addr::from_str("2.2.2.2").unwrap(),
            0x80000003,
            0xe0ed,
            40,
        ),
    )
});

//
// Tests.
//

#[test]
fn test_decode_link_lsa() {
    let (ref bytes, ref hdr) = *LINK_LSA;
    let now = Instant::now();
    let lsa = decode(bytes, now);

    assert_eq!(lsa.hdr(), *hdr);
    assert_eq!(lsa.raw().as_ref(), bytes.as_slice());
    assert_eq!(lsa.state(), LsaState::Fresh);
    assert!(lsa.validate().is_ok());
    assert_eq!(lsa.logical_age(now), 4);
    assert_eq!(lsa.body().as_ref(), &bytes[20..]);
    let name = lsa.with(|lsa| lsa.name().to_owned());
    assert_eq!(name, "Link Id:0.0.0.3 Adv:2.2.2.2");

    let mut buf = BytesMut::new();
    lsa.hdr().encode(&mut buf);
    assert_eq!(buf.as_ref(), &bytes[0..20]);
}

#[test]
fn test_decode_multiple_lsas() {
    let mut bytes = LINK_LSA.0.clone();
    bytes.extend_from_slice(&INTRA_AREA_PREFIX_LSA.0);
    let mut buf = Bytes::from(bytes);
    let now = Instant::now();

    let lsa1 = LsaHandle::decode(&mut buf, now).unwrap();
    let lsa2 = LsaHandle::decode(&mut buf, now).unwrap();
    assert!(buf.is_empty());
    assert_eq!(lsa1.hdr(), LINK_LSA.1);
    assert_eq!(lsa2.hdr(), INTRA_AREA_PREFIX_LSA.1);
    assert!(lsa2.validate().is_ok());
}

#[test]
fn test_decode_truncated() {
    let bytes = &LINK_LSA.0[..30];
    let mut buf = Bytes::copy_from_slice(bytes);
    assert_eq!(
        LsaHandle::decode(&mut buf, Instant::now()).unwrap_err(),
        DecodeError::TruncatedLsa(44, 30)
    );
}

#[test]
fn test_age_excluded_from_checksum() {
    let bytes = with_age(&INTRA_AREA_PREFIX_LSA.0, 1234);
    let lsa = decode(&bytes, Instant::now());
    assert!(lsa.validate().is_ok());
}

#[test]
fn test_receive_and_replace() {
    let lc = Lifecycle::new(router_id(), LsdbCfg::default());
    let mut lsdb = LsdbMap::new(1);
    let now = Instant::now();

    let lsa = decode(&LINK_LSA.0, now);
    lc.receive(&mut lsdb, lsa, now).unwrap();
    let lsa = decode(&INTRA_AREA_PREFIX_LSA.0, now);
    lc.receive(&mut lsdb, lsa, now).unwrap();
    assert_eq!(lsdb.len(), 2);

    let key = INTRA_AREA_PREFIX_LSA.1.key();
    let installed = lsdb.get(&key).unwrap().retain();
    assert_eq!(installed.state(), LsaState::Expiring);
    assert!(installed.flags().contains(LsaFlags::RECEIVED));
    assert_eq!(installed.logical_age(now + Duration::from_secs(5)), 15);

    // Same instance again, outside of the MinLSArrival window.
    let later = now + Duration::from_secs(2);
    let lsa = decode(&INTRA_AREA_PREFIX_LSA.0, later);
    assert!(matches!(
        lc.receive(&mut lsdb, lsa, later),
        Err(Error::StaleReplacement(k)) if k == key
    ));

    // Newer instance whose checksum wasn't updated.
    let mut bytes = INTRA_AREA_PREFIX_LSA.0.clone();
    bytes[12..16].copy_from_slice(&0x80000004u32.to_be_bytes());
    let lsa = decode(&bytes, later);
    assert!(matches!(
        lc.receive(&mut lsdb, lsa, later),
        Err(Error::InvalidFormat(DecodeError::InvalidChecksum))
    ));
    assert_eq!(lsdb.get(&key).unwrap().hdr().seq_no, 0x80000003);

    // The old instance is retired once replaced.
    let mut hdr = LsaHdr::new(
        0,
        LsaType::INTRA_AREA_PREFIX,
        Ipv4Addr::UNSPECIFIED,
        Ipv4Addr::from_str("2.2.2.2").unwrap(),
        0x80000004,
        0,
        40,
    );
    let body = &INTRA_AREA_PREFIX_LSA.0[20..];
    hdr.cksum = lsa_body_checksum(&hdr, body);
    let lsa = LsaHandle::create(hdr, body, later).unwrap();
    lc.receive(&mut lsdb, lsa, later).unwrap();
    assert_eq!(lsdb.get(&key).unwrap().hdr().seq_no, 0x80000004);
    assert_eq!(installed.state(), LsaState::Retired);
    assert_eq!(installed.with(|lsa| lsa.expiry_remaining(later)), None);
}

#[tokio::test(start_paused = true)]
async fn test_received_lsa_expires() {
    let lc = Lifecycle::new(router_id(), LsdbCfg::default());
    let mut lsdb = LsdbMap::new(1);
    let now = tokio_now();

    let bytes = with_age(&LINK_LSA.0, 3599);
    let lsa = decode(&bytes, now);
    lc.receive(&mut lsdb, lsa, now).unwrap();
    assert_eq!(lc.timers.len(), 1);

    let now = lc.timers.wait().await;
    events::process_timers(&lc, &mut lsdb, now).unwrap();

    let key = LINK_LSA.1.key();
    let lsa = lsdb.get(&key).unwrap().retain();
    assert_eq!(lsa.state(), LsaState::MaxAged);
    assert!(lsa.is_maxage(now));

    assert_eq!(lsdb.take_maxage(), [key]);
    lc.retire(&mut lsdb, &key, now).unwrap();
    assert!(lsdb.is_empty());
    assert_eq!(lsa.state(), LsaState::Retired);
    assert!(lc.timers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_self_originated_refresh() {
    let lc = Lifecycle::new(router_id(), LsdbCfg::default());
    let mut lsdb = LsdbMap::new(1);
    let start = tokio_now();

    let body = &LINK_LSA.0[20..];
    let lsa_id = Ipv4Addr::from_str("0.0.0.3").unwrap();
    let hdr = lc
        .originate(&mut lsdb, LsaType::LINK, lsa_id, body, start)
        .unwrap()
        .hdr()
        .unwrap();
    assert_eq!(hdr.seq_no, LSA_INIT_SEQ_NO);
    assert_eq!(hdr.adv_rtr, router_id());

    // Nothing to do when the content didn't change.
    let later = start + Duration::from_secs(60);
    assert_eq!(
        lc.originate(&mut lsdb, LsaType::LINK, lsa_id, body, later)
            .unwrap(),
        LsaOrigination::Unchanged
    );

    // The refresh timer fires before the expiry timer.
    let now = lc.timers.wait().await;
    assert!(now >= start + Duration::from_secs(1800));
    events::process_timers(&lc, &mut lsdb, now).unwrap();

    let key = LsaKey::new(LsaType::LINK, router_id(), lsa_id);
    let lsa = lsdb.get(&key).unwrap();
    assert_eq!(lsa.hdr().seq_no, LSA_INIT_SEQ_NO + 1);
    assert_eq!(lsa.logical_age(now), 0);
    assert!(lsa.validate().is_ok());
    assert!(lsa.flags().contains(LsaFlags::SELF_ORIGINATED));
}

#[tokio::test(start_paused = true)]
async fn test_self_originated_survives_seqno_wrapping() {
    let lc = Lifecycle::new(router_id(), LsdbCfg::default());
    let mut lsdb = LsdbMap::new(1);
    let start = tokio_now();

    // Self-originated instance close to the end of the sequence number space,
    // as if learned back from a neighbor after a restart.
    let body = &LINK_LSA.0[20..];
    let lsa_id = Ipv4Addr::from_str("0.0.0.3").unwrap();
    let mut hdr = LsaHdr::new(
        0,
        LsaType::LINK,
        lsa_id,
        router_id(),
        LSA_MAX_SEQ_NO - 1,
        0,
        44,
    );
    hdr.cksum = lsa_body_checksum(&hdr, body);
    let lsa = LsaHandle::create(hdr, body, start).unwrap();
    lc.receive(&mut lsdb, lsa, start).unwrap();
    let key = hdr.key();
    assert!(lsdb.get(&key).unwrap().flags().contains(LsaFlags::RECEIVED));

    // Take over the LSA, then let it be refreshed for five hours while
    // removing every instance that reaches MaxAge.
    let now = start + Duration::from_secs(10);
    let hdr = lc
        .originate(&mut lsdb, LsaType::LINK, lsa_id, &[0; 24], now)
        .unwrap()
        .hdr()
        .unwrap();
    assert_eq!(hdr.seq_no, LSA_MAX_SEQ_NO);

    let end = start + Duration::from_secs(5 * 3600);
    let mut seq_nos = vec![];
    loop {
        let now = lc.timers.wait().await;
        if now >= end {
            break;
        }
        events::process_timers(&lc, &mut lsdb, now).unwrap();
        for key in lsdb.take_maxage() {
            lc.retire(&mut lsdb, &key, now).unwrap();
        }
        assert_eq!(lsdb.len(), 1);
        let seq_no = lsdb.get(&key).unwrap().hdr().seq_no;
        if seq_nos.last() != Some(&seq_no) {
            seq_nos.push(seq_no);
        }
    }

    assert_eq!(
        seq_nos,
        [
            LSA_MAX_SEQ_NO,
            LSA_INIT_SEQ_NO,
            LSA_INIT_SEQ_NO + 1,
            LSA_INIT_SEQ_NO + 2,
            LSA_INIT_SEQ_NO + 3,
            LSA_INIT_SEQ_NO + 4,
            LSA_INIT_SEQ_NO + 5,
            LSA_INIT_SEQ_NO + 6,
            LSA_INIT_SEQ_NO + 7,
            LSA_INIT_SEQ_NO + 8,
        ]
    );
    let lsa = lsdb.get(&key).unwrap();
    assert!(lsa.validate().is_ok());
    assert_eq!(lsa.body().as_ref(), &[0; 24]);
    assert!(!lc.is_seqno_wrapping(&key));
}

#[test]
fn test_originate_deferred_until_retired() {
    let lc = Lifecycle::new(router_id(), LsdbCfg::default());
    let mut lsdb = LsdbMap::new(1);
    let now = Instant::now();

    let body = &LINK_LSA.0[20..];
    let lsa_id = Ipv4Addr::from_str("0.0.0.3").unwrap();
    let mut hdr = LsaHdr::new(
        0,
        LsaType::LINK,
        lsa_id,
        router_id(),
        LSA_MAX_SEQ_NO,
        0,
        44,
    );
    hdr.cksum = lsa_body_checksum(&hdr, body);
    let lsa = LsaHandle::create(hdr, body, now).unwrap();
    lc.receive(&mut lsdb, lsa, now).unwrap();
    let key = hdr.key();

    let later = now + Duration::from_secs(60);
    assert_eq!(
        lc.originate(&mut lsdb, LsaType::LINK, lsa_id, &[0; 24], later)
            .unwrap(),
        LsaOrigination::Deferred
    );
    assert!(lsdb.get(&key).unwrap().is_maxage(later));

    events::process_timers(&lc, &mut lsdb, later).unwrap();
    assert_eq!(lsdb.take_maxage(), [key]);
    lc.retire(&mut lsdb, &key, later).unwrap();

    let lsa = lsdb.get(&key).unwrap();
    assert_eq!(lsa.hdr().seq_no, LSA_INIT_SEQ_NO);
    assert_eq!(lsa.body().as_ref(), &[0; 24]);
    assert!(lsa.flags().contains(LsaFlags::SELF_ORIGINATED));
}
