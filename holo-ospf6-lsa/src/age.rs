//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::lsa::Lsa;
use crate::lsdb::LSA_MAX_AGE;

// ===== impl Lsa =====

impl Lsa {
    // Returns the current age of the LSA.
    //
    // The age stored in the header is only updated lazily, so the time
    // elapsed since installation is added to it. The result never exceeds
    // MaxAge.
    pub fn logical_age(&self, now: Instant) -> u16 {
        let elapsed = now.saturating_duration_since(self.installed).as_secs();
        let age = u64::from(self.hdr.age) + elapsed;
        std::cmp::min(age, LSA_MAX_AGE.into()) as u16
    }

    // Returns the age to be written into the header when the LSA is sent out
    // an interface.
    pub fn age_for_transmission(
        &self,
        now: Instant,
        transmit_delay: u16,
    ) -> u16 {
        let age = u32::from(self.logical_age(now)) + u32::from(transmit_delay);
        std::cmp::min(age, LSA_MAX_AGE.into()) as u16
    }

    pub fn is_maxage(&self, now: Instant) -> bool {
        self.logical_age(now) == LSA_MAX_AGE
    }

    // Returns the time left until the LSA reaches MaxAge.
    pub fn maxage_remaining(&self, now: Instant) -> Duration {
        let lifetime = LSA_MAX_AGE.saturating_sub(self.hdr.age);
        let lifetime = Duration::from_secs(lifetime.into());
        (self.installed + lifetime).saturating_duration_since(now)
    }

    // Writes the current age into the header and makes it relative to `now`.
    // The installation time never moves backwards.
    pub(crate) fn rebase_age(&mut self, now: Instant) {
        let age = self.logical_age(now);
        if age != self.hdr.age {
            self.hdr.age = age;
            self.raw = raw_with_age(&self.raw, age);
        }
        self.installed = std::cmp::max(self.installed, now);
    }

    // Sets the LSA age to MaxAge.
    pub(crate) fn set_maxage(&mut self, now: Instant) {
        self.hdr.age = LSA_MAX_AGE;
        self.installed = std::cmp::max(self.installed, now);
        self.raw = raw_with_age(&self.raw, LSA_MAX_AGE);
    }

    // Returns a copy of the raw LSA with the age field set for transmission.
    pub fn raw_for_transmission(
        &self,
        now: Instant,
        transmit_delay: u16,
    ) -> Bytes {
        raw_with_age(&self.raw, self.age_for_transmission(now, transmit_delay))
    }
}

// ===== helper functions =====

fn raw_with_age(raw: &[u8], age: u16) -> Bytes {
    let mut raw = BytesMut::from(raw);
    raw[0..2].copy_from_slice(&age.to_be_bytes());
    raw.freeze()
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::lsa::LsaHandle;
    use crate::packet::lsa::{LsaHdr, LsaType};

    fn lsa(now: Instant) -> LsaHandle {
        let hdr = LsaHdr::new(
            0,
            LsaType::NETWORK,
            Ipv4Addr::new(0, 0, 0, 4),
            Ipv4Addr::new(2, 2, 2, 2),
            0x80000001,
            0xabcd,
            24,
        );
        LsaHandle::create(hdr, &[0, 0, 0, 1], now).unwrap()
    }

    #[test]
    fn logical_age_is_monotonic_and_capped() {
        let now = Instant::now();
        let lsa = lsa(now);
        let lsa = lsa.lock();

        let mut last = 0;
        for secs in (0..8000).step_by(250) {
            let age = lsa.logical_age(now + Duration::from_secs(secs));
            assert!(age >= last);
            assert!(age <= LSA_MAX_AGE);
            last = age;
        }
        assert_eq!(last, LSA_MAX_AGE);
        assert!(lsa.is_maxage(now + Duration::from_secs(3600)));
        assert!(!lsa.is_maxage(now + Duration::from_secs(3599)));
    }

    #[test]
    fn age_for_transmission() {
        let now = Instant::now();
        let lsa = lsa(now);
        let lsa = lsa.lock();

        let later = now + Duration::from_secs(600);
        assert_eq!(lsa.logical_age(later), 600);
        assert_eq!(lsa.age_for_transmission(later, 1), 601);
        assert_eq!(
            lsa.age_for_transmission(now + Duration::from_secs(3599), 10),
            LSA_MAX_AGE
        );

        let raw = lsa.raw_for_transmission(later, 1);
        assert_eq!(&raw[0..2], &601u16.to_be_bytes());
        assert_eq!(&raw[2..], &lsa.raw[2..]);
        assert_eq!(&lsa.raw[0..2], &[0, 0]);
    }

    #[test]
    fn set_maxage() {
        let now = Instant::now();
        let lsa = lsa(now);
        let mut lsa = lsa.lock();

        let later = now + Duration::from_secs(42);
        assert_eq!(lsa.maxage_remaining(later), Duration::from_secs(3558));
        lsa.set_maxage(later);
        assert!(lsa.is_maxage(later));
        assert_eq!(lsa.installed, later);
        assert_eq!(lsa.maxage_remaining(later), Duration::ZERO);
        assert_eq!(&lsa.raw[0..2], &LSA_MAX_AGE.to_be_bytes());
    }

    #[test]
    fn rebase_age() {
        let now = Instant::now();
        let lsa = lsa(now);
        let mut lsa = lsa.lock();

        let later = now + Duration::from_secs(75);
        lsa.rebase_age(later);
        assert_eq!(lsa.hdr.age, 75);
        assert_eq!(lsa.installed, later);
        assert_eq!(lsa.logical_age(later), 75);
        assert_eq!(&lsa.raw[0..2], &75u16.to_be_bytes());

        // Installation time is monotonic.
        lsa.rebase_age(now);
        assert_eq!(lsa.installed, later);
    }
}
