//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};

// OSPFv3 LSA type.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaType(pub u16);

// The U-bit indicates how the LSA should be handled by a router that does not
// recognize the LSA's function code.
const U_BIT: u16 = 0x8000;
const SCOPE_MASK: u16 = 0x6000;
const FUNCTION_CODE_MASK: u16 = 0x1fff;

// Index reserved for LSA types whose function code isn't known.
pub const LSA_TYPE_INDEX_UNKNOWN: usize = 0;
// Size of the LSA type index space (known function codes are 1..=9).
pub const LSA_TYPE_INDEX_SIZE: usize = 0x000a;

// OSPFv3 LSA flooding scope.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaScope {
    Link = 0x0000,
    Area = 0x2000,
    As = 0x4000,
    Reserved = 0x6000,
}

// OSPFv3 LSA function code.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaFunctionCode {
    Router = 1,
    Network = 2,
    InterAreaPrefix = 3,
    InterAreaRouter = 4,
    AsExternal = 5,
    GroupMembership = 6,
    Type7 = 7,
    Link = 8,
    IntraAreaPrefix = 9,
}

// OSPFv3 LSA key. It serves both as a global LSA identifier and as a key to
// store LSAs in an LSDB.
//
// Please be aware that modifying the order of the fields will impact operations
// such as iterating over LSDBs.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaKey {
    // LSA type.
    pub lsa_type: LsaType,
    // LSA advertising router.
    pub adv_rtr: Ipv4Addr,
    // LSA ID.
    pub lsa_id: Ipv4Addr,
}

//
// OSPFv3 LSA header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           LS Age              |           LS Type             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Link State ID                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Advertising Router                         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    LS Sequence Number                         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |        LS Checksum            |             Length            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaHdr {
    pub age: u16,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: u32,
    pub cksum: u16,
    pub length: u16,
}

// ===== impl LsaType =====

impl LsaType {
    pub const ROUTER: LsaType = LsaType(0x2001);
    pub const NETWORK: LsaType = LsaType(0x2002);
    pub const INTER_AREA_PREFIX: LsaType = LsaType(0x2003);
    pub const INTER_AREA_ROUTER: LsaType = LsaType(0x2004);
    pub const AS_EXTERNAL: LsaType = LsaType(0x4005);
    pub const GROUP_MEMBERSHIP: LsaType = LsaType(0x2006);
    pub const TYPE_7: LsaType = LsaType(0x2007);
    pub const LINK: LsaType = LsaType(0x0008);
    pub const INTRA_AREA_PREFIX: LsaType = LsaType(0x2009);

    pub fn u_bit(&self) -> bool {
        self.0 & U_BIT != 0
    }

    pub fn scope(&self) -> LsaScope {
        match self.0 & SCOPE_MASK {
            0x0000 => LsaScope::Link,
            0x2000 => LsaScope::Area,
            0x4000 => LsaScope::As,
            _ => LsaScope::Reserved,
        }
    }

    pub fn function_code(&self) -> Option<LsaFunctionCode> {
        LsaFunctionCode::from_u16(self.0 & FUNCTION_CODE_MASK)
    }

    // Returns the raw function code, whether or not it's a known one.
    pub fn function_code_raw(&self) -> u16 {
        self.0 & FUNCTION_CODE_MASK
    }

    // Returns the index of the LSA type in tables sized by
    // `LSA_TYPE_INDEX_SIZE`, or `LSA_TYPE_INDEX_UNKNOWN` for function codes
    // outside the known range.
    pub fn index(&self) -> usize {
        let fcode = self.function_code_raw() as usize;
        if fcode < LSA_TYPE_INDEX_SIZE {
            fcode
        } else {
            LSA_TYPE_INDEX_UNKNOWN
        }
    }

    pub fn name(&self) -> String {
        match self.function_code() {
            Some(LsaFunctionCode::Router) => "Router".to_owned(),
            Some(LsaFunctionCode::Network) => "Network".to_owned(),
            Some(LsaFunctionCode::InterAreaPrefix) => "Inter-Prefix".to_owned(),
            Some(LsaFunctionCode::InterAreaRouter) => "Inter-Router".to_owned(),
            Some(LsaFunctionCode::AsExternal) => "AS-External".to_owned(),
            Some(LsaFunctionCode::GroupMembership) => {
                "Group-Membership".to_owned()
            }
            Some(LsaFunctionCode::Type7) => "Type-7".to_owned(),
            Some(LsaFunctionCode::Link) => "Link".to_owned(),
            Some(LsaFunctionCode::IntraAreaPrefix) => "Intra-Prefix".to_owned(),
            None => format!("Unknown({:#06x})", self.0),
        }
    }
}

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<LsaType> for u16 {
    fn from(lsa_type: LsaType) -> u16 {
        lsa_type.0
    }
}

// ===== impl LsaKey =====

impl std::fmt::Display for LsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Id:{} Adv:{}", self.lsa_type, self.lsa_id, self.adv_rtr)
    }
}

// ===== impl LsaHdr =====

impl LsaHdr {
    pub const LENGTH: u16 = 20;
    pub const MAX_LSA_LENGTH: u16 = 4096;

    // Decodes an LSA header, checking the length field against the size
    // limits. The body isn't required to be present in the buffer.
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.remaining()));
        }

        let age = buf.get_u16();
        let lsa_type = LsaType(buf.get_u16());
        let lsa_id = Ipv4Addr::from(buf.get_u32());
        let adv_rtr = Ipv4Addr::from(buf.get_u32());
        let seq_no = buf.get_u32();
        let cksum = buf.get_u16();
        let length = buf.get_u16();

        if length < Self::LENGTH {
            return Err(DecodeError::InvalidLsaLength(length));
        }
        if length > Self::MAX_LSA_LENGTH {
            return Err(DecodeError::LsaTooLarge(length));
        }

        Ok(LsaHdr {
            age,
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum,
            length,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.age);
        buf.put_u16(self.lsa_type.0);
        buf.put_u32(self.lsa_id.into());
        buf.put_u32(self.adv_rtr.into());
        buf.put_u32(self.seq_no);
        buf.put_u16(self.cksum);
        buf.put_u16(self.length);
    }

    pub fn key(&self) -> LsaKey {
        LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr: self.adv_rtr,
            lsa_id: self.lsa_id,
        }
    }

    pub fn body_length(&self) -> u16 {
        self.length.saturating_sub(Self::LENGTH)
    }
}

impl std::fmt::Display for LsaHdr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type {} ({:#06x}) id {} adv {} age {} seqnum {:#010x} \
             cksum {:#06x} len {}",
            self.lsa_type,
            self.lsa_type.0,
            self.lsa_id,
            self.adv_rtr,
            self.age,
            self.seq_no,
            self.cksum,
            self.length
        )
    }
}

// ===== global functions =====

// Computes the LSA checksum over the whole LSA except the LS age field, as
// specified in Section 12.1.7 of RFC 2328.
//
// The checksum field itself is treated as zero, so the result doesn't depend
// on whatever value is currently stored there. Zero is returned for inputs
// shorter than an LSA header.
pub fn lsa_checksum(data: &[u8]) -> u16 {
    if data.len() < LsaHdr::LENGTH as usize {
        return 0;
    }

    let mut data = BytesMut::from(&data[2..]);
    data[14..16].fill(0);

    let checksum = fletcher::calc_fletcher16(&data);
    let mut checkbyte0 = (checksum & 0x00FF) as i32;
    let mut checkbyte1 = ((checksum >> 8) & 0x00FF) as i32;

    // Adjust checksum value using scaling factor.
    let sop = data.len() as i32 - 15;
    let mut x = (sop * checkbyte0 - checkbyte1) % 255;
    if x <= 0 {
        x += 255;
    }
    checkbyte1 = 510 - checkbyte0 - x;
    if checkbyte1 > 255 {
        checkbyte1 -= 255;
    }
    checkbyte0 = x;
    u16::from_be_bytes([checkbyte0 as u8, checkbyte1 as u8])
}

// Checks whether the checksum stored in the LSA is valid.
pub fn lsa_checksum_is_valid(data: &[u8]) -> bool {
    if data.len() < LsaHdr::LENGTH as usize {
        return false;
    }

    fletcher::calc_fletcher16(&data[2..]) == 0
}

// ===== unit tests =====
