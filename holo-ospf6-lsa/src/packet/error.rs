//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// OSPFv3 LSA decode errors.
//
// Any of these errors means the LSA is rejected before an LSA object is
// constructed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    // Fewer bytes available than the fixed header size.
    InvalidLength(usize),
    // Length field smaller than the LSA header.
    InvalidLsaLength(u16),
    // Length field larger than the maximum LSA size.
    LsaTooLarge(u16),
    // Length field larger than the available data.
    TruncatedLsa(u16, usize),
    InvalidChecksum,
    InvalidLsaAge(u16),
    InvalidLsaSeqNo(u32),
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidLength(len) => {
                write!(f, "invalid LSA header length: {}", len)
            }
            DecodeError::InvalidLsaLength(len) => {
                write!(f, "invalid LSA length: {}", len)
            }
            DecodeError::LsaTooLarge(len) => {
                write!(f, "LSA too large: {}", len)
            }
            DecodeError::TruncatedLsa(len, available) => {
                write!(
                    f,
                    "truncated LSA: length {} but only {} bytes available",
                    len, available
                )
            }
            DecodeError::InvalidChecksum => {
                write!(f, "invalid LSA checksum")
            }
            DecodeError::InvalidLsaAge(age) => {
                write!(f, "invalid LSA age: {}", age)
            }
            DecodeError::InvalidLsaSeqNo(seq_no) => {
                write!(f, "invalid LSA sequence number: {:#010x}", seq_no)
            }
        }
    }
}

impl std::error::Error for DecodeError {}
