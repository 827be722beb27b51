//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt::Write;

use crate::lsa::Lsa;
use crate::packet::lsa::{LSA_TYPE_INDEX_SIZE, LsaType};

// Type-specific LSA display function.
pub type LsaDisplayFn = fn(&Lsa, &mut dyn Write) -> std::fmt::Result;

// Type-specific LSA handler.
#[derive(Clone, Copy, Debug)]
pub struct LsaHandler {
    pub name: &'static str,
    pub display: LsaDisplayFn,
}

// Registry of LSA handlers, indexed by LSA function code.
//
// Function codes outside the known range share a single slot.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: [Option<LsaHandler>; LSA_TYPE_INDEX_SIZE],
}

// ===== impl HandlerRegistry =====

impl HandlerRegistry {
    // Registers the handler of the given LSA type, replacing any previously
    // registered one.
    pub fn install_handler(
        &mut self,
        lsa_type: LsaType,
        handler: LsaHandler,
    ) -> Option<LsaHandler> {
        self.handlers[lsa_type.index()].replace(handler)
    }

    pub fn handler_for(&self, lsa_type: LsaType) -> Option<&LsaHandler> {
        self.handlers[lsa_type.index()].as_ref()
    }
}

// ===== unit tests =====
