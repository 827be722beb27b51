//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod age;
pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod handler;
pub mod lsa;
pub mod lsdb;
pub mod packet;
pub mod show;
pub mod tasks;
