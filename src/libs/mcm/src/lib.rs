/*
 * Copyright (C) 2018 Nils Asmussen <nils@os.inf.tu-dresden.de>
 * Economic rights: Technische Universitaet Dresden (Germany)
 *
 * Copyright (C) 2019-2022 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of MCM (Multicast Communication Middleware for manycore meshes).
 *
 * MCM is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * MCM is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

//! The multicast communication middleware for manycore processor meshes
//!
//! Firmware-level middleware running on every processing element of a
//! hexagonal chip mesh. The hardware substrate only carries fixed-size
//! key/payload packet pairs; this crate maps three services onto it:
//!
//! - reliable delivery of variable-length messages through fragmentation
//!   and per-sender reassembly ([`Mcm::send`], [`Mcm::broadcast`]),
//! - a three-level hierarchical barrier over chip, ring and board
//!   ([`Mcm::wait`]), plus a pairwise core rendezvous ([`Mcm::syn`]),
//! - generation of the hardware multicast router rules that carry both
//!   ([`Mcm::configure_routes`], [`route`]).
//!
//! All state lives in the per-PE [`Mcm`] context; the hardware is reached
//! exclusively through the [`transport::Transport`] trait, with
//! [`sim::SimTransport`] standing in on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod cfg;
pub mod errors;
pub mod metrics;
pub mod route;
pub mod sim;
pub mod sync;
pub mod transport;
pub mod wire;

mod frag;
mod mcm;
mod reasm;

pub use crate::mcm::{Mcm, MsgCallback};
pub use crate::wire::{Channel, Coord};
