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

//! The hardware transport interface consumed by the middleware

use crate::wire::{Coord, RawPacket};

/// Saved interrupt state returned by [`Transport::irq_save`]
pub type IrqState = u32;

/// Identifier of an installed router rule
pub type RuleId = u16;

/// The packet substrate of one processing element
///
/// The middleware polls for inbound packets with [`fetch_packet`] instead of
/// registering an interrupt handler; every busy-wait loop drains the fetch
/// queue before checking its condition, so the fast receive path runs at the
/// same points where the hardware would raise the packet interrupt.
///
/// [`fetch_packet`]: Transport::fetch_packet
pub trait Transport {
    /// Returns the coordinate of this processing element
    fn identity(&self) -> Coord;

    /// Injects one multicast packet
    ///
    /// Returns false if the substrate rejected the packet. The substrate is
    /// assumed reliable once it accepted a packet, so a rejection indicates
    /// a hardware fault.
    fn send_packet(&mut self, key: u32, payload: u32) -> bool;

    /// Fetches the next pending inbound packet, if any
    fn fetch_packet(&mut self) -> Option<RawPacket>;

    /// Busy-delays for the given number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Masks interrupts, returning the previous state
    fn irq_save(&mut self) -> IrqState;

    /// Restores the interrupt state returned by [`Transport::irq_save`]
    fn irq_restore(&mut self, state: IrqState);

    /// Allocates a router rule in the hardware table
    ///
    /// Returns `None` when the table is exhausted; the table is a fixed
    /// hardware resource and never grows at runtime.
    fn add_rule(&mut self, key: u32, mask: u32, route: u32) -> Option<RuleId>;
}
