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

//! A software transport for tests and host tools
//!
//! [`SimTransport`] stands in for the packet substrate of one processing
//! element: outbound packets and router rules are recorded, inbound packets
//! are fed from a queue, and delays are only counted. Tests wire several
//! instances together to model a mesh without a hardware harness.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::transport::{IrqState, RuleId, Transport};
use crate::wire::{Coord, RawPacket};

/// A router rule as recorded by the simulator
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimRule {
    pub key: u32,
    pub mask: u32,
    pub route: u32,
}

/// In-memory stand-in for the packet substrate of one processing element
pub struct SimTransport {
    ident: Coord,
    /// Packets queued for reception
    pub rx: VecDeque<RawPacket>,
    /// Packets injected by the middleware
    pub sent: Vec<RawPacket>,
    /// Installed router rules
    pub rules: Vec<SimRule>,
    /// Remaining capacity of the rule table
    pub rule_capacity: usize,
    /// Accumulated delay in microseconds
    pub delayed_us: u64,
    /// When true, every injection is rejected
    pub fail_sends: bool,
}

impl SimTransport {
    pub fn new(ident: Coord) -> Self {
        SimTransport {
            ident,
            rx: VecDeque::new(),
            sent: Vec::new(),
            rules: Vec::new(),
            rule_capacity: 1024,
            delayed_us: 0,
            fail_sends: false,
        }
    }

    /// Queues a packet for reception
    pub fn push_rx(&mut self, pkt: RawPacket) {
        self.rx.push_back(pkt);
    }
}

impl Transport for SimTransport {
    fn identity(&self) -> Coord {
        self.ident
    }

    fn send_packet(&mut self, key: u32, payload: u32) -> bool {
        if self.fail_sends {
            return false;
        }
        self.sent.push(RawPacket { key, payload });
        true
    }

    fn fetch_packet(&mut self) -> Option<RawPacket> {
        self.rx.pop_front()
    }

    fn delay_us(&mut self, us: u32) {
        self.delayed_us += us as u64;
    }

    fn irq_save(&mut self) -> IrqState {
        0
    }

    fn irq_restore(&mut self, _state: IrqState) {
    }

    fn add_rule(&mut self, key: u32, mask: u32, route: u32) -> Option<RuleId> {
        if self.rule_capacity == 0 {
            return None;
        }
        self.rule_capacity -= 1;
        self.rules.push(SimRule { key, mask, route });
        Some(self.rules.len() as RuleId)
    }
}
