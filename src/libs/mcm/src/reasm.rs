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

//! The inbound reassembly engine

use crate::cfg;
use crate::errors::{Code, Error};
use crate::wire::{DataFragment, OwnerKey};

/// One reconstruction buffer
///
/// A slot is either free (`owner == 0`) or accumulates the fragments of
/// exactly one in-flight transmission unit.
struct Slot {
    owner: OwnerKey,
    len: u16,
    data: [u8; cfg::RECONSTRUCTION_BUFFER_SIZE],
}

impl Slot {
    const fn new() -> Self {
        Slot {
            owner: 0,
            len: 0,
            data: [0; cfg::RECONSTRUCTION_BUFFER_SIZE],
        }
    }

    fn reset(&mut self) {
        self.owner = 0;
        self.len = 0;
    }
}

/// The fixed pool of reconstruction buffers with its completion queue
///
/// The pool is sized for at most [`cfg::RECONSTRUCTION_BUFFERS`] concurrent
/// senders per receiver; running out of slots is a fatal condition, not a
/// backpressure signal.
pub(crate) struct ReasmPool {
    slots: [Slot; cfg::RECONSTRUCTION_BUFFERS],
    // completed slots awaiting deferred delivery, oldest first
    ready: [u8; cfg::RECONSTRUCTION_BUFFERS],
    ready_len: usize,
}

impl ReasmPool {
    pub const fn new() -> Self {
        const FREE: Slot = Slot::new();
        ReasmPool {
            slots: [FREE; cfg::RECONSTRUCTION_BUFFERS],
            ready: [0; cfg::RECONSTRUCTION_BUFFERS],
            ready_len: 0,
        }
    }

    /// Accepts one data fragment
    ///
    /// Appends the fragment payload to the owner's buffer, claiming a free
    /// slot for the first fragment of a transmission unit, and queues the
    /// slot for delivery once the last fragment arrived.
    pub fn accept(&mut self, frag: &DataFragment) -> Result<(), Error> {
        let idx = self.lookup(frag.owner)?;
        let slot = &mut self.slots[idx];

        let bytes = frag.payload();
        let at = slot.len as usize;
        if at + bytes.len() > cfg::RECONSTRUCTION_BUFFER_SIZE {
            return Err(Error::new(Code::RecvOverflow));
        }
        slot.data[at..at + bytes.len()].copy_from_slice(bytes);
        slot.len += bytes.len() as u16;

        if frag.last && self.ready_len < cfg::RECONSTRUCTION_BUFFERS {
            self.ready[self.ready_len] = idx as u8;
            self.ready_len += 1;
        }
        Ok(())
    }

    fn lookup(&mut self, owner: OwnerKey) -> Result<usize, Error> {
        // an in-flight transmission unit keeps its slot
        if let Some(idx) = self.slots.iter().position(|s| s.owner == owner) {
            return Ok(idx);
        }
        // otherwise claim the first free one
        if let Some(idx) = self.slots.iter().position(|s| s.owner == 0) {
            self.slots[idx].owner = owner;
            self.slots[idx].len = 0;
            return Ok(idx);
        }
        Err(Error::new(Code::RecvNoSpace))
    }

    /// Pops the oldest completed slot, if any
    pub fn pop_ready(&mut self) -> Option<usize> {
        if self.ready_len == 0 {
            return None;
        }
        let idx = self.ready[0] as usize;
        self.ready.copy_within(1..self.ready_len, 0);
        self.ready_len -= 1;
        Some(idx)
    }

    /// Returns the accumulated message and owner of the given slot
    pub fn message(&self, idx: usize) -> (&[u8], OwnerKey) {
        let slot = &self.slots[idx];
        (&slot.data[..slot.len as usize], slot.owner)
    }

    /// Releases the given slot for reuse
    pub fn release(&mut self, idx: usize) {
        self.slots[idx].reset();
    }
}
