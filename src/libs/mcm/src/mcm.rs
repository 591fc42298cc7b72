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

//! The per-processing-element middleware context
//!
//! One [`Mcm`] instance owns all middleware state of a processing element:
//! the reconstruction buffer pool, the barrier, the rendezvous locks and the
//! event counters. There are no process-wide statics; the hardware enters
//! the picture only through the [`Transport`] the context owns.
//!
//! The receive side is split into the two logical tasks of the interrupt
//! design: [`Mcm::handle_packet`] is the fast path that classifies and
//! buffers (short, callback-free), [`Mcm::deliver_pending`] is the deferred
//! path that invokes the application callback and recycles buffers.

use alloc::boxed::Box;

use crate::cfg;
use crate::errors::{Code, Error};
use crate::frag;
use crate::metrics::{Event, Metrics};
use crate::reasm::ReasmPool;
use crate::route;
use crate::sync::{self, Barrier, PeerLocks, Phase, Roles};
use crate::transport::Transport;
use crate::wire::{self, Channel, Coord, Packet, RawPacket};

/// Callback invoked for every completed inbound message
pub type MsgCallback = Box<dyn FnMut(&[u8], Channel, Coord)>;

/// The multicast communication middleware of one processing element
pub struct Mcm<T: Transport> {
    transport: T,
    ident: Coord,
    roles: Roles,
    ucast_template: u32,
    pool: ReasmPool,
    callback: Option<MsgCallback>,
    barrier: Barrier,
    peers: PeerLocks,
    metrics: Metrics,
}

impl<T: Transport> Mcm<T> {
    /// Creates the middleware context for the PE identified by the transport
    pub fn new(transport: T) -> Self {
        let ident = transport.identity();
        let roles = sync::roles(ident);
        log::debug!(target: "mcm", "init {} roles={:?}", ident, roles);
        Mcm {
            ucast_template: wire::ucast_template(ident),
            barrier: Barrier::new(roles),
            transport,
            ident,
            roles,
            pool: ReasmPool::new(),
            callback: None,
            peers: PeerLocks::new(),
            metrics: Metrics::new(),
        }
    }

    /// Returns the coordinate of this processing element
    pub fn identity(&self) -> Coord {
        self.ident
    }

    /// Returns the barrier roles of this processing element
    pub fn roles(&self) -> Roles {
        self.roles
    }

    /// Returns the event counters
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Returns the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the underlying transport mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Registers the message callback, replacing any previous one
    pub fn set_callback(&mut self, cb: MsgCallback) {
        let irq = self.transport.irq_save();
        self.callback = Some(cb);
        self.transport.irq_restore(irq);
    }

    /// Removes the message callback
    ///
    /// Messages completing without a callback are dropped silently; their
    /// buffers are still recycled.
    pub fn clear_callback(&mut self) {
        let irq = self.transport.irq_save();
        self.callback = None;
        self.transport.irq_restore(irq);
    }

    /// Sets the expected peer contributions of the given barrier level
    pub fn set_sync_max(&mut self, level: usize, value: u32) -> Result<(), Error> {
        self.barrier.set_max(level, value)
    }

    /// Transmits the concatenation of three segments to `dest`
    pub fn send(
        &mut self,
        dest: Coord,
        head: &[u8],
        body: &[u8],
        tail: &[u8],
    ) -> Result<(), Error> {
        frag::send_stream(
            &mut self.transport,
            &mut self.metrics,
            self.ucast_template,
            dest,
            Channel::Unicast,
            head,
            body,
            tail,
        )
    }

    /// Transmits the concatenation of three segments to the whole mesh
    pub fn broadcast(&mut self, head: &[u8], body: &[u8], tail: &[u8]) -> Result<(), Error> {
        frag::send_stream(
            &mut self.transport,
            &mut self.metrics,
            wire::bcast_template(),
            self.ident,
            Channel::Broadcast,
            head,
            body,
            tail,
        )
    }

    /// Fast receive path: dispatches one raw packet
    pub fn handle_packet(&mut self, raw: RawPacket) -> Result<(), Error> {
        match wire::decode(raw)? {
            Packet::Unicast(frag) => {
                self.metrics.bump(Event::UcastFragRecvd);
                if frag.last {
                    self.metrics.bump(Event::UcastFragRecvdLast);
                }
                self.pool.accept(&frag)
            },

            Packet::Broadcast(frag) => {
                self.metrics.bump(Event::BcastFragRecvd);
                if frag.last {
                    self.metrics.bump(Event::BcastFragRecvdLast);
                }
                self.pool.accept(&frag)
            },

            Packet::Sync(level) => {
                self.metrics.bump(Event::SyncRecvd);
                self.barrier.record(level);
                Ok(())
            },

            Packet::PeerSyn { source } => {
                self.metrics.bump(Event::SynRecvd);
                self.peers.syn_received(source);
                Ok(())
            },

            Packet::PeerAck => {
                self.metrics.bump(Event::AckRecvd);
                self.peers.ack_received();
                Ok(())
            },
        }
    }

    /// Deferred delivery path: invokes the callback for every completed
    /// message and recycles its buffer
    pub fn deliver_pending(&mut self) {
        while let Some(idx) = self.pool.pop_ready() {
            let (channel, source) = {
                let (_, owner) = self.pool.message(idx);
                wire::owner_source(owner)
            };
            log::debug!(
                target: "mcm::reasm",
                "finished buffer {} ({:?} from {})",
                idx,
                channel,
                source
            );
            match channel {
                Channel::Unicast => self.metrics.bump(Event::UcastMsgRecvd),
                Channel::Broadcast => self.metrics.bump(Event::BcastMsgRecvd),
            }

            if let Some(cb) = self.callback.as_mut() {
                let (bytes, _) = self.pool.message(idx);
                cb(bytes, channel, source);
            }

            // the slot must not be claimed by a new fragment halfway
            // through the reset
            let irq = self.transport.irq_save();
            self.pool.release(idx);
            self.transport.irq_restore(irq);
        }
    }

    /// Polls the substrate once: fast receive path, then deferred deliveries
    pub fn service(&mut self) -> Result<(), Error> {
        self.drain_rx()?;
        self.deliver_pending();
        Ok(())
    }

    fn drain_rx(&mut self) -> Result<(), Error> {
        while let Some(raw) = self.transport.fetch_packet() {
            self.handle_packet(raw)?;
        }
        Ok(())
    }

    /// Blocks in the multilevel barrier until the whole mesh is released
    ///
    /// Unbounded: a missing contribution anywhere in the tree stalls this
    /// call forever.
    pub fn wait(&mut self) -> Result<(), Error> {
        log::debug!(target: "mcm::sync", "{} entering barrier", self.ident);
        loop {
            self.drain_rx()?;
            self.deliver_pending();
            if self.barrier.step(&mut self.transport, &mut self.metrics)? == Phase::Released {
                return Ok(());
            }
            self.transport.delay_us(cfg::POLL_DELAY_US);
        }
    }

    /// Advances the barrier by one non-blocking step, draining inbound
    /// packets first, and returns the phase reached
    pub fn barrier_step(&mut self) -> Result<Phase, Error> {
        self.drain_rx()?;
        self.barrier.step(&mut self.transport, &mut self.metrics)
    }

    /// Sends a rendezvous request to `dest` and waits for its acknowledgment
    pub fn syn(&mut self, dest: Coord) -> Result<(), Error> {
        let pkt = wire::encode_peer_syn(self.ucast_template, dest);
        if !self.transport.send_packet(pkt.key, pkt.payload) {
            return Err(Error::new(Code::SendFailed));
        }
        self.metrics.bump(Event::SynSent);

        loop {
            self.drain_rx()?;
            if !self.peers.ack_set(true) {
                return Ok(());
            }
            self.transport.delay_us(cfg::POLL_DELAY_US);
        }
    }

    /// Waits for a rendezvous request from `source`, then acknowledges it
    pub fn wait_for_core(&mut self, source: Coord) -> Result<(), Error> {
        loop {
            self.drain_rx()?;
            if !self.peers.syn_set(source, true) {
                break;
            }
            self.transport.delay_us(cfg::POLL_DELAY_US);
        }

        let pkt = wire::encode_peer_ack(self.ucast_template, source);
        if !self.transport.send_packet(pkt.key, pkt.payload) {
            return Err(Error::new(Code::SendFailed));
        }
        self.metrics.bump(Event::AckSent);
        Ok(())
    }

    /// Direct test-and-set access to the SYN lock of `core`
    pub fn syn_set(&mut self, core: Coord, value: bool) -> bool {
        self.peers.syn_set(core, value)
    }

    /// Direct test-and-set access to the ACK lock
    pub fn ack_set(&mut self, value: bool) -> bool {
        self.peers.ack_set(value)
    }

    /// Generates and installs this chip's router rules
    ///
    /// Runs only on the chip leader; every other processor returns without
    /// touching the table. The table is sized at build time, so exhaustion
    /// is fatal.
    pub fn configure_routes(&mut self) -> Result<(), Error> {
        if !self.roles.chip_leader {
            return Ok(());
        }

        let rules = route::generate(self.ident);
        log::debug!(
            target: "mcm::route",
            "installing {} rules for chip {}:{}",
            rules.len(),
            self.ident.x(),
            self.ident.y()
        );
        for rule in &rules {
            if self
                .transport
                .add_rule(rule.key, rule.mask, rule.route.bits())
                .is_none()
            {
                return Err(Error::new(Code::NoRouteSpace));
            }
        }
        Ok(())
    }
}
