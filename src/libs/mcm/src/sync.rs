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

//! The multilevel barrier synchronizer and the pairwise rendezvous locks
//!
//! The barrier forms a three-level spanning tree over the mesh: every
//! processing element contributes to its chip leader, chip leaders escalate
//! to their ring leader on the board diagonal, ring leaders escalate to the
//! board root at (0,0), and the root releases the whole mesh with one FREE
//! packet. All waits are unbounded busy-polls; a missing contribution stalls
//! the barrier forever.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::cfg;
use crate::errors::{Code, Error};
use crate::metrics::{Event, Metrics};
use crate::transport::Transport;
use crate::wire::{self, Coord, SyncLevel};

/// The barrier participation of one processing element
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Roles {
    /// Aggregates the on-chip arrivals (processor 1 of every chip)
    pub chip_leader: bool,
    /// Aggregates the chip leaders of its ring (diagonal chips)
    pub ring_leader: bool,
    /// Aggregates the ring leaders and releases the mesh (chip (0,0))
    pub board_root: bool,
}

/// Computes the barrier roles of the given coordinate
///
/// Pure function of coordinate and board shape, so the spanning-tree leader
/// election is testable without hardware identity registers.
pub fn roles(coord: Coord) -> Roles {
    let chip_leader = coord.p() == 1;
    let ring_leader = chip_leader && coord.x() == coord.y();
    let board_root = ring_leader && coord.x() == 0;
    Roles {
        chip_leader,
        ring_leader,
        board_root,
    }
}

/// The barrier progress states
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No barrier round in progress
    Idle,
    /// Registering or aggregating the on-chip arrivals
    WaitingLocal,
    /// Draining the peer escalations of the given level
    WaitingPeer(u8),
    /// Spinning on the release lock
    WaitingRelease,
    /// The round completed
    Released,
}

/// One barrier instance
///
/// Level counters are incremented from the receive path and drained with an
/// atomic swap by their single waiter, so each counter is reset exactly once
/// per round. The release lock keeps the swap-based test-and-set behavior of
/// the hardware it replaces: it starts locked, a received FREE clears it,
/// and the waiter's successful swap re-locks it for the next round.
pub struct Barrier {
    roles: Roles,
    max: [u32; cfg::SYNC_LEVELS],
    count: [AtomicU32; cfg::SYNC_LEVELS],
    lock: AtomicBool,
    phase: Phase,
    // contributions drained so far in the phase in progress
    pending: u32,
}

impl Barrier {
    pub fn new(roles: Roles) -> Self {
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Barrier {
            roles,
            max: [0; cfg::SYNC_LEVELS],
            count: [ZERO; cfg::SYNC_LEVELS],
            lock: AtomicBool::new(true),
            phase: Phase::Idle,
            pending: 0,
        }
    }

    /// Sets the number of expected peer contributions for the given level
    pub fn set_max(&mut self, level: usize, value: u32) -> Result<(), Error> {
        if level == 0 || level >= cfg::SYNC_LEVELS {
            return Err(Error::new(Code::InvalidLevel));
        }
        self.max[level] = value;
        log::debug!(target: "mcm::sync", "sync{} max: {}", level, value);
        Ok(())
    }

    /// Returns the current progress state
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Records one received escalation or release packet
    pub fn record(&self, level: SyncLevel) {
        match level {
            SyncLevel::Level1 => {
                self.count[1].fetch_add(1, Ordering::Relaxed);
            },
            SyncLevel::Level2 => {
                self.count[2].fetch_add(1, Ordering::Relaxed);
            },
            SyncLevel::Level3 => {
                self.count[3].fetch_add(1, Ordering::Relaxed);
            },
            SyncLevel::Free => {
                log::debug!(target: "mcm::sync", "received FREE");
                self.lock.store(false, Ordering::Release);
            },
        }
    }

    /// Advances the barrier by at most one transition
    ///
    /// The caller drains inbound packets into [`Barrier::record`] between
    /// steps and delays between polls. Returns [`Phase::Released`] exactly
    /// once per round; the barrier is back at [`Phase::Idle`] afterwards.
    pub fn step<T: Transport>(&mut self, tp: &mut T, metrics: &mut Metrics) -> Result<Phase, Error> {
        match self.phase {
            Phase::Idle => {
                self.pending = 0;
                if !self.roles.chip_leader {
                    // register this core's arrival with the chip leader
                    self.send_sync(tp, metrics, SyncLevel::Level1)?;
                    self.phase = Phase::WaitingRelease;
                }
                else {
                    self.phase = Phase::WaitingLocal;
                }
            },

            Phase::WaitingLocal => {
                self.pending += self.count[1].swap(0, Ordering::AcqRel);
                if self.pending >= self.max[1] {
                    self.pending = 0;
                    if !self.roles.ring_leader {
                        self.send_sync(tp, metrics, SyncLevel::Level2)?;
                        self.phase = Phase::WaitingRelease;
                    }
                    else if !self.roles.board_root {
                        self.phase = Phase::WaitingPeer(2);
                    }
                    else {
                        // the root aggregates the ring leaders directly
                        self.phase = Phase::WaitingPeer(3);
                    }
                }
            },

            Phase::WaitingPeer(level) => {
                self.pending += self.count[level as usize].swap(0, Ordering::AcqRel);
                if self.pending >= self.max[level as usize] {
                    self.pending = 0;
                    if level == 2 {
                        self.send_sync(tp, metrics, SyncLevel::Level3)?;
                        self.phase = Phase::WaitingRelease;
                    }
                    else {
                        // terminal escalator: release the whole mesh
                        self.send_sync(tp, metrics, SyncLevel::Free)?;
                        self.phase = Phase::Idle;
                        return Ok(Phase::Released);
                    }
                }
            },

            Phase::WaitingRelease => {
                if !self.lock.swap(true, Ordering::AcqRel) {
                    self.phase = Phase::Idle;
                    return Ok(Phase::Released);
                }
            },

            Phase::Released => {
                self.phase = Phase::Idle;
            },
        }
        Ok(self.phase)
    }

    fn send_sync<T: Transport>(
        &self,
        tp: &mut T,
        metrics: &mut Metrics,
        level: SyncLevel,
    ) -> Result<(), Error> {
        let pkt = wire::encode_sync(level);
        if !tp.send_packet(pkt.key, pkt.payload) {
            return Err(Error::new(Code::SendFailed));
        }
        metrics.bump(Event::SyncSent);
        Ok(())
    }

    #[cfg(test)]
    fn count(&self, level: usize) -> u32 {
        self.count[level].load(Ordering::Relaxed)
    }
}

/// The pairwise rendezvous locks
///
/// One SYN lock per processing element of the board plus a single ACK lock,
/// all starting locked. A received peer-SYN clears the sender's lock, a
/// received peer-ACK clears the ACK lock; waiters spin with test-and-set.
pub struct PeerLocks {
    syn: [AtomicBool; Self::SLOTS],
    ack: AtomicBool,
}

impl PeerLocks {
    const SLOTS: usize =
        cfg::BOARD_WIDTH as usize * cfg::BOARD_HEIGHT as usize * cfg::CHIP_CORES as usize;

    pub fn new() -> Self {
        const LOCKED: AtomicBool = AtomicBool::new(true);
        PeerLocks {
            syn: [LOCKED; Self::SLOTS],
            ack: AtomicBool::new(true),
        }
    }

    fn idx(core: Coord) -> usize {
        (core.x() as usize * cfg::BOARD_HEIGHT as usize + core.y() as usize)
            * cfg::CHIP_CORES as usize
            + (core.p() as usize - 1)
    }

    /// Test-and-set on the SYN lock of the given core; returns the previous value
    pub fn syn_set(&self, core: Coord, value: bool) -> bool {
        self.syn[Self::idx(core)].swap(value, Ordering::AcqRel)
    }

    /// Test-and-set on the ACK lock; returns the previous value
    pub fn ack_set(&self, value: bool) -> bool {
        self.ack.swap(value, Ordering::AcqRel)
    }

    pub(crate) fn syn_received(&self, source: Coord) {
        self.syn_set(source, false);
    }

    pub(crate) fn ack_received(&self) {
        self.ack_set(false);
    }
}

impl Default for PeerLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTransport;
    use crate::wire::{decode, Packet, RawPacket};

    fn sync_packets(tp: &SimTransport) -> Vec<SyncLevel> {
        tp.sent
            .iter()
            .map(|raw| match decode(*raw).unwrap() {
                Packet::Sync(level) => level,
                p => panic!("unexpected packet {:?}", p),
            })
            .collect()
    }

    fn setup(coord: Coord) -> (Barrier, SimTransport, Metrics) {
        (
            Barrier::new(roles(coord)),
            SimTransport::new(coord),
            Metrics::new(),
        )
    }

    #[test]
    fn role_election() {
        assert_eq!(roles(Coord::new(0, 0, 1)), Roles {
            chip_leader: true,
            ring_leader: true,
            board_root: true,
        });
        assert_eq!(roles(Coord::new(3, 3, 1)), Roles {
            chip_leader: true,
            ring_leader: true,
            board_root: false,
        });
        assert_eq!(roles(Coord::new(3, 1, 1)), Roles {
            chip_leader: true,
            ring_leader: false,
            board_root: false,
        });
        assert_eq!(roles(Coord::new(0, 0, 2)), Roles::default());
    }

    #[test]
    fn plain_core_posts_arrival_and_waits() {
        let (mut b, mut tp, mut m) = setup(Coord::new(2, 1, 5));

        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingRelease);
        assert_eq!(sync_packets(&tp), vec![SyncLevel::Level1]);

        // it never returns before the release arrives
        for _ in 0..100 {
            assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingRelease);
        }

        b.record(SyncLevel::Free);
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::Released);
        assert_eq!(b.phase(), Phase::Idle);
    }

    #[test]
    fn chip_leader_escalates_to_ring() {
        let (mut b, mut tp, mut m) = setup(Coord::new(3, 1, 1));
        b.set_max(1, 2).unwrap();

        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingLocal);
        b.record(SyncLevel::Level1);
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingLocal);
        b.record(SyncLevel::Level1);
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingRelease);
        assert_eq!(sync_packets(&tp), vec![SyncLevel::Level2]);

        b.record(SyncLevel::Free);
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::Released);
        assert_eq!(b.count(1), 0);
    }

    #[test]
    fn ring_leader_escalates_to_root() {
        let (mut b, mut tp, mut m) = setup(Coord::new(2, 2, 1));
        b.set_max(1, 1).unwrap();
        b.set_max(2, 3).unwrap();

        b.step(&mut tp, &mut m).unwrap();
        b.record(SyncLevel::Level1);
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingPeer(2));

        for _ in 0..3 {
            b.record(SyncLevel::Level2);
        }
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingRelease);
        assert_eq!(sync_packets(&tp), vec![SyncLevel::Level3]);

        b.record(SyncLevel::Free);
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::Released);
        assert_eq!(b.count(1), 0);
        assert_eq!(b.count(2), 0);
    }

    #[test]
    fn root_releases_the_mesh() {
        let (mut b, mut tp, mut m) = setup(Coord::new(0, 0, 1));
        b.set_max(1, 1).unwrap();
        b.set_max(3, 7).unwrap();

        b.step(&mut tp, &mut m).unwrap();
        b.record(SyncLevel::Level1);
        // the root skips the level-2 aggregate and drains the ring leaders
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingPeer(3));

        for _ in 0..7 {
            b.record(SyncLevel::Level3);
        }
        // it releases the mesh without waiting on its own lock
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::Released);
        assert_eq!(sync_packets(&tp), vec![SyncLevel::Free]);
        assert_eq!(b.phase(), Phase::Idle);
        assert_eq!(b.count(3), 0);
    }

    #[test]
    fn leader_never_releases_early() {
        let (mut b, mut tp, mut m) = setup(Coord::new(3, 1, 1));
        b.set_max(1, 4).unwrap();

        b.step(&mut tp, &mut m).unwrap();
        for _ in 0..3 {
            b.record(SyncLevel::Level1);
        }
        for _ in 0..100 {
            assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingLocal);
        }
        assert!(sync_packets(&tp).is_empty());
    }

    #[test]
    fn counters_drain_across_rounds() {
        let (mut b, mut tp, mut m) = setup(Coord::new(3, 1, 1));
        b.set_max(1, 2).unwrap();

        for _ in 0..2 {
            b.step(&mut tp, &mut m).unwrap();
            b.record(SyncLevel::Level1);
            b.step(&mut tp, &mut m).unwrap();
            b.record(SyncLevel::Level1);
            b.step(&mut tp, &mut m).unwrap();
            b.record(SyncLevel::Free);
            assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::Released);
            assert_eq!(b.count(1), 0);
        }
        assert_eq!(sync_packets(&tp), vec![SyncLevel::Level2, SyncLevel::Level2]);
    }

    #[test]
    fn invalid_level_is_rejected() {
        let (mut b, _, _) = setup(Coord::new(0, 0, 1));
        assert_eq!(b.set_max(0, 1).unwrap_err().code(), Code::InvalidLevel);
        assert_eq!(b.set_max(4, 1).unwrap_err().code(), Code::InvalidLevel);
    }

    #[test]
    fn release_lock_relocks_on_acquire() {
        let (mut b, mut tp, mut m) = setup(Coord::new(1, 0, 4));
        b.step(&mut tp, &mut m).unwrap();
        b.record(SyncLevel::Free);
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::Released);

        // the next round finds the lock taken again
        b.step(&mut tp, &mut m).unwrap();
        assert_eq!(b.step(&mut tp, &mut m).unwrap(), Phase::WaitingRelease);
    }

    #[test]
    fn peer_locks_start_locked() {
        let locks = PeerLocks::new();
        let a = Coord::new(1, 2, 3);
        assert!(locks.syn_set(a, true));
        locks.syn_received(a);
        assert!(!locks.syn_set(a, true));
        // distinct cores have distinct locks
        assert!(locks.syn_set(Coord::new(1, 2, 4), true));

        assert!(locks.ack_set(true));
        locks.ack_received();
        assert!(!locks.ack_set(true));
    }

    #[test]
    fn ignored_sync_packet_on_idle_barrier() {
        // stray escalations accumulate until a round drains them
        let (b, _, _) = setup(Coord::new(5, 5, 1));
        b.record(SyncLevel::Level2);
        b.record(SyncLevel::Level2);
        assert_eq!(b.count(2), 2);
    }

    #[test]
    fn sync_packet_key_is_class_and_level_only() {
        let pkt: RawPacket = wire::encode_sync(SyncLevel::Level2);
        assert_eq!(pkt.key, 0x8000_0002);
        assert_eq!(pkt.payload, 0);
    }
}
