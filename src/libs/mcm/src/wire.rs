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

//! The packet codec for the multicast wire format
//!
//! A wire packet is a 32-bit routing key plus a 32-bit payload word. The key
//! is a tagged bit field, discriminated by the packet class in its two top
//! bits:
//!
//! ```text
//! class  pivot(x,y,p)  lf ctrl  .  ak sy  src(x,y,p)     sync level /
//! 31-30  29-27..23-20  19 18-16    15 14  13-11..7-4     ext. payload 15-0/3-0
//! ```
//!
//! The pivot field carries the destination for unicast packets and the
//! source for broadcast packets. Processor indices are 1-based in the API
//! and 0-based on the wire. Broadcast fragments borrow the low 16 key bits
//! for two additional payload bytes; sync packets carry their one-hot level
//! in the low nibble instead.

use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::cfg;
use crate::errors::{Code, Error};

const CLASS_SHIFT: u32 = 30;

const PIVOT_X_SHIFT: u32 = 27;
const PIVOT_Y_SHIFT: u32 = 24;
const PIVOT_P_SHIFT: u32 = 20;

const LAST_SHIFT: u32 = 19;
const CTRL_SHIFT: u32 = 16;
const KIND_SHIFT: u32 = 14;

const SRC_X_SHIFT: u32 = 11;
const SRC_Y_SHIFT: u32 = 8;
const SRC_P_SHIFT: u32 = 4;

const X_MASK: u32 = 0x7;
const Y_MASK: u32 = 0x7;
const P_MASK: u32 = 0xF;
const CTRL_MASK: u32 = 0x7;
const LEVEL_MASK: u32 = 0xF;

/// Mask of the source template field, used as unicast owner key
const UCAST_OWNER_MASK: u32 = 0x0000_3FF0;
/// Mask of the pivot field, relocated to the owner-key position for broadcast
const BCAST_OWNER_MASK: u32 = 0x3FF0_0000;

/// A raw key/payload pair as exchanged with the packet substrate
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RawPacket {
    pub key: u32,
    pub payload: u32,
}

/// The packet class discriminant in the two top key bits
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum PacketClass {
    Unicast = 0,
    Broadcast = 1,
    Sync = 2,
    Reserved = 3,
}

/// The logical channel of a transmission unit
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Channel {
    Unicast,
    Broadcast,
}

/// One tier of the multilevel barrier, one-hot in the low key nibble
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum SyncLevel {
    Level1 = 0x1,
    Level2 = 0x2,
    Level3 = 0x4,
    Free = 0x8,
}

/// A processing-element coordinate: chip position and 1-based processor index
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct Coord {
    x: u8,
    y: u8,
    p: u8,
}

impl Coord {
    /// Constructs a new coordinate from chip position and 1-based processor index
    pub const fn new(x: u8, y: u8, p: u8) -> Self {
        Self { x, y, p }
    }

    /// Returns the chip x position
    pub const fn x(&self) -> u8 {
        self.x
    }

    /// Returns the chip y position
    pub const fn y(&self) -> u8 {
        self.y
    }

    /// Returns the 1-based processor index
    pub const fn p(&self) -> u8 {
        self.p
    }

    /// Returns the pivot field bits of this coordinate (wire index is 0-based)
    pub(crate) const fn pivot_bits(&self) -> u32 {
        ((self.x as u32 & X_MASK) << PIVOT_X_SHIFT)
            | ((self.y as u32 & Y_MASK) << PIVOT_Y_SHIFT)
            | (((self.p as u32).wrapping_sub(1) & P_MASK) << PIVOT_P_SHIFT)
    }

    /// Returns the source template bits of this coordinate
    pub(crate) const fn source_bits(&self) -> u32 {
        ((self.x as u32 & X_MASK) << SRC_X_SHIFT)
            | ((self.y as u32 & Y_MASK) << SRC_Y_SHIFT)
            | (((self.p as u32).wrapping_sub(1) & P_MASK) << SRC_P_SHIFT)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}:{}:{:02}", self.x, self.y, self.p)
    }
}

/// The owner key identifying the sender of an in-flight transmission unit
///
/// Unicast owners are even, broadcast owners odd; both embed the sender
/// coordinate at the same bit positions. Zero marks a free buffer and is
/// not a valid owner.
pub type OwnerKey = u16;

/// Returns the class bits of the given packet class
pub(crate) const fn class_bits(class: PacketClass) -> u32 {
    (class as u32) << CLASS_SHIFT
}

/// Returns the constant key part carrying this PE as unicast source
pub fn ucast_template(source: Coord) -> u32 {
    class_bits(PacketClass::Unicast) | source.source_bits()
}

/// Returns the constant key part of broadcast transmissions
pub fn bcast_template() -> u32 {
    class_bits(PacketClass::Broadcast)
}

/// Derives the owner key of a unicast data fragment
pub fn ucast_owner(key: u32) -> OwnerKey {
    (key & UCAST_OWNER_MASK) as OwnerKey
}

/// Derives the owner key of a broadcast data fragment
pub fn bcast_owner(key: u32) -> OwnerKey {
    (((key & BCAST_OWNER_MASK) >> 16) + 1) as OwnerKey
}

/// Recovers channel and sender coordinate from an owner key
pub fn owner_source(owner: OwnerKey) -> (Channel, Coord) {
    let channel = if owner & 1 == 1 {
        Channel::Broadcast
    }
    else {
        Channel::Unicast
    };
    let key = owner as u32;
    let x = ((key >> SRC_X_SHIFT) & X_MASK) as u8;
    let y = ((key >> SRC_Y_SHIFT) & Y_MASK) as u8;
    let p = (((key >> SRC_P_SHIFT) & P_MASK) + 1) as u8;
    (channel, Coord::new(x, y, p))
}

/// Recovers the pivot coordinate of a data packet key
pub fn pivot_coord(key: u32) -> Coord {
    let x = ((key >> PIVOT_X_SHIFT) & X_MASK) as u8;
    let y = ((key >> PIVOT_Y_SHIFT) & Y_MASK) as u8;
    let p = (((key >> PIVOT_P_SHIFT) & P_MASK) + 1) as u8;
    Coord::new(x, y, p)
}

fn source_coord(key: u32) -> Coord {
    let x = ((key >> SRC_X_SHIFT) & X_MASK) as u8;
    let y = ((key >> SRC_Y_SHIFT) & Y_MASK) as u8;
    let p = (((key >> SRC_P_SHIFT) & P_MASK) + 1) as u8;
    Coord::new(x, y, p)
}

/// Encodes one data fragment
///
/// Up to four payload bytes go into the payload word, lowest byte first.
/// Extended (broadcast) fragments put bytes four and five into the low key
/// bits instead of leaving them unused.
pub fn encode_fragment(
    template: u32,
    pivot: Coord,
    last: bool,
    ctrl: u8,
    data: &[u8],
    extended: bool,
) -> RawPacket {
    let mut key = template
        | pivot.pivot_bits()
        | ((last as u32) << LAST_SHIFT)
        | ((ctrl as u32 & CTRL_MASK) << CTRL_SHIFT);

    let mut payload = 0;
    for (i, b) in data.iter().take(4).enumerate() {
        payload |= (*b as u32) << (8 * i);
    }

    if extended {
        for (i, b) in data.iter().skip(4).take(2).enumerate() {
            key |= (*b as u32) << (8 * i);
        }
    }

    RawPacket { key, payload }
}

/// Encodes a barrier escalation or release packet
pub fn encode_sync(level: SyncLevel) -> RawPacket {
    RawPacket {
        key: class_bits(PacketClass::Sync) | u32::from(level),
        payload: 0,
    }
}

/// Encodes a pairwise rendezvous request to `dest`
pub fn encode_peer_syn(template: u32, dest: Coord) -> RawPacket {
    RawPacket {
        key: template | dest.pivot_bits() | (1 << KIND_SHIFT),
        payload: 0,
    }
}

/// Encodes a pairwise rendezvous acknowledgment to `dest`
pub fn encode_peer_ack(template: u32, dest: Coord) -> RawPacket {
    RawPacket {
        key: template | dest.pivot_bits() | (2 << KIND_SHIFT),
        payload: 0,
    }
}

/// One data fragment with its reassembly metadata
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DataFragment {
    /// The owner key of the transmission unit this fragment belongs to
    pub owner: OwnerKey,
    /// Whether this is the final fragment of the transmission unit
    pub last: bool,
    /// The control field: send counter modulo 8, or pad count on the last fragment
    pub ctrl: u8,
    bytes: [u8; cfg::BCAST_FRAGMENT_MAX],
    max: u8,
}

impl DataFragment {
    fn unicast(raw: RawPacket) -> Self {
        let mut bytes = [0; cfg::BCAST_FRAGMENT_MAX];
        for (i, b) in bytes.iter_mut().take(4).enumerate() {
            *b = (raw.payload >> (8 * i)) as u8;
        }
        DataFragment {
            owner: ucast_owner(raw.key),
            last: (raw.key >> LAST_SHIFT) & 1 == 1,
            ctrl: ((raw.key >> CTRL_SHIFT) & CTRL_MASK) as u8,
            bytes,
            max: cfg::UCAST_FRAGMENT_MAX as u8,
        }
    }

    fn broadcast(raw: RawPacket) -> Self {
        let mut frag = Self::unicast(raw);
        frag.owner = bcast_owner(raw.key);
        frag.bytes[4] = raw.key as u8;
        frag.bytes[5] = (raw.key >> 8) as u8;
        frag.max = cfg::BCAST_FRAGMENT_MAX as u8;
        frag
    }

    /// Returns the payload bytes, excluding the pad declared by the control
    /// field of a last fragment
    pub fn payload(&self) -> &[u8] {
        let len = if self.last {
            self.max.saturating_sub(self.ctrl)
        }
        else {
            self.max
        };
        &self.bytes[..len as usize]
    }
}

/// A decoded wire packet
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// A unicast data fragment
    Unicast(DataFragment),
    /// A broadcast data fragment
    Broadcast(DataFragment),
    /// A pairwise rendezvous request
    PeerSyn { source: Coord },
    /// A pairwise rendezvous acknowledgment
    PeerAck,
    /// A barrier escalation or release
    Sync(SyncLevel),
}

/// Decodes a raw packet into its protocol fields
///
/// An unknown class or kind discriminant and a sync level that is not one of
/// the four defined values are protocol violations.
pub fn decode(raw: RawPacket) -> Result<Packet, Error> {
    let class = PacketClass::try_from(raw.key >> CLASS_SHIFT)
        .map_err(|_| Error::new(Code::UnknownClass))?;

    match class {
        PacketClass::Sync => {
            let level = SyncLevel::try_from(raw.key & LEVEL_MASK)
                .map_err(|_| Error::new(Code::UnknownSyncLevel))?;
            Ok(Packet::Sync(level))
        },

        PacketClass::Unicast => match (raw.key >> KIND_SHIFT) & 0x3 {
            0 => Ok(Packet::Unicast(DataFragment::unicast(raw))),
            1 => Ok(Packet::PeerSyn {
                source: source_coord(raw.key),
            }),
            2 => Ok(Packet::PeerAck),
            _ => Err(Error::new(Code::UnknownClass)),
        },

        PacketClass::Broadcast => Ok(Packet::Broadcast(DataFragment::broadcast(raw))),

        PacketClass::Reserved => Err(Error::new(Code::UnknownClass)),
    }
}
