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

//! Contains the global configuration

use static_assertions::const_assert;

/// The number of reconstruction buffers per processing element
pub const RECONSTRUCTION_BUFFERS: usize = 4;

/// The capacity of one reconstruction buffer in bytes
pub const RECONSTRUCTION_BUFFER_SIZE: usize = 272;

/// The delay imposed before every packet injection, in microseconds
///
/// This throttles the injection rate to what the substrate accepts; it is
/// not a backpressure signal.
pub const MC_LATENCY_US: u32 = 5;

/// The delay between two checks of a busy-wait loop, in microseconds
pub const POLL_DELAY_US: u32 = 1;

/// The width of the chip board
pub const BOARD_WIDTH: u8 = 8;

/// The height of the chip board
pub const BOARD_HEIGHT: u8 = 8;

/// The number of application processors per chip
pub const CHIP_CORES: u8 = 16;

/// The maximum fragment payload for unicast transmissions
pub const UCAST_FRAGMENT_MAX: usize = 4;

/// The maximum fragment payload for broadcast transmissions, using the two
/// extended-payload bytes in the key
pub const BCAST_FRAGMENT_MAX: usize = 6;

/// The number of barrier levels, including the unused level 0
pub const SYNC_LEVELS: usize = 4;

// buffer lengths are tracked as u16
const_assert!(RECONSTRUCTION_BUFFER_SIZE < u16::MAX as usize);
// coordinates have 3+3+4 bits on the wire
const_assert!(BOARD_WIDTH <= 8);
const_assert!(BOARD_HEIGHT <= 8);
const_assert!(CHIP_CORES <= 16);
