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

//! Router-rule generation for the hexagonal mesh
//!
//! Each chip carries six outbound links (E, NE, N, W, SW, S); the NW and SE
//! compass directions are not wired. The board is an 8x8 sheet whose two
//! corner triangles beyond the hexagonal wrap limits are unpopulated, so
//! every emitted route is filtered against the chip validity predicate.

use alloc::vec::Vec;

use bitflags::bitflags;

use crate::cfg;
use crate::wire::{self, Coord, PacketClass, SyncLevel};

bitflags! {
    /// One router route word: six link bits plus one bit per on-chip processor
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Route: u32 {
        const EAST = 1 << 0;
        const NORTH_EAST = 1 << 1;
        const NORTH = 1 << 2;
        const WEST = 1 << 3;
        const SOUTH_WEST = 1 << 4;
        const SOUTH = 1 << 5;

        /// All six link bits
        const LINKS = Self::EAST.bits()
            | Self::NORTH_EAST.bits()
            | Self::NORTH.bits()
            | Self::WEST.bits()
            | Self::SOUTH_WEST.bits()
            | Self::SOUTH.bits();
    }
}

impl Route {
    const CORE_SHIFT: u32 = 6;

    /// Returns the route bit of the given 1-based processor index
    pub fn core(p: u8) -> Route {
        Route::from_bits_retain(1 << (Self::CORE_SHIFT + p as u32 - 1))
    }

    /// Returns the route bits of all processors of one chip
    pub fn all_cores() -> Route {
        Route::from_bits_retain(((1 << cfg::CHIP_CORES as u32) - 1) << Self::CORE_SHIFT)
    }

    /// Returns the link bits of this route
    pub fn links(self) -> Route {
        self & Route::LINKS
    }
}

/// The six wired links of a chip
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Link {
    East,
    NorthEast,
    North,
    West,
    SouthWest,
    South,
}

impl Link {
    pub const ALL: [Link; 6] = [
        Link::East,
        Link::NorthEast,
        Link::North,
        Link::West,
        Link::SouthWest,
        Link::South,
    ];

    /// Returns the chip-coordinate offset of this link
    pub const fn offset(self) -> (i8, i8) {
        match self {
            Link::East => (1, 0),
            Link::NorthEast => (1, 1),
            Link::North => (0, 1),
            Link::West => (-1, 0),
            Link::SouthWest => (-1, -1),
            Link::South => (0, -1),
        }
    }

    /// Returns the route bit of this link
    pub const fn route(self) -> Route {
        match self {
            Link::East => Route::EAST,
            Link::NorthEast => Route::NORTH_EAST,
            Link::North => Route::NORTH,
            Link::West => Route::WEST,
            Link::SouthWest => Route::SOUTH_WEST,
            Link::South => Route::SOUTH,
        }
    }
}

/// One ternary router entry
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RouterRule {
    pub key: u32,
    pub mask: u32,
    pub route: Route,
}

// rule masks: class only, class+chip, class+chip+processor, class+sync level
const CHIP_MASK: u32 = 0xFF00_0000;
const CORE_MASK: u32 = 0xFFF0_0000;
const SYNC_MASK: u32 = 0xC000_000F;

/// Returns true if `(x, y)` addresses a physically present chip
pub fn chip_valid(x: i8, y: i8) -> bool {
    x >= 0
        && x < cfg::BOARD_WIDTH as i8
        && y >= 0
        && y < cfg::BOARD_HEIGHT as i8
        && y <= x + 3
        && y >= x - 4
}

/// Computes the outbound links moving strictly toward the given chip
///
/// The eight relative positions (aligned on x, aligned on y, or diagonal in
/// one of the four quadrants) each select one to three candidate links; a
/// candidate is dropped when its next hop is not a valid chip, so a route
/// is never emitted toward a hole in the mesh.
pub fn safe_route(from: (i8, i8), to: (i8, i8)) -> Route {
    let (cx, cy) = from;
    let (tx, ty) = to;
    debug_assert!((cx, cy) != (tx, ty));

    let candidates: &[Link] = if tx == cx {
        if ty > cy {
            &[Link::North]
        }
        else {
            &[Link::South]
        }
    }
    else if ty == cy {
        if tx > cx {
            &[Link::East]
        }
        else {
            &[Link::West]
        }
    }
    else if tx > cx && ty > cy {
        &[Link::East, Link::NorthEast, Link::North]
    }
    else if tx > cx && ty < cy {
        &[Link::East, Link::South]
    }
    else if tx < cx && ty > cy {
        &[Link::West, Link::North]
    }
    else {
        &[Link::West, Link::SouthWest, Link::South]
    };

    let mut route = Route::empty();
    for link in candidates {
        let (dx, dy) = link.offset();
        if chip_valid(cx + dx, cy + dy) {
            route |= link.route();
        }
    }
    route
}

// the release flood travels along a spanning tree rooted at (0,0); the
// parent of a chip is SW on the diagonal, W below it and S above it
fn free_children(cx: i8, cy: i8) -> Route {
    let mut route = Route::empty();
    for (link, child) in [
        (Link::East, cx + 1 > cy),
        (Link::North, cx <= cy),
        (Link::NorthEast, cx == cy),
    ] {
        let (dx, dy) = link.offset();
        if child && chip_valid(cx + dx, cy + dy) {
            route |= link.route();
        }
    }
    route
}

/// Generates the complete router rule set for the chip of `ident`
///
/// Pure function of the coordinate; installing the rules is the caller's
/// concern (see `Mcm::configure_routes`).
pub fn generate(ident: Coord) -> Vec<RouterRule> {
    let cx = ident.x() as i8;
    let cy = ident.y() as i8;
    let mut rules = Vec::new();

    // every valid neighbor link, for the local broadcast fan-out
    let mut fanout = Route::empty();
    for link in Link::ALL {
        let (dx, dy) = link.offset();
        if chip_valid(cx + dx, cy + dy) {
            fanout |= link.route();
        }
    }

    // broadcast fragments sourced on this chip: deliver to every local
    // processor except the sender and fan out to all neighbors; one rule
    // per sender since the exclusion depends on it
    for p in 1..=cfg::CHIP_CORES {
        rules.push(RouterRule {
            key: wire::class_bits(PacketClass::Broadcast)
                | Coord::new(ident.x(), ident.y(), p).pivot_bits(),
            mask: CORE_MASK,
            route: (Route::all_cores() - Route::core(p)) | fanout,
        });
    }

    // unicast fragments for a local processor stop here
    for p in 1..=cfg::CHIP_CORES {
        rules.push(RouterRule {
            key: wire::class_bits(PacketClass::Unicast)
                | Coord::new(ident.x(), ident.y(), p).pivot_bits(),
            mask: CORE_MASK,
            route: Route::core(p),
        });
    }

    // unicast fragments for every other chip move strictly toward it
    for x in 0..cfg::BOARD_WIDTH as i8 {
        for y in 0..cfg::BOARD_HEIGHT as i8 {
            if (x, y) == (cx, cy) || !chip_valid(x, y) {
                continue;
            }
            rules.push(RouterRule {
                key: wire::class_bits(PacketClass::Unicast)
                    | Coord::new(x as u8, y as u8, 1).pivot_bits(),
                mask: CHIP_MASK,
                route: safe_route((cx, cy), (x, y)),
            });
        }
    }

    // level-1 escalations stay on-chip, delivered to the chip leader
    rules.push(sync_rule(SyncLevel::Level1, Route::core(1)));

    // escalations travel along a single parent link so the aggregating
    // leader sees each contribution exactly once
    let lvl2 = if cx == cy {
        Route::core(1)
    }
    else if cy < cx {
        parent_link(cx, cy, Link::West)
    }
    else {
        parent_link(cx, cy, Link::South)
    };
    rules.push(sync_rule(SyncLevel::Level2, lvl2));

    let lvl3 = if (cx, cy) == (0, 0) {
        Route::core(1)
    }
    else if cx == cy {
        parent_link(cx, cy, Link::SouthWest)
    }
    else if cy < cx {
        parent_link(cx, cy, Link::West)
    }
    else {
        parent_link(cx, cy, Link::South)
    };
    rules.push(sync_rule(SyncLevel::Level3, lvl3));

    // the release reaches every processor of every chip exactly once
    rules.push(sync_rule(
        SyncLevel::Free,
        Route::all_cores() | free_children(cx, cy),
    ));

    rules
}

fn sync_rule(level: SyncLevel, route: Route) -> RouterRule {
    RouterRule {
        key: wire::class_bits(PacketClass::Sync) | u32::from(level),
        mask: SYNC_MASK,
        route,
    }
}

// one escalation link, still filtered against the validity predicate
fn parent_link(cx: i8, cy: i8, link: Link) -> Route {
    let (dx, dy) = link.offset();
    if chip_valid(cx + dx, cy + dy) {
        link.route()
    }
    else {
        Route::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_chips() -> Vec<(i8, i8)> {
        let mut chips = Vec::new();
        for x in 0..8 {
            for y in 0..8 {
                if chip_valid(x, y) {
                    chips.push((x, y));
                }
            }
        }
        chips
    }

    #[test]
    fn validity_predicate() {
        assert!(chip_valid(0, 0));
        assert!(chip_valid(0, 3));
        assert!(!chip_valid(0, 4));
        assert!(chip_valid(4, 0));
        assert!(!chip_valid(5, 0));
        assert!(chip_valid(7, 7));
        assert!(!chip_valid(7, 2));
        assert!(!chip_valid(-1, 0));
        assert!(!chip_valid(0, 8));
        assert_eq!(valid_chips().len(), 48);
    }

    #[test]
    fn routes_never_leave_the_board() {
        // the safety property: no rule of any chip routes toward a hole
        for (cx, cy) in valid_chips() {
            let rules = generate(Coord::new(cx as u8, cy as u8, 1));
            for rule in &rules {
                for link in Link::ALL {
                    if rule.route.contains(link.route()) {
                        let (dx, dy) = link.offset();
                        assert!(
                            chip_valid(cx + dx, cy + dy),
                            "chip ({},{}) key {:#010x} routes into hole ({},{})",
                            cx,
                            cy,
                            rule.key,
                            cx + dx,
                            cy + dy
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn rule_count_is_uniform() {
        // 16 broadcast + 16 local delivery + 47 remote chips + 4 sync
        for (cx, cy) in valid_chips() {
            let rules = generate(Coord::new(cx as u8, cy as u8, 1));
            assert_eq!(rules.len(), 83);
        }
    }

    #[test]
    fn broadcast_rules_exclude_the_sender() {
        let rules = generate(Coord::new(2, 1, 1));
        let bcast: Vec<_> = rules
            .iter()
            .filter(|r| r.key >> 30 == u32::from(PacketClass::Broadcast))
            .collect();
        assert_eq!(bcast.len(), 16);

        for (i, rule) in bcast.iter().enumerate() {
            let p = i as u8 + 1;
            assert!(!rule.route.contains(Route::core(p)));
            for q in 1..=cfg::CHIP_CORES {
                if q != p {
                    assert!(rule.route.contains(Route::core(q)));
                }
            }
            // (2,1) has all six neighbors
            assert_eq!(rule.route.links(), Route::LINKS);
        }
    }

    #[test]
    fn local_delivery_stops_fanout() {
        let rules = generate(Coord::new(4, 4, 1));
        let local: Vec<_> = rules
            .iter()
            .filter(|r| r.mask == 0xFFF0_0000 && r.key >> 30 == 0)
            .collect();
        assert_eq!(local.len(), 16);
        for (i, rule) in local.iter().enumerate() {
            assert_eq!(rule.route, Route::core(i as u8 + 1));
        }
    }

    #[test]
    fn remote_routes_move_toward_the_target() {
        assert_eq!(safe_route((0, 0), (3, 0)), Route::EAST);
        assert_eq!(safe_route((0, 0), (0, 3)), Route::NORTH);
        assert_eq!(safe_route((5, 2), (1, 2)), Route::WEST);
        assert_eq!(safe_route((3, 3), (3, 1)), Route::SOUTH);
        assert_eq!(
            safe_route((1, 1), (4, 3)),
            Route::EAST | Route::NORTH_EAST | Route::NORTH
        );
        assert_eq!(safe_route((4, 4), (2, 1)), Route::WEST | Route::SOUTH_WEST | Route::SOUTH);
        assert_eq!(safe_route((2, 3), (4, 1)), Route::EAST | Route::SOUTH);
        assert_eq!(safe_route((4, 1), (2, 3)), Route::WEST | Route::NORTH);
    }

    #[test]
    fn candidates_next_to_holes_are_dropped() {
        // from (0,3) toward (1,4): north would leave the board
        assert_eq!(safe_route((0, 3), (1, 4)), Route::EAST | Route::NORTH_EAST);
        // from (4,0) toward (5,1): east runs into the lower corner hole
        assert_eq!(safe_route((4, 0), (5, 1)), Route::NORTH_EAST | Route::NORTH);
    }

    #[test]
    fn sync_rules_converge_on_the_leaders() {
        let find = |rules: &[RouterRule], level: SyncLevel| {
            rules
                .iter()
                .find(|r| r.key == 0x8000_0000 | u32::from(level))
                .copied()
                .unwrap()
        };

        // an off-diagonal chip forwards level 2 toward its diagonal
        let rules = generate(Coord::new(5, 2, 1));
        assert_eq!(find(&rules, SyncLevel::Level2).route, Route::WEST);
        let rules = generate(Coord::new(1, 3, 1));
        assert_eq!(find(&rules, SyncLevel::Level2).route, Route::SOUTH);

        // ring leaders consume level 2 and forward level 3 down the diagonal
        let rules = generate(Coord::new(3, 3, 1));
        assert_eq!(find(&rules, SyncLevel::Level2).route, Route::core(1));
        assert_eq!(find(&rules, SyncLevel::Level3).route, Route::SOUTH_WEST);

        // the root consumes level 3 and floods the release
        let rules = generate(Coord::new(0, 0, 1));
        assert_eq!(find(&rules, SyncLevel::Level3).route, Route::core(1));
        assert_eq!(
            find(&rules, SyncLevel::Free).route,
            Route::all_cores() | Route::EAST | Route::NORTH | Route::NORTH_EAST
        );

        // level 1 never leaves the chip
        assert_eq!(find(&rules, SyncLevel::Level1).route, Route::core(1));
    }

    #[test]
    fn free_flood_reaches_every_chip_once() {
        // walk the spanning tree from the root and count arrivals
        let mut seen = [[0u32; 8]; 8];
        let mut stack = vec![(0i8, 0i8)];
        while let Some((x, y)) = stack.pop() {
            seen[x as usize][y as usize] += 1;
            let children = free_children(x, y);
            for link in Link::ALL {
                if children.contains(link.route()) {
                    let (dx, dy) = link.offset();
                    stack.push((x + dx, y + dy));
                }
            }
        }
        for (x, y) in valid_chips() {
            assert_eq!(seen[x as usize][y as usize], 1, "chip ({},{})", x, y);
        }
    }
}
