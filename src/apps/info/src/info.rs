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

use mcm::route::{self, Link, Route, RouterRule};
use mcm::sync;
use mcm::wire::{Coord, SyncLevel};

fn link_names(route: Route) -> String {
    let mut names = Vec::new();
    for (link, name) in [
        (Link::East, "E"),
        (Link::NorthEast, "NE"),
        (Link::North, "N"),
        (Link::West, "W"),
        (Link::SouthWest, "SW"),
        (Link::South, "S"),
    ] {
        if route.contains(link.route()) {
            names.push(name);
        }
    }
    if names.is_empty() {
        "-".to_string()
    }
    else {
        names.join(",")
    }
}

fn sync_route(rules: &[RouterRule], level: SyncLevel) -> Route {
    rules
        .iter()
        .find(|r| r.key >> 30 == 2 && r.key & 0xF == u32::from(level))
        .map(|r| r.route)
        .unwrap_or_default()
}

fn main() {
    println!(
        "{:>5} {:>6} {:>6} {:>8} {:>10} {:>10} {:>10}",
        "Chip", "Roles", "Rules", "Fanout", "Sync2", "Sync3", "Free"
    );

    for y in 0..8u8 {
        for x in 0..8u8 {
            if !route::chip_valid(x as i8, y as i8) {
                println!("{:>2},{:>2} {:>6}", x, y, "hole");
                continue;
            }

            let leader = Coord::new(x, y, 1);
            let roles = sync::roles(leader);
            let mut role_str = String::from("C");
            if roles.ring_leader {
                role_str.push('R');
            }
            if roles.board_root {
                role_str.push('B');
            }

            let rules = route::generate(leader);
            let fanout = rules
                .first()
                .map(|r| r.route.links())
                .unwrap_or_default();

            println!(
                "{:>2},{:>2} {:>6} {:>6} {:>8} {:>10} {:>10} {:>10}",
                x,
                y,
                role_str,
                rules.len(),
                link_names(fanout),
                link_names(sync_route(&rules, SyncLevel::Level2).links()),
                link_names(sync_route(&rules, SyncLevel::Level3).links()),
                link_names(sync_route(&rules, SyncLevel::Free).links()),
            );
        }
    }
}
