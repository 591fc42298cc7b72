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

//! Per-PE event counters

use cfg_if::cfg_if;
use num_enum::IntoPrimitive;

/// The counted protocol events
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive)]
#[repr(usize)]
pub enum Event {
    // transmission units
    UcastMsgSent,
    UcastMsgRecvd,
    BcastMsgSent,
    BcastMsgRecvd,
    // fragments
    UcastFragSent,
    UcastFragSentLast,
    UcastFragRecvd,
    UcastFragRecvdLast,
    BcastFragSent,
    BcastFragSentLast,
    BcastFragRecvd,
    BcastFragRecvdLast,
    // pairwise rendezvous
    SynSent,
    SynRecvd,
    AckSent,
    AckRecvd,
    // multilevel barrier
    SyncSent,
    SyncRecvd,
}

/// The number of counted events
pub const EVENTS: usize = 18;

cfg_if! {
    if #[cfg(feature = "metrics")] {
        /// The event counters of one processing element
        pub struct Metrics {
            counts: [u32; EVENTS],
        }

        impl Metrics {
            pub const fn new() -> Self {
                Metrics {
                    counts: [0; EVENTS],
                }
            }

            pub(crate) fn bump(&mut self, ev: Event) {
                self.counts[usize::from(ev)] += 1;
            }

            /// Returns the number of occurrences of the given event
            pub fn get(&self, ev: Event) -> u32 {
                self.counts[usize::from(ev)]
            }
        }
    }
    else {
        /// The event counters of one processing element (disabled)
        pub struct Metrics;

        impl Metrics {
            pub const fn new() -> Self {
                Metrics
            }

            pub(crate) fn bump(&mut self, _ev: Event) {
            }

            /// Returns the number of occurrences of the given event
            pub fn get(&self, _ev: Event) -> u32 {
                0
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts() {
        let mut m = Metrics::new();
        assert_eq!(m.get(Event::SynSent), 0);
        m.bump(Event::SynSent);
        m.bump(Event::SynSent);
        m.bump(Event::AckRecvd);
        #[cfg(feature = "metrics")]
        {
            assert_eq!(m.get(Event::SynSent), 2);
            assert_eq!(m.get(Event::AckRecvd), 1);
        }
    }
}
