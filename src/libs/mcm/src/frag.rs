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

//! The outbound fragmentation engine

use core::cmp;

use crate::cfg;
use crate::errors::{Code, Error};
use crate::metrics::{Event, Metrics};
use crate::transport::Transport;
use crate::wire::{self, Channel, Coord};

/// Fragments the concatenation of three segments into wire packets
///
/// Packing is opportunistic: each fragment fills from the segment currently
/// being drained and is topped up from the following segment when the
/// current one runs out mid-fragment, preserving overall byte order. The
/// final fragment across all three segments carries the last flag and
/// declares its pad count in the control field; all earlier fragments carry
/// the modulo-8 send counter instead.
///
/// A transmission whose three segments are all empty sends nothing.
pub(crate) fn send_stream<T: Transport>(
    tp: &mut T,
    metrics: &mut Metrics,
    template: u32,
    pivot: Coord,
    channel: Channel,
    mut head: &[u8],
    mut body: &[u8],
    mut tail: &[u8],
) -> Result<(), Error> {
    let (max, extended) = match channel {
        Channel::Unicast => (cfg::UCAST_FRAGMENT_MAX, false),
        Channel::Broadcast => (cfg::BCAST_FRAGMENT_MAX, true),
    };

    let mut remaining = head.len() + body.len() + tail.len();
    let mut counter: u8 = 0;
    let mut patch = [0u8; cfg::BCAST_FRAGMENT_MAX];

    log::debug!(
        target: "mcm::frag",
        "send {:?} pivot={} length={}",
        channel,
        pivot,
        remaining
    );

    // drain the head, topping its final fragment up from the body
    while !head.is_empty() {
        if head.len() <= max {
            let a = head.len();
            let c = cmp::min(body.len(), max - a);
            patch[..a].copy_from_slice(head);
            patch[a..a + c].copy_from_slice(&body[..c]);
            head = &head[a..];
            body = &body[c..];

            remaining -= a + c;
            send_fragment(tp, metrics, template, pivot, remaining == 0, counter, &patch[..a + c], extended)?;
        }
        else {
            remaining -= max;
            send_fragment(tp, metrics, template, pivot, false, counter, &head[..max], extended)?;
            head = &head[max..];
        }
        counter = counter.wrapping_add(1);
    }

    // drain the body, topping its final fragment up from the tail
    while !body.is_empty() {
        if body.len() <= max {
            let a = body.len();
            let c = cmp::min(tail.len(), max - a);
            patch[..a].copy_from_slice(body);
            patch[a..a + c].copy_from_slice(&tail[..c]);
            body = &body[a..];
            tail = &tail[c..];

            remaining -= a + c;
            send_fragment(tp, metrics, template, pivot, remaining == 0, counter, &patch[..a + c], extended)?;
        }
        else {
            remaining -= max;
            send_fragment(tp, metrics, template, pivot, false, counter, &body[..max], extended)?;
            body = &body[max..];
        }
        counter = counter.wrapping_add(1);
    }

    // drain the tail
    while !tail.is_empty() {
        let take = cmp::min(tail.len(), max);
        remaining -= take;
        send_fragment(tp, metrics, template, pivot, remaining == 0, counter, &tail[..take], extended)?;
        tail = &tail[take..];
        counter = counter.wrapping_add(1);
    }

    match channel {
        Channel::Unicast => metrics.bump(Event::UcastMsgSent),
        Channel::Broadcast => metrics.bump(Event::BcastMsgSent),
    }
    Ok(())
}

fn send_fragment<T: Transport>(
    tp: &mut T,
    metrics: &mut Metrics,
    template: u32,
    pivot: Coord,
    last: bool,
    counter: u8,
    data: &[u8],
    extended: bool,
) -> Result<(), Error> {
    let max = if extended {
        cfg::BCAST_FRAGMENT_MAX
    }
    else {
        cfg::UCAST_FRAGMENT_MAX
    };
    let ctrl = if last {
        (max - data.len()) as u8
    }
    else {
        counter & 0x7
    };

    let pkt = wire::encode_fragment(template, pivot, last, ctrl, data, extended);
    log::trace!(
        target: "mcm::frag",
        "tx key={:#010x} payload={:#010x}",
        pkt.key,
        pkt.payload
    );

    // injection rate limit of the substrate
    tp.delay_us(cfg::MC_LATENCY_US);
    if !tp.send_packet(pkt.key, pkt.payload) {
        return Err(Error::new(Code::SendFailed));
    }

    if extended {
        metrics.bump(Event::BcastFragSent);
        if last {
            metrics.bump(Event::BcastFragSentLast);
        }
    }
    else {
        metrics.bump(Event::UcastFragSent);
        if last {
            metrics.bump(Event::UcastFragSentLast);
        }
    }
    Ok(())
}
