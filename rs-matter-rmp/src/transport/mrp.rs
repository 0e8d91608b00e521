/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

use core::time::Duration;

use cfg_if::cfg_if;
use log::{debug, error, warn};

use crate::error::*;

use super::exchange::ExchangeId;
use super::network::{Address, NetworkSend, MAX_TX_PACKET_SIZE};
use super::system::{SystemLayer, Timer};

pub const MRP_STANDALONE_ACK_TIMEOUT: Duration = Duration::from_millis(200);
pub const MRP_MAX_TRANSMISSIONS: u8 = 5;

cfg_if! {
    if #[cfg(feature = "max-retrans-entries-16")] {
        /// Max number of reliable messages awaiting an ack across all exchanges
        pub const MAX_RETRANS_ENTRIES: usize = 16;
    } else if #[cfg(feature = "max-retrans-entries-4")] {
        /// Max number of reliable messages awaiting an ack across all exchanges
        pub const MAX_RETRANS_ENTRIES: usize = 4;
    } else {
        /// Max number of reliable messages awaiting an ack across all exchanges
        pub const MAX_RETRANS_ENTRIES: usize = 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEntry {
    // The msg counter that we should acknowledge
    msg_ctr: u32,
    // When a standalone ack goes out unless a reply carries the ack first
    deadline: Duration,
}

impl AckEntry {
    pub fn get_msg_ctr(&self) -> u32 {
        self.msg_ctr
    }

    pub fn get_deadline(&self) -> Duration {
        self.deadline
    }
}

/// The reliability state of one exchange.
#[derive(Debug, Clone)]
pub struct ReliableMessage {
    auto_request_ack: bool,
    ack: Option<AckEntry>,
    // Counter of this exchange's entry in the retransmission table
    retrans: Option<u32>,
}

impl ReliableMessage {
    pub const fn new() -> Self {
        Self {
            auto_request_ack: true,
            ack: None,
            retrans: None,
        }
    }

    pub fn is_auto_request_ack(&self) -> bool {
        self.auto_request_ack
    }

    pub fn set_auto_request_ack(&mut self, auto_request_ack: bool) {
        self.auto_request_ack = auto_request_ack;
    }

    pub fn is_retrans_pending(&self) -> bool {
        self.retrans.is_some()
    }

    pub fn get_retrans(&self) -> Option<u32> {
        self.retrans
    }

    pub fn set_retrans(&mut self, msg_ctr: u32) {
        self.retrans = Some(msg_ctr);
    }

    pub fn clear_retrans(&mut self) {
        self.retrans = None;
    }

    /// Whether the peer asked for an ack which has not been sent yet
    pub fn is_peer_requested_ack(&self) -> bool {
        self.ack.is_some()
    }

    pub fn get_pending_ack(&self) -> Option<AckEntry> {
        self.ack
    }

    pub fn take_pending_ack(&mut self) -> Option<AckEntry> {
        self.ack.take()
    }

    /// Records that the message with `msg_ctr` has to be acknowledged by `deadline`.
    ///
    /// Returns the ack which was pending before, if any: only one ack can be
    /// piggybacked, so the caller has to send that one standalone right away.
    pub fn record_pending_ack(&mut self, msg_ctr: u32, deadline: Duration) -> Option<AckEntry> {
        let previous = self.ack.take();
        self.ack = Some(AckEntry { msg_ctr, deadline });

        previous.filter(|prev| prev.msg_ctr != msg_ctr)
    }

    pub fn is_ack_due(&self, now: Duration) -> bool {
        self.ack.is_some_and(|ack| ack.deadline <= now)
    }
}

impl Default for ReliableMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// A reliable message awaiting its ack, kept encoded so that retransmissions
/// are byte-for-byte identical.
#[derive(Debug)]
pub struct RetransEntry {
    exchange: ExchangeId,
    session_id: u32,
    peer: Address,
    // The msg counter that we are waiting to be acknowledged
    msg_ctr: u32,
    send_count: u8,
    next_retrans: Duration,
    data: heapless::Vec<u8, MAX_TX_PACKET_SIZE>,
}

impl RetransEntry {
    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn get_msg_ctr(&self) -> u32 {
        self.msg_ctr
    }

    pub fn send_count(&self) -> u8 {
        self.send_count
    }

    pub fn next_retrans(&self) -> Duration {
        self.next_retrans
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// The retransmission table shared by all exchanges, and the single timer
/// that drives it.
pub struct ReliableMessageMgr {
    entries: [Option<RetransEntry>; MAX_RETRANS_ENTRIES],
    armed: Option<Duration>,
}

impl ReliableMessageMgr {
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|_| None),
            armed: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetransEntry> {
        self.entries.iter().flatten()
    }

    pub fn get(&self, exchange: ExchangeId) -> Option<&RetransEntry> {
        self.iter().find(|entry| entry.exchange == exchange)
    }

    /// The deadline the retransmission timer was last armed for
    pub fn armed_deadline(&self) -> Option<Duration> {
        self.armed
    }

    /// Registers a message which was just sent for the first time.
    pub fn add_to_retrans_table(
        &mut self,
        exchange: ExchangeId,
        session_id: u32,
        peer: Address,
        data: &[u8],
        msg_ctr: u32,
        next_retrans: Duration,
    ) -> Result<(), Error> {
        if self.get(exchange).is_some() {
            error!("Exchange {} already has a message awaiting an ack", exchange);
            Err(ErrorCode::InvalidState)?;
        }

        let slot = self
            .entries
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(ErrorCode::NoMemory)?;

        let data = heapless::Vec::from_slice(data).map_err(|_| ErrorCode::NoSpace)?;

        *slot = Some(RetransEntry {
            exchange,
            session_id,
            peer,
            msg_ctr,
            send_count: 1,
            next_retrans,
            data,
        });

        Ok(())
    }

    /// Removes the entry acknowledged by `msg_ctr` on the given session and
    /// returns its exchange. Acks for unknown counters are ignored.
    pub fn handle_received_ack(&mut self, session_id: u32, msg_ctr: u32) -> Option<ExchangeId> {
        let slot = self.entries.iter_mut().find(|slot| {
            slot.as_ref()
                .is_some_and(|entry| entry.session_id == session_id && entry.msg_ctr == msg_ctr)
        });

        let Some(slot) = slot else {
            debug!("Ignoring ack for counter {:x}: nothing awaits it", msg_ctr);
            return None;
        };

        slot.take().map(|entry| entry.exchange)
    }

    /// Drops the entry of the exchange, if any. Returns whether one was dropped.
    pub fn clear_retrans_table(&mut self, exchange: ExchangeId) -> bool {
        self.entries
            .iter_mut()
            .filter(|slot| slot.as_ref().is_some_and(|entry| entry.exchange == exchange))
            .map(|slot| slot.take())
            .count()
            > 0
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.iter().map(|entry| entry.next_retrans).min()
    }

    /// Arms the retransmission timer for the soonest deadline in the table,
    /// or cancels it if the table is empty.
    pub fn rearm(&mut self, system: &dyn SystemLayer) -> Result<(), Error> {
        self.armed = self.next_deadline();

        match self.armed {
            Some(deadline) => {
                let delay = deadline.saturating_sub(system.now());
                system.start_timer(Timer::Retransmission, delay)
            }
            None => {
                system.cancel_timer(Timer::Retransmission);
                Ok(())
            }
        }
    }

    /// Handles the expiry of the retransmission timer.
    ///
    /// Every entry which is due and has transmissions left is sent again, with its
    /// next deadline `interval(session_id)` from now. Entries which reached
    /// `max_transmissions` are removed, and their exchanges returned.
    pub fn on_timer_fired<F>(
        &mut self,
        now: Duration,
        max_transmissions: u8,
        network: &dyn NetworkSend,
        interval: F,
    ) -> heapless::Vec<ExchangeId, MAX_RETRANS_ENTRIES>
    where
        F: Fn(u32) -> Duration,
    {
        let mut exhausted = heapless::Vec::new();

        for slot in self.entries.iter_mut() {
            let Some(entry) = slot else {
                continue;
            };

            if entry.next_retrans > now {
                continue;
            }

            if entry.send_count >= max_transmissions {
                warn!(
                    "Giving up on counter {:x} of exchange {} after {} transmissions",
                    entry.msg_ctr, entry.exchange, entry.send_count
                );

                // Cannot overflow: there is at most one entry per slot
                let _ = exhausted.push(entry.exchange);
                *slot = None;
                continue;
            }

            entry.send_count += 1;
            entry.next_retrans = now + interval(entry.session_id);

            debug!(
                "Retransmitting counter {:x} of exchange {} (transmission {})",
                entry.msg_ctr, entry.exchange, entry.send_count
            );

            // A failed attempt still counts, the next one may go through
            if let Err(err) = network.send_to(&entry.data, entry.peer) {
                warn!("Retransmission to {} failed: {:?}", entry.peer, err);
            }
        }

        exhausted
    }
}

impl Default for ReliableMessageMgr {
    fn default() -> Self {
        Self::new()
    }
}
