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

use log::{debug, error, info, warn};

use crate::error::*;
use crate::sc;
use crate::utils::rand::{rand_u16, Rand};
use crate::utils::storage::ParseBuf;

use super::dedup::CounterCheck;
use super::exchange::{
    Exchange, ExchangeCtx, ExchangeDelegate, ExchangeId, ExchangeState, MessageMeta, Role,
    MAX_EXCHANGES,
};
use super::mrp::{ReliableMessageMgr, MRP_MAX_TRANSMISSIONS, MRP_STANDALONE_ACK_TIMEOUT};
use super::network::{Address, NetworkSend, MAX_TX_PACKET_SIZE};
use super::packet::PacketHdr;
use super::params::{MrpConfig, SessionParameters, MRP_DEFAULT_IDLE_INTERVAL};
use super::proto_hdr::ProtoHdr;
use super::session::{CloneData, Session, SessionMgr};
use super::system::{SystemLayer, Timer};

/// Max number of unsolicited message handlers, type-specific and protocol-wide together
pub const MAX_UNSOLICITED_HANDLERS: usize = 8;

/// Runtime settings of the `ExchangeMgr`.
#[derive(Debug, Clone)]
pub struct ExchangeMgrConfig {
    /// What we advertise to peers during session establishment
    pub local_params: SessionParameters,
    /// Total number of transmissions of a reliable message, the first one included
    pub max_transmissions: u8,
    /// How long an ack may wait for an outgoing message to piggyback on
    pub standalone_ack_timeout: Duration,
}

impl ExchangeMgrConfig {
    pub const fn new() -> Self {
        Self {
            local_params: SessionParameters::local(MrpConfig::new()),
            max_transmissions: MRP_MAX_TRANSMISSIONS,
            standalone_ack_timeout: MRP_STANDALONE_ACK_TIMEOUT,
        }
    }
}

impl Default for ExchangeMgrConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct UnsolicitedHandler<'a> {
    proto_id: u16,
    // `None` for a handler of the whole protocol
    opcode: Option<u8>,
    handler: &'a dyn ExchangeDelegate,
}

struct ExchangeSlot<'a> {
    generation: u16,
    exchange: Option<Exchange<'a>>,
}

/// Routes messages between the network and the exchanges of all sessions,
/// and runs the reliability protocol for them.
///
/// Everything happens inside `handle_rx`, `handle_timer` and the calls
/// delegates make on the `ExchangeCtx` they are handed.
pub struct ExchangeMgr<'a> {
    network: &'a dyn NetworkSend,
    system: &'a dyn SystemLayer,
    config: ExchangeMgrConfig,
    sessions: SessionMgr<'a>,
    slots: [ExchangeSlot<'a>; MAX_EXCHANGES],
    rmm: ReliableMessageMgr,
    handlers: heapless::Vec<UnsolicitedHandler<'a>, MAX_UNSOLICITED_HANDLERS>,
    next_exch_id: u16,
    ack_armed: Option<Duration>,
}

impl<'a> ExchangeMgr<'a> {
    pub fn new(
        network: &'a dyn NetworkSend,
        system: &'a dyn SystemLayer,
        rand: Rand,
        config: ExchangeMgrConfig,
    ) -> Self {
        info!("Local MRP config: {}", config.local_params.mrp);

        Self {
            network,
            system,
            config,
            sessions: SessionMgr::new(rand),
            slots: core::array::from_fn(|_| ExchangeSlot {
                generation: 0,
                exchange: None,
            }),
            rmm: ReliableMessageMgr::new(),
            handlers: heapless::Vec::new(),
            next_exch_id: rand_u16(rand),
            ack_armed: None,
        }
    }

    pub fn config(&self) -> &ExchangeMgrConfig {
        &self.config
    }

    pub fn local_session_params(&self) -> &SessionParameters {
        &self.config.local_params
    }

    pub fn sessions(&self) -> &SessionMgr<'a> {
        &self.sessions
    }

    pub fn session(&self, session_id: u32) -> Option<&Session<'a>> {
        self.sessions.get(session_id)
    }

    pub fn session_mut(&mut self, session_id: u32) -> Option<&mut Session<'a>> {
        self.sessions.get_mut(session_id)
    }

    pub fn rmm(&self) -> &ReliableMessageMgr {
        &self.rmm
    }

    /// The deadline the standalone ack timer was last armed for
    pub fn ack_deadline(&self) -> Option<Duration> {
        self.ack_armed
    }

    /// Adds a secure session handed over by PASE or CASE, evicting the least
    /// recently used idle session if the table is full.
    pub fn add_session(&mut self, clone_data: CloneData<'a>) -> Result<u32, Error> {
        if self.sessions.is_full() {
            self.evict_session()?;
        }

        self.sessions.add(clone_data, self.system.now())
    }

    /// Adds an unsecured session to `peer_addr`, to initiate session establishment on.
    pub fn add_unsecured_session(
        &mut self,
        peer_addr: Address,
        local_nodeid: u64,
        peer_nodeid: Option<u64>,
    ) -> Result<u32, Error> {
        if self.sessions.is_full() {
            self.evict_session()?;
        }

        self.sessions
            .add_unsecured(peer_addr, local_nodeid, peer_nodeid, self.system.now())
    }

    /// Removes a session. Its exchanges are closed and their delegates get
    /// `ErrorCode::NoSession`.
    pub fn remove_session(&mut self, session_id: u32) -> Result<(), Error> {
        self.sessions
            .remove(session_id)
            .ok_or(ErrorCode::NoSession)?;

        let mut orphans = heapless::Vec::<_, MAX_EXCHANGES>::new();

        for slot in self.slots.iter_mut() {
            if !slot
                .exchange
                .as_ref()
                .is_some_and(|exchange| exchange.session_id == session_id)
            {
                continue;
            }

            let Some(exchange) = slot.exchange.take() else {
                continue;
            };

            slot.generation = slot.generation.wrapping_add(1);
            self.rmm.clear_retrans_table(exchange.id);

            // Cannot overflow: one entry per slot
            let _ = orphans.push((exchange.id, exchange.delegate));
        }

        self.rearm_timers()?;

        for (id, delegate) in orphans {
            debug!("Exchange {}: session {} removed", id, session_id);
            delegate.on_exchange_error(self, id, ErrorCode::NoSession.into());
        }

        Ok(())
    }

    fn evict_session(&mut self) -> Result<(), Error> {
        let slots = &self.slots;

        let session_id = self
            .sessions
            .get_session_for_eviction(|session_id| {
                slots
                    .iter()
                    .filter_map(|slot| slot.exchange.as_ref())
                    .any(|exchange| exchange.session_id == session_id)
            })
            .ok_or(ErrorCode::NoSpaceSessions)?;

        warn!("Evicting session {}", session_id);

        self.remove_session(session_id)
    }

    /// Starts an exchange on a session, with us as the initiator.
    pub fn new_exchange(
        &mut self,
        session_id: u32,
        delegate: &'a dyn ExchangeDelegate,
    ) -> Result<ExchangeId, Error> {
        let now = self.system.now();

        self.sessions
            .get_mut(session_id)
            .ok_or(ErrorCode::NoSession)?
            .touch(now);

        let exch_id = loop {
            let exch_id = self.next_exch_id;
            self.next_exch_id = self.next_exch_id.wrapping_add(1);

            // Terminates: there are more IDs than slots
            if !self.exchanges().any(|exchange| {
                exchange.session_id == session_id
                    && exchange.exch_id == exch_id
                    && exchange.role == Role::Initiator
            }) {
                break exch_id;
            }
        };

        self.allocate(session_id, exch_id, Role::Initiator, delegate)
    }

    fn allocate(
        &mut self,
        session_id: u32,
        exch_id: u16,
        role: Role,
        delegate: &'a dyn ExchangeDelegate,
    ) -> Result<ExchangeId, Error> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.exchange.is_none())
            .ok_or(ErrorCode::NoSpaceExchanges)?;

        let id = ExchangeId::new(index as _, slot.generation);
        let exchange = Exchange::new(id, exch_id, session_id, role, delegate);

        info!("New exchange: {}", exchange);
        slot.exchange = Some(exchange);

        Ok(id)
    }

    fn has_free_slot(&self) -> bool {
        self.slots.iter().any(|slot| slot.exchange.is_none())
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange<'a>> {
        self.slots.iter().filter_map(|slot| slot.exchange.as_ref())
    }

    pub fn exchange(&self, id: ExchangeId) -> Option<&Exchange<'a>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.exchange.as_ref())
    }

    fn exchange_mut(&mut self, id: ExchangeId) -> Option<&mut Exchange<'a>> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.exchange.as_mut())
    }

    /// The state of an exchange; closed once the handle went stale.
    pub fn exchange_state(&self, id: ExchangeId) -> ExchangeState {
        self.exchange(id)
            .map(Exchange::state)
            .unwrap_or(ExchangeState::Closed)
    }

    /// Whether messages sent with `reliable` metadata actually ask for an ack.
    pub fn set_auto_request_ack(&mut self, id: ExchangeId, auto: bool) -> Result<(), Error> {
        self.exchange_mut(id)
            .ok_or(ErrorCode::NoExchange)?
            .mrp
            .set_auto_request_ack(auto);

        Ok(())
    }

    /// Sends a message on an exchange, piggybacking the ack owed to the peer if any.
    ///
    /// A reliable message is retransmitted until acknowledged; only one can be
    /// in flight per exchange (`ErrorCode::InvalidState` otherwise).
    pub fn send<M>(&mut self, id: ExchangeId, meta: M, payload: &[u8]) -> Result<(), Error>
    where
        M: Into<MessageMeta>,
    {
        let meta = meta.into();

        let exchange = self.exchange(id).ok_or(ErrorCode::NoExchange)?;
        let session_id = exchange.session_id;
        let peer = self
            .sessions
            .get(session_id)
            .ok_or(ErrorCode::NoSession)?
            .get_peer_addr();

        let reliable = meta.reliable && exchange.mrp.is_auto_request_ack() && !peer.is_reliable();
        if reliable {
            if exchange.mrp.is_retrans_pending() {
                error!("Exchange {}: a reliable message is still awaiting its ack", exchange);
                Err(ErrorCode::InvalidState)?;
            }

            if self.rmm.is_full() {
                warn!("Exchange {}: retransmission table full", exchange);
                Err(ErrorCode::NoMemory)?;
            }
        }

        let ack = exchange.mrp.get_pending_ack();

        let mut proto = ProtoHdr::new();
        proto.exch_id = exchange.exch_id;
        proto.set_initiator(exchange.role.is_initiator());
        meta.set_into(&mut proto);
        proto.set_reliable(reliable);
        proto.set_ack(ack.map(|ack| ack.get_msg_ctr()));
        proto.adjust_reliability(false, &peer);

        let msg_ctr = self.transmit(session_id, proto, payload, reliable.then_some(id))?;

        if let Some(exchange) = self.exchange_mut(id) {
            if reliable {
                exchange.mrp.set_retrans(msg_ctr);
            }

            if ack.is_some() {
                exchange.mrp.take_pending_ack();
            }
        }

        self.rearm_timers()
    }

    /// Closes an exchange, first sending the ack owed to the peer if any.
    /// Stale handles are ignored.
    pub fn close(&mut self, id: ExchangeId) {
        let Some(exchange) = self.exchange_mut(id) else {
            debug!("Exchange {} already closed", id);
            return;
        };

        if let Some(ack) = exchange.mrp.take_pending_ack() {
            let (session_id, exch_id, role) =
                (exchange.session_id, exchange.exch_id, exchange.role);

            self.send_standalone_ack(session_id, exch_id, role, ack.get_msg_ctr());
        }

        self.rmm.clear_retrans_table(id);

        if let Some(slot) = self.slots.get_mut(id.index()) {
            slot.exchange = None;
            slot.generation = slot.generation.wrapping_add(1);
        }

        info!("Exchange {} closed", id);

        if let Err(err) = self.rearm_timers() {
            warn!("Failed to re-arm timers: {:?}", err);
        }
    }

    /// Accepts `handler` as the delegate of exchanges which peers start with
    /// a message of the given protocol and opcode.
    pub fn register_unsolicited_handler_for_type(
        &mut self,
        proto_id: u16,
        opcode: u8,
        handler: &'a dyn ExchangeDelegate,
    ) -> Result<(), Error> {
        self.register_unsolicited_handler(proto_id, Some(opcode), handler)
    }

    /// Like `register_unsolicited_handler_for_type`, for all opcodes of the
    /// protocol without a handler of their own.
    pub fn register_unsolicited_handler_for_protocol(
        &mut self,
        proto_id: u16,
        handler: &'a dyn ExchangeDelegate,
    ) -> Result<(), Error> {
        self.register_unsolicited_handler(proto_id, None, handler)
    }

    pub fn unregister_unsolicited_handler_for_type(
        &mut self,
        proto_id: u16,
        opcode: u8,
    ) -> Result<(), Error> {
        self.unregister_unsolicited_handler(proto_id, Some(opcode))
    }

    pub fn unregister_unsolicited_handler_for_protocol(
        &mut self,
        proto_id: u16,
    ) -> Result<(), Error> {
        self.unregister_unsolicited_handler(proto_id, None)
    }

    fn register_unsolicited_handler(
        &mut self,
        proto_id: u16,
        opcode: Option<u8>,
        handler: &'a dyn ExchangeDelegate,
    ) -> Result<(), Error> {
        if self
            .handlers
            .iter()
            .any(|h| h.proto_id == proto_id && h.opcode == opcode)
        {
            Err(ErrorCode::AlreadyRegistered)?;
        }

        self.handlers
            .push(UnsolicitedHandler {
                proto_id,
                opcode,
                handler,
            })
            .map_err(|_| ErrorCode::NoSpace)?;

        Ok(())
    }

    fn unregister_unsolicited_handler(
        &mut self,
        proto_id: u16,
        opcode: Option<u8>,
    ) -> Result<(), Error> {
        let index = self
            .handlers
            .iter()
            .position(|h| h.proto_id == proto_id && h.opcode == opcode)
            .ok_or(ErrorCode::NotFound)?;

        self.handlers.swap_remove(index);

        Ok(())
    }

    fn unsolicited_handler(&self, meta: &MessageMeta) -> Option<&'a dyn ExchangeDelegate> {
        let find = |opcode| {
            self.handlers
                .iter()
                .find(|h| h.proto_id == meta.proto_id && h.opcode == opcode)
                .map(|h| h.handler)
        };

        find(Some(meta.proto_opcode)).or_else(|| find(None))
    }

    /// Processes a datagram received from `peer`. `data` is decrypted in place.
    ///
    /// Errors are returned for datagrams which cannot be decoded or
    /// authenticated; messages which are merely unroutable are dropped.
    pub fn handle_rx(&mut self, peer: Address, data: &mut [u8]) -> Result<(), Error> {
        let now = self.system.now();

        let mut pb = ParseBuf::new(data);
        let mut hdr = PacketHdr::new();
        hdr.decode_plain_hdr(&mut pb)?;

        if hdr.plain.is_group_session() {
            debug!("Dropping group message from {}", peer);
            return Ok(());
        }

        let existing = self.sessions.get_for_rx(&hdr.plain, &peer);
        if existing.is_none() && hdr.plain.is_encrypted() {
            warn!("No session {:04x} for message from {}", hdr.plain.sess_id, peer);
            Err(ErrorCode::NoSession)?;
        }

        let crypto = existing
            .and_then(|session_id| self.sessions.get(session_id))
            .and_then(Session::crypto);
        hdr.decode_remaining(&mut pb, crypto)?;

        sc::validate(&MessageMeta::from(&hdr.proto), hdr.proto.is_reliable())?;
        hdr.proto.adjust_reliability(true, &peer);

        let meta = MessageMeta::from(&hdr.proto);

        info!("\n>>RCV {} from {}\n      => {}", hdr, peer, meta);

        let check = existing
            .and_then(|session_id| self.sessions.get(session_id))
            .map(|session| session.peek_rx_ctr(hdr.plain.ctr))
            .unwrap_or(CounterCheck::Accept);

        if check == CounterCheck::TooOld {
            debug!("Dropping message {:x}: counter too old", hdr.plain.ctr);
            return Ok(());
        }

        let exchange = existing.and_then(|session_id| {
            self.exchanges()
                .find(|exchange| exchange.is_for_rx(session_id, &hdr.proto))
                .map(Exchange::id)
        });

        let handler = if exchange.is_none()
            && hdr.proto.is_initiator()
            && !meta.is_standalone_ack()
        {
            self.unsolicited_handler(&meta)
        } else {
            None
        };

        // Left unrecorded so that the peer's retransmission is processed once a slot frees up
        if check == CounterCheck::Accept && handler.is_some() && !self.has_free_slot() {
            warn!("Dropping {}: no free exchange slot", meta);
            return Ok(());
        }

        let session_id = match existing {
            Some(session_id) => session_id,
            None => self.add_unsecured_session(peer, 0, hdr.plain.get_src_nodeid())?,
        };

        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or(ErrorCode::NoSession)?;

        match session.check_rx_ctr(hdr.plain.ctr) {
            CounterCheck::Accept => {
                session.mark_peer_active(now);
                if session.is_encrypted() {
                    session.set_peer_addr(peer);
                }
            }
            CounterCheck::Duplicate => (),
            CounterCheck::TooOld => return Ok(()),
        }

        if let Some(ack_ctr) = hdr.proto.get_ack() {
            if let Some(acked) = self.rmm.handle_received_ack(session_id, ack_ctr) {
                debug!("Exchange {}: counter {:x} acknowledged", acked, ack_ctr);

                if let Some(exchange) = self.exchange_mut(acked) {
                    exchange.mrp.clear_retrans();
                }
            }
        }

        if check == CounterCheck::Duplicate {
            debug!("Dropping duplicate message {:x}", hdr.plain.ctr);

            // The ack we sent the first time may have been lost
            if meta.reliable {
                self.send_standalone_ack(
                    session_id,
                    hdr.proto.exch_id,
                    Role::for_rx(&hdr.proto),
                    hdr.plain.ctr,
                );
            }

            return self.rearm_timers();
        }

        let id = match (exchange, handler) {
            (Some(id), _) => id,
            (None, Some(handler)) => {
                self.allocate(session_id, hdr.proto.exch_id, Role::Responder, handler)?
            }
            (None, None) if meta.is_standalone_ack() => {
                debug!("Dropping standalone ack for unknown exchange");
                return self.rearm_timers();
            }
            (None, None) => {
                debug!("Dropping {}: no exchange and no handler for it", meta);

                if meta.reliable {
                    self.send_standalone_ack(
                        session_id,
                        hdr.proto.exch_id,
                        Role::for_rx(&hdr.proto),
                        hdr.plain.ctr,
                    );
                }

                return self.rearm_timers();
            }
        };

        if meta.reliable {
            let deadline = now + self.config.standalone_ack_timeout;

            let flushed = self.exchange_mut(id).and_then(|exchange| {
                exchange
                    .mrp
                    .record_pending_ack(hdr.plain.ctr, deadline)
                    .map(|previous| (exchange.exch_id, exchange.role, previous))
            });

            if let Some((exch_id, role, previous)) = flushed {
                self.send_standalone_ack(session_id, exch_id, role, previous.get_msg_ctr());
            }
        }

        self.rearm_timers()?;

        if !meta.is_standalone_ack() {
            self.dispatch(id, &meta, pb.as_slice());
        }

        Ok(())
    }

    fn dispatch(&mut self, id: ExchangeId, meta: &MessageMeta, payload: &[u8]) {
        let Some(delegate) = self.exchange(id).map(|exchange| exchange.delegate) else {
            return;
        };

        let mut ctx = ExchangeCtx::new(self, id);

        if let Err(err) = delegate.on_message_received(&mut ctx, meta, payload) {
            warn!("Exchange {}: handler failed with {:?}, closing", id, err);
            self.close(id);
        }
    }

    /// Handles the expiry of one of the timers started through the `SystemLayer`.
    pub fn handle_timer(&mut self, timer: Timer) -> Result<(), Error> {
        let now = self.system.now();

        match timer {
            Timer::Retransmission => {
                let sessions = &self.sessions;

                let exhausted = self.rmm.on_timer_fired(
                    now,
                    self.config.max_transmissions,
                    self.network,
                    |session_id| {
                        sessions
                            .get(session_id)
                            .map(|session| session.retrans_interval(now))
                            .unwrap_or(MRP_DEFAULT_IDLE_INTERVAL)
                    },
                );

                for id in exhausted {
                    let Some(exchange) = self.exchange_mut(id) else {
                        continue;
                    };

                    exchange.mrp.clear_retrans();
                    let delegate = exchange.delegate;

                    self.close(id);
                    delegate.on_exchange_error(self, id, ErrorCode::Timeout.into());
                }
            }
            Timer::StandaloneAck => {
                let mut due = heapless::Vec::<_, MAX_EXCHANGES>::new();

                for exchange in self
                    .slots
                    .iter_mut()
                    .filter_map(|slot| slot.exchange.as_mut())
                    .filter(|exchange| exchange.mrp.is_ack_due(now))
                {
                    if let Some(ack) = exchange.mrp.take_pending_ack() {
                        // Cannot overflow: one entry per slot
                        let _ = due.push((
                            exchange.session_id,
                            exchange.exch_id,
                            exchange.role,
                            ack.get_msg_ctr(),
                        ));
                    }
                }

                for (session_id, exch_id, role, msg_ctr) in due {
                    self.send_standalone_ack(session_id, exch_id, role, msg_ctr);
                }
            }
        }

        self.rearm_timers()
    }

    fn send_standalone_ack(&mut self, session_id: u32, exch_id: u16, role: Role, msg_ctr: u32) {
        let mut proto = ProtoHdr::new();
        proto.exch_id = exch_id;
        proto.set_initiator(role.is_initiator());
        sc::OpCode::MRPStandAloneAck.meta().set_into(&mut proto);
        proto.set_ack(Some(msg_ctr));

        if let Err(err) = self.transmit(session_id, proto, &[], None) {
            warn!("Failed to send standalone ack for {:x}: {:?}", msg_ctr, err);
        }
    }

    /// Encodes and sends one message on a session, registering it for
    /// retransmission first when `retrans` is given. Returns its counter.
    fn transmit(
        &mut self,
        session_id: u32,
        proto: ProtoHdr,
        payload: &[u8],
        retrans: Option<ExchangeId>,
    ) -> Result<u32, Error> {
        let now = self.system.now();

        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or(ErrorCode::NoSession)?;

        let hdr = PacketHdr {
            plain: session.pre_send(now)?,
            proto,
        };
        let peer = session.get_peer_addr();
        let crypto = session.crypto();
        let next_retrans = now + session.retrans_interval(now);

        let mut buf = [0; MAX_TX_PACKET_SIZE];
        let len = hdr.encode(&mut buf, payload, crypto)?;
        let data = &buf[..len];

        if let Some(exchange) = retrans {
            self.rmm.add_to_retrans_table(
                exchange,
                session_id,
                peer,
                data,
                hdr.plain.ctr,
                next_retrans,
            )?;
        }

        info!("\n<<SND {} to {}\n      => Sending", hdr, peer);

        if let Err(err) = self.network.send_to(data, peer) {
            if let Some(exchange) = retrans {
                self.rmm.clear_retrans_table(exchange);
            }

            Err(err)?;
        }

        Ok(hdr.plain.ctr)
    }

    fn rearm_timers(&mut self) -> Result<(), Error> {
        self.rmm.rearm(self.system)?;

        self.ack_armed = self
            .exchanges()
            .filter_map(|exchange| exchange.mrp.get_pending_ack())
            .map(|ack| ack.get_deadline())
            .min();

        match self.ack_armed {
            Some(deadline) => {
                let delay = deadline.saturating_sub(self.system.now());
                self.system.start_timer(Timer::StandaloneAck, delay)
            }
            None => {
                self.system.cancel_timer(Timer::StandaloneAck);
                Ok(())
            }
        }
    }
}
