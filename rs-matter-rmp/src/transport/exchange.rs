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

use core::fmt::{self, Display};

use cfg_if::cfg_if;
use log::warn;

use crate::error::{Error, ErrorCode};
use crate::sc::{self, PROTO_ID_SECURE_CHANNEL};

use super::mgr::ExchangeMgr;
use super::mrp::ReliableMessage;
use super::proto_hdr::ProtoHdr;

cfg_if! {
    if #[cfg(feature = "max-exchanges-32")] {
        /// Max number of concurrently open exchanges across all sessions
        pub const MAX_EXCHANGES: usize = 32;
    } else if #[cfg(feature = "max-exchanges-8")] {
        /// Max number of concurrently open exchanges across all sessions
        pub const MAX_EXCHANGES: usize = 8;
    } else {
        /// Max number of concurrently open exchanges across all sessions
        pub const MAX_EXCHANGES: usize = 16;
    }
}

/// A handle to an exchange slot of the `ExchangeMgr`.
///
/// The generation changes whenever the slot is reused, so a handle kept
/// after its exchange was closed never refers to a newer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeId {
    index: u16,
    generation: u16,
}

impl ExchangeId {
    pub const fn new(index: u16, generation: u16) -> Self {
        Self { index, generation }
    }

    pub const fn index(&self) -> usize {
        self.index as _
    }

    pub const fn generation(&self) -> u16 {
        self.generation
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn is_initiator(&self) -> bool {
        matches!(self, Self::Initiator)
    }

    /// The role of the peer on the same exchange
    pub fn complementary(&self) -> Self {
        match self {
            Self::Initiator => Self::Responder,
            Self::Responder => Self::Initiator,
        }
    }

    /// The local role for a received message: the opposite of the sender's role
    pub fn for_rx(proto: &ProtoHdr) -> Self {
        if proto.is_initiator() {
            Self::Responder
        } else {
            Self::Initiator
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Open,
    /// A reliable message was sent and its ack has not arrived yet
    WaitingForAck,
    Closed,
}

/// Protocol ID, opcode and reliability of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageMeta {
    pub proto_id: u16,
    pub proto_opcode: u8,
    pub reliable: bool,
}

impl MessageMeta {
    pub const fn new(proto_id: u16, proto_opcode: u8, reliable: bool) -> Self {
        Self {
            proto_id,
            proto_opcode,
            reliable,
        }
    }

    /// Try to cast the protocol opcode to a specific type
    pub fn opcode<T: num::FromPrimitive>(&self) -> Result<T, Error> {
        num::FromPrimitive::from_u8(self.proto_opcode).ok_or(ErrorCode::InvalidOpcode.into())
    }

    /// Check if the protocol opcode is equal to a specific value
    pub fn check_opcode<T: num::FromPrimitive + PartialEq>(&self, opcode: T) -> Result<(), Error> {
        if self.opcode::<T>()? == opcode {
            Ok(())
        } else {
            Err(ErrorCode::Invalid.into())
        }
    }

    pub fn from(proto: &ProtoHdr) -> Self {
        Self {
            proto_id: proto.proto_id,
            proto_opcode: proto.proto_opcode,
            reliable: proto.is_reliable(),
        }
    }

    /// Set the protocol ID and opcode into a ProtoHdr instance.
    ///
    /// The R flag is left alone: whether the message really asks for an ack
    /// is decided when it is sent.
    pub fn set_into(&self, proto: &mut ProtoHdr) {
        proto.proto_id = self.proto_id;
        proto.proto_opcode = self.proto_opcode;
        proto.set_vendor(None);
    }

    pub fn is_standalone_ack(&self) -> bool {
        self.proto_id == PROTO_ID_SECURE_CHANNEL
            && self.proto_opcode == sc::OpCode::MRPStandAloneAck as u8
    }
}

impl Display for MessageMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.proto_id {
            PROTO_ID_SECURE_CHANNEL => {
                if let Ok(opcode) = self.opcode::<sc::OpCode>() {
                    write!(f, "SC::{:?}", opcode)
                } else {
                    write!(f, "SC::{:02x}", self.proto_opcode)
                }
            }
            _ => write!(f, "{:04x}::{:02x}", self.proto_id, self.proto_opcode),
        }
    }
}

/// Receives the messages and terminal errors of the exchanges it is attached to.
pub trait ExchangeDelegate {
    fn on_message_received(
        &self,
        ctx: &mut ExchangeCtx<'_, '_>,
        meta: &MessageMeta,
        payload: &[u8],
    ) -> Result<(), Error>;

    /// Called once when the exchange is torn down by the stack, with
    /// `ErrorCode::Timeout` or `ErrorCode::NoSession`. The exchange is already
    /// closed by then.
    fn on_exchange_error(&self, mgr: &mut ExchangeMgr<'_>, exchange: ExchangeId, error: Error) {
        let _ = mgr;
        warn!("Exchange {} failed: {:?}", exchange, error);
    }
}

impl<T> ExchangeDelegate for &T
where
    T: ExchangeDelegate,
{
    fn on_message_received(
        &self,
        ctx: &mut ExchangeCtx<'_, '_>,
        meta: &MessageMeta,
        payload: &[u8],
    ) -> Result<(), Error> {
        (*self).on_message_received(ctx, meta, payload)
    }

    fn on_exchange_error(&self, mgr: &mut ExchangeMgr<'_>, exchange: ExchangeId, error: Error) {
        (*self).on_exchange_error(mgr, exchange, error)
    }
}

/// An open exchange, as kept in a slot of the `ExchangeMgr`.
pub struct Exchange<'a> {
    pub(crate) id: ExchangeId,
    pub(crate) exch_id: u16,
    pub(crate) session_id: u32,
    pub(crate) role: Role,
    pub(crate) mrp: ReliableMessage,
    pub(crate) delegate: &'a dyn ExchangeDelegate,
}

impl<'a> Exchange<'a> {
    pub(crate) fn new(
        id: ExchangeId,
        exch_id: u16,
        session_id: u32,
        role: Role,
        delegate: &'a dyn ExchangeDelegate,
    ) -> Self {
        Self {
            id,
            exch_id,
            session_id,
            role,
            mrp: ReliableMessage::new(),
            delegate,
        }
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn exch_id(&self) -> u16 {
        self.exch_id
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn mrp(&self) -> &ReliableMessage {
        &self.mrp
    }

    pub fn state(&self) -> ExchangeState {
        if self.mrp.is_retrans_pending() {
            ExchangeState::WaitingForAck
        } else {
            ExchangeState::Open
        }
    }

    /// Whether a message received on `session_id` with `proto` belongs here
    pub fn is_for_rx(&self, session_id: u32, proto: &ProtoHdr) -> bool {
        self.session_id == session_id
            && self.exch_id == proto.exch_id
            && self.role == Role::for_rx(proto)
    }
}

impl Display for Exchange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [SESS:{},EID:{:04x},{:?}]",
            self.id, self.session_id, self.exch_id, self.role
        )
    }
}

/// The view of the `ExchangeMgr` a delegate gets while handling a message
/// of exchange `id`.
pub struct ExchangeCtx<'r, 'a> {
    mgr: &'r mut ExchangeMgr<'a>,
    id: ExchangeId,
}

impl<'r, 'a> ExchangeCtx<'r, 'a> {
    pub(crate) fn new(mgr: &'r mut ExchangeMgr<'a>, id: ExchangeId) -> Self {
        Self { mgr, id }
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn session_id(&self) -> Option<u32> {
        self.mgr.exchange(self.id).map(Exchange::session_id)
    }

    pub fn state(&self) -> ExchangeState {
        self.mgr.exchange_state(self.id)
    }

    pub fn set_auto_request_ack(&mut self, auto_request_ack: bool) -> Result<(), Error> {
        self.mgr.set_auto_request_ack(self.id, auto_request_ack)
    }

    /// Sends a message on this exchange.
    pub fn send<M>(&mut self, meta: M, payload: &[u8]) -> Result<(), Error>
    where
        M: Into<MessageMeta>,
    {
        self.mgr.send(self.id, meta, payload)
    }

    /// Closes this exchange. Further sends fail with `ErrorCode::NoExchange`.
    pub fn close(&mut self) {
        self.mgr.close(self.id)
    }

    /// The manager itself, e.g. to start exchanges on other sessions
    pub fn mgr(&mut self) -> &mut ExchangeMgr<'a> {
        self.mgr
    }
}
