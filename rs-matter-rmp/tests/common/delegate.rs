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

use core::cell::RefCell;

use rs_matter_rmp::error::{Error, ErrorCode};
use rs_matter_rmp::transport::exchange::{
    ExchangeCtx, ExchangeDelegate, ExchangeId, MessageMeta,
};
use rs_matter_rmp::transport::mgr::ExchangeMgr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Nothing,
    /// Send the payload back, asking for an ack if `reliable`
    Echo { reliable: bool },
    Fail,
}

/// Records what its exchanges receive, optionally replying.
pub struct RecordingDelegate {
    reply: Reply,
    received: RefCell<Vec<(ExchangeId, MessageMeta, Vec<u8>)>>,
    errors: RefCell<Vec<(ExchangeId, ErrorCode)>>,
}

impl RecordingDelegate {
    pub fn new() -> Self {
        Self::replying(Reply::Nothing)
    }

    pub fn replying(reply: Reply) -> Self {
        Self {
            reply,
            received: RefCell::new(Vec::new()),
            errors: RefCell::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<(ExchangeId, MessageMeta, Vec<u8>)> {
        self.received.borrow().clone()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.received
            .borrow()
            .iter()
            .map(|(_, _, payload)| payload.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<(ExchangeId, ErrorCode)> {
        self.errors.borrow().clone()
    }
}

impl ExchangeDelegate for RecordingDelegate {
    fn on_message_received(
        &self,
        ctx: &mut ExchangeCtx<'_, '_>,
        meta: &MessageMeta,
        payload: &[u8],
    ) -> Result<(), Error> {
        self.received
            .borrow_mut()
            .push((ctx.id(), *meta, payload.to_vec()));

        match self.reply {
            Reply::Nothing => Ok(()),
            Reply::Echo { reliable } => ctx.send(MessageMeta { reliable, ..*meta }, payload),
            Reply::Fail => Err(ErrorCode::InvalidData.into()),
        }
    }

    fn on_exchange_error(&self, _mgr: &mut ExchangeMgr<'_>, exchange: ExchangeId, error: Error) {
        self.errors.borrow_mut().push((exchange, error.code()));
    }
}
