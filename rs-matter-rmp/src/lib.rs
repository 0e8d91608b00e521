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

//! The Reliable Message Protocol, exchange and session layer of a Matter node.
//!
//! Messages flow through an [`ExchangeMgr`](transport::mgr::ExchangeMgr): the embedder
//! feeds it received datagrams with `handle_rx` and expired timers with `handle_timer`,
//! and exchange delegates reply through the `ExchangeCtx` they are handed. Reliable
//! messages are retransmitted until acknowledged, acks are piggybacked on outgoing
//! messages where possible, and duplicates are filtered per session.
//!
//! # Examples
//! ```no_run
//! use std::net::UdpSocket;
//!
//! use rs_matter_rmp::error::Error;
//! use rs_matter_rmp::transport::exchange::{ExchangeCtx, ExchangeDelegate, MessageMeta};
//! use rs_matter_rmp::transport::mgr::{ExchangeMgr, ExchangeMgrConfig};
//! use rs_matter_rmp::transport::network::Address;
//! use rs_matter_rmp::transport::system::StdSystemLayer;
//! use rs_matter_rmp::utils::rand::sys_rand;
//!
//! struct Echo;
//!
//! impl ExchangeDelegate for Echo {
//!     fn on_message_received(
//!         &self,
//!         ctx: &mut ExchangeCtx<'_, '_>,
//!         meta: &MessageMeta,
//!         payload: &[u8],
//!     ) -> Result<(), Error> {
//!         ctx.send(*meta, payload)
//!     }
//! }
//!
//! let socket = UdpSocket::bind("0.0.0.0:5540").unwrap();
//! let system = StdSystemLayer::new();
//!
//! let mut mgr = ExchangeMgr::new(&socket, &system, sys_rand, ExchangeMgrConfig::default());
//! mgr.register_unsolicited_handler_for_protocol(0xfff1, &Echo).unwrap();
//!
//! let mut buf = [0; 1583];
//! let (len, peer) = socket.recv_from(&mut buf).unwrap();
//! mgr.handle_rx(Address::Udp(peer), &mut buf[..len]).unwrap();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod error;
pub mod sc;
pub mod tlv;
pub mod transport;
pub mod utils;
