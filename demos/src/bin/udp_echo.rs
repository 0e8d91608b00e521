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

//! Pings an echo responder over loopback UDP, with one plain text session
//! between two exchange managers in the same process.

use std::cell::Cell;
use std::io;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use log::{info, warn};

use rs_matter_rmp::error::Error;
use rs_matter_rmp::transport::exchange::{ExchangeCtx, ExchangeDelegate, ExchangeState, MessageMeta};
use rs_matter_rmp::transport::mgr::{ExchangeMgr, ExchangeMgrConfig};
use rs_matter_rmp::transport::network::{Address, MAX_RX_PACKET_SIZE};
use rs_matter_rmp::transport::system::StdSystemLayer;
use rs_matter_rmp::utils::rand::sys_rand;

const PROTO_ECHO: u16 = 0xfff1;
const OP_ECHO_REQUEST: u8 = 0x01;
const OP_ECHO_RESPONSE: u8 = 0x02;

const PINGS: usize = 5;

struct EchoResponder;

impl ExchangeDelegate for EchoResponder {
    fn on_message_received(
        &self,
        ctx: &mut ExchangeCtx<'_, '_>,
        meta: &MessageMeta,
        payload: &[u8],
    ) -> Result<(), Error> {
        info!("Responder: got {} on exchange {}", meta, ctx.id());

        // The request's ack rides on the response
        ctx.send(
            MessageMeta::new(PROTO_ECHO, OP_ECHO_RESPONSE, false),
            payload,
        )?;
        ctx.close();

        Ok(())
    }
}

struct EchoRequester {
    replies: Cell<usize>,
}

impl ExchangeDelegate for EchoRequester {
    fn on_message_received(
        &self,
        ctx: &mut ExchangeCtx<'_, '_>,
        _meta: &MessageMeta,
        payload: &[u8],
    ) -> Result<(), Error> {
        info!(
            "Requester: exchange {} got {:?}",
            ctx.id(),
            String::from_utf8_lossy(payload)
        );

        self.replies.set(self.replies.get() + 1);

        Ok(())
    }
}

/// Feeds everything waiting on `socket` and every expired timer to `mgr`.
fn pump(
    socket: &UdpSocket,
    system: &StdSystemLayer,
    mgr: &mut ExchangeMgr<'_>,
    buf: &mut [u8],
) -> Result<(), Error> {
    loop {
        match socket.recv_from(buf) {
            Ok((len, peer)) => {
                if let Err(err) = mgr.handle_rx(Address::Udp(peer), &mut buf[..len]) {
                    warn!("Dropped datagram from {}: {:?}", peer, err);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => Err(err)?,
        }
    }

    while let Some(timer) = system.poll_expired() {
        mgr.handle_timer(timer)?;
    }

    Ok(())
}

fn main() -> Result<(), Error> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let responder_socket = UdpSocket::bind("127.0.0.1:0")?;
    let requester_socket = UdpSocket::bind("127.0.0.1:0")?;
    responder_socket.set_nonblocking(true)?;
    requester_socket.set_nonblocking(true)?;

    let responder_addr = Address::Udp(responder_socket.local_addr()?);

    let responder_system = StdSystemLayer::new();
    let requester_system = StdSystemLayer::new();

    let responder = EchoResponder;
    let requester = EchoRequester {
        replies: Cell::new(0),
    };

    let mut responder_mgr = ExchangeMgr::new(
        &responder_socket,
        &responder_system,
        sys_rand,
        ExchangeMgrConfig::default(),
    );
    responder_mgr.register_unsolicited_handler_for_type(
        PROTO_ECHO,
        OP_ECHO_REQUEST,
        &responder,
    )?;

    let mut requester_mgr = ExchangeMgr::new(
        &requester_socket,
        &requester_system,
        sys_rand,
        ExchangeMgrConfig::default(),
    );
    let session = requester_mgr.add_unsecured_session(responder_addr, 0, None)?;

    let mut buf = [0; MAX_RX_PACKET_SIZE];
    let started = Instant::now();

    for ping in 0..PINGS {
        let id = requester_mgr.new_exchange(session, &requester)?;
        let payload = format!("ping #{}", ping);

        requester_mgr.send(
            id,
            MessageMeta::new(PROTO_ECHO, OP_ECHO_REQUEST, true),
            payload.as_bytes(),
        )?;

        while requester.replies.get() <= ping {
            if requester_mgr.exchange_state(id) == ExchangeState::Closed {
                warn!("Ping #{} was never answered", ping);
                break;
            }

            pump(&responder_socket, &responder_system, &mut responder_mgr, &mut buf)?;
            pump(&requester_socket, &requester_system, &mut requester_mgr, &mut buf)?;

            std::thread::sleep(Duration::from_millis(1));
        }

        requester_mgr.close(id);
    }

    info!(
        "{} of {} pings answered in {}ms",
        requester.replies.get(),
        PINGS,
        started.elapsed().as_millis()
    );

    Ok(())
}
