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

//! Two exchange managers talking over secure sessions, with the tests
//! carrying (or losing) the datagrams between them.

use rs_matter_rmp::transport::exchange::{ExchangeState, MessageMeta};
use rs_matter_rmp::transport::mgr::ExchangeMgr;
use rs_matter_rmp::transport::network::Address;
use rs_matter_rmp::transport::params::SessionParameters;
use rs_matter_rmp::transport::session::{CloneData, SessionMode};
use rs_matter_rmp::utils::rand::dummy_rand;

use common::delegate::{RecordingDelegate, Reply};
use common::mock::{MockNetwork, MockSystem, XorCrypto};
use common::packets::{decode, is_standalone_ack};
use common::*;

mod common;

const REQUEST: MessageMeta = MessageMeta::new(PROTO_ECHO, OP_REQUEST, true);

const CRYPTO: XorCrypto = XorCrypto(0x5a);

fn client_addr() -> Address {
    udp(5550)
}

fn server_addr() -> Address {
    udp(5540)
}

fn clone_data(
    local_sess_id: u16,
    peer_sess_id: u16,
    local_nodeid: u64,
    peer_nodeid: u64,
    peer_addr: Address,
) -> CloneData<'static> {
    CloneData {
        local_sess_id,
        peer_sess_id,
        local_nodeid,
        peer_nodeid,
        peer_addr,
        mode: SessionMode::Case { fab_idx: 1 },
        crypto: &CRYPTO,
        peer_params: SessionParameters::new(),
    }
}

/// Hands everything `from` sent to `to`, as received from `from_addr`.
fn deliver(from: &MockNetwork, to: &mut ExchangeMgr<'_>, from_addr: Address) -> usize {
    let sent = from.take();

    for (_, mut data) in sent.iter().cloned() {
        to.handle_rx(from_addr, &mut data).unwrap();
    }

    sent.len()
}

#[test]
fn test_round_trip() {
    init_env_logger();

    let client_net = MockNetwork::default();
    let client_sys = MockSystem::new();
    let client = RecordingDelegate::new();
    let mut client_mgr = ExchangeMgr::new(&client_net, &client_sys, dummy_rand, Default::default());

    let server_net = MockNetwork::default();
    let server_sys = MockSystem::new();
    let server = RecordingDelegate::replying(Reply::Echo { reliable: true });
    let mut server_mgr = ExchangeMgr::new(&server_net, &server_sys, dummy_rand, Default::default());

    let client_sess = client_mgr
        .add_session(clone_data(10, 20, 1, 2, server_addr()))
        .unwrap();
    server_mgr
        .add_session(clone_data(20, 10, 2, 1, client_addr()))
        .unwrap();
    server_mgr
        .register_unsolicited_handler_for_type(PROTO_ECHO, OP_REQUEST, &server)
        .unwrap();

    let id = client_mgr.new_exchange(client_sess, &client).unwrap();
    client_mgr.send(id, REQUEST, b"hello").unwrap();

    // Nothing after the message header is readable on the wire
    let wire = client_net.take();
    assert!(!wire[0].1.windows(5).any(|w| w == b"hello"));
    let (hdr, _) = decode(&wire[0].1, Some(&CRYPTO));
    assert_eq!(hdr.plain.sess_id, 20);

    for (_, mut data) in wire {
        server_mgr.handle_rx(client_addr(), &mut data).unwrap();
    }
    assert_eq!(server.payloads(), [b"hello".to_vec()]);
    assert_eq!(server_mgr.rmm().len(), 1);

    // The echo acknowledges the request
    assert_eq!(deliver(&server_net, &mut client_mgr, server_addr()), 1);
    assert_eq!(client.payloads(), [b"hello".to_vec()]);
    assert!(client_mgr.rmm().is_empty());
    assert_eq!(client_mgr.exchange_state(id), ExchangeState::Open);

    // The client has nothing to say, so its ack goes out on its own
    advance(&client_sys, &mut client_mgr, ms(200));
    let acks = client_net.take();
    assert_eq!(acks.len(), 1);
    assert!(is_standalone_ack(&decode(&acks[0].1, Some(&CRYPTO)).0));

    for (_, mut data) in acks {
        server_mgr.handle_rx(client_addr(), &mut data).unwrap();
    }
    assert!(server_mgr.rmm().is_empty());
    assert_eq!(server.received().len(), 1);

    client_mgr.close(id);
    assert!(client_net.take().is_empty());

    advance(&client_sys, &mut client_mgr, ms(2000));
    advance(&server_sys, &mut server_mgr, ms(2000));
    assert!(client_net.take().is_empty());
    assert!(server_net.take().is_empty());
    assert!(client.errors().is_empty());
    assert!(server.errors().is_empty());
}

#[test]
fn test_lost_request_is_retransmitted() {
    init_env_logger();

    let client_net = MockNetwork::default();
    let client_sys = MockSystem::new();
    let client = RecordingDelegate::new();
    let mut client_mgr = ExchangeMgr::new(&client_net, &client_sys, dummy_rand, Default::default());

    let server_net = MockNetwork::default();
    let server_sys = MockSystem::new();
    let server = RecordingDelegate::replying(Reply::Echo { reliable: false });
    let mut server_mgr = ExchangeMgr::new(&server_net, &server_sys, dummy_rand, Default::default());

    let client_sess = client_mgr
        .add_session(clone_data(10, 20, 1, 2, server_addr()))
        .unwrap();
    server_mgr
        .add_session(clone_data(20, 10, 2, 1, client_addr()))
        .unwrap();
    server_mgr
        .register_unsolicited_handler_for_protocol(PROTO_ECHO, &server)
        .unwrap();

    let id = client_mgr.new_exchange(client_sess, &client).unwrap();
    client_mgr.send(id, REQUEST, b"hello").unwrap();

    let lost = client_net.take();
    assert_eq!(lost.len(), 1);

    advance(&client_sys, &mut client_mgr, ms(300));
    server_sys.set_now(ms(300));
    assert_eq!(deliver(&client_net, &mut server_mgr, client_addr()), 1);
    assert_eq!(server.payloads(), [b"hello".to_vec()]);

    assert_eq!(deliver(&server_net, &mut client_mgr, server_addr()), 1);
    assert_eq!(client.payloads(), [b"hello".to_vec()]);
    assert!(client_mgr.rmm().is_empty());

    // The original shows up late: dropped as a duplicate, but acked again
    for (_, mut data) in lost {
        server_mgr.handle_rx(client_addr(), &mut data).unwrap();
    }
    assert_eq!(server.received().len(), 1);

    let acks = server_net.take();
    assert_eq!(acks.len(), 1);
    let (hdr, _) = decode(&acks[0].1, Some(&CRYPTO));
    assert!(is_standalone_ack(&hdr));

    for (_, mut data) in acks {
        client_mgr.handle_rx(server_addr(), &mut data).unwrap();
    }
    assert_eq!(client.received().len(), 1);
    assert!(client.errors().is_empty());
}

#[test]
fn test_wrong_key_is_rejected() {
    init_env_logger();

    let other_key = XorCrypto(0x33);

    let client_net = MockNetwork::default();
    let client_sys = MockSystem::new();
    let client = RecordingDelegate::new();
    let mut client_mgr = ExchangeMgr::new(&client_net, &client_sys, dummy_rand, Default::default());

    let server_net = MockNetwork::default();
    let server_sys = MockSystem::new();
    let server = RecordingDelegate::new();
    let mut server_mgr = ExchangeMgr::new(&server_net, &server_sys, dummy_rand, Default::default());

    let client_sess = client_mgr
        .add_session(CloneData {
            crypto: &other_key,
            ..clone_data(10, 20, 1, 2, server_addr())
        })
        .unwrap();
    server_mgr
        .add_session(clone_data(20, 10, 2, 1, client_addr()))
        .unwrap();
    server_mgr
        .register_unsolicited_handler_for_protocol(PROTO_ECHO, &server)
        .unwrap();

    let id = client_mgr.new_exchange(client_sess, &client).unwrap();
    client_mgr.send(id, REQUEST, b"hello").unwrap();

    for (_, mut data) in client_net.take() {
        assert!(server_mgr.handle_rx(client_addr(), &mut data).is_err());
    }

    assert!(server.received().is_empty());
    assert!(server_net.take().is_empty());

    // Encrypted messages for sessions we do not have are refused too
    let stray_sess = client_mgr
        .add_session(CloneData {
            crypto: &other_key,
            ..clone_data(30, 40, 1, 2, server_addr())
        })
        .unwrap();
    let stray_id = client_mgr.new_exchange(stray_sess, &client).unwrap();
    client_mgr.send(stray_id, REQUEST, b"hello").unwrap();

    for (_, mut data) in client_net.take() {
        assert!(server_mgr.handle_rx(client_addr(), &mut data).is_err());
    }
    assert!(server.received().is_empty());
}
