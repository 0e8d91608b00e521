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

use rs_matter_rmp::sc::OpCode;
use rs_matter_rmp::transport::exchange::MessageMeta;
use rs_matter_rmp::transport::network::MAX_TX_PACKET_SIZE;
use rs_matter_rmp::transport::packet::PacketHdr;
use rs_matter_rmp::transport::session::SessionCrypto;
use rs_matter_rmp::utils::storage::ParseBuf;

/// Decodes a datagram sent by an `ExchangeMgr` into its headers and payload.
pub fn decode(data: &[u8], crypto: Option<&dyn SessionCrypto>) -> (PacketHdr, Vec<u8>) {
    let mut buf = data.to_vec();
    let mut pb = ParseBuf::new(buf.as_mut_slice());

    let mut hdr = PacketHdr::new();
    hdr.decode_plain_hdr(&mut pb).unwrap();
    hdr.decode_remaining(&mut pb, crypto).unwrap();

    let payload = pb.as_slice().to_vec();

    (hdr, payload)
}

pub fn encode(hdr: &PacketHdr, payload: &[u8], crypto: Option<&dyn SessionCrypto>) -> Vec<u8> {
    let mut buf = [0; MAX_TX_PACKET_SIZE];
    let len = hdr.encode(&mut buf, payload, crypto).unwrap();

    buf[..len].to_vec()
}

/// The headers of a plain text message from the tests' peer node.
pub fn peer_hdr(ctr: u32, exch_id: u16, initiator: bool, meta: MessageMeta) -> PacketHdr {
    let mut hdr = PacketHdr::new();

    hdr.plain.ctr = ctr;
    hdr.proto.exch_id = exch_id;
    hdr.proto.set_initiator(initiator);
    meta.set_into(&mut hdr.proto);
    hdr.proto.set_reliable(meta.reliable);

    hdr
}

/// A plain text message from the tests' peer node.
pub fn peer_msg(
    ctr: u32,
    exch_id: u16,
    initiator: bool,
    meta: MessageMeta,
    ack: Option<u32>,
    payload: &[u8],
) -> Vec<u8> {
    let mut hdr = peer_hdr(ctr, exch_id, initiator, meta);
    hdr.proto.set_ack(ack);

    encode(&hdr, payload, None)
}

/// A plain text standalone ack from the tests' peer node.
pub fn peer_ack(ctr: u32, exch_id: u16, initiator: bool, ack: u32) -> Vec<u8> {
    peer_msg(ctr, exch_id, initiator, OpCode::MRPStandAloneAck.meta(), Some(ack), &[])
}

pub fn is_standalone_ack(hdr: &PacketHdr) -> bool {
    MessageMeta::from(&hdr.proto).is_standalone_ack()
}
