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

use core::fmt;

use log::trace;

use crate::error::*;
use crate::utils::storage::{ParseBuf, WriteBuf};

use super::plain_hdr::{max_plain_hdr_len, PlainHdr};
use super::proto_hdr::ProtoHdr;
use super::session::{SessionCrypto, AEAD_MIC_LEN_BYTES};

/// The two headers of a Matter message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacketHdr {
    pub plain: PlainHdr,
    pub proto: ProtoHdr,
}

impl PacketHdr {
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            plain: PlainHdr::new(),
            proto: ProtoHdr::new(),
        }
    }

    /// Encodes the headers and `payload` into `buf`, encrypting everything after
    /// the message header when `crypto` is given. Returns the encoded length.
    pub fn encode(
        &self,
        buf: &mut [u8],
        payload: &[u8],
        crypto: Option<&dyn SessionCrypto>,
    ) -> Result<usize, Error> {
        let mut plain_buf = [0; max_plain_hdr_len()];
        let mut plain_wb = WriteBuf::new(&mut plain_buf);
        self.plain.encode(&mut plain_wb)?;

        let mut wb = WriteBuf::new(buf);
        wb.reserve(plain_wb.len())?;

        self.proto.encode(&mut wb)?;
        wb.append(payload)?;

        if let Some(crypto) = crypto {
            wb.append(&[0; AEAD_MIC_LEN_BYTES])?;
            crypto.encrypt(self.plain.ctr, plain_wb.as_slice(), wb.as_mut_slice())?;
        }

        wb.prepend(plain_wb.as_slice())?;

        Ok(wb.len())
    }

    /// Decodes the message header, which is enough to find the session.
    pub fn decode_plain_hdr(&mut self, pb: &mut ParseBuf) -> Result<(), Error> {
        self.plain.decode(pb)
    }

    /// Decrypts (when `crypto` is given) and decodes the protocol header,
    /// leaving `pb` positioned on the payload.
    pub fn decode_remaining(
        &mut self,
        pb: &mut ParseBuf,
        crypto: Option<&dyn SessionCrypto>,
    ) -> Result<(), Error> {
        if let Some(crypto) = crypto {
            if pb.remaining() < AEAD_MIC_LEN_BYTES {
                Err(ErrorCode::TruncatedPacket)?;
            }

            let (aad, data) = pb.split_parsed_mut();
            crypto.decrypt(self.plain.ctr, aad, data)?;
            pb.tail(AEAD_MIC_LEN_BYTES)?;
        } else if self.plain.is_encrypted() {
            Err(ErrorCode::NoSession)?;
        }

        self.proto.decode(pb)?;
        trace!("[rx payload] {:02x?}", pb.as_slice());

        Ok(())
    }
}

impl fmt::Display for PacketHdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.plain, self.proto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Flips every byte and uses a MIC of the counter's low byte
    struct XorCrypto;

    impl SessionCrypto for XorCrypto {
        fn encrypt(&self, msg_ctr: u32, aad: &[u8], data: &mut [u8]) -> Result<(), Error> {
            assert!(!aad.is_empty());
            let len = data.len() - AEAD_MIC_LEN_BYTES;
            data[..len].iter_mut().for_each(|b| *b ^= 0xff);
            data[len..].fill(msg_ctr as u8);
            Ok(())
        }

        fn decrypt(&self, msg_ctr: u32, _aad: &[u8], data: &mut [u8]) -> Result<(), Error> {
            let len = data.len() - AEAD_MIC_LEN_BYTES;
            if data[len..].iter().any(|b| *b != msg_ctr as u8) {
                Err(ErrorCode::Crypto)?;
            }
            data[..len].iter_mut().for_each(|b| *b ^= 0xff);
            Ok(())
        }
    }

    fn hdr(sess_id: u16) -> PacketHdr {
        let mut hdr = PacketHdr::new();
        hdr.plain.sess_id = sess_id;
        hdr.plain.ctr = 0x42;
        hdr.proto.exch_id = 3;
        hdr.proto.proto_id = 1;
        hdr.proto.proto_opcode = 2;
        hdr.proto.set_reliable(true);
        hdr
    }

    #[test]
    fn test_plain_text_layout() {
        let mut buf = [0; 64];
        let len = hdr(0).encode(&mut buf, &[0xaa, 0xbb], None).unwrap();

        assert_eq!(
            &buf[..len],
            [0, 0, 0, 0, 0x42, 0, 0, 0, 0x04, 0x02, 0x03, 0x00, 0x01, 0x00, 0xaa, 0xbb]
        );
    }

    #[test]
    fn test_encrypted_through_crypto() {
        let tx = hdr(0x10);
        let mut buf = [0; 64];
        let len = tx.encode(&mut buf, &[0xaa], Some(&XorCrypto)).unwrap();
        assert_eq!(len, 8 + 6 + 1 + AEAD_MIC_LEN_BYTES);
        // Protocol header is no longer readable
        assert_eq!(buf[8], !0x04);

        let mut rx = PacketHdr::new();
        let mut pb = ParseBuf::new(&mut buf[..len]);
        rx.decode_plain_hdr(&mut pb).unwrap();
        rx.decode_remaining(&mut pb, Some(&XorCrypto)).unwrap();

        assert_eq!(rx, tx);
        assert_eq!(pb.as_slice(), [0xaa]);
    }

    #[test]
    fn test_tampered_mic() {
        let mut buf = [0; 64];
        let len = hdr(0x10).encode(&mut buf, &[], Some(&XorCrypto)).unwrap();
        buf[len - 1] ^= 1;

        let mut rx = PacketHdr::new();
        let mut pb = ParseBuf::new(&mut buf[..len]);
        rx.decode_plain_hdr(&mut pb).unwrap();
        assert_eq!(
            rx.decode_remaining(&mut pb, Some(&XorCrypto))
                .unwrap_err()
                .code(),
            ErrorCode::Crypto
        );
    }

    #[test]
    fn test_no_room() {
        let mut buf = [0; 12];
        assert_eq!(
            hdr(0).encode(&mut buf, &[0; 4], None).unwrap_err().code(),
            ErrorCode::NoSpace
        );
    }
}
