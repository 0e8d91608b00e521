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

use log::{trace, warn};

use crate::error::*;
use crate::utils::storage::{ParseBuf, WriteBuf};

use super::network::Address;

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct ExchFlags: u8 {
        const VENDOR = 0x10;
        const SECEX = 0x08;
        const RELIABLE = 0x04;
        const ACK = 0x02;
        const INITIATOR = 0x01;
    }
}

impl fmt::Display for ExchFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = false;
        for (flag, str) in [
            (Self::INITIATOR, "I"),
            (Self::ACK, "A"),
            (Self::RELIABLE, "R"),
            (Self::SECEX, "SX"),
            (Self::VENDOR, "V"),
        ] {
            if self.contains(flag) {
                if sep {
                    write!(f, "|")?;
                }

                write!(f, "{}", str)?;
                sep = true;
            }
        }

        Ok(())
    }
}

/// The protocol header: travels encrypted on secure sessions and carries
/// the exchange and MRP bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoHdr {
    pub exch_id: u16,
    exch_flags: ExchFlags,
    pub proto_id: u16,
    pub proto_opcode: u8,
    proto_vendor_id: u16,
    ack_msg_ctr: u32,
}

impl ProtoHdr {
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            exch_id: 0,
            exch_flags: ExchFlags::empty(),
            proto_id: 0,
            proto_opcode: 0,
            proto_vendor_id: 0,
            ack_msg_ctr: 0,
        }
    }

    pub fn get_vendor(&self) -> Option<u16> {
        self.exch_flags
            .contains(ExchFlags::VENDOR)
            .then_some(self.proto_vendor_id)
    }

    pub fn set_vendor(&mut self, vendor_id: Option<u16>) {
        if let Some(vendor_id) = vendor_id {
            self.exch_flags |= ExchFlags::VENDOR;
            self.proto_vendor_id = vendor_id;
        } else {
            self.exch_flags.remove(ExchFlags::VENDOR);
            self.proto_vendor_id = 0;
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.exch_flags.contains(ExchFlags::RELIABLE)
    }

    pub fn set_reliable(&mut self, reliable: bool) {
        self.exch_flags.set(ExchFlags::RELIABLE, reliable);
    }

    pub fn get_ack(&self) -> Option<u32> {
        self.exch_flags
            .contains(ExchFlags::ACK)
            .then_some(self.ack_msg_ctr)
    }

    pub fn set_ack(&mut self, ack_msg_ctr: Option<u32>) {
        if let Some(ack_msg_ctr) = ack_msg_ctr {
            self.exch_flags |= ExchFlags::ACK;
            self.ack_msg_ctr = ack_msg_ctr;
        } else {
            self.exch_flags.remove(ExchFlags::ACK);
            self.ack_msg_ctr = 0;
        }
    }

    pub fn is_initiator(&self) -> bool {
        self.exch_flags.contains(ExchFlags::INITIATOR)
    }

    pub fn set_initiator(&mut self, initiator: bool) {
        self.exch_flags.set(ExchFlags::INITIATOR, initiator);
    }

    /// Adjusts the reliability settings (flags R and A) in the proto header
    /// by inspecting the reliability of the network protocol itself.
    ///
    /// In case the protocol is reliable - yet the message has the R or A flags set -
    /// these flags are lowered. Warnings will be logged in this case if the `rx` parameter
    /// is set to `true` (i.e. this is an incoming message), because this situation
    /// represents a Matter protocol violation.
    pub fn adjust_reliability(&mut self, rx: bool, addr: &Address) {
        if addr.is_reliable() {
            if rx {
                if self.is_reliable() {
                    warn!("Detected a reliable message over a reliable transport; reliability request will not be honored with an ACK");
                }

                if self.get_ack().is_some() {
                    warn!("Detected an ACK counter over a reliable transport; ACK counter will be discarded");
                }
            }

            self.set_reliable(false);
            self.set_ack(None);
        }
    }

    pub fn decode(&mut self, parsebuf: &mut ParseBuf) -> Result<(), Error> {
        self.exch_flags = ExchFlags::from_bits(parsebuf.le_u8()?).ok_or(ErrorCode::Invalid)?;
        self.proto_opcode = parsebuf.le_u8()?;
        self.exch_id = parsebuf.le_u16()?;
        self.proto_id = parsebuf.le_u16()?;

        self.proto_vendor_id = if self.exch_flags.contains(ExchFlags::VENDOR) {
            parsebuf.le_u16()?
        } else {
            0
        };
        self.ack_msg_ctr = if self.exch_flags.contains(ExchFlags::ACK) {
            parsebuf.le_u32()?
        } else {
            0
        };

        if self.exch_flags.contains(ExchFlags::SECEX) {
            let len = parsebuf.le_u16()?;
            parsebuf.skip(len as usize)?;
        }

        trace!("[decode] {}", self);
        Ok(())
    }

    pub fn encode(&self, resp_buf: &mut WriteBuf) -> Result<(), Error> {
        trace!("[encode] {}", self);
        // Secured extensions are never produced
        resp_buf.le_u8((self.exch_flags - ExchFlags::SECEX).bits())?;
        resp_buf.le_u8(self.proto_opcode)?;
        resp_buf.le_u16(self.exch_id)?;
        resp_buf.le_u16(self.proto_id)?;
        if let Some(vendor_id) = self.get_vendor() {
            resp_buf.le_u16(vendor_id)?;
        }
        if let Some(ack_msg_ctr) = self.get_ack() {
            resp_buf.le_u32(ack_msg_ctr)?;
        }
        Ok(())
    }
}

impl Default for ProtoHdr {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProtoHdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exch_flags.is_empty() {
            write!(f, "{},", self.exch_flags)?;
        }

        write!(
            f,
            "EID:{:x},PROTO:{:x},OP:{:x}",
            self.exch_id, self.proto_id, self.proto_opcode
        )?;

        if let Some(ack_msg_ctr) = self.get_ack() {
            write!(f, ",ACTR:{:x}", ack_msg_ctr)?;
        }

        if let Some(vendor_id) = self.get_vendor() {
            write!(f, ",VID:{:x}", vendor_id)?;
        }

        Ok(())
    }
}

pub const fn max_proto_hdr_len() -> usize {
    // exchange flags
    1 +
    // protocol opcode
        1 +
    // exchange ID
        2 +
    // protocol ID
        2 +
    // [optional] protocol vendor ID
        2 +
    // [optional] acknowledged message counter
        4
}
