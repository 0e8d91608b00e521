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

use bitflags::bitflags;
use log::trace;

use crate::error::*;
use crate::utils::storage::{ParseBuf, WriteBuf};

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MsgFlags: u8 {
        const DSIZ_UNICAST_NODEID = 0x01;
        const DSIZ_GROUPCAST_NODEID = 0x02;
        const SRC_ADDR_PRESENT = 0x04;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SecFlags: u8 {
        const PRIVACY = 0x80;
        const CONTROL = 0x40;
        const MSG_EXTENSIONS = 0x20;
        const GROUP_SESSION = 0x01;
    }
}

impl fmt::Display for MsgFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = false;
        for (flag, str) in [
            (Self::SRC_ADDR_PRESENT, "S"),
            (Self::DSIZ_UNICAST_NODEID, "U"),
            (Self::DSIZ_GROUPCAST_NODEID, "G"),
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

/// The message header: the part of a message which is never encrypted
/// and serves as the AAD for the rest of it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlainHdr {
    flags: MsgFlags,
    sec_flags: SecFlags,
    pub sess_id: u16,
    pub ctr: u32,
    src_nodeid: u64,
    dst_nodeid: u64,
}

impl PlainHdr {
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            flags: MsgFlags::empty(),
            sec_flags: SecFlags::empty(),
            sess_id: 0,
            ctr: 0,
            src_nodeid: 0,
            dst_nodeid: 0,
        }
    }

    pub fn get_src_nodeid(&self) -> Option<u64> {
        self.flags
            .contains(MsgFlags::SRC_ADDR_PRESENT)
            .then_some(self.src_nodeid)
    }

    pub fn set_src_nodeid(&mut self, id: Option<u64>) {
        if let Some(id) = id {
            self.flags |= MsgFlags::SRC_ADDR_PRESENT;
            self.src_nodeid = id;
        } else {
            self.flags.remove(MsgFlags::SRC_ADDR_PRESENT);
            self.src_nodeid = 0;
        }
    }

    pub fn get_dst_unicast_nodeid(&self) -> Option<u64> {
        self.flags
            .contains(MsgFlags::DSIZ_UNICAST_NODEID)
            .then_some(self.dst_nodeid)
    }

    pub fn set_dst_unicast_nodeid(&mut self, id: Option<u64>) {
        self.flags
            .remove(MsgFlags::DSIZ_UNICAST_NODEID | MsgFlags::DSIZ_GROUPCAST_NODEID);
        self.dst_nodeid = 0;

        if let Some(id) = id {
            self.flags |= MsgFlags::DSIZ_UNICAST_NODEID;
            self.dst_nodeid = id;
        }
    }

    pub fn get_dst_groupcast_nodeid(&self) -> Option<u16> {
        self.flags
            .contains(MsgFlags::DSIZ_GROUPCAST_NODEID)
            .then_some(self.dst_nodeid as u16)
    }

    pub fn is_group_session(&self) -> bool {
        self.sec_flags.contains(SecFlags::GROUP_SESSION)
    }

    pub fn is_encrypted(&self) -> bool {
        self.sess_id != 0
    }

    pub fn decode(&mut self, msg: &mut ParseBuf) -> Result<(), Error> {
        // Unknown bits include a non-zero message format version
        self.flags = MsgFlags::from_bits(msg.le_u8()?).ok_or(ErrorCode::Invalid)?;
        self.sess_id = msg.le_u16()?;
        self.sec_flags = SecFlags::from_bits(msg.le_u8()?).ok_or(ErrorCode::Invalid)?;
        self.ctr = msg.le_u32()?;

        self.src_nodeid = if self.flags.contains(MsgFlags::SRC_ADDR_PRESENT) {
            msg.le_u64()?
        } else {
            0
        };

        let unicast = self.flags.contains(MsgFlags::DSIZ_UNICAST_NODEID);
        let groupcast = self.flags.contains(MsgFlags::DSIZ_GROUPCAST_NODEID);

        self.dst_nodeid = match (unicast, groupcast) {
            (true, true) => Err(ErrorCode::Invalid)?,
            (true, false) => msg.le_u64()?,
            (false, true) => msg.le_u16()? as u64,
            (false, false) => 0,
        };

        if self.sec_flags.contains(SecFlags::MSG_EXTENSIONS) {
            let len = msg.le_u16()?;
            msg.skip(len as usize)?;
        }

        trace!("[decode] {}", self);
        Ok(())
    }

    pub fn encode(&self, resp_buf: &mut WriteBuf) -> Result<(), Error> {
        trace!("[encode] {}", self);
        resp_buf.le_u8(self.flags.bits())?;
        resp_buf.le_u16(self.sess_id)?;
        // Neither privacy nor message extensions are produced by this node
        resp_buf.le_u8((self.sec_flags & SecFlags::GROUP_SESSION).bits())?;
        resp_buf.le_u32(self.ctr)?;

        if let Some(src_nodeid) = self.get_src_nodeid() {
            resp_buf.le_u64(src_nodeid)?;
        }

        if let Some(dst_nodeid) = self.get_dst_unicast_nodeid() {
            resp_buf.le_u64(dst_nodeid)?;
        } else if let Some(dst_nodeid) = self.get_dst_groupcast_nodeid() {
            resp_buf.le_u16(dst_nodeid)?;
        }

        Ok(())
    }
}

impl fmt::Display for PlainHdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.flags.is_empty() {
            write!(f, "{},", self.flags)?;
        }

        write!(f, "SID:{:x},CTR:{:x}", self.sess_id, self.ctr)?;

        if let Some(src_nodeid) = self.get_src_nodeid() {
            write!(f, ",SRC:{:x}", src_nodeid)?;
        }

        if let Some(dst_nodeid) = self.get_dst_unicast_nodeid() {
            write!(f, ",DST:{:x}", dst_nodeid)?;
        }

        if let Some(dst_group_nodeid) = self.get_dst_groupcast_nodeid() {
            write!(f, ",GRP:{:x}", dst_group_nodeid)?;
        }

        Ok(())
    }
}

pub const fn max_plain_hdr_len() -> usize {
    // flags
    1 +
    // session ID
        2 +
    // security flags
        1 +
    // message ctr
        4 +
    // [optional] source node ID
        8 +
    // [optional] destination node ID
        8
}
