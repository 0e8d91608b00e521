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

use num_derive::FromPrimitive;

use crate::error::*;
use crate::transport::exchange::MessageMeta;

/* Secure Channel Protocol ID as per the Matter Spec */
pub const PROTO_ID_SECURE_CHANNEL: u16 = 0x00;

#[derive(FromPrimitive, Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpCode {
    MsgCounterSyncReq = 0x00,
    MsgCounterSyncResp = 0x01,
    MRPStandAloneAck = 0x10,
    PBKDFParamRequest = 0x20,
    PBKDFParamResponse = 0x21,
    PASEPake1 = 0x22,
    PASEPake2 = 0x23,
    PASEPake3 = 0x24,
    CASESigma1 = 0x30,
    CASESigma2 = 0x31,
    CASESigma3 = 0x32,
    CASESigma2Resume = 0x33,
    StatusReport = 0x40,
    ICDCheckIn = 0x50,
}

impl OpCode {
    pub fn meta(&self) -> MessageMeta {
        MessageMeta {
            proto_id: PROTO_ID_SECURE_CHANNEL,
            proto_opcode: *self as u8,
            reliable: !matches!(self, Self::MRPStandAloneAck | Self::ICDCheckIn),
        }
    }

    /// Opcodes which are only valid on an unsecured session, as they set one up.
    pub fn is_session_establishment(&self) -> bool {
        matches!(
            self,
            Self::PBKDFParamRequest
                | Self::PBKDFParamResponse
                | Self::PASEPake1
                | Self::PASEPake2
                | Self::PASEPake3
                | Self::CASESigma1
                | Self::CASESigma2
                | Self::CASESigma3
                | Self::CASESigma2Resume
        )
    }
}

impl From<OpCode> for MessageMeta {
    fn from(op: OpCode) -> Self {
        op.meta()
    }
}

/// Checks an incoming Secure Channel message before it is routed:
/// the opcode must be known, and standalone acks must not ask for an ack themselves.
pub fn validate(meta: &MessageMeta, reliable: bool) -> Result<(), Error> {
    if meta.proto_id != PROTO_ID_SECURE_CHANNEL {
        return Ok(());
    }

    let opcode = meta
        .opcode::<OpCode>()
        .map_err(|_| Error::new(ErrorCode::InvalidArgument))?;

    if opcode == OpCode::MRPStandAloneAck && reliable {
        Err(ErrorCode::InvalidArgument)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_ack_is_unreliable() {
        let meta = OpCode::MRPStandAloneAck.meta();
        assert!(!meta.reliable);
        assert!(meta.is_standalone_ack());

        let meta: MessageMeta = OpCode::CASESigma1.into();
        assert!(meta.reliable);
        assert!(OpCode::CASESigma1.is_session_establishment());
        assert!(!OpCode::StatusReport.is_session_establishment());
    }

    #[test]
    fn test_validate() {
        assert!(validate(&OpCode::StatusReport.meta(), true).is_ok());
        assert!(validate(&OpCode::MRPStandAloneAck.meta(), false).is_ok());

        assert_eq!(
            validate(&OpCode::MRPStandAloneAck.meta(), true)
                .unwrap_err()
                .code(),
            ErrorCode::InvalidArgument
        );

        let unknown = MessageMeta::new(PROTO_ID_SECURE_CHANNEL, 0x7f, true);
        assert_eq!(
            validate(&unknown, true).unwrap_err().code(),
            ErrorCode::InvalidArgument
        );

        // Other protocols are not second-guessed here
        assert!(validate(&MessageMeta::new(0x01, 0x7f, true), true).is_ok());
    }
}
