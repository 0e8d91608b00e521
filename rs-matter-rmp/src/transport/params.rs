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

//! MRP parameters and the session parameters structure that peers exchange
//! during session establishment.

use core::fmt;
use core::time::Duration;

use log::warn;

use crate::error::*;
use crate::tlv::{TLVElement, TLVReader, TLVWriter, TagType};

pub const MRP_DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(500);
pub const MRP_DEFAULT_ACTIVE_INTERVAL: Duration = Duration::from_millis(300);
pub const MRP_DEFAULT_ACTIVE_THRESHOLD: Duration = Duration::from_millis(4000);

// Longest retransmission interval a peer may announce
pub const MRP_MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub const DATA_MODEL_REVISION: u16 = 17;
pub const INTERACTION_MODEL_REVISION: u16 = 11;
pub const SPECIFICATION_VERSION: u32 = 0x01030000;
pub const MAX_PATHS_PER_INVOKE: u16 = 1;

const TAG_IDLE_INTERVAL: u8 = 1;
const TAG_ACTIVE_INTERVAL: u8 = 2;
const TAG_ACTIVE_THRESHOLD: u8 = 3;
const TAG_DATA_MODEL_REVISION: u8 = 4;
const TAG_INTERACTION_MODEL_REVISION: u8 = 5;
const TAG_SPECIFICATION_VERSION: u8 = 6;
const TAG_MAX_PATHS_PER_INVOKE: u8 = 7;

/// Retransmission timing of a node, as announced to its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrpConfig {
    /// Retransmission interval used while the node is idle (sleepy devices poll slowly)
    pub idle_interval: Duration,
    /// Retransmission interval used while the node is active
    pub active_interval: Duration,
    /// How long the node stays active after its last exchange of messages
    pub active_threshold: Duration,
}

impl MrpConfig {
    pub const fn new() -> Self {
        Self {
            idle_interval: MRP_DEFAULT_IDLE_INTERVAL,
            active_interval: MRP_DEFAULT_ACTIVE_INTERVAL,
            active_threshold: MRP_DEFAULT_ACTIVE_THRESHOLD,
        }
    }

    /// The interval to wait before the next retransmission to a peer with this config.
    pub fn retrans_interval(&self, peer_active: bool) -> Duration {
        if peer_active {
            self.active_interval
        } else {
            self.idle_interval
        }
    }
}

impl Default for MrpConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MrpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SII:{}ms,SAI:{}ms,SAT:{}ms",
            self.idle_interval.as_millis(),
            self.active_interval.as_millis(),
            self.active_threshold.as_millis()
        )
    }
}

/// The session parameters structure. Fields a peer leaves out take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParameters {
    pub mrp: MrpConfig,
    pub data_model_revision: Option<u16>,
    pub interaction_model_revision: Option<u16>,
    pub specification_version: Option<u32>,
    pub max_paths_per_invoke: Option<u16>,
}

impl SessionParameters {
    /// Parameters with the default MRP config and no optional fields.
    pub const fn new() -> Self {
        Self {
            mrp: MrpConfig::new(),
            data_model_revision: None,
            interaction_model_revision: None,
            specification_version: None,
            max_paths_per_invoke: None,
        }
    }

    /// What this node advertises: the given MRP config plus the revisions it implements.
    pub const fn local(mrp: MrpConfig) -> Self {
        Self {
            mrp,
            data_model_revision: Some(DATA_MODEL_REVISION),
            interaction_model_revision: Some(INTERACTION_MODEL_REVISION),
            specification_version: Some(SPECIFICATION_VERSION),
            max_paths_per_invoke: Some(MAX_PATHS_PER_INVOKE),
        }
    }

    pub fn encode(&self, tw: &mut TLVWriter, tag: TagType) -> Result<(), Error> {
        if self.mrp.idle_interval > MRP_MAX_INTERVAL
            || self.mrp.active_interval > MRP_MAX_INTERVAL
        {
            Err(ErrorCode::InvalidArgument)?;
        }

        let active_threshold = u16::try_from(self.mrp.active_threshold.as_millis())
            .map_err(|_| Error::new(ErrorCode::InvalidArgument))?;

        tw.start_struct(tag)?;
        tw.u32(
            TagType::Context(TAG_IDLE_INTERVAL),
            self.mrp.idle_interval.as_millis() as u32,
        )?;
        tw.u32(
            TagType::Context(TAG_ACTIVE_INTERVAL),
            self.mrp.active_interval.as_millis() as u32,
        )?;
        tw.u16(TagType::Context(TAG_ACTIVE_THRESHOLD), active_threshold)?;

        if let Some(rev) = self.data_model_revision {
            tw.u16(TagType::Context(TAG_DATA_MODEL_REVISION), rev)?;
        }
        if let Some(rev) = self.interaction_model_revision {
            tw.u16(TagType::Context(TAG_INTERACTION_MODEL_REVISION), rev)?;
        }
        if let Some(ver) = self.specification_version {
            tw.u32(TagType::Context(TAG_SPECIFICATION_VERSION), ver)?;
        }
        if let Some(paths) = self.max_paths_per_invoke {
            tw.u16(TagType::Context(TAG_MAX_PATHS_PER_INVOKE), paths)?;
        }

        tw.end_container()
    }

    /// Decodes the structure which starts at the reader's current position.
    pub fn decode(reader: &mut TLVReader) -> Result<Self, Error> {
        reader.next_required()?.confirm_struct()?;

        let mut params = Self::new();

        loop {
            let element = reader.next_required()?;

            if element.is_end_container() {
                break;
            }

            if element.is_container_start() {
                reader.skip_container()?;
                continue;
            }

            match element.tag() {
                TagType::Context(TAG_IDLE_INTERVAL) => {
                    params.mrp.idle_interval = Self::interval(&element)?;
                }
                TagType::Context(TAG_ACTIVE_INTERVAL) => {
                    params.mrp.active_interval = Self::interval(&element)?;
                }
                TagType::Context(TAG_ACTIVE_THRESHOLD) => {
                    params.mrp.active_threshold =
                        Duration::from_millis(element.u16()? as u64);
                }
                TagType::Context(TAG_DATA_MODEL_REVISION) => {
                    params.data_model_revision = Some(element.u16()?);
                }
                TagType::Context(TAG_INTERACTION_MODEL_REVISION) => {
                    params.interaction_model_revision = Some(element.u16()?);
                }
                TagType::Context(TAG_SPECIFICATION_VERSION) => {
                    params.specification_version = Some(element.u32()?);
                }
                TagType::Context(TAG_MAX_PATHS_PER_INVOKE) => {
                    params.max_paths_per_invoke = Some(element.u16()?);
                }
                // Newer revisions may add fields
                _ => (),
            }
        }

        Ok(params)
    }

    fn interval(element: &TLVElement) -> Result<Duration, Error> {
        let interval = Duration::from_millis(element.u32()? as u64);

        if interval > MRP_MAX_INTERVAL {
            warn!(
                "Peer announced a retransmission interval of {}ms, above the maximum",
                interval.as_millis()
            );
            Err(ErrorCode::InvalidArgument)?;
        }

        Ok(interval)
    }
}

impl Default for SessionParameters {
    fn default() -> Self {
        Self::new()
    }
}
