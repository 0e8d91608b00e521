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

use crate::error::*;
use crate::utils::rand::{rand_u32, Rand};

// Initial counters are drawn from [1, 2^28] so a live session has plenty of room before exhaustion
pub const MATTER_MSG_CTR_RANGE: u32 = 0x0fffffff;

const MSG_RX_STATE_BITMAP_LEN: u32 = 32;

/// The outgoing message counter of one session.
///
/// Counters are never reused: once `u32::MAX` has been handed out, the counter
/// is exhausted and the session has to be re-established.
#[derive(Debug, Clone)]
pub struct MsgCounter {
    next: Option<u32>,
}

impl MsgCounter {
    pub fn new(rand: Rand) -> Self {
        Self::new_with((rand_u32(rand) & MATTER_MSG_CTR_RANGE) + 1)
    }

    pub const fn new_with(initial: u32) -> Self {
        Self {
            next: Some(initial),
        }
    }

    pub fn next(&mut self) -> Result<u32, Error> {
        let ctr = self.next.ok_or(ErrorCode::MsgCounterExhausted)?;
        self.next = ctr.checked_add(1);

        Ok(ctr)
    }

    pub fn peek(&self) -> Option<u32> {
        self.next
    }

    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }
}

/// Outcome of checking a received message counter against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterCheck {
    Accept,
    Duplicate,
    TooOld,
}

/// Duplicate detection state for the messages received on one session.
///
/// Bit `n` of the bitmap records whether `max_ctr - 1 - n` has been seen.
#[derive(Debug, Clone)]
pub struct RxCtrState {
    max_ctr: Option<u32>,
    ctr_bitmap: u32,
}

impl RxCtrState {
    pub const fn new() -> Self {
        Self {
            max_ctr: None,
            ctr_bitmap: 0,
        }
    }

    pub fn max_ctr(&self) -> Option<u32> {
        self.max_ctr
    }

    fn contains(&self, bit_number: u32) -> bool {
        (self.ctr_bitmap & (1 << bit_number)) != 0
    }

    fn insert(&mut self, bit_number: u32) {
        self.ctr_bitmap |= 1 << bit_number;
    }

    // Everything up to and including `msg_ctr` is considered seen
    fn sync(&mut self, msg_ctr: u32) {
        self.max_ctr = Some(msg_ctr);
        self.ctr_bitmap = u32::MAX;
    }

    /// Checks a received counter without recording it.
    pub fn verify(&self, msg_ctr: u32, is_encrypted: bool) -> CounterCheck {
        self.clone().verify_and_update(msg_ctr, is_encrypted)
    }

    /// Checks a received counter and, unless it is rejected, records it.
    ///
    /// Encrypted sessions never wrap, so a counter below the window is rejected
    /// as too old. On unencrypted sessions such a counter means the peer restarted
    /// with a new random counter, so the window is re-synchronised to it.
    pub fn verify_and_update(&mut self, msg_ctr: u32, is_encrypted: bool) -> CounterCheck {
        let Some(max_ctr) = self.max_ctr else {
            self.sync(msg_ctr);
            return CounterCheck::Accept;
        };

        if msg_ctr == max_ctr {
            return CounterCheck::Duplicate;
        }

        let ahead = if is_encrypted {
            msg_ctr > max_ctr
        } else {
            (msg_ctr.wrapping_sub(max_ctr) as i32) > 0
        };

        if ahead {
            let diff = msg_ctr.wrapping_sub(max_ctr);

            self.ctr_bitmap = self.ctr_bitmap.checked_shl(diff).unwrap_or(0);
            if diff <= MSG_RX_STATE_BITMAP_LEN {
                // The previous max is now inside the window
                self.insert(diff - 1);
            }
            self.max_ctr = Some(msg_ctr);

            CounterCheck::Accept
        } else {
            let behind = max_ctr.wrapping_sub(msg_ctr);

            if behind <= MSG_RX_STATE_BITMAP_LEN {
                let index = behind - 1;
                if self.contains(index) {
                    CounterCheck::Duplicate
                } else {
                    self.insert(index);
                    CounterCheck::Accept
                }
            } else if is_encrypted {
                CounterCheck::TooOld
            } else {
                self.sync(msg_ctr);
                CounterCheck::Accept
            }
        }
    }
}

impl Default for RxCtrState {
    fn default() -> Self {
        Self::new()
    }
}
