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

use core::cell::{Cell, RefCell};
use core::time::Duration;

use rs_matter_rmp::error::{Error, ErrorCode};
use rs_matter_rmp::transport::network::{Address, NetworkSend};
use rs_matter_rmp::transport::session::{SessionCrypto, AEAD_MIC_LEN_BYTES};
use rs_matter_rmp::transport::system::{SystemLayer, Timer};

/// Records every datagram instead of sending it.
#[derive(Default)]
pub struct MockNetwork {
    sent: RefCell<Vec<(Address, Vec<u8>)>>,
    failing: Cell<bool>,
}

impl MockNetwork {
    /// Returns and forgets the datagrams sent so far.
    pub fn take(&self) -> Vec<(Address, Vec<u8>)> {
        core::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl NetworkSend for MockNetwork {
    fn send_to(&self, data: &[u8], addr: Address) -> Result<(), Error> {
        if self.failing.get() {
            Err(ErrorCode::StdIoError)?;
        }

        self.sent.borrow_mut().push((addr, data.to_vec()));
        Ok(())
    }
}

/// A clock which only moves when told to, with timers kept as absolute deadlines.
#[derive(Default)]
pub struct MockSystem {
    now: Cell<Duration>,
    deadlines: RefCell<[Option<Duration>; 2]>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&self, now: Duration) {
        self.now.set(now);
    }

    pub fn deadline(&self, timer: Timer) -> Option<Duration> {
        self.deadlines.borrow()[Self::index(timer)]
    }

    /// Disarms and returns the timers whose deadline has passed.
    pub fn take_expired(&self) -> Vec<Timer> {
        let now = self.now.get();
        let mut deadlines = self.deadlines.borrow_mut();

        Timer::ALL
            .into_iter()
            .filter(|timer| {
                let slot = &mut deadlines[Self::index(*timer)];
                let expired = slot.is_some_and(|deadline| deadline <= now);
                if expired {
                    *slot = None;
                }

                expired
            })
            .collect()
    }

    fn index(timer: Timer) -> usize {
        match timer {
            Timer::Retransmission => 0,
            Timer::StandaloneAck => 1,
        }
    }
}

impl SystemLayer for MockSystem {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn start_timer(&self, timer: Timer, delay: Duration) -> Result<(), Error> {
        self.deadlines.borrow_mut()[Self::index(timer)] = Some(self.now.get() + delay);
        Ok(())
    }

    fn cancel_timer(&self, timer: Timer) {
        self.deadlines.borrow_mut()[Self::index(timer)] = None;
    }
}

/// XORs the data with a key; the MIC is the key mixed with the counter.
pub struct XorCrypto(pub u8);

impl XorCrypto {
    fn mic(&self, msg_ctr: u32) -> u8 {
        self.0 ^ msg_ctr as u8
    }
}

impl SessionCrypto for XorCrypto {
    fn encrypt(&self, msg_ctr: u32, _aad: &[u8], data: &mut [u8]) -> Result<(), Error> {
        let len = data.len() - AEAD_MIC_LEN_BYTES;
        data[..len].iter_mut().for_each(|b| *b ^= self.0);
        data[len..].fill(self.mic(msg_ctr));

        Ok(())
    }

    fn decrypt(&self, msg_ctr: u32, _aad: &[u8], data: &mut [u8]) -> Result<(), Error> {
        let len = data.len() - AEAD_MIC_LEN_BYTES;
        if data[len..].iter().any(|b| *b != self.mic(msg_ctr)) {
            Err(ErrorCode::Crypto)?;
        }

        data[..len].iter_mut().for_each(|b| *b ^= self.0);

        Ok(())
    }
}
