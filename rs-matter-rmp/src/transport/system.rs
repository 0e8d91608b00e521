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
use core::time::Duration;

use crate::error::Error;

/// The two timers the exchange layer needs. Each is single-shot and always
/// re-armed to the soonest pending deadline of its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    Retransmission,
    StandaloneAck,
}

impl Timer {
    pub const ALL: [Timer; 2] = [Timer::Retransmission, Timer::StandaloneAck];

    const fn index(&self) -> usize {
        match self {
            Self::Retransmission => 0,
            Self::StandaloneAck => 1,
        }
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retransmission => write!(f, "RETRANS"),
            Self::StandaloneAck => write!(f, "SACK"),
        }
    }
}

/// Clock and timer services supplied by the platform.
///
/// `now` must be monotonic. Starting a timer which is already running
/// replaces its deadline. When a timer expires, the platform calls
/// `ExchangeMgr::handle_timer` with it.
pub trait SystemLayer {
    fn now(&self) -> Duration;

    fn start_timer(&self, timer: Timer, delay: Duration) -> Result<(), Error>;

    fn cancel_timer(&self, timer: Timer);
}

impl<T> SystemLayer for &T
where
    T: SystemLayer,
{
    fn now(&self) -> Duration {
        (*self).now()
    }

    fn start_timer(&self, timer: Timer, delay: Duration) -> Result<(), Error> {
        (*self).start_timer(timer, delay)
    }

    fn cancel_timer(&self, timer: Timer) {
        (*self).cancel_timer(timer)
    }
}

#[cfg(feature = "std")]
pub use std_system::StdSystemLayer;

#[cfg(feature = "std")]
mod std_system {
    use core::cell::RefCell;
    use core::time::Duration;

    use std::time::Instant;

    use log::trace;

    use crate::error::Error;

    use super::{SystemLayer, Timer};

    /// A `SystemLayer` for run loops on `std`: timers are just deadlines which the
    /// loop polls with `poll_expired` after waiting at most `next_timeout`.
    pub struct StdSystemLayer {
        origin: Instant,
        deadlines: RefCell<[Option<Duration>; 2]>,
    }

    impl StdSystemLayer {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                deadlines: RefCell::new([None; 2]),
            }
        }

        /// Time left until the soonest armed timer expires, if any is armed.
        pub fn next_timeout(&self) -> Option<Duration> {
            let now = self.now();

            self.deadlines
                .borrow()
                .iter()
                .flatten()
                .min()
                .map(|deadline| deadline.saturating_sub(now))
        }

        /// Disarms and returns one expired timer, if there is one.
        pub fn poll_expired(&self) -> Option<Timer> {
            let now = self.now();
            let mut deadlines = self.deadlines.borrow_mut();

            Timer::ALL.into_iter().find(|timer| {
                let slot = &mut deadlines[timer.index()];
                if slot.is_some_and(|deadline| deadline <= now) {
                    *slot = None;
                    true
                } else {
                    false
                }
            })
        }
    }

    impl Default for StdSystemLayer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SystemLayer for StdSystemLayer {
        fn now(&self) -> Duration {
            self.origin.elapsed()
        }

        fn start_timer(&self, timer: Timer, delay: Duration) -> Result<(), Error> {
            trace!("Arming {} timer in {}ms", timer, delay.as_millis());
            self.deadlines.borrow_mut()[timer.index()] = Some(self.now() + delay);
            Ok(())
        }

        fn cancel_timer(&self, timer: Timer) {
            self.deadlines.borrow_mut()[timer.index()] = None;
        }
    }

}
