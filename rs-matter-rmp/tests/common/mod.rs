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

#![allow(dead_code)]

use core::time::Duration;

use rs_matter_rmp::transport::mgr::ExchangeMgr;
use rs_matter_rmp::transport::network::{Address, IpAddr, Ipv4Addr, SocketAddr};

pub mod delegate;
pub mod mock;
pub mod packets;

pub fn init_env_logger() {
    #[cfg(feature = "std")]
    {
        let _ = env_logger::try_init_from_env(
            env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
        );
    }
}

/// A vendor-specific protocol the tests talk
pub const PROTO_ECHO: u16 = 0xfff1;
pub const OP_REQUEST: u8 = 0x01;
pub const OP_OTHER: u8 = 0x02;

pub fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

pub fn udp(port: u16) -> Address {
    Address::Udp(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
}

/// The address the tests' peer node sends from
pub fn peer() -> Address {
    udp(5540)
}

/// Moves the mock clock to `now` and hands every timer that expired on the way to `mgr`.
pub fn advance(system: &mock::MockSystem, mgr: &mut ExchangeMgr<'_>, now: Duration) {
    system.set_now(now);

    for timer in system.take_expired() {
        mgr.handle_timer(timer).unwrap();
    }
}
