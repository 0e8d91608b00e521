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

use core::fmt::{self, Debug, Display};

pub use core::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::error::Error;

// Maximum UDP RX packet size per Matter spec
pub const MAX_RX_PACKET_SIZE: usize = 1583;

// Maximum UDP TX packet size per Matter spec
pub const MAX_TX_PACKET_SIZE: usize = 1280 - 40/*IPV6 header size*/ - 8/*UDP header size*/;

/// A Bluetooth LE device address, as used by BTP
#[derive(Eq, PartialEq, Copy, Clone, Hash)]
pub struct BtAddr(pub [u8; 6]);

impl Display for BtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Hash)]
pub enum Address {
    Udp(SocketAddr),
    Tcp(SocketAddr),
    Btp(BtAddr),
}

impl Address {
    pub const fn new() -> Self {
        Self::Udp(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }

    /// TCP and BTP deliver in order and without loss, so MRP is switched off over them.
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Tcp(_) | Self::Btp(_))
    }

    pub fn udp(&self) -> Option<SocketAddr> {
        match self {
            Self::Udp(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Udp(addr) => write!(f, "UDP {}", addr),
            Address::Tcp(addr) => write!(f, "TCP {}", addr),
            Address::Btp(addr) => write!(f, "BTP {}", addr),
        }
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// The outbound half of a datagram transport. Delivery is best-effort:
/// the transport may drop, duplicate or reorder.
pub trait NetworkSend {
    fn send_to(&self, data: &[u8], addr: Address) -> Result<(), Error>;
}

impl<T> NetworkSend for &T
where
    T: NetworkSend,
{
    fn send_to(&self, data: &[u8], addr: Address) -> Result<(), Error> {
        (*self).send_to(data, addr)
    }
}

#[cfg(feature = "std")]
mod std_udp {
    use std::net::UdpSocket;

    use log::warn;

    use crate::error::*;

    use super::{Address, NetworkSend};

    impl NetworkSend for UdpSocket {
        fn send_to(&self, data: &[u8], addr: Address) -> Result<(), Error> {
            let Some(addr) = addr.udp() else {
                warn!("Cannot send to {} over a UDP socket", addr);
                return Err(ErrorCode::InvalidArgument.into());
            };

            UdpSocket::send_to(self, data, addr)?;

            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliable_transports() {
        let sa = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 5540);

        assert!(!Address::Udp(sa).is_reliable());
        assert!(Address::Tcp(sa).is_reliable());
        assert!(Address::Btp(BtAddr([1, 2, 3, 4, 5, 6])).is_reliable());
        assert_eq!(Address::Tcp(sa).udp(), None);
        assert_eq!(Address::Udp(sa).udp(), Some(sa));
    }
}
