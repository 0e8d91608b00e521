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

use cfg_if::cfg_if;
use log::{debug, info};

use crate::error::*;
use crate::utils::rand::{rand_u16, Rand};

use super::dedup::{CounterCheck, MsgCounter, RxCtrState};
use super::network::Address;
use super::params::SessionParameters;
use super::plain_hdr::PlainHdr;

pub const AEAD_MIC_LEN_BYTES: usize = 16;

cfg_if! {
    if #[cfg(feature = "max-sessions-32")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 32;
    } else if #[cfg(feature = "max-sessions-8")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 8;
    } else if #[cfg(feature = "max-sessions-4")] {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 4;
    } else {
        /// Max number of supported sessions
        pub const MAX_SESSIONS: usize = 16;
    }
}

/// The AEAD of a secure session, keyed and nonced by the session establishment layer.
///
/// `data` is the protocol header plus payload, followed by `AEAD_MIC_LEN_BYTES`
/// of room for the MIC; `aad` is the encoded message header.
pub trait SessionCrypto {
    fn encrypt(&self, msg_ctr: u32, aad: &[u8], data: &mut [u8]) -> Result<(), Error>;

    /// Decrypts in place and verifies the trailing MIC, failing with `ErrorCode::Crypto`.
    fn decrypt(&self, msg_ctr: u32, aad: &[u8], data: &mut [u8]) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    PlainText,
    Pase,
    Case { fab_idx: u8 },
}

impl SessionMode {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Self::PlainText)
    }
}

/// Everything the session establishment layer hands over when a PASE or CASE
/// handshake completes.
pub struct CloneData<'a> {
    pub local_sess_id: u16,
    pub peer_sess_id: u16,
    pub local_nodeid: u64,
    pub peer_nodeid: u64,
    pub peer_addr: Address,
    pub mode: SessionMode,
    pub crypto: &'a dyn SessionCrypto,
    pub peer_params: SessionParameters,
}

pub struct Session<'a> {
    id: u32,
    local_sess_id: u16,
    peer_sess_id: u16,
    local_nodeid: u64,
    peer_nodeid: Option<u64>,
    peer_addr: Address,
    mode: SessionMode,
    crypto: Option<&'a dyn SessionCrypto>,
    tx_ctr: MsgCounter,
    rx_ctr_state: RxCtrState,
    peer_params: SessionParameters,
    last_peer_activity: Duration,
    last_use: Duration,
}

impl<'a> Session<'a> {
    /// Internal handle of the session, unique for the lifetime of the `SessionMgr`
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn get_local_sess_id(&self) -> u16 {
        self.local_sess_id
    }

    pub fn get_peer_sess_id(&self) -> u16 {
        self.peer_sess_id
    }

    pub fn get_local_node_id(&self) -> u64 {
        self.local_nodeid
    }

    pub fn get_peer_node_id(&self) -> Option<u64> {
        self.peer_nodeid
    }

    pub fn get_peer_addr(&self) -> Address {
        self.peer_addr
    }

    pub fn set_peer_addr(&mut self, peer_addr: Address) {
        self.peer_addr = peer_addr;
    }

    pub fn get_mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_encrypted(&self) -> bool {
        self.mode.is_encrypted()
    }

    pub fn crypto(&self) -> Option<&'a dyn SessionCrypto> {
        self.crypto
    }

    pub fn peer_params(&self) -> &SessionParameters {
        &self.peer_params
    }

    pub fn set_peer_params(&mut self, params: SessionParameters) {
        debug!("Session {}: peer MRP config {}", self.id, params.mrp);
        self.peer_params = params;
    }

    pub fn last_use(&self) -> Duration {
        self.last_use
    }

    pub fn touch(&mut self, now: Duration) {
        self.last_use = now;
    }

    pub fn tx_ctr(&self) -> &MsgCounter {
        &self.tx_ctr
    }

    /// Whether a received message belongs to this session
    pub fn is_for_rx(&self, plain: &PlainHdr, peer: &Address) -> bool {
        if plain.is_encrypted() {
            self.is_encrypted() && self.local_sess_id == plain.sess_id
        } else {
            !self.is_encrypted()
                && self.peer_addr == *peer
                && self.peer_nodeid == plain.get_src_nodeid()
        }
    }

    pub fn peek_rx_ctr(&self, msg_ctr: u32) -> CounterCheck {
        self.rx_ctr_state.verify(msg_ctr, self.is_encrypted())
    }

    pub fn check_rx_ctr(&mut self, msg_ctr: u32) -> CounterCheck {
        let is_encrypted = self.is_encrypted();
        self.rx_ctr_state.verify_and_update(msg_ctr, is_encrypted)
    }

    /// Builds the message header of the next outgoing message, consuming a counter.
    pub fn pre_send(&mut self, now: Duration) -> Result<PlainHdr, Error> {
        let mut plain = PlainHdr::new();

        plain.sess_id = self.peer_sess_id;
        plain.ctr = self.tx_ctr.next()?;

        if !self.is_encrypted() {
            plain.set_src_nodeid((self.local_nodeid != 0).then_some(self.local_nodeid));
            plain.set_dst_unicast_nodeid(self.peer_nodeid);
        }

        self.last_use = now;

        Ok(plain)
    }

    pub fn mark_peer_active(&mut self, now: Duration) {
        self.last_peer_activity = now;
        self.last_use = now;
    }

    /// The peer counts as active while it has been heard from within its active threshold.
    pub fn is_peer_active(&self, now: Duration) -> bool {
        now.saturating_sub(self.last_peer_activity) < self.peer_params.mrp.active_threshold
    }

    /// The interval to wait before retransmitting to the peer.
    pub fn retrans_interval(&self, now: Duration) -> Duration {
        self.peer_params
            .mrp
            .retrans_interval(self.is_peer_active(now))
    }
}

impl<'a> fmt::Display for Session<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, peer: {}, local SID: {}, remote SID: {}, mode: {:?}",
            self.id, self.peer_addr, self.local_sess_id, self.peer_sess_id, self.mode
        )?;

        if let Some(peer_nodeid) = self.peer_nodeid {
            write!(f, ", peer node: {:x}", peer_nodeid)?;
        }

        Ok(())
    }
}

pub struct SessionMgr<'a> {
    next_id: u32,
    next_sess_id: u16,
    sessions: heapless::Vec<Session<'a>, MAX_SESSIONS>,
    rand: Rand,
}

impl<'a> SessionMgr<'a> {
    pub fn new(rand: Rand) -> Self {
        Self {
            next_id: 1,
            next_sess_id: rand_u16(rand).max(1),
            sessions: heapless::Vec::new(),
            rand,
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.is_full()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// A local session ID not used by any current session, for the session
    /// establishment layer to hand out.
    pub fn get_next_sess_id(&mut self) -> u16 {
        loop {
            let next_sess_id = self.next_sess_id;

            self.next_sess_id = self.next_sess_id.wrapping_add(1);
            if self.next_sess_id == 0 {
                self.next_sess_id = 1;
            }

            if self
                .sessions
                .iter()
                .all(|sess| sess.get_local_sess_id() != next_sess_id)
            {
                break next_sess_id;
            }
        }
    }

    fn insert(&mut self, mut session: Session<'a>) -> Result<u32, Error> {
        session.id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let id = session.id;
        info!("New session: {}", session);

        self.sessions
            .push(session)
            .map_err(|_| ErrorCode::NoSpaceSessions)?;

        Ok(id)
    }

    /// Adds a secure session set up by PASE or CASE.
    pub fn add(&mut self, clone_data: CloneData<'a>, now: Duration) -> Result<u32, Error> {
        if !clone_data.mode.is_encrypted() || clone_data.local_sess_id == 0 {
            Err(ErrorCode::InvalidArgument)?;
        }

        if self
            .sessions
            .iter()
            .any(|sess| sess.get_local_sess_id() == clone_data.local_sess_id)
        {
            Err(ErrorCode::InvalidArgument)?;
        }

        if self.is_full() {
            Err(ErrorCode::NoSpaceSessions)?;
        }

        self.insert(Session {
            id: 0,
            local_sess_id: clone_data.local_sess_id,
            peer_sess_id: clone_data.peer_sess_id,
            local_nodeid: clone_data.local_nodeid,
            peer_nodeid: Some(clone_data.peer_nodeid),
            peer_addr: clone_data.peer_addr,
            mode: clone_data.mode,
            crypto: Some(clone_data.crypto),
            tx_ctr: MsgCounter::new(self.rand),
            rx_ctr_state: RxCtrState::new(),
            peer_params: clone_data.peer_params,
            last_peer_activity: now,
            last_use: now,
        })
    }

    /// Adds an unsecured session, as used to carry the session establishment messages.
    pub fn add_unsecured(
        &mut self,
        peer_addr: Address,
        local_nodeid: u64,
        peer_nodeid: Option<u64>,
        now: Duration,
    ) -> Result<u32, Error> {
        if self.is_full() {
            Err(ErrorCode::NoSpaceSessions)?;
        }

        self.insert(Session {
            id: 0,
            local_sess_id: 0,
            peer_sess_id: 0,
            local_nodeid,
            peer_nodeid,
            peer_addr,
            mode: SessionMode::PlainText,
            crypto: None,
            tx_ctr: MsgCounter::new(self.rand),
            rx_ctr_state: RxCtrState::new(),
            peer_params: SessionParameters::new(),
            last_peer_activity: now,
            last_use: now,
        })
    }

    pub fn remove(&mut self, id: u32) -> Option<Session<'a>> {
        let index = self.sessions.iter().position(|sess| sess.id == id)?;
        let session = self.sessions.swap_remove(index);

        info!("Dropped session: {}", session);

        Some(session)
    }

    pub fn get(&self, id: u32) -> Option<&Session<'a>> {
        self.sessions.iter().find(|sess| sess.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Session<'a>> {
        self.sessions.iter_mut().find(|sess| sess.id == id)
    }

    pub fn get_for_rx(&self, plain: &PlainHdr, peer: &Address) -> Option<u32> {
        self.sessions
            .iter()
            .find(|sess| sess.is_for_rx(plain, peer))
            .map(Session::id)
    }

    /// The least recently used session for which `busy` is false.
    pub fn get_session_for_eviction<F>(&self, busy: F) -> Option<u32>
    where
        F: Fn(u32) -> bool,
    {
        self.sessions
            .iter()
            .filter(|sess| !busy(sess.id))
            .min_by_key(|sess| sess.last_use)
            .map(Session::id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session<'a>> {
        self.sessions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::network::{IpAddr, Ipv4Addr, SocketAddr};
    use crate::transport::params::MrpConfig;
    use crate::utils::rand::dummy_rand;

    struct NoCrypto;

    impl SessionCrypto for NoCrypto {
        fn encrypt(&self, _msg_ctr: u32, _aad: &[u8], _data: &mut [u8]) -> Result<(), Error> {
            Ok(())
        }

        fn decrypt(&self, _msg_ctr: u32, _aad: &[u8], _data: &mut [u8]) -> Result<(), Error> {
            Ok(())
        }
    }

    fn addr(port: u16) -> Address {
        Address::Udp(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    fn clone_data(local_sess_id: u16, crypto: &NoCrypto) -> CloneData<'_> {
        CloneData {
            local_sess_id,
            peer_sess_id: 0x4000 + local_sess_id,
            local_nodeid: 1,
            peer_nodeid: 2,
            peer_addr: addr(5540),
            mode: SessionMode::Case { fab_idx: 1 },
            crypto,
            peer_params: SessionParameters::new(),
        }
    }

    #[test]
    fn test_rx_lookup() {
        let crypto = NoCrypto;
        let mut mgr = SessionMgr::new(dummy_rand);

        let secure = mgr.add(clone_data(7, &crypto), Duration::ZERO).unwrap();
        let unsecured = mgr
            .add_unsecured(addr(6000), 0, Some(0xabcd), Duration::ZERO)
            .unwrap();
        assert_ne!(secure, unsecured);

        let mut plain = PlainHdr::new();
        plain.sess_id = 7;
        assert_eq!(mgr.get_for_rx(&plain, &addr(1)), Some(secure));

        plain.sess_id = 0;
        plain.set_src_nodeid(Some(0xabcd));
        assert_eq!(mgr.get_for_rx(&plain, &addr(6000)), Some(unsecured));
        assert_eq!(mgr.get_for_rx(&plain, &addr(6001)), None);

        plain.set_src_nodeid(None);
        assert_eq!(mgr.get_for_rx(&plain, &addr(6000)), None);
    }

    #[test]
    fn test_add_validation() {
        let crypto = NoCrypto;
        let mut mgr = SessionMgr::new(dummy_rand);

        mgr.add(clone_data(7, &crypto), Duration::ZERO).unwrap();
        assert_eq!(
            mgr.add(clone_data(7, &crypto), Duration::ZERO)
                .unwrap_err()
                .code(),
            ErrorCode::InvalidArgument
        );
        assert!(mgr.add(clone_data(0, &crypto), Duration::ZERO).is_err());

        for port in 0..(MAX_SESSIONS - 1) as u16 {
            mgr.add_unsecured(addr(port), 0, None, Duration::ZERO)
                .unwrap();
        }
        assert!(mgr.is_full());
        assert_eq!(
            mgr.add_unsecured(addr(9999), 0, None, Duration::ZERO)
                .unwrap_err()
                .code(),
            ErrorCode::NoSpaceSessions
        );
    }

    #[test]
    fn test_lru_eviction_skips_busy() {
        let mut mgr = SessionMgr::new(dummy_rand);

        let first = mgr
            .add_unsecured(addr(1), 0, None, Duration::from_millis(10))
            .unwrap();
        let second = mgr
            .add_unsecured(addr(2), 0, None, Duration::from_millis(20))
            .unwrap();
        let third = mgr
            .add_unsecured(addr(3), 0, None, Duration::from_millis(30))
            .unwrap();

        assert_eq!(mgr.get_session_for_eviction(|_| false), Some(first));
        assert_eq!(mgr.get_session_for_eviction(|id| id == first), Some(second));

        mgr.get_mut(first).unwrap().touch(Duration::from_millis(40));
        mgr.get_mut(second).unwrap().touch(Duration::from_millis(50));
        assert_eq!(mgr.get_session_for_eviction(|_| false), Some(third));

        assert!(mgr.remove(third).is_some());
        assert!(mgr.remove(third).is_none());
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn test_peer_activity_selects_interval() {
        let mut mgr = SessionMgr::new(dummy_rand);
        let id = mgr.add_unsecured(addr(1), 0, None, Duration::ZERO).unwrap();
        let session = mgr.get_mut(id).unwrap();

        session.set_peer_params(SessionParameters::local(MrpConfig {
            idle_interval: Duration::from_millis(2000),
            active_interval: Duration::from_millis(300),
            active_threshold: Duration::from_millis(4000),
        }));

        assert!(session.is_peer_active(Duration::from_millis(3999)));
        assert_eq!(
            session.retrans_interval(Duration::from_millis(3999)),
            Duration::from_millis(300)
        );
        assert!(!session.is_peer_active(Duration::from_millis(4000)));
        assert_eq!(
            session.retrans_interval(Duration::from_millis(4000)),
            Duration::from_millis(2000)
        );

        session.mark_peer_active(Duration::from_millis(5000));
        assert!(session.is_peer_active(Duration::from_millis(8000)));
    }

    #[test]
    fn test_pre_send_headers() {
        let crypto = NoCrypto;
        let mut mgr = SessionMgr::new(dummy_rand);

        let secure = mgr.add(clone_data(7, &crypto), Duration::ZERO).unwrap();
        let plain = mgr
            .get_mut(secure)
            .unwrap()
            .pre_send(Duration::from_millis(5))
            .unwrap();
        assert_eq!(plain.sess_id, 0x4007);
        assert_eq!(plain.get_src_nodeid(), None);
        assert_eq!(mgr.get(secure).unwrap().last_use(), Duration::from_millis(5));

        let unsecured = mgr
            .add_unsecured(addr(1), 0x55, Some(0x66), Duration::ZERO)
            .unwrap();
        let session = mgr.get_mut(unsecured).unwrap();
        let first = session.pre_send(Duration::ZERO).unwrap();
        let second = session.pre_send(Duration::ZERO).unwrap();
        assert_eq!(first.sess_id, 0);
        assert_eq!(first.get_src_nodeid(), Some(0x55));
        assert_eq!(first.get_dst_unicast_nodeid(), Some(0x66));
        assert_eq!(second.ctr, first.ctr + 1);
    }

    #[test]
    fn test_next_sess_id_skips_used() {
        let crypto = NoCrypto;
        let mut mgr = SessionMgr::new(dummy_rand);
        let first = mgr.get_next_sess_id();

        mgr.add(clone_data(first.wrapping_add(1), &crypto), Duration::ZERO)
            .unwrap();
        assert_eq!(mgr.get_next_sess_id(), first.wrapping_add(2));
    }
}
