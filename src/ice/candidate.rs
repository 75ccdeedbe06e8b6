// src/ice/candidate.rs
//! ICE candidate representation (RFC 5245)
//!
//! A candidate is a transport address that a peer might use to receive
//! media, together with the base it was derived from, its type and the
//! priority computed for it.

use std::fmt;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Transport protocol of a candidate or component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
    Tls,
    Dtls,
}

impl Transport {
    /// Lowercase wire/SDP spelling
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::Dtls => "dtls",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// A socket address qualified by its transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportAddress {
    pub address: SocketAddr,
    pub transport: Transport,
}

impl TransportAddress {
    pub fn new(address: SocketAddr, transport: Transport) -> Self {
        Self { address, transport }
    }

    /// UDP transport address
    pub fn udp(address: SocketAddr) -> Self {
        Self::new(address, Transport::Udp)
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.transport)
    }
}

/// ICE candidate type (RFC 5245 Section 4.1.1.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateType {
    /// Obtained directly from a local interface
    Host,
    /// Learned from a STUN server's reflection
    ServerReflexive,
    /// Learned from a peer's connectivity check
    PeerReflexive,
    /// Allocated on a TURN relay
    Relayed,
}

impl CandidateType {
    /// SDP spelling of the type
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::ServerReflexive => "srflx",
            Self::PeerReflexive => "prflx",
            Self::Relayed => "relay",
        }
    }

    /// Type preference term of the priority formula
    /// (RFC 5245 Section 4.1.2.2)
    pub fn preference(&self) -> u32 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relayed => 0,
        }
    }

    /// Recommended default-candidate preference: relayed candidates first,
    /// then server reflexive, then host (RFC 5245 Section 4.1.4).
    pub fn default_preference(&self) -> u32 {
        match self {
            Self::Relayed => 30,
            Self::ServerReflexive => 20,
            Self::PeerReflexive => 10,
            Self::Host => 0,
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// A transport-address candidate for one component of a media stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    transport_address: TransportAddress,
    base: TransportAddress,
    candidate_type: CandidateType,
    priority: u32,
    local_preference: u16,
    default_preference: u32,
    is_virtual: bool,
}

impl Candidate {
    /// Creates a candidate. `base` is the local transport address the
    /// candidate was derived from.
    pub fn new(
        transport_address: TransportAddress,
        base: TransportAddress,
        candidate_type: CandidateType,
    ) -> Self {
        Self {
            transport_address,
            base,
            candidate_type,
            priority: 0,
            local_preference: 65535,
            default_preference: candidate_type.default_preference(),
            is_virtual: false,
        }
    }

    /// Creates a host candidate; its base is the address itself.
    pub fn host(address: TransportAddress) -> Self {
        Self::new(address, address, CandidateType::Host)
    }

    /// Sets the local preference term used when computing the priority
    pub fn with_local_preference(mut self, local_preference: u16) -> Self {
        self.local_preference = local_preference;
        self
    }

    /// Overrides the default-candidate preference
    pub fn with_default_preference(mut self, default_preference: u32) -> Self {
        self.default_preference = default_preference;
        self
    }

    /// Marks the candidate as gathered from a virtual interface
    pub fn mark_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn transport_address(&self) -> &TransportAddress {
        &self.transport_address
    }

    pub fn base(&self) -> &TransportAddress {
        &self.base
    }

    pub fn candidate_type(&self) -> CandidateType {
        self.candidate_type
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn local_preference(&self) -> u16 {
        self.local_preference
    }

    pub fn default_preference(&self) -> u32 {
        self.default_preference
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Sets the priority directly (used for candidates whose priority was
    /// signalled by the peer rather than computed locally)
    pub fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    /// Computes the candidate priority for the given component
    /// (RFC 5245 Section 4.1.2.1):
    ///
    /// ```bash
    /// priority = (2^24) * (type preference) +
    ///            (2^8)  * (local preference) +
    ///            (2^0)  * (256 - component ID)
    /// ```
    pub fn compute_priority(&mut self, component_id: u16) {
        let component = u32::from(component_id.clamp(1, 256));

        self.priority = (self.candidate_type.preference() << 24)
            + (u32::from(self.local_preference) << 8)
            + (256 - component);
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} base={} priority={}",
            self.candidate_type, self.transport_address, self.base, self.priority
        )?;

        if self.is_virtual {
            write!(f, " (virtual)")?;
        }

        Ok(())
    }
}

/// Resource a local candidate keeps open while it is usable, typically the
/// socket it was gathered on.
pub trait CandidateSocket: Send + Sync {
    /// Closes the underlying socket
    fn close(&self);
}

/// A locally gathered candidate, owning the socket it was gathered on
#[derive(Clone)]
pub struct LocalCandidate {
    candidate: Candidate,
    socket: Option<Arc<dyn CandidateSocket>>,
}

impl LocalCandidate {
    /// Local candidate without an attached socket
    pub fn new(candidate: Candidate) -> Self {
        Self {
            candidate,
            socket: None,
        }
    }

    /// Local candidate owning `socket`
    pub fn with_socket(candidate: Candidate, socket: Arc<dyn CandidateSocket>) -> Self {
        Self {
            candidate,
            socket: Some(socket),
        }
    }

    /// The candidate data
    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    /// Releases the candidate's socket. Calling this twice on the same
    /// instance is a no-op the second time.
    pub fn free(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
    }
}

impl Deref for LocalCandidate {
    type Target = Candidate;

    fn deref(&self) -> &Candidate {
        &self.candidate
    }
}

impl DerefMut for LocalCandidate {
    fn deref_mut(&mut self) -> &mut Candidate {
        &mut self.candidate
    }
}

impl PartialEq for LocalCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.candidate == other.candidate
    }
}

impl fmt::Debug for LocalCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCandidate")
            .field("candidate", &self.candidate)
            .field("has_socket", &self.socket.is_some())
            .finish()
    }
}

impl fmt::Display for LocalCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.candidate)
    }
}
