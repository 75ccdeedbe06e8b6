// src/ice/mod.rs
//! ICE candidate model (RFC 5245)
//!
//! The [`Component`] holds, prioritizes and prunes the candidates of one
//! transport flow. Gathering candidates and running connectivity checks
//! against the peer happen elsewhere; harvesters feed candidates in, the
//! agent consumes the ordered result.

pub mod candidate;
pub mod component;

pub use candidate::{
    Candidate, CandidateSocket, CandidateType, LocalCandidate, Transport, TransportAddress,
};
pub use component::{Component, StreamId, RTCP, RTP};
