// src/ice/component.rs
//! One transport flow of a media stream
//!
//! A component is a piece of a media stream requiring a single transport
//! address; a media stream may require multiple components, each of which
//! has to work for the media stream as a whole to work. For RTP-based
//! streams there are two components per stream, one for RTP and one for
//! RTCP.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{IceError, StackResult};
use crate::ice::candidate::{Candidate, CandidateType, LocalCandidate, Transport};

/// Component id used for RTP streams
pub const RTP: u16 = 1;

/// Component id used for RTCP streams
pub const RTCP: u16 = 2;

/// Handle naming the media stream a component belongs to. The component
/// keeps the relation only; the stream is owned by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId(Arc<str>);

impl StreamId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally gathered candidates and the default among them, guarded as one
struct LocalState {
    candidates: Vec<LocalCandidate>,
    default_candidate: Option<LocalCandidate>,
}

/// Peer-reported candidates and the default among them, guarded as one
struct RemoteState {
    candidates: Vec<Candidate>,
    default_candidate: Option<Candidate>,
}

/// A media-stream component holding the local and remote candidates for
/// one transport flow.
///
/// Harvesters add local candidates from arbitrary threads; the agent
/// prioritizes and prunes from another. The two candidate lists are
/// guarded independently, and no operation holds both guards at once
/// except [`fmt::Display`], which takes them one after the other.
pub struct Component {
    component_id: u16,
    transport: Transport,
    parent_stream: StreamId,
    locals: Mutex<LocalState>,
    remotes: Mutex<RemoteState>,
}

impl Component {
    /// Creates a component. `component_id` is a positive integer between
    /// 1 and 256 identifying the flow within its stream (1 for RTP, 2 for
    /// RTCP).
    pub fn new(
        component_id: u16,
        transport: Transport,
        parent_stream: StreamId,
    ) -> StackResult<Self> {
        if component_id < 1 || component_id > 256 {
            return Err(IceError::InvalidComponentId(component_id).into());
        }

        Ok(Self {
            component_id,
            transport,
            parent_stream,
            locals: Mutex::new(LocalState {
                candidates: Vec::new(),
                default_candidate: None,
            }),
            remotes: Mutex::new(RemoteState {
                candidates: Vec::new(),
                default_candidate: None,
            }),
        })
    }

    /// The id of this component; 1 for RTP, 2 for RTCP
    pub fn component_id(&self) -> u16 {
        self.component_id
    }

    /// The transport protocol of this component
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The media stream this component belongs to
    pub fn parent_stream(&self) -> &StreamId {
        &self.parent_stream
    }

    /// Adds a locally gathered candidate. Only candidate harvesters should
    /// call this.
    pub fn add_local_candidate(&self, candidate: LocalCandidate) {
        self.locals.lock().candidates.push(candidate);
    }

    /// Adds a batch of locally gathered candidates
    pub fn add_local_candidates(&self, candidates: Vec<LocalCandidate>) {
        self.locals.lock().candidates.extend(candidates);
    }

    /// Adds a candidate reported by the remote agent
    pub fn add_remote_candidate(&self, candidate: Candidate) {
        self.remotes.lock().candidates.push(candidate);
    }

    /// Adds a batch of candidates reported by the remote agent
    pub fn add_remote_candidates(&self, candidates: Vec<Candidate>) {
        self.remotes.lock().candidates.extend(candidates);
    }

    /// A copy of the local candidate list
    pub fn local_candidates(&self) -> Vec<LocalCandidate> {
        self.locals.lock().candidates.clone()
    }

    /// A copy of the remote candidate list
    pub fn remote_candidates(&self) -> Vec<Candidate> {
        self.remotes.lock().candidates.clone()
    }

    /// Number of local candidates currently registered
    pub fn local_candidate_count(&self) -> usize {
        self.locals.lock().candidates.len()
    }

    /// Number of remote candidates currently registered
    pub fn remote_candidate_count(&self) -> usize {
        self.remotes.lock().candidates.len()
    }

    /// Number of local host candidates gathered from real interfaces
    pub fn count_local_host_candidates(&self) -> usize {
        self.locals
            .lock()
            .candidates
            .iter()
            .filter(|c| c.candidate_type() == CandidateType::Host && !c.is_virtual())
            .count()
    }

    /// Computes the priority of every local candidate, then sorts the list
    /// in descending priority order. The sort is stable, so candidates
    /// with equal priority keep their insertion order.
    pub fn prioritize_candidates(&self) {
        let mut locals = self.locals.lock();
        let component_id = self.component_id;

        for candidate in locals.candidates.iter_mut() {
            candidate.compute_priority(component_id);
        }

        locals
            .candidates
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Eliminates redundant candidates. A candidate is redundant if its
    /// transport address equals another candidate's and its base equals
    /// the base of that other candidate; two candidates with the same
    /// address but different bases are not redundant. The lower-priority
    /// candidate of each such pair is dropped, which is why this runs
    /// after [`Component::prioritize_candidates`].
    pub fn eliminate_redundant_candidates(&self) {
        let mut locals = self.locals.lock();
        let candidates = &mut locals.candidates;

        let mut i = 0;
        while i < candidates.len() {
            let address = *candidates[i].transport_address();
            let base = *candidates[i].base();
            let priority = candidates[i].priority();

            let mut j = 0;
            while j < candidates.len() {
                if j != i
                    && *candidates[j].transport_address() == address
                    && *candidates[j].base() == base
                    && priority >= candidates[j].priority()
                {
                    tracing::trace!("eliminating redundant candidate: {}", candidates[j]);
                    candidates.remove(j);
                    if j < i {
                        i -= 1;
                    }
                } else {
                    j += 1;
                }
            }

            i += 1;
        }
    }

    /// The candidate selected as the default for this component, the one
    /// that would receive media from a non-ICE peer. `None` until
    /// [`Component::select_default_candidate`] has run on a non-empty
    /// list.
    pub fn default_candidate(&self) -> Option<LocalCandidate> {
        self.locals.lock().default_candidate.clone()
    }

    /// Selects the local candidate with the highest default preference as
    /// this component's default. The first candidate seen wins ties. On an
    /// empty list the default stays unset.
    pub fn select_default_candidate(&self) {
        let mut locals = self.locals.lock();

        let mut best: Option<LocalCandidate> = None;
        for candidate in &locals.candidates {
            match &best {
                None => best = Some(candidate.clone()),
                Some(current)
                    if candidate.default_preference() > current.default_preference() =>
                {
                    best = Some(candidate.clone())
                }
                _ => {}
            }
        }

        locals.default_candidate = best;
    }

    /// The candidate the remote party reported as its default, if any
    pub fn default_remote_candidate(&self) -> Option<Candidate> {
        self.remotes.lock().default_candidate.clone()
    }

    /// Records the candidate the remote party reported as its default
    pub fn set_default_remote_candidate(&self, candidate: Candidate) {
        self.remotes.lock().default_candidate = Some(candidate);
    }

    /// Releases all resources held by this component's local candidates
    /// (their sockets) and clears the local list.
    pub fn free(&self) {
        let mut locals = self.locals.lock();

        for candidate in locals.candidates.iter_mut() {
            candidate.free();
        }

        locals.candidates.clear();
        locals.default_candidate = None;
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Component id={} parent stream={}",
            self.component_id, self.parent_stream
        )?;

        {
            let locals = self.locals.lock();

            if locals.candidates.is_empty() {
                write!(f, "\nno local candidates.")?;
            } else {
                if let Some(default) = &locals.default_candidate {
                    write!(f, "\nDefault candidate: {}", default)?;
                }
                write!(f, "\n{} local candidates:", locals.candidates.len())?;
                for candidate in &locals.candidates {
                    write!(f, "\n{}", candidate)?;
                }
            }
        }

        {
            let remotes = self.remotes.lock();

            if remotes.candidates.is_empty() {
                write!(f, "\nno remote candidates.")?;
            } else {
                write!(f, "\n{} remote candidates:", remotes.candidates.len())?;
                for candidate in &remotes.candidates {
                    write!(f, "\n{}", candidate)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ice::candidate::TransportAddress;

    fn addr(s: &str) -> TransportAddress {
        TransportAddress::udp(s.parse().unwrap())
    }

    fn component() -> Component {
        Component::new(RTP, Transport::Udp, StreamId::new("audio")).unwrap()
    }

    fn local(address: &str, candidate_type: CandidateType, base: &str) -> LocalCandidate {
        LocalCandidate::new(Candidate::new(addr(address), addr(base), candidate_type))
    }

    #[test]
    fn test_component_id_range() {
        let stream = StreamId::new("audio");
        assert!(Component::new(0, Transport::Udp, stream.clone()).is_err());
        assert!(Component::new(257, Transport::Udp, stream.clone()).is_err());
        assert!(Component::new(1, Transport::Udp, stream.clone()).is_ok());
        assert!(Component::new(256, Transport::Udp, stream).is_ok());
    }

    #[test]
    fn test_snapshots_are_independent() {
        let component = component();
        component.add_local_candidate(local(
            "192.168.1.10:5000",
            CandidateType::Host,
            "192.168.1.10:5000",
        ));

        let mut snapshot = component.local_candidates();
        snapshot.clear();

        assert_eq!(component.local_candidate_count(), 1);
    }

    #[test]
    fn test_count_local_host_candidates_skips_virtual() {
        let component = component();
        component.add_local_candidates(vec![
            local("192.168.1.10:5000", CandidateType::Host, "192.168.1.10:5000"),
            LocalCandidate::new(
                Candidate::host(addr("172.17.0.1:5000")).mark_virtual(),
            ),
            local("198.51.100.4:5000", CandidateType::ServerReflexive, "192.168.1.10:5000"),
        ]);

        assert_eq!(component.local_candidate_count(), 3);
        assert_eq!(component.count_local_host_candidates(), 1);
    }

    #[test]
    fn test_prioritize_orders_descending() {
        let component = component();

        // local preferences chosen so the computed priorities come out as
        // middle < highest and the insertion order is scrambled
        component.add_local_candidates(vec![
            local("10.0.0.1:1000", CandidateType::ServerReflexive, "10.0.0.9:1000"),
            local("10.0.0.2:1000", CandidateType::Host, "10.0.0.2:1000"),
            local("10.0.0.3:1000", CandidateType::Relayed, "10.0.0.9:1000"),
        ]);

        component.prioritize_candidates();

        let priorities: Vec<u32> = component
            .local_candidates()
            .iter()
            .map(|c| c.priority())
            .collect();

        assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(
            component.local_candidates()[0].candidate_type(),
            CandidateType::Host
        );
    }

    #[test]
    fn test_prioritize_is_stable_for_ties() {
        let component = component();
        let first = local("10.0.0.1:1000", CandidateType::Host, "10.0.0.1:1000");
        let second = local("10.0.0.2:1000", CandidateType::Host, "10.0.0.2:1000");
        component.add_local_candidates(vec![first.clone(), second.clone()]);

        component.prioritize_candidates();

        let snapshot = component.local_candidates();
        assert_eq!(snapshot[0].transport_address(), first.transport_address());
        assert_eq!(snapshot[1].transport_address(), second.transport_address());
    }

    #[test]
    fn test_eliminate_redundant_keeps_highest_priority() {
        let component = component();

        let mut keeper = Candidate::host(addr("192.168.1.10:5000"));
        keeper.set_priority(500);
        let mut duplicate = Candidate::host(addr("192.168.1.10:5000"));
        duplicate.set_priority(300);
        let mut different_base = Candidate::new(
            addr("192.168.1.10:5000"),
            addr("10.0.0.1:5000"),
            CandidateType::ServerReflexive,
        );
        different_base.set_priority(100);

        component.add_local_candidates(vec![
            LocalCandidate::new(keeper.clone()),
            LocalCandidate::new(duplicate),
            LocalCandidate::new(different_base.clone()),
        ]);

        component.eliminate_redundant_candidates();

        let snapshot = component.local_candidates();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].priority(), 500);
        // same address, different base: not redundant
        assert_eq!(snapshot[1].base(), different_base.base());
    }

    #[test]
    fn test_select_default_candidate() {
        let component = component();

        component.select_default_candidate();
        assert!(component.default_candidate().is_none());

        component.add_local_candidates(vec![
            local("192.168.1.10:5000", CandidateType::Host, "192.168.1.10:5000"),
            local("198.51.100.4:5000", CandidateType::ServerReflexive, "192.168.1.10:5000"),
            local("203.0.113.9:5000", CandidateType::Relayed, "192.168.1.10:5000"),
        ]);

        component.select_default_candidate();

        let default = component.default_candidate().unwrap();
        assert_eq!(default.candidate_type(), CandidateType::Relayed);
    }

    #[test]
    fn test_default_remote_candidate() {
        let component = component();
        assert!(component.default_remote_candidate().is_none());

        let remote = Candidate::host(addr("203.0.113.1:6000"));
        component.set_default_remote_candidate(remote.clone());
        assert_eq!(component.default_remote_candidate(), Some(remote));
    }

    #[test]
    fn test_free_clears_locals() {
        let component = component();
        component.add_local_candidate(local(
            "192.168.1.10:5000",
            CandidateType::Host,
            "192.168.1.10:5000",
        ));
        component.select_default_candidate();

        component.free();

        assert_eq!(component.local_candidate_count(), 0);
        assert!(component.default_candidate().is_none());
    }

    #[test]
    fn test_display_locks_sequentially() {
        let component = component();
        component.add_local_candidate(local(
            "192.168.1.10:5000",
            CandidateType::Host,
            "192.168.1.10:5000",
        ));
        component.add_remote_candidate(Candidate::host(addr("203.0.113.1:6000")));

        let text = component.to_string();
        assert!(text.contains("Component id=1 parent stream=audio"));
        assert!(text.contains("1 local candidates:"));
        assert!(text.contains("1 remote candidates:"));
    }
}
