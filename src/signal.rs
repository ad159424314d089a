//! Dependent-signal composition graph (C4).
//!
//! Signals are arena-allocated and referenced by stable integer ids rather
//! than owning pointers, per the bidirectional leading/trailing linkage
//! design note: a node stores `leading_id`/`trailing_id` as `Option<SignalId>`
//! indices into the owning `SignalGraph`'s arena.

use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SignalId = usize;

/// Position of a signal within a dependency chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sequence {
    /// No dependents at all; a lone signal.
    Only,
    /// Head of a chain; may have a trailing dependent but no leader.
    First,
    /// Interior node; has exactly one leader and may have one follower.
    Middle,
    /// Tail of a chain; has a leader but no follower.
    Last,
}

/// A fired-up snapshot: bar/price/volume/indicator at the moment a signal
/// went up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalUpState {
    pub signal_up_bar: i64,
    pub price: f64,
    pub volume: u64,
    pub indicator_value: f64,
    pub datetime: DateTime<Utc>,
}

/// One node in the dependent-signal graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub codename: String,
    pub sequence: Sequence,
    pub sequential: u32,
    pub is_buy: bool,
    leading_id: Option<SignalId>,
    trailing_id: Option<SignalId>,
    is_up: bool,
    up_state: Option<SignalUpState>,
}

impl Signal {
    fn new(codename: impl Into<String>, sequence: Sequence, sequential: u32, is_buy: bool) -> Self {
        Self {
            codename: codename.into(),
            sequence,
            sequential,
            is_buy,
            leading_id: None,
            trailing_id: None,
            is_up: false,
            up_state: None,
        }
    }

    pub fn leading_id(&self) -> Option<SignalId> {
        self.leading_id
    }

    pub fn trailing_id(&self) -> Option<SignalId> {
        self.trailing_id
    }

    /// Own up flag, ignoring dependents. Use `SignalGraph::is_up` for the
    /// effective (recursively-qualified) value.
    pub fn own_is_up(&self) -> bool {
        self.is_up
    }

    pub fn up_state(&self) -> Option<&SignalUpState> {
        self.up_state.as_ref()
    }
}

/// Owns the arena of `Signal` nodes and enforces the bidirectional
/// leading/trailing linkage and cascade dynamics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalGraph {
    nodes: Vec<Signal>,
}

impl SignalGraph {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Insert a root signal with no leader (`Only` or `First`).
    pub fn insert_root(
        &mut self,
        codename: impl Into<String>,
        sequence: Sequence,
        is_buy: bool,
    ) -> Result<SignalId, EngineError> {
        if !matches!(sequence, Sequence::Only | Sequence::First) {
            return Err(EngineError::MissingDependentSignalError {
                codename: codename.into(),
                sequence: sequence_label(sequence),
            });
        }
        let id = self.nodes.len();
        self.nodes.push(Signal::new(codename, sequence, 1, is_buy));
        Ok(id)
    }

    /// Insert a dependent signal (`Middle` or `Last`), wiring the
    /// bidirectional leading/trailing linkage. `sequential` is derived as
    /// `leader.sequential + 1`.
    pub fn insert_dependent(
        &mut self,
        codename: impl Into<String>,
        sequence: Sequence,
        is_buy: bool,
        leader: SignalId,
    ) -> Result<SignalId, EngineError> {
        let codename = codename.into();
        if !matches!(sequence, Sequence::Middle | Sequence::Last) {
            return Err(EngineError::SignalNotRequiredException {
                codename,
                sequence: sequence_label(sequence),
            });
        }
        let leader_node = self.nodes.get(leader).ok_or_else(|| EngineError::MissingDependentSignalError {
            codename: codename.clone(),
            sequence: sequence_label(sequence),
        })?;
        if leader_node.is_buy != is_buy {
            return Err(EngineError::DependentSignalConflict {
                leader: leader_node.codename.clone(),
                follower: codename,
            });
        }
        if leader_node.trailing_id.is_some() {
            return Err(EngineError::DependentSignalConflict {
                leader: leader_node.codename.clone(),
                follower: codename,
            });
        }
        let sequential = leader_node.sequential + 1;

        let id = self.nodes.len();
        let mut node = Signal::new(codename, sequence, sequential, is_buy);
        node.leading_id = Some(leader);
        self.nodes.push(node);
        self.nodes[leader].trailing_id = Some(id);
        Ok(id)
    }

    pub fn get(&self, id: SignalId) -> &Signal {
        &self.nodes[id]
    }

    /// Effective `is_up`: own flag AND all leading dependents up,
    /// recursively.
    pub fn is_up(&self, id: SignalId) -> bool {
        let node = &self.nodes[id];
        if !node.is_up {
            return false;
        }
        match node.leading_id {
            Some(leader) => self.is_up(leader),
            None => true,
        }
    }

    /// Record a bar's worth of up state. If this signal has a leader that
    /// isn't up, it cannot latch on its own — immediately calls
    /// `down_signal` on itself (a Last cannot latch without its First
    /// already latched).
    pub fn up_signal(&mut self, id: SignalId, bar: i64, price: f64, volume: u64, indicator_value: f64, at: DateTime<Utc>) {
        self.nodes[id].is_up = true;
        self.nodes[id].up_state = Some(SignalUpState {
            signal_up_bar: bar,
            price,
            volume,
            indicator_value,
            datetime: at,
        });

        if let Some(leader) = self.nodes[id].leading_id {
            if !self.is_up(leader) {
                self.down_signal(id);
            }
        }
    }

    /// Clears this signal and cascades to its trailing dependent, if any.
    pub fn down_signal(&mut self, id: SignalId) {
        self.nodes[id].is_up = false;
        self.nodes[id].up_state = None;
        if let Some(trailing) = self.nodes[id].trailing_id {
            self.down_signal(trailing);
        }
    }
}

fn sequence_label(sequence: Sequence) -> &'static str {
    match sequence {
        Sequence::Only => "only",
        Sequence::First => "first",
        Sequence::Middle => "middle",
        Sequence::Last => "last",
    }
}

/// Fixed-cardinality collection of sibling signals that must all be up (or
/// all down) simultaneously — not a dependency chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSet {
    members: Vec<SignalId>,
    capacity: usize,
}

impl SignalSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            members: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Admit a signal into the set. Beyond the capacity check, a member
    /// must share buy/sell orientation with the existing members, must not
    /// duplicate another member's `sequential`, and the full set of
    /// `sequential` values (existing members plus this one) must form a
    /// consecutive run — a set is a snapshot of one unbroken dependency
    /// chain, not an arbitrary bag of signals.
    pub fn add_signal(&mut self, id: SignalId, graph: &SignalGraph) -> Result<(), EngineError> {
        if self.members.len() >= self.capacity {
            return Err(EngineError::ValueNotPresent {
                class_name: "SignalSet",
                field: "capacity",
                provided: self.members.len().to_string(),
                accepted: vec!["<= capacity"],
            });
        }

        let candidate = graph.get(id);

        if let Some(&existing_id) = self.members.first() {
            let existing = graph.get(existing_id);
            if existing.is_buy != candidate.is_buy {
                return Err(EngineError::DependentSignalConflict {
                    leader: existing.codename.clone(),
                    follower: candidate.codename.clone(),
                });
            }

            if self.members.iter().any(|&m| graph.get(m).sequential == candidate.sequential) {
                return Err(EngineError::DependentSignalConflict {
                    leader: existing.codename.clone(),
                    follower: candidate.codename.clone(),
                });
            }

            let mut sequentials: Vec<u32> = self.members.iter().map(|&m| graph.get(m).sequential).collect();
            sequentials.push(candidate.sequential);
            sequentials.sort_unstable();
            let is_consecutive_run = sequentials.windows(2).all(|w| w[1] == w[0] + 1);
            if !is_consecutive_run {
                return Err(EngineError::DependentSignalConflict {
                    leader: existing.codename.clone(),
                    follower: candidate.codename.clone(),
                });
            }
        }

        self.members.push(id);
        Ok(())
    }

    pub fn remove_signal(&mut self, id: SignalId) {
        self.members.retain(|&m| m != id);
    }

    pub fn is_up(&self, graph: &SignalGraph) -> bool {
        !self.members.is_empty() && self.members.iter().all(|&id| graph.is_up(id))
    }

    pub fn is_down(&self, graph: &SignalGraph) -> bool {
        self.members.iter().all(|&id| !graph.is_up(id))
    }

    pub fn down_signal(&self, graph: &mut SignalGraph) {
        for &id in &self.members {
            graph.down_signal(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_chain_effective_up_requires_leader() {
        let mut graph = SignalGraph::new();
        let first = graph.insert_root("first", Sequence::First, true).unwrap();
        let last = graph.insert_dependent("last", Sequence::Last, true, first).unwrap();

        let now = Utc::now();
        graph.up_signal(last, 1, 100.0, 10, 0.5, now);
        // last can't latch without first already up
        assert!(!graph.is_up(last));

        graph.up_signal(first, 1, 100.0, 10, 0.5, now);
        graph.up_signal(last, 2, 101.0, 10, 0.5, now);
        assert!(graph.is_up(last));

        graph.down_signal(first);
        assert!(!graph.is_up(last));
    }

    #[test]
    fn down_signal_twice_is_idempotent() {
        let mut graph = SignalGraph::new();
        let only = graph.insert_root("solo", Sequence::Only, true).unwrap();
        graph.up_signal(only, 1, 100.0, 10, 0.5, Utc::now());
        graph.down_signal(only);
        graph.down_signal(only);
        assert!(!graph.is_up(only));
    }

    #[test]
    fn mismatched_orientation_rejected() {
        let mut graph = SignalGraph::new();
        let first = graph.insert_root("first", Sequence::First, true).unwrap();
        let err = graph.insert_dependent("last", Sequence::Last, false, first);
        assert!(matches!(err, Err(EngineError::DependentSignalConflict { .. })));
    }

    #[test]
    fn signal_set_up_iff_all_members_up() {
        let mut graph = SignalGraph::new();
        let a = graph.insert_root("a", Sequence::First, true).unwrap();
        let b = graph.insert_dependent("b", Sequence::Last, true, a).unwrap();
        let mut set = SignalSet::new(2);
        set.add_signal(a, &graph).unwrap();
        set.add_signal(b, &graph).unwrap();

        assert!(!set.is_up(&graph));
        graph.up_signal(a, 1, 1.0, 1, 1.0, Utc::now());
        graph.up_signal(b, 1, 1.0, 1, 1.0, Utc::now());
        assert!(set.is_up(&graph));

        set.down_signal(&mut graph);
        assert!(set.is_down(&graph));
    }

    #[test]
    fn signal_set_rejects_mismatched_orientation() {
        let mut graph = SignalGraph::new();
        let buy = graph.insert_root("buy", Sequence::First, true).unwrap();
        let sell = graph.insert_root("sell", Sequence::Only, false).unwrap();
        let mut set = SignalSet::new(2);
        set.add_signal(buy, &graph).unwrap();
        let err = set.add_signal(sell, &graph);
        assert!(matches!(err, Err(EngineError::DependentSignalConflict { .. })));
    }

    #[test]
    fn signal_set_rejects_duplicate_sequential() {
        let mut graph = SignalGraph::new();
        let a = graph.insert_root("a", Sequence::Only, true).unwrap();
        let b = graph.insert_root("b", Sequence::Only, true).unwrap();
        let mut set = SignalSet::new(2);
        set.add_signal(a, &graph).unwrap();
        let err = set.add_signal(b, &graph);
        assert!(matches!(err, Err(EngineError::DependentSignalConflict { .. })));
    }

    #[test]
    fn signal_set_rejects_non_consecutive_run() {
        let mut graph = SignalGraph::new();
        let first = graph.insert_root("first", Sequence::First, true).unwrap();
        let middle = graph.insert_dependent("middle", Sequence::Middle, true, first).unwrap();
        let last = graph.insert_dependent("last", Sequence::Last, true, middle).unwrap();
        let mut set = SignalSet::new(2);
        set.add_signal(first, &graph).unwrap();
        // first.sequential=1, last.sequential=3: admitting last would leave
        // a gap at 2 (middle's sequential), not a consecutive run.
        let err = set.add_signal(last, &graph);
        assert!(matches!(err, Err(EngineError::DependentSignalConflict { .. })));
    }
}
