//! Connection evidence store
//!
//! Holds the raw pairwise observations produced by the external graph
//! search: for each tested probe pair, how many candidate bridging paths
//! were found and, when any were, the shortest candidate length. Connections
//! are recorded once per genome-building pass and never mutated; the
//! scaffold interpreter decides which of them to act on.

use crate::probe::ProbeId;
use crate::types::SeqPos;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("connection joins a probe to itself: {0}")]
    SelfConnection(ProbeId),

    #[error("duplicate connection between probes {0} and {1}")]
    Duplicate(ProbeId, ProbeId),
}

pub type EvidenceResult<T> = Result<T, EvidenceError>;

/// An observed relationship between two probes. The pair is unordered and
/// normalized so `probe_a < probe_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub probe_a: ProbeId,
    pub probe_b: ProbeId,
    pub path_count: u32,
    pub distance: Option<SeqPos>,
}

impl Connection {
    pub fn new(
        a: ProbeId,
        b: ProbeId,
        path_count: u32,
        distance: Option<SeqPos>,
    ) -> EvidenceResult<Self> {
        if a == b {
            return Err(EvidenceError::SelfConnection(a));
        }
        let (probe_a, probe_b) = if a < b { (a, b) } else { (b, a) };
        Ok(Self {
            probe_a,
            probe_b,
            path_count,
            distance,
        })
    }

    pub fn bridged(&self) -> bool {
        self.path_count > 0
    }

    pub fn other(&self, probe: ProbeId) -> ProbeId {
        if probe == self.probe_a {
            self.probe_b
        } else {
            self.probe_a
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionStore {
    connections: BTreeMap<(ProbeId, ProbeId), Connection>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, connection: Connection) -> EvidenceResult<()> {
        let key = (connection.probe_a, connection.probe_b);
        if self.connections.contains_key(&key) {
            return Err(EvidenceError::Duplicate(key.0, key.1));
        }
        self.connections.insert(key, connection);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// All connections, ordered by normalized probe pair.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Connections with at least one candidate path, in pair order.
    pub fn bridged(&self) -> impl Iterator<Item = &Connection> {
        self.iter().filter(|c| c.bridged())
    }

    /// The candidate pool of one probe: every bridged connection touching
    /// it, in pair order.
    pub fn candidates_of(&self, probe: ProbeId) -> Vec<&Connection> {
        self.bridged()
            .filter(|c| c.probe_a == probe || c.probe_b == probe)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_normalization() {
        let c = Connection::new(5, 2, 1, Some(40)).unwrap();
        assert_eq!((c.probe_a, c.probe_b), (2, 5));
        assert_eq!(c.other(2), 5);
        assert_eq!(c.other(5), 2);
    }

    #[test]
    fn test_self_connection_rejected() {
        assert!(matches!(
            Connection::new(3, 3, 1, None),
            Err(EvidenceError::SelfConnection(3))
        ));
    }

    #[test]
    fn test_duplicate_rejected_regardless_of_order() {
        let mut store = ConnectionStore::new();
        store.add(Connection::new(0, 1, 1, None).unwrap()).unwrap();
        let err = store.add(Connection::new(1, 0, 2, None).unwrap());
        assert!(matches!(err, Err(EvidenceError::Duplicate(0, 1))));
    }

    #[test]
    fn test_candidate_pool_ignores_unbridged() {
        let mut store = ConnectionStore::new();
        store.add(Connection::new(0, 2, 1, None).unwrap()).unwrap();
        store.add(Connection::new(0, 4, 0, None).unwrap()).unwrap();
        store.add(Connection::new(0, 6, 3, None).unwrap()).unwrap();

        let pool: Vec<_> = store
            .candidates_of(0)
            .into_iter()
            .map(|c| c.other(0))
            .collect();
        assert_eq!(pool, vec![2, 6]);
        assert!(store.candidates_of(4).is_empty());
    }

    #[test]
    fn test_iteration_is_sorted() {
        let mut store = ConnectionStore::new();
        store.add(Connection::new(9, 4, 1, None).unwrap()).unwrap();
        store.add(Connection::new(1, 0, 1, None).unwrap()).unwrap();
        store.add(Connection::new(3, 2, 1, None).unwrap()).unwrap();

        let pairs: Vec<_> = store.iter().map(|c| (c.probe_a, c.probe_b)).collect();
        assert_eq!(pairs, vec![(0, 1), (2, 3), (4, 9)]);
    }
}
