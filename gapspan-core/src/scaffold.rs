//! Scaffold interpretation
//!
//! Turns the connection evidence into a consistent partition of contigs
//! into ordered, oriented chains. The core conflict rule: a connection is
//! acted on only when each of its two probes has exactly one bridged
//! candidate — ambiguity at either end voids the connection, even if the
//! other end is unambiguous. Everything that cannot be resolved degrades to
//! singleton chains with a diagnostic; the only fatal condition is evidence
//! referencing a probe the registry does not know.

use crate::evidence::ConnectionStore;
use crate::gapfill::Gap;
use crate::probe::{ProbeError, ProbeId, ProbeRegistry, Side};
use crate::types::{ContigId, Strand};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("evidence references unknown probe {0}")]
    UnknownProbe(ProbeId),

    #[error("evidence references non-end probe {0}")]
    NotAnEndProbe(ProbeId),

    #[error("contig {0} has no registered end probes")]
    UnprobedContig(ContigId),

    #[error("probe registry error: {0}")]
    Registry(String),
}

pub type ScaffoldResult<T> = Result<T, ScaffoldError>;

fn integrity(err: ProbeError) -> ScaffoldError {
    match err {
        ProbeError::UnknownProbe(id) => ScaffoldError::UnknownProbe(id),
        ProbeError::NoMate(id) => ScaffoldError::NotAnEndProbe(id),
        other => ScaffoldError::Registry(other.to_string()),
    }
}

/// One contig of a chain with its orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub contig: ContigId,
    pub strand: Strand,
}

/// An ordered, oriented run of contigs representing one output scaffold.
///
/// `junctions[i]` is the gap between `links[i]` and `links[i + 1]`; a
/// circular chain carries one extra closing junction after the last link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldChain {
    pub id: u32,
    pub links: Vec<ChainLink>,
    pub junctions: Vec<Gap>,
    pub circular: bool,
}

impl ScaffoldChain {
    fn singleton(id: u32, contig: ContigId) -> Self {
        Self {
            id,
            links: vec![ChainLink {
                contig,
                strand: Strand::Forward,
            }],
            junctions: Vec::new(),
            circular: false,
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.links.len() == 1 && !self.circular
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterDiagnostics {
    /// Bridged connections that passed the doubly-single rule.
    pub accepted_connections: usize,
    /// Bridged connections voided by ambiguity at either end.
    pub conflicted_connections: usize,
    /// Components whose walk did not resolve to a single traversal; their
    /// contigs were emitted as singletons.
    pub unresolved_components: usize,
}

#[derive(Debug, Clone)]
pub struct Interpretation {
    /// Every contig appears in exactly one chain, exactly once (the closing
    /// link of a circular chain is implicit).
    pub chains: Vec<ScaffoldChain>,
    /// End probes that appear in no accepted connection, in probe order.
    pub unconnected: Vec<ProbeId>,
    pub diagnostics: InterpreterDiagnostics,
}

/// Partition `contig_count` contigs into chains using the connection
/// evidence.
pub fn interpret(
    contig_count: usize,
    store: &ConnectionStore,
    registry: &ProbeRegistry,
) -> ScaffoldResult<Interpretation> {
    // Candidate pool per probe over bridged connections only, validating
    // every referenced probe up front.
    let mut pools: BTreeMap<ProbeId, usize> = BTreeMap::new();
    for conn in store.bridged() {
        for probe in [conn.probe_a, conn.probe_b] {
            registry.lookup(probe).map_err(integrity)?;
            registry.mate(probe).map_err(integrity)?;
            *pools.entry(probe).or_insert(0) += 1;
        }
    }

    // The doubly-single filter: keep a connection only when it is the sole
    // bridged candidate at both of its ends.
    let mut join: BTreeMap<ProbeId, ProbeId> = BTreeMap::new();
    let mut diagnostics = InterpreterDiagnostics::default();
    for conn in store.bridged() {
        if pools[&conn.probe_a] == 1 && pools[&conn.probe_b] == 1 {
            join.insert(conn.probe_a, conn.probe_b);
            join.insert(conn.probe_b, conn.probe_a);
            diagnostics.accepted_connections += 1;
        } else {
            diagnostics.conflicted_connections += 1;
        }
    }

    let mut chains = Vec::new();
    let mut visited = vec![false; contig_count];

    for contig in 0..contig_count as ContigId {
        if visited[contig as usize] {
            continue;
        }
        if registry.contig_ends(contig).is_none() {
            // Unprobed contigs were never searched; they pass through as
            // singletons.
            visited[contig as usize] = true;
            chains.push(ScaffoldChain::singleton(chains.len() as u32, contig));
            continue;
        }

        let component = collect_component(contig, &join, registry)?;
        let walk = walk_component(&component, &join, registry)?;

        match walk {
            Some((links, junctions, circular)) if links.len() == component.len() => {
                for link in &links {
                    visited[link.contig as usize] = true;
                }
                chains.push(ScaffoldChain {
                    id: chains.len() as u32,
                    links,
                    junctions,
                    circular,
                });
            }
            _ => {
                // Never guess: the whole component degrades to singletons.
                log::warn!(
                    "component of {} contigs did not resolve to one traversal; \
                     leaving them unscaffolded",
                    component.len()
                );
                diagnostics.unresolved_components += 1;
                for &c in &component {
                    visited[c as usize] = true;
                    chains.push(ScaffoldChain::singleton(chains.len() as u32, c));
                }
            }
        }
    }

    // End probes untouched by any accepted connection.
    let mut unconnected = Vec::new();
    for contig in registry.probed_contigs() {
        let (start, end) = registry
            .contig_ends(contig)
            .ok_or(ScaffoldError::UnprobedContig(contig))?;
        for probe in [start, end] {
            if !join.contains_key(&probe) {
                unconnected.push(probe);
            }
        }
    }
    unconnected.sort_unstable();

    Ok(Interpretation {
        chains,
        unconnected,
        diagnostics,
    })
}

/// All contigs reachable from `seed` through accepted joins, sorted.
fn collect_component(
    seed: ContigId,
    join: &BTreeMap<ProbeId, ProbeId>,
    registry: &ProbeRegistry,
) -> ScaffoldResult<Vec<ContigId>> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![seed];
    while let Some(contig) = stack.pop() {
        if !seen.insert(contig) {
            continue;
        }
        let (start, end) = registry
            .contig_ends(contig)
            .ok_or(ScaffoldError::UnprobedContig(contig))?;
        for probe in [start, end] {
            if let Some(&partner) = join.get(&probe) {
                stack.push(registry.lookup(partner).map_err(integrity)?.contig);
            }
        }
    }
    Ok(seen.into_iter().collect())
}

type Walk = (Vec<ChainLink>, Vec<Gap>, bool);

/// Walk a component into a single alternating traversal of join edges and
/// same-contig edges. Returns `None` when the walk cannot cover the
/// component in one pass.
fn walk_component(
    component: &[ContigId],
    join: &BTreeMap<ProbeId, ProbeId>,
    registry: &ProbeRegistry,
) -> ScaffoldResult<Option<Walk>> {
    // A free end (probe without a join partner) is the walk entry; a
    // component without one is circular and is entered at its lowest
    // contig's start probe.
    let mut terminals = Vec::new();
    for &contig in component {
        let (start, end) = registry
            .contig_ends(contig)
            .ok_or(ScaffoldError::UnprobedContig(contig))?;
        for probe in [start, end] {
            if !join.contains_key(&probe) {
                terminals.push(probe);
            }
        }
    }
    terminals.sort_unstable();

    let circular = terminals.is_empty();
    let entry = if circular {
        registry
            .contig_ends(component[0])
            .ok_or(ScaffoldError::UnprobedContig(component[0]))?
            .0
    } else {
        terminals[0]
    };

    let mut links = Vec::new();
    let mut junctions = Vec::new();
    let mut cursor = entry;

    loop {
        if links.len() > component.len() {
            return Ok(None);
        }
        let probe = registry.lookup(cursor).map_err(integrity)?;
        links.push(ChainLink {
            contig: probe.contig,
            strand: match probe.side {
                Side::Start => Strand::Forward,
                Side::End => Strand::Reverse,
            },
        });

        let exit = registry.mate(cursor).map_err(integrity)?.number;
        match join.get(&exit) {
            Some(&next) if circular && next == entry => {
                junctions.push(junction(registry, exit, next)?);
                break;
            }
            Some(&next) => {
                junctions.push(junction(registry, exit, next)?);
                cursor = next;
            }
            None if circular => return Ok(None),
            None => break,
        }
    }

    Ok(Some((links, junctions, circular)))
}

fn junction(registry: &ProbeRegistry, left: ProbeId, right: ProbeId) -> ScaffoldResult<Gap> {
    Gap::junction(registry, left, right).map_err(|_| ScaffoldError::UnknownProbe(left))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Connection;
    use crate::types::{ContigInfo, ContigSet};

    fn setup(n: usize) -> (ContigSet, ProbeRegistry) {
        let mut set = ContigSet::new();
        let mut reg = ProbeRegistry::new(4);
        for i in 0..n {
            let id = set.add_contig(format!("ctg{}", i), b"ACGTACGTACGTACGT".to_vec());
            let contig = set.get_contig(id).unwrap();
            reg.register_contig_ends(contig).unwrap();
        }
        (set, reg)
    }

    fn store(pairs: &[(ProbeId, ProbeId)]) -> ConnectionStore {
        let mut s = ConnectionStore::new();
        for &(a, b) in pairs {
            s.add(Connection::new(a, b, 1, Some(50)).unwrap()).unwrap();
        }
        s
    }

    fn contig_order(chain: &ScaffoldChain) -> Vec<ContigId> {
        chain.links.iter().map(|l| l.contig).collect()
    }

    // Probe numbering per contig i: start = 2i, end = 2i + 1.

    #[test]
    fn test_empty_evidence_yields_singletons() {
        let (set, reg) = setup(3);
        let interp = interpret(set.len(), &ConnectionStore::new(), &reg).unwrap();

        assert_eq!(interp.chains.len(), 3);
        assert!(interp.chains.iter().all(|c| c.is_singleton()));
        assert_eq!(interp.unconnected.len(), 6);
    }

    #[test]
    fn test_every_contig_appears_exactly_once() {
        let (set, reg) = setup(4);
        // ctg0.end - ctg1.start, ctg2 and ctg3 loose.
        let interp = interpret(set.len(), &store(&[(1, 2)]), &reg).unwrap();

        let mut all: Vec<ContigId> = interp.chains.iter().flat_map(|c| contig_order(c)).collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_simple_two_contig_chain() {
        let (set, reg) = setup(2);
        let interp = interpret(set.len(), &store(&[(1, 2)]), &reg).unwrap();

        assert_eq!(interp.chains.len(), 1);
        let chain = &interp.chains[0];
        assert!(!chain.circular);
        assert_eq!(contig_order(chain), vec![0, 1]);
        assert_eq!(chain.links[0].strand, Strand::Forward);
        assert_eq!(chain.links[1].strand, Strand::Forward);
        assert_eq!(chain.junctions.len(), 1);
        assert_eq!(chain.junctions[0].left_probe, 1);
        assert_eq!(chain.junctions[0].right_probe, 2);
        assert_eq!(interp.diagnostics.accepted_connections, 1);
    }

    #[test]
    fn test_end_to_end_join_reverses_second_contig() {
        let (set, reg) = setup(2);
        // ctg0.end - ctg1.end: ctg1 is traversed reverse.
        let interp = interpret(set.len(), &store(&[(1, 3)]), &reg).unwrap();

        let chain = &interp.chains[0];
        assert_eq!(contig_order(chain), vec![0, 1]);
        assert_eq!(chain.links[0].strand, Strand::Forward);
        assert_eq!(chain.links[1].strand, Strand::Reverse);
    }

    #[test]
    fn test_three_way_branch_is_fully_excluded() {
        let (set, reg) = setup(4);
        // ctg0.end competes for ctg1.start, ctg2.start, ctg3.start.
        let interp = interpret(set.len(), &store(&[(1, 2), (1, 4), (1, 6)]), &reg).unwrap();

        assert_eq!(interp.chains.len(), 4);
        assert!(interp.chains.iter().all(|c| c.is_singleton()));
        assert_eq!(interp.diagnostics.accepted_connections, 0);
        assert_eq!(interp.diagnostics.conflicted_connections, 3);
    }

    #[test]
    fn test_circular_component_detected() {
        let (set, reg) = setup(3);
        // 0.end-1.start, 1.end-2.start, 2.end-0.start: a full cycle.
        let interp = interpret(set.len(), &store(&[(1, 2), (3, 4), (5, 0)]), &reg).unwrap();

        assert_eq!(interp.chains.len(), 1);
        let chain = &interp.chains[0];
        assert!(chain.circular);
        assert_eq!(contig_order(chain), vec![0, 1, 2]);
        assert_eq!(chain.junctions.len(), 3);
        assert!(interp.unconnected.is_empty());
    }

    #[test]
    fn test_broken_cycle_becomes_linear() {
        let (set, reg) = setup(3);
        let interp = interpret(set.len(), &store(&[(1, 2), (3, 4)]), &reg).unwrap();

        assert_eq!(interp.chains.len(), 1);
        let chain = &interp.chains[0];
        assert!(!chain.circular);
        assert_eq!(contig_order(chain), vec![0, 1, 2]);
        assert_eq!(chain.junctions.len(), 2);
    }

    #[test]
    fn test_self_circular_contig() {
        let (set, reg) = setup(1);
        let interp = interpret(set.len(), &store(&[(0, 1)]), &reg).unwrap();

        assert_eq!(interp.chains.len(), 1);
        let chain = &interp.chains[0];
        assert!(chain.circular);
        assert_eq!(contig_order(chain), vec![0]);
        assert_eq!(chain.junctions.len(), 1);
    }

    #[test]
    fn test_unbridged_connections_are_ignored() {
        let (set, reg) = setup(2);
        let mut s = ConnectionStore::new();
        s.add(Connection::new(1, 2, 0, None).unwrap()).unwrap();
        let interp = interpret(set.len(), &s, &reg).unwrap();

        assert_eq!(interp.chains.len(), 2);
        assert!(interp.chains.iter().all(|c| c.is_singleton()));
    }

    #[test]
    fn test_unknown_probe_is_fatal() {
        let (set, reg) = setup(2);
        let err = interpret(set.len(), &store(&[(1, 99)]), &reg).unwrap_err();
        assert!(matches!(err, ScaffoldError::UnknownProbe(99)));
    }

    #[test]
    fn test_deterministic_across_runs() {
        let (set, reg) = setup(6);
        let s = store(&[(1, 2), (3, 4), (7, 9), (11, 8)]);

        let a = interpret(set.len(), &s, &reg).unwrap();
        let b = interpret(set.len(), &s, &reg).unwrap();
        assert_eq!(a.chains, b.chains);
        assert_eq!(a.unconnected, b.unconnected);
    }
}
