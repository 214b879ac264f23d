//! Gap resolution
//!
//! Turns one [`Gap`] into a [`FillOutcome`] by asking the external search
//! for bridging paths and the external merger for a consensus. Ambiguity is
//! never fatal: no path, too many paths, and detected cycles all degrade to
//! unknown-base filler and a diagnostic, so one bad gap never aborts the
//! run. Only broken invariants (unknown probe, malformed bounds) and
//! external-tool crashes propagate as errors.

use crate::probe::{ProbeError, ProbeId, ProbeRegistry};
use crate::search::{PathSearch, SearchOptions, SequenceMerger};
use crate::types::{ContigId, SeqPos, Variant};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GapfillError {
    #[error("unknown probe id {0}")]
    UnknownProbe(ProbeId),

    #[error("malformed gap bounds: {0}")]
    MalformedGap(String),

    #[error("path search failed: {0}")]
    Search(#[source] anyhow::Error),

    #[error("sequence merge failed: {0}")]
    Merge(#[source] anyhow::Error),
}

impl From<ProbeError> for GapfillError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::UnknownProbe(id) => GapfillError::UnknownProbe(id),
            other => GapfillError::MalformedGap(other.to_string()),
        }
    }
}

/// Where a gap sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapKind {
    /// A pre-existing run of unknown bases inside one contig, to be replaced
    /// in place.
    Internal {
        contig: ContigId,
        start: SeqPos,
        end: SeqPos,
    },
    /// An inferred junction between two consecutive contigs of a chain.
    Junction,
}

/// A region requiring sequence resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub left_probe: ProbeId,
    pub right_probe: ProbeId,
    /// Anchor offsets from the true gap boundary, handed to the merger as
    /// trim amounts.
    pub left_offset: SeqPos,
    pub right_offset: SeqPos,
    /// Observed N-run length for internal gaps; unbounded for junctions.
    pub nominal_length: Option<SeqPos>,
    pub kind: GapKind,
}

impl Gap {
    pub fn internal(
        registry: &ProbeRegistry,
        left_probe: ProbeId,
        right_probe: ProbeId,
        contig: ContigId,
        start: SeqPos,
        end: SeqPos,
    ) -> Result<Self, GapfillError> {
        if start >= end {
            return Err(GapfillError::MalformedGap(format!(
                "internal gap [{}, {}) on contig {}",
                start, end, contig
            )));
        }
        Ok(Self {
            left_probe,
            right_probe,
            left_offset: registry.lookup(left_probe)?.offset,
            right_offset: registry.lookup(right_probe)?.offset,
            nominal_length: Some(end - start),
            kind: GapKind::Internal { contig, start, end },
        })
    }

    pub fn junction(
        registry: &ProbeRegistry,
        left_probe: ProbeId,
        right_probe: ProbeId,
    ) -> Result<Self, GapfillError> {
        Ok(Self {
            left_probe,
            right_probe,
            left_offset: registry.lookup(left_probe)?.offset,
            right_offset: registry.lookup(right_probe)?.offset,
            nominal_length: None,
            kind: GapKind::Junction,
        })
    }
}

/// What the resolver decided for a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillDisposition {
    Filled,
    NoPath,
    TooAmbiguous,
    CycleAbstained,
}

/// The outcome of resolving one gap.
///
/// When `filled` is false the gap is emitted as `filler_len` unknown bases;
/// `sequence` is only present for resolved gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub path_count: u32,
    pub sequence: Option<Vec<u8>>,
    pub variants: Vec<Variant>,
    pub filled: bool,
    pub filler_len: SeqPos,
    pub disposition: FillDisposition,
}

impl FillOutcome {
    fn unfilled(path_count: u32, filler_len: SeqPos, disposition: FillDisposition) -> Self {
        Self {
            path_count,
            sequence: None,
            variants: Vec::new(),
            filled: false,
            filler_len,
            disposition,
        }
    }

    fn filled(path_count: u32, sequence: Vec<u8>, variants: Vec<Variant>) -> Self {
        Self {
            path_count,
            sequence: Some(sequence),
            variants,
            filled: true,
            filler_len: 0,
            disposition: FillDisposition::Filled,
        }
    }

    /// The bases the assembler inserts for this gap.
    pub fn emitted(&self) -> Vec<u8> {
        match &self.sequence {
            Some(seq) => seq.clone(),
            None => vec![b'N'; self.filler_len as usize],
        }
    }
}

/// Policy for gaps with more than one candidate path (but not more than the
/// ambiguity ceiling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbiguityPolicy {
    /// Merge all candidates into a consensus and record a variant at every
    /// disagreeing position.
    RecordVariants,
    /// Collapse to the single highest-coverage candidate, ties broken by
    /// discovery order; no variants recorded.
    MaxCoverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillParams {
    /// Hard ceiling on explored graph distance; exceeding it means "no
    /// paths found", not an error.
    pub leash: SeqPos,
    /// Gaps with more candidates than this fall back to filler.
    pub max_ambiguous_paths: u32,
    pub policy: AmbiguityPolicy,
    /// Filler length for gaps of unknown nominal length.
    pub filler_len: SeqPos,
    pub search: SearchOptions,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            leash: 10_000,
            max_ambiguous_paths: 8,
            policy: AmbiguityPolicy::RecordVariants,
            filler_len: 100,
            search: SearchOptions::default(),
        }
    }
}

pub struct GapResolver<'a, S, M> {
    search: &'a S,
    merger: &'a M,
    registry: &'a ProbeRegistry,
    params: FillParams,
}

impl<'a, S: PathSearch, M: SequenceMerger> GapResolver<'a, S, M> {
    pub fn new(search: &'a S, merger: &'a M, registry: &'a ProbeRegistry, params: FillParams) -> Self {
        Self {
            search,
            merger,
            registry,
            params,
        }
    }

    pub fn resolve(&self, gap: &Gap) -> Result<FillOutcome, GapfillError> {
        let left = self.registry.lookup(gap.left_probe)?;
        let right = self.registry.lookup(gap.right_probe)?;
        let filler_len = gap.nominal_length.unwrap_or(self.params.filler_len);

        let outcome = self
            .search
            .find_paths(left, right, self.params.leash, &self.params.search)
            .map_err(GapfillError::Search)?;
        let path_count = outcome.paths.len() as u32;

        if outcome.circular_detected {
            log::warn!(
                "cycle detected between probes {} and {}; abstaining from gap fill",
                gap.left_probe,
                gap.right_probe
            );
            return Ok(FillOutcome::unfilled(
                path_count,
                filler_len,
                FillDisposition::CycleAbstained,
            ));
        }

        if path_count == 0 {
            return Ok(FillOutcome::unfilled(0, filler_len, FillDisposition::NoPath));
        }

        if path_count > self.params.max_ambiguous_paths {
            log::info!(
                "{} candidate paths between probes {} and {} exceed ceiling {}; leaving filler",
                path_count,
                gap.left_probe,
                gap.right_probe,
                self.params.max_ambiguous_paths
            );
            return Ok(FillOutcome::unfilled(
                path_count,
                filler_len,
                FillDisposition::TooAmbiguous,
            ));
        }

        let chosen = if path_count == 1 || self.params.policy == AmbiguityPolicy::RecordVariants {
            &outcome.paths[..]
        } else {
            // Highest coverage wins; the strict comparison keeps the
            // earliest-discovered path on ties.
            let mut best = 0;
            for (i, path) in outcome.paths.iter().enumerate().skip(1) {
                if path.coverage > outcome.paths[best].coverage {
                    best = i;
                }
            }
            std::slice::from_ref(&outcome.paths[best])
        };

        let merged = self
            .merger
            .merge(
                &left.sequence,
                chosen,
                &right.sequence,
                gap.left_offset,
                gap.right_offset,
            )
            .map_err(GapfillError::Merge)?;

        Ok(FillOutcome::filled(
            path_count,
            merged.sequence,
            merged.variants,
        ))
    }

    /// Resolve independent gaps in parallel. Results come back in gap
    /// order; the caller must not start assembling a chain until this has
    /// returned (the join barrier).
    pub fn resolve_all(&self, gaps: &[Gap]) -> Result<Vec<FillOutcome>, GapfillError>
    where
        S: Sync,
        M: Sync,
    {
        gaps.par_iter().map(|gap| self.resolve(gap)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Side;
    use crate::search::{CandidatePath, MergeOutcome, SearchOutcome};
    use anyhow::Result;

    struct StubSearch {
        paths: Vec<CandidatePath>,
        circular: bool,
    }

    impl StubSearch {
        fn with_paths(seqs: &[(&[u8], f64)]) -> Self {
            Self {
                paths: seqs
                    .iter()
                    .map(|(s, c)| CandidatePath {
                        sequence: s.to_vec(),
                        coverage: *c,
                    })
                    .collect(),
                circular: false,
            }
        }
    }

    impl PathSearch for StubSearch {
        fn find_paths(
            &self,
            _left: &crate::probe::Probe,
            _right: &crate::probe::Probe,
            _leash: SeqPos,
            _options: &SearchOptions,
        ) -> Result<SearchOutcome> {
            Ok(SearchOutcome {
                paths: self.paths.clone(),
                circular_detected: self.circular,
            })
        }

        fn name(&self) -> &'static str {
            "stub"
        }

        fn version(&self) -> String {
            "0".to_string()
        }
    }

    /// Returns the first chosen path as the merged sequence and one variant
    /// per extra path, so tests can observe what the resolver handed over.
    struct StubMerger;

    impl SequenceMerger for StubMerger {
        fn merge(
            &self,
            _left: &[u8],
            paths: &[CandidatePath],
            _right: &[u8],
            _trim_left: SeqPos,
            _trim_right: SeqPos,
        ) -> Result<MergeOutcome> {
            let variants = paths
                .iter()
                .skip(1)
                .enumerate()
                .map(|(i, p)| {
                    Variant::new(i as SeqPos, b"A".to_vec(), vec![p.sequence[..1].to_vec()])
                })
                .collect();
            Ok(MergeOutcome {
                sequence: paths[0].sequence.clone(),
                variants,
            })
        }
    }

    fn registry() -> ProbeRegistry {
        let mut reg = ProbeRegistry::new(4);
        reg.register(0, Side::End, b"ACGT".to_vec(), 0);
        reg.register(1, Side::Start, b"TTAA".to_vec(), 0);
        reg
    }

    fn junction(reg: &ProbeRegistry) -> Gap {
        Gap::junction(reg, 0, 1).unwrap()
    }

    #[test]
    fn test_no_path_falls_back_to_filler() {
        let reg = registry();
        let search = StubSearch::with_paths(&[]);
        let resolver = GapResolver::new(&search, &StubMerger, &reg, FillParams::default());

        let fill = resolver.resolve(&junction(&reg)).unwrap();
        assert!(!fill.filled);
        assert_eq!(fill.path_count, 0);
        assert_eq!(fill.disposition, FillDisposition::NoPath);
        assert_eq!(fill.emitted().len(), 100);
        assert!(fill.emitted().iter().all(|&b| b == b'N'));
    }

    #[test]
    fn test_nominal_length_sets_filler_length() {
        let reg = registry();
        let search = StubSearch::with_paths(&[]);
        let resolver = GapResolver::new(&search, &StubMerger, &reg, FillParams::default());

        let mut gap = junction(&reg);
        gap.nominal_length = Some(17);
        let fill = resolver.resolve(&gap).unwrap();
        assert_eq!(fill.emitted().len(), 17);
    }

    #[test]
    fn test_single_path_merges_without_variants() {
        let reg = registry();
        let search = StubSearch::with_paths(&[(b"GATTACA", 5.0)]);
        let resolver = GapResolver::new(&search, &StubMerger, &reg, FillParams::default());

        let fill = resolver.resolve(&junction(&reg)).unwrap();
        assert!(fill.filled);
        assert_eq!(fill.path_count, 1);
        assert_eq!(fill.sequence, Some(b"GATTACA".to_vec()));
        assert!(fill.variants.is_empty());
    }

    #[test]
    fn test_over_ceiling_matches_no_path_outcome() {
        let reg = registry();
        let search = StubSearch::with_paths(&[
            (b"AAAA", 1.0),
            (b"CCCC", 1.0),
            (b"GGGG", 1.0),
        ]);
        let params = FillParams {
            max_ambiguous_paths: 2,
            ..FillParams::default()
        };
        let resolver = GapResolver::new(&search, &StubMerger, &reg, params);

        let fill = resolver.resolve(&junction(&reg)).unwrap();
        assert!(!fill.filled);
        assert_eq!(fill.path_count, 3);
        assert_eq!(fill.disposition, FillDisposition::TooAmbiguous);
        assert_eq!(fill.emitted().len(), 100);
    }

    #[test]
    fn test_record_variants_policy_merges_all() {
        let reg = registry();
        let search = StubSearch::with_paths(&[(b"AAAA", 1.0), (b"CCCC", 9.0)]);
        let resolver = GapResolver::new(&search, &StubMerger, &reg, FillParams::default());

        let fill = resolver.resolve(&junction(&reg)).unwrap();
        assert!(fill.filled);
        assert_eq!(fill.path_count, 2);
        // StubMerger saw both paths: consensus from the first, one variant
        // from the second.
        assert_eq!(fill.sequence, Some(b"AAAA".to_vec()));
        assert_eq!(fill.variants.len(), 1);
    }

    #[test]
    fn test_max_coverage_policy_collapses_to_best_path() {
        let reg = registry();
        let search = StubSearch::with_paths(&[(b"AAAA", 1.0), (b"CCCC", 9.0), (b"GGGG", 9.0)]);
        let params = FillParams {
            policy: AmbiguityPolicy::MaxCoverage,
            ..FillParams::default()
        };
        let resolver = GapResolver::new(&search, &StubMerger, &reg, params);

        let fill = resolver.resolve(&junction(&reg)).unwrap();
        assert!(fill.filled);
        // Coverage tie between CCCC and GGGG resolves to the earlier one.
        assert_eq!(fill.sequence, Some(b"CCCC".to_vec()));
        assert!(fill.variants.is_empty());
    }

    #[test]
    fn test_cycle_abstains() {
        let reg = registry();
        let mut search = StubSearch::with_paths(&[(b"AAAA", 1.0)]);
        search.circular = true;
        let resolver = GapResolver::new(&search, &StubMerger, &reg, FillParams::default());

        let fill = resolver.resolve(&junction(&reg)).unwrap();
        assert!(!fill.filled);
        assert_eq!(fill.disposition, FillDisposition::CycleAbstained);
    }

    #[test]
    fn test_unknown_probe_is_fatal() {
        let reg = registry();
        let search = StubSearch::with_paths(&[]);
        let resolver = GapResolver::new(&search, &StubMerger, &reg, FillParams::default());

        let mut gap = junction(&reg);
        gap.right_probe = 99;
        assert!(matches!(
            resolver.resolve(&gap),
            Err(GapfillError::UnknownProbe(99))
        ));
    }

    #[test]
    fn test_resolve_all_preserves_gap_order() {
        let reg = registry();
        let search = StubSearch::with_paths(&[(b"GATTACA", 5.0)]);
        let resolver = GapResolver::new(&search, &StubMerger, &reg, FillParams::default());

        let gaps = vec![junction(&reg); 8];
        let fills = resolver.resolve_all(&gaps).unwrap();
        assert_eq!(fills.len(), 8);
        assert!(fills.iter().all(|f| f.filled));
    }
}
