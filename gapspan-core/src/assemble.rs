//! Scaffold assembly and emission
//!
//! Walks an interpreted chain end to end: patches pre-existing gaps inside
//! each contig, re-orients contigs as the chain requires, inserts junction
//! fills between consecutive contigs, and keeps every variant's position
//! correct through each transformation so the emitted list is in final
//! output coordinates. Merge filler bytes (`-`, "no consensus") are
//! stripped from the emitted sequence; variants recorded there survive.

use crate::gapfill::{FillOutcome, Gap, GapKind};
use crate::scaffold::ScaffoldChain;
use crate::types::{ContigId, ContigSet, SeqPos, Strand, Variant};
use std::collections::BTreeMap;
use thiserror::Error;

/// Byte the merge primitive emits where candidates reach no consensus.
pub const MERGE_FILLER: u8 = b'-';

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("chain references unknown contig {0}")]
    UnknownContig(ContigId),

    #[error("internal gap [{start}, {end}) does not fit contig {contig}")]
    BadGapBounds {
        contig: ContigId,
        start: SeqPos,
        end: SeqPos,
    },

    #[error("chain {chain} has {fills} junction fills for {expected} junctions")]
    JunctionMismatch {
        chain: u32,
        fills: usize,
        expected: usize,
    },
}

pub type AssembleResult<T> = Result<T, AssembleError>;

/// One finished output scaffold.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledScaffold {
    pub name: String,
    pub circular: bool,
    /// Constituent contig names in emission order.
    pub contigs: Vec<String>,
    pub sequence: Vec<u8>,
    /// Variants in final output coordinates, sorted by position.
    pub variants: Vec<Variant>,
    /// The chain was flipped to read forward (most links were reverse).
    pub emitted_reverse: bool,
}

pub struct Assembler<'a> {
    contigs: &'a ContigSet,
}

impl<'a> Assembler<'a> {
    pub fn new(contigs: &'a ContigSet) -> Self {
        Self { contigs }
    }

    /// Emit one chain. `internal` maps a contig to its resolved internal
    /// gaps in left-to-right order; `junction_fills` lines up with
    /// `chain.junctions`.
    pub fn assemble(
        &self,
        chain: &ScaffoldChain,
        name: &str,
        internal: &BTreeMap<ContigId, Vec<(Gap, FillOutcome)>>,
        junction_fills: &[FillOutcome],
    ) -> AssembleResult<AssembledScaffold> {
        if junction_fills.len() != chain.junctions.len() {
            return Err(AssembleError::JunctionMismatch {
                chain: chain.id,
                fills: junction_fills.len(),
                expected: chain.junctions.len(),
            });
        }

        let mut sequence: Vec<u8> = Vec::new();
        let mut variants: Vec<Variant> = Vec::new();
        let mut names = Vec::with_capacity(chain.links.len());

        for (i, link) in chain.links.iter().enumerate() {
            let contig = self
                .contigs
                .get_contig(link.contig)
                .ok_or(AssembleError::UnknownContig(link.contig))?;
            names.push(contig.name.clone());

            let (mut part, mut part_vars) =
                self.patch_contig(link.contig, internal.get(&link.contig))?;
            if link.strand == Strand::Reverse {
                let len = part.len() as SeqPos;
                part = bio::alphabets::dna::revcomp(&part);
                part_vars = part_vars.into_iter().map(|v| v.mirrored(len)).collect();
            }

            let offset = sequence.len() as SeqPos;
            variants.extend(part_vars.into_iter().map(|v| v.shifted(offset)));
            sequence.extend_from_slice(&part);

            // Junction i sits after link i; the closing junction of a
            // circular chain lands after the last link.
            if i < junction_fills.len() {
                let fill = &junction_fills[i];
                let offset = sequence.len() as SeqPos;
                variants.extend(fill.variants.iter().cloned().map(|v| v.shifted(offset)));
                sequence.extend_from_slice(&fill.emitted());
            }
        }

        let (mut sequence, mut variants) = strip_merge_filler(sequence, variants);

        let reverse_links = chain
            .links
            .iter()
            .filter(|l| l.strand == Strand::Reverse)
            .count();
        let emitted_reverse = reverse_links * 2 > chain.links.len();
        if emitted_reverse {
            let len = sequence.len() as SeqPos;
            sequence = bio::alphabets::dna::revcomp(&sequence);
            variants = variants.into_iter().map(|v| v.mirrored(len)).collect();
        }

        variants.sort_by_key(|v| v.position);

        Ok(AssembledScaffold {
            name: name.to_string(),
            circular: chain.circular,
            contigs: names,
            sequence,
            variants,
            emitted_reverse,
        })
    }

    /// The contig sequence with each internal gap replaced by its fill, in
    /// contig-forward coordinates.
    fn patch_contig(
        &self,
        id: ContigId,
        gaps: Option<&Vec<(Gap, FillOutcome)>>,
    ) -> AssembleResult<(Vec<u8>, Vec<Variant>)> {
        let contig = self
            .contigs
            .get_contig(id)
            .ok_or(AssembleError::UnknownContig(id))?;
        let seq = &contig.sequence;

        let Some(gaps) = gaps else {
            return Ok((seq.clone(), Vec::new()));
        };

        let mut out = Vec::with_capacity(seq.len());
        let mut variants = Vec::new();
        let mut cursor: usize = 0;

        for (gap, fill) in gaps {
            let GapKind::Internal { start, end, .. } = gap.kind else {
                continue;
            };
            let (start, end) = (start as usize, end as usize);
            if start < cursor || end > seq.len() || start >= end {
                return Err(AssembleError::BadGapBounds {
                    contig: id,
                    start: start as SeqPos,
                    end: end as SeqPos,
                });
            }

            out.extend_from_slice(&seq[cursor..start]);
            let offset = out.len() as SeqPos;
            variants.extend(fill.variants.iter().cloned().map(|v| v.shifted(offset)));
            out.extend_from_slice(&fill.emitted());
            cursor = end;
        }
        out.extend_from_slice(&seq[cursor..]);

        Ok((out, variants))
    }
}

/// Remove merge filler bytes, sliding later variant positions left by the
/// number of bytes removed before them. A variant recorded at a stripped
/// position keeps pointing at the boundary it described.
fn strip_merge_filler(sequence: Vec<u8>, variants: Vec<Variant>) -> (Vec<u8>, Vec<Variant>) {
    if !sequence.contains(&MERGE_FILLER) {
        return (sequence, variants);
    }

    let mut removed_before = Vec::with_capacity(sequence.len());
    let mut stripped = Vec::with_capacity(sequence.len());
    let mut removed: SeqPos = 0;
    for &base in &sequence {
        removed_before.push(removed);
        if base == MERGE_FILLER {
            removed += 1;
        } else {
            stripped.push(base);
        }
    }

    let variants = variants
        .into_iter()
        .map(|mut v| {
            let at = v.position as usize;
            v.position -= removed_before.get(at).copied().unwrap_or(removed);
            v
        })
        .collect();

    (stripped, variants)
}
