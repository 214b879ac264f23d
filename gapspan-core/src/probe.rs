//! Probe registry
//!
//! Assigns a stable identity to every contig end (and internal gap flank)
//! that participates in graph search. Probe numbers are handed across the
//! external search boundary as plain integers and must round-trip, so the
//! registry is the single numbering authority: ids are assigned sequentially
//! in registration order (contig order, start before end, gap flanks after).

use crate::types::{ContigId, ContigInfo, SeqPos};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type ProbeId = u32;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("contig '{name}' is too short for probing ({length} < {min} bases)")]
    ContigTooShort {
        name: String,
        length: SeqPos,
        min: SeqPos,
    },

    #[error("contig '{name}' has no clean anchor window near position {near}")]
    NoCleanAnchor { name: String, near: SeqPos },

    #[error("unknown probe id {0}")]
    UnknownProbe(ProbeId),

    #[error("probe {0} is not a contig-end probe and has no mate")]
    NoMate(ProbeId),
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Which end of a contig a probe anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Start,
    End,
}

impl From<Side> for u8 {
    fn from(side: Side) -> Self {
        match side {
            Side::Start => 0,
            Side::End => 1,
        }
    }
}

impl TryFrom<u8> for Side {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Side::Start),
            1 => Ok(Side::End),
            other => Err(other),
        }
    }
}

/// An anchor sequence locating one contig end inside the assembly graph.
///
/// The sequence is oriented so that walking forward from the probe walks
/// outward from the contig (into the region to be bridged). `offset` is the
/// distance between the anchor window and the true boundary it stands in
/// for; it is zero for contig-end probes and may be positive for gap flanks
/// that had to slide inward past ambiguous bases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub number: ProbeId,
    pub contig: ContigId,
    pub side: Side,
    pub sequence: Vec<u8>,
    pub offset: SeqPos,
}

#[derive(Debug, Clone)]
pub struct ProbeRegistry {
    probes: Vec<Probe>,
    ends: BTreeMap<ContigId, (ProbeId, ProbeId)>,
    anchor_len: usize,
    base: ProbeId,
}

impl ProbeRegistry {
    pub fn new(anchor_len: usize) -> Self {
        Self::with_base(anchor_len, 0)
    }

    /// A registry whose numbering starts at `base`. Probe numbers must stay
    /// unique across the genomes of one run, so each genome's registry
    /// continues where the previous one stopped.
    pub fn with_base(anchor_len: usize, base: ProbeId) -> Self {
        Self {
            probes: Vec::new(),
            ends: BTreeMap::new(),
            anchor_len,
            base,
        }
    }

    pub fn anchor_len(&self) -> usize {
        self.anchor_len
    }

    pub fn base(&self) -> ProbeId {
        self.base
    }

    /// The first number a sibling registry may use.
    pub fn next_free(&self) -> ProbeId {
        self.base + self.probes.len() as ProbeId
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Register a probe with an already-extracted anchor sequence and take
    /// the next unused number.
    pub fn register(
        &mut self,
        contig: ContigId,
        side: Side,
        sequence: Vec<u8>,
        offset: SeqPos,
    ) -> ProbeId {
        let number = self.next_free();
        self.probes.push(Probe {
            number,
            contig,
            side,
            sequence,
            offset,
        });
        number
    }

    /// Re-link a start/end pair when rebuilding a registry from the
    /// evidence store.
    pub(crate) fn restore_end_pair(&mut self, contig: ContigId, start: ProbeId, end: ProbeId) {
        self.ends.insert(contig, (start, end));
    }

    pub fn lookup(&self, id: ProbeId) -> ProbeResult<&Probe> {
        id.checked_sub(self.base)
            .and_then(|idx| self.probes.get(idx as usize))
            .ok_or(ProbeError::UnknownProbe(id))
    }

    /// The start/end probe pair of a contig, if its ends were probed.
    pub fn contig_ends(&self, contig: ContigId) -> Option<(ProbeId, ProbeId)> {
        self.ends.get(&contig).copied()
    }

    /// Contigs whose ends were probed, in id order.
    pub fn probed_contigs(&self) -> impl Iterator<Item = ContigId> + '_ {
        self.ends.keys().copied()
    }

    /// The probe at the opposite end of the same contig. Only valid for
    /// contig-end probes.
    pub fn mate(&self, id: ProbeId) -> ProbeResult<&Probe> {
        let probe = self.lookup(id)?;
        let (start, end) = self
            .ends
            .get(&probe.contig)
            .copied()
            .ok_or(ProbeError::NoMate(id))?;
        if id == start {
            self.lookup(end)
        } else if id == end {
            self.lookup(start)
        } else {
            Err(ProbeError::NoMate(id))
        }
    }

    /// Register the start and end probes for a contig.
    ///
    /// The start anchor is the reverse complement of the leading window (so
    /// it walks leftward, off the contig); the end anchor is the trailing
    /// window as-is. Contigs shorter than two anchor windows, or whose outer
    /// windows contain ambiguous bases, are rejected and stay unprobed.
    pub fn register_contig_ends(&mut self, contig: &ContigInfo) -> ProbeResult<(ProbeId, ProbeId)> {
        let min = 2 * self.anchor_len as SeqPos;
        if contig.length() < min {
            return Err(ProbeError::ContigTooShort {
                name: contig.name.clone(),
                length: contig.length(),
                min,
            });
        }

        let head = &contig.sequence[..self.anchor_len];
        let tail = &contig.sequence[contig.sequence.len() - self.anchor_len..];
        if !is_clean(head) {
            return Err(ProbeError::NoCleanAnchor {
                name: contig.name.clone(),
                near: 0,
            });
        }
        if !is_clean(tail) {
            return Err(ProbeError::NoCleanAnchor {
                name: contig.name.clone(),
                near: contig.length(),
            });
        }

        let start = self.register(
            contig.id,
            Side::Start,
            bio::alphabets::dna::revcomp(head),
            0,
        );
        let end = self.register(contig.id, Side::End, tail.to_vec(), 0);
        self.ends.insert(contig.id, (start, end));
        Ok((start, end))
    }

    /// Register the pair of probes flanking an internal gap `[gap_start,
    /// gap_end)`. Each anchor is the nearest clean window on its side of the
    /// gap; the slide distance is recorded as the probe offset so the merge
    /// step can trim the overlap back out.
    pub fn register_gap_flanks(
        &mut self,
        contig: &ContigInfo,
        gap_start: SeqPos,
        gap_end: SeqPos,
    ) -> ProbeResult<(ProbeId, ProbeId)> {
        let (left_window, left_offset) =
            self.find_window_leftward(contig, gap_start)
                .ok_or_else(|| ProbeError::NoCleanAnchor {
                    name: contig.name.clone(),
                    near: gap_start,
                })?;
        let (right_window, right_offset) =
            self.find_window_rightward(contig, gap_end)
                .ok_or_else(|| ProbeError::NoCleanAnchor {
                    name: contig.name.clone(),
                    near: gap_end,
                })?;

        // The left flank walks rightward into the gap; the right flank walks
        // leftward, so its anchor is reverse-complemented.
        let left = self.register(contig.id, Side::End, left_window.to_vec(), left_offset);
        let right = self.register(
            contig.id,
            Side::Start,
            bio::alphabets::dna::revcomp(right_window),
            right_offset,
        );
        Ok((left, right))
    }

    /// Rightmost clean window ending at or before `bound`.
    fn find_window_leftward<'a>(
        &self,
        contig: &'a ContigInfo,
        bound: SeqPos,
    ) -> Option<(&'a [u8], SeqPos)> {
        let mut end = bound as usize;
        while end >= self.anchor_len {
            let window = &contig.sequence[end - self.anchor_len..end];
            if is_clean(window) {
                return Some((window, bound - end as SeqPos));
            }
            end -= 1;
        }
        None
    }

    /// Leftmost clean window starting at or after `bound`.
    fn find_window_rightward<'a>(
        &self,
        contig: &'a ContigInfo,
        bound: SeqPos,
    ) -> Option<(&'a [u8], SeqPos)> {
        let mut start = bound as usize;
        while start + self.anchor_len <= contig.sequence.len() {
            let window = &contig.sequence[start..start + self.anchor_len];
            if is_clean(window) {
                return Some((window, start as SeqPos - bound));
            }
            start += 1;
        }
        None
    }
}

fn is_clean(window: &[u8]) -> bool {
    window
        .iter()
        .all(|&b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
}
