use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type ContigId = u32;
pub type SeqPos = u64;

/// One input contig with its sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContigInfo {
    pub id: ContigId,
    pub name: String,
    pub sequence: Vec<u8>,
}

impl ContigInfo {
    pub fn length(&self) -> SeqPos {
        self.sequence.len() as SeqPos
    }

    /// Half-open runs of unknown bases (N/n) of at least `min_len` bases,
    /// in left-to-right order.
    pub fn unknown_runs(&self, min_len: SeqPos) -> Vec<(SeqPos, SeqPos)> {
        let mut runs = Vec::new();
        let mut start: Option<usize> = None;

        for (i, &base) in self.sequence.iter().enumerate() {
            let unknown = base == b'N' || base == b'n';
            match (unknown, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    if (i - s) as SeqPos >= min_len {
                        runs.push((s as SeqPos, i as SeqPos));
                    }
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            let end = self.sequence.len();
            if (end - s) as SeqPos >= min_len {
                runs.push((s as SeqPos, end as SeqPos));
            }
        }
        runs
    }
}

/// The set of contigs for one genome, with stable sequential ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContigSet {
    pub contigs: Vec<ContigInfo>,
    pub total_length: SeqPos,
    pub contig_map: HashMap<String, ContigId>,
}

impl ContigSet {
    pub fn new() -> Self {
        Self {
            contigs: Vec::new(),
            total_length: 0,
            contig_map: HashMap::new(),
        }
    }

    pub fn add_contig(&mut self, name: String, sequence: Vec<u8>) -> ContigId {
        let id = self.contigs.len() as ContigId;
        self.total_length += sequence.len() as SeqPos;

        self.contigs.push(ContigInfo {
            id,
            name: name.clone(),
            sequence,
        });

        self.contig_map.insert(name, id);
        id
    }

    pub fn get_contig(&self, id: ContigId) -> Option<&ContigInfo> {
        self.contigs.get(id as usize)
    }

    pub fn get_contig_by_name(&self, name: &str) -> Option<&ContigInfo> {
        self.contig_map.get(name).and_then(|&id| self.get_contig(id))
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }
}

impl Default for ContigSet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn flipped(self) -> Self {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
        }
    }
}

impl From<bool> for Strand {
    fn from(forward: bool) -> Self {
        if forward {
            Strand::Forward
        } else {
            Strand::Reverse
        }
    }
}

impl From<Strand> for char {
    fn from(strand: Strand) -> Self {
        match strand {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

/// One position of disagreement between candidate bridging sequences.
///
/// `position` is 0-based. Inside a [`crate::search::MergeOutcome`] it is local
/// to the merged sequence; after assembly it is in final output coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub position: SeqPos,
    pub reference: Vec<u8>,
    pub alternates: Vec<Vec<u8>>,
}

impl Variant {
    pub fn new(position: SeqPos, reference: Vec<u8>, alternates: Vec<Vec<u8>>) -> Self {
        Self {
            position,
            reference,
            alternates,
        }
    }

    /// Shift into an enclosing coordinate system.
    pub fn shifted(mut self, offset: SeqPos) -> Self {
        self.position += offset;
        self
    }

    /// Mirror into the reverse-complemented emission of a sequence of
    /// `len` bases: the allele that started at `position` now ends at
    /// `len - position`, and all alleles are reverse-complemented.
    pub fn mirrored(self, len: SeqPos) -> Self {
        let ref_len = self.reference.len() as SeqPos;
        Self {
            position: len - self.position - ref_len,
            reference: bio::alphabets::dna::revcomp(&self.reference),
            alternates: self
                .alternates
                .into_iter()
                .map(|alt| bio::alphabets::dna::revcomp(&alt))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contig(seq: &[u8]) -> ContigInfo {
        ContigInfo {
            id: 0,
            name: "ctg".to_string(),
            sequence: seq.to_vec(),
        }
    }

    #[test]
    fn test_unknown_runs() {
        let c = contig(b"ACGTNNNNACGTNNACGT");
        assert_eq!(c.unknown_runs(3), vec![(4, 8)]);
        assert_eq!(c.unknown_runs(2), vec![(4, 8), (12, 14)]);
    }

    #[test]
    fn test_unknown_run_at_edge() {
        let c = contig(b"NNNACGT");
        assert_eq!(c.unknown_runs(3), vec![(0, 3)]);
        let c = contig(b"ACGTNNN");
        assert_eq!(c.unknown_runs(3), vec![(4, 7)]);
    }

    #[test]
    fn test_contig_set_ids_follow_insertion_order() {
        let mut set = ContigSet::new();
        let a = set.add_contig("a".to_string(), b"ACGT".to_vec());
        let b = set.add_contig("b".to_string(), b"TTTT".to_vec());
        assert_eq!((a, b), (0, 1));
        assert_eq!(set.total_length, 8);
        assert_eq!(set.get_contig_by_name("b").unwrap().id, 1);
    }

    #[test]
    fn test_variant_mirroring() {
        // ACGTT, SNV C->G at position 1; revcomp is AACGT, so the
        // complemented allele G->C lands at position 3.
        let v = Variant::new(1, b"C".to_vec(), vec![b"G".to_vec()]);
        let m = v.mirrored(5);
        assert_eq!(m.position, 3);
        assert_eq!(m.reference, b"G".to_vec());
        assert_eq!(m.alternates, vec![b"C".to_vec()]);
    }
}
