//! File format I/O for gapspan
//!
//! FASTA input/output for contigs and scaffolds, and a VCF-style table for
//! the variants recorded at ambiguous gap fills. Only the minimal shape
//! needed to drive the engine lives here.

pub mod fasta;
pub mod vcf;

pub use fasta::{FastaError, FastaParser, write_scaffolds};
pub use vcf::write_variants;
