//! FASTA/FASTQ sequence file parser and scaffold writer
//!
//! Fast parsing of FASTA and FASTQ files using the needletail library,
//! with gzip support, plus the FASTA emitter for finished scaffolds.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Result;
use flate2::read::GzDecoder;
use thiserror::Error;

use crate::assemble::AssembledScaffold;
use crate::types::ContigSet;
use needletail::{parse_fastx_file, parse_fastx_reader};

/// Output line width for emitted sequences
pub const LINE_WIDTH: usize = 80;

#[derive(Debug, Error)]
pub enum FastaError {
    #[error("Invalid sequence format: {0}")]
    InvalidFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Empty file or no sequences found")]
    EmptyFile,
}

/// FASTA/FASTQ parser for reading contig sets
pub struct FastaParser;

impl FastaParser {
    /// Parse a FASTA/FASTQ file into a contig set. Ids follow record
    /// order, which is what makes probe numbering reproducible.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ContigSet> {
        let path_str = path.as_ref().to_string_lossy();

        if path_str.ends_with(".gz") {
            Self::parse_gzipped_file(path)
        } else {
            Self::parse_uncompressed_file(path)
        }
    }

    fn parse_uncompressed_file<P: AsRef<Path>>(path: P) -> Result<ContigSet> {
        let mut contigs = ContigSet::new();
        let mut reader = parse_fastx_file(&path).map_err(|e| FastaError::Parse(e.to_string()))?;

        while let Some(record) = reader.next() {
            let record = record.map_err(|e| FastaError::Parse(e.to_string()))?;
            let id = String::from_utf8_lossy(record.id()).to_string();
            let name = id.split_whitespace().next().unwrap_or(&id).to_string();
            contigs.add_contig(name, record.seq().to_vec());
        }

        if contigs.is_empty() {
            Err(FastaError::EmptyFile.into())
        } else {
            Ok(contigs)
        }
    }

    fn parse_gzipped_file<P: AsRef<Path>>(path: P) -> Result<ContigSet> {
        let file = File::open(&path)?;
        let decoder = GzDecoder::new(file);
        let buf_reader = BufReader::new(decoder);

        Self::parse_reader(buf_reader)
    }

    /// Parse FASTA/FASTQ data from any readable source
    pub fn parse_reader<R: std::io::Read + std::marker::Send>(reader: R) -> Result<ContigSet> {
        let mut contigs = ContigSet::new();
        let mut fastx_reader =
            parse_fastx_reader(reader).map_err(|e| FastaError::Parse(e.to_string()))?;

        while let Some(record) = fastx_reader.next() {
            let record = record.map_err(|e| FastaError::Parse(e.to_string()))?;
            let id = String::from_utf8_lossy(record.id()).to_string();
            let name = id.split_whitespace().next().unwrap_or(&id).to_string();
            contigs.add_contig(name, record.seq().to_vec());
        }

        if contigs.is_empty() {
            Err(FastaError::EmptyFile.into())
        } else {
            Ok(contigs)
        }
    }
}

/// Write finished scaffolds as FASTA. Each header carries the chain name,
/// the circular/linear tag, and the constituent contig names in order.
pub fn write_scaffolds<P: AsRef<Path>>(path: P, scaffolds: &[AssembledScaffold]) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    for scaffold in scaffolds {
        write_scaffold(&mut w, scaffold)?;
    }
    w.flush()?;
    Ok(())
}

fn write_scaffold<W: Write>(w: &mut W, scaffold: &AssembledScaffold) -> Result<()> {
    let topology = if scaffold.circular { "circular" } else { "linear" };
    writeln!(
        w,
        ">{} {} length={} n_contigs={} contigs={}",
        scaffold.name,
        topology,
        scaffold.sequence.len(),
        scaffold.contigs.len(),
        scaffold.contigs.join(",")
    )?;
    for chunk in scaffold.sequence.chunks(LINE_WIDTH) {
        w.write_all(chunk)?;
        writeln!(w)?;
    }
    Ok(())
}
