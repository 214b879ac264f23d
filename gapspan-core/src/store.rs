//! Binary evidence store (.gapdb)
//!
//! Persists one genome's probe table and connection survey so a rerun
//! against the same graph can skip the expensive all-pairs search. Layout:
//! - Header   { magic="GAPD", version, anchor_len, build_meta }
//! - Contigs  { names and lengths, for cache validation }
//! - Probes   { registry records in id order, end-pair index }
//! - Connections { zstd-compressed records }
//!
//! The contract is purely a cache: byte-identical graph and contig set in,
//! identical connections out. Probes are written in registry order so a
//! reloaded cache reproduces the exact numbering.

use crate::evidence::{Connection, ConnectionStore};
use crate::probe::{ProbeRegistry, Side};
use crate::types::ContigSet;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Magic bytes for the gapspan evidence format
const GAPDB_MAGIC: &[u8] = b"GAPD";

/// Current binary format version
const GAPDB_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid magic bytes: expected GAPD")]
    InvalidMagic,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("contig set mismatch: {0}")]
    ContigMismatch(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Write the evidence cache for one genome.
pub fn write_evidence<P: AsRef<Path>>(
    path: P,
    contigs: &ContigSet,
    registry: &ProbeRegistry,
    connections: &ConnectionStore,
) -> StoreResult<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    // Header
    w.write_all(GAPDB_MAGIC)?;
    w.write_u32::<LittleEndian>(GAPDB_VERSION)?;
    w.write_u32::<LittleEndian>(registry.anchor_len() as u32)?;
    w.write_u32::<LittleEndian>(registry.base())?;
    write_bytes(&mut w, format!("gapspan-core-{}", crate::VERSION).as_bytes())?;

    // Contigs, for validation on reload
    w.write_u32::<LittleEndian>(contigs.len() as u32)?;
    for contig in &contigs.contigs {
        write_bytes(&mut w, contig.name.as_bytes())?;
        w.write_u64::<LittleEndian>(contig.length())?;
    }

    // Probe records in id order
    w.write_u32::<LittleEndian>(registry.len() as u32)?;
    for probe in registry.probes() {
        w.write_u32::<LittleEndian>(probe.contig)?;
        w.write_u8(u8::from(probe.side))?;
        w.write_u64::<LittleEndian>(probe.offset)?;
        write_bytes(&mut w, &probe.sequence)?;
    }

    // End-pair index
    let pairs: Vec<_> = registry
        .probed_contigs()
        .filter_map(|c| registry.contig_ends(c).map(|(s, e)| (c, s, e)))
        .collect();
    w.write_u32::<LittleEndian>(pairs.len() as u32)?;
    for (contig, start, end) in pairs {
        w.write_u32::<LittleEndian>(contig)?;
        w.write_u32::<LittleEndian>(start)?;
        w.write_u32::<LittleEndian>(end)?;
    }

    // Connections, compressed
    let mut raw = Vec::new();
    raw.write_u32::<LittleEndian>(connections.len() as u32)?;
    for conn in connections.iter() {
        raw.write_u32::<LittleEndian>(conn.probe_a)?;
        raw.write_u32::<LittleEndian>(conn.probe_b)?;
        raw.write_u32::<LittleEndian>(conn.path_count)?;
        match conn.distance {
            Some(d) => {
                raw.write_u8(1)?;
                raw.write_u64::<LittleEndian>(d)?;
            }
            None => {
                raw.write_u8(0)?;
                raw.write_u64::<LittleEndian>(0)?;
            }
        }
    }
    let compressed =
        zstd::encode_all(&raw[..], 3).map_err(|e| StoreError::Compression(e.to_string()))?;
    w.write_u64::<LittleEndian>(compressed.len() as u64)?;
    w.write_all(&compressed)?;

    w.flush()?;
    Ok(())
}

/// Load a cache written by [`write_evidence`], validating it against the
/// current contig set.
pub fn read_evidence<P: AsRef<Path>>(
    path: P,
    contigs: &ContigSet,
) -> StoreResult<(ProbeRegistry, ConnectionStore)> {
    let file = File::open(path)?;
    let mut r = BufReader::new(file);

    // Header
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != GAPDB_MAGIC {
        return Err(StoreError::InvalidMagic);
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != GAPDB_VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }
    let anchor_len = r.read_u32::<LittleEndian>()? as usize;
    let base = r.read_u32::<LittleEndian>()?;
    let _build_meta = read_bytes(&mut r)?;

    // Contig validation
    let contig_count = r.read_u32::<LittleEndian>()? as usize;
    if contig_count != contigs.len() {
        return Err(StoreError::ContigMismatch(format!(
            "cache has {} contigs, input has {}",
            contig_count,
            contigs.len()
        )));
    }
    for i in 0..contig_count {
        let name = String::from_utf8_lossy(&read_bytes(&mut r)?).into_owned();
        let length = r.read_u64::<LittleEndian>()?;
        let current = contigs
            .get_contig(i as u32)
            .ok_or_else(|| StoreError::Corruption(format!("contig index {} out of range", i)))?;
        if current.name != name || current.length() != length {
            return Err(StoreError::ContigMismatch(format!(
                "contig {} is '{}' ({} bp) in cache but '{}' ({} bp) in input",
                i,
                name,
                length,
                current.name,
                current.length()
            )));
        }
    }

    // Probe records
    let mut registry = ProbeRegistry::with_base(anchor_len, base);
    let probe_count = r.read_u32::<LittleEndian>()?;
    for _ in 0..probe_count {
        let contig = r.read_u32::<LittleEndian>()?;
        let side = Side::try_from(r.read_u8()?)
            .map_err(|b| StoreError::Corruption(format!("invalid probe side {}", b)))?;
        let offset = r.read_u64::<LittleEndian>()?;
        let sequence = read_bytes(&mut r)?;
        registry.register(contig, side, sequence, offset);
    }

    // End-pair index
    let pair_count = r.read_u32::<LittleEndian>()?;
    for _ in 0..pair_count {
        let contig = r.read_u32::<LittleEndian>()?;
        let start = r.read_u32::<LittleEndian>()?;
        let end = r.read_u32::<LittleEndian>()?;
        if registry.lookup(start).is_err() || registry.lookup(end).is_err() {
            return Err(StoreError::Corruption(format!(
                "end pair ({}, {}) out of probe range",
                start, end
            )));
        }
        registry.restore_end_pair(contig, start, end);
    }

    // Connections
    let compressed_len = r.read_u64::<LittleEndian>()? as usize;
    let mut compressed = vec![0u8; compressed_len];
    r.read_exact(&mut compressed)?;
    let raw =
        zstd::decode_all(&compressed[..]).map_err(|e| StoreError::Compression(e.to_string()))?;

    let mut raw = &raw[..];
    let mut connections = ConnectionStore::new();
    let conn_count = raw.read_u32::<LittleEndian>()?;
    for _ in 0..conn_count {
        let a = raw.read_u32::<LittleEndian>()?;
        let b = raw.read_u32::<LittleEndian>()?;
        let path_count = raw.read_u32::<LittleEndian>()?;
        let has_distance = raw.read_u8()? != 0;
        let distance = raw.read_u64::<LittleEndian>()?;
        let conn = Connection::new(a, b, path_count, has_distance.then_some(distance))
            .map_err(|e| StoreError::Corruption(e.to_string()))?;
        connections
            .add(conn)
            .map_err(|e| StoreError::Corruption(e.to_string()))?;
    }

    Ok((registry, connections))
}

fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> StoreResult<()> {
    w.write_u32::<LittleEndian>(bytes.len() as u32)?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_bytes<R: Read>(r: &mut R) -> StoreResult<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn fixtures() -> (ContigSet, ProbeRegistry, ConnectionStore) {
        let mut set = ContigSet::new();
        let mut registry = ProbeRegistry::new(4);
        for i in 0..3 {
            let id = set.add_contig(format!("ctg{}", i), b"ACGTACGTACGT".to_vec());
            registry
                .register_contig_ends(set.get_contig(id).unwrap())
                .unwrap();
        }

        let mut connections = ConnectionStore::new();
        connections
            .add(Connection::new(1, 2, 1, Some(77)).unwrap())
            .unwrap();
        connections
            .add(Connection::new(3, 4, 0, None).unwrap())
            .unwrap();

        (set, registry, connections)
    }

    #[test]
    fn test_evidence_roundtrip() {
        let (set, registry, connections) = fixtures();
        let file = NamedTempFile::new().unwrap();

        write_evidence(file.path(), &set, &registry, &connections).unwrap();
        let (reg_back, conns_back) = read_evidence(file.path(), &set).unwrap();

        assert_eq!(reg_back.len(), registry.len());
        assert_eq!(reg_back.anchor_len(), registry.anchor_len());
        for (a, b) in registry.probes().iter().zip(reg_back.probes()) {
            assert_eq!(a, b);
        }
        assert_eq!(reg_back.contig_ends(1), registry.contig_ends(1));
        assert_eq!(reg_back.mate(0).unwrap().number, 1);

        let original: Vec<_> = connections.iter().copied().collect();
        let reloaded: Vec<_> = conns_back.iter().copied().collect();
        assert_eq!(original, reloaded);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"NOPE").unwrap();
        let set = ContigSet::new();
        assert!(matches!(
            read_evidence(file.path(), &set),
            Err(StoreError::InvalidMagic)
        ));
    }

    #[test]
    fn test_contig_mismatch_rejected() {
        let (set, registry, connections) = fixtures();
        let file = NamedTempFile::new().unwrap();
        write_evidence(file.path(), &set, &registry, &connections).unwrap();

        let mut other = ContigSet::new();
        other.add_contig("different".to_string(), b"ACGT".to_vec());
        other.add_contig("ctg1".to_string(), b"ACGTACGTACGT".to_vec());
        other.add_contig("ctg2".to_string(), b"ACGTACGTACGT".to_vec());

        assert!(matches!(
            read_evidence(file.path(), &other),
            Err(StoreError::ContigMismatch(_))
        ));
    }
}
