//! External path search and merge seams
//!
//! The engine never walks the de Bruijn graph itself. Path enumeration
//! between two probes and per-base consensus across candidate paths are
//! consumed through the [`PathSearch`] and [`SequenceMerger`] traits; any
//! implementation (in-process library, subprocess, RPC) that honors the
//! contracts below can stand in, and tests substitute mocks.
//!
//! [`GraphToolkit`] is the stock implementation: it drives the external
//! `dbgtk` binary over a tab-separated protocol.

use crate::probe::Probe;
use crate::types::{SeqPos, Variant};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

/// Knobs forwarded to the external search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Stop enumerating candidates beyond this many paths.
    pub max_paths: u32,
    /// Node-count ceiling; exceeding it means "no paths found", same as the
    /// leash, never an error.
    pub max_nodes: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_paths: 16,
            max_nodes: 100_000,
        }
    }
}

/// One candidate bridging path. The sequence spans anchor to anchor,
/// inclusive of both anchor windows; the core hands it back to the merger
/// without inspecting it further.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePath {
    pub sequence: Vec<u8>,
    pub coverage: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Candidates in discovery order.
    pub paths: Vec<CandidatePath>,
    /// The traversal ran into a cycle; no finite bridging sequence can be
    /// bounded.
    pub circular_detected: bool,
}

impl SearchOutcome {
    /// Length of the shortest candidate, used as the connection distance.
    pub fn shortest(&self) -> Option<SeqPos> {
        self.paths.iter().map(|p| p.sequence.len() as SeqPos).min()
    }
}

/// Merged consensus across candidate paths.
///
/// The sequence is the gap interior only: the merger strips both anchor
/// windows and then `trim_left`/`trim_right` further bases (the anchor
/// offsets), so the result can be inserted between the emitted flanks
/// without duplication. Variant positions are local to the returned
/// sequence; positions where no consensus exists carry a `-` filler byte.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub sequence: Vec<u8>,
    pub variants: Vec<Variant>,
}

pub trait PathSearch {
    /// Enumerate candidate bridging paths between two probes, exploring at
    /// most `leash` bases of graph distance.
    fn find_paths(
        &self,
        left: &Probe,
        right: &Probe,
        leash: SeqPos,
        options: &SearchOptions,
    ) -> Result<SearchOutcome>;

    fn name(&self) -> &'static str;
    fn version(&self) -> String;
}

pub trait SequenceMerger {
    fn merge(
        &self,
        left_flank: &[u8],
        paths: &[CandidatePath],
        right_flank: &[u8],
        trim_left: SeqPos,
        trim_right: SeqPos,
    ) -> Result<MergeOutcome>;
}

/// Subprocess-backed implementation of both seams, driving the `dbgtk`
/// companion binary against a prebuilt graph.
pub struct GraphToolkit {
    binary: PathBuf,
    graph: PathBuf,
}

impl GraphToolkit {
    pub const DEFAULT_BINARY: &'static str = "dbgtk";

    pub fn new(graph: PathBuf, binary: Option<PathBuf>) -> Result<Self> {
        let binary = match binary {
            Some(path) => path,
            None => which::which(Self::DEFAULT_BINARY)
                .with_context(|| format!("{} not found in PATH", Self::DEFAULT_BINARY))?,
        };
        Ok(Self { binary, graph })
    }

    fn write_probe_fasta(label: &str, sequence: &[u8]) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new().context("create probe temp file")?;
        writeln!(file, ">{}", label)?;
        file.write_all(sequence)?;
        writeln!(file)?;
        file.flush()?;
        Ok(file)
    }

    fn run(&self, cmd: &mut Command) -> Result<String> {
        log::debug!("Running {:?}", cmd);
        let output = cmd.output().context("spawn dbgtk")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("dbgtk failed: {}", stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PathSearch for GraphToolkit {
    fn find_paths(
        &self,
        left: &Probe,
        right: &Probe,
        leash: SeqPos,
        options: &SearchOptions,
    ) -> Result<SearchOutcome> {
        let left_fa = Self::write_probe_fasta(&format!("probe{}", left.number), &left.sequence)?;
        let right_fa = Self::write_probe_fasta(&format!("probe{}", right.number), &right.sequence)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("paths")
            .arg("--graph")
            .arg(&self.graph)
            .arg("--leash")
            .arg(leash.to_string())
            .arg("--max-paths")
            .arg(options.max_paths.to_string())
            .arg("--max-nodes")
            .arg(options.max_nodes.to_string())
            .arg(left_fa.path())
            .arg(right_fa.path());

        let stdout = self.run(&mut cmd)?;
        parse_paths_output(&stdout)
    }

    fn name(&self) -> &'static str {
        "dbgtk"
    }

    fn version(&self) -> String {
        let output = Command::new(&self.binary).arg("--version").output();
        match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout).trim().to_string(),
            Err(_) => "unknown".to_string(),
        }
    }
}

impl SequenceMerger for GraphToolkit {
    fn merge(
        &self,
        left_flank: &[u8],
        paths: &[CandidatePath],
        right_flank: &[u8],
        trim_left: SeqPos,
        trim_right: SeqPos,
    ) -> Result<MergeOutcome> {
        let left_fa = Self::write_probe_fasta("left_flank", left_flank)?;
        let right_fa = Self::write_probe_fasta("right_flank", right_flank)?;

        let mut paths_fa = NamedTempFile::new().context("create paths temp file")?;
        for (i, path) in paths.iter().enumerate() {
            writeln!(paths_fa, ">path{} cov={}", i, path.coverage)?;
            paths_fa.write_all(&path.sequence)?;
            writeln!(paths_fa)?;
        }
        paths_fa.flush()?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("merge")
            .arg("--graph")
            .arg(&self.graph)
            .arg("--trim-left")
            .arg(trim_left.to_string())
            .arg("--trim-right")
            .arg(trim_right.to_string())
            .arg("--left")
            .arg(left_fa.path())
            .arg("--right")
            .arg(right_fa.path())
            .arg(paths_fa.path());

        let stdout = self.run(&mut cmd)?;
        parse_merge_output(&stdout)
    }
}

/// Parse `paths` output: one `P <coverage> <sequence>` line per candidate,
/// optionally a final `C` line when the traversal detected a cycle.
fn parse_paths_output(stdout: &str) -> Result<SearchOutcome> {
    let mut outcome = SearchOutcome::default();
    for line in stdout.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        match fields.next() {
            Some("P") => {
                let coverage = fields
                    .next()
                    .ok_or_else(|| anyhow!("path line missing coverage: {}", line))?
                    .parse::<f64>()
                    .with_context(|| format!("bad coverage in: {}", line))?;
                let sequence = fields
                    .next()
                    .ok_or_else(|| anyhow!("path line missing sequence: {}", line))?
                    .as_bytes()
                    .to_vec();
                outcome.paths.push(CandidatePath { sequence, coverage });
            }
            Some("C") => outcome.circular_detected = true,
            Some(tag) => return Err(anyhow!("unexpected paths output tag '{}'", tag)),
            None => unreachable!(),
        }
    }
    Ok(outcome)
}

/// Parse `merge` output: one `S <sequence>` line, then zero or more
/// `V <pos> <ref> <alt,alt,...>` lines.
fn parse_merge_output(stdout: &str) -> Result<MergeOutcome> {
    let mut sequence: Option<Vec<u8>> = None;
    let mut variants = Vec::new();

    for line in stdout.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        match fields.next() {
            Some("S") => {
                let seq = fields
                    .next()
                    .ok_or_else(|| anyhow!("merge line missing sequence"))?;
                sequence = Some(seq.as_bytes().to_vec());
            }
            Some("V") => {
                let position = fields
                    .next()
                    .ok_or_else(|| anyhow!("variant line missing position"))?
                    .parse::<SeqPos>()
                    .with_context(|| format!("bad variant position in: {}", line))?;
                let reference = fields
                    .next()
                    .ok_or_else(|| anyhow!("variant line missing reference"))?
                    .as_bytes()
                    .to_vec();
                let alternates = fields
                    .next()
                    .ok_or_else(|| anyhow!("variant line missing alternates"))?
                    .split(',')
                    .map(|a| a.as_bytes().to_vec())
                    .collect();
                variants.push(Variant::new(position, reference, alternates));
            }
            Some(tag) => return Err(anyhow!("unexpected merge output tag '{}'", tag)),
            None => unreachable!(),
        }
    }

    let sequence = sequence.ok_or_else(|| anyhow!("merge output had no sequence line"))?;
    Ok(MergeOutcome { sequence, variants })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paths_output() {
        let out = parse_paths_output("P\t12.5\tACGTACGT\nP\t3.0\tACGAACGT\n").unwrap();
        assert_eq!(out.paths.len(), 2);
        assert_eq!(out.paths[0].sequence, b"ACGTACGT".to_vec());
        assert_eq!(out.paths[1].coverage, 3.0);
        assert!(!out.circular_detected);
        assert_eq!(out.shortest(), Some(8));
    }

    #[test]
    fn test_parse_paths_cycle_flag() {
        let out = parse_paths_output("C\n").unwrap();
        assert!(out.circular_detected);
        assert!(out.paths.is_empty());
        assert_eq!(out.shortest(), None);
    }

    #[test]
    fn test_parse_paths_rejects_garbage() {
        assert!(parse_paths_output("X\tfoo\n").is_err());
        assert!(parse_paths_output("P\tnot_a_number\tACGT\n").is_err());
    }

    #[test]
    fn test_parse_merge_output() {
        let out = parse_merge_output("S\tACGTACGT\nV\t3\tT\tG,C\n").unwrap();
        assert_eq!(out.sequence, b"ACGTACGT".to_vec());
        assert_eq!(out.variants.len(), 1);
        assert_eq!(out.variants[0].position, 3);
        assert_eq!(out.variants[0].alternates.len(), 2);
    }

    #[test]
    fn test_parse_merge_requires_sequence() {
        assert!(parse_merge_output("V\t3\tT\tG\n").is_err());
    }
}
