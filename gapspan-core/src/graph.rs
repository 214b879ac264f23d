//! Assembly graph construction
//!
//! Building the de Bruijn graph from reads is delegated to the external
//! `dbgtk` binary and treated as an expensive, cacheable step: the builder
//! writes a JSON manifest next to the graph file and silently reuses the
//! graph when the manifest's parameter fingerprint matches. The core treats
//! the handle purely as a cache key; no engine logic depends on the graph
//! file format.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyParams {
    /// k-mer size of the de Bruijn graph.
    pub k: u32,
    /// Minimum k-mer coverage kept in the graph.
    pub min_coverage: u32,
    /// Read files the graph is built from, in order.
    pub reads: Vec<PathBuf>,
}

impl AssemblyParams {
    pub fn new(k: u32, min_coverage: u32, reads: Vec<PathBuf>) -> Self {
        Self {
            k,
            min_coverage,
            reads,
        }
    }

    /// Canonical parameter fingerprint used as the cache key.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).expect("assembly params serialize")
    }
}

/// A built graph on disk, keyed by the parameters that produced it.
#[derive(Debug, Clone)]
pub struct GraphHandle {
    pub path: PathBuf,
    pub params: AssemblyParams,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphManifest {
    app_version: String,
    fingerprint: String,
}

pub struct GraphBuilder {
    binary: PathBuf,
}

impl GraphBuilder {
    pub fn new(binary: Option<PathBuf>) -> Result<Self> {
        let binary = match binary {
            Some(path) => path,
            None => which::which(crate::search::GraphToolkit::DEFAULT_BINARY)
                .context("dbgtk not found in PATH")?,
        };
        Ok(Self { binary })
    }

    /// Build the graph at `out`, or reuse a cached one whose manifest
    /// matches `params`.
    pub fn build(&self, params: &AssemblyParams, out: &Path) -> Result<GraphHandle> {
        let manifest_path = manifest_path(out);

        if let Some(manifest) = read_manifest(&manifest_path) {
            if manifest.fingerprint == params.fingerprint() && out.exists() {
                log::info!("Reusing cached graph {}", out.display());
                return Ok(GraphHandle {
                    path: out.to_path_buf(),
                    params: params.clone(),
                });
            }
            log::info!("Cached graph {} is stale, rebuilding", out.display());
        }

        if params.reads.is_empty() {
            return Err(anyhow!("no read files to build a graph from"));
        }

        let mut cmd = Command::new(&self.binary);
        cmd.arg("build")
            .arg("-k")
            .arg(params.k.to_string())
            .arg("--min-coverage")
            .arg(params.min_coverage.to_string())
            .arg("-o")
            .arg(out);
        for reads in &params.reads {
            cmd.arg(reads);
        }

        log::info!("Building assembly graph: {:?}", cmd);
        let output = cmd.output().context("spawn dbgtk build")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("graph build failed: {}", stderr.trim()));
        }

        let manifest = GraphManifest {
            app_version: crate::VERSION.to_string(),
            fingerprint: params.fingerprint(),
        };
        fs::write(
            &manifest_path,
            serde_json::to_string_pretty(&manifest).context("serialize graph manifest")?,
        )
        .with_context(|| format!("write {}", manifest_path.display()))?;

        Ok(GraphHandle {
            path: out.to_path_buf(),
            params: params.clone(),
        })
    }
}

fn manifest_path(graph: &Path) -> PathBuf {
    let mut name = graph.file_name().unwrap_or_default().to_os_string();
    name.push(".json");
    graph.with_file_name(name)
}

fn read_manifest(path: &Path) -> Option<GraphManifest> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_tracks_parameters() {
        let a = AssemblyParams::new(31, 2, vec![PathBuf::from("reads.fq")]);
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.k = 47;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_manifest_path_is_sibling() {
        let p = manifest_path(Path::new("/tmp/run/graph.dbg"));
        assert_eq!(p, Path::new("/tmp/run/graph.dbg.json"));
    }

    #[test]
    fn test_stale_manifest_detected() {
        let dir = tempfile::tempdir().unwrap();
        let graph = dir.path().join("graph.dbg");
        let params = AssemblyParams::new(31, 2, vec![PathBuf::from("reads.fq")]);

        let manifest = GraphManifest {
            app_version: crate::VERSION.to_string(),
            fingerprint: "something else".to_string(),
        };
        fs::write(
            manifest_path(&graph),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        let loaded = read_manifest(&manifest_path(&graph)).unwrap();
        assert_ne!(loaded.fingerprint, params.fingerprint());
    }
}
