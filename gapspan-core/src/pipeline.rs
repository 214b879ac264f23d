//! Per-genome orchestration
//!
//! Drives one genome through the full engine: register probes, survey
//! connections (or reload a cached survey), interpret scaffolds, resolve
//! every gap, assemble chains, and account for it all in a run report. All
//! gap resolutions for a genome complete before any chain is assembled.
//! When several genomes run back to back, a fatal failure in one is
//! reported and the rest continue.

use crate::assemble::{AssembledScaffold, Assembler};
use crate::evidence::{Connection, ConnectionStore};
use crate::gapfill::{FillOutcome, FillParams, Gap, GapKind, GapResolver};
use crate::graph::{AssemblyParams, GraphBuilder};
use crate::io::FastaParser;
use crate::probe::{ProbeId, ProbeRegistry};
use crate::report::RunReport;
use crate::scaffold::interpret;
use crate::search::{GraphToolkit, PathSearch, SequenceMerger};
use crate::store;
use crate::types::{ContigId, ContigSet, SeqPos};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Anchor window length for probes.
    pub anchor_len: usize,
    /// Minimum N-run length treated as an internal gap.
    pub min_gap_len: SeqPos,
    pub fill: FillParams,
    /// When set, the connection survey is loaded from this cache if it
    /// exists and written to it otherwise.
    pub evidence_cache: Option<PathBuf>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            anchor_len: 100,
            min_gap_len: 10,
            fill: FillParams::default(),
            evidence_cache: None,
        }
    }
}

/// One genome's finished products.
#[derive(Debug)]
pub struct GenomeOutcome {
    pub scaffolds: Vec<AssembledScaffold>,
    pub report: RunReport,
    /// First probe number free for the next genome of the run.
    pub next_probe: ProbeId,
}

/// Run the engine for one genome against an already-available search and
/// merge implementation.
pub fn run_genome<S, M>(
    name: &str,
    contigs: &ContigSet,
    search: &S,
    merger: &M,
    params: &PipelineParams,
    probe_base: ProbeId,
) -> Result<GenomeOutcome>
where
    S: PathSearch + Sync,
    M: SequenceMerger + Sync,
{
    let mut report = RunReport::new(name);
    report.contigs_total = contigs.len();

    // Contig-end probes first, in contig order, so end-probe numbering
    // never depends on how many internal gaps a contig has.
    let mut registry = ProbeRegistry::with_base(params.anchor_len, probe_base);
    for contig in &contigs.contigs {
        if let Err(err) = registry.register_contig_ends(contig) {
            log::warn!("skipping contig ends: {}", err);
        }
    }

    // Internal gap flanks next, per contig, left to right.
    let mut internal_gaps = Vec::new();
    for contig in &contigs.contigs {
        for (start, end) in contig.unknown_runs(params.min_gap_len) {
            match registry.register_gap_flanks(contig, start, end) {
                Ok((left, right)) => {
                    internal_gaps.push(Gap::internal(
                        &registry, left, right, contig.id, start, end,
                    )?);
                }
                Err(err) => log::warn!(
                    "leaving gap [{}, {}) of '{}' unanchored: {}",
                    start,
                    end,
                    contig.name,
                    err
                ),
            }
        }
    }
    report.probes_total = registry.len();

    let connections = load_or_survey(contigs, &registry, search, params)?;
    log::info!(
        "{}: {} probes, {} connections surveyed",
        name,
        registry.len(),
        connections.len()
    );

    let interpretation = interpret(contigs.len(), &connections, &registry)?;
    report.record_interpretation(&interpretation);

    // Resolve every gap of the genome in one parallel pass; assembly only
    // starts after this barrier.
    let mut gaps = internal_gaps.clone();
    for chain in &interpretation.chains {
        gaps.extend(chain.junctions.iter().cloned());
    }
    let resolver = GapResolver::new(search, merger, &registry, params.fill.clone());
    let fills = resolver.resolve_all(&gaps)?;
    for fill in &fills {
        report.record_fill(fill);
    }

    let mut fills = fills.into_iter();
    let mut internal: BTreeMap<ContigId, Vec<(Gap, FillOutcome)>> = BTreeMap::new();
    for (gap, fill) in internal_gaps.into_iter().zip(fills.by_ref()) {
        if let GapKind::Internal { contig, .. } = gap.kind {
            internal.entry(contig).or_default().push((gap, fill));
        }
    }

    let assembler = Assembler::new(contigs);
    let mut scaffolds = Vec::with_capacity(interpretation.chains.len());
    for chain in &interpretation.chains {
        let junction_fills: Vec<FillOutcome> =
            fills.by_ref().take(chain.junctions.len()).collect();
        let name = format!("scaffold{}", chain.id + 1);
        scaffolds.push(assembler.assemble(chain, &name, &internal, &junction_fills)?);
    }

    Ok(GenomeOutcome {
        scaffolds,
        report,
        next_probe: registry.next_free(),
    })
}

/// Reload the connection survey from the cache when possible, otherwise run
/// the all-pairs search over contig-end probes and cache the result.
fn load_or_survey<S: PathSearch>(
    contigs: &ContigSet,
    registry: &ProbeRegistry,
    search: &S,
    params: &PipelineParams,
) -> Result<ConnectionStore> {
    if let Some(cache) = &params.evidence_cache {
        if cache.exists() {
            let (cached_registry, connections) = store::read_evidence(cache, contigs)
                .with_context(|| format!("load evidence cache {}", cache.display()))?;
            if cached_registry.len() != registry.len() || cached_registry.base() != registry.base()
            {
                anyhow::bail!(
                    "evidence cache {} was built with a different probe table",
                    cache.display()
                );
            }
            log::info!("reusing evidence cache {}", cache.display());
            return Ok(connections);
        }
    }

    let connections = survey(registry, search, params)?;

    if let Some(cache) = &params.evidence_cache {
        store::write_evidence(cache, contigs, registry, &connections)
            .with_context(|| format!("write evidence cache {}", cache.display()))?;
        log::info!("wrote evidence cache {}", cache.display());
    }

    Ok(connections)
}

/// Test every pair of contig-end probes, including a contig's own pair (a
/// start-to-end bridge means the contig closes on itself).
fn survey<S: PathSearch>(
    registry: &ProbeRegistry,
    search: &S,
    params: &PipelineParams,
) -> Result<ConnectionStore> {
    let mut end_probes: Vec<ProbeId> = Vec::new();
    for contig in registry.probed_contigs() {
        if let Some((start, end)) = registry.contig_ends(contig) {
            end_probes.push(start);
            end_probes.push(end);
        }
    }

    let mut connections = ConnectionStore::new();
    for (i, &a) in end_probes.iter().enumerate() {
        for &b in &end_probes[i + 1..] {
            let left = registry.lookup(a)?;
            let right = registry.lookup(b)?;
            let outcome = search
                .find_paths(left, right, params.fill.leash, &params.fill.search)
                .map_err(|e| e.context(format!("survey probes {} and {}", a, b)))?;
            let connection = Connection::new(
                a,
                b,
                outcome.paths.len() as u32,
                outcome.shortest(),
            )?;
            connections.add(connection)?;
        }
    }
    Ok(connections)
}

/// One genome of a multi-genome run.
#[derive(Debug, Clone)]
pub struct GenomeInput {
    pub name: String,
    pub contigs: PathBuf,
    pub reads: Vec<PathBuf>,
}

/// External toolchain settings shared by a run.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// dbgtk binary; resolved from PATH when not set.
    pub binary: Option<PathBuf>,
    pub k: u32,
    pub min_coverage: u32,
    /// Where graphs and caches land.
    pub workdir: PathBuf,
}

/// Process several genomes in one run. A genome whose graph build or
/// resolution fails is reported as failed without stopping its siblings.
pub fn run_genomes(
    inputs: &[GenomeInput],
    toolchain: &ToolchainConfig,
    params: &PipelineParams,
) -> Vec<(String, Result<GenomeOutcome>)> {
    let mut results = Vec::with_capacity(inputs.len());
    let mut next_probe: ProbeId = 0;

    for input in inputs {
        let result = run_one(input, toolchain, params, next_probe);
        match &result {
            Ok(outcome) => next_probe = outcome.next_probe,
            Err(err) => log::error!("genome '{}' failed: {:#}", input.name, err),
        }
        results.push((input.name.clone(), result));
    }
    results
}

fn run_one(
    input: &GenomeInput,
    toolchain: &ToolchainConfig,
    params: &PipelineParams,
    probe_base: ProbeId,
) -> Result<GenomeOutcome> {
    let contigs = FastaParser::parse_file(&input.contigs)
        .with_context(|| format!("read contigs {}", input.contigs.display()))?;

    let builder = GraphBuilder::new(toolchain.binary.clone())?;
    let assembly = AssemblyParams::new(toolchain.k, toolchain.min_coverage, input.reads.clone());
    let graph_path = toolchain.workdir.join(format!("{}.dbg", input.name));
    let graph = builder.build(&assembly, &graph_path)?;

    let toolkit = GraphToolkit::new(graph.path.clone(), toolchain.binary.clone())?;

    let mut genome_params = params.clone();
    if genome_params.evidence_cache.is_none() {
        genome_params.evidence_cache =
            Some(toolchain.workdir.join(format!("{}.gapdb", input.name)));
    }

    run_genome(
        &input.name,
        &contigs,
        &toolkit,
        &toolkit,
        &genome_params,
        probe_base,
    )
}
