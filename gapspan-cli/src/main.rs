use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use gapspan_core::gapfill::{AmbiguityPolicy, FillParams};
use gapspan_core::io::{write_scaffolds, write_variants, FastaParser};
use gapspan_core::pipeline::{run_genomes, GenomeInput, PipelineParams, ToolchainConfig};
use gapspan_core::probe::ProbeRegistry;
use gapspan_core::search::SearchOptions;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gapspan")]
#[command(about = "gapspan - scaffolding and gap resolution for draft genome assemblies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold and gap-fill one or more draft assemblies
    Run {
        /// Draft assembly FASTA files, one per genome
        #[arg(required = true)]
        contigs: Vec<PathBuf>,

        /// Read files per genome, in the same order as the assemblies;
        /// separate multiple files for one genome with commas
        #[arg(short, long)]
        reads: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = "gapspan-out")]
        out_dir: PathBuf,

        /// k-mer size for the assembly graph
        #[arg(short, long, default_value = "31")]
        kmer: u32,

        /// Minimum k-mer coverage kept in the graph
        #[arg(long, default_value = "2")]
        min_coverage: u32,

        /// Probe anchor length
        #[arg(long, default_value = "100")]
        anchor_len: usize,

        /// Maximum graph distance explored per gap
        #[arg(long, default_value = "10000")]
        leash: u64,

        /// Gaps with more candidate paths than this stay filler
        #[arg(long, default_value = "8")]
        max_paths: u32,

        /// Ambiguity policy: record-variants or max-coverage
        #[arg(long, default_value = "record-variants")]
        policy: String,

        /// Filler length for gaps of unknown size
        #[arg(long, default_value = "100")]
        filler_len: u64,

        /// Minimum N-run length treated as an internal gap
        #[arg(long, default_value = "10")]
        min_gap_len: u64,

        /// Path to the dbgtk binary (default: search PATH)
        #[arg(long)]
        dbgtk: Option<PathBuf>,

        /// Worker threads for gap resolution (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,
    },

    /// Print the probe table for a draft assembly
    Probes {
        /// Draft assembly FASTA file
        contigs: PathBuf,

        /// Probe anchor length
        #[arg(long, default_value = "100")]
        anchor_len: usize,

        /// Minimum N-run length treated as an internal gap
        #[arg(long, default_value = "10")]
        min_gap_len: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Run {
            contigs,
            reads,
            out_dir,
            kmer,
            min_coverage,
            anchor_len,
            leash,
            max_paths,
            policy,
            filler_len,
            min_gap_len,
            dbgtk,
            threads,
        } => run_command(
            contigs,
            reads,
            out_dir,
            kmer,
            min_coverage,
            anchor_len,
            leash,
            max_paths,
            &policy,
            filler_len,
            min_gap_len,
            dbgtk,
            threads,
        ),
        Commands::Probes {
            contigs,
            anchor_len,
            min_gap_len,
        } => probes_command(contigs, anchor_len, min_gap_len),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_command(
    contigs: Vec<PathBuf>,
    reads: Vec<String>,
    out_dir: PathBuf,
    kmer: u32,
    min_coverage: u32,
    anchor_len: usize,
    leash: u64,
    max_paths: u32,
    policy: &str,
    filler_len: u64,
    min_gap_len: u64,
    dbgtk: Option<PathBuf>,
    threads: usize,
) -> Result<()> {
    if reads.len() != contigs.len() {
        bail!(
            "{} assemblies but {} --reads values; pass one --reads per genome",
            contigs.len(),
            reads.len()
        );
    }

    let policy = match policy {
        "record-variants" => AmbiguityPolicy::RecordVariants,
        "max-coverage" => AmbiguityPolicy::MaxCoverage,
        other => bail!("unknown policy '{}'", other),
    };

    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    std::fs::create_dir_all(&out_dir)?;

    let inputs: Vec<GenomeInput> = contigs
        .iter()
        .zip(&reads)
        .map(|(contig_path, read_list)| {
            let name = genome_name(contig_path)?;
            Ok(GenomeInput {
                name,
                contigs: contig_path.clone(),
                reads: read_list.split(',').map(PathBuf::from).collect(),
            })
        })
        .collect::<Result<_>>()?;

    let toolchain = ToolchainConfig {
        binary: dbgtk,
        k: kmer,
        min_coverage,
        workdir: out_dir.clone(),
    };
    let params = PipelineParams {
        anchor_len,
        min_gap_len,
        fill: FillParams {
            leash,
            max_ambiguous_paths: max_paths,
            policy,
            filler_len,
            search: SearchOptions::default(),
        },
        evidence_cache: None,
    };

    let results = run_genomes(&inputs, &toolchain, &params);

    let mut failures = 0;
    for (name, result) in results {
        match result {
            Ok(outcome) => {
                let fasta = out_dir.join(format!("{}.scaffolds.fasta", name));
                let vcf = out_dir.join(format!("{}.variants.vcf", name));
                let report = out_dir.join(format!("{}.report.txt", name));

                write_scaffolds(&fasta, &outcome.scaffolds)?;
                write_variants(&vcf, &outcome.scaffolds)?;
                std::fs::write(&report, outcome.report.render())?;

                log::info!(
                    "{}: {} scaffolds ({} circular), {} of {} gaps filled -> {}",
                    name,
                    outcome.report.chains,
                    outcome.report.circular_chains,
                    outcome.report.gaps_filled,
                    outcome.report.gaps_total,
                    fasta.display()
                );
            }
            Err(err) => {
                log::error!("{}: failed: {:#}", name, err);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} genome(s) failed", failures);
    }
    Ok(())
}

fn probes_command(contigs: PathBuf, anchor_len: usize, min_gap_len: u64) -> Result<()> {
    let set = FastaParser::parse_file(&contigs)?;

    let mut registry = ProbeRegistry::new(anchor_len);
    for contig in &set.contigs {
        if let Err(err) = registry.register_contig_ends(contig) {
            log::warn!("skipping contig ends: {}", err);
        }
    }
    for contig in &set.contigs {
        for (start, end) in contig.unknown_runs(min_gap_len) {
            if let Err(err) = registry.register_gap_flanks(contig, start, end) {
                log::warn!(
                    "leaving gap [{}, {}) of '{}' unanchored: {}",
                    start,
                    end,
                    contig.name,
                    err
                );
            }
        }
    }

    println!("number\tcontig\tside\toffset\tsequence");
    for probe in registry.probes() {
        let contig_name = set
            .get_contig(probe.contig)
            .map(|c| c.name.as_str())
            .unwrap_or("?");
        println!(
            "{}\t{}\t{:?}\t{}\t{}",
            probe.number,
            contig_name,
            probe.side,
            probe.offset,
            String::from_utf8_lossy(&probe.sequence)
        );
    }
    Ok(())
}

fn genome_name(path: &PathBuf) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("cannot derive a genome name from {}", path.display()))
}
