//! Stkpak CLI - Command-line tool for GPK package extraction and Ogg repair.
//!
//! This is the main entry point for the stkpak command-line application.

mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use stkpak::gpk::{codec, TableEnd, TrailerEncoding};
use stkpak::ogg::first_page_checksum_ok;
use stkpak::prelude::*;

use crate::logging::LogConfig;

/// Stkpak - GPK package extraction and Ogg stream repair tool
#[derive(Parser)]
#[command(name = "stkpak")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log detail (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contents of a GPK package
    List {
        /// Path to the GPK file
        #[arg(env = "INPUT_GPK")]
        gpk: PathBuf,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show offsets, lengths and tags
        #[arg(short, long)]
        detailed: bool,

        /// Print the catalog as JSON
        #[arg(long, conflicts_with = "detailed")]
        json: bool,
    },

    /// Extract files from a GPK package
    Extract {
        /// Path to the GPK file
        #[arg(env = "INPUT_GPK")]
        gpk: PathBuf,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Number of worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Inflate compressed entries before writing them
        #[arg(long)]
        decompress: bool,

        /// Repair .ogg entries before writing them
        #[arg(long)]
        repair_audio: bool,
    },

    /// Write a copy of a GPK package with its index and trailer deciphered
    Decrypt {
        /// Path to the GPK file
        #[arg(env = "INPUT_GPK")]
        gpk: PathBuf,

        /// Output file; defaults to <name>_decrypted.gpk next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report the container state of Ogg files
    Analyze {
        /// Files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Repair Ogg files
    Repair {
        /// Files or directories (searched for .ogg files)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output directory; files are repaired in place when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also recompute stale first-page checksums
        #[arg(long)]
        fix_checksum: bool,
    },

    /// Build a GPK package from a directory
    Pack {
        /// Directory to pack
        dir: PathBuf,

        /// Output GPK file
        #[arg(short, long)]
        output: PathBuf,

        /// Store the trailer enciphered
        #[arg(long)]
        encrypt_trailer: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    LogConfig {
        verbosity: cli.verbose,
        quiet: cli.quiet,
    }
    .init();

    match cli.command {
        Commands::List {
            gpk,
            filter,
            detailed,
            json,
        } => {
            cmd_list(&gpk, filter.as_deref(), detailed, json)?;
        }
        Commands::Extract {
            gpk,
            output,
            filter,
            workers,
            decompress,
            repair_audio,
        } => {
            let options = ExtractOptions {
                filter,
                workers,
                decompress,
                repair_audio,
            };
            cmd_extract(&gpk, &output, &options)?;
        }
        Commands::Decrypt { gpk, output } => {
            let output = output.unwrap_or_else(|| decrypted_path(&gpk));
            cmd_decrypt(&gpk, &output)?;
        }
        Commands::Analyze { files } => {
            cmd_analyze(&files)?;
        }
        Commands::Repair {
            paths,
            output,
            fix_checksum,
        } => {
            cmd_repair(&paths, output.as_deref(), fix_checksum)?;
        }
        Commands::Pack {
            dir,
            output,
            encrypt_trailer,
        } => {
            cmd_pack(&dir, &output, encrypt_trailer)?;
        }
    }

    Ok(())
}

fn load_archive(path: &Path) -> Result<Archive> {
    let archive = Archive::load(path)
        .with_context(|| format!("Failed to load GPK package {}", path.display()))?;

    if let TableEnd::Corrupt { offset } = archive.table_end() {
        warn!(
            offset,
            entries = archive.len(),
            "entry table is damaged; listing what could be recovered"
        );
    }
    Ok(archive)
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn cmd_list(path: &Path, filter: Option<&str>, detailed: bool, json: bool) -> Result<()> {
    let archive = load_archive(path)?;

    let entries: Vec<&Entry> = match filter {
        Some(pattern) => archive
            .matching(pattern)
            .with_context(|| format!("Invalid filter pattern: {pattern}"))?,
        None => archive.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        if detailed {
            println!(
                "{:>10} {:>12} {:>12} {} {}",
                entry.offset(),
                entry.compressed_length(),
                entry.uncompressed_length(),
                String::from_utf8_lossy(&entry.tag()),
                entry.name()
            );
        } else {
            println!("{}", entry.name());
        }
    }

    println!("\nTotal: {} entries", entries.len());

    Ok(())
}

struct ExtractOptions {
    filter: Option<String>,
    workers: Option<usize>,
    decompress: bool,
    repair_audio: bool,
}

fn cmd_extract(path: &Path, output: &Path, options: &ExtractOptions) -> Result<()> {
    println!("Opening GPK package: {}", path.display());

    let start = Instant::now();
    let archive = load_archive(path)?;

    println!("Loaded {} entries in {:?}", archive.len(), start.elapsed());

    let indices: Vec<usize> = match options.filter.as_deref() {
        Some(pattern) => archive
            .matching_indices(pattern)
            .with_context(|| format!("Invalid filter pattern: {pattern}"))?,
        None => (0..archive.len()).collect(),
    };

    println!("Extracting {} entries...", indices.len());

    let pb = progress_bar(indices.len() as u64)?;

    let mut extractor = BulkExtractor::new(&archive)
        .entries(indices)
        .on_progress(|progress| {
            if let Some(error) = progress.error {
                pb.println(format!("  failed: {error}"));
            }
            pb.inc(1);
        });

    if let Some(workers) = options.workers {
        extractor = extractor.workers(workers);
    }

    let (decompress, repair_audio) = (options.decompress, options.repair_audio);
    if decompress || repair_audio {
        extractor = extractor
            .post_process(move |entry, data| transform_entry(entry, data, decompress, repair_audio));
    }

    let start = Instant::now();
    let result = extractor.run(output);
    pb.finish_and_clear();

    match result {
        Ok(written) => {
            println!("Extracted {} entries in {:?}", written, start.elapsed());
            Ok(())
        }
        Err(err) => {
            eprintln!(
                "Extracted {} of {} entries in {:?}; failures:",
                err.succeeded(),
                err.total,
                start.elapsed()
            );
            for failure in &err.failures {
                eprintln!("  #{} {}: {}", failure.index, failure.name, failure.error);
            }
            Err(anyhow::Error::new(err).context("Extraction incomplete"))
        }
    }
}

/// Decompress and/or repair one entry on its way to disk.
fn transform_entry(
    entry: &Entry,
    data: Vec<u8>,
    decompress: bool,
    repair_audio: bool,
) -> std::result::Result<Vec<u8>, ExtractError> {
    let data = if decompress && entry.is_compressed() {
        codec::decompress_payload(&data).map_err(|source| ExtractError::Decode {
            name: entry.name().to_string(),
            source,
        })?
    } else {
        data
    };

    if !(repair_audio && is_ogg_name(entry.name())) {
        return Ok(data);
    }

    let outcome = repair_with_outcome(&data);
    match outcome.action {
        RepairAction::Unrepairable => {
            warn!(name = entry.name(), status = %outcome.analysis.status, "left unrepaired")
        }
        action if action.modified() => debug!(name = entry.name(), ?action, "repaired"),
        _ => {}
    }
    Ok(outcome.data)
}

fn decrypted_path(gpk: &Path) -> PathBuf {
    let stem = gpk.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    gpk.with_file_name(format!("{stem}_decrypted.gpk"))
}

fn cmd_decrypt(path: &Path, output: &Path) -> Result<()> {
    let archive = load_archive(path)?;
    println!("Decrypting: {} -> {}", path.display(), output.display());

    if archive.trailer_encoding() == TrailerEncoding::Plain {
        info!("trailer is already plain, copying as is");
    }
    archive
        .write_deciphered(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Kept {} data bytes, {} entries",
        archive.index_offset(),
        archive.len()
    );

    Ok(())
}

fn fmt_offset(offset: Option<usize>) -> String {
    offset.map_or_else(|| "-".to_string(), |o| o.to_string())
}

fn cmd_analyze(files: &[PathBuf]) -> Result<()> {
    for file in files {
        let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        let analysis = analyze(&data);

        println!("{}", file.display());
        println!("  status:        {}", analysis.status);
        println!("  summary:       {}", analysis.description());
        println!("  first marker:  {}", fmt_offset(analysis.first_marker));
        println!("  second marker: {}", fmt_offset(analysis.second_marker));
        println!("  codec id:      {}", fmt_offset(analysis.codec_id));
        println!("  checksum ok:   {}", first_page_checksum_ok(&data));
    }

    Ok(())
}

/// A file to repair and where the result goes.
struct RepairJob {
    source: PathBuf,
    destination: PathBuf,
}

fn collect_repair_jobs(paths: &[PathBuf], output: Option<&Path>) -> Result<Vec<RepairJob>> {
    let destination = |source: &Path, relative: &Path| match output {
        Some(dir) => dir.join(relative),
        None => source.to_path_buf(),
    };

    let mut jobs = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                if !entry.file_type().is_file() || !is_ogg_name(entry.path()) {
                    continue;
                }
                let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
                jobs.push(RepairJob {
                    source: entry.path().to_path_buf(),
                    destination: destination(entry.path(), relative),
                });
            }
        } else {
            let relative = path.file_name().map(Path::new).unwrap_or(path.as_path());
            jobs.push(RepairJob {
                source: path.clone(),
                destination: destination(path, relative),
            });
        }
    }
    Ok(jobs)
}

/// What happened to one file.
struct RepairReport {
    action: RepairAction,
    checksum_refreshed: bool,
}

fn repair_file(job: &RepairJob, fix_checksum: bool) -> Result<RepairReport> {
    let data =
        fs::read(&job.source).with_context(|| format!("Failed to read {}", job.source.display()))?;

    let outcome = repair_with_outcome(&data);
    let mut repaired = outcome.data;
    let mut checksum_refreshed = false;
    if fix_checksum {
        let refreshed = refresh_checksum(&repaired);
        checksum_refreshed = refreshed != repaired;
        repaired = refreshed;
    }

    // Unrepairable files still land in the output directory, as they were.
    let changed = outcome.action.modified() || checksum_refreshed;
    if changed || job.destination != job.source {
        if let Some(parent) = job.destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&job.destination, &repaired)
            .with_context(|| format!("Failed to write {}", job.destination.display()))?;
    }

    Ok(RepairReport {
        action: outcome.action,
        checksum_refreshed,
    })
}

fn cmd_repair(paths: &[PathBuf], output: Option<&Path>, fix_checksum: bool) -> Result<()> {
    let jobs = collect_repair_jobs(paths, output)?;
    info!(files = jobs.len(), "repairing");

    let pb = progress_bar(jobs.len() as u64)?;
    let start = Instant::now();

    let results: Vec<(&RepairJob, Result<RepairReport>)> = jobs
        .par_iter()
        .map(|job| {
            let result = repair_file(job, fix_checksum);
            pb.inc(1);
            (job, result)
        })
        .collect();

    pb.finish_and_clear();

    let mut repaired = 0;
    let mut refreshed = 0;
    let mut unchanged = 0;
    let mut unrepairable = Vec::new();
    let mut errors = 0;

    for (job, result) in &results {
        match result {
            Ok(report) => {
                if report.checksum_refreshed {
                    refreshed += 1;
                }
                match report.action {
                    RepairAction::Unrepairable => unrepairable.push(job.source.display()),
                    action if action.modified() => {
                        println!("{}: {:?}", job.source.display(), action);
                        repaired += 1;
                    }
                    _ => unchanged += 1,
                }
            }
            Err(e) => {
                eprintln!("Error repairing {}: {:#}", job.source.display(), e);
                errors += 1;
            }
        }
    }

    for path in &unrepairable {
        eprintln!("Could not repair {path}");
    }

    println!(
        "Processed {} files in {:?}: {} repaired, {} checksums refreshed, {} unchanged, {} unrepairable",
        results.len(),
        start.elapsed(),
        repaired,
        refreshed,
        unchanged,
        unrepairable.len()
    );

    if errors > 0 {
        anyhow::bail!("{errors} files could not be processed");
    }

    Ok(())
}

fn cmd_pack(dir: &Path, output: &Path, encrypt_trailer: bool) -> Result<()> {
    println!("Packing: {} -> {}", dir.display(), output.display());

    let encoding = if encrypt_trailer {
        TrailerEncoding::Enciphered
    } else {
        TrailerEncoding::Plain
    };
    let mut builder = ArchiveBuilder::new().trailer_encoding(encoding);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(dir)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("\\");

        let data = fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        debug!(name = %name, bytes = data.len(), "adding");
        builder = builder.add(name, data);
    }

    if builder.is_empty() {
        anyhow::bail!("No files found under {}", dir.display());
    }

    let count = builder.len();
    builder
        .write_to(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Packed {count} entries");

    Ok(())
}
