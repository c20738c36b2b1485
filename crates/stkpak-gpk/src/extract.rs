//! Entry extraction.
//!
//! Single entries are read through the package's own handle. Bulk extraction
//! fans jobs out to a small pool of scoped worker threads, each with its own
//! file handle, and keeps going when individual entries fail.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::entry::Entry;
use crate::error::{EntryFailure, ExtractAllError, ExtractError};

/// Upper bound on bulk extraction workers.
pub const MAX_WORKERS: usize = 10;

type PostProcess<'a> = dyn Fn(&Entry, Vec<u8>) -> Result<Vec<u8>, ExtractError> + Sync + 'a;
type Observer<'a> = dyn FnMut(&Progress<'_>) + 'a;
type JobResult = (usize, Result<(), ExtractError>);

/// Read the stored bytes of one entry.
pub fn extract(archive: &Archive, entry: &Entry) -> Result<Vec<u8>, ExtractError> {
    archive.read(entry)
}

/// Write every entry under `output_dir` using default settings.
///
/// Returns the number of entries written.
pub fn extract_all<P: AsRef<Path>>(archive: &Archive, output_dir: P) -> Result<usize, ExtractAllError> {
    BulkExtractor::new(archive).run(output_dir)
}

/// Default pool size for a given number of jobs.
pub fn default_workers(jobs: usize) -> usize {
    jobs.min(2 * num_cpus::get()).min(MAX_WORKERS)
}

/// Join an entry name onto an output directory, refusing names that would
/// land outside it.
pub fn safe_join(root: &Path, name: &str) -> Result<PathBuf, ExtractError> {
    let normalized = name.replace('\\', "/");
    let relative = Path::new(&normalized);

    let mut has_file_name = false;
    for component in relative.components() {
        match component {
            Component::Normal(_) => has_file_name = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(name.to_string()));
            }
        }
    }
    if !has_file_name {
        return Err(ExtractError::UnsafePath(name.to_string()));
    }

    Ok(root.join(relative))
}

/// Read an entry's byte range through the given handle.
pub(crate) fn read_range(file: &mut File, entry: &Entry) -> Result<Vec<u8>, ExtractError> {
    let mut data = vec![0u8; entry.compressed_length() as usize];
    file.seek(SeekFrom::Start(entry.offset()))
        .and_then(|_| file.read_exact(&mut data))
        .map_err(|e| ExtractError::io(entry.name(), e))?;
    Ok(data)
}

/// Progress report for one finished job.
#[derive(Debug)]
pub struct Progress<'a> {
    /// The entry that was processed.
    pub entry: &'a Entry,
    /// Jobs finished so far, including this one.
    pub completed: usize,
    /// Jobs in the run.
    pub total: usize,
    /// Why the entry failed, if it did.
    pub error: Option<&'a ExtractError>,
}

/// Configurable bulk extraction.
///
/// ```no_run
/// use stkpak_gpk::{Archive, BulkExtractor};
///
/// let archive = Archive::load("packs/SE.GPK")?;
/// let written = BulkExtractor::new(&archive)
///     .workers(4)
///     .on_progress(|p| println!("{}/{} {}", p.completed, p.total, p.entry.name()))
///     .run("out/SE")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct BulkExtractor<'a> {
    archive: &'a Archive,
    indices: Option<Vec<usize>>,
    workers: Option<usize>,
    progress: Option<Box<Observer<'a>>>,
    post_process: Option<Box<PostProcess<'a>>>,
}

impl<'a> BulkExtractor<'a> {
    pub fn new(archive: &'a Archive) -> Self {
        Self {
            archive,
            indices: None,
            workers: None,
            progress: None,
            post_process: None,
        }
    }

    /// Only extract the entries at these catalog indices.
    pub fn entries<I: IntoIterator<Item = usize>>(mut self, indices: I) -> Self {
        self.indices = Some(indices.into_iter().collect());
        self
    }

    /// Override the worker count.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    /// Called on the calling thread once per finished job, in completion order.
    pub fn on_progress<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&Progress<'_>) + 'a,
    {
        self.progress = Some(Box::new(observer));
        self
    }

    /// Transform each payload on the worker thread before it is written.
    pub fn post_process<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Entry, Vec<u8>) -> Result<Vec<u8>, ExtractError> + Sync + 'a,
    {
        self.post_process = Some(Box::new(hook));
        self
    }

    /// Run the extraction.
    ///
    /// Every job is attempted. The result is an error only when at least one
    /// entry failed, and then it carries all of the failures.
    pub fn run<P: AsRef<Path>>(self, output_dir: P) -> Result<usize, ExtractAllError> {
        let Self {
            archive,
            indices,
            workers,
            mut progress,
            post_process,
        } = self;
        let output_dir = output_dir.as_ref();
        let entries = archive.entries();

        let mut failures = Vec::new();
        let jobs: Vec<usize> = match indices {
            Some(indices) => indices
                .into_iter()
                .filter(|&index| {
                    let known = index < entries.len();
                    if !known {
                        failures.push(EntryFailure {
                            index,
                            name: format!("#{index}"),
                            error: ExtractError::EntryNotFound(format!("#{index}")),
                        });
                    }
                    known
                })
                .collect(),
            None => (0..entries.len()).collect(),
        };
        let total = jobs.len() + failures.len();

        if !jobs.is_empty() {
            let workers = workers
                .unwrap_or_else(|| default_workers(jobs.len()))
                .clamp(1, jobs.len());
            info!(
                "extracting {} entries from {} with {workers} workers",
                jobs.len(),
                archive.name()
            );

            let (job_tx, job_rx) = crossbeam_channel::unbounded();
            for index in &jobs {
                job_tx.send(*index).ok();
            }
            drop(job_tx);

            let (result_tx, result_rx) = crossbeam_channel::unbounded::<JobResult>();
            let post_process = post_process.as_deref();

            thread::scope(|scope| {
                for id in 0..workers {
                    let job_rx = job_rx.clone();
                    let result_tx = result_tx.clone();
                    scope.spawn(move || {
                        worker(id, archive, output_dir, post_process, job_rx, result_tx)
                    });
                }
                drop(result_tx);

                for (completed, (index, result)) in result_rx.iter().enumerate() {
                    let entry = &entries[index];
                    if let Some(observer) = progress.as_mut() {
                        observer(&Progress {
                            entry,
                            completed: completed + 1,
                            total: jobs.len(),
                            error: result.as_ref().err(),
                        });
                    }
                    if let Err(error) = result {
                        failures.push(EntryFailure {
                            index,
                            name: entry.name().to_string(),
                            error,
                        });
                    }
                }
            });
        }

        if failures.is_empty() {
            info!("extracted {total} entries");
            return Ok(total);
        }

        failures.sort_by_key(|f| f.index);
        warn!("{} of {total} entries failed", failures.len());
        Err(ExtractAllError { total, failures })
    }
}

fn worker(
    id: usize,
    archive: &Archive,
    output_dir: &Path,
    post_process: Option<&PostProcess<'_>>,
    jobs: Receiver<usize>,
    results: Sender<JobResult>,
) {
    let entries = archive.entries();

    let mut file = match File::open(archive.path()) {
        Ok(file) => file,
        Err(e) => {
            warn!(worker = id, "cannot open {}: {e}", archive.path().display());
            for index in jobs.iter() {
                let error = std::io::Error::new(e.kind(), e.to_string());
                results
                    .send((index, Err(ExtractError::io(entries[index].name(), error))))
                    .ok();
            }
            return;
        }
    };

    for index in jobs.iter() {
        let entry = &entries[index];
        let result = extract_to(&mut file, archive, entry, output_dir, post_process);
        if let Err(e) = &result {
            debug!(worker = id, "{}: {e}", entry.name());
        }
        if results.send((index, result)).is_err() {
            break;
        }
    }
}

fn extract_to(
    file: &mut File,
    archive: &Archive,
    entry: &Entry,
    output_dir: &Path,
    post_process: Option<&PostProcess<'_>>,
) -> Result<(), ExtractError> {
    let target = safe_join(output_dir, entry.name())?;
    archive.check_bounds(entry)?;

    let data = read_range(file, entry)?;
    let data = match post_process {
        Some(hook) => hook(entry, data)?,
        None => data,
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ExtractError::io(entry.name(), e))?;
    }
    fs::write(&target, data).map_err(|e| ExtractError::io(entry.name(), e))
}
