//! Streaming access to entries and loose files.
//!
//! [`AssetReader`] lets callers read an asset without caring whether it sits
//! on disk or inside a mounted package; [`AssetResolver`] decides which.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::archive::Archive;
use crate::error::{ExtractError, LoadError};
use crate::extract::safe_join;
use crate::Entry;

/// A `Read + Seek` view of one entry's byte range.
///
/// Owns its own file handle, so several readers over the same package can be
/// used from different threads.
#[derive(Debug)]
pub struct EntryReader {
    file: File,
    start: u64,
    len: u64,
    pos: u64,
}

impl EntryReader {
    pub(crate) fn new(mut file: File, start: u64, len: u64) -> io::Result<Self> {
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            file,
            start,
            len,
            pos: 0,
        })
    }

    /// Length of the entry in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.len
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = buf.len().min(remaining.min(usize::MAX as u64) as usize);
        let n = self.file.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for EntryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of entry")
        })?;

        self.file.seek(SeekFrom::Start(self.start.saturating_add(target)))?;
        self.pos = target;
        Ok(target)
    }
}

/// An opened asset, either a loose file or a package entry.
#[derive(Debug)]
pub enum AssetReader {
    Disk { file: File, size: u64 },
    Entry(EntryReader),
}

impl AssetReader {
    /// Open a loose file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self::Disk { file, size })
    }

    /// Total size of the asset in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Disk { size, .. } => *size,
            Self::Entry(reader) => reader.size(),
        }
    }

    /// Release the underlying handle.
    pub fn close(self) {
        drop(self);
    }

    /// Read the whole asset from the current position.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.size() as usize);
        self.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl Read for AssetReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Disk { file, .. } => file.read(buf),
            Self::Entry(reader) => reader.read(buf),
        }
    }
}

impl Seek for AssetReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Disk { file, .. } => file.seek(pos),
            Self::Entry(reader) => reader.seek(pos),
        }
    }
}

/// Resolves asset names against a loose-file root and mounted packages.
///
/// Names take the form `package/path/inside.ext`. A loose file at
/// `root/package/path/inside.ext` shadows the packaged one; otherwise the
/// package whose name matches the first component is searched, and failing
/// that every mounted package is searched for the full name.
#[derive(Debug, Default)]
pub struct AssetResolver {
    root: Option<PathBuf>,
    archives: Vec<Archive>,
}

impl AssetResolver {
    /// Create a resolver with no loose-file root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver that prefers loose files under `root`.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: Some(root.into()),
            archives: Vec::new(),
        }
    }

    /// Mount an already loaded package.
    pub fn mount(&mut self, archive: Archive) {
        debug!("mounted package {}", archive.name());
        self.archives.push(archive);
    }

    /// Load and mount a package.
    pub fn mount_path<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LoadError> {
        self.mount(Archive::load(path)?);
        Ok(())
    }

    /// Mounted packages in mount order.
    pub fn archives(&self) -> &[Archive] {
        &self.archives
    }

    /// Find the packaged entry for a name, ignoring loose files.
    pub fn find(&self, name: &str) -> Option<(&Archive, &Entry)> {
        let normalized = name.replace('\\', "/");
        if let Some((package, rest)) = normalized.split_once('/') {
            let qualified = self
                .archives
                .iter()
                .filter(|a| a.name().eq_ignore_ascii_case(package))
                .find_map(|a| a.find(rest).map(|e| (a, e)));
            if qualified.is_some() {
                return qualified;
            }
        }

        self.archives
            .iter()
            .find_map(|a| a.find(&normalized).map(|e| (a, e)))
    }

    /// Check whether a name resolves to anything.
    pub fn contains(&self, name: &str) -> bool {
        self.loose_path(name).is_some() || self.find(name).is_some()
    }

    /// Open an asset by name.
    pub fn open(&self, name: &str) -> Result<AssetReader, ExtractError> {
        if let Some(path) = self.loose_path(name) {
            return AssetReader::from_path(&path).map_err(|e| ExtractError::io(name, e));
        }

        let (archive, entry) = self
            .find(name)
            .ok_or_else(|| ExtractError::EntryNotFound(name.to_string()))?;
        archive.open_entry(entry).map(AssetReader::Entry)
    }

    /// Read a whole asset by name.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, ExtractError> {
        self.open(name)?
            .read_all()
            .map_err(|e| ExtractError::io(name, e))
    }

    /// Names in `package` matching a glob pattern.
    pub fn list(&self, package: &str, pattern: &str) -> Vec<String> {
        self.archives
            .iter()
            .filter(|a| a.name().eq_ignore_ascii_case(package))
            .filter_map(|a| a.matching(pattern).ok())
            .flatten()
            .map(|e| e.name().to_string())
            .collect()
    }

    fn loose_path(&self, name: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        let path = safe_join(root, name).ok()?;
        path.is_file().then_some(path)
    }
}
