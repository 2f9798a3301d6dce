//! # Archive Unpacker
//!
//! Turns a downloaded debug-symbol archive into stored symbol files.
//!
//! ## Overview
//!
//! Catalog archives are zip files of Mach-O binaries, occasionally delivered
//! as gzip-compressed tarballs instead. The container is detected from its
//! leading bytes, never from the URL or a content type. Every regular entry
//! whose contents start with a Mach-O magic number is streamed into
//! `<storage_root>/<project_id>/<file_id>` and hashed on the way; every other
//! entry (resource forks, plists, directories) is ignored.
//!
//! An archive that yields no symbol files is a format error, as is any
//! archive the readers reject. Files already written for a failed archive
//! are removed before the error is returned.
//!
//! Extraction runs on the blocking pool. Dropping the `unpack` future (for
//! example when the task time limit fires) cancels the extraction: it stops
//! at the next entry or buffer and removes everything it wrote.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use core_registry::{ProjectId, StoredSymbolFile, SymbolFileId};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Extracts symbol files from an archive on disk.
#[async_trait]
pub trait ArchiveUnpacker: Send + Sync {
    /// Unpack `archive` into storage owned by `project_id`.
    ///
    /// # Errors
    ///
    /// - `Format` if the archive is unreadable or holds no symbol files
    /// - `Io` if storage cannot be written
    async fn unpack(&self, archive: &Path, project_id: &ProjectId) -> Result<Vec<StoredSymbolFile>>;

    /// Remove previously unpacked files that will not be registered.
    async fn discard(&self, files: &[StoredSymbolFile]);
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

const MACHO_MAGICS: [[u8; 4]; 6] = [
    [0xfe, 0xed, 0xfa, 0xce],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xcf, 0xfa, 0xed, 0xfe],
    // Universal (fat) binaries
    [0xca, 0xfe, 0xba, 0xbe],
    [0xbe, 0xba, 0xfe, 0xca],
];

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarGz,
    Tar,
}

fn detect_kind(header: &[u8]) -> Option<ArchiveKind> {
    if header.starts_with(ZIP_MAGIC) {
        Some(ArchiveKind::Zip)
    } else if header.starts_with(GZIP_MAGIC) {
        Some(ArchiveKind::TarGz)
    } else if header.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
    {
        Some(ArchiveKind::Tar)
    } else {
        None
    }
}

fn is_macho(magic: &[u8]) -> bool {
    MACHO_MAGICS.iter().any(|m| magic == m)
}

/// Archive metadata that ships alongside the binaries on macOS.
fn is_ignored_entry(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    name.starts_with("__MACOSX/")
        || name.contains("/__MACOSX/")
        || file_name.starts_with("._")
        || file_name == ".DS_Store"
}

/// Unpacks zip and tar archives of Mach-O files into a storage directory.
#[derive(Debug, Clone)]
pub struct DebugArchiveUnpacker {
    storage_root: PathBuf,
}

impl DebugArchiveUnpacker {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    fn project_dir(&self, project_id: &ProjectId) -> Result<PathBuf> {
        let id = project_id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(SyncError::InvalidTask(format!(
                "project id {:?} cannot name a storage directory",
                id
            )));
        }
        Ok(self.storage_root.join(id))
    }
}

#[async_trait]
impl ArchiveUnpacker for DebugArchiveUnpacker {
    #[instrument(skip(self), fields(project_id = %project_id))]
    async fn unpack(&self, archive: &Path, project_id: &ProjectId) -> Result<Vec<StoredSymbolFile>> {
        let target_dir = self.project_dir(project_id)?;
        let archive = archive.to_path_buf();
        let project_id = project_id.clone();
        let guard = CancelOnDrop::default();
        let cancelled = Arc::clone(&guard.0);

        let files = tokio::task::spawn_blocking(move || -> Result<Vec<StoredSymbolFile>> {
            std::fs::create_dir_all(&target_dir)?;
            let mut extraction = Extraction::new(target_dir, project_id, cancelled);
            let outcome = extraction.run(&archive);
            extraction.complete(outcome)
        })
        .await
        .map_err(|e| SyncError::Io(io::Error::new(io::ErrorKind::Other, e)))??;
        drop(guard);

        debug!(file_count = files.len(), "Archive unpacked");
        Ok(files)
    }

    async fn discard(&self, files: &[StoredSymbolFile]) {
        for file in files {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(file_id = %file.id, error = %e, "Failed to remove discarded symbol file");
                }
            }
        }
    }
}

// =============================================================================
// Blocking extraction
// =============================================================================

/// Raises the shared flag when the owning future goes away.
#[derive(Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Extraction {
    target_dir: PathBuf,
    project_id: ProjectId,
    stored: Vec<StoredSymbolFile>,
    cancelled: Arc<AtomicBool>,
}

impl Extraction {
    fn new(target_dir: PathBuf, project_id: ProjectId, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            target_dir,
            project_id,
            stored: Vec::new(),
            cancelled,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    /// Hand over the stored files, or remove them if `outcome` failed or the
    /// caller stopped waiting.
    fn complete(mut self, outcome: Result<()>) -> Result<Vec<StoredSymbolFile>> {
        match outcome.and_then(|()| self.check_cancelled()) {
            Ok(()) => Ok(self.stored),
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn run(&mut self, archive: &Path) -> Result<()> {
        let mut file = File::open(archive)?;
        let mut header = Vec::with_capacity(TAR_MAGIC_OFFSET + TAR_MAGIC.len());
        (&mut file)
            .take((TAR_MAGIC_OFFSET + TAR_MAGIC.len()) as u64)
            .read_to_end(&mut header)?;
        file.seek(SeekFrom::Start(0))?;

        match detect_kind(&header) {
            Some(ArchiveKind::Zip) => self.extract_zip(file)?,
            Some(ArchiveKind::TarGz) => self.extract_tar(GzDecoder::new(file))?,
            Some(ArchiveKind::Tar) => self.extract_tar(file)?,
            None => {
                return Err(SyncError::Format(
                    "archive is neither zip nor tar".to_string(),
                ))
            }
        }

        if self.stored.is_empty() {
            return Err(SyncError::Format(
                "archive contains no debug symbol files".to_string(),
            ));
        }
        Ok(())
    }

    fn extract_zip(&mut self, file: File) -> Result<()> {
        let mut archive = zip::ZipArchive::new(file).map_err(format_error)?;
        for index in 0..archive.len() {
            self.check_cancelled()?;
            let mut entry = archive.by_index(index).map_err(format_error)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            self.store_entry(&name, &mut entry)?;
        }
        Ok(())
    }

    fn extract_tar<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut archive = tar::Archive::new(reader);
        for entry in archive.entries().map_err(format_error)? {
            self.check_cancelled()?;
            let mut entry = entry.map_err(format_error)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .map_err(format_error)?
                .to_string_lossy()
                .into_owned();
            self.store_entry(&name, &mut entry)?;
        }
        Ok(())
    }

    /// Copy one entry into storage if it is a Mach-O file.
    fn store_entry<R: Read>(&mut self, name: &str, entry: &mut R) -> Result<()> {
        if is_ignored_entry(name) {
            return Ok(());
        }

        let mut magic = Vec::with_capacity(4);
        (&mut *entry).take(4).read_to_end(&mut magic).map_err(format_error)?;
        if !is_macho(&magic) {
            debug!(entry = name, "Skipping non Mach-O entry");
            return Ok(());
        }

        let id = SymbolFileId::new();
        let path = self.target_dir.join(id.as_string());
        let mut output = File::create(&path)?;
        let mut stored = StoredSymbolFile {
            id,
            project_id: self.project_id.clone(),
            name: name.to_string(),
            sha256: String::new(),
            size: 0,
            path,
        };

        // Registered before writing so a failed copy is rolled back too.
        let copied = copy_hashed(&magic, entry, &mut output, &self.cancelled);
        let (sha256, size) = match copied {
            Ok(result) => result,
            Err(e) => {
                self.stored.push(stored);
                return Err(e);
            }
        };
        stored.sha256 = sha256;
        stored.size = size;
        self.stored.push(stored);
        Ok(())
    }

    fn rollback(&mut self) {
        for file in self.stored.drain(..) {
            if let Err(e) = std::fs::remove_file(&file.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(file_id = %file.id, error = %e, "Failed to remove partial symbol file");
                }
            }
        }
    }
}

fn copy_hashed<R: Read, W: Write>(
    prefix: &[u8],
    reader: &mut R,
    writer: &mut W,
    cancelled: &AtomicBool,
) -> Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut size = prefix.len() as u64;
    hasher.update(prefix);
    writer.write_all(prefix)?;

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }
        let read = reader.read(&mut buffer).map_err(format_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
        size += read as u64;
    }
    writer.flush()?;

    Ok((to_hex(&hasher.finalize()), size))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn format_error(err: impl std::fmt::Display) -> SyncError {
    SyncError::Format(err.to_string())
}
