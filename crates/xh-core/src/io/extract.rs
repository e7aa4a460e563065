//! Single-entry extraction from release containers.
//!
//! A container is either a zip (random access, listed entries) or a tar
//! stream under an optional decompression filter. Both are searched for the
//! first regular file whose base name equals the requested name, wherever it
//! sits in the archive tree, and only that entry is written out.

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use xh_schema::CoreType;
use zip::ZipArchive;
use zstd::stream::read::Decoder as ZstdDecoder;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Entry '{entry}' not found in {}", container.display())]
    EntryNotFound { entry: String, container: PathBuf },
}

/// Decompression filter under a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Zstd,
}

/// Container family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Listed entries, random access.
    Zip,
    /// Sequential stream of headers.
    Tar(TarCompression),
}

impl ContainerKind {
    /// Infer the container family from a file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let path_str = path.to_string_lossy().to_lowercase();

        if path_str.ends_with(".zip") {
            Some(Self::Zip)
        } else if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
            Some(Self::Tar(TarCompression::Gzip))
        } else if path_str.ends_with(".tar.zst") || path_str.ends_with(".tzst") {
            Some(Self::Tar(TarCompression::Zstd))
        } else if path_str.ends_with(".tar") {
            Some(Self::Tar(TarCompression::None))
        } else {
            None
        }
    }

    /// The family each core publishes its releases in.
    pub fn for_core(core: CoreType) -> Self {
        match core {
            CoreType::Xray => Self::Zip,
            CoreType::SingBox => Self::Tar(TarCompression::Gzip),
        }
    }
}

/// Which file to pull out of which container.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveEntryRequest<'a> {
    pub container_path: &'a Path,
    /// Base name to match, ignoring any directory prefix.
    pub target_entry_name: &'a str,
}

/// Extract the requested entry to `dest` as an executable file.
///
/// Parent directories of `dest` are created and an existing file is
/// truncated, but only once a matching entry has been found: when the entry
/// is missing `dest` is left untouched. The written file is synced and
/// closed before returning. Returns the number of bytes written.
pub fn extract_entry(
    request: &ArchiveEntryRequest<'_>,
    kind: ContainerKind,
    dest: &Path,
) -> Result<u64, ExtractError> {
    tracing::debug!(
        "Extracting '{}' from {} ({kind:?})",
        request.target_entry_name,
        request.container_path.display()
    );

    let written = match kind {
        ContainerKind::Zip => extract_zip_entry(request, dest)?,
        ContainerKind::Tar(compression) => {
            let reader = BufReader::new(File::open(request.container_path)?);
            match compression {
                TarCompression::None => scan_tar(reader, request.target_entry_name, dest)?,
                TarCompression::Gzip => scan_tar(
                    flate2::read::GzDecoder::new(reader),
                    request.target_entry_name,
                    dest,
                )?,
                TarCompression::Zstd => {
                    scan_tar(ZstdDecoder::new(reader)?, request.target_entry_name, dest)?
                }
            }
        }
    };

    written.ok_or_else(|| ExtractError::EntryNotFound {
        entry: request.target_entry_name.to_string(),
        container: request.container_path.to_path_buf(),
    })
}

fn has_base_name(path: &Path, target: &str) -> bool {
    path.file_name() == Some(OsStr::new(target))
}

fn extract_zip_entry(
    request: &ArchiveEntryRequest<'_>,
    dest: &Path,
) -> Result<Option<u64>, ExtractError> {
    let file = File::open(request.container_path)?;
    let mut archive = ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let Some(path) = file.enclosed_name() else {
            continue;
        };
        if has_base_name(&path, request.target_entry_name) {
            return Ok(Some(write_executable(&mut file, dest)?));
        }
    }

    Ok(None)
}

const BLOCK_SIZE: usize = 512;
const CKSUM_FIELD: std::ops::Range<usize> = 148..156;
const MAX_LONG_NAME: u64 = 64 * 1024;

/// Walk a tar stream block by block.
///
/// A header whose checksum does not match is skipped one block at a time
/// until the next valid header, so a corrupt entry does not hide the ones
/// after it. Running out of stream yields `None`.
fn scan_tar<R: Read>(
    mut reader: R,
    target: &str,
    dest: &Path,
) -> Result<Option<u64>, ExtractError> {
    let mut block = [0u8; BLOCK_SIZE];
    let mut long_name: Option<Vec<u8>> = None;

    while read_block(&mut reader, &mut block)? {
        if block.iter().all(|b| *b == 0) {
            continue;
        }

        let header = tar::Header::from_byte_slice(&block);
        if !checksum_matches(header) {
            tracing::debug!("Skipping tar block with bad header checksum");
            long_name = None;
            continue;
        }

        let size = match header.entry_size() {
            Ok(size) => size,
            Err(e) => {
                tracing::debug!("Skipping tar header with invalid size: {e}");
                continue;
            }
        };
        let padding = size.next_multiple_of(BLOCK_SIZE as u64) - size;
        let entry_type = header.entry_type();

        if entry_type.is_gnu_longname() && size <= MAX_LONG_NAME {
            let mut name = Vec::new();
            (&mut reader).take(size).read_to_end(&mut name)?;
            if !skip(&mut reader, padding)? {
                return Ok(None);
            }
            long_name = Some(name);
            continue;
        }

        let path = match long_name.take() {
            Some(name) => Some(long_name_path(&name)),
            None => match header.path() {
                Ok(path) => Some(path.into_owned()),
                Err(e) => {
                    tracing::debug!("Skipping tar entry with invalid path: {e}");
                    None
                }
            },
        };

        let matches = entry_type.is_file() && path.is_some_and(|p| has_base_name(&p, target));
        if matches {
            let written = write_executable(&mut (&mut reader).take(size), dest)?;
            if written < size {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("tar entry '{target}' truncated at {written} of {size} bytes"),
                )
                .into());
            }
            return Ok(Some(written));
        }

        if !skip(&mut reader, size + padding)? {
            return Ok(None);
        }
    }

    Ok(None)
}

/// Fill `block`, returning `false` when the stream ends first.
fn read_block<R: Read>(reader: &mut R, block: &mut [u8; BLOCK_SIZE]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        match reader.read(&mut block[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Discard `len` bytes, returning `false` when the stream ends first.
fn skip<R: Read>(reader: &mut R, len: u64) -> io::Result<bool> {
    let skipped = io::copy(&mut reader.take(len), &mut io::sink())?;
    Ok(skipped == len)
}

/// The checksum field is summed as if it held spaces.
fn checksum_matches(header: &tar::Header) -> bool {
    let Ok(stored) = header.cksum() else {
        return false;
    };
    let computed: u32 = header
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, b)| {
            if CKSUM_FIELD.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(*b)
            }
        })
        .sum();
    stored == computed
}

fn long_name_path(name: &[u8]) -> PathBuf {
    let end = name.iter().position(|b| *b == 0).unwrap_or(name.len());
    PathBuf::from(String::from_utf8_lossy(&name[..end]).into_owned())
}

fn write_executable<R: Read>(reader: &mut R, dest: &Path) -> io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o755);
    }

    let mut out = options.open(dest)?;
    let written = io::copy(reader, &mut out)?;
    out.sync_all()?;
    drop(out);

    // `mode` only applies when the file is created.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dest, fs::Permissions::from_mode(0o755))?;
    }

    Ok(written)
}
