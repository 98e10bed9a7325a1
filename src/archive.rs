//! Zip archive access
//!
//! Opens a cached archive for random access and enumerates its members with
//! the metadata the installer needs.

use crate::error::{ArtError, ArtResult};
use std::io::{self, Read, Seek, Write};
use std::path::PathBuf;
use zip::ZipArchive;

/// One member of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Path as stored in the archive (directories end with `/`)
    pub path: String,
    /// Whether the member is a directory
    pub is_dir: bool,
    /// Mode bits recorded by the archiver, when it recorded any
    pub mode: Option<u32>,
}

/// Random-access reader over a zip archive
pub struct ArchiveReader<R: Read + Seek> {
    zip: ZipArchive<R>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Open an archive from a seekable byte source
    pub fn open(source: R) -> ArtResult<Self> {
        Ok(Self {
            zip: ZipArchive::new(source)?,
        })
    }

    /// Enumerate members in archive order
    pub fn members(&mut self) -> ArtResult<Vec<ArchiveMember>> {
        let mut members = Vec::with_capacity(self.zip.len());
        for index in 0..self.zip.len() {
            let file = self.zip.by_index_raw(index)?;
            // Absolute names and names climbing out with `..` never install
            if file.enclosed_name().is_none() {
                return Err(ArtError::PathInvalid {
                    path: PathBuf::from(file.name()),
                    reason: "archive member escapes the extraction directory".to_string(),
                });
            }
            members.push(ArchiveMember {
                path: file.name().to_string(),
                is_dir: file.is_dir(),
                mode: file.unix_mode(),
            });
        }
        Ok(members)
    }

    /// Copy the decompressed content of `path` into `writer`, returning the byte count
    pub fn copy_member(&mut self, path: &str, writer: &mut impl Write) -> ArtResult<u64> {
        let mut file = self.zip.by_name(path)?;
        io::copy(&mut file, writer)
            .map_err(|e| ArtError::io(format!("extracting archive member {}", path), e))
    }
}

/// Strip `num` leading components from a `/`-separated archive path
///
/// A trailing `/` (directory member) is preserved on whatever remains.
pub fn strip_components(path: &str, num: usize) -> String {
    if path.is_empty() {
        return String::new();
    }

    let is_dir = path.ends_with('/');
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() <= num {
        return String::new();
    }

    let mut stripped = parts[num..].join("/");
    if is_dir {
        stripped.push('/');
    }
    stripped
}
