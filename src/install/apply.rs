//! Writing planned files into the working directory
//!
//! Content is written first and modes applied afterwards, so a read-only or
//! non-searchable directory never blocks extraction of its own subtree.

use crate::archive::{ArchiveMember, ArchiveReader};
use crate::error::{ArtError, ArtResult};
use crate::install::permissions::{FileMode, Umask};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Seek};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// One installed destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledFile {
    /// Archive member path (or archive file name when not extracted)
    pub source: String,
    /// Destination relative to the working directory
    pub destination: String,
    /// Applied mode, type and permission bits
    pub mode: u32,
}

impl InstalledFile {
    /// `ls -l` style mode string
    pub fn mode_string(&self) -> String {
        FileMode::for_member(Some(self.mode), false, Umask::new(0)).to_string()
    }
}

/// A write from phase one whose mode is applied in phase two
struct PendingMode {
    path: PathBuf,
    mode: FileMode,
}

/// Extract every mapping of `files` from the archive below `base`
pub fn install_from_archive<R: Read + Seek>(
    archive: &mut ArchiveReader<R>,
    files: &IndexMap<String, String>,
    base: &Path,
    umask: Umask,
) -> ArtResult<Vec<InstalledFile>> {
    let members: HashMap<String, ArchiveMember> = archive
        .members()?
        .into_iter()
        .map(|m| (m.path.clone(), m))
        .collect();

    // Validate the whole mapping before writing anything
    let mut planned = Vec::with_capacity(files.len());
    for (source, destination) in files {
        let member = members.get(source).ok_or_else(|| {
            ArtError::NotFound(format!(
                "Archive member '{}' recorded in the lock manifest is missing from the archive",
                source
            ))
        })?;
        planned.push((source, destination, member, target_path(base, destination)?));
    }

    let directories: Vec<&Path> = planned
        .iter()
        .filter(|(_, _, member, _)| member.is_dir)
        .map(|(_, _, _, target)| target.as_path())
        .collect();
    unlock_directories(directories)?;

    let mut pending = Vec::with_capacity(planned.len());
    let mut installed = Vec::with_capacity(planned.len());

    for (source, destination, member, target) in planned {
        let mode = FileMode::for_member(member.mode, member.is_dir, umask);

        if member.is_dir {
            create_dirs(&target)?;
        } else {
            let mut out = create_file(&target)?;
            archive.copy_member(source, &mut out)?;
        }

        debug!("Wrote {} ({})", target.display(), mode);
        installed.push(InstalledFile {
            source: source.clone(),
            destination: destination.clone(),
            mode: mode.bits(),
        });
        pending.push(PendingMode { path: target, mode });
    }

    apply_modes(&pending)?;
    Ok(installed)
}

/// Copy a whole cached file to every destination of `files`
pub fn install_unextracted(
    source_path: &Path,
    files: &IndexMap<String, String>,
    base: &Path,
    umask: Umask,
) -> ArtResult<Vec<InstalledFile>> {
    let mode = FileMode::default_for(false, umask);
    let mut pending = Vec::with_capacity(files.len());
    let mut installed = Vec::with_capacity(files.len());

    let targets = files
        .values()
        .map(|destination| target_path(base, destination))
        .collect::<ArtResult<Vec<_>>>()?;

    for ((source, destination), target) in files.iter().zip(targets) {
        let mut input = File::open(source_path)
            .map_err(|e| ArtError::io(format!("opening {}", source_path.display()), e))?;
        let mut out = create_file(&target)?;
        io::copy(&mut input, &mut out)
            .map_err(|e| ArtError::io(format!("writing {}", target.display()), e))?;

        installed.push(InstalledFile {
            source: source.clone(),
            destination: destination.clone(),
            mode: mode.bits(),
        });
        pending.push(PendingMode { path: target, mode });
    }

    apply_modes(&pending)?;
    Ok(installed)
}

/// Resolve a recorded destination below `base`
///
/// Lock manifests are editable, so absolute destinations and `..` components
/// are refused rather than trusted.
fn target_path(base: &Path, destination: &str) -> ArtResult<PathBuf> {
    let relative = Path::new(destination);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(ArtError::PathInvalid {
            path: relative.to_path_buf(),
            reason: "install destination must stay inside the working directory".to_string(),
        });
    }
    Ok(base.join(relative))
}

/// Give directories left read-only by an earlier install owner write and search access
///
/// Shallowest first; phase two restores the recorded modes.
fn unlock_directories(mut directories: Vec<&Path>) -> ArtResult<()> {
    directories.sort_by_key(|p| p.components().count());
    for dir in directories {
        match fs::symlink_metadata(dir) {
            Ok(meta) if meta.is_dir() => add_owner_access(dir, meta.permissions())?,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(unix)]
fn add_owner_access(path: &Path, perms: fs::Permissions) -> ArtResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = perms.mode() & 0o7777;
    if mode & 0o300 == 0o300 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o300))
        .map_err(|e| ArtError::io(format!("unlocking {}", path.display()), e))
}

#[cfg(not(unix))]
fn add_owner_access(path: &Path, mut perms: fs::Permissions) -> ArtResult<()> {
    if !perms.readonly() {
        return Ok(());
    }
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
        .map_err(|e| ArtError::io(format!("unlocking {}", path.display()), e))
}

fn create_dirs(path: &Path) -> ArtResult<()> {
    fs::create_dir_all(path)
        .map_err(|e| ArtError::io(format!("creating directory {}", path.display()), e))
}

/// Create (or replace) a destination file, creating parent directories
///
/// An existing file is unlinked first: a previous install may have left it read-only.
fn create_file(path: &Path) -> ArtResult<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dirs(parent)?;
        }
    }

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(ArtError::io(format!("replacing {}", path.display()), e)),
    }

    File::create(path).map_err(|e| ArtError::io(format!("creating {}", path.display()), e))
}

/// Phase two: apply modes after all content exists
///
/// Deepest paths first, so a parent directory losing its write or search bit
/// does not prevent updating its children.
fn apply_modes(pending: &[PendingMode]) -> ArtResult<()> {
    let mut ordered: Vec<&PendingMode> = pending.iter().collect();
    ordered.sort_by_key(|p| std::cmp::Reverse(p.path.components().count()));

    for item in ordered {
        set_mode(&item.path, item.mode)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> ArtResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(mode.permissions());
    fs::set_permissions(path, perms)
        .map_err(|e| ArtError::io(format!("setting permissions on {}", path.display()), e))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: FileMode) -> ArtResult<()> {
    let mut perms = fs::metadata(path)
        .map_err(|e| ArtError::io(format!("reading {}", path.display()), e))?
        .permissions();
    perms.set_readonly(mode.permissions() & 0o222 == 0);
    fs::set_permissions(path, perms)
        .map_err(|e| ArtError::io(format!("setting permissions on {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn files(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(s, d)| (s.to_string(), d.to_string()))
            .collect()
    }

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode()
    }

    #[test]
    fn extracts_content_into_nested_destinations() {
        let dir = TempDir::new().unwrap();
        let bytes = build_zip(&[("bin/tool", b"tool", None), ("README", b"readme", None)]);
        let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();

        let installed = install_from_archive(
            &mut archive,
            &files(&[("bin/tool", "out/deep/tool"), ("README", "README.md")]),
            dir.path(),
            Umask::new(0o022),
        )
        .unwrap();

        assert_eq!(installed.len(), 2);
        assert_eq!(fs::read(dir.path().join("out/deep/tool")).unwrap(), b"tool");
        assert_eq!(fs::read(dir.path().join("README.md")).unwrap(), b"readme");
    }

    #[test]
    fn destinations_outside_the_working_directory_are_refused() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();

        let escaping = build_zip(&[("../escaped.txt", b"evil", None)]);
        let mut archive = ArchiveReader::open(Cursor::new(escaping)).unwrap();
        let err = install_from_archive(
            &mut archive,
            &files(&[("../escaped.txt", "escaped.txt")]),
            &work,
            Umask::new(0o022),
        )
        .unwrap_err();
        assert!(matches!(err, ArtError::PathInvalid { .. }));

        let bytes = build_zip(&[("README", b"readme", None)]);
        for destination in ["../escaped.txt", "docs/../../escaped.txt", "/tmp/art-escaped.txt"] {
            let mut archive = ArchiveReader::open(Cursor::new(bytes.clone())).unwrap();
            let err = install_from_archive(
                &mut archive,
                &files(&[("README", destination)]),
                &work,
                Umask::new(0o022),
            )
            .unwrap_err();
            assert!(matches!(err, ArtError::PathInvalid { .. }), "{destination}");
        }

        let cached = dir.path().join("cached");
        fs::write(&cached, b"raw").unwrap();
        let err = install_unextracted(
            &cached,
            &files(&[("tools.zip", "../tools.zip")]),
            &work,
            Umask::new(0o022),
        )
        .unwrap_err();
        assert!(matches!(err, ArtError::PathInvalid { .. }));

        assert!(!dir.path().join("escaped.txt").exists());
        assert!(!dir.path().join("tools.zip").exists());
    }

    #[cfg(unix)]
    #[test]
    fn posix_mode_applied() {
        let dir = TempDir::new().unwrap();
        let bytes = build_zip(&[("bin/tool", b"#!/bin/sh\n", Some(0o755))]);
        let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();

        let installed = install_from_archive(
            &mut archive,
            &files(&[("bin/tool", "tool")]),
            dir.path(),
            Umask::new(0o077),
        )
        .unwrap();

        assert_eq!(installed[0].mode, 0o100_755);
        assert_eq!(mode_of(&dir.path().join("tool")), 0o100_755);
        assert_eq!(installed[0].mode_string(), "-rwxr-xr-x");
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_does_not_block_its_children() {
        let dir = TempDir::new().unwrap();
        let bytes = build_zip(&[
            ("ro/", b"", Some(0o555)),
            ("ro/file", b"data", Some(0o444)),
        ]);
        let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();

        install_from_archive(
            &mut archive,
            &files(&[("ro/", "ro"), ("ro/file", "ro/file")]),
            dir.path(),
            Umask::new(0o022),
        )
        .unwrap();

        assert_eq!(fs::read(dir.path().join("ro/file")).unwrap(), b"data");
        assert_eq!(mode_of(&dir.path().join("ro")) & 0o777, 0o555);

        // Restore so TempDir can clean up
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir.path().join("ro"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn reinstall_into_read_only_directory_is_identical() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let bytes = build_zip(&[
            ("ro/", b"", Some(0o555)),
            ("ro/file", b"data", Some(0o444)),
        ]);
        let mapping = files(&[("ro/", "ro/"), ("ro/file", "ro/file")]);

        for _ in 0..2 {
            let mut archive = ArchiveReader::open(Cursor::new(bytes.clone())).unwrap();
            install_from_archive(&mut archive, &mapping, dir.path(), Umask::new(0o022)).unwrap();
            assert_eq!(fs::read(dir.path().join("ro/file")).unwrap(), b"data");
            assert_eq!(mode_of(&dir.path().join("ro")), 0o040_555);
            assert_eq!(mode_of(&dir.path().join("ro/file")), 0o100_444);
        }

        fs::set_permissions(dir.path().join("ro"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn reinstall_over_read_only_file_is_identical() {
        let dir = TempDir::new().unwrap();
        let bytes = build_zip(&[("f", b"content", Some(0o444))]);
        let mapping = files(&[("f", "f")]);

        for _ in 0..2 {
            let mut archive = ArchiveReader::open(Cursor::new(bytes.clone())).unwrap();
            install_from_archive(&mut archive, &mapping, dir.path(), Umask::new(0o022)).unwrap();
            assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"content");
            assert_eq!(mode_of(&dir.path().join("f")), 0o100_444);
        }
    }

    #[test]
    fn missing_member_is_an_error() {
        let dir = TempDir::new().unwrap();
        let bytes = build_zip(&[("a", b"a", None)]);
        let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();

        let err = install_from_archive(
            &mut archive,
            &files(&[("gone", "gone")]),
            dir.path(),
            Umask::new(0o022),
        )
        .unwrap_err();
        assert!(err.to_string().contains("gone"));
    }

    #[cfg(unix)]
    #[test]
    fn unextracted_copy_uses_default_mode() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cached");
        fs::write(&source, b"raw archive").unwrap();

        let installed = install_unextracted(
            &source,
            &files(&[("tools.zip", "vendor/tools.zip")]),
            dir.path(),
            Umask::new(0o022),
        )
        .unwrap();

        assert_eq!(installed[0].mode, 0o100_644);
        assert_eq!(
            fs::read(dir.path().join("vendor/tools.zip")).unwrap(),
            b"raw archive"
        );
        assert_eq!(mode_of(&dir.path().join("vendor/tools.zip")), 0o100_644);
    }
}
