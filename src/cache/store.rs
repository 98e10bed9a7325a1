//! On-disk archive store with atomic, write-once records

use crate::cache::key::CacheKey;
use crate::error::{ArtError, ArtResult};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A record that is present in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    /// Absolute path of the cached archive
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
}

/// Reader adapter that hashes and counts everything read through it
struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    size: u64,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            size: 0,
        }
    }

    fn finish(self) -> (u64, String) {
        (self.size, hex::encode(self.hasher.finalize()))
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }
}

/// Hash a file's contents using SHA256
pub fn hash_file(path: &Path) -> ArtResult<String> {
    let file = File::open(path)
        .map_err(|e| ArtError::io(format!("opening {}", path.display()), e))?;
    let mut reader = HashingReader::new(file);
    io::copy(&mut reader, &mut io::sink())
        .map_err(|e| ArtError::io(format!("reading {}", path.display()), e))?;
    Ok(reader.finish().1)
}

/// Content-addressed archive cache rooted at a directory
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    /// Create a cache handle; the directory is created lazily on first save
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a key
    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Whether a record exists for the key
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path(key).is_file()
    }

    /// Open a cached archive
    ///
    /// A missing record is reported as [`ArtError::CacheMiss`]; every other
    /// failure is an IO error.
    pub fn get(&self, key: &CacheKey) -> ArtResult<File> {
        let path = self.path(key);
        match File::open(&path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ArtError::CacheMiss(key.to_string())),
            Err(e) => Err(ArtError::io(format!("opening cache file {}", path.display()), e)),
        }
    }

    /// Stream `source` into the cache under `key`
    pub fn save(&self, key: &CacheKey, source: impl Read) -> ArtResult<CacheRecord> {
        self.save_verified(key, source, None)
    }

    /// Stream `source` into the cache, rejecting content whose SHA-256 differs from `expected`
    ///
    /// The bytes land in a temporary file next to the final path and are
    /// renamed into place only once complete and verified. An existing record
    /// is never replaced.
    pub fn save_verified(
        &self,
        key: &CacheKey,
        source: impl Read,
        expected: Option<&str>,
    ) -> ArtResult<CacheRecord> {
        let path = self.path(key);
        let parent = path.parent().ok_or_else(|| ArtError::PathInvalid {
            path: path.clone(),
            reason: "cache path has no parent".to_string(),
        })?;

        fs::create_dir_all(parent)
            .map_err(|e| ArtError::io(format!("creating cache directory {}", parent.display()), e))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(parent)
            .map_err(|e| ArtError::io(format!("creating temp file in {}", parent.display()), e))?;

        let mut reader = HashingReader::new(source);
        io::copy(&mut reader, temp.as_file_mut())
            .map_err(|e| ArtError::io(format!("writing cache file for {}", key), e))?;
        temp.as_file_mut()
            .flush()
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| ArtError::io(format!("syncing cache file for {}", key), e))?;

        let (size, sha256) = reader.finish();
        if let Some(expected) = expected {
            if !expected.eq_ignore_ascii_case(&sha256) {
                return Err(ArtError::ChecksumMismatch {
                    key: key.to_string(),
                    expected: expected.to_string(),
                    actual: sha256,
                });
            }
        }

        match temp.persist_noclobber(&path) {
            Ok(_) => {
                debug!("Cached {} ({} bytes)", key, size);
                Ok(CacheRecord { path, size, sha256 })
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!("{} already cached, keeping existing record", key);
                let size = fs::metadata(&path)
                    .map_err(|e| ArtError::io(format!("reading {}", path.display()), e))?
                    .len();
                let sha256 = hash_file(&path)?;
                Ok(CacheRecord { path, size, sha256 })
            }
            Err(e) => Err(ArtError::io(
                format!("renaming temp file to {}", path.display()),
                e.error,
            )),
        }
    }

    /// Describe an existing record
    pub fn record(&self, key: &CacheKey) -> ArtResult<CacheRecord> {
        let path = self.path(key);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArtError::CacheMiss(key.to_string()))
            }
            Err(e) => return Err(ArtError::io(format!("reading {}", path.display()), e)),
        };
        Ok(CacheRecord {
            size: metadata.len(),
            sha256: hash_file(&path)?,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> CacheKey {
        CacheKey::new("group/proj", "42.zip").unwrap()
    }

    #[test]
    fn save_then_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path());

        let record = cache.save(&key(), &b"archive bytes"[..]).unwrap();
        assert_eq!(record.size, 13);
        assert_eq!(record.path, dir.path().join("group/proj/42.zip"));

        let mut content = Vec::new();
        cache.get(&key()).unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"archive bytes");
        assert!(cache.contains(&key()));
    }

    #[test]
    fn get_unsaved_key_is_cache_miss() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path());

        let err = cache.get(&key()).unwrap_err();
        assert!(err.is_cache_miss());
        assert!(!cache.contains(&key()));
    }

    #[test]
    fn get_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path());
        fs::create_dir_all(cache.path(&key())).unwrap();

        // Opening a directory succeeds on some platforms; reading it must not look like a miss
        match cache.get(&key()) {
            Ok(mut file) => assert!(file.read_to_end(&mut Vec::new()).is_err()),
            Err(e) => assert!(!e.is_cache_miss()),
        }
    }

    #[test]
    fn existing_record_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path());

        cache.save(&key(), &b"first"[..]).unwrap();
        let record = cache.save(&key(), &b"second"[..]).unwrap();

        assert_eq!(fs::read(cache.path(&key())).unwrap(), b"first");
        assert_eq!(record.size, 5);
    }

    #[test]
    fn checksum_mismatch_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path());

        let err = cache
            .save_verified(&key(), &b"bytes"[..], Some("00ff"))
            .unwrap_err();
        assert!(matches!(err, ArtError::ChecksumMismatch { .. }));
        assert!(!cache.contains(&key()));

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("group/proj"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn checksum_match_is_accepted() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path());

        let first = cache.save(&CacheKey::new("p", "1").unwrap(), &b"same"[..]).unwrap();
        let second = cache
            .save_verified(&key(), &b"same"[..], Some(&first.sha256.to_uppercase()))
            .unwrap();
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(hash_file(&second.path).unwrap(), first.sha256);
    }

    #[test]
    fn failing_source_leaves_nothing_behind() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::ConnectionReset, "reset"))
            }
        }

        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path());
        assert!(cache.save(&key(), Broken).is_err());
        assert!(!cache.contains(&key()));
    }
}
