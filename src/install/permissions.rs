//! File mode recovery from archive metadata

use std::fmt;

/// File type mask
pub const S_IFMT: u32 = 0o170_000;
/// Directory type bits
pub const S_IFDIR: u32 = 0o040_000;
/// Regular file type bits
pub const S_IFREG: u32 = 0o100_000;
/// rwxrwxrwx
pub const S_IRWXUGO: u32 = 0o777;

const DEFAULT_DIR_MODE: u32 = 0o777;
const DEFAULT_FILE_MODE: u32 = 0o666;

/// The process file-creation mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Umask(u32);

impl Umask {
    /// Wrap explicit mask bits
    pub fn new(bits: u32) -> Self {
        Self(bits & S_IRWXUGO)
    }

    /// Read the current process umask
    ///
    /// The only portable way to read it is to set it, so it is set to 0 and
    /// immediately restored. Call once at startup, before other threads exist.
    #[cfg(unix)]
    pub fn current() -> Self {
        // SAFETY: umask has no failure mode; the previous value is restored at once
        let previous = unsafe { libc::umask(0) };
        unsafe { libc::umask(previous) };
        Self::new(u32::from(previous))
    }

    /// Platforms without a umask behave like the common 022 default
    #[cfg(not(unix))]
    pub fn current() -> Self {
        Self::new(0o022)
    }

    /// Mask bits
    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Mode of an installed file: type bits plus rwxrwxrwx, never setuid/setgid/sticky
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    /// Derive the mode for an archive member
    ///
    /// Mode bits recorded by a POSIX archiver win; otherwise the
    /// type-dependent default is masked by the umask.
    pub fn for_member(recorded: Option<u32>, is_dir: bool, umask: Umask) -> Self {
        let type_bits = if is_dir { S_IFDIR } else { S_IFREG };
        match recorded {
            Some(mode) => {
                let file_type = match mode & S_IFMT {
                    0 => type_bits,
                    recorded_type => recorded_type,
                };
                Self(file_type | (mode & S_IRWXUGO))
            }
            None => Self::default_for(is_dir, umask),
        }
    }

    /// Default mode for a newly created file or directory
    pub fn default_for(is_dir: bool, umask: Umask) -> Self {
        let (type_bits, base) = if is_dir {
            (S_IFDIR, DEFAULT_DIR_MODE)
        } else {
            (S_IFREG, DEFAULT_FILE_MODE)
        };
        Self(type_bits | (base & !umask.bits()))
    }

    /// Type and permission bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Permission bits only
    pub fn permissions(&self) -> u32 {
        self.0 & S_IRWXUGO
    }

    /// Whether the type bits say directory
    pub fn is_dir(&self) -> bool {
        self.0 & S_IFMT == S_IFDIR
    }
}

impl fmt::Display for FileMode {
    /// `ls -l` style, e.g. `-rwxr-xr-x`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0 & S_IFMT {
            S_IFDIR => 'd',
            0o120_000 => 'l',
            _ => '-',
        };
        let mut out = String::with_capacity(10);
        out.push(kind);
        for shift in [6, 3, 0] {
            let bits = (self.0 >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        write!(f, "{}", out)
    }
}
