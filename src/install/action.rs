//! Install actions: one compiled source pattern => destination pair

use std::fmt;

/// How a source pattern selects archive members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// `.` selects every member
    CopyAll,
    /// `dir/` selects every member below `dir/`
    DirectoryPrefix,
    /// Anything else selects exactly one member
    ExactFile,
}

impl PatternKind {
    /// Classify a source pattern
    pub fn of(pattern: &str) -> Self {
        if pattern == "." {
            Self::CopyAll
        } else if pattern.ends_with('/') {
            Self::DirectoryPrefix
        } else {
            Self::ExactFile
        }
    }
}

/// A user request to install archive members from `source` to `destination`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallAction {
    source: String,
    destination: String,
    kind: PatternKind,
}

impl InstallAction {
    /// Compile a pattern/destination pair
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            kind: PatternKind::of(&source),
            source,
            destination: destination.into(),
        }
    }

    /// Source pattern
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Destination path
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Pattern kind
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Whether the canonical archive path is selected by this action
    pub fn matches(&self, path: &str) -> bool {
        match self.kind {
            PatternKind::CopyAll => true,
            PatternKind::DirectoryPrefix => path.starts_with(&self.source),
            PatternKind::ExactFile => path == self.source,
        }
    }

    /// Destination for a canonical archive path this action matched
    pub fn translate(&self, path: &str) -> String {
        match self.kind {
            PatternKind::CopyAll => join(&self.destination, path),
            PatternKind::DirectoryPrefix => {
                let rest = path.strip_prefix(&self.source).unwrap_or(path);
                join(&self.destination, rest)
            }
            PatternKind::ExactFile => {
                if self.destination.ends_with('/') {
                    let name = path.rsplit('/').next().unwrap_or(path);
                    join(&self.destination, name)
                } else {
                    self.destination.clone()
                }
            }
        }
    }
}

impl fmt::Display for InstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.source, self.destination)
    }
}

/// Join a destination and an archive-relative remainder with `/`
///
/// An empty remainder names the destination itself.
pub fn join(base: &str, rest: &str) -> String {
    if rest.is_empty() {
        base.to_string()
    } else if base.is_empty() {
        rest.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, rest)
    } else {
        format!("{}/{}", base, rest)
    }
}
