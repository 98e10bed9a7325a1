//! Matching install actions against archive members
//!
//! Planning is pure: it takes the member list and the entry's install
//! requests and produces the `files` mapping stored in the lock manifest.

use crate::archive::{strip_components, ArchiveMember};
use crate::error::{ArtError, ArtResult};
use crate::install::action::{InstallAction, PatternKind};
use crate::manifest::{ArtifactEntry, ResolvedEntry};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Options that change which members are planned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Keep directory members, so empty directories are recreated
    pub keep_empty_dirs: bool,
}

/// Compile the install requests of an entry, in declared order
pub fn actions_for(resolved: &ResolvedEntry) -> Vec<InstallAction> {
    resolved
        .entry
        .install
        .iter()
        .map(|(src, dest)| InstallAction::new(src.as_str(), dest.as_str()))
        .collect()
}

/// Reject install requests that need extraction when extraction is disabled
pub fn check_extraction(entry: &ArtifactEntry) -> ArtResult<()> {
    if entry.extract {
        return Ok(());
    }
    match entry
        .install
        .keys()
        .find(|src| PatternKind::of(src) != PatternKind::CopyAll)
    {
        Some(src) => Err(ArtError::InstallRequiresExtraction {
            project: entry.project.clone(),
            source_path: src.clone(),
        }),
        None => Ok(()),
    }
}

/// Mapping for an entry installed without extraction: the whole archive to each destination
pub fn plan_unextracted(resolved: &ResolvedEntry) -> ArtResult<IndexMap<String, String>> {
    check_extraction(&resolved.entry)?;

    let archive_name = resolved.archive_name();
    let mut files = IndexMap::new();
    for dest in resolved.entry.install.values() {
        let target = if dest.ends_with('/') {
            format!("{}{}", dest, archive_name)
        } else {
            dest.clone()
        };
        files.insert(archive_name.clone(), target);
    }
    Ok(files)
}

/// Canonical form of an archive member path used for matching
pub fn canonical_path(resolved: &ResolvedEntry, member_path: &str) -> String {
    if resolved.entry.source.has_archive_prefix() {
        strip_components(member_path, 1)
    } else {
        member_path.to_string()
    }
}

/// Match archive members against the entry's install requests
///
/// Each member goes to the first declared action that matches it. Returns
/// archive member path => destination, in archive order. Every request must
/// match at least one member and no two members may share a destination.
pub fn plan(
    resolved: &ResolvedEntry,
    members: &[ArchiveMember],
    options: PlanOptions,
    archive_path: &Path,
) -> ArtResult<IndexMap<String, String>> {
    check_extraction(&resolved.entry)?;

    let actions = actions_for(resolved);
    let mut satisfied = vec![false; actions.len()];
    let mut files: IndexMap<String, String> = IndexMap::new();
    // destination => (member path, is_dir) of the first member mapped there
    let mut owners: HashMap<String, (String, bool)> = HashMap::new();

    for member in members {
        if member.is_dir && !options.keep_empty_dirs {
            continue;
        }

        let canonical = canonical_path(resolved, &member.path);
        if canonical.is_empty() {
            continue;
        }

        let matched = actions.iter().enumerate().find(|(index, action)| {
            let consumed = satisfied[*index] && action.kind() == PatternKind::ExactFile;
            !consumed && action.matches(&canonical)
        });
        let Some((index, action)) = matched else {
            continue;
        };

        let destination = action.translate(&canonical);
        match owners.get(&destination) {
            // Directories from several requests merge into one destination
            Some((_, true)) if member.is_dir => {}
            Some((first, _)) => {
                return Err(ArtError::InstallConflict {
                    destination,
                    first: first.clone(),
                    second: member.path.clone(),
                });
            }
            None => {
                owners.insert(destination.clone(), (member.path.clone(), member.is_dir));
            }
        }

        debug!("{} => {} ({})", member.path, destination, action);
        files.insert(member.path.clone(), destination);
        satisfied[index] = true;
    }

    let unmatched: Vec<String> = actions
        .iter()
        .zip(&satisfied)
        .filter(|(_, done)| !**done)
        .map(|(action, _)| action.to_string())
        .collect();

    if !unmatched.is_empty() {
        return Err(ArtError::InstallUnmatched {
            archive: archive_path.to_path_buf(),
            project: resolved.entry.project.clone(),
            git_ref: resolved.entry.git_ref.clone(),
            resolved_id: resolved.resolved_id.clone(),
            unmatched,
        });
    }

    Ok(files)
}
