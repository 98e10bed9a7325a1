//! The resolve → cache → install pipeline
//!
//! Each stage reads the previous stage's output: `update` writes the lock
//! manifest, `download` fills the cache from it, `install` and `clean` work
//! on the working directory. Every error aborts the whole command; output
//! already printed for earlier entries stays in place.

use crate::archive::ArchiveReader;
use crate::cache::{Cache, CacheKey, CacheRecord};
use crate::error::{ArtError, ArtResult};
use crate::gitlab::{GitlabApi, LazyApi};
use crate::install::{
    self, check_extraction, install_from_archive, install_unextracted, InstalledFile,
    PlanOptions, Removal, Umask,
};
use crate::manifest::{ManifestPaths, ResolvedEntry};
use crate::resolve;
use crate::ui::{self, DownloadProgress, TaskSpinner, UiContext};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, info};

/// Per-invocation state shared by every command
pub struct Context {
    pub cache: Cache,
    /// File-creation mask captured at startup
    pub umask: Umask,
    pub ui: UiContext,
    /// Directory installs are relative to
    pub work_dir: PathBuf,
    pub manifests: ManifestPaths,
}

impl Context {
    /// Context for `work_dir`, capturing the process umask
    pub fn new(cache_root: PathBuf, work_dir: PathBuf, ui: UiContext) -> Self {
        Self {
            cache: Cache::new(cache_root),
            umask: Umask::current(),
            ui,
            manifests: ManifestPaths::in_dir(&work_dir),
            work_dir,
        }
    }
}

/// Options for `update`
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub keep_empty_dirs: bool,
    /// Remove destinations the previous lock installed that the new one no longer does
    pub clean: bool,
}

/// Options for `install`
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub keep_empty_dirs: bool,
    /// Recompute `files` even when the lock manifest has them
    pub refresh: bool,
}

/// One installed entry, as reported by `install --json`
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    #[serde(flatten)]
    pub resolved: ResolvedEntry,
    pub installed: Vec<InstalledFile>,
}

fn label(resolved: &ResolvedEntry) -> String {
    format!("{}: {}", resolved.entry.project, resolved.resolved_id)
}

/// Resolve every declared entry, cache its archive and compute its `files`
///
/// Entries whose install requests need extraction while extraction is off
/// are rejected before any network access.
pub fn update(
    ctx: &Context,
    api: &mut LazyApi<'_>,
    options: UpdateOptions,
) -> ArtResult<Vec<ResolvedEntry>> {
    let entries = ctx.manifests.load_artifacts()?;
    for entry in &entries {
        check_extraction(entry)?;
    }
    let api = api.get()?;
    let previous = if options.clean {
        ctx.manifests.load_lock_optional()?
    } else {
        Vec::new()
    };

    let plan_options = PlanOptions {
        keep_empty_dirs: options.keep_empty_dirs,
    };

    let mut locked = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut spinner = TaskSpinner::new(&ctx.ui);
        spinner.start(&format!("Resolving {}", entry.describe()));
        let mut resolved = match resolve::resolve(api, &entry) {
            Ok(resolved) => resolved,
            Err(e) => {
                spinner.stop_error(&format!("{}: {}", entry.project, entry.git_ref));
                return Err(e);
            }
        };
        spinner.stop(&format!(
            "{}: {} => {}",
            entry.project, entry.git_ref, resolved.resolved_id
        ));

        let record = ensure_cached(ctx, api, &resolved)?;
        resolved.sha256 = Some(record.sha256.clone());
        resolved.files = Some(compute_files(&resolved, &record, plan_options)?);
        locked.push(resolved);
    }

    if options.clean {
        remove_stale(ctx, &previous, &locked)?;
    }

    ctx.manifests.save_lock(&locked)?;
    info!("Wrote {}", ctx.manifests.lock.display());
    Ok(locked)
}

/// Fill the cache for every lock record
pub fn download(ctx: &Context, api: &mut LazyApi<'_>) -> ArtResult<Vec<CacheRecord>> {
    let lock = ctx.manifests.load_lock()?;
    let mut records = Vec::with_capacity(lock.len());
    for resolved in &lock {
        let key = CacheKey::for_entry(resolved)?;
        if ctx.cache.contains(&key) {
            ui::step_ok(&ctx.ui, &format!("{} => present", label(resolved)));
            records.push(ctx.cache.record(&key)?);
            continue;
        }
        records.push(download_into_cache(ctx, api.get()?, resolved, &key)?);
    }
    Ok(records)
}

/// Install every lock record into the working directory
pub fn install(
    ctx: &Context,
    api: &mut LazyApi<'_>,
    options: InstallOptions,
) -> ArtResult<Vec<InstallReport>> {
    let lock = ctx.manifests.load_lock()?;
    let plan_options = PlanOptions {
        keep_empty_dirs: options.keep_empty_dirs,
    };
    let recompute = options.refresh || options.keep_empty_dirs;

    let mut reports = Vec::with_capacity(lock.len());
    for mut resolved in lock {
        check_extraction(&resolved.entry)?;
        let key = CacheKey::for_entry(&resolved)?;
        let path = open_cached(ctx, api, &resolved, &key)?;

        let files = match resolved.files.take() {
            Some(files) if !recompute => files,
            _ => {
                debug!("Computing files for {}", label(&resolved));
                let record = ctx.cache.record(&key)?;
                compute_files(&resolved, &record, plan_options)?
            }
        };

        let installed = if resolved.entry.extract {
            let mut archive = ArchiveReader::open(open_file(&path)?)?;
            install_from_archive(&mut archive, &files, &ctx.work_dir, ctx.umask)?
        } else {
            install_unextracted(&path, &files, &ctx.work_dir, ctx.umask)?
        };

        ui::step_ok(
            &ctx.ui,
            &format!("{} => installed {} file(s)", label(&resolved), installed.len()),
        );
        for file in &installed {
            debug!("{} {} => {}", file.mode_string(), file.source, file.destination);
        }

        resolved.files = Some(files);
        reports.push(InstallReport {
            resolved,
            installed,
        });
    }
    Ok(reports)
}

/// Remove everything the lock manifest says was installed
pub fn clean(ctx: &Context, dry_run: bool) -> ArtResult<Vec<(String, Removal)>> {
    let lock = ctx.manifests.load_lock()?;
    let mut outcomes = Vec::new();
    // Later entries may install into directories created by earlier ones
    for resolved in lock.iter().rev() {
        let Some(files) = &resolved.files else {
            ui::step_warn(
                &ctx.ui,
                &format!(
                    "{}: no installed files recorded, run 'art update' first",
                    label(resolved)
                ),
            );
            continue;
        };
        let removed = install::remove_installed(files, &ctx.work_dir, dry_run)?;
        report_removals(&ctx.ui, &removed, dry_run);
        outcomes.extend(removed);
    }
    Ok(outcomes)
}

fn report_removals(ui_ctx: &UiContext, removed: &[(String, Removal)], dry_run: bool) {
    let verb = if dry_run { "would remove" } else { "removed" };
    for (destination, outcome) in removed {
        match outcome {
            Removal::File => ui::step_ok(ui_ctx, &format!("{} {}", verb, destination)),
            Removal::Directory => ui::step_ok(ui_ctx, &format!("{} {}/", verb, destination)),
            Removal::Skipped => debug!("skipped {}", destination),
        }
    }
}

/// Destinations of `previous` that `current` no longer installs
fn remove_stale(
    ctx: &Context,
    previous: &[ResolvedEntry],
    current: &[ResolvedEntry],
) -> ArtResult<()> {
    let keep: IndexSet<&String> = current
        .iter()
        .filter_map(|r| r.files.as_ref())
        .flat_map(|files| files.values())
        .collect();

    let stale: IndexMap<String, String> = previous
        .iter()
        .filter_map(|r| r.files.as_ref())
        .flat_map(|files| files.values())
        .filter(|dest| !keep.contains(dest))
        .map(|dest| (dest.clone(), dest.clone()))
        .collect();

    if stale.is_empty() {
        return Ok(());
    }
    let removed = install::remove_installed(&stale, &ctx.work_dir, false)?;
    report_removals(&ctx.ui, &removed, false);
    Ok(())
}

/// Compute the `files` mapping from the cached archive
fn compute_files(
    resolved: &ResolvedEntry,
    record: &CacheRecord,
    options: PlanOptions,
) -> ArtResult<IndexMap<String, String>> {
    if !resolved.entry.extract {
        return install::plan_unextracted(resolved);
    }
    let mut archive = ArchiveReader::open(open_file(&record.path)?)?;
    let members = archive.members()?;
    install::plan(resolved, &members, options, &record.path)
}

/// Make sure the archive is cached, downloading on a miss
fn ensure_cached(
    ctx: &Context,
    api: &dyn GitlabApi,
    resolved: &ResolvedEntry,
) -> ArtResult<CacheRecord> {
    let key = CacheKey::for_entry(resolved)?;
    match ctx.cache.record(&key) {
        Ok(record) => {
            if let Some(expected) = &resolved.sha256 {
                if !expected.eq_ignore_ascii_case(&record.sha256) {
                    return Err(ArtError::ChecksumMismatch {
                        key: key.to_string(),
                        expected: expected.clone(),
                        actual: record.sha256,
                    });
                }
            }
            ui::step_ok(&ctx.ui, &format!("{} => present", label(resolved)));
            Ok(record)
        }
        Err(e) if e.is_cache_miss() => download_into_cache(ctx, api, resolved, &key),
        Err(e) => Err(e),
    }
}

/// Path of the cached archive, downloading it first on a miss
fn open_cached(
    ctx: &Context,
    api: &mut LazyApi<'_>,
    resolved: &ResolvedEntry,
    key: &CacheKey,
) -> ArtResult<PathBuf> {
    match ctx.cache.get(key) {
        Ok(_) => Ok(ctx.cache.path(key)),
        Err(e) if e.is_cache_miss() => {
            debug!("{} not cached", key);
            Ok(download_into_cache(ctx, api.get()?, resolved, key)?.path)
        }
        Err(e) => Err(e),
    }
}

fn download_into_cache(
    ctx: &Context,
    api: &dyn GitlabApi,
    resolved: &ResolvedEntry,
    key: &CacheKey,
) -> ArtResult<CacheRecord> {
    let label = label(resolved);
    let download = resolve::download(api, resolved)?;
    let progress = DownloadProgress::new(&ctx.ui, &label, download.length);
    let saved = ctx.cache.save_verified(
        key,
        progress.wrap(download.reader),
        resolved.sha256.as_deref(),
    );
    progress.finish();

    let record = saved?;
    ui::step_ok(&ctx.ui, &format!("{} => downloaded", label));
    Ok(record)
}

fn open_file(path: &std::path::Path) -> ArtResult<File> {
    File::open(path).map_err(|e| ArtError::io(format!("opening {}", path.display()), e))
}
