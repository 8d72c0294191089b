// src/pipeline.rs

use crate::authors::{resolve_authors, AuthorMap};
use crate::codec;
use crate::config::MigrationConfig;
use crate::interner::Identities;
use crate::labels::LabelTimeline;
use crate::model::{Commit, LabelEvent, RevisionEvent};
use crate::reconstruct::{reconstruct, CancelToken};
use crate::replay::{replay, ContentStore, ReplayDriver, ReplayOptions, ReplayStats};
use crate::source::{LabelSource, RawRevision, RevisionError, RevisionSource};
use anyhow::{bail, Context, Result};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Result of loading the legacy history into interned events
#[derive(Debug, Default)]
pub struct LoadedHistory {
    pub revisions: Vec<RevisionEvent>,
    pub failures: Vec<RevisionError>,
}

/// Fetch every file's history, in parallel across files, and intern it.
///
/// Unreadable versions are logged and left out. The result is sorted by
/// (timestamp, version).
pub fn load_history<S: RevisionSource + ?Sized>(source: &S, ids: &mut Identities, bar: &ProgressBar) -> LoadedHistory {
    let specs = source.file_specs();
    bar.set_length(specs.len() as u64);
    bar.set_message("Loading file histories");

    let histories: Vec<(String, Vec<Result<RawRevision, RevisionError>>)> = specs
        .into_par_iter()
        .progress_with(bar.clone())
        .map(|spec| {
            let history = source.history(&spec);
            (spec, history)
        })
        .collect();
    bar.finish_with_message("Histories loaded");

    let mut loaded = LoadedHistory::default();
    for (spec, history) in histories {
        let file = ids.files.intern(&spec);
        for entry in history {
            match entry {
                Ok(raw) => {
                    let author = ids.users.intern(&raw.author);
                    loaded.revisions.push(RevisionEvent {
                        file,
                        version: raw.version,
                        timestamp: raw.timestamp,
                        author,
                        raw_author: author,
                        comment: raw.comment,
                    });
                }
                Err(err) => {
                    warn!("Skipping {}", err);
                    loaded.failures.push(err);
                }
            }
        }
    }
    loaded.revisions.sort_by_key(RevisionEvent::sort_key);
    loaded
}

pub fn load_labels<S: LabelSource + ?Sized>(source: &S) -> LabelTimeline {
    LabelTimeline::new(
        source
            .labels()
            .into_iter()
            .map(|raw| LabelEvent {
                text: raw.text,
                timestamp: raw.timestamp,
            })
            .collect(),
    )
}

/// Everything a reconstruction run produced
#[derive(Debug)]
pub struct Reconstruction {
    pub ids: Identities,
    pub commits: Vec<Commit>,
    pub revisions: usize,
    pub failures: usize,
}

/// Load, map authors, and group the legacy history into commits
pub fn run_reconstruction<S>(
    source: &S,
    config: &MigrationConfig,
    cancel: &CancelToken,
    show_progress: bool,
) -> Result<Reconstruction>
where
    S: RevisionSource + LabelSource,
{
    let progress = |len: u64| if show_progress { ProgressBar::new(len) } else { ProgressBar::hidden() };
    let mut ids = Identities::new();

    let loaded = load_history(source, &mut ids, &progress(0));
    let mut revisions = loaded.revisions;
    info!(
        "Loaded {} revisions of {} files ({} unreadable)",
        revisions.len(),
        ids.files.len(),
        loaded.failures.len()
    );

    let map = AuthorMap::load(&config.author_maps)?;
    debug!("{} author mappings in effect", map.len());
    let unmapped = resolve_authors(&mut revisions, &map, &mut ids);
    if !unmapped.is_empty() {
        eprintln!("Unmapped authors ({}):", unmapped.len());
        for raw in &unmapped {
            eprintln!("  {}", raw);
        }
        if config.strict_authors {
            bail!("{} legacy identities have no author mapping", unmapped.len());
        }
    }

    let labels = load_labels(source);
    info!("Loaded {} labels", labels.len());

    let bar = progress(revisions.len() as u64);
    bar.set_message("Reconstructing commits");
    let commits = reconstruct(&revisions, labels, config.silence_span(), cancel, &bar)?;
    bar.finish_with_message("Commits reconstructed");

    Ok(Reconstruction {
        ids,
        commits,
        revisions: revisions.len(),
        failures: loaded.failures.len(),
    })
}

/// Write the commit list and its audit log
pub fn persist(result: &Reconstruction, commit_list: &Path, audit_log: &Path) -> Result<()> {
    codec::save(commit_list, &result.commits, &result.ids)
        .with_context(|| format!("Failed to write commit list {}", commit_list.display()))?;
    codec::save_audit_log(audit_log, &result.commits, &result.ids)
        .with_context(|| format!("Failed to write audit log {}", audit_log.display()))?;
    info!("Wrote {} and {}", commit_list.display(), audit_log.display());
    Ok(())
}

/// Read a commit list and replay it through `driver`
pub fn run_replay<D, S>(
    commit_list: &Path,
    driver: &mut D,
    store: &S,
    options: &ReplayOptions,
    cancel: &CancelToken,
    show_progress: bool,
) -> Result<ReplayStats>
where
    D: ReplayDriver + ?Sized,
    S: ContentStore + ?Sized,
{
    let mut ids = Identities::new();
    let commits = codec::load(commit_list, &mut ids)
        .with_context(|| format!("Failed to load commit list {}", commit_list.display()))?;
    info!("Replaying {} commits into {}", commits.len(), driver.worktree().display());

    let bar = if show_progress {
        ProgressBar::new(commits.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    bar.set_message("Replaying commits");
    let stats = replay(&commits, &ids, driver, store, options, cancel, &bar)?;
    bar.finish_with_message("Replay complete");
    Ok(stats)
}
