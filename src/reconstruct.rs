// src/reconstruct.rs

//! Revision-to-commit reconstruction
//!
//! A single forward scan over revisions sorted by (timestamp, version). One
//! commit is open at a time; each revision either merges into it or closes it
//! and opens the next. Labels form hard boundaries: a revision never merges
//! into a commit when an unattached label lies strictly before it, and closing
//! a commit drains those labels into it.

use crate::labels::LabelTimeline;
use crate::model::{Commit, FileChange, LabelEvent, RevisionEvent, UserId};
use chrono::{DateTime, Duration, Utc};
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("label {label:?} at {timestamp} attached twice to the commit by {author:?} at {commit_time}")]
    DuplicateLabel {
        label: String,
        timestamp: DateTime<Utc>,
        author: UserId,
        commit_time: DateTime<Utc>,
    },

    #[error("stopped")]
    Stopped,
}

/// Cooperative cancellation flag shared with whoever may stop the run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Scan state: at most one commit is accumulating
enum Scan {
    Idle,
    Accumulating(Commit),
}

/// Whether `rev` belongs to the open commit
fn can_merge(open: &Commit, rev: &RevisionEvent, silence_span: Duration, labels: &LabelTimeline) -> bool {
    open.author == rev.author
        && (open.comment.is_empty() || open.comment == rev.comment)
        && rev.timestamp - open.timestamp <= silence_span
        && !labels.has_pending_before(rev.timestamp)
}

fn merge(open: &mut Commit, rev: &RevisionEvent) {
    open.timestamp = open.timestamp.max(rev.timestamp);
    if open.comment.is_empty() {
        open.comment = rev.comment.clone();
    }
    open.upsert(
        rev.file,
        FileChange {
            version: rev.version,
            timestamp: rev.timestamp,
        },
    );
}

fn attach(commit: &mut Commit, labels: &[LabelEvent]) -> Result<(), ReconstructError> {
    for label in labels {
        if commit.has_label(label) {
            return Err(ReconstructError::DuplicateLabel {
                label: label.text.clone(),
                timestamp: label.timestamp,
                author: commit.author,
                commit_time: commit.timestamp,
            });
        }
        commit.labels.push(label.clone());
    }
    Ok(())
}

/// Group sorted revisions into commits.
///
/// `revisions` must yield in [`RevisionEvent::sort_key`] order. Cancellation is
/// checked before each revision; a cancelled run returns
/// [`ReconstructError::Stopped`] and discards the open commit.
pub fn reconstruct<'a, I>(
    revisions: I,
    mut labels: LabelTimeline,
    silence_span: Duration,
    cancel: &CancelToken,
    bar: &ProgressBar,
) -> Result<Vec<Commit>, ReconstructError>
where
    I: IntoIterator<Item = &'a RevisionEvent>,
{
    let mut commits = Vec::new();
    let mut scan = Scan::Idle;

    for rev in revisions {
        if cancel.is_cancelled() {
            return Err(ReconstructError::Stopped);
        }

        scan = match scan {
            Scan::Idle => Scan::Accumulating(Commit::seeded_by(rev)),
            Scan::Accumulating(mut open) if can_merge(&open, rev, silence_span, &labels) => {
                merge(&mut open, rev);
                Scan::Accumulating(open)
            }
            Scan::Accumulating(mut open) => {
                attach(&mut open, labels.drain_before(rev.timestamp))?;
                debug!(
                    "Closed commit at {} with {} files, {} labels",
                    open.timestamp,
                    open.files.len(),
                    open.labels.len()
                );
                commits.push(open);
                Scan::Accumulating(Commit::seeded_by(rev))
            }
        };
        bar.inc(1);
    }

    if let Scan::Accumulating(mut open) = scan {
        attach(&mut open, labels.drain_rest())?;
        commits.push(open);
    } else if labels.pending() > 0 {
        warn!("No revisions to attach {} labels to", labels.pending());
    }

    Ok(commits)
}
