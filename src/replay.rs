// src/replay.rs

//! Replaying reconstructed commits into a target version-control system
//!
//! The replay loop only talks to a [`ReplayDriver`]; [`GitDriver`] is the
//! libgit2-backed implementation. File content comes from a [`ContentStore`].

use crate::interner::Identities;
use crate::model::Commit;
use crate::reconstruct::CancelToken;
use crate::source::{FailureKind, RevisionError};
use chrono::{DateTime, Utc};
use git2::build::CheckoutBuilder;
use git2::{ErrorCode, IndexAddOption, Repository, Signature, Time};
use indicatif::ProgressBar;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("stopped")]
    Stopped,
}

/// Author or tagger as the target system records it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    /// Split a canonical `Name <email>` identity, inventing an email for bare names
    pub fn from_canonical(canonical: &str, email_domain: &str) -> Self {
        if let Some((name, rest)) = canonical.split_once('<') {
            if let Some(email) = rest.strip_suffix('>') {
                return Self {
                    name: name.trim().to_string(),
                    email: email.trim().to_string(),
                };
            }
        }
        let name = canonical.trim();
        let local = name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(".");
        Self {
            name: name.to_string(),
            email: format!("{}@{}", local, email_domain),
        }
    }
}

/// What a target system must offer to receive a commit list.
///
/// Paths are relative to [`ReplayDriver::worktree`].
pub trait ReplayDriver {
    fn worktree(&self) -> &Path;
    /// Whether the target already has a commit to build on
    fn has_head(&self) -> Result<bool, ReplayError>;
    fn stage_file(&mut self, path: &Path) -> Result<(), ReplayError>;
    fn stage_directory(&mut self, path: &Path) -> Result<(), ReplayError>;
    /// Whether the staged tree differs from the last commit
    fn has_staged_changes(&mut self) -> Result<bool, ReplayError>;
    /// Restore a path to its last committed state, dropping it if it was never committed
    fn revert_path(&mut self, path: &Path) -> Result<(), ReplayError>;
    fn commit(&mut self, author: &Identity, message: &str, when: DateTime<Utc>) -> Result<(), ReplayError>;
    /// Tag the last commit
    fn tag(&mut self, name: &str, tagger: &Identity, message: &str, when: DateTime<Utc>) -> Result<(), ReplayError>;
}

/// Supplies the bytes of one file version
pub trait ContentStore {
    fn fetch(&self, file_spec: &str, version: u32) -> Result<Vec<u8>, RevisionError>;
}

/// Map a legacy file spec such as `$/proj/a.c` to a work tree path
pub fn worktree_path(file_spec: &str) -> PathBuf {
    let trimmed = file_spec.strip_prefix('$').unwrap_or(file_spec);
    PathBuf::from(trimmed.trim_start_matches('/'))
}

/// File versions laid out as `<root>/<worktree path>,v<version>`
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn version_path(&self, file_spec: &str, version: u32) -> PathBuf {
        let rel = worktree_path(file_spec);
        let mut name = rel.into_os_string();
        name.push(format!(",v{}", version));
        self.root.join(name)
    }
}

impl ContentStore for DirectoryStore {
    fn fetch(&self, file_spec: &str, version: u32) -> Result<Vec<u8>, RevisionError> {
        fs::read(self.version_path(file_spec, version)).map_err(|err| RevisionError {
            file: file_spec.to_string(),
            version,
            kind: match err.kind() {
                io::ErrorKind::NotFound => FailureKind::ContentNotRetained,
                _ => FailureKind::Unknown,
            },
        })
    }
}

/// Turns label texts into unique, valid tag names
#[derive(Debug, Default)]
pub struct TagNamer {
    next_suffix: HashMap<String, usize>,
    taken: HashSet<String>,
}

impl TagNamer {
    pub fn sanitize(text: &str) -> String {
        let mut name: String = text
            .trim()
            .chars()
            .map(|c| {
                if c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c) {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        while name.contains("..") {
            name = name.replace("..", ".");
        }
        name = name.replace("@{", "_");
        let mut name = name.trim_start_matches(['-', '.', '/']).trim_end_matches(['.', '/']).to_string();
        if let Some(stem) = name.strip_suffix(".lock") {
            name = format!("{}_lock", stem);
        }
        if name.is_empty() || name == "@" {
            name = "label".to_string();
        }
        name
    }

    pub fn name_for(&mut self, text: &str) -> String {
        let base = Self::sanitize(text);
        let mut n = self.next_suffix.get(&base).copied().unwrap_or(0);
        loop {
            n += 1;
            let candidate = if n == 1 { base.clone() } else { format!("{}_{}", base, n) };
            if self.taken.insert(candidate.clone()) {
                self.next_suffix.insert(base, n);
                return candidate;
            }
        }
    }
}

pub struct GitDriver {
    repo: Repository,
    worktree: PathBuf,
}

impl GitDriver {
    /// Open the repository at `worktree`, creating it when absent
    pub fn open_or_init(worktree: &Path) -> Result<Self, ReplayError> {
        fs::create_dir_all(worktree).map_err(|source| ReplayError::Io {
            path: worktree.to_path_buf(),
            source,
        })?;
        let repo = match Repository::open(worktree) {
            Ok(repo) => repo,
            Err(err) if err.code() == ErrorCode::NotFound => {
                info!("Initializing git repository at {}", worktree.display());
                Repository::init(worktree)?
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            repo,
            worktree: worktree.to_path_buf(),
        })
    }

    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>, git2::Error> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn signature(who: &Identity, when: DateTime<Utc>) -> Result<Signature<'static>, git2::Error> {
        Signature::new(&who.name, &who.email, &Time::new(when.timestamp(), 0))
    }
}

impl ReplayDriver for GitDriver {
    fn worktree(&self) -> &Path {
        &self.worktree
    }

    fn has_head(&self) -> Result<bool, ReplayError> {
        Ok(self.head_commit()?.is_some())
    }

    fn stage_file(&mut self, path: &Path) -> Result<(), ReplayError> {
        let mut index = self.repo.index()?;
        index.add_path(path)?;
        index.write()?;
        Ok(())
    }

    fn stage_directory(&mut self, path: &Path) -> Result<(), ReplayError> {
        let mut index = self.repo.index()?;
        index.add_all([path], IndexAddOption::DEFAULT, None)?;
        index.write()?;
        Ok(())
    }

    fn has_staged_changes(&mut self) -> Result<bool, ReplayError> {
        let index = self.repo.index()?;
        let head_tree = self.head_commit()?.map(|c| c.tree()).transpose()?;
        let diff = self.repo.diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;
        Ok(diff.deltas().len() > 0)
    }

    fn revert_path(&mut self, path: &Path) -> Result<(), ReplayError> {
        let head = self.head_commit()?;
        let committed = match &head {
            Some(commit) => commit.tree()?.get_path(path).is_ok(),
            None => false,
        };
        if let (true, Some(commit)) = (committed, &head) {
            self.repo.reset_default(Some(commit.as_object()), [path])?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force().path(path);
            self.repo.checkout_head(Some(&mut checkout))?;
            return Ok(());
        }

        let mut index = self.repo.index()?;
        if index.get_path(path, 0).is_some() {
            index.remove_path(path)?;
            index.write()?;
        }
        let full = self.worktree.join(path);
        if full.is_file() {
            fs::remove_file(&full).map_err(|source| ReplayError::Io { path: full, source })?;
        }
        Ok(())
    }

    fn commit(&mut self, author: &Identity, message: &str, when: DateTime<Utc>) -> Result<(), ReplayError> {
        let sig = Self::signature(author, when)?;
        let tree_id = self.repo.index()?.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let parent = self.head_commit()?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        debug!("Committed {} as {}", oid, author.name);
        Ok(())
    }

    fn tag(&mut self, name: &str, tagger: &Identity, message: &str, when: DateTime<Utc>) -> Result<(), ReplayError> {
        let sig = Self::signature(tagger, when)?;
        let head = self
            .head_commit()?
            .ok_or_else(|| git2::Error::from_str("cannot tag before the first commit"))?;
        self.repo.tag(name, head.as_object(), &sig, message, false)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub email_domain: String,
    pub stage_directories: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub commits: usize,
    pub unchanged: usize,
    pub tags: usize,
    pub missing_content: usize,
}

fn write_content(path: &Path, bytes: &[u8]) -> Result<(), ReplayError> {
    let io_err = |source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, bytes).map_err(io_err)
}

/// Replay commits in order: one target commit per commit, one tag per label.
///
/// A commit whose files leave the tree unchanged is skipped; its labels
/// still tag the previous commit.
pub fn replay<D, S>(
    commits: &[Commit],
    ids: &Identities,
    driver: &mut D,
    store: &S,
    options: &ReplayOptions,
    cancel: &CancelToken,
    bar: &ProgressBar,
) -> Result<ReplayStats, ReplayError>
where
    D: ReplayDriver + ?Sized,
    S: ContentStore + ?Sized,
{
    let mut stats = ReplayStats::default();
    let mut tags = TagNamer::default();
    let mut has_head = driver.has_head()?;

    for commit in commits {
        if cancel.is_cancelled() {
            return Err(ReplayError::Stopped);
        }

        let author = Identity::from_canonical(ids.user(commit.author), &options.email_domain);
        let mut dirs = BTreeSet::new();

        for (file, change) in &commit.files {
            let spec = ids.file(*file);
            let rel = worktree_path(spec);
            match store.fetch(spec, change.version) {
                Ok(bytes) => {
                    write_content(&driver.worktree().join(&rel), &bytes)?;
                    match rel.parent().filter(|p| options.stage_directories && !p.as_os_str().is_empty()) {
                        Some(dir) => {
                            dirs.insert(dir.to_path_buf());
                        }
                        None => driver.stage_file(&rel)?,
                    }
                }
                Err(err) => {
                    warn!("{}; keeping previous content of {}", err, rel.display());
                    stats.missing_content += 1;
                    driver.revert_path(&rel)?;
                }
            }
        }
        for dir in &dirs {
            driver.stage_directory(dir)?;
        }

        if driver.has_staged_changes()? {
            driver.commit(&author, &commit.comment, commit.timestamp)?;
            stats.commits += 1;
            has_head = true;
        } else {
            debug!("Nothing changed by commit at {}; skipping", commit.timestamp);
            stats.unchanged += 1;
        }

        for label in &commit.labels {
            if !has_head {
                warn!("Label {:?} precedes any replayed commit; not tagged", label.text);
                continue;
            }
            let name = tags.name_for(&label.text);
            driver.tag(&name, &author, &label.text, label.timestamp)?;
            stats.tags += 1;
        }
        bar.inc(1);
    }

    Ok(stats)
}
