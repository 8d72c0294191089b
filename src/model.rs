// src/model.rs

use chrono::{DateTime, Utc};
use lasso::{Key, Spur};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Interned file spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(Spur);

/// Interned author identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(Spur);

macro_rules! interned_id {
    ($name:ident) => {
        impl From<Spur> for $name {
            fn from(key: Spur) -> Self {
                Self(key)
            }
        }

        impl From<$name> for Spur {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        // interning order
        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.into_usize().cmp(&other.0.into_usize())
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
    };
}

interned_id!(FileId);
interned_id!(UserId);

/// One historical save of one file in the legacy store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEvent {
    pub file: FileId,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    /// Canonical identity once author mapping has run, raw identity before
    pub author: UserId,
    /// The identity exactly as the legacy store recorded it
    pub raw_author: UserId,
    pub comment: String,
}

impl RevisionEvent {
    /// Ordering key for the reconstruction scan
    pub fn sort_key(&self) -> (DateTime<Utc>, u32) {
        (self.timestamp, self.version)
    }
}

/// A named point in the legacy history, independent of any file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEvent {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// The latest revision of one file inside a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileChange {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

/// A reconstructed atomic group of file changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub timestamp: DateTime<Utc>,
    pub author: UserId,
    pub comment: String,
    pub files: BTreeMap<FileId, FileChange>,
    pub labels: Vec<LabelEvent>,
}

impl Commit {
    /// Open a commit seeded by a single revision
    pub fn seeded_by(rev: &RevisionEvent) -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            rev.file,
            FileChange {
                version: rev.version,
                timestamp: rev.timestamp,
            },
        );
        Self {
            timestamp: rev.timestamp,
            author: rev.author,
            comment: rev.comment.clone(),
            files,
            labels: Vec::new(),
        }
    }

    /// Record a file change, keeping the highest version seen for that file
    pub fn upsert(&mut self, file: FileId, change: FileChange) {
        match self.files.get(&file) {
            Some(existing) if existing.version > change.version => {}
            _ => {
                self.files.insert(file, change);
            }
        }
    }

    /// Whether a label with this exact text and timestamp is already attached
    pub fn has_label(&self, label: &LabelEvent) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}
