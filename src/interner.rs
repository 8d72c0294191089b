// src/interner.rs

//! Identity interning for one pipeline run
//!
//! File specs and author identities repeat across thousands of revisions, so
//! each unique string is stored once and referenced by a dense integer key.
//! Persisted artifacts store the strings, never the keys, so the tables are
//! rebuilt on every load and must not be shared between independent runs.

use crate::model::{FileId, UserId};
use lasso::{Rodeo, Spur};
use std::marker::PhantomData;

/// Append-only bidirectional table between strings and interned ids
#[derive(Debug)]
pub struct InternTable<K> {
    inner: Rodeo,
    _id: PhantomData<K>,
}

impl<K> Default for InternTable<K>
where
    K: Copy + From<Spur> + Into<Spur>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> InternTable<K>
where
    K: Copy + From<Spur> + Into<Spur>,
{
    pub fn new() -> Self {
        Self {
            inner: Rodeo::default(),
            _id: PhantomData,
        }
    }

    /// Intern a string, returning the existing id on an exact match
    #[inline]
    pub fn intern(&mut self, value: &str) -> K {
        K::from(self.inner.get_or_intern(value))
    }

    /// Resolve an id to its string.
    ///
    /// # Panics
    /// Panics when the id was not produced by this table.
    #[inline]
    pub fn resolve(&self, id: K) -> &str {
        self.inner.resolve(&id.into())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// The identity context owned by a single pipeline run
#[derive(Debug, Default)]
pub struct Identities {
    pub files: InternTable<FileId>,
    pub users: InternTable<UserId>,
}

impl Identities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, id: FileId) -> &str {
        self.files.resolve(id)
    }

    pub fn user(&self, id: UserId) -> &str {
        self.users.resolve(id)
    }
}
