//! Tiered content cache.
//!
//! Each package path holds at most one in-memory representation: a parsed
//! document tree or a raw byte buffer. A path with neither falls through to
//! the archive's working entry, which is promoted into the byte tier on first
//! read. Writing either tier evicts the other tier and the working entry; the
//! archive's original snapshot is never touched.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::OdfError;
use crate::path;
use crate::xml::XmlEngine;
use crate::zip::ZipContainer;

/// In-memory representation of one package path.
#[derive(Clone, Debug, PartialEq)]
pub enum CachedContent<T> {
    /// Parsed document tree; authoritative over any bytes.
    Tree(T),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl<T> CachedContent<T> {
    /// Whether this is the tree tier.
    pub fn is_tree(&self) -> bool {
        matches!(self, CachedContent::Tree(_))
    }
}

/// Paths whose content is derived from package state and never cached.
pub fn is_synthetic(internal_path: &str) -> bool {
    internal_path == path::MIMETYPE_PATH || internal_path == path::MANIFEST_PATH
}

/// Per-path content cache keyed by normalized package path.
#[derive(Clone, Debug)]
pub struct ContentCache<T> {
    entries: BTreeMap<String, CachedContent<T>>,
}

impl<T> Default for ContentCache<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> ContentCache<T> {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached representation of `path`, if any.
    pub fn get(&self, path: &str) -> Option<&CachedContent<T>> {
        self.entries.get(path)
    }

    /// Whether `path` has an in-memory representation.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of cached paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store bytes for `path`, evicting any tree and the archive working entry.
    pub fn set_bytes(&mut self, path: &str, bytes: Vec<u8>, archive: Option<&mut ZipContainer>) {
        if is_synthetic(path) {
            log::warn!("[PKG] Refusing to cache synthetic path '{}'", path);
            return;
        }
        if let Some(archive) = archive {
            archive.remove(path);
        }
        self.entries
            .insert(path.to_string(), CachedContent::Bytes(bytes));
    }

    /// Store a tree for `path`, evicting any bytes and the archive working entry.
    pub fn set_tree(&mut self, path: &str, tree: T, archive: Option<&mut ZipContainer>) {
        if is_synthetic(path) {
            log::warn!("[PKG] Refusing to cache synthetic path '{}'", path);
            return;
        }
        if let Some(archive) = archive {
            archive.remove(path);
        }
        self.entries.insert(path.to_string(), CachedContent::Tree(tree));
    }

    /// Drop the in-memory representation of `path`.
    pub fn remove(&mut self, path: &str) -> Option<CachedContent<T>> {
        self.entries.remove(path)
    }

    /// Drop every cached path starting with `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before - self.entries.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolve the bytes of `path` through the tiers.
    ///
    /// Trees are serialized on demand and stay authoritative. Archive content
    /// is decompressed and promoted into the byte tier.
    pub fn bytes<X>(
        &mut self,
        path: &str,
        archive: Option<&ZipContainer>,
        engine: &X,
    ) -> Result<Option<Vec<u8>>, OdfError>
    where
        X: XmlEngine<Tree = T>,
    {
        match self.entries.get(path) {
            Some(CachedContent::Tree(tree)) => return engine.serialize(tree).map(Some),
            Some(CachedContent::Bytes(bytes)) => return Ok(Some(bytes.clone())),
            None => {}
        }
        if is_synthetic(path) {
            return Ok(None);
        }
        let Some(bytes) = read_archive(path, archive)? else {
            return Ok(None);
        };
        self.entries
            .insert(path.to_string(), CachedContent::Bytes(bytes.clone()));
        Ok(Some(bytes))
    }

    /// Resolve the bytes of `path` without promoting archive content.
    pub fn peek_bytes<'a, X>(
        &'a self,
        path: &str,
        archive: Option<&ZipContainer>,
        engine: &X,
    ) -> Result<Option<Cow<'a, [u8]>>, OdfError>
    where
        X: XmlEngine<Tree = T>,
    {
        match self.entries.get(path) {
            Some(CachedContent::Tree(tree)) => Ok(Some(Cow::Owned(engine.serialize(tree)?))),
            Some(CachedContent::Bytes(bytes)) => Ok(Some(Cow::Borrowed(bytes.as_slice()))),
            None if is_synthetic(path) => Ok(None),
            None => Ok(read_archive(path, archive)?.map(Cow::Owned)),
        }
    }

    /// Resolve the tree of `path`, parsing bytes or archive content on first
    /// access and promoting the result into the tree tier.
    pub fn tree<X>(
        &mut self,
        path: &str,
        archive: Option<&ZipContainer>,
        engine: &X,
    ) -> Result<Option<&mut T>, OdfError>
    where
        X: XmlEngine<Tree = T>,
    {
        let parsed = match self.entries.get(path) {
            Some(CachedContent::Tree(_)) => None,
            Some(CachedContent::Bytes(bytes)) => Some(engine.parse(bytes)?),
            None if is_synthetic(path) => return Ok(None),
            None => match read_archive(path, archive)? {
                Some(bytes) => Some(engine.parse(&bytes)?),
                None => return Ok(None),
            },
        };
        if let Some(tree) = parsed {
            self.entries.insert(path.to_string(), CachedContent::Tree(tree));
        }
        match self.entries.get_mut(path) {
            Some(CachedContent::Tree(tree)) => Ok(Some(tree)),
            _ => Ok(None),
        }
    }

    /// Serialize every tree under `prefix` into the byte tier.
    /// Returns the flushed paths.
    pub fn flush_trees<X>(&mut self, prefix: &str, engine: &X) -> Result<Vec<String>, OdfError>
    where
        X: XmlEngine<Tree = T>,
    {
        let mut flushed = Vec::new();
        for (key, content) in self.entries.iter_mut() {
            if !key.starts_with(prefix) {
                continue;
            }
            if let CachedContent::Tree(tree) = content {
                let bytes = engine.serialize(tree)?;
                *content = CachedContent::Bytes(bytes);
                flushed.push(key.clone());
            }
        }
        Ok(flushed)
    }
}

fn read_archive(path: &str, archive: Option<&ZipContainer>) -> Result<Option<Vec<u8>>, OdfError> {
    let Some(archive) = archive else {
        return Ok(None);
    };
    match archive.get(path) {
        Some(entry) if !entry.is_directory() => Ok(Some(archive.read(entry)?)),
        _ => Ok(None),
    }
}
