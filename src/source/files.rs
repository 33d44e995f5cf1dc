//! Source file lookup and line cache
//!
//! Debug info and leak reports record the path a file had at build time.
//! When that path is stale (the project moved, or was built in a container)
//! the file is looked up by basename under a search root.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::ExtractError;

/// Reads source files once and serves individual lines from memory.
#[derive(Debug)]
pub struct SourceFiles {
    search_root: PathBuf,
    search_depth: usize,
    cache: FxHashMap<String, Option<Rc<[String]>>>,
}

impl SourceFiles {
    pub fn new(search_root: impl Into<PathBuf>, search_depth: usize) -> Self {
        Self {
            search_root: search_root.into(),
            search_depth,
            cache: FxHashMap::default(),
        }
    }

    /// Locates `file` on disk, falling back to a basename search.
    pub fn resolve(&self, file: &str) -> Option<PathBuf> {
        let path = Path::new(file);
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        let basename = path.file_name()?;
        let found = WalkDir::new(&self.search_root)
            .max_depth(self.search_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| entry.file_type().is_file() && entry.file_name() == basename)
            .map(|entry| entry.into_path());

        if let Some(found) = &found {
            debug!(recorded = file, resolved = %found.display(), "resolved stale source path");
        }
        found
    }

    /// All lines of `file`, or an error when it cannot be found or read.
    pub fn lines(&mut self, file: &str) -> Result<Rc<[String]>, ExtractError> {
        if let Some(cached) = self.cache.get(file) {
            return cached.clone().ok_or_else(|| ExtractError::SourceNotFound {
                file: file.to_string(),
            });
        }

        let loaded = self.load(file);
        self.cache
            .insert(file.to_string(), loaded.as_ref().ok().cloned());
        loaded
    }

    fn load(&self, file: &str) -> Result<Rc<[String]>, ExtractError> {
        let path = self.resolve(file).ok_or_else(|| ExtractError::SourceNotFound {
            file: file.to_string(),
        })?;
        let text = fs::read_to_string(&path).map_err(|source| ExtractError::Unreadable {
            path: path.clone(),
            source,
        })?;
        Ok(text.lines().map(str::to_string).collect())
    }

    /// The trimmed text of a 1-based line, or an empty string.
    pub fn line(&mut self, file: &str, line: usize) -> String {
        match self.lines(file) {
            Ok(lines) if line >= 1 => lines
                .get(line - 1)
                .map(|l| l.trim().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}
