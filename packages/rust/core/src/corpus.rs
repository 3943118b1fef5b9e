//! On-disk layout of a generated corpus.
//!
//! ```text
//! <root>/
//! ├── index.md
//! └── numbers/
//!     ├── 0xx/000.md … 099.md
//!     └── 9xx/900.md … 999.md
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use numsheet_shared::{MAX_NUMBER, NumsheetError, Result};
use tracing::debug;

use crate::render::page_rel_path;

/// What a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Bytes on disk already matched.
    Unchanged,
}

/// A corpus rooted at an output directory.
#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
}

impl Corpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn numbers_dir(&self) -> PathBuf {
        self.root.join("numbers")
    }

    pub fn page_path(&self, n: u16) -> PathBuf {
        self.root.join(page_rel_path(n))
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.md")
    }

    /// Ids that currently have a page on disk.
    pub fn existing_pages(&self) -> BTreeSet<u16> {
        (0..=MAX_NUMBER).filter(|&n| self.page_path(n).is_file()).collect()
    }

    /// Write `content` to `path` unless the file already holds exactly
    /// these bytes. Writes go through a temp file and a rename.
    pub fn write_if_changed(&self, path: &Path, content: &str) -> Result<WriteOutcome> {
        match std::fs::read(path) {
            Ok(existing) if existing == content.as_bytes() => {
                debug!(path = %path.display(), "unchanged");
                return Ok(WriteOutcome::Unchanged);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(NumsheetError::io(path, e)),
        }

        let parent = path
            .parent()
            .ok_or_else(|| NumsheetError::validation(format!("no parent for {}", path.display())))?;
        std::fs::create_dir_all(parent).map_err(|e| NumsheetError::io(parent, e))?;

        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| NumsheetError::validation(format!("bad file name {}", path.display())))?;
        let temp = parent.join(format!(".{file_name}.tmp"));

        std::fs::write(&temp, content).map_err(|e| NumsheetError::io(&temp, e))?;
        std::fs::rename(&temp, path).map_err(|e| NumsheetError::io(path, e))?;

        debug!(path = %path.display(), size = content.len(), "wrote");
        Ok(WriteOutcome::Written)
    }
}
