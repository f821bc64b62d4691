//! Compact source locations and the module path table.
//!
//! A [`ModuleLoc`] is only a module id plus a byte offset. Line and column
//! numbers are never stored; they are recovered on demand by
//! [`locate_line`] when a diagnostic has to be rendered.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

/// Index into the [`SourceMap`] path table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Id that never names a registered module.
    pub const INVALID: ModuleId = ModuleId(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#invalid")
        }
    }
}

/// Location of the first byte of a lexeme or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleLoc {
    pub module: ModuleId,
    pub offset: u32,
}

impl ModuleLoc {
    pub const INVALID: ModuleLoc = ModuleLoc {
        module: ModuleId::INVALID,
        offset: 0,
    };

    /// Offsets that do not fit in 32 bits yield [`ModuleLoc::INVALID`].
    pub fn new(module: ModuleId, offset: usize) -> Self {
        match u32::try_from(offset) {
            Ok(offset) => ModuleLoc { module, offset },
            Err(_) => ModuleLoc::INVALID,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.module.is_valid()
    }
}

impl fmt::Display for ModuleLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.module, self.offset)
    }
}

/// The line containing a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo<'a> {
    /// 1-based line number.
    pub line: usize,
    /// 0-based byte column within the line.
    pub column: usize,
    /// Text of the line without its terminator.
    pub text: &'a str,
}

/// Finds the line that contains `offset` by scanning newline boundaries.
///
/// An offset pointing at a newline belongs to the line that newline ends.
/// Returns `None` when the offset lies past the end of `source`.
pub fn locate_line(source: &str, offset: usize) -> Option<LineInfo<'_>> {
    if offset > source.len() {
        return None;
    }
    let mut start = 0;
    for (index, line) in source.split('\n').enumerate() {
        let end = start + line.len();
        if offset <= end {
            return Some(LineInfo {
                line: index + 1,
                column: offset - start,
                text: line.strip_suffix('\r').unwrap_or(line),
            });
        }
        start = end + 1;
    }
    None
}

/// Append-only table of module paths plus a lazily filled source cache.
///
/// Registering a path twice returns the id handed out the first time.
#[derive(Debug, Default)]
pub struct SourceMap {
    paths: Vec<PathBuf>,
    ids: HashMap<PathBuf, ModuleId>,
    texts: Vec<Option<Arc<str>>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) -> ModuleId {
        let path = path.into();
        if let Some(id) = self.ids.get(&path) {
            return *id;
        }
        let id = ModuleId(self.paths.len() as u32);
        debug!(%id, path = %path.display(), "registered module path");
        self.ids.insert(path.clone(), id);
        self.paths.push(path);
        self.texts.push(None);
        id
    }

    pub fn id_of(&self, path: &Path) -> Option<ModuleId> {
        self.ids.get(path).copied()
    }

    pub fn path(&self, id: ModuleId) -> Option<&Path> {
        self.paths.get(id.index()).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Seeds the cache with text that did not come from disk.
    pub fn set_text(&mut self, id: ModuleId, text: Arc<str>) {
        if let Some(slot) = self.texts.get_mut(id.index()) {
            *slot = Some(text);
        }
    }

    /// Returns the source of a module, reading it from disk on first use.
    pub fn text(&mut self, id: ModuleId) -> Option<Arc<str>> {
        let slot = self.texts.get_mut(id.index())?;
        if let Some(text) = slot {
            return Some(Arc::clone(text));
        }
        let path = &self.paths[id.index()];
        match fs::read_to_string(path) {
            Ok(text) => {
                let text: Arc<str> = text.into();
                *slot = Some(Arc::clone(&text));
                Some(text)
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "source unavailable for diagnostics");
                None
            }
        }
    }
}
