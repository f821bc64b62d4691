//! Import name to source path resolution.

use std::path::{Component, Path, PathBuf};

use tracing::trace;
use walkdir::WalkDir;

/// Bundled library modules, importable without any `-I` flag.
pub fn default_library_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../lib")
}

/// Ordered search over directories and file extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResolver {
    search_paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl ImportResolver {
    pub fn new(search_paths: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        ImportResolver {
            search_paths,
            extensions,
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Resolves `name` as imported from a module living in `importer_dir`.
    ///
    /// Names starting with `./` or `../` are relative to the importer; all
    /// others are tried against each search path in order. A name that
    /// already carries an extension is tried as is before the configured
    /// extensions are appended. The result is canonical, so the same file
    /// reached through different spellings resolves to one path.
    pub fn resolve_import(&self, name: &str, importer_dir: &Path) -> Option<PathBuf> {
        let relative = Path::new(name);
        if is_explicitly_relative(relative) {
            return self.find_in(importer_dir, relative);
        }
        if relative.is_absolute() {
            return self.find_in(Path::new(""), relative);
        }
        self.search_paths
            .iter()
            .find_map(|dir| self.find_in(dir, relative))
    }

    fn find_in(&self, dir: &Path, name: &Path) -> Option<PathBuf> {
        let base = dir.join(name);
        let has_known_extension = base
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|known| known == ext));
        let candidates = has_known_extension
            .then(|| base.clone())
            .into_iter()
            .chain(self.extensions.iter().map(|ext| {
                let mut file = base.clone().into_os_string();
                file.push(".");
                file.push(ext);
                PathBuf::from(file)
            }));
        for candidate in candidates {
            trace!(candidate = %candidate.display(), "trying import candidate");
            if candidate.is_file() {
                return candidate.canonicalize().ok();
            }
        }
        None
    }

    /// Import names of every module reachable through the search path, in
    /// search-path order and sorted within each directory.
    pub fn available_modules(&self) -> Vec<String> {
        let mut names = Vec::new();
        for root in &self.search_paths {
            let walker = WalkDir::new(root).sort_by_file_name().into_iter();
            for entry in walker.filter_map(Result::ok) {
                let path = entry.path();
                let known = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| self.extensions.iter().any(|known| known == ext));
                if !entry.file_type().is_file() || !known {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let name = module_name(&relative.with_extension(""));
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

fn is_explicitly_relative(path: &Path) -> bool {
    matches!(
        path.components().next(),
        Some(Component::CurDir | Component::ParentDir)
    )
}

/// `std/io` style name for a relative path, independent of the platform
/// separator.
fn module_name(relative: &Path) -> String {
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
