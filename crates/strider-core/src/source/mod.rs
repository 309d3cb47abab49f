//! # Source Statements
//!
//! Turns a stop location (`file:line:col` from the line table) into the text
//! of the statement being executed.
//!
//! Line tables record one row per line, so a call spread over four lines
//! shows up as four separate rows. [`SourceStatementResolver`] uses the
//! compile unit's rows to find where the *next* statement starts and joins
//! everything in between.
//!
//! Paths recorded in debug info are often relative to the build directory;
//! they are resolved through the configured search paths first.

pub mod line_map;

use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tracing::{debug, warn};

pub use line_map::{statement_text, CompileUnitLineMap, StatementEnd};

use crate::types::{LineEntry, SourceLocation};

/// Number of source files whose lines are kept in memory.
pub const FILE_CACHE_CAPACITY: usize = 100;

/// Resolves source paths and reconstructs statements, caching file contents
/// and line maps.
#[derive(Debug)]
pub struct SourceStatementResolver
{
    search_paths: Vec<PathBuf>,
    resolved: HashMap<String, Option<PathBuf>>,
    files: LruCache<PathBuf, Option<Arc<Vec<String>>>>,
    line_maps: HashMap<String, Arc<CompileUnitLineMap>>,
}

impl Default for SourceStatementResolver
{
    fn default() -> Self
    {
        Self::new(Vec::new())
    }
}

impl SourceStatementResolver
{
    /// Create a resolver searching `search_paths` for relative source paths.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>) -> Self
    {
        Self {
            search_paths,
            resolved: HashMap::new(),
            files: LruCache::new(NonZeroUsize::new(FILE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN)),
            line_maps: HashMap::new(),
        }
    }

    /// Replace the search paths. Previously resolved paths are forgotten.
    pub fn set_search_paths(&mut self, search_paths: Vec<PathBuf>)
    {
        if search_paths != self.search_paths {
            self.search_paths = search_paths;
            self.resolved.clear();
        }
    }

    /// Resolve a path recorded in debug info to a file on disk.
    ///
    /// Order: the path itself when absolute and present, each search path
    /// joined with it, then the current directory. Misses are cached too.
    pub fn resolve_path(&mut self, original: &str) -> Option<PathBuf>
    {
        if let Some(cached) = self.resolved.get(original) {
            return cached.clone();
        }

        let path = Path::new(original);
        let resolved = if path.is_absolute() && path.exists() {
            Some(path.to_path_buf())
        } else {
            self.search_paths
                .iter()
                .map(|dir| dir.join(path))
                .find(|candidate| candidate.exists())
                .or_else(|| std::env::current_dir().ok().map(|cwd| cwd.join(path)).filter(|c| c.exists()))
                .map(|candidate| fs::canonicalize(&candidate).unwrap_or(candidate))
        };

        if resolved.is_none() {
            warn!("Source file not found: '{original}'. Searched in: {:?}", self.search_paths);
        }
        self.resolved.insert(original.to_string(), resolved.clone());
        resolved
    }

    /// Lines of a file, read through a bounded cache.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. Unreadable files yield
    /// `None` and are remembered as such until evicted.
    pub fn get_file_lines(&mut self, path: &Path) -> Option<Arc<Vec<String>>>
    {
        if let Some(cached) = self.files.get(path) {
            return cached.clone();
        }
        let lines = match fs::read(path) {
            Ok(bytes) => Some(Arc::new(String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect())),
            Err(e) => {
                warn!("Could not read file {}: {e}", path.display());
                None
            }
        };
        self.files.put(path.to_path_buf(), lines.clone());
        lines
    }

    /// Line map for the compile unit keyed by `file`, building it from
    /// `load_entries` the first time.
    pub fn build_line_to_next_line_map<F>(&mut self, file: &str, load_entries: F) -> Arc<CompileUnitLineMap>
    where
        F: FnOnce() -> Vec<LineEntry>,
    {
        if let Some(map) = self.line_maps.get(file) {
            return Arc::clone(map);
        }
        let entries = load_entries();
        let map = Arc::new(CompileUnitLineMap::build(&entries));
        debug!("Built line map for {file}: {} lines from {} entries", map.len(), entries.len());
        self.line_maps.insert(file.to_string(), Arc::clone(&map));
        map
    }

    /// Text of the statement at `location`.
    ///
    /// Returns an empty string when the location has no line, and a
    /// `<source file '...' not found>` marker when the file cannot be found.
    pub fn get_statement_source<F>(&mut self, location: &SourceLocation, load_entries: F) -> String
    where
        F: FnOnce() -> Vec<LineEntry>,
    {
        let Some(line) = location.line.filter(|line| *line > 0) else {
            return String::new();
        };
        let Some(path) = self.resolve_path(&location.file) else {
            return format!("<source file '{}' not found>", location.file);
        };
        let Some(lines) = self.get_file_lines(&path) else {
            return String::new();
        };
        let map = self.build_line_to_next_line_map(&location.file, load_entries);
        statement_text(&lines, line, map.next_statement(line))
    }
}

#[cfg(test)]
mod tests
{
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::types::Address;

    fn write_source(dir: &TempDir, name: &str, text: &str) -> PathBuf
    {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    fn entry(line: u32, column: u32) -> LineEntry
    {
        LineEntry {
            address: Address::new(u64::from(line)),
            line,
            column,
        }
    }

    #[test]
    fn test_absolute_path_is_used_as_is()
    {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, "main.c", "int main() {}\n");
        let mut resolver = SourceStatementResolver::default();
        assert_eq!(resolver.resolve_path(path.to_str().unwrap()), Some(path));
    }

    #[test]
    fn test_relative_path_found_via_search_path()
    {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        write_source(&dir, "src/lib.c", "void f() {}\n");
        let mut resolver = SourceStatementResolver::new(vec![dir.path().to_path_buf()]);

        let resolved = resolver.resolve_path("src/lib.c").unwrap();
        assert!(resolved.ends_with("src/lib.c"));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_missing_path_is_negatively_cached()
    {
        let dir = TempDir::new().unwrap();
        let mut resolver = SourceStatementResolver::new(vec![dir.path().to_path_buf()]);
        assert_eq!(resolver.resolve_path("late.c"), None);

        // Appears after the first lookup; the cached miss still wins.
        write_source(&dir, "late.c", "x\n");
        assert_eq!(resolver.resolve_path("late.c"), None);
    }

    #[test]
    fn test_file_lines_are_cached()
    {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, "a.c", "one\ntwo\n");
        let mut resolver = SourceStatementResolver::default();

        let first = resolver.get_file_lines(&path).unwrap();
        fs::write(&path, "changed\n").unwrap();
        let second = resolver.get_file_lines(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.as_slice(), ["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_line_map_is_built_once_per_file()
    {
        let mut resolver = SourceStatementResolver::default();
        let mut loads = 0;
        resolver.build_line_to_next_line_map("a.c", || {
            loads += 1;
            vec![entry(1, 0), entry(2, 0)]
        });
        resolver.build_line_to_next_line_map("a.c", || {
            loads += 1;
            Vec::new()
        });
        assert_eq!(loads, 1);
    }

    #[test]
    fn test_statement_spanning_lines()
    {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, "s.c", "int r = add(1,\n            2);\nreturn r;\n");
        let mut resolver = SourceStatementResolver::default();
        let location = SourceLocation::new(path.to_str().unwrap(), 1, 9);

        let text = resolver.get_statement_source(&location, || vec![entry(1, 9), entry(1, 13), entry(3, 0)]);
        assert_eq!(text, "int r = add(1, 2);");
    }

    #[test]
    fn test_statement_for_missing_file()
    {
        let mut resolver = SourceStatementResolver::default();
        let location = SourceLocation::new("/nonexistent/strider/x.c", 4, 1);
        assert_eq!(
            resolver.get_statement_source(&location, Vec::new),
            "<source file '/nonexistent/strider/x.c' not found>"
        );
    }
}
