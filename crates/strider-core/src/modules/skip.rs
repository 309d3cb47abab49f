//! Glob-based module skip policy.
//!
//! Calls into modules matching one of the configured `skip_modules` patterns
//! are stepped over instead of single-stepped. Patterns are shell globs
//! matched against a module's full path and against its basename, so both
//! `libsystem_*` and `/usr/lib/*` work.

use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use tracing::{debug, trace};

use super::{basename, Module};
use crate::ranges::{AddressRange, AddressRangeIndex};
use crate::types::Address;

/// Per-address decisions remembered before the oldest are evicted.
const DECISION_CACHE_CAPACITY: usize = 64 * 1024;

/// A skipped address range and the pattern that selected it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEntry
{
    /// Covered range; the owner is the module path
    pub range: AddressRange<String>,
    /// Pattern that matched the module
    pub pattern: String,
}

/// Decides whether an address belongs to a module that should not be
/// stepped into.
#[derive(Debug)]
pub struct SkipPolicy
{
    patterns: Vec<String>,
    ranges: AddressRangeIndex<usize>,
    entries: Vec<SkipEntry>,
    decisions: LruCache<Address, bool>,
    searches: u64,
}

impl Default for SkipPolicy
{
    fn default() -> Self
    {
        Self::new(Vec::new())
    }
}

impl SkipPolicy
{
    /// Create a policy with no skip ranges yet.
    #[must_use]
    pub fn new(patterns: Vec<String>) -> Self
    {
        Self {
            patterns,
            ranges: AddressRangeIndex::default(),
            entries: Vec::new(),
            decisions: LruCache::new(NonZeroUsize::new(DECISION_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN)),
            searches: 0,
        }
    }

    /// Configured patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String]
    {
        &self.patterns
    }

    /// Replace the patterns. Ranges are left alone until the next
    /// [`build_skip_ranges`](Self::build_skip_ranges).
    pub fn set_patterns(&mut self, patterns: Vec<String>)
    {
        self.patterns = patterns;
    }

    /// First pattern matching `path` or its basename.
    #[must_use]
    pub fn matching_pattern(&self, path: &Path) -> Option<&str>
    {
        let full = path.to_string_lossy();
        let base = basename(path);
        self.patterns
            .iter()
            .find(|pattern| glob_match(pattern, &full) || glob_match(pattern, base))
            .map(String::as_str)
    }

    /// Whether `path` matches any pattern.
    #[must_use]
    pub fn matches_module(&self, path: &Path) -> bool
    {
        self.matching_pattern(path).is_some()
    }

    /// Rebuild the skip-range table from `modules`.
    ///
    /// Every section of every matching module becomes a skip range. The
    /// decision cache is cleared since the table it was computed from is gone.
    pub fn build_skip_ranges(&mut self, modules: &[Module])
    {
        let mut entries = Vec::new();
        for module in modules {
            let Some(pattern) = self.matching_pattern(&module.path) else {
                continue;
            };
            trace!("Skipping module {} (pattern {pattern})", module.path.display());
            for section in &module.sections {
                entries.push(SkipEntry {
                    range: AddressRange::new(section.start, section.end, module.path.display().to_string()),
                    pattern: pattern.to_string(),
                });
            }
        }
        entries.sort_by_key(|entry| (entry.range.start, entry.range.end));

        self.ranges = AddressRangeIndex::build(
            entries
                .iter()
                .enumerate()
                .map(|(idx, entry)| AddressRange::new(entry.range.start, entry.range.end, idx))
                .collect::<Vec<_>>(),
        );
        self.entries = entries;
        self.decisions.clear();
        debug!("Built {} skip ranges from {} patterns", self.ranges.len(), self.patterns.len());
    }

    /// Whether stepping should not enter `address`.
    ///
    /// A non-empty `module_hint` matching a pattern short-circuits the search.
    /// Otherwise the result of the range search is cached per address.
    pub fn should_skip(&mut self, address: Address, module_hint: &str) -> bool
    {
        if !module_hint.is_empty() && self.matches_module(Path::new(module_hint)) {
            return true;
        }
        if let Some(decision) = self.decisions.get(&address) {
            return *decision;
        }
        self.searches += 1;
        let decision = self.ranges.contains(address);
        self.decisions.put(address, decision);
        decision
    }

    /// Skip entry covering `address`, if any.
    #[must_use]
    pub fn entry_for(&self, address: Address) -> Option<&SkipEntry>
    {
        let range = self.ranges.find(address)?;
        self.entries.get(range.owner)
    }

    /// Skip entries sorted by start address.
    #[must_use]
    pub fn entries(&self) -> &[SkipEntry]
    {
        &self.entries
    }

    /// Number of range searches performed (cache misses).
    #[must_use]
    pub fn search_count(&self) -> u64
    {
        self.searches
    }
}

/// Shell-style glob match.
///
/// `*` matches any run of characters (including `/`), `?` matches one
/// character and `[...]` matches a set (`[a-z]`, `[!0-9]`). Everything else
/// matches literally.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool
{
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool
{
    let Some((&first, rest)) = pattern.split_first() else {
        return text.is_empty();
    };
    match first {
        '*' => (0..=text.len()).any(|skip| match_from(rest, &text[skip..])),
        '?' => !text.is_empty() && match_from(rest, &text[1..]),
        '[' => {
            let Some((&ch, text_rest)) = text.split_first() else {
                return false;
            };
            match match_class(rest, ch) {
                Some((true, after)) => match_from(after, text_rest),
                Some((false, _)) => false,
                // Unterminated class: treat '[' literally.
                None => ch == '[' && match_from(rest, text_rest),
            }
        }
        literal => text.first() == Some(&literal) && match_from(rest, &text[1..]),
    }
}

/// Match `ch` against the class body following `[`. Returns whether it
/// matched and the pattern after the closing `]`.
fn match_class(body: &[char], ch: char) -> Option<(bool, &[char])>
{
    let (negated, mut body) = match body.first() {
        Some('!' | '^') => (true, &body[1..]),
        _ => (false, body),
    };
    let mut matched = false;
    let mut first = true;
    loop {
        let (&c, rest) = body.split_first()?;
        if c == ']' && !first {
            return Some((matched != negated, rest));
        }
        first = false;
        if let ['-', hi, tail @ ..] = rest {
            if *hi != ']' {
                matched |= (c..=*hi).contains(&ch);
                body = tail;
                continue;
            }
        }
        matched |= c == ch;
        body = rest;
    }
}

#[cfg(test)]
mod tests
{
    use std::path::PathBuf;

    use super::*;
    use crate::modules::Section;

    fn module(path: &str, start: u64, end: u64) -> Module
    {
        Module {
            path: PathBuf::from(path),
            sections: vec![Section {
                name: "__TEXT".to_string(),
                start: Address::new(start),
                end: Address::new(end),
                size: end - start,
            }],
        }
    }

    #[test]
    fn test_glob_basics()
    {
        assert!(glob_match("libc*", "libc.so.6"));
        assert!(glob_match("*.dylib", "libSystem.B.dylib"));
        assert!(glob_match("/usr/lib/*", "/usr/lib/system/libdyld.dylib"));
        assert!(glob_match("lib?.so", "libm.so"));
        assert!(!glob_match("lib?.so", "libmm.so"));
        assert!(glob_match("lib[cm].so", "libm.so"));
        assert!(!glob_match("lib[!cm].so", "libm.so"));
        assert!(glob_match("lib[a-z]*", "libpthread.so"));
        assert!(!glob_match("libc", "libc.so"));
        assert!(glob_match("", ""));
        assert!(glob_match("a[b", "a[b"));
    }

    #[test]
    fn test_pattern_matches_path_or_basename()
    {
        let policy = SkipPolicy::new(vec!["libsystem_*".to_string()]);
        assert!(policy.matches_module(Path::new("/usr/lib/system/libsystem_c.dylib")));
        assert!(!policy.matches_module(Path::new("/bin/app")));
    }

    #[test]
    fn test_skip_ranges_only_cover_matching_modules()
    {
        let mut policy = SkipPolicy::new(vec!["libc.so*".to_string()]);
        policy.build_skip_ranges(&[module("/bin/app", 0x1000, 0x2000), module("/lib/libc.so.6", 0x9000, 0xa000)]);

        assert_eq!(policy.entries().len(), 1);
        assert_eq!(policy.entries()[0].pattern, "libc.so*");
        assert!(policy.should_skip(Address::new(0x9500), ""));
        assert!(!policy.should_skip(Address::new(0x1500), ""));
        assert!(!policy.should_skip(Address::new(0xa000), ""));
    }

    #[test]
    fn test_decision_is_cached()
    {
        let mut policy = SkipPolicy::new(vec!["libc*".to_string()]);
        policy.build_skip_ranges(&[module("/lib/libc.so.6", 0x9000, 0xa000)]);

        assert!(policy.should_skip(Address::new(0x9004), ""));
        assert!(policy.should_skip(Address::new(0x9004), ""));
        assert_eq!(policy.search_count(), 1);
    }

    #[test]
    fn test_hint_short_circuits_search()
    {
        let mut policy = SkipPolicy::new(vec!["libc*".to_string()]);
        assert!(policy.should_skip(Address::new(0x1), "/lib/libc.so.6"));
        assert_eq!(policy.search_count(), 0);
        assert!(!policy.should_skip(Address::new(0x1), "/bin/app"));
        assert_eq!(policy.search_count(), 1);
    }

    #[test]
    fn test_rebuild_clears_cached_decisions()
    {
        let mut policy = SkipPolicy::new(vec!["libc*".to_string()]);
        assert!(!policy.should_skip(Address::new(0x9004), ""));
        policy.build_skip_ranges(&[module("/lib/libc.so.6", 0x9000, 0xa000)]);
        assert!(policy.should_skip(Address::new(0x9004), ""));
    }
}
