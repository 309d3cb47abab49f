//! Symbol demangling utilities.
//!
//! Backends hand the tracer raw linkage names. Trace lines and thread-entry
//! logs read better with demangled names, so every name that reaches a log
//! line goes through [`make_symbol_name`] first.
//!
//! ## Language Detection
//!
//! - Rust symbols: Start with `_R` or `_ZN`, or contain `::`
//! - C++ symbols: Start with `_Z` (Itanium mangling)
//! - C symbols: Plain identifiers
//!
//! Mach-O prefixes every C symbol with an underscore; that prefix is stripped
//! before classification.

use rustc_demangle::try_demangle;

use crate::types::{SymbolLanguage, SymbolName};

/// Create a `SymbolName` from a raw linkage name.
///
/// ## Example
///
/// ```rust
/// use strider_core::symbols::make_symbol_name;
/// use strider_core::types::SymbolLanguage;
///
/// let name = make_symbol_name("_ZN4core3fmt5write17h0123456789abcdefE".to_string());
/// assert_eq!(name.display_name(), "core::fmt::write");
/// assert_eq!(name.language(), SymbolLanguage::Rust);
/// ```
pub fn make_symbol_name(raw: String) -> SymbolName
{
    let stripped = raw.strip_prefix("__").map_or(raw.as_str(), |rest| {
        // `__ZN...` is the Mach-O spelling of `_ZN...`.
        if rest.starts_with('Z') || rest.starts_with('R') {
            &raw[1..]
        } else {
            raw.as_str()
        }
    });

    let demangled = try_demangle(stripped).ok().map(|d| format!("{d:#}"));
    let language = if stripped.starts_with("_R") || (stripped.starts_with("_ZN") && demangled.is_some()) || raw.contains("::") {
        SymbolLanguage::Rust
    } else if stripped.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else if is_plain_identifier(raw.trim_start_matches('_')) {
        SymbolLanguage::C
    } else {
        SymbolLanguage::Unknown
    };

    SymbolName::new(raw, demangled, language)
}

fn is_plain_identifier(name: &str) -> bool
{
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
}
