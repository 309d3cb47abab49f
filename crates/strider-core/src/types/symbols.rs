//! Symbol, line-table, and source location types.

use std::fmt;
use std::path::PathBuf;

use super::Address;

/// Programming language associated with a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    /// Rust symbol (detected via mangling or namespace patterns).
    Rust,
    /// C++ symbol (Itanium mangling without Rust extensions).
    Cpp,
    /// C symbol or unmangled global.
    C,
    /// Unknown or mixed language.
    Unknown,
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolLanguage::Rust => "rust",
            SymbolLanguage::Cpp => "c++",
            SymbolLanguage::C => "c",
            SymbolLanguage::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// A function name with demangling metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    language: SymbolLanguage,
}

impl SymbolName
{
    /// Construct from a raw linkage name.
    pub fn new(raw: String, demangled: Option<String>, language: SymbolLanguage) -> Self
    {
        Self {
            raw,
            demangled,
            language,
        }
    }

    /// Raw (mangled) name emitted in the object file.
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    /// Preferred presentation (demangled fallback to raw).
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }

    /// Language classification for the symbol.
    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.display_name())
    }
}

/// What kind of entity a resolved symbol is.
///
/// Stubs and trampolines matter to the step engine: a call through a PLT or
/// `__stubs` entry lands in the dynamic linker before it reaches the real
/// target module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind
{
    /// Ordinary function code
    Code,
    /// Lazy-binding stub or trampoline (PLT, `__stubs`)
    Trampoline,
    /// Data object
    Data,
    /// Anything else the backend reports
    Other,
}

/// Result of resolving a load address against the target's symbol tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol
{
    /// Symbol name (empty when the address is inside a module but outside any symbol)
    pub name: String,
    /// Full path of the module that contains the address
    pub module: PathBuf,
    /// Symbol kind
    pub kind: SymbolKind,
    /// Load address of the first instruction
    pub start: Address,
    /// Load address one past the last instruction
    pub end: Address,
    /// Bytes of prologue before the body starts
    pub prologue_size: u64,
}

impl ResolvedSymbol
{
    /// Whether `address` is in `[start, end)`.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }
}

/// One row of a compile unit's line table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineEntry
{
    /// Load address of the first instruction of the row
    pub address: Address,
    /// 1-based line number; 0 means "no line" (compiler-generated code)
    pub line: u32,
    /// 1-based column; 0 means "whole line"
    pub column: u32,
}

/// Source code location of a stopped frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation
{
    /// File path as recorded in the debug info.
    pub file: String,
    /// Line number, if known.
    pub line: Option<u32>,
    /// Column number, if known.
    pub column: Option<u32>,
}

impl SourceLocation
{
    /// A location with line and column.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self
    {
        Self {
            file: file.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}

impl fmt::Display for SourceLocation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{}:{line}:{column}", self.file),
            (Some(line), None) => write!(f, "{}:{line}", self.file),
            _ => write!(f, "{}", self.file),
        }
    }
}
