//! Effective entry point of the traced executable.
//!
//! The session's first breakpoint goes on the program's `main`, not on the
//! ELF/Mach-O entry address: by the time `main` runs, the dynamic loader has
//! mapped every startup dependency, which is what the module catalog needs.

use std::fs;
use std::path::Path;

use object::{Object, ObjectSymbol, SymbolKind};

use super::demangle::make_symbol_name;
use crate::error::TracerResult;
use crate::types::{Architecture, SymbolName};

/// Names tried, in order, before falling back to the file's entry address.
const MAIN_SYMBOLS: &[&str] = &["main", "_main"];

/// Where the entry handshake breakpoint should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint
{
    /// Symbol to break on
    pub symbol: SymbolName,
    /// File (unrelocated) address of the symbol, when known
    pub file_address: Option<u64>,
    /// Architecture recorded in the executable's header
    pub architecture: Option<Architecture>,
}

impl EntryPoint
{
    /// Symbol name to pass to the backend's by-name breakpoint.
    #[must_use]
    pub fn breakpoint_name(&self) -> &str
    {
        // Backends resolve Mach-O names without the leading underscore.
        let raw = self.symbol.raw();
        if raw == "_main" {
            "main"
        } else {
            raw
        }
    }
}

/// Find the effective entry point of the executable at `path`.
///
/// ## Errors
///
/// Returns an error if the file cannot be read or is not an object file
/// `object` understands.
pub fn find_entry_point(path: &Path) -> TracerResult<EntryPoint>
{
    let data = fs::read(path)?;
    entry_point_from_bytes(&data)
}

/// Same as [`find_entry_point`] for an in-memory image.
///
/// ## Errors
///
/// Returns an error if `data` is not a supported object file.
pub fn entry_point_from_bytes(data: &[u8]) -> TracerResult<EntryPoint>
{
    let file = object::File::parse(data)?;
    let architecture = match file.architecture() {
        object::Architecture::Aarch64 => Some(Architecture::Arm64),
        object::Architecture::X86_64 => Some(Architecture::X86_64),
        _ => None,
    };

    let text_symbols: Vec<_> = file
        .symbols()
        .filter(|symbol| symbol.is_definition() && symbol.kind() == SymbolKind::Text)
        .collect();

    for wanted in MAIN_SYMBOLS {
        if let Some(symbol) = text_symbols.iter().find(|s| s.name().ok() == Some(*wanted)) {
            return Ok(EntryPoint {
                symbol: make_symbol_name((*wanted).to_string()),
                file_address: Some(symbol.address()),
                architecture,
            });
        }
    }

    // No `main`: break on whichever function covers the entry address.
    let entry = file.entry();
    let covering = text_symbols
        .iter()
        .filter(|s| s.address() <= entry)
        .max_by_key(|s| s.address())
        .and_then(|s| s.name().ok().filter(|name| !name.is_empty()).map(|name| (name.to_string(), s.address())));

    Ok(match covering {
        Some((name, address)) => EntryPoint {
            symbol: make_symbol_name(name),
            file_address: Some(address),
            architecture,
        },
        None => EntryPoint {
            symbol: make_symbol_name("main".to_string()),
            file_address: None,
            architecture,
        },
    })
}

#[cfg(test)]
mod tests
{
    use object::write::{Object as WriteObject, StandardSection, Symbol, SymbolSection};
    use object::{BinaryFormat, Endianness, SymbolFlags, SymbolScope};

    use super::*;

    fn elf_with_symbols(names: &[&str]) -> Vec<u8>
    {
        let mut obj = WriteObject::new(BinaryFormat::Elf, object::Architecture::X86_64, Endianness::Little);
        let text = obj.section_id(StandardSection::Text);
        for name in names {
            let offset = obj.append_section_data(text, &[0xc3; 16], 16);
            obj.add_symbol(Symbol {
                name: name.as_bytes().to_vec(),
                value: offset,
                size: 16,
                kind: SymbolKind::Text,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
        }
        obj.write().unwrap()
    }

    #[test]
    fn test_main_symbol_is_preferred()
    {
        let data = elf_with_symbols(&["helper", "main"]);
        let entry = entry_point_from_bytes(&data).unwrap();
        assert_eq!(entry.symbol.raw(), "main");
        assert_eq!(entry.breakpoint_name(), "main");
        assert_eq!(entry.file_address, Some(16));
        assert_eq!(entry.architecture, Some(Architecture::X86_64));
    }

    #[test]
    fn test_macho_style_main_maps_to_plain_name()
    {
        let data = elf_with_symbols(&["_main"]);
        let entry = entry_point_from_bytes(&data).unwrap();
        assert_eq!(entry.symbol.raw(), "_main");
        assert_eq!(entry.breakpoint_name(), "main");
    }

    #[test]
    fn test_symbol_covering_entry_when_no_main()
    {
        let data = elf_with_symbols(&["_start"]);
        let entry = entry_point_from_bytes(&data).unwrap();
        assert_eq!(entry.breakpoint_name(), "_start");
    }

    #[test]
    fn test_garbage_is_rejected()
    {
        assert!(entry_point_from_bytes(b"definitely not an object file").is_err());
    }
}
