//! # Module Catalog
//!
//! Table of the modules mapped into the traced process and the sections they
//! occupy, indexed by load address.
//!
//! The catalog is a snapshot. [`ModuleCatalog::load_modules`] asks the
//! backend for the current module list and rebuilds everything; nothing is
//! updated incrementally, so libraries loaded later (`dlopen`) only appear
//! after the next explicit reload.

pub mod skip;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::backend::{DebuggerBackend, ModuleDescriptor};
use crate::error::TracerResult;
use crate::ranges::{AddressRange, AddressRangeIndex};
use crate::types::Address;

pub use skip::{glob_match, SkipEntry, SkipPolicy};

/// A mapped section of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section
{
    /// Section name
    pub name: String,
    /// First load address
    pub start: Address,
    /// One past the last load address
    pub end: Address,
    /// Size in bytes
    pub size: u64,
}

/// A loaded executable or shared library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module
{
    /// Full path on disk
    pub path: PathBuf,
    /// Mapped sections, in backend order
    pub sections: Vec<Section>,
}

impl Module
{
    /// Build a module from a backend descriptor, keeping only sections with
    /// a non-null load address and a non-zero size.
    #[must_use]
    pub fn from_descriptor(descriptor: &ModuleDescriptor) -> Self
    {
        let sections = descriptor
            .sections
            .iter()
            .filter_map(|section| {
                let start = section.load_address.filter(|addr| !addr.is_null())?;
                let end = start.checked_add(section.size).filter(|end| *end > start)?;
                Some(Section {
                    name: section.name.clone(),
                    start,
                    end,
                    size: section.size,
                })
            })
            .collect();
        Self {
            path: descriptor.path.clone(),
            sections,
        }
    }

    /// File name component of the path, or the whole path if it has none.
    #[must_use]
    pub fn basename(&self) -> &str
    {
        basename(&self.path)
    }
}

/// File name of `path` as UTF-8, falling back to the full (lossy) path.
pub(crate) fn basename(path: &Path) -> &str
{
    path.file_name()
        .and_then(|name| name.to_str())
        .or_else(|| path.to_str())
        .unwrap_or_default()
}

/// Which section of which module a range belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SectionRef
{
    pub(crate) module: usize,
    pub(crate) section: usize,
}

/// Result of an address lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleHit<'a>
{
    /// Owning module
    pub module: &'a Module,
    /// Section containing the address
    pub section: &'a Section,
    /// Offset of the address from the section start
    pub offset: u64,
}

/// Loaded modules plus an address index over their sections.
#[derive(Debug, Default)]
pub struct ModuleCatalog
{
    modules: Vec<Module>,
    index: AddressRangeIndex<SectionRef>,
}

impl ModuleCatalog
{
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Build a catalog from already enumerated modules.
    #[must_use]
    pub fn from_modules(modules: Vec<Module>) -> Self
    {
        let ranges = modules.iter().enumerate().flat_map(|(module_idx, module)| {
            module.sections.iter().enumerate().map(move |(section_idx, section)| {
                AddressRange::new(
                    section.start,
                    section.end,
                    SectionRef {
                        module: module_idx,
                        section: section_idx,
                    },
                )
            })
        });
        let index = AddressRangeIndex::build(ranges.collect::<Vec<_>>());
        Self { modules, index }
    }

    /// Enumerate every mapped module from the backend and rebuild the table.
    ///
    /// Returns the number of modules loaded.
    ///
    /// ## Errors
    ///
    /// Propagates the backend's failure to enumerate modules.
    pub fn load_modules<B>(&mut self, backend: &B) -> TracerResult<usize>
    where
        B: DebuggerBackend + ?Sized,
    {
        let descriptors = backend.modules()?;
        let modules: Vec<Module> = descriptors.iter().map(Module::from_descriptor).collect();
        *self = Self::from_modules(modules);
        debug!(
            "Loaded {} modules with {} mapped sections",
            self.modules.len(),
            self.index.len()
        );
        Ok(self.modules.len())
    }

    /// Find the module and section containing `address`.
    #[must_use]
    pub fn find_module_by_address(&self, address: Address) -> Option<ModuleHit<'_>>
    {
        let range = self.index.find(address)?;
        let module = self.modules.get(range.owner.module)?;
        let section = module.sections.get(range.owner.section)?;
        Some(ModuleHit {
            module,
            section,
            offset: address.value() - section.start.value(),
        })
    }

    /// Loaded modules in backend order.
    #[must_use]
    pub fn modules(&self) -> &[Module]
    {
        &self.modules
    }

    /// Number of indexed sections.
    #[must_use]
    pub fn section_count(&self) -> usize
    {
        self.index.len()
    }

    /// Whether no module has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.modules.is_empty()
    }

    /// Log every module and its sections at info level.
    pub fn log_modules(&self)
    {
        for module in &self.modules {
            info!("Module {} ({} sections)", module.path.display(), module.sections.len());
            for section in &module.sections {
                debug!("  {:<20} {}-{} ({} bytes)", section.name, section.start, section.end, section.size);
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::backend::SectionDescriptor;

    fn descriptor(path: &str, sections: &[(&str, Option<u64>, u64)]) -> ModuleDescriptor
    {
        ModuleDescriptor {
            path: PathBuf::from(path),
            sections: sections
                .iter()
                .map(|(name, load, size)| SectionDescriptor {
                    name: (*name).to_string(),
                    load_address: load.map(Address::new),
                    size: *size,
                })
                .collect(),
        }
    }

    #[test]
    fn test_unmapped_sections_are_dropped()
    {
        let module = Module::from_descriptor(&descriptor(
            "/usr/lib/libc.so.6",
            &[(".text", Some(0x1000), 0x100), (".debug", None, 0x50), (".bss", Some(0x2000), 0), ("null", Some(0), 8)],
        ));
        assert_eq!(module.sections.len(), 1);
        assert_eq!(module.sections[0].end, Address::new(0x1100));
        assert_eq!(module.basename(), "libc.so.6");
    }

    #[test]
    fn test_find_module_by_address_reports_offset()
    {
        let catalog = ModuleCatalog::from_modules(vec![
            Module::from_descriptor(&descriptor("/bin/app", &[("__TEXT", Some(0x1_0000), 0x4000)])),
            Module::from_descriptor(&descriptor("/usr/lib/libSystem.B.dylib", &[("__TEXT", Some(0x8_0000), 0x1000)])),
        ]);

        let hit = catalog.find_module_by_address(Address::new(0x1_0010)).unwrap();
        assert_eq!(hit.module.path, PathBuf::from("/bin/app"));
        assert_eq!(hit.section.name, "__TEXT");
        assert_eq!(hit.offset, 0x10);

        assert!(catalog.find_module_by_address(Address::new(0x1_4000)).is_none());
        assert!(catalog.find_module_by_address(Address::new(0x8_0fff)).is_some());
    }

    #[test]
    fn test_empty_catalog()
    {
        let catalog = ModuleCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog.find_module_by_address(Address::new(0x1000)).is_none());
    }
}
