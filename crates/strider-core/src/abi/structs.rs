//! Decoders for C structures passed by pointer to library calls.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::trace;

use crate::backend::MemoryReader;
use crate::types::{Address, Architecture};

/// Decodes one C structure from raw bytes.
pub trait StructLayout: Send + Sync
{
    /// C name of the structure (`stat`).
    fn name(&self) -> &'static str;

    /// Size in bytes.
    fn size(&self) -> usize;

    /// Field name and rendered value pairs. `bytes` is exactly `size()` long.
    fn decode(&self, bytes: &[u8]) -> Vec<(&'static str, String)>;
}

/// `struct stat` as the kernel lays it out for each 64-bit Linux target.
///
/// x86_64 keeps its historical layout (`st_nlink` before `st_mode`, 144
/// bytes); aarch64 uses the asm-generic one (32-bit `st_mode`/`st_nlink`,
/// 32-bit `st_blksize`, 128 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatLayout
{
    /// x86_64 Linux
    X86_64,
    /// aarch64 Linux (asm-generic)
    Aarch64,
}

impl StatLayout
{
    /// Layout used by `architecture`, if known.
    #[must_use]
    pub fn for_architecture(architecture: Architecture) -> Option<Self>
    {
        match architecture {
            Architecture::X86_64 => Some(Self::X86_64),
            Architecture::Arm64 => Some(Self::Aarch64),
            Architecture::Unknown(_) => None,
        }
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32
{
    bytes
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .map_or(0, u32::from_le_bytes)
}

fn u64_at(bytes: &[u8], offset: usize) -> u64
{
    bytes
        .get(offset..offset + 8)
        .and_then(|slice| slice.try_into().ok())
        .map_or(0, u64::from_le_bytes)
}

fn i32_at(bytes: &[u8], offset: usize) -> i32
{
    bytes
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .map_or(0, i32::from_le_bytes)
}

fn i64_at(bytes: &[u8], offset: usize) -> i64
{
    bytes
        .get(offset..offset + 8)
        .and_then(|slice| slice.try_into().ok())
        .map_or(0, i64::from_le_bytes)
}

fn timespec_at(bytes: &[u8], offset: usize) -> String
{
    format!("{}.{:09}", i64_at(bytes, offset), i64_at(bytes, offset + 8))
}

impl StructLayout for StatLayout
{
    fn name(&self) -> &'static str
    {
        "stat"
    }

    fn size(&self) -> usize
    {
        match self {
            Self::X86_64 => 144,
            Self::Aarch64 => 128,
        }
    }

    fn decode(&self, bytes: &[u8]) -> Vec<(&'static str, String)>
    {
        let (nlink, mode, uid, gid, rdev, blksize) = match self {
            Self::X86_64 => (
                u64_at(bytes, 16),
                u32_at(bytes, 24),
                u32_at(bytes, 28),
                u32_at(bytes, 32),
                u64_at(bytes, 40),
                i64_at(bytes, 56),
            ),
            Self::Aarch64 => (
                u64::from(u32_at(bytes, 20)),
                u32_at(bytes, 16),
                u32_at(bytes, 24),
                u32_at(bytes, 28),
                u64_at(bytes, 32),
                i64::from(i32_at(bytes, 56)),
            ),
        };
        vec![
            ("st_dev", u64_at(bytes, 0).to_string()),
            ("st_ino", u64_at(bytes, 8).to_string()),
            ("st_nlink", nlink.to_string()),
            ("st_mode", format!("0o{mode:o}")),
            ("st_uid", uid.to_string()),
            ("st_gid", gid.to_string()),
            ("st_rdev", rdev.to_string()),
            ("st_size", i64_at(bytes, 48).to_string()),
            ("st_blksize", blksize.to_string()),
            ("st_blocks", i64_at(bytes, 64).to_string()),
            ("st_atim", timespec_at(bytes, 72)),
            ("st_mtim", timespec_at(bytes, 88)),
            ("st_ctim", timespec_at(bytes, 104)),
        ]
    }
}

/// Known structure layouts by name.
pub struct StructRegistry
{
    layouts: HashMap<&'static str, Box<dyn StructLayout>>,
}

impl std::fmt::Debug for StructRegistry
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("StructRegistry")
            .field("layouts", &self.layouts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StructRegistry
{
    /// Registry without any layouts.
    #[must_use]
    pub fn empty() -> Self
    {
        Self { layouts: HashMap::new() }
    }

    /// Built-in layouts for `architecture`; empty when none are known.
    #[must_use]
    pub fn for_architecture(architecture: Architecture) -> Self
    {
        let mut registry = Self::empty();
        if let Some(stat) = StatLayout::for_architecture(architecture) {
            registry.register(Box::new(stat));
        }
        registry
    }

    /// Add or replace a layout.
    pub fn register(&mut self, layout: Box<dyn StructLayout>)
    {
        self.layouts.insert(layout.name(), layout);
    }

    /// Read and render the structure `name` at `address` as
    /// `{field=value, ...}`.
    ///
    /// `None` if the layout is unknown, the pointer is null or the memory is
    /// unreadable; callers fall back to printing the pointer.
    pub fn get_struct<M>(&self, name: &str, address: Address, memory: &M) -> Option<String>
    where
        M: MemoryReader + ?Sized,
    {
        let layout = self.layouts.get(name)?;
        if address.is_null() {
            return None;
        }
        let bytes = match memory.read_bytes(address, layout.size()) {
            Ok(bytes) if bytes.len() >= layout.size() => bytes,
            Ok(_) | Err(_) => {
                trace!("Could not read struct {name} at {address}");
                return None;
            }
        };
        let mut out = String::from("{");
        for (idx, (field, value)) in layout.decode(&bytes).into_iter().enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{field}={value}");
        }
        out.push('}');
        Some(out)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::error::{TracerError, TracerResult};

    struct Bytes(Vec<u8>);

    impl MemoryReader for Bytes
    {
        fn read_bytes(&self, address: Address, length: usize) -> TracerResult<Vec<u8>>
        {
            if address.value() != 0x1000 || length > self.0.len() {
                return Err(TracerError::MemoryReadFailed { address, length });
            }
            Ok(self.0[..length].to_vec())
        }
    }

    fn x86_64_stat() -> Vec<u8>
    {
        let mut buf = vec![0u8; 144];
        buf[8..16].copy_from_slice(&42u64.to_le_bytes());
        buf[16..24].copy_from_slice(&3u64.to_le_bytes());
        buf[24..28].copy_from_slice(&0o100_644u32.to_le_bytes());
        buf[28..32].copy_from_slice(&501u32.to_le_bytes());
        buf[32..36].copy_from_slice(&20u32.to_le_bytes());
        buf[48..56].copy_from_slice(&1234i64.to_le_bytes());
        buf[56..64].copy_from_slice(&4096i64.to_le_bytes());
        buf[88..96].copy_from_slice(&1_700_000_000i64.to_le_bytes());
        buf[96..104].copy_from_slice(&5i64.to_le_bytes());
        buf
    }

    fn aarch64_stat() -> Vec<u8>
    {
        let mut buf = vec![0u8; 128];
        buf[8..16].copy_from_slice(&42u64.to_le_bytes());
        buf[16..20].copy_from_slice(&0o40_755u32.to_le_bytes());
        buf[20..24].copy_from_slice(&2u32.to_le_bytes());
        buf[24..28].copy_from_slice(&1000u32.to_le_bytes());
        buf[28..32].copy_from_slice(&100u32.to_le_bytes());
        buf[32..40].copy_from_slice(&7u64.to_le_bytes());
        buf[48..56].copy_from_slice(&4321i64.to_le_bytes());
        buf[56..60].copy_from_slice(&4096i32.to_le_bytes());
        buf[60..64].copy_from_slice(&(-1i32).to_le_bytes());
        buf[64..72].copy_from_slice(&8i64.to_le_bytes());
        buf
    }

    fn field(fields: &[(&'static str, String)], name: &str) -> String
    {
        fields.iter().find(|(f, _)| *f == name).map(|(_, v)| v.clone()).unwrap()
    }

    #[test]
    fn test_x86_64_stat_fields()
    {
        let fields = StatLayout::X86_64.decode(&x86_64_stat());
        assert_eq!(field(&fields, "st_ino"), "42");
        assert_eq!(field(&fields, "st_nlink"), "3");
        assert_eq!(field(&fields, "st_mode"), "0o100644");
        assert_eq!(field(&fields, "st_uid"), "501");
        assert_eq!(field(&fields, "st_gid"), "20");
        assert_eq!(field(&fields, "st_size"), "1234");
        assert_eq!(field(&fields, "st_blksize"), "4096");
        assert_eq!(field(&fields, "st_mtim"), "1700000000.000000005");
    }

    #[test]
    fn test_aarch64_stat_fields()
    {
        let fields = StatLayout::Aarch64.decode(&aarch64_stat());
        assert_eq!(StatLayout::Aarch64.size(), 128);
        assert_eq!(field(&fields, "st_mode"), "0o40755");
        assert_eq!(field(&fields, "st_nlink"), "2");
        assert_eq!(field(&fields, "st_uid"), "1000");
        assert_eq!(field(&fields, "st_gid"), "100");
        assert_eq!(field(&fields, "st_rdev"), "7");
        assert_eq!(field(&fields, "st_size"), "4321");
        assert_eq!(field(&fields, "st_blksize"), "4096");
        assert_eq!(field(&fields, "st_blocks"), "8");
    }

    #[test]
    fn test_registry_picks_layout_by_architecture()
    {
        let arm = StructRegistry::for_architecture(Architecture::Arm64);
        let rendered = arm.get_struct("stat", Address::new(0x1000), &Bytes(aarch64_stat())).unwrap();
        assert!(rendered.contains("st_mode=0o40755, st_uid=1000"));

        let x86 = StructRegistry::for_architecture(Architecture::X86_64);
        let rendered = x86.get_struct("stat", Address::new(0x1000), &Bytes(x86_64_stat())).unwrap();
        assert!(rendered.starts_with("{st_dev=0, st_ino=42, st_nlink=3, st_mode=0o100644,"));
        assert!(rendered.ends_with('}'));

        // 128 readable bytes are too few for the x86_64 layout.
        assert_eq!(x86.get_struct("stat", Address::new(0x1000), &Bytes(aarch64_stat())), None);
    }

    #[test]
    fn test_registry_fallbacks()
    {
        let registry = StructRegistry::for_architecture(Architecture::X86_64);
        let memory = Bytes(x86_64_stat());
        assert_eq!(registry.get_struct("stat", Address::ZERO, &memory), None);
        assert_eq!(registry.get_struct("stat", Address::new(0x2000), &memory), None);
        assert_eq!(registry.get_struct("timeval", Address::new(0x1000), &memory), None);
        let unknown = StructRegistry::for_architecture(Architecture::Unknown("riscv64"));
        assert_eq!(unknown.get_struct("stat", Address::new(0x1000), &memory), None);
    }
}
