//! Human-readable arguments for common C library calls.
//!
//! Each known function has a parser turning its raw argument registers into
//! `name=value` strings: pointers to C strings are read from target memory,
//! buffers get a short hex preview, flags print in hex and file modes in
//! octal. Unknown functions fall back to `register=0x...` for every argument.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::structs::StructRegistry;
use super::{AbiDescriptor, RegisterArg};
use crate::backend::MemoryReader;
use crate::types::Address;

/// Longest C string read from the target.
pub const MAX_STRING_LEN: usize = 256;
/// Bytes shown from a read/write buffer.
pub const MAX_BUF_PREVIEW: u64 = 16;

/// Everything a parser needs to render one call.
struct CallContext<'a>
{
    abi: &'a AbiDescriptor,
    args: &'a [RegisterArg],
    memory: &'a dyn MemoryReader,
    structs: &'a StructRegistry,
}

impl CallContext<'_>
{
    /// Argument `index`, 0 when its register was not read.
    fn arg(&self, index: usize) -> u64
    {
        self.abi
            .arg_register(index)
            .and_then(|register| self.args.iter().find(|arg| arg.register == register))
            .map_or(0, |arg| arg.value)
    }

    fn string(&self, index: usize) -> String
    {
        read_c_string(self.memory, Address::new(self.arg(index)))
    }

    fn stat(&self, index: usize) -> String
    {
        let address = Address::new(self.arg(index));
        self.structs
            .get_struct("stat", address, self.memory)
            .unwrap_or_else(|| format!("0x{:x}", address.value()))
    }
}

/// Sized handle so any reader can be used as `dyn MemoryReader`.
struct Reader<'a, M: ?Sized>(&'a M);

impl<M> MemoryReader for Reader<'_, M>
where
    M: MemoryReader + ?Sized,
{
    fn read_bytes(&self, address: Address, length: usize) -> crate::error::TracerResult<Vec<u8>>
    {
        self.0.read_bytes(address, length)
    }
}

type ArgParser = fn(&CallContext<'_>) -> Vec<String>;

fn parse_open(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![
        format!("path=\"{}\"", ctx.string(0)),
        format!("flags=0x{:x}", ctx.arg(1)),
        format!("mode=0o{:o}", ctx.arg(2)),
    ]
}

fn parse_creat(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![format!("path=\"{}\"", ctx.string(0)), format!("mode=0o{:o}", ctx.arg(1))]
}

fn parse_read_write(ctx: &CallContext<'_>) -> Vec<String>
{
    let buf = ctx.arg(1);
    let count = ctx.arg(2);
    let preview = preview_buffer(ctx.memory, Address::new(buf), count.min(MAX_BUF_PREVIEW));
    vec![
        format!("fd={}", ctx.arg(0)),
        format!("buf=0x{buf:x} [{preview}]"),
        format!("count={count}"),
    ]
}

fn parse_lseek(ctx: &CallContext<'_>) -> Vec<String>
{
    // The offset is an off_t; show negative seeks as such.
    #[allow(clippy::cast_possible_wrap)]
    let offset = ctx.arg(1) as i64;
    vec![
        format!("fd={}", ctx.arg(0)),
        format!("offset={offset}"),
        format!("whence={}", ctx.arg(2)),
    ]
}

fn parse_stat(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![format!("path=\"{}\"", ctx.string(0)), format!("stat_buf={}", ctx.stat(1))]
}

fn parse_fstat(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![format!("fd={}", ctx.arg(0)), format!("stat_buf={}", ctx.stat(1))]
}

fn parse_path(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![format!("path=\"{}\"", ctx.string(0))]
}

fn parse_rename(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![format!("old=\"{}\"", ctx.string(0)), format!("new=\"{}\"", ctx.string(1))]
}

fn parse_execve(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![
        format!("path=\"{}\"", ctx.string(0)),
        format!("argv=0x{:x}", ctx.arg(1)),
        format!("envp=0x{:x}", ctx.arg(2)),
    ]
}

fn parse_waitpid(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![
        format!("pid={}", ctx.arg(0)),
        format!("status=0x{:x}", ctx.arg(1)),
        format!("options=0x{:x}", ctx.arg(2)),
    ]
}

fn parse_kill(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![format!("pid={}", ctx.arg(0)), format!("sig={}", ctx.arg(1))]
}

fn parse_dup2(ctx: &CallContext<'_>) -> Vec<String>
{
    vec![format!("oldfd={}", ctx.arg(0)), format!("newfd={}", ctx.arg(1))]
}

static PARSERS: Lazy<HashMap<&'static str, ArgParser>> = Lazy::new(|| {
    let mut parsers: HashMap<&'static str, ArgParser> = HashMap::new();
    parsers.insert("open", parse_open);
    parsers.insert("creat", parse_creat);
    parsers.insert("read", parse_read_write);
    parsers.insert("write", parse_read_write);
    parsers.insert("lseek", parse_lseek);
    parsers.insert("stat", parse_stat);
    parsers.insert("fstat", parse_fstat);
    parsers.insert("unlink", parse_path);
    parsers.insert("mkdir", |ctx| vec![format!("path=\"{}\"", ctx.string(0)), format!("mode=0o{:o}", ctx.arg(1))]);
    parsers.insert("rename", parse_rename);
    parsers.insert("execve", parse_execve);
    parsers.insert("waitpid", parse_waitpid);
    parsers.insert("kill", parse_kill);
    parsers.insert("dup2", parse_dup2);
    parsers.insert("close", |ctx| vec![format!("fd={}", ctx.arg(0))]);
    parsers.insert("malloc", |ctx| vec![format!("size={}", ctx.arg(0))]);
    parsers.insert("free", |ctx| vec![format!("ptr=0x{:x}", ctx.arg(0))]);
    parsers.insert("pipe", |ctx| vec![format!("pipefd=0x{:x}", ctx.arg(0))]);
    parsers.insert("exit", |ctx| vec![format!("status={}", ctx.arg(0))]);
    parsers.insert("fork", |_| Vec::new());
    parsers.insert("getpid", |_| Vec::new());
    parsers.insert("getppid", |_| Vec::new());
    parsers
});

/// Decodes library call arguments using an architecture's conventions.
#[derive(Debug)]
pub struct LibcArgDecoder
{
    abi: &'static AbiDescriptor,
    structs: StructRegistry,
}

impl LibcArgDecoder
{
    /// Decoder with the built-in structure layouts of the ABI's architecture.
    #[must_use]
    pub fn new(abi: &'static AbiDescriptor) -> Self
    {
        Self::with_structs(abi, StructRegistry::for_architecture(abi.architecture))
    }

    /// Decoder with a custom structure registry.
    #[must_use]
    pub fn with_structs(abi: &'static AbiDescriptor, structs: StructRegistry) -> Self
    {
        Self { abi, structs }
    }

    /// Calling conventions in use.
    #[must_use]
    pub fn abi(&self) -> &'static AbiDescriptor
    {
        self.abi
    }

    /// Whether `function` has a dedicated parser.
    #[must_use]
    pub fn is_known(function: &str) -> bool
    {
        PARSERS.contains_key(function)
    }

    /// Render the arguments of a call to `function`.
    pub fn parse<M>(&self, function: &str, args: &[RegisterArg], memory: &M) -> Vec<String>
    where
        M: MemoryReader + ?Sized,
    {
        let Some(parser) = PARSERS.get(function) else {
            return args.iter().map(|arg| format!("{}=0x{:x}", arg.register, arg.value)).collect();
        };
        let reader = Reader(memory);
        let ctx = CallContext {
            abi: self.abi,
            args,
            memory: &reader,
            structs: &self.structs,
        };
        parser(&ctx)
    }
}

/// Read a NUL-terminated string of at most [`MAX_STRING_LEN`] bytes.
///
/// Null pointers render as `<nullptr>` and unreadable memory as
/// `<invalid_addr:0x...>`. A string that hits the limit without a NUL gets
/// a trailing `...`; bytes that are not UTF-8 are shown as hex.
pub fn read_c_string<M>(memory: &M, address: Address) -> String
where
    M: MemoryReader + ?Sized,
{
    if address.is_null() {
        return "<nullptr>".to_string();
    }
    let Ok(bytes) = memory.read_bytes(address, MAX_STRING_LEN) else {
        return format!("<invalid_addr:0x{:x}>", address.value());
    };
    let (text, truncated) = match bytes.iter().position(|b| *b == 0) {
        Some(nul) => (&bytes[..nul], false),
        None => (&bytes[..], true),
    };
    let mut rendered = match std::str::from_utf8(text) {
        Ok(text) => text.to_string(),
        Err(_) => hex(text),
    };
    if truncated {
        rendered.push_str("...");
    }
    rendered
}

/// Hex preview of `size` bytes at `address`; empty for null or zero-sized
/// buffers, `<read_error>` when unreadable.
pub fn preview_buffer<M>(memory: &M, address: Address, size: u64) -> String
where
    M: MemoryReader + ?Sized,
{
    if address.is_null() || size == 0 {
        return String::new();
    }
    let length = usize::try_from(size).unwrap_or(usize::MAX);
    match memory.read_bytes(address, length) {
        Ok(bytes) => hex(&bytes),
        Err(_) => "<read_error>".to_string(),
    }
}

fn hex(bytes: &[u8]) -> String
{
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests
{
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::{TracerError, TracerResult};
    use crate::types::Architecture;

    /// Sparse memory: each region is readable from its start address only.
    #[derive(Default)]
    struct Regions(BTreeMap<u64, Vec<u8>>);

    impl MemoryReader for Regions
    {
        fn read_bytes(&self, address: Address, length: usize) -> TracerResult<Vec<u8>>
        {
            let bytes = self.0.get(&address.value()).ok_or(TracerError::MemoryReadFailed { address, length })?;
            Ok(bytes.iter().copied().take(length).collect())
        }
    }

    fn x86_decoder() -> LibcArgDecoder
    {
        LibcArgDecoder::new(AbiDescriptor::for_architecture(Architecture::X86_64).unwrap())
    }

    fn args(values: &[u64]) -> Vec<RegisterArg>
    {
        let abi = AbiDescriptor::for_architecture(Architecture::X86_64).unwrap();
        abi.arg_registers
            .iter()
            .zip(values)
            .map(|(register, value)| RegisterArg {
                register: *register,
                value: *value,
            })
            .collect()
    }

    #[test]
    fn test_open_arguments()
    {
        let mut memory = Regions::default();
        memory.0.insert(0x5000, b"/tmp/f\0garbage".to_vec());
        let decoded = x86_decoder().parse("open", &args(&[0x5000, 0x2, 0x1A4]), &memory);
        assert_eq!(decoded, ["path=\"/tmp/f\"", "flags=0x2", "mode=0o644"]);
    }

    #[test]
    fn test_read_buffer_preview_is_bounded()
    {
        let mut memory = Regions::default();
        memory.0.insert(0x6000, (0u8..64).collect());
        let decoded = x86_decoder().parse("read", &args(&[3, 0x6000, 100]), &memory);
        assert_eq!(decoded[0], "fd=3");
        assert_eq!(decoded[1], "buf=0x6000 [000102030405060708090a0b0c0d0e0f]");
        assert_eq!(decoded[2], "count=100");
    }

    #[test]
    fn test_unreadable_buffer()
    {
        let decoded = x86_decoder().parse("write", &args(&[1, 0x7000, 4]), &Regions::default());
        assert_eq!(decoded[1], "buf=0x7000 [<read_error>]");
    }

    #[test]
    fn test_string_sentinels()
    {
        let mut memory = Regions::default();
        memory.0.insert(0x100, vec![b'a'; MAX_STRING_LEN]);
        memory.0.insert(0x200, vec![0xff, 0xfe, 0]);

        assert_eq!(read_c_string(&memory, Address::ZERO), "<nullptr>");
        assert_eq!(read_c_string(&memory, Address::new(0x999)), "<invalid_addr:0x999>");
        assert_eq!(read_c_string(&memory, Address::new(0x100)), format!("{}...", "a".repeat(MAX_STRING_LEN)));
        assert_eq!(read_c_string(&memory, Address::new(0x200)), "fffe");
    }

    #[test]
    fn test_stat_falls_back_to_pointer()
    {
        let mut memory = Regions::default();
        memory.0.insert(0x300, b"/etc/hosts\0".to_vec());
        let decoded = x86_decoder().parse("stat", &args(&[0x300, 0x8000]), &memory);
        assert_eq!(decoded, ["path=\"/etc/hosts\"", "stat_buf=0x8000"]);
    }

    #[test]
    fn test_fstat_uses_arm64_layout()
    {
        let abi = AbiDescriptor::for_architecture(Architecture::Arm64).unwrap();
        let mut stat = vec![0u8; 128];
        stat[16..20].copy_from_slice(&0o100_600u32.to_le_bytes());
        stat[20..24].copy_from_slice(&1u32.to_le_bytes());
        stat[24..28].copy_from_slice(&501u32.to_le_bytes());
        stat[48..56].copy_from_slice(&77i64.to_le_bytes());
        let mut memory = Regions::default();
        memory.0.insert(0x8000, stat);
        let args = [
            RegisterArg { register: "x0", value: 3 },
            RegisterArg { register: "x1", value: 0x8000 },
        ];

        let decoded = LibcArgDecoder::new(abi).parse("fstat", &args, &memory);
        assert_eq!(decoded[0], "fd=3");
        assert!(decoded[1].starts_with("stat_buf={st_dev=0, st_ino=0, st_nlink=1, st_mode=0o100600, st_uid=501,"));
        assert!(decoded[1].contains("st_size=77"));
    }

    #[test]
    fn test_unknown_function_lists_registers()
    {
        let decoded = x86_decoder().parse("frobnicate", &args(&[1, 0xff]), &Regions::default());
        assert_eq!(decoded, ["rdi=0x1", "rsi=0xff"]);
    }

    #[test]
    fn test_simple_parsers()
    {
        let decoder = x86_decoder();
        let memory = Regions::default();
        assert_eq!(decoder.parse("close", &args(&[4]), &memory), ["fd=4"]);
        assert_eq!(decoder.parse("malloc", &args(&[32]), &memory), ["size=32"]);
        assert_eq!(decoder.parse("free", &args(&[0xabc]), &memory), ["ptr=0xabc"]);
        assert!(decoder.parse("getpid", &args(&[]), &memory).is_empty());
        assert!(LibcArgDecoder::is_known("fstat"));
        assert!(!LibcArgDecoder::is_known("printf"));
    }
}
