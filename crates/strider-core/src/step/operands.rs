//! Operand parsing and branch classification.
//!
//! The backend hands over operands as the disassembler prints them
//! (`x0, [x1, #0x10]`, `qword ptr [rip + 0x2f0a]`, `*%rax`). The step engine
//! only needs to know whether an instruction transfers control and, if so,
//! where to: a literal address or the value of a register.

use smallvec::SmallVec;

use crate::types::{Address, Architecture};

/// Most operands any instruction the engine cares about carries.
pub const MAX_OPERANDS: usize = 4;

/// Operands of one instruction, stored inline.
pub type Operands = SmallVec<[Operand; MAX_OPERANDS]>;

/// Broad category of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind
{
    /// A register (`x0`, `rax`, `*%rax`)
    Register,
    /// An immediate (`#0x10`, `$1`)
    Immediate,
    /// A literal address (`0x100003f50`)
    Address,
    /// A memory reference (`[sp, #0x10]`, `0x8(%rip)`, `qword ptr [rax]`)
    Memory,
    /// Anything else (labels, shifts, condition codes)
    Other,
}

/// One parsed operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand
{
    /// Trimmed operand text
    pub text: String,
    /// Classification
    pub kind: OperandKind,
}

impl Operand
{
    /// Register name without AT&T decorations, for register operands.
    #[must_use]
    pub fn register_name(&self) -> Option<&str>
    {
        (self.kind == OperandKind::Register).then(|| self.text.trim_start_matches('*').trim_start_matches('%'))
    }

    /// Literal address, for address operands.
    #[must_use]
    pub fn address(&self) -> Option<Address>
    {
        if self.kind != OperandKind::Address {
            return None;
        }
        parse_hex(&self.text).map(Address::new)
    }
}

fn parse_hex(text: &str) -> Option<u64>
{
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

fn classify(text: &str) -> OperandKind
{
    if text.starts_with('[') || text.contains('(') || text.contains("ptr") {
        return OperandKind::Memory;
    }
    if text.starts_with('#') || text.starts_with('$') {
        return OperandKind::Immediate;
    }
    if parse_hex(text).is_some() {
        return OperandKind::Address;
    }
    let bare = text.trim_start_matches('*').trim_start_matches('%');
    let mut chars = bare.chars();
    let is_identifier = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if is_identifier && bare.len() <= 6 {
        OperandKind::Register
    } else {
        OperandKind::Other
    }
}

/// Split operand text at top-level commas and classify each piece.
///
/// Commas inside brackets or parentheses do not split. Trailing disassembler
/// comments (`; symbol`) are dropped. At most [`MAX_OPERANDS`] are returned.
#[must_use]
pub fn parse_operands(text: &str) -> Operands
{
    let text = text.split(';').next().unwrap_or_default();
    let mut operands: SmallVec<[&str; MAX_OPERANDS]> = SmallVec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth -= 1,
            ',' if depth <= 0 => {
                operands.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    operands.push(&text[start..]);

    operands
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .take(MAX_OPERANDS)
        .map(|piece| Operand {
            text: piece.to_string(),
            kind: classify(piece),
        })
        .collect()
}

/// Control-flow category of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind
{
    /// Does not transfer control.
    None,
    /// Branch or call to a literal address.
    Direct,
    /// Branch or call through a register.
    Indirect,
    /// Branch through memory; the target cannot be computed from operands.
    Unresolvable,
    /// Function return.
    Return,
}

const ARM64_INDIRECT: &[&str] = &["br", "braa", "brab", "blraa", "blr"];
const ARM64_DIRECT: &[&str] = &["b", "bl", "cbz", "cbnz", "tbz", "tbnz"];

/// Whether `mnemonic` is a return on any supported architecture.
#[must_use]
pub fn is_return(mnemonic: &str) -> bool
{
    mnemonic.to_ascii_lowercase().starts_with("ret")
}

/// Whether `mnemonic` links a return address, so control comes back after it.
#[must_use]
pub fn is_call(architecture: Architecture, mnemonic: &str) -> bool
{
    let mnemonic = mnemonic.to_ascii_lowercase();
    match architecture {
        Architecture::Arm64 => mnemonic == "bl" || mnemonic.starts_with("blr"),
        Architecture::X86_64 => mnemonic.starts_with("call"),
        Architecture::Unknown(_) => false,
    }
}

/// Classify an instruction for the step engine.
#[must_use]
pub fn classify_branch(architecture: Architecture, mnemonic: &str, operands: &[Operand]) -> BranchKind
{
    let mnemonic = mnemonic.to_ascii_lowercase();
    if mnemonic.starts_with("ret") {
        return BranchKind::Return;
    }
    match architecture {
        Architecture::Arm64 => {
            if ARM64_INDIRECT.contains(&mnemonic.as_str()) {
                BranchKind::Indirect
            } else if ARM64_DIRECT.contains(&mnemonic.as_str()) || mnemonic.starts_with("b.") {
                BranchKind::Direct
            } else {
                BranchKind::None
            }
        }
        Architecture::X86_64 => {
            let is_branch = mnemonic.starts_with("call") || mnemonic.starts_with('j');
            if !is_branch {
                return BranchKind::None;
            }
            match operands.first().map(|operand| operand.kind) {
                Some(OperandKind::Register) => BranchKind::Indirect,
                Some(OperandKind::Address) => BranchKind::Direct,
                _ => BranchKind::Unresolvable,
            }
        }
        Architecture::Unknown(_) => BranchKind::None,
    }
}
