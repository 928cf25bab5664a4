//! Tagged operand model, §3 `Insn::operands` and §4.B's operand grammar.
//! Recognition is grammatical: each variant below corresponds to exactly one
//! of the forms listed in §4.B, parsed from the raw GAS-syntax text the
//! formatter callback hands us — never matched with a regex.

use crate::decoder::register::Reg;
use crate::types::Vma;

/// `(base)` or `(base,index,scale)`, shared by *index* and *index-indirect*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexForm {
    pub offset: i64,
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub scale: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// `$0x...` — an immediate value.
    Immediate(i64),
    /// `0x...` — a literal address, typically a direct branch/call target.
    Address(Vma),
    /// `%reg` — a register.
    Register(Reg),
    /// `*%reg` — an indirect branch/call through a register.
    RegisterIndirect(Reg),
    /// `*0x...` — an indirect branch/call through an absolute address.
    AddressIndirect(Vma),
    /// `off(base,index,scale)` or `(base)` — a memory reference.
    Indexed(IndexForm),
    /// `*off(base,index,scale)` — an indirect branch/call through memory.
    IndexedIndirect(IndexForm),
    /// `%fs:val`, `%cs:val(idx)`, ... — a segment-qualified form wrapping
    /// one of the forms above.
    SegmentQualified { segment: Reg, inner: Box<Operand> },
}

impl Operand {
    /// The direct target VMA, when this operand statically names one.
    /// Indirect forms (through a register or memory) yield `None`, per
    /// §4.B: "unresolved (indirect) targets yield 0."
    pub fn direct_target(&self) -> Option<Vma> {
        match self {
            Operand::Address(vma) => Some(*vma),
            Operand::SegmentQualified { inner, .. } => inner.direct_target(),
            _ => None,
        }
    }
}

/// Parses one operand token per the §4.B grammar. `None` means the token
/// matched none of the recognized forms.
pub fn parse_operand(raw: &str) -> Option<Operand> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for seg in ["%fs:", "%cs:", "%es:", "%ds:", "%gs:", "%ss:"] {
        if let Some(rest) = raw.strip_prefix(seg) {
            let segment = Reg::parse(&seg[1..seg.len() - 1])?;
            let inner = parse_operand(rest)?;
            return Some(Operand::SegmentQualified {
                segment,
                inner: Box::new(inner),
            });
        }
    }

    if let Some(rest) = raw.strip_prefix('$') {
        return parse_hex_or_dec(rest).map(Operand::Immediate);
    }

    if let Some(rest) = raw.strip_prefix('*') {
        if let Some(reg) = rest.strip_prefix('%').and_then(Reg::parse) {
            return Some(Operand::RegisterIndirect(reg));
        }
        if let Ok(vma) = parse_hex_addr(rest) {
            return Some(Operand::AddressIndirect(vma));
        }
        return parse_index_form(rest).map(Operand::IndexedIndirect);
    }

    if let Some(rest) = raw.strip_prefix('%') {
        return Reg::parse(rest).map(Operand::Register);
    }

    if raw.contains('(') {
        return parse_index_form(raw).map(Operand::Indexed);
    }

    parse_hex_addr(raw).ok().map(Operand::Address)
}

fn parse_hex_addr(raw: &str) -> Result<Vma, ()> {
    let raw = raw.strip_prefix("0x").ok_or(())?;
    Vma::from_str_radix(raw, 16).map_err(|_| ())
}

fn parse_hex_or_dec(raw: &str) -> Option<i64> {
    if let Some(hex) = raw.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = raw.strip_prefix("-0x") {
        i64::from_str_radix(hex, 16).ok().map(|v: i64| -v)
    } else {
        raw.parse().ok()
    }
}

/// Parses `off(base,index,scale)` / `off(base)` / `(base,index,scale)`.
fn parse_index_form(raw: &str) -> Option<IndexForm> {
    let open = raw.find('(')?;
    if !raw.ends_with(')') {
        return None;
    }

    let offset_str = &raw[..open];
    let offset = if offset_str.is_empty() {
        0
    } else {
        parse_hex_or_dec(offset_str)?
    };

    let inside = &raw[open + 1..raw.len() - 1];
    let mut parts = inside.split(',');

    let base = match parts.next()?.trim() {
        "" => None,
        tok => Some(Reg::parse(tok.strip_prefix('%')?)?),
    };
    let index = match parts.next() {
        Some(tok) if !tok.trim().is_empty() => Some(Reg::parse(tok.trim().strip_prefix('%')?)?),
        _ => None,
    };
    let scale = match parts.next() {
        Some(tok) if !tok.trim().is_empty() => {
            let s: u8 = tok.trim().parse().ok()?;
            if matches!(s, 1 | 2 | 4 | 8) {
                Some(s)
            } else {
                return None;
            }
        }
        _ => None,
    };

    Some(IndexForm {
        offset,
        base,
        index,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_immediate() {
        assert_eq!(parse_operand("$0x10"), Some(Operand::Immediate(0x10)));
    }

    #[test]
    fn parses_register() {
        assert_eq!(parse_operand("%rax"), Some(Operand::Register(Reg::Rax)));
    }

    #[test]
    fn parses_direct_address() {
        assert_eq!(parse_operand("0x4010a0"), Some(Operand::Address(0x4010a0)));
    }

    #[test]
    fn parses_register_indirect() {
        assert_eq!(
            parse_operand("*%rax"),
            Some(Operand::RegisterIndirect(Reg::Rax))
        );
    }

    #[test]
    fn parses_indexed_form_with_scale() {
        let op = parse_operand("-0x8(%rbp,%rax,4)").unwrap();
        assert_eq!(
            op,
            Operand::Indexed(IndexForm {
                offset: -8,
                base: Some(Reg::Rbp),
                index: Some(Reg::Rax),
                scale: Some(4),
            })
        );
    }

    #[test]
    fn parses_base_only_index_form() {
        let op = parse_operand("(%rdi)").unwrap();
        assert_eq!(
            op,
            Operand::Indexed(IndexForm {
                offset: 0,
                base: Some(Reg::Rdi),
                index: None,
                scale: None,
            })
        );
    }

    #[test]
    fn parses_segment_qualified_form() {
        let op = parse_operand("%fs:0x28").unwrap();
        match op {
            Operand::SegmentQualified { segment, inner } => {
                assert_eq!(segment, Reg::Fs);
                assert_eq!(*inner, Operand::Address(0x28));
            }
            _ => panic!("expected segment-qualified operand"),
        }
    }

    #[test]
    fn direct_target_is_none_for_indirect_forms() {
        assert_eq!(parse_operand("*%rax").unwrap().direct_target(), None);
        assert_eq!(
            parse_operand("0x401000").unwrap().direct_target(),
            Some(0x401000)
        );
    }

    #[test]
    fn rejects_malformed_scale() {
        assert_eq!(parse_operand("(%rax,%rbx,3)"), None);
    }
}
