//! Register token recognition, §4.B's *register* operand grammar. Re-expresses
//! the teacher's `Reg` idiom (`backend/x86/codegen/register.rs`) over the
//! wider x86-32/64 register file a GAS-syntax formatter can emit, rather than
//! just the System V argument/caller/callee-saved subsets the teacher needed.

/// A recognized x86-32/64 register, named after its GAS-syntax token with the
/// leading `%` stripped (e.g. `%rax` parses to `Reg::Rax`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Rax, Rbx, Rcx, Rdx, Rsi, Rdi, Rbp, Rsp, Rip,
    R8, R9, R10, R11, R12, R13, R14, R15,
    Eax, Ebx, Ecx, Edx, Esi, Edi, Ebp, Esp, Eip,
    R8d, R9d, R10d, R11d, R12d, R13d, R14d, R15d,
    Ax, Bx, Cx, Dx, Si, Di, Bp, Sp,
    Al, Bl, Cl, Dl, Ah, Bh, Ch, Dh,
    Spl, Bpl, Sil, Dil,
    Cs, Ds, Es, Fs, Gs, Ss,
    Eflags, Rflags,
}

impl Reg {
    /// Parses a register token with its leading `%` already stripped.
    pub fn parse(raw: &str) -> Option<Reg> {
        use Reg::*;
        Some(match raw {
            "rax" => Rax, "rbx" => Rbx, "rcx" => Rcx, "rdx" => Rdx,
            "rsi" => Rsi, "rdi" => Rdi, "rbp" => Rbp, "rsp" => Rsp, "rip" => Rip,
            "r8" => R8, "r9" => R9, "r10" => R10, "r11" => R11,
            "r12" => R12, "r13" => R13, "r14" => R14, "r15" => R15,
            "eax" => Eax, "ebx" => Ebx, "ecx" => Ecx, "edx" => Edx,
            "esi" => Esi, "edi" => Edi, "ebp" => Ebp, "esp" => Esp, "eip" => Eip,
            "r8d" => R8d, "r9d" => R9d, "r10d" => R10d, "r11d" => R11d,
            "r12d" => R12d, "r13d" => R13d, "r14d" => R14d, "r15d" => R15d,
            "ax" => Ax, "bx" => Bx, "cx" => Cx, "dx" => Dx,
            "si" => Si, "di" => Di, "bp" => Bp, "sp" => Sp,
            "al" => Al, "bl" => Bl, "cl" => Cl, "dl" => Dl,
            "ah" => Ah, "bh" => Bh, "ch" => Ch, "dh" => Dh,
            "spl" => Spl, "bpl" => Bpl, "sil" => Sil, "dil" => Dil,
            "cs" => Cs, "ds" => Ds, "es" => Es, "fs" => Fs, "gs" => Gs, "ss" => Ss,
            "eflags" => Eflags, "rflags" => Rflags,
            _ => return None,
        })
    }

    /// Segment registers recognized by the *segment-qualified* operand form
    /// (`%fs:val`, `%cs:val(idx)`, ...).
    pub fn is_segment(self) -> bool {
        matches!(self, Reg::Cs | Reg::Ds | Reg::Es | Reg::Fs | Reg::Gs | Reg::Ss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_general_purpose_registers_across_widths() {
        assert_eq!(Reg::parse("rax"), Some(Reg::Rax));
        assert_eq!(Reg::parse("eax"), Some(Reg::Eax));
        assert_eq!(Reg::parse("al"), Some(Reg::Al));
        assert_eq!(Reg::parse("r12d"), Some(Reg::R12d));
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert_eq!(Reg::parse("notareg"), None);
    }

    #[test]
    fn segment_registers_are_tagged() {
        assert!(Reg::Fs.is_segment());
        assert!(!Reg::Rax.is_segment());
    }
}
