//! Closed mnemonic enumeration and control-flow classification, Component B.
//!
//! Grounded on `include/bf_insn_decoder.h`'s commented `insn_mnemonic` list
//! and `lib/bf_insn_decoder.c`'s `is_mnemonic`/`breaks_flow`/`branches_flow`/
//! `calls_subroutine`/`ends_flow`. The original hashes the first 8 bytes of
//! the mnemonic text into a `uint64_t` and switches on it; we just match on
//! the `&str` GAS-syntax text the formatter gives us, which is equivalent
//! and doesn't require the byte-packing trick C needed.

/// One of the five control-flow categories a mnemonic can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowClass {
    NonBranch,
    Breaks,
    Branches,
    Calls,
    Ends,
}

/// Classifies a raw mnemonic token exactly as `lib/bf_insn_decoder.c` does:
/// by prefix, on the textual mnemonic, not a parsed enum. Order matters —
/// callers must check `breaks_flow` before `branches_flow` since `jmp` would
/// otherwise match the `j`-prefix branch check first.
pub fn classify(raw: &str) -> FlowClass {
    if breaks_flow(raw) {
        FlowClass::Breaks
    } else if calls_subroutine(raw) {
        FlowClass::Calls
    } else if ends_flow(raw) {
        FlowClass::Ends
    } else if branches_flow(raw) {
        FlowClass::Branches
    } else {
        FlowClass::NonBranch
    }
}

pub fn breaks_flow(raw: &str) -> bool {
    raw == "jmp" || raw == "jmpq" || raw.starts_with("ljmp")
}

pub fn branches_flow(raw: &str) -> bool {
    raw.starts_with("loop") || raw.starts_with('j')
}

pub fn calls_subroutine(raw: &str) -> bool {
    raw.starts_with("call") || raw.starts_with("lcall")
}

pub fn ends_flow(raw: &str) -> bool {
    raw.starts_with("ret")
        || raw.starts_with("lret")
        || raw.starts_with("iret")
        || raw.starts_with("sysexit")
        || raw.starts_with("sysret")
}

/// `rep`/`repe`/`repne`/`repnz`/`repz` — a macro prefix expects a secondary
/// mnemonic in the next part rather than an operand.
pub fn is_macro_prefix(raw: &str) -> bool {
    matches!(raw, "rep" | "repe" | "repne" | "repnz" | "repz")
}

/// `data32` et al — a pseudo-mnemonic the formatter emits for a prefix byte
/// with no instruction of its own.
pub fn is_data_pseudo(raw: &str) -> bool {
    raw == "data32" || raw == "data16"
}

macro_rules! mnemonics {
    ($($variant:ident => $text:literal),+ $(,)?) => {
        /// Tagged, closed mnemonic set. `Unknown` is the decoder's escape
        /// hatch for anything the formatter emits that isn't enumerated here
        /// (logged, never fatal — see §4.B's "log an unenumerated mnemonic").
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum Mnemonic {
            $($variant),+,
            Unknown,
        }

        impl Mnemonic {
            pub fn parse(raw: &str) -> Mnemonic {
                match raw {
                    $($text => Mnemonic::$variant,)+
                    _ => Mnemonic::Unknown,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Mnemonic::$variant => $text,)+
                    Mnemonic::Unknown => "?",
                }
            }
        }
    };
}

mnemonics! {
    Aaa => "aaa", Aad => "aad", Aam => "aam", Aas => "aas",
    Adc => "adc", Adcl => "adcl", Add => "add", Addb => "addb", Addl => "addl", Addq => "addq",
    And => "and", Andb => "andb", Andl => "andl",
    Arpl => "arpl", Bound => "bound", Bsf => "bsf", Bsr => "bsr", Bswap => "bswap",
    Bt => "bt", Btc => "btc", Btr => "btr", Bts => "bts",
    Call => "call", Callq => "callq", Lcall => "lcall",
    Cbw => "cbw", Cdq => "cdq", Clc => "clc", Cld => "cld", Cli => "cli",
    Cltq => "cltq", Clts => "clts", Cmc => "cmc",
    Cmova => "cmova", Cmovae => "cmovae", Cmovb => "cmovb", Cmovbe => "cmovbe",
    Cmovc => "cmovc", Cmove => "cmove", Cmovg => "cmovg", Cmovge => "cmovge",
    Cmovl => "cmovl", Cmovle => "cmovle", Cmovna => "cmovna", Cmovnae => "cmovnae",
    Cmovnb => "cmovnb", Cmovnbe => "cmovnbe", Cmovnc => "cmovnc", Cmovne => "cmovne",
    Cmovng => "cmovng", Cmovnge => "cmovnge", Cmovnl => "cmovnl", Cmovnle => "cmovnle",
    Cmovno => "cmovno", Cmovnp => "cmovnp", Cmovns => "cmovns", Cmovnz => "cmovnz",
    Cmovo => "cmovo", Cmovp => "cmovp", Cmovpe => "cmovpe", Cmovpo => "cmovpo",
    Cmovs => "cmovs", Cmovz => "cmovz",
    Cmp => "cmp", Cmpb => "cmpb", Cmpl => "cmpl", Cmpq => "cmpq",
    Cmpsb => "cmpsb", Cmpsd => "cmpsd", Cmpsw => "cmpsw", Cmpw => "cmpw",
    Cmpxchg => "cmpxchg", Cpuid => "cpuid", Cwd => "cwd", Cwde => "cwde", Cwtl => "cwtl",
    Daa => "daa", Das => "das", Dec => "dec", Div => "div", Divq => "divq",
    Enter => "enter", Esc => "esc", Hlt => "hlt",
    Idiv => "idiv", Idivl => "idivl", Imul => "imul", In => "in", Inc => "inc",
    Ins => "ins", Insb => "insb", Insd => "insd", Insw => "insw",
    Int => "int", Into => "into", Invd => "invd", Invlpg => "invlpg",
    Iret => "iret", Iretd => "iretd",
    Ja => "ja", Jae => "jae", Jb => "jb", Jbe => "jbe", Jc => "jc", Jcxz => "jcxz",
    Je => "je", Jecxz => "jecxz", Jg => "jg", Jge => "jge", Jl => "jl", Jle => "jle",
    Jmp => "jmp", Jmpq => "jmpq", Ljmp => "ljmp",
    Jna => "jna", Jnae => "jnae", Jnb => "jnb", Jnbe => "jnbe", Jnc => "jnc",
    Jne => "jne", Jng => "jng", Jnge => "jnge", Jnl => "jnl", Jnle => "jnle",
    Jno => "jno", Jnp => "jnp", Jns => "jns", Jnz => "jnz",
    Jo => "jo", Jp => "jp", Jpe => "jpe", Jpo => "jpo", Js => "js", Jz => "jz",
    Lahf => "lahf", Lar => "lar", Lds => "lds", Lea => "lea",
    Leave => "leave", Leaveq => "leaveq", Les => "les", Lfs => "lfs",
    Lgdt => "lgdt", Lgs => "lgs", Lidt => "lidt", Lldt => "lldt",
    Lmsw => "lmsw", Loadall => "loadall", Lock => "lock",
    Lodsb => "lodsb", Lodsd => "lodsd", Lodsw => "lodsw",
    Loop => "loop", Loopd => "loopd", Loope => "loope", Looped => "looped",
    Loopew => "loopew", Loopne => "loopne", Loopned => "loopned", Loopnew => "loopnew",
    Loopnz => "loopnz", Loopnzd => "loopnzd", Loopnzw => "loopnzw",
    Loopw => "loopw", Loopz => "loopz", Loopzd => "loopzd", Loopzw => "loopzw",
    Lsl => "lsl", Lss => "lss", Ltr => "ltr",
    Mov => "mov", Movabs => "movabs", Movapd => "movapd", Movaps => "movaps",
    Movb => "movb", Movl => "movl", Movq => "movq",
    Movsb => "movsb", Movsbl => "movsbl", Movsbq => "movsbq", Movsbw => "movsbw",
    Movsd => "movsd", Movslq => "movslq", Movsw => "movsw", Movswl => "movswl",
    Movswq => "movswq", Movsx => "movsx", Movw => "movw",
    Movzbl => "movzbl", Movzwl => "movzwl", Movzx => "movzx",
    Mul => "mul", Neg => "neg", Negq => "negq", Nop => "nop", Nopl => "nopl", Nopw => "nopw",
    Not => "not", Or => "or", Orb => "orb", Orl => "orl", Orw => "orw",
    Out => "out", Outs => "outs",
    Pop => "pop", Popa => "popa", Popad => "popad", Popf => "popf", Popfd => "popfd",
    Push => "push", Pusha => "pusha", Pushad => "pushad", Pushf => "pushf", Pushfd => "pushfd",
    Rcl => "rcl", Rcr => "rcr", Rdmsr => "rdmsr", Rdpmc => "rdpmc", Rdtsc => "rdtsc",
    Rep => "rep", Repe => "repe", Repne => "repne", Repnz => "repnz", Repz => "repz",
    Ret => "ret", Retf => "retf", Retn => "retn", Retq => "retq",
    Rol => "rol", Roll => "roll", Ror => "ror", Rsm => "rsm",
    Sahf => "sahf", Sal => "sal", Sar => "sar", Sbb => "sbb",
    Scasb => "scasb", Scasd => "scasd", Scasw => "scasw",
    Seta => "seta", Setae => "setae", Setb => "setb", Setbe => "setbe", Setc => "setc",
    Sete => "sete", Setg => "setg", Setge => "setge", Setl => "setl", Setle => "setle",
    Setna => "setna", Setnae => "setnae", Setnb => "setnb", Setnbe => "setnbe",
    Setnc => "setnc", Setne => "setne", Setng => "setng", Setnge => "setnge",
    Setnl => "setnl", Setnle => "setnle", Setno => "setno", Setnp => "setnp",
    Setns => "setns", Setnz => "setnz", Seto => "seto", Setp => "setp",
    Setpe => "setpe", Setpo => "setpo", Sets => "sets", Setz => "setz",
    Sgdt => "sgdt", Shl => "shl", Shld => "shld", Shlq => "shlq", Shr => "shr", Shrd => "shrd",
    Sidt => "sidt", Sldt => "sldt", Smsw => "smsw",
    Stc => "stc", Std => "std", Sti => "sti",
    Stosb => "stosb", Stosd => "stosd", Stosw => "stosw", Str => "str",
    Sub => "sub", Subl => "subl", Subq => "subq",
    Syscall => "syscall", Sysenter => "sysenter", Sysexit => "sysexit", Sysret => "sysret",
    Test => "test", Testb => "testb", Testl => "testl",
    Verr => "verr", Verw => "verw",
    Wait => "wait", Wbinvd => "wbinvd", Wrmsr => "wrmsr",
    Xadd => "xadd", Xchg => "xchg", Xlat => "xlat",
    Xor => "xor", Xorb => "xorb", Xorw => "xorw",
    Data32 => "data32", Data16 => "data16",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaks_flow_matches_unconditional_jumps() {
        assert_eq!(classify("jmp"), FlowClass::Breaks);
        assert_eq!(classify("jmpq"), FlowClass::Breaks);
        assert_eq!(classify("ljmp"), FlowClass::Breaks);
    }

    #[test]
    fn branches_flow_matches_conditional_jumps_and_loops() {
        assert_eq!(classify("jne"), FlowClass::Branches);
        assert_eq!(classify("loope"), FlowClass::Branches);
    }

    #[test]
    fn calls_subroutine_matches_call_family() {
        assert_eq!(classify("call"), FlowClass::Calls);
        assert_eq!(classify("callq"), FlowClass::Calls);
        assert_eq!(classify("lcall"), FlowClass::Calls);
    }

    #[test]
    fn ends_flow_matches_return_family() {
        assert_eq!(classify("ret"), FlowClass::Ends);
        assert_eq!(classify("iretd"), FlowClass::Ends);
        assert_eq!(classify("sysret"), FlowClass::Ends);
        assert_eq!(classify("sysexit"), FlowClass::Ends);
    }

    #[test]
    fn anything_else_is_nonbranch() {
        assert_eq!(classify("movl"), FlowClass::NonBranch);
        assert_eq!(classify("addq"), FlowClass::NonBranch);
    }

    #[test]
    fn mnemonic_roundtrips_through_parse_and_as_str() {
        assert_eq!(Mnemonic::parse("movl"), Mnemonic::Movl);
        assert_eq!(Mnemonic::Movl.as_str(), "movl");
        assert_eq!(Mnemonic::parse("bogus_insn"), Mnemonic::Unknown);
    }

    #[test]
    fn macro_prefixes_are_recognized() {
        assert!(is_macro_prefix("rep"));
        assert!(is_macro_prefix("repne"));
        assert!(!is_macro_prefix("movl"));
    }
}
