//! Bytecode disassembly.
//!
//! A small trait over the printable pieces of one thing, with a plain
//! free function that drives
//! it line by line — but here the "thing" being formatted is a compiled
//! [`Instr`], not a logical formula: there is exactly one rendering, so
//! no `UnicodeFormatter`/`LatexFormatter` family is needed.

use crate::instr::{Const, Instr, VarSlot};
use crate::intern::{FunctorTable, Interner};
use crate::module::Module;
use std::fmt::Write as _;

/// Renders one operand:
/// comma-separated, parenthesized, symbolic names resolved through the
/// module's tables rather than left as raw IDs.
trait OperandFormatter {
    fn var_slot(&self, slot: VarSlot) -> String {
        match slot {
            VarSlot::Temp(r) => format!("X{r}"),
            VarSlot::Perm(y) => format!("Y{y}"),
        }
    }

    fn reg(&self, ai: u8) -> String {
        format!("A{ai}")
    }

    fn constant(&self, c: Const, interner: &Interner) -> String {
        match c {
            Const::Atom(sym) => interner.resolve(sym).to_string(),
            Const::Int(v) => v.to_string(),
            Const::Real(bits) => format!("{}", f64::from_bits(bits)),
        }
    }
}

struct Disassembler;
impl OperandFormatter for Disassembler {}

/// Formats a single instruction as `mnemonic operand, operand, ...`
///. Addresses are printed as bare offsets into the module's
/// code buffer; a caller wanting symbolic predicate names at call sites
/// should consult the module's own `call_points` separately, since an
/// `Instr` on its own doesn't carry which predicate a given `Addr` belongs
/// to.
pub fn format_instr(instr: &Instr, functors: &FunctorTable, interner: &Interner) -> String {
    let d = Disassembler;
    match instr {
        Instr::GetVar { xn, ai } => format!("get_var {}, {}", d.var_slot(*xn), d.reg(*ai)),
        Instr::GetVal { xn, ai } => format!("get_val {}, {}", d.var_slot(*xn), d.reg(*ai)),
        Instr::GetConst { c, ai } => format!("get_const {}, {}", d.constant(*c, interner), d.reg(*ai)),
        Instr::GetStruc { f, ai } => {
            format!("get_struc {}/{}, {}", functors.name(*f), functors.arity(*f), d.reg(*ai))
        }
        Instr::GetList { ai } => format!("get_list {}", d.reg(*ai)),
        Instr::UnifyVar { xn } => format!("unify_var {}", d.var_slot(*xn)),
        Instr::UnifyVal { xn } => format!("unify_val {}", d.var_slot(*xn)),
        Instr::UnifyLocalVal { yn } => format!("unify_local_val Y{yn}"),
        Instr::UnifyConst { c } => format!("unify_const {}", d.constant(*c, interner)),
        Instr::UnifyVoid { n } => format!("unify_void {n}"),
        Instr::PutVar { xn, ai } => format!("put_var {}, {}", d.var_slot(*xn), d.reg(*ai)),
        Instr::PutVal { xn, ai } => format!("put_val {}, {}", d.var_slot(*xn), d.reg(*ai)),
        Instr::PutUnsafeValue { yn, ai } => format!("put_unsafe_value Y{yn}, {}", d.reg(*ai)),
        Instr::PutStruc { f, ai } => {
            format!("put_struc {}/{}, {}", functors.name(*f), functors.arity(*f), d.reg(*ai))
        }
        Instr::PutList { ai } => format!("put_list {}", d.reg(*ai)),
        Instr::PutConst { c, ai } => format!("put_const {}, {}", d.constant(*c, interner), d.reg(*ai)),
        Instr::SetVar { xn } => format!("set_var {}", d.var_slot(*xn)),
        Instr::SetVal { xn } => format!("set_val {}", d.var_slot(*xn)),
        Instr::SetLocalValue { yn } => format!("set_local_value Y{yn}"),
        Instr::SetConst { c } => format!("set_const {}", d.constant(*c, interner)),
        Instr::SetVoid { n } => format!("set_void {n}"),
        Instr::Call { entry, nvars, arity } => format!("call {entry}, {nvars}, {arity}"),
        Instr::CallIndirect { nvars } => format!("call_indirect {nvars}"),
        Instr::Execute { entry, arity } => format!("execute {entry}, {arity}"),
        Instr::ExecuteIndirect => "execute_indirect".to_string(),
        Instr::Proceed => "proceed".to_string(),
        Instr::Allocate { n } => format!("allocate {n}"),
        Instr::Deallocate => "deallocate".to_string(),
        Instr::Fail => "fail".to_string(),
        Instr::Jump { target } => format!("jump {target}"),
        Instr::Suspend => "suspend".to_string(),
        Instr::TryMeElse { alt } => format!("try_me_else {alt}"),
        Instr::RetryMeElse { alt } => format!("retry_me_else {alt}"),
        Instr::TrustMe => "trust_me".to_string(),
        Instr::Try { alt } => format!("try {alt}"),
        Instr::Retry { alt } => format!("retry {alt}"),
        Instr::Trust { alt } => format!("trust {alt}"),
        Instr::SwitchOnTerm { on_var, on_const, on_list, on_struct } => {
            format!("switch_on_term {on_var}, {on_const}, {on_list}, {on_struct}")
        }
        Instr::SwitchOnConst { table } => {
            let entries: Vec<String> = table.iter().map(|(c, addr)| format!("{}: {addr}", d.constant(*c, interner))).collect();
            format!("switch_on_const [{}]", entries.join(", "))
        }
        Instr::SwitchOnStruc { table } => {
            let entries: Vec<String> =
                table.iter().map(|(f, addr)| format!("{}/{}: {addr}", functors.name(*f), functors.arity(*f))).collect();
            format!("switch_on_struc [{}]", entries.join(", "))
        }
        Instr::NeckCut => "neck_cut".to_string(),
        Instr::GetLevel { yn } => format!("get_level Y{yn}"),
        Instr::Cut { yn } => format!("cut Y{yn}"),
    }
}

/// Renders an entire module's code buffer, one `addr: mnemonic operands`
/// line per instruction, plus a trailing table of predicate entry points
/// keyed by `name/arity`.
pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();
    for (addr, instr) in module.code().iter().enumerate() {
        let _ = writeln!(out, "{addr:>5}: {}", format_instr(instr, module.functors(), module.interner()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    #[test]
    fn disassembly_lists_one_line_per_instruction() {
        let module = compile("p(a).\n").unwrap();
        let text = disassemble(&module);
        assert_eq!(text.lines().count(), module.code().len());
    }

    #[test]
    fn disassembly_resolves_functor_and_atom_names() {
        let module = compile("likes(mary, wine).\n").unwrap();
        let text = disassemble(&module);
        assert!(text.contains("mary") || text.contains("wine"));
    }

    #[test]
    fn proceed_has_no_operands() {
        assert_eq!(format_instr(&Instr::Proceed, &FunctorTable::new(), &Interner::new()), "proceed");
    }
}
