//! A compiled [`Module`]: code buffer, call-point table, and the symbol
//! tables needed to compile and link a query against it.

use crate::instr::{Addr, Instr};
use crate::intern::{FunctorId, FunctorTable, Interner};
use std::collections::HashMap;

/// How an unresolved `call f/n` is handled at compile time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Linkage {
    /// Raise a [`crate::error::CompileError`] immediately.
    Strict,
    /// Install a stub entry that unconditionally fails at run time.
    Lenient,
}

impl Default for Linkage {
    fn default() -> Self {
        Linkage::Lenient
    }
}

/// The compiler's one user-facing knob.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompilerOptions {
    pub linkage: Linkage,
}

/// The result of [`crate::compile`]: an immutable code buffer plus the
/// tables needed to compile and run queries against it.
pub struct Module {
    pub(crate) code: Vec<Instr>,
    pub(crate) call_points: HashMap<FunctorId, Addr>,
    pub(crate) functors: FunctorTable,
    /// The text interner atom/string constants were read through while
    /// compiling. Kept alongside the module (rather than discarded once
    /// compilation finishes) because a `call/1` of a dynamically bound
    /// atom has to turn that atom's `Const::Atom(Symbol)` back into a
    /// `FunctorId` at run time, and the formatter needs it
    /// to print atoms and variable names back out as text.
    pub(crate) interner: Interner,
    /// Address of a standing `fail` instruction, always present so a `call/1` of a dynamically bound atom
    /// or structure that names no clause has somewhere safe to land,
    /// independent of whether any *statically* resolved call happened to
    /// need a stub.
    pub(crate) fail_stub: Addr,
    pub(crate) options: CompilerOptions,
}

impl Module {
    pub(crate) fn new(
        code: Vec<Instr>,
        call_points: HashMap<FunctorId, Addr>,
        functors: FunctorTable,
        interner: Interner,
        fail_stub: Addr,
        options: CompilerOptions,
    ) -> Self {
        Module { code, call_points, functors, interner, fail_stub, options }
    }

    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    pub fn entry_pc(&self, f: FunctorId) -> Option<Addr> {
        self.call_points.get(&f).copied()
    }

    pub fn fail_stub(&self) -> Addr {
        self.fail_stub
    }

    pub fn functors(&self) -> &FunctorTable {
        &self.functors
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub fn options(&self) -> CompilerOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_is_the_default_linkage() {
        assert_eq!(CompilerOptions::default().linkage, Linkage::Lenient);
    }
}
