//! The WAM machine (C5): heap, stacks, trail, registers, and the
//! fetch-decode-execute loop.
//!
//! Two deliberate simplifications from the spec's literal wording, both
//! recorded in `DESIGN.md`:
//!
//! - The heap is an arena of tagged [`Cell`]s addressed by plain `usize`
//!   indices rather than raw machine words.
//! - Environments and choice points live in their own `Vec`s instead of a
//!   single interleaved stack. `E`/`B` are indices into those vectors.
//!   Nothing is ever reclaimed or overwritten in place — `deallocate`
//!   rewinds `E` without truncating the vector, since an older choice
//!   point may still hold a saved `E` pointing at that frame. This trades
//!   the real WAM's in-place stack reuse for a simpler, always-safe
//!   growable arena.

pub mod backtrack;
pub mod unify;

use crate::error::MachineError;
use crate::instr::{Addr, Const, Instr, Reg, VarSlot};
use crate::intern::{FunctorId, FunctorTable, Interner};
use crate::module::{Linkage, Module};
use std::collections::HashMap;

/// A tagged heap cell. `Struc`/`Lis` point at the
/// address of their first constituent cell; `Struc`'s target is always a
/// `Functor` cell followed immediately by `arity()` argument cells, and
/// `Lis`'s target is always a head cell followed immediately by a tail
/// cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cell {
    /// A variable reference. Self-referential (`Ref(a) == heap[a]`) means
    /// unbound.
    Ref(usize),
    Struc(usize),
    Functor(FunctorId),
    Con(Const),
    Lis(usize),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Mode {
    Read,
    Write,
}

/// An environment frame.
/// `slots[i]` holds permanent variable `Y(i+1)`; the synthetic cut-level
/// slot a clause's `get_level`/`cut` pair uses is stored in the same array
/// (the classifier hands out `Yn` numbers for both kinds uniformly) and is
/// read back as `Cell::Ref(b0_index)` rather than dereferenced as a real
/// heap pointer — it is never touched by unification.
struct Environment {
    ce: Option<usize>,
    cp: Addr,
    slots: Vec<Cell>,
}

/// A choice point. Restores argument
/// registers, `E`, `CP`, the trail and heap tops, and advances to `alt` on
/// backtrack.
struct ChoicePoint {
    saved_args: Vec<Cell>,
    e: Option<usize>,
    cp: Addr,
    b: Option<usize>,
    tr: usize,
    h: usize,
    alt: Addr,
}

/// Outcome of running the fetch-decode-execute loop to its next pause
/// point.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunResult {
    /// Hit `suspend`: a solution is ready: read it back through the
    /// registers/heap before calling [`Machine::backtrack`] for the next one.
    Suspended,
    /// The failure procedure exhausted the bottom choice point.
    Exhausted,
}

/// One running query against a [`Module`].
///
/// Borrows the module's code, functor table, and interner for the
/// lifetime of the query; owns everything mutable (heap, stacks, trail,
/// registers).
pub struct Machine<'m> {
    code: Vec<Instr>,
    functors: &'m FunctorTable,
    call_points: &'m HashMap<FunctorId, Addr>,
    interner: &'m Interner,
    linkage: Linkage,
    fail_stub: Addr,

    heap: Vec<Cell>,
    registers: Vec<Cell>,
    environments: Vec<Environment>,
    choice_points: Vec<ChoicePoint>,
    trail: Vec<usize>,
    pdl: Vec<(Cell, Cell)>,

    p: Addr,
    cp: Addr,
    e: Option<usize>,
    b: Option<usize>,
    b0: Option<usize>,
    hb: usize,
    s: usize,
    mode: Mode,
    /// The arity of the procedure currently being entered, i.e. how many of
    /// `A1..` are live right now. Set on every `call`/`execute` dispatch and
    /// read by `push_choice_point` to decide how many argument registers a
    /// new choice point must snapshot for a later retry.
    num_of_args: u8,

    max_heap: usize,
    max_trail: usize,
}

/// Registers are sized generously rather
/// than grown on demand — compiled programs never address past the
/// highest temporary register actually allocated by the classifier.
const NUM_REGISTERS: usize = 256;
const DEFAULT_MAX_HEAP: usize = 1 << 20;
const DEFAULT_MAX_TRAIL: usize = 1 << 18;

impl<'m> Machine<'m> {
    /// Runs a query starting at `entry` within `code`. For
    /// a plain whole-module run `code` is a clone of `module.code()`; a
    /// prepared query instead supplies its own buffer (the module's code
    /// followed by the query's own compiled goals — see
    /// [`crate::resolver`]), since a query's `call`/`execute` targets
    /// still resolve to addresses within the module's own portion. `code`
    /// is owned rather than borrowed so a [`crate::resolver::Resolver`]
    /// can hold its combined buffer and the `Machine` that runs it in the
    /// same struct without a self-referential borrow.
    pub fn new(module: &'m Module, code: Vec<Instr>, entry: Addr) -> Self {
        Machine {
            code,
            functors: module.functors(),
            call_points: &module.call_points,
            interner: module.interner(),
            linkage: module.options().linkage,
            fail_stub: module.fail_stub(),

            heap: Vec::new(),
            registers: vec![Cell::Ref(0); NUM_REGISTERS],
            environments: Vec::new(),
            choice_points: Vec::new(),
            trail: Vec::new(),
            pdl: Vec::new(),

            p: entry,
            cp: entry,
            e: None,
            b: None,
            b0: None,
            hb: 0,
            s: 0,
            mode: Mode::Read,
            num_of_args: 0,

            max_heap: DEFAULT_MAX_HEAP,
            max_trail: DEFAULT_MAX_TRAIL,
        }
    }

    pub fn register(&self, ai: Reg) -> Cell {
        self.registers[ai as usize]
    }

    pub fn set_register(&mut self, ai: Reg, cell: Cell) {
        self.registers[ai as usize] = cell;
    }

    /// Follows `cell` through `Ref` chains to its current binding.
    pub fn deref(&self, cell: Cell) -> Cell {
        unify::deref(&self.heap, cell)
    }

    /// Reads a bound term back out through `deref`, used by `resolver.rs`
    /// to build the caller-facing snapshot a `suspend` exposes.
    pub fn heap_cell(&self, addr: usize) -> Cell {
        self.heap[addr]
    }

    pub fn heap(&self) -> &[Cell] {
        &self.heap
    }

    /// Reads permanent variable `Yn` out of the current environment.
    /// `resolver.rs` uses this to read a query's permanent variables back
    /// after a `suspend` — the query's own environment is never
    /// deallocated (see `BodyCompiler::compile_query_body`), so `Yn`
    /// remains valid for as long as the `Resolver` lives.
    pub fn perm_slot(&self, yn: crate::instr::Perm) -> Cell {
        self.perm(yn)
    }

    pub fn functors(&self) -> &'m FunctorTable {
        self.functors
    }

    pub fn interner(&self) -> &'m Interner {
        self.interner
    }

    fn new_ref(&mut self) -> Result<Cell, MachineError> {
        let a = self.heap.len();
        self.push_heap(Cell::Ref(a))?;
        Ok(Cell::Ref(a))
    }

    fn push_heap(&mut self, cell: Cell) -> Result<(), MachineError> {
        if self.heap.len() >= self.max_heap {
            return Err(MachineError::Resource { which: "heap" });
        }
        self.heap.push(cell);
        Ok(())
    }

    fn bind(&mut self, a: usize, value: Cell) {
        unify::bind(&mut self.heap, &mut self.trail, self.hb, a, value);
    }

    fn trail_push(&mut self, a: usize) -> Result<(), MachineError> {
        if self.trail.len() >= self.max_trail {
            return Err(MachineError::Resource { which: "trail" });
        }
        self.trail.push(a);
        Ok(())
    }

    fn perm(&self, yn: crate::instr::Perm) -> Cell {
        self.environments[self.e.expect("permanent slot access with no environment")].slots[yn as usize - 1]
    }

    fn set_perm(&mut self, yn: crate::instr::Perm, cell: Cell) {
        let e = self.e.expect("permanent slot access with no environment");
        self.environments[e].slots[yn as usize - 1] = cell;
    }

    fn slot(&self, xn: VarSlot) -> Cell {
        match xn {
            VarSlot::Temp(r) => self.register(r),
            VarSlot::Perm(p) => self.perm(p),
        }
    }

    fn set_slot(&mut self, xn: VarSlot, cell: Cell) {
        match xn {
            VarSlot::Temp(r) => self.set_register(r, cell),
            VarSlot::Perm(p) => self.set_perm(p, cell),
        }
    }

    /// Looks up a functor's entry point, honouring the module's linkage
    /// mode for a never-defined predicate reached only through `call/1`
    /// of a dynamically bound atom/structure: strict mode
    /// is enforced at compile time for statically known calls, but a
    /// dynamic callable can still name an undefined predicate at run
    /// time, so both modes are handled here too.
    fn resolve_dynamic_target(&self, f: FunctorId) -> Result<Addr, MachineError> {
        match self.call_points.get(&f) {
            Some(&addr) => Ok(addr),
            None => match self.linkage {
                Linkage::Strict => Err(MachineError::Undefined {
                    functor: self.functors.name(f).to_string(),
                    arity: self.functors.arity(f),
                }),
                Linkage::Lenient => Ok(self.fail_stub),
            },
        }
    }

    fn callable_functor(&self, cell: Cell) -> Result<FunctorId, MachineError> {
        match cell {
            Cell::Struc(addr) => match self.heap[addr] {
                Cell::Functor(f) => Ok(f),
                _ => unreachable!("a Struc cell always points at a Functor cell"),
            },
            Cell::Con(Const::Atom(sym)) => {
                let name = self.interner.resolve(sym);
                self.functors.lookup(name, 0).ok_or_else(|| MachineError::Undefined { functor: name.to_string(), arity: 0 })
            }
            Cell::Ref(_) => Err(MachineError::Instantiation { context: "call/1 of an unbound variable".to_string() }),
            _ => Err(MachineError::TypeError { expected: "callable", context: "call/1".to_string() }),
        }
    }

    /// Runs the fetch-decode-execute loop from the current `P` until it
    /// hits `suspend` (a solution), the failure procedure exhausts the
    /// bottom choice point, or a runtime error occurs.
    pub fn run(&mut self) -> Result<RunResult, MachineError> {
        loop {
            let instr = self.code[self.p as usize].clone();
            match self.step(instr)? {
                Some(result) => return Ok(result),
                None => continue,
            }
        }
    }

    /// Forces backtracking into the next alternative,
    /// called by `resolver.rs` between successive `next()` calls. Returns
    /// `false` if no alternatives remain.
    pub fn backtrack(&mut self) -> bool {
        backtrack::fail(self)
    }

    fn push_choice_point(&mut self, alt: Addr) -> Result<(), MachineError> {
        let saved_args = (0..self.num_of_args).map(|i| self.register(i + 1)).collect();
        self.choice_points.push(ChoicePoint {
            saved_args,
            e: self.e,
            cp: self.cp,
            b: self.b,
            tr: self.trail.len(),
            h: self.heap.len(),
            alt,
        });
        self.b = Some(self.choice_points.len() - 1);
        self.hb = self.heap.len();
        Ok(())
    }

    fn current_choice_point_mut(&mut self) -> &mut ChoicePoint {
        let b = self.b.expect("retry_me_else/trust_me with no active choice point");
        &mut self.choice_points[b]
    }

    /// Executes one instruction, advancing `P` itself on the common path.
    /// Returns `Some(_)` only when the run loop should stop: a solution
    /// (`suspend`) or exhaustion (failure with no alternatives left).
    fn step(&mut self, instr: Instr) -> Result<Option<RunResult>, MachineError> {
        let next_p = self.p + 1;
        match instr {
            Instr::PutVar { xn, ai } => {
                let v = self.new_ref()?;
                self.set_slot(xn, v);
                self.set_register(ai, v);
                self.p = next_p;
            }
            Instr::PutVal { xn, ai } => {
                let v = self.slot(xn);
                self.set_register(ai, v);
                self.p = next_p;
            }
            Instr::PutUnsafeValue { yn, ai } => {
                // Every variable in this design is always heap-allocated
                // through a `Ref` cell (no separate stack-local
                // representation exists to "unsafely" reference), so this
                // behaves identically to `put_val`.
                let v = self.perm(yn);
                self.set_register(ai, v);
                self.p = next_p;
            }
            Instr::PutStruc { f, ai } => {
                let s = self.heap.len();
                self.push_heap(Cell::Functor(f))?;
                let cell = Cell::Struc(s);
                self.set_register(ai, cell);
                self.mode = Mode::Write;
                self.p = next_p;
            }
            Instr::PutList { ai } => {
                let l = self.heap.len();
                let cell = Cell::Lis(l);
                self.set_register(ai, cell);
                self.mode = Mode::Write;
                self.p = next_p;
            }
            Instr::PutConst { c, ai } => {
                self.set_register(ai, Cell::Con(c));
                self.p = next_p;
            }

            Instr::SetVar { xn } => {
                let v = self.new_ref()?;
                self.set_slot(xn, v);
                self.p = next_p;
            }
            Instr::SetVal { xn } => {
                let v = self.slot(xn);
                self.push_heap(v)?;
                self.p = next_p;
            }
            Instr::SetLocalValue { yn } => {
                let v = self.perm(yn);
                self.push_heap(v)?;
                self.p = next_p;
            }
            Instr::SetConst { c } => {
                self.push_heap(Cell::Con(c))?;
                self.p = next_p;
            }
            Instr::SetVoid { n } => {
                for _ in 0..n {
                    self.new_ref()?;
                }
                self.p = next_p;
            }

            Instr::GetVar { xn, ai } => {
                let v = self.register(ai);
                self.set_slot(xn, v);
                self.p = next_p;
            }
            Instr::GetVal { xn, ai } => {
                let a = self.register(ai);
                let x = self.slot(xn);
                if !self.unify(a, x)? {
                    return self.fail_or_exhaust();
                }
                self.p = next_p;
            }
            Instr::GetConst { c, ai } => {
                let a = self.deref(self.register(ai));
                match a {
                    Cell::Ref(addr) => self.bind(addr, Cell::Con(c)),
                    Cell::Con(c2) if c2 == c => {}
                    _ => return self.fail_or_exhaust(),
                }
                self.p = next_p;
            }
            Instr::GetStruc { f, ai } => {
                let a = self.deref(self.register(ai));
                match a {
                    Cell::Ref(addr) => {
                        let s = self.heap.len();
                        self.push_heap(Cell::Functor(f))?;
                        for _ in 0..f.arity() {
                            self.new_ref()?;
                        }
                        self.bind(addr, Cell::Struc(s));
                        self.mode = Mode::Write;
                    }
                    Cell::Struc(s) => match self.heap[s] {
                        Cell::Functor(f2) if f2 == f => {
                            self.s = s + 1;
                            self.mode = Mode::Read;
                        }
                        _ => return self.fail_or_exhaust(),
                    },
                    _ => return self.fail_or_exhaust(),
                }
                self.p = next_p;
            }
            Instr::GetList { ai } => {
                let a = self.deref(self.register(ai));
                match a {
                    Cell::Ref(addr) => {
                        let l = self.heap.len();
                        self.new_ref()?;
                        self.new_ref()?;
                        self.bind(addr, Cell::Lis(l));
                        self.mode = Mode::Write;
                    }
                    Cell::Lis(l) => {
                        self.s = l;
                        self.mode = Mode::Read;
                    }
                    _ => return self.fail_or_exhaust(),
                }
                self.p = next_p;
            }

            Instr::UnifyVar { xn } => {
                match self.mode {
                    Mode::Read => {
                        let v = self.heap[self.s];
                        self.set_slot(xn, v);
                        self.s += 1;
                    }
                    Mode::Write => {
                        let v = self.new_ref()?;
                        self.set_slot(xn, v);
                    }
                }
                self.p = next_p;
            }
            Instr::UnifyVal { xn } => {
                match self.mode {
                    Mode::Read => {
                        let v = self.slot(xn);
                        let cell = self.heap[self.s];
                        if !self.unify(v, cell)? {
                            return self.fail_or_exhaust();
                        }
                        self.s += 1;
                    }
                    Mode::Write => {
                        let v = self.slot(xn);
                        self.push_heap(v)?;
                    }
                }
                self.p = next_p;
            }
            Instr::UnifyLocalVal { yn } => {
                match self.mode {
                    Mode::Read => {
                        let v = self.perm(yn);
                        let cell = self.heap[self.s];
                        if !self.unify(v, cell)? {
                            return self.fail_or_exhaust();
                        }
                        self.s += 1;
                    }
                    Mode::Write => {
                        let v = self.perm(yn);
                        self.push_heap(v)?;
                    }
                }
                self.p = next_p;
            }
            Instr::UnifyConst { c } => {
                match self.mode {
                    Mode::Read => {
                        let cell = self.deref(self.heap[self.s]);
                        match cell {
                            Cell::Ref(addr) => self.bind(addr, Cell::Con(c)),
                            Cell::Con(c2) if c2 == c => {}
                            _ => return self.fail_or_exhaust(),
                        }
                        self.s += 1;
                    }
                    Mode::Write => self.push_heap(Cell::Con(c))?,
                }
                self.p = next_p;
            }
            Instr::UnifyVoid { n } => {
                match self.mode {
                    Mode::Read => self.s += n as usize,
                    Mode::Write => {
                        for _ in 0..n {
                            self.new_ref()?;
                        }
                    }
                }
                self.p = next_p;
            }

            Instr::Call { entry, nvars: _, arity } => {
                self.cp = next_p;
                self.b0 = self.b;
                self.num_of_args = arity;
                self.p = entry;
            }
            Instr::CallIndirect { nvars: _ } => {
                let target = self.deref(self.register(1));
                let f = self.callable_functor(target)?;
                let entry = self.resolve_dynamic_target(f)?;
                self.cp = next_p;
                self.b0 = self.b;
                self.num_of_args = f.arity();
                self.p = entry;
            }
            Instr::Execute { entry, arity } => {
                self.b0 = self.b;
                self.num_of_args = arity;
                self.p = entry;
            }
            Instr::ExecuteIndirect => {
                let target = self.deref(self.register(1));
                let f = self.callable_functor(target)?;
                let entry = self.resolve_dynamic_target(f)?;
                self.b0 = self.b;
                self.num_of_args = f.arity();
                self.p = entry;
            }
            Instr::Proceed => {
                self.p = self.cp;
            }
            Instr::Allocate { n } => {
                self.environments.push(Environment { ce: self.e, cp: self.cp, slots: vec![Cell::Ref(0); n as usize] });
                self.e = Some(self.environments.len() - 1);
                self.p = next_p;
            }
            Instr::Deallocate => {
                let env = &self.environments[self.e.expect("deallocate with no environment")];
                self.cp = env.cp;
                self.e = env.ce;
                self.p = next_p;
            }
            Instr::Fail => return self.fail_or_exhaust(),
            Instr::Jump { target } => {
                self.p = target;
            }
            Instr::Suspend => return Ok(Some(RunResult::Suspended)),

            Instr::TryMeElse { alt } => {
                self.push_choice_point(alt)?;
                self.p = next_p;
            }
            Instr::RetryMeElse { alt } => {
                self.current_choice_point_mut().alt = alt;
                self.p = next_p;
            }
            Instr::TrustMe => {
                let b = self.b.expect("trust_me with no active choice point");
                self.b = self.choice_points[b].b;
                self.p = next_p;
            }
            Instr::Try { alt } => {
                self.push_choice_point(alt)?;
                self.p = next_p;
            }
            Instr::Retry { alt } => {
                self.current_choice_point_mut().alt = alt;
                self.p = next_p;
            }
            Instr::Trust { alt: _ } => {
                let b = self.b.expect("trust with no active choice point");
                self.b = self.choice_points[b].b;
                self.p = next_p;
            }
            Instr::SwitchOnTerm { on_var, on_const, on_list, on_struct } => {
                let a1 = self.deref(self.register(1));
                self.p = match a1 {
                    Cell::Ref(_) => on_var,
                    Cell::Con(_) => on_const,
                    Cell::Lis(_) => on_list,
                    Cell::Struc(_) => on_struct,
                    Cell::Functor(_) => unreachable!("Functor cells never sit in an argument register"),
                };
            }
            Instr::SwitchOnConst { table } => {
                let a1 = self.deref(self.register(1));
                self.p = match a1 {
                    Cell::Con(c) => table.iter().find(|(k, _)| *k == c).map(|(_, a)| *a).unwrap_or(next_p),
                    _ => next_p,
                };
            }
            Instr::SwitchOnStruc { table } => {
                let a1 = self.deref(self.register(1));
                self.p = match a1 {
                    Cell::Struc(s) => match self.heap[s] {
                        Cell::Functor(f) => table.iter().find(|(k, _)| *k == f).map(|(_, a)| *a).unwrap_or(next_p),
                        _ => unreachable!(),
                    },
                    _ => next_p,
                };
            }

            Instr::NeckCut => {
                self.b = self.b0;
                self.p = next_p;
            }
            Instr::GetLevel { yn } => {
                // Packed as a `Ref` cell purely as a `usize` carrier: this
                // slot is never dereferenced as a heap address, only read
                // back by a later `cut`.
                self.set_perm(yn, Cell::Ref(self.b0.map(|b| b + 1).unwrap_or(0)));
                self.p = next_p;
            }
            Instr::Cut { yn } => {
                let packed = self.perm(yn);
                self.b = match packed {
                    Cell::Ref(0) => None,
                    Cell::Ref(b) => Some(b - 1),
                    _ => unreachable!("get_level always writes a Ref-packed choice index"),
                };
                self.p = next_p;
            }
        }
        Ok(None)
    }

    fn unify(&mut self, a: Cell, b: Cell) -> Result<bool, MachineError> {
        let mut heap = std::mem::take(&mut self.heap);
        let mut trail = std::mem::take(&mut self.trail);
        let mut pdl = std::mem::take(&mut self.pdl);
        let ok = unify::unify(&mut heap, &mut trail, self.hb, &mut pdl, a, b);
        if heap.len() > self.max_heap {
            self.heap = heap;
            self.trail = trail;
            self.pdl = pdl;
            return Err(MachineError::Resource { which: "heap" });
        }
        if trail.len() > self.max_trail {
            self.heap = heap;
            self.trail = trail;
            self.pdl = pdl;
            return Err(MachineError::Resource { which: "trail" });
        }
        self.heap = heap;
        self.trail = trail;
        self.pdl = pdl;
        Ok(ok)
    }

    fn fail_or_exhaust(&mut self) -> Result<Option<RunResult>, MachineError> {
        if self.backtrack() {
            Ok(None)
        } else {
            Ok(Some(RunResult::Exhausted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_program;
    use crate::intern::Interner;
    use crate::module::CompilerOptions;

    fn compile(src: &str) -> Module {
        let arena = crate::arena::Arena::new();
        let mut interner = Interner::new();
        let ops = crate::parser::OpTable::standard();
        let mut parser = crate::parser::Parser::new(src, &ops, &arena);
        let mut clauses = Vec::new();
        while let Some((term, scope)) = parser.next_term(&mut interner).unwrap() {
            clauses.push(crate::parser::clause::term_to_clause(term, scope, crate::token::Span::new(0, src.len()), &mut interner));
        }
        compile_program(clauses, interner, CompilerOptions::default()).unwrap()
    }

    #[test]
    fn fact_unifies_a_bound_argument_and_succeeds() {
        let module = compile("p(1).\n");
        let f = module.functors().lookup("p", 1).unwrap();
        let entry = module.entry_pc(f).unwrap();
        let mut machine = Machine::new(&module, module.code().to_vec(), entry);
        machine.set_register(1, Cell::Con(Const::Int(1)));
        machine.num_of_args = 1;
        let result = machine.run().unwrap();
        assert_eq!(result, RunResult::Exhausted);
    }

    #[test]
    fn fact_fails_on_a_mismatched_constant() {
        let module = compile("p(1).\n");
        let f = module.functors().lookup("p", 1).unwrap();
        let entry = module.entry_pc(f).unwrap();
        let mut machine = Machine::new(&module, module.code().to_vec(), entry);
        machine.set_register(1, Cell::Con(Const::Int(2)));
        machine.num_of_args = 1;
        let result = machine.run().unwrap();
        assert_eq!(result, RunResult::Exhausted);
    }

    #[test]
    fn fact_binds_an_unbound_argument() {
        let module = compile("p(1).\n");
        let f = module.functors().lookup("p", 1).unwrap();
        let entry = module.entry_pc(f).unwrap();
        let mut machine = Machine::new(&module, module.code().to_vec(), entry);
        let v = machine.new_ref().unwrap();
        machine.set_register(1, v);
        machine.num_of_args = 1;
        machine.run().unwrap();
        let Cell::Ref(addr) = v else { unreachable!() };
        assert_eq!(machine.deref(Cell::Ref(addr)), Cell::Con(Const::Int(1)));
    }

    #[test]
    fn multi_clause_predicate_enumerates_every_fact_on_backtrack() {
        let module = compile("color(red).\ncolor(green).\ncolor(blue).\n");
        let f = module.functors().lookup("color", 1).unwrap();
        let entry = module.entry_pc(f).unwrap();
        let mut machine = Machine::new(&module, module.code().to_vec(), entry);
        let v = machine.new_ref().unwrap();
        machine.set_register(1, v);
        machine.num_of_args = 1;
        let mut solutions = 0;
        loop {
            let result = machine.run().unwrap();
            if result == RunResult::Exhausted {
                break;
            }
            solutions += 1;
            if !machine.backtrack() {
                break;
            }
        }
        assert_eq!(solutions, 3);
    }

    #[test]
    fn call_sets_num_of_args_from_arity_not_from_the_trim_count() {
        let module = compile("p(1).\n");
        let entry = module.entry_pc(module.functors().lookup("p", 1).unwrap()).unwrap();
        let mut machine = Machine::new(&module, module.code().to_vec(), entry);
        machine.step(Instr::Call { entry, nvars: 9, arity: 2 }).unwrap();
        assert_eq!(machine.num_of_args, 2);
    }

    #[test]
    fn execute_sets_num_of_args_for_the_tail_called_procedure() {
        let module = compile("p(1).\n");
        let entry = module.entry_pc(module.functors().lookup("p", 1).unwrap()).unwrap();
        let mut machine = Machine::new(&module, module.code().to_vec(), entry);
        machine.num_of_args = 7;
        machine.step(Instr::Execute { entry, arity: 1 }).unwrap();
        assert_eq!(machine.num_of_args, 1);
    }

    #[test]
    fn a_tail_call_reaching_a_multi_clause_predicate_snapshots_the_callees_own_arity() {
        // foo/3's only goal is last, so it compiles to `execute` rather than
        // `call`, carrying no environment-trim count at all (trim is 0, the
        // clause has no continuation). `execute` must still set `num_of_args`
        // to bar's real arity of 3 so bar's own choice point snapshots all
        // three of its argument registers, not zero of them.
        let module = compile("bar(1, 2, 3).\nbar(4, 5, 6).\nfoo(A, B, C) :- bar(A, B, C).\n");
        let f = module.functors().lookup("foo", 3).unwrap();
        let entry = module.entry_pc(f).unwrap();
        let mut machine = Machine::new(&module, module.code().to_vec(), entry);
        let a = machine.new_ref().unwrap();
        let b = machine.new_ref().unwrap();
        let c = machine.new_ref().unwrap();
        machine.set_register(1, a);
        machine.set_register(2, b);
        machine.set_register(3, c);
        machine.num_of_args = 3;
        machine.run().unwrap();
        assert_eq!(machine.deref(a), Cell::Con(Const::Int(1)));
        assert_eq!(machine.deref(b), Cell::Con(Const::Int(2)));
        assert_eq!(machine.deref(c), Cell::Con(Const::Int(3)));
        assert!(machine.backtrack());
        machine.run().unwrap();
        assert_eq!(machine.deref(a), Cell::Con(Const::Int(4)));
        assert_eq!(machine.deref(b), Cell::Con(Const::Int(5)));
        assert_eq!(machine.deref(c), Cell::Con(Const::Int(6)));
    }
}
