//! Query preparation and solution enumeration.
//!
//! A prepared query compiles exactly like an ordinary clause body (same
//! classifier, same [`BodyCompiler`]), appended after the module's own
//! code so its `call`/`execute` targets still resolve to the module's
//! existing entry points. The one departure from an
//! ordinary clause: every query variable is forced permanent
//! (`classify::classify_query`), since nothing downstream of `suspend`
//! can re-derive a binding that was only ever held in a temporary
//! register — see that function's doc comment.

use crate::arena::Arena;
use crate::compiler::body::BodyCompiler;
use crate::compiler::classify::{classify_query, Slot};
use crate::error::{CompileError, CompileErrorKind, Error, ParseError, ParseErrorKind};
use crate::instr::{Addr, Const, Instr};
use crate::intern::{FunctorTable, Interner, Symbol};
use crate::machine::{unify, Cell, Machine, RunResult};
use crate::module::{Linkage, Module};
use crate::parser::clause::term_to_clause;
use crate::parser::{OpTable, Parser};
use crate::term::{Term, VarId};
use crate::token::Span;
use std::collections::HashMap;
use std::fmt;

/// Accepts either a bare goal list (`"p(X), q(X)"`) or one already wrapped
/// in `?-`/1 (`"?- p(X), q(X)."`), with or without a trailing `.`.
fn normalize_query(text: &str) -> String {
    let text = text.trim();
    let text = text.strip_prefix("?-").unwrap_or(text).trim();
    let text = text.trim_end_matches('.').trim();
    format!("?- {text}.")
}

impl Module {
    /// Compiles `query_text` against this module and returns a [`Resolver`]
    /// ready to enumerate its solutions.
    pub fn prepare(&self, query_text: &str) -> Result<Resolver<'_>, Error> {
        let src = normalize_query(query_text);

        let arena: Arena<Term> = Arena::new();
        let ops = OpTable::standard();
        // Cloned, not borrowed: a brand-new atom the query introduces gets
        // a fresh symbol appended here, but any text the module already
        // knows (atoms embedded in compiled facts/rules) keeps the exact
        // same `Symbol` the module's own code uses, so `Const::Atom`
        // equality in `unify` still holds across module-compiled and
        // query-compiled cells.
        let mut interner = self.interner().clone();
        let mut parser = Parser::new(&src, &ops, &arena);
        let (term, scope) = parser
            .next_term(&mut interner)?
            .ok_or_else(|| Error::Parse(ParseError::new(ParseErrorKind::UnexpectedEof, Span::default())))?;
        let clause = term_to_clause(term, scope, Span::new(0, src.len()), &mut interner);

        let classification = classify_query(&clause, &mut interner);
        // Likewise cloned rather than borrowed, so the query can name a
        // structure the module never uses without mutating the module's
        // own table, while any functor the module already compiled
        // against (and therefore appears in `call_points`) interns right
        // back to the identical `FunctorId`.
        let mut functors = self.functors().clone();
        let has_environment = classification.perm_count > 0;
        let mut bc = BodyCompiler::new(&classification, &mut functors, &mut interner, 1);
        let query_code = bc.compile_query_body(&clause.body, has_environment);
        let patches = bc.patches;

        let mut code = self.code().to_vec();
        let entry = code.len() as Addr;
        code.extend(query_code);

        for patch in &patches {
            let name = interner.resolve(patch.functor).to_string();
            let f = functors.intern(&name, patch.arity);
            let target = match self.entry_pc(f) {
                Some(addr) => addr,
                None => match self.options().linkage {
                    Linkage::Strict => {
                        return Err(Error::Compile(CompileError::new(
                            CompileErrorKind::UnresolvedCall { functor: name, arity: patch.arity },
                            None,
                        )));
                    }
                    Linkage::Lenient => self.fail_stub(),
                },
            };
            match &mut code[entry as usize + patch.instr_index] {
                Instr::Call { entry: e, .. } => *e = target,
                Instr::Execute { entry: e, .. } => *e = target,
                _ => unreachable!("call-site patch list only ever records Call/Execute instructions"),
            }
        }

        let machine = Machine::new(self, code, entry);
        Ok(Resolver {
            machine,
            var_names: clause.var_names,
            slots: classification.slots,
            interner,
            started: false,
            exhausted: false,
        })
    }
}

/// One enumerable query prepared against a [`Module`].
///
/// Owns its combined code buffer and the [`Machine`] running it; dropping
/// a `Resolver` releases the whole run (heap, stacks, trail) with plain
/// Rust ownership, no explicit `close()`.
pub struct Resolver<'m> {
    machine: Machine<'m>,
    var_names: Vec<Option<Symbol>>,
    slots: HashMap<VarId, Slot>,
    interner: Interner,
    started: bool,
    exhausted: bool,
}

impl<'m> Resolver<'m> {
    /// Advances to the next solution. Returns
    /// `Ok(None)` once every alternative has been exhausted — the normal
    /// end of enumeration, not an error.
    pub fn next(&mut self) -> Result<Option<Bindings>, Error> {
        if self.exhausted {
            return Ok(None);
        }
        if self.started && !self.machine.backtrack() {
            self.exhausted = true;
            return Ok(None);
        }
        self.started = true;
        match self.machine.run()? {
            RunResult::Suspended => Ok(Some(self.snapshot())),
            RunResult::Exhausted => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn snapshot(&self) -> Bindings {
        let mut values = HashMap::new();
        for (idx, name) in self.var_names.iter().enumerate() {
            let Some(sym) = name else { continue };
            let id = VarId(idx as u32);
            let Some(Slot::Perm(yn)) = self.slots.get(&id) else { continue };
            let cell = self.machine.deref(self.machine.perm_slot(*yn));
            values.insert(self.interner.resolve(*sym).to_string(), cell);
        }
        Bindings {
            heap: self.machine.heap().to_vec(),
            functors: self.machine.functors().clone(),
            interner: self.interner.clone(),
            values,
        }
    }
}

/// A snapshot of one solution's variable bindings. Owns its own copy of
/// the heap and symbol tables
/// it was read through, so it stays valid after the `Resolver` that
/// produced it backtracks past it or is dropped.
pub struct Bindings {
    heap: Vec<Cell>,
    functors: FunctorTable,
    interner: Interner,
    values: HashMap<String, Cell>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<TermView<'_>> {
        self.values.get(name).map(|&cell| self.view(cell))
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    fn view(&self, cell: Cell) -> TermView<'_> {
        match unify::deref(&self.heap, cell) {
            Cell::Ref(addr) => TermView::Var(format!("_G{addr}")),
            Cell::Con(Const::Int(v)) => TermView::Int(v),
            Cell::Con(Const::Real(bits)) => TermView::Real(f64::from_bits(bits)),
            Cell::Con(Const::Atom(sym)) => TermView::Atom(self.interner.resolve(sym)),
            Cell::Struc(s) => {
                let Cell::Functor(f) = self.heap[s] else {
                    unreachable!("a Struc cell always points at a Functor cell")
                };
                let args = (0..f.arity() as usize).map(|i| self.view(self.heap[s + 1 + i])).collect();
                TermView::Functor(self.functors.name(f), args)
            }
            Cell::Lis(l) => TermView::List(Box::new(self.view(self.heap[l])), Box::new(self.view(self.heap[l + 1]))),
            Cell::Functor(_) => unreachable!("a Functor cell never surfaces outside a Struc's target"),
        }
    }
}

/// A read-only view of one bound term, borrowing its
/// atom and functor text out of the [`Bindings`] it was produced from.
#[derive(Debug, Clone, PartialEq)]
pub enum TermView<'a> {
    Var(String),
    Int(i64),
    Real(f64),
    Atom(&'a str),
    Functor(&'a str, Vec<TermView<'a>>),
    List(Box<TermView<'a>>, Box<TermView<'a>>),
}

impl fmt::Display for TermView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermView::Var(name) => write!(f, "{name}"),
            TermView::Int(v) => write!(f, "{v}"),
            TermView::Real(v) => write!(f, "{v}"),
            // The parser represents `[]` as the plain atom `nil`, so a bare `nil` read
            // back from the heap is indistinguishable from the empty
            // list; printed as `[]` to match conventional list notation.
            TermView::Atom("nil") => write!(f, "[]"),
            TermView::Atom(name) => write!(f, "{name}"),
            TermView::Functor(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            TermView::List(head, tail) => {
                write!(f, "[{head}")?;
                let mut rest = tail.as_ref();
                loop {
                    match rest {
                        TermView::List(h, t) => {
                            write!(f, ", {h}")?;
                            rest = t.as_ref();
                        }
                        TermView::Atom("nil") => break,
                        other => {
                            write!(f, "|{other}")?;
                            break;
                        }
                    }
                }
                write!(f, "]")
            }
        }
    }
}
