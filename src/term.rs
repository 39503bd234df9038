//! The term model (C2).
//!
//! Terms are built in an [`Arena`](crate::arena::Arena) by the parser and
//! consumed (read, never mutated) by the compiler; they do not outlive the
//! compile step. The machine has its own,
//! unrelated heap representation (see [`crate::machine`]).

use crate::intern::Symbol;
use crate::token::Span;

/// Identifies one variable occurrence-class within a single clause or
/// query. Two `Term::Var` nodes sharing a `VarId` are the same variable;
/// `_` is never shared across occurrences, so each anonymous
/// `_` gets its own fresh `VarId` from the parser.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct VarId(pub u32);

#[derive(Clone, Copy, Debug)]
pub enum Term<'a> {
    Var(VarId),
    Int(i64),
    Real(f64),
    /// A quoted string or symbolic atom used as opaque text.
    Str(Symbol),
    /// An arity-0 functor (a plain atom, including `nil`).
    Atom(Symbol),
    Functor { name: Symbol, args: &'a [Term<'a>] },
    /// `[H|T]` — kept distinct from `Functor` so the compiler can target
    /// the heap's dedicated `LIS` cell tag and `get_list`/`put_list`
    /// instructions instead of treating
    /// list pairs as an ordinary 2-ary structure.
    List { head: &'a Term<'a>, tail: &'a Term<'a> },
}

impl<'a> Term<'a> {
    pub fn arity(&self) -> u8 {
        match self {
            Term::Functor { args, .. } => args.len() as u8,
            Term::List { .. } => 2,
            _ => 0,
        }
    }

    pub fn functor_name(&self, interner: &crate::intern::Interner) -> Option<&str> {
        match self {
            Term::Atom(s) | Term::Functor { name: s, .. } => Some(interner.resolve(*s)),
            Term::List { .. } => None,
            _ => None,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }
}

/// A clause (`head :- body`) or query (`head == None`)
pub struct Clause<'a> {
    pub head: Option<Term<'a>>,
    /// Body goals, flattened by top-level `,`/2 (bracketed conjunctions
    /// are not split). A fact has an empty body.
    pub body: Vec<Term<'a>>,
    /// Maps each [`VarId`] used in this clause to its source name, for
    /// pretty-printing and for resolving query variables back to names
    /// when reading bindings. `None` for anonymous `_`.
    pub var_names: Vec<Option<Symbol>>,
    pub span: Span,
}

impl<'a> Clause<'a> {
    pub fn is_query(&self) -> bool {
        self.head.is_none()
    }

    pub fn num_vars(&self) -> u32 {
        self.var_names.len() as u32
    }
}

/// All clauses sharing one `name/arity` head, in source order.
pub struct Predicate<'a> {
    pub name: Symbol,
    pub arity: u8,
    pub clauses: Vec<Clause<'a>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn atom_arity_is_zero() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let t = Term::Atom(a);
        assert_eq!(t.arity(), 0);
    }

    #[test]
    fn functor_arity_matches_args() {
        let mut interner = Interner::new();
        let name = interner.intern("f");
        let args = [Term::Int(1), Term::Int(2)];
        let t = Term::Functor { name, args: &args };
        assert_eq!(t.arity(), 2);
    }

    #[test]
    fn list_arity_is_two() {
        let h = Term::Int(1);
        let t = Term::Atom(Symbol::EMPTY);
        let list = Term::List { head: &h, tail: &t };
        assert_eq!(list.arity(), 2);
    }
}
