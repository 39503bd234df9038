//! Term-to-clause conversion.

use crate::intern::{Interner, Symbol};
use crate::parser::VarScopeInfo;
use crate::term::{Clause, Term};
use crate::token::Span;

/// Converts one parsed sentence into a [`Clause`]: top-level `:-/2` becomes
/// a rule, `?-/1` a query, and any other term a fact. Flattening of `,/2`
/// respects bracketing — a bracketed conjunction parses as one `Term`, not
/// `,/2`, so it is never split here.
pub fn term_to_clause<'a>(term: Term<'a>, scope: VarScopeInfo, span: Span, interner: &mut Interner) -> Clause<'a> {
    let arrow = interner.intern(":-");
    let query_marker = interner.intern("?-");
    let conj = interner.intern(",");

    match term {
        Term::Functor { name, args } if name == arrow && args.len() == 2 => Clause {
            head: Some(args[0]),
            body: flatten_conjunction(args[1], conj),
            var_names: scope.names,
            span,
        },
        Term::Functor { name, args } if name == query_marker && args.len() == 1 => Clause {
            head: None,
            body: flatten_conjunction(args[0], conj),
            var_names: scope.names,
            span,
        },
        fact => Clause { head: Some(fact), body: Vec::new(), var_names: scope.names, span },
    }
}

fn flatten_conjunction<'a>(term: Term<'a>, conj: Symbol) -> Vec<Term<'a>> {
    match term {
        Term::Functor { name, args } if name == conj && args.len() == 2 => {
            let mut goals = flatten_conjunction(args[0], conj);
            goals.extend(flatten_conjunction(args[1], conj));
            goals
        }
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::parser::{OpTable, Parser};

    fn parse_clause<'a>(src: &str, arena: &'a Arena<Term<'a>>, interner: &mut Interner, ops: &'a OpTable) -> Clause<'a> {
        let mut parser = Parser::new(src, ops, arena);
        let (term, scope) = parser.next_term(interner).unwrap().unwrap();
        term_to_clause(term, scope, Span::new(0, src.len()), interner)
    }

    #[test]
    fn fact_has_no_body() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let clause = parse_clause("p(a).", &arena, &mut interner, &ops);
        assert!(clause.head.is_some());
        assert!(clause.body.is_empty());
    }

    #[test]
    fn rule_body_is_flattened() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let clause = parse_clause("p(X) :- q(X), r(X), s(X).", &arena, &mut interner, &ops);
        assert_eq!(clause.body.len(), 3);
    }

    #[test]
    fn bracketed_conjunction_nested_in_a_goal_is_not_split() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        // the (q, r) here is an argument to call/1, not a body-level
        // conjunction, so flattening must leave it intact.
        let clause = parse_clause("p :- call((q, r)), s.", &arena, &mut interner, &ops);
        assert_eq!(clause.body.len(), 2);
        match clause.body[0] {
            Term::Functor { args, .. } => {
                assert_eq!(args.len(), 1);
                assert!(matches!(args[0], Term::Functor { .. }));
            }
            other => panic!("expected call(...), got {other:?}"),
        }
    }

    #[test]
    fn query_has_no_head() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let clause = parse_clause("?- p(X), q(X).", &arena, &mut interner, &ops);
        assert!(clause.head.is_none());
        assert_eq!(clause.body.len(), 2);
    }
}
