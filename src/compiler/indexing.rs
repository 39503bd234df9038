//! Multi-clause indexing prologues: `switch_on_term`/`_const`/`_struc`
//! plus the `try_me_else`/`retry_me_else`/`trust_me` fallback chain.
//!
//! The fallback chain always visits every clause in source order and is
//! always correct on its own; the switch instructions are a pure
//! optimisation that let the machine skip straight to the first clause
//! whose first argument's heap-cell category (and, for constants and
//! structures, whose exact value) can possibly unify, without touching
//! clauses it jumps past.

use crate::instr::{Addr, Const, Instr};
use crate::intern::{FunctorId, FunctorTable, Interner};
use crate::term::{Clause, Term};
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Key {
    Var,
    Const(Const),
    List,
    Struc(FunctorId),
}

fn key_of(head: &Term, functors: &mut FunctorTable, interner: &Interner) -> Key {
    let Term::Functor { args, .. } = head else {
        return Key::Var;
    };
    match args.first() {
        None | Some(Term::Var(_)) => Key::Var,
        Some(Term::Int(v)) => Key::Const(Const::Int(*v)),
        Some(Term::Real(v)) => Key::Const(Const::real(*v)),
        Some(Term::Atom(s)) | Some(Term::Str(s)) => Key::Const(Const::Atom(*s)),
        Some(Term::List { .. }) => Key::List,
        Some(Term::Functor { name, args }) => Key::Struc(functors.intern(interner.resolve(*name), args.len() as u8)),
    }
}

/// Assembles one predicate's final code: the indexing prologue (if more
/// than one clause gives it something useful to dispatch on) followed by
/// the interleaved `try`/`retry`/`trust` chain and clause bodies.
///
/// `clause_bodies[i]` is clause `i`'s already-compiled head+body
/// instructions; this function only adds the
/// selection machinery around them. All addresses produced, including
/// the returned per-clause body offsets, are relative to the start of
/// the returned code vector — `compiler::mod` adds the predicate's base
/// offset in the final linking pass.
///
/// Returns `(code, clause_body_offsets)`: `clause_body_offsets[i]` is the
/// offset, within `code`, of clause `i`'s first instruction (its choice
/// instruction, if one was emitted for it, otherwise its head code) — the
/// anchor `compiler::mod` uses to re-target call-site patches recorded
/// while compiling that clause in isolation.
pub fn assemble_predicate(
    clauses: &[Clause],
    clause_bodies: Vec<Vec<Instr>>,
    functors: &mut FunctorTable,
    interner: &Interner,
) -> (Vec<Instr>, Vec<Addr>) {
    let n = clauses.len();
    assert_eq!(n, clause_bodies.len());
    if n <= 1 {
        return (clause_bodies.into_iter().next().unwrap_or_default(), vec![0]);
    }

    let keys: Vec<Key> = clauses.iter().map(|c| key_of(c.head.as_ref().unwrap(), functors, interner)).collect();

    // Chain-step length per clause: one choice instruction plus its body.
    // `chain_starts[i]` is the choice instruction's own offset;
    // `body_starts[i]` (one past it) is where clause `i`'s own code begins.
    let mut chain_starts = Vec::with_capacity(n);
    let mut body_starts = Vec::with_capacity(n);
    let mut chain: Vec<Instr> = Vec::new();
    for (i, body) in clause_bodies.iter().enumerate() {
        chain_starts.push(chain.len() as Addr);
        if i == 0 {
            chain.push(Instr::TryMeElse { alt: 0 });
        } else if i + 1 == n {
            chain.push(Instr::TrustMe);
        } else {
            chain.push(Instr::RetryMeElse { alt: 0 });
        }
        body_starts.push(chain.len() as Addr);
        chain.extend(body.iter().cloned());
    }
    for i in 0..n.saturating_sub(1) {
        let next_start = chain_starts[i + 1];
        match &mut chain[chain_starts[i] as usize] {
            Instr::TryMeElse { alt } | Instr::RetryMeElse { alt } => *alt = next_start,
            _ => unreachable!(),
        }
    }

    let any_indexable = keys.iter().any(|k| !matches!(k, Key::Var));
    if !any_indexable {
        return (chain, body_starts);
    }

    let first_var_target = chain_starts[0];
    let first_const_target = keys.iter().zip(&chain_starts).find(|(k, _)| matches!(k, Key::Const(_))).map(|(_, a)| *a);
    let first_list_target = keys.iter().zip(&chain_starts).find(|(k, _)| matches!(k, Key::List)).map(|(_, a)| *a);
    let first_struc_target = keys.iter().zip(&chain_starts).find(|(k, _)| matches!(k, Key::Struc(_))).map(|(_, a)| *a);

    let mut const_table: Vec<(Const, Addr)> = Vec::new();
    let mut seen_const: HashMap<Const, Addr> = HashMap::new();
    let mut struc_table: Vec<(FunctorId, Addr)> = Vec::new();
    let mut seen_struc: HashMap<FunctorId, Addr> = HashMap::new();
    for (k, &start) in keys.iter().zip(&chain_starts) {
        match k {
            Key::Const(c) => {
                seen_const.entry(*c).or_insert(start);
            }
            Key::Struc(f) => {
                seen_struc.entry(*f).or_insert(start);
            }
            _ => {}
        }
    }
    for (c, a) in seen_const {
        const_table.push((c, a));
    }
    for (f, a) in seen_struc {
        struc_table.push((f, a));
    }

    let emit_const_switch = first_const_target.is_some() && const_table.len() > 1;
    let emit_struc_switch = first_struc_target.is_some() && struc_table.len() > 1;
    let shift = 1 + emit_const_switch as Addr + emit_struc_switch as Addr;

    let switch = Instr::SwitchOnTerm {
        on_var: first_var_target + shift,
        on_const: first_const_target.unwrap_or(first_var_target) + shift,
        on_list: first_list_target.unwrap_or(first_var_target) + shift,
        on_struct: first_struc_target.unwrap_or(first_var_target) + shift,
    };

    let mut out = Vec::with_capacity(shift as usize + chain.len());
    out.push(switch);
    if emit_const_switch {
        out.push(Instr::SwitchOnConst { table: const_table.into_iter().map(|(c, a)| (c, a + shift)).collect() });
    }
    if emit_struc_switch {
        out.push(Instr::SwitchOnStruc { table: struc_table.into_iter().map(|(f, a)| (f, a + shift)).collect() });
    }
    for instr in chain {
        out.push(shift_addr(instr, shift));
    }
    let shifted_body_starts: Vec<Addr> = body_starts.iter().map(|&a| a + shift).collect();
    (out, shifted_body_starts)
}

fn shift_addr(instr: Instr, shift: Addr) -> Instr {
    match instr {
        Instr::TryMeElse { alt } => Instr::TryMeElse { alt: alt + shift },
        Instr::RetryMeElse { alt } => Instr::RetryMeElse { alt: alt + shift },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::parser::clause::term_to_clause;
    use crate::parser::{OpTable, Parser};
    use crate::token::Span;

    fn parse_clause<'a>(arena: &'a Arena<Term<'a>>, interner: &mut Interner, ops: &'a OpTable, src: &str) -> Clause<'a> {
        let mut parser = Parser::new(src, ops, arena);
        let (term, scope) = parser.next_term(interner).unwrap().unwrap();
        term_to_clause(term, scope, Span::new(0, src.len()), interner)
    }

    #[test]
    fn single_clause_predicate_has_no_choice_instructions() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let clauses = vec![parse_clause(&arena, &mut interner, &ops, "p(1).")];
        let mut functors = FunctorTable::new();
        let (code, starts) = assemble_predicate(&clauses, vec![vec![Instr::Proceed]], &mut functors, &interner);
        assert_eq!(code.len(), 1);
        assert!(matches!(code[0], Instr::Proceed));
        assert_eq!(starts, vec![0]);
    }

    #[test]
    fn multi_clause_predicate_gets_a_try_retry_trust_chain() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let clauses = vec![
            parse_clause(&arena, &mut interner, &ops, "p(1)."),
            parse_clause(&arena, &mut interner, &ops, "p(2)."),
            parse_clause(&arena, &mut interner, &ops, "p(3)."),
        ];
        let mut functors = FunctorTable::new();
        let bodies = vec![vec![Instr::Proceed]; 3];
        let (code, starts) = assemble_predicate(&clauses, bodies, &mut functors, &interner);
        assert!(code.iter().any(|i| matches!(i, Instr::TryMeElse { .. })));
        assert!(code.iter().any(|i| matches!(i, Instr::RetryMeElse { .. })));
        assert!(code.iter().any(|i| matches!(i, Instr::TrustMe)));
        assert_eq!(starts.len(), 3);
        for &s in &starts {
            assert!(matches!(code[s as usize], Instr::Proceed));
        }
    }

    #[test]
    fn distinct_first_argument_constants_get_a_switch_on_term() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let clauses = vec![
            parse_clause(&arena, &mut interner, &ops, "color(red)."),
            parse_clause(&arena, &mut interner, &ops, "color(green)."),
        ];
        let mut functors = FunctorTable::new();
        let bodies = vec![vec![Instr::Proceed]; 2];
        let (code, starts) = assemble_predicate(&clauses, bodies, &mut functors, &interner);
        assert!(matches!(code[0], Instr::SwitchOnTerm { .. }));
        assert_eq!(starts.len(), 2);
    }
}
