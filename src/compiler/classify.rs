//! Permanent/temporary variable classification.

use crate::instr::{Perm, Reg};
use crate::intern::{Interner, Symbol};
use crate::term::{Clause, Term, VarId};
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Slot {
    Temp(Reg),
    Perm(Perm),
}

pub struct Classification {
    pub slots: HashMap<VarId, Slot>,
    pub perm_count: u32,
    /// `perm_live_after[i]` is the number of permanent variables still
    /// needed after body goal `i` completes — the `N` operand of the
    /// `call`/`execute` emitted for goal `i`.
    pub perm_live_after: Vec<u32>,
    /// The synthetic `Yn` slot holding the entry choice point for a deep
    /// cut, if this clause contains one.
    pub cut_level_slot: Option<Perm>,
    /// Index of the `!` goal that is a *neck* cut (the first body goal),
    /// if any — compiled as `neck_cut` rather than `get_level`/`cut`.
    pub neck_cut_index: Option<usize>,
}

/// Occurrence position of a variable within a clause: the head (`-1`, by
/// convention) or a body-goal index.
type Pos = i64;

pub fn classify(clause: &Clause, interner: &mut Interner) -> Classification {
    classify_inner(clause, interner, false)
}

/// Classifies a top-level query. Every
/// variable is forced permanent, never temporary: an ordinary clause body
/// variable used only within its own last goal can safely stay in a
/// register because nothing needs it once that goal's `call` returns, but
/// a query variable must still be readable from `Resolver::next`'s
/// binding snapshot after the whole query suspends, long after any
/// register it once occupied has been overwritten by nested calls.
pub fn classify_query(clause: &Clause, interner: &mut Interner) -> Classification {
    classify_inner(clause, interner, true)
}

fn classify_inner(clause: &Clause, interner: &mut Interner, force_permanent: bool) -> Classification {
    let cut_sym = interner.intern("!");
    let mut occurrences: HashMap<VarId, Vec<Pos>> = HashMap::new();
    if let Some(head) = &clause.head {
        collect_vars(head, -1, &mut occurrences);
    }
    for (i, goal) in clause.body.iter().enumerate() {
        collect_vars(goal, i as i64, &mut occurrences);
    }

    let cut_positions: Vec<usize> = clause
        .body
        .iter()
        .enumerate()
        .filter_map(|(i, g)| if is_cut(g, cut_sym) { Some(i) } else { None })
        .collect();
    let neck_cut_index = cut_positions.first().copied().filter(|&i| i == 0);
    let deep_cut_index = cut_positions.iter().copied().find(|&i| i != 0);

    // assign slots in order of first occurrence, temporaries to Xn,
    // permanents to Yn.
    let mut order: Vec<VarId> = occurrences.keys().copied().collect();
    order.sort_by_key(|v| occurrences[v][0]);

    let mut slots = HashMap::new();
    let mut next_reg: Reg = 1;
    let mut next_perm: Perm = 1;
    let mut last_use: HashMap<VarId, Pos> = HashMap::new();

    for var in &order {
        let positions = &occurrences[var];
        let is_temp = !force_permanent && positions.iter().all(|&p| p <= 0);
        last_use.insert(*var, *positions.iter().max().unwrap());
        if is_temp {
            slots.insert(*var, Slot::Temp(next_reg));
            next_reg += 1;
        } else {
            slots.insert(*var, Slot::Perm(next_perm));
            next_perm += 1;
        }
    }

    let mut cut_level_slot = None;
    if let Some(cut_idx) = deep_cut_index {
        let slot = next_perm;
        next_perm += 1;
        cut_level_slot = Some(slot);
        last_use.insert(VarId(u32::MAX), cut_idx as Pos);
    }

    let perm_count = next_perm - 1;
    let n = clause.body.len();
    let mut perm_live_after = vec![0u32; n];
    for i in 0..n {
        let mut live = 0u32;
        for (_, &pos) in last_use.iter() {
            if pos > i as Pos {
                live += 1;
            }
        }
        perm_live_after[i] = live;
    }

    Classification { slots, perm_count, perm_live_after, cut_level_slot, neck_cut_index }
}

fn is_cut(t: &Term, cut_sym: Symbol) -> bool {
    matches!(t, Term::Atom(s) if *s == cut_sym)
}

fn collect_vars(term: &Term, pos: Pos, out: &mut HashMap<VarId, Vec<Pos>>) {
    match term {
        Term::Var(id) => out.entry(*id).or_default().push(pos),
        Term::Functor { args, .. } => {
            for a in args.iter() {
                collect_vars(a, pos, out);
            }
        }
        Term::List { head, tail } => {
            collect_vars(head, pos, out);
            collect_vars(tail, pos, out);
        }
        Term::Int(_) | Term::Real(_) | Term::Str(_) | Term::Atom(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::intern::Interner;
    use crate::parser::clause::term_to_clause;
    use crate::parser::{OpTable, Parser};
    use crate::token::Span;

    fn classify_src(src: &str) -> Classification {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let mut parser = Parser::new(src, &ops, &arena);
        let (term, scope) = parser.next_term(&mut interner).unwrap().unwrap();
        let clause = term_to_clause(term, scope, Span::new(0, src.len()), &mut interner);
        classify(&clause, &mut interner)
    }

    #[test]
    fn var_used_only_in_head_and_first_goal_is_temporary() {
        let c = classify_src("p(X) :- q(X).");
        assert_eq!(c.perm_count, 0);
    }

    #[test]
    fn var_used_across_two_body_goals_is_permanent() {
        let c = classify_src("p(X) :- q(X), r(X).");
        assert_eq!(c.perm_count, 1);
    }

    #[test]
    fn app_clause_classifies_recursion_variables_as_permanent() {
        let c = classify_src("app([H|T], L, [H|R]) :- app(T, L, R).");
        // T, L, R all survive from head into the single recursive call,
        // but that call is the *only* and *last* body goal, so none of
        // them needs to be permanent under this clause's classification.
        assert_eq!(c.perm_count, 0);
    }

    #[test]
    fn perm_live_after_decreases_toward_the_last_goal() {
        let c = classify_src("p(X, Y) :- q(X), r(Y), s(X, Y).");
        assert!(c.perm_live_after[0] >= c.perm_live_after[1]);
    }

    #[test]
    fn neck_cut_needs_no_synthetic_slot() {
        let c = classify_src("p(X) :- !, q(X).");
        assert_eq!(c.neck_cut_index, Some(0));
        assert!(c.cut_level_slot.is_none());
    }

    #[test]
    fn deep_cut_gets_a_synthetic_permanent_slot() {
        let c = classify_src("r(X) :- q(X), !, X > 0.");
        assert!(c.neck_cut_index.is_none());
        assert!(c.cut_level_slot.is_some());
    }

    #[test]
    fn query_variable_used_in_a_single_goal_is_still_permanent() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let mut parser = Parser::new("?- p(X).", &ops, &arena);
        let (term, scope) = parser.next_term(&mut interner).unwrap().unwrap();
        let clause = term_to_clause(term, scope, Span::new(0, 8), &mut interner);
        let c = classify_query(&clause, &mut interner);
        assert_eq!(c.perm_count, 1);
        assert!(c.slots.values().all(|s| matches!(s, Slot::Perm(_))));
    }
}
