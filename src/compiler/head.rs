//! Head compilation: the callee-side `get_*`/`unify_*` family.
//!
//! Nested compound subterms are handled by Warren's flattening trick:
//! a compound argument nested inside another structure is assigned a
//! fresh temporary register and a `unify_var` placeholder, and its own
//! `get_struc`/`get_list` decomposition is queued to run immediately
//! after the structure that contains it.

use super::classify::Slot;
use crate::instr::{Const, Instr, Reg, VarSlot};
use crate::intern::{FunctorTable, Interner};
use crate::term::{Term, VarId};
use std::collections::{HashMap, HashSet, VecDeque};

pub fn compile_head(
    head: &Term,
    slots: &HashMap<VarId, Slot>,
    functors: &mut FunctorTable,
    interner: &Interner,
    next_reg: &mut Reg,
) -> Vec<Instr> {
    let mut out = Vec::new();
    let Term::Functor { args, .. } = head else {
        return out;
    };
    let mut seen = HashSet::new();
    let mut queue: VecDeque<(Reg, Term)> = VecDeque::new();
    for (i, arg) in args.iter().enumerate() {
        let ai = (i + 1) as Reg;
        emit_get(*arg, ai, slots, &mut seen, functors, interner, &mut out, next_reg, &mut queue);
    }
    while let Some((reg, term)) = queue.pop_front() {
        emit_get(term, reg, slots, &mut seen, functors, interner, &mut out, next_reg, &mut queue);
    }
    out
}

fn const_of(term: Term) -> Option<Const> {
    match term {
        Term::Int(v) => Some(Const::Int(v)),
        Term::Real(v) => Some(Const::real(v)),
        Term::Atom(s) | Term::Str(s) => Some(Const::Atom(s)),
        _ => None,
    }
}

fn slot_of(slots: &HashMap<VarId, Slot>, id: VarId) -> VarSlot {
    match slots[&id] {
        Slot::Temp(r) => VarSlot::Temp(r),
        Slot::Perm(p) => VarSlot::Perm(p),
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_get(
    term: Term,
    reg: Reg,
    slots: &HashMap<VarId, Slot>,
    seen: &mut HashSet<VarId>,
    functors: &mut FunctorTable,
    interner: &Interner,
    out: &mut Vec<Instr>,
    next_reg: &mut Reg,
    queue: &mut VecDeque<(Reg, Term)>,
) {
    match term {
        Term::Var(id) => {
            if seen.insert(id) {
                out.push(Instr::GetVar { xn: slot_of(slots, id), ai: reg });
            } else {
                out.push(Instr::GetVal { xn: slot_of(slots, id), ai: reg });
            }
        }
        Term::Functor { name, args } => {
            let f = functors.intern(interner.resolve(name), args.len() as u8);
            out.push(Instr::GetStruc { f, ai: reg });
            for arg in args {
                emit_unify_arg(*arg, slots, seen, out, next_reg, queue);
            }
        }
        Term::List { head, tail } => {
            out.push(Instr::GetList { ai: reg });
            emit_unify_arg(*head, slots, seen, out, next_reg, queue);
            emit_unify_arg(*tail, slots, seen, out, next_reg, queue);
        }
        atomic => {
            let c = const_of(atomic).expect("non-var, non-compound term must be a constant");
            out.push(Instr::GetConst { c, ai: reg });
        }
    }
}

fn emit_unify_arg(
    term: Term,
    slots: &HashMap<VarId, Slot>,
    seen: &mut HashSet<VarId>,
    out: &mut Vec<Instr>,
    next_reg: &mut Reg,
    queue: &mut VecDeque<(Reg, Term)>,
) {
    match term {
        Term::Var(id) => {
            if seen.insert(id) {
                out.push(Instr::UnifyVar { xn: slot_of(slots, id) });
            } else {
                match slots[&id] {
                    Slot::Perm(p) => out.push(Instr::UnifyLocalVal { yn: p }),
                    Slot::Temp(_) => out.push(Instr::UnifyVal { xn: slot_of(slots, id) }),
                }
            }
        }
        Term::Functor { .. } | Term::List { .. } => {
            let reg = *next_reg;
            *next_reg += 1;
            out.push(Instr::UnifyVar { xn: VarSlot::Temp(reg) });
            queue.push_back((reg, term));
        }
        atomic => {
            let c = const_of(atomic).expect("non-var, non-compound term must be a constant");
            out.push(Instr::UnifyConst { c });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::compiler::classify::classify;
    use crate::parser::clause::term_to_clause;
    use crate::parser::{OpTable, Parser};
    use crate::token::Span;

    fn compile(src: &str) -> Vec<Instr> {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let mut parser = Parser::new(src, &ops, &arena);
        let (term, scope) = parser.next_term(&mut interner).unwrap().unwrap();
        let clause = term_to_clause(term, scope, Span::new(0, src.len()), &mut interner);
        let classification = classify(&clause, &mut interner);
        let mut functors = FunctorTable::new();
        let mut next_reg = 100;
        compile_head(
            clause.head.as_ref().unwrap(),
            &classification.slots,
            &mut functors,
            &interner,
            &mut next_reg,
        )
    }

    #[test]
    fn first_occurrence_is_get_var() {
        let instrs = compile("p(X).");
        assert!(matches!(instrs[0], Instr::GetVar { .. }));
    }

    #[test]
    fn repeated_occurrence_is_get_val() {
        let instrs = compile("p(X, X).");
        assert!(matches!(instrs[0], Instr::GetVar { .. }));
        assert!(matches!(instrs[1], Instr::GetVal { .. }));
    }

    #[test]
    fn nested_structure_is_flattened() {
        let instrs = compile("nat(s(N)).");
        assert!(matches!(instrs[0], Instr::GetStruc { .. }));
        assert!(matches!(instrs[1], Instr::UnifyVar { .. }));
        assert!(instrs.iter().any(|i| matches!(i, Instr::GetVar { .. })));
    }

    #[test]
    fn list_head_emits_get_list() {
        let instrs = compile("app([H|T], L, [H|R]).");
        assert!(matches!(instrs[0], Instr::GetList { .. }));
    }
}
