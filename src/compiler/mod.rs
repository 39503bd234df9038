//! The WAM compiler entry point: turns a program's clauses into a single linked [`Module`].

pub mod body;
pub mod classify;
pub mod head;
pub mod indexing;

use crate::error::{CompileError, CompileErrorKind};
use crate::instr::{Addr, Instr};
use crate::intern::{FunctorId, FunctorTable, Interner, Symbol};
use crate::module::{CompilerOptions, Linkage, Module};
use crate::term::{Clause, Predicate};
use body::BodyCompiler;
use classify::classify;
use std::collections::HashMap;

/// Groups a flat clause list into per-`name/arity` [`Predicate`]s,
/// preserving each predicate's first-seen order.
fn group_predicates<'a>(clauses: Vec<Clause<'a>>) -> Vec<Predicate<'a>> {
    let mut order: Vec<(Symbol, u8)> = Vec::new();
    let mut by_key: HashMap<(Symbol, u8), Vec<Clause<'a>>> = HashMap::new();
    for clause in clauses {
        let (name, arity) = match &clause.head {
            Some(crate::term::Term::Functor { name, args }) => (*name, args.len() as u8),
            Some(crate::term::Term::Atom(name)) => (*name, 0),
            _ => continue,
        };
        if !by_key.contains_key(&(name, arity)) {
            order.push((name, arity));
        }
        by_key.entry((name, arity)).or_default().push(clause);
    }
    order
        .into_iter()
        .map(|(name, arity)| Predicate { name, arity, clauses: by_key.remove(&(name, arity)).unwrap() })
        .collect()
}

/// A not-yet-linked call site: where in the final code buffer it lives,
/// and which `functor/arity` it must resolve to.
struct CallSite {
    code_index: usize,
    functor: Symbol,
    arity: u8,
}

/// Compiles a program's clauses (facts and rules; queries are handled
/// separately by [`crate::resolver`]) into a linked [`Module`].
pub fn compile_program(clauses: Vec<Clause<'_>>, mut interner: Interner, options: CompilerOptions) -> Result<Module, CompileError> {
    let mut functors = FunctorTable::new();
    let predicates = group_predicates(clauses);

    let mut code: Vec<Instr> = Vec::new();
    let mut call_points: HashMap<FunctorId, Addr> = HashMap::new();
    let mut call_sites: Vec<CallSite> = Vec::new();

    for predicate in &predicates {
        let base = code.len() as Addr;
        let f = functors.intern(interner.resolve(predicate.name), predicate.arity);
        call_points.insert(f, base);

        let mut clause_bodies = Vec::with_capacity(predicate.clauses.len());
        let mut clause_patches: Vec<Vec<(usize, Symbol, u8)>> = Vec::with_capacity(predicate.clauses.len());

        for clause in &predicate.clauses {
            let classification = classify(clause, &mut interner);
            let mut next_reg: crate::instr::Reg = (predicate.arity + 1).max(1);
            let mut clause_code = if let Some(head) = &clause.head {
                head::compile_head(head, &classification.slots, &mut functors, &interner, &mut next_reg)
            } else {
                Vec::new()
            };
            let has_environment = classification.perm_count > 0;
            let mut bc = BodyCompiler::new(&classification, &mut functors, &mut interner, next_reg);
            let body_code = bc.compile_body(&clause.body, has_environment);
            let head_len = clause_code.len();
            clause_code.extend(body_code);

            let patches = bc.patches.into_iter().map(|p| (head_len + p.instr_index, p.functor, p.arity)).collect();
            clause_bodies.push(clause_code);
            clause_patches.push(patches);
        }

        let (assembled, clause_starts) = indexing::assemble_predicate(&predicate.clauses, clause_bodies, &mut functors, &interner);

        // Patches were recorded relative to each clause's own local code;
        // `clause_starts[i]` is that clause's offset within the assembled
        // predicate block, and `base` is the predicate block's offset
        // within the whole module, so the sum is the call site's final
        // absolute address.
        for (start, patches) in clause_starts.iter().zip(clause_patches) {
            for (local_index, functor, arity) in patches {
                call_sites.push(CallSite { code_index: base as usize + *start as usize + local_index, functor, arity });
            }
        }

        code.extend(assembled);
    }

    // Always present, independent of whether any statically resolved call
    // needs it: a `call/1` of a dynamically bound, undefined callable can
    // only discover that at run time (see `machine::resolve_dynamic_target`).
    let fail_stub = code.len() as Addr;
    code.push(Instr::Fail);

    for site in &call_sites {
        let f = functors.intern(interner.resolve(site.functor), site.arity);
        let target = match call_points.get(&f) {
            Some(&addr) => addr,
            None => match options.linkage {
                Linkage::Strict => {
                    return Err(CompileError::new(
                        CompileErrorKind::UnresolvedCall { functor: interner.resolve(site.functor).to_string(), arity: site.arity },
                        None,
                    ));
                }
                Linkage::Lenient => fail_stub,
            },
        };
        match &mut code[site.code_index] {
            Instr::Call { entry, .. } => *entry = target,
            Instr::Execute { entry, .. } => *entry = target,
            _ => unreachable!("call-site patch list only ever records Call/Execute instructions"),
        }
    }

    Ok(Module::new(code, call_points, functors, interner, fail_stub, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::module::{CompilerOptions, Linkage};
    use crate::parser::clause::term_to_clause;
    use crate::parser::{OpTable, Parser};
    use crate::token::Span;

    fn compile_src(src: &str, options: CompilerOptions) -> Result<Module, CompileError> {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let ops = OpTable::standard();
        let mut parser = Parser::new(src, &ops, &arena);
        let mut clauses = Vec::new();
        while let Some((term, scope)) = parser.next_term(&mut interner).unwrap() {
            clauses.push(term_to_clause(term, scope, Span::new(0, src.len()), &mut interner));
        }
        compile_program(clauses, interner, options)
    }

    #[test]
    fn facts_get_distinct_entry_points() {
        let module = compile_src("p(1).\nq(2).\n", CompilerOptions::default()).unwrap();
        let p = module.functors().lookup("p", 1).unwrap();
        let q = module.functors().lookup("q", 1).unwrap();
        assert_ne!(module.entry_pc(p), module.entry_pc(q));
    }

    #[test]
    fn recursive_predicate_links_its_own_call() {
        let module = compile_src("app([], L, L).\napp([H|T], L, [H|R]) :- app(T, L, R).\n", CompilerOptions::default()).unwrap();
        let app = module.functors().lookup("app", 3).unwrap();
        let entry = module.entry_pc(app).unwrap();
        let has_self_call = module.code().iter().any(|i| matches!(i, Instr::Execute { entry: e, .. } if *e == entry));
        assert!(has_self_call);
    }

    #[test]
    fn strict_linkage_rejects_an_undefined_call() {
        let options = CompilerOptions { linkage: Linkage::Strict };
        let err = compile_src("p(X) :- undefined_predicate(X).\n", options).unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::UnresolvedCall { .. }));
    }

    #[test]
    fn lenient_linkage_stubs_an_undefined_call_instead_of_erroring() {
        let module = compile_src("p(X) :- undefined_predicate(X).\n", CompilerOptions::default()).unwrap();
        assert!(matches!(module.code().last(), Some(Instr::Fail)));
    }

    #[test]
    fn multi_clause_predicate_is_indexed() {
        let module = compile_src("color(red).\ncolor(green).\ncolor(blue).\n", CompilerOptions::default()).unwrap();
        let c = module.functors().lookup("color", 1).unwrap();
        let entry = module.entry_pc(c).unwrap() as usize;
        assert!(matches!(module.code()[entry], Instr::SwitchOnTerm { .. }));
    }
}
