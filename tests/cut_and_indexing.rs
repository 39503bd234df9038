//! Cut semantics and first-argument indexing transparency.

use wam::compile;

fn all_solutions(program: &str, query: &str, var: &str) -> Vec<String> {
    let module = compile(program).unwrap();
    let mut resolver = module.prepare(query).unwrap();
    let mut out = Vec::new();
    while let Some(bindings) = resolver.next().unwrap() {
        out.push(bindings.get(var).unwrap().to_string());
    }
    out
}

#[test]
fn neck_cut_commits_to_the_first_matching_clause() {
    let program = "p(X) :- !, q(X).\np(z).\nq(a).\nq(b).\n";
    // the neck cut in the first clause of p/1 prevents ever trying p(z),
    // but leaves q/1's own choice points untouched.
    assert_eq!(all_solutions(program, "p(X)", "X"), vec!["a", "b"]);
}

#[test]
fn deep_cut_discards_the_calling_predicates_remaining_alternatives() {
    let program = "q(1).\nq(2).\nq(3).\nr(X) :- q(X), !.\nr(z).\n";
    // the cut is not the first body goal (deep cut), so it must discard
    // both q/1's remaining alternatives (2, 3) and r/1's own (z).
    assert_eq!(all_solutions(program, "r(X)", "X"), vec!["1"]);
}

#[test]
fn cut_inside_one_disjunction_branch_does_not_prune_the_other_branch() {
    let program = "p(a) :- !.\np(b).\nq(X) :- p(X) ; p(b).\n";
    assert_eq!(all_solutions(program, "q(X)", "X"), vec!["a", "b"]);
}

#[test]
fn indexing_is_a_transparent_filter_over_solution_order() {
    // Ten clauses with distinct first-argument constants force
    // switch_on_const indexing; the solution order must match plain
    // top-to-bottom clause order regardless.
    let mut program = String::new();
    for i in 0..10 {
        program.push_str(&format!("p({i}, v{i}).\n"));
    }
    let module = compile(&program).unwrap();
    let mut resolver = module.prepare("p(X, Y)").unwrap();
    let mut seen = Vec::new();
    while let Some(bindings) = resolver.next().unwrap() {
        seen.push((bindings.get("X").unwrap().to_string(), bindings.get("Y").unwrap().to_string()));
    }
    let expected: Vec<(String, String)> = (0..10).map(|i| (i.to_string(), format!("v{i}"))).collect();
    assert_eq!(seen, expected);
}

#[test]
fn indexing_still_finds_the_one_matching_clause_among_many() {
    let mut program = String::new();
    for i in 0..10 {
        program.push_str(&format!("p({i}, v{i}).\n"));
    }
    let module = compile(&program).unwrap();
    let mut resolver = module.prepare("p(7, Y)").unwrap();
    let bindings = resolver.next().unwrap().unwrap();
    assert_eq!(bindings.get("Y").unwrap().to_string(), "v7");
    assert!(resolver.next().unwrap().is_none());
}
