//! The failure procedure.

use super::Machine;

/// Forces backtracking into the choice point at `machine.b`. Returns
/// `false` if there is none (the bottom choice point has been exhausted),
/// in which case resolution has no more solutions.
pub fn fail(machine: &mut Machine) -> bool {
    let Some(b) = machine.b else {
        return false;
    };
    let cp = &machine.choice_points[b];

    for i in 0..cp.saved_args.len() {
        machine.registers[i + 1] = cp.saved_args[i];
    }
    machine.num_of_args = cp.saved_args.len() as u8;
    machine.e = cp.e;
    machine.cp = cp.cp;

    // Unwind the trail, unbinding every cell it recorded since this
    // choice point was pushed`
    // are all unbound and `H == B.H`).
    for &addr in &machine.trail[cp.tr..] {
        machine.heap[addr] = super::Cell::Ref(addr);
    }
    machine.trail.truncate(cp.tr);
    machine.heap.truncate(cp.h);
    machine.hb = cp.h;
    machine.p = cp.alt;

    true
}

#[cfg(test)]
mod tests {
    use super::super::Cell;
    use crate::compiler::compile_program;
    use crate::instr::Const;
    use crate::intern::Interner;
    use crate::module::CompilerOptions;

    fn compile(src: &str) -> crate::module::Module {
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
    fn backtracking_unbinds_every_cell_the_failed_alternative_bound() {
        let module = compile("p(1).\np(2).\n");
        let f = module.functors().lookup("p", 1).unwrap();
        let entry = module.entry_pc(f).unwrap();
        let mut machine = super::Machine::new(&module, module.code().to_vec(), entry);
        let v = machine.new_ref().unwrap();
        machine.set_register(1, v);
        machine.num_of_args = 1;
        machine.run().unwrap();
        assert_eq!(machine.deref(v), Cell::Con(Const::Int(1)));
        assert!(machine.backtrack());
        machine.run().unwrap();
        assert_eq!(machine.deref(v), Cell::Con(Const::Int(2)));
    }
}
