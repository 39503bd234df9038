//! A Prolog toolchain: dynamic-operator parser, WAM compiler, and
//! resolving machine.
//!
//! The public surface is deliberately small: [`compile`] (or
//! [`compile_with_options`]) turns program text into a [`Module`], and
//! [`Module::prepare`] turns query text into a [`resolver::Resolver`]
//! that enumerates solutions one [`resolver::Bindings`] at a time.

pub mod arena;
pub mod bytecode_file;
pub mod cli;
pub mod compiler;
pub mod error;
pub mod formatter;
pub mod instr;
pub mod intern;
pub mod lexer;
pub mod machine;
pub mod module;
pub mod parser;
pub mod resolver;
pub mod term;
pub mod token;

pub use error::Error;
pub use module::{CompilerOptions, Linkage, Module};
pub use resolver::{Bindings, Resolver, TermView};

use arena::Arena;
use parser::clause::term_to_clause;
use parser::{OpTable, Parser};

/// Compiles `program_text` with [`CompilerOptions::default`].
pub fn compile(program_text: &str) -> Result<Module, Error> {
    compile_with_options(program_text, CompilerOptions::default())
}

/// Compiles `program_text` under the given [`CompilerOptions`].
pub fn compile_with_options(program_text: &str, options: CompilerOptions) -> Result<Module, Error> {
    let arena = Arena::new();
    let mut interner = intern::Interner::new();
    let ops = OpTable::standard();
    let mut parser = Parser::new(program_text, &ops, &arena);

    let mut clauses = Vec::new();
    while let Some((term, scope)) = parser.next_term(&mut interner)? {
        clauses.push(term_to_clause(term, scope, token::Span::new(0, program_text.len()), &mut interner));
    }

    Ok(compiler::compile_program(clauses, interner, options)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_then_prepare_runs_a_query_end_to_end() {
        let module = compile("parent(tom, bob).\nparent(bob, ann).\n").unwrap();
        let mut resolver = module.prepare("parent(tom, Who)").unwrap();
        let bindings = resolver.next().unwrap().unwrap();
        assert_eq!(bindings.get("Who").unwrap().to_string(), "bob");
    }

    #[test]
    fn strict_linkage_rejects_a_program_calling_an_undefined_predicate() {
        let err = compile_with_options("p :- q.\n", CompilerOptions { linkage: Linkage::Strict });
        assert!(err.is_err());
    }

    #[test]
    fn lenient_linkage_accepts_a_program_calling_an_undefined_predicate() {
        let module = compile_with_options("p :- q.\n", CompilerOptions { linkage: Linkage::Lenient }).unwrap();
        let mut resolver = module.prepare("p").unwrap();
        assert!(resolver.next().unwrap().is_none());
    }

    #[test]
    fn empty_program_compiles_to_an_empty_module() {
        let module = compile("").unwrap();
        assert!(module.code().is_empty() || module.code().len() == 1);
    }
}
