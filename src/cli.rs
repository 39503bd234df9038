//! Command-line interface for the `wam` toolchain: a `clap`-derive
//! `Cli`/`Commands` pair, a `run_cli` entry point, and one `cmd_*`
//! function per subcommand.

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::error::{exit_code, Error, MachineError};
use crate::{bytecode_file, compile, formatter};

#[derive(Parser)]
#[command(name = "wam")]
#[command(about = "A Prolog toolchain: parser, WAM compiler, resolving machine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a program and run one query against it, printing every solution
    Run {
        /// Path to the Prolog source file
        file: PathBuf,
        /// Query to run, e.g. "color(X)"
        query: String,
        /// Print only the first solution
        #[arg(long)]
        once: bool,
    },
    /// Compile a program and start an interactive query REPL
    Repl {
        /// Path to the Prolog source file
        file: PathBuf,
    },
    /// Compile a program and print its disassembled bytecode
    Disasm {
        /// Path to the Prolog source file
        file: PathBuf,
        /// Print the module's structure as JSON instead of disassembly text
        #[arg(long)]
        emit_json: bool,
    },
    /// Compile a program and write it to a `.wamb` bytecode file
    Build {
        /// Path to the Prolog source file
        file: PathBuf,
        /// Output path for the compiled module
        #[arg(long, short)]
        out: PathBuf,
    },
}

/// Entry point for the CLI.
pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { file, query, once } => cmd_run(&file, &query, once),
        Commands::Repl { file } => cmd_repl(&file),
        Commands::Disasm { file, emit_json } => cmd_disasm(&file, emit_json),
        Commands::Build { file, out } => cmd_build(&file, &out),
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            exit_code(&e)
        }
    }
}

fn read_source(file: &PathBuf) -> io::Result<String> {
    fs::read_to_string(file)
}

fn cmd_run(file: &PathBuf, query: &str, once: bool) -> Result<(), Error> {
    let source = read_source(file).map_err(io_as_runtime)?;
    let module = compile(&source)?;
    let mut resolver = module.prepare(query)?;
    let mut any = false;
    while let Some(bindings) = resolver.next()? {
        any = true;
        print_bindings(&bindings);
        if once {
            break;
        }
    }
    if !any {
        println!("false.");
    }
    Ok(())
}

fn print_bindings(bindings: &crate::resolver::Bindings) {
    let mut vars: Vec<&str> = bindings.vars().collect();
    vars.sort_unstable();
    if vars.is_empty() {
        println!("true.");
        return;
    }
    let rendered: Vec<String> = vars.iter().map(|v| format!("{v} = {}", bindings.get(v).unwrap())).collect();
    println!("{}.", rendered.join(", "));
}

/// A minimal read-query-print loop: one long-lived context, one line of
/// input in, one line of output out.
fn cmd_repl(file: &PathBuf) -> Result<(), Error> {
    let source = read_source(file).map_err(io_as_runtime)?;
    let module = compile(&source)?;

    println!("wam REPL — {} loaded. Enter a query, or 'halt.' to quit.", file.display());
    let stdin = io::stdin();
    loop {
        print!("?- ");
        io::stdout().flush().map_err(io_as_runtime)?;

        let mut line = String::new();
        if stdin.read_line(&mut line).map_err(io_as_runtime)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "halt." || line == "halt" {
            break;
        }

        match module.prepare(line) {
            Ok(mut resolver) => match resolver.next() {
                Ok(Some(bindings)) => print_bindings(&bindings),
                Ok(None) => println!("false."),
                Err(e) => eprintln!("error: {e}"),
            },
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn cmd_disasm(file: &PathBuf, emit_json: bool) -> Result<(), Error> {
    let source = read_source(file).map_err(io_as_runtime)?;
    let module = compile(&source)?;
    if emit_json {
        let json = disasm_json(&module);
        println!("{}", serde_json::to_string_pretty(&json).expect("disasm JSON is always serializable"));
    } else {
        print!("{}", formatter::disassemble(&module));
    }
    Ok(())
}

/// A debug-only structural dump of a module, independent of the `.wamb`
/// binary layout.
fn disasm_json(module: &crate::module::Module) -> serde_json::Value {
    let lines: Vec<String> = module
        .code()
        .iter()
        .map(|instr| formatter::format_instr(instr, module.functors(), module.interner()))
        .collect();
    serde_json::json!({ "instruction_count": lines.len(), "instructions": lines })
}

fn cmd_build(file: &PathBuf, out: &PathBuf) -> Result<(), Error> {
    let source = read_source(file).map_err(io_as_runtime)?;
    let module = compile(&source)?;
    let mut f = fs::File::create(out).map_err(io_as_runtime)?;
    bytecode_file::write_module(&module, &mut f).map_err(io_as_runtime)?;
    println!("wrote {}", out.display());
    Ok(())
}

/// Wraps a file-system or bytecode-file I/O failure as a [`crate::error::MachineError`].
fn io_as_runtime(e: io::Error) -> Error {
    eprintln!("io error: {e}");
    Error::Machine(MachineError::Resource { which: "io" })
}
