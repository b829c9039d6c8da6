mod dump_ast;
use dump_ast::dump_ast;
mod dump_globals;
use dump_globals::dump_globals;
mod dump_tokens;
use dump_tokens::dump_tokens;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use minic_rs::{compile, SourceFile};

/// Parse C source files and inspect the front-end output
#[derive(Clone, Debug, Parser)]
struct Args {
    /// input filename to compile
    input: PathBuf,
    /// operation to execute; a plain parse check when omitted
    #[command(subcommand)]
    operation: Option<Operation>,
}

#[derive(Clone, Debug, Subcommand)]
enum Operation {
    /// Dump the token stream
    DumpTokens,
    /// Dump the typed AST of every function
    DumpAst,
    /// Dump the global variables and their initializer images
    DumpGlobals,
    /// Parse and type only; the exit status reports success
    Check,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let source = SourceFile::open(&args.input)?;
    match args.operation.unwrap_or(Operation::Check) {
        Operation::DumpTokens => dump_tokens(&source),
        Operation::DumpAst => dump_ast(&source),
        Operation::DumpGlobals => dump_globals(&source),
        Operation::Check => compile(&source).map(|_| ()),
    }
}
