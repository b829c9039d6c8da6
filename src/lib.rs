#![forbid(unsafe_code)]
//! C compiler front-end.
//!
//! The pipeline is tokenize → parse (with types assigned on the fly) →
//! stack layout. The resulting [`ast::Program`] is the contract consumed by
//! an external x86-64 code generator: every global carries its initializer
//! image, every expression node its type, every local its stack offset.

pub mod ast;
pub mod lexer;
pub mod parse;
pub mod ty;
mod typing;

#[cfg(test)]
mod test;

use std::fmt::Display;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use ast::Program;
use parse::Parser;

/// A named source buffer. The text always ends with a newline so a
/// diagnostic can print a complete final line.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub src: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<Vec<u8>>) -> Self {
        let mut src = text.into();
        if src.last() != Some(&b'\n') {
            src.push(b'\n');
        }
        SourceFile {
            name: name.into(),
            src,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        Ok(SourceFile::new(path.display().to_string(), text))
    }

    /// Render a caret diagnostic:
    ///
    /// ```text
    /// <file>:<line>: <source line>
    ///                    ^ <msg>
    /// ```
    pub fn render_at(&self, pos: usize, msg: impl Display) -> String {
        let pos = pos.min(self.src.len().saturating_sub(1));
        let line_start = self.src[..pos]
            .iter()
            .rposition(|&c| c == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = self.src[pos..]
            .iter()
            .position(|&c| c == b'\n')
            .map(|i| pos + i)
            .unwrap_or(self.src.len());
        let line_num =
            self.src[..line_start].iter().filter(|&&c| c == b'\n').count() + 1;

        let prefix = format!("{}:{}: ", self.name, line_num);
        let line = String::from_utf8_lossy(&self.src[line_start..line_end]);
        let caret_col = prefix.len() + (pos - line_start);
        format!("{prefix}{line}\n{:caret_col$}^ {msg}", "")
    }

    pub fn error_at(&self, pos: usize, msg: impl Display) -> anyhow::Error {
        anyhow!("{}", self.render_at(pos, msg))
    }

    /// Same rendering as [`SourceFile::error_at`], written to stderr;
    /// compilation continues.
    pub fn warn_at(&self, pos: usize, msg: impl Display) {
        eprintln!("{}", self.render_at(pos, msg));
    }
}

/// Run the whole front-end over one source file.
pub fn compile(src: &SourceFile) -> Result<Program> {
    let tokens = lexer::tokenize(src)?;
    let mut program = Parser::new(src, &tokens).program()?;
    assign_stack_offsets(&mut program);
    Ok(program)
}

/// Offsets accumulate by size in source order; the frame total is rounded
/// up to 16.
fn assign_stack_offsets(program: &mut Program) {
    for func in &mut program.fns {
        let mut offset = 0;
        for &var in &func.locals {
            offset += program.types.get(program.vars.get(var).ty).size;
            program.vars.get_mut(var).offset = offset;
        }
        func.stack_size = ty::align_to(offset, 16);
    }
}
