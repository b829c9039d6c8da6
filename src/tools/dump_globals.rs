use anyhow::Result;

use minic_rs::ast::InitFragment;
use minic_rs::{compile, SourceFile};

pub fn dump_globals(source: &SourceFile) -> Result<()> {
    let program = compile(source)?;

    for &id in &program.globals {
        let var = program.vars.get(id);
        println!(
            "{} {}: {} ({} bytes)",
            if var.is_static { "static" } else { "global" },
            var.name,
            program.types.describe(var.ty),
            program.types.get(var.ty).size,
        );
        for fragment in &var.initializer {
            match fragment {
                InitFragment::Val { size, val } => {
                    println!("  .val  size={size} value={val}")
                }
                InitFragment::Label { name, addend } => {
                    println!("  .addr {name}+{addend}")
                }
            }
        }
    }
    Ok(())
}
