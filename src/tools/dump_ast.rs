use anyhow::Result;

use minic_rs::{compile, SourceFile};

pub fn dump_ast(source: &SourceFile) -> Result<()> {
    let program = compile(source)?;

    for func in &program.fns {
        let params = func
            .params
            .iter()
            .map(|&id| {
                let var = program.vars.get(id);
                format!("{}: {}", var.name, program.types.describe(var.ty))
            })
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{}fn {}({}) stack_size={}",
            if func.is_static { "static " } else { "" },
            func.name,
            params,
            func.stack_size,
        );
        for stmt in &func.body {
            println!("  {stmt:?}");
        }
        println!();
    }
    Ok(())
}
