use crate::cli::{ElementsArgs, ElementsCommands};
use crate::error::{CliError, Result};
use molsoup::core::chemistry::ElementTable;
use molsoup::engine::error::EngineError;
use std::path::Path;
use tracing::info;

pub fn run(args: ElementsArgs) -> Result<()> {
    match args.command {
        ElementsCommands::List { path } => {
            let table = match path {
                Some(path) => ElementTable::load(&path).map_err(EngineError::from)?,
                None => ElementTable::builtin(),
            };
            print!("{}", render_table(&table));
            Ok(())
        }
        ElementsCommands::Export { output, force } => {
            export_builtin(&output, force)?;
            println!("✓ Built-in element table written to: {}", output.display());
            Ok(())
        }
    }
}

fn render_table(table: &ElementTable) -> String {
    let mut out = format!(
        "{:<4} {:>7} {:>8} {:>6} {:>7} {:>7} {:>9}\n",
        "Sym", "Valence", "Electrons", "EN", "Mass", "Radius", "Abundance"
    );
    for (_, e) in table.iter() {
        out.push_str(&format!(
            "{:<4} {:>7} {:>8} {:>6.2} {:>7.2} {:>7.2} {:>9.3}\n",
            e.symbol,
            e.max_valence,
            e.valence_electrons,
            e.electronegativity,
            e.mass,
            e.radius,
            e.abundance
        ));
    }
    out
}

fn export_builtin(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(CliError::Argument(format!(
            "'{}' already exists; pass --force to overwrite it",
            output.display()
        )));
    }
    let content = ElementTable::builtin()
        .to_toml_string()
        .map_err(EngineError::from)?;
    std::fs::write(output, content)?;
    info!("Exported built-in element table to {:?}", output);
    Ok(())
}
