use std::path::PathBuf;

use clap::{ArgAction, Subcommand};
use codegrid::{
    BlockDescriptor, Command, CommandRegistry, Program, ProgramBuilder, load_level,
    load_program_file,
};

#[derive(Subcommand)]
pub enum ProgramCommand {
    /// Build a program and print its listing and if/endif jump table
    Check {
        /// Program file (JSON array of blocks), or a level file with --level
        file: PathBuf,
        /// Read the program embedded in a level fixture
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        level: bool,
    },
    /// List the block types the standard registry understands
    Blocks,
}

pub(super) fn run_program(command: ProgramCommand) -> Result<(), String> {
    match command {
        ProgramCommand::Check { file, level } => {
            let descriptors = if level {
                load_level(&file).map_err(|e| e.to_string())?.program
            } else {
                load_program_file(&file).map_err(|e| e.to_string())?
            };
            check(&descriptors)
        }
        ProgramCommand::Blocks => {
            let registry = CommandRegistry::standard();
            println!("Block types:");
            for (tag, entry) in registry.tags() {
                if entry.required.is_empty() {
                    println!("  {}", tag);
                } else {
                    println!("  {} ({})", tag, entry.required.join(", "));
                }
            }
            Ok(())
        }
    }
}

fn check(descriptors: &[BlockDescriptor]) -> Result<(), String> {
    let registry = CommandRegistry::standard();
    let program = ProgramBuilder::new(&registry)
        .build(descriptors)
        .map_err(|e| format!("program rejected: {}", e))?;
    print_listing(&program);
    Ok(())
}

fn print_listing(program: &Program) {
    println!("{} line(s), {} if-block(s)", program.len(), program.jump_table().len());
    let mut depth = 0usize;
    for (offset, command) in program.commands().iter().enumerate() {
        let line = offset + 1;
        if matches!(command, Command::EndIf) {
            depth = depth.saturating_sub(1);
        }
        let jump = program
            .jump_target(line)
            .map(|target| format!("    -> {}", target))
            .unwrap_or_default();
        println!("{:>4}  {}{}{}", line, "  ".repeat(depth), command, jump);
        if matches!(command, Command::If { .. }) {
            depth += 1;
        }
    }
}
