use std::path::PathBuf;

use clap::{ArgAction, Subcommand};
use codegrid::{GridWorld, Level, Position, Structure, load_level, world_snapshot};

#[derive(Subcommand)]
pub enum LevelCommand {
    /// Draw a level's grid and summarize its goal
    Show {
        /// Level fixture (JSON)
        file: PathBuf,
        /// Print the world snapshot JSON to stdout
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        json: bool,
    },
}

pub(super) fn run_level(cmd: LevelCommand) -> Result<(), String> {
    match cmd {
        LevelCommand::Show { file, json } => {
            let level = load_level(&file).map_err(|e| e.to_string())?;
            print_summary(&level);
            print_grid(&level.world);

            if json {
                let snapshot = world_snapshot(&level.world);
                let json_str = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
                println!("{}", json_str);
            }
        }
    }

    Ok(())
}

fn print_summary(level: &Level) {
    let goal = &level.goal;
    println!(
        "Level '{}': {}x{} | avatars={} | blocks={} | program lines={}",
        level.name,
        level.world.rows(),
        level.world.cols(),
        level.world.avatars().len(),
        level.world.blocks().len(),
        level.program.len()
    );
    println!(
        "Goal: budget {} command(s), ideal {} line(s) / {}s, time limit {}s",
        goal.num_of_commands, goal.ideal_lines, goal.ideal_time, level.time_limit
    );
    for target in &goal.avatar_targets {
        println!(" - avatar target at {}", target);
    }
    for target in &goal.block_targets {
        println!(" - block {} wanted at {}", target.number, target.position);
    }
    if !goal.has_targets() {
        println!(" - no targets; the run can only finish, lose or time out");
    }
}

/// `A` avatar, digit for a resting block (`*` if outside 0..=9), otherwise
/// the tile's structure symbol.
fn print_grid(world: &GridWorld) {
    for x in 0..world.rows() {
        let row: String = (0..world.cols())
            .map(|y| {
                let position = Position::new(x, y);
                if world.avatar_on_tile(position).is_some() {
                    return 'A';
                }
                if let Some(block) = world.block_on_tile(position) {
                    return char::from_digit(block.number as u32, 10)
                        .filter(|_| (0..=9).contains(&block.number))
                        .unwrap_or('*');
                }
                match world.structure(position) {
                    Some(Structure::Wall) => '#',
                    Some(Structure::Hole) => 'o',
                    _ => '.',
                }
            })
            .collect();
        println!("  {}", row);
    }
}
