use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use codegrid::{
    CommandRegistry, ExecutionEngine, Outcome, ProgramBuilder, Signal, SignalLog, SystemClock,
    TickReport, engine_snapshot, load_level, load_program_file,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod level;
mod program;

use level::{LevelCommand, run_level};
use program::{ProgramCommand, run_program};

#[derive(Parser)]
#[command(
    name = "codegrid",
    version,
    about = "Command-block puzzle engine (programs, avatars, ticks)",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a block program against a level until it wins, loses or times out
    Run {
        /// Level fixture (JSON)
        #[arg(short = 'l', long)]
        level: PathBuf,
        /// Program file (JSON array of blocks); defaults to the level's embedded program
        #[arg(short = 'p', long)]
        program: Option<PathBuf>,
        /// Stop after this many ticks even if the run has not ended
        #[arg(short = 't', long)]
        max_ticks: Option<u64>,
        /// Desired tick rate (ticks per second). If set, overrides delay-ms.
        #[arg(long)]
        tick_rate: Option<f64>,
        /// Delay between ticks in milliseconds (0 runs as fast as possible)
        #[arg(short = 'd', long, default_value_t = 0)]
        delay_ms: u64,
        /// Override the level's time limit (seconds)
        #[arg(long)]
        time_limit: Option<i64>,
        /// Print the final world snapshot as JSON
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        json: bool,
        /// Append a timestamped record of every signal to this file
        #[arg(long, value_name = "FILE")]
        transcript: Option<PathBuf>,
        /// Only print the final outcome
        #[arg(short = 'q', long, action = ArgAction::SetTrue, default_value_t = false)]
        quiet: bool,
    },
    /// Program operations (validate, list block types)
    Program {
        #[command(subcommand)]
        command: ProgramCommand,
    },
    /// Level operations (inspect fixtures)
    Level {
        #[command(subcommand)]
        command: LevelCommand,
    },
}

/// Installs the stderr tracing subscriber. `RUST_LOG` overrides the default
/// `codegrid=info` filter.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codegrid=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() {
    init_logging();
    let cli = Cli::parse();
    if let Err(err) = dispatch(cli.command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn dispatch(command: Command) -> Result<(), String> {
    match command {
        Command::Run {
            level,
            program,
            max_ticks,
            tick_rate,
            delay_ms,
            time_limit,
            json,
            transcript,
            quiet,
        } => run_level_program(RunOptions {
            level,
            program,
            max_ticks,
            tick_rate,
            delay_ms,
            time_limit,
            json,
            transcript,
            quiet,
        }),
        Command::Program { command } => run_program(command),
        Command::Level { command } => run_level(command),
    }
}

struct RunOptions {
    level: PathBuf,
    program: Option<PathBuf>,
    max_ticks: Option<u64>,
    tick_rate: Option<f64>,
    delay_ms: u64,
    time_limit: Option<i64>,
    json: bool,
    transcript: Option<PathBuf>,
    quiet: bool,
}

fn run_level_program(opts: RunOptions) -> Result<(), String> {
    let level = load_level(&opts.level).map_err(|e| e.to_string())?;
    let descriptors = match &opts.program {
        Some(path) => load_program_file(path).map_err(|e| e.to_string())?,
        None => level.program.clone(),
    };
    if descriptors.is_empty() {
        return Err("no program blocks; pass --program or embed a program in the level".into());
    }

    let registry = CommandRegistry::standard();
    let program = ProgramBuilder::new(&registry)
        .build(&descriptors)
        .map_err(|e| format!("program rejected: {}", e))?;

    let delay = tick_delay(opts.tick_rate, opts.delay_ms)?;

    let time_limit = opts.time_limit.unwrap_or(level.time_limit);
    let lines = program.len();
    let mut engine = ExecutionEngine::new(
        program,
        level.world,
        level.goal,
        time_limit,
        Box::new(SystemClock::start()),
    );
    info!(
        level = %level.name,
        lines,
        avatars = engine.world().avatars().len(),
        time_limit,
        "run started"
    );
    if !opts.quiet {
        println!(
            "Level '{}' | {} line(s) | {} avatar(s) | budget {} | time limit {}s",
            level.name,
            lines,
            engine.world().avatars().len(),
            engine.remaining_budget(),
            time_limit
        );
    }

    let mut remaining = opts.max_ticks;
    let mut last: Option<TickReport> = None;
    loop {
        if remaining == Some(0) {
            break;
        }

        let mut log = SignalLog::new();
        let report = engine
            .tick(&mut log)
            .map_err(|e| format!("execution fault: {}", e))?;
        let signals = log.drain();

        if !opts.quiet {
            print_tick(&report, &signals);
        }
        if let Some(path) = &opts.transcript {
            append_transcript(path, &report, &signals);
        }

        let done = report.is_terminal();
        last = Some(report);
        if done {
            break;
        }

        if let Some(n) = remaining.as_mut() {
            *n = n.saturating_sub(1);
        }
        if delay > Duration::ZERO {
            std::thread::sleep(delay);
        }
    }

    print_outcome(last.as_ref(), engine.tick_count());

    if opts.json {
        let snapshot = engine_snapshot(&engine);
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| format!("serialize snapshot: {}", e))?;
        println!("{}", json);
    }

    Ok(())
}

/// Pause between ticks. A tick rate wins over `delay_ms`.
fn tick_delay(tick_rate: Option<f64>, delay_ms: u64) -> Result<Duration, String> {
    match tick_rate {
        Some(rate) => {
            if !(rate.is_finite() && rate > 0.0) {
                return Err("tick_rate must be a finite number greater than 0".into());
            }
            Duration::try_from_secs_f64(1.0 / rate)
                .map_err(|_| format!("tick_rate {} is too small", rate))
        }
        None => Ok(Duration::from_millis(delay_ms)),
    }
}

fn print_tick(report: &TickReport, signals: &[Signal]) {
    println!("Tick {}: {} avatar(s) stepped", report.tick, report.line_updates.len());
    for signal in signals {
        println!(" - {}", signal);
    }
}

fn print_outcome(report: Option<&TickReport>, ticks: u64) {
    let Some(report) = report else {
        println!("No ticks were run.");
        return;
    };
    match report.outcome {
        Some(Outcome::Won {
            remaining,
            line_bonus,
            time_bonus,
        }) => println!(
            "Won after {} tick(s): budget left {}, line bonus {}, time bonus {}, total {}",
            ticks,
            remaining,
            line_bonus,
            time_bonus,
            remaining + line_bonus + time_bonus
        ),
        Some(Outcome::Lost) => println!("Out of commands after {} tick(s). Level failed.", ticks),
        Some(Outcome::Finished) => println!(
            "Program finished after {} tick(s) without reaching the goal.",
            ticks
        ),
        None if report.timed_out => println!("Time is up after {} tick(s).", ticks),
        None => println!("Stopped after {} tick(s); run still in progress.", ticks),
    }
    if report.timed_out && report.outcome.is_some() {
        println!("Time is up as well.");
    }
}

fn append_transcript(path: &Path, report: &TickReport, signals: &[Signal]) {
    let timestamp = Utc::now().to_rfc3339();
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(err) = fs::create_dir_all(dir) {
            warn!("failed to create transcript dir {}: {}", dir.display(), err);
            return;
        }
    }

    let mut content = format!("[{}] tick={}\n", timestamp, report.tick);
    for signal in signals {
        content.push_str(&format!("  {}\n", signal));
    }
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| f.write_all(content.as_bytes()));
    if let Err(err) = result {
        warn!("failed to write transcript {}: {}", path.display(), err);
    }
}
