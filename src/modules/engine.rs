use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::modules::clock::Clock;
use crate::modules::command::Flow;
use crate::modules::goal::GoalState;
use crate::modules::grid::{ElementId, GridWorld, WorldError};
use crate::modules::program::Program;

pub type LineUpdates = BTreeMap<ElementId, usize>;

/// Internal invariant violations. A program built by `ProgramBuilder` and a
/// world whose counters only the engine touches never produce these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFault {
    #[error("avatar {avatar}: program counter {pc} outside 1..={finished}")]
    ProgramCounterOutOfRange {
        avatar: ElementId,
        pc: usize,
        finished: usize,
    },
    #[error("line {line}: if has no resolved end if")]
    UnresolvedJump { line: usize },
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Receives engine notifications as they happen. Every method defaults to a
/// no-op so presenters only implement what they display.
pub trait Presenter {
    fn on_line_update(&mut self, _lines: &LineUpdates) {}
    fn on_score_update(&mut self, _remaining: i64) {}
    fn on_win(&mut self, _remaining: i64, _line_bonus: i64, _time_bonus: i64) {}
    fn on_lose(&mut self) {}
    fn on_end_of_run(&mut self) {}
    fn on_timeout(&mut self) {}
    fn on_tick(&mut self, _remaining_seconds: i64) {}
}

impl Presenter for () {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    LineUpdate(LineUpdates),
    ScoreUpdate {
        remaining: i64,
    },
    Win {
        remaining: i64,
        line_bonus: i64,
        time_bonus: i64,
    },
    Lose,
    EndOfRun,
    Timeout,
    Tick {
        remaining_seconds: i64,
    },
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::LineUpdate(lines) => {
                let parts: Vec<String> = lines
                    .iter()
                    .map(|(avatar, line)| format!("#{}@{}", avatar, line))
                    .collect();
                write!(f, "lines [{}]", parts.join(" "))
            }
            Signal::ScoreUpdate { remaining } => write!(f, "budget {}", remaining),
            Signal::Win {
                remaining,
                line_bonus,
                time_bonus,
            } => write!(
                f,
                "win (budget left {}, line bonus {}, time bonus {})",
                remaining, line_bonus, time_bonus
            ),
            Signal::Lose => write!(f, "lose"),
            Signal::EndOfRun => write!(f, "end of run"),
            Signal::Timeout => write!(f, "timeout"),
            Signal::Tick { remaining_seconds } => write!(f, "time left {}s", remaining_seconds),
        }
    }
}

/// Presenter that records every notification in order.
#[derive(Debug, Default, Clone)]
pub struct SignalLog {
    pub signals: Vec<Signal>,
}

impl SignalLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.signals)
    }
}

impl Presenter for SignalLog {
    fn on_line_update(&mut self, lines: &LineUpdates) {
        self.signals.push(Signal::LineUpdate(lines.clone()));
    }

    fn on_score_update(&mut self, remaining: i64) {
        self.signals.push(Signal::ScoreUpdate { remaining });
    }

    fn on_win(&mut self, remaining: i64, line_bonus: i64, time_bonus: i64) {
        self.signals.push(Signal::Win {
            remaining,
            line_bonus,
            time_bonus,
        });
    }

    fn on_lose(&mut self) {
        self.signals.push(Signal::Lose);
    }

    fn on_end_of_run(&mut self) {
        self.signals.push(Signal::EndOfRun);
    }

    fn on_timeout(&mut self) {
        self.signals.push(Signal::Timeout);
    }

    fn on_tick(&mut self, remaining_seconds: i64) {
        self.signals.push(Signal::Tick { remaining_seconds });
    }
}

/// Terminal result of a tick, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Won {
        remaining: i64,
        line_bonus: i64,
        time_bonus: i64,
    },
    Lost,
    /// Every avatar ran off the end of the program without winning.
    Finished,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub line_updates: LineUpdates,
    pub outcome: Option<Outcome>,
    pub timed_out: bool,
    pub time_left: i64,
}

impl TickReport {
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some() || self.timed_out
    }
}

/// Turn-based interpreter running one shared [`Program`] on every avatar.
///
/// `tick` takes `&mut self`, so the single caller cannot interleave ticks.
pub struct ExecutionEngine {
    program: Program,
    world: GridWorld,
    goal: GoalState,
    time_limit: i64,
    clock: Box<dyn Clock>,
    score: i64,
    tick: u64,
}

impl ExecutionEngine {
    pub fn new(
        program: Program,
        world: GridWorld,
        goal: GoalState,
        time_limit: i64,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            program,
            world,
            goal,
            time_limit,
            clock,
            score: 0,
            tick: 0,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn goal(&self) -> &GoalState {
        &self.goal
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn time_limit(&self) -> i64 {
        self.time_limit
    }

    pub fn remaining_budget(&self) -> i64 {
        self.goal.num_of_commands - self.score
    }

    /// Whole seconds left before the time limit; negative once overrun.
    pub fn time_left(&self) -> i64 {
        let elapsed = i64::try_from(self.clock.elapsed().as_secs()).unwrap_or(i64::MAX);
        self.time_limit.saturating_sub(elapsed)
    }

    /// Rewinds score and every program counter for another run of the same
    /// program. Grid effects of the previous run are kept.
    pub fn reset_run(&mut self) {
        self.score = 0;
        self.world.reset_program_counters();
    }

    /// Swaps in a fresh world (e.g. the level's initial state) and rewinds.
    pub fn replace_world(&mut self, world: GridWorld) {
        self.world = world;
        self.reset_run();
    }

    /// Advances every avatar by at most one instruction, in insertion order,
    /// then samples the clock.
    pub fn tick(&mut self, presenter: &mut dyn Presenter) -> Result<TickReport, ExecutionFault> {
        self.tick += 1;
        let mut line_updates = LineUpdates::new();
        let mut outcome = None;
        let mut all_finished = true;

        for avatar_id in self.world.avatar_ids() {
            if self.step_avatar(avatar_id, &mut line_updates, presenter)? {
                all_finished = false;
            }

            if self.goal.check_game_ended(&self.world) {
                let remaining = self.remaining_budget();
                let (line_bonus, time_bonus) = self
                    .goal
                    .compute_final_score(self.program.len() as i64, self.time_left());
                info!(
                    tick = self.tick,
                    remaining, line_bonus, time_bonus, "goal reached"
                );
                presenter.on_win(remaining, line_bonus, time_bonus);
                self.score = 0;
                outcome = Some(Outcome::Won {
                    remaining,
                    line_bonus,
                    time_bonus,
                });
                break;
            }

            if self.remaining_budget() < 0 {
                info!(tick = self.tick, score = self.score, "command budget exhausted");
                presenter.on_score_update(0);
                presenter.on_lose();
                self.score = 0;
                outcome = Some(Outcome::Lost);
                break;
            }
        }

        presenter.on_line_update(&line_updates);

        if outcome.is_none() && all_finished {
            info!(tick = self.tick, "all avatars finished");
            presenter.on_end_of_run();
            self.score = 0;
            outcome = Some(Outcome::Finished);
        }

        let time_left = self.time_left();
        let timed_out = time_left <= 0;
        presenter.on_tick(time_left.max(0));
        if timed_out {
            info!(tick = self.tick, limit = self.time_limit, "time expired");
            presenter.on_timeout();
        }

        Ok(TickReport {
            tick: self.tick,
            line_updates,
            outcome,
            timed_out,
            time_left: time_left.max(0),
        })
    }

    /// Runs one instruction for the avatar. Returns false if it had already
    /// finished the program.
    fn step_avatar(
        &mut self,
        avatar_id: ElementId,
        line_updates: &mut LineUpdates,
        presenter: &mut dyn Presenter,
    ) -> Result<bool, ExecutionFault> {
        let Some(avatar) = self.world.avatar_by_id(avatar_id) else {
            return Ok(false);
        };
        let pc = avatar.program_counter;
        let finished = self.program.len() + 1;
        if pc == 0 || pc > finished {
            return Err(ExecutionFault::ProgramCounterOutOfRange {
                avatar: avatar_id,
                pc,
                finished,
            });
        }
        if pc == finished {
            return Ok(false);
        }

        line_updates.insert(avatar_id, pc);
        let command = *self
            .program
            .get(pc)
            .ok_or(ExecutionFault::ProgramCounterOutOfRange {
                avatar: avatar_id,
                pc,
                finished,
            })?;

        let next = match command.execute(avatar_id, &mut self.world) {
            Flow::Next => pc + 1,
            Flow::SkipBlock => {
                let end = self
                    .program
                    .jump_target(pc)
                    .ok_or(ExecutionFault::UnresolvedJump { line: pc })?;
                debug!(avatar = avatar_id, line = pc, to = end + 1, "condition false");
                end + 1
            }
        };
        self.world.set_program_counter(avatar_id, next)?;

        self.score += 1;
        trace!(avatar = avatar_id, line = pc, command = %command, score = self.score, "executed");
        presenter.on_score_update(self.remaining_budget());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::modules::block::BlockDescriptor;
    use crate::modules::clock::ManualClock;
    use crate::modules::grid::{Avatar, Position, Structure};
    use crate::modules::program::ProgramBuilder;
    use crate::modules::registry::CommandRegistry;

    fn program(blocks: &[BlockDescriptor]) -> Program {
        let registry = CommandRegistry::standard();
        ProgramBuilder::new(&registry).build(blocks).unwrap()
    }

    fn blocks(specs: &[&str]) -> Vec<BlockDescriptor> {
        specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let index = i as u32 + 1;
                let mut parts = spec.split_whitespace();
                match parts.next() {
                    Some("move") => BlockDescriptor::new(index, "move")
                        .with_param("direction", parts.next().unwrap_or("e")),
                    Some("if") => BlockDescriptor::new(index, "if")
                        .with_param("direction", parts.next().unwrap_or("e"))
                        .with_param("condition", parts.next().unwrap_or("wall")),
                    Some("endif") => BlockDescriptor::new(index, "end if"),
                    Some(other) => BlockDescriptor::new(index, other),
                    None => BlockDescriptor::new(index, "drop"),
                }
            })
            .collect()
    }

    fn lines(pairs: &[(ElementId, usize)]) -> LineUpdates {
        pairs.iter().copied().collect()
    }

    fn open_world(rows: i32, cols: i32, avatars: &[(ElementId, i32, i32)]) -> GridWorld {
        let mut world = GridWorld::with_dimensions(rows, cols).unwrap();
        for (id, x, y) in avatars {
            world.add_avatar(Avatar::new(*id, Position::new(*x, *y))).unwrap();
        }
        world
    }

    fn budget(num_of_commands: i64) -> GoalState {
        GoalState {
            ideal_time: 60,
            ideal_lines: 5,
            num_of_commands,
            ..GoalState::default()
        }
    }

    fn engine(
        specs: &[&str],
        world: GridWorld,
        goal: GoalState,
        time_limit: i64,
    ) -> (ExecutionEngine, ManualClock) {
        let clock = ManualClock::new();
        let engine = ExecutionEngine::new(
            program(&blocks(specs)),
            world,
            goal,
            time_limit,
            Box::new(clock.clone()),
        );
        (engine, clock)
    }

    #[test]
    fn straight_line_program_finishes_after_n_ticks() {
        let world = open_world(1, 5, &[(1, 0, 0)]);
        let (mut engine, _) = engine(&["move e", "move e", "move e"], world, budget(10), 300);

        for expected in 1..=3 {
            let report = engine.tick(&mut ()).unwrap();
            assert_eq!(report.outcome, None);
            assert_eq!(report.line_updates.get(&1), Some(&(expected as usize)));
            assert_eq!(engine.score(), expected);
        }
        assert_eq!(engine.world().avatar_by_id(1).unwrap().program_counter, 4);
        assert_eq!(engine.world().avatar_by_id(1).unwrap().position, Position::new(0, 3));

        let mut log = SignalLog::new();
        let report = engine.tick(&mut log).unwrap();
        assert_eq!(report.outcome, Some(Outcome::Finished));
        assert!(report.line_updates.is_empty());
        assert_eq!(engine.score(), 0);
        assert_eq!(
            log.signals,
            vec![
                Signal::LineUpdate(LineUpdates::new()),
                Signal::EndOfRun,
                Signal::Tick {
                    remaining_seconds: 300
                },
            ]
        );
    }

    #[test]
    fn each_instruction_reports_remaining_budget() {
        let world = open_world(1, 5, &[(1, 0, 0), (2, 0, 4)]);
        let (mut engine, _) = engine(&["move e"], world, budget(10), 300);
        let mut log = SignalLog::new();
        engine.tick(&mut log).unwrap();

        assert_eq!(
            log.signals,
            vec![
                Signal::ScoreUpdate { remaining: 9 },
                Signal::ScoreUpdate { remaining: 8 },
                Signal::LineUpdate(lines(&[(1, 1), (2, 1)])),
                Signal::Tick {
                    remaining_seconds: 300
                },
            ]
        );
    }

    #[test]
    fn win_reports_bonuses_and_resets_score() {
        let world = open_world(1, 3, &[(1, 0, 0)]);
        let goal = GoalState {
            ideal_time: 60,
            ideal_lines: 10,
            num_of_commands: 20,
            avatar_targets: vec![Position::new(0, 1)],
            block_targets: Vec::new(),
        };
        let specs = ["move e", "drop", "drop", "drop", "drop", "drop", "drop", "drop"];
        let (mut engine, clock) = engine(&specs, world, goal, 180);
        clock.set(Duration::from_secs(60));

        let mut log = SignalLog::new();
        let report = engine.tick(&mut log).unwrap();
        let win = Outcome::Won {
            remaining: 19,
            line_bonus: 20,
            time_bonus: 20,
        };
        assert_eq!(report.outcome, Some(win));
        assert!(!report.timed_out);
        assert_eq!(engine.score(), 0);
        assert!(log.signals.contains(&Signal::Win {
            remaining: 19,
            line_bonus: 20,
            time_bonus: 20
        }));
        assert!(!log.signals.contains(&Signal::EndOfRun));
    }

    #[test]
    fn late_win_still_reports_timeout() {
        let world = open_world(1, 2, &[(1, 0, 0)]);
        let goal = GoalState {
            ideal_lines: 1,
            num_of_commands: 10,
            avatar_targets: vec![Position::new(0, 1)],
            ..GoalState::default()
        };
        let (mut engine, clock) = engine(&["move e"], world, goal, 60);
        clock.set(Duration::from_secs(200));

        let mut log = SignalLog::new();
        let report = engine.tick(&mut log).unwrap();
        assert_eq!(
            report.outcome,
            Some(Outcome::Won {
                remaining: 9,
                line_bonus: 0,
                time_bonus: -20,
            })
        );
        assert!(report.timed_out);
        assert!(report.is_terminal());
        assert_eq!(report.time_left, 0);
        assert_eq!(
            &log.signals[log.signals.len() - 2..],
            &[
                Signal::Tick {
                    remaining_seconds: 0
                },
                Signal::Timeout
            ]
        );
        assert!(log.signals.contains(&Signal::Win {
            remaining: 9,
            line_bonus: 0,
            time_bonus: -20
        }));
    }

    #[test]
    fn win_stops_later_avatars_that_tick() {
        let world = open_world(2, 3, &[(1, 0, 0), (2, 1, 0)]);
        let goal = GoalState {
            num_of_commands: 20,
            avatar_targets: vec![Position::new(0, 1)],
            ..GoalState::default()
        };
        let (mut engine, _) = engine(&["move e"], world, goal, 180);
        let report = engine.tick(&mut ()).unwrap();

        assert!(matches!(report.outcome, Some(Outcome::Won { .. })));
        assert_eq!(report.line_updates.len(), 1);
        assert_eq!(engine.world().avatar_by_id(2).unwrap().position, Position::new(1, 0));
    }

    #[test]
    fn exceeding_budget_loses_on_that_tick() {
        let world = open_world(1, 5, &[(1, 0, 0)]);
        let (mut engine, _) = engine(&["move e", "move e", "move e"], world, budget(1), 300);

        let first = engine.tick(&mut ()).unwrap();
        assert_eq!(first.outcome, None);
        assert_eq!(engine.remaining_budget(), 0);

        let mut log = SignalLog::new();
        let second = engine.tick(&mut log).unwrap();
        assert_eq!(second.outcome, Some(Outcome::Lost));
        assert_eq!(engine.score(), 0);
        assert_eq!(
            &log.signals[..3],
            &[
                Signal::ScoreUpdate { remaining: -1 },
                Signal::ScoreUpdate { remaining: 0 },
                Signal::Lose,
            ]
        );
    }

    #[test]
    fn clock_past_limit_times_out() {
        let world = open_world(1, 5, &[(1, 0, 0)]);
        let (mut engine, clock) = engine(&["move e", "move e"], world, budget(10), 60);

        clock.set(Duration::from_secs(59));
        let report = engine.tick(&mut ()).unwrap();
        assert!(!report.timed_out);
        assert_eq!(report.time_left, 1);

        clock.set(Duration::from_secs(60));
        let mut log = SignalLog::new();
        let report = engine.tick(&mut log).unwrap();
        assert!(report.timed_out);
        assert_eq!(report.time_left, 0);
        assert_eq!(
            &log.signals[log.signals.len() - 2..],
            &[
                Signal::Tick {
                    remaining_seconds: 0
                },
                Signal::Timeout
            ]
        );
    }

    #[test]
    fn false_condition_skips_block_for_that_avatar_only() {
        let mut world = open_world(2, 3, &[(1, 0, 1), (2, 1, 0)]);
        world
            .set_structure(Position::new(0, 2), Structure::Wall)
            .unwrap();
        let specs = ["if e wall", "drop", "endif", "pickup"];
        let (mut engine, _) = engine(&specs, world, budget(20), 300);

        let first = engine.tick(&mut ()).unwrap();
        assert_eq!(first.line_updates, lines(&[(1, 1), (2, 1)]));
        assert_eq!(engine.world().avatar_by_id(1).unwrap().program_counter, 2);
        assert_eq!(engine.world().avatar_by_id(2).unwrap().program_counter, 4);
        assert_eq!(engine.score(), 2);

        let second = engine.tick(&mut ()).unwrap();
        assert_eq!(second.line_updates, lines(&[(1, 2), (2, 4)]));

        let third = engine.tick(&mut ()).unwrap();
        assert_eq!(third.line_updates, lines(&[(1, 3)]));
    }

    #[test]
    fn later_avatars_see_earlier_moves_in_same_tick() {
        let (mut ordered, _) = engine(
            &["move e"],
            open_world(1, 3, &[(1, 0, 0), (2, 0, 1)]),
            budget(10),
            300,
        );
        ordered.tick(&mut ()).unwrap();
        assert_eq!(ordered.world().avatar_by_id(1).unwrap().position, Position::new(0, 0));
        assert_eq!(ordered.world().avatar_by_id(2).unwrap().position, Position::new(0, 2));

        let (mut reversed, _) = engine(
            &["move e"],
            open_world(1, 3, &[(2, 0, 1), (1, 0, 0)]),
            budget(10),
            300,
        );
        reversed.tick(&mut ()).unwrap();
        assert_eq!(reversed.world().avatar_by_id(1).unwrap().position, Position::new(0, 1));
    }

    #[test]
    fn rerun_after_loss_replays_same_lines() {
        let mut initial = open_world(3, 3, &[(1, 0, 0), (2, 2, 2)]);
        initial
            .set_structure(Position::new(1, 0), Structure::Wall)
            .unwrap();
        let specs = ["if s wall", "move e", "endif", "move s", "move w"];
        let (mut engine, _) = engine(&specs, initial.clone(), budget(7), 300);

        let run = |engine: &mut ExecutionEngine| {
            let mut lines = Vec::new();
            loop {
                let report = engine.tick(&mut ()).unwrap();
                lines.push(report.line_updates.clone());
                if report.is_terminal() {
                    return (lines, report.outcome);
                }
            }
        };

        let (first, outcome) = run(&mut engine);
        assert_eq!(outcome, Some(Outcome::Lost));
        assert_eq!(engine.score(), 0);

        engine.replace_world(initial);
        let (second, outcome) = run(&mut engine);
        assert_eq!(outcome, Some(Outcome::Lost));
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_program_counter_is_a_fault() {
        let mut world = open_world(1, 2, &[]);
        let mut avatar = Avatar::new(1, Position::new(0, 0));
        avatar.program_counter = 9;
        world.add_avatar(avatar).unwrap();
        let (mut engine, _) = engine(&["move e"], world, budget(5), 60);

        assert_eq!(
            engine.tick(&mut ()),
            Err(ExecutionFault::ProgramCounterOutOfRange {
                avatar: 1,
                pc: 9,
                finished: 2
            })
        );
    }
}
