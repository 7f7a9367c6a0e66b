pub mod modules;

pub use modules::block::{self, BlockDescriptor, Parameters, load_program_file};
pub use modules::clock::{Clock, ManualClock, SystemClock};
pub use modules::command::{ArithmeticOp, Command, Comparison, Condition, Direction, Flow};
pub use modules::engine::{
    ExecutionEngine, ExecutionFault, LineUpdates, Outcome, Presenter, Signal, SignalLog,
    TickReport,
};
pub use modules::goal::{BlockTarget, GoalState};
pub use modules::grid::{
    Avatar, Block, ElementId, GridWorld, Position, Structure, Tile, WorldError,
};
pub use modules::level::{self, Level, LevelError, LevelFile, load_level};
pub use modules::program::{Program, ProgramBuildError, ProgramBuilder};
pub use modules::registry::{CommandRegistry, normalize_tag};
pub use modules::view::{WorldSnapshot, engine_snapshot, world_snapshot};
