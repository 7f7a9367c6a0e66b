use serde::{Deserialize, Serialize};

use crate::modules::grid::{GridWorld, Position};

/// Multiplier applied to both line and time bonuses.
pub const SCORING_FACTOR: i64 = 10;
/// Seconds of remaining time worth one time-bonus step.
pub const SECONDS_PER_BONUS_STEP: i64 = 60;

/// A tile that must hold a resting block showing `number` when the level ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTarget {
    pub position: Position,
    pub number: i32,
}

/// Win predicate and bonus-scoring configuration for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalState {
    pub ideal_time: i64,
    pub ideal_lines: i64,
    /// Instruction budget; executing more than this many loses the run.
    pub num_of_commands: i64,
    #[serde(default)]
    pub avatar_targets: Vec<Position>,
    #[serde(default)]
    pub block_targets: Vec<BlockTarget>,
}

impl GoalState {
    pub fn has_targets(&self) -> bool {
        !self.avatar_targets.is_empty() || !self.block_targets.is_empty()
    }

    /// True once every configured target is satisfied. A goal without targets
    /// never ends the game.
    pub fn check_game_ended(&self, world: &GridWorld) -> bool {
        if !self.has_targets() {
            return false;
        }
        let avatars_placed = self
            .avatar_targets
            .iter()
            .all(|target| world.avatar_on_tile(*target).is_some());
        let blocks_placed = self.block_targets.iter().all(|target| {
            world
                .block_on_tile(target.position)
                .is_some_and(|b| b.number == target.number)
        });
        avatars_placed && blocks_placed
    }

    /// `(line_bonus, time_bonus)`. Either may be negative when the player went
    /// over the ideal.
    pub fn compute_final_score(&self, actual_lines: i64, time_left: i64) -> (i64, i64) {
        let line_bonus = (self.ideal_lines - actual_lines) * SCORING_FACTOR;
        let time_bonus = (time_left / SECONDS_PER_BONUS_STEP) * SCORING_FACTOR;
        (line_bonus, time_bonus)
    }
}
