//! JSON level fixtures.
//!
//! A level file describes the grid layout, the avatars and blocks placed on
//! it, the goal/scoring configuration and the time limit. It may also embed
//! the block program to run, which is how the bundled demos are packaged.
//!
//! Layout rows use one character per tile: `.` floor, `#` wall, `o` hole.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::modules::block::BlockDescriptor;
use crate::modules::goal::GoalState;
use crate::modules::grid::{Avatar, Block, ElementId, GridWorld, Position, Structure, WorldError};

pub const DEFAULT_TIME_LIMIT: i64 = 300;

fn default_time_limit() -> i64 {
    DEFAULT_TIME_LIMIT
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to read level file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse level file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("level layout is empty")]
    EmptyLayout,
    #[error("unknown tile '{symbol}' at row {row}, column {col}")]
    UnknownTile { row: usize, col: usize, symbol: char },
    #[error(transparent)]
    World(#[from] WorldError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarSpec {
    pub id: ElementId,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSpec {
    pub id: ElementId,
    pub x: i32,
    pub y: i32,
    pub number: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelFile {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_time_limit")]
    pub time_limit: i64,
    pub layout: Vec<String>,
    #[serde(default)]
    pub avatars: Vec<AvatarSpec>,
    #[serde(default)]
    pub blocks: Vec<BlockSpec>,
    pub goal: GoalState,
    #[serde(default)]
    pub program: Vec<BlockDescriptor>,
}

/// A level ready to run: populated world plus its run configuration.
#[derive(Debug, Clone)]
pub struct Level {
    pub name: String,
    pub world: GridWorld,
    pub goal: GoalState,
    pub time_limit: i64,
    pub program: Vec<BlockDescriptor>,
}

impl LevelFile {
    pub fn into_level(self) -> Result<Level, LevelError> {
        let rows = self.layout.len();
        let cols = self
            .layout
            .iter()
            .map(|row| row.chars().count())
            .max()
            .unwrap_or(0);
        if rows == 0 || cols == 0 {
            return Err(LevelError::EmptyLayout);
        }

        let mut world = GridWorld::with_dimensions(rows as i32, cols as i32)?;
        for (x, row) in self.layout.iter().enumerate() {
            for (y, symbol) in row.chars().enumerate() {
                let structure = symbol
                    .to_string()
                    .parse::<Structure>()
                    .map_err(|_| LevelError::UnknownTile {
                        row: x,
                        col: y,
                        symbol,
                    })?;
                if structure != Structure::Floor {
                    world.set_structure(Position::new(x as i32, y as i32), structure)?;
                }
            }
        }

        for spec in &self.avatars {
            world.add_avatar(Avatar::new(spec.id, Position::new(spec.x, spec.y)))?;
        }
        for spec in &self.blocks {
            world.add_block(Block::new(spec.id, Position::new(spec.x, spec.y), spec.number))?;
        }

        debug!(
            name = %self.name,
            rows,
            cols,
            avatars = self.avatars.len(),
            blocks = self.blocks.len(),
            "level built"
        );
        Ok(Level {
            name: self.name,
            world,
            goal: self.goal,
            time_limit: self.time_limit,
            program: self.program,
        })
    }
}

pub fn parse_level(json: &str) -> Result<LevelFile, serde_json::Error> {
    serde_json::from_str(json)
}

pub fn load_level(path: &Path) -> Result<Level, LevelError> {
    let bytes = fs::read(path).map_err(|source| LevelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: LevelFile = serde_json::from_slice(&bytes).map_err(|source| LevelError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    file.into_level()
}
