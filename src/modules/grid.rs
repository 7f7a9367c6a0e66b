use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ElementId = u32;

/// Grid coordinates. `x` indexes rows, `y` indexes columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Structure {
    #[default]
    Floor,
    Wall,
    Hole,
}

impl Structure {
    pub const fn label(self) -> &'static str {
        match self {
            Structure::Floor => "floor",
            Structure::Wall => "wall",
            Structure::Hole => "hole",
        }
    }

    /// Avatars may only stand on floor tiles.
    pub const fn walkable(self) -> bool {
        matches!(self, Structure::Floor)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Structure {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "floor" | "." => Ok(Structure::Floor),
            "wall" | "#" => Ok(Structure::Wall),
            "hole" | "o" => Ok(Structure::Hole),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tile {
    pub structure: Structure,
    pub occupants: BTreeSet<ElementId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Avatar {
    pub id: ElementId,
    pub position: Position,
    pub program_counter: usize,
    pub held_block: Option<ElementId>,
}

impl Avatar {
    pub fn new(id: ElementId, position: Position) -> Self {
        Self {
            id,
            position,
            program_counter: 1,
            held_block: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub id: ElementId,
    pub position: Position,
    pub number: i32,
    pub held: bool,
}

impl Block {
    pub fn new(id: ElementId, position: Position, number: i32) -> Self {
        Self {
            id,
            position,
            number,
            held: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("grid dimensions are already set")]
    AlreadySized,
    #[error("grid dimensions must be positive (got {rows}x{cols})")]
    InvalidDimensions { rows: i32, cols: i32 },
    #[error("position {0} is outside the grid")]
    OutOfBounds(Position),
    #[error("element {0} is already registered")]
    DuplicateElement(ElementId),
    #[error("avatar {0} not found")]
    AvatarNotFound(ElementId),
}

/// Mutable tile matrix holding every avatar, block and structure of a run.
///
/// Avatars and blocks share one id space. Their collections keep insertion
/// order, which is the order the engine steps avatars in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridWorld {
    rows: i32,
    cols: i32,
    tiles: Vec<Tile>,
    avatars: Vec<Avatar>,
    blocks: Vec<Block>,
}

impl GridWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(rows: i32, cols: i32) -> Result<Self, WorldError> {
        let mut world = Self::new();
        world.set_dimensions(rows, cols)?;
        Ok(world)
    }

    pub fn set_dimensions(&mut self, rows: i32, cols: i32) -> Result<(), WorldError> {
        if !self.tiles.is_empty() {
            return Err(WorldError::AlreadySized);
        }
        if rows <= 0 || cols <= 0 {
            return Err(WorldError::InvalidDimensions { rows, cols });
        }
        self.rows = rows;
        self.cols = cols;
        self.tiles = vec![Tile::default(); (rows as usize) * (cols as usize)];
        Ok(())
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn in_bounds(&self, position: Position) -> bool {
        position.x >= 0 && position.x < self.rows && position.y >= 0 && position.y < self.cols
    }

    fn index(&self, position: Position) -> Option<usize> {
        self.in_bounds(position)
            .then(|| (position.x as usize) * (self.cols as usize) + position.y as usize)
    }

    pub fn tile(&self, position: Position) -> Option<&Tile> {
        self.index(position).map(|idx| &self.tiles[idx])
    }

    fn tile_mut(&mut self, position: Position) -> Option<&mut Tile> {
        self.index(position).map(move |idx| &mut self.tiles[idx])
    }

    pub fn structure(&self, position: Position) -> Option<Structure> {
        self.tile(position).map(|t| t.structure)
    }

    pub fn set_structure(
        &mut self,
        position: Position,
        structure: Structure,
    ) -> Result<(), WorldError> {
        let tile = self
            .tile_mut(position)
            .ok_or(WorldError::OutOfBounds(position))?;
        tile.structure = structure;
        Ok(())
    }

    fn ensure_unregistered(&self, id: ElementId) -> Result<(), WorldError> {
        if self.avatars.iter().any(|a| a.id == id) || self.blocks.iter().any(|b| b.id == id) {
            return Err(WorldError::DuplicateElement(id));
        }
        Ok(())
    }

    pub fn add_avatar(&mut self, avatar: Avatar) -> Result<(), WorldError> {
        self.ensure_unregistered(avatar.id)?;
        let tile = self
            .tile_mut(avatar.position)
            .ok_or(WorldError::OutOfBounds(avatar.position))?;
        tile.occupants.insert(avatar.id);
        self.avatars.push(avatar);
        Ok(())
    }

    pub fn add_block(&mut self, block: Block) -> Result<(), WorldError> {
        self.ensure_unregistered(block.id)?;
        let tile = self
            .tile_mut(block.position)
            .ok_or(WorldError::OutOfBounds(block.position))?;
        tile.occupants.insert(block.id);
        self.blocks.push(block);
        Ok(())
    }

    pub fn avatars(&self) -> &[Avatar] {
        &self.avatars
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn avatar_ids(&self) -> Vec<ElementId> {
        self.avatars.iter().map(|a| a.id).collect()
    }

    pub fn avatar_by_id(&self, id: ElementId) -> Option<&Avatar> {
        self.avatars.iter().find(|a| a.id == id)
    }

    fn avatar_mut(&mut self, id: ElementId) -> Option<&mut Avatar> {
        self.avatars.iter_mut().find(|a| a.id == id)
    }

    pub fn block_by_id(&self, id: ElementId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    fn block_mut(&mut self, id: ElementId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn set_program_counter(&mut self, id: ElementId, pc: usize) -> Result<(), WorldError> {
        let avatar = self.avatar_mut(id).ok_or(WorldError::AvatarNotFound(id))?;
        avatar.program_counter = pc;
        Ok(())
    }

    pub fn reset_program_counters(&mut self) {
        for avatar in &mut self.avatars {
            avatar.program_counter = 1;
        }
    }

    /// First block resting (not carried) on the tile, lowest id wins.
    pub fn block_on_tile(&self, position: Position) -> Option<&Block> {
        let tile = self.tile(position)?;
        tile.occupants
            .iter()
            .filter_map(|id| self.block_by_id(*id))
            .find(|b| !b.held)
    }

    pub fn avatar_on_tile(&self, position: Position) -> Option<&Avatar> {
        let tile = self.tile(position)?;
        tile.occupants.iter().find_map(|id| self.avatar_by_id(*id))
    }

    /// Number carried by the avatar, if it holds a block.
    pub fn held_value(&self, avatar_id: ElementId) -> Option<i32> {
        let held = self.avatar_by_id(avatar_id)?.held_block?;
        self.block_by_id(held).map(|b| b.number)
    }

    pub fn set_block_number(&mut self, block_id: ElementId, number: i32) -> bool {
        match self.block_mut(block_id) {
            Some(block) => {
                block.number = number;
                true
            }
            None => false,
        }
    }

    /// Moves the avatar (and any carried block) onto `to` if it is a walkable
    /// tile not already occupied by another avatar. Returns whether it moved.
    pub fn move_avatar(&mut self, avatar_id: ElementId, to: Position) -> bool {
        let Some(avatar) = self.avatar_by_id(avatar_id) else {
            return false;
        };
        let from = avatar.position;
        let held = avatar.held_block;
        if !self.structure(to).is_some_and(Structure::walkable) {
            return false;
        }
        if self.avatar_on_tile(to).is_some_and(|other| other.id != avatar_id) {
            return false;
        }

        let mut moving = vec![avatar_id];
        moving.extend(held);
        for id in &moving {
            if let Some(tile) = self.tile_mut(from) {
                tile.occupants.remove(id);
            }
            if let Some(tile) = self.tile_mut(to) {
                tile.occupants.insert(*id);
            }
        }
        if let Some(avatar) = self.avatar_mut(avatar_id) {
            avatar.position = to;
        }
        if let Some(block) = held.and_then(|id| self.block_mut(id)) {
            block.position = to;
        }
        true
    }

    /// Lifts the resting block under the avatar. No-op when the avatar already
    /// carries something or the tile has no free block.
    pub fn pick_up(&mut self, avatar_id: ElementId) -> Option<ElementId> {
        let avatar = self.avatar_by_id(avatar_id)?;
        if avatar.held_block.is_some() {
            return None;
        }
        let block_id = self.block_on_tile(avatar.position)?.id;
        self.block_mut(block_id)?.held = true;
        self.avatar_mut(avatar_id)?.held_block = Some(block_id);
        Some(block_id)
    }

    /// Sets the carried block down. Refused when another block already rests
    /// on the tile.
    pub fn drop_held(&mut self, avatar_id: ElementId) -> Option<ElementId> {
        let avatar = self.avatar_by_id(avatar_id)?;
        let block_id = avatar.held_block?;
        if self.block_on_tile(avatar.position).is_some() {
            return None;
        }
        self.block_mut(block_id)?.held = false;
        self.avatar_mut(avatar_id)?.held_block = None;
        Some(block_id)
    }
}
