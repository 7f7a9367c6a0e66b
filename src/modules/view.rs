use serde::{Deserialize, Serialize};

use crate::modules::engine::ExecutionEngine;
use crate::modules::grid::{ElementId, GridWorld, Position, Structure};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarSnapshot {
    pub id: ElementId,
    pub position: Position,
    pub program_counter: usize,
    pub held_block: Option<ElementId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub id: ElementId,
    pub position: Position,
    pub number: i32,
    pub held: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureView {
    pub position: Position,
    pub structure: Structure,
}

/// Serializable picture of a world, handed to whatever draws it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub score: i64,
    pub remaining_budget: i64,
    pub rows: i32,
    pub cols: i32,
    pub avatars: Vec<AvatarSnapshot>,
    pub blocks: Vec<BlockSnapshot>,
    /// Non-floor tiles only.
    pub structures: Vec<StructureView>,
}

pub fn world_snapshot(world: &GridWorld) -> WorldSnapshot {
    let avatars = world
        .avatars()
        .iter()
        .map(|a| AvatarSnapshot {
            id: a.id,
            position: a.position,
            program_counter: a.program_counter,
            held_block: a.held_block,
        })
        .collect();

    let mut blocks: Vec<BlockSnapshot> = world
        .blocks()
        .iter()
        .map(|b| BlockSnapshot {
            id: b.id,
            position: b.position,
            number: b.number,
            held: b.held,
        })
        .collect();
    blocks.sort_by_key(|b| b.id);

    let mut structures = Vec::new();
    for x in 0..world.rows() {
        for y in 0..world.cols() {
            let position = Position::new(x, y);
            match world.structure(position) {
                Some(Structure::Floor) | None => {}
                Some(structure) => structures.push(StructureView {
                    position,
                    structure,
                }),
            }
        }
    }

    WorldSnapshot {
        tick: 0,
        score: 0,
        remaining_budget: 0,
        rows: world.rows(),
        cols: world.cols(),
        avatars,
        blocks,
        structures,
    }
}

pub fn engine_snapshot(engine: &ExecutionEngine) -> WorldSnapshot {
    WorldSnapshot {
        tick: engine.tick_count(),
        score: engine.score(),
        remaining_budget: engine.remaining_budget(),
        ..world_snapshot(engine.world())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::grid::{Avatar, Block};

    #[test]
    fn snapshot_lists_elements_and_non_floor_tiles() {
        let mut world = GridWorld::with_dimensions(2, 2).unwrap();
        world
            .set_structure(Position::new(1, 1), Structure::Hole)
            .unwrap();
        world.add_avatar(Avatar::new(4, Position::new(0, 0))).unwrap();
        world.add_block(Block::new(9, Position::new(0, 1), 3)).unwrap();
        world.add_block(Block::new(2, Position::new(1, 0), 8)).unwrap();

        let snapshot = world_snapshot(&world);
        assert_eq!(snapshot.avatars.len(), 1);
        assert_eq!(snapshot.avatars[0].program_counter, 1);
        assert_eq!(
            snapshot.blocks.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![2, 9]
        );
        assert_eq!(
            snapshot.structures,
            vec![StructureView {
                position: Position::new(1, 1),
                structure: Structure::Hole
            }]
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["structures"][0]["structure"], "hole");
    }
}
