use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::modules::grid::{ElementId, GridWorld, Position, Structure};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Here,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction {
    /// Row/column delta. North decreases `x`, east increases `y`.
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Here => (0, 0),
            Direction::North => (-1, 0),
            Direction::South => (1, 0),
            Direction::East => (0, 1),
            Direction::West => (0, -1),
            Direction::NorthEast => (-1, 1),
            Direction::NorthWest => (-1, -1),
            Direction::SouthEast => (1, 1),
            Direction::SouthWest => (1, -1),
        }
    }

    pub const fn apply(self, position: Position) -> Position {
        let (dx, dy) = self.delta();
        position.offset(dx, dy)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Direction::Here => "here",
            Direction::North => "n",
            Direction::South => "s",
            Direction::East => "e",
            Direction::West => "w",
            Direction::NorthEast => "ne",
            Direction::NorthWest => "nw",
            Direction::SouthEast => "se",
            Direction::SouthWest => "sw",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "here" | "self" | "center" => Ok(Direction::Here),
            "n" | "north" | "up" => Ok(Direction::North),
            "s" | "south" | "down" => Ok(Direction::South),
            "e" | "east" | "right" => Ok(Direction::East),
            "w" | "west" | "left" => Ok(Direction::West),
            "ne" | "northeast" => Ok(Direction::NorthEast),
            "nw" | "northwest" => Ok(Direction::NorthWest),
            "se" | "southeast" => Ok(Direction::SouthEast),
            "sw" | "southwest" => Ok(Direction::SouthWest),
            _ => Err(format!("unknown direction '{}'", s.trim())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    /// Combines the held number with the tile number. `None` on overflow or
    /// division by zero.
    pub fn apply(self, held: i32, tile: i32) -> Option<i32> {
        match self {
            ArithmeticOp::Add => held.checked_add(tile),
            ArithmeticOp::Subtract => held.checked_sub(tile),
            ArithmeticOp::Multiply => held.checked_mul(tile),
            ArithmeticOp::Divide => held.checked_div(tile),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "==" | "=" | "eq" | "equals" => Ok(Comparison::Eq),
            "!=" | "<>" | "ne" => Ok(Comparison::Ne),
            "<" | "lt" => Ok(Comparison::Lt),
            "<=" | "le" => Ok(Comparison::Le),
            ">" | "gt" => Ok(Comparison::Gt),
            ">=" | "ge" => Ok(Comparison::Ge),
            other => Err(format!("unknown comparison '{}'", other)),
        }
    }
}

/// What an `If` block inspects on its target tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    Structure(Structure),
    Block,
    Avatar,
    Empty,
    Number { comparison: Comparison, value: i32 },
}

impl Condition {
    pub fn evaluate(self, world: &GridWorld, avatar_id: ElementId, target: Position) -> bool {
        let Some(tile) = world.tile(target) else {
            // Off-grid tiles read as walls.
            return matches!(self, Condition::Structure(Structure::Wall));
        };
        match self {
            Condition::Structure(structure) => tile.structure == structure,
            Condition::Block => world.block_on_tile(target).is_some(),
            Condition::Avatar => tile
                .occupants
                .iter()
                .any(|id| *id != avatar_id && world.avatar_by_id(*id).is_some()),
            Condition::Empty => {
                tile.structure.walkable()
                    && world.block_on_tile(target).is_none()
                    && world
                        .avatar_on_tile(target)
                        .is_none_or(|a| a.id == avatar_id)
            }
            Condition::Number { comparison, value } => world
                .block_on_tile(target)
                .is_some_and(|b| comparison.holds(b.number, value)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Structure(structure) => write!(f, "{}", structure),
            Condition::Block => write!(f, "block"),
            Condition::Avatar => write!(f, "avatar"),
            Condition::Empty => write!(f, "empty"),
            Condition::Number { comparison, value } => {
                write!(f, "number {} {}", comparison.symbol(), value)
            }
        }
    }
}

/// Executable program instruction. Commands hold validated parameters only;
/// every effect is applied to the `GridWorld` passed to [`Command::execute`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Move { direction: Direction },
    PickUp,
    Drop,
    Arithmetic { op: ArithmeticOp, direction: Direction },
    If { direction: Direction, condition: Condition },
    EndIf,
}

/// Control-flow result of executing one command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Next,
    /// Jump past the matching end-if.
    SkipBlock,
}

impl Command {
    pub const fn label(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::PickUp => "pick up",
            Command::Drop => "drop",
            Command::Arithmetic { op, .. } => op.label(),
            Command::If { .. } => "if",
            Command::EndIf => "end if",
        }
    }

    pub fn execute(&self, avatar_id: ElementId, world: &mut GridWorld) -> Flow {
        let Some(position) = world.avatar_by_id(avatar_id).map(|a| a.position) else {
            return Flow::Next;
        };
        match *self {
            Command::Move { direction } => {
                let to = direction.apply(position);
                if !world.move_avatar(avatar_id, to) {
                    debug!(avatar = avatar_id, %to, "move blocked");
                }
            }
            Command::PickUp => {
                if world.pick_up(avatar_id).is_none() {
                    debug!(avatar = avatar_id, %position, "nothing to pick up");
                }
            }
            Command::Drop => {
                if world.drop_held(avatar_id).is_none() {
                    debug!(avatar = avatar_id, %position, "drop refused");
                }
            }
            Command::Arithmetic { op, direction } => {
                apply_arithmetic(world, avatar_id, op, direction.apply(position));
            }
            Command::If {
                direction,
                condition,
            } => {
                if !condition.evaluate(world, avatar_id, direction.apply(position)) {
                    return Flow::SkipBlock;
                }
            }
            Command::EndIf => {}
        }
        Flow::Next
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move { direction } => write!(f, "move {}", direction),
            Command::Arithmetic { op, direction } => write!(f, "{} {}", op.label(), direction),
            Command::If {
                direction,
                condition,
            } => write!(f, "if {} is {}", direction, condition),
            other => write!(f, "{}", other.label()),
        }
    }
}

fn apply_arithmetic(
    world: &mut GridWorld,
    avatar_id: ElementId,
    op: ArithmeticOp,
    target: Position,
) {
    let Some(held_id) = world.avatar_by_id(avatar_id).and_then(|a| a.held_block) else {
        debug!(avatar = avatar_id, op = op.label(), "no block held");
        return;
    };
    let Some(held) = world.held_value(avatar_id) else {
        return;
    };
    let Some(tile) = world.block_on_tile(target).map(|b| b.number) else {
        debug!(avatar = avatar_id, op = op.label(), %target, "no operand block");
        return;
    };
    match op.apply(held, tile) {
        Some(result) => {
            world.set_block_number(held_id, result);
        }
        None => debug!(avatar = avatar_id, op = op.label(), held, tile, "arithmetic undefined"),
    }
}
