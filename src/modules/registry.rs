use std::collections::BTreeMap;

use crate::modules::block::{BlockDescriptor, Parameters};
use crate::modules::command::{ArithmeticOp, Command, Comparison, Condition, Direction};
use crate::modules::grid::Structure;
use crate::modules::program::ProgramBuildError;

/// Builds a command from a block's parameters, or explains what is wrong.
pub type Constructor = fn(&Parameters) -> Result<Command, String>;

#[derive(Clone, Copy, Debug)]
pub struct RegistryEntry {
    pub constructor: Constructor,
    pub required: &'static [&'static str],
}

/// Table from normalized block type tag to command constructor.
#[derive(Clone, Debug, Default)]
pub struct CommandRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

/// Strips every whitespace character and lowercases, so `"End If"`,
/// `"endif"` and `"end  if"` all map to `endif`.
pub fn normalize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in block type.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("move", &["direction"], build_move);
        registry.register("step", &["direction"], build_move);
        registry.register("pick up", &[], |_| Ok(Command::PickUp));
        registry.register("drop", &[], |_| Ok(Command::Drop));
        registry.register("add", &[], |p| build_arithmetic(ArithmeticOp::Add, p));
        registry.register("subtract", &[], |p| build_arithmetic(ArithmeticOp::Subtract, p));
        registry.register("multiply", &[], |p| build_arithmetic(ArithmeticOp::Multiply, p));
        registry.register("divide", &[], |p| build_arithmetic(ArithmeticOp::Divide, p));
        registry.register("if", &["direction", "condition"], build_if);
        registry.register("end if", &[], |_| Ok(Command::EndIf));
        registry
    }

    pub fn register(
        &mut self,
        tag: &str,
        required: &'static [&'static str],
        constructor: Constructor,
    ) {
        self.entries.insert(
            normalize_tag(tag),
            RegistryEntry {
                constructor,
                required,
            },
        );
    }

    pub fn tags(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(&normalize_tag(tag))
    }

    pub fn build(&self, descriptor: &BlockDescriptor) -> Result<Command, ProgramBuildError> {
        let key = normalize_tag(&descriptor.block_type);
        let entry = self
            .entries
            .get(&key)
            .ok_or_else(|| ProgramBuildError::UnknownBlockType {
                index: descriptor.index,
                block_type: descriptor.block_type.clone(),
            })?;

        let invalid = |reason: String| ProgramBuildError::InvalidParameters {
            index: descriptor.index,
            block_type: descriptor.block_type.clone(),
            reason,
        };

        let missing: Vec<&str> = entry
            .required
            .iter()
            .copied()
            .filter(|key| !descriptor.parameters.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!("missing parameter(s): {}", missing.join(", "))));
        }

        (entry.constructor)(&descriptor.parameters).map_err(invalid)
    }
}

fn required<'a>(params: &'a Parameters, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| format!("missing parameter: {}", key))
}

fn build_move(params: &Parameters) -> Result<Command, String> {
    let direction: Direction = required(params, "direction")?.parse()?;
    if direction == Direction::Here {
        return Err("move needs a direction other than here".into());
    }
    Ok(Command::Move { direction })
}

fn build_arithmetic(op: ArithmeticOp, params: &Parameters) -> Result<Command, String> {
    let direction = match params.get("direction") {
        Some(raw) => raw.parse()?,
        None => Direction::Here,
    };
    Ok(Command::Arithmetic { op, direction })
}

fn build_if(params: &Parameters) -> Result<Command, String> {
    let direction: Direction = required(params, "direction")?.parse()?;
    let raw = required(params, "condition")?;
    let condition = match normalize_tag(raw).as_str() {
        "block" | "datacube" => Condition::Block,
        "avatar" | "player" => Condition::Avatar,
        "empty" | "nothing" => Condition::Empty,
        "number" | "value" => {
            let comparison: Comparison = required(params, "comparison")?.parse()?;
            let value = required(params, "value")?
                .trim()
                .parse::<i32>()
                .map_err(|_| "value must be an integer".to_string())?;
            Condition::Number { comparison, value }
        }
        other => other
            .parse::<Structure>()
            .map(Condition::Structure)
            .map_err(|_| format!("unknown condition '{}'", raw.trim()))?,
    };
    Ok(Command::If {
        direction,
        condition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_whitespace_and_case_insensitive() {
        let registry = CommandRegistry::standard();
        assert_eq!(
            registry.build(&BlockDescriptor::new(1, "End If")),
            Ok(Command::EndIf)
        );
        assert_eq!(
            registry.build(&BlockDescriptor::new(2, " endif ")),
            Ok(Command::EndIf)
        );
        assert_eq!(
            registry.build(&BlockDescriptor::new(3, "PickUp")),
            Ok(Command::PickUp)
        );
        assert!(registry.contains("Sub tract"));
    }

    #[test]
    fn unknown_tag_reports_index_and_type() {
        let registry = CommandRegistry::standard();
        let err = registry
            .build(&BlockDescriptor::new(4, "teleport"))
            .unwrap_err();
        assert_eq!(
            err,
            ProgramBuildError::UnknownBlockType {
                index: 4,
                block_type: "teleport".into()
            }
        );
    }

    #[test]
    fn missing_parameters_are_rejected() {
        let registry = CommandRegistry::standard();
        let err = registry
            .build(&BlockDescriptor::new(5, "if").with_param("direction", "n"))
            .unwrap_err();
        let ProgramBuildError::InvalidParameters { index, reason, .. } = &err else {
            panic!("expected invalid parameters, got {err:?}");
        };
        assert_eq!(*index, 5);
        assert!(reason.contains("condition"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let registry = CommandRegistry::standard();
        for block in [
            BlockDescriptor::new(1, "move").with_param("direction", "sideways"),
            BlockDescriptor::new(2, "move").with_param("direction", "here"),
            BlockDescriptor::new(3, "add").with_param("direction", "??"),
            BlockDescriptor::new(4, "if")
                .with_param("direction", "e")
                .with_param("condition", "lava"),
            BlockDescriptor::new(5, "if")
                .with_param("direction", "e")
                .with_param("condition", "number")
                .with_param("comparison", ">"),
            BlockDescriptor::new(6, "if")
                .with_param("direction", "e")
                .with_param("condition", "number")
                .with_param("comparison", ">")
                .with_param("value", "ten"),
        ] {
            let result = registry.build(&block);
            assert!(
                matches!(result, Err(ProgramBuildError::InvalidParameters { .. })),
                "block {} should be invalid, got {:?}",
                block.index,
                result
            );
        }
    }

    #[test]
    fn builds_typed_commands() {
        let registry = CommandRegistry::standard();
        assert_eq!(
            registry.build(&BlockDescriptor::new(1, "step").with_param("direction", "ne")),
            Ok(Command::Move {
                direction: Direction::NorthEast
            })
        );
        assert_eq!(
            registry.build(&BlockDescriptor::new(2, "multiply").with_param("direction", "w")),
            Ok(Command::Arithmetic {
                op: ArithmeticOp::Multiply,
                direction: Direction::West
            })
        );
        assert_eq!(
            registry.build(
                &BlockDescriptor::new(3, "if")
                    .with_param("direction", "here")
                    .with_param("condition", "number")
                    .with_param("comparison", "<=")
                    .with_param("value", "-2")
            ),
            Ok(Command::If {
                direction: Direction::Here,
                condition: Condition::Number {
                    comparison: Comparison::Le,
                    value: -2
                }
            })
        );
        assert_eq!(
            registry.build(
                &BlockDescriptor::new(4, "if")
                    .with_param("direction", "s")
                    .with_param("condition", "Hole")
            ),
            Ok(Command::If {
                direction: Direction::South,
                condition: Condition::Structure(Structure::Hole)
            })
        );
    }

    #[test]
    fn custom_entries_can_be_registered() {
        let mut registry = CommandRegistry::new();
        registry.register("Wait", &[], |_| Ok(Command::EndIf));
        assert!(registry.contains("wait"));
        assert!(!registry.contains("move"));
    }
}
