use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::modules::block::BlockDescriptor;
use crate::modules::command::Command;
use crate::modules::registry::CommandRegistry;

/// Errors raised while compiling block descriptors into a [`Program`].
///
/// Every variant names the offending block index so the editor can point at
/// it. A program that failed to build must not be run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramBuildError {
    #[error("block {index}: unknown block type '{block_type}'")]
    UnknownBlockType { index: u32, block_type: String },

    #[error("block {index} ({block_type}): {reason}")]
    InvalidParameters {
        index: u32,
        block_type: String,
        reason: String,
    },

    #[error("block {index}: if has no matching end if")]
    UnmatchedIf { index: u32 },

    #[error("block {index}: end if has no matching if")]
    UnmatchedEndIf { index: u32 },
}

/// Compiled, immutable instruction sequence.
///
/// Lines are 1-based: line `n` is `sequence[n - 1]`, and `len() + 1` is the
/// "finished" program counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    sequence: Vec<Command>,
    jump_table: BTreeMap<usize, usize>,
    end_command_lines: Vec<usize>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn get(&self, line: usize) -> Option<&Command> {
        line.checked_sub(1).and_then(|idx| self.sequence.get(idx))
    }

    pub fn commands(&self) -> &[Command] {
        &self.sequence
    }

    /// Matching end-if line for the if at `line`.
    pub fn jump_target(&self, line: usize) -> Option<usize> {
        self.jump_table.get(&line).copied()
    }

    pub fn jump_table(&self) -> &BTreeMap<usize, usize> {
        &self.jump_table
    }

    pub fn end_command_lines(&self) -> &[usize] {
        &self.end_command_lines
    }
}

pub struct ProgramBuilder<'a> {
    registry: &'a CommandRegistry,
}

impl<'a> ProgramBuilder<'a> {
    pub fn new(registry: &'a CommandRegistry) -> Self {
        Self { registry }
    }

    /// Compiles descriptors in ascending index order, pairing each end-if with
    /// the most recently opened if.
    pub fn build(&self, descriptors: &[BlockDescriptor]) -> Result<Program, ProgramBuildError> {
        let mut ordered: Vec<&BlockDescriptor> = descriptors.iter().collect();
        ordered.sort_by_key(|d| d.index);

        let mut sequence = Vec::with_capacity(ordered.len());
        let mut jump_table = BTreeMap::new();
        let mut end_command_lines = Vec::new();
        let mut open_ifs: Vec<(usize, u32)> = Vec::new();

        for (offset, descriptor) in ordered.iter().enumerate() {
            let line = offset + 1;
            let command = self.registry.build(descriptor)?;
            match command {
                Command::If { .. } => open_ifs.push((line, descriptor.index)),
                Command::EndIf => {
                    let (if_line, _) = open_ifs.pop().ok_or(ProgramBuildError::UnmatchedEndIf {
                        index: descriptor.index,
                    })?;
                    jump_table.insert(if_line, line);
                    end_command_lines.push(line);
                }
                _ => {}
            }
            sequence.push(command);
        }

        if let Some((_, index)) = open_ifs.pop() {
            return Err(ProgramBuildError::UnmatchedIf { index });
        }

        debug!(
            lines = sequence.len(),
            branches = jump_table.len(),
            "program built"
        );
        Ok(Program {
            sequence,
            jump_table,
            end_command_lines,
        })
    }
}
