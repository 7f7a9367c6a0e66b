use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub type Parameters = BTreeMap<String, String>;

/// One authored command block as handed over by the block editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub index: u32,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl BlockDescriptor {
    pub fn new(index: u32, block_type: impl Into<String>) -> Self {
        Self {
            index,
            block_type: block_type.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// Reads a JSON array of block descriptors.
pub fn load_program_file(path: &Path) -> io::Result<Vec<BlockDescriptor>> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let blocks: Vec<BlockDescriptor> = serde_json::from_slice(&bytes).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to parse program file {}: {}", path.display(), e),
        )
    })?;
    Ok(blocks)
}
