//! Code generation settings.

use serde::{Deserialize, Serialize};

use crate::error::{CodegenError, CodegenResult};
use crate::types::{
    DEFAULT_DYNAMIC_MEMORY_CAPACITY, DEFAULT_STACK_CAPACITY, DEFAULT_ZERO_MEMORY_CAPACITY,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Capacity of the blob arena in octets.
    pub dynamic_memory_capacity: usize,
    /// Capacity of the fixed-layout arena in octets.
    pub zero_memory_capacity: usize,
    /// Per-function evaluation stack size in octets.
    pub stack_capacity: u32,
    /// Keep packing when a function body fails with a user error; the
    /// failed function is packed without opcodes and the error is
    /// reported as a warning.
    pub errors_as_warnings: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            dynamic_memory_capacity: DEFAULT_DYNAMIC_MEMORY_CAPACITY,
            zero_memory_capacity: DEFAULT_ZERO_MEMORY_CAPACITY,
            stack_capacity: DEFAULT_STACK_CAPACITY,
            errors_as_warnings: false,
        }
    }
}

impl CodegenConfig {
    /// Parse a (possibly partial) JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> CodegenResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CodegenError::Internal(format!("invalid codegen config: {e}")))
    }
}
