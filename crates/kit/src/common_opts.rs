//! Common CLI options shared across commands

use clap::Parser;
use std::fmt;

pub const DEFAULT_MEMORY_USER_STR: &str = "2046";

/// Memory size options
#[derive(Parser, Debug, Clone)]
pub struct MemoryOpts {
    #[clap(
        long,
        default_value = DEFAULT_MEMORY_USER_STR,
        help = "Memory size (e.g. 2G, 2048M, or plain number for MB)"
    )]
    pub memory: String,
}

impl Default for MemoryOpts {
    fn default() -> Self {
        Self {
            memory: DEFAULT_MEMORY_USER_STR.to_string(),
        }
    }
}

impl fmt::Display for MemoryOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.memory)
    }
}
