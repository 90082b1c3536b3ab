//!
//! Key selection strategies.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/* --- types ----------------------------------------------------------------------------------- */

///
/// How the scheduler picks a key from the available set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Persisted cursor over the eligible keys in id order
    #[default]
    #[serde(alias = "round-robin")]
    RoundRobin,
    /// Key with the fewest total requests
    #[serde(alias = "least-used")]
    LeastUsed,
    /// Uniform random pick
    Random,
}

/* --- implementations --------------------------------------------------------------------- */

impl SelectionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionStrategy::RoundRobin => "round_robin",
            SelectionStrategy::LeastUsed => "least_used",
            SelectionStrategy::Random => "random",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Ok(SelectionStrategy::RoundRobin),
            "least_used" | "leastused" => Ok(SelectionStrategy::LeastUsed),
            "random" => Ok(SelectionStrategy::Random),
            _ => Err(format!(
                "unknown selection strategy '{}' (expected round_robin, least_used or random)",
                s
            )),
        }
    }
}

/* --- tests ------------------------------------------------------------------------------- */
