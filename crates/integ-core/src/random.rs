//! Random values for unique resource naming and port allocation.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, OnceLock};

pub const STACK_PREFIX_BASE: &str = "cdktest";
const RANDOM_STRING_LEN: usize = 10;

/// Uniform integer in `[min, max)`. Returns `min` for an empty range.
pub fn random_integer(min: u32, max: u32) -> u32 {
    if min >= max {
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

/// Lowercase alphanumeric string, safe inside stack names and directory names.
pub fn random_string() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_STRING_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// A prefix with its first `-` removed, as it appears in nested-stack asset
/// file names (logical ids cannot contain dashes).
pub fn compact_prefix(prefix: &str) -> String {
    prefix.replacen('-', "", 1)
}

// ---------------------------------------------------------------------------
// StackPrefix
// ---------------------------------------------------------------------------

static LIVE_PREFIXES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

fn live_prefixes() -> &'static Mutex<HashSet<String>> {
    LIVE_PREFIXES.get_or_init(|| Mutex::new(HashSet::new()))
}

/// A stack-name prefix reserved for the lifetime of one fixture.
///
/// No two live `StackPrefix` values in the same process share a value; the
/// reservation is released on drop.
#[derive(Debug)]
pub struct StackPrefix {
    value: String,
}

impl StackPrefix {
    pub fn allocate() -> Self {
        let mut live = live_prefixes()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            let candidate = format!("{STACK_PREFIX_BASE}-{}", random_string());
            if live.insert(candidate.clone()) {
                tracing::debug!(prefix = %candidate, "allocated stack prefix");
                return Self { value: candidate };
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// `<prefix>-<stack>`
    pub fn full_stack_name(&self, stack: &str) -> String {
        format!("{}-{stack}", self.value)
    }

    /// See [`compact_prefix`].
    pub fn compact(&self) -> String {
        compact_prefix(&self.value)
    }

    pub fn is_live(value: &str) -> bool {
        live_prefixes()
            .lock()
            .map(|live| live.contains(value))
            .unwrap_or(false)
    }
}

impl fmt::Display for StackPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl Drop for StackPrefix {
    fn drop(&mut self) {
        if let Ok(mut live) = live_prefixes().lock() {
            live.remove(&self.value);
        }
    }
}
