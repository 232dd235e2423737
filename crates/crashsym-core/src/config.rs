//! # Configuration
//!
//! The engine reads exactly one operator toggle: whether to parse debug info at
//! all. Everything else here is a tunable cap on how much corrupt input a single
//! lookup may chew through before giving up.
//!
//! ## Environment Variables
//!
//! - `CRASHSYM_NO_DEBUG_INFO`: `1`, `true` or `yes` skips DWARF parsing entirely
//!   (faster, address-only stack traces)

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable that disables debug-info parsing.
pub const NO_DEBUG_INFO_ENV: &str = "CRASHSYM_NO_DEBUG_INFO";

/// The process's own executable image on Linux.
pub const SELF_EXE_PATH: &str = "/proc/self/exe";

/// Compile-unit headers iterated per lookup.
pub const MAX_COMPILE_UNITS: usize = 16 * 1024 * 1024;
/// Line-number rows scanned per compile unit.
pub const MAX_LINE_ROWS: usize = 16 * 1024 * 1024;
/// Children visited below a single DIE.
pub const MAX_CHILDREN_PER_LEVEL: usize = 64 * 1024;
/// Siblings visited along a single sibling chain.
pub const MAX_SIBLINGS_PER_LEVEL: usize = 1024 * 1024;
/// Nesting depth of the DIE walk.
pub const MAX_TREE_DEPTH: usize = 256;
/// DIEs visited by one function-name search, across all levels.
pub const MAX_DIES_PER_UNIT: usize = 16 * 1024 * 1024;
/// Specification / abstract-origin hops followed while extracting a name.
pub const MAX_REFERENCE_DEPTH: usize = 8;

/// Iteration caps applied to every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits
{
    pub max_compile_units: usize,
    pub max_line_rows: usize,
    pub max_children_per_level: usize,
    pub max_siblings_per_level: usize,
    pub max_tree_depth: usize,
    pub max_dies_per_unit: usize,
    pub max_reference_depth: usize,
}

impl Default for TraversalLimits
{
    fn default() -> Self
    {
        Self {
            max_compile_units: MAX_COMPILE_UNITS,
            max_line_rows: MAX_LINE_ROWS,
            max_children_per_level: MAX_CHILDREN_PER_LEVEL,
            max_siblings_per_level: MAX_SIBLINGS_PER_LEVEL,
            max_tree_depth: MAX_TREE_DEPTH,
            max_dies_per_unit: MAX_DIES_PER_UNIT,
            max_reference_depth: MAX_REFERENCE_DEPTH,
        }
    }
}

/// Settings a [`DebugSession`](crate::symbols::DebugSession) is opened with.
///
/// Evaluated once, when the session initializes. Changing the environment
/// afterwards has no effect on an existing session.
///
/// The image read is always the running executable; callers cannot point a
/// session at another file, since lookups translate addresses with this
/// process's own load bias.
///
/// ```compile_fail
/// use crashsym_core::SymbolicationConfig;
///
/// let config = SymbolicationConfig {
///     executable: "/bin/true".into(),
///     ..SymbolicationConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SymbolicationConfig
{
    /// `false` skips DWARF parsing; lookups then report the module only.
    pub parse_debug_info: bool,
    /// Image to read debug info from. Always the running executable outside of tests.
    pub(crate) executable: PathBuf,
    /// Caps bounding the cost of malformed input.
    pub limits: TraversalLimits,
}

impl Default for SymbolicationConfig
{
    fn default() -> Self
    {
        Self {
            parse_debug_info: true,
            executable: PathBuf::from(SELF_EXE_PATH),
            limits: TraversalLimits::default(),
        }
    }
}

impl SymbolicationConfig
{
    /// Defaults, with the debug-info toggle read from `CRASHSYM_NO_DEBUG_INFO`.
    #[must_use]
    pub fn from_env() -> Self
    {
        let skip = env::var(NO_DEBUG_INFO_ENV).is_ok_and(|value| is_truthy(&value));
        Self {
            parse_debug_info: !skip,
            ..Self::default()
        }
    }

    /// Builder-style toggle for the debug-info switch.
    #[must_use]
    pub fn with_debug_info(mut self, parse: bool) -> Self
    {
        self.parse_debug_info = parse;
        self
    }

    /// The image the session reads.
    pub fn executable(&self) -> &Path
    {
        &self.executable
    }

    #[must_use]
    pub fn with_limits(mut self, limits: TraversalLimits) -> Self
    {
        self.limits = limits;
        self
    }
}

fn is_truthy(value: &str) -> bool
{
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
