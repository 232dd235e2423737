//! # Error Types
//!
//! Internal error currency for the symbolication engine.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages. None of these errors escape the public façade:
//! [`Symbolicator::get_info_for_address`](crate::Symbolicator::get_info_for_address)
//! absorbs every one of them into a well-formed [`SymbolInfo`](crate::types::SymbolInfo).
//! They exist so the layers below can use `?` and so that log lines say what
//! went wrong.

use thiserror::Error;

/// Which traversal cap was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalLimit
{
    /// Compile-unit headers iterated in a single lookup.
    CompileUnits,
    /// Line-number program rows scanned for a single unit.
    LineRows,
    /// Children visited below a single DIE.
    Children,
    /// Siblings visited along a single chain.
    Siblings,
    /// Nesting depth of the DIE walk.
    TreeDepth,
    /// DIEs visited by one function-name search.
    Dies,
}

impl std::fmt::Display for TraversalLimit
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let label = match self {
            TraversalLimit::CompileUnits => "compile units",
            TraversalLimit::LineRows => "line rows",
            TraversalLimit::Children => "children per level",
            TraversalLimit::Siblings => "siblings per level",
            TraversalLimit::TreeDepth => "tree depth",
            TraversalLimit::Dies => "DIEs in one unit",
        };
        write!(f, "{label}")
    }
}

/// Main error type for symbolication operations
///
/// ## Error Categories
///
/// 1. **Format errors**: `Object`, `Dwarf` (the image or its sections are malformed)
/// 2. **Runaway errors**: `LimitExceeded` (an iteration cap fired on corrupt input)
/// 3. **I/O errors**: `Io` (opening or reading the executable image)
#[derive(Error, Debug)]
pub enum SymbolicationError
{
    /// The executable image could not be parsed as an object file.
    #[error("Failed to parse executable image: {0}")]
    Object(String),

    /// A DWARF section or entry could not be decoded.
    ///
    /// The context string names the operation that was being performed,
    /// e.g. "reading .debug_info unit header".
    #[error("{context}: {source}")]
    Dwarf
    {
        /// What the engine was doing when decoding failed
        context: &'static str,
        /// Underlying decoder error
        #[source]
        source: gimli::Error,
    },

    /// An iteration cap fired before the walk completed.
    ///
    /// This is the timeout substitute for corrupt or cyclic input: the lookup
    /// for the current address is abandoned, later lookups are unaffected.
    #[error("Too many {limit} (aborted after {steps} steps)")]
    LimitExceeded
    {
        /// Which cap fired
        limit: TraversalLimit,
        /// Steps taken before aborting
        steps: usize,
    },

    /// I/O error while opening or reading the executable image.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SymbolicationError
{
    pub(crate) fn dwarf(context: &'static str, source: gimli::Error) -> Self
    {
        SymbolicationError::Dwarf { context, source }
    }

    pub(crate) fn limit(limit: TraversalLimit, steps: usize) -> Self
    {
        SymbolicationError::LimitExceeded { limit, steps }
    }
}

/// Convenience type alias for `Result<T, SymbolicationError>`
///
/// ```rust
/// use crashsym_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, SymbolicationError>;
