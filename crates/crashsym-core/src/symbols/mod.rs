//! # Symbols
//!
//! Reading the running executable's own DWARF back: the debug session that
//! owns it, compile-unit navigation, line tables, function names and module
//! paths.
//!
//! Everything here sits behind [`Symbolicator`](crate::Symbolicator); only the
//! session handle and the demangling adapter are public.

mod demangle;
mod function;
mod image;
mod line_table;
pub(crate) mod module;
mod navigator;
pub(crate) mod session;
mod tree;

pub use demangle::Demangled;
pub use session::{DebugSession, SessionStatus};
