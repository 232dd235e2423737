//! # crashsym-core
//!
//! Post-mortem symbolication for the running process.
//!
//! Given a raw instruction pointer captured during a stack walk, this crate
//! resolves it to a module, function name, source file and line by reading
//! the process's own executable image and its embedded DWARF on demand.
//!
//! - **Debug session**: one lazily opened, mutex-guarded handle on the image
//! - **Navigator**: compile-unit and DIE traversal with hard iteration caps
//! - **Line tables** and **function names** resolved inside the matching unit
//! - **Modules** resolved through the dynamic loader, with or without debug info
//! - **Formatting** into the fixed stack-trace layouts, with allocation-free
//!   variants for crash context
//!
//! ## Example
//!
//! ```rust,no_run
//! use crashsym_core::Symbolicator;
//!
//! #[inline(never)]
//! fn handler() {}
//!
//! let info = Symbolicator::global().get_info_for_address(handler as usize);
//! println!("{}", info.frame_line());
//! ```
//!
//! ## Why unsafe code is needed
//!
//! Module paths and the executable's load bias come from the dynamic loader
//! (`dladdr`, `dl_iterate_phdr`), which is only reachable through FFI.

#![allow(unsafe_code)] // Required for the dynamic-loader FFI in `symbols::module`

pub mod capture;
pub mod config;
pub mod error;
pub mod format;
pub mod symbolicator;
pub mod symbols;
pub mod types;

pub use capture::{BacktraceCapture, StackCapture};
pub use config::{SymbolicationConfig, TraversalLimits};
pub use error::{Result, SymbolicationError};
pub use format::{FrameBuffer, StackTraceBuffer, UNKNOWN, UNKNOWN_FUNCTION};
pub use symbolicator::Symbolicator;
pub use symbols::{DebugSession, SessionStatus};
pub use types::{Address, SymbolInfo};
