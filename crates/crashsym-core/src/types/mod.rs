//! # Types
//!
//! Plain data passed across the engine's public surface: addresses going in,
//! symbol information coming out.

pub mod address;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use symbols::{SourceLocation, SymbolInfo, SymbolLanguage, SymbolName};
