//! Symbol demangling utilities.
//!
//! This module turns linkage names pulled out of the DWARF tree back into
//! something a human can read, and guesses which language produced them.
//!
//! ## Symbol Mangling
//!
//! - **Rust**: legacy (`_ZN...E`) and v0 (`_R...`) schemes, via `rustc-demangle`
//! - **C++**: Itanium ABI (`_Z...`), via `cpp_demangle`
//! - **C**: unmangled, passed through as-is
//!
//! ## Allocation
//!
//! [`make_symbol_name`] allocates and may run the C++ demangler, which builds a
//! parse tree on the heap. [`Demangled`] is the crash-context variant: it
//! demangles Rust names straight into the output `fmt::Write` and otherwise
//! prints the raw name, never touching the allocator.

use std::fmt;

use cpp_demangle::{DemangleOptions as CppOptions, Symbol as CppSymbol};
use rustc_demangle::try_demangle;

use crate::types::{SymbolLanguage, SymbolName};

/// Create a `SymbolName` from a raw (possibly mangled) symbol string.
///
/// Tries the Rust demangler first, then the Itanium C++ one. On failure the
/// raw string stands in for the demangled form at display time.
pub(crate) fn make_symbol_name(raw: &str) -> SymbolName
{
    SymbolName::new(raw.to_owned(), demangle(raw), classify(raw))
}

/// Build a `SymbolName` for a plain `DW_AT_name`, which is never mangled.
pub(crate) fn plain_symbol_name(name: &str) -> SymbolName
{
    SymbolName::new(name.to_owned(), None, SymbolLanguage::Unknown)
}

/// Demangle `raw`, returning `None` when no demangler accepts it.
pub(crate) fn demangle(raw: &str) -> Option<String>
{
    if let Ok(demangled) = try_demangle(raw) {
        // `{:#}` drops the trailing `::h0123...` hash.
        return Some(format!("{demangled:#}"));
    }

    if !raw.starts_with("_Z") {
        return None;
    }

    let symbol = CppSymbol::new(raw).ok()?;
    symbol.demangle(&CppOptions::new()).ok()
}

/// Guess the source language from the shape of the mangled name.
pub(crate) fn classify(raw: &str) -> SymbolLanguage
{
    if raw.starts_with("_R") || (raw.starts_with("_ZN") && try_demangle(raw).is_ok()) || raw.contains("::") {
        SymbolLanguage::Rust
    } else if raw.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else {
        SymbolLanguage::Unknown
    }
}

/// Allocation-free display adapter for a raw linkage name.
///
/// Rust names are demangled on the fly; anything else prints verbatim.
#[derive(Debug, Clone, Copy)]
pub struct Demangled<'a>(pub &'a str);

impl fmt::Display for Demangled<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match try_demangle(self.0) {
            Ok(demangled) => write!(f, "{demangled:#}"),
            Err(_) => f.write_str(self.0),
        }
    }
}
