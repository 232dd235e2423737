//! Symbol and source location types.

use std::fmt;

use super::Address;
use crate::format::{FrameLine, MachineLine};

/// Programming language associated with a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    /// Rust symbol (detected via mangling or namespace patterns).
    Rust,
    /// C++ symbol (Itanium mangling without Rust extensions).
    Cpp,
    /// Unknown, unmangled, or mixed language.
    Unknown,
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolLanguage::Rust => "rust",
            SymbolLanguage::Cpp => "c++",
            SymbolLanguage::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// A function name with demangling metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    language: SymbolLanguage,
}

impl SymbolName
{
    /// Construct from a raw linkage or plain name.
    pub fn new(raw: String, demangled: Option<String>, language: SymbolLanguage) -> Self
    {
        Self {
            raw,
            demangled,
            language,
        }
    }

    /// Name exactly as it appears in the debug info.
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    /// Demangled human-friendly name if demangling succeeded.
    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// Preferred presentation (demangled, falling back to raw).
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }

    /// Language classification for the symbol.
    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.display_name())
    }
}

/// Source code location for a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation
{
    /// Path as recorded in the line table, directory-qualified when possible.
    pub file: String,
    /// Line number, if the matched row carried one.
    pub line: Option<u32>,
}

/// Everything known about one instruction address.
///
/// Each field is independently optional. `success` is `false` only when the
/// debug session itself is unavailable or the lookup hit a hard structural
/// failure; a frame with a module but no line is still a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo
{
    /// Address that was looked up, as supplied by the caller.
    pub address: Address,
    /// Path of the loaded image containing the address, verbatim from the loader.
    pub module: Option<String>,
    /// Function containing the address.
    pub function: Option<SymbolName>,
    /// Source file and line of the address.
    pub location: Option<SourceLocation>,
    /// Whether debug info was consulted. Decides how a missing function renders.
    pub debug_info: bool,
    pub success: bool,
}

impl SymbolInfo
{
    /// Empty result for `address`; every field unset.
    pub fn unresolved(address: Address, success: bool) -> Self
    {
        Self {
            address,
            module: None,
            function: None,
            location: None,
            debug_info: false,
            success,
        }
    }

    pub fn module_name(&self) -> Option<&str>
    {
        self.module.as_deref()
    }

    pub fn function_name(&self) -> Option<&str>
    {
        self.function.as_ref().map(SymbolName::display_name)
    }

    pub fn source_file(&self) -> Option<&str>
    {
        self.location.as_ref().map(|loc| loc.file.as_str())
    }

    pub fn line_number(&self) -> Option<u32>
    {
        self.location.as_ref().and_then(|loc| loc.line)
    }

    /// The human-readable stack-trace line for this frame.
    pub fn frame_line(&self) -> FrameLine<'_>
    {
        FrameLine {
            address: self.address,
            function: self.function.as_ref().map(|name| name as &dyn fmt::Display),
            file: self.location.as_ref().map(|loc| &loc.file as &dyn fmt::Display),
            line: self.line_number(),
            debug_info: self.debug_info,
        }
    }

    /// The `Module!Function` line for machine consumers, `\r\n`-terminated.
    pub fn machine_line(&self) -> MachineLine<'_>
    {
        MachineLine {
            module: self.module.as_ref().map(|module| module as &dyn fmt::Display),
            function: self.function.as_ref().map(|name| name as &dyn fmt::Display),
            file: self.location.as_ref().map(|loc| &loc.file as &dyn fmt::Display),
            line: self.line_number(),
        }
    }
}
