//! Executable image reading and DWARF section loading.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection};

use super::navigator::CompileUnits;
use crate::error::{Result, SymbolicationError};

/// Reader type used for every DWARF walk: a window onto section bytes shared
/// through an `Arc`, so parsed units can be kept next to the bytes they read.
/// Cloning one bumps a reference count and never copies.
pub(crate) type Reader = EndianArcSlice<RunTimeEndian>;
pub(crate) type ReaderDwarf = Dwarf<Reader>;

const DWARF_SECTIONS: &[SectionId] = &[
    SectionId::DebugAbbrev,
    SectionId::DebugAddr,
    SectionId::DebugInfo,
    SectionId::DebugLine,
    SectionId::DebugLineStr,
    SectionId::DebugRanges,
    SectionId::DebugRngLists,
    SectionId::DebugStr,
    SectionId::DebugStrOffsets,
];

fn load_section_bytes(file: &object::File<'_>, name: &str) -> Result<Option<Arc<[u8]>>>
{
    let Some(section) = file.section_by_name(name) else {
        return Ok(None);
    };
    let data = section
        .uncompressed_data()
        .map_err(|err| SymbolicationError::Object(format!("failed to read {name}: {err}")))?;
    Ok(Some(match data {
        Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
        Cow::Owned(vec) => vec.into(),
    }))
}

/// The running executable's bytes plus what we learned from its headers.
///
/// This is the "image descriptor" half of a debug session. It does not hold
/// the file handle; the session owns that so it can close it last.
pub(crate) struct ExecutableImage
{
    path: PathBuf,
    endian: RunTimeEndian,
    data: Arc<[u8]>,
}

impl ExecutableImage
{
    /// Read the whole image from an already-open handle and validate its headers.
    pub(crate) fn read(file: &mut File, path: &Path) -> Result<Self>
    {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let data = Arc::<[u8]>::from(bytes);

        let parsed = object::File::parse(&*data)
            .map_err(|err| SymbolicationError::Object(format!("failed to parse {}: {err}", path.display())))?;
        let endian = if parsed.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        Ok(Self {
            path: path.to_path_buf(),
            endian,
            data,
        })
    }

    pub(crate) fn path(&self) -> &Path
    {
        &self.path
    }

    /// Copy the DWARF sections out of the image and decode its compile units.
    ///
    /// Compressed sections are inflated and unit abbreviations and line
    /// programs are parsed here, once, so that lookups only ever walk ready
    /// data. Fails when the image carries no `.debug_info`.
    pub(crate) fn load_debug_info(&self) -> Result<DebugInfo>
    {
        let parsed = object::File::parse(&*self.data)
            .map_err(|err| SymbolicationError::Object(format!("failed to parse {}: {err}", self.path.display())))?;

        let mut sections = HashMap::new();
        for id in DWARF_SECTIONS {
            if let Some(bytes) = load_section_bytes(&parsed, id.name())? {
                sections.insert(*id, bytes);
            }
        }

        let has_info = sections.get(&SectionId::DebugInfo).is_some_and(|bytes| !bytes.is_empty());
        if !has_info {
            return Err(SymbolicationError::Object(format!(
                "{} carries no .debug_info section",
                self.path.display()
            )));
        }

        let empty: Arc<[u8]> = Arc::from(Vec::new());
        let loaded: std::result::Result<ReaderDwarf, std::convert::Infallible> = Dwarf::load(|id| {
            let bytes = sections.get(&id).cloned().unwrap_or_else(|| Arc::clone(&empty));
            Ok(EndianArcSlice::new(bytes, self.endian))
        });
        let dwarf = match loaded {
            Ok(dwarf) => dwarf,
            Err(never) => match never {},
        };
        let units = CompileUnits::load(&dwarf);

        Ok(DebugInfo { units, dwarf })
    }
}

/// Parsed debug-info handle: the image's DWARF sections and every compile
/// unit in them, decoded once up front.
///
/// Field order is teardown order: the units, which share the section
/// buffers, go first.
pub(crate) struct DebugInfo
{
    units: CompileUnits,
    dwarf: ReaderDwarf,
}

impl DebugInfo
{
    pub(crate) fn dwarf(&self) -> &ReaderDwarf
    {
        &self.dwarf
    }

    pub(crate) fn units(&self) -> &CompileUnits
    {
        &self.units
    }
}

/// A string stored in a DWARF section, e.g. a linkage name or a file name.
///
/// Holds the section handle rather than a copy, so producing one during a
/// lookup does not allocate. Only valid, non-empty UTF-8 is ever wrapped.
#[derive(Clone)]
pub(crate) struct DwarfStr(Reader);

impl DwarfStr
{
    pub(crate) fn new(reader: Reader) -> Option<Self>
    {
        let valid = std::str::from_utf8(reader.bytes()).is_ok_and(|text| !text.is_empty());
        valid.then_some(Self(reader))
    }
}

impl AsRef<str> for DwarfStr
{
    fn as_ref(&self) -> &str
    {
        std::str::from_utf8(self.0.bytes()).unwrap_or_default()
    }
}

impl PartialEq for DwarfStr
{
    fn eq(&self, other: &Self) -> bool
    {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for DwarfStr {}

impl fmt::Display for DwarfStr
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_ref())
    }
}

impl fmt::Debug for DwarfStr
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Debug::fmt(self.as_ref(), f)
    }
}
