//! DIE tree navigation seam.
//!
//! The navigator and the function-name resolver only ever need a handful of
//! questions answered about a debug-info tree: where is the root, what is a
//! node's first child and next sibling, what is its tag, does its address
//! range cover an address, and what string or reference does it carry for a
//! given attribute. [`DieTree`] captures exactly that, so the traversal logic
//! runs unchanged over real `gimli` units and over hand-built trees in tests.
//!
//! Node handles are plain offsets passed by value. Nothing has to be released;
//! dropping a handle on any early-exit path is all the cleanup there is.
//!
//! Every method swallows decode errors into "absent". A node whose attributes
//! cannot be parsed simply does not match.

use gimli::{constants, AttributeValue, DwAt, DwTag, Unit, UnitOffset};
use tracing::trace;

use super::image::{DwarfStr, Reader, ReaderDwarf};

pub(crate) trait DieTree
{
    type Die: Clone;
    type Str: AsRef<str>;

    /// The first entry of the unit.
    fn root(&self) -> Option<Self::Die>;

    fn first_child(&self, die: &Self::Die) -> Option<Self::Die>;

    fn next_sibling(&self, die: &Self::Die) -> Option<Self::Die>;

    fn tag(&self, die: &Self::Die) -> Option<DwTag>;

    /// Whether any of the node's address ranges covers `address`.
    ///
    /// Unparsable or missing ranges mean "does not contain".
    fn contains(&self, die: &Self::Die, address: u64) -> bool;

    fn string_attr(&self, die: &Self::Die, attr: DwAt) -> Option<Self::Str>;

    /// Follow a reference-class attribute to the node it names.
    fn reference_attr(&self, die: &Self::Die, attr: DwAt) -> Option<Self::Die>;
}

/// [`DieTree`] over one parsed `gimli` unit.
pub(crate) struct GimliTree<'a>
{
    dwarf: &'a ReaderDwarf,
    unit: &'a Unit<Reader>,
}

impl<'a> GimliTree<'a>
{
    pub(crate) fn new(dwarf: &'a ReaderDwarf, unit: &'a Unit<Reader>) -> Self
    {
        Self { dwarf, unit }
    }
}

impl DieTree for GimliTree<'_>
{
    type Die = UnitOffset;
    type Str = DwarfStr;

    fn root(&self) -> Option<UnitOffset>
    {
        let mut cursor = self.unit.entries();
        match cursor.next_dfs() {
            Ok(Some((_, entry))) => Some(entry.offset()),
            Ok(None) => None,
            Err(err) => {
                trace!("unreadable unit root: {err}");
                None
            }
        }
    }

    fn first_child(&self, die: &UnitOffset) -> Option<UnitOffset>
    {
        let mut cursor = self.unit.entries_at_offset(*die).ok()?;
        let has_children = match cursor.next_dfs() {
            Ok(Some((_, entry))) => entry.has_children(),
            _ => return None,
        };
        if !has_children {
            return None;
        }
        // A delta of exactly one is a real child; anything else means the
        // child list was empty and we walked past it.
        match cursor.next_dfs() {
            Ok(Some((1, child))) => Some(child.offset()),
            Ok(_) => None,
            Err(err) => {
                trace!("unreadable first child of {:#x}: {err}", die.0);
                None
            }
        }
    }

    fn next_sibling(&self, die: &UnitOffset) -> Option<UnitOffset>
    {
        let mut cursor = self.unit.entries_at_offset(*die).ok()?;
        cursor.next_entry().ok()??;
        match cursor.next_sibling() {
            Ok(Some(sibling)) => Some(sibling.offset()),
            Ok(None) => None,
            Err(err) => {
                trace!("unreadable sibling of {:#x}: {err}", die.0);
                None
            }
        }
    }

    fn tag(&self, die: &UnitOffset) -> Option<DwTag>
    {
        self.unit.entry(*die).ok().map(|entry| entry.tag())
    }

    fn contains(&self, die: &UnitOffset, address: u64) -> bool
    {
        let Ok(entry) = self.unit.entry(*die) else {
            return false;
        };
        let Ok(mut ranges) = self.dwarf.die_ranges(self.unit, &entry) else {
            return false;
        };
        loop {
            match ranges.next() {
                Ok(Some(range)) if range.begin <= address && address < range.end => return true,
                Ok(Some(_)) => {}
                Ok(None) => return false,
                Err(err) => {
                    trace!("unparsable ranges on {:#x}: {err}", die.0);
                    return false;
                }
            }
        }
    }

    fn string_attr(&self, die: &UnitOffset, attr: DwAt) -> Option<DwarfStr>
    {
        let entry = self.unit.entry(*die).ok()?;
        let value = entry.attr_value(attr).ok()??;
        DwarfStr::new(self.dwarf.attr_string(self.unit, value).ok()?)
    }

    fn reference_attr(&self, die: &UnitOffset, attr: DwAt) -> Option<UnitOffset>
    {
        let entry = self.unit.entry(*die).ok()?;
        match entry.attr_value(attr).ok()?? {
            AttributeValue::UnitRef(offset) => Some(offset),
            // Only references landing inside this unit can be followed.
            AttributeValue::DebugInfoRef(offset) => offset.to_unit_offset(&self.unit.header),
            _ => None,
        }
    }
}

/// Tags the traversal cares about.
pub(crate) fn is_compile_unit(tag: Option<DwTag>) -> bool
{
    tag == Some(constants::DW_TAG_compile_unit)
}

pub(crate) fn is_subprogram(tag: Option<DwTag>) -> bool
{
    tag == Some(constants::DW_TAG_subprogram)
}
