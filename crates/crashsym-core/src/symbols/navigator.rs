//! Compile-unit navigation.
//!
//! There is no address index over `.debug_info`. The units are decoded once,
//! in section order, when the session opens; each lookup then walks them from
//! the first until it finds the unit whose range covers the address, and hands
//! that unit to the line-table and function-name resolvers. The walk itself
//! reads prebuilt data only.
//!
//! The walk position lives in a [`UnitCursor`] owned by the session. It is
//! rewound to the first unit when a walk ends, on every exit path, so the next
//! lookup always begins from a known state.

use gimli::Unit;
use tracing::{debug, trace};

use super::function::{find_function, FunctionName};
use super::image::{DwarfStr, Reader, ReaderDwarf};
use super::line_table::{find_line, LineLocation, LineTable};
use super::tree::{is_compile_unit, DieTree, GimliTree};
use crate::config::TraversalLimits;
use crate::error::{Result, SymbolicationError, TraversalLimit};

/// One compile unit, parsed with its abbreviations and line table.
#[derive(Debug)]
pub(crate) struct LoadedUnit
{
    unit: Unit<Reader>,
    lines: Option<LineTable>,
}

/// Every decodable compile unit of `.debug_info`, in section order.
pub(crate) struct CompileUnits
{
    units: Vec<LoadedUnit>,
    /// Set when a unit header failed to decode. Its length is unknown, so
    /// nothing after it could be read.
    truncated: Option<gimli::Error>,
}

impl CompileUnits
{
    /// Decode every unit. Units that fail to parse are left out.
    pub(crate) fn load(dwarf: &ReaderDwarf) -> Self
    {
        let mut units = Vec::new();
        let mut headers = dwarf.units();
        let truncated = loop {
            match headers.next() {
                Ok(Some(header)) => match dwarf.unit(header) {
                    Ok(mut unit) => {
                        let lines = unit.line_program.take().and_then(|program| match LineTable::new(program) {
                            Ok(table) => Some(table),
                            Err(err) => {
                                trace!("dropping undecodable line program: {err}");
                                None
                            }
                        });
                        units.push(LoadedUnit { unit, lines });
                    }
                    Err(err) => trace!("skipping unparsable unit: {err}"),
                },
                Ok(None) => break None,
                Err(err) => break Some(err),
            }
        };
        debug!(units = units.len(), truncated = truncated.is_some(), "decoded compile units");
        Self { units, truncated }
    }
}

/// Index of the next unit to visit.
#[derive(Debug, Default)]
pub(crate) struct UnitCursor
{
    next: usize,
}

impl UnitCursor
{
    pub(crate) fn new() -> Self
    {
        Self::default()
    }

    /// The unit at the cursor, stepping past it.
    ///
    /// `Ok(None)` once every unit has been visited, unless decoding stopped at
    /// a bad header: reaching that point is an error.
    fn next_unit<'u>(&mut self, units: &'u CompileUnits) -> Result<Option<&'u LoadedUnit>>
    {
        if let Some(unit) = units.units.get(self.next) {
            self.next += 1;
            return Ok(Some(unit));
        }
        match &units.truncated {
            Some(err) => Err(SymbolicationError::dwarf("reading .debug_info unit header", err.clone())),
            None => Ok(None),
        }
    }

    pub(crate) fn rewind(&mut self)
    {
        self.next = 0;
    }

    #[cfg(test)]
    pub(crate) fn is_at_start(&self) -> bool
    {
        self.next == 0
    }
}

/// Rewinds the borrowed cursor when dropped.
struct Rewind<'c>(&'c mut UnitCursor);

impl Drop for Rewind<'_>
{
    fn drop(&mut self)
    {
        self.0.rewind();
    }
}

/// Walk the top-level sibling chain until a compile-unit node turns up.
pub(crate) fn find_unit_root<T: DieTree>(tree: &T, limits: &TraversalLimits) -> Result<Option<T::Die>>
{
    let mut node = tree.root();
    let mut visited = 0usize;
    while let Some(current) = node {
        visited += 1;
        if visited > limits.max_siblings_per_level {
            return Err(SymbolicationError::limit(TraversalLimit::Siblings, visited));
        }
        if is_compile_unit(tree.tag(&current)) {
            return Ok(Some(current));
        }
        node = tree.next_sibling(&current);
    }
    Ok(None)
}

/// What the containing unit yielded. Either half may be missing.
#[derive(Debug)]
pub(crate) struct UnitMatch
{
    pub function: Option<FunctionName<DwarfStr>>,
    pub location: Option<LineLocation>,
    /// Why the line lookup gave up, if it hit a cap.
    pub line_error: Option<SymbolicationError>,
    /// Why the function search gave up, if it hit a cap.
    pub function_error: Option<SymbolicationError>,
}

/// Find the unit containing `address` (a file address) and resolve inside it.
///
/// Failures inside the matched unit are recorded on the returned
/// [`UnitMatch`] and leave the other half intact. Exceeding the unit or
/// sibling cap, or reaching an undecodable header, fails the whole lookup.
/// The cursor is rewound in every case.
pub(crate) fn resolve_in_units(
    dwarf: &ReaderDwarf,
    units: &CompileUnits,
    cursor: &mut UnitCursor,
    address: u64,
    limits: &TraversalLimits,
) -> Result<Option<UnitMatch>>
{
    let mut cursor = Rewind(cursor);
    let mut visited = 0usize;

    while let Some(loaded) = cursor.0.next_unit(units)? {
        visited += 1;
        if visited > limits.max_compile_units {
            return Err(SymbolicationError::limit(TraversalLimit::CompileUnits, visited));
        }

        let tree = GimliTree::new(dwarf, &loaded.unit);
        let Some(root) = find_unit_root(&tree, limits)? else {
            continue;
        };
        if !tree.contains(&root, address) {
            continue;
        }

        let (location, line_error) = match &loaded.lines {
            Some(table) => match find_line(dwarf, &loaded.unit, table, address, limits.max_line_rows) {
                Ok(location) => (location, None),
                Err(err) => (None, Some(err)),
            },
            None => (None, None),
        };
        let (function, function_error) = match find_function(&tree, &root, address, limits) {
            Ok(function) => (function, None),
            Err(err) => (None, Some(err)),
        };
        return Ok(Some(UnitMatch {
            function,
            location,
            line_error,
            function_error,
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests
{
    use gimli::constants::*;

    use super::*;
    use crate::symbols::tree::synthetic::SyntheticTree;

    #[test]
    fn test_unit_root_found_after_siblings()
    {
        let mut tree = SyntheticTree::new();
        let first = tree.add(DW_TAG_type_unit);
        let second = tree.add_sibling(first, DW_TAG_partial_unit);
        let cu = tree.add_sibling(second, DW_TAG_compile_unit);

        let root = find_unit_root(&tree, &TraversalLimits::default()).unwrap();
        assert_eq!(root, Some(cu));
    }

    #[test]
    fn test_unit_root_missing()
    {
        let mut tree = SyntheticTree::new();
        let first = tree.add(DW_TAG_type_unit);
        tree.add_sibling(first, DW_TAG_variable);
        assert_eq!(find_unit_root(&tree, &TraversalLimits::default()).unwrap(), None);

        let empty = SyntheticTree::new();
        assert_eq!(find_unit_root(&empty, &TraversalLimits::default()).unwrap(), None);
    }

    #[test]
    fn test_unit_root_sibling_cycle_aborts()
    {
        let mut tree = SyntheticTree::new();
        let first = tree.add(DW_TAG_type_unit);
        let second = tree.add_sibling(first, DW_TAG_type_unit);
        tree.set_next_sibling(second, first);

        let limits = TraversalLimits {
            max_siblings_per_level: 32,
            ..TraversalLimits::default()
        };
        let err = find_unit_root(&tree, &limits).unwrap_err();
        assert!(matches!(
            err,
            SymbolicationError::LimitExceeded {
                limit: TraversalLimit::Siblings,
                steps: 33
            }
        ));
        assert_eq!(tree.steps(), 32);
    }

    #[test]
    fn test_rewind_resets_cursor()
    {
        let mut cursor = UnitCursor::new();
        assert!(cursor.is_at_start());
        cursor.next = 3;
        assert!(!cursor.is_at_start());
        {
            let _guard = Rewind(&mut cursor);
        }
        assert!(cursor.is_at_start());
    }

    #[test]
    fn test_truncated_units_fail_at_the_bad_header()
    {
        let units = CompileUnits {
            units: Vec::new(),
            truncated: Some(gimli::Error::UnexpectedEof(gimli::ReaderOffsetId(0))),
        };
        let mut cursor = UnitCursor::new();
        let err = cursor.next_unit(&units).unwrap_err();
        assert!(matches!(err, SymbolicationError::Dwarf { .. }));

        let complete = CompileUnits {
            units: Vec::new(),
            truncated: None,
        };
        assert!(cursor.next_unit(&complete).unwrap().is_none());
    }
}
