//! Line-table resolver.
//!
//! Picks the line-number row that best describes an address inside a compile
//! unit and recovers the source file it belongs to.
//!
//! ## Matching rule
//!
//! Rows are scanned in program order, remembering the previous one:
//!
//! - a row whose address equals the target wins immediately;
//! - otherwise, when `previous < target < current`, the *previous* row wins.
//!
//! A program holds one sequence per contiguous code range, closed by an
//! end-of-sequence row, and sequences come in no particular address order.
//! Brackets never span two sequences; the end row closes the bracket for the
//! sequence it ends and is never matched itself. An address in a gap between
//! sequences has no line.
//!
//! Past the end of the highest sequence, the last row of that sequence wins.
//! There is no upper-bound check, so an address in padding after a unit's
//! final row reports that final row's line.
//!
//! An address below every row has no line. Rows do not always repeat their file,
//! so the file is taken from the nearest row at or before the winner whose file
//! index actually resolves to a name. If none does, neither file nor line is
//! reported.

use std::fmt;

use gimli::{AttributeValue, CompleteLineProgram, IncompleteLineProgram, LineSequence, Unit};
use tracing::trace;

use super::image::{DwarfStr, Reader, ReaderDwarf};
use crate::error::{Result, SymbolicationError, TraversalLimit};

/// One row of a line-number program, reduced to what matching needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineRow
{
    pub address: u64,
    /// `0` when the row carries no source line.
    pub line: u32,
    pub file: u64,
    /// First address past a sequence; carries no location of its own.
    pub end_sequence: bool,
}

/// Winning row: its line plus the nearest resolvable file index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineMatch
{
    pub line: u32,
    pub file: u64,
}

/// A row together with the nearest resolvable file at that point of the scan.
type Located = (LineRow, Option<u64>);

/// Run the matching rule over `rows`.
///
/// `has_file` reports whether a file index resolves to a name. Scanning more
/// than `max_rows` rows aborts with [`TraversalLimit::LineRows`].
pub(crate) fn select_line<I, F>(rows: I, target: u64, max_rows: usize, mut has_file: F) -> Result<Option<LineMatch>>
where
    I: IntoIterator<Item = LineRow>,
    F: FnMut(u64) -> bool,
{
    let mut previous: Option<Located> = None;
    // Last row of the highest-ending sequence so far, keyed by the first
    // address it answers for past that end.
    let mut tail: Option<(u64, Located)> = None;
    let mut nearest_file: Option<u64> = None;

    for (scanned, row) in rows.into_iter().enumerate() {
        if scanned >= max_rows {
            return Err(SymbolicationError::limit(TraversalLimit::LineRows, scanned));
        }

        if row.end_sequence {
            if let Some((prev, prev_file)) = previous.take() {
                if prev.address < target && target < row.address {
                    return Ok(matched(prev.line, prev_file));
                }
                raise_tail(&mut tail, row.address, (prev, prev_file));
            }
            continue;
        }

        let file_here = if nearest_file == Some(row.file) || has_file(row.file) {
            Some(row.file)
        } else {
            nearest_file
        };

        if row.address == target {
            return Ok(matched(row.line, file_here));
        }
        if let Some((prev, prev_file)) = previous {
            if prev.address < target && target < row.address {
                return Ok(matched(prev.line, prev_file));
            }
        }

        nearest_file = file_here;
        previous = Some((row, file_here));
    }

    // A final sequence without an end row reaches just past its last row.
    if let Some(open) = previous {
        raise_tail(&mut tail, open.0.address.saturating_add(1), open);
    }

    Ok(match tail {
        Some((end, (row, file))) if target >= end => matched(row.line, file),
        _ => None,
    })
}

fn raise_tail(tail: &mut Option<(u64, Located)>, end: u64, row: Located)
{
    if tail.map_or(true, |(highest, _)| end >= highest) {
        *tail = Some((end, row));
    }
}

fn matched(line: u32, file: Option<u64>) -> Option<LineMatch>
{
    file.map(|file| LineMatch { line, file })
}

/// A unit's line-number program, decoded into address-sorted sequences.
///
/// Built when the session opens. Walking it afterwards reads rows straight
/// out of the section without copying the program header.
#[derive(Debug)]
pub(crate) struct LineTable
{
    program: CompleteLineProgram<Reader>,
    sequences: Vec<LineSequence<Reader>>,
}

impl LineTable
{
    pub(crate) fn new(program: IncompleteLineProgram<Reader>) -> std::result::Result<Self, gimli::Error>
    {
        let (program, sequences) = program.sequences()?;
        Ok(Self { program, sequences })
    }

    fn rows(&self) -> impl Iterator<Item = LineRow> + '_
    {
        self.sequences.iter().flat_map(|sequence| {
            let mut program_rows = self.program.resume_from(sequence);
            std::iter::from_fn(move || match program_rows.next_row() {
                Ok(Some((_, row))) => Some(LineRow {
                    address: row.address(),
                    line: row.line().map_or(0, |line| u32::try_from(line.get()).unwrap_or(u32::MAX)),
                    file: row.file_index(),
                    end_sequence: row.end_sequence(),
                }),
                Ok(None) => None,
                Err(err) => {
                    trace!("line sequence decode stopped early: {err}");
                    None
                }
            })
        })
    }
}

/// A source file as named by a line-program file entry.
///
/// Kept as section-backed parts so it can be printed without allocating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceFile
{
    pub directory: Option<DwarfStr>,
    pub name: DwarfStr,
}

impl fmt::Display for SourceFile
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = self.name.as_ref();
        match &self.directory {
            Some(dir) if !name.starts_with('/') => {
                f.write_str(dir.as_ref().trim_end_matches('/'))?;
                f.write_str("/")?;
                f.write_str(name)
            }
            _ => f.write_str(name),
        }
    }
}

/// Line and file found for an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineLocation
{
    pub file: SourceFile,
    /// `None` for rows that carry line 0 (compiler-generated code).
    pub line: Option<u32>,
}

/// Resolve `target` against `unit`'s decoded line table.
///
/// A sequence that fails to decode part-way contributes the rows read before
/// the failure. Only the row cap is an error.
pub(crate) fn find_line(
    dwarf: &ReaderDwarf,
    unit: &Unit<Reader>,
    table: &LineTable,
    target: u64,
    max_rows: usize,
) -> Result<Option<LineLocation>>
{
    let Some(found) = select_line(table.rows(), target, max_rows, |index| {
        source_file(dwarf, unit, &table.program, index).is_some()
    })?
    else {
        return Ok(None);
    };

    Ok(source_file(dwarf, unit, &table.program, found.file).map(|file| LineLocation {
        file,
        line: (found.line != 0).then_some(found.line),
    }))
}

fn source_file(
    dwarf: &ReaderDwarf,
    unit: &Unit<Reader>,
    program: &CompleteLineProgram<Reader>,
    index: u64,
) -> Option<SourceFile>
{
    let header = program.header();
    let entry = header.file(index)?;
    let name = attr_str(dwarf, unit, entry.path_name())?;
    let directory = entry.directory(header).and_then(|dir| attr_str(dwarf, unit, dir));
    Some(SourceFile { directory, name })
}

fn attr_str(dwarf: &ReaderDwarf, unit: &Unit<Reader>, value: AttributeValue<Reader>) -> Option<DwarfStr>
{
    DwarfStr::new(dwarf.attr_string(unit, value).ok()?)
}
