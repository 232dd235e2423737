//! Function-name resolver.
//!
//! Searches a compile unit's DIE tree for the deepest subprogram whose address
//! range covers the target, then pulls a presentable name off it.
//!
//! ## Name priority
//!
//! 1. `DW_AT_MIPS_linkage_name` (legacy, still emitted by some toolchains)
//! 2. `DW_AT_linkage_name`
//! 3. the same search on the `DW_AT_specification` target (out-of-line
//!    definitions of methods declared inside a class)
//! 4. the same search on the `DW_AT_abstract_origin` target (concrete
//!    out-of-line copies of inlined functions)
//! 5. `DW_AT_name`, which may be an unqualified method name
//!
//! Linkage names are demangled at presentation time; a name that no demangler
//! accepts is shown raw.

use std::fmt;

use gimli::constants;

use super::demangle::{make_symbol_name, plain_symbol_name, Demangled};
use super::tree::{is_subprogram, DieTree};
use crate::config::TraversalLimits;
use crate::error::{Result, SymbolicationError, TraversalLimit};
use crate::types::SymbolName;

/// A name as found in the tree, before any demangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionName<S>
{
    /// From a linkage-name attribute.
    Mangled(S),
    /// From `DW_AT_name`.
    Plain(S),
}

impl<S: AsRef<str>> FunctionName<S>
{
    pub(crate) fn to_symbol_name(&self) -> SymbolName
    {
        match self {
            FunctionName::Mangled(raw) => make_symbol_name(raw.as_ref()),
            FunctionName::Plain(name) => plain_symbol_name(name.as_ref()),
        }
    }
}

impl<S: AsRef<str>> fmt::Display for FunctionName<S>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            FunctionName::Mangled(raw) => write!(f, "{}", Demangled(raw.as_ref())),
            FunctionName::Plain(name) => f.write_str(name.as_ref()),
        }
    }
}

/// Find the function covering `address` below `unit_root` and name it.
///
/// Returns `Ok(None)` when no subprogram matches or the match has no name.
pub(crate) fn find_function<T: DieTree>(
    tree: &T,
    unit_root: &T::Die,
    address: u64,
    limits: &TraversalLimits,
) -> Result<Option<FunctionName<T::Str>>>
{
    let mut search = Search {
        tree,
        address,
        limits,
        visited: 0,
    };
    let Some(subprogram) = search.visit(unit_root, 0)? else {
        return Ok(None);
    };
    Ok(extract_name(tree, &subprogram, limits.max_reference_depth))
}

struct Search<'t, T>
{
    tree: &'t T,
    address: u64,
    limits: &'t TraversalLimits,
    visited: usize,
}

impl<T: DieTree> Search<'_, T>
{
    /// Depth-first: a covering subprogram among the children beats `die` itself.
    fn visit(&mut self, die: &T::Die, depth: usize) -> Result<Option<T::Die>>
    {
        if depth > self.limits.max_tree_depth {
            return Err(SymbolicationError::limit(TraversalLimit::TreeDepth, depth));
        }
        self.visited += 1;
        if self.visited > self.limits.max_dies_per_unit {
            return Err(SymbolicationError::limit(TraversalLimit::Dies, self.visited));
        }

        let mut child = self.tree.first_child(die);
        let mut children = 0usize;
        while let Some(current) = child {
            children += 1;
            if children > self.limits.max_children_per_level {
                return Err(SymbolicationError::limit(TraversalLimit::Children, children));
            }
            if let Some(found) = self.visit(&current, depth + 1)? {
                return Ok(Some(found));
            }
            child = self.tree.next_sibling(&current);
        }

        let accepted = is_subprogram(self.tree.tag(die)) && self.tree.contains(die, self.address);
        Ok(accepted.then(|| die.clone()))
    }
}

/// Apply the name priority to `die`, following at most `max_hops` references.
pub(crate) fn extract_name<T: DieTree>(tree: &T, die: &T::Die, max_hops: usize) -> Option<FunctionName<T::Str>>
{
    let linkage = tree
        .string_attr(die, constants::DW_AT_MIPS_linkage_name)
        .or_else(|| tree.string_attr(die, constants::DW_AT_linkage_name));
    if let Some(raw) = linkage {
        return Some(FunctionName::Mangled(raw));
    }

    if max_hops > 0 {
        for attr in [constants::DW_AT_specification, constants::DW_AT_abstract_origin] {
            if let Some(target) = tree.reference_attr(die, attr) {
                if let Some(name) = extract_name(tree, &target, max_hops - 1) {
                    return Some(name);
                }
            }
        }
    }

    tree.string_attr(die, constants::DW_AT_name).map(FunctionName::Plain)
}

#[cfg(test)]
mod tests
{
    use gimli::constants::*;

    use super::*;
    use crate::symbols::tree::synthetic::SyntheticTree;

    const MANGLED: &str = "_ZN4core3fmt5write17h0123456789abcdefE";

    fn small_limits() -> TraversalLimits
    {
        TraversalLimits {
            max_children_per_level: 64,
            max_tree_depth: 16,
            max_dies_per_unit: 1_000,
            ..TraversalLimits::default()
        }
    }

    /// compile unit [0x1000, 0x2000) holding two functions inside a namespace.
    fn unit_with_functions() -> (SyntheticTree, usize)
    {
        let mut tree = SyntheticTree::new();
        let cu = tree.add(DW_TAG_compile_unit);
        tree.set_range(cu, 0x1000, 0x2000);
        let ns = tree.add_child(cu, DW_TAG_namespace);
        let first = tree.add_child(ns, DW_TAG_subprogram);
        tree.set_range(first, 0x1000, 0x1400);
        tree.set_string(first, DW_AT_name, "first");
        let second = tree.add_child(ns, DW_TAG_subprogram);
        tree.set_range(second, 0x1400, 0x1800);
        tree.set_string(second, DW_AT_name, "second");
        (tree, cu)
    }

    #[test]
    fn test_finds_function_by_range()
    {
        let (tree, cu) = unit_with_functions();
        let name = find_function(&tree, &cu, 0x1500, &small_limits()).unwrap();
        assert_eq!(name, Some(FunctionName::Plain("second")));
    }

    #[test]
    fn test_address_outside_every_function()
    {
        let (tree, cu) = unit_with_functions();
        assert_eq!(find_function(&tree, &cu, 0x1900, &small_limits()).unwrap(), None);
    }

    #[test]
    fn test_deepest_subprogram_wins()
    {
        let mut tree = SyntheticTree::new();
        let cu = tree.add(DW_TAG_compile_unit);
        let outer = tree.add_child(cu, DW_TAG_subprogram);
        tree.set_range(outer, 0x100, 0x200);
        tree.set_string(outer, DW_AT_name, "outer");
        let block = tree.add_child(outer, DW_TAG_lexical_block);
        let inner = tree.add_child(block, DW_TAG_subprogram);
        tree.set_range(inner, 0x140, 0x160);
        tree.set_string(inner, DW_AT_name, "inner");

        let limits = small_limits();
        assert_eq!(find_function(&tree, &cu, 0x150, &limits).unwrap(), Some(FunctionName::Plain("inner")));
        assert_eq!(find_function(&tree, &cu, 0x110, &limits).unwrap(), Some(FunctionName::Plain("outer")));
    }

    #[test]
    fn test_wrong_tag_is_not_a_function()
    {
        let mut tree = SyntheticTree::new();
        let cu = tree.add(DW_TAG_compile_unit);
        let block = tree.add_child(cu, DW_TAG_lexical_block);
        tree.set_range(block, 0, 0x100);
        tree.set_string(block, DW_AT_name, "block");
        assert_eq!(find_function(&tree, &cu, 0x10, &small_limits()).unwrap(), None);
    }

    #[test]
    fn test_linkage_name_beats_plain_name()
    {
        let mut tree = SyntheticTree::new();
        let die = tree.add(DW_TAG_subprogram);
        tree.set_string(die, DW_AT_name, "write");
        tree.set_string(die, DW_AT_linkage_name, MANGLED);

        let name = extract_name(&tree, &die, 8).unwrap();
        assert_eq!(name, FunctionName::Mangled(MANGLED));
        assert_eq!(name.to_string(), "core::fmt::write");
        assert_eq!(name.to_symbol_name().display_name(), "core::fmt::write");
    }

    #[test]
    fn test_mips_linkage_name_checked_first()
    {
        let mut tree = SyntheticTree::new();
        let die = tree.add(DW_TAG_subprogram);
        tree.set_string(die, DW_AT_linkage_name, "_Z3barv");
        tree.set_string(die, DW_AT_MIPS_linkage_name, "_Z3foov");
        assert_eq!(extract_name(&tree, &die, 8), Some(FunctionName::Mangled("_Z3foov")));
    }

    #[test]
    fn test_name_recovered_through_specification()
    {
        let mut tree = SyntheticTree::new();
        let declaration = tree.add(DW_TAG_subprogram);
        tree.set_string(declaration, DW_AT_linkage_name, "_ZN6Widget4drawEv");
        let definition = tree.add(DW_TAG_subprogram);
        tree.set_reference(definition, DW_AT_specification, declaration);

        let name = extract_name(&tree, &definition, 8).unwrap();
        assert_eq!(name, FunctionName::Mangled("_ZN6Widget4drawEv"));
        assert_eq!(name.to_symbol_name().display_name(), "Widget::draw()");
    }

    #[test]
    fn test_name_recovered_through_abstract_origin()
    {
        let mut tree = SyntheticTree::new();
        let origin = tree.add(DW_TAG_subprogram);
        tree.set_string(origin, DW_AT_name, "helper");
        let concrete = tree.add(DW_TAG_subprogram);
        tree.set_reference(concrete, DW_AT_abstract_origin, origin);
        assert_eq!(extract_name(&tree, &concrete, 8), Some(FunctionName::Plain("helper")));
    }

    #[test]
    fn test_plain_name_is_last_resort()
    {
        let mut tree = SyntheticTree::new();
        let empty = tree.add(DW_TAG_subprogram);
        let die = tree.add(DW_TAG_subprogram);
        tree.set_string(die, DW_AT_name, "draw");
        tree.set_reference(die, DW_AT_specification, empty);
        assert_eq!(extract_name(&tree, &die, 8), Some(FunctionName::Plain("draw")));
    }

    #[test]
    fn test_reference_cycle_is_bounded()
    {
        let mut tree = SyntheticTree::new();
        let a = tree.add(DW_TAG_subprogram);
        let b = tree.add(DW_TAG_subprogram);
        tree.set_reference(a, DW_AT_specification, b);
        tree.set_reference(b, DW_AT_specification, a);
        assert_eq!(extract_name(&tree, &a, 8), None);
    }

    #[test]
    fn test_sibling_cycle_aborts_on_child_cap()
    {
        let mut tree = SyntheticTree::new();
        let cu = tree.add(DW_TAG_compile_unit);
        let looping = tree.add_child(cu, DW_TAG_variable);
        tree.set_next_sibling(looping, looping);

        let limits = small_limits();
        let err = find_function(&tree, &cu, 0x10, &limits).unwrap_err();
        assert!(matches!(
            err,
            SymbolicationError::LimitExceeded {
                limit: TraversalLimit::Children,
                ..
            }
        ));
        assert!(tree.steps() <= 2 * limits.max_children_per_level + 2);
    }

    #[test]
    fn test_child_cycle_aborts_on_depth_cap()
    {
        let mut tree = SyntheticTree::new();
        let cu = tree.add(DW_TAG_compile_unit);
        let node = tree.add_child(cu, DW_TAG_namespace);
        tree.set_first_child(node, cu);

        let limits = small_limits();
        let err = find_function(&tree, &cu, 0x10, &limits).unwrap_err();
        assert!(matches!(
            err,
            SymbolicationError::LimitExceeded {
                limit: TraversalLimit::TreeDepth,
                ..
            }
        ));
        assert!(tree.steps() <= 2 * (limits.max_tree_depth + 1));
    }

    #[test]
    fn test_oversized_tree_aborts_on_die_budget()
    {
        let mut tree = SyntheticTree::new();
        let cu = tree.add(DW_TAG_compile_unit);
        for _ in 0..50 {
            let ns = tree.add_child(cu, DW_TAG_namespace);
            for _ in 0..50 {
                tree.add_child(ns, DW_TAG_variable);
            }
        }

        let limits = small_limits();
        let err = find_function(&tree, &cu, 0x10, &limits).unwrap_err();
        assert!(matches!(
            err,
            SymbolicationError::LimitExceeded {
                limit: TraversalLimit::Dies,
                steps: 1_001
            }
        ));
    }
}
