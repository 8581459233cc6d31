//! Interfaces to the two external collaborators: the rules engine host that
//! owns filter storage and event delivery, and the filter compiler that
//! turns condition text into an AST.

use std::collections::BTreeSet;

use crate::types::ast::{BoolOp, FilterArtifact, FilterNode, RelOp};
use crate::types::catalog::{CompiledLists, CompiledMacros};
use crate::types::error::FilterError;

/// Right-hand side of a relational expression handed to the filter builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelRhs<'a> {
    /// Unary operators (`exists`) have no right-hand side.
    None,
    /// A single literal value.
    Value(&'a str),
    /// The harvested element values of a list operator.
    Values(&'a [String]),
}

/// Receives the stream of calls that encodes one rule's filter. Created by
/// the host per source, consumed by [`RulesEngineHost::add_filter`].
pub trait FilterBuilder {
    fn nest(&mut self) -> Result<(), FilterError>;
    fn unnest(&mut self) -> Result<(), FilterError>;
    fn bool_op(&mut self, op: BoolOp) -> Result<(), FilterError>;
    fn rel_expr(
        &mut self,
        field: &str,
        op: RelOp,
        rhs: RelRhs<'_>,
        check_id: u32,
    ) -> Result<(), FilterError>;
}

/// The native engine that owns parsers, filter storage, field and format
/// validity, and event delivery.
pub trait RulesEngineHost {
    type Parser: FilterBuilder;

    fn engine_version(&self) -> u64;

    fn is_source_valid(&self, source: &str) -> bool;

    fn is_defined_field(&self, source: &str, field: &str) -> bool;

    /// Validate an output template against the host's formatter.
    fn validate_format(&self, source: &str, template: &str) -> Result<(), FilterError>;

    /// Drop all filters registered by previous loads.
    fn clear_filters(&mut self);

    /// Create a fresh filter parser for one rule on the given source.
    fn create_parser(&mut self, source: &str) -> Self::Parser;

    /// Register the filter encoded into `parser`, returning the number of
    /// event types the filter narrows to.
    fn add_filter(
        &mut self,
        parser: Self::Parser,
        rule_name: &str,
        source: &str,
        tags: &BTreeSet<String>,
    ) -> usize;

    fn enable_rule(&mut self, rule_name: &str, enabled: bool);
}

/// The external compiler for the filter-expression sub-language.
///
/// Both operations receive the compiled macro and list tables mutably: the
/// compiler marks every entry it substitutes as used, which feeds the
/// dangling-definition warnings after compilation.
pub trait FilterCompiler {
    /// Compile a macro body into an AST fragment.
    fn compile_macro(
        &self,
        condition: &str,
        macros: &mut CompiledMacros,
        lists: &mut CompiledLists,
    ) -> Result<FilterNode, FilterError>;

    /// Compile a rule condition. The artifact records whether the text
    /// defined a rule filter or a macro.
    fn compile_filter(
        &self,
        name: &str,
        condition: &str,
        macros: &mut CompiledMacros,
        lists: &mut CompiledLists,
    ) -> Result<FilterArtifact, FilterError>;
}
