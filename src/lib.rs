//! Compiler front-end for security event rules.
//!
//! Ingests YAML rules documents (rules, macros, lists, and version
//! requirements), validates and composes them across documents, lowers rule
//! exceptions into filter conditions, compiles each condition through an
//! external filter compiler, and drives a host engine's filter-builder API.
//! When the host later reports a match by rule identifier, the crate
//! attributes it back to the originating rule.
//!
//! The two external collaborators are abstract: [`RulesEngineHost`] owns
//! filter storage, field and format validity, and event delivery;
//! [`FilterCompiler`] owns the filter-expression grammar. Evaluating
//! filters, parsing the filter grammar, and persistence are out of scope.

mod compile;
mod describe;
mod events;
mod exceptions;
mod expand;
mod host;
mod loader;
mod ruleset;
mod source_map;
mod types;

pub use compile::{stamp_relational_nodes, walk_filter};
pub use events::{RuleMatch, RuleStats};
pub use exceptions::{LoweredExceptions, conjoin, lower_exceptions, paren_item, quote_item};
pub use host::{FilterBuilder, FilterCompiler, RelRhs, RulesEngineHost};
pub use ruleset::{LoadOptions, LoadReport, Ruleset};
pub use source_map::SourceMap;
pub use types::{
    BoolOp, COMPARISON_OPERATORS, Catalog, CompiledList, CompiledLists, CompiledMacro,
    CompiledMacros, DEFAULT_SOURCE, DispatchError, Exception, ExceptionValue, FilterArtifact,
    FilterError, FilterNode, InvalidPriority, ItemKind, LIST_OPERATORS, ListDef, LoadError,
    LoadErrorKind, LoadWarning, LoadWarningKind, MacroDef, Priority, RelOp, RuleDef, ScalarOrSeq,
    is_comparison_operator, is_list_operator,
};
