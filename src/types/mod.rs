pub mod ast;
pub mod catalog;
pub mod defs;
pub mod error;
pub mod priority;

pub use ast::{
    BoolOp, COMPARISON_OPERATORS, FilterArtifact, FilterNode, LIST_OPERATORS, RelOp,
    is_comparison_operator, is_list_operator,
};
pub use catalog::{Catalog, CompiledList, CompiledLists, CompiledMacro, CompiledMacros};
pub use defs::{DEFAULT_SOURCE, Exception, ExceptionValue, ListDef, MacroDef, RuleDef, ScalarOrSeq};
pub use error::{
    DispatchError, FilterError, ItemKind, LoadError, LoadErrorKind, LoadWarning, LoadWarningKind,
};
pub use priority::{InvalidPriority, Priority};
