use std::collections::BTreeSet;

use super::priority::Priority;

/// A YAML field that may be written either as a single scalar or as a
/// sequence. Exception `fields` and `comps` take this shape; the lowerer and
/// the validators dispatch on the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarOrSeq<T> {
    Scalar(T),
    Seq(Vec<T>),
}

impl<T> ScalarOrSeq<T> {
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, ScalarOrSeq::Scalar(_))
    }
}

/// One element of an exception's `values` sequence.
///
/// For single-field exceptions each element must be a scalar. For
/// multi-field exceptions each element is a tuple matching `fields` in
/// length, and each tuple slot is itself a scalar or a nested sequence of
/// scalars (the latter for list-valued comparisons).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionValue {
    Scalar(String),
    Seq(Vec<ExceptionValue>),
}

/// A named sequence of literal strings. Lists may reference other lists by
/// name; references are resolved during expansion.
#[derive(Debug, Clone)]
pub struct ListDef {
    pub name: String,
    pub items: Vec<String>,
    /// Original YAML slice, kept for diagnostic rendering.
    pub context: String,
}

/// A named filter sub-expression that rules reference by name.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub condition: String,
    pub source: String,
    pub context: String,
}

/// A declarative exception attached to a rule. Lowered into a negated
/// boolean fragment conjoined onto the rule condition at compile time.
#[derive(Debug, Clone)]
pub struct Exception {
    /// Unique within the owning rule.
    pub name: String,
    pub fields: ScalarOrSeq<String>,
    pub comps: ScalarOrSeq<String>,
    pub values: Vec<ExceptionValue>,
    pub context: String,
}

/// A named filter expression with a priority, an output template, and
/// optional exceptions.
#[derive(Debug, Clone)]
pub struct RuleDef {
    pub name: String,
    pub condition: String,
    pub output: String,
    pub desc: String,
    /// Priority exactly as written in the document.
    pub priority: String,
    pub priority_num: Priority,
    pub source: String,
    pub tags: BTreeSet<String>,
    pub exceptions: Vec<Exception>,
    pub enabled: bool,
    pub skip_if_unknown_filter: bool,
    pub warn_evttypes: bool,
    pub context: String,
    /// Condition with lowered exceptions conjoined; set during compilation.
    pub compile_condition: String,
    /// Field names referenced by this rule's exceptions; set during
    /// compilation.
    pub exception_fields: BTreeSet<String>,
}

/// The event source every macro and rule belongs to unless it names one.
pub const DEFAULT_SOURCE: &str = "syscall";
