use std::fmt;

use thiserror::Error;

/// What kind of top-level document item an error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Macro,
    List,
    Rule,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemKind::Macro => "macro",
            ItemKind::List => "list",
            ItemKind::Rule => "rule",
        })
    }
}

/// The distinct failures a load can hit, without diagnostic context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadErrorKind {
    #[error("{message}")]
    Yaml { message: String },

    #[error("rules content is not a yaml array of objects")]
    NotArray,

    #[error("unexpected element type, each element must be a yaml associative array")]
    NotMapping,

    #[error("value of required_engine_version must be a number")]
    InvalidEngineVersionRequirement,

    #[error("rules require engine version {required}, but engine version is {actual}")]
    EngineVersionMismatch { required: u64, actual: u64 },

    #[error("required_plugin_versions entries must have name and version properties")]
    InvalidPluginVersionEntry,

    #[error("{kind} '{name}': missing field '{field}'")]
    MissingField {
        kind: ItemKind,
        name: String,
        field: String,
    },

    #[error("{kind} name must be a string")]
    InvalidItemName { kind: ItemKind },

    #[error("{kind} '{name}': field '{field}' must be a string")]
    FieldNotString {
        kind: ItemKind,
        name: String,
        field: String,
    },

    #[error("list '{name}': items must be scalars")]
    InvalidListItem { name: String },

    #[error("{kind} '{name}' has 'append' key but no {kind} by that name already exists")]
    AppendWithoutTarget { kind: ItemKind, name: String },

    #[error("rule '{name}' has 'enabled' key but no rule by that name already exists")]
    EnableWithoutTarget { name: String },

    #[error("rule '{name}': an appended rule must have exceptions or condition property")]
    AppendWithoutPayload { name: String },

    #[error("rule '{rule}': invalid priority '{priority}'")]
    UnknownPriority { rule: String, priority: String },

    #[error("rule '{rule}': exception item must have name property")]
    ExceptionMissingName { rule: String },

    #[error("rule '{rule}': exception '{exception}' must have fields property")]
    ExceptionMissingFields { rule: String, exception: String },

    #[error(
        "rule '{rule}': exception '{exception}' fields and comps must both be scalars or both be sequences"
    )]
    ExceptionShapeMismatch { rule: String, exception: String },

    #[error(
        "rule '{rule}': exception '{exception}' fields and comps sequences must have equal length"
    )]
    ExceptionLengthMismatch { rule: String, exception: String },

    #[error(
        "rule '{rule}': exception '{exception}': '{comp}' is not a supported comparison operator"
    )]
    UnknownComparison {
        rule: String,
        exception: String,
        comp: String,
    },

    #[error(
        "rule '{rule}': exception '{exception}': field '{field}' is not defined for source '{source_name}'"
    )]
    UndefinedField {
        rule: String,
        exception: String,
        field: String,
        source_name: String,
    },

    #[error(
        "rule '{rule}': appended exception '{exception}' can only append values, not fields or comps"
    )]
    ExceptionFieldsNotAppendable { rule: String, exception: String },

    #[error("rule '{rule}': exception '{exception}' values must be strings")]
    ExceptionValueShape { rule: String, exception: String },

    #[error(
        "rule '{rule}': exception '{exception}' value tuples must match the fields sequence in length"
    )]
    ExceptionTupleLength { rule: String, exception: String },

    #[error("macro '{name}': compilation failed: {message}")]
    CompileMacro { name: String, message: String },

    #[error("rule '{name}': compilation failed: {message}")]
    CompileRule { name: String, message: String },

    #[error("rule '{name}': condition compiled to a macro definition, not a rule filter")]
    NotAFilter { name: String },

    #[error("rule '{rule}': {message}")]
    FilterBuilder { rule: String, message: String },

    #[error("rule '{rule}': invalid output template: {message}")]
    InvalidOutput { rule: String, message: String },

    #[error("invariant violation: {message}")]
    Invariant { message: String },
}

/// A fatal load diagnostic: the failure kind plus the original YAML slice of
/// the offending item, when one is known.
///
/// Renders as `<message>`, or `<message>\n---\n<slice>---` when context is
/// attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub kind: LoadErrorKind,
    pub context: Option<String>,
}

impl LoadError {
    #[must_use]
    pub fn new(kind: LoadErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(kind: LoadErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: Some(context.into()),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n---\n{ctx}---")?;
        }
        Ok(())
    }
}

impl std::error::Error for LoadError {}

/// The non-fatal diagnostics a load accumulates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadWarningKind {
    #[error("unknown top level object")]
    UnknownTopLevelKey,

    #[error("macro '{name}' is not referred to by any rule or macro")]
    UnusedMacro { name: String },

    #[error("list '{name}' is not referred to by any rule, macro, or list")]
    UnusedList { name: String },

    #[error("rule '{rule}': unknown source '{source_name}', skipping")]
    UnknownSource { rule: String, source_name: String },

    #[error("rule '{rule}': skipped due to unknown filter: {message}")]
    SkipUnknownFilter { rule: String, message: String },

    #[error(
        "rule '{rule}' matches an overly broad set of event types, which carries a significant performance penalty"
    )]
    BroadEventTypes { rule: String },

    #[error(
        "rule '{rule}': appended exception '{exception}' has values but no fields and matches no existing exception"
    )]
    AppendNoMatchingException { rule: String, exception: String },
}

/// A non-fatal load diagnostic with optional YAML context, same rendering as
/// [`LoadError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    pub kind: LoadWarningKind,
    pub context: Option<String>,
}

impl LoadWarning {
    #[must_use]
    pub fn new(kind: LoadWarningKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(kind: LoadWarningKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: Some(context.into()),
        }
    }
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n---\n{ctx}---")?;
        }
        Ok(())
    }
}

/// Errors raised when the host reports a match the catalog cannot attribute,
/// or when a describe call names an unknown rule. The two lookup variants
/// are invariant violations on the host side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no rule with id {0}")]
    UnknownRuleId(u32),

    #[error("rule '{name}' is indexed but missing from the catalog")]
    MissingRule { name: String },

    #[error("no rule named '{name}'")]
    UnknownRule { name: String },
}

/// An error string surfaced by the host's filter builder or by the external
/// filter compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FilterError(pub String);

impl FilterError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}
