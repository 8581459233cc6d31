//! Pass 1: walk the parsed YAML documents, classify each top-level item,
//! validate it, and populate the catalog with append semantics applied.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yml::{Mapping, Value};
use tracing::debug;

use crate::host::RulesEngineHost;
use crate::source_map::SourceMap;
use crate::types::ast::is_comparison_operator;
use crate::types::catalog::Catalog;
use crate::types::defs::{
    DEFAULT_SOURCE, Exception, ExceptionValue, ListDef, MacroDef, RuleDef, ScalarOrSeq,
};
use crate::types::error::{
    ItemKind, LoadError, LoadErrorKind, LoadWarning, LoadWarningKind,
};
use crate::types::priority::Priority;

/// Version requirements collected from the documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRequirements {
    /// The maximum `required_engine_version` seen across all documents.
    pub engine_version: u64,
    /// Accumulated `required_plugin_versions`, name to version strings.
    pub plugin_versions: BTreeMap<String, Vec<String>>,
}

/// Walk all documents in `content` and populate `catalog`.
///
/// Fatal problems abort the walk; non-fatal ones accumulate in `warnings`.
pub fn run<H: RulesEngineHost>(
    content: &str,
    source_map: &SourceMap,
    host: &H,
    min_priority: Priority,
    catalog: &mut Catalog,
    warnings: &mut Vec<LoadWarning>,
) -> Result<VersionRequirements, LoadError> {
    let mut versions = VersionRequirements::default();
    let mut item_idx = 0usize;

    for document in serde_yml::Deserializer::from_str(content) {
        let value =
            Value::deserialize(document).map_err(|e| yaml_load_error(&e, source_map))?;
        let items = match value {
            Value::Null => continue,
            Value::Sequence(items) => items,
            _ => return Err(LoadError::new(LoadErrorKind::NotArray)),
        };
        for item in items {
            let context = source_map.item_context(item_idx);
            item_idx += 1;
            let Value::Mapping(map) = item else {
                return Err(LoadError {
                    kind: LoadErrorKind::NotMapping,
                    context,
                });
            };
            load_item(
                &map,
                context,
                host,
                min_priority,
                catalog,
                warnings,
                &mut versions,
            )?;
        }
    }

    Ok(versions)
}

fn load_item<H: RulesEngineHost>(
    map: &Mapping,
    context: Option<String>,
    host: &H,
    min_priority: Priority,
    catalog: &mut Catalog,
    warnings: &mut Vec<LoadWarning>,
    versions: &mut VersionRequirements,
) -> Result<(), LoadError> {
    let ctx = context.unwrap_or_default();

    if let Some(v) = get(map, "required_engine_version") {
        return load_engine_version(v, &ctx, host, versions);
    }
    if let Some(v) = get(map, "required_plugin_versions") {
        return load_plugin_versions(v, &ctx, versions);
    }
    if let Some(v) = get(map, "macro") {
        let name = item_name(v, ItemKind::Macro, &ctx)?;
        return load_macro(map, name, &ctx, catalog);
    }
    if let Some(v) = get(map, "list") {
        let name = item_name(v, ItemKind::List, &ctx)?;
        return load_list(map, name, &ctx, catalog);
    }
    if let Some(v) = get(map, "rule") {
        let name = item_name(v, ItemKind::Rule, &ctx)?;
        return load_rule(map, name, &ctx, host, min_priority, catalog, warnings);
    }

    warnings.push(LoadWarning::with_context(
        LoadWarningKind::UnknownTopLevelKey,
        ctx,
    ));
    Ok(())
}

// -- required_engine_version / required_plugin_versions ---------------------

fn load_engine_version<H: RulesEngineHost>(
    value: &Value,
    ctx: &str,
    host: &H,
    versions: &mut VersionRequirements,
) -> Result<(), LoadError> {
    let Some(required) = value.as_u64() else {
        return Err(LoadError::with_context(
            LoadErrorKind::InvalidEngineVersionRequirement,
            ctx,
        ));
    };
    let actual = host.engine_version();
    if actual < required {
        return Err(LoadError::with_context(
            LoadErrorKind::EngineVersionMismatch { required, actual },
            ctx,
        ));
    }
    versions.engine_version = versions.engine_version.max(required);
    Ok(())
}

fn load_plugin_versions(
    value: &Value,
    ctx: &str,
    versions: &mut VersionRequirements,
) -> Result<(), LoadError> {
    let Value::Sequence(entries) = value else {
        return Err(LoadError::with_context(
            LoadErrorKind::InvalidPluginVersionEntry,
            ctx,
        ));
    };
    for entry in entries {
        let (name, version) = entry
            .as_mapping()
            .and_then(|m| {
                let name = get(m, "name").and_then(as_scalar_string)?;
                let version = get(m, "version").and_then(as_scalar_string)?;
                Some((name, version))
            })
            .ok_or_else(|| {
                LoadError::with_context(LoadErrorKind::InvalidPluginVersionEntry, ctx)
            })?;
        versions.plugin_versions.entry(name).or_default().push(version);
    }
    Ok(())
}

// -- Macros -----------------------------------------------------------------

fn load_macro(
    map: &Mapping,
    name: String,
    ctx: &str,
    catalog: &mut Catalog,
) -> Result<(), LoadError> {
    let condition = require_string(map, "condition", ItemKind::Macro, &name, ctx)?;
    let source = optional_string(map, "source", ItemKind::Macro, &name, ctx)?
        .unwrap_or_else(|| DEFAULT_SOURCE.to_owned());

    if is_append(map) {
        let Some(existing) = catalog.macros.get_mut(&name) else {
            return Err(LoadError::with_context(
                LoadErrorKind::AppendWithoutTarget {
                    kind: ItemKind::Macro,
                    name,
                },
                ctx,
            ));
        };
        existing.condition.push(' ');
        existing.condition.push_str(&condition);
        existing.context.push_str(ctx);
        return Ok(());
    }

    debug!(macro_name = %name, "loaded macro definition");
    catalog.store_macro(MacroDef {
        name,
        condition,
        source,
        context: ctx.to_owned(),
    });
    Ok(())
}

// -- Lists ------------------------------------------------------------------

fn load_list(
    map: &Mapping,
    name: String,
    ctx: &str,
    catalog: &mut Catalog,
) -> Result<(), LoadError> {
    let Some(items_val) = get(map, "items") else {
        return Err(LoadError::with_context(
            LoadErrorKind::MissingField {
                kind: ItemKind::List,
                name,
                field: "items".to_owned(),
            },
            ctx,
        ));
    };
    let Value::Sequence(raw_items) = items_val else {
        return Err(LoadError::with_context(
            LoadErrorKind::InvalidListItem { name },
            ctx,
        ));
    };
    let mut items = Vec::with_capacity(raw_items.len());
    for raw in raw_items {
        let Some(item) = as_scalar_string(raw) else {
            return Err(LoadError::with_context(
                LoadErrorKind::InvalidListItem { name },
                ctx,
            ));
        };
        items.push(item);
    }

    if is_append(map) {
        let Some(existing) = catalog.lists.get_mut(&name) else {
            return Err(LoadError::with_context(
                LoadErrorKind::AppendWithoutTarget {
                    kind: ItemKind::List,
                    name,
                },
                ctx,
            ));
        };
        existing.items.extend(items);
        existing.context.push_str(ctx);
        return Ok(());
    }

    debug!(list = %name, items = items.len(), "loaded list definition");
    catalog.store_list(ListDef {
        name,
        items,
        context: ctx.to_owned(),
    });
    Ok(())
}

// -- Rules ------------------------------------------------------------------

const REQUIRED_RULE_FIELDS: &[&str] = &["condition", "output", "desc", "priority"];

fn load_rule<H: RulesEngineHost>(
    map: &Mapping,
    name: String,
    ctx: &str,
    host: &H,
    min_priority: Priority,
    catalog: &mut Catalog,
    warnings: &mut Vec<LoadWarning>,
) -> Result<(), LoadError> {
    if is_append(map) {
        return append_rule(map, &name, ctx, host, catalog, warnings);
    }

    let missing: Vec<&str> = REQUIRED_RULE_FIELDS
        .iter()
        .copied()
        .filter(|field| get(map, field).is_none())
        .collect();
    if let Some(first_missing) = missing.first() {
        // An item carrying none of the required fields but an enabled key
        // is a toggle targeting an already loaded rule. A partial field set
        // is a malformed rule even when enabled is present.
        if missing.len() == REQUIRED_RULE_FIELDS.len() && get(map, "enabled").is_some() {
            return toggle_rule(map, &name, ctx, catalog);
        }
        return Err(LoadError::with_context(
            LoadErrorKind::MissingField {
                kind: ItemKind::Rule,
                name,
                field: (*first_missing).to_owned(),
            },
            ctx,
        ));
    }

    let condition = require_string(map, "condition", ItemKind::Rule, &name, ctx)?;
    let output = require_string(map, "output", ItemKind::Rule, &name, ctx)?;
    let desc = require_string(map, "desc", ItemKind::Rule, &name, ctx)?;
    let priority_str = require_string(map, "priority", ItemKind::Rule, &name, ctx)?;
    let source = optional_string(map, "source", ItemKind::Rule, &name, ctx)?
        .unwrap_or_else(|| DEFAULT_SOURCE.to_owned());

    let priority_num: Priority = priority_str.parse().map_err(|_| {
        LoadError::with_context(
            LoadErrorKind::UnknownPriority {
                rule: name.clone(),
                priority: priority_str.clone(),
            },
            ctx,
        )
    })?;

    let tags = match get(map, "tags") {
        Some(Value::Sequence(seq)) => seq.iter().filter_map(as_scalar_string).collect(),
        _ => std::collections::BTreeSet::new(),
    };

    let mut exceptions = Vec::new();
    if let Some(Value::Sequence(items)) = get(map, "exceptions") {
        for item in items {
            let ex = parse_exception(item, &name, &source, host, ctx)?;
            exceptions.push(ex);
        }
    }

    let skipped = priority_num.as_num() > min_priority.as_num();
    let output = if skipped {
        output
    } else {
        trim_trailing_newlines(&output)
    };

    debug!(rule = %name, priority = %priority_num, skipped, "loaded rule definition");
    catalog.store_rule(
        RuleDef {
            name,
            condition,
            output,
            desc,
            priority: priority_str,
            priority_num,
            source,
            tags,
            exceptions,
            enabled: get_bool(map, "enabled").unwrap_or(true),
            skip_if_unknown_filter: get_bool(map, "skip-if-unknown-filter").unwrap_or(false),
            warn_evttypes: get_bool(map, "warn_evttypes").unwrap_or(true),
            context: ctx.to_owned(),
            compile_condition: String::new(),
            exception_fields: std::collections::BTreeSet::new(),
        },
        skipped,
    );
    Ok(())
}

fn toggle_rule(
    map: &Mapping,
    name: &str,
    ctx: &str,
    catalog: &mut Catalog,
) -> Result<(), LoadError> {
    let enabled = get_bool(map, "enabled").unwrap_or(false);
    if let Some(rule) = catalog.rules.get_mut(name) {
        rule.enabled = enabled;
    } else if let Some(rule) = catalog.skipped_rules.get_mut(name) {
        rule.enabled = enabled;
    } else {
        return Err(LoadError::with_context(
            LoadErrorKind::EnableWithoutTarget {
                name: name.to_owned(),
            },
            ctx,
        ));
    }
    Ok(())
}

fn append_rule<H: RulesEngineHost>(
    map: &Mapping,
    name: &str,
    ctx: &str,
    host: &H,
    catalog: &mut Catalog,
    warnings: &mut Vec<LoadWarning>,
) -> Result<(), LoadError> {
    if !catalog.rules.contains_key(name) {
        // Appends against a rule dropped by the priority threshold are
        // accepted and dropped with it.
        if catalog.skipped_rules.contains_key(name) {
            return Ok(());
        }
        return Err(LoadError::with_context(
            LoadErrorKind::AppendWithoutTarget {
                kind: ItemKind::Rule,
                name: name.to_owned(),
            },
            ctx,
        ));
    }

    let condition = optional_string(map, "condition", ItemKind::Rule, name, ctx)?;
    let exceptions_val = get(map, "exceptions");
    if condition.is_none() && exceptions_val.is_none() {
        return Err(LoadError::with_context(
            LoadErrorKind::AppendWithoutPayload {
                name: name.to_owned(),
            },
            ctx,
        ));
    }

    let source = catalog.rules[name].source.clone();

    if let Some(Value::Sequence(items)) = exceptions_val {
        for item in items {
            append_exception(item, name, &source, ctx, host, catalog, warnings)?;
        }
    }

    let rule = catalog
        .rules
        .get_mut(name)
        .expect("presence checked above");
    if let Some(cond) = condition {
        rule.condition.push(' ');
        rule.condition.push_str(&cond);
    }
    rule.context.push_str(ctx);
    Ok(())
}

fn append_exception<H: RulesEngineHost>(
    item: &Value,
    rule_name: &str,
    source: &str,
    ctx: &str,
    host: &H,
    catalog: &mut Catalog,
    warnings: &mut Vec<LoadWarning>,
) -> Result<(), LoadError> {
    let ex_name = item
        .as_mapping()
        .and_then(|m| get(m, "name"))
        .and_then(as_scalar_string)
        .ok_or_else(|| {
            LoadError::with_context(
                LoadErrorKind::ExceptionMissingName {
                    rule: rule_name.to_owned(),
                },
                ctx,
            )
        })?;
    let ex_map = item.as_mapping().expect("checked while reading name");

    let existing_idx = catalog.rules[rule_name]
        .exceptions
        .iter()
        .position(|e| e.name == ex_name);

    if let Some(idx) = existing_idx {
        if get(ex_map, "fields").is_some() || get(ex_map, "comps").is_some() {
            return Err(LoadError::with_context(
                LoadErrorKind::ExceptionFieldsNotAppendable {
                    rule: rule_name.to_owned(),
                    exception: ex_name,
                },
                ctx,
            ));
        }
        let values = parse_values(ex_map, rule_name, &ex_name, ctx)?;
        catalog
            .rules
            .get_mut(rule_name)
            .expect("presence checked by caller")
            .exceptions[idx]
            .values
            .extend(values);
        return Ok(());
    }

    // A new exception name carrying fields is a full exception definition;
    // without fields there is nothing it can attach to.
    if get(ex_map, "fields").is_some() {
        let ex = parse_exception(item, rule_name, source, host, ctx)?;
        catalog
            .rules
            .get_mut(rule_name)
            .expect("presence checked by caller")
            .exceptions
            .push(ex);
    } else {
        warnings.push(LoadWarning::with_context(
            LoadWarningKind::AppendNoMatchingException {
                rule: rule_name.to_owned(),
                exception: ex_name,
            },
            ctx,
        ));
    }
    Ok(())
}

// -- Exception parsing ------------------------------------------------------

fn parse_exception<H: RulesEngineHost>(
    item: &Value,
    rule_name: &str,
    source: &str,
    host: &H,
    ctx: &str,
) -> Result<Exception, LoadError> {
    let Some(map) = item.as_mapping() else {
        return Err(LoadError::with_context(
            LoadErrorKind::ExceptionMissingName {
                rule: rule_name.to_owned(),
            },
            ctx,
        ));
    };
    let name = get(map, "name").and_then(as_scalar_string).ok_or_else(|| {
        LoadError::with_context(
            LoadErrorKind::ExceptionMissingName {
                rule: rule_name.to_owned(),
            },
            ctx,
        )
    })?;

    let Some(fields_val) = get(map, "fields") else {
        return Err(LoadError::with_context(
            LoadErrorKind::ExceptionMissingFields {
                rule: rule_name.to_owned(),
                exception: name,
            },
            ctx,
        ));
    };
    let fields = parse_scalar_or_seq(fields_val).ok_or_else(|| {
        LoadError::with_context(
            LoadErrorKind::ExceptionMissingFields {
                rule: rule_name.to_owned(),
                exception: name.clone(),
            },
            ctx,
        )
    })?;

    let comps = match get(map, "comps") {
        Some(v) => parse_scalar_or_seq(v).ok_or_else(|| {
            LoadError::with_context(
                LoadErrorKind::ExceptionShapeMismatch {
                    rule: rule_name.to_owned(),
                    exception: name.clone(),
                },
                ctx,
            )
        })?,
        None => match &fields {
            ScalarOrSeq::Scalar(_) => ScalarOrSeq::Scalar("in".to_owned()),
            ScalarOrSeq::Seq(fs) => ScalarOrSeq::Seq(vec!["=".to_owned(); fs.len()]),
        },
    };

    match (&fields, &comps) {
        (ScalarOrSeq::Scalar(field), ScalarOrSeq::Scalar(comp)) => {
            check_comparison(comp, rule_name, &name, ctx)?;
            check_field(field, source, rule_name, &name, host, ctx)?;
        }
        (ScalarOrSeq::Seq(fs), ScalarOrSeq::Seq(cs)) => {
            if fs.len() != cs.len() {
                return Err(LoadError::with_context(
                    LoadErrorKind::ExceptionLengthMismatch {
                        rule: rule_name.to_owned(),
                        exception: name,
                    },
                    ctx,
                ));
            }
            for comp in cs {
                check_comparison(comp, rule_name, &name, ctx)?;
            }
            for field in fs {
                check_field(field, source, rule_name, &name, host, ctx)?;
            }
        }
        _ => {
            return Err(LoadError::with_context(
                LoadErrorKind::ExceptionShapeMismatch {
                    rule: rule_name.to_owned(),
                    exception: name,
                },
                ctx,
            ));
        }
    }

    let values = parse_values(map, rule_name, &name, ctx)?;

    Ok(Exception {
        name,
        fields,
        comps,
        values,
        context: ctx.to_owned(),
    })
}

fn parse_values(
    map: &Mapping,
    rule_name: &str,
    ex_name: &str,
    ctx: &str,
) -> Result<Vec<ExceptionValue>, LoadError> {
    let Some(values_val) = get(map, "values") else {
        return Ok(Vec::new());
    };
    let Value::Sequence(items) = values_val else {
        return Err(LoadError::with_context(
            LoadErrorKind::ExceptionValueShape {
                rule: rule_name.to_owned(),
                exception: ex_name.to_owned(),
            },
            ctx,
        ));
    };
    items
        .iter()
        .map(|v| {
            parse_exception_value(v).ok_or_else(|| {
                LoadError::with_context(
                    LoadErrorKind::ExceptionValueShape {
                        rule: rule_name.to_owned(),
                        exception: ex_name.to_owned(),
                    },
                    ctx,
                )
            })
        })
        .collect()
}

fn parse_exception_value(value: &Value) -> Option<ExceptionValue> {
    match value {
        Value::Sequence(items) => {
            let parsed: Option<Vec<ExceptionValue>> =
                items.iter().map(parse_exception_value).collect();
            Some(ExceptionValue::Seq(parsed?))
        }
        other => as_scalar_string(other).map(ExceptionValue::Scalar),
    }
}

fn check_comparison(
    comp: &str,
    rule_name: &str,
    ex_name: &str,
    ctx: &str,
) -> Result<(), LoadError> {
    if is_comparison_operator(comp) {
        Ok(())
    } else {
        Err(LoadError::with_context(
            LoadErrorKind::UnknownComparison {
                rule: rule_name.to_owned(),
                exception: ex_name.to_owned(),
                comp: comp.to_owned(),
            },
            ctx,
        ))
    }
}

fn check_field<H: RulesEngineHost>(
    field: &str,
    source: &str,
    rule_name: &str,
    ex_name: &str,
    host: &H,
    ctx: &str,
) -> Result<(), LoadError> {
    if host.is_defined_field(source, field) {
        Ok(())
    } else {
        Err(LoadError::with_context(
            LoadErrorKind::UndefinedField {
                rule: rule_name.to_owned(),
                exception: ex_name.to_owned(),
                field: field.to_owned(),
                source_name: source.to_owned(),
            },
            ctx,
        ))
    }
}

// -- YAML access helpers ----------------------------------------------------

fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_owned()))
}

fn as_scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn get_bool(map: &Mapping, key: &str) -> Option<bool> {
    get(map, key).and_then(Value::as_bool)
}

fn is_append(map: &Mapping) -> bool {
    get_bool(map, "append").unwrap_or(false)
}

fn item_name(value: &Value, kind: ItemKind, ctx: &str) -> Result<String, LoadError> {
    as_scalar_string(value)
        .ok_or_else(|| LoadError::with_context(LoadErrorKind::InvalidItemName { kind }, ctx))
}

fn require_string(
    map: &Mapping,
    field: &str,
    kind: ItemKind,
    name: &str,
    ctx: &str,
) -> Result<String, LoadError> {
    match get(map, field) {
        None => Err(LoadError::with_context(
            LoadErrorKind::MissingField {
                kind,
                name: name.to_owned(),
                field: field.to_owned(),
            },
            ctx,
        )),
        Some(v) => as_scalar_string(v).ok_or_else(|| {
            LoadError::with_context(
                LoadErrorKind::FieldNotString {
                    kind,
                    name: name.to_owned(),
                    field: field.to_owned(),
                },
                ctx,
            )
        }),
    }
}

fn optional_string(
    map: &Mapping,
    field: &str,
    kind: ItemKind,
    name: &str,
    ctx: &str,
) -> Result<Option<String>, LoadError> {
    match get(map, field) {
        None => Ok(None),
        Some(v) => as_scalar_string(v).map(Some).ok_or_else(|| {
            LoadError::with_context(
                LoadErrorKind::FieldNotString {
                    kind,
                    name: name.to_owned(),
                    field: field.to_owned(),
                },
                ctx,
            )
        }),
    }
}

fn parse_scalar_or_seq(value: &Value) -> Option<ScalarOrSeq<String>> {
    match value {
        Value::Sequence(items) => {
            let parsed: Option<Vec<String>> = items.iter().map(as_scalar_string).collect();
            Some(ScalarOrSeq::Seq(parsed?))
        }
        other => as_scalar_string(other).map(ScalarOrSeq::Scalar),
    }
}

/// Strip trailing newlines from an output template.
#[must_use]
pub fn trim_trailing_newlines(text: &str) -> String {
    text.trim_end_matches('\n').to_owned()
}

fn yaml_load_error(err: &serde_yml::Error, source_map: &SourceMap) -> LoadError {
    let raw = err.to_string();
    let (message, row) = match split_position_prefix(&raw) {
        Some((row, rest)) => (rest.to_owned(), Some(row)),
        None => (raw, err.location().map(|l| l.line())),
    };
    let context = row.and_then(|r| source_map.context_at_row(r));
    LoadError {
        kind: LoadErrorKind::Yaml { message },
        context,
    }
}

/// Split a `<row>:<col>: ` prefix off a parser message, if present.
fn split_position_prefix(message: &str) -> Option<(usize, &str)> {
    let (row, rest) = message.split_once(':')?;
    let row: usize = row.parse().ok()?;
    let (col, rest) = rest.split_once(": ")?;
    col.parse::<usize>().ok()?;
    Some((row, rest))
}
