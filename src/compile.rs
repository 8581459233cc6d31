//! Pass 2b: compile macros and rules in declaration order, stamp relational
//! nodes with dense rule identifiers, and drive the host's filter-builder
//! API.

use tracing::debug;

use crate::exceptions::{conjoin, lower_exceptions};
use crate::expand::expand_lists;
use crate::host::{FilterBuilder, FilterCompiler, RelRhs, RulesEngineHost};
use crate::ruleset::LoadOptions;
use crate::types::ast::{BoolOp, FilterNode};
use crate::types::catalog::{Catalog, CompiledMacro};
use crate::types::defs::DEFAULT_SOURCE;
use crate::types::error::{FilterError, LoadError, LoadErrorKind, LoadWarning, LoadWarningKind};

/// How many event types a syscall filter may narrow to before it is
/// considered too broad.
const MAX_EVTTYPES_BEFORE_WARNING: usize = 100;

/// Compile everything pass 1 collected. Clears host filter state first.
pub fn run<H: RulesEngineHost, C: FilterCompiler>(
    host: &mut H,
    compiler: &C,
    catalog: &mut Catalog,
    opts: &LoadOptions,
    warnings: &mut Vec<LoadWarning>,
) -> Result<(), LoadError> {
    host.clear_filters();
    catalog.reset_compiled();
    expand_lists(catalog);

    compile_macros(compiler, catalog)?;
    compile_rules(host, compiler, catalog, opts, warnings)?;

    for name in &catalog.ordered_macro_names {
        if catalog.compiled_macros.get(name).is_some_and(|m| !m.used) {
            warnings.push(LoadWarning::new(LoadWarningKind::UnusedMacro {
                name: name.clone(),
            }));
        }
    }
    for name in &catalog.ordered_list_names {
        if catalog.compiled_lists.get(name).is_some_and(|l| !l.used) {
            warnings.push(LoadWarning::new(LoadWarningKind::UnusedList {
                name: name.clone(),
            }));
        }
    }
    Ok(())
}

fn compile_macros<C: FilterCompiler>(
    compiler: &C,
    catalog: &mut Catalog,
) -> Result<(), LoadError> {
    let names: Vec<String> = catalog.ordered_macro_names.clone();
    for name in names {
        let (condition, context) = {
            let def = &catalog.macros[&name];
            (def.condition.clone(), def.context.clone())
        };
        let ast = compiler
            .compile_macro(
                &condition,
                &mut catalog.compiled_macros,
                &mut catalog.compiled_lists,
            )
            .map_err(|e| {
                LoadError::with_context(
                    LoadErrorKind::CompileMacro {
                        name: name.clone(),
                        message: e.message().to_owned(),
                    },
                    context,
                )
            })?;
        catalog
            .compiled_macros
            .insert(name, CompiledMacro { ast, used: false });
    }
    Ok(())
}

fn compile_rules<H: RulesEngineHost, C: FilterCompiler>(
    host: &mut H,
    compiler: &C,
    catalog: &mut Catalog,
    opts: &LoadOptions,
    warnings: &mut Vec<LoadWarning>,
) -> Result<(), LoadError> {
    let names: Vec<String> = catalog.ordered_rule_names.clone();
    for name in names {
        let rule = catalog.rules.get_mut(&name).ok_or_else(|| {
            LoadError::new(LoadErrorKind::Invariant {
                message: format!("ordered rule '{name}' missing from catalog"),
            })
        })?;

        let lowered = lower_exceptions(&rule.name, &rule.exceptions)
            .map_err(|kind| LoadError::with_context(kind, rule.context.clone()))?;
        rule.compile_condition = conjoin(&rule.condition, &lowered);
        rule.exception_fields = lowered.fields;

        let compile_condition = rule.compile_condition.clone();
        let context = rule.context.clone();
        let source = rule.source.clone();
        let tags = rule.tags.clone();
        let enabled = rule.enabled;
        let skip_if_unknown_filter = rule.skip_if_unknown_filter;
        let warn_evttypes = rule.warn_evttypes;

        let artifact = compiler
            .compile_filter(
                &name,
                &compile_condition,
                &mut catalog.compiled_macros,
                &mut catalog.compiled_lists,
            )
            .map_err(|e| {
                LoadError::with_context(
                    LoadErrorKind::CompileRule {
                        name: name.clone(),
                        message: e.message().to_owned(),
                    },
                    context.clone(),
                )
            })?;
        let Some(mut ast) = artifact.into_rule() else {
            return Err(LoadError::with_context(
                LoadErrorKind::NotAFilter { name: name.clone() },
                context,
            ));
        };

        if !host.is_source_valid(&source) {
            warnings.push(LoadWarning::with_context(
                LoadWarningKind::UnknownSource {
                    rule: name.clone(),
                    source_name: source.clone(),
                },
                context,
            ));
            continue;
        }

        let check_id = catalog.assign_idx(&name);
        stamp_relational_nodes(&mut ast, check_id).map_err(|e| {
            LoadError::new(LoadErrorKind::Invariant {
                message: e.message().to_owned(),
            })
        })?;
        debug!(rule = %name, check_id, "compiled rule filter");

        let mut parser = host.create_parser(&source);
        if let Err(e) = walk_filter(&ast, &mut parser, None) {
            if skip_if_unknown_filter && e.message().contains("nonexistent field") {
                warnings.push(LoadWarning::with_context(
                    LoadWarningKind::SkipUnknownFilter {
                        rule: name.clone(),
                        message: e.message().to_owned(),
                    },
                    context,
                ));
                continue;
            }
            return Err(LoadError::with_context(
                LoadErrorKind::FilterBuilder {
                    rule: name.clone(),
                    message: e.message().to_owned(),
                },
                context,
            ));
        }

        let num_evttypes = host.add_filter(parser, &name, &source, &tags);
        if source == DEFAULT_SOURCE
            && (num_evttypes == 0 || num_evttypes > MAX_EVTTYPES_BEFORE_WARNING)
            && warn_evttypes
            && !opts.all_events
        {
            warnings.push(LoadWarning::new(LoadWarningKind::BroadEventTypes {
                rule: name.clone(),
            }));
        }

        host.enable_rule(&name, enabled);

        let rule = catalog
            .rules
            .get_mut(&name)
            .expect("rule present throughout compilation");
        if rule.source == DEFAULT_SOURCE {
            rewrite_container_info(&mut rule.output, &opts.extra, opts.replace_container_info);
        }
        host.validate_format(&rule.source, &rule.output).map_err(|e| {
            LoadError::with_context(
                LoadErrorKind::InvalidOutput {
                    rule: name.clone(),
                    message: e.message().to_owned(),
                },
                rule.context.clone(),
            )
        })?;
    }
    Ok(())
}

/// Rewrite `%container.info` in a syscall rule's output template.
fn rewrite_container_info(output: &mut String, extra: &str, replace_container_info: bool) {
    if output.contains("%container.info") {
        if replace_container_info && !extra.is_empty() {
            *output = output.replace("%container.info", extra);
        } else {
            *output = output.replace("%container.info", "%container.name (id=%container.id)");
            if !extra.is_empty() {
                output.push(' ');
                output.push_str(extra);
            }
        }
    } else if !extra.is_empty() {
        output.push(' ');
        output.push_str(extra);
    }
}

/// Stamp every relational node of a rule AST with the rule's identifier.
pub fn stamp_relational_nodes(node: &mut FilterNode, id: u32) -> Result<(), FilterError> {
    match node {
        FilterNode::BinaryBool { left, right, .. } => {
            stamp_relational_nodes(left, id)?;
            stamp_relational_nodes(right, id)
        }
        FilterNode::UnaryBool { arg, .. } => stamp_relational_nodes(arg, id),
        FilterNode::BinaryRel { check_id, .. } | FilterNode::UnaryRel { check_id, .. } => {
            *check_id = id;
            Ok(())
        }
        FilterNode::Value(_) | FilterNode::List(_) => Err(FilterError::new(
            "unexpected value node in boolean expression",
        )),
    }
}

/// Emit the filter-builder call stream for a rule AST.
///
/// Nested boolean nodes whose operator matches the parent's skip the
/// `nest`/`unnest` pair; the boolean operators are associative, so flattened
/// runs are semantically identical and cheaper to evaluate.
pub fn walk_filter<B: FilterBuilder>(
    node: &FilterNode,
    builder: &mut B,
    parent: Option<BoolOp>,
) -> Result<(), FilterError> {
    match node {
        FilterNode::BinaryBool { op, left, right } => {
            let needs_nest = parent != Some(*op);
            if needs_nest {
                builder.nest()?;
            }
            walk_filter(left, builder, Some(*op))?;
            builder.bool_op(*op)?;
            walk_filter(right, builder, Some(*op))?;
            if needs_nest {
                builder.unnest()?;
            }
            Ok(())
        }
        FilterNode::UnaryBool { op, arg } => {
            builder.nest()?;
            builder.bool_op(*op)?;
            walk_filter(arg, builder, None)?;
            builder.unnest()
        }
        FilterNode::BinaryRel {
            op,
            left,
            right,
            check_id,
        } => {
            let field = leaf_value(left)?;
            if op.takes_list() {
                let values = harvest_list(right)?;
                builder.rel_expr(field, *op, RelRhs::Values(&values), *check_id)
            } else {
                builder.rel_expr(field, *op, RelRhs::Value(leaf_value(right)?), *check_id)
            }
        }
        FilterNode::UnaryRel { op, arg, check_id } => {
            builder.rel_expr(leaf_value(arg)?, *op, RelRhs::None, *check_id)
        }
        FilterNode::Value(_) | FilterNode::List(_) => Err(FilterError::new(
            "unexpected value node in boolean expression",
        )),
    }
}

fn leaf_value(node: &FilterNode) -> Result<&str, FilterError> {
    match node {
        FilterNode::Value(s) => Ok(s),
        _ => Err(FilterError::new("expected a value leaf in relational node")),
    }
}

fn harvest_list(node: &FilterNode) -> Result<Vec<String>, FilterError> {
    match node {
        FilterNode::List(items) => items
            .iter()
            .map(|i| leaf_value(i).map(str::to_owned))
            .collect(),
        _ => Err(FilterError::new(
            "expected a list right-hand side for list operator",
        )),
    }
}
