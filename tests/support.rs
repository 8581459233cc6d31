//! Shared test doubles: a recording fake of the rules-engine host and a
//! miniature filter compiler over the condition grammar the tests use.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use parapet::{
    BoolOp, CompiledLists, CompiledMacros, FilterArtifact, FilterBuilder, FilterCompiler,
    FilterError, FilterNode, RelOp, RelRhs, RulesEngineHost,
};

use winnow::combinator::{alt, cut_err, delimited, opt, preceded, repeat, separated};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{any, take_while};

// ---------------------------------------------------------------------------
// Fake host
// ---------------------------------------------------------------------------

/// One registered filter, with the builder call stream that produced it.
#[derive(Debug, Clone)]
pub struct AddedFilter {
    pub rule: String,
    pub source: String,
    pub tags: BTreeSet<String>,
    pub calls: Vec<String>,
}

/// In-memory host double. Records every filter registration and rule
/// enable/disable, validates fields against a fixed set, and lets tests
/// script event-type counts and format failures.
#[derive(Debug)]
pub struct FakeHost {
    pub engine_version: u64,
    pub sources: BTreeSet<String>,
    pub fields: BTreeSet<String>,
    /// Per-rule `num_evttypes` overrides returned by `add_filter`.
    pub evttype_counts: BTreeMap<String, usize>,
    pub default_evttypes: usize,
    /// Output templates the formatter rejects.
    pub invalid_formats: BTreeSet<String>,
    pub filters: Vec<AddedFilter>,
    pub enabled: BTreeMap<String, bool>,
    pub clear_count: usize,
}

impl Default for FakeHost {
    fn default() -> Self {
        let fields = [
            "evt.type",
            "evt.dir",
            "proc.name",
            "proc.cmdline",
            "proc.pname",
            "fd.name",
            "fd.directory",
            "fd.num",
            "user.name",
            "container.id",
            "container.name",
        ];
        Self {
            engine_version: 10,
            sources: BTreeSet::from(["syscall".to_owned(), "k8s_audit".to_owned()]),
            fields: fields.iter().map(|f| (*f).to_owned()).collect(),
            evttype_counts: BTreeMap::new(),
            default_evttypes: 5,
            invalid_formats: BTreeSet::new(),
            filters: Vec::new(),
            enabled: BTreeMap::new(),
            clear_count: 0,
        }
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_for(&self, rule: &str) -> &AddedFilter {
        self.filters
            .iter()
            .find(|f| f.rule == rule)
            .unwrap_or_else(|| panic!("no filter registered for rule '{rule}'"))
    }
}

/// Parser handle handed out by [`FakeHost::create_parser`]; records the
/// builder stream as printable tokens and rejects undefined fields the way
/// the native filter checks would.
#[derive(Debug)]
pub struct FakeParser {
    source: String,
    fields: BTreeSet<String>,
    calls: Vec<String>,
}

impl FilterBuilder for FakeParser {
    fn nest(&mut self) -> Result<(), FilterError> {
        self.calls.push("nest".to_owned());
        Ok(())
    }

    fn unnest(&mut self) -> Result<(), FilterError> {
        self.calls.push("unnest".to_owned());
        Ok(())
    }

    fn bool_op(&mut self, op: BoolOp) -> Result<(), FilterError> {
        self.calls.push(format!("bool:{op}"));
        Ok(())
    }

    fn rel_expr(
        &mut self,
        field: &str,
        op: RelOp,
        rhs: RelRhs<'_>,
        check_id: u32,
    ) -> Result<(), FilterError> {
        if !self.fields.contains(field) {
            return Err(FilterError::new(format!("nonexistent field {field}")));
        }
        let rhs = match rhs {
            RelRhs::None => String::new(),
            RelRhs::Value(v) => format!(":{v}"),
            RelRhs::Values(vs) => format!(":[{}]", vs.join(",")),
        };
        self.calls.push(format!("rel:{field}:{op}{rhs}@{check_id}"));
        Ok(())
    }
}

impl RulesEngineHost for FakeHost {
    type Parser = FakeParser;

    fn engine_version(&self) -> u64 {
        self.engine_version
    }

    fn is_source_valid(&self, source: &str) -> bool {
        self.sources.contains(source)
    }

    fn is_defined_field(&self, _source: &str, field: &str) -> bool {
        self.fields.contains(field)
    }

    fn validate_format(&self, _source: &str, template: &str) -> Result<(), FilterError> {
        if self.invalid_formats.contains(template) {
            Err(FilterError::new(format!("invalid format string: {template}")))
        } else {
            Ok(())
        }
    }

    fn clear_filters(&mut self) {
        self.clear_count += 1;
        self.filters.clear();
        self.enabled.clear();
    }

    fn create_parser(&mut self, source: &str) -> FakeParser {
        FakeParser {
            source: source.to_owned(),
            fields: self.fields.clone(),
            calls: Vec::new(),
        }
    }

    fn add_filter(
        &mut self,
        parser: FakeParser,
        rule_name: &str,
        source: &str,
        tags: &BTreeSet<String>,
    ) -> usize {
        assert_eq!(parser.source, source, "parser used for the wrong source");
        self.filters.push(AddedFilter {
            rule: rule_name.to_owned(),
            source: source.to_owned(),
            tags: tags.clone(),
            calls: parser.calls,
        });
        self.evttype_counts
            .get(rule_name)
            .copied()
            .unwrap_or(self.default_evttypes)
    }

    fn enable_rule(&mut self, rule_name: &str, enabled: bool) {
        self.enabled.insert(rule_name.to_owned(), enabled);
    }
}

// ---------------------------------------------------------------------------
// Miniature filter compiler
// ---------------------------------------------------------------------------

/// Intermediate expression before macro and list references are resolved.
#[derive(Debug, Clone)]
enum TExpr {
    And(Box<TExpr>, Box<TExpr>),
    Or(Box<TExpr>, Box<TExpr>),
    Not(Box<TExpr>),
    MacroRef(String),
    UnaryRel {
        field: String,
        op: RelOp,
    },
    BinaryRel {
        field: String,
        op: RelOp,
        value: String,
    },
    ListRel {
        field: String,
        op: RelOp,
        items: Vec<String>,
    },
}

/// Test stand-in for the external filter compiler. Parses the condition
/// grammar the suite uses and substitutes compiled macros and lists,
/// marking them used.
#[derive(Debug, Default)]
pub struct TestCompiler {
    /// When set, `compile_filter` reports a macro artifact, exercising the
    /// rule-typed check.
    pub force_macro_artifact: bool,
}

impl TestCompiler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FilterCompiler for TestCompiler {
    fn compile_macro(
        &self,
        condition: &str,
        macros: &mut CompiledMacros,
        lists: &mut CompiledLists,
    ) -> Result<FilterNode, FilterError> {
        let expr = parse_condition(condition)?;
        resolve(expr, macros, lists)
    }

    fn compile_filter(
        &self,
        _name: &str,
        condition: &str,
        macros: &mut CompiledMacros,
        lists: &mut CompiledLists,
    ) -> Result<FilterArtifact, FilterError> {
        let expr = parse_condition(condition)?;
        let node = resolve(expr, macros, lists)?;
        if self.force_macro_artifact {
            Ok(FilterArtifact::Macro(node))
        } else {
            Ok(FilterArtifact::Rule(node))
        }
    }
}

fn parse_condition(text: &str) -> Result<TExpr, FilterError> {
    root.parse(text)
        .map_err(|e| FilterError::new(format!("compilation error: {e}")))
}

fn resolve(
    expr: TExpr,
    macros: &mut CompiledMacros,
    lists: &mut CompiledLists,
) -> Result<FilterNode, FilterError> {
    match expr {
        TExpr::And(a, b) => Ok(FilterNode::BinaryBool {
            op: BoolOp::And,
            left: Box::new(resolve(*a, macros, lists)?),
            right: Box::new(resolve(*b, macros, lists)?),
        }),
        TExpr::Or(a, b) => Ok(FilterNode::BinaryBool {
            op: BoolOp::Or,
            left: Box::new(resolve(*a, macros, lists)?),
            right: Box::new(resolve(*b, macros, lists)?),
        }),
        TExpr::Not(inner) => Ok(FilterNode::UnaryBool {
            op: BoolOp::Not,
            arg: Box::new(resolve(*inner, macros, lists)?),
        }),
        TExpr::MacroRef(name) => {
            let m = macros
                .get_mut(&name)
                .ok_or_else(|| FilterError::new(format!("undefined macro '{name}'")))?;
            m.used = true;
            Ok(m.ast.clone())
        }
        TExpr::UnaryRel { field, op } => Ok(FilterNode::UnaryRel {
            op,
            arg: Box::new(FilterNode::Value(field)),
            check_id: 0,
        }),
        TExpr::BinaryRel { field, op, value } => Ok(FilterNode::BinaryRel {
            op,
            left: Box::new(FilterNode::Value(field)),
            right: Box::new(FilterNode::Value(value)),
            check_id: 0,
        }),
        TExpr::ListRel { field, op, items } => {
            let mut elements = Vec::new();
            for item in items {
                if let Some(list) = lists.get_mut(&item) {
                    list.used = true;
                    elements.extend(
                        list.items
                            .iter()
                            .map(|i| FilterNode::Value(unquote(i))),
                    );
                } else {
                    elements.push(FilterNode::Value(unquote(&item)));
                }
            }
            Ok(FilterNode::BinaryRel {
                op,
                left: Box::new(FilterNode::Value(field)),
                right: Box::new(FilterNode::List(elements)),
                check_id: 0,
            })
        }
    }
}

fn unquote(item: &str) -> String {
    let trimmed = item
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| item.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    trimmed.unwrap_or(item).to_owned()
}

// -- Grammar ----------------------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| {
            c.is_ascii_alphanumeric() || c == '_' || c == '.'
        }),
    )
        .take()
        .parse_next(input)
}

fn quoted_string(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = any.parse_next(input)?;
        if ch == '"' {
            return Ok(s);
        }
        s.push(ch);
    }
}

fn bare_token<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| {
        !c.is_ascii_whitespace() && c != '(' && c != ')' && c != ','
    })
    .parse_next(input)
}

fn rel_op(input: &mut &str) -> ModalResult<RelOp> {
    ws.parse_next(input)?;
    let op = alt((
        alt((
            ">=", "<=", "==", "!=", "=", "<", ">", "icontains", "contains", "glob",
        )),
        alt(("startswith", "endswith", "intersects", "in", "pmatch")),
    ))
    .parse_next(input)?;
    Ok(op.parse().expect("grammar only yields table operators"))
}

fn value_list(input: &mut &str) -> ModalResult<Vec<String>> {
    delimited(
        ('(', ws),
        separated(
            0..,
            alt((quoted_string, bare_token.map(str::to_owned))),
            (ws, ',', ws),
        ),
        (ws, ')'),
    )
    .parse_next(input)
}

fn relation_or_macro(input: &mut &str) -> ModalResult<TExpr> {
    let field = ident.parse_next(input)?;
    let checkpoint = input.checkpoint();

    ws.parse_next(input)?;
    if opt("exists").parse_next(input)?.is_some() {
        return Ok(TExpr::UnaryRel {
            field: field.to_owned(),
            op: RelOp::Exists,
        });
    }

    if let Ok(op) = rel_op.parse_next(input) {
        ws.parse_next(input)?;
        if op.takes_list() || input.starts_with('(') {
            let items = cut_err(value_list).parse_next(input)?;
            return Ok(TExpr::ListRel {
                field: field.to_owned(),
                op,
                items,
            });
        }
        let value = cut_err(alt((quoted_string, bare_token.map(str::to_owned))))
            .parse_next(input)?;
        return Ok(TExpr::BinaryRel {
            field: field.to_owned(),
            op,
            value,
        });
    }

    input.reset(&checkpoint);
    Ok(TExpr::MacroRef(field.to_owned()))
}

fn primary(input: &mut &str) -> ModalResult<TExpr> {
    ws.parse_next(input)?;
    alt((delimited('(', expr, (ws, ')')), relation_or_macro)).parse_next(input)
}

fn unary(input: &mut &str) -> ModalResult<TExpr> {
    ws.parse_next(input)?;
    if opt(("not", ws1)).parse_next(input)?.is_some() {
        let inner = cut_err(unary).parse_next(input)?;
        Ok(TExpr::Not(Box::new(inner)))
    } else {
        primary(input)
    }
}

fn ws1(input: &mut &str) -> ModalResult<()> {
    take_while(1.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

fn and_expr(input: &mut &str) -> ModalResult<TExpr> {
    let first = unary(input)?;
    let rest: Vec<TExpr> =
        repeat(0.., preceded((ws, "and", ws1), cut_err(unary))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| TExpr::And(Box::new(acc), Box::new(r))))
}

fn or_expr(input: &mut &str) -> ModalResult<TExpr> {
    let first = and_expr(input)?;
    let rest: Vec<TExpr> =
        repeat(0.., preceded((ws, "or", ws1), cut_err(and_expr))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| TExpr::Or(Box::new(acc), Box::new(r))))
}

fn expr(input: &mut &str) -> ModalResult<TExpr> {
    ws.parse_next(input)?;
    or_expr(input)
}

fn root(input: &mut &str) -> ModalResult<TExpr> {
    let e = expr(input)?;
    ws.parse_next(input)?;
    Ok(e)
}

// ---------------------------------------------------------------------------
// Sanity tests for the doubles themselves
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(condition: &str) -> FilterNode {
        let compiler = TestCompiler::new();
        let mut macros = CompiledMacros::new();
        let mut lists = CompiledLists::new();
        compiler
            .compile_macro(condition, &mut macros, &mut lists)
            .unwrap()
    }

    #[test]
    fn parses_simple_relation() {
        let node = compile("evt.type=open");
        assert_eq!(
            node,
            FilterNode::BinaryRel {
                op: RelOp::Eq,
                left: Box::new(FilterNode::Value("evt.type".to_owned())),
                right: Box::new(FilterNode::Value("open".to_owned())),
                check_id: 0,
            }
        );
    }

    #[test]
    fn parses_in_list_with_quotes() {
        let node = compile("proc.name in (apk, \"my proc\")");
        let FilterNode::BinaryRel { op, right, .. } = node else {
            panic!("expected relation");
        };
        assert_eq!(op, RelOp::In);
        assert_eq!(
            *right,
            FilterNode::List(vec![
                FilterNode::Value("apk".to_owned()),
                FilterNode::Value("my proc".to_owned()),
            ])
        );
    }

    #[test]
    fn parses_boolean_structure() {
        let node = compile("evt.type=open and not (proc.name=apk or fd.name exists)");
        let FilterNode::BinaryBool { op, right, .. } = node else {
            panic!("expected and");
        };
        assert_eq!(op, BoolOp::And);
        assert!(matches!(*right, FilterNode::UnaryBool { op: BoolOp::Not, .. }));
    }

    #[test]
    fn undefined_macro_reference_fails() {
        let compiler = TestCompiler::new();
        let mut macros = CompiledMacros::new();
        let mut lists = CompiledLists::new();
        let err = compiler
            .compile_macro("never_defined", &mut macros, &mut lists)
            .unwrap_err();
        assert!(err.message().contains("undefined macro"));
    }

    #[test]
    fn macro_substitution_marks_used() {
        let compiler = TestCompiler::new();
        let mut macros = CompiledMacros::new();
        let mut lists = CompiledLists::new();
        let ast = compiler
            .compile_macro("evt.type=open", &mut macros, &mut lists)
            .unwrap();
        macros.insert(
            "open_evt".to_owned(),
            parapet::CompiledMacro { ast, used: false },
        );

        compiler
            .compile_filter("r", "open_evt and proc.name=apk", &mut macros, &mut lists)
            .unwrap();
        assert!(macros["open_evt"].used);
    }
}
