//! Lowers a rule's declarative exceptions into the boolean fragment that is
//! conjoined onto its condition, and collects the field names the
//! exceptions reference.

use std::collections::BTreeSet;

use crate::types::ast::is_list_operator;
use crate::types::defs::{Exception, ExceptionValue, ScalarOrSeq};
use crate::types::error::LoadErrorKind;

/// Wrap `item` in double quotes when it contains a space and is not already
/// quoted.
#[must_use]
pub fn quote_item(item: &str) -> String {
    if item.contains(' ') && !item.starts_with('\'') && !item.starts_with('"') {
        format!("\"{item}\"")
    } else {
        item.to_owned()
    }
}

/// Wrap `item` in parentheses unless it already starts with one.
#[must_use]
pub fn paren_item(item: &str) -> String {
    if item.starts_with('(') {
        item.to_owned()
    } else {
        format!("({item})")
    }
}

// Single-field exception values are always quoted; the filter grammar sees
// them as literal strings regardless of content.
fn quote_value(item: &str) -> String {
    if item.starts_with('\'') || item.starts_with('"') {
        item.to_owned()
    } else {
        format!("\"{item}\"")
    }
}

/// The lowered form of a rule's exceptions: the ` and not (...)` fragment
/// and the set of fields the exceptions reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoweredExceptions {
    pub condition_suffix: String,
    pub fields: BTreeSet<String>,
}

/// Lower every exception of `rule_name` into one boolean fragment.
///
/// Each exception contributes ` and not <subexpr>`; an exception whose
/// values render to nothing contributes nothing. The caller attaches the
/// rule's YAML context to any error.
pub fn lower_exceptions(
    rule_name: &str,
    exceptions: &[Exception],
) -> Result<LoweredExceptions, LoadErrorKind> {
    let mut out = LoweredExceptions::default();
    for ex in exceptions {
        let subexpr = match &ex.fields {
            ScalarOrSeq::Scalar(field) => lower_single_field(rule_name, ex, field, &mut out.fields)?,
            ScalarOrSeq::Seq(fields) => lower_multi_field(rule_name, ex, fields, &mut out.fields)?,
        };
        if !subexpr.is_empty() {
            out.condition_suffix.push_str(" and not ");
            out.condition_suffix.push_str(&subexpr);
        }
    }
    Ok(out)
}

/// Conjoin the lowered fragment onto `condition`, or return the condition
/// untouched when there is nothing to conjoin.
#[must_use]
pub fn conjoin(condition: &str, lowered: &LoweredExceptions) -> String {
    if lowered.condition_suffix.is_empty() {
        condition.to_owned()
    } else {
        format!("({condition}){}", lowered.condition_suffix)
    }
}

fn lower_single_field(
    rule_name: &str,
    ex: &Exception,
    field: &str,
    fields_out: &mut BTreeSet<String>,
) -> Result<String, LoadErrorKind> {
    if ex.values.is_empty() {
        return Ok(String::new());
    }
    let comp = match &ex.comps {
        ScalarOrSeq::Scalar(c) => c.as_str(),
        ScalarOrSeq::Seq(_) => {
            return Err(LoadErrorKind::ExceptionShapeMismatch {
                rule: rule_name.to_owned(),
                exception: ex.name.clone(),
            });
        }
    };
    let mut rendered = Vec::with_capacity(ex.values.len());
    for value in &ex.values {
        let ExceptionValue::Scalar(v) = value else {
            return Err(LoadErrorKind::ExceptionValueShape {
                rule: rule_name.to_owned(),
                exception: ex.name.clone(),
            });
        };
        rendered.push(quote_value(v));
        fields_out.insert(field.to_owned());
    }
    Ok(format!("({field} {comp} ({}))", rendered.join(", ")))
}

fn lower_multi_field(
    rule_name: &str,
    ex: &Exception,
    fields: &[String],
    fields_out: &mut BTreeSet<String>,
) -> Result<String, LoadErrorKind> {
    let comps = match &ex.comps {
        ScalarOrSeq::Seq(cs) => cs,
        ScalarOrSeq::Scalar(_) => {
            return Err(LoadErrorKind::ExceptionShapeMismatch {
                rule: rule_name.to_owned(),
                exception: ex.name.clone(),
            });
        }
    };
    if comps.len() != fields.len() {
        return Err(LoadErrorKind::ExceptionLengthMismatch {
            rule: rule_name.to_owned(),
            exception: ex.name.clone(),
        });
    }

    let mut subexpr = String::from("(");
    for value in &ex.values {
        let ExceptionValue::Seq(tuple) = value else {
            return Err(LoadErrorKind::ExceptionTupleLength {
                rule: rule_name.to_owned(),
                exception: ex.name.clone(),
            });
        };
        if tuple.len() != fields.len() {
            return Err(LoadErrorKind::ExceptionTupleLength {
                rule: rule_name.to_owned(),
                exception: ex.name.clone(),
            });
        }
        if subexpr != "(" {
            subexpr.push_str(" or ");
        }
        subexpr.push('(');
        for (k, (field, slot)) in fields.iter().zip(tuple).enumerate() {
            let comp = &comps[k];
            let rendered = match slot {
                ExceptionValue::Seq(elements) => {
                    let mut parts = Vec::with_capacity(elements.len());
                    for el in elements {
                        let ExceptionValue::Scalar(s) = el else {
                            return Err(LoadErrorKind::ExceptionValueShape {
                                rule: rule_name.to_owned(),
                                exception: ex.name.clone(),
                            });
                        };
                        parts.push(quote_item(s));
                    }
                    format!("({})", parts.join(", "))
                }
                ExceptionValue::Scalar(s) => {
                    if is_list_operator(comp) {
                        paren_item(s)
                    } else {
                        quote_item(s)
                    }
                }
            };
            if k > 0 {
                subexpr.push_str(" and ");
            }
            subexpr.push_str(field);
            subexpr.push(' ');
            subexpr.push_str(comp);
            subexpr.push(' ');
            subexpr.push_str(&rendered);
            fields_out.insert(field.clone());
        }
        subexpr.push(')');
    }
    subexpr.push(')');
    if subexpr == "()" {
        return Ok(String::new());
    }
    Ok(subexpr)
}
