//! Human-readable dumps: the rule description table and the match-counter
//! summary.

use std::fmt::Write as _;

use crate::events::RuleStats;
use crate::types::catalog::Catalog;
use crate::types::error::DispatchError;

const NAME_COLUMN_WIDTH: usize = 50;
const DESC_WRAP_WIDTH: usize = 60;

/// Render the description table for one rule, or for every loaded rule when
/// `name` is `None`.
pub fn describe_rules(catalog: &Catalog, name: Option<&str>) -> Result<String, DispatchError> {
    let mut out = String::new();
    let _ = writeln!(out, "{:NAME_COLUMN_WIDTH$} {}", "Rule", "Description");
    let _ = writeln!(out, "{:NAME_COLUMN_WIDTH$} {}", "----", "-----------");

    match name {
        Some(name) => {
            let rule = catalog
                .rules
                .get(name)
                .ok_or_else(|| DispatchError::UnknownRule {
                    name: name.to_owned(),
                })?;
            describe_one(&mut out, &rule.name, &rule.desc);
        }
        None => {
            for name in &catalog.ordered_rule_names {
                if let Some(rule) = catalog.rules.get(name) {
                    describe_one(&mut out, &rule.name, &rule.desc);
                }
            }
        }
    }
    Ok(out)
}

fn describe_one(out: &mut String, name: &str, desc: &str) {
    let lines = wrap_words(desc, DESC_WRAP_WIDTH);
    match lines.first() {
        Some(first) => {
            let _ = writeln!(out, "{name:NAME_COLUMN_WIDTH$} {first}");
        }
        None => {
            let _ = writeln!(out, "{name:NAME_COLUMN_WIDTH$}");
        }
    }
    for line in lines.iter().skip(1) {
        let _ = writeln!(out, "{:NAME_COLUMN_WIDTH$} {line}", "");
    }
}

/// Render the match-counter summary.
#[must_use]
pub fn render_stats(stats: &RuleStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Events detected: {}", stats.total());
    let _ = writeln!(out, "Rule counts by severity:");
    for (priority, count) in stats.by_priority() {
        let _ = writeln!(out, "   {priority}: {count}");
    }
    let _ = writeln!(out, "Triggered rules by rule name:");
    for (name, count) in stats.by_name() {
        let _ = writeln!(out, "   {name}: {count}");
    }
    out
}

/// Greedy word wrap at `width` columns. Words longer than the width get a
/// line of their own.
fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
