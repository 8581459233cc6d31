//! Attributes match events reported by the host back to the rule that
//! produced them, and keeps the running match counters.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::catalog::Catalog;
use crate::types::error::DispatchError;
use crate::types::priority::Priority;

/// Everything the host needs to render one rule match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule: String,
    pub priority_num: Priority,
    /// Output template, `*`-prefixed to mark it permissive for the
    /// downstream formatter.
    pub output: String,
    pub exception_fields: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

/// Running match counters, updated on every dispatched event.
#[derive(Debug, Clone, Default)]
pub struct RuleStats {
    total: u64,
    by_priority: BTreeMap<String, u64>,
    by_name: BTreeMap<String, u64>,
}

impl RuleStats {
    fn record(&mut self, priority: &str, rule_name: &str) {
        self.total += 1;
        *self.by_priority.entry(priority.to_owned()).or_default() += 1;
        *self.by_name.entry(rule_name.to_owned()).or_default() += 1;
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn by_priority(&self) -> &BTreeMap<String, u64> {
        &self.by_priority
    }

    #[must_use]
    pub fn by_name(&self) -> &BTreeMap<String, u64> {
        &self.by_name
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Look up the rule stamped with `rule_id` and record the match.
///
/// An unknown id, or an indexed rule missing from the by-name table, means
/// the host and the catalog disagree about what was loaded.
pub fn dispatch(
    catalog: &Catalog,
    stats: &mut RuleStats,
    rule_id: u32,
) -> Result<RuleMatch, DispatchError> {
    let name = catalog
        .rule_by_idx(rule_id)
        .ok_or(DispatchError::UnknownRuleId(rule_id))?;
    let rule = catalog.rules.get(name).ok_or_else(|| DispatchError::MissingRule {
        name: name.to_owned(),
    })?;

    stats.record(&rule.priority, &rule.name);

    Ok(RuleMatch {
        rule: rule.name.clone(),
        priority_num: rule.priority_num,
        output: format!("*{}", rule.output),
        exception_fields: rule.exception_fields.clone(),
        tags: rule.tags.clone(),
    })
}
