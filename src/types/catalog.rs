use std::collections::{BTreeMap, HashMap};

use super::ast::FilterNode;
use super::defs::{ListDef, MacroDef, RuleDef};

/// A macro that has been compiled to an AST, plus the flag recording whether
/// anything downstream referenced it.
#[derive(Debug, Clone)]
pub struct CompiledMacro {
    pub ast: FilterNode,
    pub used: bool,
}

/// A list whose references have been expanded and whose literal items have
/// been quoted, plus the usage flag.
#[derive(Debug, Clone)]
pub struct CompiledList {
    pub items: Vec<String>,
    pub used: bool,
}

/// Compiled macros by name. Handed mutably to the filter compiler so it can
/// mark the macros it substitutes as used.
pub type CompiledMacros = BTreeMap<String, CompiledMacro>;

/// Expanded lists by name, same mutability contract as [`CompiledMacros`].
pub type CompiledLists = BTreeMap<String, CompiledList>;

/// All loader state for one load: definitions by name, first-appearance
/// order, priority-skipped rules, the dense rule index, and the compiled
/// macro/list tables produced in pass 2.
///
/// Invariants upheld here:
/// - a rule name is in `rules` or `skipped_rules`, never both;
/// - every slot of `rules_by_idx` names a rule present in `rules`;
/// - each key of `rules` appears exactly once in `ordered_rule_names`.
#[derive(Debug, Default)]
pub struct Catalog {
    pub macros: HashMap<String, MacroDef>,
    pub lists: HashMap<String, ListDef>,
    pub rules: HashMap<String, RuleDef>,
    /// Rules dropped by the priority threshold. They still absorb `append`
    /// items and `enabled` toggles silently.
    pub skipped_rules: HashMap<String, RuleDef>,

    pub ordered_macro_names: Vec<String>,
    pub ordered_list_names: Vec<String>,
    pub ordered_rule_names: Vec<String>,

    /// Dense 1-based index -> rule name, populated only for rules that
    /// compiled against a valid source. Slot `i` holds the rule stamped with
    /// identifier `i + 1`.
    pub rules_by_idx: Vec<String>,

    pub compiled_macros: CompiledMacros,
    pub compiled_lists: CompiledLists,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The high-water mark of assigned rule identifiers.
    #[must_use]
    pub fn n_rules(&self) -> u32 {
        u32::try_from(self.rules_by_idx.len()).unwrap_or(u32::MAX)
    }

    /// The rule stamped with `rule_id`, if that identifier was assigned.
    #[must_use]
    pub fn rule_by_idx(&self, rule_id: u32) -> Option<&str> {
        if rule_id == 0 {
            return None;
        }
        self.rules_by_idx
            .get(rule_id as usize - 1)
            .map(String::as_str)
    }

    /// Assign the next dense identifier to `rule_name`.
    pub fn assign_idx(&mut self, rule_name: &str) -> u32 {
        self.rules_by_idx.push(rule_name.to_owned());
        self.n_rules()
    }

    /// Store a rule, keeping `rules` and `skipped_rules` disjoint and
    /// registering the name on first appearance.
    pub fn store_rule(&mut self, rule: RuleDef, skipped: bool) {
        let name = rule.name.clone();
        if skipped {
            self.rules.remove(&name);
            self.skipped_rules.insert(name, rule);
        } else {
            self.skipped_rules.remove(&name);
            if !self.ordered_rule_names.contains(&name) {
                self.ordered_rule_names.push(name.clone());
            }
            self.rules.insert(name, rule);
        }
    }

    /// Store a macro, registering the name on first appearance.
    pub fn store_macro(&mut self, m: MacroDef) {
        if !self.ordered_macro_names.contains(&m.name) {
            self.ordered_macro_names.push(m.name.clone());
        }
        self.macros.insert(m.name.clone(), m);
    }

    /// Store a list, registering the name on first appearance.
    pub fn store_list(&mut self, l: ListDef) {
        if !self.ordered_list_names.contains(&l.name) {
            self.ordered_list_names.push(l.name.clone());
        }
        self.lists.insert(l.name.clone(), l);
    }

    /// Clear everything pass 2 produced: the dense index and the compiled
    /// macro/list tables. The by-name tables from pass 1 are preserved.
    pub fn reset_compiled(&mut self) {
        self.rules_by_idx.clear();
        self.compiled_macros.clear();
        self.compiled_lists.clear();
    }
}
