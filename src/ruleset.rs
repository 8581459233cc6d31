//! The top-level context object tying the loader passes, the event
//! dispatcher, and the describer together.

use std::collections::BTreeMap;

use tracing::info;

use crate::describe;
use crate::events::{self, RuleMatch, RuleStats};
use crate::host::{FilterCompiler, RulesEngineHost};
use crate::source_map::SourceMap;
use crate::types::catalog::Catalog;
use crate::types::error::{DispatchError, LoadError, LoadWarning};
use crate::types::priority::Priority;
use crate::{compile, loader};

/// Caller-supplied knobs for one load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Log an info-level summary after a successful load.
    pub verbose: bool,
    /// Suppress the too-broad-event-type warning.
    pub all_events: bool,
    /// Extra output template appended (or substituted for
    /// `%container.info`) on syscall rules.
    pub extra: String,
    /// Substitute `extra` for `%container.info` instead of the default
    /// container expansion.
    pub replace_container_info: bool,
    /// Rules with a priority strictly less severe than this are skipped.
    pub min_priority: Priority,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            all_events: false,
            extra: String::new(),
            replace_container_info: false,
            min_priority: Priority::Debug,
        }
    }
}

/// The outcome of one load: version requirements surfaced by the documents
/// plus every diagnostic produced along the way.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct LoadReport {
    /// Maximum `required_engine_version` across all documents.
    pub required_engine_version: u64,
    /// Accumulated `required_plugin_versions`; satisfying them is the
    /// caller's responsibility.
    pub required_plugin_versions: BTreeMap<String, Vec<String>>,
    pub errors: Vec<LoadError>,
    pub warnings: Vec<LoadWarning>,
}

impl LoadReport {
    /// Whether the load completed without fatal errors.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Owns the catalog and match counters across loads and event dispatches.
///
/// Single-threaded by design: a load fully completes (or fails) before any
/// event may be dispatched, and the host serializes dispatches.
#[derive(Debug, Default)]
pub struct Ruleset {
    catalog: Catalog,
    stats: RuleStats,
}

impl Ruleset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a rules document, replacing whatever a previous load produced.
    ///
    /// Runs pass 1 (document walk into the catalog), then pass 2 (list
    /// expansion, macro and rule compilation against `compiler`, filter
    /// registration with `host`). The first fatal error aborts the load;
    /// warnings accumulated up to that point are still returned.
    pub fn load_rules<H: RulesEngineHost, C: FilterCompiler>(
        &mut self,
        content: &str,
        host: &mut H,
        compiler: &C,
        opts: &LoadOptions,
    ) -> LoadReport {
        self.catalog = Catalog::new();
        self.stats.reset();

        let source_map = SourceMap::new(content);
        let mut report = LoadReport::default();
        let mut warnings = Vec::new();

        match loader::run(
            content,
            &source_map,
            host,
            opts.min_priority,
            &mut self.catalog,
            &mut warnings,
        ) {
            Ok(versions) => {
                report.required_engine_version = versions.engine_version;
                report.required_plugin_versions = versions.plugin_versions;
            }
            Err(err) => {
                report.errors.push(err);
                report.warnings = warnings;
                return report;
            }
        }

        if let Err(err) = compile::run(host, compiler, &mut self.catalog, opts, &mut warnings) {
            report.errors.push(err);
        }

        if opts.verbose && report.errors.is_empty() {
            info!(
                rules = self.catalog.rules.len(),
                skipped = self.catalog.skipped_rules.len(),
                macros = self.catalog.macros.len(),
                lists = self.catalog.lists.len(),
                warnings = warnings.len(),
                "loaded ruleset"
            );
        }

        report.warnings = warnings;
        report
    }

    /// Attribute a match event reported by the host and update the
    /// counters.
    pub fn on_event(&mut self, rule_id: u32) -> Result<RuleMatch, DispatchError> {
        events::dispatch(&self.catalog, &mut self.stats, rule_id)
    }

    /// Render the description table for one rule or for all loaded rules.
    pub fn describe(&self, name: Option<&str>) -> Result<String, DispatchError> {
        describe::describe_rules(&self.catalog, name)
    }

    /// Render the match-counter summary.
    #[must_use]
    pub fn render_stats(&self) -> String {
        describe::render_stats(&self.stats)
    }

    #[must_use]
    pub fn stats(&self) -> &RuleStats {
        &self.stats
    }

    /// Read-only view of the loaded catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Names of loaded rules that are enabled, in declaration order.
    #[must_use]
    pub fn enabled_rule_names(&self) -> Vec<&str> {
        self.catalog
            .ordered_rule_names
            .iter()
            .filter(|name| {
                self.catalog
                    .rules
                    .get(name.as_str())
                    .is_some_and(|r| r.enabled)
            })
            .map(String::as_str)
            .collect()
    }
}
