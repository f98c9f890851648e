// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component D: the probes resolver (spec §4.D).
//!
//! Grounded on `original_source/src/lib/corelib/loader/probesresolver.cpp`'s `ProbesResolver`,
//! which matches a `Probe` item against prior-run and same-run caches before falling back to
//! actually running its `configure` script.

use crate::external::{EvalContext, Evaluator};
use crate::item::{ItemId, ItemPool, ItemType, SourceLocation, Value, VariantValue};
use crate::qualified_id::QualifiedId;
use crate::{Error, Result};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// The unique identity of a probe for cache-matching purposes (spec §3, "Probe": "Uniquely
/// identified for cache purposes by either global id (project-level) or product name
/// (product-level)").
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ProbeKey {
    /// A probe declared directly under a `Project` item, identified by its `id:` attribute.
    Global(String),
    /// A probe declared under a `Product` item, identified by the owning product's name.
    Product(String),
}

/// A resolved probe record (spec §3, "Probe").
#[derive(Clone, Debug)]
pub struct Probe {
    /// This probe's cache identity.
    pub key: ProbeKey,
    /// Where the `Probe` item appears in source.
    pub location: SourceLocation,
    /// Source text of the guarding `condition`.
    pub condition_source: String,
    /// Source text of the `configure` script.
    pub configure_source: String,
    /// Property values as captured before `configure` ran.
    pub initial_properties: BTreeMap<String, VariantValue>,
    /// Property values as computed after `configure` ran (equal to `initial_properties` when the
    /// probe didn't run, e.g. its condition was false).
    pub computed_properties: BTreeMap<String, VariantValue>,
    /// Files `configure` read, used to judge whether a cached result is stale.
    pub imported_files: Vec<String>,
    /// True if `configure` actually executed this run (false when reused from cache or skipped
    /// because the condition was false).
    pub did_run: bool,
}

impl Probe {
    fn matches_condition_and_initial(&self, condition_source: &str, initial: &BTreeMap<String, VariantValue>) -> bool {
        self.condition_source == condition_source && self.initial_properties == *initial
    }

    fn matches_cross_run(
        &self,
        condition_source: &str,
        initial: &BTreeMap<String, VariantValue>,
        configure_source: &str,
        last_resolve_time: Option<u64>,
        file_mtimes: &dyn Fn(&str) -> Option<u64>,
    ) -> bool {
        if !self.matches_condition_and_initial(condition_source, initial) {
            return false;
        }
        if self.configure_source != configure_source {
            return false;
        }
        match last_resolve_time {
            None => true,
            Some(resolve_time) => self
                .imported_files
                .iter()
                .all(|f| file_mtimes(f).map(|m| m <= resolve_time).unwrap_or(true)),
        }
    }
}

/// A cache of probe results carried across runs (project-level and product-level, per spec
/// §4.D "Matching").
#[derive(Clone, Debug, Default)]
pub struct ProbeCache {
    entries: Vec<Probe>,
}

impl ProbeCache {
    /// An empty cache, as used for a from-scratch run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a probe result, replacing any existing entry with the same key.
    pub fn insert(&mut self, probe: Probe) {
        self.entries.retain(|p| p.key != probe.key);
        self.entries.push(probe);
    }

    /// Every cached probe, for persistence by the caller.
    pub fn entries(&self) -> &[Probe] {
        &self.entries
    }

    fn find(&self, key: &ProbeKey) -> Option<&Probe> {
        self.entries.iter().find(|p| &p.key == key)
    }
}

/// Resolves the `Probe` children of an item, reusing cached results where possible and running
/// `configure` otherwise (spec §4.D).
pub struct ProbesResolver<'a> {
    evaluator: &'a mut dyn Evaluator,
    prior_run_cache: &'a ProbeCache,
    this_run_cache: &'a mut ProbeCache,
    force_execution: bool,
    last_resolve_time: Option<u64>,
    file_mtimes: Box<dyn Fn(&str) -> Option<u64> + 'a>,
}

impl<'a> ProbesResolver<'a> {
    /// Builds a resolver over the given evaluator and caches.
    pub fn new(
        evaluator: &'a mut dyn Evaluator,
        prior_run_cache: &'a ProbeCache,
        this_run_cache: &'a mut ProbeCache,
        force_execution: bool,
        last_resolve_time: Option<u64>,
        file_mtimes: impl Fn(&str) -> Option<u64> + 'a,
    ) -> Self {
        Self {
            evaluator,
            prior_run_cache,
            this_run_cache,
            force_execution,
            last_resolve_time,
            file_mtimes: Box::new(file_mtimes),
        }
    }

    /// Resolves every `Probe` child of `owner`, returning the resulting records in declaration
    /// order. `owner_key` supplies the probe-identity scope (global id for project-level probes,
    /// product name for product-level probes).
    pub fn resolve_probes(
        &mut self,
        owner: ItemId,
        pool: &mut ItemPool,
        owner_key: impl Fn(&str) -> ProbeKey,
    ) -> Result<Vec<Probe>> {
        let mut results = Vec::new();
        for probe_item in pool.children_of_type(owner, ItemType::Probe) {
            results.push(self.resolve_one(probe_item, pool, &owner_key)?);
        }
        Ok(results)
    }

    fn resolve_one(
        &mut self,
        probe_item: ItemId,
        pool: &mut ItemPool,
        owner_key: &dyn Fn(&str) -> ProbeKey,
    ) -> Result<Probe> {
        let id_attr = pool.id_attribute(probe_item).to_string();
        if id_attr.is_empty() {
            return Err(Error::Internal(format!(
                "probe at {} has an empty id",
                pool.location(probe_item)
            )));
        }
        let key = owner_key(&id_attr);
        let location = pool.location(probe_item).clone();

        let prev = self.evaluator.switch_context(EvalContext::ProbeExecution);
        let (condition, _) = self.evaluator.bool_value(probe_item, pool, "condition")?;
        let configure_source = self.read_configure_source(probe_item, pool)?;
        let initial = self.capture_initial_properties(probe_item, pool)?;
        self.evaluator.switch_context(prev);

        if !condition {
            let probe = Probe {
                key,
                location,
                condition_source: "false".to_string(),
                configure_source,
                initial_properties: initial.clone(),
                computed_properties: initial,
                imported_files: Vec::new(),
                did_run: false,
            };
            self.this_run_cache.insert(probe.clone());
            return Ok(probe);
        }

        if !self.force_execution {
            if let Some(reused) = self.try_reuse(&key, "true", &initial, &configure_source) {
                self.apply_to_item(probe_item, pool, &reused.computed_properties);
                self.this_run_cache.insert(reused.clone());
                return Ok(reused);
            }
        }

        self.run_configure(probe_item, pool, key, location, configure_source, initial)
    }

    fn try_reuse(
        &self,
        key: &ProbeKey,
        condition_source: &str,
        initial: &BTreeMap<String, VariantValue>,
        configure_source: &str,
    ) -> Option<Probe> {
        if let Some(same_run) = self
            .this_run_cache
            .find(key)
            .filter(|p| p.matches_condition_and_initial(condition_source, initial))
        {
            return Some(same_run.clone());
        }
        self.prior_run_cache.find(key).and_then(|p| {
            if p.matches_cross_run(
                condition_source,
                initial,
                configure_source,
                self.last_resolve_time,
                &*self.file_mtimes,
            ) {
                Some(p.clone())
            } else {
                None
            }
        })
    }

    fn run_configure(
        &mut self,
        probe_item: ItemId,
        pool: &mut ItemPool,
        key: ProbeKey,
        location: SourceLocation,
        configure_source: String,
        initial: BTreeMap<String, VariantValue>,
    ) -> Result<Probe> {
        if configure_source.is_empty() {
            return Err(Error::ProbeFailed {
                location,
                source: "probe has no 'configure' script".to_string(),
            });
        }
        let prev = self.evaluator.switch_context(EvalContext::ProbeExecution);
        let bindings: BTreeMap<String, Value> = initial
            .iter()
            .map(|(k, v)| (k.clone(), Value::variant(v.clone())))
            .collect();
        let handle = self.evaluator.compile_script(
            &configure_source,
            &initial.keys().cloned().collect::<Vec<_>>(),
            &location.file_path,
        )?;
        let run_result = self.evaluator.run_script(handle, &bindings);
        self.evaluator.switch_context(prev);
        let result_bindings = run_result.map_err(|e| Error::ProbeFailed {
            location: location.clone(),
            source: e.to_string(),
        })?;

        let mut computed = BTreeMap::new();
        for (name, value) in &result_bindings {
            let widened = match (pool.lookup_declaration(probe_item, name), &value.kind) {
                (Some(decl), crate::item::ValueKind::Variant(v)) if decl.is_list() => {
                    v.clone().widen_to_list()
                }
                (_, crate::item::ValueKind::Variant(v)) => v.clone(),
                _ => VariantValue::Undefined,
            };
            computed.insert(name.clone(), widened);
        }

        self.apply_to_item(probe_item, pool, &computed);

        let probe = Probe {
            key,
            location,
            condition_source: "true".to_string(),
            configure_source,
            initial_properties: initial,
            computed_properties: computed,
            imported_files: Vec::new(),
            did_run: true,
        };
        self.this_run_cache.insert(probe.clone());
        Ok(probe)
    }

    fn read_configure_source(&mut self, item: ItemId, pool: &ItemPool) -> Result<String> {
        if let Some(value_id) = pool.own_property(item, "configure") {
            if let crate::item::ValueKind::Source { source, .. } = &pool.value(value_id).kind {
                return Ok(source.clone());
            }
        }
        Ok(String::new())
    }

    fn capture_initial_properties(
        &mut self,
        item: ItemId,
        pool: &mut ItemPool,
    ) -> Result<BTreeMap<String, VariantValue>> {
        let mut out = BTreeMap::new();
        let decls: IndexMap<String, _> = pool
            .all_declarations(item)
            .into_iter()
            .map(|(k, v)| (k, v.clone()))
            .collect();
        for (name, decl) in decls {
            if name == "condition" || name == "configure" {
                continue;
            }
            let value = if decl.is_list() {
                let (v, _) = self.evaluator.string_list_value(item, pool, &name)?;
                VariantValue::StringList(v)
            } else {
                let (v, _) = self.evaluator.string_value(item, pool, &name)?;
                v.map(VariantValue::String).unwrap_or(VariantValue::Undefined)
            };
            out.insert(name, value);
        }
        Ok(out)
    }

    fn apply_to_item(&self, item: ItemId, pool: &mut ItemPool, properties: &BTreeMap<String, VariantValue>) {
        for (name, value) in properties {
            let value_id = pool.new_value(Value::variant(value.clone()));
            pool.set_property(item, name, value_id);
        }
    }
}

/// Derives the natural [`ProbeKey`] for a probe owned directly by a product.
pub fn product_probe_key(product_name: &str) -> ProbeKey {
    ProbeKey::Product(product_name.to_string())
}

/// Derives the natural [`ProbeKey`] for a probe owned by a project (keyed by its own `id:`).
pub fn global_probe_key(id: &str) -> ProbeKey {
    ProbeKey::Global(id.to_string())
}

/// Converts a dotted module-qualified probe name into a [`QualifiedId`] for diagnostics.
pub fn probe_qualified_name(owner: &str, id: &str) -> QualifiedId {
    QualifiedId::from_dotted(&format!("{owner}.{id}"))
}
