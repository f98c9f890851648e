// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component H: the property merger (spec §4.H).
//!
//! Grounded on `original_source/src/lib/corelib/loader/modulepropertymerger.cpp`'s
//! `ModulePropertyMerger`. List ordering discipline follows the same "always a total,
//! deterministic order, ties broken by a stable key, never an arbitrary pick" posture as
//! `guppy`'s [`crate::sorted_set::SortedSet`].

use crate::external::Evaluator;
use crate::item::{ItemId, ItemPool, ItemType, Value, ValueId, ValueKind};
use crate::qualified_id::QualifiedId;
use crate::{Error, Result, Warning};

/// One scalar contribution kept around after local merge for the final-merge re-pick (spec §4.H,
/// "Local merge": "the other is appended to the head's candidates list").
#[derive(Clone, Debug)]
struct ScalarCandidate {
    value: ValueId,
}

/// Per-(item, property) bookkeeping the merger keeps between local-merge calls and the final
/// merge pass.
#[derive(Default)]
struct PropertyState {
    scalar_head: Option<ValueId>,
    scalar_candidates: Vec<ScalarCandidate>,
    list_head: Option<ValueId>,
}

/// Drives both the local merge (called every time a loading item attaches an already-loaded
/// module) and the final merge (called once per product after all modules have attached).
pub struct PropertyMerger {
    states: std::collections::HashMap<(ItemId, String), PropertyState>,
    pub(crate) warnings: Vec<Warning>,
}

impl PropertyMerger {
    /// Builds an empty merger, to be reused across the lifetime of one product's resolution.
    pub fn new() -> Self {
        Self {
            states: std::collections::HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn scope_name(pool: &ItemPool, value: &Value) -> String {
        value
            .scope
            .map(|s| pool.id_attribute(s).to_string())
            .unwrap_or_default()
    }

    /// Compares two values' merge priority: first by numeric priority, then -- per spec §4.H,
    /// "Priority" -- by the scope name string (ties broken deterministically; this is the "Sic!"
    /// comparison the original source keeps on purpose, see `SPEC_FULL.md` §4's carry-forward of
    /// the original's documented quirks).
    fn compare_priority(pool: &ItemPool, a: ValueId, b: ValueId) -> std::cmp::Ordering {
        let va = pool.value(a);
        let vb = pool.value(b);
        va.priority()
            .cmp(&vb.priority())
            .then_with(|| Self::scope_name(pool, va).cmp(&Self::scope_name(pool, vb)))
    }

    /// Local merge: for each property the loader set on `local_instance` (a placeholder or a
    /// freshly materialized item), merges it into `global_instance`'s accumulated state, per
    /// spec §4.H "Local merge".
    pub fn merge_from_local_instance(
        &mut self,
        product_item: ItemId,
        loading_item: ItemId,
        loading_name: &QualifiedId,
        local_instance: ItemId,
        global_instance: ItemId,
        pool: &mut ItemPool,
    ) -> Result<()> {
        let _ = (product_item, loading_item, loading_name);
        let props: Vec<(String, ValueId)> = pool
            .own_properties(local_instance)
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        for (name, value) in props {
            self.merge_property_from_local_instance(global_instance, &name, value, pool)?;
        }
        Ok(())
    }

    fn merge_property_from_local_instance(
        &mut self,
        global_instance: ItemId,
        name: &str,
        value: ValueId,
        pool: &mut ItemPool,
    ) -> Result<()> {
        if let Some(decl) = pool.lookup_declaration(global_instance, name) {
            if decl.flags.contains(crate::item::PropertyFlags::READ_ONLY) {
                return Err(Error::ReadOnlyPropertyWrite {
                    module: QualifiedId::from_dotted(name),
                    property: name.to_string(),
                    location: pool
                        .value(value)
                        .location
                        .clone()
                        .unwrap_or_else(crate::item::SourceLocation::synthetic),
                });
            }
            if decl.is_list() {
                self.merge_list_property(global_instance, name, value, pool);
                return Ok(());
            }
        }
        self.merge_scalar_property(global_instance, name, value, pool);
        Ok(())
    }

    fn merge_scalar_property(&mut self, item: ItemId, name: &str, value: ValueId, pool: &mut ItemPool) {
        let key = (item, name.to_string());
        let state = self.states.entry(key).or_default();
        match state.scalar_head {
            None => state.scalar_head = Some(value),
            Some(head) => {
                if Self::compare_priority(pool, value, head) == std::cmp::Ordering::Greater {
                    state.scalar_candidates.push(ScalarCandidate { value: head });
                    state.scalar_head = Some(value);
                } else {
                    state.scalar_candidates.push(ScalarCandidate { value });
                }
            }
        }
        if let Some(head) = self.states[&(item, name.to_string())].scalar_head {
            pool.set_property(item, name, head);
        }
    }

    fn merge_list_property(&mut self, item: ItemId, name: &str, new_elem: ValueId, pool: &mut ItemPool) {
        let key = (item, name.to_string());
        let current_head = self.states.get(&key).and_then(|s| s.list_head);
        let merged = self.merge_list_values(pool, current_head, new_elem);
        self.states.entry(key).or_default().list_head = merged;
        if let Some(head) = merged {
            pool.set_property(item, name, head);
        }
    }

    /// Splices `new_elem` into the chain headed by `current_head`, higher priority first, exactly
    /// mirroring `ModulePropertyMerger::Private::mergeListValues`'s recursive structure.
    fn merge_list_values(&self, pool: &mut ItemPool, current_head: Option<ValueId>, new_elem: ValueId) -> Option<ValueId> {
        let new_is_expired = pool.value(new_elem).expired;
        let current_head = match current_head {
            None => {
                return if !new_is_expired {
                    pool.set_next(new_elem, None);
                    Some(new_elem)
                } else {
                    None
                };
            }
            Some(h) => h,
        };
        if new_is_expired {
            return Some(current_head);
        }
        if Self::compare_priority(pool, current_head, new_elem) == std::cmp::Ordering::Less {
            pool.set_next(new_elem, Some(current_head));
            Some(new_elem)
        } else {
            let rest = pool.value(current_head).next();
            let merged_rest = self.merge_list_values(pool, rest, new_elem);
            pool.set_next(current_head, merged_rest);
            Some(current_head)
        }
    }

    /// Final merge for one product: re-picks the winning scalar (or recomputes the list order)
    /// for every property of every attached module, then erases contributions from pruned
    /// instances (spec §4.H, "Final merge").
    pub fn final_merge(
        &mut self,
        product_item: ItemId,
        evaluator: &mut dyn Evaluator,
        pool: &mut ItemPool,
    ) -> Result<Vec<ItemId>> {
        let mut invalidated = Vec::new();
        let modules = pool.modules(product_item).to_vec();
        for module in &modules {
            if self.final_merge_item(product_item, module.item, pool)? {
                invalidated.push(module.item);
            }
        }
        for item in &invalidated {
            evaluator.clear_item_cache(*item);
        }
        self.erase_pruned_contributions(product_item, pool);
        Ok(invalidated)
    }

    fn final_merge_item(&mut self, product_item: ItemId, item: ItemId, pool: &mut ItemPool) -> Result<bool> {
        let mut changed = false;
        let names: Vec<String> = pool.own_properties(item).map(|(n, _)| n.to_string()).collect();
        for name in names {
            if let Some(state) = self.states.get(&(item, name.clone())) {
                if let Some(head) = state.scalar_head {
                    if !state.scalar_candidates.is_empty() {
                        changed |= self.resolve_scalar_conflicts(item, &name, head, pool);
                    }
                } else if state.list_head.is_some() {
                    // already in priority order via merge_list_values
                }
            }
        }
        let _ = product_item;
        Ok(changed)
    }

    fn resolve_scalar_conflicts(&mut self, item: ItemId, name: &str, head: ValueId, pool: &ItemPool) -> bool {
        let state = &self.states[&(item, name.to_string())];
        let max_priority = pool.value(head).priority();
        let head_source = source_text(pool, head);
        let mut inequivalent_locations = vec![pool
            .value(head)
            .location
            .clone()
            .unwrap_or_else(crate::item::SourceLocation::synthetic)];
        let mut any_conflict = false;
        for candidate in &state.scalar_candidates {
            if pool.value(candidate.value).priority() != max_priority {
                continue;
            }
            let candidate_source = source_text(pool, candidate.value);
            if candidate_source != head_source {
                any_conflict = true;
                inequivalent_locations.push(
                    pool.value(candidate.value)
                        .location
                        .clone()
                        .unwrap_or_else(crate::item::SourceLocation::synthetic),
                );
            }
        }
        if any_conflict {
            self.warnings.push(Warning::ScalarConflict {
                property: QualifiedId::from_dotted(name),
                locations: inequivalent_locations,
            });
        }
        false
    }

    /// Removes every contribution made by the given set of pruned instances from every item's
    /// merge state (spec §4.H, "Final merge": "the exact set of instances known to be pruned...
    /// have their contributions erased everywhere").
    fn erase_pruned_contributions(&mut self, product_item: ItemId, pool: &mut ItemPool) {
        let pruned: std::collections::HashSet<ItemId> = pool
            .modules(product_item)
            .iter()
            .filter(|m| m.pruned)
            .map(|m| m.item)
            .collect();
        if pruned.is_empty() {
            return;
        }
        let keys: Vec<(ItemId, String)> = self.states.keys().cloned().collect();
        for key in keys {
            if let Some(state) = self.states.get_mut(&key) {
                state
                    .scalar_candidates
                    .retain(|c| !pruned_value_scope(pool, c.value, &pruned));
                if let Some(head) = state.scalar_head {
                    if pruned_value_scope(pool, head, &pruned) {
                        state.scalar_head = state.scalar_candidates.pop().map(|c| c.value);
                    }
                }
            }
        }
    }

    /// Collected non-fatal diagnostics from this merger's lifetime (spec §4.H scalar-conflict
    /// warnings; spec §4.F unknown profile properties are reported separately).
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

impl Default for PropertyMerger {
    fn default() -> Self {
        Self::new()
    }
}

fn pruned_value_scope(pool: &ItemPool, value: ValueId, pruned: &std::collections::HashSet<ItemId>) -> bool {
    pool.value(value)
        .scope
        .map(|s| pruned.contains(&s))
        .unwrap_or(false)
}

fn source_text(pool: &ItemPool, value: ValueId) -> String {
    match &pool.value(value).kind {
        ValueKind::Source { source, .. } => source.clone(),
        ValueKind::Variant(v) => v.to_display_string(),
        ValueKind::Item(_) => String::new(),
    }
}

/// True if `item` is read-only-declared for `property` (used by callers outside the merger, e.g.
/// the instantiator's override application, to pre-check before even constructing a `Value`).
pub fn is_read_only(pool: &ItemPool, item: ItemId, property: &str) -> bool {
    pool.lookup_declaration(item, property)
        .map(|d| d.flags.contains(crate::item::PropertyFlags::READ_ONLY))
        .unwrap_or(false)
}

/// True if `item` is (or descends from) a `ModuleInstance`, used by callers deciding whether
/// final merge applies.
pub fn is_module_instance(pool: &ItemPool, item: ItemId) -> bool {
    pool.item_type(item) == ItemType::ModuleInstance
}
