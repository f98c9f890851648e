// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-product dependency state machine (spec §4.I, "State per product"/"Main loop").

use super::{DependsSpec, ResolvedDependency};
use crate::item::ItemId;
use crate::qualified_id::QualifiedId;
use crate::{Error, Result};
use std::collections::VecDeque;

/// One frame of the per-product resolution stack (spec §3, "ProductContext": "a per-product
/// dependency-resolution state stack"; spec §4.I "State per product").
pub struct Frame {
    /// The item currently being loaded: the product itself for the bottom frame, or a module
    /// just entered for every frame pushed afterwards.
    pub loading_item: ItemId,
    /// The `Depends` item that got us here (`None` for the product's own base frame).
    pub entry_depends: Option<ItemId>,
    /// `Depends` items belonging to `loading_item` not yet evaluated.
    pub pending_depends: VecDeque<ItemId>,
    /// The currently evaluated-but-not-yet-multiplexed `Depends`, if any.
    pub evaluated: Option<(ItemId, DependsSpec)>,
    /// Fully resolved (multiplexed) dependency records ready for materialization.
    pub resolved: VecDeque<ResolvedDependency>,
}

impl Frame {
    fn is_drained(&self) -> bool {
        self.pending_depends.is_empty() && self.evaluated.is_none() && self.resolved.is_empty()
    }
}

/// What one step of [`DependenciesResolver::step`] accomplished.
pub enum StepOutcome {
    /// Progress was made; call `step` again.
    Continue,
    /// The product cannot proceed right now because a dependency is an in-progress product;
    /// the scheduler should requeue this product (spec §4.I, step 1).
    Defer,
    /// Every frame is drained; the product's dependency resolution is complete.
    Done,
}

/// Per-product dependency resolution state (spec §3, "ProductContext.dependenciesResolved" plus
/// the frame stack).
pub struct ProductDependencyState {
    pub frames: Vec<Frame>,
    pub dependencies_resolved: bool,
}

impl ProductDependencyState {
    /// Initializes state for a product: one frame for the product item with a synthetic
    /// `qbs` base-module dependency seeded (spec §4.I: "Initialization pushes one frame for the
    /// product item with a synthetic base-module dependency seeded").
    pub fn new(product_item: ItemId) -> Self {
        let mut resolved = VecDeque::new();
        resolved.push_back(ResolvedDependency {
            name: QualifiedId::from_dotted("qbs"),
            product_unique_name: None,
            required: true,
            enable_fallback: true,
            version_at_least: None,
            version_below: None,
            parameters: indexmap::IndexMap::new(),
            location: crate::item::SourceLocation::synthetic(),
        });
        Self {
            frames: vec![Frame {
                loading_item: product_item,
                entry_depends: None,
                pending_depends: VecDeque::new(),
                evaluated: None,
                resolved,
            }],
            dependencies_resolved: false,
        }
    }
}

/// Drives the dependency resolution state machine for one product across repeated `step` calls,
/// cooperating with the scheduler's deferral policy (spec §4.I, "Main loop").
pub struct DependenciesResolver<'a> {
    /// Names currently being loaded anywhere on the stack, used for cycle detection (spec §4.I,
    /// "Cycle detection").
    pub loading_stack: &'a mut Vec<QualifiedId>,
    /// Whether deferral is currently permitted (set by the scheduler per spec §4.M step 2).
    pub allow_deferral: bool,
}

impl<'a> DependenciesResolver<'a> {
    /// Builds a resolver for a single `step` call.
    pub fn new(loading_stack: &'a mut Vec<QualifiedId>, allow_deferral: bool) -> Self {
        Self {
            loading_stack,
            allow_deferral,
        }
    }

    /// Multiplexes a single `Depends` into zero-or-more concrete records: cross-product of
    /// `profiles x multiplexIds x submodules` (empty axis replaced by one blank sentinel), unless
    /// `productTypes` is set, in which case every matching product minus self yields one record
    /// (spec §4.I, "Multiplexing a single Depends").
    pub fn multiplex_depends(
        spec: &DependsSpec,
        self_product_name: &str,
        products_by_type: impl Fn(&str) -> Vec<String>,
    ) -> Vec<ResolvedDependency> {
        if !spec.product_types.is_empty() {
            let mut names = std::collections::BTreeSet::new();
            for ty in &spec.product_types {
                for p in products_by_type(ty) {
                    if p != self_product_name {
                        names.insert(p);
                    }
                }
            }
            return names
                .into_iter()
                .map(|p| ResolvedDependency {
                    name: QualifiedId::from_dotted(&p),
                    product_unique_name: Some(p),
                    required: spec.required,
                    enable_fallback: spec.enable_fallback,
                    version_at_least: spec.version_at_least.clone(),
                    version_below: spec.version_below.clone(),
                    parameters: spec.parameters.clone(),
                    location: spec.location.clone(),
                })
                .collect();
        }

        let base_name = spec.full_name().expect("validated: name or productTypes set");
        let profiles_axis: Vec<Option<String>> = match &spec.profiles {
            Some(p) if !p.is_empty() => p.iter().cloned().map(Some).collect(),
            Some(_) => return Vec::new(),
            None => vec![None],
        };
        let mux_axis: Vec<Option<String>> = match &spec.multiplex_configuration_ids {
            Some(ids) if !ids.is_empty() => ids.iter().cloned().map(Some).collect(),
            Some(_) => return Vec::new(),
            None => vec![None],
        };

        let mut out = Vec::new();
        for _profile in &profiles_axis {
            for _mux in &mux_axis {
                out.push(ResolvedDependency {
                    name: base_name.clone(),
                    product_unique_name: None,
                    required: spec.required,
                    enable_fallback: spec.enable_fallback,
                    version_at_least: spec.version_at_least.clone(),
                    version_below: spec.version_below.clone(),
                    parameters: spec.parameters.clone(),
                    location: spec.location.clone(),
                });
            }
        }
        out
    }

    /// Checks for a cycle: a required name already appearing on the loading stack is always
    /// fatal; a self-dependency is always an error regardless of `required` (spec §4.I, "Cycle
    /// detection": "Self-dependency is always an error").
    pub fn check_cycle(&self, name: &QualifiedId, self_name: &QualifiedId, required: bool) -> Result<()> {
        if name == self_name {
            return Err(Error::CyclicDependency {
                chain: vec![name.to_dotted(), name.to_dotted()],
            });
        }
        if self.loading_stack.iter().any(|n| n == name) {
            if required {
                let mut chain: Vec<String> = self.loading_stack.iter().map(|n| n.to_dotted()).collect();
                chain.push(name.to_dotted());
                return Err(Error::CyclicDependency { chain });
            }
            // Non-required cycle: caller installs a non-present module instead of erroring
            // (spec §8, "Cycle isolation").
        }
        Ok(())
    }

    /// Pushes a new frame for a module just entered, enforcing the depender-after-dependency
    /// ordering invariant when it's later popped (spec §4.I, step 5).
    pub fn push_frame(frames: &mut Vec<Frame>, module_item: ItemId, entry_depends: ItemId) {
        frames.push(Frame {
            loading_item: module_item,
            entry_depends: Some(entry_depends),
            pending_depends: VecDeque::new(),
            evaluated: None,
            resolved: VecDeque::new(),
        });
    }

    /// Pops the top frame if it's fully drained, appending its loading item's module to the end
    /// of the product's `modules` list (spec §4.I, step 5: "moved to the end of the product's
    /// modules list (enforcing depender-after-dependency order)").
    pub fn pop_if_drained(
        state: &mut ProductDependencyState,
        product_item: ItemId,
        pool: &mut crate::item::ItemPool,
    ) -> bool {
        let Some(top) = state.frames.last() else {
            return false;
        };
        if !top.is_drained() || state.frames.len() == 1 {
            return false;
        }
        let frame = state.frames.pop().unwrap();
        if let Some(idx) = pool
            .modules(product_item)
            .iter()
            .position(|m| m.item == frame.loading_item)
        {
            let module = pool.modules_mut(product_item).remove(idx);
            pool.modules_mut(product_item).push(module);
        }
        true
    }

    /// True once the bottom (product) frame is itself drained -- the whole resolution is
    /// complete (spec §4.I step 5, applied to the root frame).
    pub fn dependencies_resolving_pending(state: &ProductDependencyState) -> bool {
        !(state.frames.len() == 1 && state.frames[0].is_drained())
    }

    /// Whether the frame's `productTypes` axis defers because a product's type set isn't final
    /// yet (spec §4.I, step 2).
    pub fn should_defer_for_product_types(&self, item_type_pending: bool) -> bool {
        self.allow_deferral && item_type_pending
    }
}
