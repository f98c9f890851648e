// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component I: the dependencies resolver (spec §4.I).
//!
//! Grounded on `original_source/src/lib/corelib/loader/dependenciesresolver.cpp`'s
//! `DependenciesResolver`. Cycle detection and the depth/priority bookkeeping reuse
//! [`crate::petgraph_support`]'s SCC/topological-order helpers, carried near-verbatim in spirit
//! from `guppy`'s own `petgraph_support` module.

pub mod multiplex;
pub mod resolver;

pub use multiplex::{adjust_for_multiplexing, MultiplexAdjustment};
pub use resolver::{DependenciesResolver, Frame, ProductDependencyState, StepOutcome};

use crate::item::SourceLocation;
use crate::qualified_id::QualifiedId;
use indexmap::IndexMap;

/// A parsed `Depends` item's relevant fields (spec §4.I, "Depends evaluation").
#[derive(Clone, Debug)]
pub struct DependsSpec {
    /// Where the `Depends` item is.
    pub location: SourceLocation,
    /// Module or product name being depended on. Mutually exclusive with `product_types`.
    pub name: Option<QualifiedId>,
    /// Extra name segments appended to `name` per entry (`submodules` > 1 forbids an `id`).
    pub submodules: Vec<String>,
    /// Product types to depend on instead of a specific name. Mutually exclusive with `name`.
    pub product_types: Vec<String>,
    /// Multiplex configuration ids to restrict the dependency to (unset means "no restriction",
    /// distinct from an explicit empty list).
    pub multiplex_configuration_ids: Option<Vec<String>>,
    /// Profiles to restrict the dependency to (unset means "use the depending product's own
    /// profile selection logic"; distinct from an explicit empty list).
    pub profiles: Option<Vec<String>>,
    /// Minimum version (inclusive), if any.
    pub version_at_least: Option<semver::Version>,
    /// Maximum version (exclusive), if any.
    pub version_below: Option<semver::Version>,
    /// Restricts matching product-type dependencies to siblings under the same sub-project.
    pub limit_to_sub_project: bool,
    /// If false, a missing dependency is tolerated (non-present module / simply absent).
    pub required: bool,
    /// Whether the module provider loader's fallback lookup mode applies to this edge.
    pub enable_fallback: bool,
    /// Parameters to forward to the dependency, already flattened to a plain map (spec §4.I:
    /// "translated to a plain variant map by reading its item-typed properties only").
    pub parameters: IndexMap<String, crate::item::VariantValue>,
}

impl DependsSpec {
    /// Validates the mutual-exclusion and shape invariants spec §4.I lists for `Depends`
    /// evaluation: `name`/`productTypes` are mutually exclusive, and `submodules.len() > 1`
    /// forbids an `id:` attribute (checked by the caller, which has access to the item's `id`).
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_some() && !self.product_types.is_empty() {
            return Err(crate::Error::Internal(format!(
                "Depends at {} sets both 'name' and 'productTypes'",
                self.location
            )));
        }
        if self.name.is_none() && self.product_types.is_empty() {
            return Err(crate::Error::Internal(format!(
                "Depends at {} sets neither 'name' nor 'productTypes'",
                self.location
            )));
        }
        Ok(())
    }

    /// The fully qualified name after appending `submodules`, for a name-based dependency.
    pub fn full_name(&self) -> Option<QualifiedId> {
        self.name.as_ref().map(|n| {
            let mut full = n.clone();
            full.push_segments(self.submodules.iter().cloned());
            full
        })
    }
}

/// One fully resolved (post-multiplex) dependency record ready for the instantiator (spec §4.I:
/// "a FIFO of fully resolved (multiplexed) dependency records").
#[derive(Clone, Debug)]
pub struct ResolvedDependency {
    /// The qualified module/product name this record targets.
    pub name: QualifiedId,
    /// If this targets a product rather than a disk module, the product's unique name.
    pub product_unique_name: Option<String>,
    /// Forwarded from the originating `Depends`.
    pub required: bool,
    pub enable_fallback: bool,
    pub version_at_least: Option<semver::Version>,
    pub version_below: Option<semver::Version>,
    pub parameters: IndexMap<String, crate::item::VariantValue>,
    pub location: SourceLocation,
}
