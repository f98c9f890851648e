// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multiplex adjustment of a `Depends` item: the decision table in spec §4.I.
//!
//! Grounded on `original_source/src/lib/corelib/loader/dependenciesresolver.cpp`'s
//! `adjustDependsItemForMultiplexing`.

use crate::multiplex::MultiplexId;
use crate::{Error, Result};

/// A multiplexed product variant as seen by the multiplex adjustment table: just enough
/// information to decide which variants a `Depends` edge should fan out to.
#[derive(Clone, Debug)]
pub struct MultiplexCandidate {
    /// This variant's multiplex configuration id.
    pub id: MultiplexId,
    /// The profile this variant was built under.
    pub profile: String,
    /// True if this is the synthetic aggregator for its product's multiplex set.
    pub is_aggregator: bool,
}

/// The outcome of adjusting one `Depends` edge for multiplexing: the set of dependency-target
/// multiplex ids to actually depend on.
#[derive(Clone, Debug)]
pub enum MultiplexAdjustment {
    /// Depend on every listed id (possibly a single one, possibly all of a non-multiplexed
    /// product's one implicit variant).
    Ids(Vec<MultiplexId>),
}

/// Implements the decision table in spec §4.I, "Multiplex adjustment of a Depends item".
///
/// - `product_multiplexed`/`product_profile`: whether the *depending* product is itself
///   multiplexed, and under what multiplex id (used for the "pick the d variant whose axis map
///   is a subset of p's" row).
/// - `dependency_candidates`: every variant of the dependency product (empty if the dependency
///   product isn't multiplexed at all -- then this function isn't called, the caller short
///   circuits to "normal").
/// - `profiles_filter`: the `Depends.profiles` field, distinguishing unset (`None`) from an
///   explicit empty list (`Some(vec![])`, which matches nothing).
/// - `shadow_target`: when the depending item is a shadow product, the specific dependency
///   multiplex id it must resolve to, short-circuiting the rest of the table (spec §4.I row
///   "(shadow)"; `SPEC_FULL.md` §2.5).
#[allow(clippy::too_many_arguments)]
pub fn adjust_for_multiplexing(
    product_multiplexed: bool,
    product_id: Option<&MultiplexId>,
    dependency_candidates: &[MultiplexCandidate],
    profiles_filter: Option<&[String]>,
    shadow_target: Option<&MultiplexId>,
    product_name: &str,
    dependency_name: &str,
) -> Result<MultiplexAdjustment> {
    if let Some(target) = shadow_target {
        return Ok(MultiplexAdjustment::Ids(vec![target.clone()]));
    }

    if dependency_candidates.is_empty() {
        return Err(Error::MultiplexResolutionFailed {
            product: product_name.to_string(),
            dependency: dependency_name.to_string(),
            candidates: Vec::new(),
            location: crate::item::SourceLocation::synthetic(),
        });
    }

    let aggregator = dependency_candidates.iter().find(|c| c.is_aggregator).cloned();
    let leaves: Vec<&MultiplexCandidate> = dependency_candidates.iter().filter(|c| !c.is_aggregator).collect();

    if !product_multiplexed {
        if let Some(profiles) = profiles_filter {
            let matching: Vec<MultiplexId> = leaves
                .iter()
                .filter(|c| profiles.contains(&c.profile))
                .map(|c| c.id.clone())
                .collect();
            return finish(matching, product_name, dependency_name);
        }
        if let Some(agg) = aggregator {
            return Ok(MultiplexAdjustment::Ids(vec![agg.id]));
        }
        let all: Vec<MultiplexId> = leaves.iter().map(|c| c.id.clone()).collect();
        return finish(all, product_name, dependency_name);
    }

    // Product is multiplexed.
    if let Some(profiles) = profiles_filter {
        let matching: Vec<MultiplexId> = leaves
            .iter()
            .filter(|c| profiles.contains(&c.profile))
            .map(|c| c.id.clone())
            .collect();
        return finish(matching, product_name, dependency_name);
    }

    // No `profiles` set: pick the one variant whose axis map is a subset of the depending
    // product's.
    let product_id = product_id.expect("multiplexed product must carry a multiplex id");
    let matching: Vec<MultiplexId> = leaves
        .iter()
        .filter(|c| c.id.is_subset_of(product_id))
        .map(|c| c.id.clone())
        .collect();
    if matching.len() > 1 {
        return Err(Error::MultiplexResolutionFailed {
            product: product_name.to_string(),
            dependency: dependency_name.to_string(),
            candidates: matching.iter().map(|m| m.encoded().to_string()).collect(),
            location: crate::item::SourceLocation::synthetic(),
        });
    }
    finish(matching, product_name, dependency_name)
}

fn finish(ids: Vec<MultiplexId>, product_name: &str, dependency_name: &str) -> Result<MultiplexAdjustment> {
    if ids.is_empty() {
        return Err(Error::MultiplexResolutionFailed {
            product: product_name.to_string(),
            dependency: dependency_name.to_string(),
            candidates: Vec::new(),
            location: crate::item::SourceLocation::synthetic(),
        });
    }
    Ok(MultiplexAdjustment::Ids(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use serde_json::Value as JsonValue;

    fn id_for(arch: &str) -> MultiplexId {
        let mut axes = IndexMap::new();
        axes.insert("qbs.architectures".to_string(), JsonValue::String(arch.to_string()));
        MultiplexId::encode(&axes)
    }

    fn leaf(arch: &str) -> MultiplexCandidate {
        MultiplexCandidate { id: id_for(arch), profile: "default".to_string(), is_aggregator: false }
    }

    fn aggregator() -> MultiplexCandidate {
        MultiplexCandidate { id: MultiplexId::none(), profile: "default".to_string(), is_aggregator: true }
    }

    // Spec §8 scenario 4: an unmultiplexed consumer with no `profiles` filter depends on the
    // aggregator alone, not on every leaf variant.
    #[test]
    fn unmultiplexed_consumer_with_no_profiles_filter_picks_the_aggregator() {
        let candidates = vec![leaf("x86"), leaf("arm"), aggregator()];
        let adjustment = adjust_for_multiplexing(false, None, &candidates, None, None, "App", "Lib").unwrap();
        let MultiplexAdjustment::Ids(ids) = adjustment;
        assert_eq!(ids, vec![MultiplexId::none()]);
    }

    #[test]
    fn unmultiplexed_consumer_without_aggregator_depends_on_every_leaf() {
        let candidates = vec![leaf("x86"), leaf("arm")];
        let adjustment = adjust_for_multiplexing(false, None, &candidates, None, None, "App", "Lib").unwrap();
        let MultiplexAdjustment::Ids(ids) = adjustment;
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn profiles_filter_narrows_to_matching_profiles_regardless_of_aggregator() {
        let mut arm = leaf("arm");
        arm.profile = "device".to_string();
        let candidates = vec![leaf("x86"), arm, aggregator()];
        let adjustment =
            adjust_for_multiplexing(false, None, &candidates, Some(&["device".to_string()]), None, "App", "Lib")
                .unwrap();
        let MultiplexAdjustment::Ids(ids) = adjustment;
        assert_eq!(ids, vec![id_for("arm")]);
    }

    #[test]
    fn multiplexed_consumer_picks_the_subset_variant() {
        let candidates = vec![leaf("x86"), leaf("arm")];
        let product_id = id_for("arm");
        let adjustment =
            adjust_for_multiplexing(true, Some(&product_id), &candidates, None, None, "App", "Lib").unwrap();
        let MultiplexAdjustment::Ids(ids) = adjustment;
        assert_eq!(ids, vec![id_for("arm")]);
    }

    #[test]
    fn shadow_target_short_circuits_the_rest_of_the_table() {
        let candidates = vec![leaf("x86"), leaf("arm"), aggregator()];
        let shadow = id_for("x86");
        let adjustment =
            adjust_for_multiplexing(true, None, &candidates, None, Some(&shadow), "App", "Lib").unwrap();
        let MultiplexAdjustment::Ids(ids) = adjustment;
        assert_eq!(ids, vec![id_for("x86")]);
    }

    #[test]
    fn no_candidates_is_a_resolution_failure() {
        let result = adjust_for_multiplexing(false, None, &[], None, None, "App", "Lib");
        assert!(matches!(result, Err(Error::MultiplexResolutionFailed { .. })));
    }
}
