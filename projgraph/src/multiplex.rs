// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component K: the product multiplexer (spec §4.K).
//!
//! Grounded on `original_source/src/lib/corelib/loader/productitemmultiplexer.cpp`'s
//! `ProductItemMultiplexer`, which expands one `Product` declaration along configured axes into
//! several variant items plus an optional aggregator. Cross-product enumeration follows the same
//! "generate every combination, fold duplicates, keep a stable order" style as `guppy`'s
//! `graph::feature::select` feature-set expansion.

use crate::item::{ItemId, ItemPool};
use base64::Engine;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// A stable, base64-encoded JSON serialization of a product variant's axis values (spec §3,
/// "ProductContext.multiplexConfigurationId"; GLOSSARY "Multiplex configuration id").
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct MultiplexId(String);

impl MultiplexId {
    /// The empty id, used for products that aren't multiplexed at all.
    pub fn none() -> Self {
        MultiplexId(String::new())
    }

    /// Encodes an ordered axis-value map into a multiplex id.
    pub fn encode(axes: &IndexMap<String, JsonValue>) -> Self {
        if axes.is_empty() {
            return Self::none();
        }
        let json = JsonValue::Object(axes.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        let bytes = serde_json::to_vec(&json).unwrap_or_default();
        MultiplexId(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// The raw encoded string, as stored on `ProductContext`/used as a cache key.
    pub fn encoded(&self) -> &str {
        &self.0
    }

    /// Decodes back into the axis-value map, for downstream consumers (spec §3:
    /// "`TopLevelProject` exposes... so downstream layers can decode it").
    pub fn decode(&self) -> Option<IndexMap<String, JsonValue>> {
        if self.0.is_empty() {
            return Some(IndexMap::new());
        }
        let bytes = base64::engine::general_purpose::STANDARD.decode(&self.0).ok()?;
        let value: JsonValue = serde_json::from_slice(&bytes).ok()?;
        match value {
            JsonValue::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }

    /// True if every axis in `self` also appears with the same value in `other` (spec §4.I
    /// multiplex table: "pick the d variant whose axis map is a subset of p's").
    pub fn is_subset_of(&self, other: &MultiplexId) -> bool {
        let (Some(mine), Some(theirs)) = (self.decode(), other.decode()) else {
            return self == other;
        };
        mine.iter().all(|(k, v)| theirs.get(k) == Some(v))
    }
}

/// Configuration for multiplexing one product: which axes to expand and whether to synthesize an
/// aggregator (spec §4.K; grounded on `MultiplexInfo` in `productitemmultiplexer.cpp`).
#[derive(Clone, Debug, Default)]
pub struct MultiplexInfo {
    /// Axis name -> ordered list of values (e.g. `qbs.architectures` -> `["x86", "arm"]`).
    pub axes: IndexMap<String, Vec<JsonValue>>,
    /// Whether to synthesize an aggregator product depending on every real variant.
    pub aggregate: bool,
}

/// One multiplexed variant of a product.
pub struct MultiplexedProduct {
    /// The cloned, per-variant product item.
    pub item: ItemId,
    /// This variant's multiplex id.
    pub id: MultiplexId,
    /// True if this is the synthetic aggregator rather than a real buildable variant.
    pub is_aggregator: bool,
}

/// Expands `product_item` into a set of multiplexed products plus an optional aggregator (spec
/// §4.K).
pub struct Multiplexer;

impl Multiplexer {
    /// Computes the cross product of every axis in `info.axes`, in first-axis-varies-slowest
    /// order (matching the original's nested-loop expansion), and clones `product_item` once per
    /// combination via [`ItemPool::clone_subtree`]. If `info.aggregate` is set, also clones one
    /// more variant to serve as the aggregator, depending on every real variant through a
    /// synthetic `Depends` the caller attaches (spec §4.K, grounded on
    /// `productitemmultiplexer.cpp`'s use of `Item::clone` + a synthesized `multiplexConfigurationIds`
    /// dependency).
    pub fn multiplex(product_item: ItemId, info: &MultiplexInfo, pool: &mut ItemPool) -> Vec<MultiplexedProduct> {
        if info.axes.is_empty() {
            return vec![MultiplexedProduct {
                item: product_item,
                id: MultiplexId::none(),
                is_aggregator: false,
            }];
        }

        let combinations = Self::cross_product(&info.axes);
        let mut out = Vec::with_capacity(combinations.len() + info.aggregate as usize);
        for combo in &combinations {
            let clone = pool.clone_subtree(product_item);
            out.push(MultiplexedProduct {
                item: clone,
                id: MultiplexId::encode(combo),
                is_aggregator: false,
            });
        }
        if info.aggregate {
            let aggregator = pool.clone_subtree(product_item);
            out.push(MultiplexedProduct {
                item: aggregator,
                id: MultiplexId::none(),
                is_aggregator: true,
            });
        }
        out
    }

    fn cross_product(axes: &IndexMap<String, Vec<JsonValue>>) -> Vec<IndexMap<String, JsonValue>> {
        let mut combos: Vec<IndexMap<String, JsonValue>> = vec![IndexMap::new()];
        for (axis_name, values) in axes {
            if values.is_empty() {
                continue;
            }
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in values {
                    let mut extended = combo.clone();
                    extended.insert(axis_name.clone(), value.clone());
                    next.push(extended);
                }
            }
            combos = next;
        }
        combos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemType, SourceLocation};

    #[test]
    fn multiplex_id_round_trips() {
        let mut axes = IndexMap::new();
        axes.insert("qbs.architectures".to_string(), JsonValue::String("x86".to_string()));
        let id = MultiplexId::encode(&axes);
        let decoded = id.decode().unwrap();
        assert_eq!(decoded.get("qbs.architectures"), Some(&JsonValue::String("x86".to_string())));
    }

    #[test]
    fn no_axes_yields_single_unmultiplexed_variant() {
        let mut pool = ItemPool::new();
        let product = pool.new_item(ItemType::Product, SourceLocation::synthetic());
        let variants = Multiplexer::multiplex(product, &MultiplexInfo::default(), &mut pool);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].id, MultiplexId::none());
        assert!(!variants[0].is_aggregator);
    }

    #[test]
    fn two_architectures_with_aggregate_yields_three_variants() {
        let mut pool = ItemPool::new();
        let product = pool.new_item(ItemType::Product, SourceLocation::synthetic());
        let mut axes = IndexMap::new();
        axes.insert(
            "qbs.architectures".to_string(),
            vec![JsonValue::String("x86".to_string()), JsonValue::String("arm".to_string())],
        );
        let info = MultiplexInfo { axes, aggregate: true };
        let variants = Multiplexer::multiplex(product, &info, &mut pool);
        assert_eq!(variants.len(), 3);
        assert_eq!(variants.iter().filter(|v| v.is_aggregator).count(), 1);
    }

    #[cfg(feature = "proptest1")]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn axis_value_strategy() -> impl Strategy<Value = JsonValue> {
            prop_oneof![
                "[a-z]{1,8}".prop_map(JsonValue::String),
                any::<bool>().prop_map(JsonValue::Bool),
            ]
        }

        proptest! {
            #[test]
            fn multiplex_id_round_trips_arbitrary_axes(
                pairs in proptest::collection::vec(("[a-z.]{1,16}", axis_value_strategy()), 0..6)
            ) {
                let mut axes = IndexMap::new();
                for (name, value) in pairs {
                    axes.insert(name, value);
                }
                let id = MultiplexId::encode(&axes);
                let decoded = id.decode().expect("a freshly-encoded id always decodes");
                prop_assert_eq!(decoded, axes);
            }
        }
    }
}
