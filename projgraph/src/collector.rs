// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component L: the products collector (spec §4.L).
//!
//! Grounded on `original_source/src/lib/corelib/loader/productscollector.cpp`'s
//! `ProductsCollector`, which walks the project tree, multiplexes each `Product` item, and folds
//! its `Export` children into a single product-module plus an optional shadow product.

use crate::item::{ItemId, ItemPool, ItemType, SourceLocation, Value, VariantValue};
use crate::multiplex::{MultiplexId, MultiplexInfo, Multiplexer};
use crate::{Error, Result};
use indexmap::IndexMap;

/// One real (possibly multiplexed) product produced by the collector, together with its
/// product-module and optional shadow.
pub struct CollectedProduct {
    /// The (possibly cloned-for-multiplexing) `Product` item.
    pub item: ItemId,
    /// This variant's multiplex id.
    pub multiplex_id: MultiplexId,
    /// True if this is the synthetic aggregator variant.
    pub is_aggregator: bool,
    /// The merged `Export` item serving as this product's product-module, if it has any
    /// `Export` children.
    pub product_module: Option<ItemId>,
    /// The synthesized `__shadow__<name>` product, present iff `product_module.is_some()`.
    pub shadow: Option<ItemId>,
}

/// Walks a project tree collecting and multiplexing products.
pub struct ProductsCollector;

impl ProductsCollector {
    /// Finds every `Product` item anywhere under `root` (recursively through `Project` children),
    /// applies command-line overrides, multiplexes each one, and merges its `Export` children.
    pub fn collect(
        root: ItemId,
        pool: &mut ItemPool,
        multiplex_info_for: impl Fn(ItemId, &ItemPool) -> MultiplexInfo,
    ) -> Result<Vec<CollectedProduct>> {
        let mut out = Vec::new();
        Self::walk(root, pool, &multiplex_info_for, &mut out)?;
        Ok(out)
    }

    fn walk(
        item: ItemId,
        pool: &mut ItemPool,
        multiplex_info_for: &impl Fn(ItemId, &ItemPool) -> MultiplexInfo,
        out: &mut Vec<CollectedProduct>,
    ) -> Result<()> {
        match pool.item_type(item) {
            ItemType::Product => {
                let info = multiplex_info_for(item, pool);
                let variants = Multiplexer::multiplex(item, &info, pool);
                for variant in variants {
                    let (product_module, shadow) = Self::merge_exports(variant.item, pool)?;
                    out.push(CollectedProduct {
                        item: variant.item,
                        multiplex_id: variant.id,
                        is_aggregator: variant.is_aggregator,
                        product_module,
                        shadow,
                    });
                }
            }
            ItemType::Project => {
                for child in pool.children(item).to_vec() {
                    Self::walk(child, pool, multiplex_info_for, out)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Collects every `Export` child of a product, verifies at most one per originating source
    /// file, and merges them into a single virtual `Export` item whose properties are the union
    /// of every contributor's assignments and whose `defaultParameters` map accumulates each
    /// `Export`'s own parameter defaults (spec §4.L, second half).
    ///
    /// If any `Export` exists, also synthesizes a `__shadow__<name>` product item with a single
    /// optional `Depends` on the real product, for later product-module evaluation from an
    /// external viewer's vantage point (spec §4.L: "synthesize a shadow product").
    fn merge_exports(product_item: ItemId, pool: &mut ItemPool) -> Result<(Option<ItemId>, Option<ItemId>)> {
        let exports = pool.children_of_type(product_item, ItemType::Export);
        if exports.is_empty() {
            return Ok((None, None));
        }

        let mut seen_files = std::collections::HashSet::new();
        for export in &exports {
            let file = pool.location(*export).file_path.clone();
            if !seen_files.insert(file.clone()) {
                return Err(Error::Internal(format!(
                    "more than one Export item in the same source file '{file}'"
                )));
            }
        }

        let merged = pool.new_item(ItemType::Export, SourceLocation::synthetic());
        let mut default_parameters = IndexMap::new();
        for export in &exports {
            let props: Vec<(String, _)> = pool
                .own_properties(*export)
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            for (name, value_id) in props {
                if name == "defaultParameters" {
                    if let crate::item::ValueKind::Variant(VariantValue::Json(serde_json::Value::Object(map))) =
                        &pool.value(value_id).kind
                    {
                        for (k, v) in map {
                            default_parameters.insert(k.clone(), v.clone());
                        }
                    }
                    continue;
                }
                let cloned = pool.value(value_id).clone();
                let new_id = pool.new_value(cloned);
                pool.set_property(merged, &name, new_id);
            }
            for child in pool.children(*export).to_vec() {
                pool.add_child(merged, child);
            }
        }
        if !default_parameters.is_empty() {
            let value_id = pool.new_value(Value::variant(VariantValue::Json(serde_json::Value::Object(
                default_parameters.into_iter().collect(),
            ))));
            pool.set_property(merged, "defaultParameters", value_id);
        }
        pool.add_child(product_item, merged);

        let product_name = Self::read_name(pool, product_item);
        let shadow = pool.new_item(ItemType::Product, SourceLocation::synthetic());
        pool.set_id_attribute(shadow, format!("__shadow__{product_name}"));
        let depends = pool.new_item(ItemType::Depends, SourceLocation::synthetic());
        let name_value = pool.new_value(Value::variant(VariantValue::String(product_name)));
        pool.set_property(depends, "name", name_value);
        let required_value = pool.new_value(Value::variant(VariantValue::Bool(false)));
        pool.set_property(depends, "required", required_value);
        pool.add_child(shadow, depends);

        Ok((Some(merged), Some(shadow)))
    }

    fn read_name(pool: &ItemPool, product_item: ItemId) -> String {
        if let Some(value_id) = pool.own_property(product_item, "name") {
            if let crate::item::ValueKind::Variant(VariantValue::String(s)) = &pool.value(value_id).kind {
                return s.clone();
            }
        }
        pool.id_attribute(product_item).to_string()
    }
}
