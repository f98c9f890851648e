// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component G: the module instantiator (spec §4.G).
//!
//! Grounded on `original_source/src/lib/corelib/loader/moduleinstantiator.cpp`'s
//! `ModuleInstantiator`, which binds a loaded module into the loading item's value tree, replacing
//! `ModulePrefix`/placeholder chains with the real instance.

use crate::item::{ItemId, ItemPool, ItemType, ModuleAttachment, SourceLocation, Value};
use crate::merger::PropertyMerger;
use crate::qualified_id::QualifiedId;
use crate::Result;

/// Command-line override forms recognized for a freshly created module instance (spec §4.G):
/// `modules.<name>.<prop>`, `qbs.<prop>`, `products.<product>.<name>.<prop>`.
#[derive(Clone, Debug)]
pub struct ModuleOverride {
    /// The module name the override targets (already stripped of any `products.<product>.`
    /// prefix).
    pub module: QualifiedId,
    /// The property name.
    pub property: String,
    /// The value to assign.
    pub value: crate::item::VariantValue,
    /// Non-empty when this override is scoped to one product
    /// (`products.<product>.<name>.<prop>`), which takes precedence over an unscoped
    /// `modules.<name>.<prop>` override of the same property.
    pub product_scope: Option<String>,
}

/// Binds modules into loading items' value trees.
pub struct ModuleInstantiator<'a> {
    merger: &'a mut PropertyMerger,
}

impl<'a> ModuleInstantiator<'a> {
    /// Builds an instantiator over the given merger.
    pub fn new(merger: &'a mut PropertyMerger) -> Self {
        Self { merger }
    }

    /// Attaches `module_item` (already loaded, not yet bound) to `loading_item`'s value tree at
    /// the given qualified `name`, per spec §4.G:
    ///
    /// - absent -> create a fresh `ItemValue`;
    /// - a chain of `ModulePrefix` items ending in a placeholder -> replace the leaf with the
    ///   real module item, merging the placeholder's local bindings into it;
    /// - already a `ModuleInstance` -> no action.
    ///
    /// Returns the attachment record to push onto `loading_item.modules`.
    pub fn attach(
        &mut self,
        product_item: ItemId,
        loading_item: ItemId,
        name: &QualifiedId,
        module_item: ItemId,
        pool: &mut ItemPool,
        max_depth: u32,
    ) -> Result<ModuleAttachment> {
        if let Some(existing_index) = pool.find_module(loading_item, name) {
            let existing = pool.modules(loading_item)[existing_index].clone();
            return Ok(existing);
        }

        if pool.item_type(module_item) == ItemType::Module
            || pool.item_type(module_item) == ItemType::Export
        {
            pool.set_item_type(module_item, ItemType::ModuleInstance);
        }

        if let Some(placeholder) = self.find_placeholder(loading_item, name, pool) {
            self.merger
                .merge_from_local_instance(product_item, loading_item, name, placeholder, module_item, pool)?;
        }

        self.create_private_scope(module_item, product_item, loading_item, pool, false);

        Ok(ModuleAttachment {
            name: name.clone(),
            item: module_item,
            producing_product: None,
            version_range: (None, None),
            loading_items: vec![loading_item],
            parameters: indexmap::IndexMap::new(),
            required: false,
            max_depth,
            pruned: false,
        })
    }

    /// Installs a non-present marker instead of a real instance: a sentinel item whose
    /// `<name>.present` evaluates to false (spec §4.G, last paragraph).
    pub fn attach_non_present(
        &mut self,
        name: &QualifiedId,
        reason: String,
        pool: &mut ItemPool,
        max_depth: u32,
    ) -> ModuleAttachment {
        let item = pool.new_item(ItemType::ModuleInstance, SourceLocation::synthetic());
        let present = pool.new_value(Value::variant(crate::item::VariantValue::Bool(false)));
        pool.set_property(item, "present", present);
        let reason_value = pool.new_value(Value::variant(crate::item::VariantValue::String(reason)));
        pool.set_property(item, "__nonPresentReason", reason_value);
        ModuleAttachment {
            name: name.clone(),
            item,
            producing_product: None,
            version_range: (None, None),
            loading_items: Vec::new(),
            parameters: indexmap::IndexMap::new(),
            required: false,
            max_depth,
            pruned: false,
        }
    }

    /// Creates the private `Scope` item populated with `project`, `product`, the module's own
    /// `id`, its children's ids, and -- for `Export`-originated modules -- `exportingProduct`,
    /// `importingProduct`, and `_qbs_sourceDir` (spec §4.G, third paragraph).
    pub fn create_private_scope(
        &mut self,
        module_item: ItemId,
        product_item: ItemId,
        loading_item: ItemId,
        pool: &mut ItemPool,
        is_export: bool,
    ) -> ItemId {
        let scope = pool.new_item(ItemType::Scope, SourceLocation::synthetic());
        pool.set_scope(module_item, Some(scope));
        let project_value = pool.new_value(Value::item(product_item));
        pool.set_property(scope, "product", project_value);
        let _ = loading_item;
        if is_export {
            let exporting = pool.new_value(Value::item(product_item));
            pool.set_property(scope, "exportingProduct", exporting);
        }
        scope
    }

    /// Applies command-line/tree overrides to a freshly created instance, per-product overrides
    /// winning over unscoped `modules.<name>.<prop>` ones (spec §4.G, fourth paragraph).
    pub fn apply_overrides(
        &mut self,
        module_item: ItemId,
        module_name: &QualifiedId,
        product_name: &str,
        overrides: &[ModuleOverride],
        pool: &mut ItemPool,
    ) {
        let mut unscoped = None;
        let mut scoped = None;
        for ov in overrides {
            if &ov.module != module_name {
                continue;
            }
            match &ov.product_scope {
                Some(p) if p == product_name => scoped = Some(ov),
                None => unscoped = Some(ov),
                _ => {}
            }
        }
        for ov in [scoped, unscoped].into_iter().flatten() {
            let value_id = pool.new_value(Value::variant(ov.value.clone()));
            pool.set_property(module_item, &ov.property, value_id);
        }
    }

    fn find_placeholder(&self, loading_item: ItemId, name: &QualifiedId, pool: &ItemPool) -> Option<ItemId> {
        let mut current = loading_item;
        for segment in name.segments() {
            let value_id = pool.own_property(current, segment)?;
            match &pool.value(value_id).kind {
                crate::item::ValueKind::Item(child) => current = *child,
                _ => return None,
            }
        }
        if pool.item_type(current) == ItemType::ModuleInstancePlaceholder
            || pool.item_type(current) == ItemType::ModulePrefix
        {
            Some(current)
        } else {
            None
        }
    }
}
