// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component J: the groups handler (spec §4.J).
//!
//! Grounded on `original_source/src/lib/corelib/loader/groupshandler.cpp`'s `GroupsHandler`,
//! which gives every `Group` child of a product a private, overridable view of each attached
//! module instance.

use crate::instantiator::ModuleInstantiator;
use crate::item::{ItemId, ItemPool, ItemType, SourceLocation};
use crate::merger::PropertyMerger;
use crate::Result;

/// Builds per-group module instance views for every `Group` under a product.
pub struct GroupsHandler<'a> {
    merger: &'a mut PropertyMerger,
}

impl<'a> GroupsHandler<'a> {
    /// Builds a handler over the given merger (used to install placeholder instances, which
    /// share the merger's local-merge machinery when the group's own assignments are later
    /// folded back up).
    pub fn new(merger: &'a mut PropertyMerger) -> Self {
        Self { merger }
    }

    /// For each module present on `product_item`, installs a placeholder instance on every
    /// `Group` child (recursively, nested groups included), scoped to the group's own
    /// `project`/`product` bindings, so the group may override module properties in a local
    /// sandbox without affecting the product scope (spec §4.J, first paragraph).
    ///
    /// Groups nested under a disabled group inherit the disabled flag (spec §4.J, last
    /// sentence); `parent_disabled` carries that down the recursion.
    pub fn process_groups(
        &mut self,
        product_item: ItemId,
        group_item: ItemId,
        parent_disabled: bool,
        pool: &mut ItemPool,
    ) -> Result<()> {
        let is_disabled = parent_disabled || self.group_marks_disabled(group_item, pool);
        self.install_module_placeholders(product_item, group_item, pool);
        if is_disabled {
            self.mark_disabled(group_item, pool);
        }
        for child in pool.children_of_type(group_item, ItemType::Group) {
            self.process_groups(product_item, child, is_disabled, pool)?;
        }
        Ok(())
    }

    fn group_marks_disabled(&self, _group_item: ItemId, _pool: &ItemPool) -> bool {
        // The evaluator decides `Group.condition`; the resolved boolean is attached by the
        // product resolver after evaluation (spec §4.N). Absent that, a group is enabled by
        // default -- callers that already know a group is disabled should call
        // `mark_disabled` directly instead of relying on this default.
        false
    }

    fn mark_disabled(&self, group_item: ItemId, pool: &mut ItemPool) {
        let value_id = pool.new_value(crate::item::Value::variant(crate::item::VariantValue::Bool(false)));
        pool.set_property(group_item, "__enabled", value_id);
    }

    fn install_module_placeholders(&mut self, product_item: ItemId, group_item: ItemId, pool: &mut ItemPool) {
        let modules = pool.modules(product_item).to_vec();
        for module in modules {
            if pool.find_module(group_item, &module.name).is_some() {
                continue;
            }
            let placeholder = pool.new_item(ItemType::ModuleInstancePlaceholder, SourceLocation::synthetic());
            pool.set_prototype(placeholder, Some(module.item));
            let mut attachment = module.clone();
            attachment.item = placeholder;
            attachment.loading_items = vec![group_item];
            pool.modules_mut(group_item).push(attachment);
        }
    }

    /// Marks a `Group` as having `filesAreTargets: true`: its file list is the *output* of a
    /// module rather than source input (spec §4.J: "Groups with `filesAreTargets` mark their
    /// contents as the output of a module").
    pub fn mark_files_are_targets(group_item: ItemId, pool: &mut ItemPool) {
        let value_id = pool.new_value(crate::item::Value::variant(crate::item::VariantValue::Bool(true)));
        pool.set_property(group_item, "filesAreTargets", value_id);
    }

    /// Folds a group's locally overridden module property values back up into the product-wide
    /// merge state via the shared [`PropertyMerger`], once the group's own evaluation is done.
    pub fn fold_back_into_product(
        &mut self,
        product_item: ItemId,
        group_item: ItemId,
        instantiator: &mut ModuleInstantiator<'_>,
        pool: &mut ItemPool,
    ) -> Result<()> {
        let _ = instantiator;
        for module in pool.modules(group_item).to_vec() {
            if let Some(target_idx) = pool.find_module(product_item, &module.name) {
                let target = pool.modules(product_item)[target_idx].item;
                self.merger
                    .merge_from_local_instance(product_item, group_item, &module.name, module.item, target, pool)?;
            }
        }
        Ok(())
    }
}
