// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The arena: [`ItemPool`] owns every [`Item`](super::ItemType)'s data and every [`Value`], and is
//! addressed by the non-owning index types [`ItemId`]/[`ValueId`].
//!
//! Grounded on `guppy`'s own arena idiom (`graph::graph_impl::Graph`, addressed by `NodeIndex`
//! rather than by pointer) applied to `original_source/src/lib/corelib/language/itempool.h`'s
//! `ItemPool`, which in the original owns every `Item` allocated for one top-level project and is
//! torn down as a unit. There is deliberately no per-item `free`: spec §4.A, "The pool is
//! destroyed as a whole; no individual free."

use super::decl::PropertyDeclaration;
use super::value::{Value, ValueKind};
use super::{ItemType, ModuleAttachment, SourceLocation};
use crate::qualified_id::QualifiedId;
use indexmap::IndexMap;

/// A non-owning reference to an item living in some [`ItemPool`]. Cheap to copy; meaningless
/// outside the pool that produced it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ItemId(usize);

/// A non-owning reference to a value living in some [`ItemPool`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ValueId(usize);

pub(crate) struct ItemData {
    pub(crate) item_type: ItemType,
    pub(crate) id: String,
    pub(crate) location: SourceLocation,
    pub(crate) decls: IndexMap<String, PropertyDeclaration>,
    pub(crate) properties: IndexMap<String, ValueId>,
    pub(crate) prototype: Option<ItemId>,
    pub(crate) scope: Option<ItemId>,
    pub(crate) parent: Option<ItemId>,
    pub(crate) children: Vec<ItemId>,
    pub(crate) modules: Vec<ModuleAttachment>,
}

/// The arena. One `ItemPool` is created per top-level project load and lives exactly as long as
/// that load (spec §5, "Shared resources": "Item pools are per top-level project").
#[derive(Default)]
pub struct ItemPool {
    items: Vec<ItemData>,
    values: Vec<Value>,
}

impl ItemPool {
    /// Creates a new, empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new item of the given type with no children, no properties, and no prototype.
    pub fn new_item(&mut self, item_type: ItemType, location: SourceLocation) -> ItemId {
        self.items.push(ItemData {
            item_type,
            id: String::new(),
            location,
            decls: IndexMap::new(),
            properties: IndexMap::new(),
            prototype: None,
            scope: None,
            parent: None,
            children: Vec::new(),
            modules: Vec::new(),
        });
        ItemId(self.items.len() - 1)
    }

    /// Allocates a new value and returns a handle to it.
    pub fn new_value(&mut self, value: Value) -> ValueId {
        self.values.push(value);
        ValueId(self.values.len() - 1)
    }

    fn item(&self, id: ItemId) -> &ItemData {
        &self.items[id.0]
    }

    fn item_mut(&mut self, id: ItemId) -> &mut ItemData {
        &mut self.items[id.0]
    }

    /// This item's type tag.
    pub fn item_type(&self, id: ItemId) -> ItemType {
        self.item(id).item_type
    }

    /// Switches an item's type tag. Used exactly once per (product, module) pair by the
    /// instantiator when a `Module`/`Export` prototype becomes a bound `ModuleInstance` (spec
    /// §4.G).
    pub fn set_item_type(&mut self, id: ItemId, item_type: ItemType) {
        self.item_mut(id).item_type = item_type;
    }

    /// This item's `id:` attribute, or an empty string if unset.
    pub fn id_attribute(&self, id: ItemId) -> &str {
        &self.item(id).id
    }

    /// Sets this item's `id:` attribute.
    pub fn set_id_attribute(&mut self, id: ItemId, value: impl Into<String>) {
        self.item_mut(id).id = value.into();
    }

    /// Where this item came from.
    pub fn location(&self, id: ItemId) -> &SourceLocation {
        &self.item(id).location
    }

    /// This item's prototype, if it has one (inheritance chain).
    pub fn prototype(&self, id: ItemId) -> Option<ItemId> {
        self.item(id).prototype
    }

    /// Sets this item's prototype pointer.
    pub fn set_prototype(&mut self, id: ItemId, prototype: Option<ItemId>) {
        self.item_mut(id).prototype = prototype;
    }

    /// This item's name-resolution scope, if it has one.
    pub fn scope(&self, id: ItemId) -> Option<ItemId> {
        self.item(id).scope
    }

    /// Sets this item's name-resolution scope.
    pub fn set_scope(&mut self, id: ItemId, scope: Option<ItemId>) {
        self.item_mut(id).scope = scope;
    }

    /// This item's containment parent, if it has one.
    pub fn parent(&self, id: ItemId) -> Option<ItemId> {
        self.item(id).parent
    }

    /// This item's children, in declaration order.
    pub fn children(&self, id: ItemId) -> &[ItemId] {
        &self.item(id).children
    }

    /// Appends a child to this item, setting the child's parent pointer.
    pub fn add_child(&mut self, parent: ItemId, child: ItemId) {
        self.item_mut(child).parent = Some(parent);
        self.item_mut(parent).children.push(child);
    }

    /// Returns every direct child of the given type.
    pub fn children_of_type(&self, id: ItemId, item_type: ItemType) -> Vec<ItemId> {
        self.item(id)
            .children
            .iter()
            .copied()
            .filter(|c| self.item_type(*c) == item_type)
            .collect()
    }

    /// Declares a property on this item (used when parsing a `Module` prototype, or by the
    /// parameter-declaration pre-pass, spec §9).
    pub fn declare_property(&mut self, id: ItemId, name: impl Into<String>, decl: PropertyDeclaration) {
        self.item_mut(id).decls.insert(name.into(), decl);
    }

    /// Looks up a property declaration through the prototype chain (spec §4.A: "recursive
    /// property lookup through prototypes").
    pub fn lookup_declaration(&self, id: ItemId, name: &str) -> Option<&PropertyDeclaration> {
        let mut cur = Some(id);
        while let Some(cur_id) = cur {
            if let Some(decl) = self.item(cur_id).decls.get(name) {
                return Some(decl);
            }
            cur = self.item(cur_id).prototype;
        }
        None
    }

    /// All property declarations visible on this item, own first then each ancestor prototype's,
    /// closer declarations shadowing farther ones.
    pub fn all_declarations(&self, id: ItemId) -> IndexMap<String, &PropertyDeclaration> {
        let mut out = IndexMap::new();
        let mut cur = Some(id);
        while let Some(cur_id) = cur {
            for (name, decl) in &self.item(cur_id).decls {
                out.entry(name.clone()).or_insert(decl);
            }
            cur = self.item(cur_id).prototype;
        }
        out
    }

    /// Looks up this item's own property assignment, not following the prototype chain (property
    /// *values* never inherit through prototypes in this model; only declarations do).
    pub fn own_property(&self, id: ItemId, name: &str) -> Option<ValueId> {
        self.item(id).properties.get(name).copied()
    }

    /// Every own property name/value pair, in insertion order.
    pub fn own_properties(&self, id: ItemId) -> impl Iterator<Item = (&str, ValueId)> {
        self.item(id)
            .properties
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
    }

    /// Sets (overwrites) an own property assignment.
    pub fn set_property(&mut self, id: ItemId, name: impl Into<String>, value: ValueId) {
        self.item_mut(id).properties.insert(name.into(), value);
    }

    /// Removes an own property assignment, if present.
    pub fn remove_property(&mut self, id: ItemId, name: &str) -> Option<ValueId> {
        self.item_mut(id).properties.shift_remove(name)
    }

    /// Reads a value by id.
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0]
    }

    /// Mutably reads a value by id.
    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.0]
    }

    /// Every module attached to this item, in attachment order (not yet necessarily
    /// dependency-sorted; see [`crate::deps::resolver`] which maintains the sort invariant).
    pub fn modules(&self, id: ItemId) -> &[ModuleAttachment] {
        &self.item(id).modules
    }

    /// Mutable access to the attached-modules list.
    pub fn modules_mut(&mut self, id: ItemId) -> &mut Vec<ModuleAttachment> {
        &mut self.item_mut(id).modules
    }

    /// Finds an already-attached module by qualified name.
    pub fn find_module(&self, id: ItemId, name: &QualifiedId) -> Option<usize> {
        self.item(id).modules.iter().position(|m| &m.name == name)
    }

    /// Clones an item's own properties and declarations into a fresh item, re-pointing the
    /// clone's prototype at the *original* (spec §4.A: "Cloning of a module item re-points its
    /// prototype to the original so parameter declarations remain accessible"). Children are not
    /// copied: callers that need children copied do so explicitly (spec §4.A: "same
    /// children-view policy as needed by the caller").
    pub fn clone_item(&mut self, id: ItemId) -> ItemId {
        let item_type = self.item(id).item_type;
        let location = self.item(id).location.clone();
        let clone_id = self.new_item(item_type, location);
        self.item_mut(clone_id).id = self.item(id).id.clone();
        self.item_mut(clone_id).scope = self.item(id).scope;
        self.item_mut(clone_id).prototype = Some(id);

        let props: Vec<(String, ValueId)> = self
            .item(id)
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for (name, value_id) in props {
            let cloned_value = self.value(value_id).clone();
            let new_value_id = self.new_value(cloned_value);
            self.item_mut(clone_id)
                .properties
                .insert(name, new_value_id);
        }
        clone_id
    }

    /// Deep-clones an item together with its entire child subtree (used by the multiplexer to
    /// produce independent product variants, and by the products collector for shadow products).
    pub fn clone_subtree(&mut self, id: ItemId) -> ItemId {
        let clone_id = self.clone_item(id);
        let children: Vec<ItemId> = self.item(id).children.clone();
        for child in children {
            let child_clone = self.clone_subtree(child);
            self.add_child(clone_id, child_clone);
        }
        clone_id
    }

    /// Walks a `Source` value's `next` chain into a `Vec`, head first (highest priority first
    /// once merged; see [`crate::merger`]).
    pub fn chain(&self, head: ValueId) -> Vec<ValueId> {
        let mut out = Vec::new();
        let mut cur = Some(head);
        while let Some(id) = cur {
            out.push(id);
            cur = self.value(id).next();
        }
        out
    }

    /// Sets the `next` pointer of a `Source` value. No-op for non-source kinds.
    pub fn set_next(&mut self, id: ValueId, next: Option<ValueId>) {
        if let ValueKind::Source { next: slot, .. } = &mut self.value_mut(id).kind {
            *slot = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::decl::PropertyType;
    use crate::item::value::VariantValue;

    #[test]
    fn clone_item_repoints_prototype_and_copies_properties() {
        let mut pool = ItemPool::new();
        let original = pool.new_item(ItemType::Module, SourceLocation::synthetic());
        let value_id = pool.new_value(Value::variant(VariantValue::Bool(true)));
        pool.set_property(original, "enabled", value_id);

        let clone = pool.clone_item(original);
        assert_eq!(pool.prototype(clone), Some(original));
        assert!(pool.own_property(clone, "enabled").is_some());
        assert_ne!(pool.own_property(clone, "enabled"), pool.own_property(original, "enabled"));
    }

    #[test]
    fn declaration_lookup_follows_prototype_chain() {
        let mut pool = ItemPool::new();
        let base = pool.new_item(ItemType::Module, SourceLocation::synthetic());
        pool.declare_property(
            base,
            "optimization",
            PropertyDeclaration::new(PropertyType::String, VariantValue::String("none".into())),
        );
        let derived = pool.new_item(ItemType::Module, SourceLocation::synthetic());
        pool.set_prototype(derived, Some(base));
        assert!(pool.lookup_declaration(derived, "optimization").is_some());
        assert!(pool.lookup_declaration(derived, "missing").is_none());
    }
}
