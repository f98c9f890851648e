// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The item graph: typed, arena-owned nodes with properties, a prototype chain, and a
//! containment hierarchy.
//!
//! Grounded on `original_source/src/lib/corelib/language/item.h`'s `Item` class, expressed as an
//! arena of plain data (`ItemPool`) indexed by [`ItemId`]/[`ValueId`] rather than the original's
//! `QExplicitlySharedDataPointer`-managed graph of raw pointers — the same shape `guppy` uses for
//! its own `graph::graph_impl::Graph` (a `petgraph` arena addressed by `NodeIndex`, never by
//! pointer).

mod decl;
mod pool;
mod value;

pub use decl::{Deprecation, PropertyDeclaration, PropertyFlags, PropertyType};
pub use pool::{ItemId, ItemPool, ValueId};
pub use value::{ConditionalAlternative, Value, ValueFlags, ValueKind, VariantValue};

use std::fmt;

/// The closed set of item type tags recognized by the loader (spec §3, "Item").
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ItemType {
    /// The root of a project file.
    Project,
    /// A build product (library, application, bundle, ...).
    Product,
    /// A module prototype as parsed from disk, before instantiation.
    Module,
    /// An intermediate item in a dotted module access path (`cpp` in `cpp.defines`) that has not
    /// yet resolved to a real module or placeholder.
    ModulePrefix,
    /// A module that has been bound into a loading item's value tree.
    ModuleInstance,
    /// A not-yet-replaced stand-in for a `ModuleInstance`, holding only locally-assigned
    /// properties until the real module arrives.
    ModuleInstancePlaceholder,
    /// An `Export` block contributing to a product's product-module.
    Export,
    /// A `Depends` declaration.
    Depends,
    /// A `Group` of source files.
    Group,
    /// A single named build artifact.
    Artifact,
    /// A transformation rule.
    Rule,
    /// A file-tagger declaration.
    FileTagger,
    /// A concurrency job-limit declaration.
    JobLimit,
    /// A dependency scanner declaration.
    Scanner,
    /// A side-effecting discovery probe.
    Probe,
    /// The parameter list attached to a `Depends` item.
    Parameters,
    /// The parameter declarations a module advertises for dependers to set.
    ModuleParameters,
    /// Per-property options (`PropertyOptions` blocks).
    PropertyOptions,
    /// A name-resolution scope with no other semantics.
    Scope,
    /// Any item type not otherwise enumerated (kept open per spec: "others").
    Other(&'static str),
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Other(name) => write!(f, "{name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// A location in a source file, forwarded unchanged from the external `ItemReader`/`Evaluator`
/// capabilities (spec §6).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SourceLocation {
    /// Path to the source file, as reported by the reader.
    pub file_path: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl SourceLocation {
    /// Builds a location with the given coordinates.
    pub fn new(file_path: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            column,
        }
    }

    /// A location used for synthetic items the loader creates itself (shadow products, injected
    /// `qbs` properties, ...) that have no corresponding source text.
    pub fn synthetic() -> Self {
        Self::new("<synthetic>", 0, 0)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.line, self.column)
    }
}

/// A module attached to an item (spec §3, "Module attachment").
#[derive(Clone, Debug)]
pub struct ModuleAttachment {
    /// The qualified name the module was requested under.
    pub name: crate::qualified_id::QualifiedId,
    /// The module's instance item.
    pub item: ItemId,
    /// For a product-module (an `Export`-originated instance), the product that produced it.
    pub producing_product: Option<String>,
    /// Lower/upper version bound the depender required, if any.
    pub version_range: (Option<semver::Version>, Option<semver::Version>),
    /// Every item that attached to (depends on) this module, for diagnostics and pruning.
    pub loading_items: Vec<ItemId>,
    /// Parameters merged from every `Depends` edge that requested this module.
    pub parameters: indexmap::IndexMap<String, value::VariantValue>,
    /// Whether any edge reaching this module marked it `required: true`.
    pub required: bool,
    /// Maximum depth of any dependency chain reaching this module, used to break priority ties
    /// (spec §4.H, "Priority").
    pub max_depth: u32,
    /// True once this attachment has been determined unreachable from any required product
    /// module and its contributions have been erased by final merge (spec §4.H, "Final merge").
    pub pruned: bool,
}
