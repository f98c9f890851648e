// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `Value` sum type (spec §3, "Value") and its three alternatives.
//!
//! Grounded on `original_source/src/lib/corelib/language/value.h`'s `Value` base class and its
//! `JSSourceValue`/`ItemValue`/`VariantValue` subclasses.

use super::{ItemId, SourceLocation, ValueId};
use serde_json::Value as JsonValue;

/// Bit flags carried on a [`Value`], mirroring `JSSourceValue`'s boolean members.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ValueFlags {
    /// Set when the value was produced by a `Properties { ... }` block rather than a direct
    /// assignment.
    pub created_by_properties_block: bool,
    /// Set when the loader itself assigned this value (profile injection, built-in `qbs`
    /// properties, synthesized scope bindings, ...) rather than the project's own source text.
    pub set_internally: bool,
    /// Set when a command-line override produced this value.
    pub set_by_command_line: bool,
}

impl ValueFlags {
    /// True if either flag marking this value as an "immovable anchor" (spec §4.H) is set.
    pub fn is_anchor(self) -> bool {
        self.set_internally || self.set_by_command_line
    }
}

/// One alternative of a conditionally-assigned property (`Properties { condition: ...; ... }`).
#[derive(Clone, Debug)]
pub struct ConditionalAlternative {
    /// Source text of the guarding condition, evaluated by the external `Evaluator`.
    pub condition_source: String,
    /// The value to use when the condition holds.
    pub value: ValueId,
}

/// A pre-computed scalar or list value: literal injections, command-line overrides, and
/// profile-originated defaults never carry JS source, so they're represented directly.
#[derive(Clone, Debug, PartialEq)]
pub enum VariantValue {
    /// Absence of a value (`undefined`), distinct from an empty list or empty string.
    Undefined,
    Bool(bool),
    Int(i64),
    String(String),
    StringList(Vec<String>),
    /// An already-evaluated, loosely-typed JSON value, used for `Depends.parameters` maps and
    /// module-provider configuration maps where the declared type isn't known up front.
    Json(JsonValue),
}

impl VariantValue {
    /// Widens a scalar into a single-element list, as the probe resolver does when a `configure`
    /// script assigns a scalar to a property declared as a list (spec §4.D, "Execution").
    pub fn widen_to_list(self) -> VariantValue {
        match self {
            VariantValue::StringList(_) => self,
            VariantValue::String(s) => VariantValue::StringList(vec![s]),
            VariantValue::Undefined => VariantValue::StringList(Vec::new()),
            other => VariantValue::StringList(vec![other.to_display_string()]),
        }
    }

    /// Renders this value as a display string, used for diagnostics and for widening
    /// non-string scalars into a one-element string list.
    pub fn to_display_string(&self) -> String {
        match self {
            VariantValue::Undefined => String::new(),
            VariantValue::Bool(b) => b.to_string(),
            VariantValue::Int(i) => i.to_string(),
            VariantValue::String(s) => s.clone(),
            VariantValue::StringList(v) => v.join(","),
            VariantValue::Json(j) => j.to_string(),
        }
    }
}

/// The three alternatives of [`Value`] (spec §3, "Value").
#[derive(Clone, Debug)]
pub enum ValueKind {
    /// An expression evaluated by the external `Evaluator`.
    Source {
        /// The expression's source text.
        source: String,
        /// The scope the expression's free variables resolve against (its defining item's
        /// import scope).
        import_scope: Option<ItemId>,
        /// For `outer`/`super` chaining: the value this one shadows.
        base_value: Option<ValueId>,
        /// The next-lower-priority element in this property's list, forming a singly linked
        /// chain (spec §3: "a chain of `next` siblings forming a list").
        next: Option<ValueId>,
        /// The priority this value was attached with (spec §4.H, "Priority").
        priority: i64,
        /// Alternatives contributed by `Properties` blocks guarding this same property.
        alternatives: Vec<ConditionalAlternative>,
        /// Behavioral flags.
        flags: ValueFlags,
    },
    /// A handle to a child item, used to model item-valued properties (`cpp.defines`-style
    /// nested access where the child item itself carries further properties).
    Item(ItemId),
    /// A directly-computed scalar or list.
    Variant(VariantValue),
}

/// One assignment to a property: an expression, an item handle, or a pre-computed variant,
/// together with the scope/location it was attached from and whether it is currently suppressed.
#[derive(Clone, Debug)]
pub struct Value {
    /// Which of the three alternatives this value is.
    pub kind: ValueKind,
    /// The item whose names this value's free variables (if any) resolve against. `None` for
    /// values that never reference names (most `Variant`s).
    pub scope: Option<ItemId>,
    /// Where this value came from, if it has a concrete source location.
    pub location: Option<SourceLocation>,
    /// When true, this value is suppressed in final merge (its "expired" predicate evaluated to
    /// false) -- e.g. a `Properties` alternative whose module was subsequently pruned.
    pub expired: bool,
}

impl Value {
    /// Builds a `Source`-kind value with default flags, no chain, and the given priority.
    pub fn source(
        source: impl Into<String>,
        scope: Option<ItemId>,
        location: Option<SourceLocation>,
        priority: i64,
    ) -> Self {
        Value {
            kind: ValueKind::Source {
                source: source.into(),
                import_scope: scope,
                base_value: None,
                next: None,
                priority,
                alternatives: Vec::new(),
                flags: ValueFlags::default(),
            },
            scope,
            location,
            expired: false,
        }
    }

    /// Builds a pre-computed variant value.
    pub fn variant(value: VariantValue) -> Self {
        Value {
            kind: ValueKind::Variant(value),
            scope: None,
            location: None,
            expired: false,
        }
    }

    /// Builds an item-handle value.
    pub fn item(item: ItemId) -> Self {
        Value {
            kind: ValueKind::Item(item),
            scope: None,
            location: None,
            expired: false,
        }
    }

    /// The priority of a `Source` value, or `i64::MIN` for non-source kinds (they never compete
    /// in scalar/list priority comparisons; see [`crate::merger`]).
    pub fn priority(&self) -> i64 {
        match &self.kind {
            ValueKind::Source { priority, .. } => *priority,
            _ => i64::MIN,
        }
    }

    /// The chained successor, for `Source` values only.
    pub fn next(&self) -> Option<ValueId> {
        match &self.kind {
            ValueKind::Source { next, .. } => *next,
            _ => None,
        }
    }

    /// True when this value's flags mark it as immune to lower-priority JS-source overrides
    /// (spec §4.H, "Local merge").
    pub fn is_anchor(&self) -> bool {
        match &self.kind {
            ValueKind::Source { flags, .. } => flags.is_anchor(),
            _ => false,
        }
    }
}
