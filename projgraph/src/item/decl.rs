// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property declarations: the type, flags, default, and deprecation metadata an item type (or a
//! specific module) attaches to one of its property names.
//!
//! Grounded on `original_source/src/lib/corelib/language/propertydeclaration.h`.

use super::value::VariantValue;

/// A tiny hand-rolled bitflags helper, used instead of pulling in the `bitflags` crate for a
/// three-variant flag set.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
        pub struct $name(u8);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            /// An empty flag set.
            pub const fn empty() -> Self {
                $name(0)
            }

            /// Sets the given flag.
            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            /// True if every bit in `other` is set in `self`.
            pub fn contains(&self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }
        }
    };
}

/// The declared type of a property, used to typecheck overrides and probe results, and to decide
/// whether a scalar assignment should be widened into a one-element list (spec §4.D).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum PropertyType {
    Bool,
    Int,
    String,
    StringList,
    /// `PathList`/`FileTags`-style string lists that additionally get path normalization
    /// upstream of this crate; treated identically to `StringList` by the merger.
    FileTagList,
    /// A nested-item-valued property (`cpp.defines`-style access into another item).
    Item,
    /// Untyped, accepts whatever shape the evaluator produces (used by `parameters` maps and
    /// module provider configuration).
    Variant,
}

/// Deprecation metadata for a property declaration (supplemented feature; grounded on
/// `PropertyDeclaration::checkForDeprecation` in `modulepropertymerger.cpp`).
#[derive(Clone, Debug)]
pub struct Deprecation {
    /// Human-readable replacement guidance.
    pub message: String,
    /// Version in which the property is removed entirely, if known.
    pub removal_version: Option<semver::Version>,
}

bitflags_like! {
    /// Per-property behavioral flags.
    pub struct PropertyFlags {
        /// The property cannot be assigned outside of the declaring module (spec §4.H, "Local
        /// merge": "read-only properties refuse any contribution").
        const READ_ONLY = 1 << 0;
        /// The property participates in a module's public interface exported via `Export`.
        const EXPORTED = 1 << 1;
        /// Assignments may come from a `PropertyOptions` block that changes its allowed-values
        /// set or default at the call site.
        const ALLOWS_OPTIONS = 1 << 2;
    }
}

/// Describes one property a module (or built-in item type) declares.
#[derive(Clone, Debug)]
pub struct PropertyDeclaration {
    /// Declared type, used to decide merge semantics (scalar vs. list) and override typechecking.
    pub property_type: PropertyType,
    /// Behavioral flags.
    pub flags: PropertyFlags,
    /// Default value used when nothing else contributes (and for non-present modules' property
    /// reads, spec §8 "Non-present short-circuit").
    pub default: VariantValue,
    /// Allowed values, if the property is an enumeration; empty means unconstrained.
    pub allowed_values: Vec<String>,
    /// Deprecation metadata, if this property is on its way out.
    pub deprecation: Option<Deprecation>,
}

impl PropertyDeclaration {
    /// Builds a plain, non-deprecated, non-read-only declaration with the given type and default.
    pub fn new(property_type: PropertyType, default: VariantValue) -> Self {
        Self {
            property_type,
            flags: PropertyFlags::empty(),
            default,
            allowed_values: Vec::new(),
            deprecation: None,
        }
    }

    /// Builder method marking this declaration read-only.
    pub fn read_only(mut self) -> Self {
        self.flags.insert(PropertyFlags::READ_ONLY);
        self
    }

    /// Builder method attaching deprecation metadata.
    pub fn deprecated(mut self, deprecation: Deprecation) -> Self {
        self.deprecation = Some(deprecation);
        self
    }

    /// True if the declared type is list-shaped (merges by splicing rather than by priority
    /// substitution).
    pub fn is_list(&self) -> bool {
        matches!(
            self.property_type,
            PropertyType::StringList | PropertyType::FileTagList
        )
    }
}
