// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contains types that describe errors and warnings that `projgraph` methods can return.

use crate::item::SourceLocation;
use crate::qualified_id::QualifiedId;
use std::error;
use std::fmt;

use Error::*;

/// Error type describing the sorts of errors the loader can return.
///
/// Product-scoped errors (everything except [`Error::Internal`] and [`Error::Cancelled`]) are
/// ordinarily accumulated per product rather than aborting the whole load; see
/// [`crate::project::ProductContext::delayed_error`].
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A syntax or structural error was reported by the external `ItemReader` capability. The
    /// location is whatever the reader attached to it; this variant never rewrites it.
    Parse {
        /// Human-readable message as produced by the reader.
        message: String,
        /// Location of the offending construct, if the reader supplied one.
        location: Option<SourceLocation>,
    },
    /// A required module could not be found for a product.
    MissingRequiredDependency {
        /// Display name of the product doing the requesting.
        product: String,
        /// The module that could not be found.
        module: QualifiedId,
        /// If the search was narrowed by `profiles` or multiplexing, a description of the filter.
        filter: Option<String>,
        /// Location of the `Depends` item.
        location: SourceLocation,
    },
    /// Multiplexing a `Depends` item produced zero or more-than-one eligible candidates where
    /// exactly one was required.
    MultiplexResolutionFailed {
        /// The depending product.
        product: String,
        /// The name of the dependency being multiplexed.
        dependency: String,
        /// Display names of every candidate considered (empty if there were zero).
        candidates: Vec<String>,
        /// Location of the `Depends` item.
        location: SourceLocation,
    },
    /// A cycle was detected among required dependency edges.
    CyclicDependency {
        /// The chain of module/product names forming the cycle, in traversal order.
        chain: Vec<String>,
    },
    /// A probe's `configure` script raised an exception.
    ProbeFailed {
        /// Location of the `configure` binding.
        location: SourceLocation,
        /// The underlying error message from script execution.
        source: String,
    },
    /// A command-line or tree override could not be applied.
    PropertyOverride {
        /// The raw override key, e.g. `products.app.cpp.includePaths`.
        key: String,
        /// Why the key was rejected.
        reason: String,
    },
    /// A binding assigned a property that the target item (module or placeholder) never
    /// declared.
    PropertyNotDeclared {
        /// Name of the module item the property was assigned on.
        module: QualifiedId,
        /// The undeclared property name.
        property: String,
        /// Location of the assignment.
        location: SourceLocation,
    },
    /// An attempt was made to set a property declared read-only.
    ReadOnlyPropertyWrite {
        /// Name of the module item.
        module: QualifiedId,
        /// The read-only property name.
        property: String,
        /// Location of the offending assignment.
        location: SourceLocation,
    },
    /// More than one module candidate shared the highest priority for the same search.
    AmbiguousModuleCandidates {
        /// The module name being searched for.
        module: QualifiedId,
        /// Locations of every tied candidate.
        candidates: Vec<SourceLocation>,
    },
    /// Two source artifacts resolved to the same `(module target, absolute path)` key.
    DuplicateArtifact {
        /// The absolute path that collided.
        path: String,
    },
    /// A file named by an enabled, non-relaxed group did not exist on disk.
    MissingSourceFile {
        /// The absolute path that was missing.
        path: String,
    },
    /// Something the loader's own invariants rule out happened anyway. Only the first internal
    /// error for a given product is surfaced; later ones during the same product are suppressed.
    Internal(String),
    /// The load was cancelled cooperatively via [`crate::project::CancellationToken`].
    ///
    /// Never folded into any other error kind: callers match on this to distinguish a clean
    /// abort from an actual problem with the project.
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parse { message, location } => match location {
                Some(loc) => write!(f, "{} at {}", message, loc),
                None => write!(f, "{}", message),
            },
            MissingRequiredDependency {
                product,
                module,
                filter,
                location,
            } => {
                write!(
                    f,
                    "Dependency '{}' not found for product '{}' ({})",
                    module, product, location
                )?;
                if let Some(filter) = filter {
                    write!(f, " [{}]", filter)?;
                }
                Ok(())
            }
            MultiplexResolutionFailed {
                product,
                dependency,
                candidates,
                location,
            } => {
                if candidates.is_empty() {
                    write!(
                        f,
                        "Dependency from product '{}' to product '{}' not fulfilled. \
                         There are no eligible multiplex candidates. ({})",
                        product, dependency, location
                    )
                } else {
                    write!(
                        f,
                        "Dependency from product '{}' to product '{}' is ambiguous. \
                         Eligible multiplex candidates: {}. ({})",
                        product,
                        dependency,
                        candidates.join(", "),
                        location
                    )
                }
            }
            CyclicDependency { chain } => {
                write!(f, "Cyclic dependencies detected: {}", chain.join(" -> "))
            }
            ProbeFailed { location, source } => {
                write!(f, "Probe configure script failed at {}: {}", location, source)
            }
            PropertyOverride { key, reason } => {
                write!(f, "Invalid override '{}': {}", key, reason)
            }
            PropertyNotDeclared {
                module,
                property,
                location,
            } => write!(
                f,
                "Property '{}' is not declared on module '{}' ({})",
                property, module, location
            ),
            ReadOnlyPropertyWrite {
                module,
                property,
                location,
            } => write!(
                f,
                "Property '{}' of module '{}' is read-only ({})",
                property, module, location
            ),
            AmbiguousModuleCandidates { module, candidates } => write!(
                f,
                "There is more than one equally prioritized candidate for module '{}': {}",
                module,
                candidates
                    .iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            DuplicateArtifact { path } => {
                write!(f, "Artifact '{}' is created by more than one source", path)
            }
            MissingSourceFile { path } => write!(f, "File '{}' does not exist", path),
            Internal(msg) => write!(f, "Internal error: {}", msg),
            Cancelled => write!(f, "The operation was cancelled"),
        }
    }
}

impl error::Error for Error {}

/// A non-fatal diagnostic collected during a load, surfaced instead of raised when the active
/// [`crate::external::ProductErrorMode`] is [`crate::external::ProductErrorMode::Relaxed`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Warning {
    /// An override key was accepted but the loader has a lower-confidence reason to flag it.
    PropertyOverride {
        /// The raw override key.
        key: String,
        /// Why it's being flagged.
        reason: String,
    },
    /// Two scalar values of equal priority had inequivalent source text; the first one (in
    /// encounter order) won.
    ScalarConflict {
        /// Qualified module.property name.
        property: QualifiedId,
        /// Locations of every conflicting contributor, in encounter order. The first wins.
        locations: Vec<SourceLocation>,
    },
    /// A profile assigned a property unknown to the module it targets, but the module was never
    /// actually used by any product so this never became a hard error.
    UnknownProfileProperty {
        /// The module the unknown property was assigned on.
        module: QualifiedId,
        /// The unknown property name.
        property: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PropertyOverride { key, reason } => {
                write!(f, "override '{}': {}", key, reason)
            }
            Warning::ScalarConflict { property, locations } => write!(
                f,
                "conflicting values for '{}' at {} location(s); first one wins",
                property,
                locations.len()
            ),
            Warning::UnknownProfileProperty { module, property } => write!(
                f,
                "profile sets unknown property '{}' on module '{}'",
                property, module
            ),
        }
    }
}
