// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolve a declarative, multi-language build project into a fully-merged set of products.
//!
//! `projgraph` takes a tree of parsed project items (products, modules, groups, dependencies) and
//! turns it into a [`ResolvedProject`]: every product's modules instantiated and merged, every
//! `Depends` resolved (including cyclic-but-optional dependencies and axis-based multiplexing),
//! every probe executed or served from cache, and every group's file list flattened into typed
//! artifacts.
//!
//! This crate does not parse project files or evaluate script expressions itself -- those are
//! supplied by the caller through the [`ItemReader`], [`Evaluator`], and [`Profiles`] traits (see
//! the `external` module). This keeps the resolution algorithm -- dependency ordering, property
//! merging, multiplexing, probe caching -- independent of any one source language or expression
//! evaluator.
//!
//! # Example
//!
//! ```no_run
//! use projgraph::{LoaderState, SetupProjectParameters};
//! # use projgraph::external::{Evaluator, ItemReader, Profiles};
//! # fn example(reader: &mut dyn ItemReader, evaluator: &mut dyn Evaluator, profiles: &dyn Profiles) -> projgraph::Result<()> {
//! let params = SetupProjectParameters::new("/path/to/project.qbs", "/path/to/build");
//! let mut loader = LoaderState::new(
//!     reader, evaluator, profiles, params, &|_| true, &|_| None, &|_, _| false, &|_, _| Vec::new(),
//! );
//! let resolved = loader.load()?;
//! for product in &resolved.products {
//!     println!("resolved product: {}", product.unique_name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Optional features
//!
//! * `proptest1`: support for [property-based testing](https://jessitron.com/2013/04/25/property-based-testing-what-is-it/)
//!   of the item pool and multiplex id encoding using the [`proptest`](https://altsysrq.github.io/proptest-book/intro.html)
//!   framework.

#![warn(missing_docs)]

pub mod collector;
pub mod deps;
pub mod errors;
pub mod external;
pub mod groups;
pub mod instantiator;
pub mod item;
pub mod merger;
pub mod module_loader;
pub mod multiplex;
pub mod probes;
pub mod product_resolver;
pub mod project;
pub mod provider;
pub mod qualified_id;
pub mod scheduler;

pub(crate) mod petgraph_support;
pub(crate) mod sorted_set;

pub use errors::{Error, Result, Warning};
pub use external::{Evaluator, ItemReader, ProductErrorMode, Profiles, SetupProjectParameters};
pub use project::{LoaderState, ProductContext, ResolvedProject, TopLevelProject};

// Public re-exports for upstream crates used in APIs. The no_inline ensures that they show up as
// re-exports in documentation.
#[doc(no_inline)]
pub use semver::Version;
#[doc(no_inline)]
pub use serde_json::Value as JsonValue;
