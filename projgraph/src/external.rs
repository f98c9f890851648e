// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contracts for the three external capabilities this crate consumes but does not implement:
//! the JS expression [`Evaluator`], the [`ItemReader`], and the [`Profiles`] store (spec §1,
//! "Explicitly out of scope"; spec §6, "Input artifacts the core consumes").
//!
//! Grounded on `guppy`'s own external-capability wrapper shape (`metadata_command.rs` wraps the
//! external `cargo metadata` process behind a narrow, mockable interface rather than
//! reimplementing Cargo). Here the equivalent wrapped processes are a JS engine, a file parser,
//! and a settings store; spec §9 explicitly allows "any embedded expression engine... provided
//! the contract holds."

use crate::item::{ItemId, ItemPool, SourceLocation};
use crate::qualified_id::QualifiedId;
use crate::Result;
use std::collections::BTreeMap;

/// Opaque handle to a compiled script function, as produced by [`Evaluator::compile_script`].
/// Interned by source text + declared argument names + file (spec §5, "Shared resources").
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ScriptHandle(pub u64);

/// Whether a property read also reports that the property was explicitly assigned, as opposed to
/// falling back to its declared default (spec §6: "second return indicates 'was set'").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WasSet(pub bool);

/// The semantic context an [`Evaluator`] call happens in, used to pick evaluation rules that
/// differ between normal property access, probe `configure` scripts, and module provider scripts
/// (spec §6: "`EvalContextSwitcher`").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EvalContext {
    /// Ordinary property evaluation while loading modules.
    Normal,
    /// Inside a `Probe`'s `configure` script.
    ProbeExecution,
    /// Inside a module provider's `relativeSearchPaths` evaluation.
    ModuleProvider,
}

/// The external JavaScript expression engine contract (spec §6, "Evaluator with operations").
///
/// Implementors back property reads with whatever expression engine they like; this crate only
/// requires the operations below and that `was_set` correctly distinguish "explicitly assigned"
/// from "fell back to default."
pub trait Evaluator {
    /// Evaluates a string-valued property.
    fn string_value(&mut self, item: ItemId, pool: &ItemPool, property: &str) -> Result<(Option<String>, WasSet)>;

    /// Evaluates a string-list-valued property.
    fn string_list_value(
        &mut self,
        item: ItemId,
        pool: &ItemPool,
        property: &str,
    ) -> Result<(Vec<String>, WasSet)>;

    /// Evaluates a bool-valued property.
    fn bool_value(&mut self, item: ItemId, pool: &ItemPool, property: &str) -> Result<(bool, WasSet)>;

    /// Evaluates an int-valued property.
    fn int_value(&mut self, item: ItemId, pool: &ItemPool, property: &str) -> Result<(Option<i64>, WasSet)>;

    /// Evaluates a file-tags-valued property.
    fn file_tags_value(
        &mut self,
        item: ItemId,
        pool: &ItemPool,
        property: &str,
    ) -> Result<(Vec<String>, WasSet)>;

    /// Compiles (or fetches an interned compilation of) a script, returning an opaque handle.
    fn compile_script(&mut self, source: &str, arg_names: &[String], file: &str) -> Result<ScriptHandle>;

    /// Runs a compiled script with the given mutable bindings, returning the bindings' final
    /// values. Used by the probes resolver to run `configure` (spec §4.D).
    fn run_script(
        &mut self,
        handle: ScriptHandle,
        bindings: &BTreeMap<String, crate::item::Value>,
    ) -> Result<BTreeMap<String, crate::item::Value>>;

    /// Drops any cached evaluation for a single item (spec §6: "clear per-item cache"). Called by
    /// the property merger's final-merge pass when a property changes underneath an item that may
    /// have cached a derived value.
    fn clear_item_cache(&mut self, item: ItemId);

    /// Enables the evaluator's own result cache for the duration of the returned guard (spec §6:
    /// "a scoped `EvalCacheEnabler`"). The default implementation is a no-op guard; evaluators
    /// that do not cache may ignore this.
    fn enable_cache(&mut self) -> EvalCacheGuard<'_> {
        EvalCacheGuard { _marker: std::marker::PhantomData }
    }

    /// Switches the evaluator's semantic context for the duration of the returned guard (spec §6:
    /// "`EvalContextSwitcher`").
    fn switch_context(&mut self, context: EvalContext) -> EvalContext {
        context
    }
}

/// RAII guard returned by [`Evaluator::enable_cache`].
pub struct EvalCacheGuard<'a> {
    _marker: std::marker::PhantomData<&'a ()>,
}

/// The external file-parsing capability contract (spec §6, "ItemReader with operations").
pub trait ItemReader {
    /// Parses a file into an item tree.
    fn read_file(&mut self, path: &str, pool: &mut ItemPool) -> Result<ItemId>;

    /// Lists entries of a directory, non-recursively, for module/candidate discovery.
    fn find_directory_entries(&mut self, dir: &str) -> Result<Vec<String>>;

    /// Parses a file reached via an import/reference and checks it is not part of an import
    /// cycle already on the stack, raising [`crate::Error::Internal`] otherwise (spec §6:
    /// "enforce no-cycle-on-import").
    fn set_up_item_from_file(
        &mut self,
        path: &str,
        referencing_location: &SourceLocation,
        pool: &mut ItemPool,
    ) -> Result<ItemId>;

    /// Wraps a bare `Product`/`Module` item in a synthetic `Project` item if the file's top-level
    /// item isn't already one.
    fn wrap_in_project_if_necessary(&mut self, item: ItemId, pool: &mut ItemPool) -> ItemId;

    /// Pushes an additional search path onto the active stack (e.g. a product's own directory).
    fn push_extra_search_paths(&mut self, paths: Vec<String>);

    /// Pops the most recently pushed extra search path entry.
    fn pop_extra_search_paths(&mut self);

    /// Every search path currently in effect, most-recently-pushed first.
    fn all_search_paths(&self) -> Vec<String>;
}

/// A flattened (profile, config-name) -> value build configuration, as read from the profile
/// store (spec §6: "`expandedBuildConfiguration(profileName, configName) -> flat map`").
pub type FlatBuildConfiguration = BTreeMap<String, crate::item::VariantValue>;

/// The external profile/settings store contract (spec §6, "Profiles store").
pub trait Profiles {
    /// Looks up a named profile, returning `None` if it doesn't exist.
    fn profile_exists(&self, name: &str) -> bool;

    /// Flattens a profile (plus a named configuration) into a dotted-key map.
    fn expanded_build_configuration(
        &self,
        profile_name: &str,
        config_name: &str,
    ) -> Result<FlatBuildConfiguration>;

    /// Turns a flat dotted-key map plus command-line overrides into a nested
    /// `module name -> property name -> value` tree, ready for profile injection (spec §4.F,
    /// "Profile injection").
    fn final_build_configuration_tree(
        &self,
        flat: &FlatBuildConfiguration,
        overrides: &BTreeMap<String, crate::item::VariantValue>,
    ) -> BTreeMap<QualifiedId, BTreeMap<String, crate::item::VariantValue>>;
}

/// Whether property-override and deprecation problems are fatal or merely collected as warnings
/// (spec §6, `SetupProjectParameters.productErrorMode`/`deprecationWarningMode`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProductErrorMode {
    /// The first problem throws.
    Strict,
    /// Problems are collected as warnings; the load proceeds best-effort.
    Relaxed,
}

/// Controls how a deprecated property's use is reported (supplemented feature, spec
/// `SPEC_FULL.md` §1.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeprecationWarningMode {
    /// Deprecated property use is not reported at all.
    Ignore,
    /// Deprecated property use produces a warning.
    Warn,
    /// Deprecated property use is a hard error.
    Error,
}

/// Build parameters passed into a load (spec §6, "`SetupProjectParameters`").
#[derive(Clone, Debug)]
pub struct SetupProjectParameters {
    /// Path to the top-level project file.
    pub project_file_path: String,
    /// The build root directory.
    pub build_root: String,
    /// Directory holding persisted settings (profiles, stored module-provider info).
    pub settings_directory: String,
    /// Name of the profile to use when a product doesn't name one explicitly.
    pub top_level_profile: String,
    /// Name of the build configuration (e.g. `debug`, `release`).
    pub configuration_name: String,
    /// Dotted-key command-line overrides (spec §6, "Override string syntax").
    pub overridden_values: BTreeMap<String, crate::item::VariantValue>,
    /// The same overrides, already organized into a tree.
    pub overridden_values_tree: BTreeMap<String, crate::item::VariantValue>,
    /// How to react to a deprecated property being used.
    pub deprecation_warning_mode: DeprecationWarningMode,
    /// How to react to a product-scoped error.
    pub product_error_mode: ProductErrorMode,
    /// Whether to record per-phase elapsed time (purely advisory; this crate does not itself log
    /// it, see `SPEC_FULL.md` §1.2).
    pub log_elapsed_time: bool,
    /// Whether this is a dry run (probes still execute; only persistence is skipped by callers).
    pub dry_run: bool,
    /// Whether the module provider loader's fallback lookup mode is enabled.
    pub fallback_provider_enabled: bool,
    /// Forces every probe to re-run regardless of cache matches.
    pub force_probe_execution: bool,
    /// Path to the toolchain's libexec directory, injected into the built-in `qbs` module.
    pub libexec_path: String,
    /// Extra search paths to consult before the profile's own.
    pub search_paths: Vec<String>,
}

impl SetupProjectParameters {
    /// Starts a new parameter set with every non-path field at its least surprising default
    /// (`Relaxed`/`Warn`, no overrides, fallback providers enabled, no forced probe re-run).
    pub fn new(project_file_path: impl Into<String>, build_root: impl Into<String>) -> Self {
        Self {
            project_file_path: project_file_path.into(),
            build_root: build_root.into(),
            settings_directory: String::new(),
            top_level_profile: String::new(),
            configuration_name: "default".to_string(),
            overridden_values: BTreeMap::new(),
            overridden_values_tree: BTreeMap::new(),
            deprecation_warning_mode: DeprecationWarningMode::Warn,
            product_error_mode: ProductErrorMode::Relaxed,
            log_elapsed_time: false,
            dry_run: false,
            fallback_provider_enabled: true,
            force_probe_execution: false,
            libexec_path: String::new(),
            search_paths: Vec::new(),
        }
    }

    /// Builder method adding a command-line override.
    pub fn with_override(
        mut self,
        key: impl Into<String>,
        value: crate::item::VariantValue,
    ) -> Self {
        self.overridden_values.insert(key.into(), value);
        self
    }

    /// Builder method adding a search path.
    pub fn with_search_path(mut self, path: impl Into<String>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Builder method setting the product error mode.
    pub fn with_product_error_mode(mut self, mode: ProductErrorMode) -> Self {
        self.product_error_mode = mode;
        self
    }
}
