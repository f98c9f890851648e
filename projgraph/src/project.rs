// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level orchestration: ties components A-N together into one project load (spec §3,
//! "TopLevelProject"/"ProductContext"; spec §4 end-to-end).
//!
//! Grounded on `original_source/src/lib/corelib/loader/loaderutils.h`'s `TopLevelProjectContext`
//! and `LoaderState`, which hold exactly this shared state (item pool, prototype caches, provider
//! loader, probe caches) across one project's worth of product resolution.

use crate::collector::ProductsCollector;
use crate::deps::multiplex::MultiplexCandidate;
use crate::deps::{
    adjust_for_multiplexing, DependenciesResolver, DependsSpec, MultiplexAdjustment,
    ProductDependencyState, ResolvedDependency, StepOutcome,
};
use crate::external::{Evaluator, ItemReader, ProductErrorMode, Profiles, SetupProjectParameters};
use crate::groups::GroupsHandler;
use crate::instantiator::ModuleInstantiator;
use crate::item::{ItemId, ItemPool, ItemType, VariantValue};
use crate::merger::PropertyMerger;
use crate::module_loader::{ConditionCache, LoadedModule, ModuleLoader, PrototypeKey, UnknownProfilePropertyTracker};
use crate::multiplex::{MultiplexId, MultiplexInfo};
use crate::probes::{product_probe_key, Probe, ProbeCache, ProbesResolver};
use crate::product_resolver::{ProductResolver, ResolvedProduct};
use crate::provider::{LookupMode, ModuleProviderInfo, ModuleProviderLoader, ProviderConfig, QbsSnapshot};
use crate::qualified_id::QualifiedId;
use crate::scheduler::{CancellationToken, ProductOutcome, ProductsScheduler};
use crate::{Error, Result, Warning};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Per-top-level-project state shared by every product's resolution (spec §3,
/// "TopLevelProject"/"Shared resources").
pub struct TopLevelProject {
    /// The single item arena for this load.
    pub pool: ItemPool,
    /// The built-in `qbs` base module instance, injected once and reused by every product.
    pub qbs_item: ItemId,
    prototype_cache: HashMap<PrototypeKey, ItemId>,
    condition_cache: ConditionCache,
    unknown_props: UnknownProfilePropertyTracker,
    provider_loader: ModuleProviderLoader,
    prior_probe_cache: ProbeCache,
    this_run_probe_cache: ProbeCache,
    /// Profile-injected property trees, one per module qualified name (spec §4.F, "Profile
    /// injection").
    profile_tree: BTreeMap<QualifiedId, BTreeMap<String, VariantValue>>,
    search_paths: Vec<String>,
    profile: String,
    /// Every product's own file-tag set, used to answer `productTypes`-based `Depends` lookups
    /// (spec §4.I: "every matching product minus self"). Populated right after collection.
    product_types: HashMap<String, BTreeSet<String>>,
    /// Every known product's declared (non-unique) name mapped to its multiplex variant
    /// candidates, used to adjust a name-based `Depends` edge that targets a multiplexed product
    /// (spec §4.I, "Multiplex adjustment of a Depends item"). Populated right after collection.
    product_variants: HashMap<String, Vec<MultiplexCandidate>>,
    /// Unique names of products whose own dependency resolution has already finished, consulted
    /// to defer a product-to-product `Depends` edge until its target is ready (spec §4.I step
    /// 1/2, §4.M step 3).
    product_ready: HashSet<String>,
    /// Each product's product-module item (the merged `Export`), if it has one, keyed by unique
    /// name. Consulted when a `Depends` edge targets another product rather than a disk module
    /// (spec §4.L, "product-module"). Populated right after collection.
    product_modules: HashMap<String, Option<ItemId>>,
}

impl TopLevelProject {
    fn products_by_type(&self, ty: &str) -> Vec<String> {
        self.product_types
            .iter()
            .filter(|(_, types)| types.contains(ty))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Per-product loader state (spec §3, "ProductContext").
pub struct ProductContext {
    /// This variant's (possibly multiplex-cloned) `Product` item.
    pub item: ItemId,
    /// Unique name across every multiplexed variant (`name` plus an encoded multiplex suffix).
    pub unique_name: String,
    /// This variant's multiplex configuration id.
    pub multiplex_id: MultiplexId,
    /// Whether this is the synthetic aggregator variant.
    pub is_aggregator: bool,
    dependency_state: ProductDependencyState,
    loading_stack: Vec<QualifiedId>,
    merger: PropertyMerger,
    delayed_error: Option<Error>,
    probes: Vec<Probe>,
}

/// Everything a completed load produced (spec §6, "A resolved project record").
pub struct ResolvedProject {
    /// Every successfully resolved product (excludes ones that hit a delayed error in
    /// [`ProductErrorMode::Relaxed`], which are reported via `errors` instead).
    pub products: Vec<ResolvedProduct>,
    /// Non-fatal diagnostics accumulated across every product (scalar conflicts, unknown profile
    /// properties, property overrides).
    pub warnings: Vec<Warning>,
    /// Per-product delayed errors collected instead of aborting the whole load (spec §7, "Error
    /// accounting"; only populated when [`SetupProjectParameters::product_error_mode`] is
    /// [`ProductErrorMode::Relaxed`]).
    pub errors: Vec<Error>,
    /// Cross-run module-provider info, for the caller to persist.
    pub module_provider_info: ModuleProviderInfo,
    /// This run's probe cache, for the caller to persist alongside `module_provider_info`.
    pub probe_cache: ProbeCache,
}

/// Drives one top-level project load end to end.
pub struct LoaderState<'a> {
    /// The external file-parsing capability.
    pub reader: &'a mut dyn ItemReader,
    /// The external expression evaluator.
    pub evaluator: &'a mut dyn Evaluator,
    /// The external profile/settings store.
    pub profiles: &'a dyn Profiles,
    /// Build parameters for this load.
    pub params: SetupProjectParameters,
    /// Cooperative cancellation, shared with long-running external capabilities.
    pub cancellation: CancellationToken,
    /// Answers "does this absolute path exist" for group file flattening (spec §1: filesystem
    /// I/O is the caller's responsibility; this crate only asks the single yes/no question it
    /// needs for [`Error::MissingSourceFile`]/[`Error::DuplicateArtifact`] accounting).
    pub file_exists: &'a dyn Fn(&str) -> bool,
    /// Timestamp this load is running at, for probe cache cross-run matching (`None` disables
    /// mtime-based staleness checks, treating every cached probe as fresh).
    pub last_resolve_time: Option<u64>,
    /// Answers a file's modification time, for probe cache staleness checks.
    pub file_mtime: &'a dyn Fn(&str) -> Option<u64>,
    /// Answers "does a module provider file exist at this (search path, relative path) pair"
    /// (spec §4.E); filesystem I/O is the caller's responsibility, same as `file_exists`.
    pub provider_exists: &'a dyn Fn(&str, &str) -> bool,
    /// Runs a module provider script at the given absolute file path for the given lookup mode,
    /// returning the search paths it contributed (spec §4.E, "Execution").
    pub run_provider: &'a dyn Fn(&str, LookupMode) -> Vec<String>,
}

impl<'a> LoaderState<'a> {
    /// Builds a loader bound to the external capabilities for a single project load.
    pub fn new(
        reader: &'a mut dyn ItemReader,
        evaluator: &'a mut dyn Evaluator,
        profiles: &'a dyn Profiles,
        params: SetupProjectParameters,
        file_exists: &'a dyn Fn(&str) -> bool,
        file_mtime: &'a dyn Fn(&str) -> Option<u64>,
        provider_exists: &'a dyn Fn(&str, &str) -> bool,
        run_provider: &'a dyn Fn(&str, LookupMode) -> Vec<String>,
    ) -> Self {
        Self {
            reader,
            evaluator,
            profiles,
            params,
            cancellation: CancellationToken::new(),
            file_exists,
            last_resolve_time: None,
            file_mtime,
            provider_exists,
            run_provider,
        }
    }

    /// Runs the full load: parse, collect/multiplex products, resolve every product's
    /// dependencies via the scheduler, merge and finalize each one (spec §3, "Top-level flow").
    pub fn load(&mut self) -> Result<ResolvedProject> {
        let mut pool = ItemPool::new();
        let parsed = self.reader.read_file(&self.params.project_file_path, &mut pool)?;
        let root = self.reader.wrap_in_project_if_necessary(parsed, &mut pool);

        let profile = if self.params.top_level_profile.is_empty() {
            "default".to_string()
        } else {
            self.params.top_level_profile.clone()
        };

        let mut bootstrap_prototype_cache = HashMap::new();
        let mut bootstrap_condition_cache = ConditionCache::default();
        let mut bootstrap_unknown_props = UnknownProfilePropertyTracker::default();
        let qbs_item = {
            let mut loader = ModuleLoader::new(
                self.reader,
                self.evaluator,
                &mut bootstrap_prototype_cache,
                &mut bootstrap_condition_cache,
                &mut bootstrap_unknown_props,
                profile.clone(),
            );
            loader.load_builtin_qbs(&mut pool, "linux", "x86_64", &self.params.libexec_path, (1, 0, 0))
        };

        let profile_tree = self.build_profile_tree(&profile)?;

        let mut ctx = TopLevelProject {
            pool,
            qbs_item,
            prototype_cache: HashMap::new(),
            condition_cache: ConditionCache::default(),
            unknown_props: UnknownProfilePropertyTracker::default(),
            provider_loader: ModuleProviderLoader::new(self.params.fallback_provider_enabled),
            prior_probe_cache: ProbeCache::new(),
            this_run_probe_cache: ProbeCache::new(),
            profile_tree,
            search_paths: self.params.search_paths.clone(),
            profile,
            product_types: HashMap::new(),
            product_variants: HashMap::new(),
            product_ready: HashSet::new(),
            product_modules: HashMap::new(),
        };

        let evaluator_cell = RefCell::new(&mut *self.evaluator);
        let collected = {
            let evaluator_cell = &evaluator_cell;
            ProductsCollector::collect(root, &mut ctx.pool, |item, pool| {
                multiplex_info_for(item, pool, evaluator_cell)
            })?
        };
        drop(evaluator_cell);

        let mut products: Vec<ProductContext> = Vec::with_capacity(collected.len());
        for variant in &collected {
            let (name, _) = self.evaluator.string_value(variant.item, &ctx.pool, "name")?;
            let name = name.unwrap_or_default();
            let unique_name = if variant.multiplex_id == MultiplexId::none() {
                name.clone()
            } else {
                format!("{name}@{}", variant.multiplex_id.encoded())
            };
            let (types, _) = self.evaluator.file_tags_value(variant.item, &ctx.pool, "type")?;
            ctx.product_types.insert(unique_name.clone(), types.into_iter().collect());
            ctx.product_modules.insert(unique_name.clone(), variant.product_module);
            ctx.product_variants.entry(name.clone()).or_default().push(MultiplexCandidate {
                id: variant.multiplex_id.clone(),
                profile: ctx.profile.clone(),
                is_aggregator: variant.is_aggregator,
            });

            let mut dependency_state = ProductDependencyState::new(variant.item);
            dependency_state.frames[0].pending_depends =
                ctx.pool.children_of_type(variant.item, ItemType::Depends).into();

            products.push(ProductContext {
                item: variant.item,
                unique_name,
                multiplex_id: variant.multiplex_id.clone(),
                is_aggregator: variant.is_aggregator,
                dependency_state,
                loading_stack: Vec::new(),
                merger: PropertyMerger::new(),
                delayed_error: None,
                probes: Vec::new(),
            });
        }

        let mut scheduler = ProductsScheduler::new(
            (0..products.len()).collect::<Vec<_>>(),
            self.cancellation.clone(),
        );

        scheduler.run(
            |idx, allow_deferral| {
                let outcome = self.step_product(&mut ctx, &mut products[*idx], allow_deferral);
                match outcome {
                    Ok(StepOutcome::Done) => Ok(ProductOutcome::Finished),
                    Ok(StepOutcome::Continue) | Ok(StepOutcome::Defer) => Ok(ProductOutcome::Pending),
                    Err(e) => match self.params.product_error_mode {
                        ProductErrorMode::Strict => Err(e),
                        ProductErrorMode::Relaxed => {
                            products[*idx].delayed_error.get_or_insert(e);
                            Ok(ProductOutcome::Finished)
                        }
                    },
                }
            },
            || {},
        )?;

        let mut resolved_products = Vec::new();
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for mut product in products {
            if let Some(err) = product.delayed_error.take() {
                errors.push(err);
                continue;
            }
            match self.finalize_product(&mut ctx, &mut product) {
                Ok(resolved) => resolved_products.push(resolved),
                Err(e) => match self.params.product_error_mode {
                    ProductErrorMode::Strict => return Err(e),
                    ProductErrorMode::Relaxed => errors.push(e),
                },
            }
            warnings.extend(product.merger.warnings().iter().cloned());
        }

        Ok(ResolvedProject {
            products: resolved_products,
            warnings,
            errors,
            module_provider_info: ctx.provider_loader.into_info(),
            probe_cache: ctx.this_run_probe_cache,
        })
    }

    fn build_profile_tree(
        &self,
        profile: &str,
    ) -> Result<BTreeMap<QualifiedId, BTreeMap<String, VariantValue>>> {
        if !self.profiles.profile_exists(profile) {
            return Ok(BTreeMap::new());
        }
        let flat = self
            .profiles
            .expanded_build_configuration(profile, &self.params.configuration_name)?;
        Ok(self
            .profiles
            .final_build_configuration_tree(&flat, &self.params.overridden_values))
    }

    /// Advances one product's dependency resolution by exactly one step (spec §4.I, "Main
    /// loop"). Returns [`StepOutcome::Done`] once the product is fully resolved,
    /// [`StepOutcome::Defer`] if progress is blocked on another in-progress product and deferral
    /// is still allowed, [`StepOutcome::Continue`] otherwise.
    fn step_product(
        &mut self,
        ctx: &mut TopLevelProject,
        product: &mut ProductContext,
        allow_deferral: bool,
    ) -> Result<StepOutcome> {
        if DependenciesResolver::pop_if_drained(&mut product.dependency_state, product.item, &mut ctx.pool) {
            if let Some(name) = product.loading_stack.pop() {
                let _ = name;
            }
            if !DependenciesResolver::dependencies_resolving_pending(&product.dependency_state) {
                ctx.product_ready.insert(product.unique_name.clone());
                return Ok(StepOutcome::Done);
            }
            return Ok(StepOutcome::Continue);
        }

        let frame_idx = product.dependency_state.frames.len() - 1;

        // A dependency on another product is only materialized once that product has finished
        // resolving its own dependencies (spec §4.I step 1/2): otherwise defer this product back
        // to the scheduler while forward progress is still being made.
        if let Some(target) = product.dependency_state.frames[frame_idx]
            .resolved
            .front()
            .and_then(|dep| dep.product_unique_name.clone())
        {
            if !ctx.product_ready.contains(&target) {
                let resolver = DependenciesResolver::new(&mut product.loading_stack, allow_deferral);
                if resolver.should_defer_for_product_types(true) {
                    return Ok(StepOutcome::Defer);
                }
            }
        }
        if let Some(resolved) = product.dependency_state.frames[frame_idx].resolved.pop_front() {
            self.materialize_dependency(ctx, product, frame_idx, resolved)?;
            return Ok(StepOutcome::Continue);
        }

        if let Some((_, spec)) = product.dependency_state.frames[frame_idx].evaluated.take() {
            let self_name = QualifiedId::from_dotted(&product.unique_name);
            let records = DependenciesResolver::multiplex_depends(&spec, &product.unique_name, |ty| {
                ctx.products_by_type(ty)
            });

            // Records from a name-based `Depends` haven't been adjusted for multiplexing yet: if
            // the name refers to a known (possibly multiplexed) product, pick the right variant(s)
            // per the decision table instead of attaching the bare product name (spec §4.I,
            // "Multiplex adjustment of a Depends item").
            let mut adjusted = Vec::with_capacity(records.len());
            for record in records {
                if record.product_unique_name.is_some() {
                    adjusted.push(record);
                    continue;
                }
                let base_name = record.name.to_dotted();
                let Some(candidates) = ctx.product_variants.get(&base_name) else {
                    adjusted.push(record);
                    continue;
                };
                let product_multiplexed = product.multiplex_id != MultiplexId::none();
                let product_id = product_multiplexed.then_some(&product.multiplex_id);
                let adjustment = adjust_for_multiplexing(
                    product_multiplexed,
                    product_id,
                    candidates,
                    spec.profiles.as_deref(),
                    None,
                    &product.unique_name,
                    &base_name,
                )?;
                let ids = match adjustment {
                    MultiplexAdjustment::Ids(ids) => ids,
                };
                for id in ids {
                    let unique_name = if id == MultiplexId::none() {
                        base_name.clone()
                    } else {
                        format!("{base_name}@{}", id.encoded())
                    };
                    let mut record = record.clone();
                    record.product_unique_name = Some(unique_name);
                    adjusted.push(record);
                }
            }

            for record in &adjusted {
                let resolver = DependenciesResolver::new(&mut product.loading_stack, allow_deferral);
                resolver.check_cycle(&record.name, &self_name, record.required)?;
            }
            product.dependency_state.frames[frame_idx].resolved.extend(adjusted);
            return Ok(StepOutcome::Continue);
        }

        if let Some(depends_item) = product.dependency_state.frames[frame_idx].pending_depends.pop_front() {
            let spec = read_depends_spec(self.evaluator, depends_item, &ctx.pool)?;
            spec.validate()?;
            product.dependency_state.frames[frame_idx].evaluated = Some((depends_item, spec));
            return Ok(StepOutcome::Continue);
        }

        if frame_idx == 0 {
            product.dependency_state.dependencies_resolved = true;
            ctx.product_ready.insert(product.unique_name.clone());
            return Ok(StepOutcome::Done);
        }
        Ok(StepOutcome::Continue)
    }

    fn materialize_dependency(
        &mut self,
        ctx: &mut TopLevelProject,
        product: &mut ProductContext,
        frame_idx: usize,
        dependency: ResolvedDependency,
    ) -> Result<()> {
        let loading_item = product.dependency_state.frames[frame_idx].loading_item;
        let max_depth = frame_idx as u32 + 1;

        // A `productTypes`- or multiplex-adjusted dependency targets another product directly:
        // attach its product-module rather than trying to load it as a disk module (spec §4.I,
        // "product-vs-module distinction").
        if let Some(target) = dependency.product_unique_name.clone() {
            let module_item = ctx.product_modules.get(&target).copied().flatten();
            let attachment = match module_item {
                Some(module_item) => {
                    let mut instantiator = ModuleInstantiator::new(&mut product.merger);
                    let attachment = instantiator.attach(
                        product.item,
                        loading_item,
                        &dependency.name,
                        module_item,
                        &mut ctx.pool,
                        max_depth,
                    )?;
                    product.loading_stack.push(dependency.name.clone());
                    DependenciesResolver::push_frame(
                        &mut product.dependency_state.frames,
                        module_item,
                        loading_item,
                    );
                    let new_frame = product.dependency_state.frames.last_mut().unwrap();
                    new_frame.pending_depends = ctx.pool.children_of_type(module_item, ItemType::Depends).into();
                    attachment
                }
                None => {
                    if dependency.required {
                        return Err(Error::MissingRequiredDependency {
                            product: product.unique_name.clone(),
                            module: dependency.name.clone(),
                            filter: None,
                            location: dependency.location.clone(),
                        });
                    }
                    ModuleInstantiator::new(&mut product.merger).attach_non_present(
                        &dependency.name,
                        format!("product '{target}' has no exported module"),
                        &mut ctx.pool,
                        max_depth,
                    )
                }
            };
            ctx.pool.modules_mut(loading_item).push(attachment);
            return Ok(());
        }

        let profile_properties = ctx.profile_tree.get(&dependency.name).cloned().unwrap_or_default();
        let base_search_paths = ctx.search_paths.clone();
        let mut loaded = self.load_module(ctx, &dependency.name, &base_search_paths, product.item, &profile_properties)?;

        // On-disk resolution failed: consult the module provider loader before giving up (spec
        // §4.E/§4.F, "When a module lookup on disk fails, consult moduleProviders").
        if matches!(loaded, LoadedModule::NonPresent { .. }) {
            if let Some(extra_search_paths) = self.try_module_provider(ctx, &dependency)? {
                let mut search_paths = extra_search_paths;
                search_paths.extend(base_search_paths.iter().cloned());
                loaded = self.load_module(ctx, &dependency.name, &search_paths, product.item, &profile_properties)?;
            }
        }

        let attachment = match loaded {
            LoadedModule::Found(module_item) => {
                let mut instantiator = ModuleInstantiator::new(&mut product.merger);
                let attachment = instantiator.attach(
                    product.item,
                    loading_item,
                    &dependency.name,
                    module_item,
                    &mut ctx.pool,
                    max_depth,
                )?;
                product.loading_stack.push(dependency.name.clone());
                DependenciesResolver::push_frame(
                    &mut product.dependency_state.frames,
                    module_item,
                    loading_item,
                );
                let new_frame = product.dependency_state.frames.last_mut().unwrap();
                new_frame.pending_depends = ctx.pool.children_of_type(module_item, ItemType::Depends).into();
                attachment
            }
            LoadedModule::NonPresent { reason } => {
                if dependency.required {
                    return Err(Error::MissingRequiredDependency {
                        product: product.unique_name.clone(),
                        module: dependency.name.clone(),
                        filter: None,
                        location: dependency.location.clone(),
                    });
                }
                ModuleInstantiator::new(&mut product.merger).attach_non_present(&dependency.name, reason, &mut ctx.pool, max_depth)
            }
        };

        ctx.pool.modules_mut(loading_item).push(attachment);
        Ok(())
    }

    fn load_module(
        &mut self,
        ctx: &mut TopLevelProject,
        name: &QualifiedId,
        search_paths: &[String],
        product_item: ItemId,
        profile_properties: &BTreeMap<String, VariantValue>,
    ) -> Result<LoadedModule> {
        ModuleLoader::new(
            self.reader,
            self.evaluator,
            &mut ctx.prototype_cache,
            &mut ctx.condition_cache,
            &mut ctx.unknown_props,
            ctx.profile.clone(),
        )
        .load(name, search_paths, product_item, ctx.qbs_item, &mut ctx.pool, profile_properties)
    }

    /// Runs the module provider loader for a dependency that wasn't found on disk, returning the
    /// search paths it contributed, if any (spec §4.E).
    fn try_module_provider(
        &mut self,
        ctx: &mut TopLevelProject,
        dependency: &ResolvedDependency,
    ) -> Result<Option<Vec<String>>> {
        let snapshot = qbs_snapshot_for(self.evaluator, ctx.qbs_item, &ctx.pool);
        let config = provider_config_for(&dependency.name, &self.params.overridden_values);
        let provider_exists = self.provider_exists;
        let run_provider = self.run_provider;
        let result = ctx.provider_loader.resolve(
            &dependency.name,
            None,
            &ctx.search_paths,
            &config,
            &snapshot,
            provider_exists,
            run_provider,
        );
        Ok(result.map(|r| r.search_paths))
    }

    fn finalize_product(&mut self, ctx: &mut TopLevelProject, product: &mut ProductContext) -> Result<ResolvedProduct> {
        product.merger.final_merge(product.item, self.evaluator, &mut ctx.pool)?;

        let mut groups_handler = GroupsHandler::new(&mut product.merger);
        for group in ctx.pool.children_of_type(product.item, ItemType::Group) {
            groups_handler.process_groups(product.item, group, false, &mut ctx.pool)?;
        }

        let probes = ProbesResolver::new(
            self.evaluator,
            &ctx.prior_probe_cache,
            &mut ctx.this_run_probe_cache,
            self.params.force_probe_execution,
            self.last_resolve_time,
            |path| (self.file_mtime)(path),
        )
        .resolve_probes(product.item, &mut ctx.pool, |id| product_probe_key(&format!("{}.{}", product.unique_name, id)))?;
        product.probes = probes;

        let group_files = self.collect_group_files(ctx, product.item)?;

        let mut resolver = ProductResolver::new(self.evaluator, matches!(self.params.product_error_mode, ProductErrorMode::Relaxed));
        resolver.resolve(
            product.item,
            product.unique_name.clone(),
            product.multiplex_id.clone(),
            ctx.profile.clone(),
            &group_files,
            self.file_exists,
            &mut ctx.pool,
        )
    }

    fn collect_group_files(&mut self, ctx: &mut TopLevelProject, product_item: ItemId) -> Result<Vec<(ItemId, Vec<String>)>> {
        let mut out = Vec::new();
        self.collect_group_files_recursive(ctx, product_item, &mut out)?;
        Ok(out)
    }

    fn collect_group_files_recursive(
        &mut self,
        ctx: &mut TopLevelProject,
        item: ItemId,
        out: &mut Vec<(ItemId, Vec<String>)>,
    ) -> Result<()> {
        for group in ctx.pool.children_of_type(item, ItemType::Group) {
            let (files, _) = self.evaluator.string_list_value(group, &ctx.pool, "files")?;
            out.push((group, files));
            self.collect_group_files_recursive(ctx, group, out)?;
        }
        Ok(())
    }
}

fn multiplex_info_for(item: ItemId, pool: &ItemPool, evaluator: &RefCell<&mut dyn Evaluator>) -> MultiplexInfo {
    let (axis_names, _) = evaluator
        .borrow_mut()
        .string_list_value(item, pool, "multiplexByQbsProperties")
        .unwrap_or((Vec::new(), crate::external::WasSet(false)));
    if axis_names.is_empty() {
        return MultiplexInfo::default();
    }
    let mut axes = indexmap::IndexMap::new();
    for axis in &axis_names {
        let (values, _) = evaluator
            .borrow_mut()
            .string_list_value(item, pool, axis)
            .unwrap_or((Vec::new(), crate::external::WasSet(false)));
        axes.insert(
            axis.clone(),
            values.into_iter().map(serde_json::Value::String).collect(),
        );
    }
    let (aggregate, _) = evaluator
        .borrow_mut()
        .bool_value(item, pool, "aggregate")
        .unwrap_or((false, crate::external::WasSet(false)));
    MultiplexInfo { axes, aggregate }
}

fn read_depends_spec(evaluator: &mut dyn Evaluator, item: ItemId, pool: &ItemPool) -> Result<DependsSpec> {
    let (name, _) = evaluator.string_value(item, pool, "name")?;
    let (submodules, _) = evaluator.string_list_value(item, pool, "submodules")?;
    let (product_types, _) = evaluator.string_list_value(item, pool, "productTypes")?;
    let (profiles_list, profiles_was_set) = evaluator.string_list_value(item, pool, "profiles")?;
    let profiles = if profiles_was_set.0 { Some(profiles_list) } else { None };
    let (mux_ids, mux_was_set) = evaluator.string_list_value(item, pool, "multiplexConfigurationIds")?;
    let multiplex_configuration_ids = if mux_was_set.0 { Some(mux_ids) } else { None };
    let (version_at_least, _) = evaluator.string_value(item, pool, "versionAtLeast")?;
    let (version_below, _) = evaluator.string_value(item, pool, "versionBelow")?;
    let (limit_to_sub_project, _) = evaluator.bool_value(item, pool, "limitToSubProject")?;
    let (required, required_was_set) = evaluator.bool_value(item, pool, "required")?;
    let required = if required_was_set.0 { required } else { true };
    let (enable_fallback, _) = evaluator.bool_value(item, pool, "enableFallback")?;

    Ok(DependsSpec {
        location: pool.location(item).clone(),
        name: name.map(|n| QualifiedId::from_dotted(&n)),
        submodules,
        product_types,
        multiplex_configuration_ids,
        profiles,
        version_at_least: version_at_least.and_then(|v| semver::Version::parse(&v).ok()),
        version_below: version_below.and_then(|v| semver::Version::parse(&v).ok()),
        limit_to_sub_project,
        required,
        enable_fallback,
        parameters: indexmap::IndexMap::new(),
    })
}

/// Builds a module provider's configuration map from `moduleProviders.<name>.<prop>`
/// command-line overrides (spec §4.E, "The merged configuration passed to a provider").
fn provider_config_for(name: &QualifiedId, overridden_values: &BTreeMap<String, VariantValue>) -> ProviderConfig {
    let prefix = format!("moduleProviders.{}.", name.to_dotted());
    let mut config = ProviderConfig::new();
    for (key, value) in overridden_values {
        if let Some(prop) = key.strip_prefix(prefix.as_str()) {
            config.insert(prop.to_string(), value.clone());
        }
    }
    config
}

/// Looks up a module's snapshot-relevant `qbs.*` properties for module-provider cache keying
/// (spec §4.E).
pub fn qbs_snapshot_for(evaluator: &mut dyn Evaluator, qbs_item: ItemId, pool: &ItemPool) -> QbsSnapshot {
    let (sysroot, _) = evaluator
        .string_value(qbs_item, pool, "sysroot")
        .unwrap_or((None, crate::external::WasSet(false)));
    let (toolchain, _) = evaluator
        .string_list_value(qbs_item, pool, "toolchain")
        .unwrap_or((Vec::new(), crate::external::WasSet(false)));
    let (target_platform, _) = evaluator
        .string_value(qbs_item, pool, "targetPlatform")
        .unwrap_or((None, crate::external::WasSet(false)));
    QbsSnapshot {
        sysroot,
        toolchain,
        target_platform,
    }
}
