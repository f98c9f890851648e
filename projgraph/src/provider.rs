// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component E: the module provider loader (spec §4.E).
//!
//! Grounded on `original_source/src/lib/corelib/loader/moduleproviderloader.cpp`'s
//! `ModuleProviderLoader`, which synthesizes search paths for modules that can't be found on
//! disk by running small provider scripts (`pkg-config`-style discovery).

use crate::qualified_id::QualifiedId;
use indexmap::IndexMap;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Which of the three lookup modes produced a provider match (spec §4.E, "Lookup modes").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LookupMode {
    /// `<searchPath>/module-providers/<name>.qbs`, explicitly named by the item.
    Named,
    /// `<searchPath>/module-providers/<name-segments>/provider.qbs`, tried per name suffix.
    Scoped,
    /// `<searchPath>/module-providers/__fallback/provider.qbs`.
    Fallback,
}

/// A snapshot of the handful of `qbs.*` keys that participate in a provider's cache key (spec
/// §4.E: "a snapshot of a few `qbs` keys (e.g. `sysroot`, `toolchain`)").
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct QbsSnapshot {
    /// `qbs.sysroot`.
    pub sysroot: Option<String>,
    /// `qbs.toolchain`, flattened to a sorted, deduplicated list for hashing stability.
    pub toolchain: Vec<String>,
    /// `qbs.targetPlatform`.
    pub target_platform: Option<String>,
}

/// The merged configuration passed to a provider: assigned values on the product plus
/// command-line `moduleProviders.x.y` overrides (spec §4.E).
pub type ProviderConfig = IndexMap<String, crate::item::VariantValue>;

/// Cache key for a module provider invocation (spec §4.E, "Caching": "by (name, config,
/// qbs-snapshot, lookup-mode)").
#[derive(Clone, Debug)]
struct ProviderCacheKey {
    name: QualifiedId,
    config_hash: u64,
    snapshot: QbsSnapshot,
    mode: LookupMode,
}

impl PartialEq for ProviderCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.config_hash == other.config_hash
            && self.snapshot == other.snapshot
            && self.mode == other.mode
    }
}
impl Eq for ProviderCacheKey {}

fn hash_config(config: &ProviderConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (k, v) in config {
        k.hash(&mut hasher);
        v.to_display_string().hash(&mut hasher);
    }
    hasher.finish()
}

/// Result of a successful provider invocation.
#[derive(Clone, Debug)]
pub struct ProviderResult {
    /// Absolute search paths contributed by the provider, pinned under a deterministic output
    /// directory derived from a hash of `(name, config, qbs-snapshot)` (spec §4.E, "Execution").
    pub search_paths: Vec<String>,
    /// Which lookup mode produced this result.
    pub mode: LookupMode,
}

/// Cross-run-reusable provider info, the `storedModuleProviderInfo` map mentioned in spec §6.
#[derive(Clone, Debug, Default)]
pub struct ModuleProviderInfo {
    entries: Vec<(String, u64, QbsSnapshot, LookupMode, ProviderResult)>,
}

impl ModuleProviderInfo {
    /// An empty info map.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Finds (and caches) the output directory a provider invocation's search paths live under.
///
/// Grounded on `moduleproviderloader.cpp`'s `outputDirPath`, which derives a stable path from a
/// hash of the provider's identity so repeated runs with identical inputs reuse the same
/// generated files.
pub fn provider_output_dir(name: &QualifiedId, config: &ProviderConfig, snapshot: &QbsSnapshot) -> String {
    let mut hasher = DefaultHasher::new();
    name.to_dotted().hash(&mut hasher);
    hash_config(config).hash(&mut hasher);
    snapshot.hash(&mut hasher);
    format!(".qbs/module-providers/{:016x}", hasher.finish())
}

/// Drives module provider lookup and caching for one top-level project.
pub struct ModuleProviderLoader {
    cache: HashMap<u64, ProviderResult>,
    info: ModuleProviderInfo,
    fallback_enabled: bool,
}

impl ModuleProviderLoader {
    /// Builds a fresh loader, with fallback lookup enabled or disabled per
    /// [`crate::external::SetupProjectParameters::fallback_provider_enabled`].
    pub fn new(fallback_enabled: bool) -> Self {
        Self {
            cache: HashMap::new(),
            info: ModuleProviderInfo::new(),
            fallback_enabled,
        }
    }

    fn cache_key_hash(key: &ProviderCacheKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.name.to_dotted().hash(&mut hasher);
        key.config_hash.hash(&mut hasher);
        key.snapshot.hash(&mut hasher);
        (key.mode as u8 as u64).hash(&mut hasher);
        hasher.finish()
    }

    /// Attempts every applicable lookup mode in order (Named, Scoped, Fallback) and returns the
    /// first one that a `provider_exists` probe accepts, or `None` if no provider matched (spec
    /// §4.E, "Lookup modes, tried in order").
    ///
    /// `provider_exists` answers "does a provider file exist for this (search path, relative
    /// path) pair?" -- the actual filesystem probing is left to the caller since this crate has
    /// no I/O of its own (spec §1, "Explicitly out of scope": "filesystem and process I/O").
    pub fn resolve<'a>(
        &mut self,
        name: &QualifiedId,
        named_file: Option<&str>,
        search_paths: &[String],
        config: &ProviderConfig,
        snapshot: &QbsSnapshot,
        mut provider_exists: impl FnMut(&str, &str) -> bool,
        mut run_provider: impl FnMut(&str, LookupMode) -> Vec<String>,
    ) -> Option<ProviderResult> {
        let config_hash = hash_config(config);

        if let Some(file) = named_file {
            for sp in search_paths {
                let rel = format!("module-providers/{file}");
                if provider_exists(sp, &rel) {
                    return Some(self.invoke(
                        name,
                        config_hash,
                        snapshot,
                        LookupMode::Named,
                        sp,
                        &rel,
                        &mut run_provider,
                    ));
                }
            }
        }

        for suffix in name.suffixes() {
            let rel = format!("module-providers/{}/provider.qbs", suffix.segments().join("/"));
            for sp in search_paths {
                if provider_exists(sp, &rel) {
                    return Some(self.invoke(
                        name,
                        config_hash,
                        snapshot,
                        LookupMode::Scoped,
                        sp,
                        &rel,
                        &mut run_provider,
                    ));
                }
            }
        }

        if self.fallback_enabled {
            let rel = "module-providers/__fallback/provider.qbs";
            for sp in search_paths {
                if provider_exists(sp, rel) {
                    return Some(self.invoke(
                        name,
                        config_hash,
                        snapshot,
                        LookupMode::Fallback,
                        sp,
                        rel,
                        &mut run_provider,
                    ));
                }
            }
        }

        None
    }

    fn invoke(
        &mut self,
        name: &QualifiedId,
        config_hash: u64,
        snapshot: &QbsSnapshot,
        mode: LookupMode,
        search_path: &str,
        relative_file: &str,
        run_provider: &mut impl FnMut(&str, LookupMode) -> Vec<String>,
    ) -> ProviderResult {
        let key = ProviderCacheKey {
            name: name.clone(),
            config_hash,
            snapshot: snapshot.clone(),
            mode,
        };
        let key_hash = Self::cache_key_hash(&key);
        if let Some(cached) = self.cache.get(&key_hash) {
            return cached.clone();
        }
        let search_paths = run_provider(&format!("{search_path}/{relative_file}"), mode);
        let result = ProviderResult { search_paths, mode };
        self.cache.insert(key_hash, result.clone());
        self.info.entries.push((
            name.to_dotted(),
            config_hash,
            snapshot.clone(),
            mode,
            result.clone(),
        ));
        result
    }

    /// The accumulated cross-run info for this load, to be persisted by the caller.
    pub fn into_info(self) -> ModuleProviderInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn named_file_is_tried_before_scoped_or_fallback() {
        let mut loader = ModuleProviderLoader::new(true);
        let name = QualifiedId::from_dotted("pkgconfig");
        let config = ProviderConfig::new();
        let snapshot = QbsSnapshot::default();
        let result = loader
            .resolve(
                &name,
                Some("pkgconfig.qbs"),
                &["/search".to_string()],
                &config,
                &snapshot,
                |_sp, rel| rel == "module-providers/pkgconfig.qbs",
                |_file, _mode| vec!["/out".to_string()],
            )
            .expect("a named provider file exists");
        assert_eq!(result.mode, LookupMode::Named);
        assert_eq!(result.search_paths, vec!["/out".to_string()]);
    }

    #[test]
    fn scoped_lookup_tries_longest_suffix_first() {
        let mut loader = ModuleProviderLoader::new(true);
        let name = QualifiedId::from_dotted("Qt.widgets");
        let config = ProviderConfig::new();
        let snapshot = QbsSnapshot::default();
        let result = loader
            .resolve(
                &name,
                None,
                &["/search".to_string()],
                &config,
                &snapshot,
                |_sp, rel| rel == "module-providers/Qt/widgets/provider.qbs",
                |_file, _mode| vec!["/out/qt-widgets".to_string()],
            )
            .expect("a scoped provider for the full suffix exists");
        assert_eq!(result.mode, LookupMode::Scoped);
        assert_eq!(result.search_paths, vec!["/out/qt-widgets".to_string()]);
    }

    #[test]
    fn scoped_lookup_falls_through_to_a_shorter_suffix() {
        let mut loader = ModuleProviderLoader::new(true);
        let name = QualifiedId::from_dotted("Qt.widgets");
        let config = ProviderConfig::new();
        let snapshot = QbsSnapshot::default();
        let result = loader
            .resolve(
                &name,
                None,
                &["/search".to_string()],
                &config,
                &snapshot,
                |_sp, rel| rel == "module-providers/widgets/provider.qbs",
                |_file, _mode| vec!["/out/widgets".to_string()],
            )
            .expect("a scoped provider for the shorter suffix exists");
        assert_eq!(result.mode, LookupMode::Scoped);
    }

    #[test]
    fn fallback_is_skipped_when_disabled() {
        let mut loader = ModuleProviderLoader::new(false);
        let name = QualifiedId::from_dotted("unknown");
        let config = ProviderConfig::new();
        let snapshot = QbsSnapshot::default();
        let result = loader.resolve(
            &name,
            None,
            &["/search".to_string()],
            &config,
            &snapshot,
            |_sp, _rel| true,
            |_file, _mode| Vec::new(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn repeated_resolve_with_the_same_key_reuses_the_cached_result() {
        let mut loader = ModuleProviderLoader::new(true);
        let name = QualifiedId::from_dotted("pkgconfig");
        let config = ProviderConfig::new();
        let snapshot = QbsSnapshot::default();
        let mut invocations = 0;
        for _ in 0..2 {
            let result = loader.resolve(
                &name,
                None,
                &["/search".to_string()],
                &config,
                &snapshot,
                |_sp, rel| rel == "module-providers/pkgconfig/provider.qbs",
                |_file, _mode| {
                    invocations += 1;
                    vec!["/out".to_string()]
                },
            );
            assert!(result.is_some());
        }
        assert_eq!(invocations, 1, "the second resolve should hit the cache, not rerun the provider");
    }

    #[test]
    fn into_info_records_one_entry_per_distinct_invocation() {
        let mut loader = ModuleProviderLoader::new(true);
        let name = QualifiedId::from_dotted("pkgconfig");
        let config = ProviderConfig::new();
        let snapshot = QbsSnapshot::default();
        loader.resolve(
            &name,
            None,
            &["/search".to_string()],
            &config,
            &snapshot,
            |_sp, rel| rel == "module-providers/pkgconfig/provider.qbs",
            |_file, _mode| Vec::new(),
        );
        let info = loader.into_info();
        assert_eq!(info.entries.len(), 1);
    }
}
