//! Drives target/exclude specs through the catalog and analyzer into the
//! include/exclude index.
//!
//! Resolution never fails as a whole: an unresolvable spec logs a warning
//! and contributes an empty module entry, so tracing proceeds with partial
//! coverage.

use std::collections::HashSet;

use tracing::warn;

use crate::analyzer::SourceAnalyzer;
use crate::catalog::ModuleCatalog;
use crate::index::{FilenameTargets, IndexSide, TargetIndex};
use crate::spec::{HandleKind, TargetHandle, TargetSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Include,
    Exclude,
}

pub struct Resolver<'a> {
    catalog: &'a dyn ModuleCatalog,
    analyzer: &'a dyn SourceAnalyzer,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a dyn ModuleCatalog, analyzer: &'a dyn SourceAnalyzer) -> Self {
        Self { catalog, analyzer }
    }

    /// Resolves both spec lists into the immutable query index.
    pub fn resolve(&self, targets: &[TargetSpec], excludes: &[TargetSpec]) -> TargetIndex {
        let mut filenames = FilenameTargets::default();
        let include = self.resolve_side(targets, Side::Include, &mut filenames);
        let exclude = self.resolve_side(excludes, Side::Exclude, &mut filenames);
        TargetIndex::new(include, exclude, filenames)
    }

    fn resolve_side(
        &self,
        specs: &[TargetSpec],
        side: Side,
        filenames: &mut FilenameTargets,
    ) -> IndexSide {
        let mut index = IndexSide::default();
        for spec in specs {
            self.apply(spec, side, &mut index, filenames);
        }
        index
    }

    fn apply(
        &self,
        spec: &TargetSpec,
        side: Side,
        index: &mut IndexSide,
        filenames: &mut FilenameTargets,
    ) {
        match spec {
            TargetSpec::Filename(path) => match side {
                Side::Include => filenames.insert(path.clone()),
                // The filename fast path traces unconditionally; there is
                // no symmetric deny form.
                Side::Exclude => {
                    warn!(file = %path, "filename targets cannot be excluded; ignoring");
                }
            },
            TargetSpec::Module(module) => match side {
                Side::Include => {
                    let mut visited = HashSet::new();
                    self.enumerate_module(module, index, &mut visited);
                }
                // A bare module exclude denies the module outright; no
                // enumeration needed.
                Side::Exclude => index.entry_mut(module).all = true,
            },
            TargetSpec::Class { module, class } => {
                index.entry_mut(module).class_mut(class).track_all = true;
            }
            TargetSpec::Method {
                module,
                class,
                method,
            } => {
                index
                    .entry_mut(module)
                    .class_mut(class)
                    .methods
                    .insert(method.clone());
            }
            TargetSpec::Function { module, func } => {
                index.entry_mut(module).functions.insert(func.clone());
            }
            TargetSpec::Attribute {
                module,
                class,
                attr,
            } => {
                index
                    .entry_mut(module)
                    .class_mut(class)
                    .attrs
                    .insert(attr.clone());
            }
            TargetSpec::Global { module, name } => {
                // Never requires a successful module lookup.
                index.entry_mut(module).globals.insert(name.clone());
            }
            TargetSpec::Handle(handle) => self.apply_handle(handle, side, index, filenames),
        }
    }

    fn apply_handle(
        &self,
        handle: &TargetHandle,
        side: Side,
        index: &mut IndexSide,
        filenames: &mut FilenameTargets,
    ) {
        let spec = match handle.kind {
            HandleKind::Module => TargetSpec::Module(handle.module.clone()),
            HandleKind::Class => match &handle.name {
                Some(name) => TargetSpec::Class {
                    module: handle.module.clone(),
                    class: name.clone(),
                },
                None => {
                    warn!(module = %handle.module, "class handle without a name; ignoring");
                    return;
                }
            },
            HandleKind::Function => match &handle.name {
                Some(name) => TargetSpec::Function {
                    module: handle.module.clone(),
                    func: name.clone(),
                },
                None => {
                    warn!(module = %handle.module, "function handle without a name; ignoring");
                    return;
                }
            },
            HandleKind::Method => match (&handle.owner, &handle.name) {
                (Some(owner), Some(name)) => TargetSpec::Method {
                    module: handle.module.clone(),
                    class: owner.clone(),
                    method: name.clone(),
                },
                _ => {
                    warn!(
                        module = %handle.module,
                        "method handle without owner or name; ignoring"
                    );
                    return;
                }
            },
        };
        self.apply(&spec, side, index, filenames);
    }

    /// Enumerates a module (and, recursively, its submodules) through the
    /// catalog and analyzer. Every discovered class defaults to track-all.
    fn enumerate_module(&self, module: &str, index: &mut IndexSide, visited: &mut HashSet<String>) {
        if !visited.insert(module.to_string()) {
            return;
        }

        // Presence in the index admits the module even when enumeration
        // fails; an empty entry simply tracks nothing call-level.
        let entry = index.entry_mut(module);
        entry.all = true;

        let Some(source) = self.catalog.source_of(module) else {
            warn!(module = %module, "target module not found; contributing empty entry");
            return;
        };

        let table = match self.analyzer.analyze(&source.text) {
            Ok(table) => table,
            Err(err) => {
                warn!(
                    module = %module,
                    path = %source.path.display(),
                    error = %err,
                    "target module failed to analyze"
                );
                return;
            }
        };

        for class in &table.classes {
            let class_entry = entry.class_mut(&class.name);
            class_entry.track_all = true;
            class_entry.methods.extend(class.methods.iter().cloned());
            class_entry.attrs.extend(class.attrs.iter().cloned());
        }
        entry.functions.extend(table.functions.iter().cloned());
        entry.globals.extend(table.globals.iter().cloned());

        let mut submodules = table.submodules.clone();
        submodules.extend(self.catalog.submodules(module));
        submodules.sort();
        submodules.dedup();
        for name in submodules {
            self.enumerate_module(&format!("{module}.{name}"), index, visited);
        }
    }
}
