//! Module catalogs: dotted module names in, source text out.
//!
//! `FsCatalog` follows the `src/` layout conventions (`a.b` probes
//! `a/b.rs`, then `a/b/mod.rs`, then `a/b/lib.rs` for crate roots) across
//! one or more source roots. `MemoryCatalog` backs tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Source text for one module, with the path it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub path: PathBuf,
    pub text: String,
}

pub trait ModuleCatalog {
    /// Source for the dotted module path, if the catalog knows it.
    fn source_of(&self, module: &str) -> Option<ModuleSource>;

    /// Direct submodules of the dotted module path, as bare names.
    fn submodules(&self, module: &str) -> Vec<String>;
}

// ── Filesystem catalog ───────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FsCatalog {
    roots: Vec<PathBuf>,
}

impl FsCatalog {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    fn candidates(root: &Path, module: &str) -> [PathBuf; 3] {
        let rel = module.replace('.', "/");
        [
            root.join(format!("{rel}.rs")),
            root.join(&rel).join("mod.rs"),
            root.join(&rel).join("lib.rs"),
        ]
    }

    fn module_dir(root: &Path, module: &str) -> PathBuf {
        root.join(module.replace('.', "/"))
    }
}

impl ModuleCatalog for FsCatalog {
    fn source_of(&self, module: &str) -> Option<ModuleSource> {
        for root in &self.roots {
            for candidate in Self::candidates(root, module) {
                if let Ok(text) = std::fs::read_to_string(&candidate) {
                    return Some(ModuleSource {
                        path: candidate,
                        text,
                    });
                }
            }
        }
        None
    }

    fn submodules(&self, module: &str) -> Vec<String> {
        let mut names = Vec::new();
        for root in &self.roots {
            let dir = Self::module_dir(root, module);
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    if path.join("mod.rs").is_file() {
                        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                            names.push(name.to_string());
                        }
                    }
                } else if path.extension().is_some_and(|ext| ext == "rs") {
                    let Some(stem) = path.file_stem().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    if stem != "mod" && stem != "lib" && stem != "main" {
                        names.push(stem.to_string());
                    }
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }
}

// ── In-memory catalog ────────────────────────────────────

/// Catalog backed by a plain map of dotted module names to source text.
/// Submodule edges are derived from the key space.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    sources: BTreeMap<String, String>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(module, source);
        self
    }

    pub fn insert(&mut self, module: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(module.into(), source.into());
    }
}

impl ModuleCatalog for MemoryCatalog {
    fn source_of(&self, module: &str) -> Option<ModuleSource> {
        self.sources.get(module).map(|text| ModuleSource {
            path: PathBuf::from(format!("{}.rs", module.replace('.', "/"))),
            text: text.clone(),
        })
    }

    fn submodules(&self, module: &str) -> Vec<String> {
        let prefix = format!("{module}.");
        self.sources
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('.'))
            .map(|rest| rest.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_catalog_derives_submodule_edges() {
        let catalog = MemoryCatalog::new()
            .with_module("app", "")
            .with_module("app.train", "")
            .with_module("app.train.sched", "")
            .with_module("app.data", "");

        assert_eq!(catalog.submodules("app"), vec!["data", "train"]);
        assert_eq!(catalog.submodules("app.train"), vec!["sched"]);
        assert!(catalog.submodules("app.train.sched").is_empty());
    }

    #[test]
    fn fs_catalog_probes_layout_conventions() {
        let dir = std::env::temp_dir().join(format!(
            "lorgnette-catalog-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::create_dir_all(dir.join("app/train")).expect("create module tree");
        std::fs::write(dir.join("app.rs"), "pub mod train;").expect("write app.rs");
        std::fs::write(dir.join("app/train/mod.rs"), "pub fn step() {}")
            .expect("write train/mod.rs");
        std::fs::write(dir.join("app/data.rs"), "pub fn load() {}").expect("write data.rs");

        let catalog = FsCatalog::new([dir.clone()]);
        assert!(catalog.source_of("app").is_some());
        let train = catalog.source_of("app.train").expect("mod.rs probe");
        assert!(train.text.contains("step"));
        assert_eq!(catalog.submodules("app"), vec!["data", "train"]);
        assert!(catalog.source_of("app.missing").is_none());

        std::fs::remove_dir_all(&dir).expect("cleanup temp tree");
    }
}
