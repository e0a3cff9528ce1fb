//! The include/exclude index and its query layer.
//!
//! Both sides share one shape: module → { classes, functions, globals }.
//! Queries collapse the two sides into tagged `ClassPolicy` values so the
//! precedence rule (exclusion only ever narrows a track-all class, never
//! widens a selected set) holds by construction.

use std::collections::{BTreeMap, BTreeSet};

// ── Entries ──────────────────────────────────────────────

/// One class inside a module entry.
///
/// With `track_all` set, the member sets are ignored for inclusion; on the
/// exclude side the same sets act as the deny-list over an otherwise
/// fully-tracked class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassEntry {
    pub track_all: bool,
    pub methods: BTreeSet<String>,
    pub attrs: BTreeSet<String>,
}

impl ClassEntry {
    pub fn track_all() -> Self {
        Self {
            track_all: true,
            ..Self::default()
        }
    }

    fn merge_from(&mut self, other: &ClassEntry) {
        self.track_all |= other.track_all;
        self.methods.extend(other.methods.iter().cloned());
        self.attrs.extend(other.attrs.iter().cloned());
    }
}

/// Everything one side of the index knows about a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleEntry {
    /// Whole-module marker: on the exclude side it denies the module
    /// outright; on the include side it records that the module itself
    /// (not just members) was targeted.
    pub all: bool,
    pub classes: BTreeMap<String, ClassEntry>,
    pub functions: BTreeSet<String>,
    pub globals: BTreeSet<String>,
}

impl ModuleEntry {
    pub fn class_mut(&mut self, class: &str) -> &mut ClassEntry {
        self.classes.entry(class.to_string()).or_default()
    }

    fn merge_from(&mut self, other: &ModuleEntry) {
        self.all |= other.all;
        for (name, entry) in &other.classes {
            self.class_mut(name).merge_from(entry);
        }
        self.functions.extend(other.functions.iter().cloned());
        self.globals.extend(other.globals.iter().cloned());
    }
}

/// One side (include or exclude) of the target index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSide {
    pub modules: BTreeMap<String, ModuleEntry>,
}

impl IndexSide {
    pub fn entry_mut(&mut self, module: &str) -> &mut ModuleEntry {
        self.modules.entry(module.to_string()).or_default()
    }

    /// Deep merge: module entries union member-wise; `track_all` and
    /// `all` win if set on either side. Order-independent for disjoint
    /// members.
    pub fn merge(&mut self, other: &IndexSide) {
        for (module, entry) in &other.modules {
            self.entry_mut(module).merge_from(entry);
        }
    }
}

// ── Filename fast path ───────────────────────────────────

/// Raw source-file targets matched by path suffix, independent of the
/// symbolic index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameTargets {
    suffixes: BTreeSet<String>,
}

impl FilenameTargets {
    pub fn insert(&mut self, suffix: impl Into<String>) {
        self.suffixes.insert(suffix.into());
    }

    pub fn matches(&self, file: &str) -> bool {
        self.suffixes.iter().any(|suffix| file.ends_with(suffix))
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.suffixes.len()
    }
}

// ── Query layer ──────────────────────────────────────────

/// Effective tracking policy for one class, collapsed from both index
/// sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassPolicy {
    /// Everything is tracked except the denied members.
    TrackAll {
        deny_methods: BTreeSet<String>,
        deny_attrs: BTreeSet<String>,
    },
    /// Only the selected members are tracked; excludes cannot widen or
    /// narrow this set.
    TrackSelected {
        methods: BTreeSet<String>,
        attrs: BTreeSet<String>,
    },
}

impl ClassPolicy {
    pub fn trace_method(&self, method: &str) -> bool {
        match self {
            Self::TrackAll { deny_methods, .. } => !deny_methods.contains(method),
            Self::TrackSelected { methods, .. } => methods.contains(method),
        }
    }

    pub fn trace_attr(&self, attr: &str) -> bool {
        match self {
            Self::TrackAll { deny_attrs, .. } => !deny_attrs.contains(attr),
            Self::TrackSelected { attrs, .. } => attrs.contains(attr),
        }
    }
}

/// The immutable product of target resolution. All queries are pure
/// functions of `(module, name)` tuples, safe to memoize and to share
/// across threads after attach.
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    pub include: IndexSide,
    pub exclude: IndexSide,
    pub filenames: FilenameTargets,
}

impl TargetIndex {
    pub fn new(include: IndexSide, exclude: IndexSide, filenames: FilenameTargets) -> Self {
        Self {
            include,
            exclude,
            filenames,
        }
    }

    /// `module ∈ include ∧ module not denied outright`.
    pub fn trace_module(&self, module: &str) -> bool {
        self.include.modules.contains_key(module)
            && !self
                .exclude
                .modules
                .get(module)
                .is_some_and(|entry| entry.all)
    }

    /// Collapses both sides into the effective policy for one class.
    /// `None` means the class is not tracked at all (unknown, or denied
    /// outright on the exclude side).
    pub fn class_policy(&self, module: &str, class: &str) -> Option<ClassPolicy> {
        let included = self.include.modules.get(module)?.classes.get(class)?;
        let excluded = self
            .exclude
            .modules
            .get(module)
            .and_then(|entry| entry.classes.get(class));

        if excluded.is_some_and(|entry| entry.track_all) {
            return None;
        }

        if included.track_all {
            Some(ClassPolicy::TrackAll {
                deny_methods: excluded.map(|e| e.methods.clone()).unwrap_or_default(),
                deny_attrs: excluded.map(|e| e.attrs.clone()).unwrap_or_default(),
            })
        } else {
            Some(ClassPolicy::TrackSelected {
                methods: included.methods.clone(),
                attrs: included.attrs.clone(),
            })
        }
    }

    pub fn trace_function(&self, module: &str, func: &str) -> bool {
        let included = self
            .include
            .modules
            .get(module)
            .is_some_and(|entry| entry.functions.contains(func));
        let excluded = self
            .exclude
            .modules
            .get(module)
            .is_some_and(|entry| entry.functions.contains(func));
        included && !excluded
    }

    pub fn global_tracked(&self, module: &str, name: &str) -> bool {
        let included = self
            .include
            .modules
            .get(module)
            .is_some_and(|entry| entry.globals.contains(name));
        let excluded = self
            .exclude
            .modules
            .get(module)
            .is_some_and(|entry| entry.globals.contains(name));
        included && !excluded
    }

    /// True when the module has at least one tracked global — the
    /// precondition for global re-admission of otherwise-rejected scopes.
    pub fn has_tracked_globals(&self, module: &str) -> bool {
        self.include
            .modules
            .get(module)
            .is_some_and(|entry| !entry.globals.is_empty())
    }

    pub fn file_matches(&self, file: &str) -> bool {
        self.filenames.matches(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn index_with_class(track_all: bool, methods: &[&str]) -> TargetIndex {
        let mut include = IndexSide::default();
        let entry = include.entry_mut("app.train").class_mut("Trainer");
        entry.track_all = track_all;
        entry.methods = set(methods);
        TargetIndex::new(include, IndexSide::default(), FilenameTargets::default())
    }

    #[test]
    fn track_all_excludes_only_denied_methods() {
        let mut index = index_with_class(true, &[]);
        index
            .exclude
            .entry_mut("app.train")
            .class_mut("Trainer")
            .methods
            .insert("warmup".to_string());

        let policy = index
            .class_policy("app.train", "Trainer")
            .expect("class is tracked");
        assert!(policy.trace_method("step"));
        assert!(!policy.trace_method("warmup"));
    }

    #[test]
    fn selected_set_is_never_widened_by_missing_excludes() {
        let index = index_with_class(false, &["step"]);
        let policy = index
            .class_policy("app.train", "Trainer")
            .expect("class is tracked");
        assert!(policy.trace_method("step"));
        assert!(!policy.trace_method("warmup"));
    }

    #[test]
    fn whole_class_exclude_removes_the_policy() {
        let mut index = index_with_class(true, &[]);
        index
            .exclude
            .entry_mut("app.train")
            .class_mut("Trainer")
            .track_all = true;
        assert!(index.class_policy("app.train", "Trainer").is_none());
    }

    #[test]
    fn whole_module_exclude_beats_inclusion() {
        let mut index = index_with_class(true, &[]);
        assert!(index.trace_module("app.train"));
        index.exclude.entry_mut("app.train").all = true;
        assert!(!index.trace_module("app.train"));
    }

    #[test]
    fn member_excludes_do_not_reject_the_module() {
        let mut index = index_with_class(true, &[]);
        index
            .exclude
            .entry_mut("app.train")
            .functions
            .insert("helper".to_string());
        assert!(index.trace_module("app.train"));
    }

    #[test]
    fn merge_is_order_independent_for_disjoint_classes() {
        let mut a = IndexSide::default();
        a.entry_mut("app").class_mut("Trainer").track_all = true;
        let mut b = IndexSide::default();
        b.entry_mut("app")
            .class_mut("Sampler")
            .methods
            .insert("next".to_string());

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn merge_unions_members_and_track_all_wins() {
        let mut a = IndexSide::default();
        a.entry_mut("app")
            .class_mut("Trainer")
            .methods
            .insert("step".to_string());
        let mut b = IndexSide::default();
        b.entry_mut("app").class_mut("Trainer").track_all = true;

        a.merge(&b);
        let entry = &a.modules["app"].classes["Trainer"];
        assert!(entry.track_all);
        assert!(entry.methods.contains("step"));
    }

    #[test]
    fn filename_targets_match_by_suffix() {
        let mut filenames = FilenameTargets::default();
        filenames.insert("src/train.rs");
        assert!(filenames.matches("/work/app/src/train.rs"));
        assert!(!filenames.matches("/work/app/src/data.rs"));
    }
}
