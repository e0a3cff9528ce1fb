//! Static source analysis: one source unit in, one declared-symbol table out.
//!
//! The analyzer only sees items whose nearest enclosing scope is module
//! level; anything nested inside a `fn` body never reaches the table.

use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeError {
    Parse { message: String },
}

impl fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { message } => write!(f, "source does not parse: {message}"),
        }
    }
}

impl Error for AnalyzeError {}

/// A class declared at module level: its methods (from impl blocks) and
/// its named fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDecl {
    pub name: String,
    pub methods: Vec<String>,
    pub attrs: Vec<String>,
}

/// Everything a module declares at its top level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    pub classes: Vec<ClassDecl>,
    pub functions: Vec<String>,
    /// Top-level `static` and `const` items.
    pub globals: Vec<String>,
    /// Declared submodule names, for recursive resolution.
    pub submodules: Vec<String>,
}

impl SymbolTable {
    fn class_mut(&mut self, name: &str) -> &mut ClassDecl {
        if let Some(pos) = self.classes.iter().position(|c| c.name == name) {
            return &mut self.classes[pos];
        }
        self.classes.push(ClassDecl {
            name: name.to_string(),
            ..ClassDecl::default()
        });
        self.classes.last_mut().expect("just pushed")
    }
}

/// Maps a source unit to its declared-symbol table. Pluggable so another
/// syntax backend can stand in for `SynAnalyzer`.
pub trait SourceAnalyzer {
    fn analyze(&self, source: &str) -> Result<SymbolTable, AnalyzeError>;
}

/// `syn`-backed analyzer for Rust source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynAnalyzer;

impl SourceAnalyzer for SynAnalyzer {
    fn analyze(&self, source: &str) -> Result<SymbolTable, AnalyzeError> {
        let file = syn::parse_file(source).map_err(|err| AnalyzeError::Parse {
            message: err.to_string(),
        })?;

        let mut table = SymbolTable::default();
        for item in &file.items {
            collect_item(item, &mut table);
        }
        Ok(table)
    }
}

fn collect_item(item: &syn::Item, table: &mut SymbolTable) {
    match item {
        syn::Item::Struct(item) => {
            let class = table.class_mut(&item.ident.to_string());
            if let syn::Fields::Named(fields) = &item.fields {
                for field in &fields.named {
                    if let Some(ident) = &field.ident {
                        let name = ident.to_string();
                        if !class.attrs.contains(&name) {
                            class.attrs.push(name);
                        }
                    }
                }
            }
        }
        syn::Item::Enum(item) => {
            table.class_mut(&item.ident.to_string());
        }
        syn::Item::Fn(item) => {
            table.functions.push(item.sig.ident.to_string());
        }
        syn::Item::Static(item) => {
            table.globals.push(item.ident.to_string());
        }
        syn::Item::Const(item) => {
            table.globals.push(item.ident.to_string());
        }
        syn::Item::Impl(item) => {
            let Some(type_name) = impl_self_type(item) else {
                return;
            };
            let class = table.class_mut(&type_name);
            for impl_item in &item.items {
                if let syn::ImplItem::Fn(method) = impl_item {
                    let name = method.sig.ident.to_string();
                    if !class.methods.contains(&name) {
                        class.methods.push(name);
                    }
                }
            }
        }
        syn::Item::Mod(item) => {
            table.submodules.push(item.ident.to_string());
        }
        _ => {}
    }
}

fn impl_self_type(item: &syn::ItemImpl) -> Option<String> {
    match item.self_ty.as_ref() {
        syn::Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(source: &str) -> SymbolTable {
        SynAnalyzer.analyze(source).expect("source must parse")
    }

    #[test]
    fn enumerates_top_level_declarations() {
        let table = analyze(
            r#"
            pub static GLOBAL_STEP: u64 = 0;
            const LR_SCHEDULE: [f32; 2] = [0.1, 0.01];

            pub struct Trainer {
                pub lr: f32,
                steps: u64,
            }

            impl Trainer {
                pub fn step(&mut self) {}
                fn warmup(&self) {}
            }

            pub fn launch() {}

            mod metrics {}
            "#,
        );

        assert_eq!(table.globals, vec!["GLOBAL_STEP", "LR_SCHEDULE"]);
        assert_eq!(table.functions, vec!["launch"]);
        assert_eq!(table.submodules, vec!["metrics"]);

        let trainer = &table.classes[0];
        assert_eq!(trainer.name, "Trainer");
        assert_eq!(trainer.attrs, vec!["lr", "steps"]);
        assert_eq!(trainer.methods, vec!["step", "warmup"]);
    }

    #[test]
    fn trait_impls_contribute_methods() {
        let table = analyze(
            r#"
            pub struct Sampler;

            impl Iterator for Sampler {
                type Item = u32;
                fn next(&mut self) -> Option<u32> { None }
            }
            "#,
        );
        assert_eq!(table.classes[0].methods, vec!["next"]);
    }

    #[test]
    fn items_inside_fn_bodies_are_not_module_level() {
        let table = analyze(
            r#"
            pub fn outer() {
                static HIDDEN: u32 = 0;
                fn inner() {}
                let _ = (HIDDEN, inner as fn());
            }
            "#,
        );
        assert_eq!(table.functions, vec!["outer"]);
        assert!(table.globals.is_empty());
    }

    #[test]
    fn enums_become_classes_without_attrs() {
        let table = analyze("pub enum Phase { Warmup, Train }");
        assert_eq!(table.classes[0].name, "Phase");
        assert!(table.classes[0].attrs.is_empty());
    }

    #[test]
    fn broken_source_is_a_parse_error() {
        let err = SynAnalyzer
            .analyze("pub struct {")
            .expect_err("must not parse");
        assert!(matches!(err, AnalyzeError::Parse { .. }));
    }
}
