//! The target-spec mini-language and typed target handles.
//!
//! Raw strings classify as:
//! - `src/train.rs` — a filename target (matched by suffix, bypasses
//!   symbolic resolution);
//! - `app.train::GLOBAL_STEP` — a single module-level global;
//! - `app.train:Trainer.step()` — one method of a class;
//! - `app.train:Trainer.lr` — one attribute of a class;
//! - `app.train:Trainer` — a whole class (track-all);
//! - `app.train` — a whole module, resolved recursively.

use std::error::Error;
use std::fmt;

pub const SOURCE_SUFFIX: &str = ".rs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecParseError {
    Empty,
    InvalidModule { raw: String },
    InvalidMember { raw: String },
    InvalidGlobal { raw: String },
    UnqualifiedHandle { qualified: String },
}

impl fmt::Display for SpecParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "target spec must be non-empty"),
            Self::InvalidModule { raw } => write!(f, "invalid module path in target spec `{raw}`"),
            Self::InvalidMember { raw } => write!(f, "invalid class member in target spec `{raw}`"),
            Self::InvalidGlobal { raw } => write!(f, "invalid global name in target spec `{raw}`"),
            Self::UnqualifiedHandle { qualified } => {
                write!(f, "handle path `{qualified}` has too few segments to resolve")
            }
        }
    }
}

impl Error for SpecParseError {}

/// A single target or exclude specification, resolved once at attach time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Whole module, resolved recursively through its submodules.
    Module(String),
    /// Whole class, track-all.
    Class { module: String, class: String },
    /// One method of a class.
    Method {
        module: String,
        class: String,
        method: String,
    },
    /// One free function of a module.
    Function { module: String, func: String },
    /// One attribute of a class.
    Attribute {
        module: String,
        class: String,
        attr: String,
    },
    /// One module-level global; never requires a module lookup.
    Global { module: String, name: String },
    /// Raw source path, matched by suffix.
    Filename(String),
    /// A typed handle to a live module/class/function.
    Handle(TargetHandle),
}

impl TargetSpec {
    /// Classifies a raw spec string. Resolution failures downstream are
    /// warnings; only malformed syntax is rejected here.
    pub fn parse(raw: &str) -> Result<Self, SpecParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SpecParseError::Empty);
        }

        if raw.ends_with(SOURCE_SUFFIX) {
            return Ok(Self::Filename(raw.to_string()));
        }

        if let Some((module, name)) = raw.rsplit_once("::") {
            if !is_module_path(module) || !is_identifier(name) {
                return Err(SpecParseError::InvalidGlobal { raw: raw.to_string() });
            }
            return Ok(Self::Global {
                module: module.to_string(),
                name: name.to_string(),
            });
        }

        if let Some((module, member)) = raw.split_once(':') {
            if !is_module_path(module) {
                return Err(SpecParseError::InvalidModule { raw: raw.to_string() });
            }
            return parse_member(module, member, raw);
        }

        if !is_module_path(raw) {
            return Err(SpecParseError::InvalidModule { raw: raw.to_string() });
        }
        Ok(Self::Module(raw.to_string()))
    }

    /// The dotted module path this spec contributes to.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::Module(module)
            | Self::Class { module, .. }
            | Self::Method { module, .. }
            | Self::Function { module, .. }
            | Self::Attribute { module, .. }
            | Self::Global { module, .. } => Some(module),
            Self::Handle(handle) => Some(&handle.module),
            Self::Filename(_) => None,
        }
    }
}

fn parse_member(module: &str, member: &str, raw: &str) -> Result<TargetSpec, SpecParseError> {
    let module = module.to_string();
    match member.split_once('.') {
        None => {
            if let Some(func) = member.strip_suffix("()") {
                if !is_identifier(func) {
                    return Err(SpecParseError::InvalidMember { raw: raw.to_string() });
                }
                return Ok(TargetSpec::Function {
                    module,
                    func: func.to_string(),
                });
            }
            if !is_identifier(member) {
                return Err(SpecParseError::InvalidMember { raw: raw.to_string() });
            }
            Ok(TargetSpec::Class {
                module,
                class: member.to_string(),
            })
        }
        Some((class, rest)) => {
            if !is_identifier(class) {
                return Err(SpecParseError::InvalidMember { raw: raw.to_string() });
            }
            if let Some(method) = rest.strip_suffix("()") {
                if !is_identifier(method) {
                    return Err(SpecParseError::InvalidMember { raw: raw.to_string() });
                }
                Ok(TargetSpec::Method {
                    module,
                    class: class.to_string(),
                    method: method.to_string(),
                })
            } else {
                if !is_identifier(rest) {
                    return Err(SpecParseError::InvalidMember { raw: raw.to_string() });
                }
                Ok(TargetSpec::Attribute {
                    module,
                    class: class.to_string(),
                    attr: rest.to_string(),
                })
            }
        }
    }
}

// ── Typed handles ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Module,
    Class,
    Function,
    Method,
}

/// A typed reference to a live module, class, or function of the traced
/// program, built from `module_path!()`-style paths.
///
/// `::` separators are normalized to dots on construction, so handles and
/// string specs land in the same index namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHandle {
    pub kind: HandleKind,
    /// Dotted declaring-module path.
    pub module: String,
    /// Declaring type, when known through an explicit owner link.
    pub owner: Option<String>,
    /// Member name; `None` for module handles.
    pub name: Option<String>,
}

impl TargetHandle {
    pub fn module(path: &str) -> Self {
        Self {
            kind: HandleKind::Module,
            module: normalize_module(path),
            owner: None,
            name: None,
        }
    }

    pub fn class(path: &str, name: impl Into<String>) -> Self {
        Self {
            kind: HandleKind::Class,
            module: normalize_module(path),
            owner: None,
            name: Some(name.into()),
        }
    }

    pub fn function(path: &str, name: impl Into<String>) -> Self {
        Self {
            kind: HandleKind::Function,
            module: normalize_module(path),
            owner: None,
            name: Some(name.into()),
        }
    }

    /// A method handle with an explicit owner link to its declaring type.
    pub fn method(path: &str, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: HandleKind::Method,
            module: normalize_module(path),
            owner: Some(owner.into()),
            name: Some(name.into()),
        }
    }

    /// Infers module (and owner, for methods) by parsing a qualified name
    /// such as `app::train::Trainer::step`.
    pub fn from_qualified(qualified: &str, kind: HandleKind) -> Result<Self, SpecParseError> {
        let normalized = normalize_module(qualified);
        let segments: Vec<&str> = normalized.split('.').collect();
        let err = || SpecParseError::UnqualifiedHandle {
            qualified: qualified.to_string(),
        };
        match kind {
            HandleKind::Module => Ok(Self::module(&normalized)),
            HandleKind::Class | HandleKind::Function => {
                let (name, module) = segments.split_last().ok_or_else(err)?;
                if module.is_empty() {
                    return Err(err());
                }
                Ok(Self {
                    kind,
                    module: module.join("."),
                    owner: None,
                    name: Some((*name).to_string()),
                })
            }
            HandleKind::Method => {
                if segments.len() < 3 {
                    return Err(err());
                }
                let name = segments[segments.len() - 1];
                let owner = segments[segments.len() - 2];
                let module = segments[..segments.len() - 2].join(".");
                Ok(Self {
                    kind,
                    module,
                    owner: Some(owner.to_string()),
                    name: Some(name.to_string()),
                })
            }
        }
    }
}

/// `a::b::c` → `a.b.c`; dotted paths pass through unchanged.
pub fn normalize_module(path: &str) -> String {
    path.replace("::", ".")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn is_module_path(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}
