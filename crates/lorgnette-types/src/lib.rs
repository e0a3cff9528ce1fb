//! Core event nomenclature shared across lorgnette's runtime model.
//!
//! - `StepEvent`: what the instrumented host delivers to the dispatcher
//!   (enter / exit / step notifications with observed bindings).
//! - `ChangeEvent`: what the dispatcher hands to the output sink.
//! - `ObsValue` / `Identity`: how observed values cross the hook boundary
//!   without the tracer ever owning the traced data.
//!
//! In short: the host observes values, the dispatcher classifies what
//! changed, and sinks render change events.

use compact_str::CompactString;
use facet::Facet;
use std::error::Error;
use std::fmt;
use std::num::NonZeroU64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    ZeroObjKey,
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroObjKey => write!(f, "object key must be non-zero"),
        }
    }
}

impl Error for InvariantError {}

// ── Object identity ──────────────────────────────────────

/// Stable non-zero handle standing in for object identity across the hook
/// boundary.
///
/// The host assigns one key per traced object and reports the object's
/// death through `object_dropped`; holding an `ObjKey` never extends the
/// referent's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjKey(NonZeroU64);

impl ObjKey {
    pub fn new(value: u64) -> Result<Self, InvariantError> {
        NonZeroU64::new(value)
            .map(Self)
            .ok_or(InvariantError::ZeroObjKey)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// Identity of an observed value.
///
/// Containers and other heap entities carry an `Object` key; scalars that
/// the host renders by value have no stable identity and are `Inline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    Object(ObjKey),
    Inline,
}

impl Identity {
    /// True when both sides are the same underlying object reference.
    ///
    /// Two `Inline` values are never the same object: they have no
    /// identity to compare.
    pub fn same_object(self, other: Identity) -> bool {
        match (self, other) {
            (Identity::Object(a), Identity::Object(b)) => a == b,
            _ => false,
        }
    }

    pub fn key(self) -> Option<ObjKey> {
        match self {
            Identity::Object(key) => Some(key),
            Identity::Inline => None,
        }
    }
}

// ── Observed values ──────────────────────────────────────

/// A value as observed at the hook boundary: identity, rendered
/// representation, and container length when the value is sized/ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsValue {
    pub identity: Identity,
    /// Rendered representation; the tracer treats it as opaque text.
    pub repr: CompactString,
    /// `Some` iff the value is a sized/ordered container.
    pub len: Option<usize>,
    /// Callable values are never snapshotted or diffed.
    pub callable: bool,
}

impl ObsValue {
    pub fn object(key: ObjKey, repr: impl Into<CompactString>) -> Self {
        Self {
            identity: Identity::Object(key),
            repr: repr.into(),
            len: None,
            callable: false,
        }
    }

    pub fn sized(key: ObjKey, repr: impl Into<CompactString>, len: usize) -> Self {
        Self {
            identity: Identity::Object(key),
            repr: repr.into(),
            len: Some(len),
            callable: false,
        }
    }

    pub fn inline(repr: impl Into<CompactString>) -> Self {
        Self {
            identity: Identity::Inline,
            repr: repr.into(),
            len: None,
            callable: false,
        }
    }

    pub fn callable(repr: impl Into<CompactString>) -> Self {
        Self {
            identity: Identity::Inline,
            repr: repr.into(),
            len: None,
            callable: true,
        }
    }
}

/// A named binding observed in one of the three snapshot domains
/// (receiver attribute, call local, module global).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: CompactString,
    pub value: ObsValue,
}

impl Binding {
    pub fn new(name: impl Into<CompactString>, value: ObsValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

// ── Step notifications (host → dispatcher) ───────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Enter,
    Exit,
    Step,
}

/// The receiver of a method call, with its currently observable attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    pub identity: Identity,
    pub attrs: Vec<Binding>,
}

/// One step-level execution notification delivered by the host.
///
/// The host is responsible for rendering values into `ObsValue`s and for
/// normalizing `module_path!()` output into dotted form (`a::b` → `a.b`).
#[derive(Debug, Clone)]
pub struct StepEvent {
    /// Source path of the executing scope, matched by suffix against
    /// filename targets.
    pub file: CompactString,
    /// Dotted module path, e.g. `my_crate.train.loop`.
    pub module: CompactString,
    /// Function name without its owner.
    pub func: CompactString,
    /// Owning type name when the function is a method.
    pub class: Option<CompactString>,
    /// 1-based source line of the step.
    pub line: u32,
    pub kind: StepKind,
    /// Host-assigned call activation id; keys the call-local snapshot.
    pub frame: u64,
    pub receiver: Option<Receiver>,
    pub locals: Vec<Binding>,
    pub globals: Vec<Binding>,
    /// Rendered return value; `Exit` only.
    pub result: Option<ObsValue>,
}

impl StepEvent {
    pub fn new(
        kind: StepKind,
        module: impl Into<CompactString>,
        func: impl Into<CompactString>,
    ) -> Self {
        Self {
            file: CompactString::default(),
            module: module.into(),
            func: func.into(),
            class: None,
            line: 0,
            kind,
            frame: 0,
            receiver: None,
            locals: Vec::new(),
            globals: Vec::new(),
            result: None,
        }
    }

    /// `module.Class.func` for methods, `module.func` for free functions.
    pub fn qualified_name(&self) -> CompactString {
        match &self.class {
            Some(class) => CompactString::from(format!("{}.{class}.{}", self.module, self.func)),
            None => CompactString::from(format!("{}.{}", self.module, self.func)),
        }
    }
}

// ── Change events (dispatcher → sink) ────────────────────

/// Worker identity within a multi-process coordination group.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInfo {
    pub rank: u32,
    pub world_size: Option<u32>,
}

#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum EventKind {
    /// Function entry.
    Run,
    /// Function exit.
    End,
    /// Value replaced (or first observed).
    Upd,
    /// Same container grew.
    Apd,
    /// Same container shrank.
    Pop,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::End => "end",
            Self::Upd => "upd",
            Self::Apd => "apd",
            Self::Pop => "pop",
        }
    }
}

/// The unit handed to the output sink. Created, emitted, discarded — the
/// core never retains change events.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    /// 1-based source line the event was observed at.
    pub line: u32,
    /// `module.Class.method` for run/end; the owning scope (class name,
    /// qualified function, or module) for mutation events.
    pub scope_name: String,
    /// Mutated attribute/local/global name; `None` for run/end.
    pub key: Option<String>,
    /// Rendered previous value; `None` when first observed.
    pub old: Option<String>,
    /// Rendered current value; the rendered result for `End`.
    pub new: Option<String>,
    /// Call depth the event was emitted at.
    pub depth: u32,
    pub rank: Option<RankInfo>,
}

impl ChangeEvent {
    pub fn run(line: u32, scope_name: impl Into<String>, depth: u32, rank: Option<RankInfo>) -> Self {
        Self {
            kind: EventKind::Run,
            line,
            scope_name: scope_name.into(),
            key: None,
            old: None,
            new: None,
            depth,
            rank,
        }
    }

    pub fn end(
        line: u32,
        scope_name: impl Into<String>,
        depth: u32,
        rank: Option<RankInfo>,
        result: Option<String>,
    ) -> Self {
        Self {
            kind: EventKind::End,
            line,
            scope_name: scope_name.into(),
            key: None,
            old: None,
            new: result,
            depth,
            rank,
        }
    }

    pub fn mutation(
        kind: EventKind,
        line: u32,
        scope_name: impl Into<String>,
        key: impl Into<String>,
        old: Option<String>,
        new: impl Into<String>,
        depth: u32,
        rank: Option<RankInfo>,
    ) -> Self {
        Self {
            kind,
            line,
            scope_name: scope_name.into(),
            key: Some(key.into()),
            old,
            new: Some(new.into()),
            depth,
            rank,
        }
    }
}
