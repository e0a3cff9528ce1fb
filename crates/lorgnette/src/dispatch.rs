//! The execution event dispatcher.
//!
//! One owned instance per tracer: tests drive `handle_step` directly,
//! production installs the instance into the process-wide hook slot. Per
//! notification the dispatcher answers, in O(1) amortized time, whether to
//! act (filename fast path, memoized module/member membership, rank gate),
//! then maintains the depth counter and feeds the snapshot/diff engine.

use compact_str::CompactString;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::error;

use lorgnette_index::{ClassPolicy, TargetIndex};
use lorgnette_types::{ChangeEvent, Identity, RankInfo, Receiver, StepEvent, StepKind};

use crate::diff::{Change, Snapshot};
use crate::error::TraceError;
use crate::rank::RankGate;
use crate::sink::EventSink;
use crate::weakmap::{RemovalSink, WeakIdMap};

/// Call-level admission for one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodDecision {
    /// Emit run/end and diff every admitted domain.
    Traced,
    /// The method itself is untraced but the class is known: keep the
    /// frame for attribute diffing only.
    AttrsOnly,
    Skip,
}

/// Membership caches. The index is immutable post-attach, so every
/// predicate is a pure function of its name tuple.
#[derive(Default)]
struct Memo {
    files: Mutex<HashMap<CompactString, bool>>,
    modules: Mutex<HashMap<CompactString, bool>>,
    functions: Mutex<HashMap<(CompactString, CompactString), bool>>,
    policies: Mutex<HashMap<(CompactString, CompactString), Option<ClassPolicy>>>,
}

pub struct Dispatcher {
    index: TargetIndex,
    track_locals: bool,
    track_globals: bool,
    sink: Arc<dyn EventSink>,
    gate: RankGate,
    depth: AtomicU32,
    detached: AtomicBool,
    fault: Mutex<Option<TraceError>>,
    memo: Memo,
    /// Receiver-object snapshots; weakly keyed so tracing never extends
    /// an object's lifetime.
    receivers: Mutex<WeakIdMap<Snapshot>>,
    removals: RemovalSink,
    /// Call-local snapshots, discarded when the activation exits.
    frames: Mutex<HashMap<u64, Snapshot>>,
    /// Module-global snapshots; modules live for the process.
    modules: Mutex<HashMap<CompactString, Snapshot>>,
}

impl Dispatcher {
    pub fn new(
        index: TargetIndex,
        sink: Arc<dyn EventSink>,
        gate: RankGate,
        track_locals: bool,
        track_globals: bool,
    ) -> Self {
        let receivers = WeakIdMap::new();
        let removals = receivers.removal_sink();
        Self {
            index,
            track_locals,
            track_globals,
            sink,
            gate,
            depth: AtomicU32::new(0),
            detached: AtomicBool::new(false),
            fault: Mutex::new(None),
            memo: Memo::default(),
            receivers: Mutex::new(receivers),
            removals,
            frames: Mutex::new(HashMap::new()),
            modules: Mutex::new(HashMap::new()),
        }
    }

    /// Entry point for step notifications. Serial delivery is the host's
    /// contract; this runs on the traced program's critical path.
    pub fn handle_step(&self, step: &StepEvent) {
        if self.detached.load(Ordering::Relaxed) {
            return;
        }
        let Some(rank) = self.gate.admit() else {
            return;
        };

        let file_hit = self.file_memo(&step.file);
        let module_ok = file_hit || self.module_memo(&step.module);
        let decision = self.call_decision(step, file_hit, module_ok);
        // Global tracking re-admits otherwise-rejected scopes: any step
        // inside the module diffs its tracked globals, call-level tracing
        // or not.
        let globals_on = self.track_globals
            && module_ok
            && self.index.has_tracked_globals(step.module.as_str());

        if decision == MethodDecision::Skip && !globals_on {
            return;
        }

        match step.kind {
            StepKind::Enter => self.on_enter(step, decision, globals_on, file_hit, rank),
            StepKind::Exit => self.on_exit(step, decision, globals_on, rank),
            StepKind::Step => self.on_step(step, decision, globals_on, file_hit, rank),
        }
    }

    /// Host notification that a traced object became unreachable; its
    /// snapshot is evicted lazily.
    pub fn object_dropped(&self, identity: Identity) {
        if let Some(key) = identity.key() {
            self.removals.retire(key);
        }
    }

    pub fn flush(&self) {
        self.sink.flush();
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }

    pub fn take_fault(&self) -> Option<TraceError> {
        self.fault.lock().take()
    }

    /// Current call depth; diagnostics only.
    pub fn current_depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    // ── Step handling ────────────────────────────────────

    fn on_enter(
        &self,
        step: &StepEvent,
        decision: MethodDecision,
        globals_on: bool,
        file_hit: bool,
        rank: Option<RankInfo>,
    ) {
        if decision == MethodDecision::Traced {
            // Depth increments after the run event: the pair emitted for
            // this call shares one depth value.
            let depth = self.depth.fetch_add(1, Ordering::Relaxed);
            self.emit(ChangeEvent::run(
                step.line,
                step.qualified_name().as_str(),
                depth,
                rank,
            ));
        }
        if decision != MethodDecision::Skip {
            self.seed_receiver(step, file_hit);
            if decision == MethodDecision::Traced && self.track_locals {
                self.frames
                    .lock()
                    .entry(step.frame)
                    .or_insert_with(|| {
                        let mut snapshot = Snapshot::new();
                        snapshot.seed(&step.locals, |_| true);
                        snapshot
                    });
            }
        }
        if globals_on {
            self.seed_or_diff_globals(step, rank);
        }
    }

    fn on_exit(
        &self,
        step: &StepEvent,
        decision: MethodDecision,
        globals_on: bool,
        rank: Option<RankInfo>,
    ) {
        if globals_on {
            self.seed_or_diff_globals(step, rank);
        }
        if decision != MethodDecision::Traced {
            return;
        }
        let previous = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |depth| {
                depth.checked_sub(1)
            });
        match previous {
            Ok(previous) => {
                // Depth decrements before the end event.
                let result = step.result.as_ref().map(|value| value.repr.to_string());
                self.emit(ChangeEvent::end(
                    step.line,
                    step.qualified_name().as_str(),
                    previous - 1,
                    rank,
                    result,
                ));
            }
            Err(_) => {
                self.invariant_violation(step);
                return;
            }
        }
        // The call-local snapshot dies with the activation.
        self.frames.lock().remove(&step.frame);
    }

    fn on_step(
        &self,
        step: &StepEvent,
        decision: MethodDecision,
        globals_on: bool,
        file_hit: bool,
        rank: Option<RankInfo>,
    ) {
        let depth = self.depth.load(Ordering::Relaxed);
        if decision != MethodDecision::Skip {
            self.diff_receiver(step, file_hit, depth, rank);
            if decision == MethodDecision::Traced && self.track_locals {
                self.diff_locals(step, depth, rank);
            }
        }
        if globals_on {
            self.seed_or_diff_globals(step, rank);
        }
    }

    // ── Snapshot domains ─────────────────────────────────

    fn attr_policy(&self, step: &StepEvent, file_hit: bool) -> Option<ClassPolicy> {
        let class = step.class.as_ref()?;
        match self.policy_memo(&step.module, class) {
            Some(policy) => Some(policy),
            // Filename fast path traces classes the index never saw:
            // every attribute is fair game.
            None if file_hit => Some(ClassPolicy::TrackAll {
                deny_methods: Default::default(),
                deny_attrs: Default::default(),
            }),
            None => None,
        }
    }

    fn seed_receiver(&self, step: &StepEvent, file_hit: bool) {
        let Some(receiver) = &step.receiver else {
            return;
        };
        let Some(policy) = self.attr_policy(step, file_hit) else {
            return;
        };
        self.with_receiver_snapshot(receiver, |snapshot| {
            snapshot.seed(&receiver.attrs, |name| policy.trace_attr(name));
        });
    }

    fn diff_receiver(&self, step: &StepEvent, file_hit: bool, depth: u32, rank: Option<RankInfo>) {
        let Some(receiver) = &step.receiver else {
            return;
        };
        let Some(policy) = self.attr_policy(step, file_hit) else {
            return;
        };
        let scope = step
            .class
            .clone()
            .unwrap_or_else(|| step.module.clone());
        let mut changes = Vec::new();
        self.with_receiver_snapshot(receiver, |snapshot| {
            snapshot.diff(
                &receiver.attrs,
                |name| policy.trace_attr(name),
                |change| changes.push(change),
            );
        });
        for change in changes {
            self.emit_change(change, step.line, scope.as_str(), depth, rank);
        }
    }

    /// Runs `body` over the receiver's snapshot, creating it when the
    /// receiver is newly seen. Receivers without stable identity cannot be
    /// weak-keyed and are skipped rather than crashing the tracer.
    fn with_receiver_snapshot(&self, receiver: &Receiver, body: impl FnOnce(&mut Snapshot)) {
        let Some(key) = receiver.identity.key() else {
            return;
        };
        let mut receivers = self.receivers.lock();
        receivers.flush_pending();
        if !receivers.contains_key(key) {
            let _ = receivers.try_insert(receiver.identity, Snapshot::new());
        }
        if let Some(snapshot) = receivers.get_mut(key) {
            body(snapshot);
        }
    }

    fn diff_locals(&self, step: &StepEvent, depth: u32, rank: Option<RankInfo>) {
        let scope = step.qualified_name();
        let mut changes = Vec::new();
        {
            let mut frames = self.frames.lock();
            match frames.entry(step.frame) {
                Entry::Vacant(entry) => {
                    // Activation entered before tracing started.
                    let mut snapshot = Snapshot::new();
                    snapshot.seed(&step.locals, |_| true);
                    entry.insert(snapshot);
                }
                Entry::Occupied(mut entry) => {
                    entry
                        .get_mut()
                        .diff(&step.locals, |_| true, |change| changes.push(change));
                }
            }
        }
        for change in changes {
            self.emit_change(change, step.line, scope.as_str(), depth, rank);
        }
    }

    fn seed_or_diff_globals(&self, step: &StepEvent, rank: Option<RankInfo>) {
        let depth = self.depth.load(Ordering::Relaxed);
        let module = step.module.as_str();
        let mut changes = Vec::new();
        {
            let mut modules = self.modules.lock();
            match modules.entry(step.module.clone()) {
                Entry::Vacant(entry) => {
                    // First sighting of the module's globals: baseline, no
                    // events. A step that reports no globals at all leaves
                    // the baseline for a later, fuller observation.
                    if step.globals.is_empty() {
                        return;
                    }
                    let mut snapshot = Snapshot::new();
                    snapshot.seed(&step.globals, |name| self.index.global_tracked(module, name));
                    entry.insert(snapshot);
                }
                Entry::Occupied(mut entry) => {
                    entry.get_mut().diff(
                        &step.globals,
                        |name| self.index.global_tracked(module, name),
                        |change| changes.push(change),
                    );
                }
            }
        }
        for change in changes {
            self.emit_change(change, step.line, module, depth, rank);
        }
    }

    // ── Admission ────────────────────────────────────────

    fn call_decision(&self, step: &StepEvent, file_hit: bool, module_ok: bool) -> MethodDecision {
        if file_hit {
            return MethodDecision::Traced;
        }
        if !module_ok {
            return MethodDecision::Skip;
        }
        match &step.class {
            Some(class) => match self.policy_memo(&step.module, class) {
                None => MethodDecision::Skip,
                Some(policy) if policy.trace_method(step.func.as_str()) => MethodDecision::Traced,
                Some(_) => MethodDecision::AttrsOnly,
            },
            None => {
                if self.function_memo(&step.module, &step.func) {
                    MethodDecision::Traced
                } else {
                    MethodDecision::Skip
                }
            }
        }
    }

    fn file_memo(&self, file: &CompactString) -> bool {
        if file.is_empty() || self.index.filenames.is_empty() {
            return false;
        }
        let mut memo = self.memo.files.lock();
        if let Some(&hit) = memo.get(file) {
            return hit;
        }
        let hit = self.index.file_matches(file.as_str());
        memo.insert(file.clone(), hit);
        hit
    }

    fn module_memo(&self, module: &CompactString) -> bool {
        let mut memo = self.memo.modules.lock();
        if let Some(&hit) = memo.get(module) {
            return hit;
        }
        let hit = self.index.trace_module(module.as_str());
        memo.insert(module.clone(), hit);
        hit
    }

    fn function_memo(&self, module: &CompactString, func: &CompactString) -> bool {
        let key = (module.clone(), func.clone());
        let mut memo = self.memo.functions.lock();
        if let Some(&hit) = memo.get(&key) {
            return hit;
        }
        let hit = self.index.trace_function(module.as_str(), func.as_str());
        memo.insert(key, hit);
        hit
    }

    fn policy_memo(&self, module: &CompactString, class: &CompactString) -> Option<ClassPolicy> {
        let key = (module.clone(), class.clone());
        let mut memo = self.memo.policies.lock();
        if let Some(policy) = memo.get(&key) {
            return policy.clone();
        }
        let policy = self.index.class_policy(module.as_str(), class.as_str());
        memo.insert(key, policy.clone());
        policy
    }

    // ── Emission ─────────────────────────────────────────

    fn emit(&self, event: ChangeEvent) {
        self.sink.change(&event);
    }

    fn emit_change(
        &self,
        change: Change,
        line: u32,
        scope: &str,
        depth: u32,
        rank: Option<RankInfo>,
    ) {
        self.emit(ChangeEvent::mutation(
            change.kind,
            line,
            scope,
            change.key.as_str(),
            change.old.map(|old| old.to_string()),
            change.new.as_str(),
            depth,
            rank,
        ));
    }

    fn invariant_violation(&self, step: &StepEvent) {
        let scope = step.qualified_name().to_string();
        error!(
            scope = %scope,
            "call depth underflow: end without matching run; depth bookkeeping desynchronized \
             from call/return pairing. this is a lorgnette bug, please report it"
        );
        *self.fault.lock() = Some(TraceError::DepthUnderflow { scope });
        self.detached.store(true, Ordering::Relaxed);
    }
}
