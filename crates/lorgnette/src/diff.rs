//! Snapshot and diff engine.
//!
//! One algorithm serves all three snapshot domains — receiver attributes,
//! call locals, module globals. A snapshot records the last observed
//! identity, representation, and (for sized values) length per name; each
//! step recomputes the current bindings and classifies what changed.

use compact_str::CompactString;
use std::cmp::Ordering;
use std::collections::HashMap;

use lorgnette_types::{Binding, EventKind, Identity, ObsValue};

/// Last observed state of one binding. `len` is `Some` iff the last
/// observed value was a sized/ordered type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapValue {
    pub identity: Identity,
    pub repr: CompactString,
    pub len: Option<usize>,
}

impl From<&ObsValue> for SnapValue {
    fn from(value: &ObsValue) -> Self {
        Self {
            identity: value.identity,
            repr: value.repr.clone(),
            len: value.len,
        }
    }
}

/// One classified mutation, handed to the dispatcher for event assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: EventKind,
    pub key: CompactString,
    pub old: Option<CompactString>,
    pub new: CompactString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classified {
    Silent,
    Updated,
    Appended,
    Shrunk,
}

/// Identity first, then length. Two distinct-but-equal containers are a
/// replacement; a same-identity container only speaks through its length.
fn classify(old: &SnapValue, new: &ObsValue) -> Classified {
    if old.identity.same_object(new.identity) {
        if let (Some(old_len), Some(new_len)) = (old.len, new.len) {
            return match new_len.cmp(&old_len) {
                Ordering::Greater => Classified::Appended,
                Ordering::Less => Classified::Shrunk,
                Ordering::Equal => Classified::Silent,
            };
        }
        // Mutated in place without a size change is not observable.
        return Classified::Silent;
    }
    if old.identity == Identity::Inline
        && new.identity == Identity::Inline
        && old.repr == new.repr
    {
        // Identity-less scalars re-assigned to the same value.
        return Classified::Silent;
    }
    Classified::Updated
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: HashMap<CompactString, SnapValue>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records newly seen bindings without emitting anything; existing
    /// entries keep their previous state so a later diff still sees it.
    pub fn seed(&mut self, bindings: &[Binding], filter: impl Fn(&str) -> bool) {
        for binding in bindings {
            if binding.value.callable || !filter(binding.name.as_str()) {
                continue;
            }
            self.entries
                .entry(binding.name.clone())
                .or_insert_with(|| SnapValue::from(&binding.value));
        }
    }

    /// Diffs the current bindings against the snapshot, emitting one
    /// classified change per observable mutation. The stored state is
    /// updated whether or not an event fired.
    ///
    /// Names absent from `bindings` stay untouched: a vanished binding
    /// usually means the host stopped reporting it, and a reappearance
    /// with unchanged identity must stay silent.
    pub fn diff(
        &mut self,
        bindings: &[Binding],
        filter: impl Fn(&str) -> bool,
        mut emit: impl FnMut(Change),
    ) {
        for binding in bindings {
            if binding.value.callable || !filter(binding.name.as_str()) {
                continue;
            }
            match self.entries.get_mut(&binding.name) {
                None => {
                    emit(Change {
                        kind: EventKind::Upd,
                        key: binding.name.clone(),
                        old: None,
                        new: binding.value.repr.clone(),
                    });
                    self.entries
                        .insert(binding.name.clone(), SnapValue::from(&binding.value));
                }
                Some(previous) => {
                    let kind = match classify(previous, &binding.value) {
                        Classified::Silent => None,
                        Classified::Updated => Some(EventKind::Upd),
                        Classified::Appended => Some(EventKind::Apd),
                        Classified::Shrunk => Some(EventKind::Pop),
                    };
                    if let Some(kind) = kind {
                        emit(Change {
                            kind,
                            key: binding.name.clone(),
                            old: Some(previous.repr.clone()),
                            new: binding.value.repr.clone(),
                        });
                    }
                    *previous = SnapValue::from(&binding.value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorgnette_types::ObjKey;

    fn key(value: u64) -> ObjKey {
        ObjKey::new(value).expect("non-zero key")
    }

    fn diff_all(snapshot: &mut Snapshot, bindings: &[Binding]) -> Vec<Change> {
        let mut changes = Vec::new();
        snapshot.diff(bindings, |_| true, |change| changes.push(change));
        changes
    }

    #[test]
    fn first_observation_is_upd_with_no_old_value() {
        let mut snapshot = Snapshot::new();
        let changes = diff_all(
            &mut snapshot,
            &[Binding::new("x", ObsValue::inline("1"))],
        );
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, EventKind::Upd);
        assert!(changes[0].old.is_none());
        assert_eq!(changes[0].new, "1");
    }

    #[test]
    fn inline_scalar_sequence_matches_run_upd_upd() {
        // self.x = 1; self.x = 2 — two upd events, old values threaded.
        let mut snapshot = Snapshot::new();
        let first = diff_all(&mut snapshot, &[Binding::new("x", ObsValue::inline("1"))]);
        let again = diff_all(&mut snapshot, &[Binding::new("x", ObsValue::inline("1"))]);
        let second = diff_all(&mut snapshot, &[Binding::new("x", ObsValue::inline("2"))]);

        assert_eq!(first[0].old, None);
        assert!(again.is_empty(), "re-assigning the same scalar is silent");
        assert_eq!(second[0].kind, EventKind::Upd);
        assert_eq!(second[0].old.as_deref(), Some("1"));
        assert_eq!(second[0].new, "2");
    }

    #[test]
    fn same_identity_growth_is_apd_and_shrink_is_pop() {
        let mut snapshot = Snapshot::new();
        diff_all(&mut snapshot, &[Binding::new("items", ObsValue::sized(key(1), "[]", 0))]);

        let grown = diff_all(
            &mut snapshot,
            &[Binding::new("items", ObsValue::sized(key(1), "[1]", 1))],
        );
        assert_eq!(grown.len(), 1);
        assert_eq!(grown[0].kind, EventKind::Apd);

        let shrunk = diff_all(
            &mut snapshot,
            &[Binding::new("items", ObsValue::sized(key(1), "[]", 0))],
        );
        assert_eq!(shrunk.len(), 1);
        assert_eq!(shrunk[0].kind, EventKind::Pop);

        let unchanged = diff_all(
            &mut snapshot,
            &[Binding::new("items", ObsValue::sized(key(1), "[]", 0))],
        );
        assert!(unchanged.is_empty());
    }

    #[test]
    fn replacement_by_equal_value_is_still_upd() {
        // x.a = [1, 2] then x.a = [1, 2] as a new list.
        let mut snapshot = Snapshot::new();
        diff_all(&mut snapshot, &[Binding::new("a", ObsValue::sized(key(1), "[1, 2]", 2))]);
        let changes = diff_all(
            &mut snapshot,
            &[Binding::new("a", ObsValue::sized(key(2), "[1, 2]", 2))],
        );
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, EventKind::Upd);
    }

    #[test]
    fn append_then_reassign_scenario() {
        // items = [] ; items.append(1) ; items = items + [2]
        let mut snapshot = Snapshot::new();
        diff_all(&mut snapshot, &[Binding::new("items", ObsValue::sized(key(1), "[]", 0))]);
        let appended = diff_all(
            &mut snapshot,
            &[Binding::new("items", ObsValue::sized(key(1), "[1]", 1))],
        );
        let replaced = diff_all(
            &mut snapshot,
            &[Binding::new("items", ObsValue::sized(key(2), "[1, 2]", 2))],
        );
        assert_eq!(appended[0].kind, EventKind::Apd);
        assert_eq!(replaced[0].kind, EventKind::Upd);
    }

    #[test]
    fn callables_and_filtered_names_are_skipped() {
        let mut snapshot = Snapshot::new();
        let mut changes = Vec::new();
        snapshot.diff(
            &[
                Binding::new("step", ObsValue::callable("<fn step>")),
                Binding::new("secret", ObsValue::inline("1")),
                Binding::new("lr", ObsValue::inline("0.1")),
            ],
            |name| name != "secret",
            |change| changes.push(change),
        );
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "lr");
    }

    #[test]
    fn vanished_binding_is_silent_and_reappearance_stays_silent() {
        let mut snapshot = Snapshot::new();
        diff_all(&mut snapshot, &[Binding::new("x", ObsValue::object(key(1), "obj"))]);
        let gone = diff_all(&mut snapshot, &[]);
        assert!(gone.is_empty());
        let back = diff_all(&mut snapshot, &[Binding::new("x", ObsValue::object(key(1), "obj"))]);
        assert!(back.is_empty());
    }

    #[test]
    fn seed_records_without_events_and_keeps_existing_state() {
        let mut snapshot = Snapshot::new();
        snapshot.seed(&[Binding::new("x", ObsValue::inline("1"))], |_| true);
        let changes = diff_all(&mut snapshot, &[Binding::new("x", ObsValue::inline("2"))]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old.as_deref(), Some("1"));

        // Seeding over a known name does not clobber the snapshot.
        snapshot.seed(&[Binding::new("x", ObsValue::inline("9"))], |_| true);
        let changes = diff_all(&mut snapshot, &[Binding::new("x", ObsValue::inline("3"))]);
        assert_eq!(changes[0].old.as_deref(), Some("2"));
    }

    #[test]
    fn identity_change_wins_over_length_delta() {
        let mut snapshot = Snapshot::new();
        diff_all(&mut snapshot, &[Binding::new("buf", ObsValue::sized(key(1), "[0]", 1))]);
        let changes = diff_all(
            &mut snapshot,
            &[Binding::new("buf", ObsValue::sized(key(2), "[0, 1]", 2))],
        );
        assert_eq!(changes[0].kind, EventKind::Upd);
    }
}
