//! Explicit observer registration.
//!
//! A render boundary runs its evaluation inside [`Runtime::track`]; every
//! model read performed meanwhile is recorded as a [`Dependency`] of that
//! boundary, and the recorded set *replaces* the boundary's previous
//! subscriptions. A patch reports a [`Change`]; [`Runtime::notify`] marks the
//! subscribers the change affects as pending, and the interpreter drains
//! them on its next flush. Pending is a set, so any number of changes
//! between two flushes coalesce into one re-render per boundary.
//!
//! Single-threaded by construction (`Rc<RefCell<_>>`).
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::trace;

use crate::pointer::{self, Seg};

// -------------------------------- Handles --------------------------------- //

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

/// A state cell read during evaluation.
///
/// `deep` readers consumed the whole subtree (e.g. serialized it) and are
/// affected by any change beneath `path`; shallow readers only by changes at
/// or above it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dependency {
    pub model: ModelId,
    pub path: Vec<Seg>,
    pub deep: bool,
}

/// What a single applied patch touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub model: ModelId,
    pub path: Vec<Seg>,
    /// Array insertions and removals move every element from `index` on:
    /// `(array path, index)`.
    pub shifted: Option<(Vec<Seg>, usize)>,
}

impl Change {
    pub fn affects(&self, dep: &Dependency) -> bool {
        if dep.model != self.model {
            return false;
        }
        if dep.path.starts_with(&self.path) {
            return true;
        }
        if dep.deep && self.path.starts_with(&dep.path) {
            return true;
        }
        if let Some((array, from)) = &self.shifted {
            if dep.path == *array {
                return true;
            }
            if dep.path.starts_with(array) {
                if let Some(Seg::Index(i)) = dep.path.get(array.len()) {
                    return i >= from;
                }
            }
        }
        false
    }
}

// -------------------------------- Runtime --------------------------------- //

#[derive(Debug, Default)]
struct Frame {
    observer: Option<ObserverId>,
    reads: BTreeSet<Dependency>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    frames: Vec<Frame>,
    subscriptions: BTreeMap<ObserverId, BTreeSet<Dependency>>,
    pending: BTreeSet<ObserverId>,
}

/// Cheap to clone; clones share one subscription table.
#[derive(Clone, Debug, Default)]
pub struct Runtime {
    state: Rc<RefCell<State>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self) -> ObserverId {
        ObserverId(self.next_id())
    }

    pub fn model(&self) -> ModelId {
        ModelId(self.next_id())
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.next_id
    }

    /// Run `evaluate` on behalf of `observer`, then subscribe it to exactly
    /// the cells read during the run. Clears the observer's pending mark.
    pub fn track<R>(&self, observer: ObserverId, evaluate: impl FnOnce() -> R) -> R {
        self.state.borrow_mut().frames.push(Frame {
            observer: Some(observer),
            reads: BTreeSet::new(),
        });
        let out = evaluate();
        let mut state = self.state.borrow_mut();
        let frame = state.frames.pop().unwrap_or_default();
        state.pending.remove(&observer);
        if frame.reads.is_empty() {
            state.subscriptions.remove(&observer);
        } else {
            trace!(?observer, reads = frame.reads.len(), "subscribed");
            state.subscriptions.insert(observer, frame.reads);
        }
        out
    }

    /// Run `evaluate` with reads going nowhere, even when called from
    /// inside a tracked evaluation.
    pub fn untracked<R>(&self, evaluate: impl FnOnce() -> R) -> R {
        self.state.borrow_mut().frames.push(Frame::default());
        let out = evaluate();
        self.state.borrow_mut().frames.pop();
        out
    }

    pub fn record(&self, dep: Dependency) {
        let mut state = self.state.borrow_mut();
        if let Some(frame) = state.frames.last_mut() {
            if frame.observer.is_some() {
                frame.reads.insert(dep);
            }
        }
    }

    /// Mark every subscriber `change` affects as pending. Returns how many
    /// observers became pending because of this change.
    pub fn notify(&self, change: &Change) -> usize {
        let mut state = self.state.borrow_mut();
        let State { subscriptions, pending, .. } = &mut *state;
        let mut marked = 0;
        for (observer, deps) in subscriptions.iter() {
            if deps.iter().any(|dep| change.affects(dep)) && pending.insert(*observer) {
                marked += 1;
            }
        }
        trace!(path = %pointer::format(&change.path), marked, "notified");
        marked
    }

    pub fn take_pending(&self) -> Vec<ObserverId> {
        std::mem::take(&mut self.state.borrow_mut().pending).into_iter().collect()
    }

    pub fn is_pending(&self, observer: ObserverId) -> bool {
        self.state.borrow().pending.contains(&observer)
    }

    pub fn has_pending(&self) -> bool {
        !self.state.borrow().pending.is_empty()
    }

    pub fn unsubscribe(&self, observer: ObserverId) {
        let mut state = self.state.borrow_mut();
        state.subscriptions.remove(&observer);
        state.pending.remove(&observer);
    }

    pub fn dependencies(&self, observer: ObserverId) -> Vec<Dependency> {
        self.state
            .borrow()
            .subscriptions
            .get(&observer)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of observers holding at least one subscription.
    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }
}

// --------------------------------- Tests ---------------------------------- //

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Seg {
        Seg::Field(name.into())
    }

    #[test]
    fn track_replaces_previous_subscriptions() {
        let rt = Runtime::new();
        let model = rt.model();
        let obs = rt.observer();
        let dep = |name: &str| Dependency { model, path: vec![field(name)], deep: false };

        rt.track(obs, || rt.record(dep("a")));
        assert_eq!(rt.dependencies(obs), vec![dep("a")]);

        rt.track(obs, || rt.record(dep("b")));
        assert_eq!(rt.dependencies(obs), vec![dep("b")]);

        rt.track(obs, || ());
        assert_eq!(rt.subscriber_count(), 0);
    }

    #[test]
    fn nested_frames_record_into_innermost_observer() {
        let rt = Runtime::new();
        let model = rt.model();
        let (outer, inner) = (rt.observer(), rt.observer());
        let dep = |name: &str| Dependency { model, path: vec![field(name)], deep: false };

        rt.track(outer, || {
            rt.record(dep("outer"));
            rt.track(inner, || rt.record(dep("inner")));
            rt.untracked(|| rt.record(dep("ignored")));
        });
        assert_eq!(rt.dependencies(outer), vec![dep("outer")]);
        assert_eq!(rt.dependencies(inner), vec![dep("inner")]);
    }

    #[test]
    fn notify_marks_only_affected_subscribers_once() {
        let rt = Runtime::new();
        let model = rt.model();
        let (count_reader, name_reader) = (rt.observer(), rt.observer());
        rt.track(count_reader, || {
            rt.record(Dependency { model, path: vec![field("count")], deep: false })
        });
        rt.track(name_reader, || {
            rt.record(Dependency { model, path: vec![field("name")], deep: false })
        });

        let change = Change { model, path: vec![field("count")], shifted: None };
        assert_eq!(rt.notify(&change), 1);
        assert_eq!(rt.notify(&change), 0, "already pending");
        assert_eq!(rt.take_pending(), vec![count_reader]);
        assert!(!rt.has_pending());
    }

    #[test]
    fn change_reaches_descendants_deep_ancestors_and_shifted_elements() {
        let rt = Runtime::new();
        let model = rt.model();
        let items = vec![field("items")];
        let at = |i: usize, name: &str| Dependency {
            model,
            path: vec![field("items"), Seg::Index(i), field(name)],
            deep: false,
        };

        let replace_items = Change { model, path: items.clone(), shifted: None };
        assert!(replace_items.affects(&at(0, "name")));

        let rename_first = Change {
            model,
            path: vec![field("items"), Seg::Index(0), field("name")],
            shifted: None,
        };
        assert!(!rename_first.affects(&Dependency { model, path: items.clone(), deep: false }));
        assert!(rename_first.affects(&Dependency { model, path: vec![], deep: true }));

        let remove_second = Change {
            model,
            path: vec![field("items"), Seg::Index(1)],
            shifted: Some((items.clone(), 1)),
        };
        assert!(remove_second.affects(&Dependency { model, path: items.clone(), deep: false }));
        assert!(!remove_second.affects(&at(0, "name")));
        assert!(remove_second.affects(&at(2, "name")));

        let other = Change { model: rt.model(), path: vec![], shifted: None };
        assert!(!other.affects(&at(0, "name")));
    }

    #[test]
    fn unsubscribe_clears_pending_and_subscriptions() {
        let rt = Runtime::new();
        let model = rt.model();
        let obs = rt.observer();
        rt.track(obs, || rt.record(Dependency { model, path: vec![], deep: true }));
        rt.notify(&Change { model, path: vec![field("x")], shifted: None });
        assert!(rt.is_pending(obs));

        rt.unsubscribe(obs);
        assert!(!rt.is_pending(obs));
        assert_eq!(rt.subscriber_count(), 0);
    }
}
