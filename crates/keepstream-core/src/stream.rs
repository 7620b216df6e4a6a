use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::value::Value;

pub type SubId = usize;

static NEXT_MARKER: AtomicU64 = AtomicU64::new(1);

/// Identity of a library instance. Every stream remembers the marker of the
/// library that created it, which is how the mirror tells "a stream from
/// this library" apart from any other value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LibraryMarker(u64);

impl LibraryMarker {
    pub fn fresh() -> Self {
        Self(NEXT_MARKER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Handle to a reactive stream.
///
/// Values supplied at creation are replayed to every new subscriber;
/// `emit` pushes to whoever is subscribed right now. Once disposed, the
/// stream drops its subscribers and ignores further subscribes and emits.
#[derive(Clone)]
pub struct Stream(Rc<Inner>);

struct Inner {
    origin: LibraryMarker,
    replay: Vec<Value>,
    retained: OnceCell<bool>,
    disposed: Cell<bool>,
    next_sub: Cell<SubId>,
    subs: RefCell<SmallVec<[(SubId, Rc<dyn Fn(&Value)>); 2]>>,
}

impl Stream {
    pub fn new(origin: LibraryMarker, replay: Vec<Value>) -> Self {
        Self(Rc::new(Inner {
            origin,
            replay,
            retained: OnceCell::new(),
            disposed: Cell::new(false),
            next_sub: Cell::new(0),
            subs: RefCell::new(SmallVec::new()),
        }))
    }

    pub fn empty(origin: LibraryMarker) -> Self {
        Self::new(origin, Vec::new())
    }

    pub fn origin(&self) -> LibraryMarker {
        self.0.origin
    }

    pub fn replay(&self) -> &[Value] {
        &self.0.replay
    }

    /// `None` until the stream has been tagged.
    pub fn retained(&self) -> Option<bool> {
        self.0.retained.get().copied()
    }

    /// Untagged streams count as not retained.
    pub fn is_retained(&self) -> bool {
        self.retained().unwrap_or(false)
    }

    /// Sets the retention tag. Only the first call wins; later calls are
    /// refused and return `false`.
    pub(crate) fn tag_retained(&self, retained: bool) -> bool {
        match self.0.retained.set(retained) {
            Ok(()) => true,
            Err(_) => {
                log::warn!(
                    "stream #{:p} already tagged retained={}; ignoring retag to {}",
                    Rc::as_ptr(&self.0),
                    self.is_retained(),
                    retained
                );
                false
            }
        }
    }

    pub fn subscribe(&self, f: impl Fn(&Value) + 'static) -> Subscription {
        if self.0.disposed.get() {
            return Subscription::closed();
        }
        let f: Rc<dyn Fn(&Value)> = Rc::new(f);
        for v in &self.0.replay {
            f(v);
        }
        // Replay may have disposed us.
        if self.0.disposed.get() {
            return Subscription::closed();
        }
        let id = self.0.next_sub.get();
        self.0.next_sub.set(id + 1);
        self.0.subs.borrow_mut().push((id, f));
        Subscription {
            stream: Rc::downgrade(&self.0),
            id: Some(id),
        }
    }

    /// Push a value to current subscribers.
    pub fn emit(&self, value: impl Into<Value>) {
        if self.0.disposed.get() {
            return;
        }
        let value = value.into();
        // Snapshot so callbacks may subscribe/unsubscribe while we iterate.
        let subs: SmallVec<[Rc<dyn Fn(&Value)>; 2]> =
            self.0.subs.borrow().iter().map(|(_, f)| f.clone()).collect();
        for f in subs {
            f(&value);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subs.borrow().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    /// Runs at most once; returns whether this call did the disposing.
    pub fn dispose(&self) -> bool {
        if self.0.disposed.replace(true) {
            return false;
        }
        let subs = std::mem::take(&mut *self.0.subs.borrow_mut());
        log::trace!(
            "disposed stream #{:p} ({} subscribers)",
            Rc::as_ptr(&self.0),
            subs.len()
        );
        true
    }

    pub fn ptr_eq(&self, other: &Stream) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("origin", &self.0.origin)
            .field("replay", &self.0.replay)
            .field("retained", &self.retained())
            .field("disposed", &self.0.disposed.get())
            .finish()
    }
}

/// Handle returned by `Stream::subscribe`.
pub struct Subscription {
    stream: Weak<Inner>,
    id: Option<SubId>,
}

impl Subscription {
    fn closed() -> Self {
        Self {
            stream: Weak::new(),
            id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        match (self.id, self.stream.upgrade()) {
            (Some(id), Some(inner)) => inner.subs.borrow().iter().any(|(s, _)| *s == id),
            _ => false,
        }
    }

    /// Safe to call multiple times.
    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.id.take()
            && let Some(inner) = self.stream.upgrade()
        {
            inner.subs.borrow_mut().retain(|(s, _)| *s != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_values_to_each_subscriber() {
        let s = Stream::new(LibraryMarker::fresh(), vec![1.into(), 2.into()]);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_a = seen.clone();
        let _a = s.subscribe(move |v| seen_a.borrow_mut().push(v.clone()));
        let seen_b = seen.clone();
        let _b = s.subscribe(move |v| seen_b.borrow_mut().push(v.clone()));

        assert_eq!(seen.borrow().len(), 4);
        assert_eq!(s.subscriber_count(), 2);
    }

    #[test]
    fn emit_reaches_live_subscribers_only() {
        let s = Stream::empty(LibraryMarker::fresh());
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let mut sub = s.subscribe(move |_| c.set(c.get() + 1));
        s.emit(1);
        assert!(sub.is_active());

        sub.unsubscribe();
        sub.unsubscribe();
        s.emit(2);
        assert_eq!(count.get(), 1);
        assert!(!sub.is_active());
    }

    #[test]
    fn dispose_is_idempotent_and_closes_subscriptions() {
        let s = Stream::new(LibraryMarker::fresh(), vec![Value::Int(7)]);
        let sub = s.subscribe(|_| {});
        assert!(s.dispose());
        assert!(!s.dispose());
        assert!(s.is_disposed());
        assert!(!sub.is_active());

        let late = s.subscribe(|_| panic!("disposed stream must not replay"));
        assert!(!late.is_active());
    }

    #[test]
    fn disposing_during_replay_leaves_no_subscriber() {
        let s = Stream::new(LibraryMarker::fresh(), vec![1.into(), 2.into()]);
        let seen = Rc::new(Cell::new(0));

        let (inner, count) = (s.clone(), seen.clone());
        let sub = s.subscribe(move |_| {
            count.set(count.get() + 1);
            inner.dispose();
        });

        assert!(s.is_disposed());
        assert_eq!(s.subscriber_count(), 0);
        assert!(!sub.is_active());
        s.emit(3);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn retention_tag_is_set_once() {
        let s = Stream::empty(LibraryMarker::fresh());
        assert_eq!(s.retained(), None);
        assert!(!s.is_retained());

        assert!(s.tag_retained(true));
        assert!(!s.tag_retained(false));
        assert_eq!(s.retained(), Some(true));
    }

    #[test]
    fn markers_are_unique() {
        assert_ne!(LibraryMarker::fresh(), LibraryMarker::fresh());
    }
}
