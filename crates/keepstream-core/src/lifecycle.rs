//! # Component scopes
//!
//! A `ComponentScope` stands in for a component's lifetime. Streams adopted
//! by the scope are disposed when it is torn down, except for those tagged
//! `retained`, which are left alone and stay the caller's business.
//!
//! ```rust
//! use std::rc::Rc;
//! use keepstream_core::*;
//!
//! let streams = observable(Rc::new(standard())).unwrap();
//! let scope = ComponentScope::new();
//!
//! let (ticks, config) = scope.run(|| {
//!     let ticks = streams.call("of", &[1.into()]).unwrap().into_stream().unwrap();
//!     let config = streams.keep().call("of", &[2.into()]).unwrap().into_stream().unwrap();
//!     track(&ticks);
//!     track(&config);
//!     (ticks, config)
//! });
//!
//! let report = scope.teardown();
//! assert_eq!(report, TeardownReport { disposed: 1, kept: 1 });
//! assert!(ticks.is_disposed());
//! assert!(!config.is_disposed());
//! ```

use std::cell::{Cell, RefCell};
use std::ops::AddAssign;
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

use crate::stream::Stream;

slotmap::new_key_type! {
    pub struct StreamKey;
}

thread_local! {
    static CURRENT_SCOPE: RefCell<Option<Weak<ScopeInner>>> = const { RefCell::new(None) };
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub disposed: usize,
    pub kept: usize,
}

impl AddAssign for TeardownReport {
    fn add_assign(&mut self, rhs: Self) {
        self.disposed += rhs.disposed;
        self.kept += rhs.kept;
    }
}

pub struct ComponentScope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    streams: RefCell<SlotMap<StreamKey, Stream>>,
    children: RefCell<Vec<ComponentScope>>,
    torn_down: Cell<bool>,
}

impl ScopeInner {
    fn teardown(&self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.torn_down.replace(true) {
            return report;
        }

        // Children first
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            report += child.inner.teardown();
        }

        let streams = std::mem::take(&mut *self.streams.borrow_mut());
        for (_, stream) in streams {
            if stream.is_retained() {
                report.kept += 1;
            } else if stream.dispose() {
                report.disposed += 1;
            }
        }
        log::debug!(
            "scope teardown: disposed {}, kept {}",
            report.disposed,
            report.kept
        );
        report
    }
}

impl ComponentScope {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                streams: RefCell::new(SlotMap::with_key()),
                children: RefCell::new(Vec::new()),
                torn_down: Cell::new(false),
            }),
        }
    }

    /// Run `f` with this scope as the current one.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore(Option<Weak<ScopeInner>>);
        impl Drop for Restore {
            fn drop(&mut self) {
                let prev = self.0.take();
                CURRENT_SCOPE.with(|current| *current.borrow_mut() = prev);
            }
        }

        let prev = CURRENT_SCOPE.with(|current| {
            current.borrow_mut().replace(Rc::downgrade(&self.inner))
        });
        let _restore = Restore(prev);
        f()
    }

    /// Track `stream` until teardown. A scope that is already torn down
    /// disposes non-retained streams on the spot and returns `None`.
    pub fn adopt(&self, stream: &Stream) -> Option<StreamKey> {
        if self.inner.torn_down.get() {
            if !stream.is_retained() {
                log::debug!("adopt after teardown; disposing stream immediately");
                stream.dispose();
            }
            return None;
        }
        let mut streams = self.inner.streams.borrow_mut();
        if let Some((key, _)) = streams.iter().find(|(_, s)| s.ptr_eq(stream)) {
            return Some(key);
        }
        Some(streams.insert(stream.clone()))
    }

    /// Stop tracking without disposing.
    pub fn release(&self, key: StreamKey) -> Option<Stream> {
        self.inner.streams.borrow_mut().remove(key)
    }

    pub fn tracked(&self) -> usize {
        self.inner.streams.borrow().len()
    }

    pub fn child(&self) -> ComponentScope {
        let child = ComponentScope::new();
        self.inner.children.borrow_mut().push(child.clone());
        child
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.get()
    }

    /// Tear down children, then dispose every tracked stream that is not
    /// retained. Runs at most once per scope.
    pub fn teardown(self) -> TeardownReport {
        self.inner.teardown()
    }
}

impl Default for ComponentScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ComponentScope {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub fn current_scope() -> Option<ComponentScope> {
    CURRENT_SCOPE.with(|current| {
        current
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade().map(|inner| ComponentScope { inner }))
    })
}

/// Adopt `stream` into the current scope, if there is one.
pub fn track(stream: &Stream) -> bool {
    match current_scope() {
        Some(scope) => scope.adopt(stream).is_some(),
        None => false,
    }
}
