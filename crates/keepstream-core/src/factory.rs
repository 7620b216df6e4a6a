//! # Retention-tagged factories
//!
//! A [`StreamFactory`] exposes every member of a library's mirror and stamps
//! each stream it produces with its own `retained` flag. The default factory
//! produces streams that the owning component disposes on teardown;
//! [`StreamFactory::keep`] hands out a sibling whose streams survive it:
//!
//! ```rust
//! use std::rc::Rc;
//! use keepstream_core::*;
//!
//! let streams = observable(Rc::new(standard())).unwrap();
//!
//! let scoped = streams.call("of", &[1.into(), 2.into()]).unwrap();
//! let kept = streams.keep().call("of", &[1.into(), 2.into()]).unwrap();
//!
//! assert!(!scoped.as_stream().unwrap().is_retained());
//! assert!(kept.as_stream().unwrap().is_retained());
//! assert!(!streams.is_retained());
//! ```
//!
//! Factories are cheap: they share one immutable mirror and differ only in
//! the flag. `keep` never touches the factory it is called on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{CallError, DiscoveryError};
use crate::library::StreamLibrary;
use crate::mirror::{CapabilityMirror, MirrorEntry, TagOutcome, WrappedOperation};
use crate::value::Value;

thread_local! {
    static DEFAULT_FACTORY: RefCell<Option<StreamFactory>> = const { RefCell::new(None) };
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FactoryConfig {
    /// Streams survive their owner's teardown.
    pub retain: bool,
}

impl FactoryConfig {
    pub fn retaining() -> Self {
        Self { retain: true }
    }
}

#[derive(Clone)]
pub struct StreamFactory {
    mirror: Rc<CapabilityMirror>,
    retained: bool,
}

impl StreamFactory {
    pub fn new(
        library: Rc<dyn StreamLibrary>,
        config: FactoryConfig,
    ) -> Result<Self, DiscoveryError> {
        let mirror = CapabilityMirror::discover(library)?;
        Ok(Self::from_mirror(Rc::new(mirror), config))
    }

    pub fn from_mirror(mirror: Rc<CapabilityMirror>, config: FactoryConfig) -> Self {
        Self {
            mirror,
            retained: config.retain,
        }
    }

    /// A new factory whose streams are retained, whatever this one's flag is.
    pub fn keep(&self) -> StreamFactory {
        Self::from_mirror(self.mirror.clone(), FactoryConfig::retaining())
    }

    pub fn is_retained(&self) -> bool {
        self.retained
    }

    pub fn mirror(&self) -> &Rc<CapabilityMirror> {
        &self.mirror
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mirror.names()
    }

    /// Call a mirrored operation by name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, CallError> {
        self.call_tagged(name, args).map(|(out, _)| out)
    }

    /// Like [`call`](Self::call), also reporting whether the result took this
    /// factory's flag. `AlreadyTagged` means an earlier tag was kept.
    pub fn call_tagged(
        &self,
        name: &str,
        args: &[Value],
    ) -> Result<(Value, TagOutcome), CallError> {
        match self.mirror.entry(name) {
            Some(MirrorEntry::Operation(op)) => Ok(op.invoke_tagged(self.retained, args)?),
            Some(MirrorEntry::Value(_)) => Err(CallError::NotAnOperation(name.to_string())),
            None => Err(CallError::UnknownMember(name.to_string())),
        }
    }

    /// Handle to a mirrored operation with this factory's flag baked in.
    pub fn operation(&self, name: &str) -> Option<BoundOperation> {
        self.mirror.operation(name).map(|op| BoundOperation {
            op: op.clone(),
            retained: self.retained,
        })
    }

    /// Read a value member through to the library.
    pub fn get(&self, name: &str) -> Result<Value, CallError> {
        match self.mirror.entry(name) {
            Some(MirrorEntry::Value(p)) => Ok(p.get()),
            Some(MirrorEntry::Operation(_)) => Err(CallError::NotAValue(name.to_string())),
            None => Err(CallError::UnknownMember(name.to_string())),
        }
    }

    /// Write a value member through to the library.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), CallError> {
        match self.mirror.entry(name) {
            Some(MirrorEntry::Value(p)) => {
                p.set(value);
                Ok(())
            }
            Some(MirrorEntry::Operation(_)) => Err(CallError::NotAValue(name.to_string())),
            None => Err(CallError::UnknownMember(name.to_string())),
        }
    }

    /// Re-run discovery against the same library, keeping the flag.
    pub fn reload(&self) -> Result<StreamFactory, DiscoveryError> {
        let mirror = self.mirror.rediscover()?;
        Ok(Self::from_mirror(
            Rc::new(mirror),
            FactoryConfig {
                retain: self.retained,
            },
        ))
    }
}

impl fmt::Debug for StreamFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamFactory")
            .field("library", &self.mirror.library().name())
            .field("retained", &self.retained)
            .finish()
    }
}

/// A mirrored operation bound to one factory's retention flag.
#[derive(Clone)]
pub struct BoundOperation {
    op: WrappedOperation,
    retained: bool,
}

impl BoundOperation {
    pub fn name(&self) -> &str {
        self.op.name()
    }

    pub fn is_retained(&self) -> bool {
        self.retained
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        Ok(self.op.invoke(self.retained, args)?)
    }

    pub fn call_tagged(&self, args: &[Value]) -> Result<(Value, TagOutcome), CallError> {
        Ok(self.op.invoke_tagged(self.retained, args)?)
    }
}

/// Default (non-retaining) factory for `library`.
pub fn observable(library: Rc<dyn StreamLibrary>) -> Result<StreamFactory, DiscoveryError> {
    StreamFactory::new(library, FactoryConfig::default())
}

/// Discover `library` once and make its default factory available through
/// [`observables`] on this thread. Replaces any previously installed one.
pub fn install(library: Rc<dyn StreamLibrary>) -> Result<StreamFactory, DiscoveryError> {
    let factory = observable(library)?;
    DEFAULT_FACTORY.with(|d| {
        if let Some(prev) = d.borrow_mut().replace(factory.clone()) {
            log::debug!(
                "replacing default stream factory for {}",
                prev.mirror.library().name()
            );
        }
    });
    Ok(factory)
}

/// The installed default factory, if any.
pub fn observables() -> Option<StreamFactory> {
    DEFAULT_FACTORY.with(|d| d.borrow().clone())
}

pub fn uninstall() -> Option<StreamFactory> {
    DEFAULT_FACTORY.with(|d| d.borrow_mut().take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use crate::library::{Library, standard};

    fn streams() -> (Rc<Library>, StreamFactory) {
        let lib = Rc::new(standard());
        let f = observable(lib.clone()).unwrap();
        (lib, f)
    }

    #[test]
    fn default_factory_does_not_retain() {
        let (_, f) = streams();
        assert!(!f.is_retained());
        let s = f.call("empty", &[]).unwrap().into_stream().unwrap();
        assert_eq!(s.retained(), Some(false));
    }

    #[test]
    fn keep_is_total_and_idempotent() {
        let (_, f) = streams();
        let k = f.keep();
        let kk = k.keep();
        assert!(k.is_retained());
        assert!(kk.is_retained());
        assert!(Rc::ptr_eq(f.mirror(), kk.mirror()));

        let s = kk.call("of", &[Value::Int(1)]).unwrap();
        assert_eq!(s.as_stream().unwrap().retained(), Some(true));
    }

    #[test]
    fn keep_leaves_the_original_alone() {
        let (_, f) = streams();
        let before = f.call("of", &[]).unwrap();
        let _kept = f.keep().call("of", &[]).unwrap();
        let after = f.call("of", &[]).unwrap();

        assert!(!f.is_retained());
        assert_eq!(before.as_stream().unwrap().retained(), Some(false));
        assert_eq!(after.as_stream().unwrap().retained(), Some(false));
    }

    #[test]
    fn bound_operation_carries_the_flag() {
        let (_, f) = streams();
        let of = f.keep().operation("of").unwrap();
        assert_eq!(of.name(), "of");
        assert!(of.is_retained());
        let s = of.call(&[Value::Int(2)]).unwrap();
        assert!(s.as_stream().unwrap().is_retained());

        assert!(f.operation("version").is_none());
        assert!(f.operation("missing").is_none());
    }

    #[test]
    fn member_kind_mismatches_are_reported() {
        let (_, f) = streams();
        assert_eq!(
            f.call("version", &[]).unwrap_err(),
            CallError::NotAnOperation("version".into())
        );
        assert_eq!(f.get("of").unwrap_err(), CallError::NotAValue("of".into()));
        assert_eq!(
            f.set("nope", 1).unwrap_err(),
            CallError::UnknownMember("nope".into())
        );
        assert_eq!(
            f.call("nope", &[]).unwrap_err(),
            CallError::UnknownMember("nope".into())
        );
    }

    #[test]
    fn operation_errors_pass_through_unchanged() {
        let lib = Rc::new(
            Library::new("flaky", "0")
                .with_operation("boom", |_, _| Err(OperationError::failed("boom", "kaput"))),
        );
        let f = observable(lib.clone()).unwrap();

        let direct = lib.call("boom", &[]).unwrap_err();
        let mirrored = f.call("boom", &[]).unwrap_err();
        assert_eq!(mirrored, CallError::Operation(direct));
    }

    #[test]
    fn reload_picks_up_new_members_and_keeps_flag() {
        let (lib, f) = streams();
        let k = f.keep();
        lib.add_operation("interval", |cx, _| Ok(cx.stream(Vec::new()).into()));
        assert!(k.mirror().is_stale());

        let k2 = k.reload().unwrap();
        assert!(k2.is_retained());
        let s = k2.call("interval", &[]).unwrap();
        assert!(s.as_stream().unwrap().is_retained());
    }

    #[test]
    fn installed_default_is_thread_local() {
        let _ = uninstall();
        assert!(observables().is_none());

        let lib = Rc::new(standard());
        install(lib).unwrap();
        let f = observables().unwrap();
        assert!(!f.is_retained());
        assert!(f.names().any(|n| n == "of"));

        let other = std::thread::spawn(|| observables().is_none())
            .join()
            .unwrap();
        assert!(other);

        assert!(uninstall().is_some());
        assert!(observables().is_none());
    }

    #[test]
    fn refused_retag_is_reported_to_the_caller() {
        let (_, f) = streams();
        let (first, outcome) = f.call_tagged("of", &[Value::Int(1)]).unwrap();
        assert_eq!(outcome, TagOutcome::Tagged);

        let (again, outcome) = f.keep().call_tagged("from", &[first]).unwrap();
        assert_eq!(outcome, TagOutcome::AlreadyTagged { retained: false });
        assert_eq!(again.as_stream().unwrap().retained(), Some(false));

        let from = f.keep().operation("from").unwrap();
        let fresh = Value::from(vec![Value::Int(2)]);
        let (out, outcome) = from.call_tagged(&[fresh]).unwrap();
        assert_eq!(outcome, TagOutcome::Tagged);
        assert!(out.as_stream().unwrap().is_retained());
    }
}
