//! # Stream libraries
//!
//! A stream library is whatever hands out streams: a name → member map where
//! each member is either an operation (variadic, returns a `Value`) or a
//! plain value binding. Nothing about the catalog is known up front; callers
//! enumerate it through [`StreamLibrary::members`].
//!
//! [`Library`] is a registration-based implementation:
//!
//! ```rust
//! use keepstream_core::*;
//!
//! let lib = Library::new("rx", "7.8.1")
//!     .with_operation("of", |cx, args| Ok(cx.stream(args.to_vec()).into()))
//!     .with_value("version", "7.8.1");
//!
//! let s = lib.call("of", &[1.into(), 2.into()]).unwrap();
//! assert!(lib.owns(&s));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{DiscoveryError, OperationError};
use crate::stream::{LibraryMarker, Stream};
use crate::value::Value;

/// Operation already bound to its library.
pub type Operation = Rc<dyn Fn(&[Value]) -> Result<Value, OperationError>>;

/// Operation as registered: receives the owning library's context.
pub type RawOperation = Rc<dyn Fn(&LibraryContext, &[Value]) -> Result<Value, OperationError>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Operation,
    Value,
}

/// Shared, mutable value slot. Clones alias the same slot, so a write through
/// any clone is seen by all of them.
#[derive(Clone, Default)]
pub struct Binding(Rc<RefCell<Value>>);

impl Binding {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(Rc::new(RefCell::new(value.into())))
    }

    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: impl Into<Value>) {
        *self.0.borrow_mut() = value.into();
    }

    pub fn ptr_eq(&self, other: &Binding) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Binding").field(&*self.0.borrow()).finish()
    }
}

/// One entry of a library's catalog.
#[derive(Clone)]
pub enum Member {
    Operation(Operation),
    Value(Binding),
}

impl Member {
    pub fn kind(&self) -> MemberKind {
        match self {
            Member::Operation(_) => MemberKind::Operation,
            Member::Value(_) => MemberKind::Value,
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Operation(_) => f.write_str("Operation(..)"),
            Member::Value(b) => fmt::Debug::fmt(b, f),
        }
    }
}

/// The external capability a mirror is built from.
pub trait StreamLibrary {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    /// Stamped on every stream the library creates.
    fn marker(&self) -> LibraryMarker;
    /// Bumped whenever the member set changes.
    fn revision(&self) -> u64 {
        0
    }
    /// Enumerate the current catalog. Operations must already be bound to
    /// the library.
    fn members(&self) -> Result<Vec<(String, Member)>, DiscoveryError>;

    /// Whether `value` is a stream created by this library.
    fn owns(&self, value: &Value) -> bool {
        value
            .as_stream()
            .is_some_and(|s| s.origin() == self.marker())
    }
}

/// What a registered operation sees of its library.
#[derive(Clone, Copy, Debug)]
pub struct LibraryContext {
    marker: LibraryMarker,
}

impl LibraryContext {
    pub fn marker(&self) -> LibraryMarker {
        self.marker
    }

    pub fn stream(&self, replay: Vec<Value>) -> Stream {
        Stream::new(self.marker, replay)
    }

    pub fn owns(&self, value: &Value) -> bool {
        value.as_stream().is_some_and(|s| s.origin() == self.marker)
    }
}

#[derive(Clone)]
enum Entry {
    Operation(RawOperation),
    Value(Binding),
}

/// Registration-based stream library.
pub struct Library {
    name: String,
    version: String,
    marker: LibraryMarker,
    revision: Cell<u64>,
    entries: RefCell<BTreeMap<String, Entry>>,
}

impl Library {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            marker: LibraryMarker::fresh(),
            revision: Cell::new(0),
            entries: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_operation(
        self,
        name: impl Into<String>,
        op: impl Fn(&LibraryContext, &[Value]) -> Result<Value, OperationError> + 'static,
    ) -> Self {
        self.add_operation(name, op);
        self
    }

    pub fn with_value(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_value(name, value);
        self
    }

    /// Register (or replace) an operation.
    pub fn add_operation(
        &self,
        name: impl Into<String>,
        op: impl Fn(&LibraryContext, &[Value]) -> Result<Value, OperationError> + 'static,
    ) {
        self.insert(name.into(), Entry::Operation(Rc::new(op)));
    }

    /// Register a value member. Re-registering an existing value writes
    /// into its current binding, so mirrors taken earlier keep seeing it.
    pub fn add_value(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        if let Some(Entry::Value(b)) = self.entries.borrow().get(&name) {
            b.set(value);
            return;
        }
        self.insert(name, Entry::Value(Binding::new(value)));
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries.borrow_mut().remove(name).is_some();
        if removed {
            self.bump();
        }
        removed
    }

    fn insert(&self, name: String, entry: Entry) {
        self.entries.borrow_mut().insert(name, entry);
        self.bump();
    }

    fn bump(&self) {
        self.revision.set(self.revision.get() + 1);
    }

    pub fn context(&self) -> LibraryContext {
        LibraryContext {
            marker: self.marker,
        }
    }

    /// Call an operation directly, bypassing any mirror.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, OperationError> {
        let op = match self.entries.borrow().get(name) {
            Some(Entry::Operation(op)) => op.clone(),
            _ => {
                return Err(OperationError::failed(name, "no such operation"));
            }
        };
        op(&self.context(), args)
    }

    /// Read a value member.
    pub fn value(&self, name: &str) -> Option<Value> {
        match self.entries.borrow().get(name) {
            Some(Entry::Value(b)) => Some(b.get()),
            _ => None,
        }
    }

    /// Write a value member in place. Returns `false` if no such value exists.
    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> bool {
        match self.entries.borrow().get(name) {
            Some(Entry::Value(b)) => {
                b.set(value);
                true
            }
            _ => false,
        }
    }
}

impl StreamLibrary for Library {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn marker(&self) -> LibraryMarker {
        self.marker
    }

    fn revision(&self) -> u64 {
        self.revision.get()
    }

    fn members(&self) -> Result<Vec<(String, Member)>, DiscoveryError> {
        let cx = self.context();
        Ok(self
            .entries
            .borrow()
            .iter()
            .map(|(name, entry)| {
                let member = match entry {
                    Entry::Operation(raw) => {
                        let raw = raw.clone();
                        let op: Operation = Rc::new(move |args: &[Value]| raw(&cx, args));
                        Member::Operation(op)
                    }
                    Entry::Value(b) => Member::Value(b.clone()),
                };
                (name.clone(), member)
            })
            .collect())
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("marker", &self.marker)
            .field("revision", &self.revision.get())
            .field("members", &self.entries.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Small stock catalog: `of`, `from`, `empty`, `is_stream` and a `version`
/// value.
pub fn standard() -> Library {
    const VERSION: &str = "1.0.0";
    Library::new("standard", VERSION)
        .with_operation("of", |cx, args| Ok(cx.stream(args.to_vec()).into()))
        .with_operation("from", |cx, args| match args {
            [Value::List(items)] => Ok(cx.stream(items.clone()).into()),
            [Value::Stream(s)] if s.origin() == cx.marker() => Ok(Value::Stream(s.clone())),
            [other] => Err(OperationError::invalid_arguments(
                "from",
                format!("expected list, got {}", other.type_name()),
            )),
            _ => Err(OperationError::invalid_arguments(
                "from",
                format!("expected 1 argument, got {}", args.len()),
            )),
        })
        .with_operation("empty", |cx, _| Ok(cx.stream(Vec::new()).into()))
        .with_operation("is_stream", |cx, args| {
            Ok(Value::Bool(args.first().is_some_and(|v| cx.owns(v))))
        })
        .with_value("version", VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_are_bound_to_the_library() {
        let lib = standard();
        let members = lib.members().unwrap();
        let (_, of) = members.iter().find(|(n, _)| n == "of").unwrap();
        let Member::Operation(of) = of else {
            panic!("'of' should be an operation");
        };
        let out = of(&[Value::Int(1)]).unwrap();
        assert!(lib.owns(&out));
    }

    #[test]
    fn revision_tracks_structural_changes() {
        let lib = Library::new("t", "0").with_value("a", 1);
        let r0 = lib.revision();
        lib.add_value("b", 2);
        assert!(lib.revision() > r0);

        let r1 = lib.revision();
        lib.set_value("a", 3);
        assert_eq!(lib.revision(), r1);

        assert!(lib.remove("b"));
        assert!(!lib.remove("b"));
        assert!(lib.revision() > r1);
    }

    #[test]
    fn re_adding_a_value_keeps_its_binding() {
        let lib = standard();
        let before = lib.members().unwrap();
        let r0 = lib.revision();

        lib.add_value("version", "2.0.0");
        assert_eq!(lib.revision(), r0);
        assert_eq!(lib.value("version"), Some(Value::from("2.0.0")));

        let (_, Member::Value(old)) = before.iter().find(|(n, _)| n == "version").unwrap() else {
            panic!("'version' should be a value");
        };
        assert_eq!(old.get(), Value::from("2.0.0"));
    }

    #[test]
    fn value_replacing_an_operation_is_structural() {
        let lib = standard();
        let r0 = lib.revision();
        lib.add_value("of", 1);
        assert!(lib.revision() > r0);
        assert_eq!(lib.value("of"), Some(Value::Int(1)));
    }

    #[test]
    fn from_rejects_non_lists() {
        let lib = standard();
        let err = lib.call("from", &[Value::Int(3)]).unwrap_err();
        assert!(matches!(err, OperationError::InvalidArguments { .. }));
    }

    #[test]
    fn foreign_streams_are_not_owned() {
        let a = standard();
        let b = standard();
        let s = b.call("of", &[]).unwrap();
        assert!(b.owns(&s));
        assert!(!a.owns(&s));
        assert_eq!(a.call("is_stream", &[s]).unwrap(), Value::Bool(false));
    }
}
