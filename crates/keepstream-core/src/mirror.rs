//! # Capability mirror
//!
//! A mirror is built by walking a library's catalog once and producing one
//! entry per name:
//!
//! - operations become [`WrappedOperation`]s, which call the real operation
//!   and tag the stream it returns with whatever retention flag the caller
//!   passes in;
//! - values become [`Passthrough`]s, which read and write the library's own
//!   binding (no copy is taken).
//!
//! The mirror itself holds no retention state, so one mirror can be shared
//! by any number of factories.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{DiscoveryError, OperationError};
use crate::library::{Binding, Member, MemberKind, Operation, StreamLibrary};
use crate::value::Value;

/// What a wrapped call did to its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagOutcome {
    /// The stream now carries the caller's flag.
    Tagged,
    /// The stream was tagged before; that earlier flag stands.
    AlreadyTagged { retained: bool },
    /// Not a stream of this library; returned as-is.
    Untouched,
}

/// An operation that tags the streams it produces.
#[derive(Clone)]
pub struct WrappedOperation {
    name: Rc<str>,
    library: Rc<dyn StreamLibrary>,
    op: Operation,
}

impl WrappedOperation {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the real operation and, if it returned one of the library's own
    /// streams, tag it with `retained`. Anything else is returned untouched,
    /// and errors propagate as-is.
    pub fn invoke(&self, retained: bool, args: &[Value]) -> Result<Value, OperationError> {
        self.invoke_tagged(retained, args).map(|(out, _)| out)
    }

    /// Like [`invoke`](Self::invoke), also reporting whether the tag was
    /// applied. A stream handed back a second time keeps its first tag.
    pub fn invoke_tagged(
        &self,
        retained: bool,
        args: &[Value],
    ) -> Result<(Value, TagOutcome), OperationError> {
        let out = (self.op)(args)?;
        let outcome = match &out {
            Value::Stream(s) if self.library.owns(&out) => {
                if s.tag_retained(retained) {
                    log::trace!("{}: tagged stream retained={}", self.name, retained);
                    TagOutcome::Tagged
                } else {
                    TagOutcome::AlreadyTagged {
                        retained: s.is_retained(),
                    }
                }
            }
            _ => TagOutcome::Untouched,
        };
        Ok((out, outcome))
    }
}

/// Read/write view of a library value.
#[derive(Clone, Debug)]
pub struct Passthrough {
    binding: Binding,
}

impl Passthrough {
    pub fn get(&self) -> Value {
        self.binding.get()
    }

    pub fn set(&self, value: impl Into<Value>) {
        self.binding.set(value);
    }
}

#[derive(Clone)]
pub enum MirrorEntry {
    Operation(WrappedOperation),
    Value(Passthrough),
}

impl MirrorEntry {
    pub fn kind(&self) -> MemberKind {
        match self {
            MirrorEntry::Operation(_) => MemberKind::Operation,
            MirrorEntry::Value(_) => MemberKind::Value,
        }
    }
}

impl fmt::Debug for MirrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorEntry::Operation(op) => write!(f, "Operation({})", op.name),
            MirrorEntry::Value(p) => fmt::Debug::fmt(p, f),
        }
    }
}

pub struct CapabilityMirror {
    library: Rc<dyn StreamLibrary>,
    revision: u64,
    entries: BTreeMap<String, MirrorEntry>,
}

impl CapabilityMirror {
    /// Walk the library's catalog and build the mirrored surface.
    ///
    /// Fails rather than returning an empty or partial mirror.
    pub fn discover(library: Rc<dyn StreamLibrary>) -> Result<Self, DiscoveryError> {
        let revision = library.revision();
        let members = library.members()?;
        if members.is_empty() {
            return Err(DiscoveryError::Empty {
                library: library.name().to_string(),
            });
        }

        let mut entries = BTreeMap::new();
        for (name, member) in members {
            if entries.contains_key(&name) {
                return Err(DiscoveryError::DuplicateMember {
                    library: library.name().to_string(),
                    name,
                });
            }
            let entry = match member {
                Member::Operation(op) => MirrorEntry::Operation(WrappedOperation {
                    name: Rc::from(name.as_str()),
                    library: library.clone(),
                    op,
                }),
                Member::Value(binding) => MirrorEntry::Value(Passthrough { binding }),
            };
            entries.insert(name, entry);
        }

        let mirror = Self {
            library,
            revision,
            entries,
        };
        log::debug!(
            "mirrored {} {} (rev {}): {} operations, {} values",
            mirror.library.name(),
            mirror.library.version(),
            revision,
            mirror.count(MemberKind::Operation),
            mirror.count(MemberKind::Value),
        );
        Ok(mirror)
    }

    /// Build a fresh mirror of the same library.
    pub fn rediscover(&self) -> Result<Self, DiscoveryError> {
        Self::discover(self.library.clone())
    }

    /// The library's member set changed since discovery.
    pub fn is_stale(&self) -> bool {
        self.library.revision() != self.revision
    }

    pub fn discovered_revision(&self) -> u64 {
        self.revision
    }

    pub fn library(&self) -> &Rc<dyn StreamLibrary> {
        &self.library
    }

    pub fn entry(&self, name: &str) -> Option<&MirrorEntry> {
        self.entries.get(name)
    }

    pub fn operation(&self, name: &str) -> Option<&WrappedOperation> {
        match self.entries.get(name) {
            Some(MirrorEntry::Operation(op)) => Some(op),
            _ => None,
        }
    }

    pub fn passthrough(&self, name: &str) -> Option<&Passthrough> {
        match self.entries.get(name) {
            Some(MirrorEntry::Value(p)) => Some(p),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MirrorEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn count(&self, kind: MemberKind) -> usize {
        self.entries.values().filter(|e| e.kind() == kind).count()
    }
}

impl fmt::Debug for CapabilityMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityMirror")
            .field("library", &self.library.name())
            .field("revision", &self.revision)
            .field("entries", &self.entries)
            .finish()
    }
}
