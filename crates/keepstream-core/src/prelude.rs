pub use crate::error::{CallError, DiscoveryError, OperationError};
pub use crate::factory::{
    BoundOperation, FactoryConfig, StreamFactory, install, observable, observables, uninstall,
};
pub use crate::library::{
    Binding, Library, LibraryContext, Member, MemberKind, StreamLibrary, standard,
};
pub use crate::lifecycle::{ComponentScope, StreamKey, TeardownReport, current_scope, track};
pub use crate::mirror::{
    CapabilityMirror, MirrorEntry, Passthrough, TagOutcome, WrappedOperation,
};
pub use crate::stream::{LibraryMarker, Stream, Subscription};
pub use crate::value::Value;
