//! # Streams, Factories, and Retention
//!
//! Keepstream sits in front of a stream library and tags every stream it
//! hands out with a retention flag. A component's scope reads that flag at
//! teardown: unretained streams are disposed, retained ones are skipped.
//! There are three main pieces:
//!
//! - `StreamLibrary` — the external catalog of stream-producing operations
//!   and plain values. `Library` is a registration-based implementation.
//! - `CapabilityMirror` — one wrapped entry per library member, discovered
//!   at startup.
//! - `StreamFactory` — the mirror plus a fixed `retained` flag, with `keep`
//!   to get the retaining sibling.
//!
//! ## Producing streams
//!
//! ```rust
//! use std::rc::Rc;
//! use keepstream_core::*;
//!
//! let streams = observable(Rc::new(standard())).unwrap();
//!
//! let s = streams.call("of", &[1.into(), 2.into(), 3.into()]).unwrap();
//! assert_eq!(s.as_stream().unwrap().retained(), Some(false));
//!
//! let kept = streams.keep().call("of", &[1.into()]).unwrap();
//! assert_eq!(kept.as_stream().unwrap().retained(), Some(true));
//! ```
//!
//! Anything an operation returns that is not one of the library's own
//! streams comes back untouched:
//!
//! ```rust
//! # use std::rc::Rc;
//! # use keepstream_core::*;
//! let streams = observable(Rc::new(standard())).unwrap();
//! assert_eq!(streams.call("is_stream", &[5.into()]).unwrap(), Value::Bool(false));
//! ```
//!
//! ## Values
//!
//! Non-operation members are read and written straight through to the
//! library; nothing is cached.
//!
//! ```rust
//! # use std::rc::Rc;
//! # use keepstream_core::*;
//! let lib = Rc::new(standard());
//! let streams = observable(lib.clone()).unwrap();
//! streams.set("version", "2.0.0").unwrap();
//! assert_eq!(lib.value("version"), Some(Value::from("2.0.0")));
//! ```
//!
//! ## Upgrades
//!
//! The mirror is built from whatever the library reports at discovery time.
//! If the library's member set changes, `mirror().is_stale()` turns true and
//! `reload()` rebuilds the surface.
//!
//! ## Teardown
//!
//! `ComponentScope` is a minimal lifecycle scheduler: `track` streams
//! inside `scope.run(..)` and `teardown()` disposes the unretained ones.

pub mod error;
pub mod factory;
pub mod library;
pub mod lifecycle;
pub mod mirror;
pub mod prelude;
pub mod stream;
pub mod value;


pub use error::*;
pub use factory::*;
pub use library::*;
pub use lifecycle::*;
pub use mirror::*;
pub use stream::*;
pub use value::*;
