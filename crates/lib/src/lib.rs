//! lattice-lib: mount a source directory as a live object tree and run its
//! scripts inside an embedded Lua runtime.
//!
//! The pieces fit together like this:
//! - `store`: named, lazily-created registries shared across the process
//! - `tree`: typed nodes and the directory-to-tree builder
//! - `unit`: lazily compiled, memoized script executors with a node-aware
//!   `require`
//! - `scope`: one build over a directory; reify the tree, deploy the
//!   entry points
//! - `runtime`: the interpreter plus the shared registries
//! - `fetch`: GitHub release retrieval for remote projects

pub mod error;
pub mod fetch;
pub mod runtime;
pub mod scope;
pub mod store;
pub mod tree;
pub mod unit;

pub use error::{Error, Result};
pub use runtime::Runtime;
pub use scope::BuildScope;
pub use store::Stores;
pub use tree::{Node, NodeClass, Property};
pub use unit::{EXECUTION_TIMEOUT, ModuleUnit};
