//! The reified object tree: typed nodes and the directory-to-tree builder.

mod builder;
mod node;

pub(crate) use builder::build_directory;
pub use node::{Node, NodeClass, Property};
