//! Error types for lattice-lib

use std::path::PathBuf;

use mlua::prelude::*;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building trees and running script units.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Lua error: {0}")]
  Lua(#[from] LuaError),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("'{}' is not a directory", .0.display())]
  NotADirectory(PathBuf),

  #[error("invalid metadata file '{}': {message}", path.display())]
  Metadata { path: PathBuf, message: String },

  #[error("metadata file '{}' cannot reassign the class of a script node", path.display())]
  ClassOverride { path: PathBuf },

  #[error("module '{}' did not return any value", path.display())]
  ModuleContract { path: PathBuf },

  #[error("cyclic require detected:\n{chain}")]
  CyclicRequire { chain: String },

  #[error(
    "script '{}' reached its execution timeout; avoid blocking the main thread in client scripts",
    path.display()
  )]
  Timeout { path: PathBuf },

  #[error("cannot replace the executor of '{}' after it has run", path.display())]
  ExecutorSealed { path: PathBuf },

  #[error("cannot deploy '{}': no entry-point scripts were registered", path.display())]
  NoEntryPoints { path: PathBuf },

  #[error("deferred execution failed: {0}")]
  Deferred(String),
}

impl Error {
  /// Convert into a Lua error without double-wrapping native Lua failures,
  /// so script tracebacks keep their original diagnostics.
  pub(crate) fn into_lua(self) -> LuaError {
    match self {
      Error::Lua(err) => err,
      other => LuaError::RuntimeError(other.to_string()),
    }
  }
}
