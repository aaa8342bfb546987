//! Build scopes: reify a directory into a node tree and deploy its
//! entry-point scripts.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::tree::{self, Node};
use crate::unit::ModuleUnit;

/// One build over a target directory. Scope ids come from the shared counter
/// and are never reused, including for scopes dropped without deploying.
pub struct BuildScope {
  scope: u64,
  target: PathBuf,
  runtime: Rc<Runtime>,
  units: RefCell<Vec<Rc<ModuleUnit>>>,
}

impl BuildScope {
  pub(crate) fn new(runtime: Rc<Runtime>, target: PathBuf) -> Result<Self> {
    if !target.is_dir() {
      return Err(Error::NotADirectory(target));
    }
    let scope = runtime.stores().next_scope();
    debug!(scope, target = %target.display(), "created build scope");
    Ok(Self {
      scope,
      target,
      runtime,
      units: RefCell::new(Vec::new()),
    })
  }

  pub fn id(&self) -> u64 {
    self.scope
  }

  pub fn target(&self) -> &Path {
    &self.target
  }

  pub fn runtime(&self) -> &Rc<Runtime> {
    &self.runtime
  }

  /// Build the node tree for the target directory, registering a unit for
  /// every script file. The new root is attached under `parent` when given.
  pub fn reify(&self, parent: Option<&Node>) -> Result<Node> {
    let root = tree::build_directory(self, &self.target)?;
    if let Some(parent) = parent {
      parent.add_child(&root);
    }
    info!(
      scope = self.scope,
      units = self.units.borrow().len(),
      "reified build scope"
    );
    Ok(root)
  }

  /// Units registered while reifying, in registration order.
  pub fn units(&self) -> Vec<Rc<ModuleUnit>> {
    self.units.borrow().clone()
  }

  /// The scope's entry-point units.
  pub fn entry_points(&self) -> Vec<Rc<ModuleUnit>> {
    self
      .units
      .borrow()
      .iter()
      .filter(|unit| unit.node().class().is_entry_point())
      .cloned()
      .collect()
  }

  pub(crate) fn track(&self, node: &Node, path: &Path) -> Result<Rc<ModuleUnit>> {
    let unit = self
      .runtime
      .register_script(self.scope, node, path, &self.target)?;
    self.units.borrow_mut().push(unit.clone());
    Ok(unit)
  }

  /// Run every entry-point script concurrently, all-or-nothing.
  ///
  /// Must be awaited from within a [`tokio::task::LocalSet`]; interpreter
  /// values are not `Send`. On the first failure the remaining executions
  /// are aborted, not awaited, and the failure is returned.
  pub async fn deploy(&self) -> Result<Vec<Node>> {
    let entries = self.entry_points();
    if entries.is_empty() {
      return Err(Error::NoEntryPoints {
        path: self.target.clone(),
      });
    }

    info!(
      scope = self.scope,
      count = entries.len(),
      "deploying entry-point scripts"
    );

    let mut jobs: JoinSet<Result<Node>> = JoinSet::new();
    for unit in entries {
      let runtime = self.runtime.clone();
      jobs.spawn_local(async move {
        unit.run_deferred(runtime.lua()).await?;
        Ok(unit.node().clone())
      });
    }

    let mut finished = Vec::new();
    while let Some(joined) = jobs.join_next().await {
      match joined {
        Ok(Ok(node)) => finished.push(node),
        Ok(Err(err)) => {
          jobs.abort_all();
          return Err(err);
        }
        Err(err) => {
          jobs.abort_all();
          return Err(Error::Deferred(err.to_string()));
        }
      }
    }

    info!(scope = self.scope, count = finished.len(), "deploy complete");
    Ok(finished)
  }
}
