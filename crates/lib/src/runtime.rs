//! The embedded Lua interpreter and the registries shared by its units.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use uuid::Uuid;

use crate::error::Result;
use crate::scope::BuildScope;
use crate::store::{Store, Stores};
use crate::tree::Node;
use crate::unit::ModuleUnit;

/// Registry key holding the interpreter's stock `require`, used as the
/// fallback for non-node arguments.
pub(crate) const NATIVE_REQUIRE_KEY: &str = "lattice_native_require";

/// Registries shared by every unit of a runtime.
pub(crate) struct Shared {
  /// Units keyed by their node's id.
  pub(crate) units: Store<Uuid, Rc<ModuleUnit>>,
  /// In-flight require edges: caller unit id to callee unit.
  pub(crate) chain: Store<Uuid, Rc<ModuleUnit>>,
}

/// Owns the interpreter and the [`Stores`] context. Created once per process
/// and cloned by handle into every build scope.
pub struct Runtime {
  lua: Lua,
  stores: Rc<Stores>,
  shared: Rc<Shared>,
}

impl Runtime {
  pub fn new() -> Result<Rc<Self>> {
    Self::with_stores(Rc::new(Stores::new()))
  }

  /// Build a runtime on an existing context so registries are shared.
  pub fn with_stores(stores: Rc<Stores>) -> Result<Rc<Self>> {
    let lua = Lua::new();
    register_globals(&lua)?;

    let native: LuaFunction = lua.globals().get("require")?;
    lua.set_named_registry_value(NATIVE_REQUIRE_KEY, native)?;

    let shared = Rc::new(Shared {
      units: stores.get_store("script-units"),
      chain: stores.get_store("require-chain"),
    });

    Ok(Rc::new(Self { lua, stores, shared }))
  }

  pub fn lua(&self) -> &Lua {
    &self.lua
  }

  pub(crate) fn stores(&self) -> &Stores {
    &self.stores
  }

  /// Create a build scope over `target`, allocating a fresh scope id.
  pub fn create_scope(self: &Rc<Self>, target: impl Into<PathBuf>) -> Result<BuildScope> {
    BuildScope::new(self.clone(), target.into())
  }

  /// Look up the unit registered for a tree node.
  pub fn unit_for(&self, node: &Node) -> Option<Rc<ModuleUnit>> {
    self.shared.units.borrow().get(&node.id()).cloned()
  }

  pub(crate) fn register_script(
    &self,
    scope: u64,
    node: &Node,
    path: &Path,
    root: &Path,
  ) -> Result<Rc<ModuleUnit>> {
    ModuleUnit::new(&self.lua, &self.shared, node, path, root, scope)
  }
}

fn register_globals(lua: &Lua) -> LuaResult<()> {
  let globals = lua.globals();

  let info = lua.create_table()?;
  info.set("version", env!("CARGO_PKG_VERSION"))?;
  info.set("os", std::env::consts::OS)?;
  info.set("arch", std::env::consts::ARCH)?;
  globals.set("lattice", info)?;

  // Cooperative sleep driven by the tokio timer; returns the elapsed delay.
  let wait = lua.create_async_function(|_, seconds: Option<f64>| async move {
    let seconds = seconds.unwrap_or(0.0).max(0.0);
    tokio::time::sleep(std::time::Duration::from_secs_f64(seconds)).await;
    Ok(seconds)
  })?;
  globals.set("wait", wait)?;

  Ok(())
}
