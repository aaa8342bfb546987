//! Script units: lazily compiled, memoized executors bound to tree nodes.
//!
//! Each unit owns an injected environment table exposing `script`, `require`,
//! `_PATH`, and `_ROOT`; reads and writes of anything else fall through to
//! the interpreter globals via the environment's metatable.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use mlua::prelude::*;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::runtime::{NATIVE_REQUIRE_KEY, Shared};
use crate::tree::Node;

/// Wall-clock budget for one deferred entry-point execution.
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// The callable behind a unit.
pub enum Executor {
  /// A chunk compiled from the unit's source file.
  Chunk(LuaFunction),
  /// A host-provided value factory (JSON modules).
  Provider(Box<dyn Fn(&Lua) -> LuaResult<LuaValue>>),
}

enum Step {
  Call(LuaFunction),
  Value(LuaValue),
}

pub struct ModuleUnit {
  id: Uuid,
  node: Node,
  path: PathBuf,
  root: PathBuf,
  scope: u64,
  source: String,
  env: LuaTable,
  executor: RefCell<Option<Executor>>,
  complete: Cell<bool>,
  result: RefCell<Option<LuaValue>>,
}

impl ModuleUnit {
  pub(crate) fn new(
    lua: &Lua,
    shared: &Rc<Shared>,
    node: &Node,
    path: &Path,
    root: &Path,
    scope: u64,
  ) -> Result<Rc<Self>> {
    let source = std::fs::read_to_string(path)?;
    let id = Uuid::new_v4();

    let env = lua.create_table()?;
    env.set("script", node.clone())?;
    env.set("_PATH", path.display().to_string())?;
    env.set("_ROOT", root.display().to_string())?;

    let weak = Rc::downgrade(shared);
    let require = lua.create_function(move |lua, target: LuaValue| {
      let shared = weak
        .upgrade()
        .ok_or_else(|| LuaError::RuntimeError("script runtime was dropped".to_string()))?;
      require_value(lua, &shared, id, target)
    })?;
    env.set("require", require)?;

    let mt = lua.create_table()?;
    mt.set("__index", lua.globals())?;
    mt.set("__newindex", lua.globals())?;
    env.set_metatable(Some(mt))?;

    let unit = Rc::new(Self {
      id,
      node: node.clone(),
      path: path.to_path_buf(),
      root: root.to_path_buf(),
      scope,
      source,
      env,
      executor: RefCell::new(None),
      complete: Cell::new(false),
      result: RefCell::new(None),
    });

    shared.units.borrow_mut().insert(node.id(), unit.clone());
    trace!(path = %path.display(), scope, "registered script unit");
    Ok(unit)
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn node(&self) -> &Node {
    &self.node
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Path relative to the build root, as shown in diagnostics.
  pub fn relative_path(&self) -> &Path {
    self.path.strip_prefix(&self.root).unwrap_or(&self.path)
  }

  pub fn scope(&self) -> u64 {
    self.scope
  }

  pub fn is_complete(&self) -> bool {
    self.complete.get()
  }

  /// Install a host-provided executor in place of the compiled chunk.
  /// Fails once the unit has completed execution.
  pub fn set_executor(
    &self,
    provider: impl Fn(&Lua) -> LuaResult<LuaValue> + 'static,
  ) -> Result<()> {
    if self.complete.get() {
      return Err(Error::ExecutorSealed {
        path: self.path.clone(),
      });
    }
    *self.executor.borrow_mut() = Some(Executor::Provider(Box::new(provider)));
    Ok(())
  }

  /// Resolve the executor, compiling the source chunk on first use.
  fn prepare(&self, lua: &Lua) -> Result<Step> {
    if let Some(executor) = &*self.executor.borrow() {
      return match executor {
        Executor::Chunk(function) => Ok(Step::Call(function.clone())),
        Executor::Provider(provider) => Ok(Step::Value(provider(lua)?)),
      };
    }

    let chunk_name = format!(
      "@{} ({})",
      self.relative_path().display(),
      self.node.full_name()
    );
    let function = lua
      .load(self.source.as_str())
      .set_name(chunk_name)
      .set_environment(self.env.clone())
      .into_function()?;
    *self.executor.borrow_mut() = Some(Executor::Chunk(function.clone()));
    Ok(Step::Call(function))
  }

  /// Execute the unit and memoize the result. Later calls return the cached
  /// value without running the executor again. Module-kind units must
  /// produce a non-nil value; `false` and `0` are fine.
  pub fn run(&self, lua: &Lua) -> Result<LuaValue> {
    if self.complete.get() {
      return Ok(self.cached());
    }
    debug!(path = %self.path.display(), "running script unit");
    let value = match self.prepare(lua)? {
      Step::Call(function) => function.call::<LuaValue>(self.env.clone())?,
      Step::Value(value) => value,
    };
    self.finish(value)
  }

  /// Async variant of [`run`](Self::run); the chunk may yield (`wait`).
  pub async fn run_async(&self, lua: &Lua) -> Result<LuaValue> {
    if self.complete.get() {
      return Ok(self.cached());
    }
    debug!(path = %self.path.display(), "running script unit");
    let value = match self.prepare(lua)? {
      Step::Call(function) => function.call_async::<LuaValue>(self.env.clone()).await?,
      Step::Value(value) => value,
    };
    self.finish(value)
  }

  /// Yield to the scheduler first, then run under the fixed wall-clock
  /// budget. A timeout abandons the execution and reports the script.
  pub async fn run_deferred(&self, lua: &Lua) -> Result<LuaValue> {
    tokio::task::yield_now().await;
    match tokio::time::timeout(EXECUTION_TIMEOUT, self.run_async(lua)).await {
      Ok(outcome) => outcome,
      Err(_) => Err(Error::Timeout {
        path: self.path.clone(),
      }),
    }
  }

  fn cached(&self) -> LuaValue {
    self.result.borrow().clone().unwrap_or(LuaValue::Nil)
  }

  fn finish(&self, value: LuaValue) -> Result<LuaValue> {
    if self.node.class().is_module() && value.is_nil() {
      return Err(Error::ModuleContract {
        path: self.path.clone(),
      });
    }
    self.complete.set(true);
    *self.result.borrow_mut() = Some(value.clone());
    Ok(value)
  }
}

/// The unit-bound `require`. Tree nodes resolve through the unit registry;
/// anything else falls through to the interpreter's stock loader.
pub(crate) fn require_value(
  lua: &Lua,
  shared: &Rc<Shared>,
  caller: Uuid,
  target: LuaValue,
) -> LuaResult<LuaValue> {
  if let LuaValue::UserData(userdata) = &target {
    let node = userdata.borrow::<Node>().ok().map(|node| Node::clone(&node));
    if let Some(node) = node {
      return require_node(lua, shared, caller, &node);
    }
  }
  let native: LuaFunction = lua.named_registry_value(NATIVE_REQUIRE_KEY)?;
  native.call(target)
}

fn require_node(lua: &Lua, shared: &Rc<Shared>, caller: Uuid, node: &Node) -> LuaResult<LuaValue> {
  let unit = shared.units.borrow().get(&node.id()).cloned();
  let Some(unit) = unit else {
    return Err(LuaError::RuntimeError(format!(
      "'{}' has no module unit registered in this build",
      node.full_name()
    )));
  };

  // Record the in-flight edge first, then look for a cycle from the callee.
  shared.chain.borrow_mut().insert(caller, unit.clone());
  if let Some(cycle) = find_cycle(shared, &unit) {
    clear_edge(shared, caller, &unit);
    return Err(Error::CyclicRequire { chain: cycle }.into_lua());
  }

  let outcome = unit.run(lua);
  clear_edge(shared, caller, &unit);
  outcome.map_err(Error::into_lua)
}

/// Remove the caller's chain entry, but only while it still points at the
/// callee it was recorded for.
fn clear_edge(shared: &Rc<Shared>, caller: Uuid, callee: &Rc<ModuleUnit>) {
  let mut chain = shared.chain.borrow_mut();
  if chain
    .get(&caller)
    .is_some_and(|current| current.id() == callee.id())
  {
    chain.remove(&caller);
  }
}

/// Walk the in-flight require chain starting at `start`. Coming back around
/// to `start` is a cycle; the returned listing names every script along it,
/// ending with `start` again.
fn find_cycle(shared: &Rc<Shared>, start: &Rc<ModuleUnit>) -> Option<String> {
  let chain = shared.chain.borrow();
  let mut path = vec![start.clone()];
  let mut current = start.id();
  while let Some(next) = chain.get(&current) {
    if next.id() == start.id() {
      let mut lines: Vec<String> = path
        .iter()
        .map(|unit| unit.relative_path().display().to_string())
        .collect();
      lines.push(start.relative_path().display().to_string());
      return Some(lines.join("\n -> "));
    }
    path.push(next.clone());
    current = next.id();
  }
  None
}
