//! Typed tree nodes exposed to scripts as userdata.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use mlua::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The class of a tree node, derived from the source file's extension or a
/// metadata/model declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeClass {
  Folder,
  /// `*.server.lua`
  ServerScript,
  /// `*.client.lua` — the entry-point kind collected by deploy.
  ClientScript,
  /// `*.lua` / `*.json` — the module kind, subject to the non-nil contract.
  ModuleScript,
  /// `*.txt`
  StringValue,
  /// `*.csv`
  LocalizationTable,
  /// Any class declared by a metadata or model file.
  Other(String),
}

impl NodeClass {
  pub fn from_name(name: &str) -> Self {
    match name {
      "Folder" => NodeClass::Folder,
      "ServerScript" => NodeClass::ServerScript,
      "ClientScript" => NodeClass::ClientScript,
      "ModuleScript" => NodeClass::ModuleScript,
      "StringValue" => NodeClass::StringValue,
      "LocalizationTable" => NodeClass::LocalizationTable,
      other => NodeClass::Other(other.to_string()),
    }
  }

  /// Module-kind nodes must return a non-nil value when required.
  pub fn is_module(&self) -> bool {
    matches!(self, NodeClass::ModuleScript)
  }

  /// Entry-point nodes are executed concurrently by deploy.
  pub fn is_entry_point(&self) -> bool {
    matches!(self, NodeClass::ClientScript)
  }
}

impl fmt::Display for NodeClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      NodeClass::Folder => "Folder",
      NodeClass::ServerScript => "ServerScript",
      NodeClass::ClientScript => "ClientScript",
      NodeClass::ModuleScript => "ModuleScript",
      NodeClass::StringValue => "StringValue",
      NodeClass::LocalizationTable => "LocalizationTable",
      NodeClass::Other(other) => other,
    };
    f.write_str(name)
  }
}

/// A JSON-shaped property value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Property {
  Bool(bool),
  Number(f64),
  String(String),
  List(Vec<Property>),
}

impl IntoLua for Property {
  fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
    match self {
      Property::Bool(value) => Ok(LuaValue::Boolean(value)),
      Property::Number(value) => Ok(LuaValue::Number(value)),
      Property::String(value) => Ok(LuaValue::String(lua.create_string(&value)?)),
      Property::List(values) => {
        let table = lua.create_table()?;
        for (i, value) in values.into_iter().enumerate() {
          table.set(i + 1, value)?;
        }
        Ok(LuaValue::Table(table))
      }
    }
  }
}

struct NodeData {
  id: Uuid,
  name: String,
  class: NodeClass,
  properties: BTreeMap<String, Property>,
  parent: Option<Weak<RefCell<NodeData>>>,
  children: Vec<Node>,
}

/// A shared-ownership tree node. Cloning a `Node` clones the handle, not the
/// node; parent links are weak so a tree never leaks through cycles.
#[derive(Clone)]
pub struct Node {
  inner: Rc<RefCell<NodeData>>,
}

impl Node {
  pub fn new(name: impl Into<String>, class: NodeClass) -> Self {
    Self {
      inner: Rc::new(RefCell::new(NodeData {
        id: Uuid::new_v4(),
        name: name.into(),
        class,
        properties: BTreeMap::new(),
        parent: None,
        children: Vec::new(),
      })),
    }
  }

  pub fn id(&self) -> Uuid {
    self.inner.borrow().id
  }

  pub fn name(&self) -> String {
    self.inner.borrow().name.clone()
  }

  pub fn class(&self) -> NodeClass {
    self.inner.borrow().class.clone()
  }

  pub fn parent(&self) -> Option<Node> {
    self
      .inner
      .borrow()
      .parent
      .as_ref()
      .and_then(Weak::upgrade)
      .map(|inner| Node { inner })
  }

  pub fn children(&self) -> Vec<Node> {
    self.inner.borrow().children.clone()
  }

  /// Attach `child` under this node. A child already parented elsewhere is
  /// detached from its previous parent first.
  pub fn add_child(&self, child: &Node) {
    if let Some(previous) = child.parent() {
      previous
        .inner
        .borrow_mut()
        .children
        .retain(|sibling| !Rc::ptr_eq(&sibling.inner, &child.inner));
    }
    child.inner.borrow_mut().parent = Some(Rc::downgrade(&self.inner));
    self.inner.borrow_mut().children.push(child.clone());
  }

  pub fn find_child(&self, name: &str) -> Option<Node> {
    self
      .inner
      .borrow()
      .children
      .iter()
      .find(|child| child.inner.borrow().name == name)
      .cloned()
  }

  pub fn set_property(&self, name: impl Into<String>, value: Property) {
    self.inner.borrow_mut().properties.insert(name.into(), value);
  }

  pub fn property(&self, name: &str) -> Option<Property> {
    self.inner.borrow().properties.get(name).cloned()
  }

  /// Dot-joined path from the tree root down to this node.
  pub fn full_name(&self) -> String {
    let mut parts = vec![self.name()];
    let mut current = self.parent();
    while let Some(node) = current {
      parts.push(node.name());
      current = node.parent();
    }
    parts.reverse();
    parts.join(".")
  }
}

impl fmt::Debug for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Node")
      .field("name", &self.name())
      .field("class", &self.class())
      .finish()
  }
}

impl LuaUserData for Node {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("name", |_, this| Ok(this.name()));
    fields.add_field_method_get("class_name", |_, this| Ok(this.class().to_string()));
    fields.add_field_method_get("parent", |_, this| Ok(this.parent()));
  }

  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("full_name", |_, this, ()| Ok(this.full_name()));
    methods.add_method("children", |_, this, ()| Ok(this.children()));
    methods.add_method("child", |_, this, name: String| Ok(this.find_child(&name)));
    methods.add_method("prop", |lua, this, name: String| match this.property(&name) {
      Some(value) => value.into_lua(lua),
      None => Ok(LuaValue::Nil),
    });
    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| Ok(this.full_name()));
  }
}
