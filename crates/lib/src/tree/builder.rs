//! Directory-to-tree transformation.
//!
//! Files become nodes according to their extension; script files also get a
//! module unit registered against the build scope. A directory containing an
//! `init.*.lua` file is promoted to a script node named after the directory,
//! and `*.meta.json` files decorate their owning file or directory instead of
//! becoming nodes themselves.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::scope::BuildScope;
use crate::tree::{Node, NodeClass, Property};

/// File names consumed by the directory that contains them.
const RESERVED_NAMES: [&str; 4] = [
  "init.lua",
  "init.server.lua",
  "init.client.lua",
  "init.meta.json",
];

#[derive(Deserialize)]
struct Metadata {
  #[serde(rename = "className")]
  class_name: Option<String>,
  properties: Option<BTreeMap<String, Property>>,
}

/// One node of a `*.model.json` description. Children without a name fall
/// back to their class name.
#[derive(Deserialize)]
struct ModelNode {
  #[serde(rename = "className")]
  class_name: String,
  name: Option<String>,
  properties: Option<BTreeMap<String, Property>>,
  children: Option<Vec<ModelNode>>,
}

pub(crate) fn build_directory(scope: &BuildScope, dir: &Path) -> Result<Node> {
  let dir_name = node_name(dir);
  let meta_path = dir.join("init.meta.json");

  let node = if let Some((init_path, class)) = locate_init(dir) {
    let node = Node::new(&dir_name, class);
    scope.track(&node, &init_path)?;
    if meta_path.is_file() {
      apply_metadata(&node, &meta_path)?;
    }
    node
  } else if meta_path.is_file() {
    folder_from_metadata(&meta_path, &dir_name)?
  } else {
    Node::new(&dir_name, NodeClass::Folder)
  };

  let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
  entries.sort_by_key(|entry| entry.file_name());

  for entry in entries {
    let path = entry.path();
    let file_name = entry.file_name().to_string_lossy().into_owned();
    if RESERVED_NAMES.contains(&file_name.as_str()) {
      continue;
    }
    if path.is_dir() {
      let child = build_directory(scope, &path)?;
      node.add_child(&child);
    } else if let Some(child) = build_file(scope, &path)? {
      node.add_child(&child);
    }
  }

  Ok(node)
}

fn build_file(scope: &BuildScope, path: &Path) -> Result<Option<Node>> {
  let file_name = match path.file_name().and_then(|name| name.to_str()) {
    Some(name) => name.to_string(),
    None => return Ok(None),
  };

  if let Some((class, stem)) = script_class(&file_name) {
    let node = Node::new(stem, class);
    scope.track(&node, path)?;
    let meta_path = path.with_file_name(format!("{stem}.meta.json"));
    if meta_path.is_file() {
      apply_metadata(&node, &meta_path)?;
    }
    return Ok(Some(node));
  }

  if file_name.ends_with(".meta.json") {
    // Applied by the owning script or directory, never a node of its own.
    return Ok(None);
  }

  if let Some(stem) = file_name.strip_suffix(".model.json") {
    return Ok(Some(model_node(path, stem)?));
  }

  if file_name.ends_with(".project.json") {
    warn!(path = %path.display(), "project files are not supported; skipping");
    return Ok(None);
  }

  if let Some(stem) = file_name.strip_suffix(".json") {
    let node = Node::new(stem, NodeClass::ModuleScript);
    let unit = scope.track(&node, path)?;
    let source = path.to_path_buf();
    unit.set_executor(move |lua| {
      let text = fs::read_to_string(&source).map_err(LuaError::external)?;
      let value: serde_json::Value = serde_json::from_str(&text).map_err(LuaError::external)?;
      lua.to_value(&value)
    })?;
    return Ok(Some(node));
  }

  if let Some(stem) = file_name.strip_suffix(".txt") {
    let node = Node::new(stem, NodeClass::StringValue);
    node.set_property("Value", Property::String(fs::read_to_string(path)?));
    return Ok(Some(node));
  }

  if let Some(stem) = file_name.strip_suffix(".csv") {
    let node = Node::new(stem, NodeClass::LocalizationTable);
    node.set_property("Contents", Property::String(fs::read_to_string(path)?));
    return Ok(Some(node));
  }

  warn!(path = %path.display(), "skipping file with unrecognized extension");
  Ok(None)
}

/// Map a script file name to its node class and trimmed name. Multi-dot
/// stems keep their extended name (`foo.spec.lua` becomes `foo.spec`).
fn script_class(file_name: &str) -> Option<(NodeClass, &str)> {
  if let Some(stem) = file_name.strip_suffix(".server.lua") {
    Some((NodeClass::ServerScript, stem))
  } else if let Some(stem) = file_name.strip_suffix(".client.lua") {
    Some((NodeClass::ClientScript, stem))
  } else if let Some(stem) = file_name.strip_suffix(".lua") {
    Some((NodeClass::ModuleScript, stem))
  } else {
    None
  }
}

fn locate_init(dir: &Path) -> Option<(PathBuf, NodeClass)> {
  [
    ("init.lua", NodeClass::ModuleScript),
    ("init.server.lua", NodeClass::ServerScript),
    ("init.client.lua", NodeClass::ClientScript),
  ]
  .into_iter()
  .map(|(name, class)| (dir.join(name), class))
  .find(|(path, _)| path.is_file())
}

/// Apply a metadata file to an existing node. The node's class is already
/// fixed by its source file, so a `className` here is fatal.
fn apply_metadata(node: &Node, path: &Path) -> Result<()> {
  let metadata = read_metadata(path)?;
  if metadata.class_name.is_some() {
    return Err(Error::ClassOverride {
      path: path.to_path_buf(),
    });
  }
  apply_properties(node, metadata.properties);
  Ok(())
}

/// Build a directory node from `init.meta.json` alone. Only here may the
/// metadata choose the class, since the directory would otherwise be a
/// plain Folder.
fn folder_from_metadata(path: &Path, name: &str) -> Result<Node> {
  let metadata = read_metadata(path)?;
  let class = metadata
    .class_name
    .as_deref()
    .map(NodeClass::from_name)
    .unwrap_or(NodeClass::Folder);
  let node = Node::new(name, class);
  apply_properties(&node, metadata.properties);
  Ok(node)
}

fn apply_properties(node: &Node, properties: Option<BTreeMap<String, Property>>) {
  if let Some(properties) = properties {
    for (name, value) in properties {
      node.set_property(name, value);
    }
  }
}

fn read_metadata(path: &Path) -> Result<Metadata> {
  let text = fs::read_to_string(path)?;
  serde_json::from_str(&text).map_err(|err| Error::Metadata {
    path: path.to_path_buf(),
    message: err.to_string(),
  })
}

fn model_node(path: &Path, name: &str) -> Result<Node> {
  let text = fs::read_to_string(path)?;
  let model: ModelNode = serde_json::from_str(&text).map_err(|err| Error::Metadata {
    path: path.to_path_buf(),
    message: err.to_string(),
  })?;
  Ok(instantiate_model(&model, name))
}

fn instantiate_model(model: &ModelNode, fallback_name: &str) -> Node {
  let name = model.name.as_deref().unwrap_or(fallback_name);
  let node = Node::new(name, NodeClass::from_name(&model.class_name));
  if let Some(properties) = &model.properties {
    for (key, value) in properties {
      node.set_property(key.clone(), value.clone());
    }
  }
  if let Some(children) = &model.children {
    for child in children {
      let built = instantiate_model(child, &child.class_name);
      node.add_child(&built);
    }
  }
  node
}

fn node_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}
