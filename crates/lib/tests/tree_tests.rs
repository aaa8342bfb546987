//! Tests for the directory-to-tree builder.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use lattice_lib::{BuildScope, NodeClass, Property, Runtime};

fn write(dir: &Path, rel: &str, contents: &str) {
  let path = dir.join(rel);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, contents).unwrap();
}

fn scope_for(dir: &Path) -> (Rc<Runtime>, BuildScope) {
  let runtime = Runtime::new().unwrap();
  let scope = runtime.create_scope(dir).unwrap();
  (runtime, scope)
}

#[test]
fn extensions_map_to_classes() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "main.client.lua", "return nil\n");
  write(dir.path(), "boot.server.lua", "return nil\n");
  write(dir.path(), "util.lua", "return {}\n");
  write(dir.path(), "notes.txt", "hello\n");
  write(dir.path(), "strings.csv", "key,value\ngreet,hi\n");
  write(dir.path(), "sub/leaf.lua", "return 1\n");

  let (_runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  assert_eq!(root.class(), NodeClass::Folder);
  assert_eq!(
    root.find_child("main").unwrap().class(),
    NodeClass::ClientScript
  );
  assert_eq!(
    root.find_child("boot").unwrap().class(),
    NodeClass::ServerScript
  );
  assert_eq!(
    root.find_child("util").unwrap().class(),
    NodeClass::ModuleScript
  );

  let notes = root.find_child("notes").unwrap();
  assert_eq!(notes.class(), NodeClass::StringValue);
  assert_eq!(
    notes.property("Value"),
    Some(Property::String("hello\n".to_string()))
  );

  let strings = root.find_child("strings").unwrap();
  assert_eq!(strings.class(), NodeClass::LocalizationTable);
  assert_eq!(
    strings.property("Contents"),
    Some(Property::String("key,value\ngreet,hi\n".to_string()))
  );

  let sub = root.find_child("sub").unwrap();
  assert_eq!(sub.class(), NodeClass::Folder);
  assert!(sub.find_child("leaf").is_some());
}

#[test]
fn multi_dot_stems_keep_their_extended_name() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "util.spec.lua", "return {}\n");

  let (_runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  assert!(root.find_child("util.spec").is_some());
}

#[test]
fn init_scripts_promote_their_directory() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "pkg/init.lua", "return 'pkg'\n");
  write(dir.path(), "pkg/helper.lua", "return {}\n");
  write(dir.path(), "app/init.client.lua", "started = true\n");

  let (runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  let pkg = root.find_child("pkg").unwrap();
  assert_eq!(pkg.class(), NodeClass::ModuleScript);
  assert!(pkg.find_child("helper").is_some());
  // The init file backs the directory node instead of becoming a child.
  assert!(pkg.find_child("init").is_none());

  let app = root.find_child("app").unwrap();
  assert_eq!(app.class(), NodeClass::ClientScript);

  // The promoted node is runnable like any script unit.
  let unit = runtime.unit_for(&pkg).unwrap();
  let value: String = unit
    .run(runtime.lua())
    .unwrap()
    .as_string_lossy()
    .unwrap()
    .to_string();
  assert_eq!(value, "pkg");
}

#[test]
fn init_meta_decorates_plain_directories() {
  let dir = tempfile::tempdir().unwrap();
  write(
    dir.path(),
    "props/init.meta.json",
    r#"{ "properties": { "Level": 3 } }"#,
  );
  write(
    dir.path(),
    "typed/init.meta.json",
    r#"{ "className": "Lighting" }"#,
  );

  let (_runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  let props = root.find_child("props").unwrap();
  assert_eq!(props.class(), NodeClass::Folder);
  assert_eq!(props.property("Level"), Some(Property::Number(3.0)));

  let typed = root.find_child("typed").unwrap();
  assert_eq!(typed.class(), NodeClass::Other("Lighting".to_string()));
}

#[test]
fn class_reassignment_of_a_script_directory_is_fatal() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "pkg/init.client.lua", "return nil\n");
  write(
    dir.path(),
    "pkg/init.meta.json",
    r#"{ "className": "Folder" }"#,
  );

  let (_runtime, scope) = scope_for(dir.path());
  let err = scope.reify(None).unwrap_err();
  assert!(err.to_string().contains("cannot reassign the class"));
}

#[test]
fn sibling_meta_applies_properties_to_scripts() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "mod.lua", "return {}\n");
  write(
    dir.path(),
    "mod.meta.json",
    r#"{ "properties": { "Pinned": true } }"#,
  );

  let (_runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  let node = root.find_child("mod").unwrap();
  assert_eq!(node.class(), NodeClass::ModuleScript);
  assert_eq!(node.property("Pinned"), Some(Property::Bool(true)));
  // The meta file itself never becomes a node.
  assert!(root.find_child("mod.meta").is_none());
}

#[test]
fn sibling_meta_cannot_change_a_script_class() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "mod.lua", "return {}\n");
  write(
    dir.path(),
    "mod.meta.json",
    r#"{ "className": "StringValue" }"#,
  );

  let (_runtime, scope) = scope_for(dir.path());
  let err = scope.reify(None).unwrap_err();
  assert!(err.to_string().contains("cannot reassign the class"));
}

#[test]
fn malformed_metadata_is_reported_with_its_path() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "bad/init.meta.json", "{ not json");

  let (_runtime, scope) = scope_for(dir.path());
  let err = scope.reify(None).unwrap_err();
  let message = err.to_string();
  assert!(message.contains("invalid metadata"), "{message}");
  assert!(message.contains("init.meta.json"), "{message}");
}

#[test]
fn unrecognized_files_are_skipped() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "README.md", "# hi\n");
  write(dir.path(), "util.lua", "return {}\n");

  let (_runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  assert_eq!(root.children().len(), 1);
  assert!(root.find_child("util").is_some());
}

#[test]
fn model_files_build_node_trees() {
  let dir = tempfile::tempdir().unwrap();
  write(
    dir.path(),
    "assets.model.json",
    r#"{
      "className": "Folder",
      "children": [
        { "className": "StringValue", "name": "motd", "properties": { "Value": "welcome" } }
      ]
    }"#,
  );

  let (_runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  let assets = root.find_child("assets").unwrap();
  assert_eq!(assets.class(), NodeClass::Folder);

  let motd = assets.find_child("motd").unwrap();
  assert_eq!(motd.class(), NodeClass::StringValue);
  assert_eq!(
    motd.property("Value"),
    Some(Property::String("welcome".to_string()))
  );
}

#[test]
fn json_modules_decode_on_require() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "config.json", r#"{ "name": "app", "count": 3 }"#);
  write(
    dir.path(),
    "main.lua",
    "local config = require(script.parent:child('config'))\nreturn config.name .. tostring(config.count)\n",
  );

  let (runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  let config = root.find_child("config").unwrap();
  assert_eq!(config.class(), NodeClass::ModuleScript);

  let unit = runtime.unit_for(&root.find_child("main").unwrap()).unwrap();
  let value: String = unit
    .run(runtime.lua())
    .unwrap()
    .as_string_lossy()
    .unwrap()
    .to_string();
  assert_eq!(value, "app3");
}

#[test]
fn reify_attaches_under_a_given_parent() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "util.lua", "return {}\n");

  let (_runtime, scope) = scope_for(dir.path());
  let parent = lattice_lib::Node::new("workspace", NodeClass::Folder);
  let root = scope.reify(Some(&parent)).unwrap();

  assert_eq!(parent.children().len(), 1);
  assert!(root.full_name().starts_with("workspace."));
}

#[test]
fn children_are_visited_in_sorted_order() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "zeta.lua", "return 1\n");
  write(dir.path(), "alpha.lua", "return 1\n");
  write(dir.path(), "mid.lua", "return 1\n");

  let (_runtime, scope) = scope_for(dir.path());
  let root = scope.reify(None).unwrap();

  let names: Vec<String> = root.children().iter().map(|child| child.name()).collect();
  assert_eq!(names, ["alpha", "mid", "zeta"]);
}
