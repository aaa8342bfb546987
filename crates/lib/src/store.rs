//! Named, lazily-created registries shared across the process.
//!
//! `Stores` is the context object threaded through [`Runtime`](crate::Runtime)
//! construction. Every registry lives behind a name; the first access under a
//! name creates the store, and later accesses return the same instance. There
//! are no process-global statics: callers that want shared state share the
//! `Stores` value itself.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// A named store is a shared `HashMap` behind interior mutability.
pub type Store<K, V> = Rc<RefCell<HashMap<K, V>>>;

/// Process-wide registry table plus the build-scope id counter.
pub struct Stores {
  scopes: Cell<u64>,
  stores: RefCell<HashMap<String, Rc<dyn Any>>>,
}

impl Stores {
  pub fn new() -> Self {
    Self {
      scopes: Cell::new(0),
      stores: RefCell::new(HashMap::new()),
    }
  }

  /// Return the store registered under `name`, creating it on first access.
  ///
  /// Repeated calls with the same name return the same instance. Re-using a
  /// name at a different key/value type violates a caller invariant and
  /// panics.
  pub fn get_store<K: 'static, V: 'static>(&self, name: &str) -> Store<K, V> {
    let mut stores = self.stores.borrow_mut();
    let entry = stores
      .entry(name.to_string())
      .or_insert_with(|| Rc::new(RefCell::new(HashMap::<K, V>::new())) as Rc<dyn Any>);

    entry
      .clone()
      .downcast::<RefCell<HashMap<K, V>>>()
      .unwrap_or_else(|_| panic!("store '{name}' is already registered with a different type"))
  }

  /// Allocate the next build-scope id. Ids are monotonic and never reused,
  /// including for scopes that are dropped without deploying.
  pub fn next_scope(&self) -> u64 {
    let id = self.scopes.get();
    self.scopes.set(id + 1);
    id
  }
}

impl Default for Stores {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_name_returns_same_store() {
    let stores = Stores::new();
    let a = stores.get_store::<String, u32>("units");
    let b = stores.get_store::<String, u32>("units");

    a.borrow_mut().insert("x".to_string(), 1);
    assert_eq!(b.borrow().get("x"), Some(&1));
    assert!(Rc::ptr_eq(&a, &b));
  }

  #[test]
  fn distinct_names_are_independent() {
    let stores = Stores::new();
    let a = stores.get_store::<String, u32>("first");
    let b = stores.get_store::<String, u32>("second");

    a.borrow_mut().insert("x".to_string(), 1);
    assert!(b.borrow().is_empty());
  }

  #[test]
  fn scope_ids_are_monotonic() {
    let stores = Stores::new();
    assert_eq!(stores.next_scope(), 0);
    assert_eq!(stores.next_scope(), 1);
    assert_eq!(stores.next_scope(), 2);
  }

  #[test]
  #[should_panic(expected = "different type")]
  fn reusing_a_name_at_another_type_panics() {
    let stores = Stores::new();
    let _ = stores.get_store::<String, u32>("clash");
    let _ = stores.get_store::<u32, String>("clash");
  }
}
