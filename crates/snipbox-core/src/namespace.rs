//! Session namespaces and the persistent namespace store.
//!
//! A [`Namespace`] is plain data: bindings that crossed the process boundary
//! in serialized form, plus a module registry mapping aliases to import
//! paths. Live interpreter objects never leave a worker.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Prefix of the placeholder stored for values that could not be serialized.
pub const UNSERIALIZABLE_PREFIX: &str = "<unserializable>: ";

/// Names the interpreter reserves for itself (`__builtins__`, `__name__`, ...).
pub fn is_reserved(name: &str) -> bool {
    name.len() >= 4 && name.starts_with("__") && name.ends_with("__")
}

/// A namespace value in transferable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// A value that round-trips through JSON unchanged.
    Json(serde_json::Value),
    /// A picklable value with no faithful JSON form. Opaque to the host.
    Pickled(PickledValue),
}

/// Pickle payload for a value that is not JSON-representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickledValue {
    /// Python type name, e.g. `DataFrame` or `tuple`.
    pub type_name: String,
    /// Raw pickle bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// `repr()` of the value at the time it was captured.
    pub repr: String,
}

impl Value {
    /// The JSON form, if this is a JSON value.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(value) => Some(value),
            Value::Pickled(_) => None,
        }
    }

    /// True for the placeholder the worker emits for unserializable values.
    pub fn is_placeholder(&self) -> bool {
        match self {
            Value::Json(serde_json::Value::String(s)) => s.starts_with(UNSERIALIZABLE_PREFIX),
            _ => false,
        }
    }

    /// Short human-readable rendering for listings.
    pub fn display(&self) -> String {
        match self {
            Value::Json(serde_json::Value::String(s)) => s.clone(),
            Value::Json(value) => value.to_string(),
            Value::Pickled(pickled) => pickled.repr.clone(),
        }
    }
}

macro_rules! impl_from_json {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Json(value.into())
                }
            }
        )*
    };
}

impl_from_json!(serde_json::Value, bool, i32, i64, u64, f64, String, &str);

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Name → value mapping plus the module registry (alias → import path).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    bindings: BTreeMap<String, Value>,
    modules: BTreeMap<String, String>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// True if `name` is bound, either as a value or as a module alias.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name) || self.modules.contains_key(name)
    }

    /// Bind a value. Reserved names are ignored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        if !is_reserved(&name) {
            self.bindings.insert(name, value.into());
        }
    }

    /// Register a module alias. Reserved names are ignored.
    pub fn insert_module(&mut self, alias: impl Into<String>, path: impl Into<String>) {
        let alias = alias.into();
        if !is_reserved(&alias) {
            self.modules.insert(alias, path.into());
        }
    }

    /// All value bindings.
    pub fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    /// The module registry.
    pub fn modules(&self) -> &BTreeMap<String, String> {
        &self.modules
    }

    /// Every bound name (values and module aliases).
    pub fn keys(&self) -> BTreeSet<String> {
        self.bindings
            .keys()
            .chain(self.modules.keys())
            .cloned()
            .collect()
    }

    /// Number of bindings, module aliases included.
    pub fn len(&self) -> usize {
        self.bindings.len() + self.modules.len()
    }

    /// True if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.modules.is_empty()
    }

    /// Merge a delta into this namespace.
    ///
    /// Module aliases win over value bindings of the same name, matching the
    /// worker's rule that a module is never inlined as a value.
    pub fn merge(&mut self, delta: &BTreeMap<String, Value>, modules: &BTreeMap<String, String>) {
        for (name, value) in delta {
            if !modules.contains_key(name) {
                self.modules.remove(name);
                self.insert(name.clone(), value.clone());
            }
        }
        for (alias, path) in modules {
            self.bindings.remove(alias);
            self.insert_module(alias.clone(), path.clone());
        }
    }

    /// Drop module aliases that import `package` or one of its submodules.
    ///
    /// Returns the removed aliases.
    pub fn purge_package(&mut self, package: &str) -> Vec<String> {
        let submodule_prefix = format!("{}.", package);
        let doomed: Vec<String> = self
            .modules
            .iter()
            .filter(|(_, path)| path.as_str() == package || path.starts_with(&submodule_prefix))
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in &doomed {
            self.modules.remove(alias);
        }
        doomed
    }
}

/// Owner of the persistent namespace.
///
/// Only the supervisor writes here, and only after a successful run that
/// asked for persistence. Workers get snapshot copies, never a reference.
#[derive(Debug, Default)]
pub struct NamespaceStore {
    persistent: Namespace,
}

impl NamespaceStore {
    /// Create a store with an empty persistent namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the persistent namespace.
    pub fn get_persistent(&self) -> &Namespace {
        &self.persistent
    }

    /// Copy of the persistent namespace to hand to a worker.
    pub fn snapshot(&self) -> Namespace {
        self.persistent.clone()
    }

    /// Forget every persisted binding and module alias.
    pub fn reset(&mut self) {
        tracing::debug!(
            "Resetting persistent namespace ({} entries)",
            self.persistent.len()
        );
        self.persistent = Namespace::new();
    }

    /// Merge the outcome of a successful persistent run.
    pub(crate) fn commit(
        &mut self,
        delta: &BTreeMap<String, Value>,
        modules: &BTreeMap<String, String>,
    ) {
        self.persistent.merge(delta, modules);
    }

    /// Remove registry aliases for an uninstalled package.
    pub(crate) fn purge_package(&mut self, package: &str) -> Vec<String> {
        self.persistent.purge_package(package)
    }
}
