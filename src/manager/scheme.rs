//! Registry of resource types the manager's controllers may use.

use std::collections::BTreeMap;

use kube::Resource;

use super::error::SchemeError;

/// A registered resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub api_version: String,
    pub kind: String,
    pub plural: String,
}

/// Maps `apiVersion/kind` to the registered type
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    types: BTreeMap<String, TypeInfo>,
}

fn type_key(api_version: &str, kind: &str) -> String {
    format!("{api_version}/{kind}")
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a statically typed resource.
    ///
    /// Returns `Ok(false)` when the identical type was already registered.
    pub fn add<K>(&mut self) -> Result<bool, SchemeError>
    where
        K: Resource<DynamicType = ()>,
    {
        self.add_type(TypeInfo {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
        })
    }

    /// Register a type by its descriptor
    pub fn add_type(&mut self, info: TypeInfo) -> Result<bool, SchemeError> {
        let key = type_key(&info.api_version, &info.kind);
        match self.types.get(&key) {
            Some(existing) if *existing == info => Ok(false),
            Some(existing) => Err(SchemeError::Conflict {
                api_version: info.api_version,
                kind: info.kind,
                existing: existing.plural.clone(),
                requested: info.plural,
            }),
            None => {
                self.types.insert(key, info);
                Ok(true)
            }
        }
    }

    /// Whether the scheme knows resource type `K`
    pub fn recognizes<K>(&self) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        self.recognizes_kind(&K::api_version(&()), &K::kind(&()))
    }

    pub fn recognizes_kind(&self, api_version: &str, kind: &str) -> bool {
        self.types.contains_key(&type_key(api_version, kind))
    }

    /// Registered types in `apiVersion/kind` order
    pub fn types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
