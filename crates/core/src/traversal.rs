//! Resolve traversal path segments to stored objects or view names.
//!
//! Traversal checks objects before views. A segment that does not look like
//! an id, fails to parse, or names no stored object is handed back as a view
//! name so the caller can continue with view resolution. Only storage
//! failures are reported as errors.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{AppConfig, MapperKind};
use crate::errors::LookupError;
use crate::mapper::{Base64UuidMapper, IdMapper, Mapper, MapperOverrides, ObjectId};

/// Point lookup of a stored object by one of its attributes.
pub trait ObjectLookup {
    type Object;

    /// Find the object whose `attribute` equals `id`.
    ///
    /// Returns `Ok(None)` when no such object exists.
    fn lookup(&self, attribute: &str, id: &ObjectId) -> Result<Option<Self::Object>, LookupError>;
}

/// Outcome of resolving one path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    /// The segment named a stored object.
    Object(T),
    /// The segment should be resolved as a view name.
    View(String),
}

impl<T> Resolved<T> {
    pub fn object(self) -> Option<T> {
        match self {
            Self::Object(obj) => Some(obj),
            Self::View(_) => None,
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self, Self::View(_))
    }
}

/// Resolve `segment` against `lookup` using `mapper`.
pub fn resolve_segment<L>(
    mapper: &dyn Mapper,
    lookup: &L,
    segment: &str,
) -> Result<Resolved<L::Object>, LookupError>
where
    L: ObjectLookup + ?Sized,
{
    if !mapper.is_id(segment) {
        debug!(segment, "segment does not look like an id");
        return Ok(Resolved::View(segment.to_string()));
    }

    let id = match mapper.get_id_from_path(segment) {
        Ok(id) => id,
        Err(e) if e.is_malformed() => {
            debug!(segment, error = %e, "malformed id, falling through to views");
            return Ok(Resolved::View(segment.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    match lookup.lookup(mapper.mapping_attribute(), &id)? {
        Some(obj) => Ok(Resolved::Object(obj)),
        None => {
            debug!(segment, %id, "no object for id, falling through to views");
            Ok(Resolved::View(segment.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Mapper selection per resource type, fixed at configuration time.
#[derive(Debug, Clone, Default)]
pub struct MapperRegistry {
    mappers: BTreeMap<String, Arc<dyn Mapper>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one mapper per `[resources.*]` entry of the configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();
        for (name, resource) in &config.resources {
            let mut overrides = MapperOverrides::new();
            if let Some(attr) = &resource.mapping_attribute {
                overrides = overrides.mapping_attribute(attr.clone());
            }
            let mapper: Arc<dyn Mapper> = match resource.mapper {
                MapperKind::Id => Arc::new(IdMapper::with_overrides(overrides)),
                MapperKind::Base64Uuid => Arc::new(Base64UuidMapper::with_overrides(overrides)),
            };
            info!(
                resource = %name,
                kind = ?resource.mapper,
                attribute = mapper.mapping_attribute(),
                "registered mapper"
            );
            registry.mappers.insert(name.clone(), mapper);
        }
        registry
    }

    /// Register (or replace) the mapper for `resource`.
    pub fn register(&mut self, resource: impl Into<String>, mapper: Arc<dyn Mapper>) {
        self.mappers.insert(resource.into(), mapper);
    }

    pub fn get(&self, resource: &str) -> Result<&Arc<dyn Mapper>, LookupError> {
        self.mappers
            .get(resource)
            .ok_or_else(|| LookupError::UnknownResource(resource.to_string()))
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.mappers.keys().map(String::as_str)
    }
}
