//! Map URL traversal path segments to database object ids and vice versa.
//!
//! A [`Mapper`] is configured once per resource type and is immutable
//! afterwards. Two variants ship:
//!
//! - [`IdMapper`] maps the integer `id` attribute to its decimal string and
//!   can tell numeric segments from view names by shape alone.
//! - [`Base64UuidMapper`] maps the `uuid` attribute to a 22-character slug
//!   (see [`crate::slug`]). Slugs cannot be told apart from view names, so
//!   every segment is tried as an object id first and a miss must fall
//!   through to view resolution (see [`crate::traversal::resolve_segment`]).
//!   This always-lookup behaviour is a known compromise and may change.
//!
//! Every behaviour of a variant can be replaced at construction time through
//! [`MapperOverrides`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::MapperError;
use crate::slug;

// ---------------------------------------------------------------------------
// Identifier values
// ---------------------------------------------------------------------------

/// The typed value of a mapping attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl ObjectId {
    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Uuid(_) => "uuid",
            Self::Text(_) => "text",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Uuid(u) => write!(f, "{}", u),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ObjectId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<Uuid> for ObjectId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// A domain object that exposes named identifier attributes.
pub trait Mapped {
    /// Value of the named attribute, or `None` if the object has no such
    /// attribute or it is null.
    fn attribute(&self, name: &str) -> Option<ObjectId>;
}

// ---------------------------------------------------------------------------
// Mapper interface
// ---------------------------------------------------------------------------

/// Translate an attribute value into a URL path segment.
pub type ToPathFn = Arc<dyn Fn(&ObjectId) -> Result<String, MapperError> + Send + Sync>;

/// Parse a URL path segment back into an attribute value.
pub type ToIdFn = Arc<dyn Fn(&str) -> Result<ObjectId, MapperError> + Send + Sync>;

/// Decide whether a path segment should be looked up as an object at all.
pub type IsIdFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Mapping interface used by traversal.
pub trait Mapper: Send + Sync + fmt::Debug {
    /// Name of the object attribute holding the canonical identifier.
    fn mapping_attribute(&self) -> &str;

    /// Map a database object to a traversable URL path segment.
    fn get_path_from_object(&self, obj: &dyn Mapped) -> Result<String, MapperError>;

    /// Map a traversable path segment to a database object id.
    fn get_id_from_path(&self, path: &str) -> Result<ObjectId, MapperError>;

    /// Whether `path` should be treated as a candidate object id.
    ///
    /// This is a heuristic. It never fails, and a `true` answer does not
    /// guarantee that [`get_id_from_path`](Self::get_id_from_path) succeeds.
    fn is_id(&self, path: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Construction-time replacements for a mapper's default behaviours.
///
/// Unset fields keep the variant's default. A blank attribute name counts
/// as unset.
#[derive(Clone, Default)]
pub struct MapperOverrides {
    mapping_attribute: Option<String>,
    transform_to_path: Option<ToPathFn>,
    transform_to_id: Option<ToIdFn>,
    is_id: Option<IsIdFn>,
}

impl MapperOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mapping_attribute(mut self, name: impl Into<String>) -> Self {
        self.mapping_attribute = Some(name.into());
        self
    }

    pub fn transform_to_path<F>(mut self, f: F) -> Self
    where
        F: Fn(&ObjectId) -> Result<String, MapperError> + Send + Sync + 'static,
    {
        self.transform_to_path = Some(Arc::new(f));
        self
    }

    pub fn transform_to_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<ObjectId, MapperError> + Send + Sync + 'static,
    {
        self.transform_to_id = Some(Arc::new(f));
        self
    }

    pub fn is_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.is_id = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for MapperOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperOverrides")
            .field("mapping_attribute", &self.mapping_attribute)
            .field("transform_to_path", &self.transform_to_path.is_some())
            .field("transform_to_id", &self.transform_to_id.is_some())
            .field("is_id", &self.is_id.is_some())
            .finish()
    }
}

/// The four behaviours shared by every attribute-backed mapper.
#[derive(Clone)]
struct MappingRules {
    mapping_attribute: String,
    transform_to_path: ToPathFn,
    transform_to_id: ToIdFn,
    is_id: IsIdFn,
}

impl MappingRules {
    fn apply(mut self, overrides: MapperOverrides) -> Self {
        if let Some(name) = overrides.mapping_attribute.filter(|n| !n.trim().is_empty()) {
            self.mapping_attribute = name;
        }
        if let Some(f) = overrides.transform_to_path {
            self.transform_to_path = f;
        }
        if let Some(f) = overrides.transform_to_id {
            self.transform_to_id = f;
        }
        if let Some(f) = overrides.is_id {
            self.is_id = f;
        }
        self
    }

    fn path_from_object(&self, obj: &dyn Mapped) -> Result<String, MapperError> {
        let value = obj
            .attribute(&self.mapping_attribute)
            .ok_or_else(|| MapperError::MissingAttribute {
                attribute: self.mapping_attribute.clone(),
            })?;
        let path = (self.transform_to_path)(&value)?;
        debug!(attribute = %self.mapping_attribute, %value, %path, "mapped object to path");
        Ok(path)
    }

    fn id_from_path(&self, path: &str) -> Result<ObjectId, MapperError> {
        let id = (self.transform_to_id)(path)?;
        debug!(attribute = %self.mapping_attribute, path, %id, "mapped path to id");
        Ok(id)
    }
}

impl fmt::Debug for MappingRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRules")
            .field("mapping_attribute", &self.mapping_attribute)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Integer id variant
// ---------------------------------------------------------------------------

/// Map objects to URLs through their integer `id` attribute.
#[derive(Debug, Clone)]
pub struct IdMapper {
    rules: MappingRules,
}

impl IdMapper {
    /// Default attribute name for this variant.
    pub const MAPPING_ATTRIBUTE: &'static str = "id";

    pub fn new() -> Self {
        Self {
            rules: MappingRules {
                mapping_attribute: Self::MAPPING_ATTRIBUTE.to_string(),
                transform_to_path: Arc::new(integer_to_path),
                transform_to_id: Arc::new(integer_from_path),
                is_id: Arc::new(looks_like_integer),
            },
        }
    }

    pub fn with_overrides(overrides: MapperOverrides) -> Self {
        let mapper = Self::new();
        Self {
            rules: mapper.rules.apply(overrides),
        }
    }
}

impl Default for IdMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// True iff `path` is non-empty and consists of ASCII digits only.
pub fn looks_like_integer(path: &str) -> bool {
    !path.is_empty() && path.bytes().all(|b| b.is_ascii_digit())
}

fn integer_to_path(value: &ObjectId) -> Result<String, MapperError> {
    match value {
        ObjectId::Int(n) => Ok(n.to_string()),
        other => Err(MapperError::UnexpectedKind {
            expected: "integer",
            found: other.kind(),
        }),
    }
}

fn integer_from_path(path: &str) -> Result<ObjectId, MapperError> {
    path.parse::<i64>()
        .map(ObjectId::Int)
        .map_err(|e| MapperError::MalformedIdentifier {
            kind: "integer",
            value: path.to_string(),
            detail: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// UUID slug variant
// ---------------------------------------------------------------------------

/// Map objects to URLs through their `uuid` attribute, rendered as a base64
/// slug.
#[derive(Debug, Clone)]
pub struct Base64UuidMapper {
    rules: MappingRules,
}

impl Base64UuidMapper {
    /// Default attribute name for this variant.
    pub const MAPPING_ATTRIBUTE: &'static str = "uuid";

    pub fn new() -> Self {
        Self {
            rules: MappingRules {
                mapping_attribute: Self::MAPPING_ATTRIBUTE.to_string(),
                transform_to_path: Arc::new(uuid_to_path),
                transform_to_id: Arc::new(uuid_from_path),
                // Slugs are indistinguishable from view names.
                is_id: Arc::new(|_: &str| true),
            },
        }
    }

    pub fn with_overrides(overrides: MapperOverrides) -> Self {
        let mapper = Self::new();
        Self {
            rules: mapper.rules.apply(overrides),
        }
    }
}

impl Default for Base64UuidMapper {
    fn default() -> Self {
        Self::new()
    }
}

fn uuid_to_path(value: &ObjectId) -> Result<String, MapperError> {
    match value {
        ObjectId::Uuid(u) => Ok(slug::uuid_to_slug(u)),
        other => Err(MapperError::UnexpectedKind {
            expected: "uuid",
            found: other.kind(),
        }),
    }
}

fn uuid_from_path(path: &str) -> Result<ObjectId, MapperError> {
    slug::slug_to_uuid(path).map(ObjectId::Uuid)
}

/// Implements [`Mapper`] for a variant by delegating to its `rules` field.
macro_rules! rules_backed_mapper {
    ($($variant:ty),+ $(,)?) => {$(
        impl Mapper for $variant {
            fn mapping_attribute(&self) -> &str {
                &self.rules.mapping_attribute
            }

            fn get_path_from_object(&self, obj: &dyn Mapped) -> Result<String, MapperError> {
                self.rules.path_from_object(obj)
            }

            fn get_id_from_path(&self, path: &str) -> Result<ObjectId, MapperError> {
                self.rules.id_from_path(path)
            }

            fn is_id(&self, path: &str) -> bool {
                (self.rules.is_id)(path)
            }
        }
    )+};
}

rules_backed_mapper!(IdMapper, Base64UuidMapper);

#[cfg(test)]
mod tests {
    use super::*;

    struct Record {
        id: Option<i64>,
        uuid: Uuid,
        external_ref: Option<i64>,
    }

    impl Record {
        fn with_id(id: i64) -> Self {
            Self {
                id: Some(id),
                uuid: Uuid::new_v4(),
                external_ref: None,
            }
        }
    }

    impl Mapped for Record {
        fn attribute(&self, name: &str) -> Option<ObjectId> {
            match name {
                "id" => self.id.map(ObjectId::Int),
                "uuid" => Some(ObjectId::Uuid(self.uuid)),
                "external_ref" => self.external_ref.map(ObjectId::Int),
                _ => None,
            }
        }
    }

    #[test]
    fn test_integer_round_trip() {
        let mapper = IdMapper::new();
        for n in [0, 1, 7, 42, 1_000_000, i64::MAX] {
            let path = mapper.get_path_from_object(&Record::with_id(n)).unwrap();
            assert_eq!(path, n.to_string());
            assert_eq!(mapper.get_id_from_path(&path).unwrap(), ObjectId::Int(n));
        }
    }

    #[test]
    fn test_uuid_round_trip() {
        let mapper = Base64UuidMapper::new();
        for _ in 0..16 {
            let record = Record::with_id(1);
            let path = mapper.get_path_from_object(&record).unwrap();
            assert_eq!(path.len(), slug::SLUG_LEN);
            assert_eq!(
                mapper.get_id_from_path(&path).unwrap(),
                ObjectId::Uuid(record.uuid)
            );
        }
    }

    #[test]
    fn test_integer_is_id_heuristic() {
        let mapper = IdMapper::new();
        assert!(mapper.is_id("123"));
        assert!(mapper.is_id("0"));
        assert!(!mapper.is_id("abc"));
        assert!(!mapper.is_id(""));
        assert!(!mapper.is_id("12a"));
        assert!(!mapper.is_id("-1"));
        assert!(!mapper.is_id("١٢٣"));
    }

    #[test]
    fn test_uuid_is_id_always_true() {
        let mapper = Base64UuidMapper::new();
        for path in ["", "edit", "show", "not a uuid", "123", "AAAAAAAAAAAAAAAAAAAAAA"] {
            assert!(mapper.is_id(path), "{path:?}");
        }
    }

    #[test]
    fn test_integer_parse_failure_is_an_error() {
        let mapper = IdMapper::new();
        let err = mapper.get_id_from_path("abc").unwrap_err();
        assert!(matches!(err, MapperError::MalformedIdentifier { kind: "integer", .. }));

        // Digits that overflow pass the heuristic but still fail to parse.
        let huge = "99999999999999999999";
        assert!(mapper.is_id(huge));
        assert!(mapper.get_id_from_path(huge).unwrap_err().is_malformed());
    }

    #[test]
    fn test_missing_attribute() {
        let mapper = IdMapper::new();
        let record = Record {
            id: None,
            uuid: Uuid::new_v4(),
            external_ref: None,
        };
        let err = mapper.get_path_from_object(&record).unwrap_err();
        assert_eq!(
            err,
            MapperError::MissingAttribute {
                attribute: "id".into()
            }
        );
    }

    #[test]
    fn test_mapping_attribute_override() {
        let mapper =
            IdMapper::with_overrides(MapperOverrides::new().mapping_attribute("external_ref"));
        assert_eq!(mapper.mapping_attribute(), "external_ref");

        let record = Record {
            id: Some(1),
            uuid: Uuid::new_v4(),
            external_ref: Some(9001),
        };
        assert_eq!(mapper.get_path_from_object(&record).unwrap(), "9001");

        // The default mapper keeps reading `id`.
        assert_eq!(IdMapper::new().get_path_from_object(&record).unwrap(), "1");
    }

    #[test]
    fn test_empty_attribute_override_keeps_default() {
        let mapper = Base64UuidMapper::with_overrides(MapperOverrides::new().mapping_attribute(""));
        assert_eq!(mapper.mapping_attribute(), "uuid");
    }

    #[test]
    fn test_whitespace_attribute_override_keeps_default() {
        for blank in [" ", "\t", "  \n"] {
            let mapper = IdMapper::with_overrides(MapperOverrides::new().mapping_attribute(blank));
            assert_eq!(mapper.mapping_attribute(), IdMapper::MAPPING_ATTRIBUTE, "{blank:?}");
            assert_eq!(mapper.get_path_from_object(&Record::with_id(3)).unwrap(), "3");
        }
    }

    #[test]
    fn test_variants_share_rule_delegation() {
        let overrides = MapperOverrides::new()
            .mapping_attribute("external_ref")
            .transform_to_path(|v| Ok(format!("ref-{}", v)))
            .transform_to_id(|p| Ok(ObjectId::Text(p.to_string())))
            .is_id(|p| p.starts_with("ref-"));
        let record = Record {
            id: Some(1),
            uuid: Uuid::new_v4(),
            external_ref: Some(77),
        };

        let mappers: [Box<dyn Mapper>; 2] = [
            Box::new(IdMapper::with_overrides(overrides.clone())),
            Box::new(Base64UuidMapper::with_overrides(overrides)),
        ];
        for mapper in &mappers {
            assert_eq!(mapper.mapping_attribute(), "external_ref");
            assert_eq!(mapper.get_path_from_object(&record).unwrap(), "ref-77");
            assert_eq!(mapper.get_id_from_path("ref-77").unwrap(), ObjectId::from("ref-77"));
            assert!(mapper.is_id("ref-77"));
            assert!(!mapper.is_id("77"));
        }
    }

    #[test]
    fn test_transform_overrides() {
        let mapper = IdMapper::with_overrides(
            MapperOverrides::new()
                .transform_to_path(|v| Ok(format!("item-{}", v)))
                .transform_to_id(|p| {
                    let raw = p.strip_prefix("item-").unwrap_or(p);
                    raw.parse::<i64>()
                        .map(ObjectId::Int)
                        .map_err(|e| MapperError::MalformedIdentifier {
                            kind: "item",
                            value: p.to_string(),
                            detail: e.to_string(),
                        })
                })
                .is_id(|p| p.starts_with("item-")),
        );

        let path = mapper.get_path_from_object(&Record::with_id(5)).unwrap();
        assert_eq!(path, "item-5");
        assert!(mapper.is_id(&path));
        assert!(!mapper.is_id("5"));
        assert_eq!(mapper.get_id_from_path(&path).unwrap(), ObjectId::Int(5));
    }

    #[test]
    fn test_wrong_value_kind() {
        struct Named;
        impl Mapped for Named {
            fn attribute(&self, _: &str) -> Option<ObjectId> {
                Some(ObjectId::Text("alice".into()))
            }
        }

        let err = IdMapper::new().get_path_from_object(&Named).unwrap_err();
        assert_eq!(
            err,
            MapperError::UnexpectedKind {
                expected: "integer",
                found: "text"
            }
        );
        assert!(Base64UuidMapper::new().get_path_from_object(&Named).is_err());
    }

    #[test]
    fn test_mappers_shared_across_threads() {
        let mapper: Arc<dyn Mapper> = Arc::new(IdMapper::new());
        std::thread::scope(|s| {
            for n in 0..8i64 {
                let mapper = Arc::clone(&mapper);
                s.spawn(move || {
                    let path = mapper.get_path_from_object(&Record::with_id(n)).unwrap();
                    assert_eq!(mapper.get_id_from_path(&path).unwrap().as_int(), Some(n));
                });
            }
        });
    }

    #[test]
    fn test_object_id_accessors() {
        let u = Uuid::new_v4();
        assert_eq!(ObjectId::from(3).as_int(), Some(3));
        assert_eq!(ObjectId::from(u).as_uuid(), Some(u));
        assert_eq!(ObjectId::from("bob").as_text(), Some("bob"));
        assert_eq!(ObjectId::from(3).as_uuid(), None);
        assert_eq!(ObjectId::Int(12).to_string(), "12");
    }
}
