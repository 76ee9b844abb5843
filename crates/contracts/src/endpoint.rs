//! EndpointId - destination partition identity
//!
//! Uses `Arc` internally so cloning a key for the pool, the dispatcher and
//! the record multi-map only bumps a reference count.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::ContractError;

/// URI scheme accepted for metastore addresses
pub const ENDPOINT_URI_SCHEME: &str = "thrift";

#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct EndpointParts {
    metastore_uri: String,
    database: String,
    table: String,
    partition_values: Vec<String>,
}

/// Destination partition in the external streaming store.
///
/// Equality and hashing are structural over all four fields, so two
/// independently decoded records routed to the same partition share a pool
/// entry and a dispatcher lane.
///
/// # Examples
/// ```
/// use contracts::EndpointId;
///
/// let id = EndpointId::new("thrift://meta:9083", "sales", "orders", vec!["eu".into()]).unwrap();
/// assert_eq!(id.table(), "orders");
/// assert_eq!(id.partition_values(), ["eu"]);
/// ```
#[derive(Clone)]
pub struct EndpointId(Arc<EndpointParts>);

impl EndpointId {
    /// Validate and build an endpoint identity
    ///
    /// # Errors
    /// - blank uri / database / table
    /// - uri scheme other than `thrift`
    /// - blank partition value
    pub fn new(
        metastore_uri: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        partition_values: Vec<String>,
    ) -> Result<Self, ContractError> {
        let metastore_uri = metastore_uri.into();
        let database = database.into();
        let table = table.into();
        EndpointFactory::check_triple(&metastore_uri, &database, &table)?;
        let partition_values = EndpointFactory::check_partition_values(&partition_values)?;

        Ok(Self(Arc::new(EndpointParts {
            metastore_uri,
            database,
            table,
            partition_values,
        })))
    }

    /// Metastore address (`thrift://host:port`)
    #[inline]
    pub fn metastore_uri(&self) -> &str {
        &self.0.metastore_uri
    }

    #[inline]
    pub fn database(&self) -> &str {
        &self.0.database
    }

    #[inline]
    pub fn table(&self) -> &str {
        &self.0.table
    }

    /// Ordered partition key values
    #[inline]
    pub fn partition_values(&self) -> &[String] {
        &self.0.partition_values
    }
}

impl PartialEq for EndpointId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for EndpointId {}

impl Hash for EndpointId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}.{}[{}]",
            self.0.metastore_uri,
            self.0.database,
            self.0.table,
            self.0.partition_values.join(",")
        )
    }
}

impl fmt::Debug for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointId({self})")
    }
}

// Serde support
impl Serialize for EndpointId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EndpointId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parts = EndpointParts::deserialize(deserializer)?;
        Self::new(
            parts.metastore_uri,
            parts.database,
            parts.table,
            parts.partition_values,
        )
        .map_err(D::Error::custom)
    }
}

/// Builds endpoints for one fixed (uri, database, table) triple.
///
/// The triple is validated once; per-record calls only validate the
/// partition values.
#[derive(Debug, Clone)]
pub struct EndpointFactory {
    uri: Arc<str>,
    database: Arc<str>,
    table: Arc<str>,
}

impl EndpointFactory {
    /// Create a factory, validating the triple
    pub fn new(
        uri: impl AsRef<str>,
        database: impl AsRef<str>,
        table: impl AsRef<str>,
    ) -> Result<Self, ContractError> {
        let (uri, database, table) = (uri.as_ref(), database.as_ref(), table.as_ref());
        Self::check_triple(uri, database, table)?;
        Ok(Self {
            uri: Arc::from(uri),
            database: Arc::from(database),
            table: Arc::from(table),
        })
    }

    /// Endpoint for the given partition values
    pub fn endpoint_for(&self, partition_values: Vec<String>) -> Result<EndpointId, ContractError> {
        let partition_values = Self::check_partition_values(&partition_values)?;
        Ok(EndpointId(Arc::new(EndpointParts {
            metastore_uri: self.uri.to_string(),
            database: self.database.to_string(),
            table: self.table.to_string(),
            partition_values,
        })))
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether `value` is usable as a partition value (non-blank)
    pub fn is_valid_partition_value(value: &str) -> bool {
        !value.trim().is_empty()
    }

    /// Validate partition values, returning them trimmed
    pub fn check_partition_values(values: &[String]) -> Result<Vec<String>, ContractError> {
        if let Some(pos) = values
            .iter()
            .position(|v| !Self::is_valid_partition_value(v))
        {
            return Err(ContractError::invalid_endpoint(format!(
                "partition values must be all non empty strings (position {pos})"
            )));
        }
        Ok(values.iter().map(|v| v.trim().to_string()).collect())
    }

    fn check_triple(uri: &str, database: &str, table: &str) -> Result<(), ContractError> {
        if uri.trim().is_empty() {
            return Err(ContractError::invalid_endpoint("uri is null or empty"));
        }
        if database.trim().is_empty() {
            return Err(ContractError::invalid_endpoint("db is null or empty"));
        }
        if table.trim().is_empty() {
            return Err(ContractError::invalid_endpoint("table is null or empty"));
        }
        match uri_scheme(uri) {
            Some(scheme) if scheme.eq_ignore_ascii_case(ENDPOINT_URI_SCHEME) => Ok(()),
            scheme => Err(ContractError::invalid_endpoint(format!(
                "unsupported URI scheme {}",
                scheme.unwrap_or("<none>")
            ))),
        }
    }
}

impl fmt::Display for EndpointFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EndpointFactory [uri={}, db={}, table={}]",
            self.uri, self.database, self.table
        )
    }
}

/// RFC 3986 scheme: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) followed by ':'
fn uri_scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.trim().split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const URI: &str = "thrift://metastore:9083";

    #[test]
    fn test_structural_equality_and_hash() {
        let a = EndpointId::new(URI, "db", "t", vec!["eu".into(), "2024".into()]).unwrap();
        let b = EndpointId::new(URI, "db", "t", vec!["eu".into(), "2024".into()]).unwrap();
        let c = EndpointId::new(URI, "db", "t", vec!["2024".into(), "eu".into()]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut map: HashMap<EndpointId, i32> = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
        assert_eq!(map.get(&c), None);
    }

    #[test]
    fn test_partition_values_are_trimmed() {
        let id = EndpointId::new(URI, "db", "t", vec!["  eu ".into()]).unwrap();
        assert_eq!(id.partition_values(), ["eu"]);
        assert_eq!(
            id,
            EndpointId::new(URI, "db", "t", vec!["eu".into()]).unwrap()
        );
    }

    #[test]
    fn test_rejects_blank_fields() {
        assert!(EndpointId::new(" ", "db", "t", vec![]).is_err());
        assert!(EndpointId::new(URI, "", "t", vec![]).is_err());
        assert!(EndpointId::new(URI, "db", "  ", vec![]).is_err());
        assert!(EndpointId::new(URI, "db", "t", vec!["ok".into(), " ".into()]).is_err());
    }

    #[test]
    fn test_rejects_wrong_scheme() {
        let err = EndpointId::new("http://meta:9083", "db", "t", vec![]).unwrap_err();
        assert!(err.to_string().contains("unsupported URI scheme http"));
        assert!(EndpointId::new("meta:9083", "db", "t", vec![]).is_err());
        assert!(EndpointId::new("no-scheme", "db", "t", vec![]).is_err());
        assert!(EndpointId::new("THRIFT://meta:9083", "db", "t", vec![]).is_ok());
    }

    #[test]
    fn test_factory_builds_validated_endpoints() {
        let factory = EndpointFactory::new(URI, "db", "events").unwrap();
        let id = factory.endpoint_for(vec!["eu".into()]).unwrap();
        assert_eq!(id.metastore_uri(), URI);
        assert_eq!(id.database(), "db");
        assert_eq!(id.table(), "events");
        assert!(factory.endpoint_for(vec!["".into()]).is_err());
        assert!(EndpointFactory::new("ftp://x", "db", "events").is_err());
    }

    #[test]
    fn test_display() {
        let id = EndpointId::new(URI, "db", "t", vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(id.to_string(), "thrift://metastore:9083/db.t[a,b]");
    }

    #[test]
    fn test_serde_validates() {
        let id = EndpointId::new(URI, "db", "t", vec!["a".into()]).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: EndpointId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);

        let bad = json.replace("thrift", "http");
        assert!(serde_json::from_str::<EndpointId>(&bad).is_err());
    }
}
