use serde::{Deserialize, Serialize};

/// Static cinema reference entity. Owned by an administrative collaborator;
/// read-only to both the retrieval engine and the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cinema {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
}
