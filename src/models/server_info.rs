use semver::Version as Semver;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Answer of `GET /` on an Elasticsearch node.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerInfo {
    #[serde(rename = "name")]
    hostname: String,
    #[serde(rename = "cluster_name")]
    name: String,
    #[serde(rename = "cluster_uuid")]
    uuid: Option<String>,
    version: Version,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Version {
    number: String,
    #[serde(default)]
    lucene_version: String,
}

impl ServerInfo {
    pub fn get_hostname(&self) -> &String {
        &self.hostname
    }
    pub fn get_name(&self) -> &String {
        &self.name
    }
    pub fn get_uuid(&self) -> &Option<String> {
        &self.uuid
    }
    pub fn get_version(&self) -> &String {
        &self.version.number
    }
    pub fn get_lucene_version(&self) -> &String {
        &self.version.lucene_version
    }

    pub fn get_version_major(&self) -> Result<u64, ClientError> {
        Semver::parse(&self.version.number)
            .map(|version| version.major)
            .map_err(|source| ClientError::Version {
                version: self.version.number.clone(),
                source,
            })
    }

    /// Mapping types were removed in 7.0; older clusters still expect `_type`.
    pub fn uses_doc_types(&self) -> Result<bool, ClientError> {
        Ok(self.get_version_major()? < 7)
    }
}
