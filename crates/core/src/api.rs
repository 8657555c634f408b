use serde::{Deserialize, Serialize};

use crate::model::RegistryEntry;

/// Preview response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub preview: String,
}

/// Generate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Published artifact path.
    pub path: String,
    pub registry_entry: RegistryEntry,
    /// Id of the background preprocess job, if one was queued.
    #[serde(default)]
    pub preprocess_job: Option<String>,
}

/// Deploy request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub path: String,
}

/// Deploy response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub pid: u32,
}

/// Stop request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub pid: u32,
}

/// Stop response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub stopped: bool,
}

/// Log read-back response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogResponse {
    pub log: String,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    /// Coarse category, see `ForgeError::category`.
    pub kind: String,
}
