use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provenance tag stamped on every registry entry produced by generation.
pub const GENERATED_BY: &str = "agent";

/// Declarative workflow definition submitted for generation.
///
/// `(name, version)` is the identity of the generated artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSpec {
    /// Workflow name.
    #[serde(alias = "workflow_name")]
    pub name: String,
    /// Workflow version (free-form string).
    pub version: String,
    /// Human description.
    #[serde(default)]
    pub description: String,
    /// Owning team label, may be empty.
    #[serde(default)]
    pub team: String,
    /// Tool integrations, in declaration order.
    pub tools: Vec<ToolRef>,
    /// Opaque edge metadata, passed through unmodified.
    #[serde(default, alias = "workflow_edges")]
    pub edges: Value,
    /// Opaque deployment metadata, passed through unmodified.
    #[serde(default)]
    pub deployment: Value,
}

impl WorkflowSpec {
    /// Registry identifier, `"{name}_v{version}"`.
    pub fn registry_id(&self) -> String {
        format!("{}_v{}", self.name, self.version)
    }

    /// Non-empty vault references across all tools, in tool order.
    ///
    /// Duplicates are kept.
    pub fn vault_refs(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter_map(|t| t.vault_ref.as_deref())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// True if any tool asks for batch preprocessing.
    pub fn wants_batch_preprocess(&self) -> bool {
        self.tools.iter().any(|t| t.batch_preprocess)
    }
}

/// Reference to one tool integration.
///
/// Unknown fields are retained in `extra` so registry entries carry the tool
/// exactly as submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRef {
    /// Tool kind, e.g. `sql`, `datalake`.
    pub kind: String,
    /// Opaque secret reference, resolved only inside the deployed artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_ref: Option<String>,
    /// Request asynchronous batch preprocessing after generation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub batch_preprocess: bool,
    /// Every other field of the tool.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolRef {
    /// Tool of `kind` with no secret and no extra fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            vault_ref: None,
            batch_preprocess: false,
            extra: Map::new(),
        }
    }

    /// Sets the vault reference.
    pub fn with_vault_ref(mut self, vault_ref: impl Into<String>) -> Self {
        self.vault_ref = Some(vault_ref.into());
        self
    }

    /// Flags the tool for batch preprocessing.
    pub fn with_batch_preprocess(mut self) -> Self {
        self.batch_preprocess = true;
        self
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Immutable provenance stamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Audit {
    pub generated_by: String,
    /// Milliseconds since the Unix epoch. Stored as `timestamp`; fractional
    /// seconds from older documents are converted on read.
    #[serde(
        rename = "timestamp",
        alias = "timestamp_ms",
        deserialize_with = "deserialize_timestamp_ms"
    )]
    pub timestamp_ms: i64,
}

fn deserialize_timestamp_ms<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Seconds(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => ms,
        Raw::Seconds(secs) => (secs * 1000.0).round() as i64,
    })
}

/// Durable record describing one generated artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    /// `"{name}_v{version}"`.
    #[serde(alias = "mcp_server_id")]
    pub id: String,
    pub name: String,
    pub version: String,
    pub tools: Vec<ToolRef>,
    #[serde(default)]
    pub team: String,
    /// Artifact file location.
    pub path: String,
    /// True while a supervised process for `path` is running.
    #[serde(default)]
    pub deployed: bool,
    #[serde(default)]
    pub vault_refs: Vec<String>,
    pub audit: Audit,
}

impl RegistryEntry {
    /// Builds the entry for a freshly generated artifact.
    pub fn for_spec(spec: &WorkflowSpec, path: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            id: spec.registry_id(),
            name: spec.name.clone(),
            version: spec.version.clone(),
            tools: spec.tools.clone(),
            team: spec.team.clone(),
            path: path.into(),
            deployed: false,
            vault_refs: spec.vault_refs(),
            audit: Audit {
                generated_by: GENERATED_BY.to_string(),
                timestamp_ms,
            },
        }
    }
}

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    /// Termination signal sent by `stop`.
    Stopped,
    /// Child exited on its own (or after a signal) and was reaped.
    Exited { code: Option<i32> },
}

/// Snapshot of one supervised artifact process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub path: String,
    pub log_path: String,
    #[serde(flatten)]
    pub state: ProcessState,
    pub started_at_ms: i64,
}

/// Runtime status of a batch preprocess job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed { error: String },
}

/// Observable record of a batch preprocess job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreprocessJob {
    pub id: String,
    pub spec_id: String,
    #[serde(flatten)]
    pub status: JobStatus,
    pub queued_at_ms: i64,
    #[serde(default)]
    pub finished_at_ms: Option<i64>,
}
