use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::error::{SchemaError, StateStoreError};

/// The single supported schema version for bundles and the latest pointer.
pub const SCHEMA_VERSION: &str = "1";

/// Free-form extension mapping carried by a bundle.
pub type Settings = BTreeMap<String, Value>;

/// Versioned record of one prompting session's working state.
///
/// Bundles are never mutated once persisted; refinement produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateBundle {
    pub version: String,
    pub created_at: String,
    pub tool_version: String,
    pub model_id: String,
    pub base_url: String,
    pub toolset_hash: String,
    pub scope_key: String,
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub prep_settings: Settings,
    #[serde(default)]
    pub context: Settings,
    #[serde(default)]
    pub tool_caps: Settings,
    #[serde(default)]
    pub custom: Settings,
    pub source_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_sha: Option<String>,
}

impl StateBundle {
    /// Creates a fresh bundle stamped with the current UTC time.
    pub fn new(
        tool_version: impl Into<String>,
        model_id: impl Into<String>,
        base_url: impl Into<String>,
        toolset_hash: impl Into<String>,
        scope_key: impl Into<String>,
    ) -> Result<Self, StateStoreError> {
        let created_at = format_timestamp(now_utc_seconds())?;
        Ok(Self::with_created_at(
            created_at,
            tool_version,
            model_id,
            base_url,
            toolset_hash,
            scope_key,
        ))
    }

    /// Creates a bundle with an explicit creation timestamp.
    #[must_use]
    pub fn with_created_at(
        created_at: impl Into<String>,
        tool_version: impl Into<String>,
        model_id: impl Into<String>,
        base_url: impl Into<String>,
        toolset_hash: impl Into<String>,
        scope_key: impl Into<String>,
    ) -> Self {
        let mut bundle = Self {
            version: SCHEMA_VERSION.to_string(),
            created_at: created_at.into(),
            tool_version: tool_version.into(),
            model_id: model_id.into(),
            base_url: base_url.into(),
            toolset_hash: toolset_hash.into(),
            scope_key: scope_key.into(),
            prompts: BTreeMap::new(),
            prep_settings: Settings::new(),
            context: Settings::new(),
            tool_caps: Settings::new(),
            custom: Settings::new(),
            source_hash: String::new(),
            prev_sha: None,
        };
        bundle.refresh_source_hash();
        bundle
    }

    #[must_use]
    pub fn with_prompt(mut self, role: impl Into<String>, text: impl Into<String>) -> Self {
        self.prompts.insert(role.into(), text.into());
        self
    }

    /// Recomputes `source_hash` from the identifying fields.
    pub fn refresh_source_hash(&mut self) {
        self.source_hash = compute_source_hash(
            &self.model_id,
            &self.base_url,
            &self.toolset_hash,
            &self.scope_key,
        );
    }

    #[must_use]
    pub fn has_consistent_source_hash(&self) -> bool {
        self.source_hash
            == compute_source_hash(
                &self.model_id,
                &self.base_url,
                &self.toolset_hash,
                &self.scope_key,
            )
    }

    /// True when this bundle was produced for the given session identity.
    #[must_use]
    pub fn identity_matches(
        &self,
        model_id: &str,
        base_url: &str,
        toolset_hash: &str,
        scope_key: &str,
    ) -> bool {
        self.source_hash == compute_source_hash(model_id, base_url, toolset_hash, scope_key)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        validate(self)
    }
}

/// Indirection record naming the current snapshot in a state directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    pub version: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl LatestPointer {
    #[must_use]
    pub fn v1(path: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            path: path.into(),
            sha256: Some(sha256.into()),
        }
    }
}

pub fn validate(bundle: &StateBundle) -> Result<(), SchemaError> {
    if bundle.version != SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedVersion {
            found: bundle.version.clone(),
            expected: SCHEMA_VERSION,
        });
    }

    parse_utc_timestamp("created_at", &bundle.created_at)?;

    for (field, value) in [
        ("model_id", &bundle.model_id),
        ("base_url", &bundle.base_url),
        ("scope_key", &bundle.scope_key),
    ] {
        if value.trim().is_empty() {
            return Err(SchemaError::EmptyField { field });
        }
    }

    Ok(())
}

/// Digest of the four identifying fields.
///
/// Each field is length-prefixed so no choice of field contents can make two
/// different identities hash alike.
#[must_use]
pub fn compute_source_hash(
    model_id: &str,
    base_url: &str,
    toolset_hash: &str,
    scope_key: &str,
) -> String {
    let mut hasher = Sha256::new();
    for field in [model_id, base_url, toolset_hash, scope_key] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Serialization shared by the snapshot store and refinement hash chain.
pub fn canonical_bytes(bundle: &StateBundle) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec_pretty(bundle)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub(crate) fn parse_utc_timestamp(
    field: &'static str,
    value: &str,
) -> Result<OffsetDateTime, SchemaError> {
    let parsed =
        OffsetDateTime::parse(value, &Rfc3339).map_err(|_| SchemaError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(SchemaError::NonUtcTimestamp {
            field,
            value: value.to_string(),
        });
    }

    Ok(parsed)
}

pub(crate) fn now_utc_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

pub(crate) fn format_timestamp(value: OffsetDateTime) -> Result<String, StateStoreError> {
    value.format(&Rfc3339).map_err(StateStoreError::ClockFormat)
}
