use crate::digest::digest_fields;
use crate::identifier::PublicId;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form document metadata carried by a block.
pub type Payload = Map<String, Value>;

/// Format of `timestamp`, e.g. `2024-05-01 09:30:12.000123`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One immutable ledger record.
///
/// Field names on disk are the ledger file's stable schema; `unique_id` is
/// absent on records written before public ids existed. Any other key is
/// rejected, since it would sit outside the digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Block {
    /// 1-based position in the ledger.
    #[serde(rename = "index")]
    pub sequence_position: u64,
    /// When the block was created; hashed but otherwise informational.
    #[serde(rename = "timestamp")]
    pub created_at: String,
    #[serde(rename = "data")]
    pub payload: Payload,
    /// Digest of the preceding block, or empty for the first block.
    #[serde(rename = "previous_hash")]
    pub previous_digest: String,
    /// Digest over every other field (see [`Block::compute_digest`]).
    #[serde(rename = "hash")]
    pub digest: String,
    #[serde(rename = "unique_id", default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<PublicId>,
}

impl Block {
    /// Create a new block stamped with the current local time; `digest` is computed automatically.
    pub fn create(
        sequence_position: u64,
        payload: Payload,
        previous_digest: String,
        public_id: Option<PublicId>,
    ) -> Self {
        let created_at = Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::with_timestamp(sequence_position, created_at, payload, previous_digest, public_id)
    }

    /// Create a block with an explicit timestamp (for testing / determinism).
    pub fn with_timestamp(
        sequence_position: u64,
        created_at: String,
        payload: Payload,
        previous_digest: String,
        public_id: Option<PublicId>,
    ) -> Self {
        let mut block = Self {
            sequence_position,
            created_at,
            payload,
            previous_digest,
            digest: String::new(),
            public_id,
        };
        block.digest = block.compute_digest();
        block
    }

    /// Recompute the digest from the block's fields, holding `hash` empty.
    pub fn compute_digest(&self) -> String {
        digest_fields(&self.canonical_fields())
    }

    /// The field set fed to the digest, keyed by on-disk names.
    pub fn canonical_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("index".into(), Value::from(self.sequence_position));
        fields.insert("timestamp".into(), Value::from(self.created_at.clone()));
        fields.insert("data".into(), Value::Object(self.payload.clone()));
        fields.insert(
            "previous_hash".into(),
            Value::from(self.previous_digest.clone()),
        );
        fields.insert("hash".into(), Value::from(""));
        if let Some(id) = &self.public_id {
            fields.insert("unique_id".into(), Value::from(id.as_str()));
        }
        fields
    }

    /// String-valued payload field, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}
