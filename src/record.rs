//! Document records: the payload shape the registry writes into blocks.
//!
//! The ledger itself accepts any payload; these types build and validate the
//! document-registration payloads the CLI submits and condense blocks for
//! listings.

use crate::block::{Block, Payload};
use crate::error::{LedgerError, Result, ValidationError};
use crate::identifier::PublicId;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "doc", "docx"];

/// Payload key holding the record type tag.
pub const RECORD_TYPE_KEY: &str = "record_type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    #[serde(rename = "Educational Certificate")]
    EducationalCertificate,
    #[serde(rename = "Professional License")]
    ProfessionalLicense,
    #[serde(rename = "Property Document")]
    PropertyDocument,
    #[serde(rename = "Government ID")]
    GovernmentId,
    #[serde(rename = "Legal Contract")]
    LegalContract,
    Other,
}

impl RecordType {
    pub const ALL: [RecordType; 6] = [
        RecordType::EducationalCertificate,
        RecordType::ProfessionalLicense,
        RecordType::PropertyDocument,
        RecordType::GovernmentId,
        RecordType::LegalContract,
        RecordType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::EducationalCertificate => "Educational Certificate",
            RecordType::ProfessionalLicense => "Professional License",
            RecordType::PropertyDocument => "Property Document",
            RecordType::GovernmentId => "Government ID",
            RecordType::LegalContract => "Legal Contract",
            RecordType::Other => "Other",
        }
    }

    /// Type-specific payload keys collected at registration.
    pub fn detail_fields(self) -> &'static [&'static str] {
        match self {
            RecordType::EducationalCertificate => &["institution", "degree", "year"],
            RecordType::ProfessionalLicense => {
                &["license_name", "issuing_authority", "expiry_date"]
            }
            RecordType::PropertyDocument => &["property_address", "document_purpose"],
            _ => &[],
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ValidationError;

    /// Accepts the display name in any case, or its kebab/snake form (`government-id`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = normalize(s);
        RecordType::ALL
            .into_iter()
            .find(|t| normalize(t.as_str()) == wanted)
            .ok_or_else(|| ValidationError::UnknownRecordType(s.to_string()))
    }
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '-' | '_' => ' ',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// An uploaded document, base64-encoded so it can live inside a JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    /// Lowercased extension.
    pub file_type: String,
    pub content_base64: String,
}

impl Attachment {
    pub fn from_bytes(file_name: &str, bytes: &[u8]) -> std::result::Result<Self, ValidationError> {
        let file_type = allowed_extension(file_name)?;
        Ok(Self {
            file_name: file_name.to_string(),
            file_type,
            content_base64: STANDARD.encode(bytes),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Reject before reading a possibly large file.
        allowed_extension(&file_name)?;
        let bytes = fs::read(path)?;
        Ok(Self::from_bytes(&file_name, &bytes)?)
    }

    /// The document stored in a block's payload, if it carries one.
    pub fn from_block(block: &Block) -> Option<Self> {
        let content = block.payload_str("file_content")?;
        let file_name = block.payload_str("file_name").unwrap_or_default();
        let file_type = match block.payload_str("file_type") {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => allowed_extension(file_name).unwrap_or_default(),
        };
        Some(Self {
            file_name: file_name.to_string(),
            file_type,
            content_base64: content.to_string(),
        })
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD.decode(&self.content_base64).map_err(|e| {
            LedgerError::Validation(ValidationError::InvalidAttachment(format!(
                "{}: {}",
                self.file_name, e
            )))
        })
    }
}

fn allowed_extension(file_name: &str) -> std::result::Result<String, ValidationError> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| ValidationError::DisallowedExtension(file_name.to_string()))?;
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ValidationError::DisallowedExtension(file_name.to_string()))
    }
}

/// A document registration as submitted by a user.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub record_type: RecordType,
    pub owner_name: String,
    pub attachment: Option<Attachment>,
    pub registration_date: NaiveDate,
    pub additional_notes: String,
    pub details: BTreeMap<String, String>,
}

impl DocumentRecord {
    pub fn new(record_type: RecordType, owner_name: impl Into<String>) -> Self {
        Self {
            record_type,
            owner_name: owner_name.into(),
            attachment: None,
            registration_date: Local::now().date_naive(),
            additional_notes: String::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.additional_notes = notes.into();
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn registered_on(mut self, date: NaiveDate) -> Self {
        self.registration_date = date;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.owner_name.trim().is_empty() {
            return Err(ValidationError::MissingOwner);
        }
        if self.attachment.is_none() {
            return Err(ValidationError::MissingAttachment);
        }
        Ok(())
    }

    /// Flatten into the payload stored in a block. Details never override core keys.
    pub fn to_payload(&self) -> Payload {
        let mut p = Payload::new();
        for (k, v) in &self.details {
            p.insert(k.clone(), Value::from(v.as_str()));
        }
        p.insert(RECORD_TYPE_KEY.into(), Value::from(self.record_type.as_str()));
        p.insert("owner_name".into(), Value::from(self.owner_name.as_str()));
        match &self.attachment {
            Some(a) => {
                p.insert("file_name".into(), Value::from(a.file_name.as_str()));
                p.insert("file_content".into(), Value::from(a.content_base64.as_str()));
                p.insert("file_type".into(), Value::from(a.file_type.as_str()));
            }
            None => {
                p.insert("file_name".into(), Value::from(""));
                p.insert("file_content".into(), Value::Null);
                p.insert("file_type".into(), Value::from(""));
            }
        }
        p.insert(
            "registration_date".into(),
            Value::from(self.registration_date.format("%Y-%m-%d").to_string()),
        );
        p.insert(
            "additional_notes".into(),
            Value::from(self.additional_notes.as_str()),
        );
        p
    }
}

/// Condensed view of a block for listings; never carries file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub position: u64,
    pub public_id: Option<PublicId>,
    pub record_type: Option<String>,
    pub owner_name: Option<String>,
    pub created_at: String,
    pub file_name: Option<String>,
}

impl BlockSummary {
    pub fn from_block(block: &Block) -> Self {
        let field = |key: &str| block.payload_str(key).map(String::from);
        Self {
            position: block.sequence_position,
            public_id: block.public_id.clone(),
            record_type: field(RECORD_TYPE_KEY),
            owner_name: field("owner_name"),
            created_at: block.created_at.clone(),
            file_name: field("file_name"),
        }
    }
}
