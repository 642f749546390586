//! Lead records and lead extraction from uploaded documents.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::SUMMARY_MAX_CHARS;
use crate::error::{OutcallError, Result};

/// Where a lead stands in the calling workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Pending,
    Called,
    Interested,
    NotInterested,
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::Pending => write!(f, "pending"),
            LeadStatus::Called => write!(f, "called"),
            LeadStatus::Interested => write!(f, "interested"),
            LeadStatus::NotInterested => write!(f, "not interested"),
        }
    }
}

/// A prospective customer to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: LeadStatus,
    /// What the agent said last time this lead was called, truncated to
    /// [`SUMMARY_MAX_CHARS`] characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Lead {
    /// Stores a call summary, truncating on a character boundary.
    pub fn set_summary(&mut self, text: &str) {
        let truncated: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
        self.summary = Some(truncated);
    }

    /// One-line listing form: short id, name, city, status, and whatever
    /// contact details the lead carries.
    pub fn listing_line(&self) -> String {
        let mut line = format!(
            "{}  {} ({}) [{}]",
            &self.id.to_string()[..8],
            self.name,
            self.city,
            self.status,
        );
        if let Some(phone) = &self.phone {
            line.push_str(&format!("  {}", phone));
        }
        if let Some(notes) = &self.notes {
            line.push_str(&format!("  - {}", notes));
        }
        line
    }
}

/// Lead fields as extracted from a document, before ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadDraft {
    pub name: String,
    pub city: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Parses the JSON array an extraction service produces into drafts.
///
/// All-or-nothing: one malformed record fails the whole batch so a partial
/// lead list is never committed.
///
/// # Errors
/// Returns `OutcallError::Extraction` when the payload is not a valid array
/// of lead records.
pub fn parse_lead_drafts(json: &str) -> Result<Vec<LeadDraft>> {
    serde_json::from_str(json).map_err(|e| OutcallError::Extraction {
        message: format!("invalid lead list: {}", e),
    })
}

/// In-memory collection of leads, keyed by id.
#[derive(Debug, Default)]
pub struct LeadBook {
    leads: Vec<Lead>,
}

impl LeadBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a batch of drafts, assigning each a fresh id and `Pending`
    /// status. Returns the ids in batch order.
    pub fn ingest(&mut self, drafts: Vec<LeadDraft>) -> Vec<Uuid> {
        drafts
            .into_iter()
            .map(|draft| {
                let id = Uuid::new_v4();
                self.leads.push(Lead {
                    id,
                    name: draft.name,
                    city: draft.city,
                    phone: draft.phone,
                    notes: draft.notes,
                    status: LeadStatus::Pending,
                    summary: None,
                });
                id
            })
            .collect()
    }

    /// Rebuilds a book from previously stored leads, ids included.
    pub fn from_leads(leads: Vec<Lead>) -> Self {
        Self { leads }
    }

    /// Snapshot of every lead, for persistence.
    pub fn to_vec(&self) -> Vec<Lead> {
        self.leads.clone()
    }

    /// Finds a lead by exact name or by id prefix.
    pub fn find(&self, query: &str) -> Option<&Lead> {
        self.leads
            .iter()
            .find(|l| l.name == query)
            .or_else(|| {
                self.leads
                    .iter()
                    .find(|l| l.id.to_string().starts_with(query))
            })
    }

    pub fn get(&self, id: Uuid) -> Option<&Lead> {
        self.leads.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Lead> {
        self.leads.iter_mut().find(|l| l.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lead> {
        self.leads.iter()
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }
}

/// Trait for services that turn raw document text into a lead list.
///
/// Implementations prompt a model (or any other backend) to emit the JSON
/// array [`parse_lead_drafts`] understands.
pub trait LeadExtractionService {
    fn extract_leads(&self, document_text: &str) -> Result<Vec<LeadDraft>>;
}

/// Trait for pulling plain text out of an uploaded document.
pub trait DocumentTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String>;
}

/// Extractor for documents that already are plain UTF-8 text.
pub struct PlainTextExtractor;

impl DocumentTextExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| OutcallError::Extraction {
            message: format!("document is not valid UTF-8: {}", e),
        })
    }
}
