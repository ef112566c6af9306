//! Core types shared by every pipeline stage
//!
//! A company flows in from discovery, becomes a batch of [`JobRecord`]s after
//! scraping, and each job is later correlated with its embedding through
//! [`url_hash`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Default employment type when the source page does not state one
pub const DEFAULT_EMPLOYMENT_TYPE: &str = "Full-time";

/// Content hash of a job URL.
///
/// Used as the secondary unique key in the job store and as the
/// correlation id of every item in an embedding batch.
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// A company careers page to scrape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    /// Display name of the company
    pub name: String,
    /// Applicant-tracking host the page lives on (e.g. `comeet.com`)
    pub source_domain: String,
    /// Careers page URL, the stable identity of the company
    pub page_url: String,
    /// When discovery first found this page
    pub discovered_at: DateTime<Utc>,
    /// Last successful fetch of the page
    #[serde(default)]
    pub last_scraped_at: Option<DateTime<Utc>>,
    /// Cleared when the page is permanently gone
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CompanyRecord {
    /// Create a freshly discovered, never scraped company
    pub fn new(
        name: impl Into<String>,
        source_domain: impl Into<String>,
        page_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_domain: source_domain.into(),
            page_url: page_url.into(),
            discovered_at: Utc::now(),
            last_scraped_at: None,
            active: true,
        }
    }

    /// Whether the page is due for another scrape
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.last_scraped_at {
            None => true,
            Some(at) => now - at > max_age,
        }
    }
}

/// One named block of a job description (e.g. "requirements")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionSection {
    pub name: String,
    pub text: String,
}

/// Ordered, named description sections of a job posting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobDescription {
    sections: Vec<DescriptionSection>,
}

impl JobDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section, ignoring blank text. A repeated name replaces the
    /// earlier section's text in place.
    pub fn push(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let text = text.into();
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let name = name.into();
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(existing) => existing.text = text.to_string(),
            None => self.sections.push(DescriptionSection {
                name,
                text: text.to_string(),
            }),
        }
    }

    pub fn sections(&self) -> &[DescriptionSection] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// `name: text` lines, one section per line
    pub fn flatten(&self) -> String {
        self.sections
            .iter()
            .map(|s| format!("{}: {}", s.name, s.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Section bodies only, space separated
    pub fn plain_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A job as pulled out of HTML, before validation.
///
/// Every field is optional because no extraction strategy can promise any of
/// them; the validator decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawJob {
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub workplace_type: Option<String>,
    pub experience_level: Option<String>,
    pub employment_type: Option<String>,
    pub url: Option<String>,
    pub uid: Option<String>,
    pub email: Option<String>,
    pub last_updated: Option<String>,
    pub original_website_url: Option<String>,
    #[serde(default)]
    pub description: JobDescription,
}

/// A validated job posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub title: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub workplace_type: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    pub employment_type: String,
    pub url: String,
    pub url_hash: String,
    pub source_domain: String,
    #[serde(default)]
    pub description: JobDescription,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub original_website_url: Option<String>,
    #[serde(default)]
    pub embedding: Option<Embedding>,
    #[serde(default)]
    pub is_ai_inferred: bool,
}

impl JobRecord {
    /// Text submitted for embedding: the title followed by the flattened description
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.description.flatten())
            .trim()
            .to_string()
    }
}

/// Queue payload carrying every new job found on one company page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBatchMessage {
    pub jobs: Vec<JobRecord>,
    pub source_url: String,
}

/// Lifecycle of a submitted embedding batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Only `processing` may move, and only to a terminal state
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Completed) | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of a submitted embedding batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBatch {
    pub batch_id: String,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> JobRecord {
        let mut description = JobDescription::new();
        description.push("description", "Build things");
        description.push("requirements", "Rust");
        JobRecord {
            title: "Backend Engineer".to_string(),
            company_name: Some("Acme".to_string()),
            department: None,
            location: Some("Tel Aviv, ISRAEL".to_string()),
            workplace_type: None,
            experience_level: None,
            employment_type: DEFAULT_EMPLOYMENT_TYPE.to_string(),
            url: "https://www.comeet.com/jobs/acme/1".to_string(),
            url_hash: url_hash("https://www.comeet.com/jobs/acme/1"),
            source_domain: "www.comeet.com".to_string(),
            description,
            uid: None,
            email: None,
            last_updated: None,
            original_website_url: None,
            embedding: None,
            is_ai_inferred: false,
        }
    }

    #[test]
    fn test_url_hash_is_stable_hex() {
        let a = url_hash("https://example.com/job/1");
        let b = url_hash("https://example.com/job/1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, url_hash("https://example.com/job/2"));
    }

    #[test]
    fn test_description_skips_blank_sections() {
        let mut description = JobDescription::new();
        description.push("description", "  ");
        description.push("requirements", " 3 years ");
        assert_eq!(description.sections().len(), 1);
        assert_eq!(description.flatten(), "requirements: 3 years");
    }

    #[test]
    fn test_description_repeated_name_replaces() {
        let mut description = JobDescription::new();
        description.push("requirements", "Go");
        description.push("benefits", "Lunch");
        description.push("requirements", "Rust");
        assert_eq!(description.flatten(), "requirements: Rust\nbenefits: Lunch");
    }

    #[test]
    fn test_embedding_text_joins_title_and_description() {
        let job = sample_job();
        assert_eq!(
            job.embedding_text(),
            "Backend Engineer\n\ndescription: Build things\nrequirements: Rust"
        );
    }

    #[test]
    fn test_embedding_text_without_description_is_title() {
        let mut job = sample_job();
        job.description = JobDescription::new();
        assert_eq!(job.embedding_text(), "Backend Engineer");
    }

    #[test]
    fn test_company_staleness() {
        let now = Utc::now();
        let mut company = CompanyRecord::new("Acme", "comeet.com", "https://www.comeet.com/jobs/acme/1");
        assert!(company.is_stale(now, Duration::hours(24)));

        company.last_scraped_at = Some(now - Duration::hours(2));
        assert!(!company.is_stale(now, Duration::hours(24)));

        company.last_scraped_at = Some(now - Duration::hours(30));
        assert!(company.is_stale(now, Duration::hours(24)));
    }

    #[test]
    fn test_batch_status_transitions() {
        assert!(BatchStatus::Processing.can_transition_to(BatchStatus::Completed));
        assert!(BatchStatus::Processing.can_transition_to(BatchStatus::Failed));
        assert!(!BatchStatus::Completed.can_transition_to(BatchStatus::Failed));
        assert!(!BatchStatus::Failed.can_transition_to(BatchStatus::Completed));
        assert!(!BatchStatus::Processing.can_transition_to(BatchStatus::Processing));
    }

    #[test]
    fn test_job_batch_wire_format_uses_camel_case() {
        let message = JobBatchMessage {
            jobs: vec![sample_job()],
            source_url: "https://www.comeet.com/jobs/acme/1".to_string(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("sourceUrl").is_some());
        assert!(json["jobs"][0].get("urlHash").is_some());

        let back: JobBatchMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }
}
