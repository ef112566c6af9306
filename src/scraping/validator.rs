//! Raw job validation
//!
//! Turns extractor output into [`JobRecord`]s. A record needs a non-empty
//! title and an absolute http(s) URL; blank optional fields become `None`.
//! Rejects carry a reason and are never retried.

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::types::{url_hash, JobRecord, RawJob, DEFAULT_EMPLOYMENT_TYPE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing title")]
    MissingTitle,
    #[error("missing url")]
    MissingUrl,
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A raw record that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidJob {
    pub job: RawJob,
    pub reason: ValidationError,
}

/// Trim, mapping blank strings to `None`
fn normalize(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_job_url(raw: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Validate one raw record
pub fn validate_job(raw: &RawJob) -> Result<JobRecord, ValidationError> {
    let title = normalize(&raw.title).ok_or(ValidationError::MissingTitle)?;
    let url_text = normalize(&raw.url).ok_or(ValidationError::MissingUrl)?;
    let url = parse_job_url(&url_text)?;

    Ok(JobRecord {
        title,
        company_name: normalize(&raw.company_name),
        department: normalize(&raw.department),
        location: normalize(&raw.location),
        workplace_type: normalize(&raw.workplace_type),
        experience_level: normalize(&raw.experience_level),
        employment_type: normalize(&raw.employment_type)
            .unwrap_or_else(|| DEFAULT_EMPLOYMENT_TYPE.to_string()),
        url_hash: url_hash(&url_text),
        source_domain: url.host_str().unwrap_or_default().to_string(),
        url: url_text,
        description: raw.description.clone(),
        uid: normalize(&raw.uid),
        email: normalize(&raw.email),
        last_updated: normalize(&raw.last_updated),
        original_website_url: normalize(&raw.original_website_url),
        embedding: None,
        is_ai_inferred: false,
    })
}

/// Partition raw records into valid jobs and rejects, preserving order
pub fn validate(raw: Vec<RawJob>) -> (Vec<JobRecord>, Vec<InvalidJob>) {
    let mut valid = Vec::with_capacity(raw.len());
    let mut invalid = Vec::new();
    for job in raw {
        match validate_job(&job) {
            Ok(record) => valid.push(record),
            Err(reason) => {
                debug!(
                    title = job.title.as_deref().unwrap_or(""),
                    "Dropping invalid job: {}", reason
                );
                invalid.push(InvalidJob { job, reason });
            }
        }
    }
    (valid, invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str, url: &str) -> RawJob {
        RawJob {
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_job_is_normalized() {
        let mut job = raw("  Backend Engineer ", " https://www.comeet.com/jobs/acme/1 ");
        job.department = Some("   ".to_string());
        job.location = Some(" Tel Aviv, ISRAEL ".to_string());

        let record = validate_job(&job).unwrap();
        assert_eq!(record.title, "Backend Engineer");
        assert_eq!(record.url, "https://www.comeet.com/jobs/acme/1");
        assert_eq!(record.url_hash, url_hash("https://www.comeet.com/jobs/acme/1"));
        assert_eq!(record.source_domain, "www.comeet.com");
        assert_eq!(record.department, None);
        assert_eq!(record.location.as_deref(), Some("Tel Aviv, ISRAEL"));
        assert_eq!(record.employment_type, "Full-time");
        assert!(record.embedding.is_none());
    }

    #[test]
    fn test_rejects_blank_title() {
        assert_eq!(
            validate_job(&raw("   ", "https://example.com/1")),
            Err(ValidationError::MissingTitle)
        );
        let mut no_title = raw("x", "https://example.com/1");
        no_title.title = None;
        assert_eq!(validate_job(&no_title), Err(ValidationError::MissingTitle));
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert_eq!(
            validate_job(&raw("Engineer", " ")),
            Err(ValidationError::MissingUrl)
        );
        assert!(matches!(
            validate_job(&raw("Engineer", "/jobs/relative")),
            Err(ValidationError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_job(&raw("Engineer", "mailto:jobs@example.com")),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_partition_preserves_order() {
        let (valid, invalid) = validate(vec![
            raw("A", "https://example.com/a"),
            raw("", "https://example.com/b"),
            raw("C", "https://example.com/c"),
            raw("D", "not a url"),
        ]);
        let titles: Vec<_> = valid.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert_eq!(invalid.len(), 2);
        assert_eq!(invalid[0].reason, ValidationError::MissingTitle);
        assert_eq!(invalid[1].job.title.as_deref(), Some("D"));
    }

    #[test]
    fn test_explicit_employment_type_is_kept() {
        let mut job = raw("Engineer", "https://example.com/1");
        job.employment_type = Some("Part-time".to_string());
        assert_eq!(validate_job(&job).unwrap().employment_type, "Part-time");
    }
}
