//! Strategy 1: the `COMPANY_POSITIONS_DATA` array embedded in Comeet pages

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::dom::strip_markup;
use super::location::{describe, PositionLocation};
use super::ExtractError;
use crate::types::{JobDescription, RawJob};

/// Marker preceding the positions array
pub(crate) const MARKER_PATTERN: &str = r"COMPANY_POSITIONS_DATA\s*=\s*";

/// Accept strings, numbers and booleans as text; anything else is absent
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct Detail {
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct CustomFields {
    #[serde(default)]
    details: Option<Vec<Detail>>,
}

#[derive(Debug, Deserialize)]
struct Position {
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    department: Option<String>,
    #[serde(default)]
    location: Option<PositionLocation>,
    #[serde(default, deserialize_with = "lenient_string")]
    employment_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    experience_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    workplace_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    uid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    url_comeet_hosted_page: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    url_active_page: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    url_detected_page: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    time_updated: Option<String>,
    #[serde(default)]
    custom_fields: Option<CustomFields>,
}

impl Position {
    fn into_raw(self, region_marker: &str) -> RawJob {
        let original_website_url = self
            .url_active_page
            .filter(|u| !u.is_empty())
            .or(self.url_detected_page.filter(|u| !u.is_empty()))
            .filter(|u| Some(u) != self.url_comeet_hosted_page.as_ref());

        let mut description = JobDescription::new();
        let details = self.custom_fields.and_then(|c| c.details).unwrap_or_default();
        for detail in details {
            if let (Some(name), Some(Value::String(value))) = (detail.name, detail.value) {
                description.push(name.to_lowercase(), strip_markup(&value));
            }
        }

        RawJob {
            title: self.name,
            company_name: self.company_name,
            department: self.department,
            location: Some(describe(self.location.as_ref(), region_marker)),
            workplace_type: self.workplace_type,
            experience_level: self.experience_level,
            employment_type: self.employment_type,
            url: self.url_comeet_hosted_page,
            uid: self.uid,
            email: self.email,
            last_updated: self.time_updated,
            original_website_url,
            description,
        }
    }
}

/// Parse the embedded positions array.
///
/// `Ok(empty)` when the page has no marker. Entries that are not position
/// objects are skipped; a malformed array is an error.
pub(crate) fn extract(html: &str, marker: &Regex, region_marker: &str) -> Result<Vec<RawJob>, ExtractError> {
    let Some(found) = marker.find(html) else {
        return Ok(Vec::new());
    };
    let rest = &html[found.end()..];
    if !rest.starts_with('[') {
        return Err(ExtractError::Malformed(
            "positions marker not followed by an array".to_string(),
        ));
    }

    let items: Vec<Value> = match serde_json::Deserializer::from_str(rest)
        .into_iter::<Vec<Value>>()
        .next()
    {
        Some(Ok(items)) => items,
        Some(Err(e)) => return Err(ExtractError::Json(e)),
        None => Vec::new(),
    };

    let mut jobs = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<Position>(item) {
            Ok(position) => jobs.push(position.into_raw(region_marker)),
            Err(e) => debug!("Skipping position {}: {}", index, e),
        }
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REGION_MARKER;

    fn marker() -> Regex {
        Regex::new(MARKER_PATTERN).unwrap()
    }

    #[test]
    fn test_full_position_mapping() {
        let html = r#"<script>
            var COMPANY_POSITIONS_DATA = [{
                "name": "Data Engineer",
                "department": "R&D",
                "location": {"city": "Haifa", "country": "IL", "is_remote": true},
                "employment_type": "Full-time",
                "experience_level": "Senior",
                "workplace_type": "Hybrid",
                "uid": 42,
                "url_comeet_hosted_page": "https://www.comeet.com/jobs/acme/42",
                "url_active_page": "https://acme.com/careers/42",
                "company_name": "Acme",
                "email": "jobs@acme.com",
                "time_updated": "2024-01-02T10:00:00Z",
                "custom_fields": {"details": [
                    {"name": "Description", "value": "<p>Build <b>pipelines</b></p>"},
                    {"name": "Requirements", "value": "<ul><li>Rust</li><li>SQL</li></ul>"},
                    {"name": "Empty", "value": null}
                ]}
            }];
        </script>"#;

        let jobs = extract(html, &marker(), DEFAULT_REGION_MARKER).unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.title.as_deref(), Some("Data Engineer"));
        assert_eq!(job.location.as_deref(), Some("Haifa, ISRAEL, (Remote)"));
        assert_eq!(job.uid.as_deref(), Some("42"));
        assert_eq!(job.url.as_deref(), Some("https://www.comeet.com/jobs/acme/42"));
        assert_eq!(job.original_website_url.as_deref(), Some("https://acme.com/careers/42"));
        assert_eq!(job.last_updated.as_deref(), Some("2024-01-02T10:00:00Z"));
        assert_eq!(
            job.description.flatten(),
            "description: Build\npipelines\nrequirements: Rust\nSQL"
        );
    }

    #[test]
    fn test_original_url_dropped_when_same_as_hosted() {
        let html = r#"COMPANY_POSITIONS_DATA = [{"name": "QA",
            "url_comeet_hosted_page": "https://www.comeet.com/jobs/acme/1",
            "url_detected_page": "https://www.comeet.com/jobs/acme/1"}];"#;
        let jobs = extract(html, &marker(), DEFAULT_REGION_MARKER).unwrap();
        assert_eq!(jobs[0].original_website_url, None);
        assert_eq!(jobs[0].location.as_deref(), Some("Not specified"));
    }

    #[test]
    fn test_array_with_brackets_inside_strings() {
        let html = r#"COMPANY_POSITIONS_DATA = [{"name": "Dev [Backend]; core"}]; var other = [1];"#;
        let jobs = extract(html, &marker(), DEFAULT_REGION_MARKER).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title.as_deref(), Some("Dev [Backend]; core"));
    }

    #[test]
    fn test_missing_marker_and_malformed_json() {
        assert!(extract("<html></html>", &marker(), DEFAULT_REGION_MARKER).unwrap().is_empty());
        assert!(matches!(
            extract("COMPANY_POSITIONS_DATA = [{\"name\": ", &marker(), DEFAULT_REGION_MARKER),
            Err(ExtractError::Json(_))
        ));
        assert!(matches!(
            extract("COMPANY_POSITIONS_DATA = null;", &marker(), DEFAULT_REGION_MARKER),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[test]
    fn test_non_object_entries_are_skipped() {
        let html = r#"COMPANY_POSITIONS_DATA = [7, {"name": "Ops"}];"#;
        let jobs = extract(html, &marker(), DEFAULT_REGION_MARKER).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title.as_deref(), Some("Ops"));
    }
}
