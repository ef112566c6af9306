//! Job extraction from careers-page HTML
//!
//! A fallback chain over three strategies, stopping at the first that yields
//! anything:
//! 1. the structured `COMPANY_POSITIONS_DATA` array Comeet embeds in a script
//! 2. `a.positionItem` listings with keyword-classified detail lines
//! 3. generic job cards matched by common class names
//!
//! Extraction is pure: the same HTML always yields the same jobs in the same order.

mod cards;
mod dom;
mod location;
mod positions;
mod structured;

pub use location::UNSPECIFIED_LOCATION;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::DEFAULT_REGION_MARKER;
use crate::types::RawJob;

/// Internal parse failures; they never escape the extractor
#[derive(Debug, Error)]
pub(crate) enum ExtractError {
    #[error("invalid positions JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed positions data: {0}")]
    Malformed(String),
}

/// Which strategy produced the jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    StructuredData,
    PositionItems,
    JobCards,
}

/// Jobs found on a page and the strategy that found them
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub strategy: Option<Strategy>,
    pub jobs: Vec<RawJob>,
}

/// Job extractor with pre-compiled selectors
pub struct JobExtractor {
    marker: Option<Regex>,
    /// Written into locations in the target country
    region_marker: String,
    positions: positions::PositionSelectors,
    cards: cards::CardSelectors,
}

impl Default for JobExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExtractor {
    pub fn new() -> Self {
        Self::with_region_marker(DEFAULT_REGION_MARKER)
    }

    /// Extractor that tags target-country locations with `region_marker`.
    ///
    /// Must match the filter's marker or every job is rejected as out of region.
    pub fn with_region_marker(region_marker: impl Into<String>) -> Self {
        let marker = match Regex::new(structured::MARKER_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Invalid positions marker pattern: {}", e);
                None
            }
        };
        Self {
            marker,
            region_marker: region_marker.into(),
            positions: positions::PositionSelectors::new(),
            cards: cards::CardSelectors::new(),
        }
    }

    /// Extract raw jobs, or an empty list when no strategy finds any
    pub fn extract(&self, html: &str) -> Vec<RawJob> {
        self.extract_with_strategy(html).jobs
    }

    pub fn extract_with_strategy(&self, html: &str) -> Extraction {
        debug!("Starting job extraction, HTML length: {} chars", html.len());

        if let Some(marker) = &self.marker {
            match structured::extract(html, marker, &self.region_marker) {
                Ok(jobs) if !jobs.is_empty() => {
                    debug!("Structured data yielded {} jobs", jobs.len());
                    return Extraction {
                        strategy: Some(Strategy::StructuredData),
                        jobs,
                    };
                }
                Ok(_) => {}
                Err(e) => warn!("Error parsing embedded positions: {}", e),
            }
        }

        let document = dom::Document::parse(html);

        let jobs = positions::extract(&document, &self.positions);
        if !jobs.is_empty() {
            debug!("Position items yielded {} jobs", jobs.len());
            return Extraction {
                strategy: Some(Strategy::PositionItems),
                jobs,
            };
        }

        let jobs = cards::extract(&document, &self.cards);
        if !jobs.is_empty() {
            debug!("Job cards yielded {} jobs", jobs.len());
            return Extraction {
                strategy: Some(Strategy::JobCards),
                jobs,
            };
        }

        debug!("No jobs found with any extraction method");
        Extraction {
            strategy: None,
            jobs: Vec::new(),
        }
    }
}

/// Resolve relative job links against the page they were found on
pub fn absolutize_urls(jobs: &mut [RawJob], base: &Url) {
    for job in jobs {
        let Some(raw) = job.url.as_deref().map(str::trim) else {
            continue;
        };
        if raw.is_empty() || Url::parse(raw).is_ok() {
            continue;
        }
        if let Ok(joined) = base.join(raw) {
            job.url = Some(joined.to_string());
        }
    }
}
