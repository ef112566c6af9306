//! Location rendering for structured position data

use serde::Deserialize;

use super::structured::lenient_string;

/// Shown when a position carries no usable location
pub const UNSPECIFIED_LOCATION: &str = "Not specified";

/// Country code rewritten to the region marker
const TARGET_COUNTRY_CODE: &str = "IL";

/// Suffix appended to remote positions
const REMOTE_MARKER: &str = "(Remote)";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PositionLocation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: Option<String>,
    #[serde(default)]
    pub is_remote: Option<bool>,
}

impl PositionLocation {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.city.is_none() && self.country.is_none() && self.is_remote.is_none()
    }
}

/// `city, country[, (Remote)]`, with the target country code replaced by
/// `region_marker`. Falls back to the free-form name, then to "Not specified".
pub(crate) fn describe(location: Option<&PositionLocation>, region_marker: &str) -> String {
    let Some(loc) = location.filter(|l| !l.is_empty()) else {
        return UNSPECIFIED_LOCATION.to_string();
    };

    let mut parts: Vec<&str> = Vec::new();
    if let Some(city) = loc.city.as_deref().filter(|c| !c.is_empty()) {
        parts.push(city);
    }
    if let Some(country) = loc.country.as_deref().filter(|c| !c.is_empty()) {
        if country == TARGET_COUNTRY_CODE {
            parts.push(region_marker);
        } else {
            parts.push(country);
        }
    }
    if loc.is_remote == Some(true) {
        parts.push(REMOTE_MARKER);
    }

    if parts.is_empty() {
        loc.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNSPECIFIED_LOCATION.to_string())
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REGION_MARKER;

    fn loc(city: Option<&str>, country: Option<&str>, remote: Option<bool>) -> PositionLocation {
        PositionLocation {
            name: None,
            city: city.map(str::to_string),
            country: country.map(str::to_string),
            is_remote: remote,
        }
    }

    #[test]
    fn test_israel_code_becomes_marker() {
        assert_eq!(describe(Some(&loc(Some("Tel Aviv"), Some("IL"), None)), DEFAULT_REGION_MARKER), "Tel Aviv, ISRAEL");
    }

    #[test]
    fn test_configured_marker_replaces_code() {
        assert_eq!(describe(Some(&loc(Some("Haifa"), Some("IL"), None)), "IL-REGION"), "Haifa, IL-REGION");
    }

    #[test]
    fn test_other_country_kept_and_remote_suffix() {
        assert_eq!(
            describe(Some(&loc(Some("Berlin"), Some("DE"), Some(true))), DEFAULT_REGION_MARKER),
            "Berlin, DE, (Remote)"
        );
        assert_eq!(describe(Some(&loc(None, None, Some(true))), DEFAULT_REGION_MARKER), "(Remote)");
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(describe(None, DEFAULT_REGION_MARKER), "Not specified");
        assert_eq!(describe(Some(&PositionLocation::default()), DEFAULT_REGION_MARKER), "Not specified");

        let named = PositionLocation {
            name: Some("HQ".to_string()),
            ..Default::default()
        };
        assert_eq!(describe(Some(&named), DEFAULT_REGION_MARKER), "HQ");
        assert_eq!(describe(Some(&loc(None, None, Some(false))), DEFAULT_REGION_MARKER), "Not specified");
    }
}
