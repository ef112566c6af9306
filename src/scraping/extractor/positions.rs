//! Strategy 2: Comeet/Angular `a.positionItem` listings

use scraper::Selector;

use super::dom::{compile, Document, Node};
use crate::types::RawJob;

const EMPLOYMENT_KEYWORDS: [&str; 5] = ["full-time", "part-time", "contract", "temporary", "freelance"];
const EXPERIENCE_KEYWORDS: [&str; 7] = ["senior", "junior", "mid-level", "entry", "lead", "principal", "intern"];

pub(crate) struct PositionSelectors {
    item: Vec<Selector>,
    title: Vec<Selector>,
    details: Vec<Selector>,
    location_icon: Vec<Selector>,
}

impl PositionSelectors {
    pub fn new() -> Self {
        Self {
            item: compile(&["a.positionItem"]),
            title: compile(&["span.positionLink"]),
            details: compile(&["ul.positionDetails li"]),
            location_icon: compile(&["i.fa-map-marker"]),
        }
    }
}

#[derive(Default)]
struct Details {
    location: Option<String>,
    employment_type: Option<String>,
    experience_level: Option<String>,
}

impl Details {
    /// Sort one detail line into a field by icon, then keyword, then position
    fn classify(&mut self, text: String, has_location_icon: bool) {
        let lower = text.to_lowercase();
        if has_location_icon {
            self.location = Some(text);
        } else if EMPLOYMENT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            self.employment_type = Some(text);
        } else if EXPERIENCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            self.experience_level = Some(text);
        } else if text.split_whitespace().count() <= 2 {
            if self.experience_level.is_none() {
                self.experience_level = Some(text);
            } else if self.employment_type.is_none() {
                self.employment_type = Some(text);
            }
        }
    }
}

fn position_job(item: &Node<'_>, selectors: &PositionSelectors) -> Option<RawJob> {
    let title = item.first_text(&selectors.title)?;
    let url = item
        .attr("href")
        .or_else(|| item.attr("ng-href"))
        .map(str::to_string);

    let mut details = Details::default();
    for li in item.find_all(&selectors.details) {
        details.classify(li.text(), li.contains(&selectors.location_icon));
    }

    Some(RawJob {
        title: Some(title),
        url,
        location: details.location,
        employment_type: details.employment_type,
        experience_level: details.experience_level,
        ..Default::default()
    })
}

pub(crate) fn extract(document: &Document, selectors: &PositionSelectors) -> Vec<RawJob> {
    document
        .find_all(&selectors.item)
        .iter()
        .filter_map(|item| position_job(item, selectors))
        .collect()
}
