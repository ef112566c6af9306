//! Strategy 3: generic job cards

use scraper::Selector;

use super::dom::{compile, Document, Node};
use crate::types::RawJob;

pub(crate) struct CardSelectors {
    card: Vec<Selector>,
    title: Vec<Selector>,
    department: Vec<Selector>,
    location: Vec<Selector>,
    employment_type: Vec<Selector>,
    link: Vec<Selector>,
}

impl CardSelectors {
    pub fn new() -> Self {
        Self {
            card: compile(&["div.job-card, div.job-listing, div.job-item, div.position-card"]),
            title: compile(&["h2", "h3", ".job-title", ".position-title"]),
            department: compile(&[".department", ".team", ".category"]),
            location: compile(&[".location", ".job-location"]),
            employment_type: compile(&[".employment-type", ".job-type"]),
            link: compile(&["a[href]"]),
        }
    }
}

fn card_job(card: &Node<'_>, selectors: &CardSelectors) -> Option<RawJob> {
    let title = card.first_text(&selectors.title)?;
    Some(RawJob {
        title: Some(title),
        department: card.first_text(&selectors.department),
        location: card.first_text(&selectors.location),
        employment_type: card.first_text(&selectors.employment_type),
        url: card
            .find_first(&selectors.link)
            .and_then(|a| a.attr("href"))
            .map(str::to_string),
        ..Default::default()
    })
}

pub(crate) fn extract(document: &Document, selectors: &CardSelectors) -> Vec<RawJob> {
    document
        .find_all(&selectors.card)
        .iter()
        .filter_map(|card| card_job(card, selectors))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(html: &str) -> Vec<RawJob> {
        extract(&Document::parse(html), &CardSelectors::new())
    }

    #[test]
    fn test_card_fields_in_priority_order() {
        let jobs = run(r#"
            <div class="job-listing">
              <h3>Support Lead</h3>
              <span class="job-title">Ignored</span>
              <span class="team">Customer Success</span>
              <span class="job-location">Jerusalem, ISRAEL</span>
              <span class="job-type">Part-time</span>
              <a href="https://jobs.lever.co/acme/7">Apply</a>
            </div>
            <div class="position-card">
              <span class="position-title">Analyst</span>
            </div>"#);
        assert_eq!(jobs.len(), 2);
        let lead = &jobs[0];
        assert_eq!(lead.title.as_deref(), Some("Support Lead"));
        assert_eq!(lead.department.as_deref(), Some("Customer Success"));
        assert_eq!(lead.location.as_deref(), Some("Jerusalem, ISRAEL"));
        assert_eq!(lead.employment_type.as_deref(), Some("Part-time"));
        assert_eq!(lead.url.as_deref(), Some("https://jobs.lever.co/acme/7"));

        assert_eq!(jobs[1].title.as_deref(), Some("Analyst"));
        assert_eq!(jobs[1].url, None);
    }

    #[test]
    fn test_card_without_title_is_dropped() {
        let jobs = run(r#"<div class="job-card"><a href="/x">Apply</a></div>"#);
        assert!(jobs.is_empty());
    }
}
