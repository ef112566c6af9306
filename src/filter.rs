//! Job filter
//!
//! A fixed-priority predicate chain over validated jobs. The first rule that
//! matches decides the reason, so every rejected job is counted exactly once.

use std::fmt;

use tracing::info;

use crate::config::FilterConfig;
use crate::types::JobRecord;

/// Why a job was filtered out, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterReason {
    /// Location lacks the target-region marker
    NotInRegion,
    /// Too much text in the unsupported script
    UnsupportedScript,
    /// Department is the catch-all bucket
    CatchAllDepartment,
}

impl FilterReason {
    pub const ALL: [FilterReason; 3] = [
        FilterReason::NotInRegion,
        FilterReason::UnsupportedScript,
        FilterReason::CatchAllDepartment,
    ];

    /// Counter key in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::NotInRegion => "job_not_in_israel",
            FilterReason::UnsupportedScript => "hebrew",
            FilterReason::CatchAllDepartment => "general_department",
        }
    }

    fn index(self) -> usize {
        match self {
            FilterReason::NotInRegion => 0,
            FilterReason::UnsupportedScript => 1,
            FilterReason::CatchAllDepartment => 2,
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected-job counts per reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts([usize; 3]);

impl FilterCounts {
    pub fn get(&self, reason: FilterReason) -> usize {
        self.0[reason.index()]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    fn bump(&mut self, reason: FilterReason) {
        self.0[reason.index()] += 1;
    }

    /// Add another batch's counts
    pub fn merge(&mut self, other: &FilterCounts) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0) {
            *mine += theirs;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterReason, usize)> + '_ {
        FilterReason::ALL.into_iter().map(|r| (r, self.get(r)))
    }
}

impl fmt::Display for FilterCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(r, n)| format!("{}={}", r, n)).collect();
        f.write_str(&parts.join(", "))
    }
}

/// Jobs that survived, plus why the rest did not
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<JobRecord>,
    pub counts: FilterCounts,
}

/// Region, script and department rules
#[derive(Debug, Clone)]
pub struct JobFilter {
    config: FilterConfig,
    excluded_department: String,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

impl JobFilter {
    pub fn new(config: FilterConfig) -> Self {
        let excluded_department = config.excluded_department.trim().to_lowercase();
        Self {
            config,
            excluded_department,
        }
    }

    /// The first rule that rejects `job`, if any
    pub fn evaluate(&self, job: &JobRecord) -> Option<FilterReason> {
        let in_region = job
            .location
            .as_deref()
            .is_some_and(|loc| loc.contains(self.config.region_marker.as_str()));
        if !in_region {
            return Some(FilterReason::NotInRegion);
        }

        if self.script_ratio(job).is_some_and(|ratio| ratio > self.config.max_script_ratio) {
            return Some(FilterReason::UnsupportedScript);
        }

        let department = job.department.as_deref().map(|d| d.trim().to_lowercase());
        if department.is_some_and(|d| d == self.excluded_department) {
            return Some(FilterReason::CatchAllDepartment);
        }

        None
    }

    /// Share of alphabetic characters in the unsupported script across title,
    /// description, location and company name. `None` when there are no
    /// alphabetic characters at all.
    pub fn script_ratio(&self, job: &JobRecord) -> Option<f64> {
        let description = job.description.plain_text();
        let fields = [
            Some(job.title.as_str()),
            Some(description.as_str()),
            job.location.as_deref(),
            job.company_name.as_deref(),
        ];

        let range = self.config.script_range_start..=self.config.script_range_end;
        let (mut in_script, mut alphabetic) = (0usize, 0usize);
        for c in fields.into_iter().flatten().flat_map(str::chars) {
            if c.is_alphabetic() {
                alphabetic += 1;
                if range.contains(&c) {
                    in_script += 1;
                }
            }
        }

        (alphabetic > 0).then(|| in_script as f64 / alphabetic as f64)
    }

    /// Partition a batch, preserving the order of kept jobs
    pub fn apply(&self, jobs: Vec<JobRecord>) -> FilterOutcome {
        let mut outcome = FilterOutcome {
            kept: Vec::with_capacity(jobs.len()),
            counts: FilterCounts::default(),
        };
        for job in jobs {
            match self.evaluate(&job) {
                Some(reason) => outcome.counts.bump(reason),
                None => outcome.kept.push(job),
            }
        }
        if outcome.counts.total() > 0 {
            info!(
                "Filtered {} jobs ({}), kept {}",
                outcome.counts.total(),
                outcome.counts,
                outcome.kept.len()
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::validator::validate_job;
    use crate::types::RawJob;

    fn job(title: &str, location: Option<&str>, department: Option<&str>) -> JobRecord {
        validate_job(&RawJob {
            title: Some(title.to_string()),
            url: Some(format!("https://www.comeet.com/jobs/acme/{}", title.len())),
            location: location.map(str::to_string),
            department: department.map(str::to_string),
            company_name: Some("Acme".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_hebrew_title_is_rejected_latin_kept() {
        let filter = JobFilter::default();
        let outcome = filter.apply(vec![
            job("מהנדס תוכנה", Some("Tel Aviv, ISRAEL"), None),
            job("Senior Engineer", Some("Tel Aviv, ISRAEL"), None),
        ]);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].title, "Senior Engineer");
        assert_eq!(outcome.counts.get(FilterReason::UnsupportedScript), 1);
        assert_eq!(outcome.counts.total(), 1);
    }

    #[test]
    fn test_region_rule_runs_first() {
        let filter = JobFilter::default();
        // Hebrew and outside the region: counted only as not-in-region
        let hebrew_abroad = job("מהנדס תוכנה", Some("Berlin, Germany"), Some("General"));
        assert_eq!(filter.evaluate(&hebrew_abroad), Some(FilterReason::NotInRegion));
        assert_eq!(
            filter.evaluate(&job("Engineer", None, None)),
            Some(FilterReason::NotInRegion)
        );
    }

    #[test]
    fn test_region_marker_is_case_sensitive() {
        let filter = JobFilter::default();
        assert_eq!(
            filter.evaluate(&job("Engineer", Some("Tel Aviv, Israel"), None)),
            Some(FilterReason::NotInRegion)
        );
    }

    #[test]
    fn test_catch_all_department_is_normalized() {
        let filter = JobFilter::default();
        assert_eq!(
            filter.evaluate(&job("Engineer", Some("ISRAEL"), Some("  GENERAL "))),
            Some(FilterReason::CatchAllDepartment)
        );
        assert_eq!(filter.evaluate(&job("Engineer", Some("ISRAEL"), Some("General Counsel"))), None);
    }

    #[test]
    fn test_ratio_threshold_is_strict() {
        let filter = JobFilter::default();
        // One Hebrew letter out of ten ("אabc" + "ISRAEL")
        let mut record = job("אabc", Some("ISRAEL"), None);
        record.company_name = None;
        assert_eq!(filter.script_ratio(&record), Some(0.1));
        assert_eq!(filter.evaluate(&record), None);
    }

    #[test]
    fn test_no_alphabetic_text_is_never_a_script_reject() {
        let filter = JobFilter::new(FilterConfig {
            region_marker: "42".to_string(),
            ..Default::default()
        });
        let mut record = job("123", Some("42"), None);
        record.company_name = None;
        assert_eq!(filter.script_ratio(&record), None);
        assert_eq!(filter.evaluate(&record), None);
    }

    #[test]
    fn test_counts_cover_every_input() {
        let filter = JobFilter::default();
        let jobs = vec![
            job("A", Some("ISRAEL"), None),
            job("B", Some("USA"), None),
            job("שלום", Some("ISRAEL"), None),
            job("D", Some("ISRAEL"), Some("general")),
            job("E", None, None),
        ];
        let total = jobs.len();
        let outcome = filter.apply(jobs);
        assert_eq!(outcome.kept.len() + outcome.counts.total(), total);
        assert_eq!(outcome.counts.get(FilterReason::NotInRegion), 2);
        assert_eq!(outcome.counts.get(FilterReason::CatchAllDepartment), 1);
    }

    #[test]
    fn test_merge_and_display() {
        let filter = JobFilter::default();
        let mut counts = filter.apply(vec![job("B", Some("USA"), None)]).counts;
        counts.merge(&filter.apply(vec![job("C", None, None)]).counts);
        assert_eq!(counts.get(FilterReason::NotInRegion), 2);
        assert_eq!(
            counts.to_string(),
            "job_not_in_israel=2, hebrew=0, general_department=0"
        );
    }
}
