// Upstream propagation analysis across vantage points

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{Asn, CanonicalDataset, Prefix, RouteObservation};

pub const DEFAULT_CORROBORATION_THRESHOLD: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationOptions {
    pub target_asn: Asn,
    pub expected_upstreams: BTreeSet<Asn>,
    /// An upstream is corroborated when strictly more distinct sources than this report it.
    pub corroboration_threshold: usize,
    pub include_single_source: bool,
}

impl PropagationOptions {
    pub fn new(target_asn: Asn) -> Self {
        PropagationOptions {
            target_asn,
            expected_upstreams: BTreeSet::new(),
            corroboration_threshold: DEFAULT_CORROBORATION_THRESHOLD,
            include_single_source: false,
        }
    }
}

/// One candidate upstream and the vantage points that saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamEvidence {
    pub asn: Asn,
    pub sources: BTreeSet<Asn>,
    pub corroborated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Ok,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamCheck {
    pub asn: Asn,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixPropagation {
    pub prefix: Prefix,
    pub origins: BTreeSet<Asn>,
    /// Corroborated upstreams, plus unconfirmed ones when single-source paths are included.
    pub upstreams: Vec<UpstreamEvidence>,
    /// Filled only when expected upstreams were given.
    pub checks: Vec<UpstreamCheck>,
    /// True when at least one observed path contains the target ASN.
    pub target_seen: bool,
    /// Single-source upstreams left out of `upstreams`.
    pub hidden_single_source: usize,
}

impl PrefixPropagation {
    pub fn corroborated(&self) -> impl Iterator<Item = Asn> + '_ {
        self.upstreams.iter().filter(|u| u.corroborated).map(|u| u.asn)
    }
}

pub struct PropagationAnalyzer {
    options: PropagationOptions,
}

impl PropagationAnalyzer {
    pub fn new(options: PropagationOptions) -> Self {
        PropagationAnalyzer { options }
    }

    /// Report every prefix of the dataset, in prefix order.
    pub fn analyze(&self, dataset: &CanonicalDataset) -> Vec<PrefixPropagation> {
        dataset
            .iter()
            .map(|(prefix, observations)| self.report_for(*prefix, observations))
            .collect()
    }

    pub fn report_for(&self, prefix: Prefix, observations: &[RouteObservation]) -> PrefixPropagation {
        let target = self.options.target_asn;
        let mut origins = BTreeSet::new();
        let mut seen: BTreeMap<Asn, BTreeSet<Asn>> = BTreeMap::new();
        let mut target_seen = false;

        for observation in observations {
            if !observation.as_path.contains(&target) {
                continue;
            }
            target_seen = true;

            if let Some(origin) = observation.as_path.last() {
                origins.insert(*origin);
            }

            if let Some(upstream) = upstream_of(&observation.as_path, target) {
                seen.entry(upstream).or_default().insert(observation.source_asn);
            }
        }

        let (upstreams, hidden): (Vec<UpstreamEvidence>, Vec<UpstreamEvidence>) = seen
            .into_iter()
            .map(|(asn, sources)| UpstreamEvidence {
                asn,
                corroborated: sources.len() > self.options.corroboration_threshold,
                sources,
            })
            .partition(|u| u.corroborated || self.options.include_single_source);

        let checks = self
            .options
            .expected_upstreams
            .iter()
            .map(|expected| UpstreamCheck {
                asn: *expected,
                status: if upstreams.iter().any(|u| u.corroborated && u.asn == *expected) {
                    CheckStatus::Ok
                } else {
                    CheckStatus::Fail
                },
            })
            .collect();

        PrefixPropagation {
            prefix,
            origins,
            upstreams,
            checks,
            target_seen,
            hidden_single_source: hidden.len(),
        }
    }
}

/// The hop before `target` in the path with repeats removed, if target is not first.
pub fn upstream_of(path: &[Asn], target: Asn) -> Option<Asn> {
    let deduped = dedup_first_occurrence(path);
    match deduped.iter().position(|asn| *asn == target) {
        Some(idx) if idx >= 1 => Some(deduped[idx - 1]),
        _ => None,
    }
}

/// Keep the first occurrence of each ASN, preserving order.
pub fn dedup_first_occurrence(path: &[Asn]) -> Vec<Asn> {
    let mut seen = BTreeSet::new();
    path.iter().copied().filter(|asn| seen.insert(*asn)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Asn = 19366;

    fn obs(source_asn: Asn, as_path: &[Asn]) -> RouteObservation {
        RouteObservation {
            source_asn,
            as_path: as_path.to_vec(),
            communities: Vec::new(),
        }
    }

    fn prefix() -> Prefix {
        "192.0.2.0/24".parse().unwrap()
    }

    #[test]
    fn test_upstream_of() {
        assert_eq!(upstream_of(&[6939, 3356, TARGET], TARGET), Some(3356));
        assert_eq!(upstream_of(&[3356, 3356, TARGET, TARGET], TARGET), Some(3356));
        assert_eq!(upstream_of(&[TARGET, 64500], TARGET), None);
        assert_eq!(upstream_of(&[TARGET, TARGET, 64500], TARGET), None);
        assert_eq!(upstream_of(&[6939, 3356], TARGET), None);
    }

    #[test]
    fn test_dedup_first_occurrence() {
        assert_eq!(dedup_first_occurrence(&[1, 1, 2, 1, 3, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn test_single_source_not_significant() {
        let analyzer = PropagationAnalyzer::new(PropagationOptions::new(TARGET));
        let report = analyzer.report_for(prefix(), &[obs(6939, &[6939, 3356, TARGET]), obs(6939, &[6939, 3356, TARGET])]);
        assert!(report.upstreams.is_empty());
        assert!(report.target_seen);
        assert_eq!(report.hidden_single_source, 1);
    }

    #[test]
    fn test_two_sources_are_significant() {
        let analyzer = PropagationAnalyzer::new(PropagationOptions::new(TARGET));
        let report = analyzer.report_for(
            prefix(),
            &[obs(6939, &[6939, 3356, TARGET]), obs(1299, &[1299, 3356, TARGET])],
        );
        assert_eq!(report.upstreams.len(), 1);
        assert_eq!(report.upstreams[0].asn, 3356);
        assert!(report.upstreams[0].corroborated);
        assert_eq!(report.upstreams[0].sources, BTreeSet::from([1299, 6939]));
        assert_eq!(report.origins, BTreeSet::from([TARGET]));
    }

    #[test]
    fn test_include_single_source_marks_unconfirmed() {
        let mut options = PropagationOptions::new(TARGET);
        options.include_single_source = true;
        let analyzer = PropagationAnalyzer::new(options);
        let report = analyzer.report_for(
            prefix(),
            &[
                obs(6939, &[6939, 3356, TARGET]),
                obs(1299, &[1299, 3356, TARGET]),
                obs(2914, &[2914, 174, TARGET, 64500]),
            ],
        );
        assert_eq!(report.upstreams.len(), 2);
        assert_eq!(report.hidden_single_source, 0);
        let cogent = report.upstreams.iter().find(|u| u.asn == 174).unwrap();
        assert!(!cogent.corroborated);
        assert_eq!(report.corroborated().collect::<Vec<_>>(), vec![3356]);
        assert_eq!(report.origins, BTreeSet::from([TARGET, 64500]));
    }

    #[test]
    fn test_threshold_is_configurable() {
        let mut options = PropagationOptions::new(TARGET);
        options.corroboration_threshold = 2;
        let analyzer = PropagationAnalyzer::new(options);
        let two = [obs(6939, &[6939, 3356, TARGET]), obs(1299, &[1299, 3356, TARGET])];
        assert!(analyzer.report_for(prefix(), &two).upstreams.is_empty());

        let three = [two[0].clone(), two[1].clone(), obs(174, &[174, 3356, TARGET])];
        assert_eq!(analyzer.report_for(prefix(), &three).upstreams.len(), 1);
    }

    #[test]
    fn test_expected_upstream_checks() {
        let mut options = PropagationOptions::new(TARGET);
        options.expected_upstreams = BTreeSet::from([174, 3356]);
        options.include_single_source = true;
        let analyzer = PropagationAnalyzer::new(options);
        let report = analyzer.report_for(
            prefix(),
            &[
                obs(6939, &[6939, 3356, TARGET]),
                obs(1299, &[1299, 3356, TARGET]),
                obs(2914, &[2914, 174, TARGET]),
            ],
        );
        assert_eq!(
            report.checks,
            vec![
                UpstreamCheck { asn: 174, status: CheckStatus::Fail },
                UpstreamCheck { asn: 3356, status: CheckStatus::Ok },
            ]
        );
    }

    #[test]
    fn test_target_absent() {
        let mut options = PropagationOptions::new(TARGET);
        options.expected_upstreams = BTreeSet::from([3356]);
        let analyzer = PropagationAnalyzer::new(options);
        let report = analyzer.report_for(prefix(), &[obs(6939, &[6939, 64500])]);
        assert!(!report.target_seen);
        assert!(report.origins.is_empty());
        assert_eq!(report.checks[0].status, CheckStatus::Fail);
    }

    #[test]
    fn test_analyze_walks_dataset() {
        let mut dataset = CanonicalDataset::new();
        dataset.extend(prefix(), vec![obs(6939, &[6939, 3356, TARGET]), obs(1299, &[1299, 3356, TARGET])]);
        dataset.extend("198.51.100.0/24".parse().unwrap(), vec![obs(6939, &[6939, TARGET])]);

        let analyzer = PropagationAnalyzer::new(PropagationOptions::new(TARGET));
        let reports = analyzer.analyze(&dataset);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].prefix, prefix());
        assert_eq!(reports[0].upstreams.len(), 1);
        assert!(reports[1].upstreams.is_empty());
    }
}
