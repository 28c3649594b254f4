// Router audit - classify every route received from each BGP neighbor

use serde::Serialize;
use std::collections::BTreeMap;

use super::{parse_bgp_summary, parse_received_routes, BgpPeer, RouterApi};
use crate::error::{AppError, AppResult};
use crate::routes::classify::RouteVerdictClassifier;
use crate::routes::{parse_asn, AsPath, Asn, Prefix, Verdict};

/// Peers that carry non-customer feeds and are never audited unless explicitly included.
pub const ALWAYS_SKIPPED: &[(Asn, &str)] = &[(65332, "bogons feed"), (212232, "bgp.tools")];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPeer {
    pub peer: BgpPeer,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteFinding {
    pub prefix: Prefix,
    pub path: AsPath,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborAudit {
    pub peer: BgpPeer,
    pub findings: Vec<RouteFinding>,
}

impl NeighborAudit {
    pub fn verdict_counts(&self) -> BTreeMap<Verdict, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.verdict).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub local_asn: Asn,
    pub skipped: Vec<SkippedPeer>,
    pub neighbors: Vec<NeighborAudit>,
}

impl AuditReport {
    pub fn problem_count(&self) -> usize {
        self.neighbors
            .iter()
            .flat_map(|n| &n.findings)
            .filter(|f| !f.verdict.is_ok())
            .count()
    }
}

/// Split peers into those to audit and those to skip, with a reason for each skip.
/// An include list restricts the audit to its members and overrides every other skip.
pub fn select_peers(peers: &[BgpPeer], local_asn: Asn, include: &[Asn]) -> (Vec<BgpPeer>, Vec<SkippedPeer>) {
    let mut selected = Vec::new();
    let mut skipped = Vec::new();

    for peer in peers {
        let reason = if !include.is_empty() {
            (!include.contains(&peer.asn)).then_some("Not in include list")
        } else if peer.asn == local_asn {
            Some("remote AS same as system AS")
        } else {
            ALWAYS_SKIPPED
                .iter()
                .find(|(asn, _)| *asn == peer.asn)
                .map(|(_, reason)| *reason)
        };

        match reason {
            Some(reason) => skipped.push(SkippedPeer {
                peer: *peer,
                reason: reason.to_string(),
            }),
            None => selected.push(*peer),
        }
    }

    (selected, skipped)
}

pub async fn run_audit(
    api: &dyn RouterApi,
    classifier: &RouteVerdictClassifier,
    include: &[Asn],
) -> AppResult<AuditReport> {
    let reported = api.local_asn().await;
    let local_asn = parse_asn(&reported).map_err(|_| AppError::UnknownLocalAsn(reported.clone()))?;
    tracing::info!("System ASN is {}", local_asn);

    let summary = api.bgp_summary().await;
    if summary.trim().is_empty() {
        return Err(AppError::RouterApi("error fetching BGP summary".to_string()));
    }

    let peers = parse_bgp_summary(&summary);
    tracing::info!("Found {} BGP neighbors", peers.len());

    let (selected, skipped) = select_peers(&peers, local_asn, include);
    tracing::info!("Analyzing {} neighbor(s), skipping {}", selected.len(), skipped.len());

    let mut neighbors = Vec::with_capacity(selected.len());
    for peer in selected {
        let routes = parse_received_routes(&api.received_routes(peer.address).await);
        tracing::debug!("Neighbor {} (AS{}) sent {} prefixes", peer.address, peer.asn, routes.len());

        let findings = routes
            .into_iter()
            .map(|route| RouteFinding {
                verdict: classifier.classify(peer.asn, &route.prefix, &route.path),
                prefix: route.prefix,
                path: route.path,
            })
            .collect();

        neighbors.push(NeighborAudit { peer, findings });
    }

    Ok(AuditReport {
        local_asn,
        skipped,
        neighbors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::UNKNOWN_ASN;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::Mutex;

    struct CannedRouter {
        local_asn: String,
        summary: String,
        routes: HashMap<IpAddr, String>,
        queried: Mutex<Vec<IpAddr>>,
    }

    impl CannedRouter {
        fn new(local_asn: &str, summary: &str) -> Self {
            CannedRouter {
                local_asn: local_asn.to_string(),
                summary: summary.to_string(),
                routes: HashMap::new(),
                queried: Mutex::new(Vec::new()),
            }
        }

        fn with_routes(mut self, neighbor: &str, text: &str) -> Self {
            self.routes.insert(neighbor.parse().unwrap(), text.to_string());
            self
        }
    }

    #[async_trait]
    impl RouterApi for CannedRouter {
        async fn local_asn(&self) -> String {
            self.local_asn.clone()
        }

        async fn bgp_summary(&self) -> String {
            self.summary.clone()
        }

        async fn received_routes(&self, neighbor: IpAddr) -> String {
            self.queried.lock().unwrap().push(neighbor);
            self.routes.get(&neighbor).cloned().unwrap_or_default()
        }
    }

    const SUMMARY: &str = "\
Neighbor        V         AS   MsgRcvd   MsgSent   TblVer  InQ OutQ  Up/Down State/PfxRcd   PfxSnt Desc
203.0.113.1     4       3356       100       100        0    0    0 5d02h01m            4        1 N/A
203.0.113.9     4      64501       100       100        0    0    0 5d02h01m            1        1 N/A
198.51.100.7    4      65332       100       100        0    0    0 5d02h01m           12        0 N/A
198.51.100.8    4     212232       100       100        0    0    0 5d02h01m            0        0 N/A
192.0.2.2       4      64500       100       100        0    0    0 5d02h01m            0        0 N/A
Total number of neighbors 5
";

    fn peer(address: &str, asn: Asn) -> BgpPeer {
        BgpPeer {
            address: address.parse().unwrap(),
            asn,
        }
    }

    #[test]
    fn test_select_peers_default_skips() {
        let peers = parse_bgp_summary(SUMMARY);
        let (selected, skipped) = select_peers(&peers, 64500, &[]);

        assert_eq!(selected, vec![peer("203.0.113.1", 3356), peer("203.0.113.9", 64501)]);
        let reasons: Vec<&str> = skipped.iter().map(|s| s.reason.as_str()).collect();
        assert_eq!(reasons, vec!["bogons feed", "bgp.tools", "remote AS same as system AS"]);
    }

    #[test]
    fn test_include_list_overrides_skips() {
        let peers = parse_bgp_summary(SUMMARY);
        let (selected, skipped) = select_peers(&peers, 64500, &[65332]);

        assert_eq!(selected, vec![peer("198.51.100.7", 65332)]);
        assert_eq!(skipped.len(), 4);
        assert!(skipped.iter().all(|s| s.reason == "Not in include list"));
    }

    #[tokio::test]
    async fn test_run_audit_classifies_routes() {
        let router = CannedRouter::new("64500", SUMMARY)
            .with_routes(
                "203.0.113.1",
                "\
     Network          Next Hop            Metric LocPrf Weight Path
*> 0.0.0.0/0          203.0.113.1                            0 3356 i
*> 10.0.0.0/8         203.0.113.1                            0 3356 64512 i
*> 8.8.8.0/25         203.0.113.1                            0 3356 15169 i
*> 8.8.8.0/24         203.0.113.1                            0 3356 15169 i
",
            )
            .with_routes(
                "203.0.113.9",
                "*> 1.1.1.0/24         203.0.113.9                            0 64501 3356 64999 1299 13335 i\n",
            );

        let report = run_audit(&router, &RouteVerdictClassifier::default(), &[]).await.unwrap();
        assert_eq!(report.local_asn, 64500);
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(report.neighbors.len(), 2);

        let verdicts: Vec<Verdict> = report.neighbors[0].findings.iter().map(|f| f.verdict).collect();
        assert_eq!(
            verdicts,
            vec![Verdict::RouteOk, Verdict::BogonPrefix, Verdict::PrefixToolong, Verdict::RouteOk]
        );
        assert_eq!(report.neighbors[1].findings[0].verdict, Verdict::TransitLeak);
        assert_eq!(report.problem_count(), 3);
        assert_eq!(report.neighbors[0].verdict_counts()[&Verdict::RouteOk], 2);

        let queried = router.queried.lock().unwrap().clone();
        assert_eq!(queried.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_local_asn_is_fatal() {
        let router = CannedRouter::new(UNKNOWN_ASN, SUMMARY);
        let result = run_audit(&router, &RouteVerdictClassifier::default(), &[]).await;
        assert!(matches!(result, Err(AppError::UnknownLocalAsn(_))));
        assert!(router.queried.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_summary_is_fatal() {
        let router = CannedRouter::new("64500", "");
        let result = run_audit(&router, &RouteVerdictClassifier::default(), &[]).await;
        assert!(matches!(result, Err(AppError::RouterApi(_))));
    }
}
