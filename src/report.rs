// Plain-text report tables for the collect, propagation and audit commands

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use crate::collect::CollectionSummary;
use crate::router::audit::AuditReport;
use crate::routes::propagation::{CheckStatus, PrefixPropagation};
use crate::routes::Asn;

const PREFIX_WIDTH: usize = 22;
const ORIGIN_WIDTH: usize = 8;
const DETAIL_INDENT: usize = PREFIX_WIDTH + ORIGIN_WIDTH + 1;

pub fn render_collection_summary(summary: &CollectionSummary, output: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n===== Summary =====");
    let _ = writeln!(out, "Total prefixes in input list    : {}", summary.requested);
    let _ = writeln!(out, "Ignored via prefix ignore file  : {}", summary.ignored);
    let _ = writeln!(out, "Prefixes queried                : {}", summary.queried);
    let _ = writeln!(out, "Prefixes in final JSON output   : {}", summary.present);

    if summary.recovered_all() {
        let _ = writeln!(out, "[+] All previously missing prefixes successfully recovered.");
    } else if !summary.still_missing.is_empty() {
        let _ = writeln!(out, "[!] Still missing {} prefix(es) after retry:", summary.still_missing.len());
        for prefix in &summary.still_missing {
            let _ = writeln!(out, "    - {}", prefix);
        }
    }

    let _ = writeln!(out, "[+] JSON written to: {}", output.display());
    out
}

/// Upstream table per prefix. Unconfirmed upstreams carry a trailing `*`; when
/// expected upstreams were given each prefix lists `[ OK ]`/`[FAIL]` checks instead.
pub fn render_propagation(target_asn: Asn, reports: &[PrefixPropagation], names: &BTreeMap<Asn, String>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{:<pw$} {:<ow$} Global Propagation from AS{}",
        "Prefix",
        "OriginAS",
        target_asn,
        pw = PREFIX_WIDTH,
        ow = ORIGIN_WIDTH
    );

    for report in reports {
        let prefix = report.prefix.to_string();

        if !report.target_seen && report.checks.is_empty() {
            let note = format!("(no as-paths including {})", target_asn);
            let _ = writeln!(out, "{:<pw$} {:<ow$} {}", prefix, "", note, pw = PREFIX_WIDTH, ow = ORIGIN_WIDTH);
            continue;
        }

        let origins = report
            .origins
            .iter()
            .map(Asn::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(out, "{:<pw$} {}", prefix, origins, pw = PREFIX_WIDTH);

        if !report.checks.is_empty() {
            for check in &report.checks {
                let name = names.get(&check.asn).map(String::as_str).unwrap_or("???");
                let label = match check.status {
                    CheckStatus::Ok => "[ OK ]",
                    CheckStatus::Fail => "[FAIL]",
                };
                let _ = writeln!(out, "{:<w$} {:<8} {:<30} {}", "", check.asn, name, label, w = DETAIL_INDENT);
            }
        } else if !report.upstreams.is_empty() {
            let line = report
                .upstreams
                .iter()
                .map(|u| if u.corroborated { u.asn.to_string() } else { format!("{}*", u.asn) })
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "{:<w$} {}", "", line, w = DETAIL_INDENT);
        } else if report.hidden_single_source > 0 {
            let _ = writeln!(
                out,
                "{:<w$} (only single-source upstreams seen: {})",
                "",
                report.hidden_single_source,
                w = DETAIL_INDENT
            );
        } else {
            let _ = writeln!(out, "{:<w$} (no upstream of {} seen)", "", target_asn, w = DETAIL_INDENT);
        }

        let _ = writeln!(out);
    }

    out
}

pub fn render_audit(router: &str, report: &AuditReport, show_ok: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, ">> {} system ASN is {}", router, report.local_asn);

    if report.skipped.is_empty() {
        let _ = writeln!(out, "Skipping 0 neighbors(s):");
    } else {
        let _ = writeln!(out, "Skipping {} neighbors(s):", report.skipped.len());
        let rows: Vec<(String, String, &str)> = report
            .skipped
            .iter()
            .map(|s| (s.peer.address.to_string(), format!("AS{}", s.peer.asn), s.reason.as_str()))
            .collect();
        let ip_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
        let asn_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0);
        for (ip, asn, reason) in rows {
            let _ = writeln!(out, "  - {:<iw$}  {:<aw$}  Skipped: {}", ip, asn, reason, iw = ip_width, aw = asn_width);
        }
    }

    let _ = writeln!(out, "\nAnalyzing {} neighbor(s)...\n", report.neighbors.len());
    for neighbor in &report.neighbors {
        let _ = writeln!(
            out,
            ">>> Neighbor {} (AS{}) : [{} prefixes]",
            neighbor.peer.address,
            neighbor.peer.asn,
            neighbor.findings.len()
        );
        for finding in neighbor.findings.iter().filter(|f| show_ok || !f.verdict.is_ok()) {
            let path = finding
                .path
                .iter()
                .map(Asn::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "    [{:^16}]   {:<23} {}", finding.verdict, finding.prefix.to_string(), path);
        }
    }

    out
}
