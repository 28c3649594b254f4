// Router API access and parsing of its BGP text output

pub mod audit;
pub mod vyos;

use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::routes::parser::path_after_metric;
use crate::routes::{AsPath, Asn, Prefix};

/// Value a router API reports when the local ASN cannot be read.
pub const UNKNOWN_ASN: &str = "UNKNOWN";

/// Administrative API of one router. Transport and auth live behind this trait.
#[async_trait]
pub trait RouterApi: Send + Sync {
    /// Locally configured ASN as a decimal string, or [`UNKNOWN_ASN`].
    async fn local_asn(&self) -> String;

    /// IPv4 BGP peering summary text, empty on failure.
    async fn bgp_summary(&self) -> String;

    /// Received-routes text for one neighbor, empty on failure.
    async fn received_routes(&self, neighbor: IpAddr) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BgpPeer {
    pub address: IpAddr,
    pub asn: Asn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRoute {
    pub prefix: Prefix,
    pub path: AsPath,
}

/// Neighbor rows of a BGP summary: everything after the `Neighbor` header except `Total` lines.
pub fn parse_bgp_summary(text: &str) -> Vec<BgpPeer> {
    let mut peers = Vec::new();
    let mut capture = false;

    for line in text.lines().map(str::trim) {
        if line.starts_with("Neighbor") {
            capture = true;
            continue;
        }
        if !capture || line.is_empty() || line.starts_with("Total") {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        match (parts[0].parse::<IpAddr>(), parts[2].parse::<Asn>()) {
            (Ok(address), Ok(asn)) if asn > 0 => peers.push(BgpPeer { address, asn }),
            _ => tracing::debug!("Skipping summary row: {}", line),
        }
    }

    peers
}

/// Finalized rows of a received-routes table (origin code `i`, `e` or `?`).
pub fn parse_received_routes(text: &str) -> Vec<ReceivedRoute> {
    let mut routes = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("Network") || line.starts_with("BGP") || line.contains("Next Hop") {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if !matches!(parts.last(), Some(&"i") | Some(&"e") | Some(&"?")) {
            continue;
        }

        let candidate = if matches!(parts[0], "*" | "*>") {
            parts.get(1).copied()
        } else {
            parts.first().copied()
        };
        let Some(candidate) = candidate.filter(|c| c.contains('/')) else {
            continue;
        };
        let Ok(prefix) = candidate.parse::<Prefix>() else {
            tracing::debug!("Skipping route with invalid prefix: {}", candidate);
            continue;
        };

        routes.push(ReceivedRoute {
            prefix,
            path: path_after_metric(parts.iter().copied()),
        });
    }

    routes
}

/// API key from the command line/environment, else `~/<router>.api`.
pub fn resolve_api_key(router: &str, explicit: Option<String>, home: Option<&Path>) -> AppResult<String> {
    if let Some(key) = explicit.filter(|k| !k.trim().is_empty()) {
        return Ok(key.trim().to_string());
    }

    let keyfile: Option<PathBuf> = home.map(|h| h.join(format!("{}.api", router)));
    if let Some(path) = keyfile.filter(|p| p.is_file()) {
        let key = std::fs::read_to_string(&path)?.trim().to_string();
        if !key.is_empty() {
            tracing::debug!("Using API key from {}", path.display());
            return Ok(key);
        }
    }

    Err(AppError::Config(
        "must provide API key via --key or BGP_AUDIT_API_KEY or ~/<router>.api".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "\
IPv4 Unicast Summary (VRF default):
BGP router identifier 192.0.2.1, local AS number 64500 vrf-id 0
BGP table version 1234

Neighbor        V         AS   MsgRcvd   MsgSent   TblVer  InQ OutQ  Up/Down State/PfxRcd   PfxSnt Desc
203.0.113.1     4       3356    123456     65432        0    0    0 5d02h01m       950123      101 N/A
198.51.100.7    4      65332       100        90        0    0    0 5d02h01m           12        0 N/A
2001:db8::1     4     212232        10        10        0    0    0 01:00:00           0        0 N/A

Total number of neighbors 3
";

    #[test]
    fn test_parse_bgp_summary() {
        let peers = parse_bgp_summary(SUMMARY);
        assert_eq!(peers.len(), 3);
        assert_eq!(peers[0].address, "203.0.113.1".parse::<IpAddr>().unwrap());
        assert_eq!(peers[0].asn, 3356);
        assert_eq!(peers[2].asn, 212232);
    }

    #[test]
    fn test_parse_bgp_summary_without_header() {
        assert!(parse_bgp_summary("203.0.113.1 4 3356 1 1 0 0 0 1d 1 1 N/A").is_empty());
    }

    #[test]
    fn test_parse_received_routes() {
        let text = "\
BGP table version is 12, local router ID is 192.0.2.1, vrf id 0
Status codes:  s suppressed, d damped, h history, * valid, > best, = multipath,
     Network          Next Hop            Metric LocPrf Weight Path
*> 0.0.0.0/0          203.0.113.1              0             0 3356 i
*> 8.8.8.0/24         203.0.113.1              0             0 3356 15169 i
*  10.0.0.0/8         203.0.113.1              0             0 3356 64512 ?
*> 192.0.2.128/25     203.0.113.1              0             0 3356 64496 64496 e
*> 192.0.2.1/24       203.0.113.1              0             0 3356 i
   198.51.100.0/24    203.0.113.1              0             0 3356 64497 i
*> 203.0.113.0/24     203.0.113.1              0             0 3356 64498 incomplete
";
        let routes = parse_received_routes(text);
        assert_eq!(routes.len(), 5);
        assert_eq!(routes[0].prefix.to_string(), "0.0.0.0/0");
        assert_eq!(routes[0].path, vec![0, 3356]);
        assert_eq!(routes[1].path, vec![0, 3356, 15169]);
        assert_eq!(routes[3].path, vec![0, 3356, 64496, 64496]);
        assert_eq!(routes[4].prefix.to_string(), "198.51.100.0/24");
    }

    #[test]
    fn test_resolve_api_key_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("edge1.api"), "file-key\n").unwrap();

        assert_eq!(resolve_api_key("edge1", Some("cli-key".to_string()), Some(dir.path())).unwrap(), "cli-key");
        assert_eq!(resolve_api_key("edge1", None, Some(dir.path())).unwrap(), "file-key");
        assert!(matches!(resolve_api_key("edge2", None, Some(dir.path())), Err(AppError::Config(_))));
        assert!(resolve_api_key("edge1", Some("  ".to_string()), None).is_err());
    }
}
