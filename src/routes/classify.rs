// Route verdict classification: default-route origin, bogons, length, transit leaks

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{Asn, Prefix, Verdict};
use crate::error::{AppError, AppResult};

/// Reserved IPv4 space that should never show up in global routing.
pub const DEFAULT_BOGONS: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.0.2.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
];

pub const DEFAULT_TIER1_ASNS: &[Asn] = &[
    174, 209, 286, 701, 1239, 1299, 2828, 2914, 3257, 3320, 3356, 5511, 6453, 6461, 6762, 7018,
];

pub const DEFAULT_MAX_IPV4_LENGTH: u8 = 24;
pub const DEFAULT_MAX_IPV6_LENGTH: u8 = 48;

/// How the hops between two Tier-1 ASNs are located in a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeakIndexing {
    /// Span between the first occurrence of each Tier-1 ASN. A Tier-1 ASN that
    /// reappears later in the path (prepending, loops) is not seen again.
    #[default]
    FirstOccurrence,
    /// Span between the actual positions of consecutive Tier-1 hops.
    Positional,
}

/// Bogon networks and Tier-1 roster used by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTables {
    bogons: Vec<IpNet>,
    tier1: BTreeSet<Asn>,
}

impl Default for RouteTables {
    fn default() -> Self {
        RouteTables {
            bogons: DEFAULT_BOGONS
                .iter()
                .filter_map(|b| b.parse().ok())
                .collect(),
            tier1: DEFAULT_TIER1_ASNS.iter().copied().collect(),
        }
    }
}

impl RouteTables {
    pub fn new(bogons: Vec<IpNet>, tier1: impl IntoIterator<Item = Asn>) -> Self {
        RouteTables {
            bogons,
            tier1: tier1.into_iter().collect(),
        }
    }

    /// Build tables from configuration strings. An unparsable bogon entry is a config error.
    pub fn from_config(bogons: &[String], tier1: &[Asn]) -> AppResult<Self> {
        let bogons = bogons
            .iter()
            .map(|b| {
                b.parse::<IpNet>()
                    .map_err(|_| AppError::Config(format!("invalid bogon network '{}'", b)))
            })
            .collect::<AppResult<Vec<_>>>()?;

        if let Some(zero) = tier1.iter().find(|asn| **asn == 0) {
            return Err(AppError::Config(format!("invalid tier-1 ASN {}", zero)));
        }

        Ok(Self::new(bogons, tier1.iter().copied()))
    }

    pub fn is_tier1(&self, asn: Asn) -> bool {
        self.tier1.contains(&asn)
    }

    /// Subnet-of containment against every bogon block.
    pub fn is_bogon(&self, prefix: &Prefix) -> bool {
        self.bogons.iter().any(|bogon| bogon.contains(prefix.net()))
    }

    /// String form of [`is_bogon`](Self::is_bogon). Unparsable input is not a bogon.
    pub fn is_bogon_str(&self, prefix: &str) -> bool {
        match prefix.parse::<IpNet>() {
            Ok(net) => self.is_bogon(&Prefix::from(net)),
            Err(_) => false,
        }
    }
}

/// Assigns one verdict per (peer, prefix, path). First matching rule wins:
/// default-route origin, bogon, too long, transit leak, ok.
#[derive(Debug, Clone)]
pub struct RouteVerdictClassifier {
    tables: RouteTables,
    max_ipv4_length: u8,
    max_ipv6_length: u8,
    leak_indexing: LeakIndexing,
}

impl Default for RouteVerdictClassifier {
    fn default() -> Self {
        Self::new(RouteTables::default())
    }
}

impl RouteVerdictClassifier {
    pub fn new(tables: RouteTables) -> Self {
        RouteVerdictClassifier {
            tables,
            max_ipv4_length: DEFAULT_MAX_IPV4_LENGTH,
            max_ipv6_length: DEFAULT_MAX_IPV6_LENGTH,
            leak_indexing: LeakIndexing::default(),
        }
    }

    pub fn with_max_lengths(mut self, ipv4: u8, ipv6: u8) -> Self {
        self.max_ipv4_length = ipv4;
        self.max_ipv6_length = ipv6;
        self
    }

    pub fn with_leak_indexing(mut self, leak_indexing: LeakIndexing) -> Self {
        self.leak_indexing = leak_indexing;
        self
    }

    pub fn classify(&self, peer_asn: Asn, prefix: &Prefix, path: &[Asn]) -> Verdict {
        if prefix.is_default_route() {
            if !path.is_empty() && path.iter().all(|hop| *hop == peer_asn) {
                Verdict::RouteOk
            } else {
                Verdict::BadOrigDefault
            }
        } else if self.tables.is_bogon(prefix) {
            Verdict::BogonPrefix
        } else if self.is_too_long(prefix) {
            Verdict::PrefixToolong
        } else if self.is_transit_leak(path) {
            Verdict::TransitLeak
        } else {
            Verdict::RouteOk
        }
    }

    fn is_too_long(&self, prefix: &Prefix) -> bool {
        let max = if prefix.is_ipv4() {
            self.max_ipv4_length
        } else {
            self.max_ipv6_length
        };
        prefix.prefix_len() > max
    }

    /// A path leaks when a non-Tier-1 hop sits between two consecutive Tier-1 hops.
    pub fn is_transit_leak(&self, path: &[Asn]) -> bool {
        let tier1_positions: Vec<usize> = path
            .iter()
            .enumerate()
            .filter(|(_, asn)| self.tables.is_tier1(**asn))
            .map(|(pos, asn)| match self.leak_indexing {
                LeakIndexing::Positional => pos,
                LeakIndexing::FirstOccurrence => first_index(path, *asn).unwrap_or(pos),
            })
            .collect();

        tier1_positions.windows(2).any(|pair| {
            let (start, end) = (pair[0], pair[1]);
            start + 1 < end
                && path[start + 1..end]
                    .iter()
                    .any(|asn| !self.tables.is_tier1(*asn))
        })
    }
}

fn first_index(path: &[Asn], asn: Asn) -> Option<usize> {
    path.iter().position(|hop| *hop == asn)
}
