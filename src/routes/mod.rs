// Routes module - prefixes, route observations and the canonical dataset

pub mod classify;
pub mod parser;
pub mod propagation;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Autonomous system number. Zero is rejected at every parse boundary.
pub type Asn = u32;

/// AS path as seen on the wire, nearest hop first, origin last.
pub type AsPath = Vec<Asn>;

/// Parse a decimal ASN, accepting an optional `AS` prefix.
pub fn parse_asn(s: &str) -> AppResult<Asn> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("AS")
        .or_else(|| trimmed.strip_prefix("as"))
        .unwrap_or(trimmed);

    match digits.parse::<Asn>() {
        Ok(0) | Err(_) => Err(AppError::InvalidAsn(s.to_string())),
        Ok(asn) => Ok(asn),
    }
}

/// A CIDR network. Host bits must be zero, nothing is silently truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prefix(IpNet);

impl Prefix {
    pub fn net(&self) -> &IpNet {
        &self.0
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.0, IpNet::V4(_))
    }

    /// `0.0.0.0/0` or `::/0`
    pub fn is_default_route(&self) -> bool {
        self.0.prefix_len() == 0
    }

    /// Path-safe key used to name cache artifacts, e.g. `10_0_0_0_24`.
    pub fn cache_key(&self) -> String {
        self.to_string().replace(['.', '/', ':'], "_")
    }
}

impl FromStr for Prefix {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let net: IpNet = s
            .trim()
            .parse()
            .map_err(|_| AppError::InvalidPrefix(s.to_string()))?;

        if net.trunc() != net {
            return Err(AppError::InvalidPrefix(s.to_string()));
        }

        Ok(Prefix(net))
    }
}

impl From<IpNet> for Prefix {
    fn from(net: IpNet) -> Self {
        Prefix(net.trunc())
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One vantage point's report for one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteObservation {
    pub source_asn: Asn,
    pub as_path: AsPath,
    pub communities: Vec<String>,
}

/// Prefix to observations, in parse order. Duplicates are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalDataset {
    routes: BTreeMap<Prefix, Vec<RouteObservation>>,
}

impl CanonicalDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append observations for a prefix. An empty batch leaves the prefix absent.
    pub fn extend(&mut self, prefix: Prefix, observations: Vec<RouteObservation>) {
        if observations.is_empty() {
            return;
        }
        self.routes.entry(prefix).or_default().extend(observations);
    }

    pub fn get(&self, prefix: &Prefix) -> Option<&[RouteObservation]> {
        self.routes.get(prefix).map(Vec::as_slice)
    }

    pub fn contains(&self, prefix: &Prefix) -> bool {
        self.routes.contains_key(prefix)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &Prefix> {
        self.routes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Prefix, &[RouteObservation])> {
        self.routes.iter().map(|(p, o)| (p, o.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        tracing::info!("Dataset with {} prefix(es) written to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::MissingInput(format!("dataset file {} not found", path.display())));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Route verdict for one (peer, prefix) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    RouteOk,
    BogonPrefix,
    PrefixToolong,
    BadOrigDefault,
    TransitLeak,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::RouteOk => "ROUTE_OK",
            Verdict::BogonPrefix => "BOGON_PREFIX",
            Verdict::PrefixToolong => "PREFIX_TOOLONG",
            Verdict::BadOrigDefault => "BAD_ORIG_DEFAULT",
            Verdict::TransitLeak => "TRANSIT_LEAK",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Verdict::RouteOk)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(source_asn: Asn, as_path: &[Asn], communities: &[&str]) -> RouteObservation {
        RouteObservation {
            source_asn,
            as_path: as_path.to_vec(),
            communities: communities.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_prefix_parse() {
        let p: Prefix = "192.0.2.0/24".parse().unwrap();
        assert_eq!(p.to_string(), "192.0.2.0/24");
        assert_eq!(p.prefix_len(), 24);
        assert!(p.is_ipv4());

        let v6: Prefix = "2001:db8::/32".parse().unwrap();
        assert!(!v6.is_ipv4());
    }

    #[test]
    fn test_prefix_rejects_invalid() {
        assert!("not-a-prefix".parse::<Prefix>().is_err());
        assert!("10.0.0.0/33".parse::<Prefix>().is_err());
        assert!("10.0.0.1/8".parse::<Prefix>().is_err());
        assert!("10.0.0.0".parse::<Prefix>().is_err());
    }

    #[test]
    fn test_default_route_detection() {
        assert!("0.0.0.0/0".parse::<Prefix>().unwrap().is_default_route());
        assert!("::/0".parse::<Prefix>().unwrap().is_default_route());
        assert!(!"8.8.8.0/24".parse::<Prefix>().unwrap().is_default_route());
    }

    #[test]
    fn test_cache_key() {
        let p: Prefix = "203.0.113.0/24".parse().unwrap();
        assert_eq!(p.cache_key(), "203_0_113_0_24");
        let v6: Prefix = "2001:db8::/32".parse().unwrap();
        assert_eq!(v6.cache_key(), "2001_db8___32");
    }

    #[test]
    fn test_parse_asn() {
        assert_eq!(parse_asn("19366").unwrap(), 19366);
        assert_eq!(parse_asn("AS3356").unwrap(), 3356);
        assert!(parse_asn("0").is_err());
        assert!(parse_asn("-5").is_err());
        assert!(parse_asn("UNKNOWN").is_err());
    }

    #[test]
    fn test_dataset_json_round_trip() {
        let mut dataset = CanonicalDataset::new();
        let a: Prefix = "198.51.100.0/24".parse().unwrap();
        let b: Prefix = "2001:db8::/48".parse().unwrap();
        dataset.extend(a, vec![obs(6939, &[6939, 19366], &["6939:1000"]), obs(6939, &[6939, 19366], &[])]);
        dataset.extend(b, vec![obs(1299, &[1299, 3356, 19366, 19366], &[])]);

        let json = dataset.to_json().unwrap();
        let back = CanonicalDataset::from_json(&json).unwrap();
        assert_eq!(back, dataset);
        assert_eq!(back.get(&a).unwrap().len(), 2);
    }

    #[test]
    fn test_dataset_json_shape() {
        let json = r#"{"10.0.0.0/24": [{"source_asn": 174, "as_path": [174, 65000], "communities": ["174:21000"]}]}"#;
        let dataset = CanonicalDataset::from_json(json).unwrap();
        let p: Prefix = "10.0.0.0/24".parse().unwrap();
        assert_eq!(dataset.get(&p).unwrap()[0], obs(174, &[174, 65000], &["174:21000"]));
    }

    #[test]
    fn test_dataset_rejects_bad_prefix_key() {
        let json = r#"{"10.0.0.1/24": []}"#;
        assert!(CanonicalDataset::from_json(json).is_err());
    }

    #[test]
    fn test_dataset_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bgp-tools.json");
        let mut dataset = CanonicalDataset::new();
        dataset.extend("192.0.2.0/24".parse().unwrap(), vec![obs(2914, &[2914, 65001], &[])]);

        dataset.save(&path).unwrap();
        assert_eq!(CanonicalDataset::load(&path).unwrap(), dataset);
        assert!(matches!(
            CanonicalDataset::load(&dir.path().join("missing.json")),
            Err(AppError::MissingInput(_))
        ));
    }

    #[test]
    fn test_empty_batch_keeps_prefix_absent() {
        let mut dataset = CanonicalDataset::new();
        let p: Prefix = "192.0.2.0/24".parse().unwrap();
        dataset.extend(p, Vec::new());
        assert!(!dataset.contains(&p));
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_verdict_labels() {
        assert_eq!(Verdict::BadOrigDefault.to_string(), "BAD_ORIG_DEFAULT");
        assert_eq!(serde_json::to_string(&Verdict::PrefixToolong).unwrap(), "\"PREFIX_TOOLONG\"");
    }
}
