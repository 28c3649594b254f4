// Configuration management for BGP Route Audit
// Supports CLI arguments, config file (TOML), and environment variables

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

use crate::collect::cache::DEFAULT_TTL_SECS;
use crate::collect::sources::DEFAULT_ENUMERATOR;
use crate::error::RetryConfig;
use crate::lookingglass::tmux::TmuxSettings;
use crate::lookingglass::whois::DEFAULT_WHOIS_SERVER;
use crate::routes::classify::{
    LeakIndexing, RouteTables, RouteVerdictClassifier, DEFAULT_BOGONS, DEFAULT_MAX_IPV4_LENGTH,
    DEFAULT_MAX_IPV6_LENGTH, DEFAULT_TIER1_ASNS,
};
use crate::routes::propagation::DEFAULT_CORROBORATION_THRESHOLD;
use crate::routes::{parse_asn, Asn};

/// BGP Route Audit - collect looking-glass routes, check upstream propagation and audit router feeds
#[derive(Parser, Debug, Clone)]
#[command(name = "bgp-route-audit")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, global = true, env = "BGP_AUDIT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "BGP_AUDIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Capture looking-glass routes for a prefix list and write the JSON dataset
    Collect(CollectArgs),
    /// Report which upstreams of the target ASN carry each prefix
    Propagation(PropagationArgs),
    /// Classify every route a router receives from its BGP neighbors
    Audit(AuditArgs),
}

/// Where the prefix list comes from. Exactly one is required.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct PrefixSource {
    /// Text file of prefixes, one per line
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// IRR AS-SET or aut-num to enumerate prefixes from
    #[arg(short = 's', long)]
    pub as_set: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
    #[command(flatten)]
    pub source: PrefixSource,

    /// ASN whose paths the looking glass should match
    #[arg(short = 'a', long, value_parser = parse_asn_arg, env = "BGP_AUDIT_TARGET_ASN")]
    pub target_asn: Asn,

    /// Concurrent captures (0 = sequential)
    #[arg(short, long, env = "BGP_AUDIT_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Re-query every prefix even if a fresh capture is cached
    #[arg(long)]
    pub no_cache: bool,

    /// Dataset JSON file
    #[arg(short, long, visible_alias = "dataset")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PropagationArgs {
    #[command(flatten)]
    pub collect: CollectArgs,

    /// Comma-separated upstream ASNs that must carry every prefix
    #[arg(short = 'm', long = "expect", value_delimiter = ',', value_parser = parse_asn_arg)]
    pub expected: Vec<Asn>,

    /// Also report upstreams seen by only one vantage point (marked with *)
    #[arg(long)]
    pub include_single_source: bool,

    /// An upstream counts when seen by more than this many vantage points
    #[arg(short, long)]
    pub threshold: Option<usize>,

    /// Analyze the existing dataset without collecting
    #[arg(long)]
    pub skip_collect: bool,

    /// Look up AS names of the expected upstreams
    #[arg(long)]
    pub resolve_names: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    /// Router hostname or IP
    pub router: String,

    /// API key (falls back to ~/<router>.api)
    #[arg(long, env = "BGP_AUDIT_API_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Ignore TLS certificate errors
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Only audit neighbors with this ASN
    #[arg(short, long, value_parser = parse_asn_arg)]
    pub include: Option<Asn>,

    /// Show ROUTE_OK prefixes in output
    #[arg(long)]
    pub show_ok: bool,
}

fn parse_asn_arg(s: &str) -> Result<Asn, String> {
    parse_asn(s).map_err(|e| e.to_string())
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Collection pipeline settings
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Looking glass session settings
    #[serde(default)]
    pub looking_glass: LookingGlassConfig,

    /// Route classifier tables
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Router API settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Cached captures younger than this are reused
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Concurrent captures (0 = sequential)
    #[serde(default)]
    pub parallelism: usize,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Prefixes never queried, one per line
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,

    #[serde(default = "default_dataset_file")]
    pub dataset_file: String,

    /// External AS-SET enumerator
    #[serde(default = "default_enumerator")]
    pub enumerator: String,

    /// Attempts to open a looking glass session
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound for one query inside an open session
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_seconds: u64,

    #[serde(default = "default_threshold")]
    pub corroboration_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookingGlassConfig {
    #[serde(default = "default_destination")]
    pub destination: String,

    #[serde(default = "default_connect_settle")]
    pub connect_settle_seconds: u64,

    #[serde(default = "default_query_settle")]
    pub query_settle_seconds: u64,

    #[serde(default = "default_exit_polls")]
    pub exit_polls: u32,

    #[serde(default = "default_exit_poll_interval")]
    pub exit_poll_interval_ms: u64,

    #[serde(default = "default_whois_server")]
    pub whois_server: String,

    #[serde(default = "default_whois_timeout")]
    pub whois_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_bogons")]
    pub bogons: Vec<String>,

    #[serde(default = "default_tier1")]
    pub tier1: Vec<Asn>,

    #[serde(default = "default_max_ipv4_length")]
    pub max_ipv4_length: u8,

    #[serde(default = "default_max_ipv6_length")]
    pub max_ipv6_length: u8,

    #[serde(default)]
    pub leak_indexing: LeakIndexing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_router_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECS as u64
}
fn default_cache_dir() -> String {
    ".workdir".to_string()
}
fn default_ignore_file() -> String {
    "~/.checkbgp_prefixignore".to_string()
}
fn default_dataset_file() -> String {
    ".workdir/bgp-tools.json".to_string()
}
fn default_enumerator() -> String {
    DEFAULT_ENUMERATOR.to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_capture_timeout() -> u64 {
    120
}
fn default_threshold() -> usize {
    DEFAULT_CORROBORATION_THRESHOLD
}
fn default_destination() -> String {
    "lg@bgp.tools".to_string()
}
fn default_connect_settle() -> u64 {
    4
}
fn default_query_settle() -> u64 {
    6
}
fn default_exit_polls() -> u32 {
    30
}
fn default_exit_poll_interval() -> u64 {
    500
}
fn default_whois_server() -> String {
    DEFAULT_WHOIS_SERVER.to_string()
}
fn default_whois_timeout() -> u64 {
    10
}
fn default_bogons() -> Vec<String> {
    DEFAULT_BOGONS.iter().map(|b| b.to_string()).collect()
}
fn default_tier1() -> Vec<Asn> {
    DEFAULT_TIER1_ASNS.to_vec()
}
fn default_max_ipv4_length() -> u8 {
    DEFAULT_MAX_IPV4_LENGTH
}
fn default_max_ipv6_length() -> u8 {
    DEFAULT_MAX_IPV6_LENGTH
}
fn default_router_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CollectionConfig {
    fn default() -> Self {
        CollectionConfig {
            ttl_seconds: default_ttl_seconds(),
            parallelism: 0,
            cache_dir: default_cache_dir(),
            ignore_file: default_ignore_file(),
            dataset_file: default_dataset_file(),
            enumerator: default_enumerator(),
            max_retries: default_max_retries(),
            capture_timeout_seconds: default_capture_timeout(),
            corroboration_threshold: default_threshold(),
        }
    }
}

impl Default for LookingGlassConfig {
    fn default() -> Self {
        LookingGlassConfig {
            destination: default_destination(),
            connect_settle_seconds: default_connect_settle(),
            query_settle_seconds: default_query_settle(),
            exit_polls: default_exit_polls(),
            exit_poll_interval_ms: default_exit_poll_interval(),
            whois_server: default_whois_server(),
            whois_timeout_seconds: default_whois_timeout(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            bogons: default_bogons(),
            tier1: default_tier1(),
            max_ipv4_length: default_max_ipv4_length(),
            max_ipv6_length: default_max_ipv6_length(),
            leak_indexing: LeakIndexing::default(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            timeout_seconds: default_router_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        tracing::info!("Loading configuration from: {}", path.display());
        let config_content = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<ConfigFile>(&config_content)?)
    }
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub log_level: Level,
    pub cache_dir: PathBuf,
    pub cache_ttl: chrono::Duration,
    pub parallelism: usize,
    pub ignore_file: PathBuf,
    pub dataset_file: PathBuf,
    pub enumerator: String,
    pub session_retry: RetryConfig,
    pub capture_timeout: Duration,
    pub corroboration_threshold: usize,
    pub tmux: TmuxSettings,
    pub whois_server: String,
    pub whois_timeout: Duration,
    pub router_timeout: Duration,
    pub classifier: RouteVerdictClassifier,
}

impl Config {
    /// Load configuration from all sources (CLI args, config file, defaults)
    /// Priority: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> anyhow::Result<Self> {
        let cli_args = CliArgs::parse();

        // Load config file if specified
        let config_file = if let Some(config_path) = &cli_args.config {
            ConfigFile::from_path(config_path)?
        } else {
            // Try loading from default locations
            let default_paths = vec![
                PathBuf::from("bgp-route-audit.toml"),
                PathBuf::from("config.toml"),
            ];

            let mut loaded_config = None;
            for path in default_paths {
                if path.exists() {
                    loaded_config = Some(ConfigFile::from_path(&path)?);
                    break;
                }
            }

            loaded_config.unwrap_or_default()
        };

        Self::merge(cli_args, config_file)
    }

    /// Merge configuration (CLI args override config file)
    pub fn merge(cli_args: CliArgs, config_file: ConfigFile) -> anyhow::Result<Self> {
        let log_level = parse_log_level(cli_args.log_level.as_deref().unwrap_or(&config_file.logging.level))?;

        let collection = config_file.collection;
        let collect_args = match &cli_args.command {
            Command::Collect(args) => Some(args),
            Command::Propagation(args) => Some(&args.collect),
            Command::Audit(_) => None,
        };

        let parallelism = collect_args
            .and_then(|a| a.parallelism)
            .unwrap_or(collection.parallelism);
        let dataset_file = collect_args
            .and_then(|a| a.output.clone())
            .unwrap_or_else(|| expand_home(&collection.dataset_file));
        let corroboration_threshold = match &cli_args.command {
            Command::Propagation(args) => args.threshold.unwrap_or(collection.corroboration_threshold),
            _ => collection.corroboration_threshold,
        };

        let session_retry = RetryConfig {
            max_attempts: collection.max_retries.max(1),
            ..RetryConfig::default()
        };

        let lg = config_file.looking_glass;
        let tmux = TmuxSettings {
            destination: lg.destination,
            connect_settle: Duration::from_secs(lg.connect_settle_seconds),
            query_settle: Duration::from_secs(lg.query_settle_seconds),
            exit_polls: lg.exit_polls,
            exit_poll_interval: Duration::from_millis(lg.exit_poll_interval_ms),
        };

        let cls = config_file.classifier;
        let classifier = RouteVerdictClassifier::new(RouteTables::from_config(&cls.bogons, &cls.tier1)?)
            .with_max_lengths(cls.max_ipv4_length, cls.max_ipv6_length)
            .with_leak_indexing(cls.leak_indexing);

        Ok(Config {
            command: cli_args.command,
            log_level,
            cache_dir: expand_home(&collection.cache_dir),
            cache_ttl: chrono::Duration::seconds(collection.ttl_seconds as i64),
            parallelism,
            ignore_file: expand_home(&collection.ignore_file),
            dataset_file,
            enumerator: collection.enumerator,
            session_retry,
            capture_timeout: Duration::from_secs(collection.capture_timeout_seconds),
            corroboration_threshold,
            tmux,
            whois_server: lg.whois_server,
            whois_timeout: Duration::from_secs(lg.whois_timeout_seconds),
            router_timeout: Duration::from_secs(config_file.router.timeout_seconds),
            classifier,
        })
    }
}

fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("bgp-route-audit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.collection.ttl_seconds, 3600);
        assert_eq!(config.collection.parallelism, 0);
        assert_eq!(config.looking_glass.destination, "lg@bgp.tools");
        assert_eq!(config.classifier.tier1.len(), DEFAULT_TIER1_ASNS.len());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config_file() {
        let config: ConfigFile = toml::from_str(
            r#"
            [collection]
            parallelism = 4
            cache_dir = "/var/cache/bgp"

            [classifier]
            tier1 = [3356, 1299]
            leak_indexing = "positional"
            "#,
        )
        .unwrap();

        assert_eq!(config.collection.parallelism, 4);
        assert_eq!(config.collection.ttl_seconds, 3600);
        assert_eq!(config.classifier.tier1, vec![3356, 1299]);
        assert_eq!(config.classifier.leak_indexing, LeakIndexing::Positional);
        assert_eq!(config.classifier.bogons.len(), DEFAULT_BOGONS.len());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = ConfigFile::default();
        file.collection.parallelism = 4;
        file.logging.level = "debug".to_string();

        let config = Config::merge(cli(&["collect", "-f", "p.txt", "-a", "64500", "-p", "8"]), file.clone()).unwrap();
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.log_level, Level::DEBUG);

        let config = Config::merge(
            cli(&["--log-level", "warn", "collect", "-s", "AS-EXAMPLE", "-a", "AS64500", "-o", "out.json"]),
            file,
        )
        .unwrap();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.log_level, Level::WARN);
        assert_eq!(config.dataset_file, PathBuf::from("out.json"));
    }

    #[test]
    fn test_propagation_args() {
        let config = Config::merge(
            cli(&["propagation", "-f", "p.txt", "-a", "64500", "--expect", "174,3356", "--threshold", "2", "--skip-collect"]),
            ConfigFile::default(),
        )
        .unwrap();

        let Command::Propagation(args) = &config.command else {
            panic!("expected propagation command");
        };
        assert_eq!(args.expected, vec![174, 3356]);
        assert!(args.skip_collect);
        assert_eq!(config.corroboration_threshold, 2);
    }

    #[test]
    fn test_prefix_source_is_exclusive() {
        let both = CliArgs::try_parse_from(["bgp-route-audit", "collect", "-f", "p.txt", "-s", "AS-X", "-a", "1"]);
        assert!(both.is_err());
        let neither = CliArgs::try_parse_from(["bgp-route-audit", "collect", "-a", "1"]);
        assert!(neither.is_err());
        let zero_asn = CliArgs::try_parse_from(["bgp-route-audit", "collect", "-f", "p.txt", "-a", "0"]);
        assert!(zero_asn.is_err());
    }

    #[test]
    fn test_audit_args() {
        let args = cli(&["audit", "edge1.example.net", "-k", "--include", "3356", "--show-ok"]);
        let Command::Audit(audit) = args.command else {
            panic!("expected audit command");
        };
        assert_eq!(audit.router, "edge1.example.net");
        assert!(audit.insecure);
        assert_eq!(audit.include, Some(3356));
    }

    #[test]
    fn test_bad_bogon_is_rejected() {
        let mut file = ConfigFile::default();
        file.classifier.bogons.push("not-a-network".to_string());
        assert!(Config::merge(cli(&["audit", "edge1"]), file).is_err());
    }

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("info"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("DEBUG"), Ok(Level::DEBUG)));
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/etc/x"), PathBuf::from("/etc/x"));
        assert_eq!(expand_home(".workdir"), PathBuf::from(".workdir"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.checkbgp_prefixignore"), home.join(".checkbgp_prefixignore"));
        }
    }
}
