use anyhow::Context;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use bgp_route_audit::collect::cache::{CollectionCache, FileStore};
use bgp_route_audit::collect::sources::{enumerate_as_set, load_ignore_file, load_prefix_file};
use bgp_route_audit::collect::{CollectionOrchestrator, CollectionOutcome};
use bgp_route_audit::config::{AuditArgs, CollectArgs, Command, Config, PrefixSource, PropagationArgs};
use bgp_route_audit::error::AppError;
use bgp_route_audit::lookingglass::tmux::TmuxSessionProvider;
use bgp_route_audit::lookingglass::whois::query_as_names;
use bgp_route_audit::lookingglass::LookingGlass;
use bgp_route_audit::report::{render_audit, render_collection_summary, render_propagation};
use bgp_route_audit::router::audit::run_audit;
use bgp_route_audit::router::resolve_api_key;
use bgp_route_audit::router::vyos::VyosApi;
use bgp_route_audit::routes::propagation::{PropagationAnalyzer, PropagationOptions};
use bgp_route_audit::routes::{CanonicalDataset, Prefix};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize logging; RUST_LOG wins over the configured level
    init_tracing(config.log_level);
    tracing::debug!("BGP route audit starting with {:?}", config.command);

    let result = match config.command.clone() {
        Command::Collect(args) => run_collect(&config, &args).await.map(|_| ()),
        Command::Propagation(args) => run_propagation(&config, &args).await,
        Command::Audit(args) => run_router_audit(&config, &args).await,
    };

    if let Err(e) = &result {
        if let Some(app_error) = e.downcast_ref::<AppError>() {
            tracing::error!("{}", app_error.user_message());
        }
    }
    result
}

fn init_tracing(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_prefixes(config: &Config, source: &PrefixSource) -> anyhow::Result<BTreeSet<Prefix>> {
    let prefixes = match (&source.file, &source.as_set) {
        (Some(path), _) => load_prefix_file(path)?,
        (None, Some(object)) => enumerate_as_set(&config.enumerator, object).await?,
        (None, None) => anyhow::bail!("either --file or --as-set is required"),
    };
    tracing::info!("Loaded {} prefixes", prefixes.len());
    Ok(prefixes.into_iter().collect())
}

async fn run_collect(config: &Config, args: &CollectArgs) -> anyhow::Result<(BTreeSet<Prefix>, CollectionOutcome)> {
    let prefixes = load_prefixes(config, &args.source).await?;
    let ignore = load_ignore_file(&config.ignore_file)?;

    let cache = CollectionCache::new(Arc::new(FileStore::new(config.cache_dir.clone())), config.cache_ttl);
    let sessions = Arc::new(TmuxSessionProvider::new(config.tmux.clone()));
    let looking_glass = Arc::new(LookingGlass::new(
        sessions,
        config.session_retry.clone(),
        config.capture_timeout,
    ));

    let orchestrator = CollectionOrchestrator::new(cache, looking_glass).with_ignore_list(ignore);
    let outcome = orchestrator
        .collect(&prefixes, args.target_asn, config.parallelism, args.no_cache)
        .await;

    outcome
        .dataset
        .save(&config.dataset_file)
        .with_context(|| format!("writing dataset {}", config.dataset_file.display()))?;
    print!("{}", render_collection_summary(&outcome.summary, &config.dataset_file));

    Ok((prefixes, outcome))
}

async fn run_propagation(config: &Config, args: &PropagationArgs) -> anyhow::Result<()> {
    let (prefixes, dataset) = if args.skip_collect {
        let prefixes = load_prefixes(config, &args.collect.source).await?;
        let dataset = CanonicalDataset::load(&config.dataset_file)?;
        (prefixes, dataset)
    } else {
        let (prefixes, outcome) = run_collect(config, &args.collect).await?;
        (prefixes, outcome.dataset)
    };

    let target_asn = args.collect.target_asn;
    let mut options = PropagationOptions::new(target_asn);
    options.expected_upstreams = args.expected.iter().copied().collect();
    options.corroboration_threshold = config.corroboration_threshold;
    options.include_single_source = args.include_single_source;
    let analyzer = PropagationAnalyzer::new(options);

    let reports: Vec<_> = prefixes
        .iter()
        .map(|prefix| analyzer.report_for(*prefix, dataset.get(prefix).unwrap_or(&[])))
        .collect();

    let names = if args.resolve_names {
        query_as_names(&config.whois_server, &args.expected, config.whois_timeout).await
    } else {
        BTreeMap::new()
    };

    print!("{}", render_propagation(target_asn, &reports, &names));
    Ok(())
}

async fn run_router_audit(config: &Config, args: &AuditArgs) -> anyhow::Result<()> {
    let key = resolve_api_key(&args.router, args.key.clone(), dirs::home_dir().as_deref())?;
    let api = VyosApi::new(&args.router, key, !args.insecure, config.router_timeout)?;

    tracing::info!("Connecting to {} to retrieve local ASN via API", args.router);
    let include: Vec<_> = args.include.into_iter().collect();
    let report = run_audit(&api, &config.classifier, &include)
        .await
        .with_context(|| format!("auditing {}", args.router))?;

    print!("{}", render_audit(&args.router, &report, args.show_ok));
    Ok(())
}
