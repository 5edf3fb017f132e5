use {
    anyhow::{Context, Result},
    clap::{Args, Parser, Subcommand},
    payout_gateway::{
        adapters::ConnectorRegistry,
        config::{DispatchConfig, GatewayConfig, GatewaySettings, PaymentEndpoint, SettingsMap},
        domain::payment::PaymentItem,
        services::{CollectingApprover, DispatchEngine, ReconciliationEngine},
    },
    std::{fs, io::Write, path::PathBuf, sync::Arc},
    tracing_subscriber::EnvFilter,
};

#[derive(Parser)]
#[command(author, version, about = "Send payouts through a payment gateway and check their settlement")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send every pending item and print the updated items.
    Dispatch(RunArgs),
    /// Check settlement of accepted items and print the updated items.
    Reconcile(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Endpoint name selecting the gateway defaults.
    #[arg(long)]
    endpoint: String,

    /// JSON array of payment items.
    #[arg(long)]
    items: PathBuf,

    /// JSON object of endpoint-specific settings.
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Gateway defaults file. Falls back to PAYOUT_GATEWAYS_FILE.
    #[arg(long)]
    gateways: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (args, dispatching) = match cli.command {
        Command::Dispatch(args) => (args, true),
        Command::Reconcile(args) => (args, false),
    };

    let settings = match &args.gateways {
        Some(path) => GatewaySettings::from_path(path),
        None => GatewaySettings::from_env(),
    }
    .context("loading gateway settings")?;

    let mut endpoint = PaymentEndpoint::new(&args.endpoint);
    if let Some(path) = &args.overrides {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading overrides {}", path.display()))?;
        let overrides: SettingsMap = serde_json::from_str(&raw).context("parsing overrides")?;
        endpoint = endpoint.with_overrides(overrides);
    }

    let raw = fs::read_to_string(&args.items)
        .with_context(|| format!("reading items {}", args.items.display()))?;
    let items: Vec<PaymentItem> = serde_json::from_str(&raw).context("parsing items")?;

    let config = GatewayConfig::resolve(&endpoint, &settings)
        .with_context(|| format!("resolving endpoint {}", args.endpoint))?;
    let transport = ConnectorRegistry::production_transport(&config)?;
    let connector = ConnectorRegistry::build(config, transport);

    let dispatch_config = DispatchConfig::from_env()?;

    let updated = if dispatching {
        let engine = DispatchEngine::new(
            connector,
            Arc::new(CollectingApprover::new()),
            dispatch_config,
        );
        let report = engine.dispatch(items).await;
        tracing::info!(
            run_id = %report.run_id,
            approved = report.approved.len(),
            failed = report.failed(),
            "dispatch complete"
        );
        report.into_items()
    } else {
        let engine = ReconciliationEngine::new(connector, dispatch_config.workers());
        let report = engine.reconcile(items).await;
        let summary = report.summary();
        tracing::info!(run_id = %report.run_id, ?summary, "reconciliation complete");
        report.into_items()
    };

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &updated)?;
    writeln!(stdout)?;
    Ok(())
}
