use anyhow::Result;
use clap::Parser;
use clash_purity::{
    profile,
    settings::{Settings, DEFAULT_SETTINGS_PATH},
    ClashController, IpChecker, ProbeConfig, Runner,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Annotates Clash proxy configs with IP purity scores
#[derive(Parser)]
#[command(name = "clash-purity")]
#[command(about = "Annotates Clash proxy configs with IP purity scores")]
struct Cli {
    /// Clash profile to annotate (overrides yaml_path from the settings file)
    input: Option<PathBuf>,

    /// Settings file path
    #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    /// Clash control API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Control API bearer token
    #[arg(long)]
    secret: Option<String>,

    /// Selector group to drive
    #[arg(long)]
    selector: Option<String>,

    /// Suffix inserted before the output file extension
    #[arg(long)]
    suffix: Option<String>,

    /// Reputation page to scrape
    #[arg(long, default_value = "https://ippure.com/")]
    page_url: String,

    /// Page navigation timeout in seconds
    #[arg(long, default_value = "20")]
    timeout: u64,

    /// Local proxy override for fast-path and browser traffic
    /// (default: http://127.0.0.1:<detected port>)
    #[arg(long)]
    local_proxy: Option<String>,

    /// Show the browser window while checking
    #[arg(long)]
    headful: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("clash_purity=info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config);
    if let Some(input) = &cli.input {
        settings.yaml_path = input.to_string_lossy().to_string();
    }
    if let Some(api_url) = cli.api_url {
        settings.clash_api_url = api_url;
    }
    if let Some(secret) = cli.secret {
        settings.clash_api_secret = secret;
    }
    if let Some(selector) = cli.selector {
        settings.selector_name = selector;
    }
    if let Some(suffix) = cli.suffix {
        settings.output_suffix = suffix;
    }
    settings.validate()?;

    println!("Loading config from: {}", settings.yaml_path);
    let input_path = PathBuf::from(&settings.yaml_path);
    let mut doc = profile::load(&input_path)?;
    let names = profile::proxy_names(&doc);
    if names.is_empty() {
        println!("No 'proxies' found in config.");
        return Ok(());
    }
    println!("Found {} proxies to test.", names.len());

    let controller = ClashController::new(&settings.clash_api_url, &settings.clash_api_secret);

    // Global mode makes the one selector group determine all egress
    controller.set_mode("global").await;

    let port = controller.get_running_port().await;
    println!("Detected Running Port from API: {}", port);
    let local_proxy = cli
        .local_proxy
        .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));
    println!("Using Local Proxy: {}", local_proxy);

    let probe_config = ProbeConfig::new()
        .with_headless(!cli.headful)
        .with_proxy(Some(local_proxy))
        .with_page_timeout(Duration::from_secs(cli.timeout));
    let mut checker = IpChecker::new(probe_config);
    tokio::task::block_in_place(|| checker.start())?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nProcess interrupted by user. Saving current progress...");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut runner = Runner::new(
        controller,
        checker,
        settings.selector_name.clone(),
        cli.page_url.clone(),
        cancel,
    );
    let results = runner.run(&names).await;
    runner.shutdown();

    println!("\nUpdating config names...");
    profile::merge_annotations(&mut doc, &results);
    let output = profile::output_path(&input_path, &settings.output_suffix);
    profile::save(&doc, &output)?;
    println!("\nSuccess! Saved updated config to: {}", output.display());

    Ok(())
}
