use pitwall_runner::{Bridge, BridgeConfig, load_config, load_default_config};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn print_help() {
    eprintln!(
        r#"pitwall - F1 live timing to MQTT bridge

USAGE:
    pitwall [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --json              Emit logs as JSON
    --help              Print this help message

ENVIRONMENT VARIABLES:
    F1_NEGOTIATE_URL            Negotiate endpoint
    F1_CONNECT_URL              WebSocket connect endpoint
    F1_HUB                      Hub name (default: Streaming)
    F1_STREAMS                  minimal | standard | full | comma list
    F1_MAX_RECONNECT_ATTEMPTS   Handshake attempts before giving up (default: 5)
    F1_RECONNECT_DELAY_MS       Base backoff delay (default: 2000)
    MQTT_BROKER_URL             mqtt://, tcp://, mqtts:// or ssl:// URL
    MQTT_CLIENT_ID              Client id (default: generated)
    MQTT_USERNAME               Broker username
    MQTT_PASSWORD               Broker password
    MQTT_QOS                    0, 1 or 2 (default: 1)
    MQTT_RETAIN                 Default retain flag (default: false)
    MQTT_RETAINED_TOPICS        Comma list of retained topic patterns
    MQTT_TOPIC_PREFIX           Topic prefix (default: f1)
    BATCH_SIZE                  Events per batch (default: 10)
    BATCH_TIMEOUT_MS            Max wait before a partial batch flushes (default: 1000)
    HEALTH_PORT                 Health endpoint port (default: 3000)
    RUST_LOG                    Log level filter

EXAMPLES:
    # Run with defaults
    pitwall

    # Run with config file
    pitwall --config bridge.json

    # Point at another broker, subscribe to the minimal set
    MQTT_BROKER_URL=mqtt://10.0.0.5:1883 F1_STREAMS=minimal pitwall
"#
    );
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "pitwall=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut json_logs = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            "--json" => json_logs = true,
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    init_tracing(json_logs);

    let mut file = match &config_path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            load_config(path)?
        }
        None => {
            tracing::info!("Using default configuration");
            load_default_config()?
        }
    };
    file.apply_env()?;
    let config = BridgeConfig::from_file(&file)?;

    tracing::info!("Negotiate: {}", config.feed.negotiate_url);
    tracing::info!("Broker: {}", config.publisher.broker_url);
    tracing::info!("Streams: {}", config.feed.streams.resolve().join(", "));
    if let Some(addr) = &config.health_addr {
        tracing::info!("Health: http://{}/health", addr);
    }

    let bridge = Bridge::new(config);
    bridge.start().await?;

    let failed = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            false
        }
        err = bridge.terminal_failure() => {
            tracing::error!("Feed gave up: {}", err);
            true
        }
    };

    bridge.shutdown().await;

    if failed {
        // Non-zero so a supervisor restarts us
        std::process::exit(2);
    }
    Ok(())
}
