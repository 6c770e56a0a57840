use clap::{Parser, Subcommand};
use credit_purchase::api::{PresentationAdapter, UserIntent, UserMessage};
use credit_purchase::config::{AppConfig, LoggingConfig};
use credit_purchase::logging::init_tracing;
use credit_purchase::payments::catalog::{PackageCatalog, CATALOG_CURRENCY};
use credit_purchase::payments::providers::MpesaGateway;
use credit_purchase::services::BalanceService;
use credit_purchase::workers::PaymentConfirmationEngine;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "credit-purchase", version, about = "Buy skill-exchange credits with M-Pesa")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the credit packages on sale
    Packages,
    /// Buy a package and wait for the payment to resolve
    Buy {
        /// Package id, see `packages`
        #[arg(long)]
        package: u32,
        /// M-Pesa number, e.g. 0712345678
        #[arg(long)]
        phone: String,
    },
}

/// Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_packages(catalog: &PackageCatalog) {
    for package in catalog.packages() {
        println!(
            "[{}] {:>4} credits  {} {:>5}  ({} {}/credit)  {}{}",
            package.id,
            package.credit_amount,
            CATALOG_CURRENCY,
            package.price_minor_units,
            CATALOG_CURRENCY,
            package.price_per_credit(),
            package.label,
            if package.is_featured { "  * most popular" } else { "" },
        );
    }
}

async fn buy(config: AppConfig, package: u32, phone: String) -> anyhow::Result<bool> {
    let gateway = Arc::new(MpesaGateway::new(&config.gateway)?);
    let balance = Arc::new(BalanceService::new(gateway.clone()));
    match balance.refresh().await {
        Ok(credits) => info!(credits, "current credit balance"),
        Err(e) => warn!(error = %e, "could not load current balance"),
    }

    let engine = Arc::new(PaymentConfirmationEngine::new(
        gateway,
        balance,
        config.polling.clone(),
    ));
    let adapter = PresentationAdapter::new(engine.clone(), PackageCatalog::default());

    println!("{}", adapter.dispatch(UserIntent::Open)?);
    let mut updates = adapter.updates();
    println!("{}", adapter.dispatch(UserIntent::SelectPackage(package))?);
    let message = adapter.dispatch(UserIntent::EnterPhone(phone))?;
    println!("{}", message);
    if matches!(message, UserMessage::InvalidPhone { .. }) {
        return Ok(false);
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut last = message;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = updates.borrow_and_update().clone();
                let message = credit_purchase::api::render(&session);
                if message != last {
                    println!("{}", message);
                    last = message;
                }
                if session.is_settled() {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, cancelling purchase");
                if let Ok(message) = adapter.dispatch(UserIntent::Cancel) {
                    println!("{}", message);
                    last = message;
                }
                break;
            }
        }
    }

    Ok(matches!(last, UserMessage::Success { .. }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Packages => {
            print_packages(&PackageCatalog::default());
            Ok(())
        }
        Command::Buy { package, phone } => {
            let config = match AppConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    init_tracing(&LoggingConfig::default());
                    return Err(e.into());
                }
            };
            config.validate()?;
            init_tracing(&config.logging);
            info!(
                version = env!("CARGO_PKG_VERSION"),
                base_url = %config.gateway.base_url,
                max_attempts = config.polling.max_attempts,
                "starting credit purchase"
            );

            if !buy(config, package, phone).await? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
