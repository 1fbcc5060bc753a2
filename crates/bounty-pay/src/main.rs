//! BaseBounties payment CLI - Main entry point.

mod config;
mod error;
mod render;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use anyhow::Context;
use bounty_payments::{
    amount, present, BaseRpcClient, PaymentAttempt, PaymentError, PaymentOrchestrator,
    PaymentPhase, PaymentRequest, TransactionReference, ViewContext,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bounty-pay")]
#[command(version)]
#[command(about = "Pay BaseBounties rewards in USDC on Base", long_about = None)]
struct Cli {
    /// Print views as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a payment and wait for it to confirm
    Pay {
        /// Amount in USDC, e.g. 10.50
        amount: String,

        /// Recipient address
        recipient: String,

        /// Payment description
        #[arg(short, long)]
        description: Option<String>,

        /// Bounty this payment settles
        #[arg(long)]
        bounty_id: Option<String>,

        /// Submit without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Show a USDC balance (defaults to the configured payer)
    Balance {
        address: Option<String>,
    },

    /// Look up a submitted transaction
    Status {
        tx_hash: String,
    },
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.log_level);

    let client = Arc::new(BaseRpcClient::new(&config.payments.base)?);
    if client.health_check().await {
        info!("Base RPC healthy at {}", config.payments.base.rpc_url);
    } else {
        warn!(
            "Base RPC health check failed at {} - requests may fail",
            config.payments.base.rpc_url
        );
    }

    let orchestrator = Arc::new(PaymentOrchestrator::new(client, config.payments.clone())?);
    let ctx = ViewContext::from_config(&config.payments);

    match cli.command {
        Commands::Pay {
            amount,
            recipient,
            description,
            bounty_id,
            yes,
        } => {
            let request = build_request(amount, recipient, description, bounty_id);
            pay(orchestrator, ctx, request, yes, cli.json).await
        }
        Commands::Balance { address } => balance(&orchestrator, address).await,
        Commands::Status { tx_hash } => status(&orchestrator, &ctx, tx_hash).await,
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_request(
    amount: String,
    recipient: String,
    description: Option<String>,
    bounty_id: Option<String>,
) -> PaymentRequest {
    let mut request = PaymentRequest::new(amount, recipient);
    if let Some(description) = description {
        request = request.with_description(description);
    }
    if let Some(bounty_id) = bounty_id {
        request = request.with_metadata("bountyId", bounty_id);
    }
    request
}

async fn pay(
    orchestrator: Arc<PaymentOrchestrator>,
    ctx: ViewContext,
    request: PaymentRequest,
    yes: bool,
    json: bool,
) -> AppResult<()> {
    let renderer = render::spawn_renderer(orchestrator.subscribe(), ctx.clone(), json);

    let result = tokio::select! {
        result = run_payment(&orchestrator, &ctx, request, yes, json) => result,
        _ = signal::ctrl_c() => {
            info!("Interrupt received, cancelling payment");
            orchestrator.cancel_and_reset();
            // A submission still waiting on the wallet keeps the event
            // channel open; nothing more needs drawing.
            renderer.abort();
            Err(AppError::Payment(PaymentError::Cancelled))
        }
    };

    // Closing the event channel stops the renderer.
    drop(orchestrator);
    match renderer.await {
        Err(e) if !e.is_cancelled() => warn!("Renderer task failed: {}", e),
        _ => {}
    }

    let attempt = result?;
    match attempt.phase {
        PaymentPhase::Failed(err) => {
            error!("Payment failed: {}", err);
            Err(err.into())
        }
        _ => Ok(()),
    }
}

async fn run_payment(
    orchestrator: &PaymentOrchestrator,
    ctx: &ViewContext,
    request: PaymentRequest,
    yes: bool,
    json: bool,
) -> AppResult<PaymentAttempt> {
    let prepared = orchestrator.prepare(request).await?;
    if prepared.is_terminal() {
        return Ok(prepared);
    }

    let view = present(&prepared, ctx);
    render::print_view(&view, json);

    if !yes {
        if !view.can_submit {
            warn!("Payment cannot be submitted as prepared");
        }
        if !ask("Submit this payment? [y/N] ").await? {
            orchestrator.cancel_and_reset();
            return Err(PaymentError::Cancelled.into());
        }
    }

    Ok(orchestrator.confirm().await?)
}

async fn ask(prompt: &str) -> AppResult<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;

    // Plain thread, not spawn_blocking: an unanswered prompt must not hold
    // up runtime shutdown after Ctrl-C.
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = tx.send(std::io::stdin().read_line(&mut line).map(|_| line));
    });

    let line = rx
        .await
        .map_err(|_| anyhow::anyhow!("Prompt reader stopped without an answer"))??;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn balance(orchestrator: &PaymentOrchestrator, address: Option<String>) -> AppResult<()> {
    let address = match address.or_else(|| orchestrator.payer().map(String::from)) {
        Some(address) => address,
        None => {
            return Err(anyhow::anyhow!(
                "No address given and PAYMENTS__BASE__PAYER_ADDRESS is not set"
            )
            .into())
        }
    };

    let snapshot = orchestrator.refresh_balance(&address).await?;
    let token = &orchestrator.config().token;
    println!(
        "{}: {} {}",
        snapshot.address,
        amount::decode(snapshot.amount, token.decimals),
        token.symbol
    );
    Ok(())
}

async fn status(
    orchestrator: &PaymentOrchestrator,
    ctx: &ViewContext,
    tx_hash: String,
) -> AppResult<()> {
    let tx = TransactionReference::new(tx_hash);
    let status = orchestrator.transaction_status(&tx).await?;

    let state = if status.reverted {
        "reverted"
    } else if status.confirmed {
        "mined"
    } else {
        "pending"
    };
    println!("Transaction:   {}", tx);
    println!("State:         {}", state);
    if let Some(block) = status.block_reference {
        println!("Block:         {}", block);
    }
    println!(
        "Confirmations: {}/{}",
        status.confirmation_count.unwrap_or(0),
        ctx.confirmations
    );
    println!("Explorer:      {}", ctx.base.explorer_tx_url(tx.as_str()));
    Ok(())
}
