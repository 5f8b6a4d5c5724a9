//! `meshledger-node`: runs one Mesh Ledger node until interrupted.

use {
    clap::{Parser, Subcommand},
    log::{error, info},
    meshledger_node::{
        identity::{create_identity, load_identity},
        ChangeSetVerifier, Node, NodeConfig,
    },
    solana_signer::Signer,
    std::{path::PathBuf, process::ExitCode, sync::Arc},
    tokio_util::sync::CancellationToken,
};

#[derive(Parser, Debug)]
#[command(name = "meshledger-node", version, about = "Mesh Ledger node")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node with the given configuration file.
    Run {
        #[arg(long, short, value_name = "FILE")]
        config: PathBuf,
        /// Log filter used when RUST_LOG is unset. Overrides the file.
        #[arg(long, value_name = "FILTER")]
        log: Option<String>,
    },
    /// Write a new identity keypair.
    Keygen {
        #[arg(long, short, value_name = "FILE")]
        outfile: PathBuf,
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let outcome = match args.command {
        Command::Run { config, log } => run(config, log).await,
        Command::Keygen { outfile, force } => {
            meshledger_logger::setup_with_default("info");
            create_identity(&outfile, force).map(|keypair| {
                println!("{}", keypair.pubkey());
            })
        }
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: PathBuf, log: Option<String>) -> meshledger_node::error::Result<()> {
    let config = NodeConfig::load(&config_path)?;
    meshledger_logger::setup_with_default(log.as_deref().unwrap_or(&config.log_filter));
    info!(
        "meshledger-node v{} starting from {}",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    let keypair = load_identity(config.identity.as_deref())?;
    let cancel = CancellationToken::new();
    let node = Node::start(
        config,
        keypair,
        Arc::new(ChangeSetVerifier),
        cancel.clone(),
    )
    .await?;

    shutdown_signal().await;
    info!("shutdown signal received");
    cancel.cancel();
    node.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {}", e);
    }
}
