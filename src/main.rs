//! Strom CLI
//!
//! Terminal front-end for the usage-gated conversational session.
//! All of this is presentation plumbing: it renders what the session
//! core produces and feeds user input back into it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dialoguer::Input;

use strom::agent::StromHttpClient;
use strom::config::{self, LogLevel, StromConfig};
use strom::identity::resolver;
use strom::identity::wallet::{self, LocalWallet};
use strom::session::{GateState, SendOutcome, Session};
use strom::store::Store;
use strom::types::{Identity, MessageBody, Sender, TransferSigner};

const VERSION: &str = "0.1.0";

/// Strom -- conversational agent client
#[derive(Parser, Debug)]
#[command(
    name = "strom",
    version = VERSION,
    about = "Strom -- usage-gated conversational agent client"
)]
struct Cli {
    /// Start an interactive chat session
    #[arg(long)]
    run: bool,

    /// Show stored identity, wallet, and configuration
    #[arg(long)]
    status: bool,

    /// Initialize the local wallet used for payments
    #[arg(long)]
    init: bool,

    /// Clear the stored token and anonymous counter
    #[arg(long)]
    reset: bool,
}

fn init_tracing(level: LogLevel) {
    let level = match level {
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Error => tracing::Level::ERROR,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

// ---- Status Command ---------------------------------------------------------

fn show_status(config: &StromConfig) -> Result<()> {
    let store = Store::open(&config::resolve_path(&config.db_path))?;
    let wallet_line = LocalWallet::load(&config.rpc_url)
        .address()
        .unwrap_or_else(|| "(no wallet; run strom --init)".to_string());
    let token_line = if store.auth_token().is_some() {
        "stored"
    } else {
        "none"
    };

    println!(
        r#"
=== STROM STATUS ===
Backend:    {}
Wallet:     {}
Token:      {}
Anon count: {}
DB Path:    {}
Version:    {}
====================
"#,
        config.api_url,
        wallet_line,
        token_line,
        store.anon_count(),
        config::resolve_path(&config.db_path),
        VERSION,
    );
    Ok(())
}

// ---- Chat Session -----------------------------------------------------------

fn render_reply(body: &MessageBody) {
    match body {
        MessageBody::Text(text) => println!("{} {}", "bot:".green().bold(), text),
        MessageBody::Analysis(analysis) => {
            println!("{}", "bot:".green().bold());
            for point in &analysis.points {
                println!("  {} {}", "\u{2022}".green(), point);
            }
            if !analysis.relevant_projects.is_empty() {
                println!(
                    "  {} {}",
                    "related:".dimmed(),
                    analysis.relevant_projects.join(", ")
                );
            }
            for source in &analysis.sources {
                match &source.url {
                    Some(url) => println!("  {} {} <{}>", "source:".dimmed(), source.name, url),
                    None => println!("  {} {}", "source:".dimmed(), source.name),
                }
            }
        }
    }
}

fn print_gate_prompt(session: &Session) {
    match session.gate_state() {
        GateState::LimitPrompt => {
            println!(
                "{}",
                "You have used your free messages. Sign in (/login <token>) or pay (/pay <amount>) to continue."
                    .yellow()
            );
        }
        GateState::AwaitingTransfer { amount_native } => {
            println!(
                "{}",
                format!("Transfer of {amount_native} in progress...").yellow()
            );
        }
        _ => {}
    }
}

async fn run_chat(config: StromConfig) -> Result<()> {
    let store = Store::open(&config::resolve_path(&config.db_path))?;
    let client = Arc::new(StromHttpClient::new(
        config.api_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    ));
    let signer = LocalWallet::load(&config.rpc_url);

    let identity = resolver::resolve(&store, client.as_ref()).await;
    match &identity {
        Identity::Anonymous { usage_count } => {
            println!("{}", format!("Anonymous session ({usage_count} messages used).").dimmed())
        }
        Identity::Authenticated { .. } => println!("{}", "Signed in.".dimmed()),
    }

    let mut session = Session::new(identity, client, store, &config.payment_recipient);

    println!("{}", "What can I help with? (/quit to exit)".dimmed());

    loop {
        let line: String = Input::new()
            .with_prompt(format!("{}", "you".cyan()))
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim().to_string();

        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(token) = line.strip_prefix("/login ") {
            match session.sign_in(token.trim()).await {
                Ok(()) => println!("{}", "Signed in.".green()),
                Err(e) => eprintln!("{} {}", "error:".red(), e),
            }
            continue;
        }
        if let Some(amount) = line.strip_prefix("/pay ") {
            let amount: f64 = match amount.trim().parse() {
                Ok(a) => a,
                Err(_) => {
                    eprintln!("{} enter a numeric amount", "error:".red());
                    continue;
                }
            };
            match session.pay(amount, &signer).await {
                Ok(signature) => {
                    println!("{} transaction {}", "paid:".green().bold(), signature)
                }
                Err(e) => eprintln!("{} {}", "error:".red(), e),
            }
            continue;
        }

        match session.send(&line).await {
            SendOutcome::Replied | SendOutcome::Failed => {
                if let Some(entry) = session
                    .transcript()
                    .iter()
                    .rev()
                    .find(|e| e.sender == Sender::Bot)
                {
                    render_reply(&entry.body);
                }
            }
            SendOutcome::Blocked => {
                // A server-side limit signal may have carried a partial reply
                if let Some(entry) = session.transcript().last() {
                    if entry.sender == Sender::Bot {
                        render_reply(&entry.body);
                    }
                }
                print_gate_prompt(&session);
            }
            SendOutcome::Ignored => {}
        }
    }

    Ok(())
}

// ---- Entry Point -----------------------------------------------------------

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = config::load_config();
    init_tracing(config.log_level);

    if cli.init {
        match wallet::get_wallet() {
            Ok((signer, is_new)) => {
                let address = signer.address().to_checksum(None);
                println!(
                    "{}",
                    serde_json::json!({
                        "address": address,
                        "isNew": is_new,
                        "configDir": config::get_strom_dir().to_string_lossy(),
                    })
                );
            }
            Err(e) => {
                eprintln!("Init failed: {e:#}");
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.reset {
        let result = Store::open(&config::resolve_path(&config.db_path)).and_then(|store| {
            store.clear_auth_token()?;
            store.clear_anon_count()?;
            Ok(())
        });
        match result {
            Ok(()) => println!("Local identity state cleared."),
            Err(e) => {
                eprintln!("Reset failed: {e:#}");
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.status {
        if let Err(e) = show_status(&config) {
            eprintln!("Status failed: {e:#}");
            std::process::exit(1);
        }
        return;
    }

    if cli.run {
        if let Err(e) = run_chat(config).await {
            eprintln!("Fatal: {e:#}");
            std::process::exit(1);
        }
        return;
    }

    println!("Run \"strom --help\" for usage information.");
    println!("Run \"strom --run\" to start a chat session.");
}
