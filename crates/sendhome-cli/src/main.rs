//! SendHome CLI
//!
//! A simulated wallet: log in, check your balance, send money and browse
//! the history. Nothing leaves this device.

use chrono::Local;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wallet_core::{
    default_store_dir, format_money, parse_amount, SessionState, Transaction, TransferError,
    WalletApp, WalletError, RECENT_LIMIT,
};
use wallet_native::{
    check_biometric_status, enroll_biometric, is_biometric_available, unenroll_biometric,
    PlatformBiometrics,
};

#[derive(Parser)]
#[command(name = "sendhome")]
#[command(version)]
#[command(about = "SendHome - a simulated wallet backed by encrypted local storage")]
#[command(after_help = "EXAMPLES:
  sendhome login                        Sign in (PIN is prompted)
  sendhome wallet                       Show balance and recent activity
  sendhome send Mom 25 --note Groceries Send money
  sendhome history                      List all transactions
  sendhome clear                        Delete all simulated transactions")]
struct Cli {
    /// Wallet directory (defaults to $SENDHOME_DIR or ~/.sendhome)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and open the wallet
    Login {
        /// Account email (prompted when omitted)
        #[arg(long)]
        email: Option<String>,
    },

    /// Sign out and forget the session
    Logout,

    /// Show session and biometric status
    Status,

    /// Show balance and the most recent transactions
    Wallet,

    /// Send money to someone
    #[command(after_help = "EXAMPLES:
  sendhome send Mom 25
  sendhome send \"Uncle Joe\" 12.50 --note \"Birthday\"")]
    Send {
        /// Recipient name
        to: String,
        /// Amount to send
        amount: String,
        /// Optional note
        #[arg(long)]
        note: Option<String>,
    },

    /// List all transactions, newest first
    History,

    /// Delete all simulated transactions and zero the balance
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Manage biometric unlock
    Biometric {
        #[command(subcommand)]
        action: BiometricCommands,
    },
}

#[derive(Subcommand)]
enum BiometricCommands {
    /// Check biometric status
    Status,
    /// Require Touch ID to open the wallet
    Enable,
    /// Stop requiring Touch ID
    Disable,
}

/// Initialize logging
fn init_logging() {
    // Log to stderr so command output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        None => {
            println!("SendHome - a simulated wallet backed by encrypted local storage");
            println!();
            println!("Run 'sendhome --help' for usage information.");
            println!("Run 'sendhome login' to get started.");
        }
        Some(cmd) => {
            let wallet_dir = cli.dir.unwrap_or_else(default_store_dir);
            debug!("Using wallet directory: {}", wallet_dir.display());
            if let Err(e) = handle_command(&wallet_dir, cmd).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn handle_command(wallet_dir: &Path, cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Commands::Login { email } => {
            handle_login(wallet_dir, email).await?;
        }
        Commands::Logout => {
            handle_logout(wallet_dir).await?;
        }
        Commands::Status => {
            handle_status(wallet_dir).await?;
        }
        Commands::Wallet => {
            handle_wallet(wallet_dir).await?;
        }
        Commands::Send { to, amount, note } => {
            handle_send(wallet_dir, &to, &amount, note.as_deref()).await?;
        }
        Commands::History => {
            handle_history(wallet_dir).await?;
        }
        Commands::Clear { yes } => {
            handle_clear(wallet_dir, yes).await?;
        }
        Commands::Biometric { action } => match action {
            BiometricCommands::Status => handle_biometric_status(wallet_dir)?,
            BiometricCommands::Enable => handle_biometric_enable(wallet_dir)?,
            BiometricCommands::Disable => handle_biometric_disable(wallet_dir)?,
        },
    }

    Ok(())
}

// === Command Handlers ===

async fn handle_login(wallet_dir: &Path, email: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let app = open_app(wallet_dir).await?;

    let email = match email {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    let pin = prompt_password("PIN: ")?;

    println!("Signing in...");
    match app.login(&email, &pin).await {
        Ok(presence) => {
            if presence.skipped {
                println!("Note: no biometric hardware or enrollment found, continuing without it.");
            }
            println!();
            println!("Signed in.");
            println!();
            print_overview(&app).await?;
            Ok(())
        }
        Err(WalletError::BiometricDenied) => {
            Err("Biometric verification failed. Try 'sendhome login' again.".into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_logout(wallet_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let app = open_app(wallet_dir).await?;
    app.logout().await?;
    println!("Signed out.");
    Ok(())
}

async fn handle_status(wallet_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("SendHome Status");
    println!("===============");
    println!();
    println!("Wallet directory: {}", wallet_dir.display());

    let app = open_app(wallet_dir).await?;
    if app.gate().has_session().await? {
        println!("[OK] Session token stored");
    } else {
        println!("[--] Not signed in");
    }

    let status = check_biometric_status(&wallet_account(wallet_dir));
    if status.available {
        println!("[OK] {} is available", status.biometric_type);
    } else {
        println!("[--] No biometric hardware detected");
    }
    if status.enrolled {
        println!("[OK] Biometric unlock is enabled for this wallet");
    } else {
        println!("[--] Biometric unlock is not enabled");
    }

    Ok(())
}

async fn handle_wallet(wallet_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let app = open_unlocked(wallet_dir).await?;
    print_overview(&app).await
}

async fn handle_send(
    wallet_dir: &Path,
    to: &str,
    amount: &str,
    note: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let amount = parse_amount(amount)?;

    let app = open_unlocked(wallet_dir).await?;
    let ledger = app.ledger().await?;

    match ledger.apply_transfer(to, amount, note).await {
        Ok(tx) => {
            println!("Sent! You sent {} to {}.", format_money(tx.amount), tx.counterparty().unwrap_or(to));
            println!("New balance: {}", format_money(ledger.load_balance().await?));
            Ok(())
        }
        Err(TransferError::InsufficientFunds { available, .. }) => {
            Err(format!("Insufficient funds. You only have {} available.", format_money(available)).into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_history(wallet_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let app = open_unlocked(wallet_dir).await?;
    let history = app.ledger().await?.history().await?;

    if history.is_empty() {
        println!("No transactions yet.");
        return Ok(());
    }

    println!("Transactions ({})", history.len());
    println!();
    for tx in &history {
        print_transaction(tx);
    }

    Ok(())
}

async fn handle_clear(wallet_dir: &Path, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    let app = open_unlocked(wallet_dir).await?;

    if !yes {
        let answer = prompt_line("This deletes all simulated transactions. Clear all? [y/N] ")?;
        if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    app.ledger().await?.clear_all().await?;
    println!("All transactions cleared. Balance is now {}.", format_money(Decimal::ZERO));

    Ok(())
}

fn handle_biometric_status(wallet_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Biometric Authentication Status");
    println!("================================");
    println!();

    if !is_biometric_available() {
        println!("[--] No biometric hardware detected");
        println!("     The wallet opens without a biometric check on this device.");
        return Ok(());
    }

    let status = check_biometric_status(&wallet_account(wallet_dir));
    println!("[OK] {} is available", status.biometric_type);
    if status.enrolled {
        println!("[OK] Biometric unlock is enabled for this wallet");
    } else {
        println!("[--] Biometric unlock is not enabled");
        println!();
        println!("Enable with: sendhome biometric enable");
    }

    Ok(())
}

fn handle_biometric_enable(wallet_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !is_biometric_available() {
        return Err("Biometric authentication is not available on this system".into());
    }

    enroll_biometric(&wallet_account(wallet_dir))
        .map_err(|e| format!("Failed to enable biometric: {}", e))?;

    println!("Biometric unlock enabled!");
    println!("Opening the wallet now asks for Touch ID.");

    Ok(())
}

fn handle_biometric_disable(wallet_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    unenroll_biometric(&wallet_account(wallet_dir))
        .map_err(|e| format!("Failed to disable biometric: {}", e))?;

    println!("Biometric unlock disabled.");

    Ok(())
}

// === Helper Functions ===

/// Keychain account the biometric gate item is stored under
fn wallet_account(wallet_dir: &Path) -> String {
    wallet_dir.to_string_lossy().to_string()
}

async fn open_app(wallet_dir: &Path) -> Result<WalletApp, WalletError> {
    let biometrics = PlatformBiometrics::new(wallet_account(wallet_dir));
    WalletApp::open(wallet_dir, Arc::new(biometrics)).await
}

/// Open the wallet as on a cold start and insist on a session
async fn open_unlocked(wallet_dir: &Path) -> Result<WalletApp, Box<dyn std::error::Error>> {
    let app = open_app(wallet_dir).await?;

    match app.restore().await? {
        SessionState::LoggedIn => Ok(app),
        SessionState::LoggedOut => {
            if app.gate().has_session().await? {
                Err("Biometric verification failed.".into())
            } else {
                Err("Not signed in. Run 'sendhome login' first.".into())
            }
        }
    }
}

async fn print_overview(app: &WalletApp) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = app.ledger().await?;
    let balance = ledger.load_balance().await?;
    let recent = ledger.recent(RECENT_LIMIT).await?;

    println!("Available balance: {}", format_money(balance));
    println!();
    println!("Recent activity");
    if recent.is_empty() {
        println!("  No transactions yet.");
    }
    for tx in &recent {
        print_transaction(tx);
    }

    Ok(())
}

fn print_transaction(tx: &Transaction) {
    let sign = if tx.is_send() { "-" } else { "+" };
    println!(
        "  {:<28} {:>12}  {}",
        tx.summary(),
        format!("{}{}", sign, format_money(tx.amount)),
        tx.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    if let Some(note) = &tx.note {
        println!("  {}", note);
    }
}

fn prompt_line(prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_password(prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let password = rpassword::read_password()?;
    Ok(password)
}
