//! FO3 Custody CLI
//!
//! Operator tool for deriving keys, signing pre-images and checking or
//! repairing HD wallet files.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fo3_custody::account::{check_address_cache_legitimacy, generate_hd_wallet, HdWallet};
use fo3_custody::crypto::keys::{derive, Curve};
use fo3_custody::crypto::mnemonic::{generate_mnemonic, mnemonic_to_seed, MnemonicStrength};
use fo3_custody::crypto::signing::{DelegatedSigner, SignatureAlgorithm, SigningService};
use fo3_custody::CustodyConfig;

#[derive(Parser)]
#[command(name = "custody_cli")]
#[command(about = "FO3 Custody CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new HD wallet file
    Generate {
        /// Mnemonic length
        #[arg(long, default_value_t = 12)]
        words: u8,
        /// Number of accounts to derive
        #[arg(long, default_value_t = 1)]
        accounts: u32,
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Derive a public key from a mnemonic
    Derive {
        #[arg(short, long)]
        mnemonic: String,
        #[arg(long, default_value = "")]
        passphrase: String,
        /// Derivation path, e.g. m/44'/0'/0'/0/0
        #[arg(short, long)]
        path: String,
        #[arg(short, long, value_enum, default_value_t = CurveArg::Secp256k1)]
        curve: CurveArg,
    },
    /// Sign a hex pre-image with a hex private key
    Sign {
        #[arg(short, long)]
        data: String,
        #[arg(short, long)]
        key: String,
        #[arg(short, long, value_enum, default_value_t = CurveArg::Secp256k1)]
        algorithm: CurveArg,
    },
    /// Report whether a wallet file's derivations are broken
    CheckCache {
        #[arg(short, long)]
        wallet: PathBuf,
    },
    /// Rebuild a wallet file's accounts and derivations
    Replenish {
        #[arg(short, long)]
        wallet: PathBuf,
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CurveArg {
    Secp256k1,
    Ed25519,
}

impl From<CurveArg> for Curve {
    fn from(arg: CurveArg) -> Self {
        match arg {
            CurveArg::Secp256k1 => Curve::Secp256k1,
            CurveArg::Ed25519 => Curve::Ed25519,
        }
    }
}

impl From<CurveArg> for SignatureAlgorithm {
    fn from(arg: CurveArg) -> Self {
        match arg {
            CurveArg::Secp256k1 => SignatureAlgorithm::Secp256k1,
            CurveArg::Ed25519 => SignatureAlgorithm::Ed25519,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Generate { words, accounts, output } => {
            let strength = match words {
                12 => MnemonicStrength::Words12,
                24 => MnemonicStrength::Words24,
                other => anyhow::bail!("unsupported mnemonic length: {}", other),
            };
            let config = CustodyConfig::from_env()?;
            let mnemonic = generate_mnemonic(strength)?;
            let wallet = generate_hd_wallet(&mnemonic, "", &config.default_account_label, accounts)?;

            eprintln!("Mnemonic (store it offline): {}", mnemonic);
            write_wallet(&wallet, output)?;
        }
        Commands::Derive {
            mnemonic,
            passphrase,
            path,
            curve,
        } => {
            let seed = mnemonic_to_seed(&mnemonic, Some(&passphrase))?;
            let key_pair = derive(&seed, &path, curve.into())?;
            println!("{}", key_pair.public_key().to_hex());
        }
        Commands::Sign { data, key, algorithm } => {
            let data = hex::decode(&data).context("data is not valid hex")?;
            let key = hex::decode(&key).context("key is not valid hex")?;
            let signature = SigningService::new().sign(&data, &key, algorithm.into())?;
            println!("{}", hex::encode(signature));
        }
        Commands::CheckCache { wallet } => {
            let wallet = read_wallet(&wallet)?;
            let seed = wallet.master_seed()?;

            let incomplete = wallet.accounts_need_replenishment();
            let corrupted = check_address_cache_legitimacy(&wallet.accounts, &seed);
            println!("incomplete derivations: {}", incomplete);
            println!("corrupted address cache: {}", corrupted);
            if incomplete || corrupted {
                std::process::exit(1);
            }
        }
        Commands::Replenish { wallet, output } => {
            let config = CustodyConfig::from_env()?;
            let wallet = read_wallet(&wallet)?;
            let seed = wallet.master_seed()?;

            let replenished = config.replenisher().replenish(&wallet, &seed)?;
            info!("Replenished {} account(s)", replenished.accounts.len());
            write_wallet(&replenished, output)?;
        }
    }

    Ok(())
}

fn read_wallet(path: &PathBuf) -> anyhow::Result<HdWallet> {
    let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn write_wallet(wallet: &HdWallet, output: Option<PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(wallet)?;
    match output {
        Some(path) => fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
