use std::{io, path::PathBuf, process};
#[macro_use]
extern crate log;

use anyhow::Context;
use clap::Parser;

mod atm;
mod features;
use atm::{Atm, AtmConfig};
use features::{Registry, SeedPolicy};

/// Command-line ATM backed by a JSON account store
#[derive(Parser, Debug)]
#[clap(name = "atm", version)]
struct Cli {
    /// Account store file
    #[clap(long, env = "ATM_STORE", default_value = "accounts.json")]
    store: PathBuf,

    /// Seed demo accounts 12345/1111 and 67890/2222 if the store does not exist yet
    #[clap(long)]
    demo: bool,

    /// Number of entries shown by "Transaction history"
    #[clap(long, default_value = "10")]
    history_limit: usize,

    /// Failed logins allowed before the card is blocked for the session
    #[clap(long, default_value = "3")]
    max_login_attempts: u32,
}

impl Cli {
    fn seed_policy(&self) -> SeedPolicy {
        if self.demo {
            SeedPolicy::Demo
        } else {
            SeedPolicy::Empty
        }
    }

    fn atm_config(&self) -> AtmConfig {
        AtmConfig {
            history_limit: self.history_limit,
            max_login_attempts: self.max_login_attempts,
        }
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        error!("{e:#}");
        eprintln!("{e:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut registry = Registry::load(&cli.store, cli.seed_policy())
        .with_context(|| format!("Unable to open account store {}", cli.store.display()))?;
    info!(
        "Using account store {} ({} accounts)",
        registry.path().display(),
        registry.len()
    );

    let stdin = io::stdin();
    Atm::new(&mut registry, stdin.lock(), io::stdout(), cli.atm_config()).run()
}
