use clap::Parser;
use hashdice::{
    config::StorageConfig, ConfigLoader, CrashDiceCalculator, HashKind, HashdiceConfig, Identity,
    LedgerStore, OutcomeCalculator,
};
use std::path::Path;
use uuid::Uuid;

/// Print a player's hashchain and re-derive the outcome of every settled bet on it
#[derive(Parser, Debug)]
#[command(name = "inspect_ledger")]
struct Args {
    /// Server configuration file; supplies the ledger path and house edge
    #[arg(short, long)]
    config: Option<String>,

    /// Ledger database directory (the server must be stopped)
    #[arg(long)]
    db_path: Option<String>,

    #[arg(long)]
    user: String,

    #[arg(long)]
    experience: String,

    #[arg(long)]
    casino: String,

    /// Inspect this chain instead of the active one
    #[arg(long)]
    chain: Option<Uuid>,

    /// Override the configured house edge
    #[arg(long)]
    house_edge: Option<f64>,
}

/// Ledger location and house edge, flags over configuration
fn resolve(args: &Args, config: &HashdiceConfig) -> (StorageConfig, f64) {
    let storage = StorageConfig {
        data_directory: args
            .db_path
            .clone()
            .unwrap_or_else(|| config.storage.data_directory.clone()),
        clear_on_start: false,
        ..config.storage.clone()
    };
    let house_edge = args.house_edge.unwrap_or(config.engine.house_edge);
    (storage, house_edge)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match args.config {
        Some(ref path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;
    let (storage, house_edge) = resolve(&args, &config);

    if !Path::new(&storage.data_directory).exists() {
        println!("No ledger found at {}", storage.data_directory);
        return Ok(());
    }

    let store = LedgerStore::open(&storage)?;

    let identity = Identity::new(args.user, args.experience, args.casino);
    let chain = match args.chain {
        Some(id) => store.hashchain(id)?,
        None => store.active_hashchain(&identity)?,
    };
    let Some(chain) = chain else {
        println!("No hashchain found for {}", identity);
        return Ok(());
    };

    println!("Hashchain {}", chain.id);
    println!("   Identity:    {}", chain.identity);
    println!("   Client seed: {:?}", chain.client_seed);
    println!("   Active:      {}", chain.active);
    println!("   Created:     {}", chain.created_at);
    println!("   House edge:  {}", house_edge);
    println!();

    let calculator = CrashDiceCalculator;
    let mut mismatches = 0;

    for record in store.hashes_for_chain(chain.id)? {
        println!("#{:>5} {:<13} {}", record.iteration, record.kind.to_string(), hex::encode(&record.value));

        if record.kind != HashKind::DiceBet {
            continue;
        }

        match store.dice_bet(record.id)? {
            Some(bet) => {
                let recomputed = calculator.compute(&record.value, &chain.client_seed, house_edge);
                let verified = recomputed == bet.actual;
                if !verified {
                    mismatches += 1;
                }
                println!(
                    "       wager {} target {} actual {} net {} {}",
                    bet.wager,
                    bet.target,
                    bet.actual,
                    bet.net,
                    if verified { "verified" } else { "MISMATCH" }
                );
            }
            None => println!("       no settled bet for this commitment"),
        }
    }

    println!();
    if mismatches > 0 {
        println!("{} bet(s) do not match their commitment", mismatches);
    } else {
        println!("All settled bets match their commitments");
    }

    Ok(())
}
