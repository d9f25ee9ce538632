use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use pokedex::config::{load_dotenv, DatabaseConfig};
use pokedex::logging::init_tracing;
use pokedex::{assign_evolution_tiers, clean_database, get_stats, insert_pokemon, load_pokemon_json, open_database, verify_count};

#[derive(Debug, Parser)]
#[command(name = "pokedex", version, about = "Pokédex catalog maintenance")]
struct Cli {
    #[command(flatten)]
    database: DatabaseConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the catalog from an upstream pokemon.json file
    Seed { file: PathBuf },
    /// Delete the catalog and every collection (accounts are kept)
    Clean,
    /// Print row counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Command::Seed { file } => run_seed(&cli.database, &file).await,
        Command::Clean => run_clean(&cli.database),
        Command::Stats => run_stats(&cli.database),
    }
}

async fn run_seed(database: &DatabaseConfig, file: &Path) -> Result<()> {
    println!("🌱 Seeding Pokédex catalog");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load JSON
    println!("\n📂 Loading {}...", file.display());
    let mut pokemon = load_pokemon_json(file)?;
    println!("✓ Loaded {} pokemon", pokemon.len());

    // 2. Evolution tiers
    println!("\n🧬 Resolving evolution chains...");
    assign_evolution_tiers(&mut pokemon).await?;
    let evolved = pokemon.iter().filter(|p| p.evolution_tier > 1).count();
    println!("✓ {} pokemon evolve from another", evolved);

    // 3. Setup database
    println!("\n🔧 Setting up database...");
    let conn = open_database(&database.database_path)?;
    println!("✓ Database initialized with WAL mode");

    // 4. Insert
    println!("\n💾 Inserting pokemon...");
    let inserted = insert_pokemon(&conn, &pokemon).context("Failed to insert pokemon")?;

    // 5. Verify
    let count = verify_count(&conn)?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Inserted {} new pokemon", inserted);
    if inserted < pokemon.len() {
        println!("✓ Already present: {}", pokemon.len() - inserted);
    }
    println!("✓ Catalog contains {} pokemon", count);

    Ok(())
}

fn run_clean(database: &DatabaseConfig) -> Result<()> {
    println!("🧹 Cleaning {}...", database.database_path.display());

    let mut conn = open_database(&database.database_path)?;
    clean_database(&mut conn)?;

    println!("✅ Catalog and collections deleted");
    Ok(())
}

fn run_stats(database: &DatabaseConfig) -> Result<()> {
    let conn = open_database(&database.database_path)?;
    let stats = get_stats(&conn)?;

    println!("📊 {}", database.database_path.display());
    println!("   Pokemon: {}", stats.pokemon);
    println!("   Users:   {}", stats.users);
    println!("   Caught:  {}", stats.caught);
    Ok(())
}
