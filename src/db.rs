use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;

use crate::pokemon::{Ability, Evolution, Pokemon, Sprites, Stats};

/// Row counts for the `stats` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub pokemon: i64,
    pub users: i64,
    pub caught: i64,
}

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Users
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT UNIQUE NOT NULL,
            username TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Pokémon catalog (JSON columns hold list/struct shaped data)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pokemon (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            pokedex_number INTEGER UNIQUE NOT NULL,
            types TEXT NOT NULL,
            description TEXT,
            sprites TEXT NOT NULL,
            stats TEXT,
            abilities TEXT NOT NULL,
            height REAL,
            weight REAL,
            evolution TEXT,
            evolution_tier INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // User collections: presence of a row = caught
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_pokemon (
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            pokemon_id INTEGER NOT NULL REFERENCES pokemon(id) ON DELETE CASCADE,
            caught_at TEXT NOT NULL,
            PRIMARY KEY (user_id, pokemon_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pokemon_name ON pokemon(name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pokemon_tier ON pokemon(evolution_tier)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_pokemon_pokemon ON user_pokemon(pokemon_id)",
        [],
    )?;

    Ok(())
}

/// Insert catalog rows. Ids already present are skipped, so re-seeding is a no-op.
pub fn insert_pokemon(conn: &Connection, pokemon: &[Pokemon]) -> Result<usize> {
    let mut inserted = 0;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO pokemon (
            id, name, pokedex_number, types, description, sprites, stats,
            abilities, height, weight, evolution, evolution_tier, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;

    for entry in pokemon {
        let stats_json = entry.stats.map(|s| serde_json::to_string(&s)).transpose()?;
        let evolution_json = if entry.evolution.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&entry.evolution)?)
        };

        inserted += stmt.execute(params![
            entry.id,
            entry.name,
            entry.pokedex_number,
            serde_json::to_string(&entry.types)?,
            entry.description,
            serde_json::to_string(&entry.sprites)?,
            stats_json,
            serde_json::to_string(&entry.abilities)?,
            entry.height,
            entry.weight,
            evolution_json,
            entry.evolution_tier,
            entry.created_at.to_rfc3339(),
        ])?;
    }

    Ok(inserted)
}

/// Raw `pokemon` row, converted to [`Pokemon`] outside the rusqlite closure so
/// JSON errors keep their context.
#[derive(Debug)]
pub(crate) struct PokemonRow {
    pub id: i64,
    pub name: String,
    pub pokedex_number: i64,
    pub types: String,
    pub description: Option<String>,
    pub sprites: String,
    pub stats: Option<String>,
    pub abilities: String,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub evolution: Option<String>,
    pub evolution_tier: u8,
    pub created_at: String,
}

pub(crate) const POKEMON_COLUMNS: &str = "p.id, p.name, p.pokedex_number, p.types, p.description, p.sprites,
     p.stats, p.abilities, p.height, p.weight, p.evolution, p.evolution_tier, p.created_at";

impl PokemonRow {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(PokemonRow {
            id: row.get(0)?,
            name: row.get(1)?,
            pokedex_number: row.get(2)?,
            types: row.get(3)?,
            description: row.get(4)?,
            sprites: row.get(5)?,
            stats: row.get(6)?,
            abilities: row.get(7)?,
            height: row.get(8)?,
            weight: row.get(9)?,
            evolution: row.get(10)?,
            evolution_tier: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    pub(crate) fn into_pokemon(self) -> Result<Pokemon> {
        let id = self.id;
        let context = || format!("Malformed catalog row for pokemon {}", id);

        let evolution = match self.evolution.as_deref() {
            Some(json) => Evolution::parse(json).with_context(context)?,
            None => Evolution::default(),
        };
        let stats: Option<Stats> = self
            .stats
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .with_context(context)?;
        let sprites: Sprites = serde_json::from_str(&self.sprites).with_context(context)?;
        let abilities: Vec<Ability> = serde_json::from_str(&self.abilities).with_context(context)?;
        let types: Vec<String> = serde_json::from_str(&self.types).with_context(context)?;

        Ok(Pokemon {
            id,
            name: self.name,
            pokedex_number: self.pokedex_number,
            types,
            description: self.description,
            sprites,
            stats,
            abilities,
            height: self.height,
            weight: self.weight,
            evolution,
            evolution_tier: self.evolution_tier,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM pokemon", [], |row| row.get(0))?;

    Ok(count)
}

pub fn get_stats(conn: &Connection) -> Result<DatabaseStats> {
    let count = |table: &str| -> Result<i64> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
    };

    Ok(DatabaseStats {
        pokemon: count("pokemon")?,
        users: count("users")?,
        caught: count("user_pokemon")?,
    })
}

/// Delete the catalog and every collection. Accounts are kept so issued
/// tokens keep pointing at the user they were signed for.
pub fn clean_database(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM user_pokemon", [])?;
    tx.execute("DELETE FROM pokemon", [])?;
    tx.commit()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::starter_pokemon;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_seed_twice_is_idempotent() {
        let conn = test_db();
        let pokemon = starter_pokemon();

        let inserted1 = insert_pokemon(&conn, &pokemon).unwrap();
        let inserted2 = insert_pokemon(&conn, &pokemon).unwrap();

        assert_eq!(inserted1, 6, "First seed should insert 6 pokemon");
        assert_eq!(inserted2, 0, "Second seed should insert nothing");
        assert_eq!(verify_count(&conn).unwrap(), 6);
    }

    #[test]
    fn test_row_round_trips_evolution() {
        let conn = test_db();
        insert_pokemon(&conn, &starter_pokemon()).unwrap();

        let row = conn
            .query_row(
                &format!("SELECT {} FROM pokemon p WHERE p.id = 3", POKEMON_COLUMNS),
                [],
                PokemonRow::from_row,
            )
            .unwrap();
        let venusaur = row.into_pokemon().unwrap();

        assert_eq!(venusaur.name, "Venusaur");
        assert_eq!(venusaur.prev_id(), Some(2));
        assert_eq!(venusaur.evolution_tier, 3);
        assert_eq!(venusaur.types, vec!["Grass", "Poison"]);
    }

    #[test]
    fn test_malformed_evolution_column_is_an_error() {
        let conn = test_db();
        insert_pokemon(&conn, &starter_pokemon()[..1]).unwrap();
        conn.execute(
            "UPDATE pokemon SET evolution = '{\"prev\":[\"abc\",\"Level 5\"]}' WHERE id = 1",
            [],
        )
        .unwrap();

        let row = conn
            .query_row(
                &format!("SELECT {} FROM pokemon p WHERE p.id = 1", POKEMON_COLUMNS),
                [],
                PokemonRow::from_row,
            )
            .unwrap();

        let err = row.into_pokemon().unwrap_err();
        assert!(err.to_string().contains("pokemon 1"));
    }

    #[test]
    fn test_clean_database_keeps_schema() {
        let mut conn = test_db();
        insert_pokemon(&conn, &starter_pokemon()).unwrap();

        clean_database(&mut conn).unwrap();

        assert_eq!(
            get_stats(&conn).unwrap(),
            DatabaseStats {
                pokemon: 0,
                users: 0,
                caught: 0
            }
        );
        assert_eq!(insert_pokemon(&conn, &starter_pokemon()).unwrap(), 6);
    }

    #[test]
    fn test_clean_database_keeps_accounts() {
        let mut conn = test_db();
        insert_pokemon(&conn, &starter_pokemon()).unwrap();
        let add_user = |conn: &Connection, email: &str| -> i64 {
            conn.query_row(
                "INSERT INTO users (email, username, password_hash, created_at)
                 VALUES (?1, 'trainer', 'hash', '2024-01-01T00:00:00+00:00')
                 RETURNING id",
                [email],
                |row| row.get(0),
            )
            .unwrap()
        };
        let ash = add_user(&conn, "ash@pallet.town");
        conn.execute("INSERT INTO user_pokemon VALUES (?1, 1, '2024-01-01T00:00:00+00:00')", [ash])
            .unwrap();

        clean_database(&mut conn).unwrap();
        let misty = add_user(&conn, "misty@cerulean.city");

        let stats = get_stats(&conn).unwrap();
        assert_eq!((stats.pokemon, stats.users, stats.caught), (0, 2, 0));
        assert_ne!(misty, ash, "a new account must never reuse an existing id");
    }
}
