// Catalog Seeding - upstream pokemon.json → Pokemon rows
//
// Upstream entry shape (abridged):
//   { "id": 2, "name": { "english": "Ivysaur" }, "type": ["Grass", "Poison"],
//     "base": { "HP": 60, "Attack": 62, "Sp. Attack": 80, ... },
//     "profile": { "height": "1 m", "weight": "13 kg", "ability": [["Overgrow", "false"]] },
//     "evolution": { "prev": ["1", "Level 16"], "next": [["3", "Level 32"]] },
//     "image": { "sprite": "...", "thumbnail": "...", "hires": "..." } }

use std::collections::HashMap;
use std::fs;
use std::future::ready;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;

use crate::evolution::resolve_pre_evolution_chain;
use crate::pokemon::{Ability, Evolution, Pokemon, PokemonId, Sprites, Stats};

#[derive(Debug, Deserialize)]
struct RawName {
    english: String,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(rename = "HP")]
    hp: i64,
    #[serde(rename = "Attack")]
    attack: i64,
    #[serde(rename = "Defense")]
    defense: i64,
    #[serde(rename = "Sp. Attack")]
    special_attack: i64,
    #[serde(rename = "Sp. Defense")]
    special_defense: i64,
    #[serde(rename = "Speed")]
    speed: i64,
}

#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    #[serde(default)]
    height: Option<String>,
    #[serde(default)]
    weight: Option<String>,
    #[serde(default)]
    ability: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct RawPokemon {
    id: PokemonId,
    name: RawName,
    #[serde(rename = "type", default)]
    types: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Sprites,
    #[serde(default)]
    base: Option<RawStats>,
    #[serde(default)]
    profile: Option<RawProfile>,
    #[serde(default)]
    evolution: Option<Evolution>,
}

impl From<RawStats> for Stats {
    fn from(raw: RawStats) -> Self {
        Stats {
            hp: raw.hp,
            attack: raw.attack,
            defense: raw.defense,
            special_attack: raw.special_attack,
            special_defense: raw.special_defense,
            speed: raw.speed,
        }
    }
}

impl From<RawPokemon> for Pokemon {
    fn from(raw: RawPokemon) -> Self {
        let profile = raw.profile.unwrap_or_default();

        Pokemon {
            id: raw.id,
            name: raw.name.english,
            pokedex_number: raw.id,
            types: raw.types,
            description: raw.description,
            sprites: raw.image,
            stats: raw.base.map(Stats::from),
            abilities: profile
                .ability
                .into_iter()
                .map(|(name, hidden)| Ability {
                    name,
                    is_hidden: hidden == "true",
                })
                .collect(),
            height: profile.height.as_deref().and_then(parse_measurement),
            weight: profile.weight.as_deref().and_then(parse_measurement),
            evolution: raw.evolution.unwrap_or_default(),
            evolution_tier: 1,
            created_at: Utc::now(),
        }
    }
}

/// Leading number of a measurement like `"0.7 m"` or `"6.9 kg"`.
pub fn parse_measurement(value: &str) -> Option<f64> {
    value.split_whitespace().next()?.parse().ok()
}

/// Parse the upstream JSON array. Evolution tiers are left at 1; see
/// [`assign_evolution_tiers`].
pub fn parse_pokemon_json(json: &str) -> Result<Vec<Pokemon>> {
    let raw: Vec<RawPokemon> = serde_json::from_str(json).context("Failed to parse pokemon JSON")?;

    let mut pokemon: Vec<Pokemon> = Vec::with_capacity(raw.len());
    for entry in raw {
        if entry.id <= 0 {
            bail!("Pokemon {:?} has non-positive id {}", entry.name.english, entry.id);
        }
        pokemon.push(entry.into());
    }

    Ok(pokemon)
}

pub fn load_pokemon_json(path: &Path) -> Result<Vec<Pokemon>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pokemon JSON at {}", path.display()))?;
    parse_pokemon_json(&json)
}

/// Tier = number of pre-evolutions + 1, resolved over the data being seeded.
pub async fn assign_evolution_tiers(pokemon: &mut [Pokemon]) -> Result<()> {
    let by_id: HashMap<PokemonId, Pokemon> = pokemon.iter().map(|p| (p.id, p.clone())).collect();

    for entry in pokemon.iter_mut() {
        let ancestors = resolve_pre_evolution_chain(entry.id, |id| ready(Ok(by_id.get(&id).cloned())))
            .await
            .with_context(|| format!("Failed to resolve evolutions of {}", entry.name))?;

        entry.evolution_tier = u8::try_from(ancestors.len() + 1)
            .with_context(|| format!("Evolution chain of {} is too deep", entry.name))?;
    }

    Ok(())
}
