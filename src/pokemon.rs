// Pokémon Catalog Entity
// Immutable after seeding; the evolution structure is validated at the storage boundary
//
// Evolution links travel as string pairs: ["1", "Level 16"]
// They are parsed into integer ids here so nothing downstream sees untyped data.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub type PokemonId = i64;
pub type UserId = i64;

// ============================================================================
// EVOLUTION STRUCTURE
// ============================================================================

/// One edge of an evolution chain: the linked Pokémon and how the evolution happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct EvolutionLink {
    pub pokemon_id: PokemonId,
    pub method: String,
}

impl EvolutionLink {
    pub fn new(pokemon_id: PokemonId, method: impl Into<String>) -> Self {
        Self {
            pokemon_id,
            method: method.into(),
        }
    }
}

/// Raised when a stored link does not carry a positive integer id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLink(pub String);

impl fmt::Display for MalformedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evolution link id {:?} is not a positive integer", self.0)
    }
}

impl TryFrom<(String, String)> for EvolutionLink {
    type Error = MalformedLink;

    fn try_from((id, method): (String, String)) -> std::result::Result<Self, Self::Error> {
        match id.trim().parse::<PokemonId>() {
            Ok(pokemon_id) if pokemon_id > 0 => Ok(Self { pokemon_id, method }),
            _ => Err(MalformedLink(id)),
        }
    }
}

impl From<EvolutionLink> for (String, String) {
    fn from(link: EvolutionLink) -> Self {
        (link.pokemon_id.to_string(), link.method)
    }
}

/// Evolution pointers of a single Pokémon.
///
/// `prev` is the only edge the pre-evolution walk follows. Each Pokémon has
/// at most one, so chains form a forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evolution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<EvolutionLink>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub next: Vec<EvolutionLink>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<EvolutionLink>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<EvolutionLink>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Evolution {
    /// Parse a stored evolution column. Malformed shapes are rejected, not defaulted.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).with_context(|| format!("Malformed evolution data: {}", json))
    }

    pub fn is_empty(&self) -> bool {
        self.prev.is_none() && self.next.is_empty()
    }
}

// ============================================================================
// CATALOG ENTITY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sprites {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hires: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub hp: i64,
    pub attack: i64,
    pub defense: i64,
    pub special_attack: i64,
    pub special_defense: i64,
    pub speed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    pub name: String,
    #[serde(default)]
    pub is_hidden: bool,
}

/// A catalog entry. `id` equals the Pokédex number for seeded data, so the ids
/// carried by evolution links resolve directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pokemon {
    pub id: PokemonId,
    pub name: String,
    pub pokedex_number: i64,
    pub types: Vec<String>,
    pub description: Option<String>,
    pub sprites: Sprites,
    pub stats: Option<Stats>,
    pub abilities: Vec<Ability>,
    /// Metres
    pub height: Option<f64>,
    /// Kilograms
    pub weight: Option<f64>,
    pub evolution: Evolution,
    /// 1 for base forms, 2 for first evolutions, 3 for second evolutions
    pub evolution_tier: u8,
    pub created_at: DateTime<Utc>,
}

impl Pokemon {
    /// Minimal catalog entry; the remaining fields start empty.
    pub fn new(id: PokemonId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            pokedex_number: id,
            types: Vec::new(),
            description: None,
            sprites: Sprites::default(),
            stats: None,
            abilities: Vec::new(),
            height: None,
            weight: None,
            evolution: Evolution::default(),
            evolution_tier: 1,
            created_at: Utc::now(),
        }
    }

    pub fn with_prev(mut self, ancestor: PokemonId, method: impl Into<String>) -> Self {
        self.evolution.prev = Some(EvolutionLink::new(ancestor, method));
        self
    }

    pub fn with_types(mut self, types: &[&str]) -> Self {
        self.types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Id of the Pokémon this one evolves from, if any.
    pub fn prev_id(&self) -> Option<PokemonId> {
        self.evolution.prev.as_ref().map(|link| link.pokemon_id)
    }

    pub fn has_type(&self, wanted: &str) -> bool {
        self.types.iter().any(|t| t.eq_ignore_ascii_case(wanted))
    }
}

// ============================================================================
// COLLECTION MEMBERSHIP
// ============================================================================

/// "User U has caught Pokémon P". Presence means caught.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPokemon {
    pub user_id: UserId,
    pub pokemon_id: PokemonId,
    pub caught_at: DateTime<Utc>,
}

/// Insertion payload for the collection store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NewUserPokemon {
    pub user_id: UserId,
    pub pokemon_id: PokemonId,
}

impl NewUserPokemon {
    pub fn new(user_id: UserId, pokemon_id: PokemonId) -> Self {
        Self { user_id, pokemon_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prev_and_next_links() {
        let evolution = Evolution::parse(r#"{"prev":["1","Level 16"],"next":[["3","Level 32"]]}"#).unwrap();

        assert_eq!(evolution.prev, Some(EvolutionLink::new(1, "Level 16")));
        assert_eq!(evolution.next, vec![EvolutionLink::new(3, "Level 32")]);
    }

    #[test]
    fn test_null_and_missing_fields_mean_no_links() {
        let evolution = Evolution::parse(r#"{"prev":null,"next":null}"#).unwrap();
        assert!(evolution.is_empty());

        let evolution = Evolution::parse("{}").unwrap();
        assert!(evolution.is_empty());
    }

    #[test]
    fn test_malformed_link_is_rejected() {
        assert!(Evolution::parse(r#"{"prev":["bulbasaur","Level 16"]}"#).is_err());
        assert!(Evolution::parse(r#"{"prev":["0","Level 16"]}"#).is_err());
        assert!(Evolution::parse(r#"{"prev":"1"}"#).is_err());
    }

    #[test]
    fn test_links_serialize_back_to_string_pairs() {
        let evolution = Evolution {
            prev: Some(EvolutionLink::new(25, "use-item thunder-stone")),
            next: Vec::new(),
        };

        let json = serde_json::to_string(&evolution).unwrap();
        assert_eq!(json, r#"{"prev":["25","use-item thunder-stone"]}"#);
    }

    #[test]
    fn test_type_match_ignores_case() {
        let bulbasaur = Pokemon::new(1, "Bulbasaur").with_types(&["Grass", "Poison"]);

        assert!(bulbasaur.has_type("grass"));
        assert!(!bulbasaur.has_type("fire"));
        assert_eq!(bulbasaur.prev_id(), None);
        assert_eq!(Pokemon::new(2, "Ivysaur").with_prev(1, "Level 16").prev_id(), Some(1));
    }
}
