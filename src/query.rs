// Catalog Query - filters + pagination shared by the catalog listing and user collections

use serde::{Deserialize, Serialize};

use crate::pokemon::Pokemon;
use crate::validation::{ValidationError, Validator};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;
pub const MAX_EVOLUTION_TIER: u8 = 3;

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// Query string of `GET /api/pokemon` and `GET /api/me/collection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PokemonQuery {
    #[serde(default = "default_page")]
    pub page: u32,

    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Case-insensitive substring of the name
    #[serde(default)]
    pub name: Option<String>,

    /// Case-insensitive substring of the description
    #[serde(default)]
    pub description: Option<String>,

    /// Case-insensitive membership in the type list
    #[serde(default, rename = "type")]
    pub pokemon_type: Option<String>,

    #[serde(default)]
    pub evolution_tier: Option<u8>,
}

impl Default for PokemonQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            name: None,
            description: None,
            pokemon_type: None,
            evolution_tier: None,
        }
    }
}

impl PokemonQuery {
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        Validator::new()
            .check(self.page > 0, "page", "Page must be a positive number")
            .check(
                self.limit > 0 && self.limit <= MAX_LIMIT,
                "limit",
                "Limit must be a positive number between 1 and 100",
            )
            .check(
                self.evolution_tier
                    .map_or(true, |tier| tier > 0 && tier <= MAX_EVOLUTION_TIER),
                "evolutionTier",
                "Evolution tier must be 1, 2, or 3",
            )
            .finish()
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Blank filter strings are treated as absent.
    pub fn name_filter(&self) -> Option<&str> {
        non_blank(&self.name)
    }

    pub fn description_filter(&self) -> Option<&str> {
        non_blank(&self.description)
    }

    pub fn type_filter(&self) -> Option<&str> {
        non_blank(&self.pokemon_type)
    }

    /// In-memory form of the filter, mirroring what the SQL adapter does.
    /// Case folding is ASCII-only, like SQLite's `LIKE` and `lower()`.
    pub fn matches(&self, pokemon: &Pokemon) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
        };

        self.name_filter().map_or(true, |n| contains(&pokemon.name, n))
            && self.description_filter().map_or(true, |d| {
                pokemon.description.as_deref().is_some_and(|text| contains(text, d))
            })
            && self.type_filter().map_or(true, |t| pokemon.has_type(t))
            && self
                .evolution_tier
                .map_or(true, |tier| pokemon.evolution_tier == tier)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// One page of rows plus the unpaginated total.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> Paginated<T> {
    pub fn new(listing: Listing<T>, query: &PokemonQuery) -> Self {
        let limit = u64::from(query.limit.max(1));
        let total_pages = listing.total.div_ceil(limit);

        Self {
            data: listing.items,
            pagination: PaginationMeta {
                page: query.page,
                limit: query.limit,
                total: listing.total,
                total_pages,
                has_next_page: u64::from(query.page) < total_pages,
                has_previous_page: query.page > 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_query_string() {
        let query: PokemonQuery = serde_json::from_str("{}").unwrap();

        assert_eq!(query, PokemonQuery::default());
        assert_eq!(query.offset(), 0);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut query = PokemonQuery::page(0, 101);
        query.evolution_tier = Some(4);

        let err = query.validate().unwrap_err();
        let fields: Vec<&str> = err.issues.iter().map(|i| i.field.as_str()).collect();

        assert_eq!(fields, vec!["page", "limit", "evolutionTier"]);
    }

    #[test]
    fn test_pagination_math() {
        let query = PokemonQuery::page(2, 10);
        let page = Paginated::new(
            Listing {
                items: vec![1, 2, 3],
                total: 23,
            },
            &query,
        );

        assert_eq!(query.offset(), 10);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next_page);
        assert!(page.pagination.has_previous_page);

        let last = Paginated::new(Listing { items: vec![1], total: 23 }, &PokemonQuery::page(3, 10));
        assert!(!last.pagination.has_next_page);
    }

    #[test]
    fn test_empty_total_has_zero_pages() {
        let page: Paginated<u8> = Paginated::new(Listing { items: vec![], total: 0 }, &PokemonQuery::default());

        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next_page);
        assert!(!page.pagination.has_previous_page);
    }

    #[test]
    fn test_in_memory_filters() {
        let ivysaur = Pokemon::new(2, "Ivysaur").with_types(&["Grass", "Poison"]);
        let mut query = PokemonQuery {
            name: Some("ivy".to_string()),
            pokemon_type: Some("POISON".to_string()),
            ..PokemonQuery::default()
        };
        assert!(query.matches(&ivysaur));

        query.evolution_tier = Some(2);
        assert!(!query.matches(&ivysaur));

        query.evolution_tier = None;
        query.name = Some("   ".to_string());
        query.description = Some("seed".to_string());
        assert!(!query.matches(&ivysaur));
    }

    #[test]
    fn test_case_folding_is_ascii_only() {
        let flabebe = Pokemon::new(669, "Flabébé").with_types(&["Fairy"]);
        let by_name = |name: &str| PokemonQuery {
            name: Some(name.to_string()),
            ..PokemonQuery::default()
        };

        assert!(by_name("FLAB").matches(&flabebe));
        assert!(by_name("flabébé").matches(&flabebe));
        assert!(!by_name("FLABÉBÉ").matches(&flabebe));
    }
}
