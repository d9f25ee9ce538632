// Pre-Evolution Resolver
// Walks `prev` pointers backward from a Pokémon and returns its strict ancestors
//
// Example: Venusaur (3) ← Ivysaur (2) ← Bulbasaur (1)
//   resolve_pre_evolution_chain(3) → [1, 2]
//
// Order is base form first, nearest ancestor last, which is the order the
// forms would be caught in. The starting id is never part of the result.

use std::collections::HashSet;
use std::future::Future;

use thiserror::Error;

use crate::pokemon::{Pokemon, PokemonId};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The catalog lookup itself failed (not the same as "absent").
    #[error("failed to fetch pokemon {pokemon_id} while resolving evolutions")]
    Fetch {
        pokemon_id: PokemonId,
        #[source]
        source: anyhow::Error,
    },

    /// Evolution data loops back on itself.
    #[error("evolution chain of pokemon {start} revisits pokemon {repeated}")]
    Cycle {
        start: PokemonId,
        repeated: PokemonId,
    },
}

/// Resolve the ordered pre-evolution chain of `pokemon_id`.
///
/// `fetch_by_id` is the only way the walk reads data. An absent Pokémon or
/// one without a `prev` link ends the walk without error. A repeated id is
/// reported as [`ResolveError::Cycle`] rather than walked forever.
pub async fn resolve_pre_evolution_chain<F, Fut>(
    pokemon_id: PokemonId,
    mut fetch_by_id: F,
) -> Result<Vec<PokemonId>, ResolveError>
where
    F: FnMut(PokemonId) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<Pokemon>>>,
{
    let mut ancestors = Vec::new();
    let mut visited = HashSet::from([pokemon_id]);
    let mut current = pokemon_id;

    loop {
        let fetched = fetch_by_id(current)
            .await
            .map_err(|source| ResolveError::Fetch {
                pokemon_id: current,
                source,
            })?;

        let Some(prev) = fetched.and_then(|pokemon| pokemon.prev_id()) else {
            break;
        };

        if !visited.insert(prev) {
            return Err(ResolveError::Cycle {
                start: pokemon_id,
                repeated: prev,
            });
        }

        ancestors.push(prev);
        current = prev;
    }

    // Accumulated nearest-first
    ancestors.reverse();
    Ok(ancestors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::future::ready;

    fn catalog(entries: Vec<Pokemon>) -> HashMap<PokemonId, Pokemon> {
        entries.into_iter().map(|p| (p.id, p)).collect()
    }

    fn starter_line() -> HashMap<PokemonId, Pokemon> {
        catalog(vec![
            Pokemon::new(1, "Bulbasaur"),
            Pokemon::new(2, "Ivysaur").with_prev(1, "Level 16"),
            Pokemon::new(3, "Venusaur").with_prev(2, "Level 32"),
        ])
    }

    async fn resolve(data: &HashMap<PokemonId, Pokemon>, id: PokemonId) -> Result<Vec<PokemonId>, ResolveError> {
        resolve_pre_evolution_chain(id, |id| ready(Ok(data.get(&id).cloned()))).await
    }

    #[tokio::test]
    async fn test_chain_is_base_form_first() {
        let data = catalog(vec![
            Pokemon::new(10, "A"),
            Pokemon::new(11, "B").with_prev(10, "Level 10"),
            Pokemon::new(12, "C").with_prev(11, "Level 20"),
            Pokemon::new(13, "Target").with_prev(12, "Level 30"),
        ]);

        assert_eq!(resolve(&data, 13).await.unwrap(), vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_scenario_venusaur() {
        let data = starter_line();

        assert_eq!(resolve(&data, 3).await.unwrap(), vec![1, 2]);
        assert_eq!(resolve(&data, 2).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_base_form_has_no_ancestors() {
        let data = starter_line();

        assert!(resolve(&data, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_absent_start_is_empty_not_error() {
        let data = starter_line();

        assert!(resolve(&data, 999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_ancestor_ends_walk() {
        // 5 points at 4, which is not in the catalog
        let data = catalog(vec![Pokemon::new(5, "Orphan").with_prev(4, "Level 5")]);

        assert_eq!(resolve(&data, 5).await.unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_cycle_is_reported() {
        let data = catalog(vec![
            Pokemon::new(1, "A").with_prev(2, "Loop"),
            Pokemon::new(2, "B").with_prev(1, "Loop"),
        ]);

        match resolve(&data, 1).await {
            Err(ResolveError::Cycle { start, repeated }) => {
                assert_eq!(start, 1);
                assert_eq!(repeated, 1);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let result = resolve_pre_evolution_chain(7, |_| ready(Err(anyhow::anyhow!("connection reset")))).await;

        assert!(matches!(result, Err(ResolveError::Fetch { pokemon_id: 7, .. })));
    }
}
