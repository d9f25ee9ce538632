// Catalog Service - read-only listing, lookup, types and totals

use std::sync::Arc;

use thiserror::Error;

use crate::pokemon::{Pokemon, PokemonId};
use crate::query::{Paginated, PokemonQuery};
use crate::store::CatalogStore;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct PokemonService {
    catalog: Arc<dyn CatalogStore>,
}

impl PokemonService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    pub async fn list(&self, query: &PokemonQuery) -> Result<Paginated<Pokemon>, CatalogError> {
        query.validate()?;
        let listing = self.catalog.list(query).await?;
        Ok(Paginated::new(listing, query))
    }

    pub async fn get(&self, id: PokemonId) -> Result<Option<Pokemon>, CatalogError> {
        Ok(self.catalog.find_by_id(id).await?)
    }

    pub async fn types(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.catalog.all_types().await?)
    }

    pub async fn count(&self) -> Result<u64, CatalogError> {
        Ok(self.catalog.count().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::starter_catalog;

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let service = PokemonService::new(Arc::new(starter_catalog()));

        let query = PokemonQuery {
            pokemon_type: Some("fire".to_string()),
            ..PokemonQuery::page(1, 2)
        };
        let page = service.list(&query).await.unwrap();

        let ids: Vec<PokemonId> = page.data.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);
        assert!(page.pagination.has_next_page);
    }

    #[tokio::test]
    async fn test_list_rejects_invalid_query() {
        let service = PokemonService::new(Arc::new(starter_catalog()));

        let result = service.list(&PokemonQuery::page(1, 0)).await;
        assert!(matches!(result, Err(CatalogError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_lookup_types_and_count() {
        let service = PokemonService::new(Arc::new(starter_catalog()));

        assert_eq!(service.get(2).await.unwrap().map(|p| p.name), Some("Ivysaur".to_string()));
        assert!(service.get(404).await.unwrap().is_none());
        assert_eq!(service.types().await.unwrap(), vec!["Fire", "Flying", "Grass", "Poison"]);
        assert_eq!(service.count().await.unwrap(), 6);
    }
}
