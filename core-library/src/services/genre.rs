use crate::error::Result;
use crate::models::Genre;
use crate::query::QueryBuilder;
use bridge_traits::store::{RecordId, StoreGateway};
use std::sync::Arc;

#[derive(Clone)]
pub struct GenreService {
    queries: QueryBuilder,
}

impl GenreService {
    pub fn new(gateway: Arc<dyn StoreGateway>) -> Self {
        Self {
            queries: QueryBuilder::new(gateway),
        }
    }

    pub async fn get_all(&self) -> Result<Vec<Genre>> {
        self.queries.all().await
    }

    pub async fn get_by_id(&self, id: RecordId) -> Result<Option<Genre>> {
        self.queries.by_id(id).await
    }
}
