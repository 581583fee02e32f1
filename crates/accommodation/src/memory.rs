//! In-memory accommodation store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{AccommodationId, GradeId, SagaId};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::grade::AccommodationGrade;
use crate::model::{Accommodation, NewAccommodation};
use crate::store::{AccommodationStore, InsertOutcome, SearchQuery};

#[derive(Debug, Default)]
struct State {
    accommodations: HashMap<AccommodationId, Accommodation>,
    by_saga: HashMap<SagaId, AccommodationId>,
    grades: HashMap<GradeId, AccommodationGrade>,
}

impl State {
    fn sorted<'a>(&self, iter: impl Iterator<Item = &'a Accommodation>) -> Vec<Accommodation> {
        let mut out: Vec<Accommodation> = iter.cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    fn remove(&mut self, id: AccommodationId) -> bool {
        match self.accommodations.remove(&id) {
            Some(acc) => {
                if let Some(saga_id) = acc.saga_id {
                    self.by_saga.remove(&saga_id);
                }
                self.grades.retain(|_, g| g.accommodation_id != id);
                true
            }
            None => false,
        }
    }
}

/// In-memory accommodation store for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccommodationStore {
    state: Arc<RwLock<State>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryAccommodationStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `StoreError::Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of stored accommodations.
    pub async fn count(&self) -> usize {
        self.state.read().await.accommodations.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AccommodationStore for InMemoryAccommodationStore {
    async fn insert_for_saga(
        &self,
        saga_id: SagaId,
        new: NewAccommodation,
    ) -> Result<InsertOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .by_saga
            .get(&saga_id)
            .and_then(|id| state.accommodations.get(id))
        {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        let accommodation = Accommodation::from_new(new, Some(saga_id));
        state.by_saga.insert(saga_id, accommodation.id);
        state
            .accommodations
            .insert(accommodation.id, accommodation.clone());
        Ok(InsertOutcome::Inserted(accommodation))
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Accommodation>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .by_saga
            .get(&saga_id)
            .and_then(|id| state.accommodations.get(id))
            .cloned())
    }

    async fn get(&self, id: AccommodationId) -> Result<Option<Accommodation>, StoreError> {
        self.check_available()?;
        Ok(self.state.read().await.accommodations.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[AccommodationId]) -> Result<Vec<Accommodation>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.accommodations.get(id).cloned())
            .collect())
    }

    async fn list(&self) -> Result<Vec<Accommodation>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.sorted(state.accommodations.values()))
    }

    async fn list_by_username(&self, username: &str) -> Result<Vec<Accommodation>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.sorted(
            state
                .accommodations
                .values()
                .filter(|a| a.username == username),
        ))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Accommodation>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.sorted(state.accommodations.values().filter(|a| query.matches(a))))
    }

    async fn delete(&self, id: AccommodationId) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.state.write().await.remove(id))
    }

    async fn delete_by_username(&self, username: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let owned: Vec<AccommodationId> = state
            .accommodations
            .values()
            .filter(|a| a.username == username)
            .map(|a| a.id)
            .collect();
        for id in &owned {
            state.remove(*id);
        }
        Ok(owned.len())
    }

    async fn insert_grade(&self, grade: AccommodationGrade) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.accommodations.contains_key(&grade.accommodation_id) {
            return Err(StoreError::NotFound(grade.accommodation_id));
        }
        state.grades.insert(grade.id, grade);
        Ok(())
    }

    async fn grades_for(&self, id: AccommodationId) -> Result<Vec<AccommodationGrade>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut grades: Vec<AccommodationGrade> = state
            .grades
            .values()
            .filter(|g| g.accommodation_id == id)
            .cloned()
            .collect();
        grades.sort_by_key(|g| g.created_at);
        Ok(grades)
    }

    async fn get_grade(&self, id: GradeId) -> Result<Option<AccommodationGrade>, StoreError> {
        self.check_available()?;
        Ok(self.state.read().await.grades.get(&id).cloned())
    }

    async fn delete_grade(&self, id: GradeId) -> Result<AccommodationGrade, StoreError> {
        self.check_available()?;
        self.state
            .write()
            .await
            .grades
            .remove(&id)
            .ok_or(StoreError::GradeNotFound(id))
    }
}
