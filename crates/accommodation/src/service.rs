//! Accommodation service providing queries and grading on top of a store.

use std::sync::Arc;

use common::{AccommodationId, GradeId};
use serde::Serialize;

use crate::error::{AccommodationError, StoreError};
use crate::grade::{AccommodationGrade, NewGrade};
use crate::model::Accommodation;
use crate::store::{AccommodationStore, SearchQuery};

/// Grades of one accommodation with their average.
#[derive(Debug, Clone, Serialize)]
pub struct GradeSummary {
    pub accommodation_id: AccommodationId,
    pub average: Option<f64>,
    pub grades: Vec<AccommodationGrade>,
}

/// High-level API over an [`AccommodationStore`].
///
/// Creation is not here: new accommodations are only written by the
/// creation saga's command handler.
#[derive(Clone)]
pub struct AccommodationService {
    store: Arc<dyn AccommodationStore>,
}

impl AccommodationService {
    pub fn new(store: Arc<dyn AccommodationStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn AccommodationStore> {
        &self.store
    }

    pub async fn get(&self, id: AccommodationId) -> Result<Option<Accommodation>, StoreError> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Accommodation>, StoreError> {
        self.store.list().await
    }

    pub async fn list_by_username(&self, username: &str) -> Result<Vec<Accommodation>, StoreError> {
        self.store.list_by_username(username).await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Accommodation>, StoreError> {
        self.store.search(query).await
    }

    /// Resolves a list of recommended ids, skipping ones that no longer exist.
    pub async fn recommended(
        &self,
        ids: &[AccommodationId],
    ) -> Result<Vec<Accommodation>, StoreError> {
        self.store.get_many(ids).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_by_username(&self, username: &str) -> Result<usize, StoreError> {
        let removed = self.store.delete_by_username(username).await?;
        tracing::info!(username, removed, "accommodations deleted for host");
        Ok(removed)
    }

    /// Records a grade by `username`.
    #[tracing::instrument(skip(self))]
    pub async fn grade(
        &self,
        username: &str,
        new: NewGrade,
    ) -> Result<AccommodationGrade, AccommodationError> {
        new.validate()?;
        let grade = AccommodationGrade::from_new(new, username);
        self.store.insert_grade(grade.clone()).await?;
        Ok(grade)
    }

    pub async fn grades(&self, id: AccommodationId) -> Result<GradeSummary, StoreError> {
        let grades = self.store.grades_for(id).await?;
        let average = if grades.is_empty() {
            None
        } else {
            let total: u32 = grades.iter().map(|g| u32::from(g.grade)).sum();
            Some(f64::from(total) / grades.len() as f64)
        };
        Ok(GradeSummary {
            accommodation_id: id,
            average,
            grades,
        })
    }

    /// Deletes a grade. Only its author may do so.
    #[tracing::instrument(skip(self))]
    pub async fn delete_grade(
        &self,
        username: &str,
        id: GradeId,
    ) -> Result<AccommodationGrade, AccommodationError> {
        let grade = self
            .store
            .get_grade(id)
            .await?
            .ok_or(StoreError::GradeNotFound(id))?;
        if grade.username != username {
            return Err(AccommodationError::NotGradeOwner { grade_id: id });
        }
        Ok(self.store.delete_grade(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::memory::InMemoryAccommodationStore;
    use crate::model::NewAccommodation;
    use common::SagaId;

    async fn setup() -> (AccommodationService, Accommodation) {
        let store = InMemoryAccommodationStore::new();
        let acc = store
            .insert_for_saga(SagaId::new(), NewAccommodation::named("Cabin"))
            .await
            .unwrap()
            .into_accommodation();
        (AccommodationService::new(Arc::new(store)), acc)
    }

    #[tokio::test]
    async fn test_grades_average() {
        let (service, acc) = setup().await;
        service.grade("ana", NewGrade::new(acc.id, 4)).await.unwrap();
        service.grade("marko", NewGrade::new(acc.id, 5)).await.unwrap();

        let summary = service.grades(acc.id).await.unwrap();
        assert_eq!(summary.grades.len(), 2);
        assert_eq!(summary.average, Some(4.5));
    }

    #[tokio::test]
    async fn test_no_grades_has_no_average() {
        let (service, acc) = setup().await;
        let summary = service.grades(acc.id).await.unwrap();
        assert!(summary.average.is_none());
    }

    #[tokio::test]
    async fn test_invalid_grade_rejected() {
        let (service, acc) = setup().await;
        let result = service.grade("ana", NewGrade::new(acc.id, 9)).await;
        assert!(matches!(
            result,
            Err(AccommodationError::Validation(ValidationError::InvalidGrade(9)))
        ));
    }

    #[tokio::test]
    async fn test_only_author_deletes_grade() {
        let (service, acc) = setup().await;
        let grade = service.grade("ana", NewGrade::new(acc.id, 3)).await.unwrap();

        let result = service.delete_grade("marko", grade.id).await;
        assert!(matches!(result, Err(AccommodationError::NotGradeOwner { .. })));

        let deleted = service.delete_grade("ana", grade.id).await.unwrap();
        assert_eq!(deleted.id, grade.id);
        assert!(service.grades(acc.id).await.unwrap().grades.is_empty());
    }

    #[tokio::test]
    async fn test_recommended_skips_missing() {
        let (service, acc) = setup().await;
        let found = service
            .recommended(&[AccommodationId::new(), acc.id])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, acc.id);
    }
}
