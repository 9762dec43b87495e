//! Optimistic estimation round-trip for a single entry.
//!
//! The skeleton goes into the store before the estimator is called, so the rest
//! of the system can show it while the call is in flight. Completion replaces it
//! with the reconciled entry, removes it, or restores what was there before.
//! There is no sequencing token: if two estimations for one id overlap, the last
//! one to complete wins.

use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::EstimationError;
use crate::estimation::{EstimationRequest, EstimationResult, Estimator};
use crate::food_log::entry::FoodLogEntry;
use crate::food_log::reconcile::reconcile;

/// Persistence seam for food-log entries.
pub trait FoodLogStore {
    fn get(&self, id: &str) -> Option<FoodLogEntry>;
    fn upsert(&mut self, entry: FoodLogEntry);
    fn remove(&mut self, id: &str) -> Option<FoodLogEntry>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryFoodLog {
    entries: HashMap<String, FoodLogEntry>,
}

impl InMemoryFoodLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FoodLogStore for InMemoryFoodLog {
    fn get(&self, id: &str) -> Option<FoodLogEntry> {
        self.entries.get(id).cloned()
    }

    fn upsert(&mut self, entry: FoodLogEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    fn remove(&mut self, id: &str) -> Option<FoodLogEntry> {
        self.entries.remove(id)
    }
}

/// An estimation that has been started but not completed.
#[derive(Debug, Clone)]
pub struct PendingEstimation {
    skeleton: FoodLogEntry,
    previous: Option<FoodLogEntry>,
}

impl PendingEstimation {
    pub fn log_id(&self) -> &str {
        &self.skeleton.id
    }

    pub fn request(&self) -> EstimationRequest {
        EstimationRequest::from_entry(&self.skeleton)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EstimationOutcome {
    /// The reconciled entry, now stored.
    Logged(FoodLogEntry),
    /// The image was refused; the skeleton has been removed.
    InvalidImage { log_id: String },
}

/// Stores the skeleton for `entry` and returns the handle needed to complete it.
///
/// A previously estimated version of the entry is kept aside so a failed
/// re-estimation can put it back.
pub fn begin_estimation<S: FoodLogStore>(store: &mut S, entry: &FoodLogEntry) -> PendingEstimation {
    let previous = store
        .get(&entry.id)
        .filter(|stored| stored.has_been_estimated() && !stored.is_estimating())
        .or_else(|| entry.has_been_estimated().then(|| entry.clone()));
    let skeleton = entry.to_skeleton();
    store.upsert(skeleton.clone());
    info!(log_id = %skeleton.id, reestimate = previous.is_some(), "Skeleton entry inserted");
    PendingEstimation { skeleton, previous }
}

/// Applies the estimator's answer to the store.
///
/// # Errors
/// Hands back the estimator's error after removing a never-estimated skeleton,
/// or after restoring the previously estimated entry.
pub fn complete_estimation<S: FoodLogStore>(
    store: &mut S,
    pending: PendingEstimation,
    result: Result<EstimationResult, EstimationError>,
) -> Result<EstimationOutcome, EstimationError> {
    let PendingEstimation { skeleton, previous } = pending;

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            match previous {
                Some(previous) => {
                    warn!(log_id = %skeleton.id, error = %err, "Re-estimation failed, restoring previous entry");
                    store.upsert(previous);
                }
                None => {
                    warn!(log_id = %skeleton.id, error = %err, "Estimation failed, removing skeleton");
                    store.remove(&skeleton.id);
                }
            }
            return Err(err);
        }
    };

    match reconcile(&skeleton, &result) {
        Ok(entry) => {
            store.upsert(entry.clone());
            info!(
                log_id = %entry.id,
                confidence = entry.estimation_confidence,
                band = %entry.confidence_band(),
                "Entry estimated"
            );
            Ok(EstimationOutcome::Logged(entry))
        }
        Err(_) => {
            match previous {
                Some(previous) => {
                    info!(log_id = %skeleton.id, "Invalid image on re-estimation, restoring previous entry");
                    store.upsert(previous);
                }
                None => {
                    store.remove(&skeleton.id);
                    info!(log_id = %skeleton.id, "Skeleton removed after invalid image");
                }
            }
            Ok(EstimationOutcome::InvalidImage { log_id: skeleton.id })
        }
    }
}

/// Runs a full estimation for `entry`: skeleton, estimator call, completion.
///
/// # Errors
/// Returns the estimator's error once the store has been cleaned up.
pub async fn submit_for_estimation<E, S>(
    estimator: &E,
    store: &mut S,
    entry: &FoodLogEntry,
) -> Result<EstimationOutcome, EstimationError>
where
    E: Estimator + ?Sized,
    S: FoodLogStore,
{
    let pending = begin_estimation(store, entry);
    let result = estimator.estimate(&pending.request()).await;
    complete_estimation(store, pending, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::INVALID_IMAGE_TITLE;
    use crate::food_log::entry::{EntryState, NutrientField};
    use chrono::NaiveDate;

    fn draft() -> FoodLogEntry {
        FoodLogEntry::new_draft(NaiveDate::from_ymd_opt(2024, 5, 17).unwrap())
            .with_title("Porridge")
            .with_user_value(NutrientField::Protein, 40.0)
    }

    fn result() -> EstimationResult {
        EstimationResult {
            generated_title: "Oat porridge".to_string(),
            calories: 500.0,
            protein: 30.0,
            carbs: 60.0,
            fat: 20.0,
            estimation_confidence: 85,
            food_components: vec![],
        }
    }

    #[test]
    fn test_skeleton_is_visible_while_pending() {
        let mut store = InMemoryFoodLog::new();
        let entry = draft();
        let pending = begin_estimation(&mut store, &entry);

        let visible = store.get(pending.log_id()).unwrap();
        assert!(visible.is_estimating());
        assert_eq!(visible.estimation_confidence, 0);
        assert_eq!(visible.protein, 0.0);
        assert_eq!(pending.request().title, "Porridge");
    }

    #[test]
    fn test_success_replaces_skeleton() {
        let mut store = InMemoryFoodLog::new();
        let entry = draft();
        let pending = begin_estimation(&mut store, &entry);
        let outcome = complete_estimation(&mut store, pending, Ok(result())).unwrap();

        let EstimationOutcome::Logged(logged) = outcome else {
            panic!("expected a logged entry");
        };
        assert_eq!(logged.protein, 40.0);
        assert_eq!(logged.calories, 500.0);
        assert_eq!(store.get(&entry.id), Some(logged));
    }

    #[test]
    fn test_invalid_image_removes_skeleton() {
        let mut store = InMemoryFoodLog::new();
        let entry = draft().with_image("https://cdn.example/blurry.jpg");
        let pending = begin_estimation(&mut store, &entry);
        let invalid = EstimationResult {
            generated_title: INVALID_IMAGE_TITLE.to_string(),
            ..result()
        };
        let outcome = complete_estimation(&mut store, pending, Ok(invalid)).unwrap();
        assert_eq!(outcome, EstimationOutcome::InvalidImage { log_id: entry.id.clone() });
        assert!(store.is_empty());
    }

    #[test]
    fn test_failure_removes_never_estimated_skeleton() {
        let mut store = InMemoryFoodLog::new();
        let pending = begin_estimation(&mut store, &draft());
        let err = complete_estimation(
            &mut store,
            pending,
            Err(EstimationError::Service("model overloaded".to_string())),
        )
        .unwrap_err();
        assert!(matches!(err, EstimationError::Service(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_failure_restores_previous_estimate() {
        let mut store = InMemoryFoodLog::new();
        let first = begin_estimation(&mut store, &draft());
        let EstimationOutcome::Logged(estimated) =
            complete_estimation(&mut store, first, Ok(result())).unwrap()
        else {
            panic!("expected a logged entry");
        };

        let retry = begin_estimation(&mut store, &estimated);
        assert!(store.get(&estimated.id).unwrap().is_estimating());
        let outcome = complete_estimation(&mut store, retry, Err(EstimationError::EmptyResponse));
        assert!(outcome.is_err());

        let restored = store.get(&estimated.id).unwrap();
        assert_eq!(restored, estimated);
        assert_eq!(restored.state, EntryState::Estimated);
    }

    #[test]
    fn test_invalid_image_on_reestimation_keeps_previous_estimate() {
        let mut store = InMemoryFoodLog::new();
        let first = begin_estimation(&mut store, &draft().with_image("https://cdn.example/bowl.jpg"));
        let EstimationOutcome::Logged(estimated) =
            complete_estimation(&mut store, first, Ok(result())).unwrap()
        else {
            panic!("expected a logged entry");
        };

        let retry = begin_estimation(&mut store, &estimated);
        let invalid = EstimationResult {
            generated_title: INVALID_IMAGE_TITLE.to_string(),
            ..result()
        };
        let outcome = complete_estimation(&mut store, retry, Ok(invalid)).unwrap();
        assert_eq!(outcome, EstimationOutcome::InvalidImage { log_id: estimated.id.clone() });
        assert_eq!(store.get(&estimated.id), Some(estimated));
    }

    #[test]
    fn test_edited_draft_is_not_treated_as_previous_estimate() {
        let mut store = InMemoryFoodLog::new();
        let mut edited = draft();
        edited.state = EntryState::Dirty;
        assert!(!edited.has_been_estimated());

        let pending = begin_estimation(&mut store, &edited);
        let outcome = complete_estimation(&mut store, pending, Err(EstimationError::EmptyResponse));
        assert!(outcome.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_overlapping_reestimation_does_not_keep_skeleton_as_previous() {
        let mut store = InMemoryFoodLog::new();
        let first = begin_estimation(&mut store, &draft());
        let EstimationOutcome::Logged(estimated) =
            complete_estimation(&mut store, first, Ok(result())).unwrap()
        else {
            panic!("expected a logged entry");
        };

        let _in_flight = begin_estimation(&mut store, &estimated);
        let overlapping = begin_estimation(&mut store, &estimated);
        complete_estimation(&mut store, overlapping, Err(EstimationError::EmptyResponse)).unwrap_err();
        assert_eq!(store.get(&estimated.id), Some(estimated));
    }

    #[test]
    fn test_last_completion_wins() {
        let mut store = InMemoryFoodLog::new();
        let entry = draft();
        let first = begin_estimation(&mut store, &entry);
        let second = begin_estimation(&mut store, &entry);

        complete_estimation(&mut store, second, Ok(EstimationResult { calories: 420.0, ..result() })).unwrap();
        complete_estimation(&mut store, first, Ok(EstimationResult { calories: 610.0, ..result() })).unwrap();
        assert_eq!(store.get(&entry.id).unwrap().calories, 610.0);
        assert_eq!(store.len(), 1);
    }
}
