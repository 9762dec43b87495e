use async_trait::async_trait;
use chrono::NaiveDate;
use nutri_reconcile::error::EstimationError;
use nutri_reconcile::estimation::{EstimationResult, Estimator, INVALID_IMAGE_TITLE};
use nutri_reconcile::food_log::{
    submit_for_estimation, ComponentIndex, EditSession, EntryState, EstimationOutcome,
    FoodComponent, FoodLogEntry, FoodLogStore, InMemoryFoodLog, NutrientField,
    PendingComponentEdit, Unit,
};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Text { title: String, description: Option<String> },
    Image { image_ref: String },
}

/// Replays canned answers and records what it was asked.
#[derive(Default)]
struct ScriptedEstimator {
    answers: Mutex<VecDeque<Result<EstimationResult, EstimationError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedEstimator {
    fn answering(answers: Vec<Result<EstimationResult, EstimationError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn next(&self) -> Result<EstimationResult, EstimationError> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EstimationError::Service("no scripted answer left".to_string())))
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Estimator for ScriptedEstimator {
    async fn estimate_from_text(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<EstimationResult, EstimationError> {
        self.calls.lock().unwrap().push(Call::Text {
            title: title.to_string(),
            description: description.map(str::to_string),
        });
        self.next()
    }

    async fn estimate_from_image(
        &self,
        image_ref: &str,
        _title: Option<&str>,
        _description: Option<&str>,
    ) -> Result<EstimationResult, EstimationError> {
        self.calls.lock().unwrap().push(Call::Image {
            image_ref: image_ref.to_string(),
        });
        self.next()
    }
}

fn log_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
}

fn stir_fry() -> EstimationResult {
    EstimationResult {
        generated_title: "Tofu stir fry".to_string(),
        calories: 540.0,
        protein: 28.0,
        carbs: 55.0,
        fat: 22.0,
        estimation_confidence: 74,
        food_components: vec![
            FoodComponent::new("tofu", 1.0, Unit::Piece).with_recommendation(150.0, Unit::G),
            FoodComponent::new("noodles", 1.0, Unit::Cup),
        ],
    }
}

#[tokio::test]
async fn test_text_estimation_logs_reconciled_entry() {
    let estimator = ScriptedEstimator::answering(vec![Ok(stir_fry())]);
    let mut store = InMemoryFoodLog::new();
    let draft = FoodLogEntry::new_draft(log_date())
        .with_title("Dinner")
        .with_description("tofu and noodles")
        .with_user_value(NutrientField::Calories, 600.0);

    let outcome = submit_for_estimation(&estimator, &mut store, &draft).await.unwrap();
    let EstimationOutcome::Logged(entry) = outcome else {
        panic!("expected a logged entry");
    };

    assert_eq!(entry.title, "Dinner");
    assert_eq!(entry.calories, 600.0);
    assert_eq!(entry.protein, 28.0);
    assert_eq!(entry.estimation_confidence, 74);
    assert_eq!(entry.state, EntryState::Estimated);
    assert_eq!(store.get(&draft.id), Some(entry));
    assert_eq!(
        estimator.calls(),
        vec![Call::Text {
            title: "Dinner".to_string(),
            description: Some("tofu and noodles".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_image_entry_uses_image_path_and_invalid_image_discards() {
    let estimator = ScriptedEstimator::answering(vec![Ok(EstimationResult {
        generated_title: INVALID_IMAGE_TITLE.to_string(),
        calories: 0.0,
        protein: 0.0,
        carbs: 0.0,
        fat: 0.0,
        estimation_confidence: 0,
        food_components: vec![],
    })]);
    let mut store = InMemoryFoodLog::new();
    let draft = FoodLogEntry::new_draft(log_date()).with_image("https://cdn.example/uploads/cat.jpg");

    let outcome = submit_for_estimation(&estimator, &mut store, &draft).await.unwrap();
    assert_eq!(outcome, EstimationOutcome::InvalidImage { log_id: draft.id.clone() });
    assert!(store.is_empty());
    assert_eq!(
        estimator.calls(),
        vec![Call::Image {
            image_ref: "https://cdn.example/uploads/cat.jpg".to_string()
        }]
    );
}

#[tokio::test]
async fn test_failed_first_estimation_leaves_nothing_behind() {
    let estimator = ScriptedEstimator::answering(vec![Err(EstimationError::EmptyResponse)]);
    let mut store = InMemoryFoodLog::new();
    let draft = FoodLogEntry::new_draft(log_date()).with_title("Mystery soup");

    let result = submit_for_estimation(&estimator, &mut store, &draft).await;
    assert!(matches!(result, Err(EstimationError::EmptyResponse)));
    assert!(store.get(&draft.id).is_none());
}

#[tokio::test]
async fn test_edit_session_reestimates_after_component_edits() {
    let estimator = ScriptedEstimator::answering(vec![
        Ok(stir_fry()),
        Ok(EstimationResult {
            calories: 610.0,
            protein: 36.0,
            estimation_confidence: 88,
            food_components: vec![],
            ..stir_fry()
        }),
    ]);
    let mut store = InMemoryFoodLog::new();
    let draft = FoodLogEntry::new_draft(log_date()).with_title("Stir fry");
    let EstimationOutcome::Logged(logged) =
        submit_for_estimation(&estimator, &mut store, &draft).await.unwrap()
    else {
        panic!("expected a logged entry");
    };

    let mut session = EditSession::open(logged.clone());
    assert!(session.accept_recommendation(0));
    let edit = PendingComponentEdit::save(
        &logged.id,
        ComponentIndex::New,
        FoodComponent::new("peanuts", 20.0, Unit::G),
    );
    assert_eq!(session.apply_pending_component_edit(edit), Ok(true));
    assert_eq!(session.changes_count(), 2);

    // Upstream echo while dirty must not clobber the edits
    assert!(!session.sync_upstream(&logged));
    assert_eq!(session.edited_entry().food_components.len(), 3);

    let request = session.request_reestimate();
    assert!(request.describe().unwrap().contains("20 g peanuts"));
    let result = estimator.estimate(&request).await.unwrap();
    session.apply_reestimate(&result).unwrap();

    assert!(!session.is_dirty());
    assert!(session.has_reestimated());
    let committed = session.commit();
    assert_eq!(committed.calories, 610.0);
    assert_eq!(committed.estimation_confidence, 88);
    assert_eq!(committed.food_components[0].amount, 150.0);
    assert_eq!(committed.food_components.len(), 3);

    store.upsert(committed.clone());
    assert_eq!(store.get(&logged.id), Some(committed));
}

#[tokio::test]
async fn test_failed_reestimate_in_session_keeps_edits_and_store() {
    let estimator = ScriptedEstimator::answering(vec![
        Ok(stir_fry()),
        Err(EstimationError::Service("timeout".to_string())),
    ]);
    let mut store = InMemoryFoodLog::new();
    let draft = FoodLogEntry::new_draft(log_date());
    let EstimationOutcome::Logged(logged) =
        submit_for_estimation(&estimator, &mut store, &draft).await.unwrap()
    else {
        panic!("expected a logged entry");
    };

    let mut session = EditSession::open(logged.clone());
    assert!(session.delete_component(1));
    let request = session.request_reestimate();
    if estimator.estimate(&request).await.is_err() {
        session.reestimate_failed();
    }

    assert!(session.is_dirty());
    assert_eq!(session.state(), EntryState::Dirty);
    assert_eq!(session.edited_entry().food_components.len(), 1);
    assert_eq!(store.get(&logged.id), Some(logged));
}
