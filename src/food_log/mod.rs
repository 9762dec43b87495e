pub mod entry;
pub mod pipeline;
pub mod reconcile;
pub mod session;

pub use entry::{EntryState, FoodComponent, FoodLogEntry, Measurement, NutrientField, Unit};
pub use pipeline::{
    begin_estimation, complete_estimation, submit_for_estimation, EstimationOutcome, FoodLogStore,
    InMemoryFoodLog, PendingEstimation,
};
pub use reconcile::{reconcile, ConfidenceBand};
pub use session::{ComponentEditAction, ComponentIndex, EditSession, PendingComponentEdit};
