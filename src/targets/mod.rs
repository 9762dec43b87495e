pub mod arithmetic;
pub mod derivation;
pub mod profile;

pub use derivation::{derive, DerivationContext, NutritionTargets, TargetChange};
pub use profile::{seed_targets, UserNutritionProfile};
