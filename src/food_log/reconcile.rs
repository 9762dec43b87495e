use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::error::InvalidImage;
use crate::estimation::EstimationResult;
use crate::food_log::entry::{EntryState, FoodLogEntry, NutrientField};

/// Presentation band for an estimation confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    Uncertain,
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    /// 0 uncertain, 1-59 low, 60-79 medium, 80-100 high. Values above 100 count as high.
    pub fn from_confidence(confidence: u8) -> Self {
        match confidence {
            0 => ConfidenceBand::Uncertain,
            1..=59 => ConfidenceBand::Low,
            60..=79 => ConfidenceBand::Medium,
            _ => ConfidenceBand::High,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceBand::Uncertain => "uncertain",
            ConfidenceBand::Low => "low",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FoodLogEntry {
    pub fn confidence_band(&self) -> ConfidenceBand {
        ConfidenceBand::from_confidence(self.estimation_confidence)
    }
}

/// Merges an estimation result into an entry.
///
/// User-supplied nutrients and title win over generated ones; confidence always
/// comes from the result. The merge is total and deterministic, so applying the
/// same result twice gives the same entry as applying it once.
///
/// # Errors
/// Returns [`InvalidImage`] when the result carries the invalid-image sentinel.
/// The caller drops the skeleton and puts back any earlier estimate.
pub fn reconcile(entry: &FoodLogEntry, result: &EstimationResult) -> Result<FoodLogEntry, InvalidImage> {
    if result.is_invalid_image() {
        info!(log_id = %entry.id, "Estimator refused the image");
        return Err(InvalidImage);
    }

    let mut merged = entry.clone();
    for field in NutrientField::ALL {
        let generated = match field {
            NutrientField::Calories => result.calories,
            NutrientField::Protein => result.protein,
            NutrientField::Carbs => result.carbs,
            NutrientField::Fat => result.fat,
        };
        merged.set_nutrient(field, entry.user_supplied.get(field).unwrap_or(generated));
    }

    merged.title = match entry.user_supplied.title() {
        Some(user_title) => user_title.to_string(),
        None => result.generated_title.clone(),
    };

    // An empty component list from the estimator leaves the current one in place.
    if !result.food_components.is_empty() {
        merged.food_components = result.food_components.clone();
    }

    merged.estimation_confidence = result.estimation_confidence.min(100);
    merged.state = EntryState::Estimated;
    merged.estimated_at = Some(entry.estimated_at.unwrap_or_else(Utc::now));
    merged.needs_user_review = false;

    debug!(
        log_id = %merged.id,
        confidence = merged.estimation_confidence,
        band = %merged.confidence_band(),
        "Reconciled estimation into entry"
    );
    Ok(merged)
}
