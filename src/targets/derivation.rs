use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TargetError;
use crate::targets::arithmetic::{
    calories_from_macros, carbs_from_macros, fat_grams_from_percentage, macros_from_protein,
    DEFAULT_FAT_PERCENTAGE, KCAL_PER_G_FAT,
};

/// Daily macro targets. A field counts as "set" once it is greater than zero.
///
/// After every derivation with calories and any macro set, `calories` equals the
/// Atwater sum of the three macros within 2 kcal: carbs are whole grams at
/// 4 kcal/g, so rounding the remainder can leave up to 2 kcal over or under.
/// `carbs_g` may be negative when protein and fat exceed the budget; see
/// [`NutritionTargets::is_over_budget`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionTargets {
    pub calories: i32,
    pub protein_g: i32,
    pub fat_g: i32,
    pub carbs_g: i32,
}

impl NutritionTargets {
    pub fn is_set(value: i32) -> bool {
        value > 0
    }

    /// `calories - (protein*4 + fat*9 + carbs*4)`.
    pub fn balance_error(&self) -> i32 {
        self.calories - calories_from_macros(self.protein_g, self.fat_g, self.carbs_g)
    }

    pub fn is_over_budget(&self) -> bool {
        self.carbs_g < 0
    }

    /// Share of calories currently given to fat, or `None` while calories are unset.
    pub fn fat_percentage(&self) -> Option<f32> {
        if !Self::is_set(self.calories) {
            return None;
        }
        let fat_kcal = f64::from(self.fat_g.max(0) * KCAL_PER_G_FAT);
        Some((fat_kcal / f64::from(self.calories) * 100.0) as f32)
    }

    /// Whether any of the three macros has been set.
    pub fn has_macros(&self) -> bool {
        Self::is_set(self.protein_g) || Self::is_set(self.fat_g) || Self::is_set(self.carbs_g)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A single user edit to the targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum TargetChange {
    Calories(i32),
    Protein(i32),
    FatPercentage(f32),
    Carbs(i32),
}

impl TargetChange {
    pub fn field_name(&self) -> &'static str {
        match self {
            TargetChange::Calories(_) => "calories",
            TargetChange::Protein(_) => "protein",
            TargetChange::FatPercentage(_) => "fat_percentage",
            TargetChange::Carbs(_) => "carbs",
        }
    }
}

/// Settings that influence a cascade but are not targets themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivationContext {
    /// Fat share chosen in settings. When absent, the share implied by the
    /// current targets is held, falling back to [`DEFAULT_FAT_PERCENTAGE`].
    pub fat_percentage: Option<f32>,
}

impl DerivationContext {
    pub fn with_fat_percentage(pct: f32) -> Self {
        Self {
            fat_percentage: Some(pct),
        }
    }

    fn fat_percentage_for(&self, current: &NutritionTargets) -> f32 {
        self.fat_percentage
            .or_else(|| current.fat_percentage().filter(|pct| *pct > 0.0))
            .unwrap_or(DEFAULT_FAT_PERCENTAGE)
    }
}

/// Applies one change and the cascade rule it triggers.
///
/// Nothing is derived while calories are unset. A fat percentage above
/// [`max_fat_percentage`](crate::targets::arithmetic::max_fat_percentage) is
/// applied as given and shows up as negative carbs; clamping belongs to the caller.
///
/// # Errors
/// Returns [`TargetError::UnsupportedChange`] for a direct carbs edit.
pub fn derive(
    current: NutritionTargets,
    change: TargetChange,
    context: &DerivationContext,
) -> Result<NutritionTargets, TargetError> {
    let mut next = current;

    match change {
        TargetChange::Calories(value) => {
            next.calories = value.max(0);
            // Any macro derived from the old budget follows the new one, including
            // a fat share chosen before protein.
            if NutritionTargets::is_set(next.calories) && current.has_macros() {
                let pct = context.fat_percentage_for(&current);
                next.fat_g = fat_grams_from_percentage(next.calories, pct);
                next.carbs_g = carbs_from_macros(next.calories, next.protein_g, next.fat_g);
            }
        }
        TargetChange::Protein(value) => {
            next.protein_g = value.max(0);
            if NutritionTargets::is_set(current.calories) {
                if NutritionTargets::is_set(current.protein_g) {
                    let pct = context.fat_percentage_for(&current);
                    next.fat_g = fat_grams_from_percentage(current.calories, pct);
                    next.carbs_g = carbs_from_macros(current.calories, next.protein_g, next.fat_g);
                } else {
                    let seeded = macros_from_protein(current.calories, next.protein_g);
                    next.fat_g = seeded.fat_g;
                    next.carbs_g = seeded.carbs_g;
                }
            }
        }
        TargetChange::FatPercentage(pct) => {
            if NutritionTargets::is_set(current.calories) {
                next.fat_g = fat_grams_from_percentage(current.calories, pct);
                next.carbs_g = carbs_from_macros(current.calories, current.protein_g, next.fat_g);
            }
        }
        TargetChange::Carbs(_) => return Err(TargetError::UnsupportedChange(change.field_name())),
    }

    debug!(
        field = change.field_name(),
        calories = next.calories,
        protein_g = next.protein_g,
        fat_g = next.fat_g,
        carbs_g = next.carbs_g,
        "Derived nutrition targets"
    );
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::arithmetic::max_fat_percentage;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ctx() -> DerivationContext {
        DerivationContext::default()
    }

    #[test]
    fn test_setting_calories_alone_does_not_cascade() {
        let targets = derive(NutritionTargets::default(), TargetChange::Calories(2000), &ctx()).unwrap();
        assert_eq!(
            targets,
            NutritionTargets { calories: 2000, protein_g: 0, fat_g: 0, carbs_g: 0 }
        );
    }

    #[test]
    fn test_first_protein_seeds_fat_and_carbs() {
        let start = NutritionTargets { calories: 2000, ..Default::default() };
        let targets = derive(start, TargetChange::Protein(150), &ctx()).unwrap();
        // protein 600 kcal, fat round(600/9) = 67 g -> 603 kcal, carbs round(797/4) = 199
        assert_eq!(
            targets,
            NutritionTargets { calories: 2000, protein_g: 150, fat_g: 67, carbs_g: 199 }
        );
    }

    #[test]
    fn test_first_protein_ignores_context_fat_percentage() {
        let start = NutritionTargets { calories: 2000, ..Default::default() };
        let targets =
            derive(start, TargetChange::Protein(150), &DerivationContext::with_fat_percentage(40.0)).unwrap();
        assert_eq!(targets.fat_g, 67);
    }

    #[test]
    fn test_protein_without_calories_sets_only_protein() {
        let targets = derive(NutritionTargets::default(), TargetChange::Protein(150), &ctx()).unwrap();
        assert_eq!(targets, NutritionTargets { protein_g: 150, ..Default::default() });
    }

    #[test]
    fn test_calories_change_keeps_fat_share() {
        let start = NutritionTargets { calories: 2000, protein_g: 150, fat_g: 67, carbs_g: 199 };
        let context = DerivationContext::with_fat_percentage(30.0);
        let targets = derive(start, TargetChange::Calories(2500), &context).unwrap();
        // fat round(2500*0.3/9) = 83 -> 747 kcal, carbs round((2500-600-747)/4) = round(288.25)
        assert_eq!(targets.fat_g, 83);
        assert_eq!(targets.carbs_g, 288);
        assert_eq!(targets.protein_g, 150);
    }

    #[test]
    fn test_calories_change_infers_fat_share_from_current_targets() {
        // 50 g fat of 1800 kcal = 25%
        let start = NutritionTargets { calories: 1800, protein_g: 120, fat_g: 50, carbs_g: 218 };
        let targets = derive(start, TargetChange::Calories(3600), &ctx()).unwrap();
        assert_eq!(targets.fat_g, 100);
    }

    #[test]
    fn test_calories_change_after_fat_share_only_rebalances() {
        let targets = derive(NutritionTargets::default(), TargetChange::Calories(2000), &ctx()).unwrap();
        let targets = derive(targets, TargetChange::FatPercentage(30.0), &ctx()).unwrap();
        // round(600/9) = 67 -> 603 kcal, carbs round(1397/4) = 349
        assert_eq!(targets, NutritionTargets { calories: 2000, protein_g: 0, fat_g: 67, carbs_g: 349 });

        let targets = derive(targets, TargetChange::Calories(2500), &ctx()).unwrap();
        // held share 603/2000 = 30.15% -> round(753.75/9) = 84 -> 756 kcal, carbs round(1744/4) = 436
        assert_eq!(targets.fat_g, 84);
        assert_eq!(targets.carbs_g, 436);
        assert!(targets.balance_error().abs() <= 2, "{targets:?}");
    }

    #[test]
    fn test_first_protein_reseeds_even_after_fat_share_chosen() {
        let start = NutritionTargets { calories: 2000, protein_g: 0, fat_g: 56, carbs_g: 374 };
        let targets = derive(start, TargetChange::Protein(150), &ctx()).unwrap();
        assert_eq!(targets, NutritionTargets { calories: 2000, protein_g: 150, fat_g: 67, carbs_g: 199 });
    }

    #[test]
    fn test_protein_change_holds_fat_percentage() {
        let start = NutritionTargets { calories: 2000, protein_g: 150, fat_g: 67, carbs_g: 199 };
        let context = DerivationContext::with_fat_percentage(30.0);
        let targets = derive(start, TargetChange::Protein(180), &context).unwrap();
        // 2000 - 720 - 603 = 677, 677/4 = 169.25
        assert_eq!(targets.fat_g, 67);
        assert_eq!(targets.carbs_g, 169);
    }

    #[test]
    fn test_fat_percentage_change() {
        let start = NutritionTargets { calories: 2000, protein_g: 150, fat_g: 67, carbs_g: 199 };
        let targets = derive(start, TargetChange::FatPercentage(25.0), &ctx()).unwrap();
        // round(500/9) = 56 -> 504 kcal, round((2000-600-504)/4) = 224
        assert_eq!(targets.fat_g, 56);
        assert_eq!(targets.carbs_g, 224);
    }

    #[test]
    fn test_fat_percentage_without_calories_is_ignored() {
        let start = NutritionTargets { protein_g: 100, ..Default::default() };
        let targets = derive(start, TargetChange::FatPercentage(25.0), &ctx()).unwrap();
        assert_eq!(targets, start);
    }

    #[test]
    fn test_fat_percentage_above_cap_surfaces_negative_carbs() {
        let start = NutritionTargets { calories: 2000, protein_g: 150, fat_g: 67, carbs_g: 199 };
        assert!((max_fat_percentage(2000, 150) - 70.0).abs() < 1e-4);

        let targets = derive(start, TargetChange::FatPercentage(80.0), &ctx()).unwrap();
        assert!(targets.is_over_budget());
        assert!(targets.carbs_g < 0);
    }

    #[test]
    fn test_direct_carbs_change_is_rejected() {
        let start = NutritionTargets { calories: 2000, protein_g: 150, fat_g: 67, carbs_g: 199 };
        let result = derive(start, TargetChange::Carbs(250), &ctx());
        assert!(matches!(result, Err(TargetError::UnsupportedChange("carbs"))));
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut targets = NutritionTargets { calories: 2000, protein_g: 150, fat_g: 67, carbs_g: 199 };
        targets.reset();
        assert_eq!(targets, NutritionTargets::default());
        assert_eq!(targets.fat_percentage(), None);
    }

    #[test]
    fn test_calorie_balance_holds_for_random_edit_sequences() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let mut targets = NutritionTargets::default();
            for _ in 0..6 {
                let change = match rng.gen_range(0..3) {
                    0 => TargetChange::Calories(rng.gen_range(0..5000)),
                    1 => TargetChange::Protein(rng.gen_range(0..400)),
                    _ => TargetChange::FatPercentage(rng.gen_range(0.0..100.0)),
                };
                targets = derive(targets, change, &ctx()).unwrap();
                if targets.calories > 0 && targets.has_macros() {
                    // Carbs are whole grams at 4 kcal/g, so the residue is at most 2 kcal.
                    assert!(
                        targets.balance_error().abs() <= 2,
                        "unbalanced after {:?}: {:?}",
                        change,
                        targets
                    );
                }
            }
        }
    }
}
