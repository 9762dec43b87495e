// Atwater factors (kcal per gram).
pub const KCAL_PER_G_PROTEIN: i32 = 4;
pub const KCAL_PER_G_CARBS: i32 = 4;
pub const KCAL_PER_G_FAT: i32 = 9;

/// Fat share applied the first time protein is set during guided setup.
pub const DEFAULT_FAT_PERCENTAGE: f32 = 30.0;

fn non_negative(value: i32) -> i32 {
    value.max(0)
}

fn non_negative_pct(pct: f32) -> f32 {
    // f32::max also maps NaN to 0.0
    pct.max(0.0)
}

/// Grams of fat that make up `pct` percent of `calories`.
///
/// `round(calories * pct / 100 / 9)`
pub fn fat_grams_from_percentage(calories: i32, pct: f32) -> i32 {
    let calories = f64::from(non_negative(calories));
    let pct = f64::from(non_negative_pct(pct));
    (calories * pct / 100.0 / f64::from(KCAL_PER_G_FAT)).round() as i32
}

/// Carbohydrate grams left over once protein and fat are paid for.
///
/// The result is signed on purpose: a negative value means protein and fat
/// already exceed the calorie budget, and callers use it to detect that state.
pub fn carbs_from_macros(calories: i32, protein_g: i32, fat_g: i32) -> i32 {
    let remaining = non_negative(calories)
        - non_negative(protein_g) * KCAL_PER_G_PROTEIN
        - non_negative(fat_g) * KCAL_PER_G_FAT;
    (f64::from(remaining) / f64::from(KCAL_PER_G_CARBS)).round() as i32
}

/// Fat and carbohydrate grams seeded from a first protein value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededMacros {
    pub fat_g: i32,
    pub carbs_g: i32,
}

/// Seeds fat at [`DEFAULT_FAT_PERCENTAGE`] and gives the remainder to carbs.
pub fn macros_from_protein(calories: i32, protein_g: i32) -> SeededMacros {
    let fat_g = fat_grams_from_percentage(calories, DEFAULT_FAT_PERCENTAGE);
    SeededMacros {
        fat_g,
        carbs_g: carbs_from_macros(calories, protein_g, fat_g),
    }
}

/// Largest fat percentage that still leaves a non-negative carb budget.
///
/// Fat calories are capped at `calories - protein_g * 4`. Returns 0 when
/// calories are unset or protein alone already uses the whole budget.
pub fn max_fat_percentage(calories: i32, protein_g: i32) -> f32 {
    let calories = non_negative(calories);
    if calories == 0 {
        return 0.0;
    }
    let available = calories - non_negative(protein_g) * KCAL_PER_G_PROTEIN;
    if available <= 0 {
        return 0.0;
    }
    (f64::from(available) / f64::from(calories) * 100.0) as f32
}

/// Calories implied by a set of macro grams.
pub fn calories_from_macros(protein_g: i32, fat_g: i32, carbs_g: i32) -> i32 {
    protein_g * KCAL_PER_G_PROTEIN + fat_g * KCAL_PER_G_FAT + carbs_g * KCAL_PER_G_CARBS
}
