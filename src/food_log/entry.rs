use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[serde(alias = "grams")]
    G,
    #[serde(alias = "milliliters")]
    Ml,
    Oz,
    #[serde(alias = "cups")]
    Cup,
    Tbsp,
    Tsp,
    #[serde(alias = "pieces")]
    Piece,
    #[serde(alias = "slices")]
    Slice,
    #[serde(alias = "servings")]
    Serving,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Unit::G => "g",
            Unit::Ml => "ml",
            Unit::Oz => "oz",
            Unit::Cup => "cup",
            Unit::Tbsp => "tbsp",
            Unit::Tsp => "tsp",
            Unit::Piece => "piece",
            Unit::Slice => "slice",
            Unit::Serving => "serving",
        };
        f.write_str(label)
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let unit = match raw.trim().to_lowercase().as_str() {
            "g" | "gram" | "grams" => Unit::G,
            "ml" | "milliliter" | "milliliters" => Unit::Ml,
            "oz" | "ounce" | "ounces" => Unit::Oz,
            "cup" | "cups" => Unit::Cup,
            "tbsp" | "tablespoon" | "tablespoons" => Unit::Tbsp,
            "tsp" | "teaspoon" | "teaspoons" => Unit::Tsp,
            "piece" | "pieces" | "pc" => Unit::Piece,
            "slice" | "slices" => Unit::Slice,
            "serving" | "servings" | "portion" => Unit::Serving,
            other => return Err(format!("unknown unit '{other}'")),
        };
        Ok(unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub amount: f32,
    pub unit: Unit,
}

/// One ingredient line of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodComponent {
    pub name: String,
    pub amount: f32,
    pub unit: Unit,
    /// More precise measurement suggested by the estimator, e.g. "1 piece" -> "120 g".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_measurement: Option<Measurement>,
}

impl FoodComponent {
    pub fn new(name: impl Into<String>, amount: f32, unit: Unit) -> Self {
        Self {
            name: name.into(),
            amount,
            unit,
            recommended_measurement: None,
        }
    }

    pub fn with_recommendation(mut self, amount: f32, unit: Unit) -> Self {
        self.recommended_measurement = Some(Measurement { amount, unit });
        self
    }
}

/// Where an entry sits in its lifecycle.
///
/// `Estimating` is the optimistic skeleton: visible to the rest of the
/// system before the estimate exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    #[default]
    Draft,
    Estimating,
    Estimated,
    Dirty,
    AwaitingReestimate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientField {
    Calories,
    Protein,
    Carbs,
    Fat,
}

impl NutrientField {
    pub const ALL: [NutrientField; 4] = [
        NutrientField::Calories,
        NutrientField::Protein,
        NutrientField::Carbs,
        NutrientField::Fat,
    ];
}

/// Values the user typed. Any field present here wins over an estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSuppliedValues {
    pub title: Option<String>,
    pub calories: Option<f32>,
    pub protein: Option<f32>,
    pub carbs: Option<f32>,
    pub fat: Option<f32>,
}

impl UserSuppliedValues {
    pub fn get(&self, field: NutrientField) -> Option<f32> {
        match field {
            NutrientField::Calories => self.calories,
            NutrientField::Protein => self.protein,
            NutrientField::Carbs => self.carbs,
            NutrientField::Fat => self.fat,
        }
    }

    pub fn set(&mut self, field: NutrientField, value: Option<f32>) {
        let slot = match field {
            NutrientField::Calories => &mut self.calories,
            NutrientField::Protein => &mut self.protein,
            NutrientField::Carbs => &mut self.carbs,
            NutrientField::Fat => &mut self.fat,
        };
        *slot = value.map(|v| v.max(0.0));
    }

    /// A blank title counts as not supplied.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodLogEntry {
    pub id: String,
    pub log_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub food_components: Vec<FoodComponent>,
    pub calories: f32,
    pub protein: f32,
    pub carbs: f32,
    pub fat: f32,
    pub estimation_confidence: u8,
    pub state: EntryState,
    /// When the first estimate was reconciled into the entry. `None` until one lands.
    #[serde(default)]
    pub estimated_at: Option<DateTime<Utc>>,
    pub needs_user_review: bool,
    pub image_ref: Option<String>,
    #[serde(default)]
    pub user_supplied: UserSuppliedValues,
}

impl FoodLogEntry {
    pub fn new_draft(log_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            log_date,
            created_at: Utc::now(),
            title: String::new(),
            description: None,
            food_components: Vec::new(),
            calories: 0.0,
            protein: 0.0,
            carbs: 0.0,
            fat: 0.0,
            estimation_confidence: 0,
            state: EntryState::Draft,
            estimated_at: None,
            needs_user_review: false,
            image_ref: None,
            user_supplied: UserSuppliedValues::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.user_supplied.title = Some(title.clone());
        self.title = title;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    pub fn with_components(mut self, components: Vec<FoodComponent>) -> Self {
        self.food_components = components;
        self
    }

    /// Records a user-typed nutrient value; it is also the resolved value until reconciled.
    pub fn with_user_value(mut self, field: NutrientField, value: f32) -> Self {
        self.user_supplied.set(field, Some(value));
        self.set_nutrient(field, value.max(0.0));
        self
    }

    pub fn nutrient(&self, field: NutrientField) -> f32 {
        match field {
            NutrientField::Calories => self.calories,
            NutrientField::Protein => self.protein,
            NutrientField::Carbs => self.carbs,
            NutrientField::Fat => self.fat,
        }
    }

    pub fn set_nutrient(&mut self, field: NutrientField, value: f32) {
        match field {
            NutrientField::Calories => self.calories = value,
            NutrientField::Protein => self.protein = value,
            NutrientField::Carbs => self.carbs = value,
            NutrientField::Fat => self.fat = value,
        }
    }

    pub fn is_estimating(&self) -> bool {
        self.state == EntryState::Estimating
    }

    /// True once an estimation has completed for this entry at least once.
    ///
    /// Editing states say nothing about history, so this reads `estimated_at`.
    pub fn has_been_estimated(&self) -> bool {
        self.estimated_at.is_some()
    }

    /// State an entry at rest returns to once its edits are settled.
    pub fn settled_state(&self) -> EntryState {
        if self.has_been_estimated() {
            EntryState::Estimated
        } else {
            EntryState::Draft
        }
    }

    /// Placeholder shown while an estimation is in flight: zero macros, zero confidence.
    pub fn to_skeleton(&self) -> Self {
        Self {
            calories: 0.0,
            protein: 0.0,
            carbs: 0.0,
            fat: 0.0,
            estimation_confidence: 0,
            state: EntryState::Estimating,
            ..self.clone()
        }
    }

    pub fn flag_for_review(&mut self) {
        self.needs_user_review = true;
    }
}
