//! Contract with the AI estimation service, and an OpenRouter-backed implementation.
//!
//! Both entry points may take an unbounded network round-trip. A refused image
//! is a successful call carrying the [`INVALID_IMAGE_TITLE`] sentinel; transport
//! or model failures are returned as [`EstimationError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::api_connection::endpoints::{
    ChatCompletionRequest, ChatMessage, JsonSchema, JsonSchemaDefinition, JsonSchemaProperty,
    Provider, ResponseFormat,
};
use crate::config::EngineConfig;
use crate::error::EstimationError;
use crate::food_log::entry::{FoodComponent, FoodLogEntry, Measurement, Unit};

/// Title the estimator returns when it cannot use the submitted image.
pub const INVALID_IMAGE_TITLE: &str = "Invalid Image";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    pub generated_title: String,
    pub calories: f32,
    pub protein: f32,
    pub carbs: f32,
    pub fat: f32,
    /// The estimator's own certainty, 0-100.
    pub estimation_confidence: u8,
    #[serde(default)]
    pub food_components: Vec<FoodComponent>,
}

impl EstimationResult {
    pub fn is_invalid_image(&self) -> bool {
        self.generated_title == INVALID_IMAGE_TITLE
    }
}

/// Inputs for one estimation call, taken from an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationRequest {
    pub log_id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_ref: Option<String>,
    pub food_components: Vec<FoodComponent>,
}

impl EstimationRequest {
    pub fn from_entry(entry: &FoodLogEntry) -> Self {
        Self {
            log_id: entry.id.clone(),
            title: entry.title.clone(),
            description: entry.description.clone(),
            image_ref: entry.image_ref.clone(),
            food_components: entry.food_components.clone(),
        }
    }

    /// Title and description plus the current ingredient list, for the text path.
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(description) = self.description.as_deref().filter(|d| !d.trim().is_empty()) {
            parts.push(description.trim().to_string());
        }
        if !self.food_components.is_empty() {
            let lines: Vec<String> = self
                .food_components
                .iter()
                .map(|c| format!("- {} {} {}", c.amount, c.unit, c.name))
                .collect();
            parts.push(format!("Ingredients:\n{}", lines.join("\n")));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

#[async_trait]
pub trait Estimator: Send + Sync {
    async fn estimate_from_text(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<EstimationResult, EstimationError>;

    async fn estimate_from_image(
        &self,
        image_ref: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<EstimationResult, EstimationError>;

    /// Picks the image path when the request carries an image reference.
    async fn estimate(&self, request: &EstimationRequest) -> Result<EstimationResult, EstimationError> {
        let description = request.describe();
        match request.image_ref.as_deref() {
            Some(image_ref) => {
                let title = Some(request.title.as_str()).filter(|t| !t.trim().is_empty());
                self.estimate_from_image(image_ref, title, description.as_deref())
                    .await
            }
            None => {
                self.estimate_from_text(&request.title, description.as_deref())
                    .await
            }
        }
    }
}

// Wire shape of the model's JSON reply. Looser than EstimationResult so that
// free-text units and out-of-range confidences can be normalised.
#[derive(Debug, Deserialize)]
struct EstimationReply {
    generated_title: String,
    calories: f32,
    protein: f32,
    carbs: f32,
    fat: f32,
    estimation_confidence: f64,
    #[serde(default)]
    food_components: Vec<ReplyComponent>,
}

#[derive(Debug, Deserialize)]
struct ReplyComponent {
    name: String,
    amount: f32,
    unit: String,
    #[serde(default)]
    recommended_amount: Option<f32>,
    #[serde(default)]
    recommended_unit: Option<String>,
}

impl From<ReplyComponent> for FoodComponent {
    fn from(reply: ReplyComponent) -> Self {
        let recommended_measurement = match (reply.recommended_amount, reply.recommended_unit.as_deref()) {
            (Some(amount), Some(unit)) => unit
                .parse::<Unit>()
                .ok()
                .map(|unit| Measurement { amount, unit }),
            _ => None,
        };
        FoodComponent {
            name: reply.name,
            amount: reply.amount.max(0.0),
            unit: reply.unit.parse().unwrap_or(Unit::Serving),
            recommended_measurement,
        }
    }
}

impl From<EstimationReply> for EstimationResult {
    fn from(reply: EstimationReply) -> Self {
        EstimationResult {
            generated_title: reply.generated_title.trim().to_string(),
            calories: reply.calories.max(0.0),
            protein: reply.protein.max(0.0),
            carbs: reply.carbs.max(0.0),
            fat: reply.fat.max(0.0),
            estimation_confidence: reply.estimation_confidence.round().clamp(0.0, 100.0) as u8,
            food_components: reply.food_components.into_iter().map(FoodComponent::from).collect(),
        }
    }
}

/// Removes a surrounding markdown code fence, if any.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```json") && trimmed.ends_with("```") && trimmed.len() >= 10 {
        trimmed.trim_start_matches("```json").trim_end_matches("```").trim()
    } else if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6 {
        trimmed.trim_start_matches("```").trim_end_matches("```").trim()
    } else {
        trimmed
    }
}

/// Parses the model's reply text into a normalised result.
pub fn parse_estimation_reply(content: &str) -> Result<EstimationResult, EstimationError> {
    let json = strip_code_fences(content);
    if json.is_empty() {
        return Err(EstimationError::EmptyResponse);
    }
    serde_json::from_str::<EstimationReply>(json)
        .map(EstimationResult::from)
        .map_err(|e| EstimationError::MalformedResponse {
            reason: e.to_string(),
            raw: json.to_string(),
        })
}

fn estimation_json_schema() -> JsonSchemaDefinition {
    let mut component_properties = HashMap::new();
    component_properties.insert(
        "name".to_string(),
        JsonSchemaProperty::typed("string", "Ingredient name."),
    );
    component_properties.insert(
        "amount".to_string(),
        JsonSchemaProperty::typed("number", "Quantity in the given unit."),
    );
    component_properties.insert(
        "unit".to_string(),
        JsonSchemaProperty {
            r#enum: Some(
                ["g", "ml", "oz", "cup", "tbsp", "tsp", "piece", "slice", "serving"]
                    .iter()
                    .map(|u| u.to_string())
                    .collect(),
            ),
            ..JsonSchemaProperty::typed("string", "Unit of the amount.")
        },
    );
    component_properties.insert(
        "recommended_amount".to_string(),
        JsonSchemaProperty::typed(
            "number",
            "Optional more precise amount when the unit is vague, e.g. 120 for '1 piece' of chicken.",
        ),
    );
    component_properties.insert(
        "recommended_unit".to_string(),
        JsonSchemaProperty::typed("string", "Unit for recommended_amount, usually g or ml."),
    );

    let component_schema = JsonSchema {
        schema_type: "object".to_string(),
        properties: Some(component_properties),
        required: Some(vec!["name".to_string(), "amount".to_string(), "unit".to_string()]),
        additional_properties: Some(false),
    };

    let mut properties = HashMap::new();
    properties.insert(
        "generated_title".to_string(),
        JsonSchemaProperty::typed(
            "string",
            "Short name of the meal, or exactly 'Invalid Image' if the image shows no food.",
        ),
    );
    for (field, description) in [
        ("calories", "Total kcal."),
        ("protein", "Total protein in grams."),
        ("carbs", "Total carbohydrates in grams."),
        ("fat", "Total fat in grams."),
        ("estimation_confidence", "Confidence in the estimate from 0 to 100."),
    ] {
        properties.insert(field.to_string(), JsonSchemaProperty::typed("number", description));
    }
    properties.insert(
        "food_components".to_string(),
        JsonSchemaProperty {
            items: Some(Box::new(component_schema)),
            ..JsonSchemaProperty::typed("array", "Ingredients making up the meal.")
        },
    );

    JsonSchemaDefinition {
        name: "meal_estimation_schema".to_string(),
        strict: Some(false),
        schema: JsonSchema {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: Some(
                [
                    "generated_title",
                    "calories",
                    "protein",
                    "carbs",
                    "fat",
                    "estimation_confidence",
                    "food_components",
                ]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            ),
            additional_properties: Some(false),
        },
    }
}

const SYSTEM_PROMPT: &str = "/no_thinking
You are a nutrition estimation assistant. Estimate the total calories (kcal), protein, carbohydrates and fat (grams) of the meal you are given.
Break the meal into its ingredients. When an ingredient amount is given in a vague unit (piece, slice, serving, cup), add recommended_amount and recommended_unit with a more precise weight or volume.
Set estimation_confidence between 0 and 100 to reflect how certain you are.
If you are given an image that does not show food, set generated_title to exactly \"Invalid Image\" and all numbers to 0.
Respond ONLY with a JSON object matching the provided schema, with no surrounding text.";

/// Estimator that calls a chat-completion model through OpenRouter.
#[derive(Debug, Clone)]
pub struct OpenRouterEstimator {
    provider: Provider,
    config: EngineConfig,
}

impl OpenRouterEstimator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            provider: Provider::openrouter(&config.api_key_env_var),
            config,
        }
    }

    fn build_request(&self, model: &str, user_message: ChatMessage) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), user_message],
            response_format: Some(ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: Some(estimation_json_schema()),
            }),
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        }
    }

    async fn run(&self, request: ChatCompletionRequest) -> Result<EstimationResult, EstimationError> {
        let response = self.provider.call_chat_completion(request).await?;
        let content = response.first_content().ok_or(EstimationError::EmptyResponse)?;
        debug!(content, "Raw estimation reply");
        let result = parse_estimation_reply(content)?;
        info!(
            title = %result.generated_title,
            calories = result.calories,
            confidence = result.estimation_confidence,
            "Estimation received"
        );
        Ok(result)
    }
}

fn user_prompt(title: Option<&str>, description: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(title) = title {
        prompt.push_str(&format!("Meal: \"{}\"\n", title));
    }
    if let Some(description) = description {
        prompt.push_str(&format!("Details: \"{}\"\n", description));
    }
    if prompt.is_empty() {
        prompt.push_str("Estimate the meal shown.");
    }
    prompt
}

#[async_trait]
impl Estimator for OpenRouterEstimator {
    async fn estimate_from_text(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<EstimationResult, EstimationError> {
        let message = ChatMessage::user(user_prompt(Some(title), description));
        self.run(self.build_request(&self.config.text_model, message)).await
    }

    async fn estimate_from_image(
        &self,
        image_ref: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<EstimationResult, EstimationError> {
        if !self.provider.supports_images(&self.config.vision_model) {
            debug!(model = %self.config.vision_model, "Vision model not in the known list, sending anyway");
        }
        let message = ChatMessage::user_with_image(user_prompt(title, description), image_ref);
        self.run(self.build_request(&self.config.vision_model, message)).await
    }
}
