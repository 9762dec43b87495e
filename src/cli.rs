use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use crate::food_log::entry::{FoodLogEntry, NutrientField};
use crate::targets::arithmetic::max_fat_percentage;
use crate::targets::{derive, seed_targets, DerivationContext, NutritionTargets, TargetChange, UserNutritionProfile};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Derive daily calorie and macro targets
    Targets(TargetsArgs),
    /// Estimate a meal and merge the estimate with the values you typed
    Estimate(EstimateArgs),
}

#[derive(Args, Debug, Default)]
pub struct TargetsArgs {
    /// JSON file with the user's nutrition profile, used to seed the targets
    #[arg(long)]
    pub profile: Option<PathBuf>,
    /// Daily calories
    #[arg(long)]
    pub calories: Option<i32>,
    /// Daily protein in grams
    #[arg(long)]
    pub protein: Option<i32>,
    /// Share of calories from fat, 0-100
    #[arg(long)]
    pub fat_percentage: Option<f32>,
}

impl TargetsArgs {
    /// Requested changes in cascade order: calories, protein, fat share.
    pub fn changes(&self) -> Vec<TargetChange> {
        let mut changes = Vec::new();
        if let Some(calories) = self.calories {
            changes.push(TargetChange::Calories(calories));
        }
        if let Some(protein) = self.protein {
            changes.push(TargetChange::Protein(protein));
        }
        if let Some(pct) = self.fat_percentage {
            changes.push(TargetChange::FatPercentage(pct));
        }
        changes
    }
}

#[derive(Args, Debug, Default)]
pub struct EstimateArgs {
    /// Name of the meal
    #[arg(short, long)]
    pub title: String,
    /// Free-text description, e.g. portion sizes
    #[arg(short, long)]
    pub description: Option<String>,
    /// Uploaded image URL to estimate from
    #[arg(long)]
    pub image: Option<String>,
    /// Day the meal is logged for (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub calories: Option<f32>,
    #[arg(long)]
    pub protein: Option<f32>,
    #[arg(long)]
    pub carbs: Option<f32>,
    #[arg(long)]
    pub fat: Option<f32>,
}

impl EstimateArgs {
    pub fn to_draft(&self, today: NaiveDate) -> FoodLogEntry {
        let mut draft = FoodLogEntry::new_draft(self.date.unwrap_or(today)).with_title(&self.title);
        if let Some(description) = &self.description {
            draft = draft.with_description(description);
        }
        if let Some(image) = &self.image {
            draft = draft.with_image(image);
        }
        for (field, value) in [
            (NutrientField::Calories, self.calories),
            (NutrientField::Protein, self.protein),
            (NutrientField::Carbs, self.carbs),
            (NutrientField::Fat, self.fat),
        ] {
            if let Some(value) = value {
                draft = draft.with_user_value(field, value);
            }
        }
        draft
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

pub async fn load_profile(path: &Path) -> Result<UserNutritionProfile> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read profile file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse profile file '{}'", path.display()))
}

/// Seeds from the profile when one is given, then applies the requested changes.
pub async fn run_targets(args: &TargetsArgs) -> Result<NutritionTargets> {
    let (mut targets, context) = match &args.profile {
        Some(path) => {
            let profile = load_profile(path).await?;
            let targets = seed_targets(&profile).context("Profile could not seed targets")?;
            (targets, DerivationContext::with_fat_percentage(profile.fat_percentage))
        }
        None => (NutritionTargets::default(), DerivationContext::default()),
    };

    let context = match args.fat_percentage {
        Some(pct) => DerivationContext::with_fat_percentage(pct),
        None => context,
    };

    for change in args.changes() {
        if let TargetChange::FatPercentage(pct) = change {
            let cap = max_fat_percentage(targets.calories, targets.protein_g);
            if pct > cap {
                warn!(requested = pct, max = cap, "Fat share leaves no room for carbs");
            }
        }
        targets = derive(targets, change, &context)?;
    }
    Ok(targets)
}
