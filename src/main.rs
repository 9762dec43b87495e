use anyhow::{Context, Result};
use chrono::Local;
use nutri_reconcile::cli::{parse_args, run_targets, Command, EstimateArgs};
use nutri_reconcile::config::EngineConfig;
use nutri_reconcile::estimation::OpenRouterEstimator;
use nutri_reconcile::food_log::{submit_for_estimation, EstimationOutcome, InMemoryFoodLog};
use nutri_reconcile::logging;
use tracing::{info, warn};

async fn estimate(args: &EstimateArgs, config: EngineConfig) -> Result<()> {
    let estimator = OpenRouterEstimator::new(config);
    let mut store = InMemoryFoodLog::new();
    let draft = args.to_draft(Local::now().date_naive());

    info!(log_id = %draft.id, image = draft.image_ref.is_some(), "Submitting meal for estimation");
    let outcome = submit_for_estimation(&estimator, &mut store, &draft)
        .await
        .context("Estimation failed; nothing was logged")?;

    match outcome {
        EstimationOutcome::Logged(entry) => {
            println!("{}", serde_json::to_string_pretty(&entry)?);
            println!("Confidence: {} ({})", entry.estimation_confidence, entry.confidence_band());
        }
        EstimationOutcome::InvalidImage { .. } => {
            eprintln!("The image could not be used. Please retake the photo and try again.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init();

    let cli = parse_args();
    let config = EngineConfig::from_env();

    match cli.command {
        Command::Targets(args) => {
            let targets = run_targets(&args).await?;
            println!("{}", serde_json::to_string_pretty(&targets)?);
            if targets.is_over_budget() {
                warn!(carbs_g = targets.carbs_g, "Protein and fat exceed the calorie budget; adjust before saving");
            }
        }
        Command::Estimate(args) => estimate(&args, config).await?,
    }

    Ok(())
}
