use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use numa_contracts::events::EventWriter;
use numa_contracts::meals::{
    nutrition_score, personalized_tip, score_band, MealAnalysis, MealHistorySummary, ScoreBand,
};
use numa_contracts::profile::{ActivityLevel, Gender, Goal, OnboardingStatus, OnboardingUpdate};
use numa_contracts::store::LocalStore;
use numa_engine::{
    load_image, non_empty_env, AnalyzerConfig, DisabledDocumentStore, DocumentStore,
    FirestoreConfig, FirestoreDocumentStore, MealAnalyzer, ProfileStore, ProfileWorker,
};

#[derive(Debug, Parser)]
#[command(name = "numa", version, about = "Meal photo analysis and profile sync")]
struct Cli {
    /// Local state directory (defaults to $NUMA_DATA_DIR, then `.numa`).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Estimate calories and macros for a meal photo.
    Analyze(AnalyzeArgs),
    /// Save onboarding answers; only the flags given are changed.
    Onboard(OnboardArgs),
    /// Mark onboarding as finished.
    Complete,
    /// List the onboarding answers still missing.
    Verify,
    /// Show saved meals, newest first.
    Meals,
    /// Print the current profile.
    Show,
    /// Forget the local profile.
    Reset,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    /// Store the result under the current profile.
    #[arg(long)]
    save: bool,
}

#[derive(Debug, Parser)]
struct OnboardArgs {
    #[arg(long)]
    goal: Option<Goal>,
    #[arg(long)]
    current_weight: Option<f64>,
    #[arg(long)]
    target_weight: Option<f64>,
    #[arg(long)]
    height: Option<i64>,
    #[arg(long)]
    age: Option<i64>,
    #[arg(long)]
    gender: Option<Gender>,
    #[arg(long)]
    activity_level: Option<ActivityLevel>,
}

impl OnboardArgs {
    fn into_update(self) -> OnboardingUpdate {
        OnboardingUpdate {
            goal: self.goal,
            current_weight: self.current_weight,
            target_weight: self.target_weight,
            height: self.height,
            age: self.age,
            gender: self.gender,
            activity_level: self.activity_level,
        }
    }
}

struct Workspace {
    data_dir: PathBuf,
    events: EventWriter,
}

impl Workspace {
    fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir
            .or_else(|| non_empty_env("NUMA_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(".numa"));
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let events = EventWriter::new(data_dir.join("events.jsonl"), session_id);
        Ok(Self { data_dir, events })
    }

    fn profile_store(&self) -> ProfileStore<Box<dyn DocumentStore>> {
        let local = LocalStore::new(self.data_dir.join("defaults.json"));
        ProfileStore::new(local, remote_store()).with_events(self.events.clone())
    }

    fn profiles(&self) -> Result<ProfileWorker> {
        ProfileWorker::spawn(self.profile_store())
    }

    fn analyzer_config(&self) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::from_env();
        if config.credentials.config_path.is_none() {
            config.credentials.config_path = Some(self.data_dir.join("config.json"));
        }
        config
    }
}

fn remote_store() -> Box<dyn DocumentStore> {
    match FirestoreConfig::from_env() {
        Some(config) => {
            log::info!("syncing profiles to Firestore project {}", config.project_id);
            Box::new(FirestoreDocumentStore::new(config))
        }
        None => {
            log::info!("NUMA_FIRESTORE_PROJECT not set; profiles stay local");
            Box::new(DisabledDocumentStore)
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("numa error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let workspace = Workspace::open(cli.data_dir)?;
    match cli.command {
        Command::Analyze(args) => run_analyze(&workspace, args),
        Command::Onboard(args) => run_onboard(&workspace, args),
        Command::Complete => run_complete(&workspace),
        Command::Verify => run_verify(&workspace),
        Command::Meals => run_meals(&workspace),
        Command::Show => run_show(&workspace),
        Command::Reset => run_reset(&workspace),
    }
}

fn run_analyze(workspace: &Workspace, args: AnalyzeArgs) -> Result<i32> {
    let analyzer = Arc::new(
        MealAnalyzer::new(workspace.analyzer_config()).with_events(workspace.events.clone()),
    );
    let image = match load_image(&args.image) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("{}: {err}", args.image.display());
            return Ok(1);
        }
    };

    let profiles = workspace.profiles()?;
    let goal = profiles
        .current_profile()
        .wait()?
        .and_then(|profile| profile.goal);

    let meal = match analyzer.spawn_analysis(image)?.wait()? {
        Ok(meal) => meal,
        Err(err) => {
            eprintln!("analysis failed [{}]: {err}", err.message_key());
            profiles.shutdown()?;
            return Ok(1);
        }
    };
    print_meal(&meal, goal);

    let mut code = 0;
    if args.save {
        match profiles.save_meal_analysis(meal.clone()).wait()? {
            Ok(()) => println!("Saved meal {}", meal.id),
            Err(err) => {
                eprintln!("meal not saved: {err:#}");
                code = 1;
            }
        }
    }
    profiles.shutdown()?;
    Ok(code)
}

fn run_onboard(workspace: &Workspace, args: OnboardArgs) -> Result<i32> {
    let update = args.into_update();
    if update.is_empty() {
        bail!("nothing to save; pass at least one onboarding flag");
    }
    let profiles = workspace.profiles()?;
    if let Err(err) = profiles.save_onboarding_data(update).wait()? {
        eprintln!("warning: {err:#}");
    }
    print_status(&profiles.verify_onboarding_data().wait()?);
    profiles.shutdown()?;
    Ok(0)
}

fn run_complete(workspace: &Workspace) -> Result<i32> {
    let profiles = workspace.profiles()?;
    if let Err(err) = profiles.complete_onboarding().wait()? {
        eprintln!("warning: {err:#}");
    }
    print_status(&profiles.verify_onboarding_data().wait()?);
    profiles.shutdown()?;
    Ok(0)
}

fn run_verify(workspace: &Workspace) -> Result<i32> {
    let profiles = workspace.profiles()?;
    print_status(&profiles.verify_onboarding_data().wait()?);
    profiles.shutdown()?;
    Ok(0)
}

fn run_meals(workspace: &Workspace) -> Result<i32> {
    let profiles = workspace.profiles()?;
    let meals = profiles.get_user_meals().wait()?;
    profiles.shutdown()?;
    let meals = meals?;

    if meals.is_empty() {
        println!("No meals saved yet.");
        return Ok(0);
    }
    for meal in &meals {
        println!(
            "{}  {:>5} kcal  P {:.1}g  C {:.1}g  F {:.1}g  {}",
            meal.timestamp.format("%Y-%m-%d %H:%M"),
            meal.estimated_calories,
            meal.macros.protein,
            meal.macros.carbs,
            meal.macros.fat,
            meal.ingredients.join(", ")
        );
    }
    let summary = MealHistorySummary::from_meals(&meals);
    println!(
        "{} meals, {} kcal total, {} kcal average",
        summary.meal_count, summary.total_calories, summary.average_calories
    );
    Ok(0)
}

fn run_show(workspace: &Workspace) -> Result<i32> {
    let profiles = workspace.profiles()?;
    println!("{}", profiles.describe_profile().wait()?);
    profiles.shutdown()?;
    Ok(0)
}

fn run_reset(workspace: &Workspace) -> Result<i32> {
    let mut store = workspace.profile_store();
    store.reset()?;
    store.shutdown()?;
    println!("Local profile data cleared.");
    Ok(0)
}

fn print_meal(meal: &MealAnalysis, goal: Option<Goal>) {
    println!("Meal {}", meal.id);
    if let Some(text) = meal.analysis_text.as_deref() {
        println!("  {text}");
    }
    println!("  Ingredients: {}", meal.ingredients.join(", "));
    println!("  Calories:    {} kcal", meal.estimated_calories);
    println!(
        "  Macros:      protein {:.1}g, carbs {:.1}g, fat {:.1}g",
        meal.macros.protein, meal.macros.carbs, meal.macros.fat
    );
    println!("  Confidence:  {:.0}%", meal.confidence * 100.0);

    let score = nutrition_score(meal, goal);
    let band = match score_band(score) {
        ScoreBand::Good => "good",
        ScoreBand::Fair => "fair",
        ScoreBand::Poor => "poor",
    };
    println!("  Score:       {score}/100 ({band})");
    println!("  Tip:         {}", personalized_tip(meal, goal));
}

fn print_status(status: &OnboardingStatus) {
    if status.is_complete {
        println!("Onboarding complete.");
    } else if status.missing_fields.is_empty() {
        println!("All answers saved; run `numa complete` to finish onboarding.");
    } else {
        println!("Missing: {}", status.missing_fields.join(", "));
    }
}
