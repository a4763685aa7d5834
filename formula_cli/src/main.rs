use clap::{Parser, Subcommand};
use formula_core::*;
use std::borrow::Cow;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fcheck")]
#[command(about = "Supplement formula validation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Load the ingredient catalog from a .json, .toml or .csv file
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Override the total mass ceiling in mg
    #[arg(long, global = true)]
    ceiling_mg: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a single candidate formula ("-" reads stdin)
    ///
    /// Prints the accepted formula JSON and exits 0, or the validation
    /// report JSON and exits 2.
    Check {
        candidate: PathBuf,

        /// Attempt number supplied by the conversation
        #[arg(long, default_value_t = 1)]
        attempt: u32,

        /// User whose formula history supplies the version
        #[arg(long)]
        user: Option<String>,

        /// Append an accepted formula to the user's ledger
        #[arg(long, requires = "user")]
        persist: bool,
    },

    /// Replay scripted agent submissions through the correction loop
    Session {
        #[arg(required = true)]
        candidates: Vec<PathBuf>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long, requires = "user")]
        persist: bool,
    },

    /// List the active ingredient catalog
    Catalog {
        /// Only check the catalog for consistency
        #[arg(long)]
        validate: bool,
    },

    /// List accepted formula versions for a user
    History {
        #[arg(long)]
        user: String,
    },
}

/// Exit code for a candidate that was rejected with a report
const EXIT_REPORT: u8 = 2;

fn main() -> ExitCode {
    // Initialize logging
    formula_core::logging::init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load()?;
    if let Some(ceiling) = cli.ceiling_mg {
        config.limits.ceiling_mg = ceiling;
        config.validate()?;
    }
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());

    let catalog_path = cli.catalog.clone().or_else(|| config.catalog.path.clone());
    let catalog = load_active_catalog(catalog_path.as_deref())?;

    match cli.command {
        Commands::Check {
            candidate,
            attempt,
            user,
            persist,
        } => cmd_check(&catalog, &config, &data_dir, &candidate, attempt, user.as_deref(), persist),
        Commands::Session {
            candidates,
            user,
            persist,
        } => cmd_session(&catalog, &config, &data_dir, &candidates, user.as_deref(), persist),
        Commands::Catalog { validate } => cmd_catalog(&catalog, validate),
        Commands::History { user } => cmd_history(&data_dir, &user),
    }
}

fn load_active_catalog(path: Option<&Path>) -> Result<Cow<'static, Catalog>> {
    let catalog = match path {
        Some(path) => Cow::Owned(load_catalog(path)?),
        None => {
            tracing::debug!("Using built-in catalog");
            Cow::Borrowed(get_default_catalog())
        }
    };

    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }

    Ok(catalog)
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn user_ledger(data_dir: &Path, user: Option<&str>) -> Result<Option<JsonlLedger>> {
    user.map(|u| JsonlLedger::for_user(data_dir, u)).transpose()
}

fn next_stamp(ledger: Option<&JsonlLedger>) -> Result<VersionStamp> {
    let prior = match ledger {
        Some(ledger) => latest_version(ledger.path())?,
        None => None,
    };
    Ok(VersionStamp::next(prior))
}

fn cmd_check(
    catalog: &Catalog,
    config: &Config,
    data_dir: &Path,
    candidate_path: &Path,
    attempt: u32,
    user: Option<&str>,
    persist: bool,
) -> Result<ExitCode> {
    let raw = read_input(candidate_path)?;
    let candidate = parse_candidate(&raw)?;

    let mut ledger = user_ledger(data_dir, user)?;
    let stamp = next_stamp(ledger.as_ref())?;

    let engine = FormulaEngine::new(catalog, config.engine_limits());
    let outcome = engine.coordinate(&candidate, attempt, &stamp)?;

    match &outcome {
        Outcome::Accepted(formula) => {
            println!("{}", serde_json::to_string_pretty(formula)?);
            if persist {
                if let Some(ledger) = ledger.as_mut() {
                    ledger.append(formula)?;
                    eprintln!("✓ Saved formula version {}", formula.version);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Report(report) => {
            println!("{}", serde_json::to_string_pretty(report)?);
            Ok(ExitCode::from(EXIT_REPORT))
        }
    }
}

fn cmd_session(
    catalog: &Catalog,
    config: &Config,
    data_dir: &Path,
    candidates: &[PathBuf],
    user: Option<&str>,
    persist: bool,
) -> Result<ExitCode> {
    let mut ledger = user_ledger(data_dir, user)?;
    let engine = FormulaEngine::new(catalog, config.engine_limits());
    let mut session = CorrectionLoop::new(config.retry_policy());

    for path in candidates {
        let raw = read_input(path)?;
        let stamp = next_stamp(ledger.as_ref())?;
        let attempt = session.attempts().len() + 1;

        println!("── attempt {} ({}) ──", attempt, path.display());

        match session.submit(&engine, &raw, &stamp)? {
            LoopStep::Accepted(formula) => {
                println!(
                    "✓ Accepted version {}: {} mg in {} capsules",
                    formula.version, formula.total_mg, formula.capsule_count
                );
                for note in &formula.adjustments {
                    match note.action {
                        TrimAction::Reduced { from_mg, to_mg } => println!(
                            "  trimmed {} from {} mg to {} mg",
                            note.canonical_name, from_mg, to_mg
                        ),
                        TrimAction::Removed { amount_mg } => println!(
                            "  removed {} ({} mg)",
                            note.canonical_name, amount_mg
                        ),
                    }
                }
                if persist {
                    if let Some(ledger) = ledger.as_mut() {
                        ledger.append(&formula)?;
                    }
                }
                println!("{}", serde_json::to_string_pretty(&formula)?);
                return Ok(ExitCode::SUCCESS);
            }
            LoopStep::Retry { message, .. } => {
                println!("{}", message);
            }
            LoopStep::Exhausted { message, .. } | LoopStep::TimedOut { message } => {
                println!("{}", message);
                return Ok(ExitCode::from(EXIT_REPORT));
            }
        }
    }

    // Agent stopped resubmitting before the cap
    println!("{}", FALLBACK_APOLOGY);
    Ok(ExitCode::from(EXIT_REPORT))
}

fn describe_dose(dose: &DoseRule) -> String {
    match dose {
        DoseRule::Fixed { fixed_dose_mg } => format!("fixed {} mg", fixed_dose_mg),
        DoseRule::Ranged {
            min_dose_mg,
            max_dose_mg,
        } => format!("{}-{} mg", min_dose_mg, max_dose_mg),
    }
}

fn cmd_catalog(catalog: &Catalog, validate: bool) -> Result<ExitCode> {
    if validate {
        println!("✓ Catalog OK ({} ingredients)", catalog.len());
        return Ok(ExitCode::SUCCESS);
    }

    for rule in catalog.rules() {
        let category = match rule.category {
            IngredientCategory::Base => "base",
            IngredientCategory::Individual => "individual",
        };
        print!(
            "{:<22} {:<11} {:<16} weight {:>3}",
            rule.canonical_name,
            category,
            describe_dose(&rule.dose),
            rule.priority_weight
        );
        if !rule.aliases.is_empty() {
            print!("  aka {}", rule.aliases.join(", "));
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_history(data_dir: &Path, user: &str) -> Result<ExitCode> {
    let ledger = JsonlLedger::for_user(data_dir, user)?;
    let formulas = read_formulas(ledger.path())?;

    if formulas.is_empty() {
        println!("No accepted formulas for {}.", user);
        return Ok(ExitCode::SUCCESS);
    }

    for formula in formulas {
        println!(
            "v{:<3} {}  {} mg  {} capsules  {} ingredients",
            formula.version,
            formula.created_at.format("%Y-%m-%d %H:%M"),
            formula.total_mg,
            formula.capsule_count,
            formula.bases.len() + formula.additions.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}
