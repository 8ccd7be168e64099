use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use hearth_lib::config::Config;
use hearth_lib::db;
use hearth_lib::preference::ThemeMode;
use hearth_lib::remote::SqliteRemote;
use hearth_lib::session::Identity;
use hearth_lib::validation::{
    validate_email, validate_password, validate_sign_in, validate_sign_up_with,
    ValidationResult,
};
use hearth_lib::wizard::{SaveOutcome, WizardEntry};
use hearth_lib::{AppError, AppState};

const EXIT_INVALID: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "hearth", about = "Household client session tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the credential validation rules and print the result as JSON.
    #[command(subcommand)]
    Validate(ValidateCommand),
    /// Read or change the stored theme preference for this device.
    #[command(subcommand)]
    Theme(ThemeCommand),
    /// Create or rename a household through the wizard.
    #[command(subcommand)]
    Household(HouseholdCommand),
}

#[derive(Debug, Subcommand)]
enum ValidateCommand {
    Email {
        value: String,
    },
    Password {
        value: String,
        /// Minimum length; defaults to the configured value.
        #[arg(long)]
        min: Option<usize>,
    },
    SignUp {
        email: String,
        password: String,
    },
    SignIn {
        email: String,
        password: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
    System,
}

impl From<ThemeArg> for ThemeMode {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => ThemeMode::Light,
            ThemeArg::Dark => ThemeMode::Dark,
            ThemeArg::System => ThemeMode::System,
        }
    }
}

#[derive(Debug, Subcommand)]
enum ThemeCommand {
    Get,
    Set { mode: ThemeArg },
}

#[derive(Debug, Subcommand)]
enum HouseholdCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Pending member email; may be repeated.
        #[arg(long = "member")]
        members: Vec<String>,
    },
    Rename {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        user_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };
    hearth_lib::init_logging(config.log_dir.as_deref());

    match run(cli.command, config).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

async fn run(command: Commands, config: Config) -> Result<i32> {
    match command {
        Commands::Validate(cmd) => handle_validate(cmd, &config),
        Commands::Theme(cmd) => handle_theme(cmd, config).await,
        Commands::Household(cmd) => handle_household(cmd, config).await,
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}

fn handle_validate(command: ValidateCommand, config: &Config) -> Result<i32> {
    let outcome = match command {
        ValidateCommand::Email { value } => validate_email(&value),
        ValidateCommand::Password { value, min } => {
            validate_password(&value, min.unwrap_or(config.min_password_length))
        }
        ValidateCommand::SignUp { email, password } => {
            validate_sign_up_with(&email, &password, config.min_password_length)
        }
        ValidateCommand::SignIn { email, password } => validate_sign_in(&email, &password),
    };
    let result = ValidationResult::from(outcome);
    print_json(&serde_json::to_value(&result).context("serialize validation result")?)?;
    Ok(if result.is_valid { 0 } else { EXIT_INVALID })
}

async fn handle_theme(command: ThemeCommand, config: Config) -> Result<i32> {
    let state = AppState::open(config);
    // The CLI acts for whoever is signed in on this device.
    state.preferences.identity_acquired().await;
    if let ThemeCommand::Set { mode } = command {
        state.preferences.set_mode(mode.into()).await;
    }
    let snapshot = state.preferences.snapshot();
    print_json(&json!({
        "mode": snapshot.mode,
        "resolved": snapshot.resolved,
    }))?;
    Ok(0)
}

fn exit_code_for(err: &AppError) -> i32 {
    if err.is_validation() {
        EXIT_INVALID
    } else {
        1
    }
}

async fn handle_household(command: HouseholdCommand, config: Config) -> Result<i32> {
    let pool = db::open_sqlite_pool(&config.database_path()).await?;
    let remote = SqliteRemote::new(pool.clone());
    let state = AppState::open(config);
    let wizard = &state.wizard;

    let (identity, members) = match command {
        HouseholdCommand::Create {
            name,
            user_id,
            email,
            members,
        } => {
            wizard.on_wizard_entered(WizardEntry::Create);
            wizard.draft().set_name(name);
            (Identity { user_id, email }, members)
        }
        HouseholdCommand::Rename { id, name, user_id } => {
            wizard.on_wizard_entered(WizardEntry::Edit { household_id: id });
            wizard.draft().set_name(name);
            (
                Identity {
                    user_id,
                    email: String::new(),
                },
                Vec::new(),
            )
        }
    };

    for member in &members {
        if let Err(err) = wizard.submit_member_email(member) {
            eprintln!("Error: {member}: {}", err.code());
            pool.close().await;
            return Ok(EXIT_INVALID);
        }
    }

    let pending = wizard.draft().snapshot().member_emails.len();
    let result = wizard.save(&identity, &remote).await;
    pool.close().await;
    match result {
        Ok(SaveOutcome::Created { household_id }) => {
            print_json(&json!({
                "outcome": "created",
                "householdId": household_id,
                "pendingMembers": pending,
            }))?;
            Ok(0)
        }
        Ok(SaveOutcome::Updated { household_id }) => {
            print_json(&json!({ "outcome": "updated", "householdId": household_id }))?;
            Ok(0)
        }
        Err(err) => {
            eprintln!("Error: {}", err.message());
            Ok(exit_code_for(&err))
        }
    }
}
