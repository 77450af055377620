//! Tollgate CLI
//!
//! Loads a model and a policy store, then answers one query:
//!
//! ```text
//! tollgate --model rbac_model.conf --policy policy.csv enforce alice data1 read
//! tollgate --config tollgate.toml policies
//! tollgate --config tollgate.toml roles alice --domain tenant1
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tollgate::{Enforcer, EnforcerConfig, FileAdapter, Model, SqliteAdapter, TableName};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Evaluate access requests against a Casbin-style policy")]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long, conflicts_with_all = ["model", "policy", "sqlite"])]
    config: Option<PathBuf>,

    /// Model definition file
    #[arg(short = 'm', long)]
    model: Option<PathBuf>,

    /// CSV policy file
    #[arg(short = 'p', long, conflicts_with = "sqlite")]
    policy: Option<PathBuf>,

    /// SQLite policy database
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// Rules table inside the SQLite database
    #[arg(long, default_value = TableName::DEFAULT)]
    table: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide a request; exits non-zero when it is denied
    Enforce {
        /// Request values in request-definition order
        #[arg(required = true)]
        values: Vec<String>,

        /// Also print the rule that decided the request
        #[arg(long)]
        explain: bool,
    },
    /// Print every rule as JSON
    Policies,
    /// Print the direct and inherited roles of a user as JSON
    Roles {
        user: String,

        #[arg(short = 'd', long)]
        domain: Option<String>,
    },
}

fn build_enforcer(args: &Args) -> anyhow::Result<Enforcer> {
    if let Some(path) = &args.config {
        let config = EnforcerConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?;
        return Ok(Enforcer::from_config(&config)?);
    }

    let Some(model_path) = &args.model else {
        bail!("either --config or --model with --policy/--sqlite is required");
    };
    let model = Model::from_file(model_path)
        .with_context(|| format!("loading model {}", model_path.display()))?;

    let enforcer = match (&args.policy, &args.sqlite) {
        (Some(policy), _) => Enforcer::new(model, FileAdapter::new(policy))?,
        (None, Some(db)) => {
            let adapter = SqliteAdapter::open(db, TableName::new(args.table.as_str())?)?;
            Enforcer::new(model, adapter)?
        }
        (None, None) => bail!("--model needs --policy or --sqlite"),
    };
    Ok(enforcer)
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let enforcer = build_enforcer(&args)?;
    debug!(?enforcer, "Enforcer ready");

    match &args.command {
        Command::Enforce { values, explain } => {
            let decision = enforcer.enforce_ex(values.as_slice())?;
            info!(request = ?values, allowed = decision.allowed, "Request evaluated");

            if *explain {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                println!("{}", if decision.allowed { "allow" } else { "deny" });
            }
            Ok(if decision.allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Command::Policies => {
            let model = enforcer.model();
            let rules: Vec<serde_json::Value> = model
                .rules()
                .map(|(ptype, rule)| serde_json::json!({ "ptype": ptype, "rule": rule }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rules)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Roles { user, domain } => {
            let domain = domain.as_deref();
            let output = serde_json::json!({
                "user": user,
                "roles": enforcer.get_roles_for_user(user, domain)?,
                "implicit_roles": enforcer.get_implicit_roles_for_user(user, domain)?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
