//! storyline command-line client.
//!
//! Results are printed to stdout as JSON. Logging goes to stderr so the
//! output stays machine-readable.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use storyline_core::{AppConfig, Error};

mod app;
mod commands;
mod device;
mod output;

use commands::{AssetsCommand, CacheCommand, NotifyCommand};

/// Offline-first story client
#[derive(Parser)]
#[command(name = "storyline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Treat the network as unreachable
    #[arg(long, global = true)]
    offline: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stories, live when possible and cached otherwise
    Stories {
        /// Ignore the freshness window and ask the origin
        #[arg(long)]
        refresh: bool,
    },

    /// Show one story
    Story { id: String },

    /// Publish a story, or keep it on this device when the origin is unreachable
    Add {
        #[arg(long)]
        description: String,

        /// Path to the photo to upload
        #[arg(long)]
        photo: std::path::PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Inspect or manage the local story store
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Log in and keep the session token
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "STORYLINE_PASSWORD")]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "STORYLINE_PASSWORD")]
        password: String,
    },

    /// Forget the session token
    Logout,

    /// Drive the request router and its cache tiers
    #[command(subcommand)]
    Assets(AssetsCommand),

    /// Manage the push notification subscription
    #[command(subcommand)]
    Notify(NotifyCommand),
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// 2 when the user must act before the command can succeed, 1 otherwise.
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<Error>() {
        Some(e) if e.is_terminal() => 2,
        _ => 1,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load()?;
    let app = app::App::open(config, cli.offline).await?;

    let result = match cli.command {
        Commands::Stories { refresh } => commands::stories(&app, refresh).await,
        Commands::Story { id } => commands::story(&app, &id).await,
        Commands::Add { description, photo, lat, lon } => {
            commands::add(&app, description, &photo, lat, lon).await
        }
        Commands::Cache(command) => commands::cache(&app, command).await,
        Commands::Login { email, password } => commands::login(&app, &email, &password).await,
        Commands::Register { name, email, password } => commands::register(&app, &name, &email, &password).await,
        Commands::Logout => commands::logout(&app).await,
        Commands::Assets(command) => commands::assets(&app, command).await,
        Commands::Notify(command) => commands::notify(&app, command).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(exit_code(&e));
    }

    Ok(())
}
