//! Command implementations.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;

use storyline_client::fetch::{canonicalize, resolve};
use storyline_client::{InterceptedRequest, Interception, InterceptionHost, NewStory, Photo, PushMessage};

use crate::app::App;
use crate::output::{ResponseView, print_json};

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Record count, byte estimate and cache age range
    Stats,
    /// Every cached story with its metadata
    List,
    /// Stories authored on this device and not yet published
    Offline,
    /// Remove one cached story
    Delete { id: String },
    /// Remove every cached story
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum AssetsCommand {
    /// Pre-fetch the application shell into the static tier
    Install,
    /// Delete tiers left over from earlier versions
    Activate,
    /// Route one request through the strategy router
    Fetch {
        /// Absolute URL, or a path on the asset origin
        url: String,

        /// Issue the request as a page navigation
        #[arg(long, conflicts_with = "image")]
        navigate: bool,

        /// Issue the request as an image load
        #[arg(long)]
        image: bool,

        #[arg(long, default_value = "GET")]
        method: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum NotifyCommand {
    /// Register the device and report the current subscription
    Init,
    /// Subscribe this device to push notifications
    Subscribe {
        /// Grant notification permission if asked
        #[arg(long)]
        grant: bool,
    },
    /// Unsubscribe this device
    Unsubscribe,
    /// Report the subscription as recorded on this device
    Status,
    /// Show the notification a push payload would produce
    Message {
        /// Raw payload: a JSON object overriding the defaults, or plain text
        payload: Option<String>,

        /// Notification action that was clicked
        #[arg(long)]
        action: Option<String>,
    },
}

pub async fn stories(app: &App, refresh: bool) -> Result<()> {
    let listing = app.sync().get_all_records(refresh).await?;
    if listing.using_cache() {
        tracing::info!(count = listing.data.len(), "showing cached stories");
    }
    print_json(&listing)
}

pub async fn story(app: &App, id: &str) -> Result<()> {
    let story = app.sync().get_record_by_id(id).await?;
    print_json(&story)
}

fn mime_for(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

async fn read_photo(path: &Path) -> Result<Photo> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("cannot read photo {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("photo")
        .to_string();
    Ok(Photo { file_name, mime_type: mime_for(path).to_string(), bytes })
}

pub async fn add(app: &App, description: String, photo: &Path, lat: Option<f64>, lon: Option<f64>) -> Result<()> {
    let draft = NewStory::new(description, lat, lon);
    draft.validate()?;
    let photo = read_photo(photo).await?;

    let outcome = app.sync().create_record(&draft, &photo).await?;
    print_json(&outcome)
}

pub async fn cache(app: &App, command: CacheCommand) -> Result<()> {
    let sync = app.sync();
    match command {
        CacheCommand::Stats => print_json(&sync.storage_stats().await?),
        CacheCommand::List => print_json(&sync.cached_records().await?),
        CacheCommand::Offline => print_json(&sync.offline_created_records().await?),
        CacheCommand::Delete { id } => {
            sync.delete_cached(&id).await?;
            print_json(&json!({ "deleted": id }))
        }
        CacheCommand::Clear => {
            sync.clear_cache().await?;
            print_json(&json!({ "cleared": true }))
        }
    }
}

pub async fn login(app: &App, email: &str, password: &str) -> Result<()> {
    let token = app.api().login(email, password).await?;
    app.credentials().set_credential(&token).await?;
    tracing::info!("logged in");
    print_json(&json!({ "loggedIn": true }))
}

pub async fn register(app: &App, name: &str, email: &str, password: &str) -> Result<()> {
    app.api().register(name, email, password).await?;
    print_json(&json!({ "registered": true }))
}

pub async fn logout(app: &App) -> Result<()> {
    app.credentials().clear_credential().await?;
    print_json(&json!({ "loggedIn": false }))
}

pub async fn assets(app: &App, command: AssetsCommand) -> Result<()> {
    let router = app.router()?;
    match command {
        AssetsCommand::Install => print_json(&router.on_install().await?),
        AssetsCommand::Activate => {
            let removed = router.on_activate().await?;
            print_json(&json!({ "removedTiers": removed }))
        }
        AssetsCommand::Fetch { url, navigate, image, method } => {
            let url = if url.starts_with('/') {
                resolve(&canonicalize(&app.config.asset_origin)?, &url)?
            } else {
                canonicalize(&url)?
            };

            let request = match (navigate, image) {
                (true, _) => InterceptedRequest::navigate(url),
                (_, true) => InterceptedRequest::image(url),
                _ => InterceptedRequest::get(url),
            }
            .with_method(method);

            match router.on_intercept(&request).await {
                Interception::Respond(response) => print_json(&ResponseView::from(response)),
                Interception::NoResponse => print_json(&json!({ "response": null })),
                Interception::PassThrough => print_json(&json!({ "intercepted": false })),
            }
        }
    }
}

pub async fn notify(app: &App, command: NotifyCommand) -> Result<()> {
    match command {
        NotifyCommand::Init => print_json(&app.subscriptions(false).initialize().await?),
        NotifyCommand::Subscribe { grant } => print_json(&app.subscriptions(grant).subscribe().await?),
        NotifyCommand::Unsubscribe => print_json(&app.subscriptions(false).unsubscribe().await?),
        NotifyCommand::Status => print_json(&app.subscriptions(false).status().await?),
        NotifyCommand::Message { payload, action } => {
            let message = PushMessage::from_payload(payload.as_deref().map(str::as_bytes));
            let opens = message.click_target(action.as_deref()).map(str::to_string);
            print_json(&json!({ "notification": message, "opens": opens }))
        }
    }
}
