use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use swiftsell_auth::{AuthGateway, PlatformRegistry, StubIdentityProvider};
use swiftsell_core::{Workflow, WorkflowState};
use swiftsell_provider::{
    assistant_client_from_config, listing_client_from_config, ImageBlob,
};
use swiftsell_schema::{
    AdminKeys, AppConfig, AuthProviderKind, ChatMessage, ItemData, PlatformId,
};
use swiftsell_store::{PreferenceStore, SqliteStore, ADMIN_API_KEYS_KEY};

/// The capture surface allows up to three photos per item.
const MAX_IMAGES: usize = 3;

#[derive(Parser)]
#[command(name = "swiftsell", version, about = "Snap an item, draft a listing, post it")]
struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Analyze item photos and print the drafted listing")]
    Analyze {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    #[command(about = "Full flow: analyze, approve the draft, list on platforms")]
    Sell {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long, value_delimiter = ',', required = true, help = "Platform ids, e.g. shopify,ebay")]
        platforms: Vec<PlatformId>,
    },
    #[command(about = "Ask the in-app assistant a question (no question opens a REPL)")]
    Assistant { question: Vec<String> },
    #[command(about = "Sign in with an identity provider")]
    Login {
        #[arg(long, default_value = "google")]
        provider: AuthProviderKind,
    },
    #[command(about = "Sign out and clear the persisted profile")]
    Logout,
    #[command(about = "Start connecting a marketplace")]
    Connect { platform: PlatformId },
    #[command(about = "Complete a pending marketplace connection")]
    Complete { platform: PlatformId },
    #[command(about = "Disconnect a marketplace")]
    Disconnect { platform: PlatformId },
    #[command(about = "List marketplaces and their connection state")]
    Platforms,
    #[command(about = "Admin credential overrides", subcommand)]
    Keys(KeysCommand),
}

#[derive(Subcommand)]
enum KeysCommand {
    #[command(about = "Show which override keys are set")]
    Show,
    #[command(about = "Set override keys (only provided flags change)")]
    Set {
        #[arg(long)]
        gemini_api_key: Option<String>,
        #[arg(long)]
        google_client_id: Option<String>,
        #[arg(long)]
        facebook_app_id: Option<String>,
        #[arg(long)]
        shopify_api_key: Option<String>,
        #[arg(long)]
        ebay_client_id: Option<String>,
        #[arg(long)]
        amazon_client_id: Option<String>,
        #[arg(long)]
        etsy_client_id: Option<String>,
    },
    #[command(about = "Remove all override keys")]
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    let store = Arc::new(
        SqliteStore::open(store_path(&config)).context("failed to open preference store")?,
    );
    apply_admin_overrides(&mut config, store.as_ref()).await;

    match cli.command {
        Commands::Analyze { images } => run_analyze(&config, &images).await,
        Commands::Sell { images, platforms } => {
            run_sell(&config, store, &images, platforms).await
        }
        Commands::Assistant { question } => run_assistant(&config, &question.join(" ")).await,
        Commands::Login { provider } => {
            let gateway = gateway(&config, store);
            let profile = gateway.sign_in(provider).await?;
            println!(
                "Signed in as {} ({})",
                profile.display_name.as_deref().unwrap_or(&profile.uid),
                profile.email.as_deref().unwrap_or("no email")
            );
            Ok(())
        }
        Commands::Logout => {
            let gateway = gateway(&config, store);
            gateway.initialize().await;
            gateway.sign_out().await?;
            println!("Signed out.");
            Ok(())
        }
        Commands::Connect { platform } => run_connect(&config, store, platform).await,
        Commands::Complete { platform } => {
            let gateway = signed_in_gateway(&config, store).await?;
            gateway.complete_connection(platform).await?;
            println!("{platform} connected.");
            Ok(())
        }
        Commands::Disconnect { platform } => {
            let gateway = signed_in_gateway(&config, store).await?;
            gateway.disconnect(platform).await?;
            println!("{platform} disconnected.");
            Ok(())
        }
        Commands::Platforms => run_platforms(&config, store).await,
        Commands::Keys(command) => run_keys(store.as_ref(), command).await,
    }
}

fn gateway(config: &AppConfig, store: Arc<SqliteStore>) -> AuthGateway {
    AuthGateway::new(
        store,
        Arc::new(StubIdentityProvider),
        PlatformRegistry::from_config(config),
    )
}

async fn signed_in_gateway(config: &AppConfig, store: Arc<SqliteStore>) -> Result<AuthGateway> {
    let gateway = gateway(config, store);
    gateway.initialize().await;
    Ok(gateway)
}

fn store_path(config: &AppConfig) -> PathBuf {
    if let Some(path) = &config.store_path {
        return path.clone();
    }
    if let Some(home) = std::env::var_os("HOME") {
        let dir = PathBuf::from(home).join(".swiftsell");
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir.join("prefs.db");
        }
    }
    PathBuf::from("swiftsell-prefs.db")
}

async fn apply_admin_overrides(config: &mut AppConfig, store: &dyn PreferenceStore) {
    let stored = match store.get(ADMIN_API_KEYS_KEY).await {
        Ok(Some(value)) => value,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read admin key overrides");
            return;
        }
    };
    match serde_json::from_str::<AdminKeys>(&stored) {
        Ok(keys) => config.apply_admin_overrides(&keys),
        Err(err) => tracing::warn!(error = %err, "admin key overrides are unreadable, ignoring"),
    }
}

async fn run_analyze(config: &AppConfig, images: &[PathBuf]) -> Result<()> {
    let blobs = load_images(images)?;
    let workflow = Workflow::new(listing_client_from_config(config));
    let snapshot = workflow.analyze(&blobs).await;
    if let Some(error) = snapshot.error {
        bail!(error);
    }
    let item = snapshot
        .item
        .context("analysis finished without a draft")?;
    print_draft(&item, &snapshot.sources);
    Ok(())
}

async fn run_sell(
    config: &AppConfig,
    store: Arc<SqliteStore>,
    images: &[PathBuf],
    platforms: Vec<PlatformId>,
) -> Result<()> {
    let blobs = load_images(images)?;
    let gateway = signed_in_gateway(config, store).await?;
    let profile = gateway.current_user().await;

    // Platforms that need a one-time connect are skipped until connected,
    // same as the selector surface does.
    let mut selected = BTreeSet::new();
    for platform in platforms {
        let needs_connection = gateway.registry().spec(platform).requires_authorization();
        let connected = profile
            .as_ref()
            .map(|p| p.is_connected(platform))
            .unwrap_or(false);
        if needs_connection && !connected {
            println!("Skipping {platform}: connection required (run `swiftsell connect {platform}`)");
        } else {
            selected.insert(platform);
        }
    }
    if selected.is_empty() {
        bail!("none of the selected platforms are ready to list on");
    }

    let workflow = Workflow::new(listing_client_from_config(config));
    let snapshot = workflow.analyze(&blobs).await;
    if let Some(error) = snapshot.error {
        bail!(error);
    }
    let item = snapshot
        .item
        .clone()
        .context("analysis finished without a draft")?;
    print_draft(&item, &snapshot.sources);

    workflow.approve(item).await;
    let snapshot = workflow.list(selected).await;
    match snapshot.state {
        WorkflowState::Complete => {
            let listed: Vec<String> = snapshot
                .listed_platforms
                .iter()
                .map(|p| p.to_string())
                .collect();
            println!("Listing successful! Your item has been posted to: {}.", listed.join(", "));
            Ok(())
        }
        state => bail!("listing did not complete (state {state:?})"),
    }
}

async fn run_assistant(config: &AppConfig, question: &str) -> Result<()> {
    let client = assistant_client_from_config(config);
    if !question.is_empty() {
        let history = vec![ChatMessage::user(question)];
        let reply = client.respond(&history).await?;
        println!("{reply}");
        return Ok(());
    }

    // REPL over one assistant session. Blank line or ctrl-d exits.
    let mut history: Vec<ChatMessage> = Vec::new();
    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::Write::flush(&mut std::io::stdout())?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() || line == "exit" {
            break;
        }
        history.push(ChatMessage::user(line));
        match client.respond(&history).await {
            Ok(reply) => {
                println!("assistant> {reply}");
                history.push(ChatMessage::assistant(reply));
            }
            Err(err) => {
                history.pop();
                eprintln!("assistant error: {err}");
            }
        }
    }
    Ok(())
}

async fn run_connect(
    config: &AppConfig,
    store: Arc<SqliteStore>,
    platform: PlatformId,
) -> Result<()> {
    let gateway = signed_in_gateway(config, store).await?;
    let state = gateway.connect(platform).await?;
    match state {
        swiftsell_schema::ConnectionState::Pending => {
            println!(
                "Authorization started for {platform}. Finish with `swiftsell complete {platform}` \
once you approved access."
            );
        }
        _ => println!("{platform} connected."),
    }
    Ok(())
}

async fn run_platforms(config: &AppConfig, store: Arc<SqliteStore>) -> Result<()> {
    let gateway = signed_in_gateway(config, store).await?;
    let profile = gateway.current_user().await;
    match &profile {
        Some(profile) => println!(
            "Signed in as {}",
            profile.display_name.as_deref().unwrap_or(&profile.uid)
        ),
        None => println!("Not signed in."),
    }
    for spec in gateway.registry().all() {
        let state = profile
            .as_ref()
            .map(|p| p.connection(spec.id))
            .unwrap_or_default();
        let note = if spec.requires_authorization() {
            " (connection required)"
        } else {
            ""
        };
        println!("  {:<22} {:?}{}", spec.name, state, note);
    }
    Ok(())
}

async fn run_keys(store: &dyn PreferenceStore, command: KeysCommand) -> Result<()> {
    match command {
        KeysCommand::Show => {
            let keys = load_admin_keys(store).await?;
            let entries = [
                ("gemini_api_key", &keys.gemini_api_key),
                ("google_client_id", &keys.google_client_id),
                ("facebook_app_id", &keys.facebook_app_id),
                ("shopify_api_key", &keys.shopify_api_key),
                ("ebay_client_id", &keys.ebay_client_id),
                ("amazon_client_id", &keys.amazon_client_id),
                ("etsy_client_id", &keys.etsy_client_id),
            ];
            for (name, value) in entries {
                // Never echo credential material back.
                let shown = if value.is_some() { "set" } else { "-" };
                println!("  {name:<20} {shown}");
            }
            Ok(())
        }
        KeysCommand::Set {
            gemini_api_key,
            google_client_id,
            facebook_app_id,
            shopify_api_key,
            ebay_client_id,
            amazon_client_id,
            etsy_client_id,
        } => {
            let mut keys = load_admin_keys(store).await?;
            merge(&mut keys.gemini_api_key, gemini_api_key);
            merge(&mut keys.google_client_id, google_client_id);
            merge(&mut keys.facebook_app_id, facebook_app_id);
            merge(&mut keys.shopify_api_key, shopify_api_key);
            merge(&mut keys.ebay_client_id, ebay_client_id);
            merge(&mut keys.amazon_client_id, amazon_client_id);
            merge(&mut keys.etsy_client_id, etsy_client_id);
            store
                .set(ADMIN_API_KEYS_KEY, &serde_json::to_string(&keys)?)
                .await?;
            println!("Override keys saved.");
            Ok(())
        }
        KeysCommand::Clear => {
            store.remove(ADMIN_API_KEYS_KEY).await?;
            println!("Override keys cleared.");
            Ok(())
        }
    }
}

async fn load_admin_keys(store: &dyn PreferenceStore) -> Result<AdminKeys> {
    match store.get(ADMIN_API_KEYS_KEY).await? {
        Some(value) => Ok(serde_json::from_str(&value).unwrap_or_default()),
        None => Ok(AdminKeys::default()),
    }
}

fn merge(field: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *field = value;
    }
}

fn load_images(paths: &[PathBuf]) -> Result<Vec<ImageBlob>> {
    if paths.len() > MAX_IMAGES {
        bail!("select at most {MAX_IMAGES} images");
    }
    paths
        .iter()
        .map(|path| {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read image {}", path.display()))?;
            Ok(ImageBlob::new(data, mime_for_path(path)))
        })
        .collect()
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

fn print_draft(item: &ItemData, sources: &[swiftsell_schema::GroundingChunk]) {
    println!("Title:       {}", item.title);
    println!("Price:       ${:.2}", item.price);
    println!("Description: {}", item.description);
    if !sources.is_empty() {
        println!("Price sources:");
        for source in sources {
            println!(
                "  - {} {}",
                source.title.as_deref().unwrap_or("(untitled)"),
                source.uri.as_deref().unwrap_or("")
            );
        }
    }
}
