//! Shop Sync CLI - drive the catalog cache and cart ledger from a terminal.
//!
//! State is persisted under `SHOP_SYNC_STATE_DIR`, so consecutive invocations
//! behave like consecutive page visits of one browser session.
//!
//! # Usage
//!
//! ```bash
//! # Seed page 1 and the product count from the catalog
//! shop-sync catalog hydrate
//!
//! # Show page 3 (walks the cursor chain from the last known page)
//! shop-sync catalog page 3
//!
//! # Put two units of product 101 in the cart and show the priced cart
//! shop-sync cart add 101
//! shop-sync cart add 101
//! shop-sync cart show
//! ```
//!
//! # Commands
//!
//! - `catalog hydrate|page|next|prev|count` - Catalog navigation
//! - `cart add|decrease|set|remove|clear|show` - Cart ledger operations

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use shop_sync::{ShopState, SyncConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "shop-sync")]
#[command(author, version, about = "Shop Sync catalog and cart tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the product catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Manage the persisted cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Replace page 1 and the product count with fresh data
    Hydrate,
    /// Show a catalog page
    Page {
        /// Page number, starting at 1
        page: u32,
    },
    /// Show the page after the current one
    Next,
    /// Show the page before the current one
    Prev,
    /// Fetch the total product count
    Count,
}

#[derive(Subcommand)]
enum CartAction {
    /// Add one unit of a product
    Add {
        /// Numeric product ID
        product_id: i64,
    },
    /// Remove one unit of a product
    Decrease {
        /// Numeric product ID
        product_id: i64,
    },
    /// Set the quantity of a product (0 or less removes it)
    Set {
        /// Numeric product ID
        product_id: i64,
        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a product from the cart
    Remove {
        /// Numeric product ID
        product_id: i64,
    },
    /// Empty the cart
    Clear,
    /// Show priced cart lines and the subtotal
    Show,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shop_sync=info,shop_sync_cli=info".into());

    // JSON for log shippers, text otherwise
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &SyncConfig) -> Result<(), CommandError> {
    let shop = ShopState::connect(config)?;

    match cli.command {
        Commands::Catalog { action } => match action {
            CatalogAction::Hydrate => commands::catalog::hydrate(&shop).await?,
            CatalogAction::Page { page } => commands::catalog::page(&shop, page).await?,
            CatalogAction::Next => commands::catalog::next(&shop).await?,
            CatalogAction::Prev => commands::catalog::prev(&shop).await?,
            CatalogAction::Count => commands::catalog::count(&shop).await?,
        },
        Commands::Cart { action } => {
            match action {
                CartAction::Add { product_id } => commands::cart::add(&shop, product_id)?,
                CartAction::Decrease { product_id } => {
                    commands::cart::decrease(&shop, product_id)?;
                }
                CartAction::Set {
                    product_id,
                    quantity,
                } => commands::cart::set(&shop, product_id, quantity)?,
                CartAction::Remove { product_id } => commands::cart::remove(&shop, product_id)?,
                CartAction::Clear => commands::cart::clear(&shop)?,
                CartAction::Show => {}
            }
            commands::cart::show(&shop).await;
        }
    }
    Ok(())
}
