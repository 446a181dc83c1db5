//! KapTaze CLI - drive the client store from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in with a token issued by the backend
//! kaptaze session login -e ayse@example.com -t "$TOKEN"
//!
//! # Browse and favorite restaurants
//! kaptaze restaurants list
//! kaptaze favorites add 64f1c2...
//!
//! # Reserve two bags, then push anything placed offline
//! kaptaze orders place -r 64f1c2... -p 64f1d9... -q 2
//! kaptaze orders sync
//! ```
//!
//! # Commands
//!
//! - `session` - Show, start or end the session
//! - `restaurants` - Read the restaurant catalog
//! - `favorites` - Manage favorite restaurants
//! - `orders` - Place and manage orders
//! - `stats` - Show savings and impact
//!
//! Configuration comes from `KAPTAZE_*` environment variables (see
//! `kaptaze_client::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand, ValueEnum};

use kaptaze_client::ClientContext;
use kaptaze_client::config::ClientConfig;
use kaptaze_client::telemetry::init_tracing;
use kaptaze_core::PaymentMethod;

mod commands;

#[derive(Parser)]
#[command(name = "kaptaze")]
#[command(author, version, about = "KapTaze client tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show, start or end the session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Read the restaurant catalog
    Restaurants {
        #[command(subcommand)]
        action: RestaurantAction,
    },
    /// Manage favorite restaurants
    Favorites {
        #[command(subcommand)]
        action: FavoriteAction,
    },
    /// Place and manage orders
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Show savings and impact of completed orders
    Stats,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show the signed-in user
    Show,
    /// Sign in with an externally issued token
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Bearer token
        #[arg(short, long)]
        token: String,
    },
    /// Sign out
    Logout,
}

#[derive(Subcommand)]
enum RestaurantAction {
    /// List active restaurants
    List,
    /// Show one restaurant and its bags
    Show {
        /// Restaurant ID
        id: String,
    },
}

#[derive(Subcommand)]
enum FavoriteAction {
    /// List favorite restaurants
    List,
    /// Add a restaurant to favorites
    Add {
        /// Restaurant ID
        restaurant_id: String,
    },
    /// Remove a restaurant from favorites
    Remove {
        /// Restaurant ID
        restaurant_id: String,
    },
    /// Add or remove a restaurant
    Toggle {
        /// Restaurant ID
        restaurant_id: String,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// List orders, newest first
    List,
    /// Reserve surprise bags
    Place {
        /// Restaurant ID
        #[arg(short, long)]
        restaurant: String,

        /// Package ID
        #[arg(short, long)]
        package: String,

        /// Number of bags
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// How the order is paid at pickup
        #[arg(long, value_enum, default_value_t = Payment::Card)]
        payment: Payment,

        /// Note for the restaurant
        #[arg(long)]
        notes: Option<String>,
    },
    /// Retry orders that never reached the backend
    Sync,
    /// Pull current statuses from the order history
    Refresh,
    /// Cancel a pending order
    Cancel {
        /// Order ID
        id: String,
    },
    /// Mark an order as picked up
    Received {
        /// Order ID
        id: String,
    },
    /// Rate a completed order
    Rate {
        /// Order ID
        id: String,

        /// Stars, 1 to 5
        #[arg(short, long)]
        stars: u8,

        /// Optional comment
        #[arg(short, long, default_value = "")]
        comment: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Payment {
    Cash,
    Card,
    Mobile,
}

impl From<Payment> for PaymentMethod {
    fn from(payment: Payment) -> Self {
        match payment {
            Payment::Cash => Self::Cash,
            Payment::Card => Self::CreditCard,
            Payment::Mobile => Self::MobilePayment,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    init_tracing(&config.log);

    let ctx = ClientContext::from_config(config)?;
    ctx.bootstrap().await;

    match cli.command {
        Commands::Session { action } => match action {
            SessionAction::Show => commands::session::show(&ctx).await,
            SessionAction::Login { email, name, token } => {
                commands::session::login(&ctx, &email, name, token).await?;
            }
            SessionAction::Logout => commands::session::logout(&ctx).await,
        },
        Commands::Restaurants { action } => match action {
            RestaurantAction::List => commands::catalog::list_restaurants(&ctx).await?,
            RestaurantAction::Show { id } => commands::catalog::show_restaurant(&ctx, &id).await?,
        },
        Commands::Favorites { action } => match action {
            FavoriteAction::List => commands::catalog::list_favorites(&ctx).await,
            FavoriteAction::Add { restaurant_id } => {
                commands::catalog::add_favorite(&ctx, &restaurant_id).await?;
            }
            FavoriteAction::Remove { restaurant_id } => {
                commands::catalog::remove_favorite(&ctx, &restaurant_id).await?;
            }
            FavoriteAction::Toggle { restaurant_id } => {
                commands::catalog::toggle_favorite(&ctx, &restaurant_id).await?;
            }
        },
        Commands::Orders { action } => match action {
            OrderAction::List => commands::orders::list(&ctx).await,
            OrderAction::Place {
                restaurant,
                package,
                quantity,
                payment,
                notes,
            } => {
                commands::orders::place(&ctx, &restaurant, &package, quantity, payment.into(), notes)
                    .await?;
            }
            OrderAction::Sync => commands::orders::sync(&ctx).await,
            OrderAction::Refresh => commands::orders::refresh(&ctx).await,
            OrderAction::Cancel { id } => commands::orders::cancel(&ctx, &id).await?,
            OrderAction::Received { id } => commands::orders::received(&ctx, &id).await?,
            OrderAction::Rate { id, stars, comment } => {
                commands::orders::rate(&ctx, &id, stars, &comment).await?;
            }
        },
        Commands::Stats => commands::orders::stats(&ctx).await,
    }
    Ok(())
}
