//! Binary entry point for the menugraph CLI and HTTP server.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use menugraph::{
    classifier::WeightOverrides,
    config::Config,
    hybrid::DEFAULT_RESULT_LIMIT,
    import::{self, ImportConfig, ImportStatus, NewOrder, NewOrderLine},
    logging,
    server::{self, ServerOptions},
    ApplyOutcome, Item, Recommendation, RecommendationService, SqliteGraphStore, User,
};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Parser, Debug)]
#[command(
    name = "menugraph",
    version,
    about = "Restaurant menu recommendations over an order graph",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Config file to load")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DB", help = "Override the database path")]
    db: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILTER", help = "Override the log filter")]
    log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Replace the graph with the CSV files in a directory")]
    Import {
        #[arg(long, value_name = "DIR", help = "Directory holding the CSV files")]
        data_dir: Option<PathBuf>,
    },
    #[command(about = "Recompute every derived edge")]
    Rebuild,
    #[command(about = "Fold one recorded order into the derived edges")]
    ApplyOrder {
        #[arg(value_name = "ORDER_ID")]
        order_id: i64,
    },
    #[command(about = "Record a new order")]
    Order(OrderCmd),
    #[command(subcommand, about = "Run a recommendation strategy")]
    Recommend(RecommendCmd),
    #[command(about = "Print node and derived edge counts")]
    Status,
    #[command(about = "List menu items")]
    Items {
        #[arg(long, help = "Only items of this category")]
        category: Option<String>,
    },
    #[command(about = "List users")]
    Users,
    #[command(about = "Serve the JSON API")]
    Serve(ServeCmd),
}

#[derive(Args, Debug)]
struct OrderCmd {
    #[arg(long, help = "New order id")]
    id: i64,

    #[arg(long, help = "Ordering user id")]
    user: i64,

    #[arg(
        long,
        value_name = "TIMESTAMP",
        value_parser = parse_time,
        help = "Placement time (defaults to now)"
    )]
    at: Option<OffsetDateTime>,

    #[arg(
        long = "item",
        value_name = "ID[:QTY]",
        value_parser = parse_line,
        action = ArgAction::Append,
        required = true,
        help = "Line item (repeatable)"
    )]
    items: Vec<NewOrderLine>,

    #[arg(long, help = "Also update the derived edges")]
    apply: bool,
}

#[derive(Subcommand, Debug)]
enum RecommendCmd {
    #[command(about = "Items the user orders most")]
    Frequent {
        #[arg(value_name = "USER_ID")]
        user_id: i64,
    },
    #[command(about = "Items the user orders together with an item")]
    CoOrders {
        #[arg(value_name = "USER_ID")]
        user_id: i64,
        #[arg(value_name = "ITEM_ID")]
        item_id: i64,
    },
    #[command(about = "Items everyone orders together with an item")]
    Global {
        #[arg(value_name = "ITEM_ID")]
        item_id: i64,
    },
    #[command(about = "Items in recent orders")]
    Trending {
        #[arg(long, default_value_t = 7, help = "Look-back window in days")]
        days: i64,
    },
    #[command(about = "Weighted blend of every strategy")]
    Hybrid(HybridCmd),
}

#[derive(Args, Debug)]
struct HybridCmd {
    #[arg(value_name = "USER_ID")]
    user_id: i64,

    #[arg(long, value_name = "ITEM_ID", help = "Item currently in the cart")]
    item_in_cart: Option<i64>,

    #[arg(long, default_value_t = DEFAULT_RESULT_LIMIT, help = "Maximum results")]
    limit: usize,

    #[arg(long, help = "Override the user frequency weight")]
    user_freq: Option<String>,

    #[arg(long, help = "Override the user co-orders weight")]
    user_co_orders: Option<String>,

    #[arg(long, help = "Override the global co-orders weight")]
    global_co_orders: Option<String>,

    #[arg(long, help = "Override the time trend weight")]
    time_trend: Option<String>,
}

#[derive(Args, Debug)]
struct ServeCmd {
    #[arg(long, value_name = "HOST", help = "Bind address host")]
    host: Option<String>,

    #[arg(long, value_name = "PORT", help = "Bind port")]
    port: Option<u16>,

    #[arg(
        long = "allow-origin",
        value_name = "ORIGIN",
        action = ArgAction::Append,
        help = "Additional CORS origin to allow (repeatable)"
    )]
    allow_origins: Vec<String>,

    #[arg(long, help = "Import the configured data directory before serving")]
    import: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    logging::init_logging(&config.log.level)?;

    let store = SqliteGraphStore::open(&config.database.path)?;
    let service = Arc::new(RecommendationService::new(Arc::new(store)));
    let format = cli.format;

    match cli.command {
        Command::Import { data_dir } => {
            let dir = data_dir.unwrap_or_else(|| config.import.data_dir.clone());
            let summary = service.import(&ImportConfig::from_dir(&dir))?;
            emit(format, &summary, || {
                println!(
                    "Imported {} users, {} items, {} orders ({} lines)",
                    summary.users, summary.items, summary.orders, summary.order_lines
                );
                println!(
                    "Derived {} HAS_ORDERED edges and {} co-ordered pairs",
                    summary.derived.has_ordered, summary.derived.co_occurring_pairs
                );
            })?;
        }
        Command::Rebuild => {
            let summary = service.rebuild_all()?;
            emit(format, &summary, || {
                println!(
                    "Rebuilt {} HAS_ORDERED edges and {} co-ordered pairs from {} orders",
                    summary.has_ordered, summary.co_occurring_pairs, summary.orders_processed
                );
            })?;
        }
        Command::ApplyOrder { order_id } => {
            let outcome = service.apply_new_order(order_id)?;
            emit(format, &outcome, || print_outcome(order_id, &outcome))?;
        }
        Command::Order(cmd) => {
            let order = NewOrder {
                id: cmd.id,
                user_id: cmd.user,
                created_at: cmd.at.unwrap_or_else(OffsetDateTime::now_utc),
                lines: cmd.items,
            };
            service.record_order(&order)?;
            println!("Recorded order {} for user {}", order.id, order.user_id);
            if cmd.apply {
                let outcome = service.apply_new_order(order.id)?;
                emit(format, &outcome, || print_outcome(order.id, &outcome))?;
            }
        }
        Command::Recommend(cmd) => run_recommend(&service, cmd, format)?,
        Command::Status => {
            let status = service.import_status()?;
            emit(format, &status, || print_status(&status))?;
        }
        Command::Items { category } => {
            let items = match category.as_deref() {
                Some(category) => service.items_by_category(category)?,
                None => service.all_items()?,
            };
            emit(format, &items, || print_items(&items))?;
        }
        Command::Users => {
            let users = service.all_users()?;
            emit(format, &users, || print_users(&users))?;
        }
        Command::Serve(cmd) => {
            if cmd.import {
                service.import(&ImportConfig::from_dir(&config.import.data_dir))?;
                let status = service.import_status()?;
                tracing::info!(?status, "import finished");
            }
            let mut allow_origins = config.server.allow_origins.clone();
            allow_origins.extend(cmd.allow_origins);
            let options = ServerOptions {
                host: cmd.host.unwrap_or_else(|| config.server.host.clone()),
                port: cmd.port.unwrap_or(config.server.port),
                allow_origins,
            };
            if let Err(err) = server::serve(service, options).await {
                eprintln!("server terminated: {err}");
                return Err(Box::new(err));
            }
        }
    }
    Ok(())
}

fn run_recommend(
    service: &RecommendationService,
    cmd: RecommendCmd,
    format: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    let recommendations = match cmd {
        RecommendCmd::Frequent { user_id } => service.user_frequent_items(user_id)?,
        RecommendCmd::CoOrders { user_id, item_id } => {
            service.user_co_ordered_items(user_id, item_id)?
        }
        RecommendCmd::Global { item_id } => service.global_co_ordered_items(item_id)?,
        RecommendCmd::Trending { days } => service.trending_items(days)?,
        RecommendCmd::Hybrid(args) => {
            let overrides = WeightOverrides::parse(
                args.user_freq.as_deref(),
                args.user_co_orders.as_deref(),
                args.global_co_orders.as_deref(),
                args.time_trend.as_deref(),
            );
            let weights = overrides.apply(service.weights_for_user(args.user_id));
            let mut recommendations =
                service.hybrid_recommendation(args.user_id, args.item_in_cart, &weights);
            recommendations.truncate(args.limit);
            recommendations
        }
    };
    emit(format, &recommendations, || {
        print_recommendations(&recommendations)
    })
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_outcome(order_id: i64, outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::Applied { items, pairs } => {
            println!("Applied order {order_id}: {items} items, {pairs} co-ordered pairs")
        }
        ApplyOutcome::AlreadyApplied => println!("Order {order_id} was already applied"),
    }
}

fn print_status(status: &ImportStatus) {
    println!("Users:               {}", status.users);
    println!("Items:               {}", status.items);
    println!("Orders:              {}", status.orders);
    println!("HAS_ORDERED:         {}", status.has_ordered);
    println!("ORDERED_ALONG_WITH:  {}", status.ordered_along_with);
}

fn print_items(items: &[Item]) {
    for item in items {
        println!(
            "{:>6}  {:<32} {:>8.2}  {}",
            item.id, item.name, item.price, item.category
        );
    }
}

fn print_users(users: &[User]) {
    for user in users {
        println!("{:>6}  {:<24} {}", user.id, user.name, user.email);
    }
}

fn print_recommendations(recommendations: &[Recommendation]) {
    if recommendations.is_empty() {
        println!("No recommendations");
        return;
    }
    for (rank, rec) in recommendations.iter().enumerate() {
        println!(
            "{:>2}. {:<32} score={:<8.3} [{}] {}",
            rank + 1,
            rec.item.name,
            rec.score,
            rec.strategy,
            rec.explanation
        );
    }
}

fn parse_time(raw: &str) -> Result<OffsetDateTime, String> {
    import::parse_timestamp(raw).ok_or_else(|| format!("'{raw}' is not a timestamp"))
}

fn parse_line(raw: &str) -> Result<NewOrderLine, String> {
    let (id, quantity) = match raw.split_once(':') {
        Some((id, quantity)) => (id, quantity),
        None => (raw, "1"),
    };
    let item_id = id
        .trim()
        .parse()
        .map_err(|_| format!("'{id}' is not an item id"))?;
    let quantity = quantity
        .trim()
        .parse()
        .map_err(|_| format!("'{quantity}' is not a quantity"))?;
    Ok(NewOrderLine { item_id, quantity })
}
