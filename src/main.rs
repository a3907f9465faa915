use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use grocer::app::{App, AppEvent};
use grocer::config::Config;
use grocer::sheets::SheetsClient;
use grocer::state::{
    catalog_rows, generate_share_text, orphaned_entries, share_message, Columns, ListEntry,
    SHARE_TITLE,
};
use grocer::storage::{Database, DatabaseError};
use grocer::util::{fit_width, sanitize_line};

/// Column width for item names in listings.
const NAME_WIDTH: usize = 32;

/// Get the config directory path (~/.config/grocer/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("grocer"))
}

#[derive(Parser, Debug)]
#[command(name = "grocer", about = "Grocery list built from a shared spreadsheet catalog")]
struct Args {
    /// Config file (defaults to ~/.config/grocer/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sheet source from the config file to fetch the catalog from
    #[arg(long, value_name = "NAME")]
    source: Option<String>,

    /// Reset database (delete and recreate), forgetting the saved list and name
    #[arg(long)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the catalog and show its items
    Items {
        /// Only show items whose name contains this text
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Add catalog items to the list by id (repeat adds bump the quantity)
    Add {
        #[arg(required = true, value_name = "ID")]
        ids: Vec<String>,
    },
    /// Increase an item's quantity by one
    Inc { id: String },
    /// Decrease an item's quantity by one (never below 1)
    Dec { id: String },
    /// Remove an item from the list
    Remove { id: String },
    /// Remove everything from the list
    Clear {
        /// Don't ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Show the list
    List,
    /// Print the list formatted for sharing
    Share {
        /// Print only the numbered lines
        #[arg(long)]
        preview: bool,
    },
    /// Set your display name
    Name { name: String },
    /// Show your display name
    Whoami,
}

impl Command {
    fn needs_catalog(&self) -> bool {
        matches!(self, Command::Items { .. } | Command::Add { .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // User-only access to the directory holding the database
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config_dir.join("grocer.db");
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of grocer appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let columns = Columns {
        id: config.id_column.clone(),
        name: config.name_column.clone(),
    };
    let mut app = App::new(db, columns);

    // The catalog fetch runs while persisted state is restored
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(4);
    if args.command.needs_catalog() {
        let source_name = args.source.as_deref().unwrap_or(&config.default_source);
        let http = reqwest::Client::builder()
            .user_agent(concat!("grocer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let client = SheetsClient::from_config(http, &config, source_name).with_context(|| {
            format!(
                "Add a [sources.{}] table to {} to fetch the catalog",
                source_name,
                config_path.display()
            )
        })?;
        tracing::debug!(?client, "Starting catalog ingestion");
        app.start_ingestion(Arc::new(client), event_tx);
    }

    app.hydrate().await?;

    if args.command.needs_catalog() {
        app.wait_for_catalog(&mut event_rx).await;
        if let Some(err) = app.catalog().status().error() {
            anyhow::bail!("Failed to fetch the catalog: {}", err);
        }
    }

    run_command(&mut app, args.command).await
}

async fn run_command(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Items { search } => {
            greet(app);
            if let Some(query) = search {
                app.set_search_query(query);
            }
            print_catalog(app);
        }
        Command::Add { ids } => {
            for id in &ids {
                if app.add_by_id(id).await {
                    let qty = app.list().quantity_of(id).unwrap_or(1);
                    let name = app.catalog().find(id).map(|e| e.name.as_str()).unwrap_or("");
                    println!("Added {} (now {})", sanitize_line(name), qty);
                } else {
                    eprintln!("No catalog item with id {:?}", id);
                }
            }
        }
        Command::Inc { id } => {
            app.increment_quantity(&id).await;
            report_quantity(app, &id);
        }
        Command::Dec { id } => {
            app.decrement_quantity(&id).await;
            report_quantity(app, &id);
        }
        Command::Remove { id } => {
            app.remove_from_list(&id).await;
            println!("{} item(s) on your list", app.list().count());
        }
        Command::Clear { yes } => {
            if app.list().count() == 0 {
                println!("Your list is already empty");
            } else if yes || confirm("Are you sure you want to clear the entire list?")? {
                app.clear_list().await;
                println!("List cleared");
            }
        }
        Command::List => {
            greet(app);
            print_list(app.list().entries());
        }
        Command::Share { preview } => {
            let entries = app.list().entries();
            if entries.is_empty() {
                println!("Your list is empty");
            } else if preview {
                println!("{}", sanitize_line_block(&generate_share_text(entries)));
            } else {
                println!("{}\n", SHARE_TITLE);
                println!("{}", sanitize_line_block(&share_message(entries)));
            }
        }
        Command::Name { name } => {
            if name.trim().is_empty() {
                anyhow::bail!("Name cannot be blank");
            }
            app.set_name(&name).await;
            greet(app);
        }
        Command::Whoami => match app.identity().name() {
            Some(name) => println!("{}", sanitize_line(name)),
            None => println!("No name set. Use `grocer name <NAME>`."),
        },
    }
    Ok(())
}

fn greet(app: &App) {
    match app.identity().name() {
        Some(name) => println!("Hi, {}!", sanitize_line(name)),
        None => eprintln!("Tip: set your name with `grocer name <NAME>`"),
    }
}

fn print_catalog(app: &App) {
    let rows = catalog_rows(app.catalog(), app.list());
    if rows.is_empty() {
        if app.catalog().search_query().trim().is_empty() {
            println!("The catalog is empty");
        } else {
            println!("No items match {:?}", app.catalog().search_query().trim());
        }
        return;
    }

    for row in &rows {
        let marker = match row.in_list {
            Some(qty) => format!("✓ x{}", qty),
            None => String::new(),
        };
        println!(
            "{} #{:<8} {}",
            fit_width(&sanitize_line(&row.entry.name), NAME_WIDTH),
            sanitize_line(&row.entry.id),
            marker
        );
    }

    let orphans = orphaned_entries(app.catalog(), app.list());
    if !orphans.is_empty() {
        println!(
            "\n{} list item(s) are no longer in the catalog",
            orphans.len()
        );
    }
    println!("\n{} item(s) on your list", app.list().count());
}

fn print_list(entries: &[ListEntry]) {
    if entries.is_empty() {
        println!("Your list is empty");
        println!("Add items with `grocer add <ID>`");
        return;
    }

    for (idx, entry) in entries.iter().enumerate() {
        println!(
            "{:>3}. {} x{:<4} #{}",
            idx + 1,
            fit_width(&sanitize_line(&entry.name), NAME_WIDTH),
            entry.quantity,
            sanitize_line(&entry.id)
        );
    }
    println!("\n{} item(s)", entries.len());
}

fn report_quantity(app: &App, id: &str) {
    match app.list().quantity_of(id) {
        Some(qty) => println!("{} x{}", id, qty),
        None => eprintln!("{:?} is not on your list", id),
    }
}

/// Sanitize each line of a multi-line block, keeping the line breaks.
fn sanitize_line_block(text: &str) -> String {
    text.lines()
        .map(|line| sanitize_line(line).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}
