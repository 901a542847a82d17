//! # Archi Graph CLI (`archi-graph`)
//!
//! ## Usage
//!
//! ```bash
//! archi-graph --config ./config/archi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `archi-graph init` | Create the SQLite database and run schema migrations |
//! | `archi-graph serve` | Start the graph editor HTTP server |
//! | `archi-graph entity add` | Create a post, project, or illustration |
//! | `archi-graph entity list` | List entities |
//! | `archi-graph attachment add` | Register a media attachment |
//! | `archi-graph meta get <id>` | Show an entity's fields (defaults applied) |
//! | `archi-graph meta set <id> <key> <value>` | Validate and store one field |
//! | `archi-graph schema` | Print the field definitions |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use archi_graph::{config, entity_cmd, meta_cmd, migrate, schema_cmd, server};
use archi_graph_core::{EntityId, EntityKind, Namespace};

/// Archi Graph: node metadata and graph editor API for the Archi theme.
///
/// All commands except `schema` read a TOML configuration file. See
/// `config/archi.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "archi-graph",
    about = "Archi Graph: node metadata validation and graph editor API",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/archi.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it on an existing database is safe.
    Init,

    /// Start the graph editor HTTP server on `[server].bind`.
    Serve,

    /// Manage content entities.
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },

    /// Manage media attachments.
    Attachment {
        #[command(subcommand)]
        action: AttachmentAction,
    },

    /// Read and write entity metadata.
    Meta {
        #[command(subcommand)]
        action: MetaAction,
    },

    /// Print the metadata schema.
    Schema {
        /// Only show one namespace (`graph`, `project`, `illustration`).
        #[arg(long)]
        namespace: Option<Namespace>,
    },
}

#[derive(Subcommand)]
enum EntityAction {
    /// Create an entity and print its id.
    Add {
        /// `post`, `project`, or `illustration`.
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        title: String,
    },
    /// List all entities.
    List,
}

#[derive(Subcommand)]
enum AttachmentAction {
    /// Register an attachment and print its id.
    Add {
        #[arg(long)]
        url: String,
        /// MIME type, e.g. `image/jpeg`. Only `image/*` can become a node image.
        #[arg(long, default_value = "image/jpeg")]
        mime: String,
    },
}

#[derive(Subcommand)]
enum MetaAction {
    /// Show one field, or every field of the entity's namespaces.
    Get {
        id: EntityId,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        namespace: Option<Namespace>,
    },
    /// Sanitize, validate, and store one field.
    ///
    /// The value is parsed as JSON; anything that is not valid JSON is
    /// taken as a plain string.
    Set {
        id: EntityId,
        key: String,
        value: String,
        #[arg(long)]
        namespace: Option<Namespace>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Commands that don't require config
    if let Commands::Schema { namespace } = &cli.command {
        schema_cmd::run_schema(*namespace)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Entity { action } => match action {
            EntityAction::Add { kind, title } => {
                entity_cmd::run_entity_add(&cfg, kind, &title).await?;
            }
            EntityAction::List => {
                entity_cmd::run_entity_list(&cfg).await?;
            }
        },
        Commands::Attachment { action } => match action {
            AttachmentAction::Add { url, mime } => {
                entity_cmd::run_attachment_add(&cfg, &url, &mime).await?;
            }
        },
        Commands::Meta { action } => match action {
            MetaAction::Get { id, key, namespace } => {
                meta_cmd::run_meta_get(&cfg, id, key.as_deref(), namespace).await?;
            }
            MetaAction::Set {
                id,
                key,
                value,
                namespace,
            } => {
                meta_cmd::run_meta_set(&cfg, id, &key, &value, namespace).await?;
            }
        },
        Commands::Schema { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
