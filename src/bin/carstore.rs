//! carstore CLI
//!
//! Command-line access to a car store data root.
//!
//! Every command prints JSON on stdout. Failures print
//! `{"error": <KIND>, "message": ...}` on stderr and exit non-zero.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use carstore::config::{ENV_DATA_ROOT, ENV_LOCK_TTL_MS, ENV_MAX_BACKUPS};
use carstore::storage::list_backups;
use carstore::{parse_ids, CarId, CarStore, PhotoUpload, StoreConfig, StoreError};

#[derive(Parser)]
#[command(name = "carstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Crash-safe JSON car store")]
#[command(long_about = "carstore - Crash-safe JSON car store\n\n\
    Reads and mutates <data-root>/cars.json under the store lock.\n\
    Every mutation keeps a rotating backup of the previous file.\n\n\
    Examples:\n\
      carstore --data-root ./data list\n\
      carstore --data-root ./data create '{\"brand\":\"Kia\",\"model\":\"Rio\",\"year\":2020,\"price\":15000,\"country_code\":\"KR\"}'\n\
      carstore --data-root ./data bulk-delete '[1, 2]'\n\
      carstore --data-root ./data add-photos 1 front.jpg rear.png")]
struct Cli {
    /// Data root holding cars.json [env: DATA_ROOT]
    #[arg(long, global = true, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// Lock TTL in milliseconds [env: LOCK_TTL_MS]
    #[arg(long, global = true, value_name = "MS")]
    lock_ttl_ms: Option<String>,

    /// Number of backups to keep, 0 disables [env: MAX_BACKUPS]
    #[arg(long, global = true, value_name = "N")]
    max_backups: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every car
    List,

    /// Print one car
    Get {
        /// Car id
        id: String,
    },

    /// Create a car from a JSON object ("-" reads stdin)
    Create {
        /// JSON payload
        payload: String,
    },

    /// Merge a JSON patch into a car ("-" reads stdin)
    Update {
        /// Car id
        id: String,
        /// JSON patch
        patch: String,
    },

    /// Delete a car, leaving its assets on disk
    Delete {
        /// Car id
        id: String,
    },

    /// Delete several cars given a JSON array of ids
    BulkDelete {
        /// JSON array, e.g. '[1, 2, 3]'
        ids: String,
    },

    /// List backups, newest first
    Backups,

    /// Copy image files into a car's asset folder
    AddPhotos {
        /// Car id
        id: String,
        /// Image files (jpg, jpeg, png, webp, gif)
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },

    /// Set the display order of a car's photos
    ReorderPhotos {
        /// Car id
        id: String,
        /// Every current photo name, in the new order
        #[arg(required = true, num_args = 1..)]
        photos: Vec<String>,
    },

    /// Remove one photo from a car
    DeletePhoto {
        /// Car id
        id: String,
        /// Photo file name
        name: String,
    },
}

/// Failure reported to the caller.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read stdin: {0}")]
    Stdin(#[source] io::Error),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.kind().code(),
            Self::Json(_) | Self::Stdin(_) => "VALIDATION_ERROR",
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => report(&CliError::Json(e)),
        },
        Err(e) => report(&e),
    }
}

fn report(err: &CliError) -> ExitCode {
    eprintln!("{}", json!({ "error": err.code(), "message": err.to_string() }));
    ExitCode::FAILURE
}

fn open_store(cli: &Cli) -> Result<CarStore, CliError> {
    let lookup = |name: &str| {
        let flag = match name {
            ENV_DATA_ROOT => cli.data_root.as_ref().map(|p| p.display().to_string()),
            ENV_LOCK_TTL_MS => cli.lock_ttl_ms.clone(),
            ENV_MAX_BACKUPS => cli.max_backups.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(name).ok())
    };
    let config = StoreConfig::from_lookup(lookup).map_err(StoreError::from)?;
    Ok(CarStore::open(config)?)
}

fn read_json(arg: &str) -> Result<Value, CliError> {
    if arg == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).map_err(CliError::Stdin)?;
        return Ok(serde_json::from_str(&buf)?);
    }
    Ok(serde_json::from_str(arg)?)
}

fn run(cli: Cli) -> Result<Value, CliError> {
    let store = open_store(&cli)?;

    let output = match cli.command {
        Commands::List => serde_json::to_value(store.read_all()?)?,
        Commands::Get { id } => {
            let id: CarId = id.parse()?;
            let car = store.read_by_id(id)?.ok_or(StoreError::CarNotFound { id })?;
            serde_json::to_value(car)?
        }
        Commands::Create { payload } => serde_json::to_value(store.create(read_json(&payload)?)?)?,
        Commands::Update { id, patch } => {
            let id: CarId = id.parse()?;
            serde_json::to_value(store.update(id, read_json(&patch)?)?)?
        }
        Commands::Delete { id } => serde_json::to_value(store.delete(id.parse()?)?)?,
        Commands::BulkDelete { ids } => {
            let ids = parse_ids(&read_json(&ids)?)?;
            json!({ "deleted": store.bulk_delete(&ids)? })
        }
        Commands::Backups => {
            let entries = list_backups(store.paths())?;
            Value::Array(
                entries
                    .iter()
                    .map(|e| {
                        json!({
                            "name": e.name(),
                            "modified": DateTime::<Utc>::from(e.modified).to_rfc3339(),
                        })
                    })
                    .collect(),
            )
        }
        Commands::AddPhotos { id, files } => {
            let id: CarId = id.parse()?;
            let uploads = files
                .iter()
                .map(|f| PhotoUpload::from_path(f.as_path()))
                .collect::<Result<Vec<_>, _>>()?;
            serde_json::to_value(store.add_photos(id, &uploads)?)?
        }
        Commands::ReorderPhotos { id, photos } => {
            serde_json::to_value(store.reorder_photos(id.parse()?, photos)?)?
        }
        Commands::DeletePhoto { id, name } => {
            serde_json::to_value(store.delete_photo(id.parse()?, &name)?)?
        }
    };
    Ok(output)
}
