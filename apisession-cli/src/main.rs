//! apisession CLI - Command-line interface for API session management
//!
//! Obtains access token sessions from the configured authorization server and
//! inspects or maintains the local session store.

use anyhow::{anyhow, bail, Context};
use apisession_core::{
    init_logging, performance, ApiSessionConfig, DurationStart, ExpiringSessionStorage,
    ExpiryFilter, LoggingConfig, SessionError, SessionStorage, SessionVariant, StorageBackend,
    StorageConfig, TokenProvider, TokenSession,
};
use apisession_manager::{
    AccessTokenSession, FileSessionStorage, MemorySessionStorage, RenewableAccessTokenSession,
    SessionInfo, SessionManager,
};
use apisession_oauth2::TokenEndpointClient;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "apisession")]
#[command(about = "Obtain and manage OAuth2 access token sessions for API clients")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Get a session, reusing the stored one when it lasts long enough
    Connect {
        /// Session type ID
        #[arg(long)]
        type_id: Option<String>,

        /// Minimum remaining lifetime in seconds
        #[arg(long)]
        interval: Option<u64>,

        /// Maximum lifetime the provider supports in seconds
        #[arg(long)]
        limit: Option<u64>,

        /// Start of the interval: "call_time" or a Unix timestamp
        #[arg(long, value_parser = parse_start)]
        start: Option<DurationStart>,

        /// Grant parameter (key=value), may be repeated
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Print the full access token
        #[arg(long)]
        show_token: bool,
    },

    /// Show the stored session
    Show {
        /// Session type ID
        #[arg(long)]
        type_id: Option<String>,

        /// Also show an expired session
        #[arg(long)]
        include_expired: bool,

        /// Print the full access token
        #[arg(long)]
        show_token: bool,
    },

    /// Delete the stored session
    Delete {
        /// Session type ID
        #[arg(long)]
        type_id: Option<String>,
    },

    /// Schedule the stored session to expire
    Expire {
        /// Session type ID
        #[arg(long)]
        type_id: Option<String>,

        /// Seconds from now, 0 expires immediately
        #[arg(long, default_value = "0")]
        after: u64,
    },

    /// Delete expired sessions
    Gc {
        /// Only collect sessions of this type
        #[arg(long)]
        type_id: Option<String>,
    },

    /// Count stored sessions
    Count {
        /// Count expired sessions too
        #[arg(long)]
        include_expired: bool,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

fn parse_start(s: &str) -> Result<DurationStart, String> {
    match s {
        "call_time" | "now" => Ok(DurationStart::CallTime),
        other => other
            .parse::<i64>()
            .map(DurationStart::At)
            .map_err(|_| format!("expected \"call_time\" or a Unix timestamp, got '{}'", other)),
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("invalid key=value: '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    init_logging(&logging_config).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting apisession CLI v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Config {
        show,
        init,
        validate,
    } = cli.command
    {
        return handle_config(cli.config.as_deref(), show, init, validate);
    }

    let config = load_config(cli.config.as_deref())?;
    config.validate()?;

    let result = match config.session.variant {
        SessionVariant::Immutable => run::<AccessTokenSession>(cli.command, &config).await,
        SessionVariant::Renewable => run::<RenewableAccessTokenSession>(cli.command, &config).await,
    };

    if let Err(e) = &result {
        if let Some(session_error) = e.downcast_ref::<SessionError>() {
            session_error.log();
        }
    }
    result
}

fn load_config(config_path: Option<&Path>) -> anyhow::Result<ApiSessionConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        return Ok(ApiSessionConfig::from_file(path)?);
    }

    let default_paths = [
        dirs::config_dir().map(|d| d.join("apisession").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".apisession").join("config.toml")),
        Some(PathBuf::from("apisession.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            return Ok(ApiSessionConfig::from_file(path)?);
        }
    }

    warn!("No configuration file found, using defaults");
    Ok(ApiSessionConfig::default())
}

/// Get the default configuration file path
fn default_config_path() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|d| d.join("apisession").join("config.toml"))
        .ok_or_else(|| anyhow!("Cannot determine the configuration directory"))
}

fn handle_config(
    config_path: Option<&Path>,
    show: bool,
    init: bool,
    validate: bool,
) -> anyhow::Result<()> {
    if init {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        if path.exists() {
            bail!("Configuration file already exists at {:?}", path);
        }

        ApiSessionConfig::default().save_to_file(&path)?;
        println!("Configuration initialized at: {:?}", path);
        println!("Edit the file to set the token URL and client credentials.");
    }

    if show {
        let config = load_config(config_path)?;
        println!("{}", toml::to_string_pretty(&config)?);
    }

    if validate {
        let config = load_config(config_path)?;
        match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                println!("Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// One storage backend seen through both storage traits
struct StorageHandles<S: TokenSession> {
    sessions: Arc<dyn SessionStorage<S>>,
    expiring: Arc<dyn ExpiringSessionStorage<S>>,
}

impl<S: TokenSession> StorageHandles<S> {
    fn new<T>(storage: T) -> Self
    where
        T: ExpiringSessionStorage<S> + 'static,
    {
        let storage = Arc::new(storage);
        Self {
            sessions: storage.clone(),
            expiring: storage,
        }
    }
}

async fn open_storage<S: TokenSession>(config: &StorageConfig) -> anyhow::Result<StorageHandles<S>> {
    let path = config.path.as_deref().map(expand_home);

    match (config.backend, path) {
        (StorageBackend::Memory, _) => {
            warn!("Memory storage does not outlive this process");
            Ok(StorageHandles::new(MemorySessionStorage::<S>::new()))
        }
        (StorageBackend::File, Some(path)) => {
            Ok(StorageHandles::new(FileSessionStorage::new(path)?))
        }
        #[cfg(feature = "sqlite")]
        (StorageBackend::Sqlite, Some(path)) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            Ok(StorageHandles::new(
                apisession_manager::SqliteSessionStorage::open(path).await?,
            ))
        }
        #[cfg(not(feature = "sqlite"))]
        (StorageBackend::Sqlite, Some(_)) => {
            bail!("This build does not include the sqlite storage backend")
        }
        (_, None) => bail!("storage.path is required for the {:?} backend", config.backend),
    }
}

async fn run<S: TokenSession>(command: Commands, config: &ApiSessionConfig) -> anyhow::Result<()> {
    let storage = open_storage::<S>(&config.storage).await?;
    let default_type_id = config.session.options.effective_type_id().to_string();

    match command {
        Commands::Connect {
            type_id,
            interval,
            limit,
            start,
            params,
            show_token,
        } => {
            let mut options = config.session.options.clone();
            options.type_id = type_id.or(options.type_id);
            options.duration.interval = interval.or(options.duration.interval);
            options.duration.limit = limit.or(options.duration.limit);
            options.duration.start = start.or(options.duration.start);
            options.grant.extend(params);

            let provider: Arc<dyn TokenProvider> =
                Arc::new(TokenEndpointClient::new(config.provider.clone())?);
            let mut manager = SessionManager::<S>::for_grant(
                config.session.grant_type,
                provider,
                storage.sessions.clone(),
            );
            manager.set_options(options)?;

            let session = performance::measure_async("connect", manager.connect()).await?;
            info!(
                "Connected with {} grant, session {}",
                config.session.grant_type,
                session.session_id()
            );

            print_session(&session, show_token)?;
        }
        Commands::Show {
            type_id,
            include_expired,
            show_token,
        } => {
            let type_id = type_id.unwrap_or(default_type_id);
            let filter = if include_expired {
                ExpiryFilter::IncludeExpired
            } else {
                ExpiryFilter::SkipExpired
            };

            match storage.sessions.get(&type_id, filter).await? {
                Some(session) => print_session(&session, show_token)?,
                None => bail!("No session stored for type '{}'", type_id),
            }
        }
        Commands::Delete { type_id } => {
            let type_id = type_id.unwrap_or(default_type_id);
            storage.sessions.delete(&type_id).await?;
            println!("Deleted session of type '{}'", type_id);
        }
        Commands::Expire { type_id, after } => {
            let type_id = type_id.unwrap_or(default_type_id);
            storage.expiring.expire(&type_id, after).await?;
            println!("Session of type '{}' expires in {}s", type_id, after);
        }
        Commands::Gc { type_id } => {
            let removed = storage.expiring.delete_expired(type_id.as_deref()).await?;
            println!("Removed {} expired session(s)", removed);
        }
        Commands::Count { include_expired } => {
            let filter = if include_expired {
                ExpiryFilter::IncludeExpired
            } else {
                ExpiryFilter::SkipExpired
            };
            println!("{}", storage.sessions.count(filter).await?);
        }
        Commands::Config { .. } => unreachable!("handled before the configuration is loaded"),
    }

    Ok(())
}

fn print_session<S: TokenSession>(session: &S, show_token: bool) -> anyhow::Result<()> {
    let info = SessionInfo::from_session(session, apisession_core::now_timestamp());
    let mut value = serde_json::to_value(info)?;

    if show_token {
        value["access_token"] = serde_json::Value::String(session.access_token().token().to_string());
    }

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
