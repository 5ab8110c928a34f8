//! predikt-auth entry point.
//!
//! `serve` bootstraps the auth server:
//! 1. Load configuration from environment
//! 2. Connect to Redis
//! 3. Build router with the `/api/auth/*` routes
//! 4. Start Axum server
//!
//! The other subcommands drive the client side against a running server.

use clap::{Parser, Subcommand};
use predikt_auth::{
    auth::middleware::AppState,
    client::{
        AuthApi, AuthController, AuthError, AuthEvents, AuthOutcome, Ed25519Signer, FileStorage,
        SessionStore, WalletSigner, AUTH_CACHE_KEY,
    },
    config::{ClientConfig, Config},
    middleware::api_headers,
    routes,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Predikt wallet sign-in: auth server and client
#[derive(Parser)]
#[command(name = "predikt-auth", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the auth API server
    Serve,

    /// Generate a wallet keypair file and print its address
    Keygen {
        /// Where to write the 64-byte keypair JSON
        #[arg(long, short)]
        out: PathBuf,
    },

    /// Sign in with a keypair file
    Login {
        #[arg(long, short, env = "PREDIKT_KEYPAIR")]
        keypair: PathBuf,
    },

    /// Show the cached sign-in
    Status,

    /// Sign out and clear the cached sign-in
    Logout,
}

/// Prints failures the way the web UI raises toasts.
struct ConsoleEvents;

impl AuthEvents for ConsoleEvents {
    fn error(&self, err: &AuthError) {
        eprintln!("error: {}", err);
    }

    fn cancelled(&self) {
        eprintln!("signing cancelled");
    }
}

fn controller(config: &ClientConfig) -> AuthController {
    let store = SessionStore::new(
        Arc::new(FileStorage::new(&config.state_dir)),
        Duration::from_secs(config.cache_ttl_secs),
    );
    AuthController::new(AuthApi::new(config), store).with_events(Arc::new(ConsoleEvents))
}

async fn serve() -> Result<(), BoxError> {
    let config = Config::from_env()?;
    tracing::info!("Starting predikt-auth on {}", config.bind_addr);

    let redis_client = redis::Client::open(config.redis_url.as_str())?;

    // Fail fast if Redis is unreachable
    redis_client.get_multiplexed_async_connection().await?;

    let state = AppState {
        redis: redis_client,
        config: Arc::new(config.clone()),
    };

    // Single-origin deployment: no cross-origin requests allowed
    let app = routes::api_router()
        .layer(axum::middleware::from_fn(api_headers))
        .layer(CorsLayer::new())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    // ConnectInfo<SocketAddr> is needed for per-IP rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn keygen(out: &Path) -> Result<(), BoxError> {
    if out.exists() {
        return Err(format!("refusing to overwrite {}", out.display()).into());
    }
    let signer = Ed25519Signer::generate();
    signer.save(out).await?;
    println!("{}", signer.address());
    Ok(())
}

async fn login(keypair: &Path) -> Result<(), BoxError> {
    let config = ClientConfig::from_env()?;
    let signer = Ed25519Signer::load(keypair).await?;
    let controller = controller(&config);

    controller.connect(Arc::new(signer));
    match controller.authenticate().await {
        AuthOutcome::Authenticated(wallet) => println!("signed in as {}", wallet),
        AuthOutcome::CachedSession(wallet) => println!("already signed in as {} (cached)", wallet),
        AuthOutcome::Failed(e) => return Err(e.into()),
        other => return Err(format!("sign-in did not complete: {:?}", other).into()),
    }
    Ok(())
}

async fn status() -> Result<(), BoxError> {
    let config = ClientConfig::from_env()?;
    let store = SessionStore::new(
        Arc::new(FileStorage::new(&config.state_dir)),
        Duration::from_secs(config.cache_ttl_secs),
    );

    match store.read(AUTH_CACHE_KEY).await {
        Some(entry) => {
            let remaining_secs =
                entry.exp.saturating_sub(predikt_auth::client::store::now_millis()) / 1000;
            println!(
                "signed in as {} (expires in {}s)",
                entry.wallet.as_deref().unwrap_or("<unknown wallet>"),
                remaining_secs
            );
        }
        None => println!("not signed in"),
    }
    Ok(())
}

async fn logout() -> Result<(), BoxError> {
    let config = ClientConfig::from_env()?;
    controller(&config).sign_out().await;
    println!("signed out");
    Ok(())
}

#[tokio::main]
async fn main() {
    // RUST_LOG controls verbosity
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve => serve().await,
        Commands::Keygen { out } => keygen(&out).await,
        Commands::Login { keypair } => login(&keypair).await,
        Commands::Status => status().await,
        Commands::Logout => logout().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
