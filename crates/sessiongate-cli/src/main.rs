//! sessiongate - sign in, inspect the session, and call the API from a terminal.
//!
//! The binary wires the library the way an app shell would: one credential
//! store shared by the session and the API client, with the session
//! registered to hear about expired credentials.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessiongate_core::auth::MockAuthenticator;
use sessiongate_core::config::StorageBackend;
use sessiongate_core::models::seed_posts;
use sessiongate_core::{ApiClient, ApiError, Config, CredentialStore, PostsApi, SessionState};

const USAGE: &str = "\
Usage: sessiongate [--ephemeral] <command>

Commands:
  status                   Show the stored session
  login <email>            Sign in with the mock authenticator
  register <name> <email>  Register with the mock authenticator
  logout                   Clear stored credentials
  posts [id]               Fetch posts through the authenticated client
  seed                     Print sample posts as JSON
  config                   Show the effective configuration
  config storage <backend> Save the storage backend (keyring, vault, memory)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Everything a command needs, built once per run
struct App {
    session: Arc<SessionState>,
    posts: PostsApi,
}

impl App {
    fn new(config: &Config) -> Result<Self> {
        let storage = config.open_storage()?;
        let store = Arc::new(CredentialStore::new(storage));
        let session = Arc::new(SessionState::new(store.clone()));
        let client = ApiClient::builder(config, store)
            .on_auth_expired(session.clone())
            .build()
            .context("Failed to build API client")?;

        Ok(Self {
            session,
            posts: PostsApi::new(client),
        })
    }

    async fn status(&self) {
        self.session.hydrate().await;
        let snapshot = self.session.snapshot();
        match snapshot.user {
            Some(ref user) => println!("Signed in as {} <{}>", user.display_name(), user.email),
            None => println!("Not signed in"),
        }
        println!("Screen: {}", self.session.screen().display_name());
    }

    async fn login(&self, email: &str) -> Result<()> {
        let (tokens, user) = MockAuthenticator.sign_in(email);
        self.session
            .sign_in(&tokens, user)
            .await
            .context("Failed to save credentials")?;
        println!("Signed in as {}", email);
        Ok(())
    }

    async fn register(&self, name: &str, email: &str) -> Result<()> {
        let (tokens, user) = MockAuthenticator.register(name, email);
        self.session
            .sign_in(&tokens, user)
            .await
            .context("Failed to save credentials")?;
        println!("Registered {} <{}>", name, email);
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.session
            .logout()
            .await
            .context("Failed to clear stored credentials")?;
        println!("Signed out");
        Ok(())
    }

    async fn posts(&self, id: Option<u64>) -> Result<()> {
        self.session.hydrate().await;

        let output = match id {
            Some(id) => self.posts.get(id).await.map(|post| vec![post]),
            None => self.posts.list().await,
        };

        match output {
            Ok(posts) => {
                for post in posts {
                    println!("#{:<4} {}", post.id, post.title);
                }
                Ok(())
            }
            Err(ApiError::AuthExpired) => {
                bail!("Session expired - run `sessiongate login <email>` to sign in again")
            }
            Err(e) => Err(e).context("Failed to fetch posts"),
        }
    }
}

fn parse_id(arg: &str) -> Result<u64> {
    arg.parse()
        .with_context(|| format!("Post id must be a number, got {:?}", arg))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let ephemeral = args.iter().any(|a| a == "--ephemeral");
    args.retain(|a| a != "--ephemeral");

    let command: Vec<&str> = args.iter().map(String::as_str).collect();

    // Commands that need no session
    match command.as_slice() {
        [] | ["help"] | ["--help"] | ["-h"] => {
            println!("{}", USAGE);
            return Ok(());
        }
        ["seed"] => {
            println!("{}", serde_json::to_string_pretty(&seed_posts())?);
            return Ok(());
        }
        _ => {}
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    match command.as_slice() {
        ["config"] => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        ["config", "storage", backend] => {
            // Only file settings are saved, never environment overrides
            let mut saved = Config::load_file().context("Failed to load configuration")?;
            saved.storage = backend.parse()?;
            let path = saved.save().context("Failed to save configuration")?;
            println!("Storage backend set to {:?} in {}", saved.storage, path.display());
            return Ok(());
        }
        _ => {}
    }

    if ephemeral {
        config.storage = StorageBackend::Memory;
    }
    info!(base_url = %config.api_base_url, storage = ?config.storage, "sessiongate starting");

    let app = App::new(&config)?;
    match command.as_slice() {
        ["status"] => app.status().await,
        ["login", email] => app.login(email).await?,
        ["register", name, email] => app.register(name, email).await?,
        ["logout"] => app.logout().await?,
        ["posts"] => app.posts(None).await?,
        ["posts", id] => app.posts(Some(parse_id(id)?)).await?,
        _ => {
            eprintln!("{}", USAGE);
            bail!("Unknown command: {}", args.join(" "));
        }
    }

    Ok(())
}
