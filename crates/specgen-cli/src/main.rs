//! SpecGen console CLI - sign in and call the SpecGen API from a terminal.

mod auth;
mod request;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use specgen_config::{init_logging, Config, Paths};
use specgen_session::{AuthError, AuthSession};

/// SpecGen command-line interface.
#[derive(Parser)]
#[command(name = "specgen")]
#[command(about = "Sign in to SpecGen and call its API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, session and logs. Defaults to ~/.specgen
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SPECGEN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "SPECGEN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget stored tokens
    Logout,
    /// Show the current session
    Status,
    /// Send an authenticated API request
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,
        /// Path relative to the API base URL
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Query parameter as key=value (repeatable)
        #[arg(long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,
    },
    /// Request a password reset email
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Passwordless sign-in
    MagicLink {
        #[command(subcommand)]
        action: MagicLinkAction,
    },
    /// Finish an OAuth sign-in from the provider redirect
    OauthCallback {
        /// Provider slug (e.g. github, google)
        provider: String,
        /// Redirect URL, or callback parameters as key=value
        #[arg(required = true)]
        params: Vec<String>,
    },
    /// Two-factor authentication
    TwoFactor {
        #[command(subcommand)]
        action: TwoFactorAction,
    },
    /// Set or clear the preferred locale
    Locale {
        /// Locale tag such as en-US; omit to clear
        tag: Option<String>,
    },
}

#[derive(Subcommand)]
enum MagicLinkAction {
    /// Email a sign-in code
    Request {
        #[arg(long)]
        email: String,
    },
    /// Sign in with the emailed code
    Verify {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
}

#[derive(Subcommand)]
enum TwoFactorAction {
    /// Start enrollment and print the authenticator secret
    Setup,
    /// Confirm enrollment with an authenticator code
    Verify {
        #[arg(long)]
        code: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths).context("failed to load configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, Some(paths.log_file().as_path()))?;

    let session = AuthSession::from_config(&config, &paths).context("failed to open session")?;
    let result = run(&session, cli.command).await;
    session.teardown();

    if let Err(e) = &result {
        if session_lost(e) {
            eprintln!("Not signed in. Run `specgen login` to start a new session.");
        }
    }
    result
}

/// Whether the failure means the user has to sign in again.
fn session_lost(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<AuthError>())
        .any(AuthError::is_session_lost)
}

async fn run(session: &AuthSession, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login { email, password } => auth::login(session, &email, &password).await,
        Commands::Signup {
            name,
            email,
            password,
        } => auth::signup(session, &name, &email, &password).await,
        Commands::Logout => {
            auth::logout(session);
            Ok(())
        }
        Commands::Status => auth::status(session),
        Commands::Request {
            method,
            path,
            body,
            query,
        } => request::send(session, &method, &path, body.as_deref(), &query).await,
        Commands::ForgotPassword { email } => auth::forgot_password(session, &email).await,
        Commands::MagicLink { action } => match action {
            MagicLinkAction::Request { email } => auth::request_magic_link(session, &email).await,
            MagicLinkAction::Verify { email, code } => {
                auth::verify_magic_link(session, &email, &code).await
            }
        },
        Commands::OauthCallback { provider, params } => {
            auth::oauth_callback(session, &provider, &params).await
        }
        Commands::TwoFactor { action } => match action {
            TwoFactorAction::Setup => auth::two_factor_setup(session).await,
            TwoFactorAction::Verify { code } => auth::two_factor_verify(session, &code).await,
        },
        Commands::Locale { tag } => {
            auth::set_locale(session, tag.as_deref());
            Ok(())
        }
    }
}
