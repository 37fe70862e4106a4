use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rolegate::{jobs, seed, settings, storage, web};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "rolegate",
    version,
    about = "Identity service with role-based access control"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(
        listen = %settings.listen_addr(),
        token_ttl_secs = settings.auth.token_ttl_secs,
        seed_defaults = settings.bootstrap.seed_defaults,
        "Loaded configuration"
    );

    // init storage (database) and apply migrations
    let db = storage::init(&settings.database).await?;

    // base roles, permissions and the super-admin account
    seed::bootstrap(&db, &settings.bootstrap).await?;

    // background cleanup of dead access tokens
    let _scheduler = jobs::init_scheduler(db.clone()).await.into_diagnostic()?;

    // start web server
    web::serve(settings, db).await?;
    Ok(())
}
