/// ScrimBase auth service entry point
use scrimbase_auth::{config::ServerConfig, context::AppContext, error::AuthResult, jobs, server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AuthResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrimbase_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   _____           _           ____
  / ___/__________(_)___ ___  / __ )____ _________
  \__ \/ ___/ ___/ / __ `__ \/ __  / __ `/ ___/ _ \
 ___/ / /__/ /  / / / / / / / /_/ / /_/ (__  )  __/
/____/\___/_/  /_/_/ /_/ /_/_____/\__,_/____/\___/

        ScrimBase Auth Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
