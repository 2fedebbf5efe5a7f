use std::io::{stderr, stdin, stdout};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Error};
use dotenvy::dotenv;
use product_assistant::agent::SqlAgent;
use product_assistant::config::Config;
use product_assistant::logging::init_logger;
use product_assistant::model::OllamaModel;
use product_assistant::orchestrator::Orchestrator;
use product_assistant::prompts::Prompts;
use product_assistant::session::ConversationSession;
use product_assistant::shell::Shell;
use product_assistant::store::PgConversationStore;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    if let Err(e) = init_logger() {
        eprintln!("failed to initialise logging: {:#}", e);
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    let mut prompts = Prompts::default();
    if let Some(path) = &config.cleanup_prompt_file {
        prompts = prompts.with_cleanup_file(path)?;
    }
    info!(version = %prompts.version, "prompts loaded");

    let db = PgPoolOptions::new()
        .max_connections(2)
        .connect_with(config.database.connect_options())
        .await
        .with_context(|| {
            format!(
                "connecting to database {} on {}:{}",
                config.database.name, config.database.host, config.database.port
            )
        })?;
    info!(host = %config.database.host, "database connection established");

    let store = PgConversationStore::new(db.clone());
    store.ensure_schema().await?;

    let model = Arc::new(OllamaModel::new(&config.model));
    info!(model = model.model_name(), "model client ready");

    let agent = SqlAgent::new(model.clone(), db, prompts.agent_prefix.clone());
    let orchestrator = Orchestrator::new(Arc::new(agent), model, Arc::new(store), prompts);

    let mut session = ConversationSession::with_greeting(&orchestrator.prompts().greeting);
    Shell::new(stdin().lock(), stdout(), stderr())
        .run(&orchestrator, &mut session)
        .await?;

    Ok(())
}
