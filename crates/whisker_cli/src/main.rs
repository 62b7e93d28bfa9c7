mod commands;

use anyhow::Context;
use clap::Parser;
use commands::{render_error, render_outcome, Command, HELP};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{error, info};
use whisker_core::{Character, StateStore, WhiskerConfig};
use whisker_memory::SqliteStore;
use whisker_reasoning::llm::CompletionParams;
use whisker_reasoning::{
    providers, InteractionCoordinator, InteractionRequest, LlmBackend, ThoughtScheduler,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "WHISKER_CONFIG", default_value = "whisker.toml")]
    config: String,

    /// Database path (overrides the config)
    #[arg(short, long)]
    db: Option<String>,

    /// Name of the cat to play with
    #[arg(long, default_value = "Mochi")]
    character: String,

    /// Your user name
    #[arg(short, long, default_value = "human")]
    user: String,

    /// LLM provider: anthropic, openai or mock (overrides the config)
    #[arg(short, long)]
    provider: Option<String>,

    /// Let the cat have autonomous thoughts in the background
    #[arg(long)]
    thoughts: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let mut config = WhiskerConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }
    if let Some(provider) = args.provider {
        config.llm.provider = provider;
    }

    info!("Opening database at {}...", config.storage.db_path);
    let store = Arc::new(
        SqliteStore::new(&config.storage.db_path)
            .await?
            .with_context_limits(
                config.pipeline.recent_memories,
                config.pipeline.recent_interactions,
            ),
    );

    let user_id = match store.find_user_by_name(&args.user).await? {
        Some(id) => id,
        None => {
            info!("Creating user {}", args.user);
            store
                .create_user(&args.user, config.storage.starting_balance)
                .await?
        }
    };
    let character: Character = match store.find_character_by_name(user_id, &args.character).await? {
        Some(c) => c,
        None => {
            info!("Adopting a new cat named {}", args.character);
            store.create_character(user_id, &args.character).await?
        }
    };

    let client = providers::from_config(&config.llm).context("Failed to set up LLM provider")?;
    let backend = Arc::new(LlmBackend::new(client, CompletionParams::from(&config.llm)));
    let coordinator = Arc::new(InteractionCoordinator::new(
        backend,
        store.clone(),
        store.clone(),
        store.clone(),
        &config,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let thought_task = if args.thoughts {
        ThoughtScheduler::new(
            coordinator.clone(),
            character.id,
            character.owner_id,
            &config.thoughts.frequency,
        )
        .map(|scheduler| scheduler.spawn(shutdown_rx))
    } else {
        None
    };

    println!(
        "{} is here. Type 'help' for commands, 'quit' to leave.",
        character.name
    );
    prompt()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(msg) => {
                if !msg.is_empty() {
                    println!("{}", msg);
                }
                prompt()?;
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::Status => {
                let ctx = store.load_character_context(character.id).await?;
                println!("{}: {}", character.name, ctx.state.describe());
            }
            Command::Balance => {
                let balance = store.balance(user_id).await?.unwrap_or_default();
                println!("{} credits", balance);
            }
            Command::Errors => {
                let entries = store.list_error_logs(10).await?;
                if entries.is_empty() {
                    println!("no errors");
                }
                for entry in &entries {
                    println!("{}", render_error(entry));
                }
            }
            Command::Interact(kind, payload) => {
                let request = InteractionRequest::new(character.id, user_id, kind, payload);
                match coordinator.submit(request).await {
                    Ok(outcome) => println!("{}", render_outcome(&character.name, &outcome)),
                    Err(e) => {
                        error!("Could not submit interaction: {}", e);
                        println!("[System Error]: {}", e);
                    }
                }
            }
        }
        prompt()?;
    }

    // Receiver gone means the scheduler already stopped.
    let _ = shutdown_tx.send(true);
    if let Some(task) = thought_task {
        task.await?;
    }
    println!("Bye!");
    Ok(())
}

fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}
