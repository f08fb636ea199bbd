mod cli;

use std::io::{self, BufRead, Write};

use clap::Parser;
use synapse_core::SynapseConfig;
use synapse_memory::{KeywordOracle, MemoryError, NlpOracle, SessionMemory};
use tracing_subscriber::EnvFilter;

use cli::{CliArgs, Command};

/// Reply used when neither memory nor an acknowledgment has anything to say.
const FALLBACK_REPLY: &str = ":)";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let loaded = config_file
        .exists()
        .then(|| SynapseConfig::load(&config_file));

    let config_level = match &loaded {
        Some(Ok(c)) => c.general.log_level.clone(),
        _ => String::new(),
    };
    let filter = args.resolve_log_filter(&config_level);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    tracing::debug!("Starting Synapse v{}", env!("CARGO_PKG_VERSION"));
    let mut config = match loaded {
        Some(Ok(config)) => {
            tracing::debug!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Some(Err(e)) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Failed to load config. Using defaults.");
            SynapseConfig::default()
        }
        None => SynapseConfig::default(),
    };

    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    config.general.data_dir = data_dir.to_string_lossy().to_string();

    let memory = SessionMemory::from_config(&config)?;

    match args.command {
        Command::Chat { user, session } => {
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            chat(&memory, &user, &session)?;
        }
        Command::History {
            user,
            session,
            limit,
        } => {
            let limit = limit.unwrap_or(memory.config().history_limit);
            for turn in memory.history(&user, &session, limit) {
                println!("[{}]", turn.timestamp);
                if !turn.user_text.is_empty() {
                    println!("  User: {}", turn.user_text);
                }
                if !turn.bot_text.is_empty() {
                    println!("  Bot: {}", turn.bot_text);
                }
            }
        }
        Command::Facts { user, session } => {
            for fact in memory.all_facts(&user, &session) {
                println!("{}: {}", fact.key, fact.value);
            }
        }
        Command::Sessions { user } => {
            for session in memory.sessions(&user) {
                println!("{}", session);
            }
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&memory.stats())?);
        }
    }

    Ok(())
}

/// Read messages from stdin until EOF or `quit`, replying to each.
fn chat(memory: &SessionMemory, user: &str, session: &str) -> io::Result<()> {
    let oracle = KeywordOracle::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("Session {} (type 'quit' to leave)", session);
    loop {
        write!(stdout, "you> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("exit") {
            break;
        }

        let analysis = oracle.analyze(text);
        tracing::debug!(intents = ?analysis.intents, "Message analysed");

        let timestamp = chrono::Utc::now().to_rfc3339();
        match memory.converse(user, session, text, &timestamp, |_| FALLBACK_REPLY.to_string()) {
            Ok(exchange) => {
                tracing::debug!(source = ?exchange.source, facts = exchange.facts.len(), "Reply chosen");
                println!("bot> {}", exchange.reply);
            }
            Err(MemoryError::EmptyMessage) => continue,
            Err(e) => {
                tracing::error!(error = %e, "Failed to process message");
                println!("bot> {}", e);
            }
        }
    }
    Ok(())
}
