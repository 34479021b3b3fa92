//! Billing Assistant host
//!
//! Drives a single session from stdin: each line is one user turn and the
//! assistant's messages are printed to stdout. `/quit` (or end of input)
//! ends the session and prints its snapshot as JSON.

use billing_assistant::{AssistantConfig, CannedResponder, LogFormat, LoggingSink, Orchestrator, SessionManager};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const QUIT: &str = "/quit";

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "billing_assistant=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout is the conversation; logs go to stderr
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AssistantConfig::from_env()?;
    init_tracing(config.log_format);

    let registry = Arc::new(config.load_registry()?);
    tracing::info!(
        workflows = ?registry.iter().map(|w| w.id().as_str()).collect::<Vec<_>>(),
        session_id = %config.session_id,
        "Billing assistant ready"
    );

    let responder = Arc::new(CannedResponder::new(&registry));
    let sessions = SessionManager::new(Orchestrator::new(Arc::clone(&registry), responder), LoggingSink);
    let session_id = config.session_id.as_str();

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{}\n", registry.vocabulary().idle_prompt).as_bytes())
        .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == QUIT {
            break;
        }
        let report = sessions.send(session_id, &line).await;
        for message in report.messages() {
            stdout.write_all(format!("{}\n", message.text).as_bytes()).await?;
        }
        stdout.flush().await?;
    }

    if let Some(snapshot) = sessions.end_session(session_id).await {
        let json = serde_json::to_string_pretty(&snapshot)?;
        stdout.write_all(format!("{json}\n").as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
