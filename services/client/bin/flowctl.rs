//! Command-line client for the agent server.
//!
//! Signs in, keeps credentials under the configured credentials path, and
//! prints agent stream output as it arrives. `Ctrl+C` cancels a running stream.

use agentflow_client::{
    AgentFlowClient, ClientConfig,
    models::RegisterRequest,
    stream::{ChannelObserver, SessionState, SessionUpdate, StreamEndpoint, StreamQuery},
};
use agentflow_core::DomainEvent;
use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "flowctl", version, about = "Talk to an agent flow server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Email a verification code, needed for registration.
    SendCode { email: String },
    /// Create an account.
    Register {
        email: String,
        #[arg(long)]
        password: String,
        /// Verification code from `send-code`.
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: Option<String>,
    },
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Send a prompt to an agent and stream its progress.
    Chat {
        prompt: String,
        #[arg(long, value_enum, default_value_t = ChatMode::React)]
        mode: ChatMode,
        #[arg(long)]
        conversation_id: Option<String>,
    },
    /// Run a saved agent flow.
    Flow { flow_id: String, prompt: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ChatMode {
    Legacy,
    React,
    PlanExecute,
}

impl ChatMode {
    fn endpoint(self) -> StreamEndpoint {
        match self {
            ChatMode::Legacy => StreamEndpoint::LEGACY_CHAT,
            ChatMode::React => StreamEndpoint::REACT_AGENT,
            ChatMode::PlanExecute => StreamEndpoint::PLAN_EXECUTE,
        }
    }
}

fn print_event(event: &DomainEvent) -> anyhow::Result<()> {
    match event {
        DomainEvent::Message(message) => {
            println!("{}", message.content);
            for call in &message.tool_calls {
                println!("  -> {}({})", call.name, call.arguments);
            }
        }
        DomainEvent::Progress(progress) => {
            println!(
                "{}",
                serde_json::to_string(progress).context("Failed to render progress event")?
            );
        }
    }
    Ok(())
}

/// Prints updates until the session ends or the user presses `Ctrl+C`.
async fn stream_to_stdout(
    client: &AgentFlowClient,
    endpoint: StreamEndpoint,
    query: StreamQuery,
) -> anyhow::Result<()> {
    let (observer, mut updates) = ChannelObserver::new();
    let handle = client.open_stream(endpoint, query, observer).await;
    let mut failure = None;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(SessionUpdate::Event(event)) => print_event(&event)?,
                Some(SessionUpdate::Error(e)) => failure = Some(e),
                Some(SessionUpdate::Complete) | None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                info!("Cancelling stream...");
                handle.cancel();
                break;
            }
        }
    }

    match (handle.finished().await, failure) {
        (SessionState::Failed, Some(e)) => Err(e).context("Stream failed"),
        (SessionState::Failed, None) => bail!("Stream failed"),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(base_url = %config.base_url, "Configuration loaded");

    // --- 3. Build the client ---
    let client = AgentFlowClient::from_config(config).context("Failed to build client")?;

    // --- 4. Run the command ---
    match cli.command {
        Command::SendCode { email } => {
            client.send_code(&email).await?;
            println!("Verification code sent to {email}");
        }
        Command::Register {
            email,
            password,
            code,
            name,
        } => {
            let request = RegisterRequest {
                email,
                password,
                code,
                user_name: name,
            };
            let user_id = client.register(&request).await?;
            println!("Registered user {user_id}");
        }
        Command::Login { email, password } => {
            let identity = client.login(&email, &password).await?;
            println!("Signed in as {} <{}>", identity.display_name, identity.email);
        }
        Command::Logout => {
            client.logout().await?;
            println!("Signed out");
        }
        Command::Whoami => match client.identity() {
            Some(identity) if client.is_authenticated() => {
                println!(
                    "{} <{}> id={} role={}",
                    identity.display_name, identity.email, identity.id, identity.role
                );
            }
            _ => println!("Not signed in"),
        },
        Command::Chat {
            prompt,
            mode,
            conversation_id,
        } => {
            if !client.is_authenticated() {
                warn!("Not signed in, the server may reject this request");
            }
            let query = StreamQuery::chat(&prompt, conversation_id.as_deref());
            stream_to_stdout(&client, mode.endpoint(), query).await?;
        }
        Command::Flow { flow_id, prompt } => {
            stream_to_stdout(&client, StreamEndpoint::AGENT_FLOW, StreamQuery::flow(&flow_id, &prompt))
                .await?;
        }
    }

    Ok(())
}
