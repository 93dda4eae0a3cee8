use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use support_chat::config;
use support_chat::{ChatMessage, ChatSession, MessageKind, SenderRole};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "support_chat",
    version,
    about = "Terminal client for the customer support chat"
)]
struct Cli {
    /// Path to JSON config file; config/chat.json is used when present
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Broker endpoint, overrides the config file
    #[arg(long, env = "CHAT_ENDPOINT", value_name = "URL")]
    endpoint: Option<String>,
    /// Display name shown to other participants
    #[arg(long, short)]
    name: Option<String>,
    #[arg(long, short, value_enum, default_value_t = Role::Client)]
    role: Role,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Write a config file with default values and exit
    InitConfig,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Support,
}

impl From<Role> for SenderRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Client => SenderRole::Client,
            Role::Support => SenderRole::Support,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    // Only an explicitly named config file has to exist.
    let required = cli.config.is_some();
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));

    if cli.mode == Some(Mode::InitConfig) {
        return match config::save_config(&config_path, &config::AppConfig::default()) {
            Ok(()) => {
                println!("Wrote default config to {}", config_path.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{err}");
                ExitCode::FAILURE
            }
        };
    }

    let mut app_config = match config::load_config(&config_path, required) {
        Ok(app_config) => app_config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(endpoint) = cli.endpoint {
        app_config.endpoint = endpoint;
    }

    let Some(name) = cli.name else {
        eprintln!("--name is required to join the chat");
        return ExitCode::FAILURE;
    };
    let role = SenderRole::from(cli.role);

    match run_terminal_client(app_config, name.trim().to_string(), role).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run_terminal_client(
    app_config: config::AppConfig,
    name: String,
    role: SenderRole,
) -> Result<(), support_chat::SessionError> {
    let session = ChatSession::new(app_config)?;

    // Render every snapshot as it arrives; only new tail entries are printed.
    let mut snapshots = session.messages();
    let renderer = tokio::spawn(async move {
        let mut printed = 0;
        while let Some(snapshot) = snapshots.recv().await {
            if snapshot.len() < printed {
                println!("--- history cleared ---");
                printed = 0;
            }
            for message in &snapshot[printed..] {
                println!("{}", render_line(message));
            }
            printed = snapshot.len();
        }
    });

    session.connect(&name, role).await?;
    println!("Connected as {name} ({role}). Type a message, or /quit to leave.");

    let mut connected = session.connected();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim() == "/quit" => break,
                    Ok(Some(line)) => session.send_message(&line, &name, role),
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!("Failed to read stdin: {err}");
                        break;
                    }
                }
            }
            state = connected.recv() => {
                if state != Some(true) {
                    println!("Connection lost.");
                    break;
                }
            }
        }
    }

    drop(connected);
    session.shutdown().await;
    // Every channel is closed now, so the renderer flushes and ends.
    if let Err(err) = renderer.await {
        log::warn!("Renderer ended abnormally: {err}");
    }
    Ok(())
}

fn render_line(message: &ChatMessage) -> String {
    match message.kind() {
        MessageKind::Join | MessageKind::Leave => format!("* {}", message.content()),
        MessageKind::Chat => {
            let time = message
                .timestamp()
                .map(|at| at.with_timezone(&chrono::Local).format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string());
            format!(
                "[{time}] {} ({}): {}",
                message.sender(),
                message.sender_role(),
                message.content()
            )
        }
    }
}
