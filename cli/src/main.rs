//! Terminal front-end for the chat relay.
//!
//! `chat` opens a reconnecting session and relays stdin lines to the room;
//! `users` and `ping` are one-shot HTTP calls against the same server.

use std::io::Write;

use clap::{Parser, Subcommand};
use client::{ChatClient, ClientConfig, ClientSession, DEFAULT_URL, Status};
use envelope::{ChatMessage, Kind};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("terminal io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "chat-cli", about = "Terminal client for the chat relay")]
struct Cli {
    /// Websocket endpoint of the relay.
    #[arg(long, env = "CHAT_URL", default_value = DEFAULT_URL)]
    url: String,

    /// HTTP base of the same server, used by `users` and `ping`.
    #[arg(long, env = "CHAT_HTTP_URL", default_value = "http://localhost:3001")]
    http_url: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Join the room interactively (default).
    Chat,
    /// List usernames currently connected.
    Users,
    Ping,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    users: Vec<String>,
}

/// One line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Users,
    Say(&'a str),
    Blank,
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Self::Blank,
            "/quit" | "/exit" => Self::Quit,
            "/users" => Self::Users,
            _ => Self::Say(line.trim_end_matches(['\r', '\n'])),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(&cli.url, &cli.http_url).await,
        Command::Users => run_users(&cli.http_url).await,
        Command::Ping => run_ping(&cli.http_url).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

// =============================================================================
// CHAT
// =============================================================================

async fn run_chat(url: &str, http_url: &str) -> Result<(), CliError> {
    let session = ClientSession::new();
    let client = ChatClient::websocket(ClientConfig::with_url(url), &session);
    // Subscribe before mounting so the welcome is never missed.
    let mut messages = client.subscribe_messages();
    let mut status = client.subscribe_status();
    let client = client.mount();

    eprintln!("connecting to {url} (type /users to list, /quit to leave)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            received = messages.recv() => match received {
                Ok(message) => println!("{}", render(&message)),
                Err(RecvError::Lagged(skipped)) => eprintln!("! {skipped} messages skipped"),
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                eprintln!("{}", describe_status(&current));
            },
            line = lines.next_line() => match line? {
                None => break,
                Some(line) => match Input::parse(&line) {
                    Input::Quit => break,
                    Input::Blank => {}
                    Input::Users => {
                        if let Err(e) = run_users(http_url).await {
                            eprintln!("! {e}");
                        }
                    }
                    Input::Say(text) => {
                        if !client.send_message(text) {
                            let reason = client.error().unwrap_or_default();
                            eprintln!("! not sent: {reason}");
                        }
                    }
                },
            },
        }
        std::io::stdout().flush()?;
    }

    // Dropping the mount disconnects and cancels any pending reconnect.
    drop(client);
    Ok(())
}

fn render(message: &ChatMessage) -> String {
    let clock = message.timestamp.get(11..19).unwrap_or(&message.timestamp);
    match (message.kind, message.username.as_deref()) {
        (Kind::Chat, Some(username)) => format!("[{clock}] {username}: {}", message.data),
        (Kind::Chat, None) => format!("[{clock}] {}", message.data),
        (Kind::System, _) => format!("[{clock}] * {}", message.data),
    }
}

fn describe_status(status: &Status) -> String {
    match (status.connected, status.error.as_deref()) {
        (true, _) => "-- connected".to_owned(),
        (false, Some(error)) => format!("-- disconnected ({error}), retrying"),
        (false, None) => "-- disconnected, retrying".to_owned(),
    }
}

// =============================================================================
// HTTP
// =============================================================================

async fn run_users(http_url: &str) -> Result<(), CliError> {
    let users = fetch_users(http_url).await?;
    if users.is_empty() {
        println!("(nobody connected)");
    }
    for user in users {
        println!("{user}");
    }
    Ok(())
}

async fn fetch_users(http_url: &str) -> Result<Vec<String>, CliError> {
    let url = format!("{}/api/users", http_url.trim_end_matches('/'));
    let response = reqwest::Client::new().get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::ServerError {
            status: status.as_u16(),
            message: "user list unavailable".to_owned(),
        });
    }
    Ok(response.json::<UsersResponse>().await?.users)
}

async fn run_ping(http_url: &str) -> Result<(), CliError> {
    let url = format!("{}/healthz", http_url.trim_end_matches('/'));
    let response = reqwest::Client::new().get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::ServerError {
            status: status.as_u16(),
            message: "health check failed".to_owned(),
        });
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
