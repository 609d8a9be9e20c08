use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use chat_client::{
    config::{load_settings_from, DEFAULT_SETTINGS_FILE},
    ChatClient, ClientEvent, ConnectionState, SummaryDisplay,
};
use chat_shared::domain::{Author, PresenceStatus, TranscriptEntry, UserId};
use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides the gateway base URL from settings.
    #[arg(long)]
    gateway_url: Option<String>,
    #[arg(long)]
    ws_url: Option<String>,
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Select(UserId),
    Friends,
    Requests,
    Add(UserId),
    Accept(UserId),
    Reject(UserId),
    Sessions,
    Logout,
    Quit,
    Say(String),
}

fn parse_input(line: &str) -> Result<Input> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.starts_with('/') {
        return Ok(Input::Say(line.to_string()));
    }
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let mut user_arg = || -> Result<UserId> {
        match parts.next().map(str::parse::<i64>) {
            Some(Ok(id)) => Ok(UserId(id)),
            Some(Err(_)) => bail!("user id must be a number"),
            None => bail!("{command} needs a user id"),
        }
    };
    Ok(match command {
        "/select" => Input::Select(user_arg()?),
        "/add" => Input::Add(user_arg()?),
        "/accept" => Input::Accept(user_arg()?),
        "/reject" => Input::Reject(user_arg()?),
        "/friends" => Input::Friends,
        "/requests" => Input::Requests,
        "/sessions" => Input::Sessions,
        "/logout" => Input::Logout,
        "/quit" => Input::Quit,
        other => bail!("unknown command {other}"),
    })
}

fn render_entry(entry: &TranscriptEntry) -> String {
    let when = entry
        .timestamp
        .map(|ts| ts.format("%H:%M:%S ").to_string())
        .unwrap_or_default();
    match entry.author {
        Author::Me => format!("{when}me: {}", entry.content),
        Author::Peer(id) => format!("{when}{id}: {}", entry.content),
        Author::Unattributed => format!("{when}{}", entry.content),
    }
}

fn print_event(event: ClientEvent) {
    match event {
        ClientEvent::SessionStarted { user_id, username } => {
            println!("* logged in as {username} (id {user_id})")
        }
        ClientEvent::SystemNotice(text) => println!("* {text}"),
        ClientEvent::ConnectionStateChanged(ConnectionState::Connecting) => {
            println!("* connecting...")
        }
        ClientEvent::ConnectionStateChanged(_) => {}
        ClientEvent::TranscriptReset { peer_id, entries } => {
            if let Some(peer_id) = peer_id {
                if !entries.is_empty() {
                    println!("--- conversation with {peer_id} ---");
                }
            }
            for entry in &entries {
                println!("{}", render_entry(entry));
            }
        }
        ClientEvent::TranscriptAppended { entry, .. } => println!("{}", render_entry(&entry)),
        ClientEvent::FriendListChanged(friends) => {
            if friends.is_empty() {
                println!("* no friends yet");
            }
            for friend in friends {
                let presence = match friend.presence {
                    Some(PresenceStatus::Online) => " (online)",
                    Some(PresenceStatus::Offline) => " (offline)",
                    None => "",
                };
                println!("  friend {} {}{presence}", friend.user_id, friend.username);
            }
        }
        ClientEvent::FriendRequestsChanged(requests) => {
            for request in requests {
                println!(
                    "  request from {} {}",
                    request.sender_id, request.sender_username
                );
            }
        }
        ClientEvent::SummariesChanged(state) => match state.display() {
            SummaryDisplay::Blank | SummaryDisplay::Spinner => {}
            SummaryDisplay::NoRecentSessions => println!("* no recent sessions"),
            SummaryDisplay::Entries(summaries) => {
                for summary in summaries {
                    println!(
                        "  {} {}: {}",
                        summary.timestamp.format("%Y-%m-%d %H:%M"),
                        summary.peer_id,
                        summary.last_message
                    );
                }
            }
            SummaryDisplay::Error(message) => println!("! sessions unavailable: {message}"),
        },
        ClientEvent::AuthRequired => println!("! session expired, please log in again"),
        ClientEvent::LoggedOut => println!("* logged out"),
        ClientEvent::Error(err) => println!("! {}", err.message),
    }
}

async fn print_events(mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "cli: dropped client events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_input(client: &ChatClient, input: Input) -> bool {
    // Failures already reach the user through the event stream.
    match input {
        Input::Select(peer_id) => {
            let _ = client.select_peer(peer_id).await;
        }
        Input::Friends => {
            client.refresh_friends().await;
        }
        Input::Requests => {
            let _ = client.refresh_requests().await;
        }
        Input::Add(target) => {
            let _ = client.add_friend(target).await;
        }
        Input::Accept(sender) => {
            let _ = client.respond_to_friend_request(sender, true).await;
        }
        Input::Reject(sender) => {
            let _ = client.respond_to_friend_request(sender, false).await;
        }
        Input::Sessions => {
            let _ = client.refresh_summaries().await;
        }
        Input::Logout => {
            client.logout().await;
            return false;
        }
        Input::Quit => return false,
        Input::Say(text) => match client.conversation().selected_peer().await {
            Some(peer_id) => {
                let _ = client.send(peer_id, &text).await;
            }
            None => println!("! select a conversation first with /select <user id>"),
        },
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings_from(&cli.config, |key| std::env::var(key).ok());
    if let Some(gateway_url) = cli.gateway_url {
        settings.gateway_url = gateway_url;
    }
    if let Some(ws_url) = cli.ws_url {
        settings.ws_url = Some(ws_url);
    }

    let client: Arc<ChatClient> = ChatClient::new(settings);
    let printer = tokio::spawn(print_events(client.subscribe_events()));

    match cli.command {
        Command::Register { username, password } => {
            let user_id = client.register(&username, &password).await?;
            println!("registered {username} with id {user_id}");
            return Ok(());
        }
        Command::Login { username, password } => {
            client.login(&username, &password).await?;
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_input(&line) {
            Ok(input) => {
                if !run_input(&client, input).await {
                    break;
                }
            }
            Err(err) => println!("! {err}"),
        }
    }

    if client.credentials().is_authenticated() {
        client.logout().await;
    }
    printer.abort();
    Ok(())
}
