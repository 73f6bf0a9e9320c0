use std::error::Error;
use std::sync::Arc;

use chat_sync::common::{Chat, EngineCommand};
use chat_sync::config::{self, AppConfig};
use chat_sync::identity::{IdentityProvider, TokenIdentity};
use chat_sync::network::{HttpGateway, LoopbackChannel, PushChannel, Relay, RelayClient};
use chat_sync::storage::{self, SessionStore, SqliteSession};
use chat_sync::{ChatsEngine, ChatsState};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::signal;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "chat_sync",
    version,
    about = "Chat client sync engine and push relay"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the push relay (no client, fan-out only)
    Relay {
        /// Overrides `relay_listen_addr`
        #[arg(long)]
        listen: Option<String>,
    },
    /// Store a bearer token for later commands
    Login { token: String },
    /// Forget the stored token
    Logout,
    /// List chat summaries
    Chats,
    /// Show one chat with its messages
    Open { chat_id: String },
    /// Open (or create) the chat with exactly these members
    With {
        #[arg(required = true, num_args = 1..)]
        members: Vec<String>,
    },
    /// Send a message to a chat as the logged-in user
    Send { chat_id: String, content: String },
    /// Like a message as the logged-in user
    Like { message_id: String },
    /// Delete a chat
    Delete { chat_id: String },
    /// Mark a chat as seen by the logged-in user
    Seen { chat_id: String },
    /// Follow live updates until ctrl-c
    Watch {
        /// Chat to open while watching
        #[arg(long)]
        chat: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = AppConfig::load(&cli.config);
    app_config.apply_env_overrides();

    match cli.mode {
        Mode::Relay { listen } => {
            let addr = listen.unwrap_or_else(|| app_config.relay_listen_addr.clone());
            run_relay(&addr).await?;
        }
        Mode::Login { token } => {
            open_session(&app_config)?.set_token(&token);
            println!("Token stored in {}", app_config.session_db);
        }
        Mode::Logout => {
            open_session(&app_config)?.clear();
            println!("Logged out");
        }
        mode => {
            let session = open_session(&app_config)?;
            run_client(mode, &app_config, session).await?;
        }
    }

    Ok(())
}

fn open_session(app_config: &AppConfig) -> Result<Arc<dyn SessionStore>, Box<dyn Error>> {
    storage::ensure_parent_dir(&app_config.session_db)?;
    Ok(Arc::new(SqliteSession::open(&app_config.session_db)?))
}

async fn run_relay(addr: &str) -> Result<(), Box<dyn Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let relay = Relay::new();
    let shutdown = async {
        let _ = signal::ctrl_c().await;
        log::info!("Received shutdown signal, stopping relay...");
    };
    if let Err(err) = chat_sync::network::relay::serve(listener, relay, shutdown).await {
        log::error!("Relay terminated unexpectedly: {err}");
    }
    Ok(())
}

async fn run_client(
    mode: Mode,
    app_config: &AppConfig,
    session: Arc<dyn SessionStore>,
) -> Result<(), Box<dyn Error>> {
    let identity = Arc::new(TokenIdentity::new(session.clone()));
    if session.token().is_none() {
        log::warn!("No session token stored; run `chat_sync login <token>` first");
    }

    let push: Arc<dyn PushChannel> = match RelayClient::connect(&app_config.relay_url).await {
        Ok(client) => Arc::new(client),
        Err(err) => {
            log::warn!("Relay unavailable ({err}); continuing without live updates");
            Arc::new(LoopbackChannel::connect(&Relay::new()))
        }
    };
    let gateway = Arc::new(HttpGateway::new(app_config.api_base_url.clone()));
    let mut engine = ChatsEngine::new(
        gateway,
        push.clone(),
        session,
        identity.clone(),
        app_config.refresh_debounce(),
    );

    match mode {
        Mode::Chats => {
            engine.fetch_chats_summary().await;
            print_summaries(engine.state(), identity.current_user().as_deref());
        }
        Mode::Open { chat_id } => match engine.fetch_chat_by_id(&chat_id).await {
            Some(chat) => print_chat(&chat),
            None => println!("Chat {chat_id} could not be loaded"),
        },
        Mode::With { members } => {
            engine.fetch_chats_summary().await;
            match engine.get_or_create_chat(&members).await {
                Some(chat) => print_chat(&chat),
                None => println!("Could not open a chat with {}", members.join(", ")),
            }
        }
        Mode::Send { chat_id, content } => {
            let Some(author_id) = identity.current_user() else {
                println!("Not logged in");
                return Ok(());
            };
            match engine.add_message(&chat_id, &content, &author_id).await {
                Some(message) => println!("Sent {}", message.id),
                None => println!("Message was not sent"),
            }
        }
        Mode::Like { message_id } => {
            if !engine.like_message(&message_id) {
                println!("Like was not sent");
            }
        }
        Mode::Delete { chat_id } => {
            if engine.delete_chat(&chat_id).await {
                println!("Deleted {chat_id}");
            } else {
                println!("Chat {chat_id} was not deleted");
            }
        }
        Mode::Seen { chat_id } => engine.set_last_seen(&chat_id).await,
        Mode::Watch { chat } => watch(engine, chat).await,
        Mode::Relay { .. } | Mode::Login { .. } | Mode::Logout => {}
    }

    push.close();
    Ok(())
}

async fn watch(engine: ChatsEngine, chat: Option<String>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    let mut snapshots = engine.watch();
    let driver = tokio::spawn(engine.run(cmd_rx));

    if let Some(chat_id) = chat {
        let command = EngineCommand::FetchChat {
            chat_id,
            reply: None,
        };
        if let Err(err) = cmd_tx.send(command).await {
            log::warn!("Failed to open chat: {err}");
        }
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = snapshots.borrow_and_update().clone();
                print_summaries(&state, None);
                if let Some(chat) = state.selected_chat() {
                    print_chat(chat);
                }
            }
            _ = signal::ctrl_c() => break,
        }
    }

    drop(cmd_tx);
    if let Err(err) = driver.await {
        log::error!("Engine task failed: {err}");
    }
}

fn print_summaries(state: &ChatsState, viewer: Option<&str>) {
    println!("{} chats", state.chats().len());
    for chat in state.chats() {
        let unseen = viewer.map(|user| chat.unseen_count(user)).unwrap_or(0);
        if unseen > 0 {
            println!("  {} [{}] ({unseen} new)", chat.id, chat.members.join(", "));
        } else {
            println!("  {} [{}]", chat.id, chat.members.join(", "));
        }
    }
}

fn print_chat(chat: &Chat) {
    println!("== {} [{}]", chat.id, chat.members.join(", "));
    for message in chat.messages.iter().flatten() {
        let likes = if message.likes.is_empty() {
            String::new()
        } else {
            format!(" [{} likes]", message.likes.len())
        };
        println!(
            "  {} {}: {}{likes}",
            message.created_at.format("%H:%M:%S"),
            message.author_id,
            message.content
        );
    }
}
