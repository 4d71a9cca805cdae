use std::io::Write as _;

use anyhow::Context as _;
use chat_relay_client::{ChatClient, ClientConfig, abort_pair};
use chat_relay_core::observability::init_observability;
use chat_relay_core::{ChatMessage, RequestEncoding, StreamChatResult};
use clap::Parser;

/// Send one prompt to a chat relay and print the answer as it streams.
#[derive(Parser, Debug)]
#[command(name = "chat-relay", version)]
struct Args {
    /// User prompt.
    prompt: String,

    /// Optional system prompt sent before the user prompt.
    #[arg(long, short)]
    system: Option<String>,

    /// Relay chat endpoint (defaults to `CHAT_RELAY_URL` or the local relay).
    #[arg(long)]
    url: Option<String>,

    /// Send the request as plain JSON instead of the encoded form.
    #[arg(long)]
    plain_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_observability();
    let args = Args::parse();

    let mut config = ClientConfig::from_env();
    if let Some(url) = args.url {
        config.endpoint = url;
    }
    if args.plain_json {
        config.request_encoding = RequestEncoding::PlainJson;
    }
    let client = ChatClient::new(config).context("failed to create chat client")?;

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(args.prompt));

    let (abort, signal) = abort_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let mut stdout = std::io::stdout();
    let result = client
        .stream_chat_response(messages, &signal, |fragment, _| {
            let _ = write!(stdout, "{fragment}");
            let _ = stdout.flush();
        })
        .await;
    println!();

    match result {
        StreamChatResult::Ok { .. } => Ok(()),
        StreamChatResult::Aborted { content } => {
            eprintln!("[aborted after {} characters]", content.chars().count());
            Ok(())
        }
        StreamChatResult::Error { message, .. } => anyhow::bail!(message),
    }
}
