#![forbid(unsafe_code)]

//! `graph-conductor-ctl`: operator CLI for a running `graph-conductor`.
//!
//! Sends JSON requests to the HTTP control surface and prints the
//! envelope's `data` on success.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(
    name = "graph-conductor-ctl",
    about = "Operator CLI for graph-conductor",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the control surface.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List active sessions.
    List,

    /// Start a worker for a channel.
    Start {
        /// Channel name.
        channel: String,
        /// Explicit graph; resolved from the language when omitted.
        #[arg(long)]
        graph: Option<String>,
        /// Speech recognition language.
        #[arg(long)]
        language: Option<String>,
        /// Voice type (`male`, `female`).
        #[arg(long)]
        voice: Option<String>,
        /// Customer whose profile seeds defaults.
        #[arg(long)]
        customer: Option<String>,
        /// Remote stream to subscribe to.
        #[arg(long)]
        remote_stream_id: Option<u32>,
    },

    /// Stop a channel's worker.
    Stop {
        /// Channel name.
        channel: String,
    },

    /// Send a heartbeat for a channel.
    Ping {
        /// Channel name.
        channel: String,
    },

    /// Issue a publisher token.
    Token {
        /// Channel name.
        channel: String,
        /// User id bound into the token.
        #[arg(long, default_value_t = 0)]
        uid: u32,
    },
}

fn start_body(
    channel: &str,
    graph: Option<&String>,
    language: Option<&String>,
    voice: Option<&String>,
    customer: Option<&String>,
    remote_stream_id: Option<u32>,
) -> Value {
    let mut req = json!({ "channel_name": channel });
    let optional = [
        ("graph_name", graph),
        ("asr_language", language),
        ("voice_type", voice),
        ("customer_id", customer),
    ];
    for (key, value) in optional
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
    {
        req[key] = Value::String(value.clone());
    }
    if let Some(id) = remote_stream_id {
        req["remote_stream_id"] = Value::from(id);
    }
    req
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Cli::parse();
    let base = args.server.trim_end_matches('/');
    let client = reqwest::Client::new();

    let request = match &args.command {
        Command::List => client.get(format!("{base}/sessions")),
        Command::Start {
            channel,
            graph,
            language,
            voice,
            customer,
            remote_stream_id,
        } => client.post(format!("{base}/start")).json(&start_body(
            channel,
            graph.as_ref(),
            language.as_ref(),
            voice.as_ref(),
            customer.as_ref(),
            *remote_stream_id,
        )),
        Command::Stop { channel } => client
            .post(format!("{base}/stop"))
            .json(&json!({ "channel_name": channel })),
        Command::Ping { channel } => client
            .post(format!("{base}/ping"))
            .json(&json!({ "channel_name": channel })),
        Command::Token { channel, uid } => client
            .post(format!("{base}/token/generate"))
            .json(&json!({ "channel_name": channel, "uid": uid })),
    };

    match send(request).await {
        Ok(envelope) => {
            let code = envelope.get("code").and_then(Value::as_str).unwrap_or("");
            if code == "0" {
                match envelope.get("data") {
                    Some(Value::Null) | None => println!("OK"),
                    Some(data) => {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    }
                }
            } else {
                let msg = envelope
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                eprintln!("Error {code}: {msg}");
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Failed to reach server: {err}");
            eprintln!("Is graph-conductor listening at '{base}'?");
            std::process::exit(1);
        }
    }
}

/// Send a request and decode the response envelope.
async fn send(request: reqwest::RequestBuilder) -> Result<Value, reqwest::Error> {
    request.send().await?.json::<Value>().await
}
