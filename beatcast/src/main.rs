//! Entry point for the beatcast watcher. Parses args and prints deliveries as they arrive.

use std::env;

use beatcast::types::describe;
use beatcast::ws::{connect, next_frame, normalize_url};
use chrono::Local;

struct ParsedArgs {
    url: Option<String>,
    count: Option<usize>,
    raw: bool,
}

const USAGE: &str = "Usage: beatcast [--count N|-n N] [--raw] [ws://HOST:PORT/ws | HOST:PORT]";

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut url: Option<String> = None;
    let mut count: Option<usize> = None;
    let mut raw = false; // --raw

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(USAGE.to_string()),
            "--count" | "-n" => {
                count = it.next().and_then(|v| v.parse().ok());
                if count.is_none() {
                    return Err(format!("--count expects a number. {USAGE}"));
                }
            }
            "--raw" => raw = true,
            _ if arg.starts_with("--count=") => {
                count = arg.split_once('=').and_then(|(_, v)| v.parse().ok());
                if count.is_none() {
                    return Err(format!("--count expects a number. {USAGE}"));
                }
            }
            _ => {
                if url.is_none() {
                    url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument. {USAGE}"));
                }
            }
        }
    }
    Ok(ParsedArgs { url, count, raw })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };
    let url = parsed
        .url
        .or_else(|| env::var("BEATCAST_WS").ok())
        .unwrap_or_else(|| "127.0.0.1:4000".to_string());
    let url = normalize_url(&url)?;

    let mut ws = connect(&url).await?;
    eprintln!("connected to {url}");

    let mut seen = 0usize;
    loop {
        let frame = tokio::select! {
            f = next_frame(&mut ws) => f,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(frame) = frame else {
            eprintln!("agent closed the connection");
            break;
        };
        let line = if parsed.raw {
            serde_json::to_string(&frame.data).unwrap_or_default()
        } else {
            describe(&frame)
        };
        println!("[{}] {line}", Local::now().format("%H:%M:%S"));
        seen += 1;
        if parsed.count.is_some_and(|n| seen >= n) {
            break;
        }
    }
    let _ = ws.close(None).await;
    Ok(())
}
