//! Interactive client for LineKV.
//!
//! Responses carry no length or count, so after each request the client
//! prints whatever lines arrive until the server has been quiet for a moment.

use std::io::{self, Write};
use std::time::Duration;

use bytes::BytesMut;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use linekv::{DEFAULT_HOST, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "linekv-cli", version, about = "LineKV command line client")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, short, env = "LINEKV_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// How long to wait for the first response line, in milliseconds
    #[arg(long, default_value_t = 500)]
    wait_ms: u64,

    /// Run a single command and exit
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

/// Gap after the last received bytes that ends a response
const QUIET_PERIOD: Duration = Duration::from_millis(50);

const USAGE: &str = "\
Commands:
  PING
  SET key value [EX seconds]
  GET key
  DEL key
  EXISTS key
  EXPIRE key seconds
  TTL key
  KEYS pattern
  FLUSHALL
  HELP
Type 'exit' or 'quit' to leave.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let first_wait = Duration::from_millis(args.wait_ms);

    let mut stream = TcpStream::connect(&addr).await?;

    // One-shot mode
    if !args.command.is_empty() {
        let line = args.command.join(" ");
        for out in execute_request(&mut stream, &line, first_wait).await? {
            println!("{out}");
        }
        return Ok(());
    }

    println!("Connected to {addr}");
    println!("{USAGE}");

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        print!("linekv> ");
        io::stdout().flush()?;

        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break; // EOF
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        match execute_request(&mut stream, line, first_wait).await {
            Ok(lines) => {
                for out in lines {
                    println!("{out}");
                }
            }
            Err(e) => {
                println!("(error) {e}");
                break;
            }
        }
    }

    Ok(())
}

/// Sends one request line and collects the formatted response lines.
async fn execute_request(
    stream: &mut TcpStream,
    line: &str,
    first_wait: Duration,
) -> anyhow::Result<Vec<String>> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(4096);
    let mut wait = first_wait;

    loop {
        match timeout(wait, stream.read_buf(&mut buf)).await {
            Ok(Ok(0)) => return Err(anyhow::anyhow!("server closed the connection")),
            Ok(Ok(_)) => wait = QUIET_PERIOD,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => break,
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().collect();
    Ok(format_response(verb(line), &lines))
}

fn verb(line: &str) -> String {
    line.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// Formats raw response lines for display.
fn format_response(verb: String, lines: &[&str]) -> Vec<String> {
    if verb == "KEYS" {
        if lines.is_empty() {
            return vec!["(empty list)".to_string()];
        }
        if lines.len() == 1 && lines[0].starts_with("ERR ") {
            return vec![format!("(error) {}", lines[0])];
        }
        return lines
            .iter()
            .enumerate()
            .map(|(i, key)| format!("{}) \"{}\"", i + 1, key))
            .collect();
    }

    if lines.is_empty() {
        return vec!["(no response)".to_string()];
    }

    lines
        .iter()
        .map(|line| {
            if line.starts_with("ERR ") {
                format!("(error) {line}")
            } else {
                line.to_string()
            }
        })
        .collect()
}
