use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

use origin_guard::protocol::{CHECK_PATH, HEALTH_PATH, REFRESH_PATH, TRUST_TOKEN_HEADER};

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Operator CLI for the origin-guard sidecar", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:3579")]
    url: String,

    /// Environment variable holding the trust token
    #[arg(short, long, default_value = "GUARD_TRUST_TOKEN")]
    token_env: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sidecar health (loaded, degraded, set size)
    Status,
    /// Ask the sidecar to reload its accepted set
    Refresh,
    /// Check whether a value is currently accepted
    Check {
        /// Candidate value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Ok(token) = std::env::var(&cli.token_env) {
        headers.insert(TRUST_TOKEN_HEADER, HeaderValue::from_str(&token)?);
    }

    let res = match cli.command {
        Commands::Status => client.get(format!("{}{}", cli.url, HEALTH_PATH)).send().await?,
        Commands::Refresh => {
            client
                .post(format!("{}{}", cli.url, REFRESH_PATH))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Check { value } => {
            client
                .post(format!("{}{}", cli.url, CHECK_PATH))
                .headers(headers)
                .json(&json!({ "candidate": value }))
                .send()
                .await?
        }
    };
    print_response(res).await?;

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => println!("(empty response)"),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        eprintln!("Error: sidecar returned status {}", status);
    }
    Ok(())
}
