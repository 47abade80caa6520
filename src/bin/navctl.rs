use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use waypoint::http::signature;
use waypoint::http::{NAVIGATE_HEADER, SESSION_HEADER, SIGNATURE_HEADER};

#[derive(Parser)]
#[command(name = "navctl")]
#[command(about = "Management CLI for the waypoint navigation server", long_about = None)]
struct Cli {
    /// Base URL; admin commands expect the admin listener, fetch the
    /// navigation listener.
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server status
    Status,
    /// List registered routes
    Routes,
    /// Show active navigation sessions
    Sessions,
    /// Fetch a navigation payload, printing frames as they arrive
    Fetch {
        /// Path to navigate to, e.g. "/products/42?tab=specs"
        path: String,
        /// Send the client-navigation marker header
        #[arg(long)]
        navigate: bool,
        /// Logical session for supersede tracking
        #[arg(long)]
        session: Option<String>,
        /// Shared secret; signs the request when set
        #[arg(long)]
        secret: Option<String>,
    },
    /// Sign a path and print the signature header value
    Sign {
        /// Path plus query to sign
        path: String,
        #[arg(long)]
        secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match &cli.command {
        Commands::Status => admin_get(&client, &cli, "status").await?,
        Commands::Routes => admin_get(&client, &cli, "routes").await?,
        Commands::Sessions => admin_get(&client, &cli, "sessions").await?,
        Commands::Fetch {
            path,
            navigate,
            session,
            secret,
        } => {
            let mut headers = HeaderMap::new();
            if *navigate {
                headers.insert(NAVIGATE_HEADER, HeaderValue::from_static("1"));
            }
            if let Some(session) = session {
                headers.insert(SESSION_HEADER, HeaderValue::from_str(session)?);
            }
            if let Some(secret) = secret {
                let header = signature::sign(path, secret, signature::unix_now());
                headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&header)?);
            }

            let res = client
                .get(format!("{}{}", cli.url, path))
                .headers(headers)
                .send()
                .await?;
            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: server returned status {}", status);
                if let Ok(text) = res.text().await {
                    eprintln!("Response: {}", text);
                }
                return Ok(());
            }

            let mut stream = res.bytes_stream();
            while let Some(chunk) = stream.next().await {
                print!("{}", String::from_utf8_lossy(&chunk?));
            }
        }
        Commands::Sign { path, secret } => {
            println!("{}", signature::sign(path, secret, signature::unix_now()));
        }
    }

    Ok(())
}

async fn admin_get(
    client: &reqwest::Client,
    cli: &Cli,
    endpoint: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = client
        .get(format!("{}/admin/{}", cli.url, endpoint))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
