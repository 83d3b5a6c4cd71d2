use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;

mod client;

use client::{ApiResponse, FaceMatchClient};

#[derive(Parser)]
#[command(name = "facematch", about = "Enroll and recognize faces through facematchd", version)]
struct Cli {
    /// Base URL of the facematchd server
    #[arg(long, env = "FACEMATCH_URL", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the single face in an image
    Enroll {
        /// Display name for this person
        #[arg(long)]
        name: String,
        /// Caller-chosen identifier
        #[arg(long)]
        id: String,
        /// JPEG or PNG image with exactly one face
        image: PathBuf,
    },
    /// Identify the single face in an image
    Recognize { image: PathBuf },
    /// Identify every face in an image
    Scan { image: PathBuf },
    /// List enrolled faces
    List,
    /// Show server status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = FaceMatchClient::new(&cli.server, Duration::from_secs(cli.timeout))?;

    let (response, no_match_ok) = match &cli.command {
        Commands::Enroll { name, id, image } => (client.enroll(name, id, image).await?, false),
        Commands::Recognize { image } => (client.recognize(image).await?, true),
        Commands::Scan { image } => (client.scan(image).await?, false),
        Commands::List => (client.list().await?, false),
        Commands::Status => (client.status().await?, false),
    };

    report(&response, no_match_ok)
}

fn report(response: &ApiResponse, no_match_ok: bool) -> Result<()> {
    if response.status.is_success() {
        println!("{}", serde_json::to_string_pretty(&response.body)?);
        return Ok(());
    }
    if no_match_ok && response.status == StatusCode::NOT_FOUND {
        println!("{}", response.error_message());
        return Ok(());
    }
    bail!("{} ({})", response.error_message(), response.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cli_parses_enroll() {
        let cli = Cli::try_parse_from([
            "facematch", "--server", "http://box:9000", "enroll", "--name", "Ada", "--id", "001", "ada.jpg",
        ])
        .unwrap();
        assert_eq!(cli.server, "http://box:9000");
        match cli.command {
            Commands::Enroll { name, id, image } => {
                assert_eq!((name.as_str(), id.as_str()), ("Ada", "001"));
                assert_eq!(image, PathBuf::from("ada.jpg"));
            }
            _ => panic!("expected enroll"),
        }
    }

    #[test]
    fn test_cli_requires_image() {
        assert!(Cli::try_parse_from(["facematch", "recognize"]).is_err());
    }

    #[test]
    fn test_report_no_match() {
        let not_found = ApiResponse {
            status: StatusCode::NOT_FOUND,
            body: json!({"message": "No matching face found"}),
        };
        assert!(report(&not_found, true).is_ok());
        assert!(report(&not_found, false).is_err());

        let bad = ApiResponse { status: StatusCode::BAD_REQUEST, body: json!({"detail": "name is required"}) };
        let err = report(&bad, true).unwrap_err();
        assert!(err.to_string().starts_with("name is required"));
    }
}
