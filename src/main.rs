//! sa-token command-line entry point

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sa_token::auth::{HttpTokenExchanger, JwtAssertionBuilder, TokenExchange};
use sa_token::config::Config;
use sa_token::diagnose;

/// Print usage information
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  sa-token token <config.yaml> [scope]");
    eprintln!("  sa-token diagnose <config.yaml> [--offline]");
    eprintln!();
    eprintln!("sa-token - Google service account access tokens via signed JWT assertions");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  token       Acquire an access token and print it as JSON");
    eprintln!("  diagnose    Check each stage of token acquisition and print a report");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  sa-token token /etc/sa-token/config.yaml https://www.googleapis.com/auth/drive.readonly");
}

#[derive(Debug, Serialize)]
struct TokenOutput<'a> {
    access_token: &'a str,
    token_type: &'a str,
    expires_in: Option<u64>,
    attempts: u32,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        print_usage();
        std::process::exit(1);
    }

    let command = args[1].as_str();
    let config_path = PathBuf::from(&args[2]);
    let extra = args.get(3).map(String::as_str);

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging on stderr so stdout stays machine-readable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Loaded configuration from {:?}", config_path);

    match command {
        "token" => {
            let scope = extra.unwrap_or(&config.token.scope);
            let source = config.token_source()?;

            match source.acquire(scope).await {
                Ok(acquisition) => {
                    print_json(&TokenOutput {
                        access_token: acquisition.token.as_str(),
                        token_type: acquisition.token.token_type(),
                        expires_in: acquisition.token.expires_in().map(|d| d.as_secs()),
                        attempts: acquisition.trace.attempt_count(),
                    })?;
                }
                Err(e) => {
                    error!("Token acquisition failed: {}", e);
                    print_json(&e.to_body())?;
                    std::process::exit(1);
                }
            }
        }
        "diagnose" => {
            let offline = match extra {
                None => false,
                Some("--offline") => true,
                Some(other) => {
                    eprintln!("Unknown option: {}", other);
                    print_usage();
                    std::process::exit(1);
                }
            };

            let credential_json = config.credentials.source.load()?;
            let exchanger =
                HttpTokenExchanger::new(config.token.endpoint.clone(), config.token.timeout);
            let exchanger: Option<&dyn TokenExchange> =
                if offline { None } else { Some(&exchanger) };

            let report = diagnose::run(
                &credential_json,
                config.credentials.requirements,
                &config.token.scope,
                &JwtAssertionBuilder::default(),
                exchanger,
            )
            .await;

            print_json(&report)?;
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
