use anyhow::Result;
use std::io::Write;

use backend_gateway::auth::SessionState;
use backend_gateway::config::{Command, Config};
use backend_gateway::models::Method;
use backend_gateway::{Gateway, UploadFile};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true);

    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::debug!(
        base_url = %config.api_base_url,
        simulation_allowed = config.simulation_allowed,
        timeout_ms = config.request_timeout.as_millis() as u64,
        "Gateway configured"
    );

    let gateway = Gateway::new(&config)?;
    let session_rx = gateway.store.subscribe();

    let result = run(&gateway, command).await;

    if *session_rx.borrow() == SessionState::Expired {
        eprintln!("Session expired. Log in again with: gatewayctl login <username>");
    }

    result
}

async fn run(gateway: &Gateway, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let data = gateway.session.login(&username, &password).await?;
            print_json(&data.user)?;
        }
        Command::Logout => {
            gateway.session.logout().await?;
        }
        Command::Status => {
            let status = gateway.session.status().await;
            print_json(&serde_json::json!({
                "isLoggedIn": status.is_logged_in,
                "user": status.user,
            }))?;
        }
        Command::Get { path, no_auth } => {
            let value = gateway
                .dispatcher
                .request(Method::Get, &path, None, !no_auth)
                .await?;
            print_json(&value)?;
        }
        Command::Post { path, body, no_auth } => {
            let body = serde_json::from_str(&body)?;
            let value = gateway
                .dispatcher
                .request(Method::Post, &path, Some(body), !no_auth)
                .await?;
            print_json(&value)?;
        }
        Command::Put { path, body, no_auth } => {
            let body = serde_json::from_str(&body)?;
            let value = gateway
                .dispatcher
                .request(Method::Put, &path, Some(body), !no_auth)
                .await?;
            print_json(&value)?;
        }
        Command::Delete { path, no_auth } => {
            let value = gateway
                .dispatcher
                .request(Method::Delete, &path, None, !no_auth)
                .await?;
            print_json(&value)?;
        }
        Command::Upload { path, file } => {
            let file = UploadFile::from_path(&file).await?;
            let value = gateway
                .upload
                .upload(&path, file, true, |percent| {
                    eprint!("\rUploading... {:>3}%", percent);
                    let _ = std::io::stderr().flush();
                })
                .await;
            eprintln!();
            print_json(&value?)?;
        }
    }

    if gateway.degraded.is_degraded() {
        tracing::warn!("Backend unreachable, responses above were simulated");
    }

    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
