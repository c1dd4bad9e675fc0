mod cli;
mod error;

use clap::Parser;
use coedit_core::{Config, PresenceHub, UserLink};
use coedit_gateway::{RelayClient, RelayServer};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::error::CoeditError;

#[tokio::main]
async fn main() -> Result<(), CoeditError> {
    // Initialize tracing
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("coedit=info,coedit_core=info,coedit_gateway=info,warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Handle ConfigSample immediately without loading config
    if let Commands::ConfigSample { output } = &cli.command {
        let path = output
            .clone()
            .unwrap_or_else(|| PathBuf::from("./coedit.sample.yaml"));
        Config::sample().save(&path)?;
        println!("Sample config written to {:?}", path);
        return Ok(());
    }

    // Load configuration
    let config = Config::load(cli.config_path.as_deref())?;

    match cli.command {
        Commands::Relay { host, port } => {
            let mut relay = config.relay.clone();
            if let Some(host) = host {
                relay.host = host;
            }
            if let Some(port) = port {
                relay.port = port;
            }
            info!("Starting relay on {}", relay.bind_addr());
            RelayServer::new(relay).start().await?;
        }
        Commands::Watch {
            doc,
            user,
            field,
            locale,
            url,
        } => {
            let focus = field.zip(locale);
            watch(&config, &doc, &user, focus, url).await?;
        }
        Commands::ConfigSample { .. } => {
            // Already handled
        }
    }

    Ok(())
}

/// Join `doc` as `user`, optionally focus a field, and log presence changes
/// until Ctrl-C.
async fn watch(
    config: &Config,
    doc: &str,
    user: &str,
    focus: Option<(String, String)>,
    url: Option<String>,
) -> Result<(), CoeditError> {
    let url = url.unwrap_or_else(|| config.client.url.clone());
    let connection = RelayClient::connect(&url, doc).await?;
    let (shout, events, guard) = connection.into_parts();
    let relay = Arc::clone(&shout);
    let hub = PresenceHub::with_config(config.presence.clone(), user, events, shout);

    let mut on_field = match &focus {
        Some((field_id, locale)) => {
            hub.focus(field_id, locale).await?;
            info!("Focused {} ({})", field_id, locale);
            hub.collaborators_for(field_id, locale).into_stream().boxed()
        }
        None => stream::pending().boxed(),
    };
    let mut everyone = hub.collaborators().into_stream().boxed();

    let period = config.client.keepalive();
    let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Leaving {}", doc);
                break;
            }
            users = everyone.next() => match users {
                Some(users) => info!("Collaborators on {}: {}", doc, format_users(&users)),
                None => break,
            },
            Some(users) = on_field.next() => {
                info!("Editing the same field: {}", format_users(&users));
            }
            _ = keepalive.tick() => match &focus {
                Some((field_id, locale)) => hub.focus(field_id, locale).await?,
                None => hub.ping().await?,
            },
        }
    }

    hub.leave().await?;
    hub.destroy();
    if let Err(e) = relay.leave_document() {
        warn!("Failed to leave {}: {}", doc, e);
    }
    drop(relay);
    drop(hub);
    guard.close(Duration::from_secs(1)).await;
    Ok(())
}

fn format_users(users: &[UserLink]) -> String {
    if users.is_empty() {
        return "(nobody)".to_string();
    }
    users
        .iter()
        .map(UserLink::id)
        .collect::<Vec<_>>()
        .join(", ")
}
