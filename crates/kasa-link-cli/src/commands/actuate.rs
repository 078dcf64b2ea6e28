//! Relay, brightness, countdown and alias commands.
//!
//! Each one resolves its target with a short discovery burst, then calls the
//! matching engine entry point.

use kasa_link_core::EngineConfig;

use super::{targeted_config, Session};
use crate::cli::{AliasArgs, BrightnessArgs, CountdownArgs, RelayArgs};
use crate::error::{CliError, Result};
use crate::output::get_formatter;

async fn connect(
    config: EngineConfig,
    target: &str,
    duration_secs: u64,
    json: bool,
) -> Result<(Session, String)> {
    let session = Session::start(targeted_config(config, target, duration_secs), !json).await?;
    match session.find(target).await {
        Ok(device) => Ok((session, device.id)),
        Err(e) => {
            session.shutdown().await?;
            Err(e)
        }
    }
}

/// Shut the session down, then report `result`.
async fn finish(
    session: Session,
    result: kasa_link_core::error::Result<()>,
    target: &str,
    action: &str,
    json: bool,
) -> Result<()> {
    session.shutdown().await?;
    let formatter = get_formatter(json);
    println!("{}", formatter.format_action(target, action, result.is_ok()));
    result.map_err(CliError::from)
}

pub async fn run_relay(args: RelayArgs, config: EngineConfig, json: bool) -> Result<()> {
    let (session, id) = connect(config, &args.target, args.discovery_duration, json).await?;
    let on = args.state.is_on();

    let (result, action) = match &args.child {
        Some(child) => (
            session.engine.set_child_relay(&id, child, on).await,
            format!("outlet {} {}", child, if on { "on" } else { "off" }),
        ),
        None => (
            session.engine.set_relay(&id, on).await,
            format!("relay {}", if on { "on" } else { "off" }),
        ),
    };

    finish(session, result, &args.target, &action, json).await
}

pub async fn run_brightness(args: BrightnessArgs, config: EngineConfig, json: bool) -> Result<()> {
    let (session, id) = connect(config, &args.target, args.discovery_duration, json).await?;
    let result = session.engine.set_brightness(&id, args.level).await;
    let action = format!("brightness {}%", args.level);
    finish(session, result, &args.target, &action, json).await
}

pub async fn run_countdown(args: CountdownArgs, config: EngineConfig, json: bool) -> Result<()> {
    let (session, id) = connect(config, &args.target, args.discovery_duration, json).await?;
    let result = session.engine.set_countdown(&id, args.seconds).await;
    let action = if args.seconds == 0 {
        "countdown cleared".to_string()
    } else {
        format!("countdown {}s", args.seconds)
    };
    finish(session, result, &args.target, &action, json).await
}

pub async fn run_alias(args: AliasArgs, config: EngineConfig, json: bool) -> Result<()> {
    if args.name.trim().is_empty() {
        return Err(CliError::InvalidArgument("alias cannot be empty".to_string()));
    }

    let (session, id) = connect(config, &args.target, args.discovery_duration, json).await?;
    let result = session.engine.set_alias(&id, &args.name).await;
    let action = format!("renamed to '{}'", args.name);
    finish(session, result, &args.target, &action, json).await
}
