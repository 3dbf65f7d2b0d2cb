//! Query a running bridge manager
//!
//! ```text
//! bridge_query lookup LASERrobot1front_scan
//! bridge_query device --device-type LASER --model robot1 --part front_scan
//! bridge_query list --filter LASER
//! bridge_query map --filter robot1
//! ```

use anyhow::{bail, Context, Result};
use bridge::{DeviceIdentity, ServiceRequest, ServiceResponse};
use bridge_config::BridgeSettings;
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use transport::{Endpoint, IoContext, Requestor, RoutingTag, TransportError};

#[derive(Parser, Debug)]
#[command(author, version, about = "Query the bridge port registry", long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bridge host, defaults to transport.peer_address
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to query, defaults to the configured control or service port
    #[arg(short, long)]
    port: Option<u16>,

    /// How long to wait for the bridge to connect and answer
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up the port leased to an identity key
    Lookup { key: String },

    /// Look up the port leased to a device identity
    Device {
        #[arg(long)]
        device_type: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        part: String,
        #[arg(long, default_value = "")]
        sub_part: String,
    },

    /// Flat identity key to port assignments
    List {
        #[arg(long)]
        filter: Option<String>,
    },

    /// Model / device type / part / sub-part map
    Map {
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = BridgeSettings::load(args.config.as_deref())
        .context("Failed to load bridge configuration")?;

    let host = match args.host {
        Some(host) => host,
        None => settings.transport.peer_ip()?,
    };
    let timeout = Duration::from_millis(args.timeout_ms);
    let is_lookup = matches!(args.command, Command::Lookup { .. } | Command::Device { .. });

    let (port, payload) = match args.command {
        Command::Lookup { key } => (settings.registry.control_port, key.into_bytes()),
        Command::Device {
            device_type,
            model,
            part,
            sub_part,
        } => {
            let identity = DeviceIdentity::new(device_type, model, part).with_sub_part(sub_part);
            (settings.registry.control_port, identity.key().into_bytes())
        }
        Command::List { filter } => (
            settings.registry.service_port,
            serde_json::to_vec(&ServiceRequest::new("device_list", filter))?,
        ),
        Command::Map { filter } => (
            settings.registry.service_port,
            serde_json::to_vec(&ServiceRequest::new("device_map", filter))?,
        ),
    };
    let port = args.port.unwrap_or(port);

    let reply = request(settings, host, port, &payload, timeout)?;

    if is_lookup {
        let text = String::from_utf8_lossy(&reply);
        if text == "0" {
            bail!("No port leased for '{}'", String::from_utf8_lossy(&payload));
        }
        println!("{text}");
    } else {
        let response: ServiceResponse =
            serde_json::from_slice(&reply).context("Bridge sent an invalid JSON reply")?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}

fn request(
    settings: BridgeSettings,
    host: IpAddr,
    port: u16,
    payload: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>> {
    let context = IoContext::new(settings.transport).context("Failed to start the I/O context")?;
    let requestor = Requestor::open(
        &context,
        Endpoint::connect(host, port),
        RoutingTag::untagged(),
    )?;

    if !requestor.wait_for_peers(1, timeout) {
        return Err(TransportError::network(format!(
            "Bridge at {} is not reachable",
            SocketAddr::new(host, port)
        ))
        .into());
    }
    if !requestor.send_request(payload)? {
        bail!("Failed to send request to {host}:{port}");
    }

    let reply = requestor
        .receive_response_timeout(timeout, false)?
        .ok_or_else(|| TransportError::timeout("receive_response", timeout.as_millis() as u64))
        .with_context(|| format!("No reply from {host}:{port}"))?;
    requestor.close();
    Ok(reply.to_vec())
}
