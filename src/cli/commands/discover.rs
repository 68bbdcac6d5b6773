use crate::cli::ui;
use crate::config::{EmptyResultPolicy, EngineConfig};
use crate::discovery::{DiscoveryEngine, UdpTransport, UdpTransportConfig};
use crate::protocol::{DEFAULT_COAP_PORT, DiscoveryQuery};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "discover", about = "Discover OIC resources on the network")]
pub struct DiscoverCommand {
    /// Discovery window in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Only report resources of this type (rt)
    #[arg(long = "rt")]
    resource_type: Option<String>,

    /// Only report resources exposing this interface (if)
    #[arg(long = "if")]
    interface: Option<String>,

    /// Query a single service (ip:port) instead of the multicast group
    #[arg(long)]
    host: Option<String>,

    /// Port services listen on
    #[arg(short, long, default_value_t = DEFAULT_COAP_PORT)]
    port: u16,

    /// Fail when nothing is found
    #[arg(long)]
    require_results: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, env = "OIC_DISCOVERY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    json: bool,
}

impl DiscoverCommand {
    fn engine_config(&self) -> crate::Result<EngineConfig> {
        let mut config = match self.config {
            Some(ref path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(secs) = self.timeout {
            config = config.with_discovery_window(Duration::from_secs(secs));
        }
        if self.require_results {
            config = config.with_empty_result(EmptyResultPolicy::Fail);
        }
        Ok(config)
    }

    fn query(&self) -> DiscoveryQuery {
        let mut query = DiscoveryQuery::all();
        if let Some(ref rt) = self.resource_type {
            query = query.resource_type(rt.clone());
        }
        if let Some(ref iface) = self.interface {
            query = query.interface(iface.clone());
        }
        if let Some(ref host) = self.host {
            query = query.host(host.clone());
        }
        query
    }
}

pub async fn execute(command: DiscoverCommand) -> anyhow::Result<()> {
    let config = command.engine_config()?;
    let transport = UdpTransport::bind(&UdpTransportConfig {
        port: command.port,
        ..UdpTransportConfig::default()
    })?;

    let engine = DiscoveryEngine::new(transport, config);
    let (handle, receiver) = engine.discover(command.query())?;

    if !command.json {
        ui::display_info(&format!(
            "Discovering for {:?} (session {})...",
            engine.config().discovery_window(),
            handle.id()
        ));
    }

    let report = tokio::select! {
        report = receiver.collect() => report,
        _ = tokio::signal::ctrl_c() => {
            engine.cancel_discovery(&handle)?;
            anyhow::bail!("Discovery interrupted");
        }
    };
    engine.shutdown();

    if command.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        ui::display_report(&report);
    }

    Ok(())
}
