use crate::cli::ui;
use crate::discovery::UdpTransportConfig;
use crate::protocol::DEFAULT_COAP_PORT;
use crate::server::{LocalResource, ResourceResponder};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "serve", about = "Answer discovery requests for local resources")]
pub struct ServeCommand {
    /// Resource to host, as `href[,rt[,if]]`; repeatable
    #[arg(short, long = "resource", required = true)]
    resources: Vec<String>,

    #[arg(short, long, default_value_t = DEFAULT_COAP_PORT)]
    port: u16,

    /// Mark hosted resources observable
    #[arg(long)]
    observable: bool,
}

fn parse_resource(arg: &str, observable: bool) -> LocalResource {
    let mut parts = arg.splitn(3, ',').map(str::trim);
    let href = parts.next().unwrap_or_default();
    let rt = parts.next().filter(|s| !s.is_empty()).unwrap_or("core.resource");
    let iface = parts.next().filter(|s| !s.is_empty()).unwrap_or("oc.mi.def");
    LocalResource::new(href, rt, iface).observable(observable)
}

pub async fn execute(command: ServeCommand) -> anyhow::Result<()> {
    let mut responder = ResourceResponder::new(UdpTransportConfig {
        port: command.port,
        ..UdpTransportConfig::default()
    });

    for arg in &command.resources {
        let resource = parse_resource(arg, command.observable);
        ui::display_info(&format!(
            "Hosting {} (rt={}, if={})",
            resource.href,
            resource.resource_types.join(","),
            resource.interfaces.join(",")
        ));
        responder.add_resource(resource)?;
    }

    let addr = responder.start().await?;
    ui::display_success(&format!("Answering discovery requests on {}", addr));

    tokio::signal::ctrl_c().await?;

    println!("\nShutting down responder...");
    responder.stop();

    Ok(())
}
