#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    use oic_discovery::cli::{Cli, Commands};
    use oic_discovery::cli::{run_discover, run_serve};

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Discover(cmd) => {
            run_discover(cmd).await?;
        }
        Commands::Serve(cmd) => {
            run_serve(cmd).await?;
        }
    }

    Ok(())
}
