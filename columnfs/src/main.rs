use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod backend;
mod cli;
mod config;
mod fs;


#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("columnfs=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse_args();
    let creds = cli.credentials();

    match cli.command {
        cli::Commands::Init { path } => {
            println!("Generating configuration file at: {}", path.display());
            config::Settings::write_default_config(&path)?;
            println!("Configuration file created successfully!");
            println!("Edit the file and run: columnfs -c {} ls /", path.display());
        }
        cli::Commands::Debug { subcommand } => match subcommand {
            cli::DebugCommands::ListKeys => {
                cli::debug::list_keys(&cli.config).await?;
            }
        },
        command => {
            let code = cli::ops::run(&cli.config, creds, cli.stats, command).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
