//! Binary entrypoint for the meshchat CLI.
//!
//! Commands:
//! - `chat [--serial <path> | --host <addr>] [--channel <n>]` - interactive chat (default)
//! - `nodes [--json]` - print the radio's node list and exit
//! - `send [--to !nodeId] <text>` - send one message and exit
//! - `init` - write a starter config file
//!
//! See the library crate docs for module-level details: `meshchat::`.
use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use meshchat::config::{Config, Overrides};
use meshchat::meshtastic::{parse_node_id, MeshInterface, BROADCAST_ADDR};

#[derive(Parser)]
#[command(name = "meshchat")]
#[command(about = "Terminal chat client for Meshtastic radios")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "meshchat.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args, Debug, Clone, Default)]
struct LinkArgs {
    /// Serial device of the radio (e.g., /dev/ttyUSB0)
    #[arg(short, long, conflicts_with = "host")]
    serial: Option<String>,

    /// Hostname or IP of a network-connected radio
    #[arg(long)]
    host: Option<String>,

    /// Channel index to chat on
    #[arg(long)]
    channel: Option<u32>,
}

impl From<&LinkArgs> for Overrides {
    fn from(args: &LinkArgs) -> Self {
        Overrides {
            serial: args.serial.clone(),
            host: args.host.clone(),
            channel: args.channel,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat {
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Print the node list reported by the radio
    Nodes {
        #[command(flatten)]
        link: LinkArgs,
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a single message and exit
    Send {
        #[command(flatten)]
        link: LinkArgs,
        /// Destination node id (e.g., !a1b2c3d4); broadcast when omitted
        #[arg(long)]
        to: Option<String>,
        /// Message text
        text: String,
    },
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat {
        link: LinkArgs::default(),
    });

    if let Commands::Init { force } = &command {
        init_logging(&Config::default(), cli.verbose, false);
        if !*force && tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
            bail!("{} already exists (use --force to overwrite)", cli.config);
        }
        Config::create_default(&cli.config).await?;
        info!("Configuration file created at {}", cli.config);
        println!("Wrote default configuration to {}", cli.config);
        return Ok(());
    }

    let mut config = Config::load_or_default(&cli.config).await?;
    let overrides = match &command {
        Commands::Chat { link } | Commands::Nodes { link, .. } | Commands::Send { link, .. } => {
            Overrides::from(link)
        }
        Commands::Init { .. } => Overrides::default(),
    };
    config.apply_overrides(&overrides);
    config.validate()?;

    let interactive = matches!(command, Commands::Chat { .. });
    init_logging(&config, cli.verbose, interactive);
    info!("Starting meshchat v{}", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Chat { .. } => {
            if let Err(e) = meshchat::ui::run_chat(&config).await {
                error!("Chat ended with error: {:#}", e);
                return Err(e);
            }
        }
        Commands::Nodes { json, .. } => {
            let mut radio = MeshInterface::connect(&config.meshtastic).await?;
            let me = radio.my_node_num();
            if json {
                let nodes: Vec<_> = radio.nodes().iter().collect();
                let out = serde_json::to_string_pretty(&nodes);
                radio.close().await;
                println!("{}", out?);
                return Ok(());
            }
            println!("{:<11} {:<6} {}", "ID", "SHORT", "LONG NAME");
            for node in radio.nodes().iter() {
                let marker = if Some(node.num) == me { " *" } else { "" };
                println!(
                    "{:<11} {:<6} {}{}",
                    node.user_id,
                    node.display_short(),
                    node.long_name,
                    marker
                );
            }
            println!("{} nodes", radio.nodes().len());
            radio.close().await;
        }
        Commands::Send { to, text, .. } => {
            let dest = match to {
                Some(id) => {
                    let num = parse_node_id(&id)
                        .ok_or_else(|| anyhow!("Invalid node id '{}' (expected !a1b2c3d4)", id))?;
                    Some(num).filter(|&n| n != BROADCAST_ADDR)
                }
                None => None,
            };
            let mut radio = MeshInterface::connect(&config.meshtastic).await?;
            let sent = radio.send_text(text.trim(), dest, config.meshtastic.channel);
            radio.close().await;
            let id = sent?;
            info!("Queued message id {}", id);
            println!("Sent message id {}", id);
        }
        Commands::Init { .. } => {}
    }

    Ok(())
}

/// `tui` keeps log output off the terminal so it cannot corrupt the screen.
fn init_logging(config: &Config, verbosity: u8, tui: bool) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config
            .logging
            .level
            .parse()
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.logging.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let echo_console = !tui && atty::is(atty::Stream::Stderr);

    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            builder.format(move |fmt, record| {
                let ts = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if echo_console {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None if tui => {
            // Nowhere safe to write while the screen is in use.
            builder.filter_level(log::LevelFilter::Off);
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
