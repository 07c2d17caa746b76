use anyhow::Context;
use clap::{Parser, Subcommand};
use printlink::{
    connection_params, default_config_path, init_logging, list_ports, printer_options, Config,
    LogFormat, Printer,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "printlink", version, about = "Stream G-code to a Marlin-style printer over serial.")]
struct Cli {
    /// Config file (.toml or .json); defaults to the per-user config if present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overriding the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overriding the config file
    #[arg(short, long)]
    baud: Option<u32>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream a G-code file and wait until every line is acknowledged
    Stream {
        /// G-code file
        file: PathBuf,
    },
    /// Send commands one at a time and print each response
    Send {
        /// Commands, e.g. "G28" "M114"
        #[arg(required = true)]
        lines: Vec<String>,
        /// Per-command response timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the current position
    Position,
    /// List serial ports that look like printers
    Ports,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => match default_config_path() {
            Ok(path) if path.exists() => Config::load_from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            _ => Config::default(),
        },
    };

    if let Some(port) = &cli.port {
        config.connection.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.connection.baud_rate = baud;
    }
    config.validate()?;
    Ok(config)
}

fn connect(config: &Config) -> anyhow::Result<Printer> {
    let printer = Printer::with_options(connection_params(config), printer_options(config));
    printer
        .connect(None)
        .with_context(|| format!("connecting to {}", config.connection.port))?;
    printer.start()?;
    Ok(printer)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    })?;

    match &cli.command {
        Command::Ports => {
            for port in list_ports()? {
                println!("{}\t{}", port.port_name, port.description);
            }
        }
        Command::Stream { file } => {
            let config = load_config(&cli)?;
            let printer = connect(&config)?;
            let count = printer
                .load_file(file)
                .with_context(|| format!("reading {}", file.display()))?;
            tracing::info!("Streaming {} commands from {}", count, file.display());
            printer.disconnect(true);
        }
        Command::Send { lines, timeout_ms } => {
            let config = load_config(&cli)?;
            let printer = connect(&config)?;
            let timeout = timeout_ms.map(Duration::from_millis);
            for line in lines {
                let response = printer.get_response(line, timeout)?;
                if response.is_empty() {
                    tracing::warn!("No response to {:?} in time", line);
                }
                print!("{}", response);
            }
            printer.disconnect(false);
        }
        Command::Position => {
            let config = load_config(&cli)?;
            let printer = connect(&config)?;
            let position = printer.current_position()?;
            let mut axes: Vec<_> = position.into_iter().collect();
            axes.sort_by(|a, b| a.0.cmp(&b.0));
            for (axis, value) in axes {
                println!("{}: {:.3}", axis, value);
            }
            printer.disconnect(false);
        }
    }

    Ok(())
}
