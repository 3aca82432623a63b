//! Switchlink - command-line control for AV switchers
//!
//! Opens the configured device, waits for it to become ready, runs one
//! command and prints the resulting state.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use switchlink_core::cli::{format_output, print_exit_codes, CliResult, ExitCodes, OutputFormat};
use switchlink_core::config::{AppConfig, DeviceKind, DeviceProfile};
use switchlink_core::core::connection::ConnectionState;
use switchlink_core::core::device::{ChannelSwitcher, MatrixSwitcher};
use switchlink_core::core::error::DeviceError;
use switchlink_core::core::history::TrafficEntry;
use switchlink_core::core::simulator::{MatrixModel, SimulatedDevice, SwitcherModel};
use switchlink_core::core::state::{LockMode, MappingType, OutputTie, SwitcherSnapshot};
use switchlink_core::core::transport::{create_transport, list_ports, LineTransport};

/// On/off argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Tie type argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum TieKind {
    All,
    Video,
    Audio,
}

impl From<TieKind> for MappingType {
    fn from(kind: TieKind) -> Self {
        match kind {
            TieKind::All => Self::All,
            TieKind::Video => Self::Video,
            TieKind::Audio => Self::Audio,
        }
    }
}

/// Switchlink CLI
#[derive(Parser, Debug)]
#[command(name = "switchlink", version, about = "Control line-protocol AV switchers", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "SWITCHLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Talk to a built-in simulated device instead of the configured transport
    #[arg(long)]
    simulate: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Seconds to wait for the device to become ready
    #[arg(long, default_value_t = 10)]
    ready_timeout: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the device state
    Status,
    /// Request a fresh identify report
    Identify,
    /// Switch audio and video
    Channel { channel: i32 },
    /// Switch video only
    Video { channel: i32 },
    /// Switch audio only
    Audio { channel: i32 },
    /// Mute or unmute audio
    MuteAudio {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Show or mute the RGB output
    Rgb {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Power the projector on or off
    ProjectorPower {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Route a matrix input to an output
    Tie {
        input: i32,
        output: i32,
        #[arg(long, value_enum, default_value_t = TieKind::All)]
        kind: TieKind,
    },
    /// Print the matrix tie table
    Mappings,
    /// Print the traffic exchanged during this run
    History,
    /// List available serial ports
    ListPorts,
    /// Print the exit code table
    ExitCodes,
}

#[derive(Serialize)]
struct MatrixStatus {
    inputs: u16,
    outputs: u16,
    firmware: Option<String>,
    lock_mode: LockMode,
    mappings: Vec<OutputTie>,
}

enum Device {
    Switcher(ChannelSwitcher),
    Matrix(MatrixSwitcher),
}

impl Device {
    fn build(profile: &DeviceProfile, transport: Arc<dyn LineTransport>) -> Self {
        let settings = profile.connection_settings();
        match profile.kind {
            DeviceKind::Switcher => Self::Switcher(ChannelSwitcher::with_settings(transport, settings)),
            DeviceKind::Matrix => Self::Matrix(MatrixSwitcher::with_options(
                transport,
                settings,
                profile.settle_delay(),
            )),
        }
    }

    fn register_error_callback(&self, errors: Arc<Mutex<Vec<String>>>) {
        let callback = move |message: &str| errors.lock().push(message.to_string());
        match self {
            Self::Switcher(d) => d.register_error_callback(callback),
            Self::Matrix(d) => d.register_error_callback(callback),
        }
    }

    async fn open(&self) -> Result<(), DeviceError> {
        match self {
            Self::Switcher(d) => d.open_connection().await,
            Self::Matrix(d) => d.open_connection().await,
        }
    }

    fn is_open(&self) -> bool {
        let state = match self {
            Self::Switcher(d) => d.connection_state(),
            Self::Matrix(d) => d.connection_state(),
        };
        state != ConnectionState::Closed
    }

    async fn close(&self) -> Result<(), DeviceError> {
        match self {
            Self::Switcher(d) => d.close_connection().await,
            Self::Matrix(d) => d.close_connection().await,
        }
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<(), DeviceError> {
        match self {
            Self::Switcher(d) => d.wait_until_ready_async_timeout(timeout).await,
            Self::Matrix(d) => d.wait_until_ready_async_timeout(timeout).await,
        }
    }

    fn history(&self) -> Vec<TrafficEntry> {
        match self {
            Self::Switcher(d) => d.history(),
            Self::Matrix(d) => d.history(),
        }
    }

    fn connection_info(&self) -> String {
        match self {
            Self::Switcher(d) => d.connection_info(),
            Self::Matrix(d) => d.connection_info(),
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<AppConfig, CliResult> {
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    loaded.map_err(|e| CliResult::from(&e))
}

fn build_transport(cli: &Cli, config: &AppConfig) -> Arc<dyn LineTransport> {
    if !cli.simulate {
        return create_transport(config.transport.clone());
    }
    match config.device.kind {
        DeviceKind::Switcher => Arc::new(SimulatedDevice::new(
            "switcher",
            SwitcherModel {
                projector_attached: true,
                ..SwitcherModel::default()
            },
        )),
        DeviceKind::Matrix => Arc::new(SimulatedDevice::new(
            "matrix",
            MatrixModel::new(8, 4).with_tie(1, 1, 1).with_tie(2, 2, 2),
        )),
    }
}

fn switcher_text(s: &SwitcherSnapshot) -> String {
    let firmware = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    format!(
        "channels:        {}\nvideo channel:   {}\naudio channel:   {}\nvideo type:      {:?}\n\
         audio muted:     {}\nrgb muted:       {}\nprojector power: {}\nprojector muted: {}\n\
         switcher fw:     {}\nprojector fw:    {}",
        s.channels,
        s.video_channel,
        s.audio_channel,
        s.video_type,
        s.audio_muted,
        s.rgb_muted,
        s.projector_powered,
        s.projector_muted,
        firmware(&s.switcher_firmware),
        firmware(&s.projector_firmware),
    )
}

fn mappings_text(ties: &[OutputTie]) -> String {
    let mut out = String::from("output  video  audio");
    for tie in ties {
        out.push_str(&format!("\n{:>6}  {:>5}  {:>5}", tie.output, tie.video_input, tie.audio_input));
    }
    out
}

fn print_state(device: &Device, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = match device {
        Device::Switcher(d) => format_output(&d.snapshot(), format, switcher_text)?,
        Device::Matrix(d) => {
            let status = MatrixStatus {
                inputs: d.inputs(),
                outputs: d.outputs(),
                firmware: d.firmware_version(),
                lock_mode: d.lock_mode(),
                mappings: d.mappings(),
            };
            format_output(&status, format, |s| {
                format!(
                    "inputs: {}  outputs: {}  firmware: {}  lock: {:?}\n{}",
                    s.inputs,
                    s.outputs,
                    s.firmware.as_deref().unwrap_or("-"),
                    s.lock_mode,
                    mappings_text(&s.mappings)
                )
            })?
        }
    };
    println!("{rendered}");
    Ok(())
}

fn switcher_only(device: &Device) -> Result<&ChannelSwitcher, CliResult> {
    match device {
        Device::Switcher(d) => Ok(d),
        Device::Matrix(_) => Err(CliResult::error(
            ExitCodes::INVALID_ARGS,
            "command needs a channel switcher",
        )),
    }
}

fn matrix_only(device: &Device) -> Result<&MatrixSwitcher, CliResult> {
    match device {
        Device::Matrix(d) => Ok(d),
        Device::Switcher(_) => Err(CliResult::error(
            ExitCodes::INVALID_ARGS,
            "command needs a matrix switcher",
        )),
    }
}

async fn run_command(device: &Device, command: &Commands) -> Result<(), CliResult> {
    let sent = match command {
        Commands::Identify => match device {
            Device::Switcher(d) => d.identify().await,
            Device::Matrix(d) => d.identify().await,
        },
        Commands::Channel { channel } => switcher_only(device)?.change_channel(*channel).await,
        Commands::Video { channel } => switcher_only(device)?.change_video_channel(*channel).await,
        Commands::Audio { channel } => switcher_only(device)?.change_audio_channel(*channel).await,
        Commands::MuteAudio { state } => switcher_only(device)?.set_audio_mute(state.is_on()).await,
        Commands::Rgb { state } => switcher_only(device)?.set_rgb_visibility(state.is_on()).await,
        Commands::ProjectorPower { state } => {
            switcher_only(device)?.set_projector_power(state.is_on()).await
        }
        Commands::Tie {
            input,
            output,
            kind,
        } => {
            matrix_only(device)?
                .map_input_to_output(*input, *output, (*kind).into())
                .await
        }
        Commands::Mappings => {
            matrix_only(device)?;
            Ok(())
        }
        Commands::Status | Commands::History | Commands::ListPorts | Commands::ExitCodes => Ok(()),
    };
    sent.map_err(|e| CliResult::from(&e))
}

async fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    match cli.command {
        Commands::ExitCodes => {
            print_exit_codes();
            return Ok(CliResult::success());
        }
        Commands::ListPorts => {
            let ports = list_ports().context("listing serial ports")?;
            for port in ports {
                println!("{}", port.port_name);
            }
            return Ok(CliResult::success());
        }
        _ => {}
    }

    let config = match load_config(cli) {
        Ok(config) => config,
        Err(result) => return Ok(result),
    };
    let device = Device::build(&config.device, build_transport(cli, &config));
    let errors = Arc::new(Mutex::new(Vec::new()));
    device.register_error_callback(Arc::clone(&errors));

    if config.device.auto_open {
        tracing::debug!("auto-open enabled");
        if let Err(e) = device.open().await {
            return Ok(CliResult::from(&e));
        }
    }
    if !device.is_open() {
        tracing::info!(info = %device.connection_info(), "opening device");
        if let Err(e) = device.open().await {
            return Ok(CliResult::from(&e));
        }
    }

    let outcome = execute(cli, &config, &device).await;
    device.close().await.context("closing device")?;

    if let Err(result) = outcome {
        return Ok(result);
    }
    let reported = errors.lock().clone();
    if !reported.is_empty() {
        return Ok(CliResult::error(ExitCodes::PROTOCOL_ERROR, reported.join("; ")));
    }
    Ok(CliResult::success())
}

async fn execute(cli: &Cli, config: &AppConfig, device: &Device) -> Result<(), CliResult> {
    device
        .wait_ready(Duration::from_secs(cli.ready_timeout))
        .await
        .map_err(|e| CliResult::from(&e))?;

    run_command(device, &cli.command).await?;
    // Give the device time to answer before the state is printed.
    tokio::time::sleep(config.device.settle_delay() * 2).await;

    let printed = match cli.command {
        Commands::History => {
            let entries = device.history();
            format_output(&entries, cli.format, |entries| {
                entries
                    .iter()
                    .map(|e| e.to_text(true))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .map(|text| println!("{text}"))
            .map_err(anyhow::Error::from)
        }
        Commands::Mappings => match device {
            Device::Matrix(d) => format_output(&d.mappings(), cli.format, |t| mappings_text(t))
                .map(|text| println!("{text}"))
                .map_err(anyhow::Error::from),
            Device::Switcher(_) => Ok(()),
        },
        _ => print_state(device, cli.format),
    };
    printed.map_err(|e| CliResult::error(ExitCodes::INTERNAL_ERROR, e.to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    tracing::debug!("Starting switchlink v{}", env!("CARGO_PKG_VERSION"));

    let result = match run(&cli).await {
        Ok(result) => result,
        Err(e) => CliResult::error(ExitCodes::ERROR, format!("{e:#}")),
    };
    if let Some(message) = result.message() {
        if !result.is_success() {
            eprintln!("error: {message}");
        }
    }
    result.to_exit_code()
}
