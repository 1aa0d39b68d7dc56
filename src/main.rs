use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use sharkwatch::capture::devices::DeviceEnumerator;
use sharkwatch::capture::filter::FilterCompiler;
use sharkwatch::capture::parser::PacketDecoder;
use sharkwatch::capture::session::CaptureSession;
use sharkwatch::display::sink::DisplaySink;
use sharkwatch::display::table::{StatusLine, TableRenderer};
use sharkwatch::input::{InputWatcher, TerminalKeys, WatchStatus};
use sharkwatch::models::config::{AppConfig, EvictionPolicy};
use sharkwatch::models::interface::CaptureDevice;
use sharkwatch::models::stats::CaptureStats;
use sharkwatch::utils::logging;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Live packet inspector with a rolling table of decoded traffic")]
struct Args {
    /// Index of the interface to capture from (prompted for when omitted)
    #[clap(short, long)]
    interface: Option<usize>,

    /// BPF filter expression; empty captures everything (prompted for when omitted)
    #[clap(short, long)]
    filter: Option<String>,

    /// Number of rows kept in the table
    #[clap(long)]
    max_rows: Option<usize>,

    /// What to do when the table is full
    #[clap(long, value_enum)]
    eviction: Option<EvictionPolicy>,

    /// Stop after this many packets
    #[clap(short = 'c', long)]
    count: Option<u64>,

    /// Device read timeout in milliseconds
    #[clap(long)]
    read_timeout_ms: Option<u64>,

    /// Keyboard poll and redraw interval in milliseconds
    #[clap(long)]
    poll_interval_ms: Option<u64>,

    /// Bytes captured per packet
    #[clap(long)]
    snaplen: Option<i32>,

    /// Disable promiscuous mode
    #[clap(long)]
    no_promisc: bool,

    /// Key that stops the capture
    #[clap(long)]
    cancel_key: Option<char>,

    /// JSON config file; flags given on the command line take precedence
    #[clap(long)]
    config: Option<PathBuf>,

    /// List capture devices and exit
    #[clap(short, long)]
    list: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "warn")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[clap(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Config file (or defaults) with explicit flags applied on top
    fn into_config(self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => AppConfig::default(),
        };

        if self.interface.is_some() {
            config.interface = self.interface;
        }
        if self.filter.is_some() {
            config.filter = self.filter;
        }
        if let Some(max_rows) = self.max_rows {
            config.max_rows = max_rows;
        }
        if let Some(eviction) = self.eviction {
            config.eviction = eviction;
        }
        if self.count.is_some() {
            config.max_packets = self.count;
        }
        if let Some(timeout) = self.read_timeout_ms {
            config.read_timeout_ms = timeout;
        }
        if let Some(interval) = self.poll_interval_ms {
            config.poll_interval_ms = interval;
        }
        if let Some(snaplen) = self.snaplen {
            config.snaplen = snaplen;
        }
        if self.no_promisc {
            config.promiscuous = false;
        }
        if let Some(key) = self.cancel_key {
            config.cancel_key = key;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger with specified level
    if let Err(e) = logging::init_logger(logging::get_log_level(&args.log_level), args.log_file.as_deref()) {
        eprintln!("Failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting sharkwatch v{}", env!("CARGO_PKG_VERSION"));

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let list_only = args.list;
    let mut config = args.into_config()?;

    let devices = DeviceEnumerator::list()?;
    print_devices(&devices)?;
    DeviceEnumerator::require_any(&devices)?;
    if list_only {
        return Ok(());
    }

    let index = match config.interface {
        Some(index) => index,
        None => prompt_index()?,
    };
    let device = DeviceEnumerator::select(&devices, index)?.clone();
    config.interface = Some(index);

    let expression = match &config.filter {
        Some(expression) => expression.clone(),
        None => prompt_line("Enter BPF filter (or press Enter to capture everything): ")?,
    };
    let filter = FilterCompiler::new().compile(&expression)?;

    let mut session: CaptureSession = CaptureSession::new(config.max_packets);
    session.open(&device, filter, &config)?;
    info!("Opened: {} ({})", device.display_name(), device.name);
    let filter_text = session.filter().map(|f| f.expression().to_string()).unwrap_or_default();

    let sink = Arc::new(DisplaySink::new(config.max_rows, config.eviction));
    let decoder = PacketDecoder::new();
    let capture_sink = Arc::clone(&sink);
    session.start(move |frame| capture_sink.append(decoder.decode(&frame)))?;

    let stop = session.stop_handle();
    let mut watcher = InputWatcher::new(config.cancel_key, config.poll_interval());
    let mut keys = TerminalKeys;
    let status = |state, stats: CaptureStats| StatusLine {
        device: device.formatted_display(),
        filter: filter_text.clone(),
        state,
        stats,
        max_rows: sink.max_rows(),
        eviction: sink.policy(),
        cancel_key: config.cancel_key,
    };

    let summary;
    {
        let mut renderer = TableRenderer::new(io::stdout()).context("initializing terminal")?;
        loop {
            renderer.draw(&status(session.state(), sink.stats()), &sink.snapshot())?;
            if watcher.poll(&mut keys, &stop)? == WatchStatus::Cancelled || session.is_finished() {
                break;
            }
        }

        session.stop();
        summary = session.join()?;
        renderer.draw(&status(session.state(), sink.stats()), &sink.snapshot())?;
    }

    session.close();
    print_summary(&sink.stats(), summary.frames_delivered);
    summary.into_result()?;
    Ok(())
}

/// Print the device list the operator chooses from
fn print_devices(devices: &[CaptureDevice]) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    if devices.is_empty() {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        writeln!(stdout, "No network interfaces found.")?;
        stdout.reset()?;
        return Ok(());
    }

    writeln!(stdout, "Available network interfaces:")?;
    for device in devices {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
        write!(stdout, "[{}]", device.index)?;
        stdout.reset()?;
        writeln!(
            stdout,
            " {} ({}){}",
            device.name,
            device.description.as_deref().unwrap_or("No description"),
            if device.is_loopback { " [loopback]" } else { "" }
        )?;
        writeln!(
            stdout,
            "  IP: {}",
            device.ipv4_address.map_or_else(|| "No IPv4 address".to_string(), |ip| ip.to_string())
        )?;
        writeln!(stdout, "  MAC: {}", device.mac_address.as_deref().unwrap_or("No MAC address"))?;
    }
    Ok(())
}

fn prompt_line(message: &str) -> io::Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_index() -> Result<usize> {
    let input = prompt_line("\nEnter the index of the interface to use (e.g., 0, 1, ...): ")?;
    input
        .parse()
        .with_context(|| format!("'{}' is not a valid interface index", input))
}

fn print_summary(stats: &CaptureStats, delivered: u64) {
    println!("\nCapture stopped after {} packets ({} bytes)", delivered, stats.total_bytes);
    for (protocol, count) in &stats.protocols {
        println!("  {:<14} {}", protocol.to_string(), count);
    }
    if stats.evicted > 0 {
        println!("  {} records scrolled out of the view", stats.evicted);
    }
    println!("  {:.1} packets/s", stats.packet_rate());
}
