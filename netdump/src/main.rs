#![warn(clippy::all)]

mod display;

use clap::{crate_version, ArgGroup, Parser};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

use libnetdump::{
    compile, open_source, CaptureConfig, CaptureLoop, Mode, PacketHandler, SourceSelector,
};
use libnetdump_tools::{Config, Error};

use crate::display::{JsonPrinter, TextPrinter};

/// Capture, filter and decode network traffic
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["interface", "read"])))]
struct Args {
    /// Capture live on this network interface
    #[arg(short, long, value_name = "IFACE")]
    interface: Option<String>,

    /// Read frames from a capture file ("-" for standard input)
    #[arg(short, long, value_name = "FILE")]
    read: Option<PathBuf>,

    /// Write raw frames to a pcap file instead of decoding them
    #[arg(short, long, value_name = "FILE")]
    write: Option<PathBuf>,

    /// Stop after this number of frames
    #[arg(short = 'c', long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    count: Option<u64>,

    /// Only TCP traffic (same as the `tcp` keyword)
    #[arg(long, conflicts_with = "udp")]
    tcp: bool,

    /// Only UDP traffic (same as the `udp` keyword)
    #[arg(long)]
    udp: bool,

    /// Only traffic from or to this port (same as `port PORT`)
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Configuration file
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Print decoded frames as JSON, one object per line
    #[arg(long)]
    json: bool,

    /// Print the compiled filter program and exit
    #[arg(short = 'd', long)]
    dump_filter: bool,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Filter expression, e.g. `tcp port 80`
    expression: Vec<String>,
}

impl Args {
    /// Combine the positional expression with the flag forms
    fn filter_expression(&self) -> Option<String> {
        let mut parts = Vec::new();
        let expression = self.expression.join(" ");
        if !expression.trim().is_empty() {
            parts.push(expression);
        }
        if self.tcp {
            parts.push("tcp".to_owned());
        }
        if self.udp {
            parts.push("udp".to_owned());
        }
        if let Some(port) = self.port {
            parts.push(format!("port {port}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" and "))
        }
    }

    fn source(&self) -> SourceSelector {
        match (&self.interface, &self.read) {
            (Some(name), _) => SourceSelector::Interface(name.clone()),
            (None, Some(path)) => SourceSelector::File(path.clone()),
            // clap requires one of them
            (None, None) => SourceSelector::File(PathBuf::from("-")),
        }
    }
}

fn load_config(config: &mut Config, filename: &Path) -> Result<(), io::Error> {
    debug!("Loading configuration {}", filename.display());
    let file = File::open(filename)?;
    config.load_config(file)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { Level::DEBUG } else { Level::WARN };
    let env_filter = EnvFilter::try_from_env("NETDUMP_LOG")
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .compact()
        .init();
}

/// Compile the filter for the link type of the source, and print it
fn dump_filter(config: &CaptureConfig) -> Result<(), Error> {
    let mut source = open_source(config)?;
    let result = source.activate().and_then(|_| {
        compile(config.filter.as_deref().unwrap_or(""), source.link_type())
    });
    source.close();
    print!("{}", result?.program());
    Ok(())
}

fn run(config: CaptureConfig, json: bool, running: &AtomicBool) -> Result<(), Error> {
    let stdout = io::stdout().lock();
    let mut handler: Box<dyn PacketHandler> = if json {
        Box::new(JsonPrinter::new(stdout))
    } else {
        Box::new(TextPrinter::new(stdout))
    };
    let mut capture = CaptureLoop::new(config);
    let summary = capture.run(handler.as_mut(), running)?;
    if summary.decode_errors > 0 {
        info!("{} frames could not be fully decoded", summary.decode_errors);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    debug!("netdump {}", crate_version!());

    let mut config = Config::default();
    if let Some(filename) = args.config.as_ref() {
        if let Err(e) = load_config(&mut config, filename) {
            eprintln!("netdump: config: {}: {e}", filename.display());
            return ExitCode::FAILURE;
        }
    }

    let mode = match args.write.as_ref() {
        Some(path) => Mode::Forward { path: path.clone() },
        None => Mode::Print,
    };
    let mut capture_config = CaptureConfig::new(args.source(), mode).with_tunables(&config);
    if let Some(expression) = args.filter_expression() {
        debug!("Filter expression: {expression}");
        capture_config = capture_config.with_filter(expression);
    }
    if let Some(count) = args.count {
        capture_config = capture_config.with_count(count);
    }

    let result = if args.dump_filter {
        dump_filter(&capture_config)
    } else {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        }) {
            warn!("Could not install the interrupt handler: {e}");
        }
        run(capture_config, args.json, &running)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("netdump: {}: {e}", e.stage());
            ExitCode::FAILURE
        }
    }
}
