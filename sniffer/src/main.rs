#![warn(clippy::all)]

use clap::{crate_version, Parser};
use tracing::{debug, info, warn, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use libsniffer::*;
use libsniffer_tools::{CaptureBackend, CaptureState, Config, Error, FileBackend};

/// Packet capture, filtering and inspection tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<String>,

    /// Network interface to capture from (requires the `live` feature)
    #[arg(short, long, conflicts_with = "read")]
    interface: Option<String>,

    /// Replay a pcap file (may be compressed: .gz, .xz, .lz4)
    #[arg(short, long, value_name = "FILE")]
    read: Option<String>,

    /// List network interfaces and exit
    #[arg(long)]
    list_interfaces: bool,

    /// Stop capturing after this many seconds
    #[arg(short, long, value_name = "SECONDS")]
    duration: Option<u64>,

    /// Stop capturing after this many packets
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Protocol filter: tcp, udp, icmp, other or any
    #[arg(long, default_value = "")]
    proto: String,

    /// Source IP filter
    #[arg(long, default_value = "")]
    src: String,

    /// Destination IP filter
    #[arg(long, default_value = "")]
    dst: String,

    /// Source port filter (0: any)
    #[arg(long, default_value = "")]
    sport: String,

    /// Print the details of this packet when the capture ends
    #[arg(long, value_name = "ID")]
    show: Option<u64>,

    /// CSV packet log (default: packet_log.csv in the output directory)
    #[arg(long, value_name = "FILE")]
    log_file: Option<String>,

    /// Do not write the CSV packet log
    #[arg(long)]
    no_log: bool,

    /// Print packets as JSON lines
    #[arg(long)]
    json: bool,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(config: &mut Config, filename: &str) -> Result<(), Error> {
    debug!("Loading configuration {filename}");
    let path = Path::new(&filename);
    let file = File::open(path)?;
    config.load_config(file)
}

/// Open capture files, decompressing them according to their extension
fn open_input(path: &Path, file: File) -> io::Result<Box<dyn Read + Send>> {
    let name = path.to_string_lossy();
    if name.ends_with(".gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else if name.ends_with(".xz") {
        Ok(Box::new(XzDecoder::new(file)))
    } else if name.ends_with(".lz4") {
        Ok(Box::new(lz4::Decoder::new(file)?))
    } else {
        Ok(Box::new(file))
    }
}

fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::try_from_env("SNIFFER_LOG")
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    // diagnostics go to a file if asked to, stderr otherwise: stdout is for packets
    let writer = match config.get("trace_file") {
        Some(trace_file) => {
            let output_dir = get_output_dir(config);
            BoxMakeWriter::new(RollingFileAppender::new(Rotation::NEVER, output_dir, trace_file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .compact()
        .init();
}

fn print_packet(record: &PacketRecord, json: bool) {
    if json {
        match serde_json::to_string(&record.summary()) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("could not serialize packet {}: {}", record.sequence_id, e),
        }
        return;
    }
    let flags = record.tcp_flags.map_or_else(|| "-".to_owned(), |f| f.compact());
    println!(
        "{:>6} {:>12.5} {:>15} -> {:<15} {:<5} {:>5} {:>5} {}",
        record.sequence_id,
        record.elapsed_seconds,
        record.source_text,
        record.dest_text,
        record.protocol,
        record.source_port,
        record.dest_port,
        flags
    );
}

fn print_detail(store: &PacketStore, id: u64, json: bool) -> Result<(), Error> {
    let detail = describe(store, id).ok_or(Error::Generic("no packet with this id"))?;
    if json {
        let line = serde_json::to_string(&detail).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        println!("{line}");
    } else {
        println!("{}", detail.summary);
        println!("{}", detail.hex_dump);
        println!();
        print!("{}", detail.structured);
    }
    Ok(())
}

/// Run one capture session on `device` until it ends, a limit is reached, or
/// `interrupted` is set
fn run<B: CaptureBackend>(
    backend: B,
    device: &str,
    args: &Args,
    config: &Config,
    filter: &FilterSpec,
    interrupted: &AtomicBool,
) -> Result<(), Error> {
    let store = Arc::new(PacketStore::new());
    let controller = CaptureController::new(backend, store.clone());
    if !args.no_log {
        let log = PacketLog::open(packet_log_path(config))?;
        controller.add_observer(Box::new(log));
    }
    let summaries = controller.subscribe();
    controller.set_packet_limit(args.count);

    let session = controller.start(device)?;
    debug!("session: {:?}", session);
    let started = Instant::now();
    let show = |id: u64| {
        if let Some(record) = store.get(id) {
            if filter.matches(&record) {
                print_packet(&record, args.json);
            }
        }
    };

    loop {
        if let Ok(summary) = summaries.recv_timeout(StdDuration::from_millis(100)) {
            show(summary.sequence_id);
        }
        let expired = args
            .duration
            .map_or(false, |secs| started.elapsed() >= StdDuration::from_secs(secs));
        if interrupted.load(Ordering::SeqCst) || expired {
            controller.stop();
        }
        if controller.state() != CaptureState::Running {
            break;
        }
    }
    let res = controller.join();
    for summary in summaries.try_iter() {
        show(summary.sequence_id);
    }
    res?;

    let stats = controller.stats();
    info!(
        "{} frames received, {} packets stored, {} truncated, {} invalid header, {} not IPv4",
        stats.received, stats.accepted, stats.truncated, stats.invalid_header, stats.unsupported
    );
    if !filter.is_empty() {
        let matched = libsniffer::filter::apply(filter, &store.snapshot()).len();
        info!("{} of {} packets match the filter", matched, store.len());
    }
    if let Some(id) = args.show {
        print_detail(&store, id, args.json)?;
    }
    controller.close();
    Ok(())
}

#[cfg(feature = "live")]
fn install_interrupt_handler(interrupted: Arc<AtomicBool>) -> Result<(), Error> {
    ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
    })
    .map_err(|_| Error::Generic("could not set Ctrl-C handler"))
}

#[cfg(feature = "live")]
fn list_interfaces(config: &Config) -> Result<(), Error> {
    let backend = libsniffer_live::create_backend_live(config)?;
    for name in backend.list_devices()? {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "live"))]
fn list_interfaces(_config: &Config) -> Result<(), Error> {
    Err(Error::Generic("live capture support not compiled in (feature `live`)"))
}

#[cfg(feature = "live")]
fn run_live(interface: &str, args: &Args, config: &Config, filter: &FilterSpec) -> Result<(), Error> {
    let interrupted = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(interrupted.clone())?;
    let backend = libsniffer_live::create_backend_live(config)?;
    run(backend, interface, args, config, filter, &interrupted)
}

#[cfg(not(feature = "live"))]
fn run_live(_interface: &str, _args: &Args, _config: &Config, _filter: &FilterSpec) -> Result<(), Error> {
    Err(Error::Generic("live capture support not compiled in (feature `live`)"))
}

fn try_main() -> Result<(), Error> {
    let args = Args::parse();

    // load config
    let mut config = Config::default();
    if let Some(filename) = args.config.as_ref() {
        load_config(&mut config, filename)?;
    }
    // override config options from command-line arguments
    if let Some(log_file) = args.log_file.as_ref() {
        config.set("log_file", log_file.as_str());
    }

    init_tracing(&config, args.verbose);

    // Now, really start
    info!("sniffer {}", crate_version!());

    if args.list_interfaces {
        return list_interfaces(&config);
    }

    let filter = FilterSpec::parse(&args.proto, &args.src, &args.dst, &args.sport)?;
    if !filter.is_empty() {
        debug!("filter: {:?}", filter);
    }

    if let Some(path) = args.read.as_ref() {
        let backend = FileBackend::with_decoder(open_input);
        return run(backend, path, &args, &config, &filter, &AtomicBool::new(false));
    }
    if let Some(interface) = args.interface.as_ref() {
        return run_live(interface, &args, &config, &filter);
    }

    Err(Error::Generic("nothing to capture from: use --read FILE or --interface NAME"))
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("sniffer: {e}");
        std::process::exit(1);
    }
}
