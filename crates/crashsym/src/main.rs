use std::process::ExitCode;

use clap::{Parser, Subcommand};
use crashsym_core::{Address, BacktraceCapture, SessionStatus, SymbolicationConfig, Symbolicator};
use crashsym_utils::{info, warn, LogLevel, LoggingConfig};

/// Symbolicate this process's own stack from its embedded DWARF.
#[derive(Parser, Debug)]
#[command(name = "crashsym")]
#[command(version)]
#[command(about = "Symbolicate this process's own stack from its embedded DWARF", long_about = None)]
struct Cli
{
    /// Skip debug-info parsing (faster, address-only stack traces)
    #[arg(long, global = true, default_value_t = false)]
    no_debug_info: bool,
    /// Log level: error, warn, info, debug or trace (default: RUST_LOG, else info)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Also print the `Module!Function` line for each frame
    #[arg(long, global = true, default_value_t = false)]
    machine: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Print a symbolicated backtrace of this process
    Backtrace
    {
        /// Maximum number of frames to capture
        #[arg(long, default_value_t = 64)]
        max_frames: usize,
    },
    /// Resolve addresses inside this process
    Resolve
    {
        /// Addresses to resolve (hex format: 0x1000 or decimal)
        addresses: Vec<String>,
        /// Also resolve crashsym's own `main`
        #[arg(long = "self", default_value_t = false)]
        include_self: bool,
    },
}

fn main() -> ExitCode
{
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if let Some(level) = cli.log_level {
        logging = logging.with_level(level);
    }
    let _guard = match logging.init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = SymbolicationConfig::from_env();
    if cli.no_debug_info {
        config = config.with_debug_info(false);
    }
    let symbolicator = Symbolicator::new(config);

    match symbolicator.init() {
        SessionStatus::Ready => info!("debug info loaded"),
        SessionStatus::Reduced => info!("debug info skipped; reporting modules only"),
        status => warn!("debug session {status:?}; reporting modules only"),
    }

    let result = match cli.command {
        Commands::Backtrace { max_frames } => {
            print_backtrace(&symbolicator, max_frames, cli.machine);
            Ok(())
        }
        Commands::Resolve {
            addresses,
            include_self,
        } => resolve(&symbolicator, &addresses, include_self, cli.machine),
    };

    symbolicator.close();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

#[inline(never)]
fn print_backtrace(symbolicator: &Symbolicator, max_frames: usize, machine: bool)
{
    let frames = symbolicator.symbolicate_stack(&BacktraceCapture::new(), max_frames);
    info!("captured {} frames", frames.len());
    for frame in &frames {
        println!("{}", frame.frame_line());
        if machine {
            print!("{}", frame.machine_line());
        }
    }
}

fn resolve(
    symbolicator: &Symbolicator,
    addresses: &[String],
    include_self: bool,
    machine: bool,
) -> Result<(), Box<dyn std::error::Error>>
{
    let mut targets = addresses
        .iter()
        .map(|text| parse_address(text))
        .collect::<Result<Vec<_>, _>>()?;
    if include_self {
        targets.push(Address::from((main as fn() -> ExitCode) as usize));
    }
    if targets.is_empty() {
        return Err("no addresses given (pass addresses or --self)".into());
    }

    for address in targets {
        let info = symbolicator.get_info_for_address(address);
        if !info.success {
            warn!("lookup of {address} did not complete");
        }
        println!("{}", info.frame_line());
        if machine {
            print!("{}", info.machine_line());
        }
    }
    Ok(())
}

fn parse_address(text: &str) -> Result<Address, String>
{
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u64>(),
    };
    parsed
        .map(Address::from)
        .map_err(|e| format!("invalid address {text:?}: {e}"))
}
