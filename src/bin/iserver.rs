//! Host I/O server command line.
//!
//! If a boot file is given it is sent over Link 0 first, using the
//! boot-from-link facility; protocol handling then runs until an exit
//! frame arrives, and its status becomes this process's exit code.
//! Arguments the server does not recognise are passed on to the transputer
//! program via `REQ_COMMAND`.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use tracing::{debug, error, info};

use t800_emu::iserver::{Platform, ProtocolHandler};
use t800_emu::link::{Link, LinkError, LinkFactory};

#[derive(Parser)]
#[command(name = "iserver", about = "T800 host I/O server")]
struct Args {
    /// Monitor the boot link raw instead of handling the protocol
    #[arg(short = 'm')]
    monitor_link: bool,

    /// Debug options: f full, p platform, P protocol, l link, L link raw
    #[arg(short = 'd', value_name = "WHAT", action = ArgAction::Append)]
    debug: Vec<String>,

    /// Log level: one of d, i, w, e, f
    #[arg(short = 'l', value_name = "LEVEL")]
    log_level: Option<String>,

    /// Link type selector, e.g. -L0F. N is 0..3 and T is F, S or M for
    /// FIFO, Socket or shared Memory (only FIFO is implemented)
    #[arg(short = 'L', value_name = "NT", action = ArgAction::Append)]
    link_types: Vec<String>,

    /// Root directory served to the transputer; current directory if not
    /// given
    #[arg(short = 'r', value_name = "DIR")]
    root_directory: Option<PathBuf>,

    /// Boot file followed by arguments for the transputer program
    #[arg(
        value_name = "BOOTFILE [ARGS]",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    rest: Vec<String>,
}

struct DebugFlags {
    platform: bool,
    protocol: bool,
    link: bool,
    link_raw: bool,
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let level = match level {
        None | Some("i") => tracing::Level::INFO,
        Some("d") => tracing::Level::DEBUG,
        Some("w") => tracing::Level::WARN,
        Some("e") | Some("f") => tracing::Level::ERROR,
        Some(other) => bail!("incorrect level '{}' given to -l to set logging level", other),
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_debug_flags(args: &Args) -> Result<DebugFlags> {
    let mut flags = DebugFlags {
        platform: false,
        protocol: false,
        link: false,
        link_raw: false,
    };
    for what in &args.debug {
        match what.as_str() {
            "f" => {
                flags.platform = true;
                flags.protocol = true;
                flags.link = true;
                flags.link_raw = true;
            }
            "p" => flags.platform = true,
            "P" => flags.protocol = true,
            "l" => flags.link = true,
            "L" => {
                flags.link = true;
                flags.link_raw = true;
            }
            other => bail!("unknown debug option -d{}", other),
        }
    }
    Ok(flags)
}

/// Send a file's contents over the link, typically a boot file. A boot file
/// starts with a byte giving its length; longer programs carry a chain
/// loader first.
fn send_file_over_link(link: &mut dyn Link, path: &str, debug_link: bool) -> Result<()> {
    let mut file =
        File::open(path).with_context(|| format!("could not open boot file {}", path))?;
    let mut buf = [0u8; 128];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("could not read boot file {}", path))?;
        if n == 0 {
            break;
        }
        if debug_link {
            debug!("Read {} bytes of boot code; sending down link", n);
        }
        link.write_bytes(&buf[..n])
            .context("could not write down link 0")?;
    }
    Ok(())
}

/// Log everything arriving on the boot link.
fn monitor_boot_link(link: &mut dyn Link) {
    loop {
        match link.read_byte() {
            Ok(b) => {
                let printable = if b.is_ascii_graphic() { b as char } else { '.' };
                info!("{:02X} {}", b, printable);
            }
            Err(e) => {
                error!("Could not read from link 0: {}", e);
                return;
            }
        }
    }
}

fn run() -> Result<i32> {
    let full_command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;
    let flags = build_debug_flags(&args)?;

    // The first trailing argument that names an existing file is the boot
    // file; everything else is handed to the transputer program.
    let mut boot_file: Option<String> = None;
    let mut program_args: Vec<String> = Vec::new();
    for arg in &args.rest {
        if boot_file.is_none() && std::path::Path::new(arg).is_file() {
            boot_file = Some(arg.clone());
        } else {
            program_args.push(arg.clone());
        }
    }
    let program_command_line = program_args.join(" ");
    debug!("Full command line [{}]", full_command_line);
    debug!("Program command line [{}]", program_command_line);

    let root_directory = match args.root_directory {
        Some(dir) => dir,
        None => std::env::current_dir().context("could not get current working directory")?,
    };
    if !root_directory.is_dir() {
        bail!(
            "root directory '{}' is not a directory",
            root_directory.display()
        );
    }
    debug!("Root directory is '{}'", root_directory.display());

    let mut platform = Platform::new();
    platform.set_debug(flags.platform);
    platform.set_command_lines(full_command_line, program_command_line);
    platform
        .initialise()
        .context("could not initialise platform")?;

    let mut factory = LinkFactory::new(true, flags.link_raw);
    for selector in &args.link_types {
        factory
            .set_link_type(selector)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
    }
    let mut link = factory.create_link(0).context("could not create link 0")?;
    link.initialise().context("could not initialise link 0")?;

    if let Some(boot) = &boot_file {
        send_file_over_link(link.as_mut(), boot, flags.link)?;
        debug!("End of boot file send");
    }

    let exit_code = if args.monitor_link {
        debug!("Monitoring boot link");
        monitor_boot_link(link.as_mut());
        0
    } else {
        debug!("Processing IServer protocol");
        let mut handler = ProtocolHandler::new(link.as_mut(), &mut platform, root_directory);
        handler.set_debug(flags.protocol);
        loop {
            match handler.process_frame() {
                Ok(true) => break,
                Ok(false) => {}
                Err(LinkError::EndOfEmulation(_)) => break,
                Err(e) => return Err(e).context("link 0 failed"),
            }
        }
        let code = handler.exit_code();
        debug!("Received exit code {}", code);
        debug!(
            "Frames: {} total, {} bad, {} unimplemented",
            handler.frame_count(),
            handler.bad_frame_count(),
            handler.unimplemented_frame_count()
        );
        code
    };

    if let Err(e) = link.reset() {
        error!("Could not reset link 0: {}", e);
    }
    Ok(exit_code)
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from((code & 0xFF) as u8),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
