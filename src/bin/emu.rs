//! T800 emulator command line.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;

use t800_emu::cpu::{Cpu, DebugConfig, DebugLevel};
use t800_emu::emu::{apply_debug, Emu, DEFAULT_MEM_SIZE, MEGA};
use t800_emu::link::{Link, LinkFactory};
use t800_emu::memory::{MemDebug, Memory};

#[derive(Parser)]
#[command(name = "emu", about = "T800 Transputer emulator")]
struct Args {
    /// Display configuration summary
    #[arg(short = 'c')]
    show_config: bool,

    /// Debug options: a disassembly, r registers, o opr decoding, f full,
    /// i iserver, l links, q queues, c clocks, m memory data, M memory full
    #[arg(short = 'd', value_name = "WHAT", action = ArgAction::Append)]
    debug: Vec<String>,

    /// Log level: one of d, i, w, e, f
    #[arg(short = 'l', value_name = "LEVEL")]
    log_level: Option<String>,

    /// Link type selector, e.g. -L0F. N is 0..3 and T is F, S or M for
    /// FIFO, Socket or shared Memory (only FIFO is implemented)
    #[arg(short = 'L', value_name = "NT", action = ArgAction::Append)]
    link_types: Vec<String>,

    /// Initial memory size in MB (4..64)
    #[arg(short = 'm', value_name = "MB")]
    mem_megs: Option<u32>,

    /// Enter the interactive monitor immediately
    #[arg(short = 'i')]
    interactive: bool,

    /// Terminate emulation upon a memory violation
    #[arg(short = 't')]
    terminate_on_violation: bool,
}

/// Map the -l level letter onto the tracing filter.
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

fn build_debug_config(args: &Args) -> Result<DebugConfig> {
    let mut debug = DebugConfig::default();
    for what in &args.debug {
        match what.as_str() {
            "a" => debug.level = debug.level.max(DebugLevel::Disasm),
            "r" => debug.level = debug.level.max(DebugLevel::DisRegs),
            "o" => debug.level = debug.level.max(DebugLevel::OprCodes),
            "f" => {
                debug.level = DebugLevel::OprCodes;
                debug.mem = MemDebug::ReadWriteData;
                debug.link_comms = true;
                debug.clocks = true;
                debug.queues = true;
                debug.iserver = true;
            }
            "i" => debug.iserver = true,
            "l" => debug.link_comms = true,
            "q" => debug.queues = true,
            "c" => debug.clocks = true,
            "m" => debug.mem = MemDebug::ReadWriteData,
            "M" => debug.mem = MemDebug::Full,
            other => bail!("unknown debug option -d{}", other),
        }
    }
    if args.interactive {
        debug.monitor = true;
        debug.level = debug.level.max(DebugLevel::DisRegs);
    }
    debug.terminate_on_mem_violation = args.terminate_on_violation;
    Ok(debug)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    let mem_size = match args.mem_megs {
        None => DEFAULT_MEM_SIZE,
        Some(megs) => {
            if !(4..=64).contains(&megs) {
                bail!("initial memory size must be in range [4..64] MB");
            }
            let size = megs as usize * MEGA;
            info!("Initial memory size set to {} bytes", size);
            size
        }
    };

    let debug = build_debug_config(&args)?;

    let mut factory = LinkFactory::new(false, debug.link_comms);
    for selector in &args.link_types {
        factory
            .set_link_type(selector)
            .with_context(|| format!("-L{}", selector))?;
    }
    let mut links: Vec<Box<dyn Link>> = Vec::with_capacity(4);
    for n in 0..4 {
        let mut link = factory
            .create_link(n)
            .with_context(|| format!("could not create link {}", n))?;
        link.initialise()
            .with_context(|| format!("could not initialise link {}", n))?;
        links.push(link);
    }
    let links: [Box<dyn Link>; 4] = links
        .try_into()
        .unwrap_or_else(|_| unreachable!("exactly four links are built"));

    let mut mem = Memory::new(mem_size);
    apply_debug(&mut mem, &debug);
    let cpu = Cpu::new(links, debug);
    let mut emu = Emu::new(mem, cpu);

    if args.show_config {
        info!("{}", emu.configuration());
    }

    emu.boot().context("bootstrap failed")?;
    emu.run();
    Ok(())
}
