//! Emulator orchestrator
//!
//! Wires memory, the CPU and the links together: initialises the register
//! file, runs the primary bootstrap from Link 0, then interprets
//! instructions until the Terminate flag is set. Also hosts the interactive
//! monitor entered with `-i` or the `togglemonitor` operation.

use std::io::{BufRead, Write};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cpu::{BootError, Cpu, DebugConfig};
use crate::memory::Memory;

/// Kilobyte/megabyte helpers for memory sizing.
pub const KILO: usize = 1024;
pub const MEGA: usize = KILO * KILO;

/// The emulator has a 4MB address space unless told otherwise.
pub const DEFAULT_MEM_SIZE: usize = 4 * MEGA;

#[derive(Debug, Error)]
pub enum EmuError {
    #[error(transparent)]
    Boot(#[from] BootError),
}

/// Main emulator state.
pub struct Emu {
    cpu: Cpu,
    mem: Memory,
}

impl Emu {
    pub fn new(mem: Memory, cpu: Cpu) -> Self {
        Self { cpu, mem }
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn mem(&self) -> &Memory {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    /// One-line memory configuration summary.
    pub fn configuration(&self) -> String {
        use crate::memory::addr;
        format!(
            "Memory size:     #{:08X} bytes. ({}MB)\n\
             Internal memory: #{:08X} to #{:08X}\n\
             External memory: #{:08X} to #{:08X}",
            self.mem.mem_size(),
            self.mem.mem_size() / MEGA,
            addr::INTERNAL_MEM_START,
            addr::INTERNAL_MEM_END,
            addr::EXTERNAL_MEM_START,
            self.mem.mem_end(),
        )
    }

    /// Initialise the registers and run the primary bootstrap on Link 0.
    pub fn boot(&mut self) -> Result<(), EmuError> {
        debug!("---- Starting Bootstrap ----");
        self.cpu.init_for_boot();
        self.cpu.boot_from_link(&mut self.mem)?;
        Ok(())
    }

    /// Interpret until the Terminate flag is set.
    pub fn run(&mut self) {
        debug!("---- Starting Emulation ----");
        while !self.cpu.status.terminate {
            if self.cpu.debug.monitor && !self.monitor() {
                break;
            }
            self.cpu.step(&mut self.mem);
        }
        debug!("---- Ending Emulation ----");
    }

    /// Interpret at most `steps` instructions. Returns the number actually
    /// interpreted; stops early on Terminate.
    pub fn run_steps(&mut self, steps: u64) -> u64 {
        let mut done = 0;
        while done < steps && !self.cpu.status.terminate {
            self.cpu.step(&mut self.mem);
            done += 1;
        }
        done
    }

    /// The interactive monitor. Prompts on stderr, reads commands from
    /// stdin. Returns false when emulation should stop.
    fn monitor(&mut self) -> bool {
        let stdin = std::io::stdin();
        loop {
            eprint!("> ");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
                return false;
            }
            let cmd = line.trim();
            match cmd {
                // Single-step to the next instruction.
                "" => return true,
                "h" | "?" => {
                    info!("Monitor commands:");
                    info!("<return> single-step current instruction");
                    info!("r        display all registers");
                    info!("rq       display queue registers");
                    info!("rc       display clock registers");
                    info!("f        display flags");
                    info!("q        quit emulator");
                    info!("g        quit monitor, continue interpretation");
                }
                "r" => {
                    info!("{}", self.cpu.dump_regs());
                    if self.cpu.status.queue_instruction {
                        info!("{}", self.cpu.dump_queue_regs());
                    }
                    if self.cpu.status.timer_instruction {
                        info!("{}", self.cpu.dump_clock_regs());
                    }
                }
                "rq" => info!("{}", self.cpu.dump_queue_regs()),
                "rc" => info!("{}", self.cpu.dump_clock_regs()),
                "f" => info!("{}", self.cpu.dump_flags()),
                "q" => {
                    self.cpu.status.terminate = true;
                    return false;
                }
                "g" => {
                    self.cpu.debug.monitor = false;
                    return true;
                }
                _ => warn!("Unknown monitor command '{}'", cmd),
            }
        }
    }
}

/// Build a default debug configuration with the terminate-on-violation
/// setting applied to the memory as well.
pub fn apply_debug(mem: &mut Memory, debug: &DebugConfig) {
    mem.mem_debug = debug.mem;
    mem.set_terminate_on_violation(debug.terminate_on_mem_violation);
}
