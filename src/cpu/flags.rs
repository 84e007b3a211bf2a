//! Interpreter status and debug configuration
//!
//! The processor keeps its condition and scheduling state in a handful of
//! flags. `Status` owns the ones that change during interpretation;
//! `DebugConfig` holds the settings chosen on the command line.

use crate::memory::MemDebug;

/// Condition and scheduling flags owned by the interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    /// Arithmetic error (overflow, division by zero, failed check).
    pub error: bool,
    /// Terminate when `error` is also set.
    pub halt_on_error: bool,
    /// Floating-point error flag.
    pub fp_error: bool,
    /// A timeslice expired; deschedule at the next `j` or `lend`.
    pub deschedule_pending: bool,
    /// The current instruction requires a deschedule.
    pub deschedule_required: bool,
    /// An interruptible instruction was interpreted.
    pub interrupt: bool,
    /// A bad or unimplemented instruction was encountered.
    pub bad_instruction: bool,
    /// A queue-register instruction was interpreted.
    pub queue_instruction: bool,
    /// A timer instruction was interpreted.
    pub timer_instruction: bool,
    /// Stop the interpretation loop.
    pub terminate: bool,
}

impl Status {
    /// Reset the per-instruction flags before executing an instruction.
    pub fn clear_before_instruction(&mut self) {
        self.deschedule_required = false;
        self.bad_instruction = false;
        self.interrupt = false;
        self.queue_instruction = false;
        self.timer_instruction = false;
    }
}

/// Debugging levels for the instruction trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DebugLevel {
    /// No trace.
    #[default]
    None,
    /// Disassembly of each instruction.
    Disasm,
    /// Disassembly with register dumps.
    DisRegs,
    /// As above, plus decoding of `opr`/`fpentry` operands.
    OprCodes,
}

/// Debug settings selected on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugConfig {
    pub level: DebugLevel,
    pub mem: MemDebug,
    /// Link communications debug.
    pub link_comms: bool,
    /// IServer diagnostics.
    pub iserver: bool,
    /// Clock and timer diagnostics.
    pub clocks: bool,
    /// Process queue diagnostics.
    pub queues: bool,
    /// Terminate emulation on a memory violation.
    pub terminate_on_mem_violation: bool,
    /// Interactive monitor active.
    pub monitor: bool,
}
