//! T800 CPU interpreter
//!
//! The CPU is a 32-bit stack machine. Each instruction byte carries a direct
//! opcode in its upper nibble and folds its lower nibble into the operand
//! register; `pfix`/`nfix` extend the operand, and `opr` executes the
//! operation the operand register selects.
//!
//! # Module Organization
//!
//! - `flags`: interpreter status record and debug configuration
//! - `opcodes`: direct and indirect instruction numbers
//! - `helpers`: workspace-descriptor and evaluation-stack helpers
//! - `execute`: the indirect (`opr`) operations, including the channel
//!   rendezvous and ALT selection engine
//!
//! The scheduler lives here: two-priority FIFO run queues and per-priority
//! timer lists, both threaded through process workspaces. `step` interprets
//! exactly one instruction byte and then performs the bookkeeping pass
//! (requested schedules, required deschedules, clock advance, timer wakeup,
//! quantum expiry).

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::disasm;
use crate::link::{Link, LinkError};
use crate::memory::{addr, Memory};

pub mod flags;
pub mod helpers;
pub mod opcodes;

mod execute;

#[cfg(test)]
mod tests;

pub use flags::{DebugConfig, DebugLevel, Status};

use helpers::{
    w_iptr, w_link, w_time, w_tlink, wdesc_is_hi_priority, wdesc_wptr, time_after, word_align,
};
use opcodes::*;

/// The lowest negative word; marks "no process" in queue links and empty
/// channels, and is also the minimum-integer constant pushed by `mint`.
pub const NOT_PROCESS: u32 = 0x8000_0000;

/// ALT state tokens held in the workspace −3 slot.
pub const ENABLING: u32 = 0x8000_0001;
pub const WAITING: u32 = 0x8000_0002;
pub const READY: u32 = 0x8000_0003;

/// Timer-selection tokens held in the workspace −4 slot during an alt.
pub const TIME_SET: u32 = 0x8000_0001;
pub const TIME_NOT_SET: u32 = 0x8000_0002;

/// "No branch selected" token stored in the workspace 0 slot by `altwt`.
pub const NONE_SELECTED: u32 = 0xFFFF_FFFF;

/// Sign bit of a register.
pub const SIGN_BIT: u32 = 0x8000_0000;

/// Register width, used in instruction timings.
pub const BITS_PER_WORD: u32 = 32;

/// Execution quantum of a low-priority process, in HiClock ticks.
pub const MAX_QUANTUM: u32 = 2048;

/// Magic value the queue registers hold until the bootstrap stores real
/// pointers with `sthf`/`stlf`/`sthb`/`stlb`.
pub const UNINITIALISED_QUEUE: u32 = 0xDEAD_F00D;

/// Word answered to a boot-peek of an illegal address.
pub const BAD_PEEK: u32 = 0xDEAD_F00D;

/// Boot protocol failures; all are fatal.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("Creg {0:08X} is not a link input address")]
    BadBootLink(u32),
    #[error("boot I/O failed: {0}")]
    Link(#[from] LinkError),
}

/// The processor state.
pub struct Cpu {
    /// Instruction pointer.
    pub iptr: u32,
    /// Workspace descriptor: workspace pointer with the priority bit.
    pub wdesc: u32,
    /// Integer evaluation stack, top to bottom.
    pub areg: u32,
    pub breg: u32,
    pub creg: u32,
    /// Operand register.
    pub oreg: u32,
    /// Operand register preserved across the reset, for bad-instruction logs.
    old_oreg: u32,
    /// Floating evaluation stack. Present but unused by the integer set.
    pub fareg: f64,
    pub fbreg: f64,
    pub fcreg: f64,
    /// Process to append to its run queue after this instruction, or zero.
    schedule_wdesc: u32,
    /// Run queue registers.
    pub hi_head: u32,
    pub hi_tail: u32,
    pub lo_head: u32,
    pub lo_tail: u32,
    /// Timer list head pointers.
    pub hi_timer_head: u32,
    pub lo_timer_head: u32,
    /// Clock state. HiClock ticks every 20 cycles, LoClock every 64 HiClock
    /// ticks (1 μs and 64 μs at 20 MHz).
    cycle_count: u64,
    cycle_count_since_reset: u32,
    pub hi_clock: u32,
    pub lo_clock: u32,
    lo_clock_last_quantum_expiry: u32,
    /// Decode state for the instruction being interpreted.
    instruction: u8,
    inst_cycles: u32,
    instruction_start_iptr: u32,
    /// Length of the primary bootstrap.
    boot_len: u8,
    /// Condition and scheduling flags.
    pub status: Status,
    /// Debug settings.
    pub debug: DebugConfig,
    /// The four serial links.
    links: [Box<dyn Link>; 4],
}

impl Cpu {
    pub fn new(links: [Box<dyn Link>; 4], debug: DebugConfig) -> Self {
        Self {
            iptr: addr::MEM_START,
            wdesc: 0,
            areg: 0,
            breg: 0,
            creg: 0,
            oreg: 0,
            old_oreg: 0,
            fareg: 0.0,
            fbreg: 0.0,
            fcreg: 0.0,
            schedule_wdesc: 0,
            hi_head: UNINITIALISED_QUEUE,
            hi_tail: UNINITIALISED_QUEUE,
            lo_head: UNINITIALISED_QUEUE,
            lo_tail: UNINITIALISED_QUEUE,
            hi_timer_head: NOT_PROCESS,
            lo_timer_head: NOT_PROCESS,
            cycle_count: 0,
            cycle_count_since_reset: 0,
            hi_clock: 0,
            lo_clock: 0,
            lo_clock_last_quantum_expiry: 0,
            instruction: 0,
            inst_cycles: 0,
            instruction_start_iptr: addr::MEM_START,
            boot_len: 0,
            status: Status::default(),
            debug,
            links,
        }
    }

    /// Total cycles executed since power-on.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Length of the primary bootstrap read during boot.
    pub fn boot_len(&self) -> u8 {
        self.boot_len
    }

    /// Borrow a link, for tests and for the orchestrator's shutdown path.
    pub fn link_mut(&mut self, n: usize) -> &mut dyn Link {
        self.links[n].as_mut()
    }

    /// Map a channel address to a link number when it names a link output.
    pub(crate) fn link_for_output(channel: u32) -> Option<usize> {
        match channel {
            addr::LINK0_OUTPUT => Some(0),
            addr::LINK1_OUTPUT => Some(1),
            addr::LINK2_OUTPUT => Some(2),
            addr::LINK3_OUTPUT => Some(3),
            _ => None,
        }
    }

    /// Map a channel address to a link number when it names a link input.
    pub(crate) fn link_for_input(channel: u32) -> Option<usize> {
        match channel {
            addr::LINK0_INPUT => Some(0),
            addr::LINK1_INPUT => Some(1),
            addr::LINK2_INPUT => Some(2),
            addr::LINK3_INPUT => Some(3),
            _ => None,
        }
    }

    /// The clock of the current process's priority.
    pub(crate) fn current_priority_clock(&self) -> u32 {
        if wdesc_is_hi_priority(self.wdesc) {
            self.hi_clock
        } else {
            self.lo_clock
        }
    }

    // ========== Registers at boot ==========

    /// Initialise the register file for bootstrap. See the boot protocol.
    pub fn init_for_boot(&mut self) {
        self.cycle_count = 0;
        self.cycle_count_since_reset = 0;
        self.hi_clock = 0;
        self.lo_clock = 0;
        self.lo_clock_last_quantum_expiry = 0;
        self.iptr = addr::MEM_START;
        self.oreg = 0;
        self.areg = 0;
        self.breg = 0;
        self.fareg = 0.0;
        self.fbreg = 0.0;
        self.fcreg = 0.0;
        // The default boot link input.
        self.creg = addr::LINK0_INPUT;
        self.status.error = false;
        self.status.fp_error = false;
        self.status.halt_on_error = false;
        self.status.deschedule_pending = false;
        self.status.deschedule_required = false;
        self.hi_head = UNINITIALISED_QUEUE;
        self.hi_tail = UNINITIALISED_QUEUE;
        self.lo_head = UNINITIALISED_QUEUE;
        self.lo_tail = UNINITIALISED_QUEUE;
        self.hi_timer_head = NOT_PROCESS;
        self.lo_timer_head = NOT_PROCESS;
        self.instruction_start_iptr = self.iptr;
    }

    // ========== Boot protocol ==========

    /// Run the primary bootstrap loop on the link named by Creg.
    ///
    /// Control bytes: `0` answers a peek of the following address; `1`
    /// stores a poked address/value pair; `b >= 2` deposits `b` bytes at
    /// MemStart and starts execution. On return the workspace descriptor
    /// designates the word past the boot image, at low priority.
    pub fn boot_from_link(&mut self, mem: &mut Memory) -> Result<(), BootError> {
        let link_no =
            Self::link_for_input(self.creg).ok_or(BootError::BadBootLink(self.creg))?;
        let link = &mut self.links[link_no];
        loop {
            let ctrl = link.read_byte()?;
            match ctrl {
                0 => {
                    let peek_addr = link.read_word()?;
                    let value = if mem.is_legal(peek_addr) && mem.is_legal(peek_addr.wrapping_add(3))
                    {
                        mem.get_word(peek_addr)
                    } else {
                        warn!("Boot-peek requested read from bad address {:08X}", peek_addr);
                        BAD_PEEK
                    };
                    if self.debug.link_comms {
                        debug!("Boot-peek @ {:08X} = {:08X}", peek_addr, value);
                    }
                    link.write_word(value)?;
                }
                1 => {
                    let poke_addr = link.read_word()?;
                    let value = link.read_word()?;
                    if mem.is_legal(poke_addr) {
                        mem.set_word(poke_addr, value);
                    } else {
                        warn!(
                            "Boot-poke requested write to bad address {:08X} value {:08X}",
                            poke_addr, value
                        );
                    }
                    if self.debug.link_comms {
                        debug!("Boot-poke stored {:08X} @ {:08X}", value, poke_addr);
                    }
                }
                b => {
                    self.boot_len = b;
                    if self.debug.link_comms {
                        debug!("Primary bootstrap contains 0x{:02X} bytes", b);
                    }
                    let mut deposit = addr::MEM_START;
                    for _ in 0..b {
                        let value = link.read_byte()?;
                        mem.set_byte(deposit, value);
                        deposit = deposit.wrapping_add(1);
                    }
                    break;
                }
            }
        }
        // The boot process runs at low priority in the workspace past the
        // boot image.
        self.wdesc = word_align(addr::MEM_START.wrapping_add(self.boot_len as u32)) | 0x01;
        mem.take_cycles();
        Ok(())
    }

    // ========== Scheduler ==========

    /// Append a process to the run queue of its priority.
    pub(crate) fn schedule_process(&mut self, wdesc: u32, mem: &mut Memory) {
        debug!("Scheduling process {:08X}", wdesc);
        mem.set_word(w_link(wdesc), NOT_PROCESS);
        if wdesc_is_hi_priority(wdesc) {
            if self.hi_head == NOT_PROCESS {
                self.hi_head = wdesc;
            } else {
                mem.set_word(w_link(self.hi_tail), wdesc);
            }
            self.hi_tail = wdesc;
        } else {
            if wdesc_wptr(self.lo_head) == NOT_PROCESS {
                self.lo_head = wdesc;
            } else {
                mem.set_word(w_link(self.lo_tail), wdesc);
            }
            self.lo_tail = wdesc;
        }
    }

    /// Insert the current process into the timer list of its priority,
    /// keeping the list ordered by wake time. The wake time must already be
    /// in the workspace −5 slot.
    pub(crate) fn timer_insert(&mut self, wdesc: u32, time: u32, mem: &mut Memory) {
        let hi = wdesc_is_hi_priority(wdesc);
        let head = if hi {
            self.hi_timer_head
        } else {
            self.lo_timer_head
        };
        if wdesc_wptr(head) == NOT_PROCESS || !time_after(time, mem.get_word(w_time(head))) {
            mem.set_word(w_tlink(wdesc), head);
            if hi {
                self.hi_timer_head = wdesc;
            } else {
                self.lo_timer_head = wdesc;
            }
            return;
        }
        let mut node = head;
        loop {
            let next = mem.get_word(w_tlink(node));
            if wdesc_wptr(next) == NOT_PROCESS || !time_after(time, mem.get_word(w_time(next))) {
                mem.set_word(w_tlink(wdesc), next);
                mem.set_word(w_tlink(node), wdesc);
                return;
            }
            node = next;
        }
    }

    /// Wake every process whose wake time is no longer in the future.
    /// A woken process that was alt-waiting becomes Ready before it is
    /// scheduled.
    fn wake_expired_timers(&mut self, mem: &mut Memory) {
        while wdesc_wptr(self.hi_timer_head) != NOT_PROCESS
            && !time_after(mem.get_word(w_time(self.hi_timer_head)), self.hi_clock)
        {
            let woken = self.hi_timer_head;
            self.hi_timer_head = mem.get_word(w_tlink(woken));
            self.wake_timed_process(woken, mem);
        }
        while wdesc_wptr(self.lo_timer_head) != NOT_PROCESS
            && !time_after(mem.get_word(w_time(self.lo_timer_head)), self.lo_clock)
        {
            let woken = self.lo_timer_head;
            self.lo_timer_head = mem.get_word(w_tlink(woken));
            self.wake_timed_process(woken, mem);
        }
    }

    fn wake_timed_process(&mut self, wdesc: u32, mem: &mut Memory) {
        let alt_state = mem.get_word(helpers::w_altstate(wdesc));
        if alt_state == WAITING || alt_state == ENABLING {
            mem.set_word(helpers::w_altstate(wdesc), READY);
        }
        debug!("Timer expiry waking process {:08X}", wdesc);
        self.schedule_process(wdesc, mem);
    }

    // ========== Instruction interpretation ==========

    /// Interpret one instruction byte and run the bookkeeping pass.
    /// Returns the cycles the instruction took.
    pub fn step(&mut self, mem: &mut Memory) -> u32 {
        let curr = mem.get_instruction(self.iptr);
        self.iptr = self.iptr.wrapping_add(1);
        self.instruction = curr & 0xF0;
        self.oreg |= (curr & 0x0F) as u32;

        if self.debug.level >= DebugLevel::Disasm {
            self.trace_instruction();
        }

        // One cycle per instruction unless set otherwise below.
        self.inst_cycles = 1;
        self.status.clear_before_instruction();
        if self.debug.clocks {
            self.status.timer_instruction = true;
        }
        if self.debug.queues {
            self.status.queue_instruction = true;
        }
        self.schedule_wdesc = 0;
        // Preserved for the bad-instruction trap; Oreg is reset below.
        self.old_oreg = self.oreg;

        match self.instruction {
            D_J => {
                if self.oreg == 0xFFFF_FFFF {
                    warn!("j: infinite loop - premature end?");
                    self.status.terminate = true;
                } else {
                    self.iptr = self.iptr.wrapping_add(self.oreg);
                    self.inst_cycles = 3;
                    if self.status.deschedule_pending {
                        self.status.deschedule_required = true;
                    } else {
                        self.status.deschedule_required = false;
                    }
                }
            }
            D_LDLP => {
                let v = wdesc_wptr(self.wdesc).wrapping_add(self.oreg << 2);
                self.push(v);
            }
            D_PFIX => {
                self.oreg <<= 4;
            }
            D_LDNL => {
                self.areg = mem.get_word(self.areg.wrapping_add(self.oreg << 2));
                self.inst_cycles += 1;
            }
            D_LDC => {
                let v = self.oreg;
                self.push(v);
            }
            D_LDNLP => {
                self.areg = self.areg.wrapping_add(self.oreg << 2);
            }
            D_NFIX => {
                self.oreg = !self.oreg << 4;
            }
            D_LDL => {
                let v = mem.get_word(wdesc_wptr(self.wdesc).wrapping_add(self.oreg << 2));
                self.push(v);
                self.inst_cycles += 1;
            }
            D_ADC => {
                let sign = self.areg & SIGN_BIT;
                self.areg = self.areg.wrapping_add(self.oreg);
                if self.areg & SIGN_BIT != sign {
                    self.status.error = true;
                }
            }
            D_CALL => {
                self.inst_cycles = 7;
                self.wdesc = self.wdesc.wrapping_sub(16);
                let wptr = wdesc_wptr(self.wdesc);
                mem.set_word(wptr, self.iptr);
                mem.set_word(wptr.wrapping_add(4), self.areg);
                mem.set_word(wptr.wrapping_add(8), self.breg);
                mem.set_word(wptr.wrapping_add(12), self.creg);
                self.areg = self.iptr;
                self.iptr = self.iptr.wrapping_add(self.oreg);
            }
            D_CJ => {
                if self.areg == 0 {
                    self.iptr = self.iptr.wrapping_add(self.oreg);
                    self.inst_cycles = 4;
                } else {
                    self.inst_cycles += 1;
                    self.drop_stack();
                }
            }
            D_AJW => {
                self.wdesc = self.wdesc.wrapping_add(self.oreg << 2);
            }
            D_EQC => {
                self.areg = (self.areg == self.oreg) as u32;
                self.inst_cycles += 1;
            }
            D_STL => {
                mem.set_word(
                    wdesc_wptr(self.wdesc).wrapping_add(self.oreg << 2),
                    self.areg,
                );
                self.drop_stack();
            }
            D_STNL => {
                mem.set_word(self.areg.wrapping_add(self.oreg << 2), self.breg);
                self.areg = self.creg;
                self.inst_cycles += 1;
            }
            D_OPR => {
                self.execute_operation(mem);
            }
            _ => unreachable!("direct opcode decode covers all upper nibbles"),
        }

        // Reset Oreg unless that was a prefix.
        if self.instruction != D_PFIX && self.instruction != D_NFIX {
            self.oreg = 0;
        }

        self.after_instruction(mem)
    }

    /// The bookkeeping pass run after every instruction.
    fn after_instruction(&mut self, mem: &mut Memory) -> u32 {
        if self.status.bad_instruction {
            error!(
                "Bad instruction: #{:02X} Oreg:#{:08X} IPtr:{:08X} {}",
                self.instruction,
                self.old_oreg,
                self.iptr,
                if self.instruction == D_OPR {
                    disasm::operation_name(self.old_oreg)
                } else {
                    disasm::direct_name(self.instruction)
                }
            );
            error!("{}", self.dump_regs());
            self.status.terminate = true;
        }

        // Was a schedule of another process requested?
        if self.schedule_wdesc != 0 {
            let w = self.schedule_wdesc;
            self.schedule_process(w, mem);
            self.status.queue_instruction = true;
        }

        // Deschedulable instructions (in, out, outword, outbyte, stopp,
        // endp) and quantum expiry via j/lend all funnel through this one
        // deschedule, which only happens when another process of the same
        // priority is runnable.
        if self.status.deschedule_required {
            debug!("Deschedule required");
            let hi = wdesc_is_hi_priority(self.wdesc);
            let head = if hi { self.hi_head } else { self.lo_head };
            if wdesc_wptr(head) == NOT_PROCESS {
                // Nothing to deschedule to.
            } else {
                mem.set_word(w_iptr(self.wdesc), self.iptr);
                self.wdesc = head;
                self.iptr = mem.get_word(w_iptr(self.wdesc));
                let next = mem.get_word(w_link(self.wdesc));
                if hi {
                    self.hi_head = next;
                } else {
                    self.lo_head = next;
                }
                debug!("New IPtr is #{:08X}", self.iptr);
            }
            self.lo_clock_last_quantum_expiry = self.lo_clock;
            self.status.queue_instruction = true;
            self.status.deschedule_pending = false;
        }

        // Let time pass for the clocks and the quantum expiry timer.
        let mem_cycles = mem.take_cycles();
        let total = self.inst_cycles + mem_cycles;
        self.cycle_count += total as u64;
        self.cycle_count_since_reset = self.cycle_count_since_reset.wrapping_add(total);
        self.hi_clock = self.cycle_count_since_reset / 20;
        self.lo_clock = self.hi_clock / 64;

        self.wake_expired_timers(mem);

        // Quantum expiry makes a low-priority process a candidate for
        // descheduling at the next j or lend.
        if !wdesc_is_hi_priority(self.wdesc)
            && self.lo_clock >= self.lo_clock_last_quantum_expiry.wrapping_add(MAX_QUANTUM)
        {
            self.status.deschedule_pending = true;
            self.status.timer_instruction = true;
            debug!("Quantum expired; requesting deschedule");
            self.lo_clock_last_quantum_expiry = self.lo_clock;
        }

        if mem.take_fatal_violation().is_some() {
            self.status.terminate = true;
        }

        if self.instruction != D_PFIX && self.instruction != D_NFIX {
            self.instruction_start_iptr = self.iptr;
            if self.debug.level >= DebugLevel::DisRegs {
                debug!("{}", self.dump_regs());
                if self.status.queue_instruction {
                    debug!("{}", self.dump_queue_regs());
                }
                if self.status.timer_instruction {
                    debug!("{}", self.dump_clock_regs());
                }
            }
        }

        if self.status.error && self.status.halt_on_error {
            warn!("Halt-On-Error and Error set. Stopping.");
            self.status.terminate = true;
        }

        total
    }

    fn trace_instruction(&self) {
        match self.instruction {
            D_PFIX | D_NFIX => {
                if self.debug.level >= DebugLevel::OprCodes {
                    debug!(
                        "#{:08X}: {} {:X}",
                        self.iptr.wrapping_sub(1),
                        disasm::direct_name(self.instruction),
                        self.oreg
                    );
                }
            }
            D_OPR => {
                debug!(
                    "#{:08X}: {}",
                    self.instruction_start_iptr,
                    disasm::operation_name(self.oreg)
                );
            }
            _ => {
                debug!(
                    "#{:08X}: {} {:X}",
                    self.instruction_start_iptr,
                    disasm::direct_name(self.instruction),
                    self.oreg
                );
            }
        }
    }

    // ========== Register dumps ==========

    /// One-line register summary in the trace format.
    pub fn dump_regs(&self) -> String {
        format!(
            "{}{}{}{}{}{} A #{:08X} B #{:08X} C #{:08X} W #{:08X}\n       O #{:08X} I #{:08X}",
            if wdesc_is_hi_priority(self.wdesc) { 'H' } else { 'L' },
            if self.status.error { 'E' } else { '-' },
            if self.status.fp_error { 'F' } else { '-' },
            if self.status.halt_on_error { 'H' } else { '-' },
            if self.status.deschedule_required {
                'D'
            } else if self.status.deschedule_pending {
                'd'
            } else {
                '-'
            },
            if self.status.interrupt { 'I' } else { '-' },
            self.areg,
            self.breg,
            self.creg,
            self.wdesc,
            self.oreg,
            self.iptr,
        )
    }

    /// Queue register summary.
    pub fn dump_queue_regs(&self) -> String {
        format!(
            "       Hf#{:08X} Hb#{:08X} Lf#{:08X} Lb#{:08X}",
            self.hi_head, self.hi_tail, self.lo_head, self.lo_tail
        )
    }

    /// Clock register summary, with the quantum remaining.
    pub fn dump_clock_regs(&self) -> String {
        let gone = self.lo_clock.wrapping_sub(self.lo_clock_last_quantum_expiry);
        let remaining = if gone >= MAX_QUANTUM {
            0
        } else {
            MAX_QUANTUM - gone
        };
        format!(
            "       Hc#{:08X} Lc#{:08X} Qr#{:08X} C##{:08X}",
            self.hi_clock, self.lo_clock, remaining, self.inst_cycles
        )
    }

    /// Multi-line description of the status flags.
    pub fn dump_flags(&self) -> String {
        let mut out = String::new();
        let mut add = |set: bool, name: &str| {
            if set {
                out.push_str("-- ");
                out.push_str(name);
                out.push('\n');
            }
        };
        add(self.status.error, "ERROR");
        add(self.status.halt_on_error, "HALT ON ERROR");
        add(self.status.fp_error, "FLOATING POINT ERROR");
        add(self.status.deschedule_pending, "DESCHEDULE PENDING");
        add(self.status.deschedule_required, "DESCHEDULE REQUIRED");
        add(self.status.interrupt, "INTERRUPT");
        add(self.status.bad_instruction, "BAD INSTRUCTION");
        add(self.status.queue_instruction, "QUEUE INSTRUCTION");
        add(self.status.timer_instruction, "TIMER INSTRUCTION");
        add(self.status.terminate, "TERMINATE");
        out
    }

    /// Log the marker operation; split out so tests can spot it.
    pub(crate) fn log_marker(&self) {
        info!("*** MARKER ***");
    }
}
