//! Indirect (`opr`) operation execution
//!
//! The operand register selects the operation. This module covers the whole
//! implemented set: stack shuffles, checked and unchecked arithmetic, long
//! (64-bit) arithmetic, shifts, memory subscripts, process control, timers,
//! queue-register access, the channel rendezvous, and the ALT selection
//! engine. Unknown or unimplemented operations set the bad-instruction flag
//! and are fatal in the bookkeeping pass.

use tracing::{debug, info, warn};

use super::helpers::{
    byte_select, highest_set_bit, make_u64, time_after, w_altstate, w_iptr, w_pointer, w_temp,
    w_time, w_tlink, wdesc_priority, wdesc_wptr,
};
use super::opcodes::*;
use super::{
    Cpu, BITS_PER_WORD, ENABLING, NONE_SELECTED, NOT_PROCESS, READY, SIGN_BIT, TIME_NOT_SET,
    WAITING,
};
use crate::memory::{addr, Memory};

/// Which side of a rendezvous the current instruction plays.
#[derive(Clone, Copy, PartialEq)]
enum CommDirection {
    /// `in`: copy from the partner's buffer to ours.
    Input,
    /// `out`: copy from our buffer to the partner's.
    Output,
}

impl Cpu {
    pub(super) fn execute_operation(&mut self, mem: &mut Memory) {
        match self.oreg {
            O_REV => {
                std::mem::swap(&mut self.areg, &mut self.breg);
            }

            O_ADD => {
                let sign = self.areg & SIGN_BIT;
                self.areg = self.areg.wrapping_add(self.breg);
                self.breg = self.creg;
                if self.areg & SIGN_BIT != sign {
                    self.status.error = true;
                }
            }

            O_SUB => {
                let sign = self.areg & SIGN_BIT;
                self.areg = self.breg.wrapping_sub(self.areg);
                self.breg = self.creg;
                if self.areg & SIGN_BIT != sign {
                    self.status.error = true;
                }
            }

            O_MUL => {
                self.inst_cycles = BITS_PER_WORD + 6;
                let wide = (self.areg as i32 as i64) * (self.breg as i32 as i64);
                self.areg = wide as u32;
                self.breg = self.creg;
                if wide != self.areg as i32 as i64 {
                    self.status.error = true;
                }
            }

            O_DIV => {
                if self.areg == 0 || (self.areg == 0xFFFF_FFFF && self.breg == SIGN_BIT) {
                    self.status.error = true;
                } else {
                    self.areg = ((self.breg as i32) / (self.areg as i32)) as u32;
                    self.breg = self.creg;
                    self.inst_cycles = BITS_PER_WORD + 10;
                }
            }

            O_REM => {
                if self.areg == 0 || (self.areg == 0xFFFF_FFFF && self.breg == SIGN_BIT) {
                    self.status.error = true;
                } else {
                    self.areg = ((self.breg as i32) % (self.areg as i32)) as u32;
                    self.breg = self.creg;
                    self.inst_cycles = BITS_PER_WORD + 5;
                }
            }

            O_SUM => {
                self.areg = self.areg.wrapping_add(self.breg);
                self.breg = self.creg;
            }

            O_DIFF => {
                self.areg = self.breg.wrapping_sub(self.areg);
                self.breg = self.creg;
            }

            O_PROD => {
                self.inst_cycles = highest_set_bit(self.areg) + 4;
                self.areg = self.areg.wrapping_mul(self.breg);
                self.breg = self.creg;
            }

            O_AND => {
                self.areg &= self.breg;
                self.breg = self.creg;
            }

            O_OR => {
                self.areg |= self.breg;
                self.breg = self.creg;
            }

            O_XOR => {
                self.areg ^= self.breg;
                self.breg = self.creg;
            }

            O_NOT => {
                self.areg = !self.areg;
            }

            O_SHL => {
                self.inst_cycles = self.areg.wrapping_add(2);
                if self.areg >= BITS_PER_WORD {
                    warn!("shl: Areg >= 32");
                    self.inst_cycles = self.inst_cycles.wrapping_add(1);
                    self.areg = 0;
                    self.breg = 0;
                } else if self.areg == 0 {
                    warn!("shl: Areg = 0");
                } else {
                    self.areg = self.breg << self.areg;
                    self.breg = self.creg;
                }
            }

            O_SHR => {
                self.inst_cycles = self.areg.wrapping_add(2);
                if self.areg >= BITS_PER_WORD {
                    warn!("shr: Areg >= 32");
                    self.inst_cycles = self.inst_cycles.wrapping_add(1);
                    self.areg = 0;
                    self.breg = 0;
                } else if self.areg == 0 {
                    warn!("shr: Areg = 0");
                } else {
                    self.areg = self.breg >> self.areg;
                    self.breg = self.creg;
                }
            }

            O_GT => {
                self.areg = ((self.breg as i32) > (self.areg as i32)) as u32;
                self.breg = self.creg;
                self.inst_cycles += 1;
            }

            O_LEND => {
                // Breg points at the loop control block: {index, count}.
                let count = mem.get_word(self.breg.wrapping_add(4));
                mem.set_word(self.breg.wrapping_add(4), count.wrapping_sub(1));
                if count > 1 {
                    let index = mem.get_word(self.breg);
                    mem.set_word(self.breg, index.wrapping_add(1));
                    self.iptr = self.iptr.wrapping_sub(self.areg);
                    self.inst_cycles = 10;
                } else {
                    self.inst_cycles = 5;
                }
                if self.status.deschedule_pending {
                    self.status.deschedule_required = true;
                }
            }

            O_BCNT => {
                self.areg <<= 2;
                self.inst_cycles += 1;
            }

            O_WCNT => {
                self.creg = self.breg;
                self.breg = byte_select(self.areg);
                self.areg >>= 2;
                self.inst_cycles = 5;
            }

            O_LDPI => {
                self.areg = self.areg.wrapping_add(self.iptr);
                self.inst_cycles += 1;
            }

            O_MINT => {
                self.push(NOT_PROCESS);
            }

            O_BSUB => {
                self.areg = self.areg.wrapping_add(self.breg);
                self.breg = self.creg;
            }

            O_WSUB => {
                self.areg = self.areg.wrapping_add(self.breg << 2);
                self.breg = self.creg;
                self.inst_cycles += 1;
            }

            O_WSUBDB => {
                self.areg = self.areg.wrapping_add(self.breg << 3);
                self.breg = self.creg;
                self.inst_cycles = 3;
            }

            O_MOVE => {
                let (len, dst, src) = (self.areg, self.breg, self.creg);
                let dst_overlaps = src <= dst && dst < src.wrapping_add(len);
                let src_overlaps = dst <= src && src < dst.wrapping_add(len);
                if !dst_overlaps && !src_overlaps {
                    self.inst_cycles = 8;
                    self.status.interrupt = true;
                    mem.block_copy(len, src, dst);
                } else {
                    warn!("move: blocks overlap");
                }
            }

            O_IN => {
                // Input Areg bytes from the channel at Breg into memory at
                // Creg. 2w+18 cycles if the communication proceeds, 20 if it
                // waits and the process deschedules.
                self.inst_cycles = 18;
                self.status.interrupt = true;
                if let Some(n) = Self::link_for_input(self.breg) {
                    self.link_input(n, mem);
                } else if mem.is_legal(self.creg)
                    && mem.is_legal(self.creg.wrapping_add(self.areg))
                {
                    self.channel_rendezvous(CommDirection::Input, mem);
                } else {
                    warn!(
                        "in to bad memory area Creg={:08X} Areg={:08X}",
                        self.creg, self.areg
                    );
                }
            }

            O_OUT => {
                // Output Areg bytes from memory at Creg to the channel at
                // Breg. 2w+20 cycles if the communication proceeds, 20 if it
                // waits and the process deschedules.
                self.inst_cycles = 20;
                self.status.interrupt = true;
                if let Some(n) = Self::link_for_output(self.breg) {
                    self.link_output(n, mem);
                } else if mem.is_legal(self.creg)
                    && mem.is_legal(self.creg.wrapping_add(self.areg))
                {
                    self.channel_rendezvous(CommDirection::Output, mem);
                } else {
                    warn!(
                        "out from bad memory area Creg={:08X} Areg={:08X}",
                        self.creg, self.areg
                    );
                }
            }

            O_OUTBYTE => {
                self.inst_cycles = 25;
                if let Some(n) = Self::link_for_output(self.breg) {
                    let b = (self.areg & 0xFF) as u8;
                    if let Err(e) = self.links[n].write_byte(b) {
                        warn!("outbyte failed to write byte to link {}: {}", n, e);
                        self.status.terminate = true;
                    }
                } else {
                    // The value travels through the workspace temp slot.
                    mem.set_byte(w_temp(self.wdesc), (self.areg & 0xFF) as u8);
                    self.channel_output_from_temp(mem);
                }
            }

            O_OUTWORD => {
                self.inst_cycles = 25;
                if let Some(n) = Self::link_for_output(self.breg) {
                    let w = self.areg;
                    if let Err(e) = self.links[n].write_word(w) {
                        warn!("outword failed to write word to link {}: {}", n, e);
                        self.status.terminate = true;
                    }
                } else {
                    mem.set_word(w_temp(self.wdesc), self.areg);
                    self.channel_output_from_temp(mem);
                }
            }

            O_LB => {
                self.areg = mem.get_byte(self.areg) as u32;
                self.inst_cycles = 5;
            }

            O_SB => {
                mem.set_byte(self.areg, (self.breg & 0xFF) as u8);
                self.inst_cycles = 4;
            }

            O_GCALL => {
                std::mem::swap(&mut self.areg, &mut self.iptr);
                self.inst_cycles = 4;
            }

            O_GAJW => {
                if byte_select(self.areg) != byte_select(self.wdesc) {
                    warn!("gajw: Attempting to change priority");
                }
                let t = self.areg;
                self.areg = self.wdesc;
                self.wdesc = (t & addr::WORD_MASK) | byte_select(self.wdesc);
                self.inst_cycles += 1;
            }

            O_RET => {
                self.iptr = mem.get_word(wdesc_wptr(self.wdesc));
                self.wdesc = self.wdesc.wrapping_add(16);
                self.inst_cycles = 5;
            }

            O_STARTP => {
                // Start the process with workspace Areg at Breg bytes past
                // IPtr, on the current priority queue.
                mem.set_word(w_iptr(self.areg), self.iptr.wrapping_add(self.breg));
                self.schedule_wdesc = wdesc_wptr(self.areg) | wdesc_priority(self.wdesc);
                self.inst_cycles = 12;
            }

            O_ENDP => {
                self.inst_cycles = 13;
                let count = mem.get_word(self.areg.wrapping_add(4));
                mem.set_word(self.areg.wrapping_add(4), count.wrapping_sub(1));
                if count == 1 {
                    // Continue as the process waiting in workspace Areg.
                    if byte_select(self.wdesc) != byte_select(self.areg) {
                        warn!("endp: Attempting to change priority");
                    }
                    self.wdesc = wdesc_wptr(self.areg) | wdesc_priority(self.wdesc);
                    self.iptr = mem.get_word(wdesc_wptr(self.wdesc));
                } else {
                    self.status.deschedule_required = true;
                }
            }

            O_RUNP => {
                self.schedule_wdesc = self.areg;
                self.inst_cycles = 10;
            }

            O_STOPP => {
                mem.set_word(w_iptr(self.wdesc), self.iptr);
                self.status.deschedule_required = true;
                self.inst_cycles = 11;
            }

            O_LDPRI => {
                let p = wdesc_priority(self.wdesc);
                self.push(p);
            }

            O_LDTIMER => {
                self.inst_cycles += 1;
                self.status.timer_instruction = true;
                let clock = self.current_priority_clock();
                self.push(clock);
            }

            O_TIN => {
                // Wait until the time in Areg. A time already past continues
                // immediately; otherwise the process joins the timer list of
                // its priority and sleeps.
                self.status.timer_instruction = true;
                let now = self.current_priority_clock();
                if time_after(self.areg, now) {
                    mem.set_word(w_time(self.wdesc), self.areg);
                    let (wdesc, time) = (self.wdesc, self.areg);
                    self.timer_insert(wdesc, time, mem);
                    mem.set_word(w_iptr(self.wdesc), self.iptr);
                    self.status.deschedule_required = true;
                }
            }

            O_CSUB0 => {
                if self.breg >= self.areg {
                    self.status.error = true;
                }
                self.inst_cycles += 1;
                self.drop_stack();
            }

            O_CCNT1 => {
                if self.breg == 0 || self.breg > self.areg {
                    self.status.error = true;
                }
                self.inst_cycles = 3;
                self.drop_stack();
            }

            O_TESTERR => {
                // Worst case timing.
                self.inst_cycles = 3;
                let clear = !self.status.error;
                self.push(clear as u32);
                self.status.error = false;
            }

            O_STOPERR => {
                if self.status.error {
                    warn!("stoperr: ErrorFlag is set. Deschedule?");
                    mem.set_word(w_iptr(self.wdesc), self.iptr);
                    self.status.deschedule_required = true;
                    self.inst_cycles += 1;
                }
            }

            O_SETERR => {
                self.status.error = true;
            }

            O_XWORD => {
                // Sign-extend B, whose sign bit has weight A.
                let (a, b) = (self.areg, self.breg);
                if b < a {
                    self.areg = b;
                } else if b < a << 1 {
                    self.areg = b.wrapping_sub(a << 1);
                } else {
                    warn!("xword: Breg out of range");
                }
                self.inst_cycles = 4;
                self.breg = self.creg;
            }

            O_CWORD => {
                let (a, b) = (self.areg as i32, self.breg as i32);
                if b >= a || b <= -a {
                    self.status.error = true;
                }
                self.inst_cycles = 5;
                self.drop_stack();
            }

            O_XDBLE => {
                self.inst_cycles += 1;
                self.creg = self.breg;
                self.breg = if (self.areg as i32) < 0 { 0xFFFF_FFFF } else { 0 };
            }

            O_CSNGL => {
                let a = self.areg as i32;
                if (a < 0 && self.breg != 0xFFFF_FFFF) || (a >= 0 && self.breg != 0) {
                    self.status.error = true;
                }
                self.inst_cycles = 3;
                self.breg = self.creg;
            }

            O_RESETCH => {
                let channel = self.areg;
                self.areg = mem.get_word(channel);
                mem.set_word(channel, NOT_PROCESS);
            }

            O_STHF => {
                self.status.queue_instruction = true;
                self.hi_head = self.pop();
            }

            O_STLF => {
                self.status.queue_instruction = true;
                self.lo_head = self.pop();
            }

            O_STHB => {
                self.status.queue_instruction = true;
                self.hi_tail = self.pop();
            }

            O_STLB => {
                self.status.queue_instruction = true;
                self.lo_tail = self.pop();
            }

            O_STTIMER => {
                // The clocks are always running.
                self.status.timer_instruction = true;
                self.hi_clock = self.pop();
                self.lo_clock = self.hi_clock;
                self.cycle_count_since_reset = 0;
            }

            O_SAVEH => {
                mem.set_word(self.areg, self.hi_head);
                mem.set_word(self.areg.wrapping_add(4), self.hi_tail);
                self.inst_cycles = 4;
                self.drop_stack();
            }

            O_SAVEL => {
                mem.set_word(self.areg, self.lo_head);
                mem.set_word(self.areg.wrapping_add(4), self.lo_tail);
                self.inst_cycles = 4;
                self.drop_stack();
            }

            O_CLRHALTERR => {
                self.status.halt_on_error = false;
            }

            O_SETHALTERR => {
                self.status.halt_on_error = true;
            }

            O_TESTHALTERR => {
                let set = self.status.halt_on_error;
                self.push(set as u32);
                self.inst_cycles += 1;
            }

            O_DUP => {
                self.creg = self.breg;
                self.breg = self.areg;
            }

            // ---- ALT selection ----
            O_ALT => {
                mem.set_word(w_altstate(self.wdesc), ENABLING);
                self.inst_cycles += 1;
            }

            O_TALT => {
                mem.set_word(w_altstate(self.wdesc), ENABLING);
                mem.set_word(w_tlink(self.wdesc), TIME_NOT_SET);
                self.inst_cycles = 4;
            }

            O_ENBC => {
                // Enable the channel guard at Breg when Areg is true.
                if self.areg != 0 {
                    self.inst_cycles = 7;
                    let channel_word = mem.get_word(self.breg);
                    if channel_word == NOT_PROCESS {
                        // Initiate communication: register this process.
                        mem.set_word(self.breg, self.wdesc);
                    } else if channel_word == self.wdesc {
                        // Already waiting on this channel.
                    } else {
                        // Another process is waiting: the guard is ready.
                        mem.set_word(w_altstate(self.wdesc), READY);
                    }
                }
                self.breg = self.creg;
            }

            O_ENBS => {
                if self.areg != 0 {
                    mem.set_word(w_altstate(self.wdesc), READY);
                }
                self.inst_cycles = 3;
            }

            O_ENBT => {
                // Enable a timer guard with time Breg when Areg is true.
                if self.areg != 0 {
                    let time_state = mem.get_word(w_tlink(self.wdesc));
                    if time_state == TIME_NOT_SET {
                        mem.set_word(w_tlink(self.wdesc), ENABLING);
                        mem.set_word(w_time(self.wdesc), self.breg);
                    } else if time_state == ENABLING {
                        let alt_time = mem.get_word(w_time(self.wdesc));
                        let now = self.current_priority_clock();
                        if time_after(now, alt_time) {
                            // The recorded time is already past; keep it.
                        } else if time_after(alt_time, self.breg) {
                            // This guard's time is earlier.
                            mem.set_word(w_time(self.wdesc), self.breg);
                        }
                    }
                }
                self.breg = self.creg;
                self.inst_cycles = 8;
            }

            O_ALTWT => {
                // No branch selected yet; sleep unless a guard is ready.
                mem.set_word(w_temp(self.wdesc), NONE_SELECTED);
                if mem.get_word(w_altstate(self.wdesc)) != READY {
                    mem.set_word(w_altstate(self.wdesc), WAITING);
                    mem.set_word(w_iptr(self.wdesc), self.iptr);
                    self.status.deschedule_required = true;
                }
            }

            O_TALTWT => {
                // As altwt, but a timer guard can bound the wait.
                mem.set_word(w_temp(self.wdesc), NONE_SELECTED);
                let ready = mem.get_word(w_altstate(self.wdesc)) == READY;
                let time_enabled = mem.get_word(w_tlink(self.wdesc)) == ENABLING;
                if !ready {
                    if time_enabled {
                        let alt_time = mem.get_word(w_time(self.wdesc));
                        let now = self.current_priority_clock();
                        if !time_after(alt_time, now) {
                            // The alt time is already past: resolve now.
                            mem.set_word(w_altstate(self.wdesc), READY);
                        } else {
                            mem.set_word(w_altstate(self.wdesc), WAITING);
                            mem.set_word(w_iptr(self.wdesc), self.iptr);
                            let (wdesc, time) = (self.wdesc, alt_time);
                            self.timer_insert(wdesc, time, mem);
                            self.status.deschedule_required = true;
                        }
                    } else {
                        mem.set_word(w_altstate(self.wdesc), WAITING);
                        mem.set_word(w_iptr(self.wdesc), self.iptr);
                        self.status.deschedule_required = true;
                    }
                }
            }

            O_ALTEND => {
                self.iptr = self.iptr.wrapping_add(mem.get_word(w_temp(self.wdesc)));
            }

            O_DISS => {
                // Offset in Areg, guard flag in Breg.
                if self.breg != 0 && mem.get_word(w_temp(self.wdesc)) == NONE_SELECTED {
                    mem.set_word(w_temp(self.wdesc), self.areg);
                    self.areg = 1;
                } else {
                    self.areg = 0;
                }
                self.breg = self.creg;
                self.inst_cycles = 4;
            }

            O_DISC => {
                // Offset in Areg, guard flag in Breg, channel in Creg.
                if self.breg != 0
                    && mem.get_word(self.creg) != NOT_PROCESS
                    && mem.get_word(self.creg) != self.wdesc
                    && mem.get_word(w_temp(self.wdesc)) == NONE_SELECTED
                {
                    mem.set_word(w_temp(self.wdesc), self.areg);
                    self.areg = 1;
                } else {
                    // Deregister this process if it is still in the channel.
                    if self.breg != 0 && mem.get_word(self.creg) == self.wdesc {
                        mem.set_word(self.creg, NOT_PROCESS);
                    }
                    self.areg = 0;
                }
                self.inst_cycles = 8;
            }

            O_DIST => {
                // Offset in Areg, guard flag in Breg, time in Creg.
                let now = self.current_priority_clock();
                if self.breg != 0
                    && !time_after(self.creg, now)
                    && mem.get_word(w_temp(self.wdesc)) == NONE_SELECTED
                {
                    mem.set_word(w_temp(self.wdesc), self.areg);
                    self.areg = 1;
                } else {
                    self.areg = 0;
                }
                self.status.interrupt = true;
            }

            // ---- Long arithmetic ----
            O_LADD => {
                let mut sign = self.areg & SIGN_BIT;
                self.areg = self.areg.wrapping_add(self.breg);
                if self.areg & SIGN_BIT != sign {
                    self.status.error = true;
                }
                sign = self.areg & SIGN_BIT;
                self.areg = self.areg.wrapping_add(self.creg & 1);
                if self.areg & SIGN_BIT != sign {
                    self.status.error = true;
                }
                self.inst_cycles += 1;
            }

            O_LSUB => {
                let mut sign = self.areg & SIGN_BIT;
                self.areg = self.breg.wrapping_sub(self.areg);
                if self.areg & SIGN_BIT != sign {
                    self.status.error = true;
                }
                sign = self.areg & SIGN_BIT;
                self.areg = self.areg.wrapping_sub(self.creg & 1);
                if self.areg & SIGN_BIT != sign {
                    self.status.error = true;
                }
                self.inst_cycles += 1;
            }

            O_LSUM => {
                let sum =
                    self.areg as u64 + self.breg as u64 + (self.creg & 1) as u64;
                self.areg = sum as u32;
                self.breg = (sum >> BITS_PER_WORD) as u32;
                self.inst_cycles = 3;
            }

            O_LDIFF => {
                let (partial, borrow1) = self.breg.overflowing_sub(self.areg);
                let (result, borrow2) = partial.overflowing_sub(self.creg & 1);
                self.areg = result;
                self.breg = (borrow1 || borrow2) as u32;
                self.inst_cycles = 3;
            }

            O_LMUL => {
                let product = (self.breg as u64) * (self.areg as u64) + (self.creg as u64);
                self.inst_cycles = BITS_PER_WORD + 1;
                self.breg = (product & 0xFFFF_FFFF) as u32;
                self.areg = (product >> BITS_PER_WORD) as u32;
            }

            O_LDIV => {
                self.inst_cycles = BITS_PER_WORD + 3;
                if self.creg >= self.areg {
                    self.status.error = true;
                } else if self.creg == 0 {
                    let quotient = self.breg / self.areg;
                    self.breg %= self.areg;
                    self.areg = quotient;
                } else {
                    let dividend = make_u64(self.creg, self.breg);
                    let divisor = self.areg as u64;
                    self.breg = (dividend % divisor) as u32;
                    self.areg = (dividend / divisor) as u32;
                }
            }

            O_LSHL => {
                self.inst_cycles = self.areg.wrapping_add(3);
                if self.areg >= BITS_PER_WORD * 2 {
                    warn!("lshl: Areg >= 64");
                    self.inst_cycles = 3;
                    self.areg = 0;
                    self.breg = 0;
                } else if self.areg == 0 {
                    warn!("lshl: Areg = 0");
                } else {
                    let shifted = make_u64(self.creg, self.breg) << self.areg;
                    self.areg = (shifted & 0xFFFF_FFFF) as u32;
                    self.breg = (shifted >> BITS_PER_WORD) as u32;
                }
            }

            O_LSHR => {
                self.inst_cycles = self.areg.wrapping_add(3);
                if self.areg >= BITS_PER_WORD * 2 {
                    warn!("lshr: Areg >= 64");
                    self.inst_cycles = 3;
                    self.areg = 0;
                    self.breg = 0;
                } else if self.areg == 0 {
                    warn!("lshr: Areg = 0");
                } else {
                    let shifted = make_u64(self.creg, self.breg) >> self.areg;
                    self.areg = (shifted & 0xFFFF_FFFF) as u32;
                    self.breg = (shifted >> BITS_PER_WORD) as u32;
                }
            }

            // ---- Bit operations ----
            O_BITCNT => {
                let count = self.areg.count_ones();
                let highest = highest_set_bit(self.areg);
                self.areg = self.breg.wrapping_add(count);
                self.breg = self.creg;
                self.inst_cycles = highest + 2;
            }

            O_BITREVWORD => {
                self.areg = self.areg.reverse_bits();
                // The hardware shifts every bit through.
                self.inst_cycles = BITS_PER_WORD + 4;
            }

            O_BITREVNBITS => {
                // Areg = the bottom Areg bits of Breg reversed, upper bits
                // zero.
                if self.areg >= BITS_PER_WORD {
                    warn!("bitrevnbits: Areg >= 32");
                    self.areg = 0;
                    self.breg = 0;
                } else if self.areg == 0 {
                    warn!("bitrevnbits: Areg = 0");
                } else {
                    let n = self.areg;
                    self.areg = self.breg.reverse_bits() >> (BITS_PER_WORD - n);
                    self.breg = self.creg;
                }
                self.inst_cycles = self.areg.wrapping_add(4);
            }

            // ---- Floating point error flags ----
            O_FPCHKERR => {
                self.inst_cycles += 1;
                self.status.error = self.status.fp_error;
            }

            O_FPTESTERR => {
                let clear = !self.status.fp_error;
                self.push(clear as u32);
                self.inst_cycles += 1;
            }

            O_FPENTRY => match self.areg {
                FP_FPUSETERR => {
                    self.status.fp_error = true;
                }
                FP_FPUCLRERR => {
                    self.status.fp_error = false;
                }
                FP_FPUSQRTFIRST | FP_FPUSQRTSTEP | FP_FPUSQRTLAST | FP_FPURP | FP_FPURM
                | FP_FPURZ | FP_FPUR32TOR64 | FP_FPUR64TOR32 | FP_FPUEXPDEC32
                | FP_FPUEXPINC32 | FP_FPUABS | FP_FPUNOROUND | FP_FPCHKI32 | FP_FPUCHKI64
                | FP_FPUDIVBY2 | FP_FPUMULBY2 | FP_FPURN => {
                    warn!("Unimplemented FP instruction Areg={:08X}", self.areg);
                    self.status.bad_instruction = true;
                }
                _ => {
                    warn!("Unknown FP instruction Areg={:08X}", self.areg);
                    self.status.bad_instruction = true;
                }
            },

            // ---- Nonstandard emulator operations ----
            X_TOGGLEMONITOR => {
                if self.debug.monitor {
                    info!("Exiting monitor");
                    self.debug.monitor = false;
                } else {
                    info!("Entering monitor");
                    self.debug.monitor = true;
                }
            }

            X_TOGGLEDISASM => {
                if self.debug.level >= super::DebugLevel::Disasm {
                    info!("Stopping disassembly");
                    self.debug.level = super::DebugLevel::None;
                } else {
                    info!("Starting disassembly");
                    self.debug.level = super::DebugLevel::OprCodes;
                }
            }

            X_TERMINATE => {
                info!("Terminating emulator upon terminate instruction");
                self.status.terminate = true;
            }

            X_MARKER => {
                self.log_marker();
            }

            X_EMUQUERY => {
                let response = match self.areg {
                    EQ_MEMTOP => mem.mem_end(),
                    _ => {
                        warn!("Unknown EQ instruction Areg={:08X}", self.areg);
                        self.status.bad_instruction = true;
                        NOT_PROCESS
                    }
                };
                self.push(response);
            }

            // Easy to implement but not needed yet, plus the floating-point
            // load/store/arithmetic set, which this emulator does not model.
            O_MOVE2DINIT | O_MOVE2DALL | O_MOVE2DNONZERO | O_MOVE2DZERO | O_CRCWORD
            | O_CRCBYTE | O_NORM | O_TESTPRANAL | O_FMUL | O_UNPACKSN | O_ROUNDSN
            | O_POSTNORMSN | O_LDINF | O_CFLERR | O_FPDUP | O_FPREV | O_FPLDNLSN
            | O_FPLDNLDB | O_FPLDNLSNI | O_FPLDNLDBI | O_FPSTNLSN | O_FPSTNLDB | O_FPADD
            | O_FPSUB | O_FPMUL | O_FPDIV | O_FPREMFIRST | O_FPREMSTEP | O_FPLDZEROSN
            | O_FPLDZERODB | O_FPLDNLADDSN | O_FPLDNLADDDB | O_FPLDNLMULSN | O_FPLDNLMULDB
            | O_FPGT | O_FPEQ | O_FPORDERED | O_FPNAN | O_FPNOTFINITE | O_FPINT
            | O_FPSTNLI32 | O_FPRTOI32 | O_FPI32TOR32 | O_FPI32TOR64 | O_FPB32TOR64 => {
                warn!("Unimplemented opr instruction Oreg={:08X}", self.oreg);
                self.status.bad_instruction = true;
            }

            _ => {
                warn!("Unknown opr instruction Oreg={:08X}", self.oreg);
                self.status.bad_instruction = true;
            }
        }
    }

    // ========== Channel rendezvous ==========

    /// Rendezvous on a memory channel for `in`/`out`. Areg = length,
    /// Breg = channel, Creg = local buffer.
    fn channel_rendezvous(&mut self, direction: CommDirection, mem: &mut Memory) {
        let channel_word = mem.get_word(self.breg);
        if wdesc_wptr(channel_word) == NOT_PROCESS {
            // First to the rendezvous: register and wait for the partner.
            mem.set_word(w_pointer(self.wdesc), self.creg);
            mem.set_word(self.breg, self.wdesc);
            mem.set_word(w_iptr(self.wdesc), self.iptr);
            self.inst_cycles = 20;
            self.status.deschedule_required = true;
            return;
        }

        let partner = channel_word;
        let partner_pointer = mem.get_word(w_pointer(partner));

        if direction == CommDirection::Output && is_alt_token(partner_pointer) {
            // The partner is ALTing on this channel. Take its place in the
            // channel word, wait, and make its guard ready; the selected
            // branch's `in` completes the transfer.
            mem.set_word(w_pointer(self.wdesc), self.creg);
            mem.set_word(self.breg, self.wdesc);
            mem.set_word(w_iptr(self.wdesc), self.iptr);
            self.status.deschedule_required = true;
            if partner_pointer == WAITING {
                mem.set_word(w_altstate(partner), READY);
                self.schedule_wdesc = partner;
            } else if partner_pointer == ENABLING {
                mem.set_word(w_altstate(partner), READY);
            }
            return;
        }

        // The partner arrived first: its workspace −3 slot holds its buffer
        // address. Copy in the right direction, free the channel, and ask
        // for the partner to be scheduled.
        match direction {
            CommDirection::Input => mem.block_copy(self.areg, partner_pointer, self.creg),
            CommDirection::Output => mem.block_copy(self.areg, self.creg, partner_pointer),
        }
        mem.set_word(self.breg, NOT_PROCESS);
        self.schedule_wdesc = partner;
    }

    /// Rendezvous for `outbyte`/`outword`: the value is already in the
    /// workspace temp slot. Breg = channel.
    fn channel_output_from_temp(&mut self, mem: &mut Memory) {
        let channel_word = mem.get_word(self.breg);
        if wdesc_wptr(channel_word) == NOT_PROCESS {
            mem.set_word(w_pointer(self.wdesc), wdesc_wptr(self.wdesc));
            mem.set_word(self.breg, self.wdesc);
            mem.set_word(w_iptr(self.wdesc), self.iptr);
            self.status.deschedule_required = true;
            return;
        }

        let partner = channel_word;
        let partner_pointer = mem.get_word(w_pointer(partner));

        if is_alt_token(partner_pointer) {
            mem.set_word(w_pointer(self.wdesc), wdesc_wptr(self.wdesc));
            mem.set_word(self.breg, self.wdesc);
            mem.set_word(w_iptr(self.wdesc), self.iptr);
            self.status.deschedule_required = true;
            if partner_pointer == WAITING {
                mem.set_word(w_altstate(partner), READY);
                self.schedule_wdesc = partner;
            } else if partner_pointer == ENABLING {
                mem.set_word(w_altstate(partner), READY);
            }
            return;
        }

        // The input arrived first; deliver straight into its buffer.
        let value = mem.get_word(w_temp(self.wdesc));
        if self.oreg == O_OUTBYTE {
            mem.set_byte(partner_pointer, (value & 0xFF) as u8);
        } else {
            mem.set_word(partner_pointer, value);
        }
        mem.set_word(self.breg, NOT_PROCESS);
        self.schedule_wdesc = partner;
    }

    // ========== Link transfers ==========

    /// Byte-at-a-time input of Areg bytes from link `n` into Creg.
    fn link_input(&mut self, n: usize, mem: &mut Memory) {
        for i in 0..self.areg {
            match self.links[n].read_byte() {
                Ok(b) => mem.set_byte(self.creg.wrapping_add(i), b),
                Err(e) => {
                    warn!("in failed to read byte from link {}: {}", n, e);
                    self.status.terminate = true;
                    return;
                }
            }
        }
        if self.debug.link_comms {
            debug!("in read {} bytes from link {}", self.areg, n);
        }
    }

    /// Byte-at-a-time output of Areg bytes from Creg to link `n`.
    fn link_output(&mut self, n: usize, mem: &mut Memory) {
        for i in 0..self.areg {
            let b = mem.get_byte(self.creg.wrapping_add(i));
            if let Err(e) = self.links[n].write_byte(b) {
                warn!("out failed to write byte to link {}: {}", n, e);
                self.status.terminate = true;
                return;
            }
        }
        if self.debug.link_comms {
            debug!("out wrote {} bytes to link {}", self.areg, n);
        }
    }
}

/// The reserved ALT tokens are distinct from workspace descriptors by
/// construction: a real workspace never sits in the lowest words of memory.
fn is_alt_token(word: u32) -> bool {
    word == ENABLING || word == WAITING || word == READY
}
