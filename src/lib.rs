//! T800 Transputer emulator core and host I/O server
//!
//! Emulates an INMOS T800-class Transputer: a 32-bit stack-machine CPU with
//! an on-chip scheduler, paired high/low priority run queues, microsecond
//! timers, and four bidirectional serial links. The companion host server
//! services file, console, time, command-line and exit requests from
//! programs running inside the emulator, framed over Link 0.
//!
//! # Architecture
//!
//! | Module      | Responsibility                                   |
//! |-------------|--------------------------------------------------|
//! | `memory`    | Flat little-endian memory with cycle counting    |
//! | `link`      | Byte-stream link transports                      |
//! | `asynclink` | Bit-level link wire protocol state machines      |
//! | `cpu`       | Instruction interpreter, scheduler, channels     |
//! | `disasm`    | Mnemonic tables for the debug trace              |
//! | `emu`       | Orchestration: boot, interpret loop, monitor     |
//! | `iserver`   | Frame codec, protocol dispatcher, host platform  |

pub mod asynclink;
pub mod cpu;
pub mod disasm;
pub mod emu;
pub mod iserver;
pub mod link;
pub mod memory;

pub use emu::Emu;

#[cfg(test)]
mod emulation_integration_test;
