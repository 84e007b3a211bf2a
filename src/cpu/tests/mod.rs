//! CPU instruction and scheduler tests
//!
//! Programs are assembled with the prefixing encoder below, deposited at
//! MemStart, and stepped directly. Links are stubs so channel traffic can
//! be injected and observed.

use crate::cpu::{Cpu, DebugConfig};
use crate::link::{Link, StubLink};
use crate::memory::{addr, Memory};

mod process;

/// A roomy test memory.
pub const TEST_MEM_SIZE: usize = 1024 * 1024;

/// Build a CPU with four stub links and a fresh memory.
pub fn test_cpu() -> (Cpu, Memory) {
    let links: [Box<dyn Link>; 4] = [
        Box::new(StubLink::new(0, false)),
        Box::new(StubLink::new(1, false)),
        Box::new(StubLink::new(2, false)),
        Box::new(StubLink::new(3, false)),
    ];
    let cpu = Cpu::new(links, DebugConfig::default());
    let mem = Memory::new(TEST_MEM_SIZE);
    (cpu, mem)
}

/// Reach the stub behind link `n`.
pub fn stub(cpu: &mut Cpu, n: usize) -> &mut StubLink {
    cpu.link_mut(n)
        .as_any_mut()
        .downcast_mut::<StubLink>()
        .expect("test links are stubs")
}

/// Append one instruction, prefixing the operand as needed.
pub fn encode(out: &mut Vec<u8>, op: u8, operand: i32) {
    if (0..=15).contains(&operand) {
        out.push(op | operand as u8);
    } else if operand > 15 {
        encode(out, 0x20, operand >> 4);
        out.push(op | (operand & 0xF) as u8);
    } else {
        encode(out, 0x60, !operand >> 4);
        out.push(op | (operand & 0xF) as u8);
    }
}

/// Assemble a sequence of (direct opcode, operand) pairs.
pub fn asm(instructions: &[(u8, i32)]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(op, operand) in instructions {
        encode(&mut out, op, operand);
    }
    out
}

/// An `opr` instruction for the given operation.
pub fn opr(operation: u32) -> (u8, i32) {
    (crate::cpu::opcodes::D_OPR, operation as i32)
}

/// Shorthand for `ldc`.
pub fn ldc(value: i32) -> (u8, i32) {
    (crate::cpu::opcodes::D_LDC, value)
}

/// Deposit `code` at `at` and point the CPU at it with workspace `wdesc`.
pub fn load_program(cpu: &mut Cpu, mem: &mut Memory, at: u32, wdesc: u32, code: &[u8]) {
    for (i, b) in code.iter().enumerate() {
        mem.set_byte(at + i as u32, *b);
    }
    cpu.iptr = at;
    cpu.wdesc = wdesc;
    mem.take_cycles();
}

/// A comfortable default workspace in the middle of test memory, low
/// priority.
pub const TEST_WDESC: u32 = 0x8008_0001;

/// Step until the CPU terminates or `limit` instructions have run.
/// Returns the number of instructions stepped.
pub fn run_until_terminate(cpu: &mut Cpu, mem: &mut Memory, limit: u64) -> u64 {
    let mut steps = 0;
    while !cpu.status.terminate && steps < limit {
        cpu.step(mem);
        steps += 1;
    }
    steps
}

/// Assemble and run `instructions` from MemStart until termination; the
/// program is given a terminate instruction at its end.
pub fn run_program(cpu: &mut Cpu, mem: &mut Memory, instructions: &[(u8, i32)]) {
    let mut program = instructions.to_vec();
    program.push(opr(crate::cpu::opcodes::X_TERMINATE));
    let code = asm(&program);
    load_program(cpu, mem, addr::MEM_START, TEST_WDESC, &code);
    let steps = run_until_terminate(cpu, mem, 10_000);
    assert!(
        cpu.status.terminate,
        "program did not terminate after {} steps",
        steps
    );
}

#[test]
fn test_encoder_prefixes() {
    // Small operands are a single byte.
    assert_eq!(asm(&[ldc(1)]), vec![0x41]);
    // Larger operands get pfix bytes.
    assert_eq!(asm(&[ldc(0x12)]), vec![0x21, 0x42]);
    assert_eq!(asm(&[ldc(0x345)]), vec![0x23, 0x24, 0x45]);
    // Negative operands get nfix.
    assert_eq!(asm(&[(crate::cpu::opcodes::D_J, -2)]), vec![0x60, 0x0E]);
}

#[test]
fn test_prefix_accumulation_in_the_interpreter() {
    let (mut cpu, mut mem) = test_cpu();
    run_program(&mut cpu, &mut mem, &[ldc(0x1234_5678)]);
    assert_eq!(cpu.areg, 0x1234_5678);

    let (mut cpu, mut mem) = test_cpu();
    run_program(&mut cpu, &mut mem, &[ldc(-1)]);
    assert_eq!(cpu.areg, 0xFFFF_FFFF);

    let (mut cpu, mut mem) = test_cpu();
    run_program(&mut cpu, &mut mem, &[ldc(i32::MIN)]);
    assert_eq!(cpu.areg, 0x8000_0000);
}
