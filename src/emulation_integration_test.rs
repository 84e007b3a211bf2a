//! End-to-end emulation scenarios: boot over a link, run, inspect memory.

use crate::cpu::{Cpu, DebugConfig};
use crate::emu::Emu;
use crate::link::{Link, NullLink, StubLink};
use crate::memory::{addr, Memory};

fn booted_emu(boot_bytes: &[u8], mem_size: usize) -> Emu {
    let mut boot_link = StubLink::new(0, false);
    boot_link.set_readable_bytes(boot_bytes);
    let links: [Box<dyn Link>; 4] = [
        Box::new(boot_link),
        Box::new(NullLink::new(1)),
        Box::new(NullLink::new(2)),
        Box::new(NullLink::new(3)),
    ];
    let cpu = Cpu::new(links, DebugConfig::default());
    let mem = Memory::new(mem_size);
    let mut emu = Emu::new(mem, cpu);
    emu.boot().unwrap();
    emu
}

#[test]
fn test_boot_scenario_stored_byte() {
    // Boot image: ldc 1; stl 0; then zeros. The program stores 1 into
    // workspace word 0 and walks on through empty memory.
    let mut emu = booted_emu(&[0x04, 0x41, 0xD0, 0x00, 0x00], 64 * 1024);
    emu.run_steps(10);
    let wptr = emu.cpu().wdesc & addr::WORD_MASK;
    assert_eq!(emu.mem_mut().get_byte(wptr), 0x01);
}

#[test]
fn test_boot_workspace_is_aligned_past_the_image() {
    let mut emu = booted_emu(&[0x02, 0x11, 0x22], 64 * 1024);
    assert_eq!(emu.mem_mut().get_byte(addr::MEM_START), 0x11);
    assert_eq!(emu.mem_mut().get_byte(addr::MEM_START + 1), 0x22);
    assert_eq!(emu.cpu().wdesc, ((addr::MEM_START + 2 + 3) & addr::WORD_MASK) | 1);
}

#[test]
fn test_register_state_after_boot() {
    let emu = booted_emu(&[0x02, 0x00, 0x00], 64 * 1024);
    let cpu = emu.cpu();
    assert_eq!(cpu.iptr, addr::MEM_START);
    assert_eq!(cpu.areg, 0);
    assert_eq!(cpu.breg, 0);
    assert_eq!(cpu.creg, addr::LINK0_INPUT);
    assert_eq!(cpu.hi_head, crate::cpu::UNINITIALISED_QUEUE);
    assert_eq!(cpu.lo_tail, crate::cpu::UNINITIALISED_QUEUE);
    assert_eq!(cpu.hi_timer_head, crate::cpu::NOT_PROCESS);
}

#[test]
fn test_memory_violation_terminates_when_configured() {
    // ldnl 0 with A = 0: reads word at address 0, far outside memory.
    let mut emu = booted_emu(&[0x02, 0x40, 0x30], 64 * 1024);
    emu.mem_mut().set_terminate_on_violation(true);
    emu.run_steps(10);
    assert!(emu.cpu().status.terminate);
}

#[test]
fn test_memory_violation_poisons_and_continues_by_default() {
    let mut emu = booted_emu(&[0x04, 0x40, 0x30, 0xD0, 0x00], 64 * 1024);
    emu.run_steps(4);
    assert!(!emu.cpu().status.terminate);
    // The poisoned word was stored to the workspace by stl 0.
    let wptr = emu.cpu().wdesc & addr::WORD_MASK;
    assert_eq!(emu.mem_mut().get_word(wptr), crate::memory::BAD_WORD);
}

#[test]
fn test_program_output_to_link_0() {
    // A bootstrap that sends 'H' down Link 0 with outbyte:
    // ldc Link0Output; ldc 'H'; outbyte; terminate.
    // Link0Output is MostNeg, loaded as mint.
    let image = [
        0x24, 0xF2, // mint
        0x24, 0x48, // ldc 'H' (0x48)
        0xFE, // outbyte
        0x2C, 0xF2, // terminate
    ];
    let mut boot = vec![image.len() as u8];
    boot.extend_from_slice(&image);
    let mut emu = booted_emu(&boot, 64 * 1024);
    emu.run();
    assert!(emu.cpu().status.terminate);
    let written = emu
        .cpu_mut()
        .link_mut(0)
        .as_any_mut()
        .downcast_mut::<StubLink>()
        .unwrap()
        .written_bytes();
    assert_eq!(written, vec![b'H']);
}

#[test]
fn test_program_input_from_link_0() {
    // in 2 bytes from Link0Input to MemStart+0x40:
    // ldc dst; ldc Link0Input; ldc 2; in; terminate.
    // dst is MemStart+0x40 = MostNeg + 0xB0; build it as mint; ldnlp 0x2C.
    let image = [
        0x24, 0xF2, // mint (MostNeg)
        0x22, 0x5C, // ldnlp 0x2C -> MostNeg + 0xB0
        0x24, 0xF2, // mint
        0x54, // ldnlp 4 -> Link0Input
        0x42, // ldc 2
        0xF7, // in
        0x2C, 0xF2, // terminate
    ];
    let mut boot = vec![image.len() as u8];
    boot.extend_from_slice(&image);
    // The two message bytes follow the bootstrap on the same link.
    boot.extend_from_slice(&[0xAB, 0xCD]);
    let mut emu = booted_emu(&boot, 64 * 1024);
    emu.run();
    assert!(emu.cpu().status.terminate);
    assert_eq!(emu.mem_mut().get_byte(0x8000_00B0), 0xAB);
    assert_eq!(emu.mem_mut().get_byte(0x8000_00B1), 0xCD);
}
