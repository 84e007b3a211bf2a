//! Process, scheduler, channel and timer tests.
//!
//! These tests run small multi-process programs: workspaces are carved out
//! of test memory, the run queues are initialised the way a bootstrap
//! would, and the interpreter is stepped until the scenario resolves.

use super::*;
use crate::cpu::helpers::{w_iptr, w_link, w_pointer, w_time, wdesc_wptr};
use crate::cpu::opcodes::*;
use crate::cpu::NOT_PROCESS;
use crate::memory::addr;

/// Initialise empty run queues, as a bootstrap would with mint/sthf/…
fn clear_queues(cpu: &mut Cpu) {
    cpu.hi_head = NOT_PROCESS;
    cpu.hi_tail = NOT_PROCESS;
    cpu.lo_head = NOT_PROCESS;
    cpu.lo_tail = NOT_PROCESS;
}

/// Place a descheduled process on the low-priority queue with its saved
/// instruction pointer.
fn enqueue_lo(cpu: &mut Cpu, mem: &mut Memory, wdesc: u32, iptr: u32) {
    mem.set_word(w_iptr(wdesc), iptr);
    mem.set_word(w_link(wdesc), NOT_PROCESS);
    if wdesc_wptr(cpu.lo_head) == NOT_PROCESS {
        cpu.lo_head = wdesc;
    } else {
        mem.set_word(w_link(cpu.lo_tail), wdesc);
    }
    cpu.lo_tail = wdesc;
}

/// Deposit code at `at`, returning the address past it.
fn deposit(mem: &mut Memory, at: u32, code: &[u8]) -> u32 {
    for (i, b) in code.iter().enumerate() {
        mem.set_byte(at + i as u32, *b);
    }
    at + code.len() as u32
}

const WRITER_WDESC: u32 = 0x8000_1001;
const READER_WDESC: u32 = 0x8000_1101;
const CHANNEL: u32 = 0x8000_2000;
const SRC_BUF: u32 = 0x8000_3000;
const DST_BUF: u32 = 0x8000_3100;
const WRITER_CODE: u32 = 0x8000_4000;
const READER_CODE: u32 = 0x8000_5000;

fn writer_program() -> Vec<u8> {
    asm(&[
        ldc(SRC_BUF as i32),
        ldc(CHANNEL as i32),
        ldc(4),
        opr(O_OUT),
        opr(X_MARKER),
        opr(X_TERMINATE),
    ])
}

fn reader_program() -> Vec<u8> {
    asm(&[
        ldc(DST_BUF as i32),
        ldc(CHANNEL as i32),
        ldc(4),
        opr(O_IN),
        opr(X_MARKER),
        opr(X_TERMINATE),
    ])
}

fn seed_message(mem: &mut Memory) {
    for (i, b) in [0xDEu8, 0xAD, 0xBE, 0xEF].iter().enumerate() {
        mem.set_byte(SRC_BUF + i as u32, *b);
    }
}

fn message_arrived(mem: &mut Memory) -> bool {
    (0..4).all(|i| {
        mem.get_byte(DST_BUF + i)
            == [0xDE, 0xAD, 0xBE, 0xEF][i as usize]
    })
}

#[test]
fn test_rendezvous_writer_first() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    seed_message(&mut mem);
    mem.set_word(CHANNEL, NOT_PROCESS);
    deposit(&mut mem, WRITER_CODE, &writer_program());
    deposit(&mut mem, READER_CODE, &reader_program());

    // The writer runs; the reader waits its turn on the queue.
    cpu.wdesc = WRITER_WDESC;
    cpu.iptr = WRITER_CODE;
    enqueue_lo(&mut cpu, &mut mem, READER_WDESC, READER_CODE);

    run_until_terminate(&mut cpu, &mut mem, 200);

    assert!(message_arrived(&mut mem));
    // The writer blocked first, then was rescheduled by the reader.
    assert_eq!(cpu.lo_head, WRITER_WDESC);
    assert_eq!(mem.get_word(CHANNEL), NOT_PROCESS);
}

#[test]
fn test_rendezvous_reader_first() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    seed_message(&mut mem);
    mem.set_word(CHANNEL, NOT_PROCESS);
    deposit(&mut mem, WRITER_CODE, &writer_program());
    deposit(&mut mem, READER_CODE, &reader_program());

    cpu.wdesc = READER_WDESC;
    cpu.iptr = READER_CODE;
    enqueue_lo(&mut cpu, &mut mem, WRITER_WDESC, WRITER_CODE);

    run_until_terminate(&mut cpu, &mut mem, 200);

    assert!(message_arrived(&mut mem));
    assert_eq!(cpu.lo_head, READER_WDESC);
    assert_eq!(mem.get_word(CHANNEL), NOT_PROCESS);
}

#[test]
fn test_rendezvous_first_arrival_registers_in_channel() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    seed_message(&mut mem);
    mem.set_word(CHANNEL, NOT_PROCESS);
    deposit(&mut mem, WRITER_CODE, &writer_program());

    cpu.wdesc = WRITER_WDESC;
    cpu.iptr = WRITER_CODE;
    // Step the three loads and the out.
    for _ in 0..20 {
        cpu.step(&mut mem);
        if mem.get_word(CHANNEL) != NOT_PROCESS {
            break;
        }
    }
    assert_eq!(mem.get_word(CHANNEL), WRITER_WDESC);
    assert_eq!(mem.get_word(w_pointer(WRITER_WDESC)), SRC_BUF);
}

#[test]
fn test_outbyte_rendezvous() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    mem.set_word(CHANNEL, NOT_PROCESS);
    // Writer sends one byte through the workspace temp slot; outbyte
    // wants A = value, B = channel.
    let writer = asm(&[
        ldc(CHANNEL as i32),
        ldc(0x5A),
        opr(O_OUTBYTE),
        opr(X_TERMINATE),
    ]);
    let reader = asm(&[
        ldc(DST_BUF as i32),
        ldc(CHANNEL as i32),
        ldc(1),
        opr(O_IN),
        opr(X_TERMINATE),
    ]);
    deposit(&mut mem, WRITER_CODE, &writer);
    deposit(&mut mem, READER_CODE, &reader);

    cpu.wdesc = WRITER_WDESC;
    cpu.iptr = WRITER_CODE;
    enqueue_lo(&mut cpu, &mut mem, READER_WDESC, READER_CODE);

    run_until_terminate(&mut cpu, &mut mem, 200);
    assert_eq!(mem.get_byte(DST_BUF), 0x5A);
}

#[test]
fn test_outword_rendezvous() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    mem.set_word(CHANNEL, NOT_PROCESS);
    let writer = asm(&[
        ldc(CHANNEL as i32),
        ldc(0x1234_5678),
        opr(O_OUTWORD),
        opr(X_TERMINATE),
    ]);
    let reader = asm(&[
        ldc(DST_BUF as i32),
        ldc(CHANNEL as i32),
        ldc(4),
        opr(O_IN),
        opr(X_TERMINATE),
    ]);
    deposit(&mut mem, WRITER_CODE, &writer);
    deposit(&mut mem, READER_CODE, &reader);

    cpu.wdesc = WRITER_WDESC;
    cpu.iptr = WRITER_CODE;
    enqueue_lo(&mut cpu, &mut mem, READER_WDESC, READER_CODE);

    run_until_terminate(&mut cpu, &mut mem, 200);
    assert_eq!(mem.get_word(DST_BUF), 0x1234_5678);
}

#[test]
fn test_in_from_link_reads_injected_bytes() {
    let (mut cpu, mut mem) = test_cpu();
    stub(&mut cpu, 1).set_readable_bytes(&[0x11, 0x22, 0x33]);
    run_program(
        &mut cpu,
        &mut mem,
        &[
            ldc(DST_BUF as i32),
            ldc(addr::LINK1_INPUT as i32),
            ldc(3),
            opr(O_IN),
        ],
    );
    assert_eq!(mem.get_byte(DST_BUF), 0x11);
    assert_eq!(mem.get_byte(DST_BUF + 1), 0x22);
    assert_eq!(mem.get_byte(DST_BUF + 2), 0x33);
}

#[test]
fn test_out_to_link_writes_bytes() {
    let (mut cpu, mut mem) = test_cpu();
    for (i, b) in [0xCAu8, 0xFE].iter().enumerate() {
        mem.set_byte(SRC_BUF + i as u32, *b);
    }
    run_program(
        &mut cpu,
        &mut mem,
        &[
            ldc(SRC_BUF as i32),
            ldc(addr::LINK2_OUTPUT as i32),
            ldc(2),
            opr(O_OUT),
        ],
    );
    assert_eq!(stub(&mut cpu, 2).written_bytes(), vec![0xCA, 0xFE]);
}

#[test]
fn test_outbyte_and_outword_to_link() {
    let (mut cpu, mut mem) = test_cpu();
    run_program(
        &mut cpu,
        &mut mem,
        &[ldc(addr::LINK3_OUTPUT as i32), ldc(0x7F), opr(O_OUTBYTE)],
    );
    assert_eq!(stub(&mut cpu, 3).written_bytes(), vec![0x7F]);

    let (mut cpu, mut mem) = test_cpu();
    run_program(
        &mut cpu,
        &mut mem,
        &[
            ldc(addr::LINK0_OUTPUT as i32),
            ldc(0x0102_0304),
            opr(O_OUTWORD),
        ],
    );
    assert_eq!(
        stub(&mut cpu, 0).written_bytes(),
        vec![0x04, 0x03, 0x02, 0x01]
    );
}

#[test]
fn test_link_read_failure_terminates() {
    let (mut cpu, mut mem) = test_cpu();
    // Nothing injected: the stub runs dry immediately.
    let code = asm(&[
        ldc(DST_BUF as i32),
        ldc(addr::LINK1_INPUT as i32),
        ldc(1),
        opr(O_IN),
    ]);
    load_program(&mut cpu, &mut mem, addr::MEM_START, TEST_WDESC, &code);
    run_until_terminate(&mut cpu, &mut mem, 50);
    assert!(cpu.status.terminate);
}

// ========== startp / endp / runp / stopp ==========

#[test]
fn test_startp_schedules_a_new_process() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    let child = 0x8000_6000u32;
    // startp: A = child workspace, B = code offset from the next
    // instruction.
    let code = asm(&[
        ldc(4),
        ldc(child as i32),
        opr(O_STARTP),
        opr(X_TERMINATE),
    ]);
    load_program(&mut cpu, &mut mem, addr::MEM_START, TEST_WDESC, &code);
    let after_startp = addr::MEM_START
        + asm(&[ldc(4), ldc(child as i32), opr(O_STARTP)]).len() as u32;
    run_until_terminate(&mut cpu, &mut mem, 20);

    // The child landed on the low-priority queue with its code pointer.
    let child_wdesc = child | 1;
    assert_eq!(cpu.lo_head, child_wdesc);
    assert_eq!(cpu.lo_tail, child_wdesc);
    assert_eq!(mem.get_word(w_iptr(child_wdesc)), after_startp + 4);
}

#[test]
fn test_runp_schedules_the_descriptor() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    let other = 0x8000_6001u32;
    mem.set_word(w_iptr(other), 0x8000_7000);
    run_program(&mut cpu, &mut mem, &[ldc(other as i32), opr(O_RUNP)]);
    assert_eq!(cpu.lo_head, other);
}

#[test]
fn test_stopp_deschedules_to_the_next_process() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    let next = 0x8000_6001u32;
    let next_code = 0x8000_7000u32;
    deposit(&mut mem, next_code, &asm(&[opr(X_TERMINATE)]));
    enqueue_lo(&mut cpu, &mut mem, next, next_code);

    let code = asm(&[opr(O_STOPP), opr(O_SETERR)]);
    load_program(&mut cpu, &mut mem, addr::MEM_START, TEST_WDESC, &code);
    run_until_terminate(&mut cpu, &mut mem, 20);

    // The stopped process never reached its seterr; the next one ran.
    assert!(!cpu.status.error);
    assert_eq!(cpu.wdesc, next);
    // Its resume point was saved.
    let stopp_len = asm(&[opr(O_STOPP)]).len() as u32;
    assert_eq!(
        mem.get_word(w_iptr(TEST_WDESC)),
        addr::MEM_START + stopp_len
    );
}

#[test]
fn test_endp_continues_as_joined_process_when_count_reaches_one() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    let join_workspace = 0x8000_6000u32;
    let resume_code = 0x8000_7000u32;
    // Join block: resume address at word 0, count at word 1.
    mem.set_word(join_workspace, resume_code);
    mem.set_word(join_workspace + 4, 1);
    deposit(&mut mem, resume_code, &asm(&[opr(X_TERMINATE)]));

    let code = asm(&[ldc(join_workspace as i32), opr(O_ENDP)]);
    load_program(&mut cpu, &mut mem, addr::MEM_START, TEST_WDESC, &code);
    run_until_terminate(&mut cpu, &mut mem, 20);

    assert!(cpu.status.terminate);
    assert_eq!(cpu.wdesc, join_workspace | 1);
    assert_eq!(mem.get_word(join_workspace + 4), 0);
}

#[test]
fn test_endp_deschedules_while_count_is_high() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    let join_workspace = 0x8000_6000u32;
    mem.set_word(join_workspace, 0x8000_7000);
    mem.set_word(join_workspace + 4, 2);

    let next = 0x8000_6101u32;
    let next_code = 0x8000_7100u32;
    deposit(&mut mem, next_code, &asm(&[opr(X_TERMINATE)]));
    enqueue_lo(&mut cpu, &mut mem, next, next_code);

    let code = asm(&[ldc(join_workspace as i32), opr(O_ENDP)]);
    load_program(&mut cpu, &mut mem, addr::MEM_START, TEST_WDESC, &code);
    run_until_terminate(&mut cpu, &mut mem, 20);

    assert_eq!(mem.get_word(join_workspace + 4), 1);
    assert_eq!(cpu.wdesc, next);
}

#[test]
fn test_scheduler_is_fifo_within_a_priority() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    let first = 0x8000_6001u32;
    let second = 0x8000_6101u32;
    enqueue_lo(&mut cpu, &mut mem, first, 0x8000_7000);
    enqueue_lo(&mut cpu, &mut mem, second, 0x8000_7100);

    assert_eq!(cpu.lo_head, first);
    assert_eq!(mem.get_word(w_link(first)), second);
    assert_eq!(cpu.lo_tail, second);
    assert_eq!(mem.get_word(w_link(second)), NOT_PROCESS);

    // stopp hands over to `first`, then `second`.
    deposit(&mut mem, 0x8000_7000, &asm(&[opr(O_STOPP)]));
    deposit(&mut mem, 0x8000_7100, &asm(&[opr(X_TERMINATE)]));
    let code = asm(&[opr(O_STOPP)]);
    load_program(&mut cpu, &mut mem, addr::MEM_START, TEST_WDESC, &code);
    run_until_terminate(&mut cpu, &mut mem, 20);
    assert_eq!(cpu.wdesc, second);
}

// ========== Timers ==========

#[test]
fn test_tin_sleeps_until_the_time_arrives() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);

    // The busy process spins on j -2 while the sleeper waits.
    let spin_code = 0x8000_7000u32;
    deposit(&mut mem, spin_code, &asm(&[(D_J, -2)]));
    let spinner = 0x8000_6001u32;
    enqueue_lo(&mut cpu, &mut mem, spinner, spin_code);

    // Sleep two HiClock ticks past now... the sleeper is low priority, so
    // the wait is against LoClock; two ticks of it.
    let code = asm(&[
        opr(O_LDTIMER),
        (D_ADC, 2),
        opr(O_TIN),
        opr(X_MARKER),
    ]);
    load_program(&mut cpu, &mut mem, addr::MEM_START, TEST_WDESC, &code);

    // Step until the sleeper is parked on the timer list.
    for _ in 0..10 {
        cpu.step(&mut mem);
        if cpu.lo_timer_head == TEST_WDESC {
            break;
        }
    }
    assert_eq!(cpu.lo_timer_head, TEST_WDESC);
    assert_eq!(cpu.wdesc, spinner);
    let wake_time = mem.get_word(w_time(TEST_WDESC));

    // Spin until the timer fires; the sleeper returns to the run queue.
    let mut woke = false;
    for _ in 0..1_000_000 {
        cpu.step(&mut mem);
        if wdesc_wptr(cpu.lo_head) == wdesc_wptr(TEST_WDESC) {
            woke = true;
            break;
        }
    }
    assert!(woke, "sleeper never woke");
    assert!(cpu.lo_clock >= wake_time);
    assert_eq!(cpu.lo_timer_head, NOT_PROCESS);
}

#[test]
fn test_tin_with_a_past_time_continues() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);
    // Time zero is never in the future.
    run_program(&mut cpu, &mut mem, &[ldc(0), opr(O_TIN)]);
    assert!(cpu.status.terminate);
    assert_eq!(cpu.lo_timer_head, NOT_PROCESS);
}

#[test]
fn test_timer_list_is_ordered_by_wake_time() {
    let (mut cpu, mut mem) = test_cpu();
    let late = 0x8000_6001u32;
    let early = 0x8000_6101u32;
    let middle = 0x8000_6201u32;
    mem.set_word(w_time(late), 300);
    mem.set_word(w_time(early), 100);
    mem.set_word(w_time(middle), 200);
    cpu.timer_insert(late, 300, &mut mem);
    cpu.timer_insert(early, 100, &mut mem);
    cpu.timer_insert(middle, 200, &mut mem);

    assert_eq!(cpu.lo_timer_head, early);
    let tlink = crate::cpu::helpers::w_tlink(early);
    assert_eq!(mem.get_word(tlink), middle);
    let tlink = crate::cpu::helpers::w_tlink(middle);
    assert_eq!(mem.get_word(tlink), late);
    let tlink = crate::cpu::helpers::w_tlink(late);
    assert_eq!(mem.get_word(tlink), NOT_PROCESS);
}

#[test]
fn test_quantum_expiry_descheduled_at_next_jump() {
    let (mut cpu, mut mem) = test_cpu();
    clear_queues(&mut cpu);

    // A second process waits for its turn.
    let other = 0x8000_6001u32;
    let other_code = 0x8000_7100u32;
    deposit(&mut mem, other_code, &asm(&[opr(X_TERMINATE)]));
    enqueue_lo(&mut cpu, &mut mem, other, other_code);

    // The current process spins on j -2. Once the quantum expires, the
    // next j deschedules it and the other process runs.
    let code = asm(&[(D_J, -2)]);
    load_program(&mut cpu, &mut mem, addr::MEM_START, TEST_WDESC, &code);
    run_until_terminate(&mut cpu, &mut mem, 2_000_000);
    assert!(cpu.status.terminate, "the spinner was never descheduled");
    assert_eq!(cpu.wdesc, other);
    // The spinner's resume point was saved at the top of its loop.
    assert_eq!(mem.get_word(w_iptr(TEST_WDESC)), addr::MEM_START);
    // The expiry was against the low-priority clock.
    assert!(cpu.lo_clock >= crate::cpu::MAX_QUANTUM);
}
