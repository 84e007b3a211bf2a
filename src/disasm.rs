//! Mnemonic tables for the debug trace
//!
//! Text only, for the `-da`/`-dr`/`-do` trace streams and the monitor; not
//! part of any interface contract.

use crate::cpu::opcodes::*;

/// Mnemonic of a direct instruction (upper nibble of the opcode byte).
pub fn direct_name(instruction: u8) -> &'static str {
    match instruction {
        D_J => "j",
        D_LDLP => "ldlp",
        D_PFIX => "pfix",
        D_LDNL => "ldnl",
        D_LDC => "ldc",
        D_LDNLP => "ldnlp",
        D_NFIX => "nfix",
        D_LDL => "ldl",
        D_ADC => "adc",
        D_CALL => "call",
        D_CJ => "cj",
        D_AJW => "ajw",
        D_EQC => "eqc",
        D_STL => "stl",
        D_STNL => "stnl",
        D_OPR => "opr",
        _ => "?",
    }
}

/// Mnemonic of an indirect operation (the operand of `opr`).
pub fn operation_name(operation: u32) -> &'static str {
    match operation {
        O_REV => "rev",
        O_LB => "lb",
        O_BSUB => "bsub",
        O_ENDP => "endp",
        O_DIFF => "diff",
        O_ADD => "add",
        O_GCALL => "gcall",
        O_IN => "in",
        O_PROD => "prod",
        O_GT => "gt",
        O_WSUB => "wsub",
        O_OUT => "out",
        O_SUB => "sub",
        O_STARTP => "startp",
        O_OUTBYTE => "outbyte",
        O_OUTWORD => "outword",
        O_SETERR => "seterr",
        O_RESETCH => "resetch",
        O_CSUB0 => "csub0",
        O_STOPP => "stopp",
        O_LADD => "ladd",
        O_STLB => "stlb",
        O_STHF => "sthf",
        O_NORM => "norm",
        O_LDIV => "ldiv",
        O_LDPI => "ldpi",
        O_STLF => "stlf",
        O_XDBLE => "xdble",
        O_LDPRI => "ldpri",
        O_REM => "rem",
        O_RET => "ret",
        O_LEND => "lend",
        O_LDTIMER => "ldtimer",
        O_TESTERR => "testerr",
        O_TESTPRANAL => "testpranal",
        O_TIN => "tin",
        O_DIV => "div",
        O_DIST => "dist",
        O_DISC => "disc",
        O_DISS => "diss",
        O_LMUL => "lmul",
        O_NOT => "not",
        O_XOR => "xor",
        O_BCNT => "bcnt",
        O_LSHR => "lshr",
        O_LSHL => "lshl",
        O_LSUM => "lsum",
        O_LSUB => "lsub",
        O_RUNP => "runp",
        O_XWORD => "xword",
        O_SB => "sb",
        O_GAJW => "gajw",
        O_SAVEL => "savel",
        O_SAVEH => "saveh",
        O_WCNT => "wcnt",
        O_SHR => "shr",
        O_SHL => "shl",
        O_MINT => "mint",
        O_ALT => "alt",
        O_ALTWT => "altwt",
        O_ALTEND => "altend",
        O_AND => "and",
        O_ENBT => "enbt",
        O_ENBC => "enbc",
        O_ENBS => "enbs",
        O_MOVE => "move",
        O_OR => "or",
        O_CSNGL => "csngl",
        O_CCNT1 => "ccnt1",
        O_TALT => "talt",
        O_LDIFF => "ldiff",
        O_STHB => "sthb",
        O_TALTWT => "taltwt",
        O_SUM => "sum",
        O_MUL => "mul",
        O_STTIMER => "sttimer",
        O_STOPERR => "stoperr",
        O_CWORD => "cword",
        O_CLRHALTERR => "clrhalterr",
        O_SETHALTERR => "sethalterr",
        O_TESTHALTERR => "testhalterr",
        O_DUP => "dup",
        O_MOVE2DINIT => "move2dinit",
        O_MOVE2DALL => "move2dall",
        O_MOVE2DNONZERO => "move2dnonzero",
        O_MOVE2DZERO => "move2dzero",
        O_CRCWORD => "crcword",
        O_CRCBYTE => "crcbyte",
        O_BITCNT => "bitcnt",
        O_BITREVWORD => "bitrevword",
        O_BITREVNBITS => "bitrevnbits",
        O_WSUBDB => "wsubdb",
        O_FPCHKERR => "fpchkerr",
        O_FPTESTERR => "fptesterr",
        O_FPENTRY => "fpentry",
        X_TOGGLEMONITOR => "togglemonitor",
        X_TOGGLEDISASM => "toggledisasm",
        X_TERMINATE => "terminate",
        X_MARKER => "marker",
        X_EMUQUERY => "emuquery",
        _ => "?opr?",
    }
}
