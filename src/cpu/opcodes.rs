//! The Transputer instruction set
//!
//! Direct instructions occupy the upper nibble of an instruction byte; the
//! lower nibble accumulates into the operand register. The `opr` direct
//! instruction executes the operation selected by the operand register.

// Direct and prefixing instructions (upper nibble).
pub const D_J: u8 = 0x00;
pub const D_LDLP: u8 = 0x10;
pub const D_PFIX: u8 = 0x20;
pub const D_LDNL: u8 = 0x30;
pub const D_LDC: u8 = 0x40;
pub const D_LDNLP: u8 = 0x50;
pub const D_NFIX: u8 = 0x60;
pub const D_LDL: u8 = 0x70;
pub const D_ADC: u8 = 0x80;
pub const D_CALL: u8 = 0x90;
pub const D_CJ: u8 = 0xA0;
pub const D_AJW: u8 = 0xB0;
pub const D_EQC: u8 = 0xC0;
pub const D_STL: u8 = 0xD0;
pub const D_STNL: u8 = 0xE0;
pub const D_OPR: u8 = 0xF0;

// Operations (indirect instructions, selected by the operand register).
pub const O_REV: u32 = 0x00;
pub const O_LB: u32 = 0x01;
pub const O_BSUB: u32 = 0x02;
pub const O_ENDP: u32 = 0x03;
pub const O_DIFF: u32 = 0x04;
pub const O_ADD: u32 = 0x05;
pub const O_GCALL: u32 = 0x06;
pub const O_IN: u32 = 0x07;
pub const O_PROD: u32 = 0x08;
pub const O_GT: u32 = 0x09;
pub const O_WSUB: u32 = 0x0A;
pub const O_OUT: u32 = 0x0B;
pub const O_SUB: u32 = 0x0C;
pub const O_STARTP: u32 = 0x0D;
pub const O_OUTBYTE: u32 = 0x0E;
pub const O_OUTWORD: u32 = 0x0F;
pub const O_SETERR: u32 = 0x10;
pub const O_RESETCH: u32 = 0x12;
pub const O_CSUB0: u32 = 0x13;
pub const O_STOPP: u32 = 0x15;
pub const O_LADD: u32 = 0x16;
pub const O_STLB: u32 = 0x17;
pub const O_STHF: u32 = 0x18;
pub const O_NORM: u32 = 0x19;
pub const O_LDIV: u32 = 0x1A;
pub const O_LDPI: u32 = 0x1B;
pub const O_STLF: u32 = 0x1C;
pub const O_XDBLE: u32 = 0x1D;
pub const O_LDPRI: u32 = 0x1E;
pub const O_REM: u32 = 0x1F;
pub const O_RET: u32 = 0x20;
pub const O_LEND: u32 = 0x21;
pub const O_LDTIMER: u32 = 0x22;
pub const O_TESTERR: u32 = 0x29;
pub const O_TESTPRANAL: u32 = 0x2A;
pub const O_TIN: u32 = 0x2B;
pub const O_DIV: u32 = 0x2C;
pub const O_DIST: u32 = 0x2E;
pub const O_DISC: u32 = 0x2F;
pub const O_DISS: u32 = 0x30;
pub const O_LMUL: u32 = 0x31;
pub const O_NOT: u32 = 0x32;
pub const O_XOR: u32 = 0x33;
pub const O_BCNT: u32 = 0x34;
pub const O_LSHR: u32 = 0x35;
pub const O_LSHL: u32 = 0x36;
pub const O_LSUM: u32 = 0x37;
pub const O_LSUB: u32 = 0x38;
pub const O_RUNP: u32 = 0x39;
pub const O_XWORD: u32 = 0x3A;
pub const O_SB: u32 = 0x3B;
pub const O_GAJW: u32 = 0x3C;
pub const O_SAVEL: u32 = 0x3D;
pub const O_SAVEH: u32 = 0x3E;
pub const O_WCNT: u32 = 0x3F;
pub const O_SHR: u32 = 0x40;
pub const O_SHL: u32 = 0x41;
pub const O_MINT: u32 = 0x42;
pub const O_ALT: u32 = 0x43;
pub const O_ALTWT: u32 = 0x44;
pub const O_ALTEND: u32 = 0x45;
pub const O_AND: u32 = 0x46;
pub const O_ENBT: u32 = 0x47;
pub const O_ENBC: u32 = 0x48;
pub const O_ENBS: u32 = 0x49;
pub const O_MOVE: u32 = 0x4A;
pub const O_OR: u32 = 0x4B;
pub const O_CSNGL: u32 = 0x4C;
pub const O_CCNT1: u32 = 0x4D;
pub const O_TALT: u32 = 0x4E;
pub const O_LDIFF: u32 = 0x4F;
pub const O_STHB: u32 = 0x50;
pub const O_TALTWT: u32 = 0x51;
pub const O_SUM: u32 = 0x52;
pub const O_MUL: u32 = 0x53;
pub const O_STTIMER: u32 = 0x54;
pub const O_STOPERR: u32 = 0x55;
pub const O_CWORD: u32 = 0x56;
pub const O_CLRHALTERR: u32 = 0x57;
pub const O_SETHALTERR: u32 = 0x58;
pub const O_TESTHALTERR: u32 = 0x59;
pub const O_DUP: u32 = 0x5A;
pub const O_MOVE2DINIT: u32 = 0x5B;
pub const O_MOVE2DALL: u32 = 0x5C;
pub const O_MOVE2DNONZERO: u32 = 0x5D;
pub const O_MOVE2DZERO: u32 = 0x5E;
pub const O_UNPACKSN: u32 = 0x63;
pub const O_POSTNORMSN: u32 = 0x6C;
pub const O_ROUNDSN: u32 = 0x6D;
pub const O_LDINF: u32 = 0x71;
pub const O_FMUL: u32 = 0x72;
pub const O_CFLERR: u32 = 0x73;
pub const O_CRCWORD: u32 = 0x74;
pub const O_CRCBYTE: u32 = 0x75;
pub const O_BITCNT: u32 = 0x76;
pub const O_BITREVWORD: u32 = 0x77;
pub const O_BITREVNBITS: u32 = 0x78;
pub const O_WSUBDB: u32 = 0x81;
pub const O_FPLDNLDBI: u32 = 0x82;
pub const O_FPCHKERR: u32 = 0x83;
pub const O_FPSTNLDB: u32 = 0x84;
pub const O_FPLDNLSNI: u32 = 0x86;
pub const O_FPADD: u32 = 0x87;
pub const O_FPSTNLSN: u32 = 0x88;
pub const O_FPSUB: u32 = 0x89;
pub const O_FPLDNLDB: u32 = 0x8A;
pub const O_FPMUL: u32 = 0x8B;
pub const O_FPDIV: u32 = 0x8C;
pub const O_FPLDNLSN: u32 = 0x8E;
pub const O_FPREMFIRST: u32 = 0x8F;
pub const O_FPREMSTEP: u32 = 0x90;
pub const O_FPNAN: u32 = 0x91;
pub const O_FPORDERED: u32 = 0x92;
pub const O_FPNOTFINITE: u32 = 0x93;
pub const O_FPGT: u32 = 0x94;
pub const O_FPEQ: u32 = 0x95;
pub const O_FPI32TOR32: u32 = 0x96;
pub const O_FPI32TOR64: u32 = 0x98;
pub const O_FPB32TOR64: u32 = 0x9A;
pub const O_FPTESTERR: u32 = 0x9C;
pub const O_FPRTOI32: u32 = 0x9D;
pub const O_FPSTNLI32: u32 = 0x9E;
pub const O_FPLDZEROSN: u32 = 0x9F;
pub const O_FPLDZERODB: u32 = 0xA0;
pub const O_FPINT: u32 = 0xA1;
pub const O_FPDUP: u32 = 0xA3;
pub const O_FPREV: u32 = 0xA4;
pub const O_FPLDNLADDDB: u32 = 0xA6;
pub const O_FPLDNLMULDB: u32 = 0xA8;
pub const O_FPLDNLADDSN: u32 = 0xAA;
pub const O_FPENTRY: u32 = 0xAB;
pub const O_FPLDNLMULSN: u32 = 0xAC;

// Floating-point entry operations, loaded into Areg before `fpentry`.
pub const FP_FPUSQRTFIRST: u32 = 0x01;
pub const FP_FPUSQRTSTEP: u32 = 0x02;
pub const FP_FPUSQRTLAST: u32 = 0x03;
pub const FP_FPURP: u32 = 0x04;
pub const FP_FPURM: u32 = 0x05;
pub const FP_FPURZ: u32 = 0x06;
pub const FP_FPUR32TOR64: u32 = 0x07;
pub const FP_FPUR64TOR32: u32 = 0x08;
pub const FP_FPUEXPDEC32: u32 = 0x09;
pub const FP_FPUEXPINC32: u32 = 0x0A;
pub const FP_FPUABS: u32 = 0x0B;
pub const FP_FPUNOROUND: u32 = 0x0D;
pub const FP_FPCHKI32: u32 = 0x0E;
pub const FP_FPUCHKI64: u32 = 0x0F;
pub const FP_FPUDIVBY2: u32 = 0x11;
pub const FP_FPUMULBY2: u32 = 0x12;
pub const FP_FPURN: u32 = 0x22;
pub const FP_FPUSETERR: u32 = 0x23;
pub const FP_FPUCLRERR: u32 = 0x9C;

// Nonstandard emulator operations.
pub const X_TOGGLEMONITOR: u32 = 0xC0;
pub const X_TOGGLEDISASM: u32 = 0xC1;
pub const X_TERMINATE: u32 = 0xC2;
pub const X_MARKER: u32 = 0xC3;
pub const X_EMUQUERY: u32 = 0xC4;

// Query operations, loaded into Areg before `emuquery`.
pub const EQ_MEMTOP: u32 = 0x00;
