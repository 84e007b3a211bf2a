//! Host I/O server protocol definition
//!
//! The protocol runs between code on the emulated processor and the host
//! server over Link 0. Requests and responses travel in length-prefixed
//! frames; the first payload byte is a tag. The upper nibble of a request
//! tag selects the subsystem: file operations, record operations, console,
//! host environment, and server control.
//!
//! Access to the server is serialised: only one request can be outstanding
//! at a time.

// File subsystem.
pub const REQ_OPEN: u8 = 0x10;
pub const REQ_CLOSE: u8 = 0x11;
pub const REQ_READ: u8 = 0x12;
pub const REQ_WRITE: u8 = 0x13;
pub const REQ_GETS: u8 = 0x14;
pub const REQ_PUTS: u8 = 0x15;
pub const REQ_FLUSH: u8 = 0x16;
pub const REQ_SEEK: u8 = 0x17;
pub const REQ_TELL: u8 = 0x18;
pub const REQ_EOF: u8 = 0x19;
pub const REQ_FERROR: u8 = 0x1A;
pub const REQ_REMOVE: u8 = 0x1B;
pub const REQ_RENAME: u8 = 0x1C;
pub const REQ_GETBLOCK: u8 = 0x1D;
pub const REQ_PUTBLOCK: u8 = 0x1E;
pub const REQ_ISATTY: u8 = 0x1F;

// Record-file subsystem.
pub const REQ_OPENREC: u8 = 0x20;
pub const REQ_GETREC: u8 = 0x21;
pub const REQ_PUTREC: u8 = 0x22;
pub const REQ_PUTEOF: u8 = 0x23;

// Console subsystem. PUTCHAR is an extension.
pub const REQ_GETKEY: u8 = 0x30;
pub const REQ_POLLKEY: u8 = 0x31;
pub const REQ_PUTCHAR: u8 = 0x32;

// Host environment subsystem.
pub const REQ_GETENV: u8 = 0x40;
pub const REQ_TIME: u8 = 0x41;
pub const REQ_SYSTEM: u8 = 0x42;

// Server control subsystem.
pub const REQ_ID: u8 = 0xA0;
pub const REQ_EXIT: u8 = 0xA1;
pub const REQ_COMMAND: u8 = 0xA2;
pub const REQ_CORE: u8 = 0xA3;
pub const REQ_GETINFO: u8 = 0xA4;

// Results.
pub const RES_SUCCESS: u8 = 0x00;
pub const RES_UNIMPLEMENTED: u8 = 0x01;
pub const RES_ERROR: u8 = 0x81;
pub const RES_NOPRIV: u8 = 0x82;
pub const RES_NORESOURCE: u8 = 0x83;
pub const RES_NOFILE: u8 = 0x84;
pub const RES_TRUNCATED: u8 = 0x85;
pub const RES_BADID: u8 = 0x86;
pub const RES_NOPOSN: u8 = 0x87;
pub const RES_NOTAVAILABLE: u8 = 0x88;
pub const RES_EOF: u8 = 0x89;
pub const RES_AKEYREPLY: u8 = 0x8A;
pub const RES_BADPARAMS: u8 = 0x8B;
pub const RES_NOTERM: u8 = 0x8C;
pub const RES_RECTOOBIG: u8 = 0x8D;

// Exit status words carried by REQ_EXIT.
pub const RES_EXIT_SUCCESS: u32 = 0x8000_0000;
pub const RES_EXIT_FAILURE: u32 = 0x8000_0001;

// Open types.
pub const REQ_OPEN_TYPE_BINARY: u8 = 0x01;
pub const REQ_OPEN_TYPE_TEXT: u8 = 0x02;
pub const REQ_OPEN_TYPE_VARIABLE: u8 = 0x03;
pub const REQ_OPEN_TYPE_FIXED: u8 = 0x04;

// Open modes.
pub const REQ_OPEN_MODE_INPUT: u8 = 0x01;
pub const REQ_OPEN_MODE_OUTPUT: u8 = 0x02;
pub const REQ_OPEN_MODE_APPEND: u8 = 0x03;
pub const REQ_OPEN_MODE_EXISTING_UPDATE: u8 = 0x04;
pub const REQ_OPEN_MODE_NEW_UPDATE: u8 = 0x05;
pub const REQ_OPEN_MODE_APPEND_UPDATE: u8 = 0x06;

// Host identification bytes answered by REQ_ID.
pub const HOST_PC: u8 = 0x01;
pub const HOST_MAC: u8 = 0x09;
pub const HOST_UNKNOWN: u8 = 0x00;
pub const OS_WINDOWS: u8 = 0x06;
pub const OS_MACOS: u8 = 0x07;
pub const OS_LINUX: u8 = 0x08;
pub const OS_UNKNOWN: u8 = 0x00;

/// Human-readable tag name for diagnostics.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        REQ_OPEN => "Open",
        REQ_CLOSE => "Close",
        REQ_READ => "Read",
        REQ_WRITE => "Write",
        REQ_GETS => "Gets",
        REQ_PUTS => "Puts",
        REQ_FLUSH => "Flush",
        REQ_SEEK => "Seek",
        REQ_TELL => "Tell",
        REQ_EOF => "EOF",
        REQ_FERROR => "FError",
        REQ_REMOVE => "Remove",
        REQ_RENAME => "Rename",
        REQ_GETBLOCK => "GetBlock",
        REQ_PUTBLOCK => "PutBlock",
        REQ_ISATTY => "IsATTY",
        REQ_OPENREC => "OpenRec",
        REQ_GETREC => "GetRec",
        REQ_PUTREC => "PutRec",
        REQ_PUTEOF => "PutEOF",
        REQ_GETKEY => "GetKey",
        REQ_POLLKEY => "PollKey",
        REQ_PUTCHAR => "PutChar",
        REQ_GETENV => "GetEnv",
        REQ_TIME => "Time",
        REQ_SYSTEM => "System",
        REQ_ID => "Id",
        REQ_EXIT => "Exit",
        REQ_COMMAND => "Command",
        REQ_CORE => "Core",
        REQ_GETINFO => "GetInfo",
        RES_SUCCESS => "Success",
        RES_UNIMPLEMENTED => "Unimplemented",
        RES_ERROR => "Error",
        RES_NOPRIV => "NoPriv",
        RES_NORESOURCE => "NoResource",
        RES_NOFILE => "NoFile",
        RES_TRUNCATED => "Truncated",
        RES_BADID => "BadId",
        RES_NOPOSN => "NoPosn",
        RES_NOTAVAILABLE => "NotAvailable",
        RES_EOF => "EOF",
        RES_AKEYREPLY => "AKeyReply",
        RES_BADPARAMS => "BadParams",
        RES_NOTERM => "NoTerm",
        RES_RECTOOBIG => "RecTooBig",
        _ => "Unknown",
    }
}

/// Open type name for diagnostics.
pub fn open_type_name(open_type: u8) -> &'static str {
    match open_type {
        REQ_OPEN_TYPE_BINARY => "Binary",
        REQ_OPEN_TYPE_TEXT => "Text",
        REQ_OPEN_TYPE_VARIABLE => "Variable",
        REQ_OPEN_TYPE_FIXED => "Fixed",
        _ => "Unknown",
    }
}

/// Open mode name for diagnostics.
pub fn open_mode_name(open_mode: u8) -> &'static str {
    match open_mode {
        REQ_OPEN_MODE_INPUT => "Input",
        REQ_OPEN_MODE_OUTPUT => "Output",
        REQ_OPEN_MODE_APPEND => "Append",
        REQ_OPEN_MODE_EXISTING_UPDATE => "Existing Update",
        REQ_OPEN_MODE_NEW_UPDATE => "New Update",
        REQ_OPEN_MODE_APPEND_UPDATE => "Append Update",
        _ => "Unknown",
    }
}
