//! Byte-stream links
//!
//! A Transputer has four bidirectional serial links. This module provides
//! the synchronous byte-stream abstraction the interpreter and the IServer
//! talk to, plus the transport variants:
//!
//! - `FifoLink`: a pair of named FIFOs per link, one per direction. The
//!   emulator (CPU side) and the IServer open opposite ends.
//! - `StubLink`: in-memory queues, used by unit tests to inject input and
//!   observe output.
//! - `TvsLink`: reads a program file then an optional input file; writes go
//!   to an output file. Lets the emulator feed itself a boot image in test
//!   mode.
//! - `NullLink`: discards writes, reads as zero.
//!
//! Words on the wire are little-endian, LSB first.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

/// Link transport identifiers, reported by `REQ_ID` as the board type.
pub const LINK_TYPE_FIFO: u8 = 0;
pub const LINK_TYPE_SOCKET: u8 = 1;
pub const LINK_TYPE_SHARED_MEMORY: u8 = 2;
pub const LINK_TYPE_STUB: u8 = 3;
pub const LINK_TYPE_TVS: u8 = 4;
pub const LINK_TYPE_NULL: u8 = 5;
pub const LINK_TYPE_ASYNC: u8 = 6;

/// Errors raised by link transports.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link {0} has no more data")]
    Exhausted(usize),
    #[error("end of emulation signalled on link {0}")]
    EndOfEmulation(usize),
    #[error("link I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("link setup failed: {0}")]
    Setup(String),
}

/// A bidirectional synchronous byte stream.
pub trait Link {
    /// Prepare the transport. Called once before first use.
    fn initialise(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Read one byte, blocking until it arrives.
    fn read_byte(&mut self) -> Result<u8, LinkError>;

    /// Write one byte.
    fn write_byte(&mut self, b: u8) -> Result<(), LinkError>;

    /// Reset the transport to its idle state.
    fn reset(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn link_no(&self) -> usize;

    fn link_type(&self) -> u8;

    fn set_debug(&mut self, debug: bool);

    /// Downcasting support, used by tests to reach a concrete transport
    /// behind a `Box<dyn Link>`.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    /// Read a little-endian word, LSB first.
    fn read_word(&mut self) -> Result<u32, LinkError> {
        let b0 = self.read_byte()? as u32;
        let b1 = self.read_byte()? as u32;
        let b2 = self.read_byte()? as u32;
        let b3 = self.read_byte()? as u32;
        Ok(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
    }

    /// Write a little-endian word, LSB first.
    fn write_word(&mut self, w: u32) -> Result<(), LinkError> {
        self.write_byte((w & 0xFF) as u8)?;
        self.write_byte(((w >> 8) & 0xFF) as u8)?;
        self.write_byte(((w >> 16) & 0xFF) as u8)?;
        self.write_byte(((w >> 24) & 0xFF) as u8)
    }

    /// Read a little-endian 16-bit value.
    fn read_short(&mut self) -> Result<u16, LinkError> {
        let b0 = self.read_byte()? as u16;
        let b1 = self.read_byte()? as u16;
        Ok(b0 | (b1 << 8))
    }

    /// Fill `buf` exactly.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    /// Write all of `buf`.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        for &b in buf {
            self.write_byte(b)?;
        }
        Ok(())
    }
}

fn printable(b: u8) -> char {
    if b.is_ascii_graphic() || b == b' ' {
        b as char
    } else {
        '.'
    }
}

/// An in-memory link for tests.
///
/// The queues are oriented relative to the CPU: the CPU reads from the read
/// queue and writes to the write queue; a server-side stub is crosswired.
pub struct StubLink {
    link_no: usize,
    read_queue: VecDeque<u8>,
    write_queue: VecDeque<u8>,
    read_sequence: u32,
    write_sequence: u32,
    debug: bool,
}

impl StubLink {
    pub fn new(link_no: usize, is_server: bool) -> Self {
        debug!(
            "Constructing stub link {} for {}",
            link_no,
            if is_server { "server" } else { "cpu client" }
        );
        Self {
            link_no,
            read_queue: VecDeque::new(),
            write_queue: VecDeque::new(),
            read_sequence: 0,
            write_sequence: 0,
            debug: false,
        }
    }

    /// Inject bytes that subsequent `read_byte` calls will return.
    pub fn set_readable_bytes(&mut self, bytes: &[u8]) {
        self.read_queue.extend(bytes.iter().copied());
    }

    /// Drain and return everything written so far.
    pub fn written_bytes(&mut self) -> Vec<u8> {
        self.write_queue.drain(..).collect()
    }
}

impl Link for StubLink {
    fn read_byte(&mut self) -> Result<u8, LinkError> {
        let b = self
            .read_queue
            .pop_front()
            .ok_or(LinkError::Exhausted(self.link_no))?;
        if self.debug {
            debug!(
                "Link {} R #{:08X} {:02X} ({})",
                self.link_no,
                self.read_sequence,
                b,
                printable(b)
            );
            self.read_sequence += 1;
        }
        Ok(b)
    }

    fn write_byte(&mut self, b: u8) -> Result<(), LinkError> {
        if self.debug {
            debug!(
                "Link {} W #{:08X} {:02X} ({})",
                self.link_no,
                self.write_sequence,
                b,
                printable(b)
            );
            self.write_sequence += 1;
        }
        self.write_queue.push_back(b);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), LinkError> {
        self.read_queue.clear();
        self.write_queue.clear();
        Ok(())
    }

    fn link_no(&self) -> usize {
        self.link_no
    }

    fn link_type(&self) -> u8 {
        LINK_TYPE_STUB
    }

    fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// A link that reads zeroes and discards writes.
pub struct NullLink {
    link_no: usize,
    read_sequence: u32,
    write_sequence: u32,
    debug: bool,
}

impl NullLink {
    pub fn new(link_no: usize) -> Self {
        Self {
            link_no,
            read_sequence: 0,
            write_sequence: 0,
            debug: false,
        }
    }
}

impl Link for NullLink {
    fn read_byte(&mut self) -> Result<u8, LinkError> {
        if self.debug {
            debug!("Link {} R #{:08X} 00 (.)", self.link_no, self.read_sequence);
            self.read_sequence += 1;
        }
        Ok(0)
    }

    fn write_byte(&mut self, _b: u8) -> Result<(), LinkError> {
        if self.debug {
            debug!("Link {} W #{:08X}", self.link_no, self.write_sequence);
            self.write_sequence += 1;
        }
        Ok(())
    }

    fn link_no(&self) -> usize {
        self.link_no
    }

    fn link_type(&self) -> u8 {
        LINK_TYPE_NULL
    }

    fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// A link backed by a pair of named FIFOs under the temporary directory.
///
/// Names are relative to the CPU client: the CPU reads the read FIFO and
/// writes the write FIFO; a server opens them the other way round. Both
/// sides open `O_RDWR` so neither blocks in `open` waiting for its peer.
#[cfg(unix)]
pub struct FifoLink {
    link_no: usize,
    is_server: bool,
    read_file: Option<File>,
    write_file: Option<File>,
    read_sequence: u32,
    write_sequence: u32,
    debug: bool,
}

#[cfg(unix)]
impl FifoLink {
    pub fn new(link_no: usize, is_server: bool) -> Self {
        Self {
            link_no,
            is_server,
            read_file: None,
            write_file: None,
            read_sequence: 0,
            write_sequence: 0,
            debug: false,
        }
    }

    fn fifo_name(link_no: usize, write: bool) -> PathBuf {
        PathBuf::from(format!(
            "/tmp/t800emul-{}-{}",
            if write { "write" } else { "read" },
            link_no
        ))
    }

    fn ensure_fifo(path: &PathBuf) -> Result<(), LinkError> {
        use std::os::unix::fs::FileTypeExt;
        match std::fs::metadata(path) {
            Ok(md) => {
                if !md.file_type().is_fifo() {
                    return Err(LinkError::Setup(format!(
                        "{} exists but is not a FIFO",
                        path.display()
                    )));
                }
            }
            Err(_) => {
                let cpath = std::ffi::CString::new(path.to_string_lossy().as_bytes())
                    .map_err(|e| LinkError::Setup(e.to_string()))?;
                let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o600) };
                if rc == -1 {
                    return Err(LinkError::Setup(format!(
                        "could not create FIFO {}: {}",
                        path.display(),
                        std::io::Error::last_os_error()
                    )));
                }
            }
        }
        Ok(())
    }

    fn open_rdwr(path: &PathBuf) -> Result<File, LinkError> {
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(LinkError::Io)
    }
}

#[cfg(unix)]
impl Link for FifoLink {
    fn initialise(&mut self) -> Result<(), LinkError> {
        let read_name = Self::fifo_name(self.link_no, false);
        let write_name = Self::fifo_name(self.link_no, true);
        Self::ensure_fifo(&read_name)?;
        Self::ensure_fifo(&write_name)?;
        if self.is_server {
            self.write_file = Some(Self::open_rdwr(&read_name)?);
            self.read_file = Some(Self::open_rdwr(&write_name)?);
        } else {
            self.read_file = Some(Self::open_rdwr(&read_name)?);
            self.write_file = Some(Self::open_rdwr(&write_name)?);
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, LinkError> {
        let f = self
            .read_file
            .as_mut()
            .ok_or_else(|| LinkError::Setup("FIFO link not initialised".into()))?;
        let mut buf = [0u8; 1];
        f.read_exact(&mut buf)?;
        if self.debug {
            debug!(
                "Link {} R #{:08X} {:02X} ({})",
                self.link_no,
                self.read_sequence,
                buf[0],
                printable(buf[0])
            );
            self.read_sequence += 1;
        }
        Ok(buf[0])
    }

    fn write_byte(&mut self, b: u8) -> Result<(), LinkError> {
        let f = self
            .write_file
            .as_mut()
            .ok_or_else(|| LinkError::Setup("FIFO link not initialised".into()))?;
        if self.debug {
            debug!(
                "Link {} W #{:08X} {:02X} ({})",
                self.link_no,
                self.write_sequence,
                b,
                printable(b)
            );
            self.write_sequence += 1;
        }
        f.write_all(&[b])?;
        Ok(())
    }

    fn link_no(&self) -> usize {
        self.link_no
    }

    fn link_type(&self) -> u8 {
        LINK_TYPE_FIFO
    }

    fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// A link that feeds the emulator a program file, then an input file, and
/// writes output to a file. Reaching the end of both inputs ends emulation.
pub struct TvsLink {
    link_no: usize,
    program_path: PathBuf,
    input_path: Option<PathBuf>,
    output_path: PathBuf,
    program: Option<File>,
    input: Option<File>,
    output: Option<File>,
    program_sent: u32,
    input_sent: u32,
    read_sequence: u32,
    write_sequence: u32,
    debug: bool,
}

impl TvsLink {
    pub fn new(
        link_no: usize,
        program_path: PathBuf,
        input_path: Option<PathBuf>,
        output_path: PathBuf,
    ) -> Self {
        Self {
            link_no,
            program_path,
            input_path,
            output_path,
            program: None,
            input: None,
            output: None,
            program_sent: 0,
            input_sent: 0,
            read_sequence: 0,
            write_sequence: 0,
            debug: false,
        }
    }

    fn read_one(file: &mut Option<File>) -> Result<Option<u8>, LinkError> {
        if let Some(f) = file.as_mut() {
            let mut buf = [0u8; 1];
            match f.read(&mut buf)? {
                0 => {
                    *file = None;
                    Ok(None)
                }
                _ => Ok(Some(buf[0])),
            }
        } else {
            Ok(None)
        }
    }
}

impl Link for TvsLink {
    fn initialise(&mut self) -> Result<(), LinkError> {
        self.program = Some(File::open(&self.program_path)?);
        if let Some(input) = &self.input_path {
            self.input = Some(File::open(input)?);
        }
        self.output = Some(File::create(&self.output_path)?);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, LinkError> {
        let b = if let Some(b) = Self::read_one(&mut self.program)? {
            self.program_sent += 1;
            if self.debug {
                debug!("Read program byte {:08X}", self.program_sent);
            }
            b
        } else if let Some(b) = Self::read_one(&mut self.input)? {
            self.input_sent += 1;
            if self.debug {
                debug!("Read input byte {:08X}", self.input_sent);
            }
            b
        } else {
            info!("Program and input are both at EOF; terminating emulation");
            return Err(LinkError::EndOfEmulation(self.link_no));
        };
        if self.debug {
            debug!(
                "Link {} R #{:08X} {:02X} ({})",
                self.link_no,
                self.read_sequence,
                b,
                printable(b)
            );
            self.read_sequence += 1;
        }
        Ok(b)
    }

    fn write_byte(&mut self, b: u8) -> Result<(), LinkError> {
        if self.debug {
            debug!(
                "Link {} W #{:08X} {:02X} ({})",
                self.link_no,
                self.write_sequence,
                b,
                printable(b)
            );
            self.write_sequence += 1;
        }
        let f = self
            .output
            .as_mut()
            .ok_or_else(|| LinkError::Setup("TVS link not initialised".into()))?;
        f.write_all(&[b])?;
        f.flush()?;
        Ok(())
    }

    fn link_no(&self) -> usize {
        self.link_no
    }

    fn link_type(&self) -> u8 {
        LINK_TYPE_TVS
    }

    fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Requested transport for each of the four links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkKind {
    #[default]
    Fifo,
    Null,
    Stub,
}

/// Builds the four link transports for one side of the wire.
pub struct LinkFactory {
    kinds: [LinkKind; 4],
    is_server: bool,
    debug: bool,
}

impl LinkFactory {
    pub fn new(is_server: bool, debug: bool) -> Self {
        Self {
            kinds: [LinkKind::default(); 4],
            is_server,
            debug,
        }
    }

    /// Apply a `-L<N><T>` selector: link number 0..3 and a type letter
    /// (F for FIFO; S and M are recognised but not yet implemented).
    pub fn set_link_type(&mut self, selector: &str) -> Result<(), LinkError> {
        let mut chars = selector.chars();
        let n = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .filter(|&n| n < 4)
            .ok_or_else(|| LinkError::Setup(format!("bad link number in -L{}", selector)))?;
        match chars.next() {
            Some('F') => self.kinds[n as usize] = LinkKind::Fifo,
            Some('S') | Some('M') => {
                return Err(LinkError::Setup(
                    "only FIFO links are implemented".into(),
                ))
            }
            _ => {
                return Err(LinkError::Setup(format!(
                    "bad link type in -L{}",
                    selector
                )))
            }
        }
        Ok(())
    }

    pub fn create_link(&self, link_no: usize) -> Result<Box<dyn Link>, LinkError> {
        let mut link: Box<dyn Link> = match self.kinds[link_no] {
            #[cfg(unix)]
            LinkKind::Fifo => Box::new(FifoLink::new(link_no, self.is_server)),
            #[cfg(not(unix))]
            LinkKind::Fifo => {
                return Err(LinkError::Setup(
                    "FIFO links are not available on this platform".into(),
                ))
            }
            LinkKind::Null => Box::new(NullLink::new(link_no)),
            LinkKind::Stub => Box::new(StubLink::new(link_no, self.is_server)),
        };
        link.set_debug(self.debug);
        Ok(link)
    }
}
