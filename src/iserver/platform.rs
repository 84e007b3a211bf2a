//! Host platform adapter
//!
//! Owns the stream table the protocol dispatcher works against, the raw-mode
//! console keyboard, and the wall clock. Streams 0, 1 and 2 are permanently
//! bound to stdin, stdout and stderr; the rest of the table is free for
//! files opened by the program running on the emulated processor.
//!
//! Stream ordering rules: a read after a write (or a write after a read)
//! on the same stream without an intervening reposition is refused, and the
//! dispatcher reports it as a no-position error.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{Datelike, Timelike, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::proto;

/// Size of the stream table.
pub const MAX_STREAMS: usize = 128;

pub const STREAM_STDIN: u32 = 0;
pub const STREAM_STDOUT: u32 = 1;
pub const STREAM_STDERR: u32 = 2;

/// Last operation performed on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastOp {
    #[default]
    None,
    Read,
    Write,
}

/// Stream access failures, mapped to response tags by the dispatcher.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream id #{0} out of range")]
    BadId(u32),
    #[error("stream #{0} is not open")]
    NotOpen(u32),
    #[error("stream #{0} is not readable")]
    NotReadable(u32),
    #[error("stream #{0} is not writable")]
    NotWritable(u32),
    #[error("stream #{0} was previously written; reposition before reading")]
    ReadAfterWrite(u32),
    #[error("stream #{0} was previously read; reposition before writing")]
    WriteAfterRead(u32),
    #[error("no streams available")]
    NoFreeStream,
    #[error("bad open type {0:02X}")]
    BadOpenType(u8),
    #[error("bad open mode {0:02X}")]
    BadOpenMode(u8),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Calendar time broken out the way `REQ_TIME` wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UtcTime {
    pub day_of_month: u32,
    pub month_of_year: u32,
    pub year: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
}

enum StreamHandle {
    Stdin,
    Stdout,
    Stderr,
    File(File),
    /// In-memory stream for tests: bytes to be read, bytes written.
    #[cfg(test)]
    Buffer(VecDeque<u8>, Vec<u8>),
}

struct StreamSlot {
    handle: StreamHandle,
    readable: bool,
    writable: bool,
    binary: bool,
    last_op: LastOp,
}

impl StreamSlot {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.handle {
            StreamHandle::Stdin => std::io::stdin().read(buf),
            StreamHandle::Stdout | StreamHandle::Stderr => Ok(0),
            StreamHandle::File(f) => f.read(buf),
            #[cfg(test)]
            StreamHandle::Buffer(input, _) => {
                let n = buf.len().min(input.len());
                for b in buf.iter_mut().take(n) {
                    *b = input.pop_front().unwrap();
                }
                Ok(n)
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.handle {
            StreamHandle::Stdin => Ok(0),
            StreamHandle::Stdout => std::io::stdout().write(buf),
            StreamHandle::Stderr => std::io::stderr().write(buf),
            StreamHandle::File(f) => f.write(buf),
            #[cfg(test)]
            StreamHandle::Buffer(_, output) => {
                output.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.handle {
            StreamHandle::Stdin => Ok(()),
            StreamHandle::Stdout => std::io::stdout().flush(),
            StreamHandle::Stderr => std::io::stderr().flush(),
            StreamHandle::File(f) => f.flush(),
            #[cfg(test)]
            StreamHandle::Buffer(_, _) => Ok(()),
        }
    }

    fn is_console(&self) -> bool {
        matches!(
            self.handle,
            StreamHandle::Stdin | StreamHandle::Stdout | StreamHandle::Stderr
        )
    }
}

/// Console keyboard source. Raw mode is only entered when stdin is a TTY;
/// tests inject bytes instead.
enum ConsoleInput {
    /// Not initialised; falls back to blocking reads of stdin.
    Plain,
    #[cfg(unix)]
    Tty {
        keys: termion::AsyncReader,
        /// Keeps the terminal in raw mode until dropped.
        _raw: termion::raw::RawTerminal<std::io::Stdout>,
    },
    Injected(VecDeque<u8>),
}

/// The host platform: stream table, console and clock.
pub struct Platform {
    streams: Vec<Option<StreamSlot>>,
    console: ConsoleInput,
    pending_keys: VecDeque<u8>,
    full_command_line: String,
    program_command_line: String,
    debug: bool,
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform {
    pub fn new() -> Self {
        debug!("Constructing platform");
        let mut streams: Vec<Option<StreamSlot>> = Vec::with_capacity(MAX_STREAMS);
        streams.push(Some(StreamSlot {
            handle: StreamHandle::Stdin,
            readable: true,
            writable: false,
            binary: false,
            last_op: LastOp::None,
        }));
        streams.push(Some(StreamSlot {
            handle: StreamHandle::Stdout,
            readable: false,
            writable: true,
            binary: false,
            last_op: LastOp::None,
        }));
        streams.push(Some(StreamSlot {
            handle: StreamHandle::Stderr,
            readable: false,
            writable: true,
            binary: false,
            last_op: LastOp::None,
        }));
        streams.resize_with(MAX_STREAMS, || None);
        Self {
            streams,
            console: ConsoleInput::Plain,
            pending_keys: VecDeque::new(),
            full_command_line: String::new(),
            program_command_line: String::new(),
            debug: false,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Enter raw keyboard mode when the console is a terminal. No line
    /// editing, no echo.
    pub fn initialise(&mut self) -> Result<(), StreamError> {
        #[cfg(unix)]
        {
            use termion::raw::IntoRawMode;
            if termion::is_tty(&std::io::stdin()) {
                debug!("Setting terminal attributes; stdin is a TTY");
                let raw = std::io::stdout().into_raw_mode()?;
                self.console = ConsoleInput::Tty {
                    keys: termion::async_stdin(),
                    _raw: raw,
                };
            } else {
                debug!("Not setting terminal attributes; stdin is not a TTY");
            }
        }
        Ok(())
    }

    /// Inject console keys (tests).
    pub fn inject_console_keys(&mut self, keys: &[u8]) {
        match &mut self.console {
            ConsoleInput::Injected(q) => q.extend(keys.iter().copied()),
            _ => self.console = ConsoleInput::Injected(keys.iter().copied().collect()),
        }
    }

    pub fn set_command_lines(&mut self, full: String, program: String) {
        self.full_command_line = full;
        self.program_command_line = program;
    }

    pub fn command_line_all(&self) -> &str {
        &self.full_command_line
    }

    pub fn command_line_for_program(&self) -> &str {
        &self.program_command_line
    }

    // ========== Console ==========

    fn poll_keys(&mut self) {
        match &mut self.console {
            ConsoleInput::Plain => {}
            #[cfg(unix)]
            ConsoleInput::Tty { keys, .. } => {
                let mut buf = [0u8; 64];
                if let Ok(n) = keys.read(&mut buf) {
                    self.pending_keys.extend(buf[..n].iter().copied());
                }
            }
            ConsoleInput::Injected(q) => {
                self.pending_keys.append(q);
            }
        }
    }

    /// Non-blocking peek at the keyboard.
    pub fn is_console_char_available(&mut self) -> bool {
        self.poll_keys();
        !self.pending_keys.is_empty()
    }

    /// Blocking keyboard read.
    pub fn get_console_char(&mut self) -> u8 {
        loop {
            if let Some(b) = self.pending_keys.pop_front() {
                return b;
            }
            match &mut self.console {
                ConsoleInput::Plain => {
                    let mut buf = [0u8; 1];
                    if std::io::stdin().read_exact(&mut buf).is_ok() {
                        return buf[0];
                    }
                    return 0;
                }
                _ => {
                    self.poll_keys();
                    if self.pending_keys.is_empty() {
                        std::thread::sleep(std::time::Duration::from_millis(1));
                    }
                }
            }
        }
    }

    /// Unbuffered write to the terminal error stream.
    pub fn put_console_char(&mut self, ch: u8) {
        let mut err = std::io::stderr();
        let _ = err.write_all(&[ch]);
        let _ = err.flush();
    }

    // ========== Clock ==========

    /// Milliseconds of the wall clock, truncated to 32 bits.
    pub fn time_millis(&self) -> u32 {
        Utc::now().timestamp_millis() as u32
    }

    /// Broken-out UTC time.
    pub fn utc_time(&self) -> UtcTime {
        let now = Utc::now();
        UtcTime {
            day_of_month: now.day(),
            month_of_year: now.month(),
            year: now.year() as u32,
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
            millisecond: now.timestamp_subsec_millis(),
        }
    }

    // ========== Stream table ==========

    fn slot_mut(&mut self, stream_id: u32) -> Result<&mut StreamSlot, StreamError> {
        if stream_id as usize >= MAX_STREAMS {
            warn!("Attempt to use out-of-range stream id #{}", stream_id);
            return Err(StreamError::BadId(stream_id));
        }
        self.streams[stream_id as usize]
            .as_mut()
            .ok_or_else(|| {
                warn!("Attempt to use unopen stream #{}", stream_id);
                StreamError::NotOpen(stream_id)
            })
    }

    /// Open a file under the server root and allocate it a stream id.
    pub fn open_file_stream(
        &mut self,
        path: &Path,
        open_type: u8,
        open_mode: u8,
    ) -> Result<u32, StreamError> {
        let binary = match open_type {
            proto::REQ_OPEN_TYPE_BINARY => true,
            proto::REQ_OPEN_TYPE_TEXT => false,
            // Unsure what these should do, so log and continue.
            proto::REQ_OPEN_TYPE_VARIABLE | proto::REQ_OPEN_TYPE_FIXED => {
                info!("Opening {} for type {}", path.display(), proto::open_type_name(open_type));
                false
            }
            _ => return Err(StreamError::BadOpenType(open_type)),
        };

        let mut options = OpenOptions::new();
        let (readable, writable) = match open_mode {
            proto::REQ_OPEN_MODE_INPUT => {
                options.read(true);
                (true, false)
            }
            proto::REQ_OPEN_MODE_OUTPUT => {
                options.write(true).create(true).truncate(true);
                (false, true)
            }
            proto::REQ_OPEN_MODE_APPEND => {
                options.append(true).create(true);
                (false, true)
            }
            proto::REQ_OPEN_MODE_EXISTING_UPDATE => {
                options.read(true).write(true);
                (true, true)
            }
            proto::REQ_OPEN_MODE_NEW_UPDATE => {
                options.read(true).write(true).create(true).truncate(true);
                (true, true)
            }
            proto::REQ_OPEN_MODE_APPEND_UPDATE => {
                options.read(true).append(true).create(true);
                (true, true)
            }
            _ => return Err(StreamError::BadOpenMode(open_mode)),
        };

        let stream_id = self
            .streams
            .iter()
            .skip(STREAM_STDERR as usize + 1)
            .position(|s| s.is_none())
            .map(|i| i + STREAM_STDERR as usize + 1)
            .ok_or(StreamError::NoFreeStream)?;

        let file = options.open(path)?;
        info!(
            "Opened file {} as stream #{} (readable: {}, writable: {}, binary: {})",
            path.display(),
            stream_id,
            readable,
            writable,
            binary
        );
        self.streams[stream_id] = Some(StreamSlot {
            handle: StreamHandle::File(file),
            readable,
            writable,
            binary,
            last_op: LastOp::None,
        });
        Ok(stream_id as u32)
    }

    /// Read up to `size` bytes. The returned count may be short.
    pub fn read_stream(
        &mut self,
        stream_id: u32,
        size: usize,
        buf: &mut [u8],
    ) -> Result<usize, StreamError> {
        let debug = self.debug;
        let slot = self.slot_mut(stream_id)?;
        if !slot.readable {
            warn!("Attempt to read from non-readable stream #{}", stream_id);
            return Err(StreamError::NotReadable(stream_id));
        }
        if slot.last_op == LastOp::Write {
            warn!("Attempt to read from previously written stream #{}", stream_id);
            return Err(StreamError::ReadAfterWrite(stream_id));
        }
        let want = size.min(buf.len());
        let mut got = 0;
        while got < want {
            let n = slot.read(&mut buf[got..want])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        slot.last_op = LastOp::Read;
        if debug {
            debug!("Read {} bytes from stream #{}", got, stream_id);
        }
        Ok(got)
    }

    /// Write `buf`, returning the count actually written. Console streams
    /// are flushed after every write; file streams are not.
    pub fn write_stream(&mut self, stream_id: u32, buf: &[u8]) -> Result<usize, StreamError> {
        let debug = self.debug;
        let slot = self.slot_mut(stream_id)?;
        if !slot.writable {
            warn!("Attempt to write to non-writable stream #{}", stream_id);
            return Err(StreamError::NotWritable(stream_id));
        }
        if slot.last_op == LastOp::Read {
            warn!("Attempt to write to previously read stream #{}", stream_id);
            return Err(StreamError::WriteAfterRead(stream_id));
        }
        let written = slot.write(buf)?;
        if written != buf.len() {
            warn!(
                "Failed to write {} bytes to stream #{}, wrote {} bytes instead",
                buf.len(),
                stream_id,
                written
            );
        } else if slot.is_console() {
            slot.flush()?;
        }
        slot.last_op = LastOp::Write;
        if debug {
            debug!("Wrote {} bytes to stream #{}", written, stream_id);
        }
        Ok(written)
    }

    /// Flush a stream's buffered output.
    pub fn flush_stream(&mut self, stream_id: u32) -> Result<(), StreamError> {
        let slot = self.slot_mut(stream_id)?;
        slot.flush()?;
        Ok(())
    }

    /// Whether the stream was opened binary.
    pub fn is_binary_stream(&mut self, stream_id: u32) -> Result<bool, StreamError> {
        Ok(self.slot_mut(stream_id)?.binary)
    }

    /// Close a stream. The console streams survive: closing them succeeds
    /// without freeing the slot.
    pub fn close_stream(&mut self, stream_id: u32) -> Result<bool, StreamError> {
        let is_console = self.slot_mut(stream_id)?.is_console();
        if is_console {
            debug!("Close of console stream #{} is a no-op", stream_id);
            return Ok(true);
        }
        debug!("Closing stream #{}", stream_id);
        let slot = self.streams[stream_id as usize].take();
        // Dropping the file closes it.
        drop(slot);
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn set_buffer_stream(
        &mut self,
        stream_id: u32,
        readable: bool,
        writable: bool,
        input: &[u8],
    ) {
        self.streams[stream_id as usize] = Some(StreamSlot {
            handle: StreamHandle::Buffer(input.iter().copied().collect(), Vec::new()),
            readable,
            writable,
            binary: false,
            last_op: LastOp::None,
        });
    }

    #[cfg(test)]
    pub(crate) fn buffer_stream_output(&mut self, stream_id: u32) -> Vec<u8> {
        match &self.streams[stream_id as usize] {
            Some(StreamSlot {
                handle: StreamHandle::Buffer(_, output),
                ..
            }) => output.clone(),
            _ => panic!("stream #{} is not a buffer stream", stream_id),
        }
    }
}
