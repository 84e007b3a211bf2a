//! Protocol frame dispatcher
//!
//! Reads frames from the link, decodes the tag, calls into the platform and
//! writes the response frame back. Repeatedly called until an exit frame is
//! received; the exit status carried by that frame becomes the server's
//! process exit code.
//!
//! Bad frames (length out of range or odd) are counted and produce no
//! response. Requests this server does not handle answer `RES_UNIMPLEMENTED`.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::codec::{FrameCodec, MAX_FRAME_SIZE};
use super::platform::{Platform, StreamError};
use super::proto::*;
use crate::link::{Link, LinkError};

/// Most data bytes a READ response can carry: the payload holds the tag,
/// a 16-bit count and the data, and must not exceed the maximum frame size.
const MAX_READ_DATA: usize = MAX_FRAME_SIZE as usize - 3;

/// The newline PUTS appends.
#[cfg(windows)]
const PLATFORM_NEWLINE: &[u8] = b"\r\n";
#[cfg(not(windows))]
const PLATFORM_NEWLINE: &[u8] = b"\n";

/// Reads requests from the link, performs them against the platform, and
/// replies.
pub struct ProtocolHandler<'a> {
    link: &'a mut dyn Link,
    platform: &'a mut Platform,
    root_directory: PathBuf,
    codec: FrameCodec,
    frame_count: u64,
    bad_frame_count: u64,
    unimplemented_frame_count: u64,
    exit_code: i32,
    debug: bool,
}

impl<'a> ProtocolHandler<'a> {
    pub fn new(
        link: &'a mut dyn Link,
        platform: &'a mut Platform,
        root_directory: PathBuf,
    ) -> Self {
        Self {
            link,
            platform,
            root_directory,
            codec: FrameCodec::new(),
            frame_count: 0,
            bad_frame_count: 0,
            unimplemented_frame_count: 0,
            exit_code: 0,
            debug: false,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn bad_frame_count(&self) -> u64 {
        self.bad_frame_count
    }

    pub fn unimplemented_frame_count(&self) -> u64 {
        self.unimplemented_frame_count
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Read one frame, perform it, reply. Returns true when the frame was
    /// an exit frame.
    pub fn process_frame(&mut self) -> Result<bool, LinkError> {
        if !self.read_frame()? {
            return Ok(false);
        }
        let exit_frame_received = self.request_response();
        self.write_frame()?;
        Ok(exit_frame_received)
    }

    /// Read the length prefix and payload into the transaction buffer.
    /// Returns false for a bad frame, which is counted and not answered.
    fn read_frame(&mut self) -> Result<bool, LinkError> {
        let size = self.link.read_short()?;
        self.codec.set_read_frame_size(size);
        self.frame_count += 1;
        if self.debug {
            debug!("Read frame size word is {:04X} ({})", size, size);
        }
        if self.codec.read_frame_size_out_of_range() {
            warn!("Read frame size {:04X} out of range", size);
            self.bad_frame_count += 1;
            return Ok(false);
        }
        if size & 0x01 == 0x01 {
            warn!("Read frame size {:04X} is odd", size);
            self.bad_frame_count += 1;
            return Ok(false);
        }
        self.codec.fill_in_read_frame_size();
        self.link.read_bytes(self.codec.payload_mut(size as usize))?;
        Ok(true)
    }

    /// Decode the tag and build the response payload.
    fn request_response(&mut self) -> bool {
        let tag = self.codec.byte_at(2);
        debug!("Read frame tag {:02X} ({})", tag, tag_name(tag));
        self.codec.reset_write_frame();
        self.codec.set_read_index(3);
        match tag {
            REQ_OPEN => self.req_open(),
            REQ_CLOSE => self.req_close(),
            REQ_READ => self.req_read(),
            REQ_WRITE => self.req_write(),
            REQ_PUTS => self.req_puts(),
            REQ_GETKEY => self.req_getkey(),
            REQ_POLLKEY => self.req_pollkey(),
            REQ_EXIT => self.req_exit(),
            REQ_ID => self.req_id(),
            REQ_COMMAND => self.req_command(),
            REQ_PUTCHAR => self.req_putchar(),
            _ => {
                warn!("Frame tag {:02X} ({}) is unimplemented", tag, tag_name(tag));
                self.unimplemented_frame_count += 1;
                self.codec.put_u8(RES_UNIMPLEMENTED);
            }
        }
        tag == REQ_EXIT
    }

    /// Pad, fill in the length prefix and send the response.
    fn write_frame(&mut self) -> Result<(), LinkError> {
        let frame_size = self.codec.fill_in_frame_size();
        if self.debug {
            let tag = self.codec.byte_at(2);
            debug!(
                "Write frame: size word is {:04X} ({}) tag {:02X} ({})",
                frame_size,
                frame_size,
                tag,
                tag_name(tag)
            );
        }
        self.link.write_bytes(self.codec.frame_bytes())
    }

    // ---- Frame handlers ----

    fn req_open(&mut self) {
        let filename = match self.codec.get_string() {
            Ok(f) => f,
            Err(e) => {
                warn!("{}", e);
                self.codec.put_u8(RES_ERROR);
                self.codec.put_u16(0);
                return;
            }
        };
        let open_type = self.codec.get_u8();
        let open_mode = self.codec.get_u8();
        let filename = String::from_utf8_lossy(&filename).into_owned();
        info!(
            "Opening file '{}' with type {} and mode {}",
            filename,
            open_type_name(open_type),
            open_mode_name(open_mode)
        );
        let file_path = self.root_directory.join(Path::new(&filename));
        match self
            .platform
            .open_file_stream(&file_path, open_type, open_mode)
        {
            Ok(stream_id) => {
                info!("Opened file '{}' as stream #{}", file_path.display(), stream_id);
                self.codec.put_u8(RES_SUCCESS);
                self.codec.put_u32(stream_id);
            }
            Err(e) => {
                warn!("{}", e);
                self.codec.put_u8(RES_ERROR);
                self.codec.put_u16(0);
            }
        }
    }

    fn req_close(&mut self) {
        let stream_id = self.codec.get_u32();
        match self.platform.close_stream(stream_id) {
            Ok(true) => self.codec.put_u8(RES_SUCCESS),
            Ok(false) => self.codec.put_u8(RES_ERROR),
            Err(e) => {
                warn!("{}", e);
                self.put_stream_error(e);
            }
        }
    }

    fn req_read(&mut self) {
        let stream_id = self.codec.get_u32();
        let size = (self.codec.get_u16() as usize).min(MAX_READ_DATA);
        let mut data = vec![0u8; size];
        match self.platform.read_stream(stream_id, size, &mut data) {
            Ok(read) => {
                self.codec.put_u8(RES_SUCCESS);
                self.codec.put_u16(read as u16);
                self.codec.put_bytes(&data[..read]);
            }
            Err(e) => {
                warn!("{}", e);
                self.put_stream_error(e);
                self.codec.put_u16(0);
            }
        }
    }

    fn req_write(&mut self) {
        let stream_id = self.codec.get_u32();
        let data = match self.codec.get_string() {
            Ok(d) => d,
            Err(e) => {
                warn!("{}", e);
                self.codec.put_u8(RES_ERROR);
                self.codec.put_u16(0);
                return;
            }
        };
        match self.write_all_to_stream(stream_id, &data) {
            Ok(wrote) => {
                self.codec.put_u8(RES_SUCCESS);
                self.codec.put_u16(wrote as u16);
            }
            Err(e) => {
                warn!("{}", e);
                self.put_stream_error(e);
                self.codec.put_u16(0);
            }
        }
    }

    fn req_puts(&mut self) {
        let stream_id = self.codec.get_u32();
        let data = match self.codec.get_string() {
            Ok(d) => d,
            Err(e) => {
                warn!("{}", e);
                self.codec.put_u8(RES_ERROR);
                return;
            }
        };
        let result = self
            .write_all_to_stream(stream_id, &data)
            .and_then(|_| self.write_all_to_stream(stream_id, PLATFORM_NEWLINE));
        match result {
            Ok(_) => self.codec.put_u8(RES_SUCCESS),
            Err(e) => {
                warn!("{}", e);
                self.put_stream_error(e);
            }
        }
    }

    fn req_getkey(&mut self) {
        let key = self.platform.get_console_char();
        self.codec.put_u8(RES_SUCCESS);
        self.codec.put_u8(key);
    }

    fn req_pollkey(&mut self) {
        if self.platform.is_console_char_available() {
            let key = self.platform.get_console_char();
            self.codec.put_u8(RES_SUCCESS);
            self.codec.put_u8(key);
        } else {
            self.codec.put_u8(RES_ERROR);
        }
    }

    fn req_exit(&mut self) {
        let status = self.codec.get_u32();
        debug!("Exit status received as {:08X}", status);
        self.exit_code = match status {
            RES_EXIT_SUCCESS => 0,
            RES_EXIT_FAILURE => 1,
            other => other as i32,
        };
        debug!("Exit code set to {}", self.exit_code);
        self.codec.put_u8(RES_SUCCESS);
    }

    fn req_id(&mut self) {
        self.codec.put_u8(RES_SUCCESS);
        // Version.
        self.codec.put_u8(0x00);
        let (host, os) = if cfg!(target_os = "windows") {
            (HOST_PC, OS_WINDOWS)
        } else if cfg!(target_os = "macos") {
            (HOST_MAC, OS_MACOS)
        } else if cfg!(target_os = "linux") {
            (HOST_PC, OS_LINUX)
        } else {
            (HOST_UNKNOWN, OS_UNKNOWN)
        };
        self.codec.put_u8(host);
        self.codec.put_u8(os);
        // Board: actually the link type.
        self.codec.put_u8(self.link.link_type());
    }

    fn req_command(&mut self) {
        let which = self.codec.get_u8();
        let line = if which == 1 {
            self.platform.command_line_all().to_owned()
        } else {
            self.platform.command_line_for_program().to_owned()
        };
        self.codec.put_u8(RES_SUCCESS);
        // Command lines fit a frame or are truncated.
        let bytes = line.as_bytes();
        let clipped = &bytes[..bytes.len().min(super::codec::STRING_BUFFER_SIZE)];
        self.codec
            .put_string(clipped)
            .expect("clipped command line fits a frame");
    }

    fn req_putchar(&mut self) {
        let ch = self.codec.get_u8();
        let result = self
            .write_all_to_stream(super::platform::STREAM_STDOUT, &[ch])
            .and_then(|n| {
                self.platform
                    .flush_stream(super::platform::STREAM_STDOUT)?;
                Ok(n)
            });
        match result {
            Ok(_) => self.codec.put_u8(RES_SUCCESS),
            Err(e) => {
                warn!("{}", e);
                self.put_stream_error(e);
            }
        }
    }

    fn write_all_to_stream(&mut self, stream_id: u32, data: &[u8]) -> Result<usize, StreamError> {
        if data.is_empty() {
            return Ok(0);
        }
        self.platform.write_stream(stream_id, data)
    }

    fn put_stream_error(&mut self, e: StreamError) {
        let tag = match e {
            StreamError::BadId(_) | StreamError::NotOpen(_) => RES_BADID,
            StreamError::ReadAfterWrite(_) | StreamError::WriteAfterRead(_) => RES_NOPOSN,
            _ => RES_ERROR,
        };
        self.codec.put_u8(tag);
    }
}
