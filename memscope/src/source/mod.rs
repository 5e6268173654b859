//! Byte sources feeding the record reader
//!
//! The reader only ever needs two primitives: "fill this buffer completely"
//! and "read bytes up to the next NUL". Anything that can provide those,
//! plus signal exhaustion distinctly from an I/O failure, can back a
//! [`RecordReader`](crate::reader::RecordReader).

mod stream;

pub use stream::{FileSource, SocketSource, StreamSource};

use std::time::Duration;
use zerocopy::{AsBytes, FromBytes};

use crate::domain::SourceError;

/// Sequential, closable supplier of trace bytes
pub trait Source {
    /// Fill `buf` completely or fail
    ///
    /// # Errors
    /// [`SourceError::Exhausted`] if the stream ends before `buf` is full,
    /// [`SourceError::Io`] on any other failure.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SourceError>;

    /// Read a NUL-terminated string, consuming the terminator
    ///
    /// # Errors
    /// [`SourceError::Exhausted`] if the stream ends before a NUL is seen.
    fn read_cstring(&mut self) -> Result<String, SourceError>;

    fn is_open(&self) -> bool;

    /// Stop reading; subsequent reads report exhaustion
    fn close(&mut self);
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        (**self).read_exact(buf)
    }

    fn read_cstring(&mut self) -> Result<String, SourceError> {
        (**self).read_cstring()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Read one fixed-size wire structure
pub(crate) fn read_struct<T, S>(source: &mut S) -> Result<T, SourceError>
where
    T: AsBytes + FromBytes,
    S: Source + ?Sized,
{
    let mut value = T::new_zeroed();
    source.read_exact(value.as_bytes_mut())?;
    Ok(value)
}

/// Tuning knobs for the bundled sources
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Size of the read buffer placed in front of files and sockets
    pub buffer_capacity: usize,
    /// How many times [`SocketSource::connect`] tries before giving up
    pub connect_attempts: u32,
    /// Pause between connection attempts
    pub retry_delay: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 64 * 1024,
            connect_attempts: 50,
            retry_delay: Duration::from_millis(100),
        }
    }
}
