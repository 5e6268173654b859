//! [`Source`] implementations over `std::io` readers

use log::{debug, info};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;

use super::{Source, SourceConfig};
use crate::domain::SourceError;

/// Block-buffered trace file
pub type FileSource = StreamSource<BufReader<File>>;

/// Adapts any buffered reader into a [`Source`]
///
/// Once closed (explicitly or by dropping the inner reader) every read
/// reports [`SourceError::Exhausted`].
pub struct StreamSource<R> {
    inner: Option<R>,
}

impl<R: BufRead> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: Some(inner) }
    }

    fn reader(&mut self) -> Result<&mut R, SourceError> {
        self.inner.as_mut().ok_or(SourceError::Exhausted)
    }
}

impl FileSource {
    /// Open a trace file for reading
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened
    pub fn open<P: AsRef<Path>>(path: P, config: &SourceConfig) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        info!("Reading trace from {}", path.as_ref().display());
        Ok(Self::new(BufReader::with_capacity(config.buffer_capacity, file)))
    }
}

fn map_io(err: io::Error) -> SourceError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => SourceError::Exhausted,
        _ => SourceError::Io(err),
    }
}

impl<R: BufRead> Source for StreamSource<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        self.reader()?.read_exact(buf).map_err(map_io)
    }

    fn read_cstring(&mut self) -> Result<String, SourceError> {
        let mut bytes = Vec::new();
        self.reader()?.read_until(0, &mut bytes).map_err(map_io)?;

        if bytes.pop() != Some(0) {
            return Err(SourceError::Exhausted);
        }

        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

/// Trace streamed live from a tracking agent over TCP
pub struct SocketSource {
    stream: StreamSource<BufReader<TcpStream>>,
}

impl SocketSource {
    /// Connect to an agent streaming its trace over TCP
    ///
    /// The address is resolved once. The agent may not be listening yet when
    /// the reader starts, so refused connections are retried up to
    /// `config.connect_attempts` times in total.
    ///
    /// # Errors
    /// Returns the resolution error at once, any other connection error at
    /// once, or the last refusal once all attempts are used up
    pub fn connect<A: ToSocketAddrs>(addr: A, config: &SourceConfig) -> io::Result<Self> {
        let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "address resolved to no socket addresses",
            ));
        }

        let attempts = config.connect_attempts.max(1);
        let mut attempt = 1;
        let stream = loop {
            match TcpStream::connect(addrs.as_slice()) {
                Ok(stream) => break stream,
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused && attempt < attempts => {
                    debug!("Connection attempt {attempt}/{attempts} refused: {e}");
                    attempt += 1;
                    thread::sleep(config.retry_delay);
                }
                Err(e) => return Err(e),
            }
        };

        info!("Connected to tracking agent at {}", stream.peer_addr()?);
        let reader = BufReader::with_capacity(config.buffer_capacity, stream);
        Ok(Self { stream: StreamSource::new(reader) })
    }
}

impl Source for SocketSource {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        self.stream.read_exact(buf)
    }

    fn read_cstring(&mut self) -> Result<String, SourceError> {
        self.stream.read_cstring()
    }

    fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    fn close(&mut self) {
        if let Some(reader) = &self.stream.inner {
            // The agent may already have hung up
            let _ = reader.get_ref().shutdown(Shutdown::Both);
        }
        self.stream.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn patient_config() -> SourceConfig {
        SourceConfig {
            connect_attempts: 3,
            retry_delay: Duration::from_secs(10),
            ..SourceConfig::default()
        }
    }

    fn source(bytes: &[u8]) -> StreamSource<Cursor<Vec<u8>>> {
        StreamSource::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_read_exact_and_exhaustion() {
        let mut src = source(&[1, 2, 3]);
        let mut buf = [0u8; 2];
        src.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        assert!(matches!(src.read_exact(&mut buf), Err(SourceError::Exhausted)));
    }

    #[test]
    fn test_read_cstring() {
        let mut src = source(b"python3\0-c\0tail");
        assert_eq!(src.read_cstring().unwrap(), "python3");
        assert_eq!(src.read_cstring().unwrap(), "-c");
        // No terminator before the end of the stream
        assert!(matches!(src.read_cstring(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn test_read_cstring_replaces_invalid_utf8() {
        let mut src = source(b"a\xffb\0");
        assert_eq!(src.read_cstring().unwrap(), "a\u{fffd}b");
    }

    #[test]
    fn test_close_stops_reads() {
        let mut src = source(b"abc\0");
        assert!(src.is_open());
        src.close();
        assert!(!src.is_open());
        assert!(matches!(src.read_cstring(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn test_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x2a\0\0\0hello\0").unwrap();

        let mut src = FileSource::open(file.path(), &SourceConfig::default()).unwrap();
        let mut word = [0u8; 4];
        src.read_exact(&mut word).unwrap();
        assert_eq!(u32::from_le_bytes(word), 42);
        assert_eq!(src.read_cstring().unwrap(), "hello");
    }

    #[test]
    fn test_socket_source_reads_until_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let agent = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"tracker\0").unwrap();
        });

        let mut src = SocketSource::connect(addr, &SourceConfig::default()).unwrap();
        assert_eq!(src.read_cstring().unwrap(), "tracker");
        agent.join().unwrap();

        let mut byte = [0u8; 1];
        assert!(matches!(src.read_exact(&mut byte), Err(SourceError::Exhausted)));
        src.close();
        assert!(!src.is_open());
    }

    #[test]
    fn test_unresolvable_host_fails_without_retrying() {
        let started = Instant::now();
        let result = SocketSource::connect(("no.such.host.invalid", 9), &patient_config());
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_refused_connection_is_retried_until_attempts_run_out() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let config = SourceConfig {
            connect_attempts: 2,
            retry_delay: Duration::from_millis(400),
            ..SourceConfig::default()
        };

        let started = Instant::now();
        let err = SocketSource::connect(addr, &config).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        // One pause between the two attempts, none after the last
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(800));
    }
}
