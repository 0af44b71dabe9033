use std::{
    collections::VecDeque,
    io::{self, ErrorKind, Read, Write},
    net::{TcpStream, ToSocketAddrs},
};

use bytes::BytesMut;
use log::{debug, info, trace, warn};

use crate::{
    config::ClientConfig,
    error::{HsError, Result},
};

use super::{Request, RequestKind, Response, ResponseDecoder, codec::encode_request};

const READ_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// A single HandlerSocket stream with request pipelining.
///
/// The protocol carries no request ids: the n-th response line answers the
/// n-th request line. Requests are therefore written in the order they were
/// queued and every decoded response is matched against the front of the
/// pending queue.
///
/// Any I/O or protocol failure closes the connection for good.
#[derive(Debug)]
pub struct Connection<T: Read + Write> {
    stream: Option<T>,
    state: ConnectionState,
    decoder: ResponseDecoder,
    outgoing: BytesMut,
    pending: VecDeque<RequestKind>,
    ready: VecDeque<Response>,
    read_buf: Vec<u8>,
}

impl Connection<TcpStream> {
    /// Open a TCP connection to the listener named by `config`.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let mut connection = Self::unattached(config.max_line_length);
        info!("connecting to {}", config.address());

        match open_stream(config) {
            Ok(stream) => {
                connection.attach(stream);
                Ok(connection)
            }
            Err(e) => {
                warn!("failed to connect to {}: {e}", config.address());
                connection.state = ConnectionState::Closed;
                Err(HsError::Connection(e))
            }
        }
    }
}

fn open_stream(config: &ClientConfig) -> io::Result<TcpStream> {
    let mut last_err = None;

    for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
        let stream = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };

        match stream {
            Ok(stream) => {
                stream.set_nodelay(config.nodelay)?;
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)?;
                return Ok(stream);
            }
            Err(e) => {
                debug!("connect to {addr} failed: {e}");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!("'{}' did not resolve to any address", config.address()),
        )
    }))
}

impl<T: Read + Write> Connection<T> {
    /// Wrap an already established stream.
    pub fn new(stream: T) -> Self {
        let mut connection = Self::unattached(crate::protocol::DEFAULT_MAX_LINE_LENGTH);
        connection.attach(stream);
        connection
    }

    pub fn with_max_line_length(stream: T, max_line_length: usize) -> Self {
        let mut connection = Self::unattached(max_line_length);
        connection.attach(stream);
        connection
    }

    fn unattached(max_line_length: usize) -> Self {
        Self {
            stream: None,
            state: ConnectionState::Connecting,
            decoder: ResponseDecoder::with_max_line_length(max_line_length),
            outgoing: BytesMut::new(),
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            read_buf: vec![0; READ_CHUNK_SIZE],
        }
    }

    fn attach(&mut self, stream: T) {
        self.stream = Some(stream);
        self.state = ConnectionState::Open;
        debug!("connection open");
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Requests sent or queued whose response has not been handed out yet.
    pub fn pending(&self) -> usize {
        self.pending.len() + self.ready.len()
    }

    /// True when a new request can be issued without anything in flight.
    pub fn stable_point(&self) -> bool {
        self.is_open()
            && self.pending.is_empty()
            && self.ready.is_empty()
            && self.outgoing.is_empty()
            && self.decoder.is_empty()
    }

    pub fn get_ref(&self) -> Option<&T> {
        self.stream.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(HsError::NotOpen)
        }
    }

    /// Encode `request` into the send buffer. Nothing is written until
    /// [`flush`](Self::flush).
    pub fn queue(&mut self, request: &Request) -> Result<()> {
        self.ensure_open()?;
        encode_request(&mut self.outgoing, request);
        self.pending.push_back(request.kind());
        Ok(())
    }

    /// Write every queued request to the stream.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.outgoing.is_empty() {
            return Ok(());
        }

        trace!("writing {} bytes", self.outgoing.len());
        let written = match self.stream.as_mut() {
            Some(stream) => stream
                .write_all(&self.outgoing)
                .and_then(|_| stream.flush()),
            None => return Err(HsError::NotOpen),
        };

        match written {
            Ok(()) => {
                self.outgoing.clear();
                Ok(())
            }
            Err(e) => Err(self.fail(HsError::Connection(e))),
        }
    }

    /// Read once from the stream and return the responses completed by it,
    /// in arrival order.
    pub fn pump(&mut self) -> Result<Vec<Response>> {
        self.ensure_open()?;

        let read = match self.stream.as_mut() {
            Some(stream) => stream.read(&mut self.read_buf),
            None => return Err(HsError::NotOpen),
        };

        let n = match read {
            Ok(0) => {
                let eof = io::Error::new(ErrorKind::UnexpectedEof, "connection closed by peer");
                return Err(self.fail(HsError::Connection(eof)));
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(self.fail(HsError::Connection(e))),
        };
        trace!("read {n} bytes");

        let responses = match self.decoder.push(&self.read_buf[..n]) {
            Ok(responses) => responses,
            Err(e) => return Err(self.fail(e)),
        };

        for response in &responses {
            match self.pending.pop_front() {
                Some(kind) => trace!("{kind:?} answered with status {}", response.status),
                None => {
                    return Err(self.fail(HsError::Protocol(
                        "response received with no request pending".to_string(),
                    )));
                }
            }
        }

        Ok(responses)
    }

    /// Pump until `count` responses are available and return them in the
    /// order their requests were queued.
    pub fn receive(&mut self, count: usize) -> Result<Vec<Response>> {
        self.ensure_open()?;
        if count > self.pending() {
            return Err(HsError::InvalidArgument(format!(
                "cannot receive {count} responses with {} pending",
                self.pending()
            )));
        }

        while self.ready.len() < count {
            let responses = self.pump()?;
            self.ready.extend(responses);
        }

        Ok(self.ready.drain(..count).collect())
    }

    /// Flush what can be flushed, drop any pending responses and release the
    /// stream. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        if let Some(stream) = self.stream.as_mut() {
            if !self.outgoing.is_empty() {
                if let Err(e) = stream.write_all(&self.outgoing).and_then(|_| stream.flush()) {
                    debug!("flush on close failed: {e}");
                }
            }
        }

        self.discard_pending();
        self.stream = None;
        self.state = ConnectionState::Closed;
        info!("connection closed");
    }

    fn discard_pending(&mut self) {
        let dropped = self.pending.len() + self.ready.len();
        if dropped > 0 {
            warn!("discarding {dropped} pending responses");
        }
        self.pending.clear();
        self.ready.clear();
        self.outgoing.clear();
        self.decoder.clear();
    }

    /// Transition to closed after a fatal error and hand the error back.
    fn fail(&mut self, err: HsError) -> HsError {
        warn!("closing connection: {err}");
        self.discard_pending();
        self.stream = None;
        self.state = ConnectionState::Closed;
        err
    }
}

impl<T: Read + Write> Drop for Connection<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{Execute, IndexId, Operator, Value},
        testing::ScriptedStream,
    };

    fn find(key: &str) -> Request {
        Execute::find(IndexId::new(0), Operator::Eq, [key]).into()
    }

    #[test]
    fn pipelined_requests_are_written_in_order() {
        let stream = ScriptedStream::new(vec![b"0\t1\t1\n0\t1\t2\n".to_vec()]);
        let mut connection = Connection::new(stream);

        connection.queue(&find("a")).unwrap();
        connection.queue(&find("b")).unwrap();
        assert_eq!(connection.get_ref().unwrap().written(), b"");

        connection.flush().unwrap();
        assert_eq!(
            connection.get_ref().unwrap().written(),
            b"0\t=\t1\ta\t1\t0\n0\t=\t1\tb\t1\t0\n"
        );

        let responses = connection.receive(2).unwrap();
        assert_eq!(responses[0].rows, vec![vec!["1"]]);
        assert_eq!(responses[1].rows, vec![vec!["2"]]);
        assert!(connection.stable_point());
    }

    #[test]
    fn responses_split_across_reads() {
        let stream = ScriptedStream::new(vec![
            b"0\t2\tk".to_vec(),
            b"1\tv".to_vec(),
            b"1\n0\t".to_vec(),
            b"1\n".to_vec(),
        ]);
        let mut connection = Connection::new(stream);

        connection.queue(&find("k1")).unwrap();
        connection.queue(&find("k2")).unwrap();
        connection.flush().unwrap();

        let first = connection.receive(1).unwrap();
        assert_eq!(first[0].rows, vec![vec!["k1", "v1"]]);
        assert!(!connection.stable_point());

        let second = connection.receive(1).unwrap();
        assert!(second[0].rows.is_empty());
        assert!(connection.stable_point());
    }

    #[test]
    fn extra_responses_wait_for_receive() {
        let stream = ScriptedStream::new(vec![b"0\t1\t1\n0\t1\t2\n0\t1\t3\n".to_vec()]);
        let mut connection = Connection::new(stream);

        for key in ["a", "b", "c"] {
            connection.queue(&find(key)).unwrap();
        }
        connection.flush().unwrap();

        assert_eq!(connection.receive(1).unwrap()[0].rows[0][0], "1");
        assert_eq!(connection.pending(), 2);
        let rest = connection.receive(2).unwrap();
        assert_eq!(rest[0].rows[0][0], "2");
        assert_eq!(rest[1].rows[0][0], Value::from("3"));
    }

    #[test]
    fn eof_closes_connection() {
        let mut connection = Connection::new(ScriptedStream::new(vec![b"0\t1".to_vec()]));

        connection.queue(&find("a")).unwrap();
        connection.flush().unwrap();

        let err = connection.receive(1).unwrap_err();
        assert!(matches!(err, HsError::Connection(_)));
        assert!(err.is_fatal());
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.pending(), 0);
        assert!(matches!(connection.queue(&find("b")), Err(HsError::NotOpen)));
    }

    #[test]
    fn write_failure_closes_connection() {
        let mut connection = Connection::new(ScriptedStream::new(vec![]).failing_writes());

        connection.queue(&find("a")).unwrap();
        let err = connection.flush().unwrap_err();

        assert!(matches!(err, HsError::Connection(_)));
        assert!(!connection.is_open());
        assert!(matches!(connection.flush(), Err(HsError::NotOpen)));
    }

    #[test]
    fn malformed_response_closes_connection() {
        let mut connection = Connection::new(ScriptedStream::new(vec![b"garbage\n".to_vec()]));

        connection.queue(&find("a")).unwrap();
        connection.flush().unwrap();

        let err = connection.receive(1).unwrap_err();
        assert!(matches!(err, HsError::Protocol(_)));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn oversized_line_closes_connection() {
        let stream = ScriptedStream::new(vec![b"0\t1\taaaaaaaaaaaaaaaa".to_vec()]);
        let mut connection = Connection::with_max_line_length(stream, 8);

        connection.queue(&find("a")).unwrap();
        connection.flush().unwrap();

        let err = connection.receive(1).unwrap_err();
        assert!(err.to_string().contains("exceeds 8 bytes"));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn unsolicited_response_is_protocol_error() {
        let mut connection =
            Connection::new(ScriptedStream::new(vec![b"0\t1\n0\t1\n".to_vec()]));

        connection.queue(&find("a")).unwrap();
        connection.flush().unwrap();

        let err = connection.receive(1).unwrap_err();
        assert!(err.to_string().contains("no request pending"));
        assert!(!connection.is_open());
    }

    #[test]
    fn receive_more_than_pending() {
        let mut connection = Connection::new(ScriptedStream::new(vec![]));

        let err = connection.receive(1).unwrap_err();
        assert!(matches!(err, HsError::InvalidArgument(_)));
        assert!(connection.is_open());
    }

    #[test]
    fn close_is_idempotent() {
        let mut connection = Connection::new(ScriptedStream::new(vec![]));
        connection.queue(&find("a")).unwrap();

        connection.close();
        connection.close();

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(connection.get_ref().is_none());
        assert!(!connection.stable_point());
        assert!(matches!(connection.pump(), Err(HsError::NotOpen)));
    }
}
