//! Blocking in-memory byte pipe used to feed symphonia from pushed buffers.
//!
//! The writer side is the element's `chain`; the reader side is handed to symphonia as a
//! non-seekable [`MediaSource`]. Reads block until bytes arrive, end-of-stream is marked, or the
//! pipe is closed for flushing.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex};

use symphonia::core::io::MediaSource;

#[derive(Debug, Default)]
struct PipeState {
    bytes: VecDeque<u8>,
    eos: bool,
    closed: bool,
}

#[derive(Debug)]
pub struct ByteStream {
    state: Mutex<PipeState>,
    cv: Condvar,
    capacity: usize,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipeState::default()),
            cv: Condvar::new(),
            capacity: capacity.max(1),
        })
    }

    /// Append bytes, waiting while the pipe is full. `false` once closed or after EOS.
    pub fn write(&self, mut data: &[u8]) -> bool {
        while !data.is_empty() {
            let mut g = self.state.lock().unwrap();
            while g.bytes.len() >= self.capacity && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed || g.eos {
                return false;
            }
            let take = (self.capacity - g.bytes.len()).min(data.len());
            g.bytes.extend(&data[..take]);
            data = &data[take..];
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// No more bytes will be written; readers drain and then see end of file.
    pub fn finish(&self) {
        self.state.lock().unwrap().eos = true;
        self.cv.notify_all();
    }

    /// Abort both sides.
    pub fn close(&self) {
        let mut g = self.state.lock().unwrap();
        g.closed = true;
        g.bytes.clear();
        drop(g);
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn reader(self: &Arc<Self>) -> ByteStreamReader {
        ByteStreamReader {
            stream: self.clone(),
            pos: 0,
        }
    }
}

pub struct ByteStreamReader {
    stream: Arc<ByteStream>,
    pos: u64,
}

impl Read for ByteStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut g = self.stream.state.lock().unwrap();
        while g.bytes.is_empty() && !g.eos && !g.closed {
            g = self.stream.cv.wait(g).unwrap();
        }
        if g.closed {
            return Err(io::Error::other("byte stream flushing"));
        }
        let n = buf.len().min(g.bytes.len());
        for (dst, src) in buf.iter_mut().zip(g.bytes.drain(..n)) {
            *dst = src;
        }
        drop(g);
        self.stream.cv.notify_all();
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ByteStreamReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.pos),
            SeekFrom::Start(p) if p == self.pos => Ok(self.pos),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "live byte stream is not seekable",
            )),
        }
    }
}

impl MediaSource for ByteStreamReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
