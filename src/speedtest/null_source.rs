use bytes::Bytes;
use futures::Stream;
use std::io::{self, Read};

pub const CHUNK_SIZE: usize = 64 * 1024;

static ZEROS: [u8; CHUNK_SIZE] = [0; CHUNK_SIZE];

/// Zero bytes up to a fixed budget, without ever holding the budget in memory.
#[derive(Debug, Clone)]
pub struct NullSource {
    remaining: u64,
}

impl NullSource {
    pub fn new(size: u64) -> Self {
        Self { remaining: size }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn consume(&mut self, max: usize) -> usize {
        let n = self.remaining.min(max as u64) as usize;
        self.remaining -= n as u64;
        n
    }

    /// Streams the remaining budget as shared zero chunks of at most [`CHUNK_SIZE`].
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + Sync + 'static {
        futures::stream::unfold(self, |mut source| async move {
            match source.consume(CHUNK_SIZE) {
                0 => None,
                n => Some((Ok(Bytes::from_static(&ZEROS[..n])), source)),
            }
        })
    }
}

impl Read for NullSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.consume(buf.len());
        buf[..n].fill(0);
        Ok(n)
    }
}
