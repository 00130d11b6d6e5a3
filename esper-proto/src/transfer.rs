//! Chunked variable transfer: per-invocation session state machine plus
//! blocking download/upload engines over an injected [`VariableClient`].
//!
//! Chunks are strictly sequential; chunk `k+1` is never issued before the
//! outcome of chunk `k` is known.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::variable::{VariableDescriptor, WriteAck};

/// Outcome of one remote read/write, split by whether re-issuing the same
/// request can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    /// Transient transport or server failure; the same chunk may be re-issued.
    #[error("transient failure: {0}")]
    Retryable(String),
    /// Permanent rejection, e.g. the variable is locked or not writable.
    #[error("rejected: {0}")]
    Fatal(String),
}

/// Remote variable access consumed by the transfer engines. Implemented over
/// HTTP by the client crate and by in-memory fakes in tests.
pub trait VariableClient {
    /// Fetch the descriptor without element data (a zero-length read).
    fn descriptor(
        &mut self,
        module: &str,
        variable: &str,
    ) -> Result<VariableDescriptor, VariableError>;

    /// Binary-mode read of up to `len` bytes at `offset`. May return fewer
    /// bytes than requested near the end of the data.
    fn read_chunk(
        &mut self,
        module: &str,
        variable: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, VariableError>;

    /// Binary-mode write of `payload` at `offset`.
    fn write_chunk(
        &mut self,
        module: &str,
        variable: &str,
        offset: u64,
        payload: &[u8],
    ) -> Result<WriteAck, VariableError>;
}

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

/// Session lifecycle. `Done` and `Failed` are terminal; a failed session is
/// discarded, never resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Transferring,
    Retrying,
    Done,
    Failed,
}

/// Book-keeping for one transfer invocation. Created per call and owned by
/// it; never shared across concurrent transfers.
#[derive(Debug)]
pub struct TransferSession {
    module: String,
    variable: String,
    direction: Direction,
    total: u64,
    chunk_size: u64,
    offset: u64,
    retries: u32,
    max_retries: u32,
    state: SessionState,
}

impl TransferSession {
    /// New session in `Init`. Call [`TransferSession::begin`] once the
    /// descriptor bounds are known.
    pub fn new(module: &str, variable: &str, direction: Direction, max_retries: u32) -> Self {
        Self {
            module: module.to_string(),
            variable: variable.to_string(),
            direction,
            total: 0,
            chunk_size: 0,
            offset: 0,
            retries: 0,
            max_retries,
            state: SessionState::Init,
        }
    }

    /// Record the fetched bounds and enter `Transferring`.
    pub fn begin(&mut self, total: u64, chunk_size: u64) {
        debug_assert!(chunk_size > 0);
        self.total = total;
        self.chunk_size = chunk_size;
        self.state = SessionState::Transferring;
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Bytes to ask for in the next chunk. Downloads never request past the
    /// declared total; uploads are bounded by what the source yields.
    pub fn next_chunk_len(&self) -> u64 {
        match self.direction {
            Direction::Download => self.chunk_size.min(self.remaining()),
            Direction::Upload => self.chunk_size,
        }
    }

    /// Bytes left until `total`.
    pub fn remaining(&self) -> u64 {
        self.total - self.offset
    }

    /// A chunk succeeded: advance by the bytes actually moved.
    pub fn advance(&mut self, n: u64) {
        self.offset = (self.offset + n).min(self.total);
    }

    /// Mark the whole transfer finished.
    pub fn complete(&mut self) {
        self.state = SessionState::Done;
    }

    /// A chunk failed. Fatal errors and exhausted retries end the session in
    /// `Failed`; otherwise it parks in `Retrying` until
    /// [`TransferSession::resume`] re-issues the same chunk.
    pub fn record_failure(&mut self, err: &VariableError) {
        match err {
            VariableError::Fatal(_) => self.state = SessionState::Failed,
            VariableError::Retryable(_) => {
                if self.retries < self.max_retries {
                    self.retries += 1;
                    self.state = SessionState::Retrying;
                } else {
                    self.state = SessionState::Failed;
                }
            }
        }
    }

    /// Leave `Retrying`; the offset is unchanged so the same chunk is sent.
    pub fn resume(&mut self) {
        debug_assert_eq!(self.state, SessionState::Retrying);
        self.state = SessionState::Transferring;
    }
}

/// Terminal failure of a transfer invocation.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The setup read (descriptor fetch) failed.
    #[error("descriptor fetch for {module}/{variable} failed: {source}")]
    Descriptor {
        module: String,
        variable: String,
        source: VariableError,
    },
    /// The descriptor advertises a zero max request size; no chunk can move.
    #[error("{module}/{variable} reports a max request size of zero")]
    ZeroChunkSize { module: String, variable: String },
    /// A chunk was rejected outright or ran out of retries.
    #[error("transfer failed at offset {offset} after {attempts} attempt(s): {source}")]
    ChunkFailed {
        offset: u64,
        attempts: u32,
        source: VariableError,
    },
    /// The local source or sink failed.
    #[error("local i/o: {0}")]
    Local(#[from] std::io::Error),
}

fn fetch_descriptor<C: VariableClient>(
    client: &mut C,
    module: &str,
    variable: &str,
) -> Result<VariableDescriptor, TransferError> {
    client
        .descriptor(module, variable)
        .map_err(|source| TransferError::Descriptor {
            module: module.to_string(),
            variable: variable.to_string(),
            source,
        })
}

fn chunk_failed(session: &TransferSession, source: VariableError) -> TransferError {
    TransferError::ChunkFailed {
        offset: session.offset(),
        attempts: session.retries() + 1,
        source,
    }
}

/// Route a chunk failure through the session: park-and-resume on a retryable
/// error with budget left, otherwise surface the terminal error.
fn handle_chunk_error(
    session: &mut TransferSession,
    err: VariableError,
) -> Result<(), TransferError> {
    session.record_failure(&err);
    match session.state() {
        SessionState::Retrying => {
            log::warn!(
                "{}/{}: chunk at offset {} failed ({}), retry {}/{}",
                session.module(),
                session.variable(),
                session.offset(),
                err,
                session.retries(),
                session.max_retries
            );
            session.resume();
            Ok(())
        }
        _ => Err(chunk_failed(session, err)),
    }
}

/// Download a variable's raw content into `sink`. The descriptor's
/// `max_req_size` bounds every chunk and its `len` is the total; `progress`
/// observes `(offset, total)` after each chunk lands.
pub fn download<C, W, F>(
    client: &mut C,
    module: &str,
    variable: &str,
    sink: &mut W,
    max_retries: u32,
    mut progress: F,
) -> Result<TransferSession, TransferError>
where
    C: VariableClient,
    W: Write,
    F: FnMut(u64, u64),
{
    let mut session = TransferSession::new(module, variable, Direction::Download, max_retries);
    let desc = fetch_descriptor(client, module, variable)?;
    if desc.max_req_size == 0 {
        return Err(TransferError::ZeroChunkSize {
            module: module.to_string(),
            variable: variable.to_string(),
        });
    }
    session.begin(desc.len, desc.max_req_size);

    loop {
        if session.remaining() == 0 {
            session.complete();
            break;
        }
        let want = session.next_chunk_len();
        match client.read_chunk(module, variable, session.offset(), want) {
            Ok(data) if data.is_empty() => {
                // The server answered 200 with nothing in it; re-issuing is
                // the only way forward that cannot spin forever.
                let err = VariableError::Retryable("empty chunk before end of data".to_string());
                handle_chunk_error(&mut session, err)?;
            }
            Ok(data) => {
                sink.write_all(&data)?;
                session.advance(data.len() as u64);
                progress(session.offset(), session.total());
            }
            Err(err) => handle_chunk_error(&mut session, err)?,
        }
    }
    Ok(session)
}

/// Upload `source` into a variable. Total length comes from seeking the
/// source to its end and back; a zero-length source completes immediately
/// without sending a chunk.
pub fn upload<C, R, F>(
    client: &mut C,
    module: &str,
    variable: &str,
    source: &mut R,
    max_retries: u32,
    mut progress: F,
) -> Result<TransferSession, TransferError>
where
    C: VariableClient,
    R: Read + Seek,
    F: FnMut(u64, u64),
{
    let mut session = TransferSession::new(module, variable, Direction::Upload, max_retries);
    let desc = fetch_descriptor(client, module, variable)?;
    if desc.max_req_size == 0 {
        return Err(TransferError::ZeroChunkSize {
            module: module.to_string(),
            variable: variable.to_string(),
        });
    }
    let total = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    session.begin(total, desc.max_req_size);

    let mut chunk = read_up_to(source, session.next_chunk_len() as usize)?;
    loop {
        if chunk.is_empty() {
            session.complete();
            break;
        }
        match client.write_chunk(module, variable, session.offset(), &chunk) {
            Ok(_ack) => {
                session.advance(chunk.len() as u64);
                progress(session.offset(), session.total());
                chunk = read_up_to(source, session.next_chunk_len() as usize)?;
            }
            Err(err) => handle_chunk_error(&mut session, err)?,
        }
    }
    Ok(session)
}

/// Read up to `limit` bytes from `source`, fewer only at end of data.
fn read_up_to<R: Read>(source: &mut R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; limit];
    let mut filled = 0;
    while filled < limit {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
