//! Splitting bytecode into fixed-size [`Chunk`]s.
//!
//! A chunk is a window of the original code plus its *first instruction
//! offset* (FIO): the offset of the first byte in the window that starts an
//! instruction, as opposed to continuing the immediate data of a `PUSH` that
//! began in an earlier chunk.

use std::fmt::{self, Debug};

use log::{error, trace};
use thiserror::Error;

use crate::opcode::{immediate_size, is_push};

/// Stores the result of chunking operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Errors encountered while chunking code.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum ChunkError {
    /// Chunk sizes must fit an FIO, which is a single byte.
    #[error("Chunk size must be within 1..=255 (got {0})")]
    InvalidChunkSize(usize),

    /// The immediate data of a `PUSH` addresses a chunk past the end of the
    /// sequence. The chunk windows do not match the code they were cut from.
    #[error("Push data at chunk {chunk} offset {offset} spans {spanned} chunk(s), but only {num_chunks} chunks exist")]
    PushDataExceedsCode {
        /// Index of the chunk holding the `PUSH`.
        chunk: usize,
        /// Offset of the `PUSH` within that chunk.
        offset: usize,
        /// Number of chunks the immediate spills into.
        spanned: usize,
        /// Total number of chunks.
        num_chunks: usize,
    },
}

/// A fixed-size window of contract code.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Chunk<'a> {
    fio: u8,
    code: &'a [u8],
}

impl Debug for Chunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("fio", &self.fio)
            .field("code", &format!("0x{}", hex::encode(self.code)))
            .finish()
    }
}

impl<'a> Chunk<'a> {
    /// Offset of the first byte in this chunk that begins an instruction.
    pub const fn fio(&self) -> u8 {
        self.fio
    }

    /// The (unpadded) code bytes covered by this chunk.
    pub const fn code(&self) -> &'a [u8] {
        self.code
    }

    /// `fio ++ code`, the value committed for this chunk.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() + 1);
        out.push(self.fio);
        out.extend_from_slice(self.code);
        out
    }
}

/// Number of chunks `code_len` bytes are split into.
pub const fn num_chunks(code_len: usize, chunk_size: usize) -> usize {
    code_len.div_ceil(chunk_size)
}

/// Splits `code` into `chunk_size` windows and computes every chunk's FIO.
pub fn chunkify(code: &[u8], chunk_size: usize) -> ChunkResult<Vec<Chunk<'_>>> {
    if chunk_size == 0 || chunk_size > u8::MAX as usize {
        return Err(ChunkError::InvalidChunkSize(chunk_size));
    }

    let mut chunks: Vec<_> = code
        .chunks(chunk_size)
        .map(|code| Chunk { fio: 0, code })
        .collect();

    set_fios(&mut chunks, chunk_size)?;
    trace!(
        "Chunked {} bytes into {} chunks of {} bytes",
        code.len(),
        chunks.len(),
        chunk_size
    );

    Ok(chunks)
}

/// Scans every chunk but the last for `PUSH` instructions whose immediate
/// data crosses into later chunks, and records how far into those chunks the
/// data reaches.
fn set_fios(chunks: &mut [Chunk<'_>], chunk_size: usize) -> ChunkResult<()> {
    let num_chunks = chunks.len();

    for i in 0..num_chunks.saturating_sub(1) {
        let Chunk { fio, code } = chunks[i];
        let mut push_data_left = 0;

        // Bytes below the FIO were already classified as push data while
        // scanning an earlier chunk.
        for (j, &op) in code.iter().enumerate().skip(fio as usize) {
            if push_data_left > 0 {
                push_data_left -= 1;
                continue;
            }

            if !is_push(op) {
                continue;
            }

            let size = immediate_size(op);
            push_data_left = size;
            if j + size < chunk_size {
                continue;
            }

            // A `PUSH32` can span several chunks when `chunk_size < 32`.
            let mut rest = j + size + 1 - chunk_size;
            let spanned = rest.div_ceil(chunk_size);
            if i + spanned >= num_chunks {
                error!(
                    "Push data at chunk {} offset {} spills into {} chunk(s) past the end of {} chunks",
                    i, j, spanned, num_chunks
                );
                return Err(ChunkError::PushDataExceedsCode {
                    chunk: i,
                    offset: j,
                    spanned,
                    num_chunks,
                });
            }

            let mut k = 1;
            while rest > chunk_size {
                chunks[i + k].fio = chunk_size as u8;
                k += 1;
                rest -= chunk_size;
            }
            if rest > 0 {
                chunks[i + k].fio = rest as u8;
            }
        }
    }

    Ok(())
}
