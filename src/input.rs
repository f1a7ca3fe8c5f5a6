//! Over-read buffer sitting between callers and a backend's read method.
//!
//! A backend may hand back more bytes than the caller asked for; the surplus stays here and
//! satisfies the next read without touching the transport. A read failure that happens after
//! some bytes were already delivered is latched and reported by the next call instead.

use crate::error::{GioError, Result};
use tracing::trace;

pub(crate) const INPUT_BUFFER_SIZE: usize = 0x40;

#[derive(Debug)]
pub(crate) struct InputCache {
    buffer: [u8; INPUT_BUFFER_SIZE],
    /// Bytes in `from..to` are unread.
    from: usize,
    to: usize,
    error: Option<GioError>,
}

impl Default for InputCache {
    fn default() -> Self {
        Self {
            buffer: [0; INPUT_BUFFER_SIZE],
            from: 0,
            to: 0,
            error: None,
        }
    }
}

impl InputCache {
    pub fn pending(&self) -> usize {
        self.to - self.from
    }

    pub fn clear(&mut self) {
        self.from = 0;
        self.to = 0;
        self.error = None;
    }

    /// Fill `out` from the cache, refilling through `fill` as needed.
    ///
    /// `fill(buffer, wait)` reads into the free part of the cache, blocking only when `wait`
    /// is set. After the first successful fill every further fill waits.
    pub fn read_with<F>(&mut self, out: &mut [u8], mut wait: bool, mut fill: F) -> Result<usize>
    where
        F: FnMut(&mut [u8], bool) -> Result<usize>,
    {
        let mut copied = 0;

        while copied < out.len() {
            let available = self.pending();
            if available > 0 {
                let count = available.min(out.len() - copied);
                out[copied..copied + count].copy_from_slice(&self.buffer[self.from..self.from + count]);
                self.from += count;
                copied += count;
                continue;
            }

            self.from = 0;
            self.to = 0;

            if self.error.is_some() {
                if copied > 0 {
                    break;
                }
                if let Some(error) = self.error.take() {
                    return Err(error);
                }
            }

            match fill(&mut self.buffer[self.to..], wait) {
                Ok(0) => break,
                Ok(count) => {
                    trace!(target: "gio::input", bytes = ?&self.buffer[self.to..self.to + count], "input");
                    self.to += count;
                    wait = true;
                }
                Err(e) if e.is_would_block() => break,
                Err(e) => {
                    // delivered on the next pass, or by the next call if bytes were copied
                    self.error = Some(e);
                }
            }
        }

        Ok(copied)
    }
}
