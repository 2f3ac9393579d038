//! Byte streams for stdin/stdout/stderr, pipes, here-docs — spec §4.6.
//!
//! Per SPEC_FULL.md §4.4/§5, pipelines run strictly sequentially: a pipe
//! is drained eagerly into its reader rather than the writer suspending on
//! a full buffer, so `Pipe` here is really just a capacity-checked buffer
//! reused across the handful of stream kinds the evaluator wires up.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{BashboxError, LimitKind};
use crate::vfs::{OpenMode, Vfs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Memory,
    Pipe,
    File,
}

/// A single open stream, cheaply cloned (`Rc`) so redirections like `2>&1`
/// can alias the same underlying buffer without copying bytes. `closed` is
/// deliberately *not* shared across `dup()`'d handles: spec §4.6 requires
/// closing one duplicate to leave the others open, while reads/writes still
/// hit the one shared buffer underneath.
#[derive(Clone)]
pub struct StreamIO {
    inner: Rc<RefCell<Inner>>,
    closed: Rc<Cell<bool>>,
}

enum Inner {
    Memory { buf: Vec<u8>, pos: usize },
    Pipe { buf: Vec<u8>, pos: usize, capacity: usize },
    File { vfs: Rc<RefCell<Vfs>>, cwd: String, path: String, pos: usize },
}

impl StreamIO {
    pub fn memory() -> Self {
        StreamIO {
            inner: Rc::new(RefCell::new(Inner::Memory { buf: Vec::new(), pos: 0 })),
            closed: Rc::new(Cell::new(false)),
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        StreamIO {
            inner: Rc::new(RefCell::new(Inner::Memory { buf: data, pos: 0 })),
            closed: Rc::new(Cell::new(false)),
        }
    }

    pub fn pipe(capacity: usize) -> Self {
        StreamIO {
            inner: Rc::new(RefCell::new(Inner::Pipe { buf: Vec::new(), pos: 0, capacity })),
            closed: Rc::new(Cell::new(false)),
        }
    }

    pub fn file(vfs: Rc<RefCell<Vfs>>, cwd: String, path: String) -> Self {
        StreamIO {
            inner: Rc::new(RefCell::new(Inner::File { vfs, cwd, path, pos: 0 })),
            closed: Rc::new(Cell::new(false)),
        }
    }

    /// Returns a second handle to the same underlying buffer (stream-handle
    /// duplication for `2>&1` and friends — closing one leaves the other
    /// open, matching spec §4.6).
    pub fn dup(&self) -> Self {
        StreamIO { inner: Rc::clone(&self.inner), closed: Rc::new(Cell::new(self.closed.get())) }
    }

    pub fn write(&self, bytes: &[u8]) -> Result<(), BashboxError> {
        if self.closed.get() {
            return Ok(());
        }
        match &mut *self.inner.borrow_mut() {
            Inner::Memory { buf, .. } => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Inner::Pipe { buf, capacity, .. } => {
                if buf.len() + bytes.len() > *capacity {
                    return Err(BashboxError::LimitExceeded { kind: LimitKind::PipeBuffer });
                }
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Inner::File { vfs, cwd, path, .. } => {
                vfs.borrow_mut().write(cwd, path, bytes, OpenMode::WriteAppend)?;
                Ok(())
            }
        }
    }

    /// Reads up to `n` bytes; `0` means "read everything remaining".
    pub fn read(&self, n: usize) -> Vec<u8> {
        match &mut *self.inner.borrow_mut() {
            Inner::Memory { buf, pos } | Inner::Pipe { buf, pos, .. } => {
                let end = if n == 0 { buf.len() } else { (*pos + n).min(buf.len()) };
                let out = buf[*pos..end].to_vec();
                *pos = end;
                out
            }
            Inner::File { vfs, cwd, path, pos } => {
                let data = vfs.borrow_mut().read(cwd, path).unwrap_or_default();
                let end = if n == 0 { data.len() } else { (*pos + n).min(data.len()) };
                let out = data[(*pos).min(data.len())..end].to_vec();
                *pos = end;
                out
            }
        }
    }

    pub fn read_all(&self) -> Vec<u8> {
        self.read(0)
    }

    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub fn contents_as_string(&self) -> String {
        match &*self.inner.borrow() {
            Inner::Memory { buf, .. } | Inner::Pipe { buf, .. } => String::from_utf8_lossy(buf).into_owned(),
            Inner::File { vfs, cwd, path, .. } => {
                String::from_utf8_lossy(&vfs.borrow_mut().read(cwd, path).unwrap_or_default()).into_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_stream_round_trips() {
        let s = StreamIO::memory();
        s.write(b"hello").unwrap();
        assert_eq!(s.read_all(), b"hello");
    }

    #[test]
    fn pipe_enforces_capacity() {
        let s = StreamIO::pipe(4);
        assert!(s.write(b"hello").is_err());
    }

    #[test]
    fn dup_shares_underlying_buffer() {
        let a = StreamIO::memory();
        let b = a.dup();
        a.write(b"x").unwrap();
        assert_eq!(b.read_all(), b"x");
    }

    #[test]
    fn closing_one_dup_leaves_other_open() {
        let a = StreamIO::memory();
        let b = a.dup();
        a.close();
        assert!(a.is_closed());
        assert!(!b.is_closed());
        assert!(b.write(b"y").is_ok());
    }
}
