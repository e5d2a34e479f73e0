// Output channels for the interpreter and its natives.
//
// The driver owns one Io per session; tests capture both sinks.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

pub struct Io {
    pub out: Box<dyn Write>,
    pub err: Box<dyn Write>,
}

impl Io {
    /// Process stdout/stderr.
    pub fn stdio() -> Self {
        Self {
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
        }
    }

    /// Discard everything. Useful for bootstrapping and tests that only
    /// care about values.
    pub fn sink() -> Self {
        Self {
            out: Box::new(io::sink()),
            err: Box::new(io::sink()),
        }
    }

    /// Capture both channels into shared buffers.
    pub fn capture() -> (Self, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let io = Self {
            out: Box::new(out.clone()),
            err: Box::new(err.clone()),
        };
        (io, out, err)
    }
}

/// A clonable in-memory sink.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
