//! Error taxonomy and the bounded diagnostic trace used by
//! every fallible operation in this crate.
//!
//! Failures carry a *kind* ([`Reason`]) and the component
//! that raised them ([`Source`]). When a component fails
//! because a delegate failed, it wraps the delegate's trace
//! with a [`Reason::Delegated`] frame of its own instead of
//! translating the error into an unrelated kind; the origin
//! stays visible for diagnostics. The trace keeps at most
//! [`Trace::CAPACITY`] frames and discards the oldest on
//! overflow.

use std::fmt;

use thiserror::Error;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Reason {
    /// A required buffer is absent (e.g. already moved out).
    #[error("missing input")]
    NullInput,
    /// A buffer could not be allocated within sane limits.
    #[error("allocation refused")]
    Alloc,
    /// An operation would have clobbered live state; the leak
    /// was avoided by failing instead.
    #[error("double initialization (leak avoided)")]
    DoubleInit,
    /// An argument or coordinate is out of range.
    #[error("out of range")]
    OutOfRange,
    /// The underlying reader or writer failed.
    #[error("i/o failure")]
    Io,
    /// The container format is invalid.
    #[error("malformed container")]
    Malformed,
    /// The container is valid but its content is unsupported
    /// or does not hold the expected features.
    #[error("unexpected image content")]
    Image,
    /// A glyph or pattern did not match any known value.
    #[error("unrecognized value")]
    Unrecognized,
    /// An internal invariant was violated. Indicates a logic
    /// bug; never expected in correct operation.
    #[error("internal inconsistency")]
    Inconsistent,
    /// A called component failed; its frames follow.
    #[error("delegate failed")]
    Delegated,
}

/// Which component raised the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Source {
    #[error("bitmap")]
    Bitmap,
    #[error("canvas")]
    Canvas,
    #[error("ocr")]
    Ocr,
    #[error("palette")]
    Palette,
    #[error("locator")]
    Locator,
    #[error("thermal")]
    Thermal,
}

/// One `{reason, source}` record on the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub reason: Reason,
    pub source: Source,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// A bounded stack of error frames, newest first.
///
/// Capacity is fixed at 4 frames; pushing onto a full trace
/// discards the oldest frame so the most recent diagnostic
/// depth is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    frames: Vec<Frame>,
}

impl Trace {
    pub const CAPACITY: usize = 4;

    /// Starts a new trace with a single frame.
    pub fn new(reason: Reason, source: Source) -> Self {
        Trace {
            frames: vec![Frame { reason, source }],
        }
    }

    /// Pushes a frame, discarding the oldest on overflow.
    pub fn push(&mut self, reason: Reason, source: Source) {
        if self.frames.len() == Self::CAPACITY {
            self.frames.pop();
        }
        self.frames.insert(0, Frame { reason, source });
    }

    /// Removes and returns the newest frame, if any.
    pub fn pop(&mut self) -> Option<Frame> {
        if self.frames.is_empty() {
            None
        } else {
            Some(self.frames.remove(0))
        }
    }

    /// The newest frame, absent once the trace has been
    /// drained with [`pop`](Self::pop).
    pub fn latest(&self) -> Option<Frame> {
        self.frames.first().copied()
    }

    /// The oldest retained frame (closest to the origin).
    pub fn first(&self) -> Option<Frame> {
        self.frames.last().copied()
    }

    /// Wraps this trace under a caller's `Delegated` frame.
    pub fn delegated(mut self, source: Source) -> Self {
        self.push(Reason::Delegated, source);
        self
    }

    /// The kind of the newest frame. A drained trace reads as
    /// [`Reason::Inconsistent`]: every trace starts with a
    /// frame, so only explicit popping can empty one.
    pub fn reason(&self) -> Reason {
        self.latest().map_or(Reason::Inconsistent, |f| f.reason)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, frame) in self.frames.iter().enumerate() {
            if idx > 0 {
                write!(f, " <- ")?;
            }
            write!(f, "{}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for Trace {}

pub type Result<T> = std::result::Result<T, Trace>;

/// Shorthand for `Err(Trace::new(..))`.
pub(crate) fn fail<T>(reason: Reason, source: Source) -> Result<T> {
    Err(Trace::new(reason, source))
}
