//! Stateful seek/next pull interface over a node.

use crate::node::NodeRef;
use framemap_core::{Frame, FrameIter, Position, Result};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use tracing::trace;

struct CursorState<'a> {
    position: usize,
    frames: Option<FrameIter<'a>>,
}

/// Resumable decode cursor for consumers that pull one frame at a time.
///
/// All state sits behind a reentrant lock, so methods may call each other
/// while holding it. Consumers needing independent iteration should use
/// [`NodeRef::iter_frames`] instead of sharing a cursor.
pub struct FrameCursor<'a> {
    node: NodeRef<'a>,
    state: ReentrantMutex<RefCell<CursorState<'a>>>,
}

impl<'a> FrameCursor<'a> {
    /// Create a cursor positioned at the first frame.
    pub fn new(node: NodeRef<'a>) -> Self {
        Self {
            node,
            state: ReentrantMutex::new(RefCell::new(CursorState {
                position: 0,
                frames: None,
            })),
        }
    }

    /// Index of the next frame to be returned.
    pub fn position(&self) -> usize {
        self.state.lock().borrow().position
    }

    /// Move to `target`. The next frame returned is the first at or after it.
    pub fn seek(&self, target: Position) -> Result<usize> {
        let pts = self.node.pts()?;
        let position = target.resolve(&pts, self.node.time_base()?);
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.position = position;
        state.frames = None;
        trace!(node = %self.node.id(), position, "cursor seek");
        Ok(position)
    }

    /// Next frame, or `None` at the end of the stream.
    pub fn next_frame(&self) -> Option<Result<Frame>> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.frames.is_none() {
            let end = match self.node.framecount() {
                Ok(end) => end,
                Err(e) => return Some(Err(e)),
            };
            match self.node.iter_range(state.position, end) {
                Ok(frames) => state.frames = Some(frames),
                Err(e) => return Some(Err(e)),
            }
        }
        let next = state.frames.as_mut()?.next();
        if let Some(Ok(frame)) = &next {
            state.position = frame.index + 1;
        }
        next
    }

    /// Read up to `count` frames.
    pub fn read(&self, count: usize) -> Result<Vec<Frame>> {
        let _guard = self.state.lock();
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            match self.next_frame() {
                Some(frame) => frames.push(frame?),
                None => break,
            }
        }
        Ok(frames)
    }
}

impl<'a> NodeRef<'a> {
    /// Stateful cursor over this node's frames.
    pub fn cursor(&self) -> FrameCursor<'a> {
        FrameCursor::new(*self)
    }
}
