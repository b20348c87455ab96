//! Invocation frames

use crate::call_state::CallStateId;
use crate::context::ExecutionContext;
use kestrel_primitives::{Address, U256};
use std::ops::{Deref, DerefMut};

/// One active call level
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Contract being executed
    pub contract: Address,
    /// Call state of the executing contract
    pub call_state: CallStateId,
    /// Value attached to the call
    pub amount: U256,
    /// Address of the caller
    pub sender: Address,
    /// Structured-store recovery point in effect on entry
    pub sql_recovery_point: u64,
}

/// Scope of one call or delegate-call.
///
/// Restores the frame stack and call depth of the context on drop, so the
/// caller's frame is current again however the callee returned.
pub struct CallGuard<'a> {
    ctx: &'a mut ExecutionContext,
    saved_frames: usize,
    saved_depth: usize,
}

impl<'a> CallGuard<'a> {
    /// Enter a call level, optionally pushing a new frame
    pub(crate) fn enter(ctx: &'a mut ExecutionContext, frame: Option<Frame>) -> Self {
        let saved_frames = ctx.frames.len();
        let saved_depth = ctx.depth;
        ctx.depth += 1;
        if let Some(frame) = frame {
            tracing::debug!("Enter frame {} (depth {})", frame.contract, ctx.depth);
            ctx.frames.push(frame);
        }
        Self {
            ctx,
            saved_frames,
            saved_depth,
        }
    }
}

impl Deref for CallGuard<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &ExecutionContext {
        self.ctx
    }
}

impl DerefMut for CallGuard<'_> {
    fn deref_mut(&mut self) -> &mut ExecutionContext {
        self.ctx
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.ctx.frames.truncate(self.saved_frames);
        self.ctx.depth = self.saved_depth;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{address, Fixture};

    #[test]
    fn test_guard_restores_on_drop() {
        let fx = Fixture::new();
        let mut ctx = fx.root_context(0);
        let root = ctx.current_frame().unwrap().clone();
        let frame = Frame {
            contract: address(2),
            ..root.clone()
        };

        {
            let mut guard = CallGuard::enter(&mut ctx, Some(frame.clone()));
            assert_eq!(guard.depth(), 2);
            assert_eq!(guard.current_frame().unwrap(), &frame);
            // frames pushed inside the scope are dropped with it
            guard.frames.push(root.clone());
        }
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.frames(), &[root]);
    }

    #[test]
    fn test_guard_without_frame_counts_depth() {
        let fx = Fixture::new();
        let mut ctx = fx.root_context(0);
        let root = ctx.current_frame().unwrap().clone();
        {
            let guard = CallGuard::enter(&mut ctx, None);
            assert_eq!(guard.depth(), 2);
            assert_eq!(guard.current_frame().unwrap(), &root);
        }
        assert_eq!(ctx.depth(), 1);
    }
}
