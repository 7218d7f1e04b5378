use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

//
// Public Interface
//

/// Cancellation context threaded from the optimizer down to checker
/// subprocesses. A child context observes the cancellation of all its
/// ancestors; cancelling a child never affects the parent. Deadlines only
/// tighten along the chain.
#[derive(Clone, Debug, Default)]
pub struct Ctx {
    tokens: Vec<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl Ctx {
    pub fn new() -> Self {
        Self {
            tokens: vec![Arc::new(AtomicBool::new(false))],
            deadline: None,
        }
    }

    /// Derives a child context with its own cancellation token.
    pub fn child(&self) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(Arc::new(AtomicBool::new(false)));
        Self {
            tokens,
            deadline: self.deadline,
        }
    }

    /// Derives a child context whose deadline is at most `timeout` from
    /// now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut ctx = self.child();
        let deadline = Instant::now() + timeout;
        ctx.deadline = Some(ctx.deadline.map_or(deadline, |d| d.min(deadline)));
        ctx
    }

    /// Cancels this context and everything derived from it.
    pub fn cancel(&self) {
        if let Some(token) = self.tokens.last() {
            token.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.tokens.iter().any(|t| t.load(Ordering::SeqCst))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}
