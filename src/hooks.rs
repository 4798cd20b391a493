//! Named interception points for wrapped host commands.
//!
//! The host exposes commands (open a new tab, go home, ...) that the capture
//! layer needs to observe without owning. An [`InterceptPoint`] wraps one
//! such command: handlers registered on it run in registration order before
//! and after the wrapped operation.

type Handler<A> = Box<dyn FnMut(&A) + Send>;

pub struct InterceptPoint<A> {
    name: &'static str,
    before: Vec<Handler<A>>,
    after: Vec<Handler<A>>,
}

impl<A> InterceptPoint<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a handler that runs before the wrapped operation.
    pub fn before(&mut self, handler: impl FnMut(&A) + Send + 'static) {
        self.before.push(Box::new(handler));
    }

    /// Register a handler that runs after the wrapped operation.
    pub fn after(&mut self, handler: impl FnMut(&A) + Send + 'static) {
        self.after.push(Box::new(handler));
    }

    /// Invoke the wrapped operation with all handlers around it. The
    /// operation always runs, even if a handler is registered on only one
    /// side, and its result is passed through.
    pub fn run<R>(&mut self, args: &A, op: impl FnOnce(&A) -> R) -> R {
        for handler in &mut self.before {
            handler(args);
        }
        let result = op(args);
        for handler in &mut self.after {
            handler(args);
        }
        result
    }
}
