// Copyright 2026 Joyent, Inc.

//! Observer hooks around each RPC.
//!
//! A stack of [`ThriftEventHandler`]s may watch every call the server
//! processes: context creation, argument read, result or exception write,
//! and completion. Handlers run in registration order and observe only;
//! they must not mutate arguments or results.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::value::ThriftValue;

/// Per-call context produced by a handler's `get_context` and passed back
/// to each of its callbacks.
pub type HandlerContext = Box<dyn Any + Send>;

/// Event hooks observing the lifecycle of one RPC. All methods default to
/// no-ops so implementations override only what they need.
pub trait ThriftEventHandler: Send + Sync {
    /// Called once per call, before anything is read.
    fn get_context(&self, _method: &str) -> Option<HandlerContext> {
        None
    }

    fn pre_read(&self, _context: &mut Option<HandlerContext>, _method: &str) {}

    fn post_read(
        &self,
        _context: &mut Option<HandlerContext>,
        _method: &str,
        _args: &[Option<ThriftValue>],
    ) {
    }

    fn pre_write(
        &self,
        _context: &mut Option<HandlerContext>,
        _method: &str,
        _result: Option<&ThriftValue>,
    ) {
    }

    fn pre_write_exception(
        &self,
        _context: &mut Option<HandlerContext>,
        _method: &str,
        _error: &dyn fmt::Display,
    ) {
    }

    fn post_write(
        &self,
        _context: &mut Option<HandlerContext>,
        _method: &str,
        _result: Option<&ThriftValue>,
    ) {
    }

    fn post_write_exception(
        &self,
        _context: &mut Option<HandlerContext>,
        _method: &str,
        _error: &dyn fmt::Display,
    ) {
    }

    /// Called exactly once when the call is finished, whatever the
    /// outcome.
    fn done(&self, _context: &mut Option<HandlerContext>, _method: &str) {}
}

/// Fans one call's events out to every registered handler, pairing each
/// with the context it created.
pub struct ContextChain {
    handlers: Vec<Arc<dyn ThriftEventHandler>>,
    contexts: Vec<Option<HandlerContext>>,
    method: String,
}

impl ContextChain {
    pub fn new(
        handlers: &[Arc<dyn ThriftEventHandler>],
        method: &str,
    ) -> Self {
        let contexts = handlers
            .iter()
            .map(|handler| handler.get_context(method))
            .collect();
        ContextChain {
            handlers: handlers.to_vec(),
            contexts,
            method: String::from(method),
        }
    }

    pub fn pre_read(&mut self) {
        for (handler, context) in
            self.handlers.iter().zip(self.contexts.iter_mut())
        {
            handler.pre_read(context, &self.method);
        }
    }

    pub fn post_read(&mut self, args: &[Option<ThriftValue>]) {
        for (handler, context) in
            self.handlers.iter().zip(self.contexts.iter_mut())
        {
            handler.post_read(context, &self.method, args);
        }
    }

    pub fn pre_write(&mut self, result: Option<&ThriftValue>) {
        for (handler, context) in
            self.handlers.iter().zip(self.contexts.iter_mut())
        {
            handler.pre_write(context, &self.method, result);
        }
    }

    pub fn pre_write_exception(&mut self, error: &dyn fmt::Display) {
        for (handler, context) in
            self.handlers.iter().zip(self.contexts.iter_mut())
        {
            handler.pre_write_exception(context, &self.method, error);
        }
    }

    pub fn post_write(&mut self, result: Option<&ThriftValue>) {
        for (handler, context) in
            self.handlers.iter().zip(self.contexts.iter_mut())
        {
            handler.post_write(context, &self.method, result);
        }
    }

    pub fn post_write_exception(&mut self, error: &dyn fmt::Display) {
        for (handler, context) in
            self.handlers.iter().zip(self.contexts.iter_mut())
        {
            handler.post_write_exception(context, &self.method, error);
        }
    }

    pub fn done(&mut self) {
        for (handler, context) in
            self.handlers.iter().zip(self.contexts.iter_mut())
        {
            handler.done(context, &self.method);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    }

    impl ThriftEventHandler for Recorder {
        fn get_context(&self, method: &str) -> Option<HandlerContext> {
            Some(Box::new(format!("{}:{}", self.tag, method)))
        }

        fn pre_read(
            &self,
            context: &mut Option<HandlerContext>,
            _method: &str,
        ) {
            let ctx = context
                .as_ref()
                .and_then(|c| c.downcast_ref::<String>())
                .cloned()
                .unwrap_or_default();
            self.events.lock().unwrap().push(format!("pre_read {}", ctx));
        }

        fn done(&self, _context: &mut Option<HandlerContext>, _method: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {}", self.tag));
        }
    }

    #[test]
    fn handlers_run_in_registration_order_with_their_contexts() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let handlers: Vec<Arc<dyn ThriftEventHandler>> = vec![
            Arc::new(Recorder {
                events: events.clone(),
                tag: "a",
            }),
            Arc::new(Recorder {
                events: events.clone(),
                tag: "b",
            }),
        ];

        let mut chain = ContextChain::new(&handlers, "ping");
        chain.pre_read();
        chain.post_read(&[]);
        chain.pre_write(None);
        chain.post_write(None);
        chain.done();

        let seen = events.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec!["pre_read a:ping", "pre_read b:ping", "done a", "done b"]
        );
    }
}
