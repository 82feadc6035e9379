//! Per-attempt message context.

use serde_json::Value;

use crate::message::RawMessage;

/// Wraps one [`RawMessage`] for the duration of one processing attempt.
///
/// Handlers use it to report a business-level failure without returning an
/// error: marking the context failed (optionally with an HTTP-style status
/// code and error detail) makes the processor reschedule the message exactly
/// as if the handler had failed. Whatever a handler records here before
/// failing is kept and stamped onto the message when it is rescheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    message: RawMessage,
    failed: bool,
    status_code: Option<u16>,
    error: Option<Value>,
}

impl MessageContext {
    pub fn new(message: RawMessage) -> Self {
        Self {
            message,
            failed: false,
            status_code: None,
            error: None,
        }
    }

    pub fn raw_message(&self) -> &RawMessage {
        &self.message
    }

    pub fn raw_message_mut(&mut self) -> &mut RawMessage {
        &mut self.message
    }

    pub fn into_raw_message(self) -> RawMessage {
        self.message
    }

    pub fn message_type(&self) -> &str {
        &self.message.message_type
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref()
    }

    /// Mark the attempt failed without further detail.
    pub fn fail(&mut self) {
        self.failed = true;
    }

    /// Mark the attempt failed with a status code and error detail.
    pub fn fail_with(&mut self, status_code: u16, error: impl Into<Value>) {
        self.failed = true;
        self.status_code = Some(status_code);
        self.error = Some(error.into());
    }

    pub fn set_status_code(&mut self, status_code: u16) {
        self.status_code = Some(status_code);
    }

    pub fn set_error(&mut self, error: impl Into<Value>) {
        self.error = Some(error.into());
    }
}
