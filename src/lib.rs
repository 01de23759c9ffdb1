//! A single-assignment promise that fans its outcome out to observers.
//!
//! A [`Promise`] eventually holds exactly one of a success value or an error.
//! Observers registered with [`Promise::on_success`] and [`Promise::on_error`]
//! fire exactly once with the matching outcome, whether they were registered
//! before or after the promise settled.
//!
//! # Examples
//!
//! ```
//! use promise_out::{Promise, PromiseError};
//! use std::sync::{Arc, Mutex};
//!
//! let promise = Promise::<String>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let log = seen.clone();
//! promise.on_success(move |value| log.lock().unwrap().push(format!("early {value}")));
//! promise.on_error(|error: &PromiseError| panic!("unexpected {error}"));
//!
//! promise.resolve("Hello".into()).unwrap();
//!
//! let log = seen.clone();
//! promise.on_success(move |value| log.lock().unwrap().push(format!("late {value}")));
//!
//! assert_eq!(*seen.lock().unwrap(), ["early Hello", "late Hello"]);
//! ```
pub mod promise;
pub mod waiter;

pub use promise::{Promise, State};
pub use waiter::Waiter;

use std::fmt::Display;
use thiserror::Error;

/// Misuse of a promise, or a wait that can never complete.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("promise has already been resolved with a value of type {0}")]
    AlreadyResolved(&'static str),
    #[error("promise has already been rejected with {0}")]
    AlreadyRejected(String),
    #[error("promise was dropped before it settled")]
    Abandoned,
}

impl Error {
    /// True for a second `resolve`/`reject` on a settled promise.
    pub fn is_already_settled(&self) -> bool {
        matches!(self, Error::AlreadyResolved(_) | Error::AlreadyRejected(_))
    }
}

/// Default rejection payload: a human readable message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PromiseError {
    message: String,
}

impl PromiseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for PromiseError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for PromiseError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Anything that can describe itself as a message can be a rejection.
pub trait Message {
    fn describe(&self) -> String;
}

impl<E: Display + ?Sized> Message for E {
    fn describe(&self) -> String {
        self.to_string()
    }
}
