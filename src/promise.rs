use std::any::{self, Any};
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Error, Message, PromiseError, Waiter};

type SuccessObserver<T> = Box<dyn FnOnce(&T) + Send>;
type ErrorObserver<E> = Box<dyn FnOnce(&E) + Send>;

/// A single-assignment cell holding either a value or an error.
///
/// Cloning a `Promise` hands out another handle to the same cell. Any handle
/// may settle it or register observers, from any thread.
///
/// Every operation runs inside one critical section, observers included.
/// Observers therefore run on the thread that registered them (if the promise
/// was already settled) or on the thread that settled it, in registration
/// order.
///
/// The lock is not reentrant: an observer must not call back into the same
/// promise. Doing so deadlocks.
///
/// # Examples
///
/// ```
/// use promise_out::{Promise, PromiseError};
/// use std::thread;
///
/// let promise = Promise::<u32>::new();
/// let producer = promise.clone();
/// thread::spawn(move || producer.reject(PromiseError::new("Oops")).unwrap())
///     .join()
///     .unwrap();
///
/// assert!(promise.is_settled());
/// promise.on_error(|error| assert_eq!(error.message(), "Oops"));
/// ```
pub struct Promise<T, E = PromiseError> {
    promise: Arc<Mutex<Inner<T, E>>>,
}

/// Snapshot of where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Unsettled,
    Resolved,
    Rejected,
}

enum Outcome<T, E> {
    Unsettled,
    Resolved(T),
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    fn state(&self) -> State {
        match self {
            Outcome::Unsettled => State::Unsettled,
            Outcome::Resolved(_) => State::Resolved,
            Outcome::Rejected(_) => State::Rejected,
        }
    }
}

struct Inner<T, E> {
    outcome: Outcome<T, E>,
    success_observers: Vec<SuccessObserver<T>>,
    error_observers: Vec<ErrorObserver<E>>,
}

impl<T, E> Inner<T, E>
where
    E: Message,
{
    /// The error a second settlement reports, naming the first outcome.
    fn already_settled(&self) -> Option<Error> {
        match &self.outcome {
            Outcome::Unsettled => None,
            Outcome::Resolved(_) => Some(Error::AlreadyResolved(any::type_name::<T>())),
            Outcome::Rejected(error) => Some(Error::AlreadyRejected(error.describe())),
        }
    }
}

/// Run every observer in order. A panicking observer does not stop the rest;
/// the first panic payload is handed back to be resumed outside the lock.
fn notify<A: ?Sized>(
    observers: Vec<Box<dyn FnOnce(&A) + Send>>,
    arg: &A,
) -> Option<Box<dyn Any + Send>> {
    let mut panicked = None;
    for callback in observers {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(arg))) {
            tracing::warn!("observer panicked");
            panicked.get_or_insert(payload);
        }
    }
    panicked
}

impl<T, E> Promise<T, E> {
    pub fn new() -> Self {
        Self {
            promise: Arc::new(Mutex::new(Inner {
                outcome: Outcome::Unsettled,
                success_observers: Vec::new(),
                error_observers: Vec::new(),
            })),
        }
    }

    /// Register an observer for the success value.
    ///
    /// Runs immediately if the promise is already resolved, is dropped unrun if
    /// it was rejected, and is queued otherwise.
    pub fn on_success<F>(&self, callback: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut guard = self.promise.lock();
        let promise = &mut *guard;
        match &promise.outcome {
            Outcome::Resolved(value) => {
                tracing::trace!(kind = "success", "replaying observer on resolved promise");
                callback(value);
            }
            Outcome::Rejected(_) => {
                tracing::trace!(kind = "success", "discarding observer on rejected promise");
            }
            Outcome::Unsettled => {
                promise.success_observers.push(Box::new(callback));
                tracing::trace!(
                    kind = "success",
                    queued = promise.success_observers.len(),
                    "queued observer"
                );
            }
        }
    }

    /// Register an observer for the rejection. Mirrors [`Promise::on_success`].
    pub fn on_error<F>(&self, callback: F)
    where
        F: FnOnce(&E) + Send + 'static,
    {
        let mut guard = self.promise.lock();
        let promise = &mut *guard;
        match &promise.outcome {
            Outcome::Rejected(error) => {
                tracing::trace!(kind = "error", "replaying observer on rejected promise");
                callback(error);
            }
            Outcome::Resolved(_) => {
                tracing::trace!(kind = "error", "discarding observer on resolved promise");
            }
            Outcome::Unsettled => {
                promise.error_observers.push(Box::new(callback));
                tracing::trace!(
                    kind = "error",
                    queued = promise.error_observers.len(),
                    "queued observer"
                );
            }
        }
    }

    pub fn state(&self) -> State {
        self.promise.lock().outcome.state()
    }

    pub fn is_settled(&self) -> bool {
        self.state() != State::Unsettled
    }
}

impl<T, E> Promise<T, E>
where
    E: Message,
{
    /// Settle the promise with a value and notify the success observers.
    ///
    /// If an observer panics the remaining observers still run, and the first
    /// panic is resumed once the promise is fully settled and unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyResolved`] or [`Error::AlreadyRejected`] if the
    /// promise has settled before. The stored outcome is left untouched, `value`
    /// is dropped and no observer runs.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_out::{Error, Promise};
    ///
    /// let promise = Promise::<u8>::new();
    /// promise.resolve(1).unwrap();
    /// assert_eq!(
    ///     promise.resolve(2),
    ///     Err(Error::AlreadyResolved(std::any::type_name::<u8>()))
    /// );
    /// ```
    #[must_use = "a second settlement is reported through this result"]
    pub fn resolve(&self, value: T) -> Result<(), Error> {
        let mut guard = self.promise.lock();
        let promise = &mut *guard;
        if let Some(err) = promise.already_settled() {
            tracing::warn!(%err, "promise settled twice");
            return Err(err);
        }
        let observers = std::mem::take(&mut promise.success_observers);
        let discarded = std::mem::take(&mut promise.error_observers);
        promise.outcome = Outcome::Resolved(value);
        tracing::debug!(
            notified = observers.len(),
            discarded = discarded.len(),
            "promise resolved"
        );
        let panicked = match &promise.outcome {
            Outcome::Resolved(value) => notify(observers, value),
            _ => None,
        };
        // Dropped with the lock held so a waiter never sees a half-settled cell.
        drop(discarded);
        drop(guard);
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    /// Settle the promise with an error and notify the error observers.
    ///
    /// # Errors
    ///
    /// Same contract as [`Promise::resolve`].
    #[must_use = "a second settlement is reported through this result"]
    pub fn reject(&self, error: E) -> Result<(), Error> {
        let mut guard = self.promise.lock();
        let promise = &mut *guard;
        if let Some(err) = promise.already_settled() {
            tracing::warn!(attempted = %error.describe(), %err, "promise settled twice");
            return Err(err);
        }
        let observers = std::mem::take(&mut promise.error_observers);
        let discarded = std::mem::take(&mut promise.success_observers);
        promise.outcome = Outcome::Rejected(error);
        tracing::debug!(
            notified = observers.len(),
            discarded = discarded.len(),
            "promise rejected"
        );
        let panicked = match &promise.outcome {
            Outcome::Rejected(error) => notify(observers, error),
            _ => None,
        };
        drop(discarded);
        drop(guard);
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    /// Resolve with `Ok`, reject with `Err`.
    #[must_use = "a second settlement is reported through this result"]
    pub fn settle(&self, outcome: Result<T, E>) -> Result<(), Error> {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// A future that completes with a copy of the outcome.
    pub fn wait(&self) -> Waiter<T, E> {
        Waiter::new(self)
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Default for Promise<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let promise = self.promise.lock();
        let state = promise.outcome.state();
        f.debug_struct("Promise")
            .field("state", &state)
            .field("success_observers", &promise.success_observers.len())
            .field("error_observers", &promise.error_observers.len())
            .finish()
    }
}
