use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::{Error, Promise};

/// A future over the outcome of a [`Promise`].
///
/// Made by [`Promise::wait`]. Completes with `Ok(Ok(value))` or
/// `Ok(Err(error))` once the promise settles, or with `Err(Error::Abandoned)`
/// if every handle to the promise is dropped first. The waiter keeps no handle
/// to the promise itself.
///
/// # Examples
///
/// ```
/// use promise_out::Promise;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let promise = Promise::<String>::new();
/// let waiter = promise.wait();
/// let task = thread::spawn(move || block_on(waiter));
/// promise.resolve("Hi".into()).unwrap();
/// assert_eq!(task.join().unwrap(), Ok(Ok("Hi".to_string())));
/// ```
#[derive(Debug)]
pub struct Waiter<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Filled,
    Tainted,
}

#[derive(Debug)]
struct Slot<T, E> {
    value: Option<Result<T, E>>,
    waker: Result<Waker, WakerState>,
}

/// Shared by both observers; whichever fires fills the slot. If the last one
/// is dropped with the slot still empty the promise went away unsettled.
struct Notifier<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

impl<T, E> Notifier<T, E> {
    fn fill(&self, outcome: Result<T, E>) {
        let mut slot = self.slot.lock();
        slot.value = Some(outcome);
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Filled)) {
            waker.wake()
        }
    }
}

impl<T, E> Drop for Notifier<T, E> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.value.is_none() && !matches!(slot.waker, Err(WakerState::Filled)) {
            tracing::debug!("promise dropped before settling, waking waiter");
            if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
                waker.wake()
            }
        }
    }
}

impl<T, E> Waiter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn new(promise: &Promise<T, E>) -> Self {
        let slot = Arc::new(Mutex::new(Slot {
            value: None,
            waker: Err(WakerState::Fresh),
        }));
        let notifier = Arc::new(Notifier { slot: slot.clone() });
        let on_error = notifier.clone();
        promise.on_success(move |value: &T| notifier.fill(Ok(value.clone())));
        promise.on_error(move |error: &E| on_error.fill(Err(error.clone())));
        Waiter { slot }
    }
}

impl<T, E> Future for Waiter<T, E> {
    type Output = Result<Result<T, E>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        match slot.value.take() {
            Some(value) => Poll::Ready(Ok(value)),
            None => match std::mem::replace(&mut slot.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => {
                    slot.waker = Err(WakerState::Tainted);
                    Poll::Ready(Err(Error::Abandoned))
                }
                _ => Poll::Pending,
            },
        }
    }
}
