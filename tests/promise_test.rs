use promise_out::{Error, Promise, PromiseError, State};
use std::any::type_name;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

type Log = Arc<Mutex<Vec<String>>>;

fn success(log: &Log, tag: &'static str) -> impl FnOnce(&String) + Send + 'static {
    let log = log.clone();
    move |value: &String| log.lock().unwrap().push(format!("{tag} with {value}"))
}

fn error(log: &Log, tag: &'static str) -> impl FnOnce(&PromiseError) + Send + 'static {
    let log = log.clone();
    move |error: &PromiseError| {
        log.lock()
            .unwrap()
            .push(format!("{tag} with {}", error.message()))
    }
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn test_resolve() {
    let promise = Promise::<String>::new();
    let successes = Log::default();
    let errors = Log::default();

    promise.on_success(success(&successes, "exec 1"));
    promise.on_error(error(&errors, "exec 1"));
    promise.on_success(success(&successes, "exec 2"));
    assert!(entries(&successes).is_empty());
    assert!(entries(&errors).is_empty());

    promise.resolve("Hello".into()).unwrap();
    assert_eq!(entries(&successes), ["exec 1 with Hello", "exec 2 with Hello"]);
    assert!(entries(&errors).is_empty());

    promise.on_success(success(&successes, "exec 3"));
    assert_eq!(
        entries(&successes),
        ["exec 1 with Hello", "exec 2 with Hello", "exec 3 with Hello"]
    );
    assert!(entries(&errors).is_empty());
}

#[test]
fn test_reject() {
    let promise = Promise::<String>::new();
    let successes = Log::default();
    let errors = Log::default();

    promise.on_error(error(&errors, "exec 1"));
    promise.on_success(success(&successes, "exec 1"));
    promise.on_error(error(&errors, "exec 2"));
    assert!(entries(&errors).is_empty());

    promise.reject(PromiseError::new("Oops")).unwrap();
    assert!(entries(&successes).is_empty());
    assert_eq!(entries(&errors), ["exec 1 with Oops", "exec 2 with Oops"]);

    promise.on_error(error(&errors, "exec 3"));
    assert!(entries(&successes).is_empty());
    assert_eq!(
        entries(&errors),
        ["exec 1 with Oops", "exec 2 with Oops", "exec 3 with Oops"]
    );
}

#[test]
fn test_resolve_in_threaded_context() {
    let promise = Promise::<String>::new();
    let successes = Log::default();
    promise.on_success(success(&successes, "exec 1"));

    let background = promise.clone();
    let log = successes.clone();
    let task = thread::spawn(move || {
        background.on_success(success(&log, "exec 2"));
        background.on_success(success(&log, "exec 3"));
    });
    promise.resolve("Hello".into()).unwrap();
    task.join().expect("The background thread has panicked");

    assert_eq!(
        entries(&successes),
        ["exec 1 with Hello", "exec 2 with Hello", "exec 3 with Hello"]
    );
}

#[test]
fn test_reject_in_threaded_context() {
    let promise = Promise::<String>::new();
    let errors = Log::default();
    promise.on_error(error(&errors, "exec 1"));

    let background = promise.clone();
    let log = errors.clone();
    let task = thread::spawn(move || {
        background.on_error(error(&log, "exec 2"));
        background.on_error(error(&log, "exec 3"));
    });
    promise.reject("Oops".into()).unwrap();
    task.join().expect("The background thread has panicked");

    assert_eq!(
        entries(&errors),
        ["exec 1 with Oops", "exec 2 with Oops", "exec 3 with Oops"]
    );
}

#[test]
fn test_resolve_twice() {
    let promise = Promise::<String>::new();
    let successes = Log::default();
    promise.on_success(success(&successes, "exec 1"));

    promise.resolve("first".into()).unwrap();
    let err = promise.resolve("second".into()).unwrap_err();
    assert!(err.is_already_settled());
    assert_eq!(err, Error::AlreadyResolved(type_name::<String>()));
    assert_eq!(
        promise.reject("Oops".into()),
        Err(Error::AlreadyResolved(type_name::<String>()))
    );

    promise.on_success(success(&successes, "exec 2"));
    assert_eq!(entries(&successes), ["exec 1 with first", "exec 2 with first"]);
    assert_eq!(promise.state(), State::Resolved);
}

#[test]
fn test_order_preserved() {
    let promise = Promise::<usize>::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..64 {
        let order = order.clone();
        promise.on_success(move |value| order.lock().unwrap().push(i * value));
    }
    promise.resolve(1).unwrap();
    assert_eq!(*order.lock().unwrap(), (0..64).collect::<Vec<_>>());
}

#[test]
fn test_racing_settlements() {
    const THREADS: usize = 8;
    let promise = Promise::<usize>::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    promise.on_success(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = fired.clone();
    promise.on_error(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let barrier = Arc::new(Barrier::new(THREADS));
    let tasks: Vec<_> = (0..THREADS)
        .map(|i| {
            let promise = promise.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    promise.resolve(i)
                } else {
                    promise.reject(PromiseError::new(format!("thread {i}")))
                }
            })
        })
        .collect();
    let results: Vec<_> = tasks.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(Error::is_already_settled));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(promise.is_settled());
}

#[test]
fn test_concurrent_registration_exactly_once() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;
    let promise = Promise::<u64>::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    let tasks: Vec<_> = (0..THREADS)
        .map(|_| {
            let promise = promise.clone();
            let fired = fired.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    let fired = fired.clone();
                    promise.on_success(move |value| {
                        assert_eq!(*value, 42);
                        fired.fetch_add(1, Ordering::SeqCst);
                    });
                    promise.on_error(|_| panic!("error observer on resolved promise"));
                }
            })
        })
        .collect();
    barrier.wait();
    promise.resolve(42).unwrap();
    for task in tasks {
        task.join().expect("A registering thread has panicked");
    }

    assert_eq!(fired.load(Ordering::SeqCst), THREADS * PER_THREAD);
}

#[test]
fn test_dropped_unsettled_never_fires() {
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let promise = Promise::<String>::new();
        let counter = fired.clone();
        promise.on_success(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
