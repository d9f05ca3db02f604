#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use keel::{
    HandlerPool, PageOpResult, PageOperationHandler, PoolOptions,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) {
    let limit = Instant::now() + deadline;
    while !done() {
        if Instant::now() > limit {
            panic!("condition not reached in time");
        }
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn single_handler_completes_in_submission_order() -> keel::Result<()> {
    init_tracing();
    let pool = HandlerPool::new(PoolOptions::new().handlers(1))?;
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..100u32 {
        let log = Arc::clone(&order);
        pool.handler(0)
            .submit(Box::new(move |_h: &dyn PageOperationHandler| {
                log.lock().unwrap().push(i);
                PageOpResult::Succeeded
            }));
    }
    wait_until(Duration::from_secs(5), || pool.handler(0).load() == 0);
    let seen = order.lock().unwrap();
    assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    pool.stop_handlers();
    Ok(())
}

#[test]
fn locked_operation_is_retried_ahead_of_later_arrivals() -> keel::Result<()> {
    init_tracing();
    let pool = HandlerPool::new(
        PoolOptions::new()
            .handlers(1)
            .loop_interval(Duration::from_secs(3)),
    )?;
    let handler = Arc::clone(pool.handler(0));
    let order = Arc::new(Mutex::new(Vec::new()));
    let unlocked = Arc::new(AtomicBool::new(false));

    let log = Arc::clone(&order);
    let gate = Arc::clone(&unlocked);
    handler.submit(Box::new(move |_h: &dyn PageOperationHandler| {
        if !gate.load(Ordering::SeqCst) {
            return PageOpResult::Locked;
        }
        log.lock().unwrap().push("a");
        PageOpResult::Succeeded
    }));
    for label in ["b", "c"] {
        let log = Arc::clone(&order);
        handler.submit(Box::new(move |_h: &dyn PageOperationHandler| {
            log.lock().unwrap().push(label);
            PageOpResult::Succeeded
        }));
    }

    // The held operation blocks the queue while it stays locked.
    thread::sleep(Duration::from_millis(100));
    assert!(order.lock().unwrap().is_empty());
    assert_eq!(handler.load(), 3);

    unlocked.store(true, Ordering::SeqCst);
    let woke = Instant::now();
    handler.wake_up();
    wait_until(Duration::from_secs(2), || handler.load() == 0);
    assert!(woke.elapsed() < Duration::from_secs(1));
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    pool.stop_handlers();
    Ok(())
}

#[test]
fn load_counts_queued_plus_in_flight() -> keel::Result<()> {
    let pool = HandlerPool::new(PoolOptions::new().handlers(1))?;
    let handler = Arc::clone(pool.handler(0));
    let gate = Arc::new(AtomicBool::new(false));

    let held = Arc::clone(&gate);
    handler.submit(Box::new(move |_h: &dyn PageOperationHandler| {
        while !held.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        PageOpResult::Succeeded
    }));
    for _ in 0..4 {
        handler.submit(Box::new(|_h: &dyn PageOperationHandler| {
            PageOpResult::Succeeded
        }));
    }

    // Five submitted, none terminal yet.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(handler.load(), 5);

    gate.store(true, Ordering::SeqCst);
    wait_until(Duration::from_secs(5), || handler.load() == 0);
    pool.stop_handlers();
    Ok(())
}

#[test]
fn panicking_operation_does_not_stop_the_loop() -> keel::Result<()> {
    init_tracing();
    let pool = HandlerPool::new(PoolOptions::new().handlers(1))?;
    let handler = Arc::clone(pool.handler(0));
    handler.submit(Box::new(
        |_h: &dyn PageOperationHandler| -> PageOpResult { panic!("codec blew up") },
    ));
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    handler.submit(Box::new(move |_h: &dyn PageOperationHandler| {
        flag.store(true, Ordering::SeqCst);
        PageOpResult::Succeeded
    }));
    wait_until(Duration::from_secs(5), || handler.load() == 0);
    assert!(ran.load(Ordering::SeqCst));
    pool.stop_handlers();
    Ok(())
}

#[test]
fn stop_releases_handlers_within_one_wake_cycle() -> keel::Result<()> {
    let pool = HandlerPool::new(
        PoolOptions::new()
            .handlers(2)
            .loop_interval(Duration::from_secs(30)),
    )?;
    // Let both loops reach their parks.
    thread::sleep(Duration::from_millis(100));
    let start = Instant::now();
    pool.stop_handlers();
    assert!(start.elapsed() < Duration::from_secs(1));
    Ok(())
}
