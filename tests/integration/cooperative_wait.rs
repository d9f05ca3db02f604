#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use keel::{
    HandlerPool, KeelError, PageOpResult, PageOperationHandler, PoolOptions, SyncListener,
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
fn submit_and_await_delivers_value() -> keel::Result<()> {
    let pool = HandlerPool::new(PoolOptions::new().handlers(2))?;
    let value = pool.submit_and_await(|completer| {
        Box::new(move |_h: &dyn PageOperationHandler| {
            completer.succeed(41u64);
            PageOpResult::Succeeded
        })
    })?;
    assert_eq!(value, 41);
    pool.stop_handlers();
    Ok(())
}

#[test]
fn submit_and_await_rethrows_failure() {
    let pool = HandlerPool::new(PoolOptions::new().handlers(1)).unwrap();
    let result: keel::Result<u64> = pool.submit_and_await(|completer| {
        Box::new(move |_h: &dyn PageOperationHandler| {
            completer.fail(KeelError::operation("page denied"));
            PageOpResult::Failed
        })
    });
    assert_eq!(
        result.unwrap_err(),
        KeelError::Operation("page denied".into())
    );
    pool.stop_handlers();
}

#[test]
fn handler_drains_its_own_queue_while_awaiting() -> keel::Result<()> {
    init_tracing();
    let pool = HandlerPool::new(PoolOptions::new().handlers(1))?;
    let result = Arc::new(Mutex::new(None));

    let report = Arc::clone(&result);
    pool.handler(0)
        .submit(Box::new(move |h: &dyn PageOperationHandler| {
            let listener = SyncListener::new();
            let completer = listener.completer();
            // The producing operation lands on this very handler's queue; a
            // plain blocking wait here would deadlock the pool.
            h.submit(Box::new(move |_h: &dyn PageOperationHandler| {
                completer.succeed(123u32);
                PageOpResult::Succeeded
            }));
            *report.lock().unwrap() = Some(listener.wait_cooperative());
            PageOpResult::Succeeded
        }));

    wait_until(Duration::from_secs(5), || result.lock().unwrap().is_some());
    assert_eq!(result.lock().unwrap().take().unwrap().unwrap(), 123);
    pool.stop_handlers();
    Ok(())
}

#[test]
fn waiting_handler_is_woken_well_before_its_idle_interval() -> keel::Result<()> {
    init_tracing();
    let pool = HandlerPool::new(
        PoolOptions::new()
            .handlers(2)
            .loop_interval(Duration::from_secs(3)),
    )?;
    let blocked = Arc::clone(pool.handler(0));
    let owner = Arc::clone(pool.handler(1));
    let unlocked = Arc::new(AtomicBool::new(false));
    let done_at = Arc::new(Mutex::new(None));

    let gate = Arc::clone(&unlocked);
    let stamp = Arc::clone(&done_at);
    let owner_ref = Arc::clone(&owner);
    let waiter_ref = Arc::clone(&blocked);
    blocked.submit(Box::new(move |_h: &dyn PageOperationHandler| {
        if !gate.load(Ordering::SeqCst) {
            owner_ref.add_waiting_handler(Arc::clone(&waiter_ref));
            return PageOpResult::Locked;
        }
        *stamp.lock().unwrap() = Some(Instant::now());
        PageOpResult::Succeeded
    }));

    // Let the blocked handler park with its held operation.
    thread::sleep(Duration::from_millis(150));
    assert!(done_at.lock().unwrap().is_none());

    unlocked.store(true, Ordering::SeqCst);
    let woke = Instant::now();
    owner.wake_up_waiting_handlers();
    wait_until(Duration::from_secs(2), || done_at.lock().unwrap().is_some());
    let finished = done_at.lock().unwrap().unwrap();
    // Released by the wake, not the 3 s safety-net timeout.
    assert!(finished.duration_since(woke) < Duration::from_millis(500));
    pool.stop_handlers();
    Ok(())
}
