use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use press_core::throttle::{ThrottleOptions, Throttled};
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_millis(100);

type Calls = Arc<Mutex<Vec<(u32, Duration)>>>;

fn recorder(start: Instant) -> (Calls, impl FnMut(u32) + Send + 'static) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    (calls, move |value| {
        sink.lock().push((value, start.elapsed()));
    })
}

#[tokio::test(start_paused = true)]
async fn burst_inside_one_window_fires_twice_with_latest_args() {
    let start = Instant::now();
    let (calls, callback) = recorder(start);
    let throttle = Throttled::spawn(WINDOW, ThrottleOptions::default(), callback);

    throttle.call(1);
    sleep(WINDOW / 2).await;
    throttle.call(2);
    sleep(Duration::from_millis(1)).await;
    throttle.call(3);
    sleep(WINDOW * 3).await;

    assert_eq!(*calls.lock(), vec![(1, Duration::ZERO), (3, WINDOW)]);
}

#[tokio::test(start_paused = true)]
async fn cancel_discards_trailing_call_and_reopens_window() {
    let start = Instant::now();
    let (calls, callback) = recorder(start);
    let throttle = Throttled::spawn(WINDOW, ThrottleOptions::default(), callback);

    throttle.call(1);
    sleep(Duration::from_millis(10)).await;
    throttle.call(2);
    throttle.cancel();
    sleep(WINDOW * 2).await;
    assert_eq!(calls.lock().len(), 1);

    throttle.call(3);
    sleep(Duration::from_millis(1)).await;
    let recorded: Vec<u32> = calls.lock().iter().map(|(value, _)| *value).collect();
    assert_eq!(recorded, vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn sustained_calls_are_bounded_per_window() {
    let start = Instant::now();
    let (calls, callback) = recorder(start);
    let throttle = Throttled::spawn(WINDOW, ThrottleOptions::default(), callback);

    for value in 0..100 {
        throttle.call(value);
        sleep(Duration::from_millis(5)).await;
    }
    sleep(WINDOW * 2).await;

    let calls = calls.lock();
    // 500ms of traffic: one leading call plus one per elapsed window.
    assert!(calls.len() <= 6, "too many invocations: {}", calls.len());
    for pair in calls.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= WINDOW);
    }
    assert_eq!(calls.last().map(|(value, _)| *value), Some(99));
}

#[tokio::test(start_paused = true)]
async fn trailing_only_delays_first_call() {
    let start = Instant::now();
    let (calls, callback) = recorder(start);
    let options = ThrottleOptions {
        leading: false,
        trailing: true,
    };
    let throttle = Throttled::spawn(WINDOW, options, callback);

    throttle.call(7);
    sleep(Duration::from_millis(1)).await;
    assert!(calls.lock().is_empty());
    sleep(WINDOW).await;
    assert_eq!(*calls.lock(), vec![(7, WINDOW)]);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_discards_pending_call() {
    let start = Instant::now();
    let (calls, callback) = recorder(start);
    let throttle = Throttled::spawn(WINDOW, ThrottleOptions::default(), callback);

    throttle.call(1);
    sleep(Duration::from_millis(1)).await;
    throttle.call(2);
    sleep(Duration::from_millis(1)).await;
    drop(throttle);
    sleep(WINDOW * 2).await;

    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn queued_cancel_wins_over_due_deadline() {
    let start = Instant::now();
    let (calls, callback) = recorder(start);
    let throttle = Throttled::spawn(WINDOW, ThrottleOptions::default(), callback);

    throttle.call(1);
    sleep(Duration::from_millis(1)).await;
    throttle.call(2);
    sleep(Duration::from_millis(1)).await;
    // The trailing deadline is already past when the task next runs.
    throttle.cancel();
    tokio::time::advance(WINDOW).await;
    sleep(WINDOW).await;

    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn abort_drops_pending_call() {
    let start = Instant::now();
    let (calls, callback) = recorder(start);
    let throttle = Throttled::spawn(WINDOW, ThrottleOptions::default(), callback);

    throttle.call(1);
    sleep(Duration::from_millis(1)).await;
    throttle.call(2);
    throttle.abort();
    tokio::time::advance(WINDOW).await;
    sleep(WINDOW).await;
    throttle.call(3);
    sleep(Duration::from_millis(1)).await;

    assert_eq!(*calls.lock(), vec![(1, Duration::ZERO)]);
}
