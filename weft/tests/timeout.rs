use std::time::Duration;

use weft::{Error, Loop, Notifier, time};

#[weft::test]
async fn timeout_completes_before_deadline() {
    let result = time::timeout(Duration::from_millis(200), async {
        time::sleep(Duration::from_millis(10)).await;
        123
    })
    .await;

    assert!(matches!(result, Ok(123)));
}

#[weft::test]
async fn timeout_expires_and_cancels_inner_timer() {
    let result = time::timeout(
        Duration::from_millis(10),
        time::sleep(Duration::from_secs(60)),
    )
    .await;

    assert!(matches!(result, Err(Error::Elapsed)));
    assert_eq!(Loop::local().pending_timers(), 0);
}

#[weft::test]
async fn timeout_on_notification_unsubscribes() {
    let notifier = Notifier::<()>::new();

    let result = time::timeout(Duration::from_millis(10), notifier.wait()).await;

    assert!(result.unwrap_err().is_elapsed());
    assert!(notifier.is_empty());
}

#[weft::test]
async fn unbounded_sleep_loses_to_timeout() {
    let result = time::timeout(Duration::from_millis(5), time::sleep(Duration::MAX)).await;

    assert!(result.unwrap_err().is_elapsed());
    assert_eq!(Loop::local().pending_timers(), 0);
}
