use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::storage::{Change, DocumentService};

/// Handle to a live subscription.
///
/// Every item is the full current result set. An `Err` item is terminal:
/// the producer stops after sending it, re-subscribe to restart. Dropping
/// the handle (or calling [`Subscription::cancel`]) stops the producer.
pub struct Subscription<T> {
    receiver: mpsc::Receiver<Result<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Subscription<T> {
    pub(crate) fn spawn<F, Fut>(buffer: usize, producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<Result<T>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(producer(sender));
        Self { receiver, task }
    }
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot. `None` once the producer has stopped.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.receiver.recv().await
    }

    /// Non-blocking poll for frame loops.
    pub fn try_next(&mut self) -> Option<Result<T>> {
        self.receiver.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Subscribe to a query that is re-run whenever a relevant change is
/// published on the service's change feed.
pub(crate) fn live_query<T, Q, Fut, P>(
    service: &DocumentService,
    buffer: usize,
    label: String,
    is_relevant: P,
    query: Q,
) -> Subscription<T>
where
    T: Send + 'static,
    Q: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    P: Fn(&Change) -> bool + Send + 'static,
{
    // Đăng ký trước khi chạy query đầu tiên để không lỡ thay đổi nào
    let mut changes = service.subscribe_changes();

    Subscription::spawn(buffer, move |sender| async move {
        log::info!("Subscription started: {label}");
        loop {
            let snapshot = query().await;
            let failed = snapshot.is_err();
            if sender.send(snapshot).await.is_err() {
                break;
            }
            if failed {
                log::warn!("Subscription {label} ended with an error");
                break;
            }

            let keep_going = loop {
                match changes.recv().await {
                    Ok(change) if is_relevant(&change) => break true,
                    Ok(_) => continue,
                    // Snapshot đầy đủ nên mất vài thông báo cũng không sao
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!("Subscription {label} lagged by {skipped} changes");
                        break true;
                    }
                    Err(RecvError::Closed) => break false,
                }
            };
            if !keep_going {
                break;
            }
        }
        log::info!("Subscription stopped: {label}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_emits_initial_snapshot_then_on_relevant_change() {
        let service = DocumentService::in_memory().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let mut sub = live_query(
            &service,
            4,
            "test".into(),
            |change| matches!(change, Change::MessagesChanged { key } if key == "a_b"),
            move || {
                let counter = Arc::clone(&counter);
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
            },
        );

        assert_eq!(sub.next().await.unwrap().unwrap(), 1);

        service.publish(Change::MessagesChanged { key: "other".into() });
        service.publish(Change::MessagesChanged { key: "a_b".into() });
        assert_eq!(sub.next().await.unwrap().unwrap(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_is_terminal() {
        let service = DocumentService::in_memory().unwrap();
        let mut sub = live_query(
            &service,
            4,
            "failing".into(),
            |_| true,
            || async { Err::<(), _>(ChatError::Unavailable("offline".into())) },
        );

        let first = sub.next().await.unwrap();
        assert!(matches!(first, Err(ChatError::Unavailable(_))));
        service.publish(Change::MessagesChanged { key: "x".into() });
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_producer() {
        let service = DocumentService::in_memory().unwrap();
        let mut sub = live_query(&service, 4, "cancel".into(), |_| true, || async {
            Ok(())
        });
        sub.next().await.unwrap().unwrap();
        assert!(!sub.is_finished());
        sub.cancel();
    }

    #[tokio::test]
    async fn test_try_next_does_not_block() {
        let service = DocumentService::in_memory().unwrap();
        let mut sub = live_query(&service, 4, "poll".into(), |_| true, || async {
            Ok(1u8)
        });
        assert_eq!(sub.next().await.unwrap().unwrap(), 1);
        assert!(sub.try_next().is_none());

        service.publish(Change::MessagesChanged { key: "x".into() });
        let polled = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if let Some(snapshot) = sub.try_next() {
                    break snapshot;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(polled.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stream_interface() {
        let service = DocumentService::in_memory().unwrap();
        let mut sub = live_query(&service, 4, "stream".into(), |_| true, || async {
            Ok(7u8)
        });
        assert_eq!(sub.next().await.unwrap().unwrap(), 7);
        service.publish(Change::MessagesChanged { key: "x".into() });
        assert_eq!(StreamExt::next(&mut sub).await.unwrap().unwrap(), 7);
    }
}
