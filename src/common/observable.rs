//! Continuously updated value with ordered push delivery.
//!
//! A subscriber first receives the value current at registration time, then
//! every later publication in order, until its [`Subscription`] is dropped.
//!
//! Nothing is coalesced: each subscriber queues every published value until
//! it reads it. A subscription that is held but never drained keeps growing,
//! so drop it when it is no longer read.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

struct Slots<T> {
    current: T,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

#[derive(Clone)]
pub struct Observable<T> {
    inner: Arc<Mutex<Slots<T>>>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slots {
                current: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Store `value` and push it to every live subscriber.
    pub fn publish(&self, value: T) {
        let mut slots = self.lock();
        slots
            .subscribers
            .retain(|subscriber| subscriber.send(value.clone()).is_ok());
        slots.current = value;
    }

    pub fn get(&self) -> T {
        self.lock().current.clone()
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut slots = self.lock();
        // Receiver is alive, so this cannot fail.
        let _ = sender.send(slots.current.clone());
        slots.subscribers.push(sender);
        Subscription { receiver }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        let mut slots = self.lock();
        slots.subscribers.retain(|subscriber| !subscriber.is_closed());
        slots.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Receiving end of an [`Observable`]. Dropping it unregisters.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next value. `None` once the observable is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[test]
    fn subscriber_sees_current_value_then_every_change() {
        let observable = Observable::new(0u32);
        observable.publish(1);

        let mut subscription = observable.subscribe();
        observable.publish(2);
        observable.publish(3);

        assert_eq!(subscription.try_recv(), Some(1));
        assert_eq!(subscription.try_recv(), Some(2));
        assert_eq!(subscription.try_recv(), Some(3));
        assert_eq!(subscription.try_recv(), None);
        assert_eq!(observable.get(), 3);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let observable = Observable::new(false);
        let first = observable.subscribe();
        let _second = observable.subscribe();
        assert_eq!(observable.subscriber_count(), 2);

        drop(first);
        observable.publish(true);
        assert_eq!(observable.subscriber_count(), 1);
    }

    #[test]
    fn dropping_an_undrained_subscription_releases_its_backlog() {
        let marker = Arc::new(());
        let observable = Observable::new(Arc::clone(&marker));
        let backlog = observable.subscribe();
        for _ in 0..16 {
            observable.publish(Arc::clone(&marker));
        }
        // ours, the current slot, and 17 queued
        assert_eq!(Arc::strong_count(&marker), 19);

        drop(backlog);
        assert_eq!(Arc::strong_count(&marker), 2);
        assert_eq!(observable.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscription_works_as_a_stream() {
        let observable = Observable::new(String::from("a"));
        let subscription = observable.subscribe();
        observable.publish("b".to_string());
        drop(observable);

        let seen: Vec<String> = subscription.collect().await;
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }
}
