//! Realtime subscriptions.
//!
//! A subscription pairs a standing watch on the store with a snapshot callback and an
//! optional error callback. Each delivery carries the complete current result, never a
//! diff, and deliveries for one subscription never overlap.
//!
//! A subscription ends in one of two ways:
//!
//! - [`Subscription::cancel`] (or dropping the handle). Cancelling is idempotent, and
//!   once it returns no callback of the subscription runs again.
//! - A terminal error. The error callback runs exactly once, no snapshot follows, and
//!   the watch is torn down. Without an error callback the error is logged.
//!
//! # Example
//!
//! ```ignore
//! let subscription = store
//!     .subscribe_to_query(&contacts, Query::from(order_by("year")))
//!     .on_error(|error| eprintln!("watch failed: {error}"))
//!     .listen(|contacts: Vec<Doc<Contact>>| println!("{} contacts", contacts.len()))
//!     .await;
//!
//! // later
//! subscription.cancel();
//! ```

use std::{
    fmt::{Debug, Formatter},
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    thread::{self, ThreadId},
};

use futures::{
    Stream,
    channel::mpsc::{self, UnboundedReceiver},
};
use log::{debug, error};

use crate::{
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
    native::{WatchEvent, WatchListener, WatchRegistration, WatchTarget},
};

type Decoder<T> = Arc<dyn Fn(WatchEvent) -> DocumentStoreResult<T> + Send + Sync>;
type ErrorCallback = Box<dyn FnOnce(DocumentStoreError) + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SubscriptionState {
    live: AtomicBool,
    delivery: Mutex<()>,
    delivering_thread: Mutex<Option<ThreadId>>,
    registration: Mutex<Option<WatchRegistration>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

impl SubscriptionState {
    fn new(on_error: Option<ErrorCallback>) -> Self {
        Self {
            live: AtomicBool::new(true),
            delivery: Mutex::new(()),
            delivering_thread: Mutex::new(None),
            registration: Mutex::new(None),
            on_error: Mutex::new(on_error),
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Keeps the driver registration, or releases it at once if the subscription ended
    /// while the watch was being set up.
    fn attach(&self, registration: WatchRegistration) {
        let mut slot = lock(&self.registration);

        if self.is_live() {
            *slot = Some(registration);
        } else {
            drop(slot);
            registration.unregister();
        }
    }

    fn deliver<T>(
        &self,
        event: WatchEvent,
        decode: &Decoder<T>,
        on_snapshot: &(dyn Fn(T) + Send + Sync),
    ) {
        let _delivery = lock(&self.delivery);
        if !self.is_live() {
            return;
        }

        *lock(&self.delivering_thread) = Some(thread::current().id());

        match decode(event) {
            Ok(snapshot) => on_snapshot(snapshot),
            Err(error) => self.fail(error),
        }

        *lock(&self.delivering_thread) = None;
    }

    fn fail(&self, error: DocumentStoreError) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }

        let on_error = lock(&self.on_error).take();
        match on_error {
            Some(on_error) => on_error(error),
            None => error!("subscription terminated: {error}"),
        }

        self.release();
    }

    fn cancel(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }

        // Wait for an in-flight delivery, unless it is the one cancelling.
        let inside_delivery = *lock(&self.delivering_thread) == Some(thread::current().id());
        if !inside_delivery {
            drop(lock(&self.delivery));
        }

        lock(&self.on_error).take();
        self.release();

        debug!("subscription cancelled");
    }

    fn release(&self) {
        let registration = lock(&self.registration).take();
        if let Some(registration) = registration {
            registration.unregister();
        }
    }
}

/// Handle to a live subscription.
///
/// Dropping the handle cancels the subscription.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    state: Arc<SubscriptionState>,
}

impl Subscription {
    /// Stops the subscription. Calling it again, or after a terminal error, does nothing.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// `true` until the subscription is cancelled or fails.
    pub fn is_active(&self) -> bool {
        self.state.is_live()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.cancel();
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Configures and starts a subscription.
///
/// Created by [`DocumentStore::subscribe_to_query`](crate::store::DocumentStore::subscribe_to_query)
/// and [`DocumentStore::subscribe_to_document`](crate::store::DocumentStore::subscribe_to_document).
#[must_use = "a subscription is only registered once `listen` is awaited"]
pub struct SubscriptionBuilder<'a, B: StoreBackend, T> {
    backend: &'a B,
    target: DocumentStoreResult<WatchTarget>,
    decode: Decoder<T>,
    on_error: Option<ErrorCallback>,
}

impl<'a, B: StoreBackend, T: Send + 'static> SubscriptionBuilder<'a, B, T> {
    pub(crate) fn new(
        backend: &'a B,
        target: DocumentStoreResult<WatchTarget>,
        decode: impl Fn(WatchEvent) -> DocumentStoreResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend,
            target,
            decode: Arc::new(decode),
            on_error: None,
        }
    }

    /// Sets the callback receiving the terminal error.
    pub fn on_error(mut self, on_error: impl FnOnce(DocumentStoreError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Registers the watch and starts delivering snapshots to `on_snapshot`.
    ///
    /// The initial state is delivered as the first snapshot. If the watch cannot be set
    /// up, for instance because the query is invalid, the error goes to the error
    /// callback and the returned subscription is already inactive.
    pub async fn listen(self, on_snapshot: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        let state = Arc::new(SubscriptionState::new(self.on_error));

        let target = match self.target {
            Ok(target) => target,
            Err(error) => {
                state.fail(error);
                return Subscription { state };
            }
        };

        debug!("subscribing to {}", describe(&target));

        let listener: WatchListener = {
            let state = state.clone();
            let decode = self.decode;
            Arc::new(move |event| state.deliver(event, &decode, &on_snapshot))
        };

        match self.backend.watch(target, listener).await {
            Ok(registration) => state.attach(registration),
            Err(error) => state.fail(error),
        }

        Subscription { state }
    }

    /// Turns the subscription into a stream of snapshots.
    ///
    /// The stream yields `Ok` for every snapshot, a single `Err` if the subscription
    /// fails, and then ends. Dropping the stream cancels the subscription.
    pub async fn into_stream(self) -> SubscriptionStream<T> {
        let (sender, receiver) = mpsc::unbounded();
        let error_sender = sender.clone();

        let subscription = self
            .on_error(move |error| {
                let _ = error_sender.unbounded_send(Err(error));
            })
            .listen(move |snapshot| {
                let _ = sender.unbounded_send(Ok(snapshot));
            })
            .await;

        SubscriptionStream { receiver, subscription, done: false }
    }
}

fn describe(target: &WatchTarget) -> String {
    match target {
        WatchTarget::Query(query) => format!("query on {:?}", query.target),
        WatchTarget::Document(handle) => format!("document {}", handle.path()),
    }
}

/// Snapshots of a subscription as a [`Stream`].
pub struct SubscriptionStream<T> {
    receiver: UnboundedReceiver<DocumentStoreResult<T>>,
    subscription: Subscription,
    done: bool,
}

impl<T> SubscriptionStream<T> {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T> Stream for SubscriptionStream<T> {
    type Item = DocumentStoreResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.receiver).poll_next(cx) {
            Poll::Ready(Some(Err(error))) => {
                this.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_registration(counter: &Arc<AtomicUsize>) -> WatchRegistration {
        let counter = counter.clone();
        WatchRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn identity() -> Decoder<WatchEvent> {
        Arc::new(|event| match event {
            WatchEvent::Error(error) => Err(error),
            other => Ok(other),
        })
    }

    #[test]
    fn cancel_is_idempotent() {
        let unregistered = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(SubscriptionState::new(None));
        state.attach(counting_registration(&unregistered));

        let subscription = Subscription { state: state.clone() };
        subscription.cancel();
        subscription.cancel();
        drop(subscription);

        assert_eq!(unregistered.load(Ordering::SeqCst), 1);
        assert!(!state.is_live());
    }

    #[test]
    fn late_registration_is_released() {
        let unregistered = Arc::new(AtomicUsize::new(0));
        let state = SubscriptionState::new(None);

        state.cancel();
        state.attach(counting_registration(&unregistered));

        assert_eq!(unregistered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_is_delivered_once() {
        let errors = Arc::new(AtomicUsize::new(0));
        let snapshots = Arc::new(AtomicUsize::new(0));
        let unregistered = Arc::new(AtomicUsize::new(0));

        let counter = errors.clone();
        let state = SubscriptionState::new(Some(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        state.attach(counting_registration(&unregistered));

        let decode = identity();
        let counter = snapshots.clone();
        let on_snapshot = move |_: WatchEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        };

        state.deliver(WatchEvent::Query(Vec::new()), &decode, &on_snapshot);
        let failure = |message: &str| {
            WatchEvent::Error(DocumentStoreError::QueryExecution(message.to_string()))
        };
        state.deliver(failure("bad"), &decode, &on_snapshot);
        state.deliver(failure("again"), &decode, &on_snapshot);
        state.deliver(WatchEvent::Query(Vec::new()), &decode, &on_snapshot);
        state.cancel();

        assert_eq!(snapshots.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(unregistered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_from_inside_callback() {
        let state = Arc::new(SubscriptionState::new(None));
        let snapshots = Arc::new(AtomicUsize::new(0));

        let decode = identity();
        let inner = state.clone();
        let counter = snapshots.clone();
        let on_snapshot = move |_: WatchEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.cancel();
        };

        state.deliver(WatchEvent::Query(Vec::new()), &decode, &on_snapshot);
        state.deliver(WatchEvent::Query(Vec::new()), &decode, &on_snapshot);

        assert_eq!(snapshots.load(Ordering::SeqCst), 1);
        assert!(!state.is_live());
    }
}
