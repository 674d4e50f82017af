//! In-memory [`Transport`] for tests and demonstrations.
//!
//! `LoopbackTransport` behaves like a tiny broker. Messages are encoded to
//! their wire form on send, so nothing is shared with the sender afterwards.
//! A [`Responder`] attached to a request destination answers each request on
//! its `reply_to` destination from a spawned task, after an optional delay.
//! Every operation is recorded, and failures can be injected per operation.

use std::{
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use log::error;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    destination::DestinationRef,
    message::{CORRELATION_ID, Message},
    transport::{ReplyCallback, Transport, TransportError},
};

/// How a [`Responder`] answers requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponderMode {
    /// Echo the payload with the request's correlation key.
    #[default]
    Echo,
    /// Echo the payload with a different correlation key.
    Mismatch,
    /// Echo the payload without any correlation header.
    Uncorrelated,
    /// Never answer.
    Silent,
}

/// Simulated remote party answering requests on a destination.
#[derive(Debug, Clone)]
pub struct Responder {
    mode: ResponderMode,
    delay: Duration,
    header: String,
}

impl Responder {
    /// Answer immediately in `mode`, echoing keys in [`CORRELATION_ID`].
    #[must_use]
    pub fn new(mode: ResponderMode) -> Self {
        Self {
            mode,
            delay: Duration::ZERO,
            header: CORRELATION_ID.to_owned(),
        }
    }

    /// Wait `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Echo keys in `header` instead.
    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Build the reply to `request`, or `None` if this responder stays silent.
    ///
    /// The echoed key is the request's correlation header, falling back to
    /// its message identifier.
    #[must_use]
    pub fn respond(&self, request: &Message) -> Option<Message> {
        let key = request
            .header_text(&self.header)
            .unwrap_or_else(|| request.id().as_str())
            .to_owned();
        let reply = Message::new(request.payload().clone());
        match self.mode {
            ResponderMode::Echo => Some(reply.with_header(self.header.clone(), key)),
            ResponderMode::Mismatch => {
                Some(reply.with_header(self.header.clone(), format!("{key}-mismatch")))
            }
            ResponderMode::Uncorrelated => Some(reply),
            ResponderMode::Silent => None,
        }
    }
}

#[derive(Default)]
struct Faults {
    create: AtomicBool,
    delete: AtomicBool,
    send: AtomicBool,
    listen: AtomicBool,
}

fn injected(flag: &AtomicBool, operation: &str) -> Result<(), TransportError> {
    if flag.load(Ordering::SeqCst) {
        return Err(TransportError::Rejected(format!("injected {operation} failure")));
    }
    Ok(())
}

struct Inner {
    listeners: DashMap<DestinationRef, ReplyCallback>,
    responders: DashMap<DestinationRef, Responder>,
    ephemeral: DashSet<DestinationRef>,
    created: AtomicUsize,
    listens: AtomicUsize,
    deleted: Mutex<Vec<DestinationRef>>,
    delete_delay: Mutex<Duration>,
    sent: Mutex<Vec<(DestinationRef, Message)>>,
    faults: Faults,
    responses: TaskTracker,
}

/// In-memory broker implementing [`Transport`].
///
/// Cloning yields another handle to the same broker.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::Duration};
///
/// use replygate::{
///     Message,
///     SyncGateway,
///     loopback::{LoopbackTransport, Responder, ResponderMode},
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> replygate::Result<()> {
/// let transport = Arc::new(LoopbackTransport::new());
/// transport.attach_responder("echo", Responder::new(ResponderMode::Echo));
///
/// let gateway = SyncGateway::builder(Arc::clone(&transport))
///     .destination("echo")
///     .polling_interval(Duration::from_millis(5))
///     .build()
///     .expect("valid configuration");
///
/// let reply = gateway.exchange(Message::new("hello")).await?;
/// assert_eq!(reply.payload().as_ref(), b"hello");
/// assert_eq!(transport.live_ephemeral_count(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LoopbackTransport(Arc<Inner>);

impl Default for LoopbackTransport {
    fn default() -> Self { Self::new() }
}

impl LoopbackTransport {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            listeners: DashMap::new(),
            responders: DashMap::new(),
            ephemeral: DashSet::new(),
            created: AtomicUsize::new(0),
            listens: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            delete_delay: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
            faults: Faults::default(),
            responses: TaskTracker::new(),
        }))
    }

    /// Answer requests sent to `destination` with `responder`.
    pub fn attach_responder(&self, destination: impl Into<String>, responder: Responder) {
        self.0
            .responders
            .insert(DestinationRef::new(destination), responder);
    }

    /// Push `message` to the listener of `destination`, as a remote party
    /// would. Returns whether a listener received it.
    pub fn deliver(&self, destination: &DestinationRef, message: Message) -> bool {
        route(&self.0, destination, message)
    }

    /// Make [`Transport::create_ephemeral`] fail while `fail` is set.
    pub fn fail_create(&self, fail: bool) { self.0.faults.create.store(fail, Ordering::SeqCst); }

    /// Make [`Transport::delete`] fail while `fail` is set.
    pub fn fail_delete(&self, fail: bool) { self.0.faults.delete.store(fail, Ordering::SeqCst); }

    /// Make [`Transport::delete`] wait `delay` before removing anything.
    pub fn slow_delete(&self, delay: Duration) { *lock(&self.0.delete_delay) = delay; }

    /// Make [`Transport::send`] fail while `fail` is set.
    pub fn fail_send(&self, fail: bool) { self.0.faults.send.store(fail, Ordering::SeqCst); }

    /// Make [`Transport::listen`] fail while `fail` is set.
    pub fn fail_listen(&self, fail: bool) { self.0.faults.listen.store(fail, Ordering::SeqCst); }

    /// Number of ephemeral destinations created so far.
    #[must_use]
    pub fn created_count(&self) -> usize { self.0.created.load(Ordering::SeqCst) }

    /// Number of successful [`Transport::listen`] registrations.
    #[must_use]
    pub fn listen_count(&self) -> usize { self.0.listens.load(Ordering::SeqCst) }

    /// Destinations passed to [`Transport::delete`], in call order,
    /// including calls that failed.
    #[must_use]
    pub fn deleted(&self) -> Vec<DestinationRef> { lock(&self.0.deleted).clone() }

    /// Ephemeral destinations created and not yet deleted.
    #[must_use]
    pub fn live_ephemeral_count(&self) -> usize { self.0.ephemeral.len() }

    /// Messages accepted by [`Transport::send`], decoded from their wire form.
    #[must_use]
    pub fn sent(&self) -> Vec<(DestinationRef, Message)> { lock(&self.0.sent).clone() }

    /// Wait until every responder task spawned so far has finished.
    pub async fn settle(&self) {
        let tracker = &self.0.responses;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    /// Whether a listener is registered for `destination`.
    #[must_use]
    pub fn is_listening(&self, destination: &DestinationRef) -> bool {
        self.0.listeners.contains_key(destination)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn route(inner: &Inner, destination: &DestinationRef, message: Message) -> bool {
    // Clone the callback out so no shard lock is held while it runs.
    let callback = inner
        .listeners
        .get(destination)
        .map(|entry| Arc::clone(entry.value()));
    match callback {
        Some(callback) => {
            callback(message);
            true
        }
        None => {
            warn!(destination = %destination, "no listener for destination; message discarded");
            false
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(
        &self,
        destination: &DestinationRef,
        message: Message,
    ) -> Result<(), TransportError> {
        injected(&self.0.faults.send, "send")?;
        let bytes = message
            .to_bytes()
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        let (request, _) =
            Message::from_bytes(&bytes).map_err(|e| TransportError::Rejected(e.to_string()))?;
        lock(&self.0.sent).push((destination.clone(), request.clone()));
        debug!(destination = %destination, message_id = %request.id(), "loopback accepted message");

        let Some(responder) = self
            .0
            .responders
            .get(destination)
            .map(|entry| entry.value().clone())
        else {
            return Ok(());
        };
        let Some(reply_to) = request.reply_to().map(DestinationRef::new) else {
            return Ok(());
        };
        let inner = Arc::clone(&self.0);
        let respond = async move {
            if !responder.delay.is_zero() {
                tokio::time::sleep(responder.delay).await;
            }
            if let Some(reply) = responder.respond(&request) {
                route(&inner, &reply_to, reply);
            }
        };
        self.0.responses.spawn(async move {
            if let Err(panic) = std::panic::AssertUnwindSafe(respond).catch_unwind().await {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "<non-string panic>".to_owned());
                // Emit via both `log` and `tracing` for tests that capture either.
                error!("loopback responder panicked: panic={message}");
                tracing::error!(panic = %message, "loopback responder panicked");
            }
        });
        Ok(())
    }

    async fn create_ephemeral(&self) -> Result<DestinationRef, TransportError> {
        injected(&self.0.faults.create, "create")?;
        let destination = DestinationRef::new(format!("temp-reply-{}", Uuid::new_v4()));
        self.0.ephemeral.insert(destination.clone());
        self.0.created.fetch_add(1, Ordering::SeqCst);
        Ok(destination)
    }

    async fn delete(&self, destination: &DestinationRef) -> Result<(), TransportError> {
        lock(&self.0.deleted).push(destination.clone());
        injected(&self.0.faults.delete, "delete")?;
        let delay = *lock(&self.0.delete_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.0.ephemeral.remove(destination).is_none() {
            return Err(TransportError::UnknownDestination(destination.to_string()));
        }
        self.0.listeners.remove(destination);
        Ok(())
    }

    fn listen(
        &self,
        destination: &DestinationRef,
        callback: ReplyCallback,
    ) -> Result<(), TransportError> {
        injected(&self.0.faults.listen, "listen")?;
        self.0.listeners.insert(destination.clone(), callback);
        self.0.listens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
