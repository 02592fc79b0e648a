use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use loglite_gax::grpc::Status;
use loglite_gax::retry::{Predicate, Retry, RetrySetting};

use crate::service::{Health, Service};

/// Write half of a raw bidirectional stream.
#[async_trait]
pub trait StreamWrite<Req>: Send + 'static {
    async fn write(&mut self, req: Req) -> Result<(), Status>;
}

/// Read half of a raw bidirectional stream. `Ok(None)` means the
/// server half-closed the stream.
#[async_trait]
pub trait StreamRead<Resp>: Send + 'static {
    async fn read(&mut self) -> Result<Option<Resp>, Status>;
}

/// Produces fresh raw bidirectional streams, already started.
#[async_trait]
pub trait BidiStreamFactory: Send + Sync + 'static {
    type Req: Send + 'static;
    type Resp: Send + 'static;
    type Write: StreamWrite<Self::Req>;
    type Read: StreamRead<Self::Resp>;

    async fn connect(&self) -> Result<(Self::Write, Self::Read), Status>;
}

/// Performs the opening handshake on a freshly connected raw stream.
/// Runs before the stream is handed to users; a failure sends the
/// connection attempt back into the retry loop.
#[async_trait]
pub trait StreamInitializer<F: BidiStreamFactory>: Send + Sync + 'static {
    async fn initialize(&self, write: &mut F::Write, read: &mut F::Read) -> Result<(), Status>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StreamState {
    Connecting,
    Connected(u64),
    Terminated,
}

struct ConnectedHalf<T> {
    generation: u64,
    inner: T,
}

struct StreamShared<F: BidiStreamFactory, I> {
    factory: Arc<F>,
    initializer: I,
    retry: RetrySetting,
    health: Health,
    state: watch::Sender<StreamState>,
    // Each half lives in its slot while idle and is borrowed under the
    // slot lock for the duration of a raw call. Holding the lock across
    // the call enforces the single-pending-read / single-pending-write
    // contract, and the reconnect task cannot finish a stream before
    // outstanding raw calls drain because it must take both slots.
    write_half: Mutex<Option<ConnectedHalf<F::Write>>>,
    read_half: Mutex<Option<ConnectedHalf<F::Read>>>,
    repair_tx: mpsc::UnboundedSender<Status>,
}

/// A bidirectional stream that transparently reconnects.
///
/// `write` and `read` resolve with sentinel values (`false` / `None`)
/// while a reconnect is in progress; the caller is expected to reissue
/// the call, which then lands on the fresh stream. A permanent
/// connection failure aborts the owning [`Health`] latch.
pub struct ResumableStream<F: BidiStreamFactory, I> {
    shared: Arc<StreamShared<F, I>>,
    cancel: CancellationToken,
    repair_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Status>>>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<F, I> ResumableStream<F, I>
where
    F: BidiStreamFactory,
    I: StreamInitializer<F>,
{
    pub fn new(factory: Arc<F>, initializer: I, retry: RetrySetting, health: Health) -> Self {
        let (state, _) = watch::channel(StreamState::Connecting);
        let (repair_tx, repair_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(StreamShared {
                factory,
                initializer,
                retry,
                health,
                state,
                write_half: Mutex::new(None),
                read_half: Mutex::new(None),
                repair_tx,
            }),
            cancel: CancellationToken::new(),
            repair_rx: parking_lot::Mutex::new(Some(repair_rx)),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Writes one request. `true` means the request reached the current
    /// raw stream. `false` means the stream is being replaced or has
    /// shut down; queued state should be reissued once reconnected.
    pub async fn write(&self, req: F::Req) -> bool {
        let mut rx = self.shared.state.subscribe();
        let generation = {
            let state = *rx.borrow_and_update();
            match state {
                StreamState::Terminated => return false,
                StreamState::Connecting => {
                    // held until the stream is usable again, then the
                    // caller reissues against the new stream
                    let _ = rx.changed().await;
                    return false;
                }
                StreamState::Connected(generation) => generation,
            }
        };

        let mut slot = self.shared.write_half.lock().await;
        match slot.as_mut() {
            Some(half) if half.generation == generation => {
                // raced against state changes so shutdown and repairs
                // initiated by the other half release a pending write
                let result = tokio::select! {
                    result = half.inner.write(req) => result,
                    _ = rx.changed() => return false,
                };
                match result {
                    Ok(()) => true,
                    Err(status) => {
                        *slot = None;
                        drop(slot);
                        tracing::debug!("stream write failed: {status}");
                        let _ = self.shared.repair_tx.send(status);
                        self.await_repair(generation, &mut rx).await;
                        false
                    }
                }
            }
            // the stream was replaced while we waited for the slot
            _ => false,
        }
    }

    /// Reads one response. `None` means the stream is being replaced
    /// (reissue the read) or has shut down.
    pub async fn read(&self) -> Option<F::Resp> {
        let mut rx = self.shared.state.subscribe();
        let generation = {
            let state = *rx.borrow_and_update();
            match state {
                StreamState::Terminated => return None,
                StreamState::Connecting => {
                    let _ = rx.changed().await;
                    return None;
                }
                StreamState::Connected(generation) => generation,
            }
        };

        let mut slot = self.shared.read_half.lock().await;
        match slot.as_mut() {
            Some(half) if half.generation == generation => {
                let result = tokio::select! {
                    result = half.inner.read() => result,
                    _ = rx.changed() => return None,
                };
                let failure = match result {
                    Ok(Some(resp)) => return Some(resp),
                    Ok(None) => Status::aborted("stream closed by server"),
                    Err(status) => status,
                };
                *slot = None;
                drop(slot);
                tracing::debug!("stream read failed: {failure}");
                let _ = self.shared.repair_tx.send(failure);
                self.await_repair(generation, &mut rx).await;
                None
            }
            _ => None,
        }
    }

    async fn await_repair(&self, failed_generation: u64, rx: &mut watch::Receiver<StreamState>) {
        loop {
            match *rx.borrow_and_update() {
                StreamState::Terminated => return,
                StreamState::Connected(generation) if generation != failed_generation => return,
                _ => {}
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl<F, I> Service for ResumableStream<F, I>
where
    F: BidiStreamFactory,
    I: StreamInitializer<F>,
{
    fn start(&self) {
        let repair_rx = match self.repair_rx.lock().take() {
            Some(rx) => rx,
            None => return,
        };
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        *self.task.lock() = Some(tokio::spawn(run_connection(shared, repair_rx, cancel)));
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.shared.state.send_replace(StreamState::Terminated);
        // drop idle halves so the transport tears the stream down
        if let Ok(mut slot) = self.shared.write_half.try_lock() {
            *slot = None;
        }
        if let Ok(mut slot) = self.shared.read_half.try_lock() {
            *slot = None;
        }
    }
}

/// One task per stream owns the connect/initialize/retry cycle.
async fn run_connection<F, I>(
    shared: Arc<StreamShared<F, I>>,
    mut repair_rx: mpsc::UnboundedReceiver<Status>,
    cancel: CancellationToken,
) where
    F: BidiStreamFactory,
    I: StreamInitializer<F>,
{
    let mut generation: u64 = 0;
    loop {
        let (mut write_slot, mut read_slot) = tokio::select! {
            _ = cancel.cancelled() => break,
            slots = async {
                let write = shared.write_half.lock().await;
                let read = shared.read_half.lock().await;
                (write, read)
            } => slots,
        };
        *write_slot = None;
        *read_slot = None;
        // failure reports for the stream we just tore down
        while repair_rx.try_recv().is_ok() {}

        match establish(&shared, &cancel).await {
            Some(Ok((write, read))) => {
                generation += 1;
                *write_slot = Some(ConnectedHalf {
                    generation,
                    inner: write,
                });
                *read_slot = Some(ConnectedHalf {
                    generation,
                    inner: read,
                });
                drop(read_slot);
                drop(write_slot);
                shared.state.send_replace(StreamState::Connected(generation));
                tracing::debug!("stream connected (generation {generation})");
            }
            Some(Err(status)) => {
                drop(read_slot);
                drop(write_slot);
                tracing::error!("stream failed permanently: {status}");
                shared.health.abort(status);
                break;
            }
            None => break,
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = repair_rx.recv() => match signal {
                Some(status) => {
                    tracing::debug!("stream lost ({status}); reconnecting");
                    shared.state.send_replace(StreamState::Connecting);
                }
                None => break,
            }
        }
    }
    shared.state.send_replace(StreamState::Terminated);
}

/// Runs connect + handshake under the retry policy. `None` means the
/// attempt was cancelled by shutdown.
async fn establish<F, I>(
    shared: &StreamShared<F, I>,
    cancel: &CancellationToken,
) -> Option<Result<(F::Write, F::Read), Status>>
where
    F: BidiStreamFactory,
    I: StreamInitializer<F>,
{
    let mut strategy = shared.retry.strategy();
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        let status = match shared.factory.connect().await {
            Ok((mut write, mut read)) => {
                match shared.initializer.initialize(&mut write, &mut read).await {
                    Ok(()) => return Some(Ok((write, read))),
                    Err(status) => status,
                }
            }
            Err(status) => status,
        };
        if !shared.retry.predicate().should_retry(&status) {
            return Some(Err(status));
        }
        match strategy.next() {
            None => return Some(Err(status)),
            Some(delay) => {
                tracing::trace!("stream connect failed ({status}); retry in {delay:?}");
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
