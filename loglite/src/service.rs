use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use loglite_gax::grpc::Status;

use crate::util::clone_status;

/// A unit of background work with an explicit lifecycle.
///
/// `start` must not block; failures are reported through the
/// [`Health`] latch the service was constructed with.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn start(&self);

    /// Stops background work. Resolves once the service has fully
    /// stopped.
    async fn shutdown(&self);
}

enum Condition {
    Running,
    // None = clean shutdown, Some = first recorded failure
    Stopped(Option<Status>),
}

/// Shared latch answering "is this publisher still healthy?".
///
/// The first abort wins and is observable from every clone. A clean
/// shutdown stops the latch without recording a failure.
#[derive(Clone)]
pub struct Health {
    state: Arc<watch::Sender<Condition>>,
}

impl Health {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Condition::Running);
        Self { state: Arc::new(tx) }
    }

    /// Latches the first non-ok status. Idempotent.
    pub fn abort(&self, status: Status) {
        self.state.send_if_modified(|condition| {
            if matches!(condition, Condition::Running) {
                *condition = Condition::Stopped(Some(status));
                true
            } else {
                false
            }
        });
    }

    /// Stops the latch without recording a failure. Idempotent; a
    /// previously latched failure is kept.
    pub fn request_shutdown(&self) {
        self.state.send_if_modified(|condition| {
            if matches!(condition, Condition::Running) {
                *condition = Condition::Stopped(None);
                true
            } else {
                false
            }
        });
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.state.borrow(), Condition::Running)
    }

    /// Ok iff still running. After a stop the error carries the abort
    /// status, or a cancelled status for a clean shutdown.
    pub fn check(&self) -> Result<(), Status> {
        match &*self.state.borrow() {
            Condition::Running => Ok(()),
            Condition::Stopped(Some(status)) => Err(clone_status(status)),
            Condition::Stopped(None) => Err(Status::cancelled("publisher has been shut down")),
        }
    }

    /// Resolves once the latch stops: `Ok(())` for a clean shutdown,
    /// the latched status otherwise.
    pub async fn terminated(&self) -> Result<(), Status> {
        let mut rx = self.state.subscribe();
        loop {
            {
                let condition = rx.borrow_and_update();
                match &*condition {
                    Condition::Running => {}
                    Condition::Stopped(Some(status)) => return Err(clone_status(status)),
                    Condition::Stopped(None) => return Ok(()),
                }
            }
            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

struct CompositeInner {
    children: Vec<Arc<dyn Service>>,
    started: bool,
    shut_down: bool,
}

/// Aggregates child services into one start/shutdown unit reporting
/// into a single [`Health`] latch.
pub struct ServiceComposite {
    health: Health,
    inner: parking_lot::Mutex<CompositeInner>,
}

impl ServiceComposite {
    pub fn new(health: Health) -> Self {
        Self {
            health,
            inner: parking_lot::Mutex::new(CompositeInner {
                children: Vec::new(),
                started: false,
                shut_down: false,
            }),
        }
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    pub fn start(&self) {
        let children = {
            let mut inner = self.inner.lock();
            if inner.started || inner.shut_down {
                return;
            }
            inner.started = true;
            inner.children.clone()
        };
        for child in children {
            child.start();
        }
    }

    /// Attaches a child. While the composite is running the child is
    /// started under the same lock that shutdown collects children
    /// under, so shutdown reaches the child iff start did. Returns
    /// false when the composite is already shut down; the caller then
    /// keeps responsibility for the child's lifecycle.
    pub fn add_service(&self, child: Arc<dyn Service>) -> bool {
        let inner = &mut *self.inner.lock();
        if inner.shut_down {
            return false;
        }
        inner.children.push(child.clone());
        if inner.started {
            child.start();
        }
        true
    }

    pub fn abort(&self, status: Status) {
        self.health.abort(status);
    }

    pub fn status(&self) -> Result<(), Status> {
        self.health.check()
    }

    /// Idempotent. Requests a clean stop, shuts children down in
    /// attachment order, and resolves with the final status once every
    /// child shutdown has completed.
    pub async fn shutdown(&self) -> Result<(), Status> {
        self.health.request_shutdown();
        let children = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                Vec::new()
            } else {
                inner.shut_down = true;
                inner.children.clone()
            }
        };
        for child in children {
            child.shutdown().await;
        }
        self.health.terminated().await
    }
}
