use std::future::Future;
use std::iter::Take;
use std::time::Duration;

use rand::Rng;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::grpc::{Code, Status};

/// Exponential backoff with full jitter.
///
/// Each step yields a random duration within the current envelope,
/// then grows the envelope by `factor` up to `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    factor: u64,
    max_delay: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn from_millis(base: u64) -> ExponentialBackoff {
        ExponentialBackoff {
            current: Duration::from_millis(base.max(1)),
            factor: 2,
            max_delay: None,
        }
    }

    pub fn factor(mut self, factor: u64) -> ExponentialBackoff {
        self.factor = factor.max(1);
        self
    }

    pub fn max_delay(mut self, max_delay: Option<Duration>) -> ExponentialBackoff {
        self.max_delay = max_delay;
        self
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let envelope = self.current.as_millis() as u64;
        let jittered = Duration::from_millis(rand::thread_rng().gen_range(1..=envelope));

        self.current = match envelope.checked_mul(self.factor) {
            Some(next) => Duration::from_millis(next),
            None => Duration::from_millis(u64::MAX),
        };
        if let Some(max_delay) = self.max_delay {
            if self.current > max_delay {
                self.current = max_delay;
            }
        }

        Some(jittered)
    }
}

pub trait TryAs<T> {
    fn try_as(&self) -> Result<&T, ()>;
}

impl TryAs<Status> for Status {
    fn try_as(&self) -> Result<&Status, ()> {
        Ok(self)
    }
}

pub trait Predicate<E> {
    fn should_retry(&mut self, error: &E) -> bool;
}

pub trait Retry<E: TryAs<Status>, T: Predicate<E>> {
    fn strategy(&self) -> Take<ExponentialBackoff>;
    fn predicate(&self) -> T;
}

/// Retries every error whose gRPC code is in the allowed set.
pub struct CodePredicate {
    codes: Vec<Code>,
}

impl CodePredicate {
    pub fn new(codes: Vec<Code>) -> Self {
        Self { codes }
    }
}

impl<E> Predicate<E> for CodePredicate
where
    E: TryAs<Status>,
{
    fn should_retry(&mut self, error: &E) -> bool {
        match error.try_as() {
            Ok(status) => self.codes.contains(&status.code()),
            Err(()) => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetrySetting {
    pub from_millis: u64,
    pub max_delay: Option<Duration>,
    pub factor: u64,
    pub take: usize,
    pub codes: Vec<Code>,
}

impl Retry<Status, CodePredicate> for RetrySetting {
    fn strategy(&self) -> Take<ExponentialBackoff> {
        ExponentialBackoff::from_millis(self.from_millis)
            .factor(self.factor)
            .max_delay(self.max_delay)
            .take(self.take)
    }

    fn predicate(&self) -> CodePredicate {
        CodePredicate::new(self.codes.clone())
    }
}

impl Default for RetrySetting {
    fn default() -> Self {
        Self {
            from_millis: 10,
            max_delay: Some(Duration::from_secs(1)),
            factor: 2,
            take: 5,
            codes: vec![Code::Unavailable, Code::Unknown, Code::Aborted],
        }
    }
}

pub async fn invoke<A, R, RT, C, E>(
    cancel: Option<CancellationToken>,
    retry: Option<RT>,
    mut a: impl FnMut() -> A,
) -> Result<R, E>
where
    E: TryAs<Status> + From<Status>,
    A: Future<Output = Result<R, E>>,
    C: Predicate<E>,
    RT: Retry<E, C> + Default,
{
    let fn_loop = async {
        let retry = retry.unwrap_or_default();
        let mut strategy = retry.strategy();
        loop {
            let error = match a().await {
                Ok(s) => return Ok(s),
                Err(e) => e,
            };
            if !retry.predicate().should_retry(&error) {
                return Err(error);
            }
            match strategy.next() {
                None => return Err(error),
                Some(duration) => {
                    tracing::trace!("retry after {:?}", duration);
                    tokio::time::sleep(duration).await
                }
            };
        }
    };

    match cancel {
        Some(cancel) => {
            select! {
                _ = cancel.cancelled() => Err(Status::cancelled("client cancel").into()),
                v = fn_loop => v
            }
        }
        None => fn_loop.await,
    }
}

/// Retry loop for callables that must get their argument back on
/// failure (gRPC clients are consumed per call attempt).
pub async fn invoke_fn<R, V, A, RT, C, E>(
    cancel: Option<CancellationToken>,
    retry: Option<RT>,
    mut f: impl FnMut(V) -> A,
    mut v: V,
) -> Result<R, E>
where
    E: TryAs<Status> + From<Status>,
    A: Future<Output = Result<R, (E, V)>>,
    C: Predicate<E>,
    RT: Retry<E, C> + Default,
{
    let fn_loop = async {
        let retry = retry.unwrap_or_default();
        let mut strategy = retry.strategy();
        loop {
            let error = match f(v).await {
                Ok(s) => return Ok(s),
                Err(e) => {
                    v = e.1;
                    e.0
                }
            };
            if !retry.predicate().should_retry(&error) {
                return Err(error);
            }
            match strategy.next() {
                None => return Err(error),
                Some(duration) => {
                    tracing::trace!("retry after {:?}", duration);
                    tokio::time::sleep(duration).await
                }
            };
        }
    };

    match cancel {
        Some(cancel) => {
            select! {
                _ = cancel.cancelled() => Err(Status::cancelled("client cancel").into()),
                v = fn_loop => v
            }
        }
        None => fn_loop.await,
    }
}
