//! Actor group: run long-lived subsystems as one unit.
//!
//! # Responsibilities
//! - Start every actor concurrently
//! - Stop everyone else as soon as one actor returns
//! - Report the first actor's result as the group's result
//!
//! # Design Decisions
//! - First returned wins; races are not resolved by severity
//! - `interrupt` must be idempotent and must not block
//! - The group waits for every actor, so no task outlives `run`

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tower::BoxError;

/// A long-running unit with a blocking `run` and an idempotent `interrupt`.
#[async_trait]
pub trait Actor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run until stopped naturally or interrupted.
    async fn run(&self) -> Result<(), BoxError>;

    /// Ask `run` to return early. `cause` is the result that ended the group.
    fn interrupt(&self, cause: Option<&BoxError>);
}

/// An ordered set of actors.
#[derive(Default)]
pub struct Group {
    actors: Vec<Arc<dyn Actor>>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, actor: Arc<dyn Actor>) {
        self.actors.push(actor);
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Run all actors. Returns once every actor has returned, with the result
    /// of the first one that did.
    pub async fn run(self) -> Result<(), BoxError> {
        if self.actors.is_empty() {
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for (index, actor) in self.actors.iter().enumerate() {
            let actor = actor.clone();
            tasks.spawn(async move { (index, actor.run().await) });
        }

        let (first_index, first) = match tasks.join_next().await {
            Some(Ok((index, result))) => (Some(index), result),
            Some(Err(join_error)) => (None, Err(BoxError::from(join_error))),
            None => (None, Ok(())),
        };

        match (&first, first_index) {
            (Ok(()), Some(index)) => {
                tracing::info!(actor = self.actors[index].name(), "Actor stopped, interrupting group");
            }
            (Err(err), Some(index)) => {
                tracing::error!(actor = self.actors[index].name(), error = %err, "Actor failed, interrupting group");
            }
            (Err(err), None) => {
                tracing::error!(error = %err, "Actor panicked, interrupting group");
            }
            (Ok(()), None) => {}
        }

        let cause = first.as_ref().err();
        for (index, actor) in self.actors.iter().enumerate() {
            if Some(index) != first_index {
                actor.interrupt(cause);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Err(err))) => {
                    tracing::debug!(actor = self.actors[index].name(), error = %err, "Actor exited with error after interrupt");
                }
                Ok(_) => {}
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Actor panicked during shutdown");
                }
            }
        }

        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Runs until interrupted.
    struct Blocking {
        stop: Notify,
        interrupts: AtomicUsize,
    }

    impl Blocking {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                stop: Notify::new(),
                interrupts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Actor for Blocking {
        fn name(&self) -> &str {
            "blocking"
        }

        async fn run(&self) -> Result<(), BoxError> {
            self.stop.notified().await;
            Ok(())
        }

        fn interrupt(&self, _cause: Option<&BoxError>) {
            self.interrupts.fetch_add(1, Ordering::SeqCst);
            self.stop.notify_one();
        }
    }

    struct Immediate(Result<(), &'static str>);

    #[async_trait]
    impl Actor for Immediate {
        fn name(&self) -> &str {
            "immediate"
        }

        async fn run(&self) -> Result<(), BoxError> {
            self.0.map_err(BoxError::from)
        }

        fn interrupt(&self, _cause: Option<&BoxError>) {}
    }

    #[tokio::test]
    async fn test_empty_group_returns_ok() {
        assert!(Group::new().run().await.is_ok());
    }

    #[tokio::test]
    async fn test_clean_exit_stops_everyone() {
        let blocking = Blocking::new();
        let mut group = Group::new();
        group.add(blocking.clone());
        group.add(Arc::new(Immediate(Ok(()))));

        let result = tokio::time::timeout(Duration::from_secs(5), group.run())
            .await
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(blocking.interrupts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_error_is_returned() {
        let blocking = Blocking::new();
        let mut group = Group::new();
        group.add(blocking.clone());
        group.add(Arc::new(Immediate(Err("boom"))));

        let err = group.run().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(blocking.interrupts.load(Ordering::SeqCst), 1);
    }

    struct Panicking;

    #[async_trait]
    impl Actor for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn run(&self) -> Result<(), BoxError> {
            panic!("actor exploded")
        }

        fn interrupt(&self, _cause: Option<&BoxError>) {}
    }

    #[tokio::test]
    async fn test_panicking_actor_is_an_error() {
        let blocking = Blocking::new();
        let mut group = Group::new();
        group.add(blocking.clone());
        group.add(Arc::new(Panicking));

        assert!(group.run().await.is_err());
        assert_eq!(blocking.interrupts.load(Ordering::SeqCst), 1);
    }
}
