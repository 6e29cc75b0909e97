use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// A one-shot, broadcastable kill switch.
///
/// A `Fuse` starts armed and can be blown exactly once with [`Fuse::trigger`]. Any number of
/// clones can trigger it and any number of observers can wait on it with [`Fuse::watch`].
/// Observers that start watching after the fuse blew complete immediately, so there is no
/// missed wakeup.
#[derive(Clone, Debug)]
pub struct Fuse {
    state: Arc<watch::Sender<bool>>,
}

impl Default for Fuse {
    fn default() -> Self {
        Self::new()
    }
}

impl Fuse {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Blow the fuse. Returns `true` only for the call that actually blew it.
    pub fn trigger(&self) -> bool {
        self.state.send_if_modified(|blown| {
            if *blown {
                false
            } else {
                *blown = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.state.borrow()
    }

    /// A future that resolves once the fuse has blown.
    ///
    /// The future does not borrow the fuse and can be moved into other tasks.
    pub fn watch(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.state.subscribe();
        async move {
            // the sender lives as long as any Fuse clone, and the watcher may outlive all of
            // them; an orphaned watcher simply never fires.
            let orphaned = rx.wait_for(|blown| *blown).await.is_err();
            if orphaned {
                futures::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn watch_before_and_after_trigger() {
        let fuse = Fuse::new();
        let early = tokio::spawn(fuse.watch());
        assert!(!fuse.is_triggered());

        assert!(fuse.trigger());
        early.await.expect("early watcher panicked");

        // watching after the fact resolves immediately
        tokio::time::timeout(Duration::from_millis(100), fuse.watch())
            .await
            .expect("late watcher did not resolve");
    }

    #[tokio::test]
    async fn concurrent_triggers_blow_once() {
        let fuse = Fuse::new();
        let watchers: Vec<_> = (0..8).map(|_| tokio::spawn(fuse.watch())).collect();

        let triggers: Vec<_> = (0..16)
            .map(|_| {
                let fuse = fuse.clone();
                tokio::spawn(async move { fuse.trigger() })
            })
            .collect();

        let mut blown = 0;
        for trigger in triggers {
            if trigger.await.unwrap() {
                blown += 1;
            }
        }
        assert_eq!(blown, 1);
        assert!(fuse.is_triggered());

        for watcher in watchers {
            watcher.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn armed_fuse_keeps_waiting() {
        let fuse = Fuse::new();
        let res = tokio::time::timeout(Duration::from_secs(5), fuse.watch()).await;
        assert!(res.is_err());
    }
}
