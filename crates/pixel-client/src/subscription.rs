use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long `unsubscribe` waits for a clean close before aborting the task.
const UNSUBSCRIBE_GRACE: Duration = Duration::from_secs(2);

/// Handle to a running changefeed subscription.
///
/// `unsubscribe` asks the task to close its connection cleanly. Dropping the
/// handle without unsubscribing aborts the task.
pub struct Subscription {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawn `run` as the subscription task. It receives a stop signal that
    /// resolves when the handle is unsubscribed or dropped.
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(stop_rx));
        Self {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(UNSUBSCRIBE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
