use crate::task::{Completion, Task};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use storywriter_core::{StoryError, StoryResult};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Receiving end of the completion channel, held by the owning context.
pub type Completions<T> = mpsc::UnboundedReceiver<Completion<T>>;

struct QueueState<T> {
    tasks: VecDeque<Task<T>>,
    /// Whether a drain loop is alive. Only changed while holding the lock
    /// that guards `tasks`.
    draining: bool,
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    completions: mpsc::UnboundedSender<Completion<T>>,
    /// `true` while idle; flips to `false` when a drain starts.
    idle: watch::Sender<bool>,
}

/// Unbounded FIFO of LLM tasks with a single consumer.
///
/// States: idle (no drain loop) and draining. `enqueue` appends and, when
/// idle, starts a drain loop on the runtime. The loop pops and awaits one
/// task at a time and stops when it observes the queue empty.
///
/// The emptiness check and the `draining` flag flip happen under the same
/// lock as the push in `enqueue`, so a task can never be appended after the
/// loop decided to stop but before it cleared the flag.
///
/// No timeout is applied here; a backend call that never returns stalls the
/// queue unless the backend's HTTP client was built with one
/// (see `ClientSettings`).
pub struct TaskQueue<T> {
    shared: Arc<Shared<T>>,
    runtime: Handle,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Creates a queue whose drain loop runs on `runtime`.
    ///
    /// Completions arrive on the returned receiver in execution order.
    pub fn new(runtime: Handle) -> (Self, Completions<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (idle, _) = watch::channel(true);
        let queue = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    draining: false,
                }),
                completions: tx,
                idle,
            }),
            runtime,
        };
        (queue, rx)
    }

    /// Creates a queue on the runtime of the calling context.
    pub fn current() -> StoryResult<(Self, Completions<T>)> {
        let runtime = Handle::try_current()
            .map_err(|e| StoryError::Queue(format!("No Tokio runtime available: {e}")))?;
        Ok(Self::new(runtime))
    }

    /// Appends `task` to the tail. Safe to call from any thread, including
    /// while a drain is in progress.
    pub fn enqueue(&self, task: Task<T>) {
        let start = {
            let mut state = self.shared.state.lock();
            state.tasks.push_back(task);
            if state.draining {
                false
            } else {
                state.draining = true;
                self.shared.idle.send_replace(false);
                true
            }
        };

        if start {
            debug!("Starting task queue drain");
            self.runtime.spawn(drain(Arc::clone(&self.shared)));
        }
    }

    /// Number of tasks waiting to run (excluding the one executing).
    pub fn pending(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    /// Whether a drain loop is running.
    pub fn is_draining(&self) -> bool {
        self.shared.state.lock().draining
    }

    /// Resolves once the queue has drained every task and gone idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.idle.subscribe();
        // The sender lives in `shared`, which we hold, so this cannot close.
        let _ = rx.wait_for(|idle| *idle).await;
    }
}

async fn drain<T: Send + 'static>(shared: Arc<Shared<T>>) {
    let mut executed = 0usize;
    loop {
        let task = {
            let mut state = shared.state.lock();
            match state.tasks.pop_front() {
                Some(task) => task,
                None => {
                    state.draining = false;
                    shared.idle.send_replace(true);
                    break;
                }
            }
        };

        let (kind, backend, target) = task.into_parts();
        let name = backend.name().to_string();
        let failed = kind.failed_output("task panicked");
        let output = match AssertUnwindSafe(kind.run(backend.as_ref())).catch_unwind().await {
            Ok(output) => output,
            Err(_) => {
                error!(backend = %name, "Task panicked; reporting failure");
                failed
            }
        };

        let completion = Completion {
            target,
            backend: name,
            output,
        };
        if shared.completions.send(completion).is_err() {
            debug!("Completion receiver dropped; result discarded");
        }
        executed += 1;
    }
    info!(executed, "Task queue finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskOutput;
    use async_trait::async_trait;
    use std::time::Duration;
    use storywriter_llm::{BackendConfig, BackendKind, KoboldConfig, LlmBackend};

    /// Records start/end of every call and answers after `delay`.
    struct Recording {
        log: Arc<Mutex<Vec<String>>>,
        delay: Duration,
    }

    impl Recording {
        fn new(delay: Duration) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let backend = Arc::new(Self {
                log: Arc::clone(&log),
                delay,
            });
            (backend, log)
        }
    }

    #[async_trait]
    impl LlmBackend for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Kobold
        }
        async fn generate(&self, prompt: &str, _max_length: u32) -> String {
            self.log.lock().push(format!("start {prompt}"));
            tokio::time::sleep(self.delay).await;
            self.log.lock().push(format!("end {prompt}"));
            format!("re: {prompt}")
        }
        async fn count_tokens(&self, text: &str) -> i64 {
            self.log.lock().push(format!("count {text}"));
            text.split_whitespace().count() as i64
        }
        async fn test_connection(&self) -> bool {
            true
        }
        fn to_config(&self) -> BackendConfig {
            BackendConfig::Kobold(KoboldConfig {
                name: "recording".into(),
                address: String::new(),
                system_prompt: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn completions_arrive_in_enqueue_order_exactly_once() {
        let (backend, _log) = Recording::new(Duration::from_millis(2));
        let (queue, mut rx) = TaskQueue::new(Handle::current());

        for i in 0..10u32 {
            queue.enqueue(Task::generate(format!("p{i}"), backend.clone(), i));
        }
        queue.wait_idle().await;

        let mut targets = Vec::new();
        while let Ok(c) = rx.try_recv() {
            assert_eq!(c.output, TaskOutput::ResponseGenerated(format!("re: p{}", c.target)));
            targets.push(c.target);
        }
        assert_eq!(targets, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn tasks_never_overlap() {
        let (backend, log) = Recording::new(Duration::from_millis(10));
        let (queue, mut rx) = TaskQueue::new(Handle::current());

        queue.enqueue(Task::generate("a", backend.clone(), 1u8));
        queue.enqueue(Task::generate("b", backend.clone(), 2u8));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.target, second.target), (1, 2));
        assert_eq!(*log.lock(), vec!["start a", "end a", "start b", "end b"]);
    }

    #[tokio::test]
    async fn goes_idle_and_restarts() {
        let (backend, _log) = Recording::new(Duration::ZERO);
        let (queue, mut rx) = TaskQueue::new(Handle::current());
        assert!(!queue.is_draining());

        queue.enqueue(Task::count("one two", backend.clone(), 'a'));
        assert!(queue.is_draining());
        queue.wait_idle().await;
        assert!(!queue.is_draining());
        assert_eq!(queue.pending(), 0);
        assert_eq!(rx.recv().await.unwrap().output, TaskOutput::TokensCounted(2));

        queue.enqueue(Task::count("three", backend, 'b'));
        queue.wait_idle().await;
        let c = rx.recv().await.unwrap();
        assert_eq!((c.target, c.output), ('b', TaskOutput::TokensCounted(1)));
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_idle() {
        let (queue, _rx) = TaskQueue::<()>::new(Handle::current());
        tokio::time::timeout(Duration::from_secs(1), queue.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_producers_lose_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;

        let (backend, _log) = Recording::new(Duration::ZERO);
        let (queue, mut rx) = TaskQueue::new(Handle::current());

        let producers: Vec<_> = (0..THREADS)
            .map(|t| {
                let queue = queue.clone();
                let backend = backend.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        queue.enqueue(Task::count("x", backend.clone(), (t, i)));
                        if i % 16 == 0 {
                            std::thread::yield_now();
                        }
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut seen = vec![Vec::new(); THREADS];
        for _ in 0..THREADS * PER_THREAD {
            let c = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("a task was stranded")
                .unwrap();
            seen[c.target.0].push(c.target.1);
        }
        queue.wait_idle().await;

        // Every producer's tasks arrive once each, in that producer's order.
        for per_thread in seen {
            assert_eq!(per_thread, (0..PER_THREAD).collect::<Vec<_>>());
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_stall_queue() {
        let (backend, log) = Recording::new(Duration::ZERO);
        let (queue, rx) = TaskQueue::new(Handle::current());
        drop(rx);

        queue.enqueue(Task::count("a", backend.clone(), ()));
        queue.enqueue(Task::count("b", backend, ()));
        queue.wait_idle().await;
        assert_eq!(*log.lock(), vec!["count a", "count b"]);
    }

    /// Panics on every call.
    struct Exploding;

    #[async_trait]
    impl LlmBackend for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Kobold
        }
        async fn generate(&self, _prompt: &str, _max_length: u32) -> String {
            panic!("generate blew up")
        }
        async fn count_tokens(&self, _text: &str) -> i64 {
            panic!("count blew up")
        }
        async fn test_connection(&self) -> bool {
            true
        }
        fn to_config(&self) -> BackendConfig {
            BackendConfig::Kobold(KoboldConfig {
                name: "exploding".into(),
                address: String::new(),
                system_prompt: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn panicking_task_still_completes_with_sentinel() {
        let (backend, _log) = Recording::new(Duration::ZERO);
        let (queue, mut rx) = TaskQueue::new(Handle::current());

        queue.enqueue(Task::generate("p", Arc::new(Exploding), 1u8));
        queue.enqueue(Task::count("a b", Arc::new(Exploding), 2u8));
        queue.enqueue(Task::count("c d e", backend, 3u8));

        let mut completions = Vec::new();
        for _ in 0..3 {
            let c = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("completion not delivered")
                .unwrap();
            completions.push(c);
        }

        assert_eq!(completions[0].target, 1);
        assert_eq!(completions[0].backend, "exploding");
        match &completions[0].output {
            TaskOutput::ResponseGenerated(text) => {
                assert!(text.starts_with(storywriter_core::GENERATION_ERROR_PREFIX));
            }
            other => panic!("unexpected output {other:?}"),
        }
        assert_eq!(
            (completions[1].target, &completions[1].output),
            (2, &TaskOutput::TokensCounted(-1))
        );
        assert_eq!(
            (completions[2].target, &completions[2].output),
            (3, &TaskOutput::TokensCounted(3))
        );
        queue.wait_idle().await;
        assert!(!queue.is_draining());
    }

    #[test]
    fn current_without_runtime_is_queue_error() {
        let err = TaskQueue::<()>::current().err().unwrap();
        assert!(matches!(err, StoryError::Queue(_)));
    }
}
