use crate::power;
use crate::power::PowerNotifier;
use crate::reset::IdleReset;
use crate::reset::XdgScreensaverReset;
use crate::waiter::StopWaiter;
use crate::waiter::WaitOutcome;
use std::io;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::error;

/// Shorter than typical screensaver idle timeouts (commonly 60s or more) so
/// a reset always lands before activation, while keeping helper spawns rare.
const RESET_INTERVAL: Duration = Duration::from_secs(30);

const LOOP_THREAD_NAME: &str = "screensaver-inhibit";

/// One logical "keep the system awake" request.
///
/// While active, an `Inhibitor` holds a power-service inhibition and runs a
/// background thread that resets the screensaver idle timer every
/// [`RESET_INTERVAL`]. Toggling is done through [`Inhibitor::set_active`];
/// dropping an active inhibitor deactivates it first, so the background
/// thread is never leaked.
pub struct Inhibitor {
    reason: String,
    active: bool,
    waiter: Arc<StopWaiter>,
    thread: Option<JoinHandle<()>>,
    notifier: Box<dyn PowerNotifier>,
    resetter: Arc<dyn IdleReset>,
    reset_interval: Duration,
    spawner: Box<dyn TaskSpawner>,
}

impl Inhibitor {
    /// Inhibitor with the default reset helper and whichever power-management
    /// notifier the session supports. Construction never fails; it performs
    /// no inhibition until activated.
    pub fn new(reason: impl Into<String>) -> Self {
        Self::builder(reason).build()
    }

    pub fn builder(reason: impl Into<String>) -> InhibitorBuilder {
        InhibitorBuilder {
            reason: reason.into(),
            reset_interval: RESET_INTERVAL,
            resetter: None,
            notifier: None,
            spawner: None,
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Toggle inhibition. Returns `false` without side effects when `active`
    /// already equals the current state, so repeated toggles to the same
    /// value are harmless no-ops.
    ///
    /// Activation spawns the reset loop; if the thread cannot be started the
    /// error is logged, the state is left unchanged, and `false` is returned
    /// (the caller may retry). Deactivation signals the loop and joins it, so
    /// no reset runs after this method returns. Either way the
    /// power-management service is notified first, and that notification is
    /// deliberately not rolled back when a thread start fails afterwards.
    pub fn set_active(&mut self, active: bool) -> bool {
        if self.active == active {
            return false;
        }

        // Service-level inhibition takes effect promptly regardless of the
        // thread path's state.
        self.notifier.notify(&self.reason, active);

        if active {
            let waiter = Arc::clone(&self.waiter);
            let resetter = Arc::clone(&self.resetter);
            let interval = self.reset_interval;
            let body = move || run_reset_loop(&waiter, resetter.as_ref(), interval);
            match self.spawner.spawn(LOOP_THREAD_NAME, Box::new(body)) {
                Ok(handle) => self.thread = Some(handle),
                Err(error) => {
                    error!(reason = %error, "Failed to create screensaver inhibitor thread");
                    return false;
                }
            }
        } else {
            self.waiter.signal();
            if let Some(handle) = self.thread.take() {
                // Blocks for at most one wait interval plus one helper run.
                if handle.join().is_err() {
                    error!("Screensaver inhibitor thread panicked");
                }
            }
        }

        self.active = active;
        true
    }
}

impl Drop for Inhibitor {
    fn drop(&mut self) {
        self.set_active(false);
    }
}

/// Builds an [`Inhibitor`] with a non-default reset cadence, reset invoker,
/// or power notifier. Embedders that drive their own inhibit mechanism plug
/// it in here; everything left unset falls back to the defaults
/// [`Inhibitor::new`] uses.
pub struct InhibitorBuilder {
    reason: String,
    reset_interval: Duration,
    resetter: Option<Arc<dyn IdleReset>>,
    notifier: Option<Box<dyn PowerNotifier>>,
    spawner: Option<Box<dyn TaskSpawner>>,
}

impl InhibitorBuilder {
    pub fn reset_interval(mut self, interval: Duration) -> Self {
        self.reset_interval = interval;
        self
    }

    pub fn resetter(mut self, resetter: Arc<dyn IdleReset>) -> Self {
        self.resetter = Some(resetter);
        self
    }

    pub fn notifier(mut self, notifier: Box<dyn PowerNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[cfg(test)]
    fn task_spawner(mut self, spawner: Box<dyn TaskSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn build(self) -> Inhibitor {
        Inhibitor {
            reason: self.reason,
            active: false,
            waiter: Arc::new(StopWaiter::new()),
            thread: None,
            notifier: self.notifier.unwrap_or_else(power::detect),
            resetter: self
                .resetter
                .unwrap_or_else(|| Arc::new(XdgScreensaverReset::new())),
            reset_interval: self.reset_interval,
            spawner: self.spawner.unwrap_or_else(|| Box::new(ThreadSpawner)),
        }
    }
}

fn run_reset_loop(waiter: &StopWaiter, resetter: &dyn IdleReset, interval: Duration) {
    while waiter.wait(interval) == WaitOutcome::TimedOut {
        resetter.reset_idle_timer();
    }
}

trait TaskSpawner: Send {
    fn spawn(
        &self,
        name: &str,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<JoinHandle<()>>;
}

struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
    fn spawn(
        &self,
        name: &str,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(body)
    }
}

#[cfg(test)]
mod tests {
    use super::Inhibitor;
    use super::TaskSpawner;
    use crate::power::PowerNotifier;
    use crate::reset::IdleReset;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::thread::JoinHandle;
    use std::time::Duration;
    use std::time::Instant;
    use tracing::warn;

    #[derive(Default)]
    struct CountingReset {
        calls: AtomicUsize,
    }

    impl CountingReset {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IdleReset for CountingReset {
        fn reset_idle_timer(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Simulates a reset helper whose spawn keeps failing: it logs the
    /// warning and otherwise does nothing, like the real invoker.
    #[derive(Default)]
    struct FailingReset {
        calls: AtomicUsize,
    }

    impl IdleReset for FailingReset {
        fn reset_idle_timer(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            warn!("Failed to create xdg-screensaver");
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notifications: Arc<Mutex<Vec<(String, bool)>>>,
    }

    impl PowerNotifier for RecordingNotifier {
        fn notify(&mut self, reason: &str, active: bool) {
            if let Ok(mut notifications) = self.notifications.lock() {
                notifications.push((reason.to_string(), active));
            }
        }
    }

    #[derive(Default)]
    struct CountingSpawner {
        spawned: Arc<AtomicUsize>,
    }

    impl TaskSpawner for CountingSpawner {
        fn spawn(
            &self,
            name: &str,
            body: Box<dyn FnOnce() + Send + 'static>,
        ) -> io::Result<JoinHandle<()>> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            std::thread::Builder::new().name(name.to_string()).spawn(body)
        }
    }

    struct FailingSpawner;

    impl TaskSpawner for FailingSpawner {
        fn spawn(
            &self,
            _name: &str,
            _body: Box<dyn FnOnce() + Send + 'static>,
        ) -> io::Result<JoinHandle<()>> {
            Err(io::Error::other("thread limit reached"))
        }
    }

    fn test_inhibitor(
        reason: &str,
        resetter: Arc<dyn IdleReset>,
    ) -> (Inhibitor, Arc<Mutex<Vec<(String, bool)>>>) {
        let notifier = RecordingNotifier::default();
        let notifications = Arc::clone(&notifier.notifications);
        let inhibitor = Inhibitor::builder(reason)
            .reset_interval(Duration::from_millis(10))
            .resetter(resetter)
            .notifier(Box::new(notifier))
            .build();
        (inhibitor, notifications)
    }

    fn wait_for_calls(resetter: &CountingReset, at_least: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while resetter.calls() < at_least {
            assert!(
                Instant::now() < deadline,
                "reset invoker never reached {at_least} calls"
            );
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn activating_twice_is_a_noop() {
        let spawner = CountingSpawner::default();
        let spawned = Arc::clone(&spawner.spawned);
        let resetter = Arc::new(CountingReset::default());
        let mut inhibitor = Inhibitor::builder("recording")
            .reset_interval(Duration::from_millis(10))
            .resetter(resetter)
            .notifier(Box::new(RecordingNotifier::default()))
            .task_spawner(Box::new(spawner))
            .build();

        assert!(inhibitor.set_active(true));
        assert!(!inhibitor.set_active(true));
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert!(inhibitor.set_active(false));
    }

    #[test]
    fn deactivating_an_inactive_inhibitor_is_a_noop() {
        let spawner = CountingSpawner::default();
        let spawned = Arc::clone(&spawner.spawned);
        let (notifications, mut inhibitor) = {
            let notifier = RecordingNotifier::default();
            let notifications = Arc::clone(&notifier.notifications);
            let inhibitor = Inhibitor::builder("recording")
                .resetter(Arc::new(CountingReset::default()))
                .notifier(Box::new(notifier))
                .task_spawner(Box::new(spawner))
                .build();
            (notifications, inhibitor)
        };

        assert!(!inhibitor.set_active(false));
        assert_eq!(spawned.load(Ordering::SeqCst), 0);
        assert!(notifications.lock().is_ok_and(|n| n.is_empty()));
    }

    #[test]
    fn deactivation_joins_the_loop() {
        let resetter = Arc::new(CountingReset::default());
        let (mut inhibitor, _) = test_inhibitor("recording", resetter.clone());

        assert!(inhibitor.set_active(true));
        assert!(inhibitor.is_active());
        wait_for_calls(&resetter, 1);

        assert!(inhibitor.set_active(false));
        assert!(!inhibitor.is_active());
        let after_join = resetter.calls();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(resetter.calls(), after_join);
    }

    #[test]
    fn drop_deactivates_a_running_inhibitor() {
        let resetter = Arc::new(CountingReset::default());
        let (mut inhibitor, notifications) =
            test_inhibitor("recording", resetter.clone());

        assert!(inhibitor.set_active(true));
        wait_for_calls(&resetter, 1);
        drop(inhibitor);

        let after_drop = resetter.calls();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(resetter.calls(), after_drop);
        match notifications.lock() {
            Ok(notifications) => {
                assert_eq!(
                    *notifications,
                    vec![
                        ("recording".to_string(), true),
                        ("recording".to_string(), false)
                    ]
                );
            }
            Err(_) => panic!("notifications poisoned"),
        }
    }

    #[test]
    fn loop_survives_repeated_reset_failures() {
        let resetter = Arc::new(FailingReset::default());
        let notifier = RecordingNotifier::default();
        let mut inhibitor = Inhibitor::builder("recording")
            .reset_interval(Duration::from_millis(10))
            .resetter(resetter.clone())
            .notifier(Box::new(notifier))
            .build();

        assert!(inhibitor.set_active(true));
        let deadline = Instant::now() + Duration::from_secs(5);
        while resetter.calls.load(Ordering::SeqCst) < 3 {
            assert!(Instant::now() < deadline, "loop stopped after a failure");
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(inhibitor.is_active());
        assert!(inhibitor.set_active(false));
    }

    #[test]
    fn failed_thread_start_leaves_state_unchanged() {
        let notifier = RecordingNotifier::default();
        let notifications = Arc::clone(&notifier.notifications);
        let mut inhibitor = Inhibitor::builder("recording")
            .resetter(Arc::new(CountingReset::default()))
            .notifier(Box::new(notifier))
            .task_spawner(Box::new(FailingSpawner))
            .build();

        assert!(!inhibitor.set_active(true));
        assert!(!inhibitor.is_active());
        // The service is still notified before the start attempt; that
        // ordering is part of the contract and not rolled back.
        match notifications.lock() {
            Ok(notifications) => {
                assert_eq!(*notifications, vec![("recording".to_string(), true)]);
            }
            Err(_) => panic!("notifications poisoned"),
        }
        // The failed activation is retryable and deactivation stays a no-op.
        assert!(!inhibitor.set_active(false));
    }

    #[test]
    fn full_activation_cycle() {
        let resetter = Arc::new(CountingReset::default());
        let (mut inhibitor, notifications) =
            test_inhibitor("recording", resetter.clone());
        assert_eq!(inhibitor.reason(), "recording");

        assert!(inhibitor.set_active(true));
        wait_for_calls(&resetter, 2);

        assert!(inhibitor.set_active(false));
        let after_join = resetter.calls();
        assert!(after_join >= 2);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(resetter.calls(), after_join);

        drop(inhibitor);
        match notifications.lock() {
            Ok(notifications) => {
                assert_eq!(
                    *notifications,
                    vec![
                        ("recording".to_string(), true),
                        ("recording".to_string(), false)
                    ]
                );
            }
            Err(_) => panic!("notifications poisoned"),
        }
    }
}
