//! Clearing the way before a package-manager process starts

use std::sync::Arc;
use std::time::Duration;

use lunaris_config::Config;
use lunaris_events::{EventEmitter, ProcessEvent};
use lunaris_platform::{PlatformContext, StaleProcessReaper};
use lunaris_types::HelperKind;

/// Kills helper and package-manager processes left by an earlier run and
/// waits for the package database lock to be released.
///
/// Runs before every process that touches the package database.
#[derive(Clone)]
pub struct Preflight {
    reaper: Arc<dyn StaleProcessReaper>,
    names: Vec<String>,
    settle_delay: Duration,
}

impl Preflight {
    pub fn new(
        reaper: Arc<dyn StaleProcessReaper>,
        helper: HelperKind,
        package_manager: impl Into<String>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            reaper,
            names: vec![helper.name().to_string(), package_manager.into()],
            settle_delay,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config, reaper: Arc<dyn StaleProcessReaper>) -> Self {
        Self::new(
            reaper,
            config.general.helper,
            config.process.package_manager.clone(),
            config.settle_delay(),
        )
    }

    /// Clear stale processes, then wait out the settle delay.
    pub async fn run(&self, ctx: &PlatformContext) -> usize {
        let count = self.clear_stale_processes(ctx).await;
        tokio::time::sleep(self.settle_delay).await;
        count
    }

    /// Kill leftover processes. Returns how many were signalled.
    pub async fn clear_stale_processes(&self, ctx: &PlatformContext) -> usize {
        let reaper = Arc::clone(&self.reaper);
        let names = self.names.clone();
        let reaped = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            reaper.terminate_by_name(&refs)
        })
        .await;

        let count = reaped.unwrap_or_else(|err| {
            ctx.emit_warning(format!("stale process scan failed: {err}"));
            0
        });
        if count > 0 {
            ctx.emit_process(ProcessEvent::StaleProcessesTerminated {
                name: self.names.join(","),
                count,
            });
        }
        count
    }
}

impl std::fmt::Debug for Preflight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preflight")
            .field("names", &self.names)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReaper(AtomicUsize);

    impl StaleProcessReaper for CountingReaper {
        fn terminate_by_name(&self, names: &[&str]) -> usize {
            assert_eq!(names, ["paru", "pacman"]);
            self.0.fetch_add(1, Ordering::SeqCst);
            2
        }
    }

    #[tokio::test]
    async fn stale_processes_are_reported() {
        let reaper = Arc::new(CountingReaper(AtomicUsize::new(0)));
        let preflight = Preflight::new(
            Arc::clone(&reaper) as Arc<dyn StaleProcessReaper>,
            HelperKind::Paru,
            "pacman",
            Duration::ZERO,
        );
        let (tx, mut rx) = lunaris_events::channel();
        let ctx = PlatformContext::new(Some(tx));

        assert_eq!(preflight.clear_stale_processes(&ctx).await, 2);
        assert_eq!(reaper.0.load(Ordering::SeqCst), 1);

        let message = rx.try_recv().unwrap();
        assert!(matches!(
            message.event,
            lunaris_events::AppEvent::Process(ProcessEvent::StaleProcessesTerminated { count: 2, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_for_the_settle_delay() {
        let reaper = Arc::new(CountingReaper(AtomicUsize::new(0)));
        let preflight = Preflight::new(
            Arc::clone(&reaper) as Arc<dyn StaleProcessReaper>,
            HelperKind::Paru,
            "pacman",
            Duration::from_millis(500),
        );

        let started = tokio::time::Instant::now();
        preflight.run(&PlatformContext::default()).await;

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(reaper.0.load(Ordering::SeqCst), 1);
    }
}
