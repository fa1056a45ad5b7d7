//! Integration tests for process supervision

#[cfg(test)]
mod tests {
    use lunaris_events::{AppEvent, ProcessEvent};
    use lunaris_platform::*;
    use lunaris_types::Credential;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> PlatformCommand {
        let mut cmd = PlatformCommand::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    fn supervisor(timeout: Duration) -> Supervisor {
        Supervisor::new(PlatformContext::default(), timeout, CancelSignal::never())
            .with_drain_grace(Duration::from_millis(300))
    }

    fn collect(lines: &mut Vec<String>) -> impl FnMut(&OutputLine) -> LineVerdict + Send + '_ {
        move |line: &OutputLine| {
            lines.push(line.text.clone());
            LineVerdict::Continue
        }
    }

    #[tokio::test]
    async fn test_successful_exit_with_both_streams() {
        let ctx = PlatformContext::default();
        let mut handle =
            ProcessHandle::spawn(&ctx, &sh("echo out; echo err 1>&2; echo out2"), 4).unwrap();
        handle.close_input();

        let mut lines = Vec::new();
        let outcome = supervisor(Duration::from_secs(10))
            .await_completion(&mut handle, &mut collect(&mut lines))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::ExitedOk);
        lines.sort();
        assert_eq!(lines, ["err", "out", "out2"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_code() {
        let ctx = PlatformContext::default();
        let mut handle = ProcessHandle::spawn(&ctx, &sh("exit 7"), 4).unwrap();

        let mut lines = Vec::new();
        let outcome = supervisor(Duration::from_secs(10))
            .await_completion(&mut handle, &mut collect(&mut lines))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::ExitedWithError(Some(7)));
    }

    #[tokio::test]
    async fn test_deadline_kills_process_group() {
        let (tx, mut rx) = lunaris_events::channel();
        let ctx = PlatformContext::new(Some(tx));
        // the child spawns a grandchild; both must die
        let mut handle = ProcessHandle::spawn(&ctx, &sh("sleep 30 & sleep 30"), 4).unwrap();

        let started = Instant::now();
        let mut lines = Vec::new();
        let outcome = Supervisor::new(ctx.clone(), Duration::from_millis(300), CancelSignal::never())
            .await_completion(&mut handle, &mut collect(&mut lines))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));

        let mut saw_timeout = false;
        while let Ok(message) = rx.try_recv() {
            if matches!(message.event, AppEvent::Process(ProcessEvent::TimedOut { .. })) {
                saw_timeout = true;
            }
        }
        assert!(saw_timeout);
    }

    #[tokio::test]
    async fn test_sink_abort_terminates_process() {
        let ctx = PlatformContext::default();
        let mut handle = ProcessHandle::spawn(
            &ctx,
            &sh("echo installing; echo 'foo and bar are in conflict'; sleep 30"),
            4,
        )
        .unwrap();

        let mut sink = |line: &OutputLine| {
            if line.text.contains("conflict") {
                LineVerdict::Abort(line.text.clone())
            } else {
                LineVerdict::Continue
            }
        };
        let started = Instant::now();
        let outcome = supervisor(Duration::from_secs(30))
            .await_completion(&mut handle, &mut sink)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Aborted("foo and bar are in conflict".to_string())
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancel_signal_terminates_process() {
        let ctx = PlatformContext::default();
        let (trigger, signal) = cancel_pair();
        let mut handle = ProcessHandle::spawn(&ctx, &sh("sleep 30"), 4).unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let mut lines = Vec::new();
        let outcome = Supervisor::new(ctx, Duration::from_secs(30), signal)
            .await_completion(&mut handle, &mut collect(&mut lines))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn test_secret_is_written_once_and_stdin_closed() {
        let ctx = PlatformContext::default();
        let mut slot = ProcessSlot::new();
        let credential = Credential::new("hunter2");
        slot.start(
            &ctx,
            &sh("read pw; echo \"got:$pw\"; if read more; then echo extra; else echo eof; fi"),
            4,
            Some(&credential),
        )
        .await
        .unwrap();
        assert!(slot.is_active());

        let mut lines = Vec::new();
        let outcome = slot
            .supervise(&supervisor(Duration::from_secs(10)), &mut collect(&mut lines))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::ExitedOk);
        assert_eq!(lines, ["got:hunter2", "eof"]);
        assert!(!slot.is_active());
    }

    #[tokio::test]
    async fn test_starting_a_new_process_replaces_the_old_one() {
        let ctx = PlatformContext::default();
        let mut slot = ProcessSlot::new();
        slot.start(&ctx, &sh("sleep 30"), 4, None).await.unwrap();
        let first = slot.active_pid();

        slot.start(&ctx, &sh("echo second"), 4, None).await.unwrap();
        assert_ne!(slot.active_pid(), first);

        assert!(slot.terminate().await);
        assert!(!slot.is_active());
        assert!(!slot.terminate().await);
    }

    #[tokio::test]
    async fn test_background_grandchild_does_not_block_completion() {
        let ctx = PlatformContext::default();
        let mut handle = ProcessHandle::spawn(&ctx, &sh("sleep 30 & echo done"), 4).unwrap();

        let started = Instant::now();
        let mut lines = Vec::new();
        let outcome = supervisor(Duration::from_secs(30))
            .await_completion(&mut handle, &mut collect(&mut lines))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::ExitedOk);
        assert_eq!(lines, ["done"]);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_bounded_channel_applies_backpressure_without_losing_lines() {
        let ctx = PlatformContext::default();
        let mut handle = ProcessHandle::spawn(
            &ctx,
            &sh("i=0; while [ $i -lt 500 ]; do echo line$i; i=$((i+1)); done"),
            1,
        )
        .unwrap();

        let mut lines = Vec::new();
        let outcome = supervisor(Duration::from_secs(30))
            .await_completion(&mut handle, &mut collect(&mut lines))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::ExitedOk);
        assert_eq!(lines.len(), 500);
        assert_eq!(lines.first().map(String::as_str), Some("line0"));
        assert_eq!(lines.last().map(String::as_str), Some("line499"));
    }

    #[tokio::test]
    async fn test_spawn_of_missing_program_fails() {
        let ctx = PlatformContext::default();
        let err = ProcessHandle::spawn(&ctx, &PlatformCommand::new("lunaris-no-such-tool"), 4)
            .unwrap_err();
        assert!(matches!(
            err,
            lunaris_errors::PlatformError::CommandNotFound { .. }
        ));
    }
}
