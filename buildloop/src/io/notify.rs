//! Best-effort completion notifications.
//!
//! Dispatch happens on a background thread so the summary output is never
//! held up by the platform notifier; the caller joins the returned handle
//! before the process exits so the notification is actually delivered.
//! Every dispatch error is caught and discarded inside that boundary: the
//! run's outcome never depends on whether a notification landed.

use std::thread;

use tracing::debug;

/// Final run summary handed to the notifier.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub project: String,
    pub completed: u32,
    pub elapsed: String,
    pub success: bool,
}

impl RunReport {
    fn message(&self) -> String {
        if self.success {
            format!(
                "Build complete! {} tasks in {}",
                self.completed, self.elapsed
            )
        } else {
            format!(
                "Build failed after {} tasks ({})",
                self.completed, self.elapsed
            )
        }
    }
}

/// Dispatch a completion notification on a background thread.
///
/// The returned handle must be joined before process exit, or the thread
/// dies with the process and the notification is lost.
#[must_use]
pub fn notify_run_finished(report: RunReport) -> thread::JoinHandle<()> {
    dispatch(report, send)
}

fn dispatch<F>(report: RunReport, send_fn: F) -> thread::JoinHandle<()>
where
    F: FnOnce(&str, &str) -> std::io::Result<()> + Send + 'static,
{
    thread::spawn(move || {
        if let Err(err) = send_fn(&report.project, &report.message()) {
            debug!(err = %err, "notification dispatch failed");
        }
    })
}

#[cfg(target_os = "macos")]
fn send(title: &str, message: &str) -> std::io::Result<()> {
    use std::process::Command;

    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape_applescript(message),
        escape_applescript(title)
    );
    Command::new("osascript").arg("-e").arg(script).output()?;
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn send(title: &str, message: &str) -> std::io::Result<()> {
    tracing::info!(title, message, "run finished");
    Ok(())
}

#[cfg(target_os = "macos")]
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_message_covers_both_outcomes() {
        let success = RunReport {
            project: "demo".to_string(),
            completed: 4,
            elapsed: "3m 2s".to_string(),
            success: true,
        };
        assert_eq!(success.message(), "Build complete! 4 tasks in 3m 2s");

        let failure = RunReport {
            success: false,
            ..success
        };
        assert_eq!(failure.message(), "Build failed after 4 tasks (3m 2s)");
    }

    /// Joining the returned handle guarantees the send ran to completion,
    /// so a caller that joins before exiting cannot drop the notification.
    #[test]
    fn join_completes_the_dispatch() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = dispatch(
            RunReport {
                project: "demo".to_string(),
                completed: 2,
                elapsed: "5s".to_string(),
                success: true,
            },
            move |title, message| {
                tx.send(format!("{title}: {message}")).expect("send");
                Ok(())
            },
        );
        handle.join().expect("join");
        assert_eq!(
            rx.try_recv().expect("delivered before join returned"),
            "demo: Build complete! 2 tasks in 5s"
        );
    }

    /// Dispatch errors are swallowed; the worker never panics.
    #[test]
    fn dispatch_errors_are_swallowed() {
        let handle = dispatch(
            RunReport {
                project: "demo".to_string(),
                completed: 0,
                elapsed: "0s".to_string(),
                success: false,
            },
            |_, _| Err(std::io::Error::other("no display server")),
        );
        handle.join().expect("worker exits cleanly");
    }
}
