use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RESTART_PAUSE: Duration = Duration::from_secs(5);

/// Helper process attached to a path.
///
/// The command line runs through `/bin/sh -c` with the path name exported as
/// `RTSP_PATH`. With `restart` set the command is relaunched after it exits;
/// otherwise the supervisor just waits for [`ExternalCmd::close`].
pub struct ExternalCmd {
    terminate: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
    supervisor: Option<thread::JoinHandle<()>>,
}

impl ExternalCmd {
    pub fn new(cmdline: &str, restart: bool, path_name: &str) -> ExternalCmd {
        let terminate = Arc::new(AtomicBool::new(false));
        let child = Arc::new(Mutex::new(None));

        let supervisor = {
            let cmdline = cmdline.to_string();
            let path_name = path_name.to_string();
            let terminate = terminate.clone();
            let child = child.clone();
            thread::spawn(move || supervise(cmdline, restart, path_name, terminate, child))
        };

        ExternalCmd {
            terminate,
            child,
            supervisor: Some(supervisor),
        }
    }

    /// Kill the child and stop the supervisor. Idempotent.
    pub fn close(&mut self) {
        self.terminate.store(true, Ordering::SeqCst);

        if let Some(child) = self.child.lock().as_mut() {
            let _ = child.kill();
        }

        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.join();
        }
    }
}

impl Drop for ExternalCmd {
    fn drop(&mut self) {
        self.close();
    }
}

fn supervise(
    cmdline: String,
    restart: bool,
    path_name: String,
    terminate: Arc<AtomicBool>,
    child_slot: Arc<Mutex<Option<Child>>>,
) {
    loop {
        match Command::new("/bin/sh")
            .arg("-c")
            .arg(&cmdline)
            .env("RTSP_PATH", &path_name)
            .spawn()
        {
            Ok(child) => {
                *child_slot.lock() = Some(child);

                loop {
                    // close() may have raced the spawn and found nothing to kill
                    if terminate.load(Ordering::SeqCst) {
                        if let Some(child) = child_slot.lock().as_mut() {
                            let _ = child.kill();
                        }
                    }

                    let exited = {
                        let mut slot = child_slot.lock();
                        match slot.as_mut() {
                            Some(child) => match child.try_wait() {
                                Ok(Some(status)) => {
                                    debug!("external command '{}' exited with {}", cmdline, status);
                                    *slot = None;
                                    true
                                }
                                Ok(None) => false,
                                Err(err) => {
                                    warn!("external command '{}' wait failed: {}", cmdline, err);
                                    *slot = None;
                                    true
                                }
                            },
                            // close() reaped it
                            None => true,
                        }
                    };

                    if exited {
                        break;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
            Err(err) => {
                warn!("external command '{}' failed to start: {}", cmdline, err);
            }
        }

        if terminate.load(Ordering::SeqCst) || !restart {
            break;
        }

        // pause before relaunching, but stay responsive to close()
        let mut waited = Duration::from_secs(0);
        while waited < RESTART_PAUSE && !terminate.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);
            waited += POLL_INTERVAL;
        }
        if terminate.load(Ordering::SeqCst) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn close_kills_a_long_running_command() {
        let mut cmd = ExternalCmd::new("sleep 60", false, "cam1");
        thread::sleep(Duration::from_millis(200));

        let start = Instant::now();
        cmd.close();
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn close_is_idempotent() {
        let mut cmd = ExternalCmd::new("true", false, "cam1");
        thread::sleep(Duration::from_millis(300));
        cmd.close();
        cmd.close();
    }
}
