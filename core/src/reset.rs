use std::ffi::OsString;
use std::process::Command;
use std::process::Stdio;
use tracing::warn;

const RESET_PROGRAM: &str = "xdg-screensaver";
const RESET_SUBCOMMAND: &str = "reset";

/// Best-effort reset of the desktop idle timer.
///
/// Implementations must never fail the caller: a missing or broken reset
/// helper degrades to a logged warning, not an error.
pub trait IdleReset: Send + Sync {
    fn reset_idle_timer(&self);
}

/// Resets the screensaver by spawning `xdg-screensaver reset` and waiting for
/// it to exit. The helper's exit status is not inspected and its stdio is
/// discarded; the only observable failure is a spawn error, which is logged.
#[derive(Debug)]
pub struct XdgScreensaverReset {
    program: OsString,
    env: Option<Vec<(OsString, OsString)>>,
}

impl XdgScreensaverReset {
    /// Invoker that lets the helper inherit the full process environment.
    pub fn new() -> Self {
        Self {
            program: RESET_PROGRAM.into(),
            env: None,
        }
    }

    /// Invoker that runs the helper with exactly `vars` as its environment
    /// instead of inheriting the ambient one.
    pub fn with_env(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        Self {
            program: RESET_PROGRAM.into(),
            env: Some(vars.into_iter().collect()),
        }
    }

    #[cfg(test)]
    fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            env: None,
        }
    }
}

impl Default for XdgScreensaverReset {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleReset for XdgScreensaverReset {
    fn reset_idle_timer(&self) {
        let mut command = Command::new(&self.program);
        command
            .arg(RESET_SUBCOMMAND)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(env) = &self.env {
            command.env_clear();
            command.envs(env.iter().map(|(key, value)| (key.as_os_str(), value.as_os_str())));
        }
        #[cfg(unix)]
        restore_default_signal_disposition(&mut command);

        match command.spawn() {
            Ok(mut child) => {
                if let Err(error) = child.wait() {
                    warn!(reason = %error, "Failed to wait for xdg-screensaver");
                }
            }
            Err(error) => {
                // Non-fatal: the helper simply is not installed on every
                // system, and the inhibition loop retries next cycle.
                warn!(
                    code = error.raw_os_error(),
                    reason = %error,
                    "Failed to create xdg-screensaver"
                );
            }
        }
    }
}

/// The helper must run with default signal handling, `SIGPIPE` included, even
/// when the host application masks or ignores signals.
#[cfg(unix)]
fn restore_default_signal_disposition(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: the hook runs between fork and exec and only calls
    // async-signal-safe libc functions.
    unsafe {
        command.pre_exec(|| {
            let mut set: libc::sigset_t = std::mem::zeroed();
            if libc::sigemptyset(&mut set) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::sigprocmask(libc::SIG_SETMASK, &set, std::ptr::null_mut()) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}
