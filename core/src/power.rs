#[cfg(unix)]
use tracing::debug;
#[cfg(unix)]
use tracing::warn;
#[cfg(unix)]
use zbus::blocking::Connection;

/// Session power-management service capable of being told to suppress sleep
/// directly.
///
/// The service path is independent of and redundant with the screensaver
/// reset loop: some desktop sessions honor only the service message, others
/// only the periodic resets.
pub trait PowerNotifier: Send {
    fn notify(&mut self, reason: &str, active: bool);
}

/// Stand-in used when no power-management service is reachable. Unsupported
/// is a valid state, never an error.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl PowerNotifier for NullNotifier {
    fn notify(&mut self, _reason: &str, _active: bool) {}
}

/// Pick the notifier for this session: the `org.freedesktop.ScreenSaver`
/// notifier when the session bus is reachable, otherwise the null one.
pub(crate) fn detect() -> Box<dyn PowerNotifier> {
    #[cfg(unix)]
    {
        match ScreenSaverNotifier::connect() {
            Ok(notifier) => return Box::new(notifier),
            Err(error) => {
                debug!(
                    reason = %error,
                    "Session bus unavailable; falling back to screensaver resets only"
                );
            }
        }
    }
    Box::new(NullNotifier)
}

#[cfg(unix)]
const SCREENSAVER_SERVICE: &str = "org.freedesktop.ScreenSaver";
#[cfg(unix)]
const SCREENSAVER_PATH: &str = "/org/freedesktop/ScreenSaver";
#[cfg(unix)]
const APP_NAME: &str = "wakeguard";

/// Cookie-based inhibition through the `org.freedesktop.ScreenSaver` session
/// interface. Call failures are logged and absorbed; the inhibitor keeps
/// running on the reset-loop path alone.
#[cfg(unix)]
#[derive(Debug)]
pub(crate) struct ScreenSaverNotifier {
    connection: Connection,
    cookie: Option<u32>,
}

#[cfg(unix)]
impl ScreenSaverNotifier {
    pub(crate) fn connect() -> zbus::Result<Self> {
        Ok(Self {
            connection: Connection::session()?,
            cookie: None,
        })
    }

    fn inhibit(&self, reason: &str) -> zbus::Result<u32> {
        let reply = self.connection.call_method(
            Some(SCREENSAVER_SERVICE),
            SCREENSAVER_PATH,
            Some(SCREENSAVER_SERVICE),
            "Inhibit",
            &(APP_NAME, reason),
        )?;
        reply.body().deserialize()
    }

    fn uninhibit(&self, cookie: u32) -> zbus::Result<()> {
        self.connection.call_method(
            Some(SCREENSAVER_SERVICE),
            SCREENSAVER_PATH,
            Some(SCREENSAVER_SERVICE),
            "UnInhibit",
            &(cookie,),
        )?;
        Ok(())
    }
}

#[cfg(unix)]
impl PowerNotifier for ScreenSaverNotifier {
    fn notify(&mut self, reason: &str, active: bool) {
        if active {
            if self.cookie.is_some() {
                return;
            }
            match self.inhibit(reason) {
                Ok(cookie) => self.cookie = Some(cookie),
                Err(error) => {
                    warn!(reason = %error, "ScreenSaver Inhibit call failed");
                }
            }
        } else if let Some(cookie) = self.cookie.take() {
            if let Err(error) = self.uninhibit(cookie) {
                warn!(cookie, reason = %error, "ScreenSaver UnInhibit call failed");
            }
        }
    }
}

#[cfg(unix)]
impl Drop for ScreenSaverNotifier {
    fn drop(&mut self) {
        if let Some(cookie) = self.cookie.take() {
            if let Err(error) = self.uninhibit(cookie) {
                warn!(cookie, reason = %error, "Failed to release inhibit cookie on drop");
            }
        }
    }
}
