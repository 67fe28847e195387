//! Keeps the operating system and desktop environment awake while an
//! application-defined activity is in progress.
//!
//! Two redundant mechanisms run while an [`Inhibitor`] is active: an inhibit
//! request sent to the session power-management service, and a background
//! thread that periodically resets the desktop screensaver idle timer. Some
//! desktop sessions honor only the service message, others only the periodic
//! resets, so both are issued.

mod inhibitor;
mod power;
mod reset;
mod waiter;

pub use inhibitor::Inhibitor;
pub use inhibitor::InhibitorBuilder;
pub use power::NullNotifier;
pub use power::PowerNotifier;
pub use reset::IdleReset;
pub use reset::XdgScreensaverReset;
pub use waiter::StopWaiter;
pub use waiter::WaitOutcome;
