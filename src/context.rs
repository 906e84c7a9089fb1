//! Process-wide operation context: mounted partitions and the active session.

use crate::mount::MountRegistry;

/// The authenticated user of an open session.
#[derive(Clone, Debug)]
pub struct Session {
    /// Login name.
    pub user: String,
    /// Name of the user's group.
    pub group: String,
    /// The user's id in `users.txt`.
    pub uid: i32,
    /// The partition id the session was opened against.
    pub mount_id: String,
}

/// Mutable state threaded through every command.
///
/// Instantiated per process by the shell and per test by the test harness, so
/// no hidden globals are involved.
#[derive(Default)]
pub struct Context {
    /// Mounted partitions.
    pub mounts: MountRegistry,
    /// The active session, if a user is logged in.
    pub session: Option<Session>,
}

impl Context {
    /// Returns the active session or an error if nobody is logged in.
    pub fn session(&self) -> crate::error::Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| crate::error::Error::Forbidden("no user is logged in".into()))
    }
}
