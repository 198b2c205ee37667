use serde::Serialize;

/// Push channel state as shown to the display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Connection history used to decide whether a reconnect needs a reload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub was_ever_connected: bool,
    pub has_lost_connection: bool,
}

impl ConnectionState {
    /// Record a successful connect. Returns true when the previous session
    /// was lost, meaning the caller must reload instead of reconciling.
    pub fn on_connected(&mut self) -> bool {
        let reload = self.has_lost_connection;
        self.is_connected = true;
        self.was_ever_connected = true;
        self.has_lost_connection = false;
        reload
    }

    /// The link dropped on its own
    pub fn on_disconnected(&mut self) {
        if self.is_connected {
            self.has_lost_connection = true;
        }
        self.is_connected = false;
    }

    /// The link was closed on purpose; not a loss
    pub fn on_teardown(&mut self) {
        self.is_connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_requires_a_prior_connection() {
        let mut state = ConnectionState::default();
        state.on_disconnected();
        assert!(!state.has_lost_connection);
        assert!(!state.on_connected());
    }

    #[test]
    fn test_reconnect_after_loss_reloads_once() {
        let mut state = ConnectionState::default();
        state.on_connected();
        state.on_disconnected();
        assert!(state.has_lost_connection);
        assert!(state.was_ever_connected);

        // failed attempts in between keep the flag
        state.on_disconnected();
        assert!(state.has_lost_connection);

        assert!(state.on_connected());
        assert!(!state.on_connected());
    }

    #[test]
    fn test_teardown_is_not_a_loss() {
        let mut state = ConnectionState::default();
        state.on_connected();
        state.on_teardown();
        assert!(!state.has_lost_connection);
        assert!(state.was_ever_connected);
        assert!(!state.on_connected());
    }
}
