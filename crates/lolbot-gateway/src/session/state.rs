//! Resumable session tracking

/// Resumption state for the current gateway session
///
/// An empty `session_id` means there is nothing to resume. `sequence` never
/// decreases while a session is active and drops to 0 only when the session
/// is cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    session_id: String,
    sequence: u64,
}

impl SessionState {
    /// Empty session, the next handshake identifies
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The session to resume, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        if self.session_id.is_empty() {
            None
        } else {
            Some(&self.session_id)
        }
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Sequence to report in a heartbeat (`None` before any was seen)
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        (self.sequence > 0).then_some(self.sequence)
    }

    #[must_use]
    pub fn is_resumable(&self) -> bool {
        !self.session_id.is_empty()
    }

    /// Record a sequence number from an inbound dispatch
    ///
    /// Returns `true` if the stored sequence advanced.
    pub fn observe_sequence(&mut self, sequence: u64) -> bool {
        if sequence > self.sequence {
            self.sequence = sequence;
            true
        } else {
            false
        }
    }

    /// Store the session id from a READY dispatch, replacing any previous one
    pub fn begin(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
    }

    /// Forget the session so the next handshake identifies
    pub fn clear(&mut self) {
        self.session_id.clear();
        self.sequence = 0;
    }
}
