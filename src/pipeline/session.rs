//! Navigation sequencing per logical session.
//!
//! # Responsibilities
//! - Hand each navigation on a session a monotonically increasing sequence
//!   number
//! - Tell a finished navigation whether it is still the newest one
//!
//! # Design Decisions
//! - Last writer wins: a superseded navigation's result is discarded when
//!   it arrives, but its in-flight work is never forcibly aborted
//! - Sessions without an id are never superseded (every such request is
//!   its own world)

use dashmap::DashMap;

/// Concurrent map of session id to the latest issued sequence number.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sequences: DashMap<String, u64>,
}

/// Ticket for one navigation; compare against the tracker when the
/// pipeline finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavTicket {
    session: Option<String>,
    seq: u64,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the start of a navigation. Passing `None` yields a ticket
    /// that can never go stale.
    pub fn begin(&self, session: Option<&str>) -> NavTicket {
        match session {
            Some(session) => {
                let mut entry = self.sequences.entry(session.to_string()).or_insert(0);
                *entry += 1;
                NavTicket {
                    session: Some(session.to_string()),
                    seq: *entry,
                }
            }
            None => NavTicket {
                session: None,
                seq: 0,
            },
        }
    }

    /// True while no newer navigation has begun on the same session.
    pub fn is_current(&self, ticket: &NavTicket) -> bool {
        match &ticket.session {
            Some(session) => self
                .sequences
                .get(session)
                .map(|latest| *latest == ticket.seq)
                .unwrap_or(true),
            None => true,
        }
    }

    /// Number of sessions seen so far.
    pub fn active_sessions(&self) -> usize {
        self.sequences.len()
    }

    /// Snapshot of every session and its latest sequence number.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.sequences
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}
