//! Bounded history of live sessions

use scanlogin_crypto::{Session, SessionId};
use std::collections::VecDeque;

/// Sessions that may still be scanned, newest first.
///
/// Before acknowledgment every session in the history is a decryption
/// candidate. Once an `ACK` is attributed to one of them the history
/// collapses to that session and stays that way.
#[derive(Debug)]
pub struct SessionHistory {
    sessions: VecDeque<Session>,
    cap: usize,
    confirmed: bool,
}

impl SessionHistory {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            sessions: VecDeque::new(),
            cap,
            confirmed: false,
        }
    }

    /// Add the newest session, evicting the oldest beyond the cap.
    ///
    /// Returns the evicted session. A confirmed history accepts nothing and
    /// hands `session` straight back.
    pub fn push(&mut self, session: Session) -> Option<Session> {
        if self.confirmed {
            return Some(session);
        }
        self.sessions.push_front(session);
        if self.sessions.len() > self.cap {
            self.sessions.pop_back()
        } else {
            None
        }
    }

    /// Collapse to the session `id`. Returns false if it is not in the
    /// history or another session is already confirmed.
    pub fn confirm(&mut self, id: &SessionId) -> bool {
        if self.confirmed {
            return self.sessions.front().is_some_and(|s| s.id() == id);
        }
        let Some(index) = self.sessions.iter().position(|s| s.id() == id) else {
            return false;
        };
        let session = self.sessions.remove(index);
        self.sessions.clear();
        self.sessions.extend(session);
        self.confirmed = true;
        true
    }

    /// Keys to try on an inbound frame, in order
    pub fn candidates(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    /// The confirmed session, if any
    pub fn confirmed(&self) -> Option<&Session> {
        self.sessions.front().filter(|_| self.confirmed)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn newest(&self) -> Option<&Session> {
        self.sessions.front()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|s| s.id().clone()).collect()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::OnceLock;

    /// Shared pool of pre-generated sessions; RSA key generation is slow
    pub(crate) fn pool() -> &'static [Session] {
        static POOL: OnceLock<Vec<Session>> = OnceLock::new();
        POOL.get_or_init(|| (0..4).map(|_| Session::generate(2048).unwrap()).collect())
    }

    #[test]
    fn test_push_respects_cap() {
        let mut history = SessionHistory::new(3);
        for (i, session) in pool().iter().enumerate() {
            let evicted = history.push(session.clone());
            assert!(history.len() <= 3);
            assert_eq!(evicted.is_some(), i >= 3);
        }
        assert_eq!(history.newest().unwrap().id(), pool()[3].id());
        assert_eq!(
            history.ids(),
            vec![
                pool()[3].id().clone(),
                pool()[2].id().clone(),
                pool()[1].id().clone()
            ]
        );
    }

    #[test]
    fn test_zero_cap_holds_one() {
        let mut history = SessionHistory::new(0);
        history.push(pool()[0].clone());
        history.push(pool()[1].clone());
        assert_eq!(history.cap(), 1);
        assert_eq!(history.ids(), vec![pool()[1].id().clone()]);
    }

    #[test]
    fn test_confirm_collapses() {
        let mut history = SessionHistory::new(4);
        for session in &pool()[..3] {
            history.push(session.clone());
        }
        assert!(history.confirmed().is_none());
        assert!(!history.confirm(pool()[3].id()));

        assert!(history.confirm(pool()[0].id()));
        assert_eq!(history.len(), 1);
        assert_eq!(history.confirmed().unwrap().id(), pool()[0].id());
        assert_eq!(history.candidates().count(), 1);

        assert!(!history.confirm(pool()[1].id()));
        assert!(history.push(pool()[3].clone()).is_some());
        assert_eq!(history.len(), 1);
    }
}
