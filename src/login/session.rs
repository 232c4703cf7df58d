use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngCore;

use crate::common::SessionKey;

/// Identifies one client connection to the login server.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ConnectionId(pub u64);

/// A stored session, keyed by account name in `SessionKeyManager`.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub key: SessionKey,
    pub issued_at: Instant,
    /// The login connection that authenticated this session.
    pub owner: ConnectionId,
    /// Set together with the play pair.
    pub server_id: Option<u8>,
}

/// Issues and checks session keys. There's at most one session per account,
/// a newer login always replaces the older one. Operations on one account
/// are serialized by the map's shard lock.
#[derive(Debug)]
pub struct SessionKeyManager {
    sessions: DashMap<String, SessionRecord>,
    ttl: Duration,
}

fn random_pair() -> (u32, u32) {
    let mut rng = rand::thread_rng();
    loop {
        let pair = (rng.next_u32(), rng.next_u32());
        // a zeroed pair means "not issued"
        if pair != (0, 0) {
            return pair;
        }
    }
}

impl SessionKeyManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    fn is_expired(&self, record: &SessionRecord) -> bool {
        record.issued_at.elapsed() >= self.ttl
    }

    /// Issues a fresh login pair for `account`, replacing whatever session it had.
    pub fn issue_login_session(&self, account: &str, owner: ConnectionId) -> SessionKey {
        let (login1, login2) = random_pair();
        let key = SessionKey::new(login1, login2, 0, 0);

        let previous = self.sessions.insert(
            account.to_string(),
            SessionRecord {
                key,
                issued_at: Instant::now(),
                owner,
                server_id: None,
            },
        );
        if previous.is_some() {
            tracing::debug!("Session for {account} was superseded");
        }

        key
    }

    /// Adds a play pair to the session, if its login pair still matches. The
    /// session's lifetime starts over, so the client has the whole TTL to
    /// reach the game server.
    pub fn issue_play_pair(
        &self,
        account: &str,
        login1: u32,
        login2: u32,
        server_id: u8,
    ) -> Option<SessionKey> {
        let mut record = self.sessions.get_mut(account)?;
        if self.is_expired(&record) || !record.key.check_login_pair(login1, login2) {
            return None;
        }

        let (play1, play2) = random_pair();
        record.key.play1 = play1;
        record.key.play2 = play2;
        record.issued_at = Instant::now();
        record.server_id = Some(server_id);

        Some(record.key)
    }

    pub fn check_login_pair(&self, account: &str, login1: u32, login2: u32) -> bool {
        self.sessions.get(account).is_some_and(|record| {
            !self.is_expired(&record) && record.key.check_login_pair(login1, login2)
        })
    }

    pub fn check_play_pair(&self, account: &str, play1: u32, play2: u32) -> bool {
        self.sessions.get(account).is_some_and(|record| {
            !self.is_expired(&record)
                && record.key.has_play_pair()
                && record.key.check_play_pair(play1, play2)
        })
    }

    /// Called when `server_id` asks whether it may admit `account`. On success
    /// the session is gone, so every play pair admits exactly once.
    pub fn consume_play_session(
        &self,
        account: &str,
        presented: &SessionKey,
        show_license: bool,
        server_id: u8,
    ) -> bool {
        self.sessions
            .remove_if(account, |_, record| {
                !self.is_expired(record)
                    && record.server_id == Some(server_id)
                    && record.key.matches(presented, show_license)
            })
            .is_some()
    }

    /// The current key for `account`, if it has an unexpired session.
    pub fn get(&self, account: &str) -> Option<SessionKey> {
        self.sessions
            .get(account)
            .filter(|record| !self.is_expired(record))
            .map(|record| record.key)
    }

    pub fn invalidate(&self, account: &str) -> bool {
        self.sessions.remove(account).is_some()
    }

    /// Drops the session, unless a newer login for the same account took it over.
    pub fn invalidate_if_owner(&self, account: &str, owner: ConnectionId) -> bool {
        self.sessions
            .remove_if(account, |_, record| record.owner == owner)
            .is_some()
    }

    /// Returns how many sessions were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut purged = 0;
        self.sessions.retain(|_, record| {
            let keep = !self.is_expired(record);
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);
    const FIRST: ConnectionId = ConnectionId(1);
    const SECOND: ConnectionId = ConnectionId(2);

    #[test]
    fn login_pair_is_valid_until_superseded() {
        let manager = SessionKeyManager::new(TTL);
        let first = manager.issue_login_session("alice", FIRST);
        assert_eq!((first.play1, first.play2), (0, 0));
        assert!(manager.check_login_pair("alice", first.login1, first.login2));

        let second = manager.issue_login_session("alice", SECOND);
        assert!(!manager.check_login_pair("alice", first.login1, first.login2));
        assert!(manager.check_login_pair("alice", second.login1, second.login2));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn unknown_accounts_never_match() {
        let manager = SessionKeyManager::new(TTL);
        assert!(!manager.check_login_pair("nobody", 0, 0));
        assert!(!manager.check_play_pair("nobody", 0, 0));
        assert!(manager.issue_play_pair("nobody", 0, 0, 1).is_none());
    }

    #[test]
    fn play_pair_needs_the_current_login_pair() {
        let manager = SessionKeyManager::new(TTL);
        let first = manager.issue_login_session("alice", FIRST);
        manager.issue_login_session("alice", SECOND);

        assert!(
            manager
                .issue_play_pair("alice", first.login1, first.login2, 1)
                .is_none()
        );
    }

    #[test]
    fn play_pair_is_added_to_the_session() {
        let manager = SessionKeyManager::new(TTL);
        let login = manager.issue_login_session("alice", FIRST);
        let key = manager
            .issue_play_pair("alice", login.login1, login.login2, 1)
            .unwrap();

        assert!(key.check_login_pair(login.login1, login.login2));
        assert!(key.has_play_pair());
        assert!(manager.check_play_pair("alice", key.play1, key.play2));
        assert!(!manager.check_play_pair("alice", 0, 0));
        assert_eq!(manager.get("alice"), Some(key));
    }

    #[test]
    fn play_session_is_consumed_once() {
        let manager = SessionKeyManager::new(TTL);
        let login = manager.issue_login_session("alice", FIRST);
        let key = manager
            .issue_play_pair("alice", login.login1, login.login2, 1)
            .unwrap();

        // wrong server, and the login pair alone
        assert!(!manager.consume_play_session("alice", &key, true, 2));
        assert!(!manager.consume_play_session("alice", &login, true, 1));

        assert!(manager.consume_play_session("alice", &key, true, 1));
        assert!(!manager.consume_play_session("alice", &key, true, 1));
        assert!(manager.get("alice").is_none());
    }

    #[test]
    fn license_off_only_checks_the_play_pair() {
        let manager = SessionKeyManager::new(TTL);
        let login = manager.issue_login_session("alice", FIRST);
        let key = manager
            .issue_play_pair("alice", login.login1, login.login2, 1)
            .unwrap();

        let mut presented = key;
        presented.login1 ^= 1;
        assert!(!manager.consume_play_session("alice", &presented, true, 1));
        assert!(manager.consume_play_session("alice", &presented, false, 1));
    }

    #[test]
    fn expired_sessions_fail_and_get_purged() {
        let manager = SessionKeyManager::new(Duration::ZERO);
        let login = manager.issue_login_session("alice", FIRST);

        assert!(!manager.check_login_pair("alice", login.login1, login.login2));
        assert!(
            manager
                .issue_play_pair("alice", login.login1, login.login2, 1)
                .is_none()
        );
        assert!(manager.get("alice").is_none());

        assert_eq!(manager.purge_expired(), 1);
        assert!(manager.is_empty());
    }

    #[test]
    fn purge_alongside_new_logins() {
        let manager = SessionKeyManager::new(Duration::ZERO);
        let accounts: Vec<String> = (0..1000).map(|i| format!("player{i}")).collect();

        let purged = std::thread::scope(|scope| {
            let issuing = scope.spawn(|| {
                for account in &accounts {
                    manager.issue_login_session(account, FIRST);
                }
            });

            let mut purged = 0;
            while !issuing.is_finished() {
                purged += manager.purge_expired();
            }
            purged + manager.purge_expired()
        });

        assert_eq!(purged, accounts.len());
        assert!(manager.is_empty());
    }

    #[test]
    fn only_the_owner_invalidates() {
        let manager = SessionKeyManager::new(TTL);
        manager.issue_login_session("alice", FIRST);
        manager.issue_login_session("alice", SECOND);

        assert!(!manager.invalidate_if_owner("alice", FIRST));
        assert!(manager.get("alice").is_some());
        assert!(manager.invalidate_if_owner("alice", SECOND));
        assert!(!manager.invalidate("alice"));
    }
}
