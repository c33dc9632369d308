// Session-scoped access state: holds at most one grant, persisted through a
// key-value session store, with a generation counter so that a superseded
// league selection can never overwrite a newer one.
//
// Lifecycle: NoLeagueSelected -> Resolving -> AdminGranted | ViewerGranted,
// and back to NoLeagueSelected only through `clear()`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::access::AccessGrant;
use crate::error::{Error, Result};

/// Key under which the current grant is stored.
pub const SESSION_KEY: &str = "currentLeague";

/// Key-value store scoped to one browsing session.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory session store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().expect("session store mutex poisoned")
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoLeagueSelected,
    Resolving,
    AdminGranted,
    ViewerGranted,
}

/// Issued when a league selection starts; hand it back with the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    pub league_id: String,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The grant is now the session's grant.
    Applied,
    /// A newer selection (or a clear) happened since this ticket was issued;
    /// the result was dropped.
    Stale,
}

pub struct AccessSession {
    store: Arc<dyn SessionStore>,
    grant: Option<AccessGrant>,
    pending: Option<SelectionTicket>,
    /// Incremented on every selection and clear. Results carrying an older
    /// generation are discarded in `complete`.
    generation: u64,
}

impl AccessSession {
    /// Start a session, restoring a previously stored grant if there is one.
    /// A stored value that doesn't parse is removed and the session starts
    /// empty.
    pub fn restore(store: Arc<dyn SessionStore>) -> Result<Self> {
        let grant = match store.get(SESSION_KEY)? {
            Some(json) => match serde_json::from_str::<AccessGrant>(&json) {
                Ok(grant) => {
                    info!("Restored access to league {} from session", grant.id);
                    Some(grant)
                }
                Err(e) => {
                    warn!("Discarding unreadable session grant: {}", e);
                    store.remove(SESSION_KEY)?;
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            store,
            grant,
            pending: None,
            generation: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        if self.pending.is_some() {
            return SessionState::Resolving;
        }
        match &self.grant {
            None => SessionState::NoLeagueSelected,
            Some(grant) if grant.is_admin() => SessionState::AdminGranted,
            Some(_) => SessionState::ViewerGranted,
        }
    }

    pub fn grant(&self) -> Option<&AccessGrant> {
        self.grant.as_ref()
    }

    /// The league currently being resolved, if any.
    pub fn pending_league(&self) -> Option<&str> {
        self.pending.as_ref().map(|t| t.league_id.as_str())
    }

    /// Enter `Resolving` for `league_id`. Any earlier pending selection is
    /// superseded.
    pub fn begin(&mut self, league_id: &str) -> SelectionTicket {
        self.generation += 1;
        let ticket = SelectionTicket {
            league_id: league_id.to_string(),
            generation: self.generation,
        };
        debug!(
            "Selecting league {} (gen: {})",
            league_id, ticket.generation
        );
        self.pending = Some(ticket.clone());
        ticket
    }

    /// Finish a selection started with `begin`.
    ///
    /// Stale tickets are discarded whatever their outcome. For the current
    /// ticket, a failed resolution leaves the previous grant in place and
    /// returns the error; a successful one is persisted and becomes the
    /// grant.
    pub fn complete(
        &mut self,
        ticket: &SelectionTicket,
        outcome: Result<AccessGrant>,
    ) -> Result<Completion> {
        if ticket.generation != self.generation {
            debug!(
                "Discarding stale resolution for league {} (gen {} != current {})",
                ticket.league_id, ticket.generation, self.generation
            );
            return Ok(Completion::Stale);
        }
        self.pending = None;

        let grant = match outcome {
            Ok(grant) => grant,
            Err(e) => {
                warn!("Access resolution for league {} failed: {}", ticket.league_id, e);
                return Err(e);
            }
        };
        if grant.id != ticket.league_id {
            warn!(
                "Resolution for league {} returned a grant for {}; ignoring",
                ticket.league_id, grant.id
            );
            return Ok(Completion::Stale);
        }

        let json = serde_json::to_string(&grant).map_err(|e| Error::InvalidRow {
            table: "session",
            message: e.to_string(),
        })?;
        self.store.set(SESSION_KEY, &json)?;
        info!(
            "Access to league {} granted as {:?}",
            grant.id, grant.user_role
        );
        self.grant = Some(grant);
        Ok(Completion::Applied)
    }

    /// Exit the league: drop the grant and any pending selection.
    pub fn clear(&mut self) -> Result<()> {
        self.store.remove(SESSION_KEY)?;
        self.generation += 1;
        self.pending = None;
        self.grant = None;
        info!("League access cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;

    fn grant(league_id: &str, role: Role) -> AccessGrant {
        AccessGrant {
            id: league_id.to_string(),
            name: format!("League {league_id}"),
            logo_url: None,
            user_role: role,
            user_email: "u1@x.com".into(),
            is_global_admin: role == Role::Admin,
            is_league_creator: false,
            created_by: None,
        }
    }

    fn fresh() -> (Arc<MemorySessionStore>, AccessSession) {
        let store = Arc::new(MemorySessionStore::new());
        let session = AccessSession::restore(store.clone()).unwrap();
        (store, session)
    }

    #[test]
    fn starts_with_no_league_selected() {
        let (_, session) = fresh();
        assert_eq!(session.state(), SessionState::NoLeagueSelected);
        assert!(session.grant().is_none());
    }

    #[test]
    fn begin_then_complete_grants_and_persists() {
        let (store, mut session) = fresh();
        let ticket = session.begin("l1");
        assert_eq!(session.state(), SessionState::Resolving);
        assert_eq!(session.pending_league(), Some("l1"));

        let done = session.complete(&ticket, Ok(grant("l1", Role::Admin))).unwrap();
        assert_eq!(done, Completion::Applied);
        assert_eq!(session.state(), SessionState::AdminGranted);

        let stored = store.get(SESSION_KEY).unwrap().unwrap();
        let parsed: AccessGrant = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed.id, "l1");
    }

    #[test]
    fn viewer_grant_reaches_viewer_state() {
        let (_, mut session) = fresh();
        let ticket = session.begin("l1");
        session.complete(&ticket, Ok(grant("l1", Role::Viewer))).unwrap();
        assert_eq!(session.state(), SessionState::ViewerGranted);
    }

    #[test]
    fn superseded_selection_is_discarded_when_it_finishes_last() {
        let (_, mut session) = fresh();
        let first = session.begin("l1");
        let second = session.begin("l2");

        let done = session.complete(&second, Ok(grant("l2", Role::Viewer))).unwrap();
        assert_eq!(done, Completion::Applied);
        let done = session.complete(&first, Ok(grant("l1", Role::Admin))).unwrap();
        assert_eq!(done, Completion::Stale);

        assert_eq!(session.grant().unwrap().id, "l2");
        assert_eq!(session.state(), SessionState::ViewerGranted);
    }

    #[test]
    fn superseded_selection_is_discarded_when_it_finishes_first() {
        let (_, mut session) = fresh();
        let first = session.begin("l1");
        let second = session.begin("l2");

        let done = session.complete(&first, Ok(grant("l1", Role::Admin))).unwrap();
        assert_eq!(done, Completion::Stale);
        assert_eq!(session.state(), SessionState::Resolving);
        assert!(session.grant().is_none());

        session.complete(&second, Ok(grant("l2", Role::Viewer))).unwrap();
        assert_eq!(session.grant().unwrap().id, "l2");
    }

    #[test]
    fn failed_resolution_keeps_previous_grant() {
        let (store, mut session) = fresh();
        let ticket = session.begin("l1");
        session.complete(&ticket, Ok(grant("l1", Role::Admin))).unwrap();

        let ticket = session.begin("missing");
        let err = session
            .complete(&ticket, Err(Error::LeagueNotFound("missing".into())))
            .unwrap_err();
        assert_eq!(err, Error::LeagueNotFound("missing".into()));
        assert_eq!(session.grant().unwrap().id, "l1");
        assert_eq!(session.state(), SessionState::AdminGranted);
        assert!(store.get(SESSION_KEY).unwrap().unwrap().contains("\"l1\""));
    }

    #[test]
    fn stale_failure_is_not_reported() {
        let (_, mut session) = fresh();
        let first = session.begin("l1");
        let _second = session.begin("l2");
        let done = session
            .complete(&first, Err(Error::Transport("timeout".into())))
            .unwrap();
        assert_eq!(done, Completion::Stale);
    }

    #[test]
    fn second_selection_overwrites_first_without_clearing() {
        let (_, mut session) = fresh();
        let t1 = session.begin("l1");
        session.complete(&t1, Ok(grant("l1", Role::Admin))).unwrap();
        let t2 = session.begin("l2");
        session.complete(&t2, Ok(grant("l2", Role::Viewer))).unwrap();
        assert_eq!(session.grant().unwrap().id, "l2");
    }

    #[test]
    fn clear_discards_grant_and_pending_selection() {
        let (store, mut session) = fresh();
        let t1 = session.begin("l1");
        session.complete(&t1, Ok(grant("l1", Role::Admin))).unwrap();
        let t2 = session.begin("l2");

        session.clear().unwrap();
        assert_eq!(session.state(), SessionState::NoLeagueSelected);
        assert!(store.get(SESSION_KEY).unwrap().is_none());

        let done = session.complete(&t2, Ok(grant("l2", Role::Admin))).unwrap();
        assert_eq!(done, Completion::Stale);
        assert!(session.grant().is_none());
    }

    #[test]
    fn restore_reads_stored_grant() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .set(
                SESSION_KEY,
                &serde_json::to_string(&grant("l7", Role::Viewer)).unwrap(),
            )
            .unwrap();
        let session = AccessSession::restore(store).unwrap();
        assert_eq!(session.grant().unwrap().id, "l7");
        assert_eq!(session.state(), SessionState::ViewerGranted);
    }

    #[test]
    fn restore_discards_corrupt_blob() {
        let store = Arc::new(MemorySessionStore::new());
        store.set(SESSION_KEY, "{not json").unwrap();
        let session = AccessSession::restore(store.clone()).unwrap();
        assert!(session.grant().is_none());
        assert!(store.get(SESSION_KEY).unwrap().is_none());
    }
}
