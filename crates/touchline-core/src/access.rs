// Role resolution: who may administer a league.
//
// An identity is an admin of a league if it is on the global admin roster or
// created the league; everyone else, anonymous visitors included, is a
// viewer. The grant keeps both reasons alongside the collapsed role.

use futures_util::future::try_join;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{AdminUser, League};
use crate::repo::Repository;
use crate::store::DataStore;

/// The signed-in user, as reported by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Viewer,
}

/// Session-scoped access decision for one league. Serialized with the field
/// names the session store has always used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    /// League id.
    pub id: String,
    /// League display name.
    pub name: String,
    #[serde(rename = "logo_url", default)]
    pub logo_url: Option<String>,
    pub user_role: Role,
    pub user_email: String,
    pub is_global_admin: bool,
    pub is_league_creator: bool,
    pub created_by: Option<String>,
}

impl AccessGrant {
    pub fn league_id(&self) -> &str {
        &self.id
    }

    pub fn is_admin(&self) -> bool {
        self.user_role == Role::Admin
    }

    /// Short reason for display: why this grant is (or isn't) an admin one.
    pub fn reason(&self) -> &'static str {
        match (self.is_global_admin, self.is_league_creator) {
            (true, true) => "global admin and league creator",
            (true, false) => "global admin",
            (false, true) => "league creator",
            (false, false) => "viewer",
        }
    }
}

/// Whether `identity` appears on the admin roster: an entry linked to the
/// same user id, or an unlinked entry with the same (non-empty) email.
pub fn is_global_admin(identity: &Identity, admins: &[AdminUser]) -> bool {
    admins.iter().any(|entry| match &entry.user_id {
        Some(user_id) => *user_id == identity.id,
        None => !identity.email.is_empty() && entry.email == identity.email,
    })
}

/// Resolve the role of `identity` over `league`. Pure and idempotent.
pub fn resolve_role(
    identity: Option<&Identity>,
    league: &League,
    admins: &[AdminUser],
) -> AccessGrant {
    let (is_global_admin, is_league_creator, user_email) = match identity {
        Some(who) => (
            is_global_admin(who, admins),
            league.created_by.as_deref() == Some(who.id.as_str()),
            who.email.clone(),
        ),
        None => (false, false, String::new()),
    };

    let user_role = if is_global_admin || is_league_creator {
        Role::Admin
    } else {
        Role::Viewer
    };

    AccessGrant {
        id: league.id.clone(),
        name: league.name.clone(),
        logo_url: league.logo_url.clone(),
        user_role,
        user_email,
        is_global_admin,
        is_league_creator,
        created_by: league.created_by.clone(),
    }
}

/// Fetch the league and the identity's roster entries (concurrently) and
/// resolve the grant. A missing league fails with `LeagueNotFound`; a
/// missing roster entry simply means "not a global admin".
pub async fn resolve_access<S: DataStore + ?Sized>(
    store: &S,
    identity: Option<&Identity>,
    league_id: &str,
) -> Result<AccessGrant> {
    let repo = Repository::new(store);
    let roster = async {
        match identity {
            Some(who) => repo.admin_entries_for(who).await,
            None => Ok(Vec::new()),
        }
    };

    let (league, admins) = try_join(repo.find_league(league_id), roster).await?;
    let league = league.ok_or_else(|| Error::LeagueNotFound(league_id.to_string()))?;

    let grant = resolve_role(identity, &league, &admins);
    debug!(
        "Resolved {:?} access to league {} ({})",
        grant.user_role,
        league_id,
        grant.reason()
    );
    Ok(grant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity(id: &str, email: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: email.to_string(),
        }
    }

    fn league(created_by: Option<&str>) -> League {
        League {
            id: "league-1".into(),
            name: "Sunday League".into(),
            description: None,
            logo_url: Some("https://img/logo.png".into()),
            rules: None,
            start_date: None,
            end_date: None,
            status: Some("active".into()),
            created_by: created_by.map(String::from),
            created_at: None,
            updated_at: None,
        }
    }

    fn admin(user_id: Option<&str>, email: &str) -> AdminUser {
        AdminUser {
            id: format!("admin-{email}"),
            user_id: user_id.map(String::from),
            email: email.to_string(),
            role: Some("admin".into()),
        }
    }

    #[test]
    fn email_only_roster_entry_grants_global_admin() {
        let who = identity("u1", "u1@x.com");
        let grant = resolve_role(Some(&who), &league(Some("u2")), &[admin(None, "u1@x.com")]);
        assert_eq!(grant.user_role, Role::Admin);
        assert!(grant.is_global_admin);
        assert!(!grant.is_league_creator);
        assert_eq!(grant.user_email, "u1@x.com");
    }

    #[test]
    fn linked_entry_for_another_user_does_not_match_by_email() {
        let who = identity("u1", "u1@x.com");
        let grant = resolve_role(
            Some(&who),
            &league(Some("u2")),
            &[admin(Some("u9"), "u1@x.com")],
        );
        assert_eq!(grant.user_role, Role::Viewer);
        assert!(!grant.is_global_admin);
    }

    #[test]
    fn linked_entry_matches_by_user_id() {
        let who = identity("u1", "new-address@x.com");
        let grant = resolve_role(
            Some(&who),
            &league(None),
            &[admin(Some("u1"), "old-address@x.com")],
        );
        assert!(grant.is_global_admin);
        assert!(grant.is_admin());
    }

    #[test]
    fn creator_is_admin_without_roster_entry() {
        let who = identity("u2", "u2@x.com");
        let grant = resolve_role(Some(&who), &league(Some("u2")), &[]);
        assert_eq!(grant.user_role, Role::Admin);
        assert!(!grant.is_global_admin);
        assert!(grant.is_league_creator);
        assert_eq!(grant.reason(), "league creator");
    }

    #[test]
    fn creator_absent_means_not_creator() {
        let who = identity("u2", "u2@x.com");
        let grant = resolve_role(Some(&who), &league(None), &[]);
        assert_eq!(grant.user_role, Role::Viewer);
        assert!(!grant.is_league_creator);
    }

    #[test]
    fn anonymous_is_always_viewer() {
        let grant = resolve_role(None, &league(Some("u2")), &[admin(None, "")]);
        assert_eq!(grant.user_role, Role::Viewer);
        assert!(!grant.is_global_admin);
        assert!(!grant.is_league_creator);
        assert_eq!(grant.user_email, "");
    }

    #[test]
    fn empty_email_never_matches_unlinked_entries() {
        let who = identity("u3", "");
        assert!(!is_global_admin(&who, &[admin(None, "")]));
    }

    #[test]
    fn resolution_is_idempotent() {
        let who = identity("u1", "u1@x.com");
        let roster = [admin(None, "u1@x.com")];
        let l = league(Some("u1"));
        assert_eq!(
            resolve_role(Some(&who), &l, &roster),
            resolve_role(Some(&who), &l, &roster)
        );
    }

    #[test]
    fn grant_serializes_with_session_field_names() {
        let who = identity("u1", "u1@x.com");
        let grant = resolve_role(Some(&who), &league(Some("u1")), &[]);
        assert_eq!(
            serde_json::to_value(&grant).unwrap(),
            json!({
                "id": "league-1",
                "name": "Sunday League",
                "logo_url": "https://img/logo.png",
                "userRole": "admin",
                "userEmail": "u1@x.com",
                "isGlobalAdmin": false,
                "isLeagueCreator": true,
                "createdBy": "u1",
            })
        );
    }
}
