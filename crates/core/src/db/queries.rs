//! Typed query helpers for users and groups.
//!
//! Point lookups take the mapper's attribute name as the column to match.
//! Only whitelisted columns are accepted; the name is never taken from
//! anywhere else into the SQL text.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::Database;
use crate::errors::{CoreError, DatabaseError, LookupError, ModelError};
use crate::mapper::ObjectId;
use crate::models::{Group, User};
use crate::traversal::ObjectLookup;

const USER_COLUMNS: &str = "id, uuid, username, email, full_name, registration_source, enabled, \
                            created_at, updated_at, activated_at, last_login_at, last_login_ip";
const GROUP_COLUMNS: &str = "id, uuid, name, description, created_at, updated_at";

/// Columns a traversal mapper may look users up by.
pub const USER_LOOKUP_COLUMNS: &[&str] = &["id", "uuid", "username", "email"];

/// Columns a traversal mapper may look groups up by.
pub const GROUP_LOOKUP_COLUMNS: &[&str] = &["id", "uuid", "name"];

// ---------------------------------------------------------------------------
// Raw rows
// ---------------------------------------------------------------------------

/// A row from the `users` table before value decoding.
#[derive(Debug, Clone)]
struct UserRow {
    id: i64,
    uuid: String,
    username: Option<String>,
    email: String,
    full_name: Option<String>,
    registration_source: Option<String>,
    enabled: bool,
    created_at: String,
    updated_at: Option<String>,
    activated_at: Option<String>,
    last_login_at: Option<String>,
    last_login_ip: Option<String>,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            username: row.get(2)?,
            email: row.get(3)?,
            full_name: row.get(4)?,
            registration_source: row.get(5)?,
            enabled: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            activated_at: row.get(9)?,
            last_login_at: row.get(10)?,
            last_login_ip: row.get(11)?,
        })
    }

    fn into_user(self) -> Result<User, DatabaseError> {
        let last_login_ip = match self.last_login_ip {
            Some(raw) => Some(raw.parse::<IpAddr>().map_err(|_| DatabaseError::CorruptValue {
                column: "users.last_login_ip".into(),
                value: raw,
            })?),
            None => None,
        };

        Ok(User {
            id: self.id,
            uuid: parse_uuid("users.uuid", &self.uuid)?,
            username: self.username,
            email: self.email,
            full_name: self.full_name,
            registration_source: self.registration_source,
            enabled: self.enabled,
            created_at: parse_datetime("users.created_at", &self.created_at)?,
            updated_at: parse_optional_datetime("users.updated_at", self.updated_at)?,
            activated_at: parse_optional_datetime("users.activated_at", self.activated_at)?,
            last_login_at: parse_optional_datetime("users.last_login_at", self.last_login_at)?,
            last_login_ip,
            groups: Vec::new(),
        })
    }
}

/// A row from the `groups` table before value decoding.
#[derive(Debug, Clone)]
struct GroupRow {
    id: i64,
    uuid: String,
    name: String,
    description: Option<String>,
    created_at: String,
    updated_at: Option<String>,
}

impl GroupRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_group(self) -> Result<Group, DatabaseError> {
        Ok(Group {
            id: self.id,
            uuid: parse_uuid("groups.uuid", &self.uuid)?,
            name: self.name,
            description: self.description,
            created_at: parse_datetime("groups.created_at", &self.created_at)?,
            updated_at: parse_optional_datetime("groups.updated_at", self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- users --------------------------------------------------------------

    /// Insert a user and return the stored copy with its row id.
    pub fn insert_user(&self, user: &User) -> Result<User, DatabaseError> {
        let conn = self.conn();
        let mut stored = user.clone();
        stored.id = insert_user_with(&conn, user)?;
        Ok(stored)
    }

    /// Store a new user in one transaction: insert, assign the generated
    /// username, optionally activate, and bootstrap the admin group when the
    /// site has none.
    ///
    /// Returns the stored user and whether it was made an admin. Nothing is
    /// written if any step fails.
    pub fn register_user(&self, user: &User, activate: bool) -> Result<(User, bool), CoreError> {
        let (mut stored, admin) = self.transaction(|conn| -> Result<_, CoreError> {
            let mut stored = user.clone();
            stored.id = insert_user_with(conn, user)?;

            let username = stored.generate_username()?;
            set_username_with(conn, stored.id, &username)?;
            stored.username = Some(username);

            if activate {
                stored.activated_at = Some(activate_with(conn, stored.id)?);
            }

            let admin = bootstrap_admin_with(conn, stored.id)?;
            Ok((stored, admin))
        })?;

        let bootstrapped = match admin {
            Some(group) => {
                stored.groups.push(group);
                true
            }
            None => false,
        };
        info!(user_id = stored.id, admin = bootstrapped, "registered user");
        Ok((stored, bootstrapped))
    }

    /// Get a user by row id (returns an error if not found).
    pub fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        self.find_user("id", &ObjectId::Int(id))?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: id.to_string(),
            })
    }

    /// Find the user whose `attribute` column equals `id`, with groups loaded.
    pub fn find_user(&self, attribute: &str, id: &ObjectId) -> Result<Option<User>, DatabaseError> {
        let column = lookup_column("users", USER_LOOKUP_COLUMNS, attribute)?;
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE {} = ?1 LIMIT 1", USER_COLUMNS, column),
                params![id_value(id)],
                UserRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => {
                let mut user = row.into_user()?;
                user.groups = groups_for_user_with(&conn, user.id)?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Return up to `limit` users ordered by id.
    pub fn list_users(&self, limit: u32) -> Result<Vec<User>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY id LIMIT ?1",
            USER_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit], UserRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| {
                let mut user = row.into_user()?;
                user.groups = groups_for_user_with(&conn, user.id)?;
                Ok(user)
            })
            .collect()
    }

    /// Set (or replace) the username of a stored user.
    pub fn set_username(&self, user_id: i64, username: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        set_username_with(&conn, user_id, username)
    }

    /// Mark a stored user as activated now.
    pub fn activate_user(&self, user_id: i64) -> Result<(), DatabaseError> {
        let conn = self.conn();
        activate_with(&conn, user_id).map(|_| ())
    }

    /// Record a successful login for the security audit fields.
    pub fn record_login(&self, user_id: i64, ip: Option<IpAddr>) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE users SET last_login_at = ?1, last_login_ip = ?2 WHERE id = ?3",
            params![now, ip.map(|ip| ip.to_string()), user_id],
        )?;
        ensure_changed(changed, "user", user_id)?;
        debug!(user_id, "recorded login");
        Ok(())
    }

    // -- groups -------------------------------------------------------------

    /// Insert a group and return the stored copy with its row id.
    pub fn insert_group(&self, group: &Group) -> Result<Group, DatabaseError> {
        let conn = self.conn();
        let id = insert_group_with(&conn, group)?;
        let mut stored = group.clone();
        stored.id = id;
        Ok(stored)
    }

    /// Find the group whose `attribute` column equals `id`.
    pub fn find_group(&self, attribute: &str, id: &ObjectId) -> Result<Option<Group>, DatabaseError> {
        let column = lookup_column("groups", GROUP_LOOKUP_COLUMNS, attribute)?;
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM groups WHERE {} = ?1 LIMIT 1", GROUP_COLUMNS, column),
                params![id_value(id)],
                GroupRow::from_row,
            )
            .optional()?;
        row.map(GroupRow::into_group).transpose()
    }

    pub fn count_groups(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        count_groups_with(&conn)
    }

    /// Add a user to a group. Adding an existing member is a no-op.
    pub fn add_user_to_group(&self, user_id: i64, group_id: i64) -> Result<(), DatabaseError> {
        let conn = self.conn();
        add_member_with(&conn, user_id, group_id)
    }

    pub fn groups_for_user(&self, user_id: i64) -> Result<Vec<Group>, DatabaseError> {
        let conn = self.conn();
        groups_for_user_with(&conn, user_id)
    }

    // -- site bootstrap -----------------------------------------------------

    /// Create the admin group and make `user` its first member.
    ///
    /// Does nothing and returns `false` when any group already exists.
    pub fn init_empty_site(&self, user: &mut User) -> Result<bool, DatabaseError> {
        let admin = self.transaction(|conn| bootstrap_admin_with(conn, user.id))?;

        match admin {
            Some(group) => {
                info!(user_id = user.id, group_id = group.id, "initialized empty site with admin user");
                user.groups.push(group);
                Ok(true)
            }
            None => {
                debug!(user_id = user.id, "site already has groups, skipping init");
                Ok(false)
            }
        }
    }

    /// Call after creating a user to see whether they are the first user and
    /// should receive admin rights.
    pub fn check_empty_site_init(&self, user: &mut User) -> Result<bool, CoreError> {
        if user.id <= 0 {
            return Err(ModelError::NotPersisted {
                entity: "user".into(),
            }
            .into());
        }
        Ok(self.init_empty_site(user)?)
    }

    /// Traversal adapter over the `users` table.
    pub fn users(&self) -> UserLookup<'_> {
        UserLookup { db: self }
    }

    /// Traversal adapter over the `groups` table.
    pub fn groups(&self) -> GroupLookup<'_> {
        GroupLookup { db: self }
    }
}

// ---------------------------------------------------------------------------
// Traversal adapters
// ---------------------------------------------------------------------------

/// Resolves traversal ids against the `users` table.
pub struct UserLookup<'a> {
    db: &'a Database,
}

impl ObjectLookup for UserLookup<'_> {
    type Object = User;

    fn lookup(&self, attribute: &str, id: &ObjectId) -> Result<Option<User>, LookupError> {
        Ok(self.db.find_user(attribute, id)?)
    }
}

/// Resolves traversal ids against the `groups` table.
pub struct GroupLookup<'a> {
    db: &'a Database,
}

impl ObjectLookup for GroupLookup<'_> {
    type Object = Group;

    fn lookup(&self, attribute: &str, id: &ObjectId) -> Result<Option<Group>, LookupError> {
        Ok(self.db.find_group(attribute, id)?)
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers (usable inside transactions)
// ---------------------------------------------------------------------------

fn insert_user_with(conn: &Connection, user: &User) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO users (uuid, username, email, full_name, registration_source, enabled,
         created_at, updated_at, activated_at, last_login_at, last_login_ip)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            user.uuid.to_string(),
            user.username,
            user.email,
            user.full_name,
            user.registration_source,
            user.enabled,
            user.created_at.to_rfc3339(),
            user.updated_at.map(|t| t.to_rfc3339()),
            user.activated_at.map(|t| t.to_rfc3339()),
            user.last_login_at.map(|t| t.to_rfc3339()),
            user.last_login_ip.map(|ip| ip.to_string()),
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, email = %user.email, "inserted user");
    Ok(id)
}

fn set_username_with(conn: &Connection, user_id: i64, username: &str) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE users SET username = ?1, updated_at = ?2 WHERE id = ?3",
        params![username, now, user_id],
    )?;
    ensure_changed(changed, "user", user_id)?;
    debug!(user_id, username, "set username");
    Ok(())
}

fn activate_with(conn: &Connection, user_id: i64) -> Result<DateTime<Utc>, DatabaseError> {
    let now = Utc::now();
    let changed = conn.execute(
        "UPDATE users SET activated_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), user_id],
    )?;
    ensure_changed(changed, "user", user_id)?;
    debug!(user_id, "activated user");
    Ok(now)
}

/// Create the admin group with `user_id` as its only member, unless any
/// group exists already.
fn bootstrap_admin_with(conn: &Connection, user_id: i64) -> Result<Option<Group>, DatabaseError> {
    if count_groups_with(conn)? > 0 {
        return Ok(None);
    }
    let mut group = Group::new(User::GROUP_ADMIN);
    group.id = insert_group_with(conn, &group)?;
    add_member_with(conn, user_id, group.id)?;
    Ok(Some(group))
}

fn insert_group_with(conn: &Connection, group: &Group) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO groups (uuid, name, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            group.uuid.to_string(),
            group.name,
            group.description,
            group.created_at.to_rfc3339(),
            group.updated_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, name = %group.name, "inserted group");
    Ok(id)
}

fn count_groups_with(conn: &Connection) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM groups", [], |row| row.get(0))?;
    Ok(count)
}

fn add_member_with(conn: &Connection, user_id: i64, group_id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
        params![user_id, group_id],
    )?;
    debug!(user_id, group_id, "added group member");
    Ok(())
}

fn groups_for_user_with(conn: &Connection, user_id: i64) -> Result<Vec<Group>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.uuid, g.name, g.description, g.created_at, g.updated_at
         FROM groups g JOIN user_groups ug ON ug.group_id = g.id
         WHERE ug.user_id = ?1 ORDER BY g.id",
    )?;
    let rows = stmt
        .query_map(params![user_id], GroupRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(GroupRow::into_group).collect()
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

fn lookup_column(
    table: &str,
    allowed: &'static [&'static str],
    attribute: &str,
) -> Result<&'static str, DatabaseError> {
    allowed
        .iter()
        .copied()
        .find(|c| *c == attribute)
        .ok_or_else(|| DatabaseError::UnknownColumn {
            table: table.to_string(),
            attribute: attribute.to_string(),
        })
}

fn id_value(id: &ObjectId) -> Value {
    match id {
        ObjectId::Int(n) => Value::Integer(*n),
        ObjectId::Uuid(u) => Value::Text(u.to_string()),
        ObjectId::Text(s) => Value::Text(s.clone()),
    }
}

fn ensure_changed(changed: usize, entity: &str, id: i64) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn parse_uuid(column: &str, raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|_| DatabaseError::CorruptValue {
        column: column.to_string(),
        value: raw.to_string(),
    })
}

fn parse_datetime(column: &str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::CorruptValue {
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn parse_optional_datetime(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    raw.map(|s| parse_datetime(column, &s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_user_crud() {
        let db = setup_db();
        let mut user = User::new("alice@example.com");
        user.full_name = Some("Alice Smith".into());
        user.last_login_ip = Some("10.0.0.1".parse().unwrap());

        let stored = db.insert_user(&user).unwrap();
        assert!(stored.id > 0);

        let loaded = db.get_user(stored.id).unwrap();
        assert_eq!(loaded.uuid, user.uuid);
        assert_eq!(loaded.full_name.as_deref(), Some("Alice Smith"));
        assert_eq!(loaded.last_login_ip, user.last_login_ip);
        assert!(!loaded.is_activated());

        db.activate_user(stored.id).unwrap();
        db.set_username(stored.id, "alice").unwrap();
        let loaded = db.get_user(stored.id).unwrap();
        assert!(loaded.can_login());
        assert_eq!(loaded.username.as_deref(), Some("alice"));
        assert!(loaded.updated_at.is_some());
    }

    #[test]
    fn test_get_missing_user() {
        let db = setup_db();
        assert!(matches!(db.get_user(42), Err(DatabaseError::NotFound { .. })));
        assert!(matches!(db.activate_user(42), Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn test_find_user_by_each_column() {
        let db = setup_db();
        let mut user = User::new("bob@example.com");
        user.username = Some("bob".into());
        let stored = db.insert_user(&user).unwrap();

        let by_id = db.find_user("id", &ObjectId::Int(stored.id)).unwrap();
        let by_uuid = db.find_user("uuid", &ObjectId::Uuid(user.uuid)).unwrap();
        let by_name = db.find_user("username", &"bob".into()).unwrap();
        let by_email = db.find_user("email", &"bob@example.com".into()).unwrap();
        for found in [by_id, by_uuid, by_name, by_email] {
            assert_eq!(found.map(|u| u.id), Some(stored.id));
        }

        assert!(db.find_user("uuid", &ObjectId::Uuid(Uuid::new_v4())).unwrap().is_none());
    }

    #[test]
    fn test_unknown_lookup_column_rejected() {
        let db = setup_db();
        let err = db.find_user("password", &"x".into()).unwrap_err();
        assert!(matches!(err, DatabaseError::UnknownColumn { .. }));

        let err = db.find_group("id; DROP TABLE groups", &ObjectId::Int(1)).unwrap_err();
        assert!(matches!(err, DatabaseError::UnknownColumn { .. }));
        assert_eq!(db.count_groups().unwrap(), 0);
    }

    #[test]
    fn test_group_membership() {
        let db = setup_db();
        let user = db.insert_user(&User::new("carol@example.com")).unwrap();
        let editors = db.insert_group(&Group::new("editors")).unwrap();

        db.add_user_to_group(user.id, editors.id).unwrap();
        db.add_user_to_group(user.id, editors.id).unwrap();

        let groups = db.groups_for_user(user.id).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "editors");

        let loaded = db.get_user(user.id).unwrap();
        assert!(loaded.is_in_group("editors"));
        assert!(!loaded.is_admin());
    }

    #[test]
    fn test_first_user_becomes_admin() {
        let db = setup_db();
        let mut first = db.insert_user(&User::new("first@example.com")).unwrap();
        let mut second = db.insert_user(&User::new("second@example.com")).unwrap();

        assert!(db.check_empty_site_init(&mut first).unwrap());
        assert!(first.is_admin());
        assert!(db.get_user(first.id).unwrap().is_admin());

        assert!(!db.check_empty_site_init(&mut second).unwrap());
        assert!(!second.is_admin());
        assert_eq!(db.count_groups().unwrap(), 1);
    }

    #[test]
    fn test_check_empty_site_requires_stored_user() {
        let db = setup_db();
        let mut user = User::new("unsaved@example.com");
        let err = db.check_empty_site_init(&mut user).unwrap_err();
        assert!(matches!(err, CoreError::Model(ModelError::NotPersisted { .. })));
        assert_eq!(db.count_groups().unwrap(), 0);
    }

    #[test]
    fn test_register_user_bootstraps_first_admin() {
        let db = setup_db();
        let (first, admin) = db.register_user(&User::new("first@example.com"), true).unwrap();
        assert!(admin);
        assert!(first.is_admin());
        assert_eq!(first.username, Some(format!("user-{}", first.id)));

        let loaded = db.get_user(first.id).unwrap();
        assert!(loaded.can_login());
        assert!(loaded.is_admin());
        assert_eq!(loaded.username, first.username);

        let (second, admin) = db.register_user(&User::new("second@example.com"), false).unwrap();
        assert!(!admin);
        assert!(!second.is_admin());
        assert!(!db.get_user(second.id).unwrap().is_activated());
    }

    #[test]
    fn test_register_user_rolls_back_on_failure() {
        let db = setup_db();
        // Squat on the username the next registered user would be given.
        let mut squatter = User::new("squatter@example.com");
        squatter.username = Some("user-2".into());
        db.insert_user(&squatter).unwrap();

        let err = db.register_user(&User::new("late@example.com"), true).unwrap_err();
        assert!(matches!(err, CoreError::Database(DatabaseError::SqliteError(_))));

        let users = db.list_users(10).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "squatter@example.com");
        assert_eq!(db.count_groups().unwrap(), 0);
    }

    #[test]
    fn test_record_login() {
        let db = setup_db();
        let user = db.insert_user(&User::new("dave@example.com")).unwrap();
        db.record_login(user.id, Some("::1".parse().unwrap())).unwrap();

        let loaded = db.get_user(user.id).unwrap();
        assert!(loaded.last_login_at.is_some());
        assert_eq!(loaded.last_login_ip, Some("::1".parse().unwrap()));
    }

    #[test]
    fn test_list_users() {
        let db = setup_db();
        for i in 0..5 {
            db.insert_user(&User::new(format!("u{}@example.com", i))).unwrap();
        }
        let users = db.list_users(3).unwrap();
        assert_eq!(users.len(), 3);
        assert_eq!(users[0].email, "u0@example.com");
    }
}
