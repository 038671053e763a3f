use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{Database, User};

/// A user as declared in `users.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticUser {
    pub id: String,
    pub name: String,
}

impl StaticUser {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

pub fn default_users() -> Vec<StaticUser> {
    vec![StaticUser::new("A", "A"), StaticUser::new("B", "B")]
}

/// Keep entries with a non-blank, unique id. Blank names fall back to the id.
/// Numeric ids are accepted and stringified.
pub fn sanitize_users(raw: &Value) -> Result<Vec<StaticUser>> {
    let entries = raw
        .as_array()
        .context("expected an array of users")?;

    let mut seen = HashSet::new();
    let mut users = Vec::new();
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let id = match obj.get("id") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if id.is_empty() || !seen.insert(id.clone()) {
            continue;
        }
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&id)
            .to_string();
        users.push(StaticUser { id, name });
    }

    if users.is_empty() {
        anyhow::bail!("no valid users defined");
    }
    Ok(users)
}

/// Read `users.json`. A missing or unusable file is replaced with the
/// default users, which are returned.
pub fn load_users_file(path: &Path) -> Result<Vec<StaticUser>> {
    if !path.exists() {
        let users = default_users();
        write_users_file(path, &users)?;
        tracing::info!(path = %path.display(), "created default users file");
        return Ok(users);
    }

    let parsed = std::fs::read_to_string(path)
        .context("failed to read users file")
        .and_then(|raw| serde_json::from_str::<Value>(&raw).context("invalid JSON"))
        .and_then(|value| sanitize_users(&value));

    match parsed {
        Ok(users) => Ok(users),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "restoring default users");
            let users = default_users();
            write_users_file(path, &users)?;
            Ok(users)
        }
    }
}

pub fn write_users_file(path: &Path, users: &[StaticUser]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(users)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Load the users file and make the users table match it. Returns the users
/// in file order with their stored preferences.
pub fn initialize_users(db: &Database, path: &Path) -> Result<Vec<User>> {
    let users = load_users_file(path)?;
    let pairs: Vec<(String, String)> = users
        .iter()
        .map(|u| (u.id.clone(), u.name.clone()))
        .collect();
    db.sync_users(&pairs)?;

    let mut out = Vec::with_capacity(users.len());
    for user in &users {
        if let Some(record) = db.get_user(&user.id)? {
            out.push(record);
        }
    }
    Ok(out)
}
