//! Upgrading older configuration files
//!
//! Each step rewrites the raw TOML table in place. Steps run in order on
//! every load; a step that finds nothing to do is a no-op, so configs at any
//! older version converge on the current shape.

use crate::config::schema::SCHEMA_VERSION;
use toml::{Table, Value};
use tracing::{debug, warn};

/// One upgrade rule
pub struct MigrationStep {
    /// Short description for debug logs
    pub name: &'static str,
    /// Rewrite the table, returning whether anything changed
    pub apply: fn(&mut Table) -> bool,
}

/// Upgrade rules, oldest first
pub const STEPS: &[MigrationStep] = &[
    MigrationStep {
        name: "auth_header table to token",
        apply: auth_header_to_token,
    },
    MigrationStep {
        name: "private_token to token",
        apply: private_token_to_token,
    },
    MigrationStep {
        name: "default token_type",
        apply: default_token_type,
    },
    MigrationStep {
        name: "warn on leftover private_token",
        apply: leftover_private_token,
    },
];

/// Apply every step and stamp the current schema version
///
/// Returns whether the table changed.
pub fn migrate(table: &mut Table) -> bool {
    let mut changed = false;
    for step in STEPS {
        if (step.apply)(table) {
            debug!("Config migration applied: {}", step.name);
            changed = true;
        }
    }

    let version = Value::Integer(i64::from(SCHEMA_VERSION));
    if table.get("schema_version") != Some(&version) {
        table.insert("schema_version".to_string(), version);
        changed = true;
    }
    changed
}

/// `auth_header = { PRIVATE-TOKEN = ".." }` or `{ BUILD-TOKEN = ".." }`
fn auth_header_to_token(table: &mut Table) -> bool {
    if table.contains_key("token") {
        return false;
    }
    let Some(Value::Table(header)) = table.get("auth_header") else {
        return false;
    };

    let found = [
        ("PRIVATE-TOKEN", "private"),
        ("JOB-TOKEN", "job"),
        ("BUILD-TOKEN", "job"),
    ]
    .iter()
    .find_map(|(name, kind)| match header.get(*name) {
        Some(Value::String(token)) => Some((token.clone(), *kind)),
        _ => None,
    });

    let Some((token, kind)) = found else {
        return false;
    };
    table.remove("auth_header");
    table.insert("token".to_string(), Value::String(token));
    table
        .entry("token_type")
        .or_insert_with(|| Value::String(kind.to_string()));
    true
}

fn private_token_to_token(table: &mut Table) -> bool {
    if table.contains_key("token") {
        return false;
    }
    match table.remove("private_token") {
        Some(token) => {
            table.insert("token".to_string(), token);
            true
        }
        None => false,
    }
}

fn default_token_type(table: &mut Table) -> bool {
    if table.contains_key("token_type") {
        return false;
    }
    table.insert(
        "token_type".to_string(),
        Value::String("private".to_string()),
    );
    true
}

fn leftover_private_token(table: &mut Table) -> bool {
    if table.contains_key("private_token") && table.contains_key("token") {
        warn!(
            "Config includes both \"token\" and \"private_token\" elements. Only the \"token\" value will be used."
        );
    }
    false
}
