//! Table layout and integrity rules for identity data.
//!
//! The DDL lives in `db/sql/schema.sql`. [`CONSTRAINTS`] restates every key
//! the DDL declares so that a live database can be checked against it with
//! [`verify`]; each constraint name here must match the name in the script.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::{Instrument, debug, info, info_span, instrument};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/db/sql/schema.sql"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    User,
    Account,
    Session,
    VerificationToken,
    Authenticator,
}

impl Table {
    pub const ALL: [Self; 5] = [
        Self::User,
        Self::Account,
        Self::Session,
        Self::VerificationToken,
        Self::Authenticator,
    ];

    /// Table name as stored in the database.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Account => "account",
            Self::Session => "session",
            Self::VerificationToken => "verificationToken",
            Self::Authenticator => "authenticator",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey(&'static [&'static str]),
    Unique(&'static [&'static str]),
    ForeignKey {
        column: &'static str,
        references: Table,
        on_delete: OnDelete,
    },
}

impl ConstraintKind {
    /// `pg_constraint.contype` code.
    const fn pg_code(self) -> &'static str {
        match self {
            Self::PrimaryKey(_) => "p",
            Self::Unique(_) => "u",
            Self::ForeignKey { .. } => "f",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Constraint {
    pub name: &'static str,
    pub table: Table,
    pub kind: ConstraintKind,
}

const fn cascade_to_user(name: &'static str, table: Table) -> Constraint {
    Constraint {
        name,
        table,
        kind: ConstraintKind::ForeignKey {
            column: "user_id",
            references: Table::User,
            on_delete: OnDelete::Cascade,
        },
    }
}

pub const CONSTRAINTS: &[Constraint] = &[
    Constraint {
        name: "user_pkey",
        table: Table::User,
        kind: ConstraintKind::PrimaryKey(&["id"]),
    },
    Constraint {
        name: "user_email_unique",
        table: Table::User,
        kind: ConstraintKind::Unique(&["email"]),
    },
    Constraint {
        name: "account_provider_provider_account_id_pk",
        table: Table::Account,
        kind: ConstraintKind::PrimaryKey(&["provider", "providerAccountId"]),
    },
    cascade_to_user("account_user_id_user_id_fk", Table::Account),
    Constraint {
        name: "session_pkey",
        table: Table::Session,
        kind: ConstraintKind::PrimaryKey(&["sessionToken"]),
    },
    cascade_to_user("session_user_id_user_id_fk", Table::Session),
    Constraint {
        name: "verification_token_identifier_token_pk",
        table: Table::VerificationToken,
        kind: ConstraintKind::PrimaryKey(&["identifier", "token"]),
    },
    Constraint {
        name: "authenticator_user_id_credential_id_pk",
        table: Table::Authenticator,
        kind: ConstraintKind::PrimaryKey(&["user_id", "credentialID"]),
    },
    Constraint {
        name: "authenticator_credential_id_unique",
        table: Table::Authenticator,
        kind: ConstraintKind::Unique(&["credentialID"]),
    },
    cascade_to_user("authenticator_user_id_user_id_fk", Table::Authenticator),
];

/// Tables whose rows are removed when a row of `parent` is deleted.
pub fn cascades_from(parent: Table) -> impl Iterator<Item = Table> {
    CONSTRAINTS.iter().filter_map(move |constraint| match constraint.kind {
        ConstraintKind::ForeignKey {
            references,
            on_delete: OnDelete::Cascade,
            ..
        } if references == parent => Some(constraint.table),
        _ => None,
    })
}

/// Apply `db/sql/schema.sql`. Safe to run against an already migrated database.
///
/// # Errors
/// Returns an error if any statement fails.
#[instrument(skip(pool))]
pub async fn migrate(pool: &PgPool) -> Result<()> {
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "MIGRATE"
    );
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to apply identity schema")?;

    info!("identity schema applied");

    Ok(())
}

/// Check that every constraint in [`CONSTRAINTS`] exists on the expected table
/// with the expected kind, and that foreign keys cascade on delete.
///
/// # Errors
/// Returns an error naming every missing or mismatched constraint.
#[instrument(skip(pool))]
pub async fn verify(pool: &PgPool) -> Result<()> {
    let query = r"
        SELECT c.conname::text AS name,
               c.contype::text AS kind,
               t.relname::text AS table_name,
               c.confdeltype::text AS on_delete
        FROM pg_constraint c
        JOIN pg_class t ON t.oid = c.conrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        WHERE n.nspname = current_schema()
          AND c.conname::text = ANY($1)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let names: Vec<String> = CONSTRAINTS.iter().map(|c| c.name.to_string()).collect();
    let rows = sqlx::query(query)
        .bind(&names)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to read constraints")?;

    let mut problems = Vec::new();
    for constraint in CONSTRAINTS {
        let found = rows
            .iter()
            .find(|row| row.get::<String, _>("name") == constraint.name);
        let Some(row) = found else {
            problems.push(format!("{} missing", constraint.name));
            continue;
        };

        let table_name: String = row.get("table_name");
        let kind: String = row.get("kind");
        let on_delete: String = row.get("on_delete");

        if table_name != constraint.table.name() {
            problems.push(format!(
                "{} is on table {table_name}, expected {}",
                constraint.name,
                constraint.table.name()
            ));
        }
        if kind != constraint.kind.pg_code() {
            problems.push(format!("{} has kind {kind}", constraint.name));
        }
        if let ConstraintKind::ForeignKey {
            on_delete: OnDelete::Cascade,
            ..
        } = constraint.kind
            && on_delete != "c"
        {
            problems.push(format!("{} does not cascade on delete", constraint.name));
        }
    }

    if problems.is_empty() {
        debug!("verified {} constraints", CONSTRAINTS.len());
        Ok(())
    } else {
        Err(anyhow!("identity schema mismatch: {}", problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_constraint_is_declared_in_the_script() {
        for constraint in CONSTRAINTS {
            assert!(
                SCHEMA_SQL.contains(&format!("CONSTRAINT {} ", constraint.name)),
                "{} not found in schema.sql",
                constraint.name
            );
        }
    }

    #[test]
    fn every_table_is_created_by_the_script() {
        for table in Table::ALL {
            let quoted = format!("CREATE TABLE IF NOT EXISTS \"{}\"", table.name());
            let bare = format!("CREATE TABLE IF NOT EXISTS {}", table.name());
            assert!(
                SCHEMA_SQL.contains(&quoted) || SCHEMA_SQL.contains(&bare),
                "{} not created in schema.sql",
                table.name()
            );
        }
    }

    #[test]
    fn constraint_names_are_unique() {
        let names: HashSet<_> = CONSTRAINTS.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), CONSTRAINTS.len());
    }

    #[test]
    fn user_deletion_cascades_to_owned_tables() {
        let cascaded: HashSet<_> = cascades_from(Table::User).collect();
        assert_eq!(
            cascaded,
            HashSet::from([Table::Account, Table::Session, Table::Authenticator])
        );
        assert!(!cascaded.contains(&Table::VerificationToken));
    }

    #[test]
    fn every_table_has_a_primary_key() {
        for table in Table::ALL {
            assert!(
                CONSTRAINTS.iter().any(|c| c.table == table
                    && matches!(c.kind, ConstraintKind::PrimaryKey(_))),
                "{} has no primary key",
                table.name()
            );
        }
    }
}
