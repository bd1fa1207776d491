use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use keyhub_types::models::WhitelistEntry;

use super::void_claimed_keys;
use crate::Database;
use crate::models::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitelistImport {
    pub added: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitelistRemoval {
    pub removed: usize,
    /// Live keys voided because their holder lost whitelist membership.
    pub voided_keys: usize,
}

fn query_entry(conn: &Connection, qq_number: i64) -> rusqlite::Result<Option<WhitelistEntry>> {
    conn.query_row(
        "SELECT qq_number, created_at FROM whitelist WHERE qq_number = ?1",
        [qq_number],
        |row| {
            Ok(WhitelistEntry {
                qq_number: row.get(0)?,
                created_at: timestamp(row, 1)?,
            })
        },
    )
    .optional()
}

impl Database {
    pub fn list_whitelist(&self) -> Result<Vec<WhitelistEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT qq_number, created_at FROM whitelist ORDER BY created_at DESC, qq_number DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(WhitelistEntry {
                        qq_number: row.get(0)?,
                        created_at: timestamp(row, 1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every whitelisted id, for set comparisons.
    pub fn whitelist_numbers(&self) -> Result<BTreeSet<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT qq_number FROM whitelist")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<BTreeSet<i64>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns `None` if the id is already whitelisted.
    pub fn add_to_whitelist(&self, qq_number: i64) -> Result<Option<WhitelistEntry>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO whitelist (qq_number) VALUES (?1)",
                [qq_number],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(query_entry(conn, qq_number)?)
        })
    }

    pub fn add_many_to_whitelist(&self, numbers: &[i64]) -> Result<WhitelistImport> {
        let unique: BTreeSet<i64> = numbers.iter().copied().collect();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut added = 0;
            {
                let mut stmt = tx.prepare("INSERT OR IGNORE INTO whitelist (qq_number) VALUES (?1)")?;
                for qq in &unique {
                    added += stmt.execute([qq])?;
                }
            }
            tx.commit()?;
            Ok(WhitelistImport {
                added,
                duplicates: numbers.len() - added,
            })
        })
    }

    /// Remove ids from the whitelist and void any key they currently hold.
    pub fn remove_from_whitelist(&self, numbers: &[i64]) -> Result<WhitelistRemoval> {
        let unique: BTreeSet<i64> = numbers.iter().copied().collect();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut outcome = WhitelistRemoval { removed: 0, voided_keys: 0 };
            for qq in &unique {
                let removed = tx.execute("DELETE FROM whitelist WHERE qq_number = ?1", [qq])?;
                if removed > 0 {
                    outcome.removed += removed;
                    outcome.voided_keys += void_claimed_keys(&tx, *qq, false)?;
                }
            }
            tx.commit()?;
            Ok(outcome)
        })
    }
}
