use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::params_from_iter;
use rusqlite::types::Value;

use keyhub_types::models::AuditLog;

use crate::Database;
use crate::models::timestamp;

/// Filters for the admin log view. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct AuditLogFilter {
    pub search: Option<String>,
    pub date: Option<NaiveDate>,
    pub admin: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for AuditLogFilter {
    fn default() -> Self {
        Self {
            search: None,
            date: None,
            admin: None,
            page: 1,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditLogPage {
    pub logs: Vec<AuditLog>,
    /// Matching entries across all pages.
    pub total: i64,
}

/// `%term%` with LIKE wildcards in the term escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

impl Database {
    pub fn append_audit_log(&self, admin_id: i64, action: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_logs (admin_id, action) VALUES (?1, ?2)",
                rusqlite::params![admin_id, action],
            )?;
            Ok(())
        })
    }

    pub fn query_audit_logs(&self, filter: &AuditLogFilter) -> Result<AuditLogPage> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("l.action LIKE ? ESCAPE '\\'");
            args.push(Value::Text(like_pattern(search)));
        }
        if let Some(date) = filter.date {
            clauses.push("date(l.created_at) = ?");
            args.push(Value::Text(date.format("%Y-%m-%d").to_string()));
        }
        if let Some(admin) = filter.admin.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("a.username LIKE ? ESCAPE '\\'");
            args.push(Value::Text(like_pattern(admin)));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = filter.limit.max(1);
        let offset = (filter.page.max(1) - 1) as i64 * limit as i64;

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM audit_logs l LEFT JOIN admins a ON a.id = l.admin_id {where_sql}"
                ),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            let mut page_args = args.clone();
            page_args.push(Value::Integer(limit as i64));
            page_args.push(Value::Integer(offset));

            let mut stmt = conn.prepare(&format!(
                "SELECT l.id, l.admin_id, a.username, l.action, l.created_at
                 FROM audit_logs l
                 LEFT JOIN admins a ON a.id = l.admin_id
                 {where_sql}
                 ORDER BY l.created_at DESC, l.id DESC
                 LIMIT ? OFFSET ?"
            ))?;
            let logs = stmt
                .query_map(params_from_iter(page_args.iter()), |row| {
                    Ok(AuditLog {
                        id: row.get(0)?,
                        admin_id: row.get(1)?,
                        admin_username: row.get(2)?,
                        action: row.get(3)?,
                        created_at: timestamp(row, 4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(AuditLogPage { logs, total })
        })
    }

    /// Purge the whole log. Returns the number of entries removed.
    pub fn clear_audit_logs(&self) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM audit_logs", [])?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testutil::db;

    fn filter() -> AuditLogFilter {
        AuditLogFilter::default()
    }

    #[test]
    fn newest_first_with_pagination() {
        let db = db();
        let admin = db.create_admin("root", "h").unwrap().unwrap();
        for i in 0..5 {
            db.append_audit_log(admin.id, &format!("action {i}")).unwrap();
        }

        let page = db
            .query_audit_logs(&AuditLogFilter { page: 2, limit: 2, ..filter() })
            .unwrap();
        assert_eq!(page.total, 5);
        let actions: Vec<&str> = page.logs.iter().map(|l| l.action.as_str()).collect();
        assert_eq!(actions, vec!["action 2", "action 1"]);
        assert_eq!(page.logs[0].admin_username.as_deref(), Some("root"));
    }

    #[test]
    fn search_escapes_wildcards() {
        let db = db();
        let admin = db.create_admin("root", "h").unwrap().unwrap();
        db.append_audit_log(admin.id, "granted 100% of points").unwrap();
        db.append_audit_log(admin.id, "granted 100 points").unwrap();

        let page = db
            .query_audit_logs(&AuditLogFilter { search: Some("100%".into()), ..filter() })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.logs[0].action, "granted 100% of points");
    }

    #[test]
    fn filters_by_admin_and_date() {
        let db = db();
        let root = db.create_admin("root", "h").unwrap().unwrap();
        let ops = db.create_admin("ops", "h").unwrap().unwrap();
        db.append_audit_log(root.id, "a").unwrap();
        db.append_audit_log(ops.id, "b").unwrap();

        let page = db
            .query_audit_logs(&AuditLogFilter { admin: Some("op".into()), ..filter() })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.logs[0].action, "b");

        let today = chrono::Utc::now().date_naive();
        let page = db
            .query_audit_logs(&AuditLogFilter { date: Some(today), ..filter() })
            .unwrap();
        assert_eq!(page.total, 2);

        let page = db
            .query_audit_logs(&AuditLogFilter {
                date: NaiveDate::from_ymd_opt(2001, 1, 1),
                ..filter()
            })
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn entries_outlive_their_admin() {
        let db = db();
        let a = db.create_admin("a", "h").unwrap().unwrap();
        db.create_admin("b", "h").unwrap().unwrap();
        db.append_audit_log(a.id, "before leaving").unwrap();
        db.delete_admin(a.id).unwrap();

        let page = db.query_audit_logs(&filter()).unwrap();
        assert_eq!(page.logs[0].admin_id, a.id);
        assert!(page.logs[0].admin_username.is_none());

        assert_eq!(db.clear_audit_logs().unwrap(), 1);
        assert_eq!(db.query_audit_logs(&filter()).unwrap().total, 0);
    }
}
