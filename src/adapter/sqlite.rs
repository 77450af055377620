//! SQLite rules table
//!
//! Rows are `(id, ptype, v0, ..., v5)`; unused trailing columns hold `''`.
//! Tables created elsewhere may hold NULL there instead, which reads as `''`.
//! Each mutation runs in one transaction.

use super::{load_row, Adapter};
use crate::error::{Error, Result};
use crate::model::Model;
use crate::validation::TableName;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info};

/// Widest rule the table can hold
pub const MAX_FIELDS: usize = 6;

const COLUMNS: [&str; MAX_FIELDS] = ["v0", "v1", "v2", "v3", "v4", "v5"];

fn sql_error(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Error {
    let context = context.into();
    move |e| Error::store(context, e)
}

/// Policy store in a SQLite table
pub struct SqliteAdapter {
    conn: Connection,
    table: TableName,
}

impl SqliteAdapter {
    /// Open (or create) the database at `path` and ensure the rules table exists
    pub fn open(path: impl AsRef<Path>, table: TableName) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(sql_error(format!("opening {}", path.display())))?;
        Self::from_connection(conn, table)
    }

    /// Private in-memory database
    pub fn in_memory(table: TableName) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error("opening in-memory database"))?;
        Self::from_connection(conn, table)
    }

    /// Use an existing connection, creating the rules table if needed
    pub fn from_connection(conn: Connection, table: TableName) -> Result<Self> {
        let adapter = SqliteAdapter { conn, table };
        adapter.ensure_table()?;
        Ok(adapter)
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_table(&self) -> Result<()> {
        let t = self.table.as_str();
        let columns = COLUMNS
            .iter()
            .map(|c| format!("{} TEXT NOT NULL DEFAULT ''", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {t} (id INTEGER PRIMARY KEY AUTOINCREMENT, ptype TEXT NOT NULL, {columns});
             CREATE UNIQUE INDEX IF NOT EXISTS {t}_unique ON {t} (ptype, {all});",
            t = t,
            columns = columns,
            all = COLUMNS.join(", "),
        );
        self.conn
            .execute_batch(&sql)
            .map_err(sql_error(format!("creating table {}", t)))?;
        debug!(table = %t, "Ensured rules table");
        Ok(())
    }

    /// `[ptype, v0, ..., v5]` with unused columns empty
    fn row_values(ptype: &str, rule: &[String]) -> Result<Vec<String>> {
        if rule.len() > MAX_FIELDS {
            return Err(Error::InvalidPolicy(format!(
                "{} rule {:?} has {} fields, the rules table holds at most {}",
                ptype,
                rule,
                rule.len(),
                MAX_FIELDS
            )));
        }
        let mut values = Vec::with_capacity(MAX_FIELDS + 1);
        values.push(ptype.to_string());
        values.extend(rule.iter().cloned());
        values.resize(MAX_FIELDS + 1, String::new());
        Ok(values)
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT OR IGNORE INTO {} (ptype, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            self.table,
            COLUMNS.join(", ")
        )
    }

    fn delete_exact_sql(&self) -> String {
        let conditions = COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("IFNULL({}, '') = ?{}", c, i + 2))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!("DELETE FROM {} WHERE ptype = ?1 AND {}", self.table, conditions)
    }

    fn insert_rows(&mut self, context: &str, ptype: &str, rules: &[Vec<String>]) -> Result<usize> {
        let rows = rules
            .iter()
            .map(|rule| Self::row_values(ptype, rule))
            .collect::<Result<Vec<_>>>()?;
        let sql = self.insert_sql();

        let tx = self.conn.transaction().map_err(sql_error(context))?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare_cached(&sql).map_err(sql_error(context))?;
            for values in &rows {
                changed += stmt
                    .execute(params_from_iter(values.iter()))
                    .map_err(sql_error(context))?;
            }
        }
        tx.commit().map_err(sql_error(context))?;
        Ok(changed)
    }

    fn delete_rows(&mut self, context: &str, ptype: &str, rules: &[Vec<String>]) -> Result<usize> {
        let rows = rules
            .iter()
            .map(|rule| Self::row_values(ptype, rule))
            .collect::<Result<Vec<_>>>()?;
        let sql = self.delete_exact_sql();

        let tx = self.conn.transaction().map_err(sql_error(context))?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare_cached(&sql).map_err(sql_error(context))?;
            for values in &rows {
                changed += stmt
                    .execute(params_from_iter(values.iter()))
                    .map_err(sql_error(context))?;
            }
        }
        tx.commit().map_err(sql_error(context))?;
        Ok(changed)
    }
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("table", &self.table)
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Adapter for SqliteAdapter {
    fn load_policy(&mut self, model: &mut Model) -> Result<()> {
        let context = format!("loading rules from {}", self.table);
        let sql = format!(
            "SELECT ptype, {} FROM {} ORDER BY id",
            COLUMNS.join(", "),
            self.table
        );

        let mut stmt = self.conn.prepare(&sql).map_err(sql_error(context.as_str()))?;
        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(MAX_FIELDS + 1);
                values.push(row.get::<_, String>(0)?);
                for i in 1..=MAX_FIELDS {
                    values.push(row.get::<_, Option<String>>(i)?.unwrap_or_default());
                }
                Ok(values)
            })
            .map_err(sql_error(context.as_str()))?;

        let mut count = 0;
        for row in rows {
            let mut values = row.map_err(sql_error(context.as_str()))?;
            let ptype = values.remove(0);
            let arity = model.arity(&ptype).ok_or_else(|| {
                Error::InvalidPolicy(format!(
                    "stored ptype '{}' is not defined by the model",
                    ptype
                ))
            })?;
            if arity > MAX_FIELDS || values[arity..].iter().any(|v| !v.is_empty()) {
                return Err(Error::InvalidPolicy(format!(
                    "stored {} rule {:?} has more than {} fields",
                    ptype, values, arity
                )));
            }
            values.truncate(arity);
            load_row(model, &ptype, values)?;
            count += 1;
        }

        info!(table = %self.table, rules = count, "Loaded rules table");
        Ok(())
    }

    fn save_policy(&mut self, model: &Model) -> Result<()> {
        let context = format!("saving rules to {}", self.table);
        let rows = model
            .rules()
            .map(|(ptype, rule)| Self::row_values(ptype, rule))
            .collect::<Result<Vec<_>>>()?;
        let insert = self.insert_sql();
        let delete = format!("DELETE FROM {}", self.table);

        let tx = self.conn.transaction().map_err(sql_error(context.as_str()))?;
        tx.execute(&delete, []).map_err(sql_error(context.as_str()))?;
        {
            let mut stmt = tx.prepare_cached(&insert).map_err(sql_error(context.as_str()))?;
            for values in &rows {
                stmt.execute(params_from_iter(values.iter()))
                    .map_err(sql_error(context.as_str()))?;
            }
        }
        tx.commit().map_err(sql_error(context.as_str()))?;

        info!(table = %self.table, rules = rows.len(), "Saved rules table");
        Ok(())
    }

    fn add_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        Ok(self.insert_rows("adding rule", ptype, &[rule.to_vec()])? > 0)
    }

    fn add_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        Ok(self.insert_rows("adding rules", ptype, rules)? > 0)
    }

    fn remove_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        Ok(self.delete_rows("removing rule", ptype, &[rule.to_vec()])? > 0)
    }

    fn remove_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        Ok(self.delete_rows("removing rules", ptype, rules)? > 0)
    }

    fn remove_filtered_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<bool> {
        if field_index + values.len() > MAX_FIELDS {
            return Err(Error::InvalidPolicy(format!(
                "filter at field {} with {} values exceeds the {} rule columns",
                field_index,
                values.len(),
                MAX_FIELDS
            )));
        }

        let mut sql = format!("DELETE FROM {} WHERE ptype = ?1", self.table);
        let mut params = vec![ptype.to_string()];
        for (offset, value) in values.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            params.push(value.clone());
            sql.push_str(&format!(
                " AND IFNULL({}, '') = ?{}",
                COLUMNS[field_index + offset],
                params.len()
            ));
        }

        let changed = self
            .conn
            .execute(&sql, params_from_iter(params.iter()))
            .map_err(sql_error("removing filtered rules"))?;
        Ok(changed > 0)
    }

    fn clear_policy(&mut self) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", self.table), [])
            .map_err(sql_error("clearing rules"))?;
        Ok(())
    }
}
