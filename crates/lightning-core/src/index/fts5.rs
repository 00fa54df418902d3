//! FTS5 virtual table setup and management.
//!
//! Each indexed entity table gets an external-content FTS5 table named
//! `lightning_search_<table>` over its searchable fields, kept in sync by
//! triggers. Rows are joined back to the entity table through `rowid`.

use crate::descriptor::IndexDescriptor;
use crate::store::sqlite::{quote_ident, table_exists};
use crate::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default FTS5 tokenizer.
pub const DEFAULT_TOKENIZER: &str = "unicode61 remove_diacritics 1";

/// Manager for one entity's FTS5 index.
pub struct FulltextIndex<'a> {
    descriptor: &'a IndexDescriptor,
    index_name: String,
    tokenizer: String,
}

impl<'a> FulltextIndex<'a> {
    /// Create a manager for the given descriptor.
    pub fn new(descriptor: &'a IndexDescriptor) -> Self {
        Self {
            index_name: descriptor.index_name(),
            descriptor,
            tokenizer: DEFAULT_TOKENIZER.to_string(),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: impl Into<String>) -> Self {
        self.tokenizer = tokenizer.into();
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Check if the FTS5 table exists.
    pub fn exists(&self, conn: &Connection) -> Result<bool> {
        table_exists(conn, &self.index_name)
    }

    /// Check if the sync triggers exist.
    pub fn triggers_exist(&self, conn: &Connection) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='trigger' AND name IN (?1, ?2, ?3)",
            [
                self.trigger_name("ai"),
                self.trigger_name("ad"),
                self.trigger_name("au"),
            ],
            |row| row.get(0),
        )?;
        Ok(count == 3)
    }

    /// Ensure the index is fully set up and populated.
    pub fn ensure(&self, conn: &Connection) -> Result<()> {
        self.descriptor.ensure_searchable()?;

        if !self.exists(conn)? {
            self.create_table(conn)?;
            self.create_triggers(conn)?;
            self.populate(conn)?;
        } else if !self.triggers_exist(conn)? {
            // Table exists but triggers missing - resync
            self.create_triggers(conn)?;
            self.populate(conn)?;
        }
        Ok(())
    }

    /// Create the FTS5 virtual table.
    pub fn create_table(&self, conn: &Connection) -> Result<()> {
        let columns: Vec<String> = self
            .descriptor
            .searchable_fields
            .iter()
            .map(|f| quote_ident(f))
            .collect();

        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                {},
                content={},
                content_rowid='rowid',
                tokenize='{}'
            )",
            quote_ident(&self.index_name),
            columns.join(", "),
            sql_string(&self.descriptor.table),
            self.tokenizer
        );

        conn.execute(&sql, [])?;
        info!(
            "Created FTS5 table {} on {}",
            self.index_name,
            self.descriptor.searchable_fields.join(", ")
        );
        Ok(())
    }

    /// Create triggers to keep the index in sync with the entity table.
    pub fn create_triggers(&self, conn: &Connection) -> Result<()> {
        let index = quote_ident(&self.index_name);
        let table = quote_ident(&self.descriptor.table);
        let cols = self.column_list();
        let new_vals = self.prefixed_values("new");
        let old_vals = self.prefixed_values("old");

        let insert_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER INSERT ON {} BEGIN
                INSERT INTO {} (rowid, {}) VALUES (new.rowid, {});
            END",
            quote_ident(&self.trigger_name("ai")),
            table,
            index,
            cols,
            new_vals
        );
        conn.execute(&insert_trigger, [])?;

        let delete_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER DELETE ON {} BEGIN
                INSERT INTO {} ({}, rowid, {}) VALUES ('delete', old.rowid, {});
            END",
            quote_ident(&self.trigger_name("ad")),
            table,
            index,
            index,
            cols,
            old_vals
        );
        conn.execute(&delete_trigger, [])?;

        let update_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER UPDATE ON {} BEGIN
                INSERT INTO {} ({}, rowid, {}) VALUES ('delete', old.rowid, {});
                INSERT INTO {} (rowid, {}) VALUES (new.rowid, {});
            END",
            quote_ident(&self.trigger_name("au")),
            table,
            index,
            index,
            cols,
            old_vals,
            index,
            cols,
            new_vals
        );
        conn.execute(&update_trigger, [])?;

        debug!("Created FTS5 triggers for {}", self.index_name);
        Ok(())
    }

    /// Repopulate the index from the entity table.
    pub fn populate(&self, conn: &Connection) -> Result<()> {
        let index = quote_ident(&self.index_name);
        conn.execute(
            &format!("INSERT INTO {}({}) VALUES('rebuild')", index, index),
            [],
        )?;
        info!("Populated {} from {}", self.index_name, self.descriptor.table);
        Ok(())
    }

    /// Drop the index table and its triggers.
    pub fn drop(&self, conn: &Connection) -> Result<()> {
        for suffix in ["ai", "ad", "au"] {
            conn.execute(
                &format!(
                    "DROP TRIGGER IF EXISTS {}",
                    quote_ident(&self.trigger_name(suffix))
                ),
                [],
            )?;
        }
        conn.execute(
            &format!("DROP TABLE IF EXISTS {}", quote_ident(&self.index_name)),
            [],
        )?;
        debug!("Dropped {}", self.index_name);
        Ok(())
    }

    /// Rebuild the index completely, picking up changed searchable fields.
    pub fn rebuild(&self, conn: &Connection) -> Result<()> {
        self.descriptor.ensure_searchable()?;
        self.drop(conn)?;
        self.create_table(conn)?;
        self.create_triggers(conn)?;
        self.populate(conn)?;
        info!("Rebuilt FTS5 index {}", self.index_name);
        Ok(())
    }

    /// Merge index segments.
    pub fn optimize(&self, conn: &Connection) -> Result<()> {
        let index = quote_ident(&self.index_name);
        conn.execute(
            &format!("INSERT INTO {}({}) VALUES('optimize')", index, index),
            [],
        )?;
        debug!("Optimized {}", self.index_name);
        Ok(())
    }

    /// Get statistics about the index as it exists on disk.
    ///
    /// `columns` are read back from the index table, so they can lag the
    /// descriptor until the index is rebuilt.
    pub fn stats(&self, conn: &Connection) -> Result<FulltextStats> {
        let row_count: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&self.index_name)),
            [],
            |row| row.get(0),
        )?;

        Ok(FulltextStats {
            index_name: self.index_name.clone(),
            table: self.descriptor.table.clone(),
            columns: indexed_columns(conn, &self.index_name)?,
            row_count,
            tokenizer: self.tokenizer.clone(),
        })
    }

    fn trigger_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.index_name, suffix)
    }

    fn column_list(&self) -> String {
        self.descriptor
            .searchable_fields
            .iter()
            .map(|f| quote_ident(f))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn prefixed_values(&self, prefix: &str) -> String {
        self.descriptor
            .searchable_fields
            .iter()
            .map(|f| format!("{}.{}", prefix, quote_ident(f)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Columns of an existing FTS5 index table, in declaration order.
pub fn indexed_columns(conn: &Connection, index_name: &str) -> Result<Vec<String>> {
    if !table_exists(conn, index_name)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(index_name)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Statistics about an FTS5 index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulltextStats {
    pub index_name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub tokenizer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE companies (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                city TEXT
            );
            INSERT INTO companies (name, city) VALUES ('Acme Corp', 'London');",
        )
        .unwrap();
        conn
    }

    fn descriptor() -> IndexDescriptor {
        IndexDescriptor::new(
            "companies",
            "companies",
            "id",
            vec!["name".into(), "city".into()],
            vec![],
        )
    }

    fn match_count(conn: &Connection, query: &str) -> usize {
        conn.query_row(
            "SELECT COUNT(*) FROM lightning_search_companies WHERE lightning_search_companies MATCH ?1",
            [query],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_fts5_setup_populates_existing_rows() {
        let conn = create_test_db();
        let d = descriptor();
        let index = FulltextIndex::new(&d);

        assert!(!index.exists(&conn).unwrap());
        index.ensure(&conn).unwrap();

        assert!(index.exists(&conn).unwrap());
        assert!(index.triggers_exist(&conn).unwrap());
        assert_eq!(match_count(&conn, "london"), 1);
        assert_eq!(
            indexed_columns(&conn, index.index_name()).unwrap(),
            vec!["name", "city"]
        );
    }

    #[test]
    fn test_fts5_triggers_follow_changes() {
        let conn = create_test_db();
        let d = descriptor();
        let index = FulltextIndex::new(&d);
        index.ensure(&conn).unwrap();

        conn.execute(
            "INSERT INTO companies (name, city) VALUES ('Globex', 'Paris')",
            [],
        )
        .unwrap();
        assert_eq!(match_count(&conn, "paris"), 1);

        conn.execute("UPDATE companies SET city = 'Berlin' WHERE name = 'Globex'", [])
            .unwrap();
        assert_eq!(match_count(&conn, "paris"), 0);
        assert_eq!(match_count(&conn, "berlin"), 1);

        conn.execute("DELETE FROM companies WHERE name = 'Globex'", [])
            .unwrap();
        assert_eq!(match_count(&conn, "berlin"), 0);
    }

    #[test]
    fn test_fts5_rebuild_and_drop() {
        let conn = create_test_db();
        let d = descriptor();
        let index = FulltextIndex::new(&d);
        index.ensure(&conn).unwrap();

        index.rebuild(&conn).unwrap();
        assert_eq!(index.stats(&conn).unwrap().row_count, 1);
        index.optimize(&conn).unwrap();

        index.drop(&conn).unwrap();
        assert!(!index.exists(&conn).unwrap());
        assert!(indexed_columns(&conn, "lightning_search_companies")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rebuild_picks_up_changed_fields() {
        let conn = create_test_db();
        let narrow =
            IndexDescriptor::new("companies", "companies", "id", vec!["name".into()], vec![]);
        FulltextIndex::new(&narrow).ensure(&conn).unwrap();

        let wide = descriptor();
        let index = FulltextIndex::new(&wide);
        index.ensure(&conn).unwrap();
        assert_eq!(index.stats(&conn).unwrap().columns, vec!["name"]);
        assert_eq!(match_count(&conn, "london"), 0);

        index.rebuild(&conn).unwrap();
        assert_eq!(index.stats(&conn).unwrap().columns, vec!["name", "city"]);
        assert_eq!(match_count(&conn, "london"), 1);
    }

    #[test]
    fn test_unsearchable_descriptor_is_rejected() {
        let conn = create_test_db();
        let d = IndexDescriptor::new("companies", "companies", "id", vec![], vec![]);
        assert!(FulltextIndex::new(&d).ensure(&conn).is_err());
    }
}
