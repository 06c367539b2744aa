//! Full-text index over file contents and symbol names (SQLite FTS5).
//!
//! One row per source file. Queries are always phrase queries: the whole
//! input is quoted, so `contact list` means the adjacent words, not both
//! words anywhere in the file.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::chunker::ChunkKind;

/// File name of the lexical index inside the state directory.
pub const LEXICAL_DB_FILE: &str = "lexical.db";

const SCHEMA: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
    file_path UNINDEXED,
    symbols,
    kinds,
    content,
    tokenize = \"unicode61 tokenchars '_'\"
);
";

/// Errors returned by the lexical index.
#[derive(Error, Debug)]
pub enum LexicalError {
    #[error("Lexical index not built at {0:?}")]
    NotBuilt(PathBuf),

    #[error("Lexical index error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lexical index lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Highlight settings for result snippets.
#[derive(Debug, Clone)]
pub struct SnippetConfig {
    pub start_marker: String,
    pub end_marker: String,
    /// Approximate number of tokens in the snippet window (1 to 64)
    pub tokens: usize,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            start_marker: "<<".to_string(),
            end_marker: ">>".to_string(),
            tokens: 16,
        }
    }
}

/// A ranked lexical match for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalHit {
    pub file: String,
    /// Relevance, higher is better
    pub score: f64,
    pub snippet: String,
    /// 1-indexed line of the first match, or 1 when it cannot be located
    pub line: usize,
}

/// SQLite FTS5 index of source files.
///
/// Every call runs synchronously on the caller's thread, including from async
/// code, and holds the runtime worker for the length of one statement. Rows are
/// per file and queries return a bounded number of hits, so each call stays
/// short. Callers that need concurrent heavy querying should move the work to
/// `tokio::task::spawn_blocking`.
pub struct LexicalIndex {
    conn: Mutex<Connection>,
    snippet: SnippetConfig,
}

impl LexicalIndex {
    /// Open or create the index at `path`.
    pub fn open(path: &Path) -> Result<Self, LexicalError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened lexical index at {:?}", path);
        Ok(Self::from_connection(conn))
    }

    /// Open an index that must already have been built.
    pub fn open_existing(path: &Path) -> Result<Self, LexicalError> {
        if !path.is_file() {
            return Err(LexicalError::NotBuilt(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        let tables: i64 = conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'files_fts'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(LexicalError::NotBuilt(path.to_path_buf()));
        }
        Ok(Self::from_connection(conn))
    }

    /// In-memory index, mostly for tests.
    pub fn open_in_memory() -> Result<Self, LexicalError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            snippet: SnippetConfig::default(),
        }
    }

    pub fn with_snippet(mut self, snippet: SnippetConfig) -> Self {
        self.snippet = snippet;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LexicalError> {
        self.conn.lock().map_err(|_| LexicalError::Poisoned)
    }

    /// Replace the row for `file_path`.
    pub fn upsert_file(
        &self,
        file_path: &str,
        content: &str,
        symbols: &[String],
        kinds: &[ChunkKind],
    ) -> Result<(), LexicalError> {
        let mut kind_names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        kind_names.sort_unstable();
        kind_names.dedup();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM files_fts WHERE file_path = ?1", params![file_path])?;
        tx.execute(
            "INSERT INTO files_fts (file_path, symbols, kinds, content) VALUES (?1, ?2, ?3, ?4)",
            params![file_path, symbols.join(" "), kind_names.join(" "), content],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove the row for `file_path`, if any.
    pub fn remove_file(&self, file_path: &str) -> Result<(), LexicalError> {
        self.conn()?
            .execute("DELETE FROM files_fts WHERE file_path = ?1", params![file_path])?;
        Ok(())
    }

    /// Remove every row.
    pub fn clear(&self) -> Result<(), LexicalError> {
        self.conn()?.execute("DELETE FROM files_fts", [])?;
        info!("Cleared lexical index");
        Ok(())
    }

    pub fn file_count(&self) -> Result<usize, LexicalError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT count(*) FROM files_fts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Ranked files matching `query`, optionally restricted to files that
    /// declare a symbol of `kind`.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<Vec<LexicalHit>, LexicalError> {
        let Some(expression) = build_match_expression(query, kind) else {
            return Ok(Vec::new());
        };
        debug!("Lexical query: {}", expression);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path,
                    bm25(files_fts, 0.0, 10.0, 0.0, 1.0) AS rank,
                    snippet(files_fts, 3, ?2, ?3, '...', ?4),
                    content
             FROM files_fts
             WHERE files_fts MATCH ?1
             ORDER BY rank
             LIMIT ?5",
        )?;

        let needles = match_needles(query);
        let tokens = self.snippet.tokens.clamp(1, 64) as i64;
        let mut rows = stmt.query(params![
            expression,
            self.snippet.start_marker,
            self.snippet.end_marker,
            tokens,
            limit as i64
        ])?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let rank: f64 = row.get(1)?;
            let content: String = row.get(3)?;
            hits.push(LexicalHit {
                file: row.get(0)?,
                // FTS5 bm25() is more negative for better matches
                score: -rank,
                snippet: row.get(2)?,
                line: line_of_first_match(&content, &needles),
            });
        }
        Ok(hits)
    }
}

/// Build an FTS5 MATCH expression for user input.
///
/// The input becomes one quoted phrase (quotes doubled). A single word, or
/// input ending in `*`, becomes a prefix query. Returns `None` for blank input.
pub fn build_match_expression(query: &str, kind: Option<ChunkKind>) -> Option<String> {
    let trimmed = query.trim();
    let (text, explicit_prefix) = match trimmed.strip_suffix('*') {
        Some(rest) => (rest.trim_end(), true),
        None => (trimmed, false),
    };

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let phrase = words.join(" ").replace('"', "\"\"");
    let prefix = if explicit_prefix || words.len() == 1 { "*" } else { "" };

    let mut expression = format!("{{symbols content}} : \"{}\"{}", phrase, prefix);
    if let Some(kind) = kind {
        expression.push_str(&format!(" AND kinds : \"{}\"", kind.as_str()));
    }
    Some(expression)
}

/// Lowercased text to locate in a matching file: the whole phrase, then its first word.
fn match_needles(query: &str) -> Vec<String> {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut needles = Vec::new();
    if words.len() > 1 {
        needles.push(words.join(" "));
    }
    needles.extend(words.into_iter().next());
    needles
}

fn line_of_first_match(content: &str, needles: &[String]) -> usize {
    let lowered = content.to_lowercase();
    needles
        .iter()
        .find_map(|n| lowered.find(n.as_str()))
        .map(|pos| lowered[..pos].matches('\n').count() + 1)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> LexicalIndex {
        let index = LexicalIndex::open_in_memory().unwrap();
        index
            .upsert_file(
                "src/contacts/ContactList.tsx",
                "import React from 'react';\n\n\
                 export const ContactList = () => {\n  return <ul>contact list</ul>;\n};\n",
                &["ContactList".to_string()],
                &[ChunkKind::Component],
            )
            .unwrap();
        index
            .upsert_file(
                "src/deals/useDeals.ts",
                "export const useDeals = () => {\n  \
                 // list of deals, not a contact\n  return [];\n};\n",
                &["useDeals".to_string()],
                &[ChunkKind::Hook],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_match_expression_phrase_and_prefix() {
        assert_eq!(
            build_match_expression("contact list", None).unwrap(),
            "{symbols content} : \"contact list\""
        );
        assert_eq!(
            build_match_expression("useDeal", None).unwrap(),
            "{symbols content} : \"useDeal\"*"
        );
        assert_eq!(
            build_match_expression("contact li*", None).unwrap(),
            "{symbols content} : \"contact li\"*"
        );
        assert_eq!(
            build_match_expression("hook", Some(ChunkKind::Hook)).unwrap(),
            "{symbols content} : \"hook\"* AND kinds : \"hook\""
        );
        assert!(build_match_expression("   ", None).is_none());
        assert!(build_match_expression("*", None).is_none());
    }

    #[test]
    fn test_match_expression_escapes_quotes() {
        assert_eq!(
            build_match_expression("say \"hi\" now", None).unwrap(),
            "{symbols content} : \"say \"\"hi\"\" now\""
        );
    }

    #[test]
    fn test_quotes_do_not_break_queries() {
        let index = index();
        assert!(index.search("\"unbalanced", 10, None).is_ok());
        assert!(index.search("a \" b", 10, None).is_ok());
    }

    #[test]
    fn test_multi_word_is_phrase() {
        let index = index();

        let hits = index.search("contact list", 10, None).unwrap();
        let files: Vec<&str> = hits.iter().map(|h| h.file.as_str()).collect();
        // useDeals.ts has both words, but not adjacent
        assert_eq!(files, vec!["src/contacts/ContactList.tsx"]);
    }

    #[test]
    fn test_single_term_prefix() {
        let index = index();
        let hits = index.search("useDea", 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file, "src/deals/useDeals.ts");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_kind_filter() {
        let index = index();
        let hits = index.search("contact", 10, Some(ChunkKind::Hook)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file, "src/deals/useDeals.ts");
    }

    #[test]
    fn test_snippet_and_line() {
        let index = index();
        let hits = index.search("contact list", 10, None).unwrap();

        // FTS5 highlights a phrase instance as one span
        assert!(hits[0].snippet.contains("<<contact list>>"));
        assert_eq!(hits[0].line, 4);
    }

    #[test]
    fn test_custom_markers() {
        let index = index().with_snippet(SnippetConfig {
            start_marker: "[".to_string(),
            end_marker: "]".to_string(),
            tokens: 8,
        });
        let hits = index.search("useDeals", 10, None).unwrap();
        assert!(hits[0].snippet.contains("[useDeals]"));
    }

    #[test]
    fn test_upsert_replaces_row() {
        let index = index();
        index
            .upsert_file("src/deals/useDeals.ts", "export const renamed = 1;", &[], &[])
            .unwrap();

        assert_eq!(index.file_count().unwrap(), 2);
        assert!(index.search("useDeals", 10, None).unwrap().is_empty());
    }

    #[test]
    fn test_line_prefers_whole_phrase() {
        let content = "const ContactList = 1;\n\n// contact list header\n";
        assert_eq!(line_of_first_match(content, &match_needles("contact list")), 3);
        assert_eq!(line_of_first_match(content, &match_needles("contact")), 1);
        assert_eq!(line_of_first_match(content, &match_needles("missing words")), 1);
    }

    #[test]
    fn test_remove_file() {
        let index = index();
        index.remove_file("src/deals/useDeals.ts").unwrap();
        index.remove_file("src/never/indexed.ts").unwrap();

        assert_eq!(index.file_count().unwrap(), 1);
        assert!(index.search("useDeals", 10, None).unwrap().is_empty());
    }

    #[test]
    fn test_clear() {
        let index = index();
        index.clear().unwrap();
        assert_eq!(index.file_count().unwrap(), 0);
    }

    #[test]
    fn test_open_existing_requires_built_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEXICAL_DB_FILE);

        assert!(matches!(
            LexicalIndex::open_existing(&path),
            Err(LexicalError::NotBuilt(_))
        ));

        LexicalIndex::open(&path).unwrap();
        assert!(LexicalIndex::open_existing(&path).is_ok());
    }

    #[test]
    fn test_open_existing_without_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER);")
            .unwrap();

        assert!(matches!(
            LexicalIndex::open_existing(&path),
            Err(LexicalError::NotBuilt(_))
        ));
    }
}
