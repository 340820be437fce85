//! Implements the persistent catalog store on SQLite.
//!
//! Single-writer, file-backed. Replacing a file's object set happens in one
//! transaction: readers either see the complete prior state or the complete
//! new state, never a partial write.

use crate::catalog::{ByteSpan, Call, CodeObject, LineSpan, ObjectKind, ParamMode, Parameter};
use crate::error::StoreError;
use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-file bookkeeping used for change detection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileRecord {
    pub path: String,
    pub hash: String,
    pub processed_at: i64,
    pub object_ids: Vec<String>,
}

/// Filter for [`Catalog::list_objects`]. Empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    pub file: Option<String>,
    pub kind: Option<ObjectKind>,
    /// Case-insensitive object name.
    pub name: Option<String>,
}

/// Storage seam of the extraction workflow.
///
/// The workflow only ever talks to this trait, which keeps tests free to
/// substitute counting spies or failure injectors.
pub trait Catalog {
    fn file_record(&mut self, path: &str) -> Result<Option<FileRecord>, StoreError>;

    /// Atomically replaces the file record and every object sourced from it.
    fn upsert_file(
        &mut self,
        path: &str,
        hash: &str,
        objects: &[CodeObject],
    ) -> Result<(), StoreError>;

    /// Removes the file record and, cascading, all its objects.
    fn delete_file_history(&mut self, path: &str) -> Result<(), StoreError>;

    fn list_objects(&mut self, filter: &ObjectFilter) -> Result<Vec<CodeObject>, StoreError>;
}

/// SQLite-backed [`Catalog`].
pub struct SqliteCatalog {
    conn: Connection,
}

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS files (
    path         TEXT PRIMARY KEY,
    hash         TEXT NOT NULL,
    processed_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS objects (
    id             TEXT PRIMARY KEY,
    file_path      TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
    kind           TEXT NOT NULL,
    schema_name    TEXT NOT NULL,
    package_name   TEXT NOT NULL,
    name           TEXT NOT NULL,
    parent_id      TEXT REFERENCES objects(id) ON DELETE CASCADE,
    start_line     INTEGER NOT NULL,
    end_line       INTEGER NOT NULL,
    start_byte     INTEGER NOT NULL,
    end_byte       INTEGER NOT NULL,
    return_type    TEXT,
    overload_index INTEGER NOT NULL,
    overloaded     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_objects_file ON objects(file_path);
CREATE TABLE IF NOT EXISTS parameters (
    object_id    TEXT NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
    position     INTEGER NOT NULL,
    name         TEXT NOT NULL,
    mode         TEXT NOT NULL,
    type_text    TEXT NOT NULL,
    default_text TEXT,
    PRIMARY KEY (object_id, position)
);
CREATE TABLE IF NOT EXISTS calls (
    id         INTEGER PRIMARY KEY,
    object_id  TEXT NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
    position   INTEGER NOT NULL,
    callee     TEXT NOT NULL,
    call_start INTEGER NOT NULL,
    call_end   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_calls_object ON calls(object_id);
CREATE TABLE IF NOT EXISTS call_args (
    call_id  INTEGER NOT NULL REFERENCES calls(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    arg_name TEXT,
    arg_text TEXT NOT NULL,
    PRIMARY KEY (call_id, position)
);
";

impl SqliteCatalog {
    /// Opens (and initializes, if necessary) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn load_parameters(&self, object_id: &str) -> Result<Vec<Parameter>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, mode, type_text, default_text FROM parameters
             WHERE object_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map([object_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        let mut parameters = Vec::new();
        for row in rows {
            let (name, mode, type_text, default_text) = row?;
            let mode = ParamMode::parse(&mode)
                .ok_or_else(|| StoreError::Failed(format!("unknown parameter mode `{mode}`")))?;
            parameters.push(Parameter {
                name,
                mode,
                type_text,
                default_text,
            });
        }
        Ok(parameters)
    }

    fn load_calls(&self, object_id: &str) -> Result<Vec<Call>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, callee, call_start, call_end FROM calls
             WHERE object_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map([object_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut calls = Vec::new();
        for row in rows {
            let (call_id, callee, start, end) = row?;
            let mut args_stmt = self.conn.prepare(
                "SELECT arg_name, arg_text FROM call_args
                 WHERE call_id = ?1 ORDER BY position",
            )?;
            let args = args_stmt.query_map([call_id], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, String>(1)?,
                ))
            })?;

            let mut positional_args = Vec::new();
            let mut named_args = IndexMap::new();
            for arg in args {
                let (name, text) = arg?;
                match name {
                    Some(name) => {
                        named_args.insert(name, text);
                    }
                    None => positional_args.push(text),
                }
            }
            calls.push(Call {
                callee,
                positional_args,
                named_args,
                span: ByteSpan::new(start as usize, end as usize),
            });
        }
        Ok(calls)
    }
}

impl Catalog for SqliteCatalog {
    fn file_record(&mut self, path: &str) -> Result<Option<FileRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                "SELECT hash, processed_at FROM files WHERE path = ?1",
                [path],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let (hash, processed_at) = match record {
            Some(pair) => pair,
            None => return Ok(None),
        };

        let mut stmt = self
            .conn
            .prepare("SELECT id FROM objects WHERE file_path = ?1 ORDER BY start_byte")?;
        let object_ids = stmt
            .query_map([path], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(FileRecord {
            path: path.to_owned(),
            hash,
            processed_at,
            object_ids,
        }))
    }

    fn upsert_file(
        &mut self,
        path: &str,
        hash: &str,
        objects: &[CodeObject],
    ) -> Result<(), StoreError> {
        let processed_at = unix_now();
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM objects WHERE file_path = ?1", [path])?;
        tx.execute(
            "INSERT INTO files (path, hash, processed_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET hash = ?2, processed_at = ?3",
            params![path, hash, processed_at],
        )?;

        for object in objects {
            tx.execute(
                "INSERT INTO objects (id, file_path, kind, schema_name, package_name, name,
                                      parent_id, start_line, end_line, start_byte, end_byte,
                                      return_type, overload_index, overloaded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    object.id,
                    path,
                    object.kind.as_str(),
                    object.schema,
                    object.package,
                    object.name,
                    object.parent_id,
                    object.lines.start as i64,
                    object.lines.end as i64,
                    object.bytes.start as i64,
                    object.bytes.end as i64,
                    object.return_type,
                    object.overload_index,
                    object.overloaded,
                ],
            )?;

            for (position, parameter) in object.parameters.iter().enumerate() {
                tx.execute(
                    "INSERT INTO parameters (object_id, position, name, mode, type_text, default_text)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        object.id,
                        position as i64,
                        parameter.name,
                        parameter.mode.as_str(),
                        parameter.type_text,
                        parameter.default_text,
                    ],
                )?;
            }

            for (position, call) in object.calls.iter().enumerate() {
                tx.execute(
                    "INSERT INTO calls (object_id, position, callee, call_start, call_end)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        object.id,
                        position as i64,
                        call.callee,
                        call.span.start as i64,
                        call.span.end as i64,
                    ],
                )?;
                let call_id = tx.last_insert_rowid();

                let mut arg_position = 0i64;
                for text in &call.positional_args {
                    tx.execute(
                        "INSERT INTO call_args (call_id, position, arg_name, arg_text)
                         VALUES (?1, ?2, NULL, ?3)",
                        params![call_id, arg_position, text],
                    )?;
                    arg_position += 1;
                }
                for (name, text) in &call.named_args {
                    tx.execute(
                        "INSERT INTO call_args (call_id, position, arg_name, arg_text)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![call_id, arg_position, name, text],
                    )?;
                    arg_position += 1;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_file_history(&mut self, path: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM objects WHERE file_path = ?1", [path])?;
        tx.execute("DELETE FROM files WHERE path = ?1", [path])?;
        tx.commit()?;
        Ok(())
    }

    fn list_objects(&mut self, filter: &ObjectFilter) -> Result<Vec<CodeObject>, StoreError> {
        let mut sql = String::from(
            "SELECT id, file_path, kind, schema_name, package_name, name, parent_id,
                    start_line, end_line, start_byte, end_byte, return_type,
                    overload_index, overloaded
             FROM objects WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(file) = &filter.file {
            sql.push_str(" AND file_path = ?");
            args.push(Box::new(file.clone()));
        }
        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            args.push(Box::new(kind.as_str()));
        }
        if let Some(name) = &filter.name {
            sql.push_str(" AND lower(name) = lower(?)");
            args.push(Box::new(name.clone()));
        }
        sql.push_str(" ORDER BY file_path, start_byte");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, i64>(9)?,
                row.get::<_, i64>(10)?,
                row.get::<_, Option<String>>(11)?,
                row.get::<_, i64>(12)?,
                row.get::<_, bool>(13)?,
            ))
        })?;

        let mut headers = Vec::new();
        for row in rows {
            headers.push(row?);
        }
        drop(stmt);

        let mut objects = Vec::with_capacity(headers.len());
        for (
            id,
            file_path,
            kind,
            schema,
            package,
            name,
            parent_id,
            start_line,
            end_line,
            start_byte,
            end_byte,
            return_type,
            overload_index,
            overloaded,
        ) in headers
        {
            let kind = ObjectKind::parse(&kind)
                .ok_or_else(|| StoreError::Failed(format!("unknown object kind `{kind}`")))?;
            let parameters = self.load_parameters(&id)?;
            let calls = self.load_calls(&id)?;
            objects.push(CodeObject {
                id,
                kind,
                name,
                schema,
                package,
                parent_id,
                parameters,
                return_type,
                source_file: file_path,
                lines: LineSpan {
                    start: start_line as usize,
                    end: end_line as usize,
                },
                bytes: ByteSpan::new(start_byte as usize, end_byte as usize),
                calls,
                overload_index: overload_index as u32,
                overloaded,
            });
        }
        Ok(objects)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn object(id: &str, file: &str, bytes: (usize, usize)) -> CodeObject {
        CodeObject {
            id: id.into(),
            kind: ObjectKind::Procedure,
            name: id.rsplit('.').next().unwrap().split('#').next().unwrap().into(),
            schema: "hr".into(),
            package: String::new(),
            parent_id: None,
            parameters: Vec::new(),
            return_type: None,
            source_file: file.into(),
            lines: LineSpan { start: 1, end: 5 },
            bytes: ByteSpan::new(bytes.0, bytes.1),
            calls: Vec::new(),
            overload_index: 0,
            overloaded: false,
        }
    }

    fn object_with_detail(id: &str, file: &str) -> CodeObject {
        let mut obj = object(id, file, (0, 100));
        obj.parameters.push(Parameter {
            name: "p_text".into(),
            mode: ParamMode::In,
            type_text: "VARCHAR2".into(),
            default_text: None,
        });
        obj.parameters.push(Parameter {
            name: "p_code".into(),
            mode: ParamMode::InOut,
            type_text: "NUMBER".into(),
            default_text: Some("SQLCODE".into()),
        });
        let mut named = IndexMap::new();
        named.insert("p_emp_id".to_owned(), "v_id".to_owned());
        obj.calls.push(Call {
            callee: "employee_pkg.get_employee".into(),
            positional_args: vec!["v_salary".into()],
            named_args: named,
            span: ByteSpan::new(40, 80),
        });
        obj
    }

    #[test]
    fn roundtrips_objects_with_parameters_and_calls() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let object = object_with_detail("hr.proc_a#0", "a.sql");
        store.upsert_file("a.sql", "hash-1", &[object.clone()]).unwrap();

        let listed = store.list_objects(&ObjectFilter::default()).unwrap();
        assert_eq!(listed, vec![object]);

        let record = store.file_record("a.sql").unwrap().unwrap();
        assert_eq!(record.hash, "hash-1");
        assert_eq!(record.object_ids, vec!["hr.proc_a#0".to_owned()]);
    }

    #[test]
    fn missing_file_record_is_none() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        assert_eq!(store.file_record("nope.sql").unwrap(), None);
    }

    #[test]
    fn upsert_replaces_prior_objects_atomically() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        store
            .upsert_file(
                "a.sql",
                "h1",
                &[object("hr.old_one#0", "a.sql", (0, 10))],
            )
            .unwrap();
        store
            .upsert_file(
                "a.sql",
                "h2",
                &[
                    object("hr.new_one#0", "a.sql", (0, 10)),
                    object("hr.new_two#0", "a.sql", (12, 20)),
                ],
            )
            .unwrap();

        let ids = store
            .list_objects(&ObjectFilter::default())
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["hr.new_one#0", "hr.new_two#0"]);
        assert_eq!(store.file_record("a.sql").unwrap().unwrap().hash, "h2");
    }

    #[test]
    fn failed_upsert_rolls_back_to_prior_state() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let good = object("hr.keeper#0", "a.sql", (0, 10));
        store.upsert_file("a.sql", "h1", &[good.clone()]).unwrap();

        // Duplicate ids violate the primary key mid-transaction.
        let duplicate = [
            object("hr.dup#0", "a.sql", (0, 10)),
            object("hr.dup#0", "a.sql", (12, 20)),
        ];
        let err = store.upsert_file("a.sql", "h2", &duplicate);
        assert!(err.is_err());

        let listed = store.list_objects(&ObjectFilter::default()).unwrap();
        assert_eq!(listed, vec![good]);
        assert_eq!(store.file_record("a.sql").unwrap().unwrap().hash, "h1");
    }

    #[test]
    fn delete_file_history_cascades() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        store
            .upsert_file("a.sql", "h1", &[object_with_detail("hr.a#0", "a.sql")])
            .unwrap();
        store
            .upsert_file("b.sql", "h2", &[object("hr.b#0", "b.sql", (0, 10))])
            .unwrap();

        store.delete_file_history("a.sql").unwrap();

        assert_eq!(store.file_record("a.sql").unwrap(), None);
        let remaining = store.list_objects(&ObjectFilter::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "hr.b#0");

        // No orphaned detail rows survive the cascade.
        let params: i64 = store
            .conn
            .query_row("SELECT count(*) FROM parameters", [], |r| r.get(0))
            .unwrap();
        let calls: i64 = store
            .conn
            .query_row("SELECT count(*) FROM calls", [], |r| r.get(0))
            .unwrap();
        assert_eq!((params, calls), (0, 0));
    }

    #[test]
    fn list_objects_filters() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        store
            .upsert_file("a.sql", "h1", &[object("hr.alpha#0", "a.sql", (0, 10))])
            .unwrap();
        store
            .upsert_file("b.sql", "h2", &[object("hr.beta#0", "b.sql", (0, 10))])
            .unwrap();

        let by_file = store
            .list_objects(&ObjectFilter {
                file: Some("b.sql".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_file.len(), 1);
        assert_eq!(by_file[0].id, "hr.beta#0");

        let by_name = store
            .list_objects(&ObjectFilter {
                name: Some("ALPHA".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let by_kind = store
            .list_objects(&ObjectFilter {
                kind: Some(ObjectKind::PackageSpec),
                ..Default::default()
            })
            .unwrap();
        assert!(by_kind.is_empty());
    }
}
