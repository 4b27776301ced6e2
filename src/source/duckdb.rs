//! DuckDB-backed source
//!
//! Provides unified access to PostgreSQL, MySQL, SQLite via DuckDB extensions,
//! and to DuckDB databases natively.

use super::{RowStream, SelectQuerier, TableSizeEstimator};
use crate::config::{DatabaseConfig, DatabaseEngine};
use crate::error::{Error, Result};
use crate::query::{AnsiQueryGenerator, Binding, SelectQuery};
use crate::stream::{Field, Stream};
use crate::types::{FieldType, JsonObject, JsonValue};
use async_trait::async_trait;
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Catalog name external databases are attached under
const SOURCE_CATALOG: &str = "source_db";

/// A table found in the source catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Schema
    pub namespace: Option<String>,
    /// Table name
    pub name: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Source database reached through an in-process DuckDB
pub struct DuckDbSource {
    /// DuckDB connection; queries run on clones of it
    conn: Arc<Mutex<Connection>>,
    /// Database type
    engine: DatabaseEngine,
    /// Whether tables live in the attached `source_db` catalog
    attached: bool,
    /// Connection string used (for logging)
    connection_string: String,
}

impl std::fmt::Debug for DuckDbSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbSource")
            .field("engine", &self.engine)
            .field("connection", &self.connection_info())
            .finish()
    }
}

impl DuckDbSource {
    /// Open DuckDB and attach the configured database
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let connection_string = config.connection_string()?;

        let conn = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;

        // An in-memory DuckDB source has nothing to attach
        let attached = !(config.engine == DatabaseEngine::Duckdb && connection_string == ":memory:");
        let source = Self {
            conn: Arc::new(Mutex::new(conn)),
            engine: config.engine,
            attached,
            connection_string,
        };
        if attached {
            source.attach_database()?;
        }
        tracing::info!("Connected to {} source {}", source.engine, source.connection_info());
        Ok(source)
    }

    /// Wrap an open DuckDB connection whose tables are read natively
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            engine: DatabaseEngine::Duckdb,
            attached: false,
            connection_string: ":memory:".to_string(),
        }
    }

    /// Attach external database to DuckDB
    fn attach_database(&self) -> Result<()> {
        let connection_string = self.connection_string.replace('\'', "''");
        let sql = match self.engine {
            DatabaseEngine::Postgres => format!(
                "INSTALL postgres; LOAD postgres; \
                 ATTACH '{connection_string}' AS {SOURCE_CATALOG} (TYPE POSTGRES, READ_ONLY);"
            ),
            DatabaseEngine::Mysql => format!(
                "INSTALL mysql; LOAD mysql; \
                 ATTACH '{connection_string}' AS {SOURCE_CATALOG} (TYPE MYSQL, READ_ONLY);"
            ),
            DatabaseEngine::Sqlite => format!(
                "INSTALL sqlite; LOAD sqlite; \
                 ATTACH '{connection_string}' AS {SOURCE_CATALOG} (TYPE SQLITE, READ_ONLY);"
            ),
            DatabaseEngine::Duckdb => {
                format!("ATTACH '{connection_string}' AS {SOURCE_CATALOG} (READ_ONLY);")
            }
        };

        self.with_connection(|conn| {
            conn.execute_batch(&sql)
                .map_err(|e| Error::config(format!("Failed to attach {}: {e}", self.engine)))
        })
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Other("DuckDB connection lock poisoned".to_string()))?;
        f(&conn)
    }

    fn clone_connection(&self) -> Result<Connection> {
        self.with_connection(|conn| Ok(conn.try_clone()?))
    }

    /// Query generator matching how this source names its tables
    pub fn query_generator(&self) -> AnsiQueryGenerator {
        if self.attached {
            AnsiQueryGenerator::with_catalog(SOURCE_CATALOG)
        } else {
            AnsiQueryGenerator::new()
        }
    }

    /// Database type
    pub fn engine(&self) -> DatabaseEngine {
        self.engine
    }

    /// Test database connection
    pub fn check_connection(&self) -> Result<()> {
        let query = match self.engine {
            DatabaseEngine::Postgres => "SELECT 1 FROM source_db.pg_catalog.pg_tables LIMIT 1",
            DatabaseEngine::Mysql => "SELECT 1 FROM source_db.information_schema.tables LIMIT 1",
            DatabaseEngine::Sqlite => "SELECT 1 FROM source_db.sqlite_master LIMIT 1",
            DatabaseEngine::Duckdb => "SELECT 1",
        };

        self.with_connection(|conn| {
            conn.execute(query, [])
                .map_err(|e| Error::config(format!("Connection check failed: {e}")))
        })?;
        Ok(())
    }

    /// Get list of user tables in the database
    pub fn list_tables(&self) -> Result<Vec<TableRef>> {
        let query = format!(
            "SELECT table_schema, table_name
             FROM information_schema.tables
             WHERE table_catalog = {}
               AND table_schema NOT IN ('pg_catalog', 'information_schema', 'mysql', 'performance_schema', 'sys')
             ORDER BY table_schema, table_name",
            self.catalog_expr()
        );

        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&query)
                .map_err(|e| Error::query(format!("Failed to prepare query: {e}")))?;
            let tables = stmt
                .query_map([], |row| {
                    Ok(TableRef {
                        namespace: row.get::<_, Option<String>>(0)?,
                        name: row.get(1)?,
                    })
                })
                .map_err(|e| Error::query(format!("Failed to query tables: {e}")))?
                .filter_map(std::result::Result::ok)
                .collect();
            Ok(tables)
        })
    }

    /// Columns of a table, in table order
    pub fn discover_fields(&self, name: &str, namespace: Option<&str>) -> Result<Vec<Field>> {
        let mut query = format!(
            "SELECT column_name, data_type
             FROM information_schema.columns
             WHERE table_catalog = {} AND table_name = ?",
            self.catalog_expr()
        );
        let mut params = vec![Value::Text(name.to_string())];
        if let Some(ns) = namespace {
            query.push_str(" AND table_schema = ?");
            params.push(Value::Text(ns.to_string()));
        }
        query.push_str(" ORDER BY ordinal_position");

        let fields: Vec<Field> = self.with_connection(|conn| {
            let mut stmt = conn.prepare(&query)?;
            let fields = stmt
                .query_map(duckdb::params_from_iter(params), |row| {
                    let column: String = row.get(0)?;
                    let data_type: String = row.get(1)?;
                    Ok(Field::new(column, FieldType::from_sql_type(&data_type)))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(fields)
        })?;

        if fields.is_empty() {
            let label = match namespace {
                Some(ns) => format!("{ns}.{name}"),
                None => name.to_string(),
            };
            return Err(Error::StreamNotFound { stream: label });
        }
        Ok(fields)
    }

    fn catalog_expr(&self) -> String {
        if self.attached {
            format!("'{SOURCE_CATALOG}'")
        } else {
            "current_database()".to_string()
        }
    }

    /// Get connection string (for logging - password masked)
    pub fn connection_info(&self) -> String {
        if let Some(at_pos) = self.connection_string.find('@') {
            if let Some(colon_pos) = self.connection_string[..at_pos].rfind(':') {
                let before_pass = &self.connection_string[..=colon_pos];
                let after_at = &self.connection_string[at_pos..];
                return format!("{before_pass}****{after_at}");
            }
        }
        self.connection_string.clone()
    }

    /// SQL asking the source database itself for the table's byte size
    fn table_size_query(&self, stream: &Stream) -> Option<String> {
        let namespace = stream.namespace.clone().unwrap_or_else(|| match self.engine {
            DatabaseEngine::Postgres => "public".to_string(),
            _ => String::new(),
        });
        match self.engine {
            DatabaseEngine::Postgres => {
                let relation = format!(
                    "\"{}\".\"{}\"",
                    namespace.replace('"', "\"\""),
                    stream.name.replace('"', "\"\"")
                );
                let inner = format!(
                    "SELECT pg_total_relation_size('{}')::BIGINT AS size",
                    relation.replace('\'', "''")
                );
                Some(format!(
                    "SELECT size FROM postgres_query('{SOURCE_CATALOG}', '{}')",
                    inner.replace('\'', "''")
                ))
            }
            DatabaseEngine::Mysql => {
                let inner = format!(
                    "SELECT DATA_LENGTH FROM information_schema.TABLES t \
                     WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}'",
                    namespace.replace('\'', "''"),
                    stream.name.replace('\'', "''")
                );
                Some(format!(
                    "SELECT DATA_LENGTH FROM mysql_query('{SOURCE_CATALOG}', '{}')",
                    inner.replace('\'', "''")
                ))
            }
            DatabaseEngine::Sqlite | DatabaseEngine::Duckdb => None,
        }
    }
}

#[async_trait]
impl SelectQuerier for DuckDbSource {
    async fn select(&self, query: SelectQuery, fetch_size: Option<usize>) -> Result<RowStream> {
        let conn = self.clone_connection()?;
        let capacity = fetch_size.unwrap_or(1024).clamp(1, 65_536);
        let (tx, rx) = mpsc::channel::<Result<JsonObject>>(capacity);
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();

        tokio::task::spawn_blocking(move || {
            let mut ready = Some(ready_tx);
            if let Err(e) = stream_rows(&conn, &query, &tx, &mut ready) {
                match ready.take() {
                    Some(ready) => {
                        let _ = ready.send(Err(e));
                    }
                    None => {
                        let _ = tx.blocking_send(Err(e));
                    }
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| Error::query("query task ended before executing"))??;

        let rows = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|row| (row, rx))
        });
        Ok(Box::pin(rows))
    }
}

/// Run `query` and push its rows into `tx`; `ready` is signalled once the
/// statement has executed, so execution errors surface from `select`
fn stream_rows(
    conn: &Connection,
    query: &SelectQuery,
    tx: &mpsc::Sender<Result<JsonObject>>,
    ready: &mut Option<tokio::sync::oneshot::Sender<Result<()>>>,
) -> Result<()> {
    let mut stmt = conn
        .prepare(&query.sql)
        .map_err(|e| Error::query(format!("Failed to prepare '{}': {e}", query.sql)))?;
    let params: Vec<Value> = query.bindings.iter().map(binding_to_duckdb).collect();
    let mut rows = stmt
        .query(duckdb::params_from_iter(params))
        .map_err(|e| Error::query(format!("Failed to execute '{}': {e}", query.sql)))?;

    if let Some(ready) = ready.take() {
        if ready.send(Ok(())).is_err() {
            return Ok(());
        }
    }

    while let Some(row) = rows.next()? {
        let mut object = JsonObject::new();
        for (idx, column) in query.columns.iter().enumerate() {
            let value: Value = row.get(idx)?;
            object.insert(column.id.clone(), duckdb_value_to_json(value));
        }
        if tx.blocking_send(Ok(object)).is_err() {
            // Reader dropped the stream
            break;
        }
    }
    Ok(())
}

#[async_trait]
impl TableSizeEstimator for DuckDbSource {
    async fn table_byte_size(&self, stream: &Stream) -> Result<u64> {
        let Some(sql) = self.table_size_query(stream) else {
            return Ok(0);
        };
        tracing::debug!("Estimating table size: {}", sql);

        let conn = self.clone_connection()?;
        let size = tokio::task::spawn_blocking(move || -> Result<u64> {
            let value: Option<i64> = conn
                .query_row(&sql, [], |row| row.get(0))
                .or_else(|e| match e {
                    duckdb::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(value.map_or(0, |v| u64::try_from(v).unwrap_or(0)))
        })
        .await??;
        Ok(size)
    }
}

/// Convert a bound JSON value to a DuckDB parameter
fn binding_to_duckdb(binding: &Binding) -> Value {
    match &binding.value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::BigInt(i)
            } else if let Some(u) = n.as_u64() {
                Value::UBigInt(u)
            } else {
                n.as_f64().map_or(Value::Null, Value::Double)
            }
        }
        JsonValue::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Convert DuckDB Value to JSON Value
fn duckdb_value_to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => JsonValue::Number(i.into()),
        Value::SmallInt(i) => JsonValue::Number(i.into()),
        Value::Int(i) => JsonValue::Number(i.into()),
        Value::BigInt(i) => JsonValue::Number(i.into()),
        Value::HugeInt(i) => JsonValue::String(i.to_string()),
        Value::UHugeInt(i) => JsonValue::String(i.to_string()),
        Value::UTinyInt(i) => JsonValue::Number(i.into()),
        Value::USmallInt(i) => JsonValue::Number(i.into()),
        Value::UInt(i) => JsonValue::Number(i.into()),
        Value::UBigInt(i) => JsonValue::Number(i.into()),
        Value::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Double(f) => serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        // Exact text; binding it back casts to the column's own precision
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::Text(s) | Value::Enum(s) => JsonValue::String(s),
        Value::Blob(b) | Value::Geometry(b) => JsonValue::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b,
        )),
        Value::Timestamp(unit, i) => {
            let micros = to_micros(unit, i);
            let secs = micros.div_euclid(1_000_000);
            let nsecs = (micros.rem_euclid(1_000_000) * 1000) as u32;
            chrono::DateTime::from_timestamp(secs, nsecs)
                .map(|dt| JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()))
                .unwrap_or(JsonValue::Number(i.into()))
        }
        Value::Date32(d) => {
            // Days since epoch (719163 is the number of days from 1 CE to 1970-01-01)
            chrono::NaiveDate::from_num_days_from_ce_opt(d + 719_163)
                .map(|date| JsonValue::String(date.format("%Y-%m-%d").to_string()))
                .unwrap_or(JsonValue::Number(d.into()))
        }
        Value::Time64(unit, t) => {
            let t = to_micros(unit, t);
            let secs = t / 1_000_000;
            let micros = t % 1_000_000;
            JsonValue::String(format!(
                "{:02}:{:02}:{:02}.{:06}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60,
                micros
            ))
        }
        Value::Interval { months, days, nanos } => JsonValue::String(format!(
            "{months} months {days} days {} microseconds",
            nanos / 1_000
        )),
        Value::List(items) | Value::Array(items) => {
            JsonValue::Array(items.into_iter().map(duckdb_value_to_json).collect())
        }
        Value::Struct(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), duckdb_value_to_json(v.clone())))
                .collect(),
        ),
        Value::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(k, v)| {
                    let key = match duckdb_value_to_json(k.clone()) {
                        JsonValue::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, duckdb_value_to_json(v.clone()))
                })
                .collect(),
        ),
        Value::Union(inner) => duckdb_value_to_json(*inner),
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FromNode, SelectNode, SelectQueryGenerator, SelectQuerySpec, WhereClauseNode};
    use futures::TryStreamExt;
    use serde_json::json;

    fn source() -> DuckDbSource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name VARCHAR, created DATE);
             INSERT INTO items VALUES (1, 'a', DATE '2024-01-01'), (2, 'b', NULL), (3, 'c', DATE '2024-03-01');",
        )
        .unwrap();
        DuckDbSource::from_connection(conn)
    }

    #[test]
    fn test_connection_info_masks_password() {
        let source = DuckDbSource {
            conn: Arc::new(Mutex::new(Connection::open_in_memory().unwrap())),
            engine: DatabaseEngine::Postgres,
            attached: true,
            connection_string: "postgresql://reader:secret@db:5432/shop".to_string(),
        };
        assert_eq!(source.connection_info(), "postgresql://reader:****@db:5432/shop");
    }

    #[test]
    fn test_list_tables_and_discover() {
        let source = source();
        source.check_connection().unwrap();
        let tables = source.list_tables().unwrap();
        assert_eq!(
            tables,
            vec![TableRef {
                namespace: Some("main".to_string()),
                name: "items".to_string()
            }]
        );

        let fields = source.discover_fields("items", Some("main")).unwrap();
        assert_eq!(
            fields,
            vec![
                Field::new("id", FieldType::Integer),
                Field::new("name", FieldType::String),
                Field::new("created", FieldType::Date),
            ]
        );
        assert!(matches!(
            source.discover_fields("missing", None),
            Err(Error::StreamNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_select_with_bindings() {
        let source = source();
        let spec = SelectQuerySpec::new(
            SelectNode::Columns(vec![
                Field::new("id", FieldType::Integer),
                Field::new("created", FieldType::Date),
            ]),
            FromNode::Table {
                name: "items".to_string(),
                namespace: Some("main".to_string()),
            },
        )
        .with_where(Some(WhereClauseNode::Greater(
            Field::new("created", FieldType::Date),
            json!("2024-01-15"),
        )));
        let query = source.query_generator().generate(&spec);

        let rows: Vec<JsonObject> = source
            .select(query, Some(10))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(3));
        assert_eq!(rows[0]["created"], json!("2024-03-01"));
    }

    #[tokio::test]
    async fn test_select_error_surfaces() {
        let source = source();
        let query = SelectQuery {
            sql: "SELECT nope FROM missing".to_string(),
            columns: vec![],
            bindings: vec![],
        };
        assert!(source.select(query, None).await.is_err());
    }

    #[tokio::test]
    async fn test_native_table_size_unknown() {
        let source = source();
        let stream = Stream::new("items", Some("main".to_string()), vec![]);
        assert_eq!(source.table_byte_size(&stream).await.unwrap(), 0);
    }

    #[test]
    fn test_duckdb_value_to_json() {
        assert_eq!(duckdb_value_to_json(Value::Null), JsonValue::Null);
        assert_eq!(duckdb_value_to_json(Value::Boolean(true)), JsonValue::Bool(true));
        assert_eq!(duckdb_value_to_json(Value::Int(42)), json!(42));
        assert_eq!(
            duckdb_value_to_json(Value::Text("hello".to_string())),
            json!("hello")
        );
        assert_eq!(
            duckdb_value_to_json(Value::Timestamp(TimeUnit::Microsecond, 1_500_000)),
            json!("1970-01-01T00:00:01.500000")
        );
        assert_eq!(
            duckdb_value_to_json(Value::Decimal(
                duckdb::types::Decimal::new(10, 2, 400).unwrap()
            )),
            json!("4.00")
        );
        assert_eq!(
            duckdb_value_to_json(Value::Enum("open".to_string())),
            json!("open")
        );
    }

    #[test]
    fn test_decimal_and_nested_values_to_json() {
        let conn = Connection::open_in_memory().unwrap();
        let values = conn
            .query_row(
                "SELECT CAST(-12.5 AS DECIMAL(10,2)), [1, 2], {'a': 1, 'b': 'x'},
                        INTERVAL '2 days 3 seconds'",
                [],
                |row| {
                    (0..4)
                        .map(|i| row.get::<_, Value>(i).map(duckdb_value_to_json))
                        .collect::<duckdb::Result<Vec<_>>>()
                },
            )
            .unwrap();
        assert_eq!(
            values,
            vec![
                json!("-12.50"),
                json!([1, 2]),
                json!({ "a": 1, "b": "x" }),
                json!("0 months 2 days 3000000 microseconds"),
            ]
        );
    }

    #[tokio::test]
    async fn test_decimal_binding_keeps_precision() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE prices AS
             SELECT CAST(range / 100 AS DECIMAL(20,2)) AS amount FROM range(1, 6);",
        )
        .unwrap();
        let source = DuckDbSource::from_connection(conn);

        let query = SelectQuery {
            sql: r#"SELECT "amount" FROM "main"."prices" WHERE "amount" > ? ORDER BY "amount""#
                .to_string(),
            columns: vec![Field::new("amount", FieldType::Number)],
            bindings: vec![Binding {
                value: json!("0.03"),
                field_type: FieldType::Number,
            }],
        };
        let rows: Vec<JsonObject> = source
            .select(query, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let amounts: Vec<JsonValue> = rows.into_iter().map(|r| r["amount"].clone()).collect();
        assert_eq!(amounts, vec![json!("0.04"), json!("0.05")]);
    }

    #[test]
    fn test_table_size_queries() {
        let source = DuckDbSource {
            conn: Arc::new(Mutex::new(Connection::open_in_memory().unwrap())),
            engine: DatabaseEngine::Mysql,
            attached: true,
            connection_string: String::new(),
        };
        let stream = Stream::new("orders", Some("shop".to_string()), vec![]);
        let sql = source.table_size_query(&stream).unwrap();
        assert_eq!(
            sql,
            "SELECT DATA_LENGTH FROM mysql_query('source_db', 'SELECT DATA_LENGTH FROM \
             information_schema.TABLES t WHERE TABLE_SCHEMA = ''shop'' AND TABLE_NAME = ''orders''')"
        );
    }
}
