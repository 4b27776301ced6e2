//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{load_config, SourceConfig, StreamConfig};
use crate::engine::{Message, SyncEngine};
use crate::error::{Error, Result};
use crate::reader::PartitionReader;
use crate::source::DuckDbSource;
use crate::state::{SharedState, StateManager};
use crate::stream::Stream;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Check => self.check(),
            Commands::Discover => self.discover(),
            Commands::Plan { .. } => self.plan().await,
            Commands::Read { .. } => self.read().await,
        }
    }

    /// Load the source configuration
    fn load_config(&self) -> Result<SourceConfig> {
        load_config(&self.cli.config)
    }

    /// Load state
    fn load_state(&self) -> Result<StateManager> {
        // Inline state takes precedence
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    /// Check connection
    fn check(&self) -> Result<()> {
        let config = self.load_config()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!("Checking connection to {} database", config.database.engine)
            }
        }));

        let status = match DuckDbSource::connect(&config.database) {
            Ok(source) => match source.check_connection() {
                Ok(()) => {
                    let table_count = source.list_tables().map(|t| t.len()).unwrap_or(0);
                    json!({
                        "status": "SUCCEEDED",
                        "message": format!("Connection successful. Found {} tables.", table_count)
                    })
                }
                Err(e) => json!({
                    "status": "FAILED",
                    "message": format!("Connection check failed: {}", e)
                }),
            },
            Err(e) => json!({
                "status": "FAILED",
                "message": format!("Failed to connect: {}", e)
            }),
        };

        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": status
        }));
        Ok(())
    }

    /// List tables with their columns
    fn discover(&self) -> Result<()> {
        let config = self.load_config()?;
        let source = DuckDbSource::connect(&config.database)?;

        let mut streams = Vec::new();
        for table in source.list_tables()? {
            let fields = source.discover_fields(&table.name, table.namespace.as_deref())?;
            streams.push(json!({
                "name": table.name,
                "namespace": table.namespace,
                "fields": fields
            }));
        }

        self.output_message(&json!({
            "type": "CATALOG",
            "catalog": { "streams": streams }
        }));
        Ok(())
    }

    /// Print the readers each selected stream would be read with
    async fn plan(&self) -> Result<()> {
        let config = self.load_config()?;
        let source = Arc::new(DuckDbSource::connect(&config.database)?);
        let streams = self.resolve_streams(&config, &source)?;
        let engine = Self::build_engine(&config, source, self.load_state()?);

        for stream in streams {
            let label = stream.label();
            let readers = engine.plan(stream).await?;
            let readers: Vec<Value> = readers.iter().map(describe_reader).collect();
            self.output_message(&json!({
                "type": "PLAN",
                "plan": {
                    "stream": label,
                    "readers": readers
                }
            }));
        }
        Ok(())
    }

    /// Read selected streams
    async fn read(&self) -> Result<()> {
        let sync_start = Instant::now();
        let config = self.load_config()?;
        let source = Arc::new(DuckDbSource::connect(&config.database)?);
        let streams = self.resolve_streams(&config, &source)?;
        let mut engine = Self::build_engine(&config, source, self.load_state()?);

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!("Starting sync for {} streams from {}", streams.len(), config.database.engine)
            }
        }));

        let stream_count = streams.len();
        let result = engine
            .sync_streams(streams, &mut |msg| self.output_engine_message(&msg))
            .await;
        let stats = engine.stats().clone();

        // Output final state
        let state = serde_json::to_value(engine.state().snapshot().await)?;
        self.output_message(&json!({
            "type": "STATE",
            "state": state
        }));

        let status = match (&result, stats.errors) {
            (Ok(()), 0) => "SUCCEEDED",
            (Ok(()), _) => "PARTIAL",
            (Err(_), _) => "FAILED",
        };
        let mut summary = json!({
            "status": status,
            "connector_type": "database",
            "engine": config.database.engine.to_string(),
            "total_records": stats.records_synced,
            "total_streams": stream_count,
            "successful_streams": stats.streams_synced,
            "partitions_read": stats.partitions_synced,
            "checkpoints": stats.checkpoints_emitted,
            "errors": stats.errors,
            "duration_ms": sync_start.elapsed().as_millis() as u64
        });
        if let Err(e) = &result {
            summary["error"] = json!(e.to_string());
        }
        self.output_message(&json!({
            "type": "SYNC_SUMMARY",
            "summary": summary
        }));

        result
    }

    /// Configured streams selected with `--streams`, with their columns
    fn resolve_streams(&self, config: &SourceConfig, source: &DuckDbSource) -> Result<Vec<Stream>> {
        let selected: Vec<&StreamConfig> = match self.cli.command.selected_streams() {
            Some(names) => names
                .iter()
                .map(|name| {
                    config
                        .stream(name)
                        .ok_or_else(|| Error::StreamNotFound {
                            stream: name.clone(),
                        })
                })
                .collect::<Result<_>>()?,
            None => config.streams.iter().collect(),
        };

        selected
            .into_iter()
            .map(|stream_config| {
                let fields = match &stream_config.fields {
                    Some(fields) => fields.clone(),
                    None => source
                        .discover_fields(&stream_config.name, stream_config.namespace.as_deref())?,
                };
                stream_config.to_stream(fields)
            })
            .collect()
    }

    fn build_engine(
        config: &SourceConfig,
        source: Arc<DuckDbSource>,
        state: StateManager,
    ) -> SyncEngine {
        let shared = Arc::new(SharedState::new(
            config.partitioning.clone(),
            Arc::new(source.query_generator()),
        ));
        SyncEngine::new(source.clone(), source, shared, state)
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }

    /// Output an engine message
    fn output_engine_message(&self, msg: &Message) {
        match msg {
            Message::Record { stream, records } => {
                let emitted_at = chrono::Utc::now().timestamp_millis();
                for record in records {
                    self.output_message(&json!({
                        "type": "RECORD",
                        "record": {
                            "stream": stream,
                            "data": record,
                            "emitted_at": emitted_at
                        }
                    }));
                }
            }
            Message::State { stream, state } => {
                self.output_message(&json!({
                    "type": "STATE",
                    "state": {
                        "stream": stream,
                        "data": state
                    }
                }));
            }
            Message::Log { level, message } => {
                self.output_message(&json!({
                    "type": "LOG",
                    "log": {
                        "level": level.as_str(),
                        "message": message
                    }
                }));
            }
        }
    }
}

/// JSON description of a planned reader
fn describe_reader(reader: &PartitionReader) -> Value {
    match reader {
        PartitionReader::CheckpointOnly(state) => json!({
            "reader": reader.kind(),
            "state": state
        }),
        PartitionReader::NonResumable(partition) | PartitionReader::Resumable(partition) => {
            json!({
                "reader": reader.kind(),
                "partition": partition.kind(),
                "lower_bound": partition.lower_bound(),
                "upper_bound": partition.upper_bound(),
                "fetch_size": partition.stream_state().fetch_size()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointState;
    use crate::config::PartitioningConfig;
    use crate::partition::{Partition, RfrSnapshot};
    use crate::query::AnsiQueryGenerator;
    use crate::state::StreamState;
    use crate::stream::Field;
    use crate::types::FieldType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_describe_checkpoint_only_reader() {
        let reader = PartitionReader::CheckpointOnly(CheckpointState::SnapshotCompleted);
        assert_eq!(
            describe_reader(&reader),
            json!({
                "reader": "checkpoint_only",
                "state": { "state_type": "snapshot_completed" }
            })
        );
    }

    #[test]
    fn test_describe_ranged_reader() {
        let id = Field::new("id", FieldType::Integer);
        let shared = Arc::new(SharedState::new(
            PartitioningConfig::default(),
            Arc::new(AnsiQueryGenerator::new()),
        ));
        let stream_state = Arc::new(StreamState::new(
            Stream::new("users", None, vec![id.clone()]).with_primary_key(&["id"]),
            shared,
        ));
        let reader = PartitionReader::NonResumable(Partition::RfrSnapshot(RfrSnapshot {
            stream_state,
            primary_key: vec![id],
            lower_bound: Some(vec![json!(10)]),
            upper_bound: None,
        }));

        assert_eq!(
            describe_reader(&reader),
            json!({
                "reader": "non_resumable",
                "partition": "rfr_snapshot",
                "lower_bound": [10],
                "upper_bound": null,
                "fetch_size": null
            })
        );
    }
}
