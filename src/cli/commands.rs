//! CLI command implementations
//!
//! Commands run offline against files. `apply` stands up a master
//! replicable, so an operation log goes through the same application,
//! nested emission and sequencing a live master performs.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::leaderboard::{
    RacingEventReplicable, RacingEventService, ServiceSnapshot, RACING_EVENT_SERVICE_ID,
};
use crate::observability::{Logger, Severity};
use crate::replication::{read_frame, InitialLoadHeader, ReplicationConfig};
use crate::transform::Transformable;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{parse_operation, read_operations, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    // stdout carries the response; routine events would interleave with it
    if !cli.verbose {
        Logger::set_min_severity(Severity::Warn);
    }
    match run_command(cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Apply {
            snapshot,
            ops,
            config,
        } => apply(&snapshot, &ops, config.as_deref()),
        Command::Inspect { snapshot } => inspect(&snapshot),
        Command::Transform { client, server } => transform(&client, &server),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<ReplicationConfig> {
    let config = match path {
        Some(path) => ReplicationConfig::load(path)?,
        None => ReplicationConfig::master(RACING_EVENT_SERVICE_ID),
    };
    if config.is_replica() {
        return Err(CliError::config_error(
            "apply runs a master; replica configurations are not accepted",
        ));
    }
    Ok(config)
}

/// Apply an operation log and write the resulting initial load.
///
/// An existing snapshot is loaded first, so repeated runs continue its
/// sequence. The snapshot is replaced only after every operation applied.
pub fn apply(snapshot: &Path, ops: &Path, config: Option<&Path>) -> CliResult<Value> {
    let config = load_config(config)?;
    let master = RacingEventReplicable::from_config(&config, Arc::new(RacingEventService::new()))?;

    if snapshot.exists() {
        let mut reader = BufReader::new(File::open(snapshot)?);
        master.initially_fill_from(&mut reader)?;
    }

    let operations = read_operations(ops)?;
    for (line, operation) in &operations {
        master
            .apply(operation.clone())
            .map_err(|e| CliError::apply_failed(format!("line {}: {}", line, e.message)))?;
    }

    let staged = snapshot.with_extension("partial");
    let sequence = {
        let mut writer = BufWriter::new(File::create(&staged)?);
        let sequence = master.serialize_for_initial_replication(&mut writer)?;
        writer.flush()?;
        sequence
    };
    fs::rename(&staged, snapshot)?;

    let state = master.state();
    Ok(json!({
        "applied": operations.len(),
        "sequence": sequence,
        "leaderboards": state.leaderboard_names(),
        "groups": state.group_names(),
    }))
}

/// Decode an initial load without applying it anywhere.
pub fn inspect(snapshot: &Path) -> CliResult<Value> {
    let mut reader = BufReader::new(File::open(snapshot).map_err(|e| {
        CliError::snapshot_error(format!("Failed to open {}: {}", snapshot.display(), e))
    })?);
    let header: InitialLoadHeader =
        read_frame(&mut reader).map_err(|e| CliError::snapshot_error(e.to_string()))?;
    let contents: ServiceSnapshot =
        read_frame(&mut reader).map_err(|e| CliError::snapshot_error(e.to_string()))?;

    Ok(json!({
        "replicable_id": header.replicable_id,
        "sequence": header.sequence,
        "created_at": header.created_at.to_rfc3339(),
        "leaderboards": contents.leaderboards,
        "groups": contents.groups,
    }))
}

/// Both transformation results for a (client, server) pair.
pub fn transform(client: &str, server: &str) -> CliResult<Value> {
    let client = parse_operation(client)?;
    let server = parse_operation(server)?;
    Ok(json!({
        "client": client.transform_client_op(&server),
        "server": server.transform_server_op(&client),
    }))
}
