//! CLI surface for the `ckm` inspector.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::Result;
use crate::metadata::{
    ChannelStateHandle, CheckpointMetadata, CheckpointSummary, KeyedStateHandle, OperatorState,
    ParseOptions, StreamStateHandle, parse_file, parse_file_summary,
};

#[derive(Parser, Debug)]
#[command(
    name = "ckm",
    version,
    about = "Flink checkpoint metadata inspector",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize a _metadata file (header + operator roster).
    Summary(SummaryArgs),

    /// Fully decode a _metadata file.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Path to the _metadata file.
    pub path: PathBuf,

    /// Also scan the raw bytes for inline strings and state file paths.
    #[arg(long)]
    pub strings: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to the _metadata file.
    pub path: PathBuf,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Summary(args) => {
            let options = ParseOptions {
                include_inline_strings: args.strings,
                ..ParseOptions::default()
            };
            let summary = parse_file_summary(&args.path, &options)?;
            if cli.json {
                print_json(&summary);
            } else {
                render_summary(&summary);
            }
        }
        Commands::Inspect(args) => {
            let metadata = parse_file(&args.path, &ParseOptions::default())?;
            if cli.json {
                print_json(&metadata);
            } else {
                render_metadata(&metadata);
            }
        }
    }
    Ok(())
}

fn print_json(value: &impl serde::Serialize) {
    // All model types serialize with string keys; this cannot fail.
    println!("{}", serde_json::to_string_pretty(value).expect("json render"));
}

fn render_summary(summary: &CheckpointSummary) {
    println!("checkpoint {} (metadata v{})", summary.checkpoint_id, summary.version);
    println!("operators: {}", summary.num_operators);
    for operator in &summary.operators {
        println!(
            "  {}  p={}/{}  {}",
            operator.operator_id,
            operator.parallelism,
            operator.max_parallelism,
            operator.name.as_deref().unwrap_or("<unnamed>"),
        );
    }
    if let Some(properties) = &summary.properties {
        println!("properties:");
        for (label, value) in [
            ("checkpoint-type", &properties.checkpoint_type),
            ("sharing-files-strategy", &properties.sharing_files_strategy),
            ("source", &properties.source),
        ] {
            if let Some(value) = value {
                println!("  {label}: {value}");
            }
        }
    }
    if let Some(paths) = &summary.state_file_paths {
        println!("state file paths: {}", paths.len());
        for path in paths {
            println!("  {path}");
        }
    }
}

fn render_metadata(metadata: &CheckpointMetadata) {
    println!(
        "checkpoint {} (metadata v{})",
        metadata.checkpoint_id, metadata.version
    );
    for master in &metadata.master_states {
        println!(
            "master state {:?} v{} ({} bytes)",
            master.name,
            master.version,
            master.payload.len()
        );
    }
    for operator in &metadata.operator_states {
        render_operator(operator);
    }
    println!("trailing properties bytes: {}", metadata.properties_raw.len());
}

fn render_operator(operator: &OperatorState) {
    println!(
        "operator {}  p={}/{}  {}{}",
        operator.operator_id,
        operator.parallelism,
        operator.max_parallelism,
        operator.name.as_deref().unwrap_or("<unnamed>"),
        if operator.finished { "  [finished]" } else { "" },
    );
    if let Some(coordinator) = &operator.coordinator_state {
        println!("  coordinator: {}", describe_handle(coordinator));
    }
    for subtask in &operator.subtasks {
        if subtask.finished {
            println!("  subtask {} [finished]", subtask.index);
            continue;
        }
        let keyed = [&subtask.managed_keyed_state, &subtask.raw_keyed_state]
            .iter()
            .filter(|handle| handle.is_some())
            .count();
        let operator_handles = [
            &subtask.managed_operator_state,
            &subtask.raw_operator_state,
        ]
        .iter()
        .filter(|handle| handle.is_some())
        .count();
        println!(
            "  subtask {}: {} keyed, {} operator, {} input / {} output channels",
            subtask.index,
            keyed,
            operator_handles,
            subtask.input_channel_states.len(),
            subtask.output_channel_states.len(),
        );
        for handle in subtask
            .managed_keyed_state
            .iter()
            .chain(subtask.raw_keyed_state.iter())
        {
            render_keyed(handle, 4);
        }
        for channel in subtask
            .input_channel_states
            .iter()
            .chain(subtask.output_channel_states.iter())
        {
            render_channel(channel);
        }
    }
}

fn render_keyed(handle: &KeyedStateHandle, indent: usize) {
    let pad = " ".repeat(indent);
    match handle {
        KeyedStateHandle::KeyGroups(h) => {
            println!(
                "{pad}key groups [{}, +{}] {}",
                h.start_key_group,
                h.num_key_groups,
                h.delegate.as_ref().map_or_else(String::new, describe_handle),
            );
        }
        KeyedStateHandle::IncrementalKeyGroups(h) => {
            println!(
                "{pad}incremental backend {:?}: {} shared, {} private files",
                h.backend_id,
                h.shared_files.len(),
                h.private_files.len(),
            );
        }
        KeyedStateHandle::Changelog(h) => {
            println!(
                "{pad}changelog materialization {}: {} materialized, {} non-materialized",
                h.materialization_id,
                h.materialized.len(),
                h.non_materialized.len(),
            );
            for nested in h.materialized.iter().chain(h.non_materialized.iter()) {
                render_keyed(nested, indent + 2);
            }
        }
        KeyedStateHandle::ChangelogByteIncrement(h) => {
            println!("{pad}changelog increment seq {}..{}", h.from_seq, h.to_seq);
        }
        KeyedStateHandle::ChangelogFileIncrement(h) => {
            println!(
                "{pad}changelog file increment: {} streams on {:?}",
                h.offsets.len(),
                h.storage_id,
            );
        }
    }
}

fn render_channel(channel: &ChannelStateHandle) {
    let (label, subtask, size) = match channel {
        ChannelStateHandle::InputChannel(info) => ("input channel", info.subtask_index, info.state_size),
        ChannelStateHandle::ResultSubpartition(info) => {
            ("result subpartition", info.subtask_index, info.state_size)
        }
        ChannelStateHandle::MergedInputChannel(info) => {
            ("merged input channel", info.subtask_index, info.state_size)
        }
        ChannelStateHandle::MergedResultSubpartition(info) => {
            ("merged result subpartition", info.subtask_index, info.state_size)
        }
    };
    println!("    {label} subtask {subtask}: {size} bytes");
}

fn describe_handle(handle: &StreamStateHandle) -> String {
    match handle {
        StreamStateHandle::ByteStream { name, size, .. } => {
            format!("inline {name:?} ({size} bytes)")
        }
        StreamStateHandle::File { path, size } => format!("{path} ({size} bytes)"),
        StreamStateHandle::Relative { path, size } => format!("rel:{path} ({size} bytes)"),
        StreamStateHandle::SegmentFile { path, start, size, .. } => {
            format!("{path}[{start}..+{size}]")
        }
        StreamStateHandle::EmptySegment => "empty segment".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_summary_with_strings_flag() {
        let cli = parse_from(["ckm", "summary", "--strings", "/tmp/_metadata"]);
        assert!(!cli.json);
        let Commands::Summary(args) = cli.command else {
            panic!("expected summary command");
        };
        assert!(args.strings);
        assert_eq!(args.path, PathBuf::from("/tmp/_metadata"));
    }

    #[test]
    fn cli_parses_global_json_after_subcommand() {
        let cli = parse_from(["ckm", "inspect", "--json", "/tmp/_metadata"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Inspect(_)));
    }
}
