use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flowline_facade::{FacadeConfig, ProcessModelFacade};
use flowline_model::{Definitions, FlowNode, GatewayDirection};

mod walk;

/// Flowline - BPMN process model inspection and execution
#[derive(Parser)]
#[command(name = "flowline")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Process to use when the model file holds several (default: the executable one)
  #[arg(long, global = true)]
  process: Option<String>,

  /// Maximum split nesting followed while searching join gateways
  #[arg(long, global = true, default_value_t = FacadeConfig::default().max_join_depth)]
  max_join_depth: usize,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Summarize a process model
  Inspect {
    /// Path to the model file (JSON)
    model_file: PathBuf,
  },

  /// Find the join gateway that closes a split gateway
  Join {
    /// Path to the model file (JSON)
    model_file: PathBuf,

    /// The split gateway id
    #[arg(long)]
    gateway: String,

    /// The split gateway enclosing `gateway`, if any
    #[arg(long)]
    parent: Option<String>,
  },

  /// List the nodes following a node
  Next {
    /// Path to the model file (JSON)
    model_file: PathBuf,

    /// The node id
    #[arg(long)]
    node: String,
  },

  /// Show the lane a node belongs to
  Lane {
    /// Path to the model file (JSON)
    model_file: PathBuf,

    /// The node id
    #[arg(long)]
    node: String,
  },

  /// Walk a process from a start event, taking every parallel branch
  Walk {
    /// Path to the model file (JSON)
    model_file: PathBuf,

    /// Start event id (default: the first start event)
    #[arg(long)]
    start: Option<String>,

    /// Abort after visiting this many nodes
    #[arg(long, default_value_t = 10_000)]
    max_steps: usize,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();
  let config = FacadeConfig {
    max_join_depth: cli.max_join_depth,
  };
  let process = cli.process.as_deref();

  match cli.command {
    Some(Commands::Inspect { model_file }) => {
      let facade = load_facade(&model_file, process, config)?;
      print_json(&inspect(&facade)?)?;
    }
    Some(Commands::Join {
      model_file,
      gateway,
      parent,
    }) => {
      let facade = load_facade(&model_file, process, config)?;
      let split = facade
        .flow_node_by_id(&gateway)
        .with_context(|| format!("gateway '{}' not found", gateway))?;
      let parent = parent
        .map(|id| {
          facade
            .flow_node_by_id(&id)
            .with_context(|| format!("parent gateway '{}' not found", id))
        })
        .transpose()?;

      let join = facade
        .find_join(split, parent)
        .with_context(|| format!("failed to find join for '{}'", gateway))?;
      print_json(&serde_json::json!({
        "gateway": gateway,
        "join": join.map(|node| node.id.clone()),
      }))?;
    }
    Some(Commands::Next { model_file, node }) => {
      let facade = load_facade(&model_file, process, config)?;
      let flow_node = facade
        .flow_node_by_id(&node)
        .with_context(|| format!("node '{}' not found", node))?;
      let next: Vec<&str> = facade
        .next_nodes(flow_node)
        .with_context(|| format!("failed to resolve successors of '{}'", node))?
        .into_iter()
        .map(|n| n.id.as_str())
        .collect();
      print_json(&serde_json::json!({ "node": node, "next": next }))?;
    }
    Some(Commands::Lane { model_file, node }) => {
      let facade = load_facade(&model_file, process, config)?;
      let lane = facade.lane_for(&node);
      print_json(&serde_json::json!({
        "node": node,
        "lane": lane.map(|l| serde_json::json!({ "id": l.id, "name": l.name })),
      }))?;
    }
    Some(Commands::Walk {
      model_file,
      start,
      max_steps,
    }) => {
      let facade = Arc::new(load_facade(&model_file, process, config)?);
      let payload = read_payload_from_stdin()?;

      let rt = tokio::runtime::Runtime::new()?;
      let report = rt
        .block_on(walk::walk(facade, start.as_deref(), payload, max_steps))
        .context("process walk failed")?;
      print_json(&serde_json::to_value(&report)?)?;
    }
    None => {
      println!("flowline - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_facade(model_file: &Path, process: Option<&str>, config: FacadeConfig) -> Result<ProcessModelFacade> {
  let definitions = Definitions::from_file(model_file)
    .with_context(|| format!("failed to load model file: {}", model_file.display()))?;
  let model = match process {
    Some(id) => definitions.process(id),
    None => definitions.executable_process(),
  }
  .with_context(|| format!("no matching process in {}", model_file.display()))?;

  ProcessModelFacade::with_config(Arc::new(model.clone()), config)
    .with_context(|| format!("failed to open process '{}'", model.id))
}

fn inspect(facade: &ProcessModelFacade) -> Result<serde_json::Value> {
  let model = facade.process_model();
  let ids = |nodes: Vec<&FlowNode>| nodes.into_iter().map(|n| n.id.clone()).collect::<Vec<_>>();

  let mut splits = Vec::new();
  for node in facade.flow_nodes() {
    if node.has_direction(GatewayDirection::Diverging) {
      let join = facade
        .find_join(node, None)
        .with_context(|| format!("failed to find join for '{}'", node.id))?;
      splits.push(serde_json::json!({
        "gateway": node.id,
        "type": node.bpmn_type().as_str(),
        "join": join.map(|j| j.id.clone()),
      }));
    }
  }

  let boundary_events: Vec<serde_json::Value> = facade
    .flow_nodes()
    .iter()
    .filter_map(|node| node.as_boundary_event().map(|event| (node, event)))
    .map(|(node, event)| {
      serde_json::json!({
        "id": node.id,
        "attached_to": event.attached_to_ref,
        "interrupting": event.cancel_activity,
      })
    })
    .collect();

  Ok(serde_json::json!({
    "id": model.id,
    "name": model.name,
    "start_events": ids(facade.start_events()),
    "end_events": ids(facade.end_events()),
    "user_tasks": ids(facade.user_tasks()),
    "splits": splits,
    "boundary_events": boundary_events,
  }))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Read a JSON payload from stdin, or use an empty object when nothing is piped.
fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload as JSON")
  }
}
