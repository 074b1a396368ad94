//! nifty-node - run a single component invocation
//!
//! Usage:
//!
//! ```text
//! nifty-node <node-spec.toml|json>
//! nifty-node --list
//! ```
//!
//! The node spec names the component, its parameters and where each slot
//! lives. Buffer outputs are written to their `file` only when the node
//! succeeds.

use anyhow::{bail, Context};
use nifty_components::{
    config::{ConfigValue, NodeSpec},
    pipeline::{input_slot, output_slot, port::port_names, NodeRunner, NodeType, PortDirection},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nifty_components=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(arg) = std::env::args().nth(1) else {
        bail!("usage: nifty-node <node-spec.toml|json> | --list");
    };
    if arg == "--list" {
        list_components();
        return Ok(());
    }

    let spec = NodeSpec::load(&arg).with_context(|| format!("loading node spec {}", arg))?;
    tracing::info!("Running {} from {}", spec.component, arg);

    let inputs = spec
        .inputs
        .iter()
        .map(input_slot)
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = spec
        .outputs
        .iter()
        .map(output_slot)
        .collect::<Result<Vec<_>, _>>()?;

    let mut runner = NodeRunner::from_spec(&spec)?;
    let produced = runner.run(&inputs, &outputs)?;

    for (output, bytes) in spec.outputs.iter().zip(produced) {
        match (&output.file, bytes) {
            (Some(file), Some(bytes)) => {
                std::fs::write(file, bytes)
                    .with_context(|| format!("writing output '{}' to {:?}", output.name, file))?;
                tracing::info!("Wrote output '{}' to {:?}", output.name, file);
            }
            (Some(file), None) => {
                tracing::warn!("Output '{}' produced nothing; {:?} not written", output.name, file);
            }
            (None, _) => {}
        }
    }

    Ok(())
}

fn list_components() {
    for node_type in NodeType::all() {
        println!("{}", node_type);
        for line in node_type.description().lines() {
            println!("    {}", line);
        }
        if let Ok(node) = node_type.build(Vec::<(String, ConfigValue)>::new()) {
            let ports = node.ports();
            println!("    inputs:  {}", port_names(ports, PortDirection::Input).join(", "));
            println!("    outputs: {}", port_names(ports, PortDirection::Output).join(", "));
        }
        for spec in node_type.specs() {
            println!(
                "    param {} ({:?}, default {:?}){}",
                spec.name,
                spec.kind,
                spec.default,
                if spec.mutable { "" } else { " [fixed]" }
            );
        }
    }
}
