use std::{fs::File, io::BufReader, path::Path};

use crate::error::Result;

use super::ir::SourceGraph;

/// Reads a normalized source model from disk.
///
/// Parsing the original textual/binary model formats is the job of the
/// source graph adapters, which sit outside this crate; they hand over the
/// ordered node list (plus the node-based side tables) as JSON in the shape
/// of [`SourceGraph`]. This function is that boundary.
pub fn parse_model(path: &Path) -> Result<SourceGraph> {
    log::debug!("Reading source model from {:?}", path);
    let file = File::open(path)?;
    let graph: SourceGraph = serde_json::from_reader(BufReader::new(file))?;
    log::debug!("Source model has {} nodes", graph.nodes.len());
    Ok(graph)
}
