//! Line-oriented operator surface.
use floorgraph_shared::models::Floor;
use floorgraph_shared::style;
use floorgraph_shared::transform::RenderCoord;

use crate::runtime::Surface;
use crate::store::FloorGraph;
use crate::sync::{Notice, UserAction};

pub const HELP: &str = "\
Commands:
  click <floor> <lat> <lng>   click empty map space (render coordinates)
  type <node-type>            choose the type for the clicked position
  cancel                      discard the clicked position
  edge                        toggle edge mode
  node <floor> <id>           click a node marker
  disable <floor> <edge-id>   deactivate an edge
  reload                      ask the server to reload the graph
  help                        show this text
  quit                        exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Action(UserAction),
    Help,
    Quit,
}

fn arg<T: std::str::FromStr>(parts: &[&str], index: usize, name: &str) -> Result<T, String> {
    let raw = parts
        .get(index)
        .ok_or_else(|| format!("Missing <{}>", name))?;
    raw.parse()
        .map_err(|_| format!("Invalid <{}>: {}", name, raw))
}

/// Parse one operator line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleLine>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(command) = parts.first() else {
        return Ok(None);
    };
    let action = match command.to_ascii_lowercase().as_str() {
        "click" => UserAction::MapClick {
            floor: arg::<Floor>(&parts, 1, "floor")?,
            at: RenderCoord {
                lat: arg(&parts, 2, "lat")?,
                lng: arg(&parts, 3, "lng")?,
            },
        },
        "type" => UserAction::ChooseNodeType(arg(&parts, 1, "node-type")?),
        "cancel" => UserAction::CancelNodeType,
        "edge" => UserAction::ToggleEdgeMode,
        "node" => UserAction::NodeClick {
            floor: arg(&parts, 1, "floor")?,
            node: arg(&parts, 2, "id")?,
        },
        "disable" => UserAction::DisableEdge {
            floor: arg(&parts, 1, "floor")?,
            edge: arg(&parts, 2, "edge-id")?,
        },
        "reload" => UserAction::ReloadGraph,
        "help" | "?" => return Ok(Some(ConsoleLine::Help)),
        "quit" | "exit" => return Ok(Some(ConsoleLine::Quit)),
        other => return Err(format!("Unknown command: {} (try 'help')", other)),
    };
    Ok(Some(ConsoleLine::Action(action)))
}

/// Prints floor summaries and notices to stdout.
#[derive(Debug, Default)]
pub struct PrintSurface {
    pub verbose: bool,
}

impl Surface for PrintSurface {
    fn render(&mut self, floor: &FloorGraph) {
        println!(
            "[floor {}] {} nodes, {} edges ({})",
            floor.floor(),
            floor.markers().count(),
            floor.lines().len(),
            floor.image().file_name
        );
        if self.verbose {
            for marker in floor.markers() {
                println!(
                    "  {} at ({:.0}, {:.0}) r={:.1} {}",
                    marker.label, marker.position.lat, marker.position.lng, marker.radius, marker.color
                );
            }
            for line in floor.lines() {
                println!(
                    "  edge {} - {} [{} {}px]",
                    line.key.low(),
                    line.key.high(),
                    style::EDGE_STYLE.color,
                    style::EDGE_STYLE.weight
                );
            }
        }
    }

    fn notify(&mut self, notice: &Notice) {
        println!("> {}", notice);
    }
}
