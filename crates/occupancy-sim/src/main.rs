//! Drives occupancy changes against a running backend so that viewers see
//! nodes change colour.
use std::collections::BTreeMap;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const DEFAULT_GRAPHQL_URL: &str = "http://localhost:3000/graphql";
const USAGE: &str =
    "Usage: occupancy-sim [--url <graphql-url>] [--interval-ms <ms>] [--rounds <n, 0 = forever>] [--nodes <n>]";

// --- GraphQL response types ---

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct ImagesData {
    images: Vec<Image>,
}

#[derive(Deserialize)]
struct Image {
    floor: i32,
}

#[derive(Deserialize)]
struct GraphData {
    graph: Option<Graph>,
}

#[derive(Deserialize)]
struct Graph {
    nodes: Vec<SimNode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimNode {
    id: i64,
    capacity: u32,
    current_occupancy: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetOccupancyData {
    set_occupancy: SimNode,
}

#[derive(Debug, PartialEq)]
struct Settings {
    url: String,
    interval: Duration,
    /// Zero runs until interrupted.
    rounds: u64,
    nodes_per_round: usize,
}

fn get_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().skip_while(|a| *a != flag).nth(1).cloned()
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> Result<T, String> {
    match get_arg(args, flag) {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("Invalid value for {flag}: {raw}")),
        None => Ok(default),
    }
}

impl Settings {
    fn from_args(args: &[String]) -> Result<Self, String> {
        Ok(Settings {
            url: get_arg(args, "--url").unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_string()),
            interval: Duration::from_millis(parse_flag(args, "--interval-ms", 1000)?),
            rounds: parse_flag(args, "--rounds", 0)?,
            nodes_per_round: parse_flag(args, "--nodes", 3)?,
        })
    }
}

fn post<T: DeserializeOwned>(
    client: &reqwest::blocking::Client,
    url: &str,
    query: &str,
    variables: serde_json::Value,
) -> Result<T, String> {
    let body = serde_json::json!({ "query": query, "variables": variables });
    let resp: GraphQlResponse<T> = client
        .post(url)
        .json(&body)
        .send()
        .map_err(|e| format!("Request failed: {e}"))?
        .json()
        .map_err(|e| format!("Failed to parse response: {e}"))?;
    if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(messages.join("; "));
    }
    resp.data.ok_or_else(|| "Response has no data".to_string())
}

/// Nodes with a capacity, once each even when they span several floors.
fn simulated_nodes(graphs: Vec<Graph>) -> Vec<SimNode> {
    let mut by_id = BTreeMap::new();
    for node in graphs.into_iter().flat_map(|g| g.nodes) {
        if node.capacity > 0 {
            by_id.entry(node.id).or_insert(node);
        }
    }
    by_id.into_values().collect()
}

/// Pick up to `count` nodes and a new occupancy in `0..=capacity` for each.
fn plan_round<R: Rng>(nodes: &[SimNode], count: usize, rng: &mut R) -> Vec<(i64, u32)> {
    nodes
        .choose_multiple(rng, count)
        .map(|n| (n.id, rng.gen_range(0..=n.capacity)))
        .collect()
}

fn fetch_nodes(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<SimNode>, String> {
    let images: ImagesData = post(client, url, "{ images { floor } }", serde_json::json!({}))?;
    let mut graphs = Vec::new();
    for image in images.images {
        let data: GraphData = post(
            client,
            url,
            "query Graph($floor: Int!) { graph(floor: $floor) { nodes { id capacity currentOccupancy } } }",
            serde_json::json!({ "floor": image.floor }),
        )?;
        graphs.extend(data.graph);
    }
    Ok(simulated_nodes(graphs))
}

fn run_round(
    client: &reqwest::blocking::Client,
    settings: &Settings,
    rng: &mut impl Rng,
) -> Result<usize, String> {
    let nodes = fetch_nodes(client, &settings.url)?;
    if nodes.is_empty() {
        tracing::warn!("No nodes with a capacity to simulate");
        return Ok(0);
    }
    let changes = plan_round(&nodes, settings.nodes_per_round, rng);
    for (id, occupancy) in &changes {
        let data: SetOccupancyData = post(
            client,
            &settings.url,
            "mutation Set($id: Int!, $occupancy: Int!) { setOccupancy(nodeId: $id, occupancy: $occupancy) { id capacity currentOccupancy } }",
            serde_json::json!({ "id": id, "occupancy": occupancy }),
        )?;
        let node = data.set_occupancy;
        tracing::info!(
            id = node.id,
            occupancy = node.current_occupancy,
            capacity = node.capacity,
            "Occupancy set"
        );
    }
    Ok(changes.len())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let settings = Settings::from_args(&args).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("{USAGE}");
        std::process::exit(1);
    });
    tracing::info!(url = %settings.url, rounds = settings.rounds, "Starting occupancy simulation");

    let client = reqwest::blocking::Client::new();
    let mut rng = rand::thread_rng();
    let mut round = 0u64;
    while settings.rounds == 0 || round < settings.rounds {
        round += 1;
        match run_round(&client, &settings, &mut rng) {
            Ok(changed) => tracing::debug!(round, changed, "Round finished"),
            Err(e) => tracing::error!(round, error = %e, "Round failed"),
        }
        std::thread::sleep(settings.interval);
    }
}
