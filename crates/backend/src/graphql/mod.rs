use std::sync::Arc;

use async_graphql::{Context, InputObject, Object, SimpleObject};
use floorgraph_shared::models::{Edge, FloorImage, GraphPayload, Node};

use crate::assets::NodeTypeEntry;
use crate::service::{CreateNode, GraphService};
use crate::storage::ArcStatusEntry;

// GraphQL output types

#[derive(SimpleObject)]
pub struct GqlFloorImage {
    pub file_name: String,
    pub floor: i32,
    pub width: u32,
    pub height: u32,
}

impl From<&FloorImage> for GqlFloorImage {
    fn from(f: &FloorImage) -> Self {
        GqlFloorImage {
            file_name: f.file_name.clone(),
            floor: f.floor,
            width: f.width,
            height: f.height,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlNodeType {
    #[graphql(name = "type")]
    pub node_type: String,
    pub display_name: String,
    pub capacity: u32,
}

impl From<&NodeTypeEntry> for GqlNodeType {
    fn from(t: &NodeTypeEntry) -> Self {
        GqlNodeType {
            node_type: t.node_type.clone(),
            display_name: t.display_name.clone(),
            capacity: t.capacity,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlNode {
    pub id: i64,
    pub floors: Vec<i32>,
    pub node_type: String,
    pub x: i64,
    pub y: i64,
    pub capacity: u32,
    pub current_occupancy: u32,
}

impl From<Node> for GqlNode {
    fn from(n: Node) -> Self {
        GqlNode {
            id: n.id,
            floors: n.floor.iter().collect(),
            node_type: n.node_type,
            x: n.x,
            y: n.y,
            capacity: n.capacity,
            current_occupancy: n.current_occupancy,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlArc {
    pub id: Option<i64>,
    pub floor: i32,
    #[graphql(name = "from")]
    pub from_node: i64,
    #[graphql(name = "to")]
    pub to_node: i64,
    pub active: bool,
}

impl From<Edge> for GqlArc {
    fn from(e: Edge) -> Self {
        GqlArc {
            id: e.id,
            floor: e.floor,
            from_node: e.from,
            to_node: e.to,
            active: e.active,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlGraph {
    pub image: String,
    pub image_width: u32,
    pub image_height: u32,
    pub nodes: Vec<GqlNode>,
    pub arcs: Vec<GqlArc>,
}

impl From<&GraphPayload> for GqlGraph {
    fn from(g: &GraphPayload) -> Self {
        GqlGraph {
            image: g.image.clone(),
            image_width: g.image_width,
            image_height: g.image_height,
            nodes: g.nodes.iter().cloned().map(GqlNode::from).collect(),
            arcs: g.arcs.iter().cloned().map(GqlArc::from).collect(),
        }
    }
}

/// Result of writing a floor's graph to disk.
#[derive(SimpleObject)]
pub struct GqlGraphExport {
    pub message: String,
    pub path: String,
    pub graph: GqlGraph,
}

#[derive(SimpleObject)]
pub struct GqlArcStatus {
    pub arc_id: i64,
    pub active: bool,
    pub changed_at: String,
}

impl From<ArcStatusEntry> for GqlArcStatus {
    fn from(e: ArcStatusEntry) -> Self {
        GqlArcStatus {
            arc_id: e.arc_id,
            active: e.active,
            changed_at: e.changed_at,
        }
    }
}

// Input types

#[derive(InputObject)]
pub struct CreateNodeInput {
    pub floor: i32,
    pub x_px: i64,
    pub y_px: i64,
    pub node_type: String,
    /// Image height the client converted with.
    pub image_height: Option<u32>,
    /// Further floors for stairwells and lifts.
    pub extra_floors: Option<Vec<i32>>,
}

#[derive(InputObject)]
pub struct CreateEdgeInput {
    pub floor: i32,
    pub from: i64,
    pub to: i64,
}

// Query root

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn images(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<GqlFloorImage>> {
        let service = ctx.data::<Arc<GraphService>>()?;
        Ok(service.assets.floors.iter().map(GqlFloorImage::from).collect())
    }

    async fn node_types(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<GqlNodeType>> {
        let service = ctx.data::<Arc<GraphService>>()?;
        Ok(service
            .assets
            .node_types
            .iter()
            .map(GqlNodeType::from)
            .collect())
    }

    /// Null for a floor without an image.
    async fn graph(&self, ctx: &Context<'_>, floor: i32) -> async_graphql::Result<Option<GqlGraph>> {
        let service = ctx.data::<Arc<GraphService>>()?;
        let graph = service.graph(floor).map_err(async_graphql::Error::new)?;
        Ok(graph.as_deref().map(GqlGraph::from))
    }

    async fn node(&self, ctx: &Context<'_>, id: i64) -> async_graphql::Result<Option<GqlNode>> {
        let service = ctx.data::<Arc<GraphService>>()?;
        let node = service
            .storage
            .get_node(id)
            .map_err(async_graphql::Error::new)?;
        Ok(node.map(GqlNode::from))
    }

    async fn arc_status_log(
        &self,
        ctx: &Context<'_>,
        arc_id: i64,
    ) -> async_graphql::Result<Vec<GqlArcStatus>> {
        let service = ctx.data::<Arc<GraphService>>()?;
        let log = service
            .storage
            .arc_status_log(arc_id)
            .map_err(async_graphql::Error::new)?;
        Ok(log.into_iter().map(GqlArcStatus::from).collect())
    }
}

// Mutation root

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_node(
        &self,
        ctx: &Context<'_>,
        input: CreateNodeInput,
    ) -> async_graphql::Result<GqlNode> {
        let service = ctx.data::<Arc<GraphService>>()?;
        let node = service
            .create_node(CreateNode {
                floor: input.floor,
                extra_floors: input.extra_floors.unwrap_or_default(),
                x_px: input.x_px,
                y_px: input.y_px,
                node_type: input.node_type,
                image_height: input.image_height,
            })
            .map_err(async_graphql::Error::new)?;
        Ok(GqlNode::from(node))
    }

    async fn create_edge(
        &self,
        ctx: &Context<'_>,
        input: CreateEdgeInput,
    ) -> async_graphql::Result<GqlArc> {
        let service = ctx.data::<Arc<GraphService>>()?;
        let edge = service
            .create_edge(input.floor, input.from, input.to)
            .map_err(async_graphql::Error::new)?;
        Ok(GqlArc::from(edge))
    }

    /// False when the edge was already inactive.
    async fn disable_edge(&self, ctx: &Context<'_>, id: i64) -> async_graphql::Result<bool> {
        let service = ctx.data::<Arc<GraphService>>()?;
        service.disable_edge(id).map_err(async_graphql::Error::new)
    }

    async fn export_graph(
        &self,
        ctx: &Context<'_>,
        floor: i32,
    ) -> async_graphql::Result<GqlGraphExport> {
        let service = ctx.data::<Arc<GraphService>>()?;
        let (path, graph) = service
            .export_graph(floor)
            .map_err(async_graphql::Error::new)?;
        Ok(GqlGraphExport {
            message: format!("Graph of floor {} exported", floor),
            path: path.display().to_string(),
            graph: GqlGraph::from(graph.as_ref()),
        })
    }

    async fn reload_graph(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let service = ctx.data::<Arc<GraphService>>()?;
        service.reload();
        Ok(true)
    }

    async fn set_occupancy(
        &self,
        ctx: &Context<'_>,
        node_id: i64,
        occupancy: u32,
    ) -> async_graphql::Result<GqlNode> {
        let service = ctx.data::<Arc<GraphService>>()?;
        let node = service
            .set_occupancy(node_id, occupancy)
            .map_err(async_graphql::Error::new)?;
        Ok(GqlNode::from(node))
    }
}

pub type Schema = async_graphql::Schema<QueryRoot, MutationRoot, async_graphql::EmptySubscription>;

pub fn build_schema(service: Arc<GraphService>) -> Schema {
    async_graphql::Schema::build(QueryRoot, MutationRoot, async_graphql::EmptySubscription)
        .data(service)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::test_service;
    use async_graphql::{Request, Variables};
    use floorgraph_shared::protocol::ServerEvent;
    use serde_json::json;

    async fn run(schema: &Schema, query: &str, variables: serde_json::Value) -> serde_json::Value {
        let resp = schema
            .execute(Request::new(query).variables(Variables::from_json(variables)))
            .await;
        assert!(resp.errors.is_empty(), "unexpected errors: {:?}", resp.errors);
        resp.data.into_json().unwrap()
    }

    #[tokio::test]
    async fn test_images_and_node_types() {
        let (_dir, service) = test_service();
        let schema = build_schema(service);
        let data = run(
            &schema,
            "{ images { fileName floor width height } nodeTypes { type displayName capacity } }",
            json!({}),
        )
        .await;
        assert_eq!(data["images"][0]["fileName"], "Floor0_ground.png");
        assert_eq!(data["images"][1]["floor"], 1);
        assert_eq!(data["nodeTypes"][0]["type"], "room");
        assert_eq!(data["nodeTypes"][0]["capacity"], 10);
    }

    #[tokio::test]
    async fn test_create_node_then_graph() {
        let (_dir, service) = test_service();
        let schema = build_schema(service);
        let created = run(
            &schema,
            "mutation M($input: CreateNodeInput!) { createNode(input: $input) { id floors nodeType x y capacity } }",
            json!({"input": {"floor": 1, "xPx": 120, "yPx": 40, "nodeType": "room", "imageHeight": 800}}),
        )
        .await;
        assert_eq!(created["createNode"]["floors"], json!([1]));
        assert_eq!(created["createNode"]["capacity"], 10);

        let graph = run(
            &schema,
            "query G($floor: Int!) { graph(floor: $floor) { image imageHeight nodes { id x y } arcs { id } } }",
            json!({"floor": 1}),
        )
        .await;
        assert_eq!(graph["graph"]["image"], "/static/floor1.png");
        assert_eq!(graph["graph"]["nodes"][0]["x"], 120);
        assert_eq!(graph["graph"]["arcs"], json!([]));

        let missing = run(&schema, "{ graph(floor: 5) { image } }", json!({})).await;
        assert!(missing["graph"].is_null());
    }

    #[tokio::test]
    async fn test_create_node_out_of_bounds_is_an_error() {
        let (_dir, service) = test_service();
        let schema = build_schema(service);
        let resp = schema
            .execute(
                r#"mutation { createNode(input: {floor: 1, xPx: 5000, yPx: 1, nodeType: "room"}) { id } }"#,
            )
            .await;
        assert_eq!(resp.errors.len(), 1);
        assert!(resp.errors[0].message.contains("outside"));
    }

    #[tokio::test]
    async fn test_stairwell_input_spans_floors() {
        let (_dir, service) = test_service();
        let schema = build_schema(service);
        let data = run(
            &schema,
            r#"mutation { createNode(input: {floor: 1, xPx: 3, yPx: 3, nodeType: "stairs", extraFloors: [0]}) { floors } }"#,
            json!({}),
        )
        .await;
        assert_eq!(data["createNode"]["floors"], json!([0, 1]));
    }

    #[tokio::test]
    async fn test_edge_lifecycle_and_status_log() {
        let (_dir, service) = test_service();
        let a = service.create_node(crate::service::tests::room(1, 1, 1)).unwrap();
        let b = service.create_node(crate::service::tests::room(1, 2, 2)).unwrap();
        let mut rx = service.hub.subscribe();
        let schema = build_schema(Arc::clone(&service));

        let created = run(
            &schema,
            "mutation E($input: CreateEdgeInput!) { createEdge(input: $input) { id floor from to active } }",
            json!({"input": {"floor": 1, "from": a.id, "to": b.id}}),
        )
        .await;
        assert_eq!(created["createEdge"]["active"], true);
        let id = created["createEdge"]["id"].as_i64().unwrap();
        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::EdgeCreated(_)));

        let disabled = run(
            &schema,
            "mutation D($id: Int!) { disableEdge(id: $id) }",
            json!({"id": id}),
        )
        .await;
        assert_eq!(disabled["disableEdge"], true);

        let log = run(
            &schema,
            "query L($id: Int!) { arcStatusLog(arcId: $id) { arcId active changedAt } }",
            json!({"id": id}),
        )
        .await;
        assert_eq!(log["arcStatusLog"][0]["active"], false);
        assert!(!log["arcStatusLog"][0]["changedAt"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_occupancy_and_node_query() {
        let (_dir, service) = test_service();
        let node = service.create_node(crate::service::tests::room(1, 1, 1)).unwrap();
        let schema = build_schema(service);
        run(
            &schema,
            "mutation S($id: Int!) { setOccupancy(nodeId: $id, occupancy: 7) { currentOccupancy } }",
            json!({"id": node.id}),
        )
        .await;
        let data = run(
            &schema,
            "query N($id: Int!) { node(id: $id) { currentOccupancy } }",
            json!({"id": node.id}),
        )
        .await;
        assert_eq!(data["node"]["currentOccupancy"], 7);
    }

    #[tokio::test]
    async fn test_export_graph_returns_preview_and_writes_file() {
        let (dir, service) = test_service();
        let a = service.create_node(crate::service::tests::room(1, 1, 1)).unwrap();
        let b = service.create_node(crate::service::tests::room(1, 2, 2)).unwrap();
        service.create_edge(1, a.id, b.id).unwrap();
        let schema = build_schema(service);

        let data = run(
            &schema,
            "mutation X($floor: Int!) { exportGraph(floor: $floor) { message path graph { image nodes { id } arcs { from to } } } }",
            json!({"floor": 1}),
        )
        .await;
        let export = &data["exportGraph"];
        assert_eq!(export["message"], "Graph of floor 1 exported");
        assert_eq!(export["graph"]["image"], "/static/floor1.png");
        assert_eq!(export["graph"]["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(export["graph"]["arcs"], json!([{"from": a.id, "to": b.id}]));

        let path = dir.path().join("json").join("floor1.json");
        assert_eq!(export["path"], path.display().to_string());
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["arcs"][0]["from"], a.id);
    }

    #[tokio::test]
    async fn test_export_graph_unknown_floor_is_an_error() {
        let (_dir, service) = test_service();
        let schema = build_schema(service);
        let resp = schema
            .execute("mutation { exportGraph(floor: 9) { path } }")
            .await;
        assert_eq!(resp.errors.len(), 1);
        assert!(resp.errors[0].message.contains("Unknown floor"));
    }

    #[tokio::test]
    async fn test_reload_graph_broadcasts() {
        let (_dir, service) = test_service();
        let mut rx = service.hub.subscribe();
        let schema = build_schema(service);
        let data = run(&schema, "mutation { reloadGraph }", json!({})).await;
        assert_eq!(data["reloadGraph"], true);
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Reload);
    }
}
