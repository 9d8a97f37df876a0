use async_trait::async_trait;
use floorgraph_shared::models::{
    Edge, EdgeId, Floor, FloorImage, FloorSet, GraphPayload, Node, NodeType,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::interaction::{EdgeIntent, NodeIntent};

/// Request/response calls the engine needs from the backend.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn images(&self) -> Result<Vec<FloorImage>>;
    async fn node_types(&self) -> Result<Vec<NodeType>>;
    async fn graph(&self, floor: Floor) -> Result<GraphPayload>;
    async fn create_node(&self, intent: &NodeIntent) -> Result<Node>;
    /// `None` when the call succeeded without returning the stored edge.
    async fn create_edge(&self, intent: &EdgeIntent) -> Result<Option<Edge>>;
    async fn disable_edge(&self, edge: EdgeId) -> Result<()>;
    async fn reload_graph(&self) -> Result<()>;
}

/// Build the variables JSON for a create node mutation.
pub fn build_create_node_variables(intent: &NodeIntent) -> serde_json::Value {
    serde_json::json!({
        "input": {
            "floor": intent.floor,
            "xPx": intent.x_px,
            "yPx": intent.y_px,
            "nodeType": intent.node_type,
            "imageHeight": intent.image_height
        }
    })
}

/// Build the variables JSON for a create edge mutation.
pub fn build_create_edge_variables(intent: &EdgeIntent) -> serde_json::Value {
    serde_json::json!({
        "input": {
            "floor": intent.floor,
            "from": intent.from,
            "to": intent.to
        }
    })
}

/// GraphQL endpoint under a base URL.
pub fn graphql_url(base_url: &str) -> String {
    format!("{}/graphql", base_url.trim_end_matches('/'))
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLError {
    pub message: String,
}

// Types mirroring the GraphQL schema

const NODE_FIELDS: &str = "id floors nodeType x y capacity currentOccupancy";
const ARC_FIELDS: &str = "id floor from to active";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub file_name: String,
    pub floor: Floor,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeData {
    #[serde(rename = "type")]
    pub node_type: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub id: i64,
    pub floors: Vec<Floor>,
    pub node_type: String,
    pub x: i64,
    pub y: i64,
    pub capacity: u32,
    pub current_occupancy: u32,
}

impl TryFrom<NodeData> for Node {
    type Error = ClientError;

    fn try_from(data: NodeData) -> Result<Self> {
        if data.floors.is_empty() {
            return Err(ClientError::Malformed(format!("node {} has no floor", data.id)));
        }
        Ok(Node {
            id: data.id,
            floor: FloorSet::from_floors(data.floors),
            node_type: data.node_type,
            x: data.x,
            y: data.y,
            capacity: data.capacity,
            current_occupancy: data.current_occupancy,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcData {
    pub id: i64,
    pub floor: Floor,
    pub from: i64,
    pub to: i64,
    pub active: bool,
}

impl From<ArcData> for Edge {
    fn from(data: ArcData) -> Self {
        Edge {
            id: Some(data.id),
            floor: data.floor,
            from: data.from,
            to: data.to,
            active: data.active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphData {
    pub image: String,
    pub image_width: u32,
    pub image_height: u32,
    pub nodes: Vec<NodeData>,
    pub arcs: Vec<ArcData>,
}

impl TryFrom<GraphData> for GraphPayload {
    type Error = ClientError;

    fn try_from(data: GraphData) -> Result<Self> {
        let nodes = data
            .nodes
            .into_iter()
            .map(Node::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(GraphPayload {
            image: data.image,
            image_width: data.image_width,
            image_height: data.image_height,
            nodes,
            arcs: data.arcs.into_iter().map(Edge::from).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ImagesResponse {
    pub images: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
pub struct NodeTypesResponse {
    #[serde(rename = "nodeTypes")]
    pub node_types: Vec<NodeTypeData>,
}

#[derive(Debug, Deserialize)]
pub struct GraphResponse {
    pub graph: Option<GraphData>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNodeResponse {
    #[serde(rename = "createNode")]
    pub create_node: NodeData,
}

#[derive(Debug, Deserialize)]
pub struct CreateEdgeResponse {
    #[serde(rename = "createEdge")]
    pub create_edge: Option<ArcData>,
}

#[derive(Debug, Deserialize)]
pub struct DisableEdgeResponse {
    #[serde(rename = "disableEdge")]
    pub disable_edge: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReloadGraphResponse {
    #[serde(rename = "reloadGraph")]
    pub reload_graph: bool,
}

/// [`GraphBackend`] over the backend's GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlBackend {
    http: reqwest::Client,
    endpoint: String,
}

impl GraphqlBackend {
    pub fn new(base_url: &str) -> Self {
        GraphqlBackend {
            http: reqwest::Client::new(),
            endpoint: graphql_url(base_url),
        }
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query_str: &str,
        variables: Option<serde_json::Value>,
    ) -> Result<T> {
        let req = GraphQLRequest {
            query: query_str.to_string(),
            variables,
        };

        let resp = self.http.post(&self.endpoint).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        let body = resp.text().await?;
        decode_response(&body)
    }
}

/// Unwrap a GraphQL response body, surfacing the first error.
pub fn decode_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let gql_resp: GraphQLResponse<T> =
        serde_json::from_str(body).map_err(|e| ClientError::Malformed(e.to_string()))?;

    if let Some(errors) = gql_resp.errors {
        if let Some(first) = errors.first() {
            return Err(ClientError::Server(first.message.clone()));
        }
    }

    gql_resp
        .data
        .ok_or_else(|| ClientError::Malformed("No data returned".to_string()))
}

#[async_trait]
impl GraphBackend for GraphqlBackend {
    async fn images(&self) -> Result<Vec<FloorImage>> {
        let resp: ImagesResponse = self
            .query(r#"query { images { fileName floor width height } }"#, None)
            .await?;
        Ok(resp
            .images
            .into_iter()
            .map(|i| FloorImage {
                file_name: i.file_name,
                floor: i.floor,
                width: i.width,
                height: i.height,
            })
            .collect())
    }

    async fn node_types(&self) -> Result<Vec<NodeType>> {
        let resp: NodeTypesResponse = self
            .query(r#"query { nodeTypes { type displayName } }"#, None)
            .await?;
        Ok(resp
            .node_types
            .into_iter()
            .map(|t| NodeType {
                node_type: t.node_type,
                display_name: t.display_name,
            })
            .collect())
    }

    async fn graph(&self, floor: Floor) -> Result<GraphPayload> {
        let query_str = format!(
            "query Graph($floor: Int!) {{ graph(floor: $floor) {{ image imageWidth imageHeight nodes {{ {} }} arcs {{ {} }} }} }}",
            NODE_FIELDS, ARC_FIELDS
        );
        let resp: GraphResponse = self
            .query(&query_str, Some(serde_json::json!({ "floor": floor })))
            .await?;
        let data = resp
            .graph
            .ok_or_else(|| ClientError::Server(format!("Unknown floor: {}", floor)))?;
        GraphPayload::try_from(data)
    }

    async fn create_node(&self, intent: &NodeIntent) -> Result<Node> {
        let query_str = format!(
            "mutation CreateNode($input: CreateNodeInput!) {{ createNode(input: $input) {{ {} }} }}",
            NODE_FIELDS
        );
        let resp: CreateNodeResponse = self
            .query(&query_str, Some(build_create_node_variables(intent)))
            .await?;
        Node::try_from(resp.create_node)
    }

    async fn create_edge(&self, intent: &EdgeIntent) -> Result<Option<Edge>> {
        let query_str = format!(
            "mutation CreateEdge($input: CreateEdgeInput!) {{ createEdge(input: $input) {{ {} }} }}",
            ARC_FIELDS
        );
        let resp: CreateEdgeResponse = self
            .query(&query_str, Some(build_create_edge_variables(intent)))
            .await?;
        Ok(resp.create_edge.map(Edge::from))
    }

    async fn disable_edge(&self, edge: EdgeId) -> Result<()> {
        let resp: DisableEdgeResponse = self
            .query(
                r#"mutation DisableEdge($id: Int!) { disableEdge(id: $id) }"#,
                Some(serde_json::json!({ "id": edge })),
            )
            .await?;
        if resp.disable_edge {
            Ok(())
        } else {
            Err(ClientError::Server(format!("Edge {} was not disabled", edge)))
        }
    }

    async fn reload_graph(&self) -> Result<()> {
        let _: ReloadGraphResponse = self
            .query(r#"mutation { reloadGraph }"#, None)
            .await?;
        Ok(())
    }
}
