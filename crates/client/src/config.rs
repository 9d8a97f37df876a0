use std::str::FromStr;

const DEFAULT_URL: &str = "http://localhost:3000";

/// How creation intents reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntentRoute {
    /// GraphQL mutations. The direct response confirms; the broadcast is
    /// deduplicated against it.
    #[default]
    Http,
    /// Intents over the realtime socket, answered on that socket.
    Channel,
}

impl FromStr for IntentRoute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(IntentRoute::Http),
            "channel" | "ws" => Ok(IntentRoute::Channel),
            other => Err(format!("Unknown intent route: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub ws_url: String,
    pub intent_route: IntentRoute,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let base_url = lookup("FLOORGRAPH_URL")
            .unwrap_or_else(|| DEFAULT_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let ws_url = match lookup("FLOORGRAPH_WS_URL") {
            Some(url) => url,
            None => derive_ws_url(&base_url)?,
        };
        let intent_route = match lookup("FLOORGRAPH_INTENT_ROUTE") {
            Some(route) => route.parse()?,
            None => IntentRoute::default(),
        };
        Ok(ClientConfig {
            base_url,
            ws_url,
            intent_route,
        })
    }
}

/// `http(s)://host` -> `ws(s)://host/ws`.
pub fn derive_ws_url(base_url: &str) -> Result<String, String> {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{}/ws", rest))
    } else if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{}/ws", rest))
    } else {
        Err(format!("Base URL must start with http:// or https://: {}", base_url))
    }
}
