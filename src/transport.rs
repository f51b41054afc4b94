//! The transport collaborator boundary.
//!
//! The managers never speak HTTP themselves. They compile a [`Route`] plus a
//! JSON payload and hand both to a [`Transport`] implementation. Swapping
//! HTTP backends (or substituting a recording double in tests) only requires
//! implementing this one trait.

use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

/// A compiled REST route.
///
/// `route_key` is the path template with the major parameter filled in, e.g.
/// `PATCH /guilds/{guild_id}` — transports use it for per-route rate-limit
/// bucketing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub route_key: String,
}

impl Route {
    pub fn modify_guild(guild_id: u64) -> Self {
        Self {
            method: HttpMethod::Patch,
            path: format!("guilds/{}", guild_id),
            route_key: format!("PATCH /guilds/{}", guild_id),
        }
    }

    pub fn modify_channel(channel_id: u64) -> Self {
        Self {
            method: HttpMethod::Patch,
            path: format!("channels/{}", channel_id),
            route_key: format!("PATCH /channels/{}", channel_id),
        }
    }

    pub fn modify_role(guild_id: u64, role_id: u64) -> Self {
        Self {
            method: HttpMethod::Patch,
            path: format!("guilds/{}/roles/{}", guild_id, role_id),
            route_key: format!("PATCH /guilds/{}/roles", guild_id),
        }
    }

    pub fn modify_member(guild_id: u64, user_id: u64) -> Self {
        Self {
            method: HttpMethod::Patch,
            path: format!("guilds/{}/members/{}", guild_id, user_id),
            route_key: format!("PATCH /guilds/{}/members", guild_id),
        }
    }

    pub fn modify_webhook(webhook_id: u64) -> Self {
        Self {
            method: HttpMethod::Patch,
            path: format!("webhooks/{}", webhook_id),
            route_key: format!("PATCH /webhooks/{}", webhook_id),
        }
    }

    pub fn modify_channel_permissions(channel_id: u64, target_id: u64) -> Self {
        Self {
            method: HttpMethod::Put,
            path: format!("channels/{}/permissions/{}", channel_id, target_id),
            route_key: format!("PUT /channels/{}/permissions", channel_id),
        }
    }

    pub fn modify_current_user() -> Self {
        Self {
            method: HttpMethod::Patch,
            path: "users/@me".to_string(),
            route_key: "PATCH /users/@me".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses and errors
// ---------------------------------------------------------------------------

/// A structurally-successful response from the transport.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Parse the body as JSON, if there is one.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            // Char-wise truncation: the body is arbitrary remote bytes and a
            // byte slice could split a multi-byte character.
            let raw = String::from_utf8_lossy(&self.body);
            let preview: String = raw.chars().take(200).collect();
            TransportError::Decode(format!("{}: {}", e, preview))
        })
    }
}

#[derive(Debug)]
pub enum TransportError {
    /// Non-success status from the remote API.
    Api {
        status: u16,
        body: String,
        route: String,
    },
    /// Network-level failure.
    Network(String),
    /// The dispatch deadline elapsed before a response arrived. Any eventual
    /// response is discarded by the transport.
    Timeout,
    /// The response body could not be decoded.
    Decode(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Api {
                status,
                body,
                route,
            } => write!(f, "API error {} on {}: {}", status, route, body),
            TransportError::Network(e) => write!(f, "network error: {}", e),
            TransportError::Timeout => f.write_str("dispatch deadline elapsed"),
            TransportError::Decode(e) => write!(f, "response decode error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// Dispatches a compiled route + payload and returns the raw result.
///
/// Implementations own auth headers, rate limiting, and retries. When
/// `deadline` is set, the implementation must give up (and discard any late
/// response) once the duration elapses — there is no server-side
/// cancellation.
pub trait Transport {
    fn dispatch(
        &self,
        route: &Route,
        payload: Option<&serde_json::Value>,
        deadline: Option<Duration>,
    ) -> Result<RawResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_key_uses_major_parameter() {
        let route = Route::modify_role(42, 7);
        assert_eq!(route.path, "guilds/42/roles/7");
        assert_eq!(route.route_key, "PATCH /guilds/42/roles");
        assert_eq!(route.method, HttpMethod::Patch);
    }

    #[test]
    fn response_json_decodes() {
        let resp = RawResponse {
            status: 200,
            body: br#"{"id":"1"}"#.to_vec(),
        };
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn response_json_decode_failure_truncates_body() {
        let resp = RawResponse {
            status: 200,
            body: vec![b'x'; 500],
        };
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(err.to_string().len() < 300);
    }

    #[test]
    fn decode_error_preview_respects_char_boundaries() {
        // A multi-byte character straddling the truncation point.
        let mut body = vec![b'x'; 199];
        body.extend_from_slice("é page".as_bytes());
        let resp = RawResponse { status: 500, body };
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
