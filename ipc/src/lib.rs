use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Asks a renderer to drop whatever it can rebuild later.
pub const RELEASE_MEMORY_SIGNAL: &str = "memory-manager-clear-unused-data";

/// Sent back by a renderer after handling [`RELEASE_MEMORY_SIGNAL`].
pub const MEMORY_RELEASED: &str = "memory-manager-cleared";

/// Name of the WebKit script message handler views post to.
pub const MESSAGE_HANDLER: &str = "vigil";

/// Injected into every view at document start.
///
/// `__vigil_receive` re-dispatches host messages as DOM events of the same
/// name; `vigil.memoryReleased()` acknowledges a release request.
pub const BRIDGE_SCRIPT: &str = r#"(() => {
  const post = (type, payload) =>
    window.webkit.messageHandlers.vigil.postMessage(JSON.stringify({ type, payload }));
  window.__vigil_receive = (message) => {
    window.dispatchEvent(new CustomEvent(message.type, { detail: message.payload }));
  };
  window.vigil = Object.freeze({
    memoryReleased: () => post("memory-manager-cleared", {}),
  });
})();"#;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("malformed renderer message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Message posted by a renderer.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub r#type: String,
    #[serde(default)]
    pub payload: Value,
}

impl IncomingMessage {
    /// Returns `true` for the renderer's release acknowledgment.
    pub fn is_memory_released(&self) -> bool {
        self.r#type == MEMORY_RELEASED
    }
}

/// Message delivered to a renderer.
#[derive(Debug, Serialize)]
pub struct OutgoingMessage<'a, T> {
    pub r#type: &'a str,
    pub payload: T,
}

/// Parses the raw JSON string a renderer posted.
pub fn parse_incoming(raw: &str) -> Result<IncomingMessage, IpcError> {
    Ok(serde_json::from_str(raw)?)
}

/// Builds the script that delivers `message` to the renderer.
pub fn delivery_script<T: Serialize>(message: &OutgoingMessage<'_, T>) -> Result<String, IpcError> {
    let json = serde_json::to_string(message)?;
    Ok(format!("window.__vigil_receive && window.__vigil_receive({json});"))
}

/// Builds the script for a payload-less named signal.
pub fn signal_script(name: &str) -> Result<String, IpcError> {
    delivery_script(&OutgoingMessage {
        r#type: name,
        payload: serde_json::json!({}),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_signal_script_carries_the_signal_name() {
        let script = signal_script(RELEASE_MEMORY_SIGNAL).unwrap();
        assert_eq!(
            script,
            r#"window.__vigil_receive && window.__vigil_receive({"type":"memory-manager-clear-unused-data","payload":{}});"#
        );
    }

    #[test]
    fn signal_names_are_escaped() {
        let script = signal_script("a\"b").unwrap();
        assert!(script.contains(r#""type":"a\"b""#));
    }

    #[test]
    fn recognises_release_acknowledgement() {
        let message = parse_incoming(r#"{"type":"memory-manager-cleared","payload":{}}"#).unwrap();
        assert!(message.is_memory_released());

        let other = parse_incoming(r#"{"type":"ui.ready"}"#).unwrap();
        assert!(!other.is_memory_released());
        assert!(other.payload.is_null());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_incoming("not json"), Err(IpcError::Malformed(_))));
    }

    #[test]
    fn bridge_posts_to_the_registered_handler() {
        assert!(BRIDGE_SCRIPT.contains(&format!("messageHandlers.{MESSAGE_HANDLER}")));
        assert!(BRIDGE_SCRIPT.contains(MEMORY_RELEASED));
    }
}
