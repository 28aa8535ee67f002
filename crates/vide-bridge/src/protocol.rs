//! Wire protocol between the webview and the host.
//!
//! The preload script posts JSON requests over the webview IPC channel:
//! `{"channel":"bridge","call":1,"version":1,"op":"requestCamera"}`.
//! The host settles the pending promise by evaluating
//! `window.__visionideSettle({...})` with a [`BridgeReply`].

use crate::bridge::BRIDGE_VERSION;
use crate::camera::{DeviceId, FacingMode, MediaStreamHandle, StreamId};
use serde::{Deserialize, Serialize};

/// Name of the frozen global object the preload script installs.
pub const BRIDGE_GLOBAL: &str = "visionide";

/// Errors decoding or encoding bridge traffic. These stay on the host side.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Malformed bridge message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Operations in the current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeOp {
    RequestCamera,
}

/// A call from the page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    /// Caller-chosen id echoed in the reply
    pub call: u64,
    /// Bridge version the page was built against
    pub version: u32,
    pub op: BridgeOp,
}

impl BridgeRequest {
    /// Parse a request body. Extra envelope fields such as `channel` are
    /// ignored.
    pub fn parse(body: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Whether the page speaks our version.
    pub fn is_compatible(&self) -> bool {
        self.version == BRIDGE_VERSION
    }
}

/// Page-facing description of a granted stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub stream_id: StreamId,
    /// `None` lets the page use its default camera
    pub device_id: Option<String>,
    pub facing_mode: FacingMode,
}

impl From<&MediaStreamHandle> for StreamDescriptor {
    fn from(handle: &MediaStreamHandle) -> Self {
        let device_id = match handle.device() {
            DeviceId::Default => None,
            DeviceId::Path(path) => Some(path.display().to_string()),
        };
        Self {
            stream_id: handle.id(),
            device_id,
            facing_mode: handle.facing_mode(),
        }
    }
}

/// Reply settling one `requestCamera` promise. `stream: null` is the
/// absent value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeReply {
    pub call: u64,
    pub stream: Option<StreamDescriptor>,
}

impl BridgeReply {
    pub fn absent(call: u64) -> Self {
        Self { call, stream: None }
    }

    /// Script that resolves the pending promise in the page.
    pub fn to_script(&self) -> Result<String, BridgeError> {
        let json = serde_json::to_string(self)?;
        Ok(format!("window.__visionideSettle && window.__visionideSettle({json});"))
    }
}

const PRELOAD_TEMPLATE: &str = r#"(() => {
  'use strict';
  if (window.__GLOBAL__) { return; }
  const media = navigator.mediaDevices;
  const capture = media && media.getUserMedia ? media.getUserMedia.bind(media) : null;
  if (media) {
    Object.defineProperty(media, 'getUserMedia', {
      value: () => Promise.reject(
        new DOMException('Camera access goes through window.__GLOBAL__', 'NotAllowedError')),
      writable: false,
      configurable: false,
    });
  }
  const open = async (stream) => {
    if (!stream || !capture) { return null; }
    const video = { facingMode: stream.facingMode };
    if (stream.deviceId) { video.deviceId = { ideal: stream.deviceId }; }
    try {
      const mediaStream = await capture({ audio: false, video });
      return Object.freeze({ ...stream, mediaStream });
    } catch (err) {
      console.warn('granted camera could not be opened', err);
      return null;
    }
  };
  const pending = new Map();
  let nextCall = 1;
  Object.defineProperty(window, '__visionideSettle', {
    value: (reply) => {
      const resolve = pending.get(reply.call);
      if (resolve) {
        pending.delete(reply.call);
        open(reply.stream ?? null).then(resolve);
      }
    },
    writable: false,
    configurable: false,
  });
  const bridge = Object.freeze({
    version: __VERSION__,
    requestCamera: () => new Promise((resolve) => {
      const call = nextCall++;
      pending.set(call, resolve);
      try {
        window.ipc.postMessage(JSON.stringify({
          channel: 'bridge', call, version: __VERSION__, op: 'requestCamera',
        }));
      } catch (err) {
        pending.delete(call);
        console.warn('requestCamera failed', err);
        resolve(null);
      }
    }),
  });
  Object.defineProperty(window, '__GLOBAL__', {
    value: bridge,
    writable: false,
    configurable: false,
  });
})();
"#;

/// Initialization script injected into every page before its own scripts.
///
/// Installs a frozen `window.visionide` exposing only `version` and
/// `requestCamera()`, which always resolves: to the granted descriptor with
/// its opened `mediaStream`, or to `null`. The page's own
/// `navigator.mediaDevices.getUserMedia` is replaced by one that always
/// rejects, so the camera only opens after a bridge grant.
pub fn preload_script() -> String {
    PRELOAD_TEMPLATE
        .replace("__GLOBAL__", BRIDGE_GLOBAL)
        .replace("__VERSION__", &BRIDGE_VERSION.to_string())
}
