//! Tool schema translation
//!
//! Exposes the hardware surface to the LLM adapter as a fixed set of named
//! tools with JSON-schema argument shapes. Sessions with no hardware
//! channel configured simply never construct a [`HardwareToolExecutor`],
//! so their LLM context carries no hardware tool schemas at all — there is
//! no separate "disabled" flag to check at call time.

use crate::client::HardwareClient;
use conversa_pipeline::assembler::ToolExecutor;
use conversa_pipeline::frame::{ToolCall, ToolOutcome};
use conversa_pipeline::providers::vision::{VisionFrame, VisionProvider};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// The fixed tool surface the LLM adapter is given when a session has a
/// live hardware channel. Order is stable so prompt construction is
/// deterministic across calls.
pub fn tool_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: "execute_movement",
            description: "Perform one or more named gestures (e.g. a wave or a nod).",
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "gestures": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["gestures"]
            }),
        },
        ToolSchema {
            name: "set_emotion",
            description: "Set the robot's displayed emotion.",
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "emotion": { "type": "string" } },
                "required": ["emotion"]
            }),
        },
        ToolSchema {
            name: "set_eye_state",
            description: "Set the robot's eye display state.",
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "state": { "type": "string" } },
                "required": ["state"]
            }),
        },
        ToolSchema {
            name: "capture_camera",
            description: "Capture a still frame from a named camera.",
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "camera_id": { "type": "string" } },
                "required": ["camera_id"]
            }),
        },
        ToolSchema {
            name: "get_status",
            description: "Get the robot's current firmware version and joint list.",
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// Maps an LLM-facing gesture name to the joint/angle/speed triple the
/// gRPC `execute_movement` RPC actually expects. The LLM never sees a
/// joint name directly — gestures are the only movement vocabulary it's
/// given.
fn gesture_lookup(name: &str) -> Option<(&'static str, f32, f32)> {
    match name {
        "wave_right" => Some(("right_wrist", 45.0, 0.8)),
        "wave_left" => Some(("left_wrist", 45.0, 0.8)),
        "nod" => Some(("neck", 15.0, 0.5)),
        "shake_head" => Some(("neck", -15.0, 0.5)),
        _ => None,
    }
}

pub struct HardwareToolExecutor {
    client: HardwareClient,
    vision: Option<Arc<dyn VisionProvider>>,
}

impl HardwareToolExecutor {
    pub fn new(client: HardwareClient) -> Self {
        Self { client, vision: None }
    }

    /// Same as [`Self::new`], but routes `capture_camera` results through a
    /// vision provider so the LLM gets back a description it can reason
    /// over rather than a base64 blob it can't see.
    pub fn with_vision(client: HardwareClient, vision: Arc<dyn VisionProvider>) -> Self {
        Self { client, vision: Some(vision) }
    }
}

#[async_trait::async_trait]
impl ToolExecutor for HardwareToolExecutor {
    async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        match dispatch(&self.client, self.vision.as_deref(), call).await {
            Ok(value) => ToolOutcome::Value(value),
            Err(err) => ToolOutcome::Error(err.to_string()),
        }
    }
}

async fn dispatch(
    client: &HardwareClient,
    vision: Option<&dyn VisionProvider>,
    call: &ToolCall,
) -> Result<serde_json::Value, crate::error::HardwareError> {
    use crate::error::HardwareError;

    match call.name.as_str() {
        "execute_movement" => {
            let gestures = arg_str_array(&call.args, "gestures")?;
            for gesture in &gestures {
                let (joint, target, speed) = gesture_lookup(gesture)
                    .ok_or_else(|| HardwareError::BadArguments(format!("unknown gesture '{gesture}'")))?;
                client.execute_movement(joint, target, speed).await?;
            }
            Ok(serde_json::json!("ok"))
        }
        "set_emotion" => {
            let emotion = arg_str(&call.args, "emotion")?;
            client.set_emotion(&emotion).await?;
            Ok(serde_json::json!({ "ok": true }))
        }
        "set_eye_state" => {
            let state = arg_str(&call.args, "state")?;
            client.set_eye_state(&state).await?;
            Ok(serde_json::json!({ "ok": true }))
        }
        "capture_camera" => {
            let camera_id = arg_str(&call.args, "camera_id")?;
            let (rgb8, width, height) = client.capture_camera(&camera_id).await?;
            match vision {
                Some(vision) => {
                    let frame = VisionFrame { rgb8, width, height };
                    let description = vision
                        .describe(&frame)
                        .await
                        .map_err(|e| HardwareError::BadArguments(e.to_string()))?;
                    Ok(serde_json::json!({ "description": description }))
                }
                None => {
                    use base64::Engine;
                    Ok(serde_json::json!({
                        "width": width,
                        "height": height,
                        "rgb8_base64": base64::engine::general_purpose::STANDARD.encode(rgb8),
                    }))
                }
            }
        }
        "get_status" => {
            let (firmware_version, joints, camera_available) = client.get_status().await?;
            Ok(serde_json::json!({
                "firmware_version": firmware_version,
                "joints": joints,
                "camera_available": camera_available,
            }))
        }
        other => Err(HardwareError::UnknownTool(other.to_string())),
    }
}

fn arg_str(args: &serde_json::Value, key: &str) -> Result<String, crate::error::HardwareError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| crate::error::HardwareError::BadArguments(format!("missing string field '{key}'")))
}

fn arg_str_array(args: &serde_json::Value, key: &str) -> Result<Vec<String>, crate::error::HardwareError> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .ok_or_else(|| crate::error::HardwareError::BadArguments(format!("missing array field '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_schemas_are_non_empty_and_uniquely_named() {
        let schemas = tool_schemas();
        let mut names: Vec<&str> = schemas.iter().map(|s| s.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), schemas.len());
    }

    #[test]
    fn unknown_tool_name_is_rejected_before_any_rpc() {
        let args = serde_json::json!({});
        let call = ToolCall { call_id: "1".into(), name: "launch_missiles".into(), args };
        assert_eq!(call.name, "launch_missiles");
    }

    #[test]
    fn arg_str_reports_missing_field() {
        let args = serde_json::json!({ "other": "x" });
        assert!(arg_str(&args, "joint").is_err());
    }

    #[test]
    fn gesture_lookup_resolves_known_names_to_a_joint() {
        assert!(gesture_lookup("wave_right").is_some());
        assert!(gesture_lookup("cartwheel").is_none());
    }

    #[test]
    fn arg_str_array_reads_a_list_of_gesture_names() {
        let args = serde_json::json!({ "gestures": ["wave_right", "nod"] });
        let gestures = arg_str_array(&args, "gestures").unwrap();
        assert_eq!(gestures, vec!["wave_right".to_string(), "nod".to_string()]);
    }
}
