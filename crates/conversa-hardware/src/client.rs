//! Hardware gRPC client
//!
//! One physical robot accepts one mutating command at a time — two
//! movement commands racing each other would leave a joint in an
//! undefined position — so every mutating call is serialized through a
//! single mutex even though the underlying tonic channel itself supports
//! concurrent requests. Reads (camera capture, status) bypass the mutex.
//! Every call carries its own deadline; a command that blows its budget
//! comes back as [`HardwareError::Timeout`] rather than hanging the turn
//! that issued it.

use crate::error::HardwareError;
use crate::proto::hardware_control_client::HardwareControlClient;
use crate::proto::{
    CaptureCameraRequest, ExecuteMovementRequest, GetStatusRequest, HealthRequest, SetEmotionRequest, SetEyeStateRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tonic::transport::Channel;

const COMMAND_DEADLINE: Duration = Duration::from_millis(300);
const CAPTURE_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct HardwareClient {
    inner: HardwareControlClient<Channel>,
    mutation_lock: Arc<Mutex<()>>,
}

impl HardwareClient {
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self, HardwareError> {
        let channel = Channel::from_shared(endpoint.into())
            .map_err(|e| HardwareError::Unavailable(e.to_string()))?
            .connect()
            .await
            .map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        Ok(Self { inner: HardwareControlClient::new(channel), mutation_lock: Arc::new(Mutex::new(())) })
    }

    pub async fn health(&self) -> Result<bool, HardwareError> {
        let mut client = self.inner.clone();
        let resp = with_deadline(COMMAND_DEADLINE, client.health(HealthRequest {})).await?;
        Ok(resp.into_inner().ready)
    }

    pub async fn execute_movement(&self, joint: &str, target_angle_deg: f32, speed: f32) -> Result<(), HardwareError> {
        let _guard = self.mutation_lock.lock().await;
        let mut client = self.inner.clone();
        let req = ExecuteMovementRequest { joint: joint.to_string(), target_angle_deg, speed };
        let resp = with_deadline(COMMAND_DEADLINE, client.execute_movement(req)).await?.into_inner();
        if resp.accepted {
            Ok(())
        } else {
            Err(HardwareError::Rejected(resp.error))
        }
    }

    pub async fn set_emotion(&self, emotion: &str) -> Result<(), HardwareError> {
        let _guard = self.mutation_lock.lock().await;
        let mut client = self.inner.clone();
        let req = SetEmotionRequest { emotion: emotion.to_string() };
        let resp = with_deadline(COMMAND_DEADLINE, client.set_emotion(req)).await?.into_inner();
        if resp.accepted {
            Ok(())
        } else {
            Err(HardwareError::Rejected(resp.error))
        }
    }

    pub async fn set_eye_state(&self, state: &str) -> Result<(), HardwareError> {
        let _guard = self.mutation_lock.lock().await;
        let mut client = self.inner.clone();
        let req = SetEyeStateRequest { state: state.to_string() };
        let resp = with_deadline(COMMAND_DEADLINE, client.set_eye_state(req)).await?.into_inner();
        if resp.accepted {
            Ok(())
        } else {
            Err(HardwareError::Rejected(resp.error))
        }
    }

    pub async fn capture_camera(&self, camera_id: &str) -> Result<(Vec<u8>, u32, u32), HardwareError> {
        let mut client = self.inner.clone();
        let req = CaptureCameraRequest { camera_id: camera_id.to_string() };
        let resp = with_deadline(CAPTURE_DEADLINE, client.capture_camera(req)).await?.into_inner();
        if resp.error.is_empty() {
            Ok((resp.rgb8, resp.width, resp.height))
        } else {
            Err(HardwareError::Rejected(resp.error))
        }
    }

    pub async fn get_status(&self) -> Result<(String, Vec<String>, bool), HardwareError> {
        let mut client = self.inner.clone();
        let resp = with_deadline(COMMAND_DEADLINE, client.get_status(GetStatusRequest {})).await?.into_inner();
        Ok((resp.firmware_version, resp.joints, resp.camera_available))
    }
}

async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, HardwareError>
where
    F: std::future::Future<Output = Result<T, tonic::Status>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(status)) => Err(HardwareError::Unavailable(status.message().to_string())),
        Err(_) => Err(HardwareError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    // HardwareClient::connect requires a live channel, so its behavior is
    // exercised by the tool-dispatch tests in tool_schema.rs against a
    // fake executor rather than a real tonic server here.
}
