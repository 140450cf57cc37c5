use std::future::Future;

use rumqttc::{AsyncClient, QoS};

use leafbridge_common::BridgeError;

/// Outbound half of the message bus.
pub trait BusPublisher: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl BusPublisher for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BridgeError> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| BridgeError::Transport(err.to_string()))
    }
}
