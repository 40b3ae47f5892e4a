use crate::domain::UplinkIngestor;
use crate::mqtt::{MqttConnectOptions, MqttSubscriber, RumqttSession, SubscriberConfig};
use common::domain::UplinkRepository;
use rumqttc::QoS;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uplink_runner::AppProcess;

#[derive(Debug)]
pub struct UplinkIngesterConfig {
    pub mqtt: MqttConnectOptions,
    pub topic_filter: String,
    pub qos: QoS,
    pub reconnect_delay: Duration,
    pub insert_timeout: Duration,
    pub connect_timeout: Duration,
}

/// The MQTT-to-store pipeline, connected and ready to run
pub struct UplinkIngester {
    subscriber: MqttSubscriber<RumqttSession>,
}

impl UplinkIngester {
    /// Wires the ingestor to the repository and performs the initial broker connect
    pub async fn new(
        repository: Arc<dyn UplinkRepository>,
        config: UplinkIngesterConfig,
    ) -> anyhow::Result<Self> {
        debug!("initializing uplink ingester");

        let ingestor = Arc::new(UplinkIngestor::new(repository, config.insert_timeout));

        let subscriber = MqttSubscriber::connect(
            &config.mqtt,
            SubscriberConfig {
                topic_filter: config.topic_filter,
                qos: config.qos,
                reconnect_delay: config.reconnect_delay,
            },
            ingestor,
            config.connect_timeout,
        )
        .await?;

        Ok(Self { subscriber })
    }

    pub fn into_runner_process(self) -> AppProcess {
        Box::new({
            let mut subscriber = self.subscriber;
            move |ctx| Box::pin(async move { Ok(subscriber.run(ctx).await?) })
        })
    }
}
