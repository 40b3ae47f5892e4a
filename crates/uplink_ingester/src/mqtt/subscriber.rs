use crate::domain::UplinkHandler;
use crate::mqtt::{
    MqttConnectOptions, MqttSession, RumqttSession, UPLINK_TOPIC_FILTER, topic_matches,
};
use common::domain::{DomainError, DomainResult, InboundMessage};
use rumqttc::{ConnectionError, Event, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Connection lifecycle of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    /// Connected and subscribed
    Connected,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub topic_filter: String,
    pub qos: QoS,
    pub reconnect_delay: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            topic_filter: UPLINK_TOPIC_FILTER.to_string(),
            qos: QoS::AtMostOnce,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Keeps one broker connection subscribed and feeds every inbound message to
/// the handler, one at a time, in delivery order.
pub struct MqttSubscriber<S: MqttSession> {
    session: S,
    config: SubscriberConfig,
    handler: Arc<dyn UplinkHandler>,
    state: SubscriberState,
}

impl MqttSubscriber<RumqttSession> {
    /// Dial the broker and wait for the first ConnAck
    ///
    /// The initial connect is not retried: a refused, unreachable or slow
    /// broker is a `ConnectionError` for the caller to act on.
    pub async fn connect(
        options: &MqttConnectOptions,
        config: SubscriberConfig,
        handler: Arc<dyn UplinkHandler>,
        timeout: Duration,
    ) -> DomainResult<Self> {
        let session = RumqttSession::new(options)?;
        let mut subscriber = Self::new(session, config, handler);

        info!(
            host = %options.host,
            port = options.port,
            "connecting to MQTT broker"
        );

        match tokio::time::timeout(timeout, subscriber.wait_for_connack()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DomainError::ConnectionError(format!(
                    "Timed out after {:?} connecting to MQTT broker at {}:{}",
                    timeout, options.host, options.port
                )))
            }
        }

        Ok(subscriber)
    }
}

impl<S: MqttSession> MqttSubscriber<S> {
    pub fn new(session: S, config: SubscriberConfig, handler: Arc<dyn UplinkHandler>) -> Self {
        Self {
            session,
            config,
            handler,
            state: SubscriberState::Disconnected,
        }
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    /// Poll until the broker acknowledges the connection, then subscribe
    pub async fn wait_for_connack(&mut self) -> DomainResult<()> {
        self.state = SubscriberState::Connecting;

        loop {
            match self.session.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("connected to MQTT broker");
                    return self.on_connected().await;
                }
                Ok(_) => continue,
                Err(e) => {
                    self.state = SubscriberState::Disconnected;
                    return Err(DomainError::ConnectionError(format!(
                        "Failed to connect to MQTT broker: {}",
                        e
                    )));
                }
            }
        }
    }

    /// Drive the connection until `ctx` is cancelled or the broker refuses us
    ///
    /// Transport errors are transient: the next poll re-dials after
    /// `reconnect_delay`, and every new ConnAck re-subscribes before any
    /// further message is delivered.
    #[instrument(
        name = "mqtt_subscriber",
        skip_all,
        fields(topic_filter = %self.config.topic_filter)
    )]
    pub async fn run(&mut self, ctx: CancellationToken) -> DomainResult<()> {
        info!("starting MQTT subscriber");

        loop {
            let polled = tokio::select! {
                biased;
                _ = ctx.cancelled() => None,
                event = self.session.poll() => Some(event),
            };

            let Some(event) = polled else {
                self.shutdown().await;
                return Ok(());
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("reconnected to MQTT broker");
                    self.on_connected().await?;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    deliver(
                        &self.config.topic_filter,
                        self.handler.as_ref(),
                        &publish.topic,
                        &publish.payload,
                    )
                    .await;
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!("subscription acknowledged");
                }
                Ok(_) => {}
                Err(e) => self.on_connection_error(e, &ctx).await?,
            }
        }
    }

    async fn on_connected(&mut self) -> DomainResult<()> {
        self.session
            .subscribe(&self.config.topic_filter, self.config.qos)
            .await?;
        self.state = SubscriberState::Connected;

        info!(
            topic_filter = %self.config.topic_filter,
            qos = ?self.config.qos,
            "subscribed to MQTT topic"
        );
        Ok(())
    }

    async fn on_connection_error(
        &mut self,
        err: ConnectionError,
        ctx: &CancellationToken,
    ) -> DomainResult<()> {
        self.state = SubscriberState::Disconnected;

        if let ConnectionError::ConnectionRefused(code) = &err {
            error!(code = ?code, "MQTT broker refused connection");
            return Err(DomainError::ConnectionError(format!(
                "MQTT broker refused connection: {:?}",
                code
            )));
        }

        warn!(
            error = %err,
            reconnect_delay = ?self.config.reconnect_delay,
            "MQTT connection lost, reconnecting"
        );

        tokio::select! {
            biased;
            _ = ctx.cancelled() => {}
            _ = tokio::time::sleep(self.config.reconnect_delay) => {}
        }

        self.state = SubscriberState::Connecting;
        Ok(())
    }

    async fn shutdown(&mut self) {
        debug!("cancellation received, disconnecting from MQTT broker");
        self.state = SubscriberState::Shutdown;

        if let Err(e) = self.session.disconnect().await {
            debug!(error = %e, "MQTT disconnect failed");
        }

        info!("MQTT subscriber stopped");
    }
}

/// Hand one inbound message to the handler if its topic is covered by the filter
///
/// Takes the filter and handler rather than the subscriber: sessions are
/// `Send` but not necessarily `Sync`.
async fn deliver(topic_filter: &str, handler: &dyn UplinkHandler, topic: &str, payload: &[u8]) {
    if !topic_matches(topic_filter, topic) {
        warn!(
            topic = %topic,
            topic_filter = %topic_filter,
            "message topic does not match subscription, skipping"
        );
        return;
    }

    handler
        .on_message(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        })
        .await;
}
