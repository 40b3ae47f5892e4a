#![cfg(feature = "integration-tests")]

use common::clickhouse::{ClickHouseClient, ClickHouseUplinkRepository, UplinkRow};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::clickhouse::ClickHouse;
use testcontainers_modules::mosquitto::Mosquitto;
use tokio_util::sync::CancellationToken;
use uplink_ingester::mqtt::MqttConnectOptions;
use uplink_ingester::{UplinkIngester, UplinkIngesterConfig};

const TOPIC: &str = "application/11/device/AA:BB:CC:DD:EE:FF:00:11/event/up";
const PAYLOAD: &str = r#"{"deviceInfo":{"applicationId":"11","devEui":"AABBCCDDEEFF0011"},"fPort":2,"data":"SGVsbG8=","rxInfo":[{"gatewayId":"g1"}],"object":{"temp":21.5}}"#;

async fn start_clickhouse() -> (ContainerAsync<ClickHouse>, ClickHouseClient) {
    let container = ClickHouse::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(8123).await.unwrap();

    let client = ClickHouseClient::new(
        &format!("http://{}:{}", host, port),
        "default",
        "default",
        "",
    );
    client.ping().await.unwrap();

    (container, client)
}

async fn start_mosquitto() -> (ContainerAsync<Mosquitto>, String, u16) {
    let container = Mosquitto::default().start().await.unwrap();
    let host = container.get_host().await.unwrap().to_string();
    let port = container.get_host_port_ipv4(1883).await.unwrap();
    (container, host, port)
}

fn ingester_config(host: &str, port: u16) -> UplinkIngesterConfig {
    UplinkIngesterConfig {
        mqtt: MqttConnectOptions {
            host: host.to_string(),
            port,
            client_id: "uplink-ingester-test".to_string(),
            ..Default::default()
        },
        topic_filter: "application/+/device/+/event/up".to_string(),
        qos: QoS::AtLeastOnce,
        reconnect_delay: Duration::from_secs(1),
        insert_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(10),
    }
}

/// Publish with a throwaway client, driving its event loop until the publish is flushed
async fn publish(host: &str, port: u16, messages: &[(&str, &[u8])]) {
    let mut options = MqttOptions::new("uplink-publisher-test", host, port);
    options.set_keep_alive(Duration::from_secs(5));
    let (client, mut eventloop) = AsyncClient::new(options, 10);

    for (topic, payload) in messages {
        client
            .publish(*topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .unwrap();
    }

    let mut acked = 0;
    tokio::time::timeout(Duration::from_secs(10), async {
        while acked < messages.len() {
            if let rumqttc::Event::Incoming(rumqttc::Packet::PubAck(_)) =
                eventloop.poll().await.unwrap()
            {
                acked += 1;
            }
        }
    })
    .await
    .unwrap();
}

async fn wait_for_rows(client: &ClickHouseClient, expected: u64) -> u64 {
    let mut count = 0;
    for _ in 0..50 {
        count = client
            .get_client()
            .query("SELECT count() FROM uplinks")
            .fetch_one::<u64>()
            .await
            .unwrap();
        if count >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    count
}

#[tokio::test]
async fn test_uplink_flows_from_broker_to_clickhouse() {
    let ((_clickhouse, clickhouse_client), (_mosquitto, mqtt_host, mqtt_port)) =
        tokio::join!(start_clickhouse(), start_mosquitto());

    let repository = ClickHouseUplinkRepository::new(clickhouse_client.clone(), "uplinks".to_string());
    repository.ensure_table().await.unwrap();

    let ingester = UplinkIngester::new(Arc::new(repository), ingester_config(&mqtt_host, mqtt_port))
        .await
        .unwrap();

    let ctx = CancellationToken::new();
    let process = ingester.into_runner_process();
    let handle = tokio::spawn(process(ctx.clone()));

    // Let the subscription reach the broker before publishing
    tokio::time::sleep(Duration::from_secs(1)).await;

    let invalid: &[u8] = b"not valid json";
    let other_event: &[u8] = PAYLOAD.as_bytes();
    publish(
        &mqtt_host,
        mqtt_port,
        &[
            (TOPIC, invalid),
            ("application/11/device/AA:BB:CC:DD:EE:FF:00:11/event/join", other_event),
            (TOPIC, PAYLOAD.as_bytes()),
        ],
    )
    .await;

    assert_eq!(wait_for_rows(&clickhouse_client, 1).await, 1);

    // A late row would mean the malformed or unsubscribed message got through
    tokio::time::sleep(Duration::from_millis(500)).await;
    let rows = clickhouse_client
        .get_client()
        .query("SELECT ?fields FROM uplinks")
        .fetch_all::<UplinkRow>()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    assert_eq!(row.application_id.as_deref(), Some("11"));
    assert_eq!(row.dev_eui.as_deref(), Some("AABBCCDDEEFF0011"));
    assert_eq!(row.f_port, Some(2));
    assert_eq!(row.data.as_deref(), Some(r#""SGVsbG8=""#));
    let object: serde_json::Value =
        serde_json::from_str(row.object_json.as_deref().unwrap()).unwrap();
    assert_eq!(object, json!({"temp": 21.5}));

    ctx.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_unreachable_broker_fails_initial_connect() {
    let (_clickhouse, clickhouse_client) = start_clickhouse().await;
    let repository = ClickHouseUplinkRepository::new(clickhouse_client, "uplinks".to_string());

    let mut config = ingester_config("127.0.0.1", 1);
    config.connect_timeout = Duration::from_secs(3);

    let result = UplinkIngester::new(Arc::new(repository), config).await;
    assert!(result.is_err());
}
