use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Outgoing, QoS};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use super::{item_key, RecordStore};
use crate::error::PersistenceError;
use crate::record::Record;

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Publish progress reported by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// `ordinal`-th distinct publish put on the wire, under packet id `pkid`.
    Sent { ordinal: u64, pkid: u16 },
    Acked(u16),
}

struct Outbox {
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    issued: u64,
}

/// Table kept on an MQTT broker: one retained message per item at
/// `thermolog/<region>/<table>/<key>`. Republishing a key replaces the
/// retained payload.
pub struct MqttStore {
    client: AsyncClient,
    outbox: Mutex<Outbox>,
    topic_prefix: String,
    key_field: String,
    ack_timeout: Duration,
}

impl MqttStore {
    /// Spawns the connection event loop; must be called inside a tokio runtime.
    pub fn connect(host: &str, port: u16, region: &str, table: &str, key_field: &str) -> Self {
        let mut opts = MqttOptions::new(format!("thermolog-collector-{}", std::process::id()), host, port);
        opts.set_keep_alive(Duration::from_secs(30));
        opts.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            // requests leave in the order they were queued; a retransmitted
            // packet keeps its id and is not counted again
            let mut sent = 0u64;
            let mut in_flight = HashSet::new();
            while !delivery_tx.is_closed() {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                        if in_flight.insert(pkid) {
                            sent += 1;
                            let _ = delivery_tx.send(Delivery::Sent { ordinal: sent, pkid });
                        }
                    }
                    Ok(Event::Incoming(Incoming::PubAck(ack))) => {
                        debug!("broker acknowledged packet {}", ack.pkid);
                        in_flight.remove(&ack.pkid);
                        let _ = delivery_tx.send(Delivery::Acked(ack.pkid));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
            debug!("MQTT store dropped, event loop stopped");
        });

        info!("MQTT store publishing to {}:{} under thermolog/{}/{}", host, port, region, table);
        Self {
            client,
            outbox: Mutex::new(Outbox { deliveries: delivery_rx, issued: 0 }),
            topic_prefix: format!("thermolog/{region}/{table}"),
            key_field: key_field.to_string(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn topic_for(&self, key: &str) -> String {
        format!("{}/{}", self.topic_prefix, key)
    }
}

#[async_trait]
impl RecordStore for MqttStore {
    async fn upsert(&self, record: &Record) -> Result<(), PersistenceError> {
        let key = item_key(record, &self.key_field)?;
        let topic = self.topic_for(&key);
        let payload = record.to_json()?;

        let mut outbox = self.outbox.lock().await;
        self.client.publish(topic.as_str(), QoS::AtLeastOnce, true, payload).await?;
        outbox.issued += 1;
        let ordinal = outbox.issued;

        match tokio::time::timeout(self.ack_timeout, await_ack(&mut outbox.deliveries, ordinal)).await {
            Ok(true) => {
                debug!("upserted item {} to {}", key, topic);
                Ok(())
            }
            Ok(false) => Err(PersistenceError::Unavailable("MQTT event loop stopped".into())),
            Err(_) => Err(PersistenceError::NotAcknowledged { topic, after: self.ack_timeout }),
        }
    }
}

/// Waits for the PubAck of the `ordinal`-th publish. Acks of earlier
/// publishes (ones that timed out) are skipped. `false` once the event
/// loop is gone.
async fn await_ack(deliveries: &mut mpsc::UnboundedReceiver<Delivery>, ordinal: u64) -> bool {
    let mut mine = None;
    while let Some(delivery) = deliveries.recv().await {
        match (delivery, mine) {
            (Delivery::Sent { ordinal: sent, pkid }, None) if sent == ordinal => mine = Some(pkid),
            (Delivery::Acked(pkid), Some(expected)) if pkid == expected => return true,
            _ => {}
        }
    }
    false
}
