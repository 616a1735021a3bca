// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! RabbitMQ adapter
//!
//! Publishes to the default exchange with the queue name as routing key and
//! consumes with automatic acknowledgement. Delivery is at-least-once and
//! unordered from the courier's point of view.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{info, warn};

use super::{Deliveries, MessageQueue};
use crate::config::QueueConfig;
use crate::transport::TransportError;

fn queue_error(e: lapin::Error) -> TransportError {
    TransportError::Queue(e.to_string())
}

/// Connection plus channel bound to one declared queue
pub struct AmqpQueue {
    connection: Connection,
    channel: Channel,
    queue_name: String,
}

impl AmqpQueue {
    /// Connect and declare the configured queue
    pub async fn connect(config: &QueueConfig) -> Result<Self, TransportError> {
        let connection =
            Connection::connect(&config.connection_uri(), ConnectionProperties::default())
                .await
                .map_err(queue_error)?;
        let channel = connection.create_channel().await.map_err(queue_error)?;

        channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: config.durable,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(queue_error)?;

        info!(
            "Connected to broker, queue '{}' declared (durable: {})",
            config.queue_name, config.durable
        );
        Ok(Self {
            connection,
            channel,
            queue_name: config.queue_name.clone(),
        })
    }
}

#[async_trait]
impl MessageQueue for AmqpQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await
            .map_err(queue_error)?
            .await
            .map_err(queue_error)?;
        Ok(())
    }

    async fn consume(&self) -> Result<Deliveries, TransportError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                "flight-courier",
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(queue_error)?;

        let deliveries = consumer.filter_map(|delivery| async move {
            match delivery {
                Ok(delivery) => Some(delivery.data),
                Err(e) => {
                    warn!("Broker delivery error: {}", e);
                    None
                }
            }
        });
        Ok(deliveries.boxed())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.channel.close(200, "closing").await.map_err(queue_error)?;
        self.connection.close(200, "closing").await.map_err(queue_error)?;
        Ok(())
    }
}
