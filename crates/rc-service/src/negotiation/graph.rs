//! Producer/consumer graph operations.

use crate::actors::RoomActorHandle;
use crate::errors::RcError;
use crate::media::AppData;
use crate::observability::metrics as prom;

use common::types::{ConnectionId, MediaKind, TransportRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Key stamped into every producer's `appData` with the owning connection.
pub const APP_DATA_CONNECTION_ID: &str = "connectionId";

/// Consumer parameters returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerParams {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    pub app_data: AppData,
}

/// Create a producer on one of the caller's producer-role transports.
///
/// The room announces the producer to the other peers once it is attached.
/// Returns the producer id.
#[instrument(skip_all, fields(room_id = %room.room_id(), connection_id = %connection_id, kind = %kind))]
pub async fn produce(
    room: &RoomActorHandle,
    connection_id: ConnectionId,
    transport_id: &str,
    kind: MediaKind,
    rtp_parameters: Value,
    mut app_data: AppData,
) -> Result<String, RcError> {
    let lookup = room
        .find_transport(
            connection_id,
            transport_id.to_string(),
            Some(TransportRole::Producer),
        )
        .await?;

    app_data.insert(
        APP_DATA_CONNECTION_ID.to_string(),
        Value::String(connection_id.to_string()),
    );

    let producer = lookup
        .transport
        .produce(kind, rtp_parameters, app_data.clone())
        .await
        .map_err(|e| {
            prom::record_engine_error("produce");
            warn!(target: "rc.media", error = %e, "Failed to produce");
            RcError::from(e)
        })?;
    let producer_id = producer.id().to_string();

    if let Err(e) = room
        .attach_producer(
            connection_id,
            lookup.session,
            transport_id.to_string(),
            Arc::clone(&producer),
            app_data,
        )
        .await
    {
        debug!(
            target: "rc.media",
            producer_id = %producer_id,
            error = %e,
            "Producer could not be attached, closing producer"
        );
        producer.close();
        return Err(e);
    }

    Ok(producer_id)
}

/// Create a paused consumer of `producer_id` on one of the caller's
/// consumer-role transports.
///
/// The consumer's `appData` is the producer's `appData` overlaid with
/// `app_data` from the request.
#[instrument(skip_all, fields(room_id = %room.room_id(), connection_id = %connection_id, producer_id = %producer_id))]
pub async fn consume(
    room: &RoomActorHandle,
    connection_id: ConnectionId,
    transport_id: &str,
    producer_id: &str,
    rtp_capabilities: Value,
    app_data: AppData,
) -> Result<ConsumerParams, RcError> {
    let ticket = room
        .prepare_consume(
            connection_id,
            transport_id.to_string(),
            producer_id.to_string(),
            rtp_capabilities.clone(),
        )
        .await?;

    let mut merged = ticket.producer_app_data;
    merged.extend(app_data);

    let consumer = ticket
        .transport
        .consume(producer_id, rtp_capabilities, true, merged.clone())
        .await
        .map_err(|e| {
            prom::record_engine_error("consume");
            warn!(target: "rc.media", error = %e, "Failed to consume");
            RcError::from(e)
        })?;

    let params = ConsumerParams {
        id: consumer.id().to_string(),
        producer_id: consumer.producer_id().to_string(),
        kind: consumer.kind(),
        rtp_parameters: consumer.rtp_parameters(),
        app_data: merged,
    };

    if let Err(e) = room
        .attach_consumer(
            connection_id,
            ticket.session,
            transport_id.to_string(),
            Arc::clone(&consumer),
        )
        .await
    {
        debug!(
            target: "rc.media",
            consumer_id = %params.id,
            error = %e,
            "Consumer could not be attached, closing consumer"
        );
        consumer.close();
        return Err(e);
    }

    Ok(params)
}

/// Resume one of the caller's consumers.
#[instrument(skip_all, fields(room_id = %room.room_id(), connection_id = %connection_id, consumer_id = %consumer_id))]
pub async fn resume_consumer(
    room: &RoomActorHandle,
    connection_id: ConnectionId,
    consumer_id: &str,
) -> Result<(), RcError> {
    let consumer = room
        .find_consumer(connection_id, consumer_id.to_string())
        .await?;

    consumer.resume().await.map_err(|e| {
        prom::record_engine_error("resume_consumer");
        warn!(target: "rc.media", error = %e, "Failed to resume consumer");
        RcError::from(e)
    })
}

/// Flag the target's producer of `kind` as muted/unmuted and tell the room.
pub async fn mute_toggle(
    room: &RoomActorHandle,
    sender: ConnectionId,
    target: ConnectionId,
    kind: MediaKind,
    is_muted: bool,
) -> Result<(), RcError> {
    room.mute_toggle(sender, target, kind, is_muted).await
}
