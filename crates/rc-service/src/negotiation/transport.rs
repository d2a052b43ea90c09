//! Transport creation and connection.

use crate::actors::RoomActorHandle;
use crate::errors::RcError;
use crate::media::WebRtcTransportOptions;
use crate::observability::metrics as prom;

use common::types::{ConnectionId, TransportRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Connection parameters returned to the client for a new transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportParams {
    pub id: String,
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: Value,
}

/// Create a WebRTC transport for `connection_id` and attach it with `role`.
///
/// # Errors
///
/// - `PeerNotFound` if the peer is not in the room (or left during creation)
/// - `Engine` if the engine fails to create the transport
#[instrument(skip_all, fields(room_id = %room.room_id(), connection_id = %connection_id, role = %role))]
pub async fn create_transport(
    room: &RoomActorHandle,
    options: &WebRtcTransportOptions,
    connection_id: ConnectionId,
    role: TransportRole,
) -> Result<TransportParams, RcError> {
    let ticket = room.prepare_transport(connection_id).await?;

    let transport = ticket
        .router
        .create_webrtc_transport(options)
        .await
        .map_err(|e| {
            prom::record_engine_error("create_transport");
            warn!(target: "rc.media", error = %e, "Failed to create transport");
            RcError::from(e)
        })?;

    let params = TransportParams {
        id: transport.id().to_string(),
        ice_parameters: transport.ice_parameters(),
        ice_candidates: transport.ice_candidates(),
        dtls_parameters: transport.dtls_parameters(),
    };

    if let Err(e) = room
        .attach_transport(connection_id, ticket.session, role, Arc::clone(&transport))
        .await
    {
        debug!(
            target: "rc.media",
            transport_id = %params.id,
            error = %e,
            "Peer gone before transport attached, closing transport"
        );
        transport.close();
        return Err(e);
    }

    Ok(params)
}

/// Complete the DTLS handshake for one of the caller's transports.
#[instrument(skip_all, fields(room_id = %room.room_id(), connection_id = %connection_id, transport_id = %transport_id))]
pub async fn connect_transport(
    room: &RoomActorHandle,
    connection_id: ConnectionId,
    transport_id: &str,
    dtls_parameters: Value,
) -> Result<(), RcError> {
    let lookup = room
        .find_transport(connection_id, transport_id.to_string(), None)
        .await?;

    lookup
        .transport
        .connect(dtls_parameters)
        .await
        .map_err(|e| {
            prom::record_engine_error("connect_transport");
            warn!(target: "rc.media", error = %e, "Failed to connect transport");
            RcError::from(e)
        })?;

    room.mark_transport_connected(connection_id, transport_id.to_string())
        .await
}
