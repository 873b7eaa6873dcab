//! Event gateway: the per-connection boundary.
//!
//! Each accepted transport connection goes through
//! `Connecting -> Active -> Disconnected`. While active, a reader task
//! decodes inbound frames and forwards them to the hub tagged with the
//! connection's own id; the writer drains the connection's mailbox onto the
//! socket. Whichever side finishes first triggers the disconnect, and the
//! other side's disconnect becomes a no-op in the hub.

use bytes::Bytes;
use relay_shared::math::Vec2;
use relay_shared::net::{
    decode_from_bytes, encode_to_bytes, ClientMsg, FramedConn, PlayerId, ServerMsg,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::HubHandle;

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnPhase {
    /// Transport is open, no id assigned yet.
    Connecting,
    Active(PlayerId),
    /// Terminal.
    Disconnected,
}

impl ConnPhase {
    /// `Connecting -> Active`. Any other starting phase is an error.
    pub fn activate(&mut self, id: PlayerId) -> anyhow::Result<()> {
        match *self {
            ConnPhase::Connecting => {
                *self = ConnPhase::Active(id);
                Ok(())
            }
            other => anyhow::bail!("cannot activate connection in phase {other:?}"),
        }
    }

    /// Moves to `Disconnected`, returning the id only on the first call
    /// from `Active`.
    pub fn close(&mut self) -> Option<PlayerId> {
        let prev = std::mem::replace(self, ConnPhase::Disconnected);
        match prev {
            ConnPhase::Active(id) => Some(id),
            _ => None,
        }
    }

    pub fn active_id(&self) -> Option<PlayerId> {
        match *self {
            ConnPhase::Active(id) => Some(id),
            _ => None,
        }
    }
}

/// Decodes one inbound frame body. Errors mean a malformed message.
///
/// JSON numbers beyond `f32` range decode to infinity; those would
/// re-encode as `null` and break every peer's view, so they are rejected
/// here with the rest of the malformed input.
pub fn decode_inbound(frame: &[u8]) -> anyhow::Result<ClientMsg> {
    let msg: ClientMsg = decode_from_bytes(frame)?;
    if let ClientMsg::PlayerMovement { x, y } = msg {
        if !Vec2::new(x, y).is_finite() {
            anyhow::bail!("non-finite position ({x}, {y})");
        }
    }
    Ok(msg)
}

/// Encodes one outbound notification body.
pub fn encode_outbound(msg: &ServerMsg) -> anyhow::Result<Bytes> {
    encode_to_bytes(msg)
}

/// Drives one connection until either direction closes.
pub async fn serve_connection(conn: FramedConn, hub: HubHandle) -> anyhow::Result<()> {
    let peer = conn.peer_addr();
    let mut phase = ConnPhase::Connecting;

    let (mailbox, mut outbound) = mpsc::unbounded_channel::<Bytes>();
    let id = hub.connect(mailbox).await?;
    phase.activate(id)?;
    info!(player_id = %id, %peer, "Connection active");

    let (mut reader, mut writer) = conn.into_split();

    let reader_hub = hub.clone();
    let reader_task = tokio::spawn(async move {
        loop {
            match reader.recv_frame().await {
                Ok(Some(frame)) => match decode_inbound(&frame) {
                    Ok(msg) => {
                        if reader_hub.inbound(id, msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %id, error = %e, "Rejected malformed message");
                    }
                },
                Ok(None) => {
                    debug!(player_id = %id, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    debug!(player_id = %id, error = %e, "Read failed");
                    break;
                }
            }
        }
        let _ = reader_hub.disconnect(id);
    });

    // Ends when the hub drops the mailbox or the socket stops accepting.
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.send_frame(&frame).await {
            debug!(player_id = %id, error = %e, "Write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
    reader_task.abort();

    if let Some(id) = phase.close() {
        let _ = hub.disconnect(id);
    }
    info!(player_id = %id, %peer, "Connection closed");
    Ok(())
}
