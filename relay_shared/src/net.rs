//! Networking primitives.
//!
//! Goals:
//! - Provide an ordered, reliable channel (TCP with length-prefixed frames).
//! - Provide the tagged message types exchanged by client and server.
//! - Keep serialization explicit and versionable.
//!
//! Every message travels as `{"type": <tag>, "data": <payload>}` inside one
//! frame. Frames are encoded once and can be shared between many writers,
//! which is what the broadcast path relies on.

use std::{collections::BTreeMap, fmt, net::SocketAddr, num::ParseIntError, str::FromStr};

use anyhow::Context;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time,
};

use crate::math::Vec2;

/// Largest frame payload either side accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Opaque player identifier, bound to one transport connection.
///
/// Travels as a decimal string so it can key JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(PlayerId)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PlayerId {
    type Error = ParseIntError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One player's replicated state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
}

impl PlayerInfo {
    pub fn new(player_id: PlayerId, position: Vec2) -> Self {
        Self {
            player_id,
            x: position.x,
            y: position.y,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    /// The sender's new position.
    PlayerMovement { x: f32, y: f32 },
    /// Damage the sender dealt; feeds the gold conversion.
    CombatHit { damage: u32 },
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Transport handshake: the recipient's own id. Sent once, first.
    Welcome(PlayerId),
    /// Full registry, sent only to a newly connected client.
    CurrentPlayers(BTreeMap<PlayerId, PlayerInfo>),
    NewPlayer(PlayerInfo),
    PlayerMoved(PlayerInfo),
    /// The departed player's id.
    Disconnect(PlayerId),
}

impl ServerMsg {
    /// The single player a notification is about; `None` for the
    /// newcomer-only handshake and snapshot.
    pub fn subject(&self) -> Option<PlayerId> {
        match self {
            ServerMsg::Welcome(_) | ServerMsg::CurrentPlayers(_) => None,
            ServerMsg::NewPlayer(p) | ServerMsg::PlayerMoved(p) => Some(p.player_id),
            ServerMsg::Disconnect(id) => Some(*id),
        }
    }

    /// Wire tag, as used in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            ServerMsg::Welcome(_) => "welcome",
            ServerMsg::CurrentPlayers(_) => "currentPlayers",
            ServerMsg::NewPlayer(_) => "newPlayer",
            ServerMsg::PlayerMoved(_) => "playerMoved",
            ServerMsg::Disconnect(_) => "disconnect",
        }
    }
}

/// Encodes a message body (no length prefix).
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

/// Decodes a message body (no length prefix).
pub fn decode_from_bytes<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize")
}

/// Read side of a framed stream.
///
/// Partial frames are kept in an internal buffer, so `recv_frame` is
/// cancel-safe and can sit under `tokio::time::timeout` or `select!`.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Reads one frame body. `Ok(None)` means the peer closed cleanly
    /// between frames.
    pub async fn recv_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }
            let n = self
                .inner
                .read_buf(&mut self.buf)
                .await
                .context("read frame")?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                anyhow::bail!("connection closed mid-frame");
            }
        }
    }

    fn parse_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}");
        }
        if self.buf.len() < 4 + len {
            self.buf.reserve(4 + len - self.buf.len());
            return Ok(None);
        }
        self.buf.advance(4);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Reads and decodes one message.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<Option<T>> {
        match self.recv_frame().await? {
            Some(frame) => decode_from_bytes(&frame).map(Some),
            None => Ok(None),
        }
    }
}

/// Write side of a framed stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes an already encoded body with its length prefix.
    pub async fn send_frame(&mut self, body: &[u8]) -> anyhow::Result<()> {
        if body.len() > MAX_FRAME_LEN {
            anyhow::bail!(
                "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
                body.len()
            );
        }
        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.extend_from_slice(body);
        self.inner.write_all(&buf).await.context("write frame")?;
        Ok(())
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let body = encode_to_bytes(msg)?;
        self.send_frame(&body).await
    }

    /// Flushes and closes the write direction.
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("shutdown")?;
        Ok(())
    }
}

/// Reliable, ordered connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct FramedConn {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    peer: SocketAddr,
}

impl FramedConn {
    pub fn new(stream: TcpStream) -> anyhow::Result<Self> {
        let peer = stream.peer_addr().context("peer addr")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (r, w) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(r),
            writer: FrameWriter::new(w),
            peer,
        })
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Self::new(stream)
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    pub async fn send_frame(&mut self, body: &[u8]) -> anyhow::Result<()> {
        self.writer.send_frame(body).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<Option<T>> {
        self.reader.recv().await
    }

    /// Receives a message within the given timeout. Nothing is lost if the
    /// timeout fires mid-frame.
    ///
    /// `Ok(None)` covers both an elapsed timeout and a clean close.
    pub async fn recv_timeout<T: DeserializeOwned>(
        &mut self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<T>> {
        match time::timeout(timeout, self.reader.recv()).await {
            Ok(res) => res,
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Splits into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

/// TCP server listener.
pub struct FramedListener {
    listener: TcpListener,
}

impl FramedListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<FramedConn> {
        let (stream, _) = self.listener.accept().await.context("tcp accept")?;
        FramedConn::new(stream)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_wire_shape() {
        let msg: ClientMsg =
            decode_from_bytes(br#"{"type":"playerMovement","data":{"x":5,"y":9}}"#).unwrap();
        assert_eq!(msg, ClientMsg::PlayerMovement { x: 5.0, y: 9.0 });
    }

    #[test]
    fn movement_missing_field_is_rejected() {
        let res: anyhow::Result<ClientMsg> =
            decode_from_bytes(br#"{"type":"playerMovement","data":{"x":5}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let res: anyhow::Result<ClientMsg> = decode_from_bytes(br#"{"type":"teleport","data":{}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn current_players_is_keyed_by_id_string() {
        let mut players = BTreeMap::new();
        players.insert(
            PlayerId(7),
            PlayerInfo::new(PlayerId(7), Vec2::new(1.0, -2.5)),
        );
        let json: serde_json::Value =
            serde_json::from_slice(&encode_to_bytes(&ServerMsg::CurrentPlayers(players)).unwrap())
                .unwrap();
        assert_eq!(json["type"], "currentPlayers");
        assert_eq!(json["data"]["7"]["playerId"], "7");
        assert_eq!(json["data"]["7"]["y"], -2.5);
    }

    #[test]
    fn disconnect_carries_bare_id() {
        let body = encode_to_bytes(&ServerMsg::Disconnect(PlayerId(3))).unwrap();
        assert_eq!(&body[..], br#"{"type":"disconnect","data":"3"}"#);
    }

    #[tokio::test]
    async fn frames_survive_a_duplex_pipe() {
        let (a, b) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b);

        writer
            .send(&ClientMsg::CombatHit { damage: 12 })
            .await
            .unwrap();
        writer.send_frame(b"not json").await.unwrap();
        drop(writer);

        let first: Option<ClientMsg> = reader.recv().await.unwrap();
        assert_eq!(first, Some(ClientMsg::CombatHit { damage: 12 }));
        let raw = reader.recv_frame().await.unwrap().unwrap();
        assert_eq!(&raw[..], b"not json");
        assert!(reader.recv_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn frame_split_across_reads_and_timeouts() {
        let (mut a, b) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(b);
        let body = encode_to_bytes(&ClientMsg::PlayerMovement { x: 1.0, y: 2.0 }).unwrap();
        let mut wire = (body.len() as u32).to_be_bytes().to_vec();
        wire.extend_from_slice(&body);

        a.write_all(&wire[..6]).await.unwrap();
        let early =
            time::timeout(std::time::Duration::from_millis(20), reader.recv::<ClientMsg>()).await;
        assert!(early.is_err());

        a.write_all(&wire[6..]).await.unwrap();
        let msg: Option<ClientMsg> = reader.recv().await.unwrap();
        assert_eq!(msg, Some(ClientMsg::PlayerMovement { x: 1.0, y: 2.0 }));
    }

    #[tokio::test]
    async fn close_mid_frame_is_an_error() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(b);
        a.write_all(&[0, 0, 0, 9, b'{']).await.unwrap();
        drop(a);
        assert!(reader.recv_frame().await.is_err());
    }

    #[tokio::test]
    async fn oversized_frame_is_an_error() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(b);
        a.write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
            .await
            .unwrap();
        assert!(reader.recv_frame().await.is_err());
    }
}
