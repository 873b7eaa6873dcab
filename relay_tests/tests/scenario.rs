//! End-to-end relay behaviour over real sockets.

use std::time::Duration;

use relay_client::{client::ClientState, RelayClient};
use relay_shared::{
    event::DomainEvent,
    math::Vec2,
    net::{ClientMsg, PlayerInfo, ServerMsg},
};
use relay_tests::{RawPeer, TestRelay, RECV_TIMEOUT};

async fn next(client: &mut RelayClient) -> anyhow::Result<ServerMsg> {
    client
        .recv_timeout(RECV_TIMEOUT)
        .await?
        .ok_or_else(|| anyhow::anyhow!("client {} got nothing", client.player_id))
}

/// A joins, B joins, B moves, A leaves.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_move_leave() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;

    let mut a = RelayClient::connect(relay.addr).await?;
    assert_eq!(a.server_peer(), relay.addr);
    assert!(a.others.is_empty());
    assert!(a.position.within_extent(128.0));

    let mut b = RelayClient::connect(relay.addr).await?;
    assert_eq!(b.others.keys().copied().collect::<Vec<_>>(), vec![a.player_id]);
    assert_eq!(b.others[&a.player_id], a.position);

    assert_eq!(
        next(&mut a).await?,
        ServerMsg::NewPlayer(PlayerInfo::new(b.player_id, b.position))
    );

    b.send_movement(Vec2::new(5.0, 9.0)).await?;
    assert_eq!(
        next(&mut a).await?,
        ServerMsg::PlayerMoved(PlayerInfo::new(b.player_id, Vec2::new(5.0, 9.0)))
    );
    assert_eq!(a.others[&b.player_id], Vec2::new(5.0, 9.0));

    let registry = relay.hub().inspect().await?;
    let entry_b = registry.iter().find(|c| c.id == b.player_id).unwrap();
    assert_eq!(entry_b.position, Vec2::new(5.0, 9.0));

    let a_id = a.player_id;
    drop(a);
    assert_eq!(next(&mut b).await?, ServerMsg::Disconnect(a_id));
    assert!(b.others.is_empty());
    assert_eq!(relay.registered_ids().await?, vec![b.player_id]);
    Ok(())
}

/// Nobody is ever told about their own movement.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mover_is_not_echoed() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let (mut a, _) = RawPeer::connect(relay.addr).await?;
    let (mut b, _) = RawPeer::connect(relay.addr).await?;
    assert!(matches!(a.expect().await?, ServerMsg::NewPlayer(p) if p.player_id == b.id));

    b.conn
        .send(&ClientMsg::PlayerMovement { x: 1.0, y: 1.0 })
        .await?;
    assert!(matches!(a.expect().await?, ServerMsg::PlayerMoved(p) if p.player_id == b.id));

    // B's mailbox is ordered: anything about itself would come first.
    a.conn
        .send(&ClientMsg::PlayerMovement { x: 2.0, y: 2.0 })
        .await?;
    assert_eq!(
        b.expect().await?,
        ServerMsg::PlayerMoved(PlayerInfo::new(a.id, Vec2::new(2.0, 2.0)))
    );
    Ok(())
}

/// Garbage frames are dropped and the connection keeps working.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_messages_are_rejected_individually() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let (mut watcher, _) = RawPeer::connect(relay.addr).await?;
    let (mut sender, _) = RawPeer::connect(relay.addr).await?;
    watcher.expect().await?;

    let before = relay.hub().inspect().await?;
    let start = before.iter().find(|c| c.id == sender.id).unwrap().position;

    sender.conn.send_frame(b"definitely not json").await?;
    sender
        .conn
        .send_frame(br#"{"type":"playerMovement","data":{"x":3}}"#)
        .await?;
    sender
        .conn
        .send_frame(br#"{"type":"teleport","data":{"x":3,"y":4}}"#)
        .await?;
    watcher.expect_silence(Duration::from_millis(150)).await?;

    let during = relay.hub().inspect().await?;
    assert_eq!(during.iter().find(|c| c.id == sender.id).unwrap().position, start);

    sender
        .conn
        .send_frame(br#"{"type":"playerMovement","data":{"x":3,"y":4}}"#)
        .await?;
    assert_eq!(
        watcher.expect().await?,
        ServerMsg::PlayerMoved(PlayerInfo::new(sender.id, Vec2::new(3.0, 4.0)))
    );
    Ok(())
}

/// Coordinates outside `f32` range are malformed: nothing is stored or
/// relayed, and later joiners still get a well-formed snapshot.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn out_of_range_positions_are_rejected() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut watcher = RelayClient::connect(relay.addr).await?;
    let (mut sender, _) = RawPeer::connect(relay.addr).await?;
    next(&mut watcher).await?;

    sender
        .conn
        .send_frame(br#"{"type":"playerMovement","data":{"x":1e39,"y":9}}"#)
        .await?;
    sender
        .conn
        .send_frame(br#"{"type":"playerMovement","data":{"x":6,"y":7}}"#)
        .await?;

    assert_eq!(
        next(&mut watcher).await?,
        ServerMsg::PlayerMoved(PlayerInfo::new(sender.id, Vec2::new(6.0, 7.0)))
    );

    let late = RelayClient::connect(relay.addr).await?;
    assert_eq!(late.others[&sender.id], Vec2::new(6.0, 7.0));
    assert!(late.others.values().all(|p| p.is_finite()));
    Ok(())
}

/// One connection's reports are applied and relayed in the order sent.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn movement_sequence_keeps_sender_order() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut watcher = RelayClient::connect(relay.addr).await?;
    let mut mover = RelayClient::connect(relay.addr).await?;
    next(&mut watcher).await?;

    let path: Vec<Vec2> = (1..=20)
        .map(|i| Vec2::new(i as f32, -(i as f32) * 0.5))
        .collect();
    for pos in &path {
        mover.send_movement(*pos).await?;
    }

    for pos in &path {
        assert_eq!(
            next(&mut watcher).await?,
            ServerMsg::PlayerMoved(PlayerInfo::new(mover.player_id, *pos))
        );
    }

    let registry = relay.hub().inspect().await?;
    let entry = registry.iter().find(|c| c.id == mover.player_id).unwrap();
    assert_eq!(entry.position, *path.last().unwrap());
    assert_eq!(watcher.others[&mover.player_id], *path.last().unwrap());
    Ok(())
}

/// A kicked player is announced exactly once even though both of its
/// connection tasks report the disconnect.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kick_announces_departure_once() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut victim = RelayClient::connect(relay.addr).await?;
    let (mut witness, _) = RawPeer::connect(relay.addr).await?;
    next(&mut victim).await?;

    let reply = relay
        .server
        .exec_console(&format!("kick {}", victim.player_id))
        .await?;
    assert_eq!(reply, vec![format!("Kicked {}", victim.player_id)]);

    assert_eq!(witness.expect().await?, ServerMsg::Disconnect(victim.player_id));

    assert!(victim.recv_timeout(RECV_TIMEOUT).await?.is_none());
    assert_eq!(victim.state, ClientState::Disconnected);

    witness.expect_silence(Duration::from_millis(150)).await?;
    assert_eq!(relay.registered_ids().await?, vec![witness.id]);
    Ok(())
}

/// Registry keys follow the open connections through a burst of joins and
/// leaves.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registry_follows_open_connections() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;

    let joins = (0..8).map(|_| RelayClient::connect(relay.addr));
    let mut clients = Vec::new();
    for res in spawn_all(joins).await {
        clients.push(res?);
    }
    relay.wait_for_players(8).await?;

    let mut ids: Vec<_> = clients.iter().map(|c| c.player_id).collect();
    ids.sort();
    assert_eq!(relay.registered_ids().await?, ids);

    for client in clients.iter_mut() {
        client.poll(Duration::from_millis(100)).await?;
    }
    for client in &clients {
        assert_eq!(client.others.len(), 7, "client {}", client.player_id);
    }

    let leaving: Vec<_> = clients.drain(..4).collect();
    drop(leaving);
    relay.wait_for_players(4).await?;

    let mut remaining: Vec<_> = clients.iter().map(|c| c.player_id).collect();
    remaining.sort();
    assert_eq!(relay.registered_ids().await?, remaining);

    for client in clients.iter_mut() {
        client.poll(Duration::from_millis(100)).await?;
        assert_eq!(client.others.len(), 3);
    }

    drop(clients);
    relay.wait_for_players(0).await?;
    Ok(())
}

/// Damage reports turn into gold events for the external economy.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn combat_hits_emit_gold_events() -> anyhow::Result<()> {
    let mut relay = TestRelay::start().await?;
    let mut fighter = RelayClient::connect(relay.addr).await?;

    fighter.send_combat_hit(70).await?;
    fighter.send_combat_hit(180).await?;

    let event = tokio::time::timeout(RECV_TIMEOUT, relay.events.recv())
        .await?
        .expect("sink channel open");
    match event {
        DomainEvent::GoldEarned {
            player_id, amount, ..
        } => {
            assert_eq!(player_id, fighter.player_id);
            assert_eq!(amount, 20);
        }
    }

    let entry = relay.hub().inspect().await?;
    assert_eq!(entry[0].pending_damage, 50);
    assert!(relay.events.try_recv().is_err());
    Ok(())
}

/// Runs every future on its own task and collects the outputs in order.
async fn spawn_all<F, T>(futs: impl Iterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futs.map(tokio::spawn).collect();
    let mut out = Vec::with_capacity(handles.len());
    for h in handles {
        out.push(h.await.expect("join task panicked"));
    }
    out
}
