//! Integration tests for the rollback netcode components
//!
//! These tests drive the client and server halves against each other, first
//! over in-memory loopback channels and then over real UDP sockets.

use client::game::{ClientGame, InputSource};
use client::inputs_sender::InputsSender;
use server::game::ServerGame;
use server::inputs::{InputsReceiver, Receipt};
use shared::{
    loopback_pair, Channel, ControlMessage, GameState, ImpairedChannel, ImpairmentConfig,
    InputsPacket, InputsUnit, MemorySink, NullSink, PlayerId, PlayerState, StatePacket,
};
use std::time::Duration;

/// Input source whose output the test can change between phases.
struct Scripted {
    unit: InputsUnit,
}

impl InputSource for Scripted {
    fn consume_accumulated_inputs(&mut self) -> InputsUnit {
        self.unit
    }
}

const ACTIVE: InputsUnit = InputsUnit {
    mouse_delta: (3.0, 0.0),
    clicking: true,
};
const IDLE: InputsUnit = InputsUnit {
    mouse_delta: (0.0, 0.0),
    clicking: false,
};

/// Runs both halves in lockstep with 5ms frames.
fn run_for<C: Channel>(
    server: &mut ServerGame<C>,
    client: &mut ClientGame,
    channel: &mut dyn Channel,
    input: &mut Scripted,
    millis: u32,
) {
    for _ in 0..millis / 5 {
        client.frame(5.0, channel, input, &mut NullSink);
        server.frame(5.0, &mut NullSink);
    }
}

fn distance(a: &PlayerState, b: &PlayerState) -> f64 {
    ((a.pos.0 - b.pos.0).powi(2) + (a.pos.1 - b.pos.1).powi(2)).sqrt()
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// The inputs packet is a bare JSON array with the newest sequence first
    #[test]
    fn inputs_packet_shape() {
        let mut sender = InputsSender::new();
        sender.add_tick(InputsUnit::new(1.0, 2.0, false), &mut NullSink);
        let (_, packet) = sender.add_tick(InputsUnit::new(-3.0, 0.5, true), &mut NullSink);

        let json: serde_json::Value = serde_json::from_slice(&packet.unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([2, [1, -3.0, 0.5], [0, 1.0, 2.0]])
        );
    }

    /// The state packet carries the snapshot, the ack and the dilation hint
    #[test]
    fn state_packet_shape() {
        let mut state = GameState::new();
        state.server_tick = 100;
        let mut player = PlayerState::new((500.0, 300.0), 0.0);
        player.latest_input_seq = Some(42);
        state.players.insert(3, player);

        let bytes = StatePacket::encode(&state, 42, 1).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert!(json.is_array());
        assert_eq!(json[0]["serverTick"], 100);
        assert_eq!(json[0]["players"]["3"]["pos"], serde_json::json!([500.0, 300.0]));
        assert_eq!(json[0]["players"]["3"]["latestInputSeq"], 42);
        assert_eq!(json[1], 42);
        assert_eq!(json[2], 1);
    }

    /// Handshake messages and protocol packets can share one socket
    #[test]
    fn control_messages_are_distinguishable() {
        let control = ControlMessage::Connected { player_id: 9 }.encode().unwrap();
        assert!(InputsPacket::decode(&control).is_err());
        assert!(StatePacket::decode(&control).is_err());

        let inputs = InputsPacket {
            seq: 1,
            items: vec![],
        }
        .encode()
        .unwrap();
        assert_eq!(ControlMessage::decode(&inputs), None);
    }
}

/// INPUT STREAM TESTS
mod input_stream_tests {
    use super::*;

    /// Only every other packet arrives, yet all ten ticks are rebuilt once
    #[test]
    fn alternating_loss_is_repaired_by_redundancy() {
        let mut sender = InputsSender::new();
        let mut receiver = InputsReceiver::new(1);

        let mut delivered = 0;
        let mut received_ticks = 0;
        for seq in 1..=10 {
            let (_, packet) = sender.add_tick(InputsUnit::new(seq as f64, 0.0, false), &mut NullSink);
            let Some(bytes) = packet else {
                continue;
            };
            delivered += 1;
            if delivered % 2 == 0 {
                continue;
            }
            match receiver.receive_packet(&bytes, &mut NullSink) {
                Receipt::Accepted { new_ticks, reset } => {
                    assert!(!reset);
                    received_ticks += new_ticks;
                }
                other => panic!("packet {} rejected: {:?}", seq, other),
            }
        }

        assert_eq!(received_ticks, 10);
        assert_eq!(receiver.acked_seq(), 10);

        let mut sink = MemorySink::new();
        for expected in 1..=10u64 {
            receiver.tick(&mut sink);
            let current = receiver.current_inputs();
            assert_eq!(current.seq, Some(expected));
            assert_eq!(current.inputs.mouse_delta.0, expected as f64);
        }
        assert_eq!(receiver.buffer_len(), 0);
    }

    /// Acknowledgements shrink the retransmitted history
    #[test]
    fn acks_bound_packet_size() {
        let mut sender = InputsSender::new();
        let mut receiver = InputsReceiver::new(1);

        for _ in 0..100 {
            let (_, packet) = sender.add_tick(InputsUnit::default(), &mut NullSink);
            if let Some(bytes) = packet {
                let decoded = InputsPacket::decode(&bytes).unwrap();
                assert!(decoded.items.len() <= 2);
                receiver.receive_packet(&bytes, &mut NullSink);
                sender.ack_seq(receiver.acked_seq());
            }
            receiver.tick(&mut NullSink);
        }

        assert_eq!(sender.acked_seq(), 100);
        assert_eq!(sender.history_len(), 0);
    }
}

/// CLIENT-SERVER SESSION TESTS
mod session_tests {
    use super::*;

    /// Prediction tracks the authoritative server over a clean link
    #[test]
    fn prediction_matches_server_over_loopback() {
        let mut server = ServerGame::with_seed(4, 11);
        let (server_end, mut client_end) = loopback_pair();
        let player_id = server.add_player(server_end).unwrap();
        let spawn = server.state().players[&player_id].clone();

        let mut client = ClientGame::new(player_id);
        let mut input = Scripted { unit: ACTIVE };

        run_for(&mut server, &mut client, &mut client_end, &mut input, 2000);
        assert!(client.predicted_local().is_some());
        assert!(client.sender().acked_seq() > 60);
        assert!(client.sender().head_seq() - client.sender().acked_seq() < 30);

        input.unit = IDLE;
        run_for(&mut server, &mut client, &mut client_end, &mut input, 2500);

        let authoritative = &server.state().players[&player_id];
        let predicted = client.predicted_local().unwrap();
        assert!(distance(authoritative, &spawn) > 5.0, "player never moved");
        assert!(
            distance(authoritative, predicted) < 0.5,
            "prediction {:?} drifted from server {:?}",
            predicted.pos,
            authoritative.pos
        );
        assert!(server.registry().get(player_id).unwrap().inputs.is_confirmed());
    }

    /// Loss and duplication in both directions are absorbed by redundancy
    /// and rollback
    #[test]
    fn prediction_converges_over_lossy_link() {
        let impairment = ImpairmentConfig {
            loss: 0.2,
            duplicate: 0.1,
            ..Default::default()
        };

        let mut server = ServerGame::with_seed(4, 5);
        let (server_end, client_end) = loopback_pair();
        let player_id = server
            .add_player(ImpairedChannel::with_seed(server_end, impairment, 1))
            .unwrap();
        let mut client_end = ImpairedChannel::with_seed(client_end, impairment, 2);

        let mut client = ClientGame::new(player_id);
        let mut input = Scripted { unit: ACTIVE };

        run_for(&mut server, &mut client, &mut client_end, &mut input, 3000);
        assert!(client_end.dropped() > 0);
        assert!(client.sender().acked_seq() > 0);

        input.unit = IDLE;
        run_for(&mut server, &mut client, &mut client_end, &mut input, 3000);

        let authoritative = &server.state().players[&player_id];
        let predicted = client.predicted_local().unwrap();
        assert!(distance(authoritative, predicted) < 0.5);
    }

    /// Several clients see each other in the broadcast state
    #[test]
    fn every_client_receives_every_player() {
        let mut server = ServerGame::with_seed(4, 3);
        let mut clients: Vec<(ClientGame, _)> = Vec::new();
        for _ in 0..3 {
            let (server_end, client_end) = loopback_pair();
            let id = server.add_player(server_end).unwrap();
            clients.push((ClientGame::new(id), client_end));
        }

        let mut input = Scripted { unit: IDLE };
        for _ in 0..200 {
            for (client, channel) in clients.iter_mut() {
                client.frame(5.0, channel, &mut input, &mut NullSink);
            }
            server.frame(5.0, &mut NullSink);
        }

        for (client, _) in &clients {
            let ids: Vec<PlayerId> = client.current_state().players.keys().copied().collect();
            assert_eq!(ids, vec![1, 2, 3]);
        }
    }

    /// A long stall on both sides resets the streams and play resumes
    #[test]
    fn stall_resets_and_recovers() {
        let mut server = ServerGame::with_seed(4, 9);
        let (server_end, mut client_end) = loopback_pair();
        let player_id = server.add_player(server_end).unwrap();
        let mut client = ClientGame::new(player_id);
        let mut input = Scripted { unit: ACTIVE };

        run_for(&mut server, &mut client, &mut client_end, &mut input, 1000);
        let acked_before = client.sender().acked_seq();
        assert!(acked_before > 0);

        assert!(client
            .frame(1500.0, &mut client_end, &mut input, &mut NullSink)
            .is_none());
        assert_eq!(server.frame(1500.0, &mut NullSink), 0);
        assert_eq!(client.resets(), 1);
        assert!(client.predicted_local().is_none());

        input.unit = IDLE;
        run_for(&mut server, &mut client, &mut client_end, &mut input, 3000);

        assert!(client.sender().acked_seq() > acked_before);
        let authoritative = &server.state().players[&player_id];
        let predicted = client.predicted_local().unwrap();
        assert!(distance(authoritative, predicted) < 0.5);
    }

    /// Removing a player stops its snapshots and drops it from the world
    #[test]
    fn removed_player_disappears_for_others() {
        let mut server = ServerGame::with_seed(4, 1);
        let (a_server, mut a_client) = loopback_pair();
        let (b_server, _b_client) = loopback_pair();
        let a = server.add_player(a_server).unwrap();
        let b = server.add_player(b_server).unwrap();

        let mut client = ClientGame::new(a);
        let mut input = Scripted { unit: IDLE };
        run_for(&mut server, &mut client, &mut a_client, &mut input, 500);
        assert!(client.current_state().players.contains_key(&b));

        assert!(server.remove_player(b).is_some());
        run_for(&mut server, &mut client, &mut a_client, &mut input, 500);
        assert!(!client.current_state().players.contains_key(&b));
        assert!(client.current_state().players.contains_key(&a));
    }
}

/// REAL NETWORK TESTS
mod udp_tests {
    use super::*;
    use client::network::connect;
    use server::network::Server;

    /// Full handshake against a running server, followed by a snapshot
    #[tokio::test]
    async fn handshake_then_snapshot_over_udp() {
        let mut server = Server::new("127.0.0.1:0", 4, Duration::from_secs(5))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (player_id, packet) = tokio::select! {
            result = server.run() => panic!("server stopped early: {:?}", result.err()),
            outcome = async {
                let (player_id, mut channel) =
                    tokio_test::assert_ok!(connect(&addr.to_string(), 3, Duration::from_millis(500)).await);
                for _ in 0..200 {
                    if let Some(bytes) = channel.recv().into_iter().next() {
                        return (player_id, StatePacket::decode(&bytes).unwrap());
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                panic!("no snapshot received");
            } => outcome,
        };

        assert!(packet.state.players.contains_key(&player_id));
        assert_eq!(packet.acked_input_seq, 0);
    }

    /// A full server refuses the handshake with a reason
    #[tokio::test]
    async fn full_server_refuses() {
        let mut server = Server::new("127.0.0.1:0", 1, Duration::from_secs(5))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();

        tokio::select! {
            result = server.run() => panic!("server stopped early: {:?}", result.err()),
            _ = async {
                let first = connect(&addr, 3, Duration::from_millis(500)).await;
                tokio_test::assert_ok!(first);
                let second = connect(&addr, 3, Duration::from_millis(500)).await;
                let message = second.err().map(|e| e.to_string()).unwrap_or_default();
                assert!(message.contains("Server full"), "unexpected: {}", message);
            } => {},
        }
    }
}
