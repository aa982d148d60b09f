//! Integration tests for the tile-map server
//!
//! These tests load the shipped demo world and drive it through the public
//! API, and run a real server over UDP.

use assert_approx_eq::assert_approx_eq;
use bincode::{deserialize, serialize};
use server::loader::{load_world, parse_world};
use server::map::{ObjectList, ObjectQuery};
use server::mechanics;
use server::network::{Server, ServerConfig, NOT_JOINED};
use server::step::Clock;
use server::world::World;
use shared::{MoveTarget, ObjectId, Packet, MAX_PACKET_SIZE};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const TICK_RATE: u32 = 30;

fn demo_path() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/worlds/demo.json"))
}

fn demo_world() -> World {
    load_world(demo_path(), &mechanics::standard()).unwrap()
}

fn sprite(world: &World, map: &str, name: &str) -> ObjectId {
    world
        .map(map)
        .unwrap()
        .find_object(&ObjectQuery::new().named(name).in_list(ObjectList::Sprites))
        .unwrap()
}

fn place(world: &mut World, id: ObjectId, x: f32, y: f32) {
    let map = world.map_of_mut(id).unwrap();
    map.set_location_by_anchor(id, x, y);
    map.stop_object(id);
}

/// Steps every map holding `players` once per call, like the server does.
fn run(world: &mut World, players: &[ObjectId], ticks: u32, start: &mut u64) {
    for _ in 0..ticks {
        let active: BTreeSet<String> = players
            .iter()
            .filter_map(|p| world.locate(*p).map(str::to_string))
            .collect();
        world.step(&active, Clock::new(*start as f64 / TICK_RATE as f64, TICK_RATE));
        world.clear_changed();
        *start += 1;
    }
}

/// DEMO WORLD TESTS
mod world_tests {
    use super::*;
    use server::hooks::trigger_handler_name;

    /// Every trigger in the shipped world has a handler
    #[test]
    fn demo_world_loads() {
        let world = demo_world();
        assert_eq!(world.game, "demo");
        assert_eq!(world.map_names(), vec!["start", "under"]);
        assert!(world.object(sprite(&world, "under", "lever")).unwrap().tile.is_some());
        assert_eq!(world.player_slots().len(), 4);

        for map in world.maps() {
            let hooks = map.hooks();
            for trigger in map.objects_in(ObjectList::Triggers) {
                assert!(
                    hooks.trigger(&trigger_handler_name(&trigger.kind)).is_some(),
                    "no handler for {}",
                    trigger.describe()
                );
            }
        }
    }

    /// Doors move the player onto another map at the destination reference
    #[test]
    fn stairs_lead_underground() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player1");
        place(&mut world, player, 592.0, 48.0);

        let mut tick = 0;
        run(&mut world, &[player], 1, &mut tick);

        assert_eq!(world.locate(player), Some("under"));
        let obj = world.object(player).unwrap();
        assert_eq!(obj.map_name, "under");
        assert_approx_eq!(obj.anchor_x, 560.0);
        assert_approx_eq!(obj.anchor_y, 96.0);
        assert!(!obj.is_moving());
    }

    /// The vault says it is locked until the player carries the key
    #[test]
    fn vault_needs_the_key() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player1");
        let mut tick = 0;

        place(&mut world, player, 592.0, 240.0);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(world.locate(player), Some("start"));
        assert!(world
            .object(player)
            .unwrap()
            .speech_text
            .as_deref()
            .unwrap()
            .starts_with("The vault is locked"));

        // pick up the key
        place(&mut world, player, 336.0, 80.0);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(
            world.object(player).unwrap().action_text.as_deref(),
            Some("Available Action: Pick Up key")
        );
        world.map_of_mut(player).unwrap().object_mut(player).unwrap().action = true;
        run(&mut world, &[player], 1, &mut tick);
        let obj = world.object(player).unwrap();
        assert_eq!(obj.holding.as_ref().map(|h| h.name.as_str()), Some("key"));
        assert!(!obj.action);

        // unlocking opens the door layers, the next tick walks through
        place(&mut world, player, 592.0, 240.0);
        run(&mut world, &[player], 1, &mut tick);
        let start = world.map("start").unwrap();
        assert_eq!(start.layer_visible("doorClosed"), Some(false));
        assert_eq!(start.layer_visible("doorOpen"), Some(true));

        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(world.locate(player), Some("under"));
        let obj = world.object(player).unwrap();
        assert_eq!((obj.anchor_x, obj.anchor_y), (320.0, 96.0));
        assert!(obj.holding.is_some());
    }

    /// Using the well needs an action and spends it
    #[test]
    fn well_is_used_with_an_action() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player2");
        let mut tick = 0;

        place(&mut world, player, 48.0, 432.0);
        run(&mut world, &[player], 3, &mut tick);
        assert_eq!(world.locate(player), Some("start"));
        assert_eq!(
            world.object(player).unwrap().action_text.as_deref(),
            Some("Available Action: Use well")
        );

        world.map_of_mut(player).unwrap().object_mut(player).unwrap().action = true;
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(world.locate(player), Some("under"));
        assert!(!world.object(player).unwrap().action);
    }

    /// The mud slows players while they stand in it and nowhere else
    #[test]
    fn mud_slows_players() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player3");
        let mut tick = 0;

        place(&mut world, player, 360.0, 176.0);
        world
            .map_of_mut(player)
            .unwrap()
            .set_destination(player, MoveTarget::new(600.0, 176.0, 120.0));

        for expected in [361.0, 362.0, 363.0] {
            run(&mut world, &[player], 1, &mut tick);
            let obj = world.object(player).unwrap();
            assert_approx_eq!(obj.anchor_x, expected);
            assert_eq!(obj.move_target.unwrap().speed, 120.0);
        }

        place(&mut world, player, 460.0, 176.0);
        world
            .map_of_mut(player)
            .unwrap()
            .set_destination(player, MoveTarget::new(600.0, 176.0, 120.0));
        run(&mut world, &[player], 1, &mut tick);
        assert_approx_eq!(world.object(player).unwrap().anchor_x, 464.0);
    }

    /// Sprites never end a tick outside the walkable area
    #[test]
    fn players_cannot_walk_into_the_pond() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player4");
        let mut tick = 0;

        place(&mut world, player, 290.0, 200.0);
        world
            .map_of_mut(player)
            .unwrap()
            .set_destination(player, MoveTarget::new(300.0, 270.0, 120.0));

        for _ in 0..60 {
            run(&mut world, &[player], 1, &mut tick);
            let map = world.map("start").unwrap();
            let obj = map.object(player).unwrap();
            assert!(map.is_in_bounds(obj.anchor_x, obj.anchor_y));
        }
        let obj = world.object(player).unwrap();
        assert!(obj.anchor_y < 224.0);
        assert!(obj.anchor_x > 290.0);
    }

    /// Welcome text follows the player in and disappears when they leave
    #[test]
    fn welcome_text_is_shown_on_the_overlay() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player1");
        for (i, other) in ["player2", "player3", "player4"].into_iter().enumerate() {
            let other = sprite(&world, "start", other);
            place(&mut world, other, 400.0 + 20.0 * i as f32, 400.0);
        }
        let mut tick = 0;

        run(&mut world, &[player], 1, &mut tick);
        let start = world.map("start").unwrap();
        assert_eq!(start.objects_in(ObjectList::Overlay).count(), 1);
        let popup = start.objects_in(ObjectList::Overlay).next().unwrap();
        assert_eq!(popup.kind, "popUpText");
        assert!(popup.text.as_ref().unwrap().text.starts_with("Welcome!"));

        place(&mut world, player, 400.0, 400.0);
        run(&mut world, &[player], 1, &mut tick);
        let start = world.map("start").unwrap();
        assert_eq!(start.objects_in(ObjectList::Overlay).count(), 0);
    }

    /// Two loads of the same world fed the same requests end identical
    #[test]
    fn stepping_is_deterministic() {
        fn play() -> Vec<(String, String, f32, f32)> {
            let mut world = demo_world();
            let players = [
                sprite(&world, "start", "player1"),
                sprite(&world, "start", "player2"),
            ];
            let mut tick = 0;
            let moves = [(500.0, 300.0), (100.0, 400.0), (592.0, 48.0), (300.0, 250.0)];
            for (i, (x, y)) in moves.into_iter().enumerate() {
                let player = players[i % 2];
                world
                    .map_of_mut(player)
                    .unwrap()
                    .set_destination(player, MoveTarget::new(x, y, 120.0));
                run(&mut world, &players, 45, &mut tick);
            }

            world
                .maps()
                .flat_map(|map| map.objects_in(ObjectList::Sprites))
                .map(|o| (o.map_name.clone(), o.name.clone(), o.anchor_x, o.anchor_y))
                .collect()
        }

        assert_eq!(play(), play());
    }

    fn press_action(world: &mut World, id: ObjectId) {
        world.map_of_mut(id).unwrap().object_mut(id).unwrap().action = true;
    }

    fn held(world: &World, id: ObjectId) -> Option<String> {
        world.object(id).unwrap().holding.as_ref().map(|h| h.name.clone())
    }

    fn action_text(world: &World, id: ObjectId) -> Option<String> {
        world.object(id).unwrap().action_text.clone()
    }

    fn speech_text(world: &World, id: ObjectId) -> Option<String> {
        world.object(id).unwrap().speech_text.clone()
    }

    /// Setting off the bomb clears the rocks and opens the ladder on both maps
    #[test]
    fn bomb_opens_the_ladder() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player1");
        let mut tick = 0;

        place(&mut world, player, 528.0, 430.0);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(
            speech_text(&world, player).as_deref(),
            Some("Hmmm I wonder if I could blow this up?")
        );
        assert!(!world.map("start").unwrap().is_in_bounds(528.0, 468.0));

        place(&mut world, player, 176.0, 304.0);
        press_action(&mut world, player);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(held(&world, player).as_deref(), Some("bomb"));

        place(&mut world, player, 528.0, 430.0);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(
            action_text(&world, player).as_deref(),
            Some("Available Action: Set off bomb.")
        );

        press_action(&mut world, player);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(held(&world, player), None);
        assert_eq!(speech_text(&world, player).as_deref(), Some("That done blow up good!"));

        let start = world.map("start").unwrap();
        assert_eq!(start.layer_visible("rockOnStairs"), Some(false));
        assert_eq!(start.layer_visible("rockOnStairs2"), Some(false));
        assert_eq!(start.layer_visible("rockOffStairs"), Some(true));
        assert!(start.is_in_bounds(528.0, 468.0));

        let under = world.map("under").unwrap();
        assert_eq!(under.layer_visible("rockOnStairs"), Some(false));
        assert_eq!(under.layer_visible("rockOffStairs"), Some(true));
        assert!(under.is_in_bounds(528.0, 468.0));
        let door = under.find_reference("ladder1MapDoor").unwrap().id;
        assert!(under.in_list(door, ObjectList::Triggers));

        // climb down the ladder
        world
            .map_of_mut(player)
            .unwrap()
            .set_destination(player, MoveTarget::new(528.0, 470.0, 120.0));
        run(&mut world, &[player], 15, &mut tick);
        assert_eq!(world.locate(player), Some("under"));
        let obj = world.object(player).unwrap();
        assert_eq!((obj.anchor_x, obj.anchor_y), (528.0, 400.0));
    }

    /// The lever moves the bridge between maps; the wand pulls it from afar
    #[test]
    fn lever_and_wand_move_the_bridges() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player1");
        world.transfer(player, "under").unwrap();
        let mut tick = 0;

        let lever = sprite(&world, "under", "lever");
        assert!(world.map("under").unwrap().is_in_bounds(416.0, 136.0));
        assert!(!world.map("under").unwrap().is_in_bounds(416.0, 184.0));
        assert!(!world.map("start").unwrap().is_in_bounds(280.0, 280.0));

        place(&mut world, player, 176.0, 176.0);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(
            action_text(&world, player).as_deref(),
            Some("Available Action: Use lever")
        );

        press_action(&mut world, player);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(world.object(lever).unwrap().tile.as_ref().unwrap().gid, 23);
        let under = world.map("under").unwrap();
        assert_eq!(under.layer_visible("bridge1"), Some(false));
        assert!(!under.is_in_bounds(416.0, 136.0));
        let start = world.map("start").unwrap();
        assert_eq!(start.layer_visible("bridge2"), Some(true));
        assert!(start.is_in_bounds(280.0, 280.0));

        // pick up the wand and cast from the magic circle
        place(&mut world, player, 240.0, 112.0);
        press_action(&mut world, player);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(held(&world, player).as_deref(), Some("magic wand"));

        place(&mut world, player, 144.0, 288.0);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(
            action_text(&world, player).as_deref(),
            Some("Available Action: Cast spell with magic wand.")
        );

        press_action(&mut world, player);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(world.object(lever).unwrap().tile.as_ref().unwrap().gid, 24);
        assert_eq!(held(&world, player).as_deref(), Some("magic wand"));
        let under = world.map("under").unwrap();
        assert_eq!(under.layer_visible("bridge3"), Some(true));
        assert!(under.is_in_bounds(416.0, 184.0));
        let start = world.map("start").unwrap();
        assert_eq!(start.layer_visible("bridge2"), Some(false));
        assert!(!start.is_in_bounds(280.0, 280.0));
    }

    /// Empty-handed players at the throw spot think out loud
    #[test]
    fn throw_spot_gives_a_hint() {
        let mut world = demo_world();
        let player = sprite(&world, "start", "player1");
        let mut tick = 0;

        place(&mut world, player, 200.0, 220.0);
        run(&mut world, &[player], 1, &mut tick);
        assert_eq!(
            speech_text(&world, player).as_deref(),
            Some("I could throw something from here.")
        );
    }

    #[test]
    fn broken_world_file_is_rejected() {
        let json = r#"{ "game": "demo", "maps": [ { "name": "start" } ] }"#;
        assert!(parse_world(json, &mechanics::standard()).is_err());
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    async fn test_server(test_mode: bool) -> Server {
        let config = ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            tick_rate: TICK_RATE,
            test_mode,
            client_timeout: Duration::from_secs(5),
        };
        Server::new(config, demo_world()).await.unwrap()
    }

    async fn send(socket: &UdpSocket, packet: &Packet, to: std::net::SocketAddr) {
        socket.send_to(&serialize(packet).unwrap(), to).await.unwrap();
    }

    async fn recv(socket: &UdpSocket) -> Packet {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("no packet from server")
            .unwrap();
        deserialize(&buf[..len]).unwrap()
    }

    /// Tests packet serialization round-trip for network protocol validation
    #[test]
    fn packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::JoinRequest {
                game: "demo".to_string(),
                display_name: "alice".to_string(),
            },
            Packet::PlayerMove {
                dest_x: 10.5,
                dest_y: 20.0,
            },
            Packet::JoinReply {
                player_number: 2,
                server_sec: 1.5,
                test_mode: true,
            },
            Packet::Error {
                result: "nope".to_string(),
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet).unwrap();
            let deserialized: Packet = deserialize(&serialized).unwrap();
            assert_eq!(packet.kind(), deserialized.kind());
        }
    }

    /// A full session over real sockets: join, receive the map, leave
    #[tokio::test]
    async fn join_step_leave_over_udp() {
        let mut server = test_server(false).await;
        let server_addr = server.local_addr().unwrap();

        let client = async move {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let join = Packet::JoinRequest {
                game: "demo".to_string(),
                display_name: "alice".to_string(),
            };
            send(&socket, &join, server_addr).await;

            let player_number = match recv(&socket).await {
                Packet::JoinReply { player_number, test_mode, .. } => {
                    assert!(!test_mode);
                    player_number
                }
                other => panic!("expected joinReply, got {:?}", other),
            };
            assert!((1..=4).contains(&player_number));

            match recv(&socket).await {
                Packet::Step { map_name, sprites, .. } => {
                    assert_eq!(map_name, "start");
                    let me = sprites
                        .iter()
                        .find(|s| s.player_number == Some(player_number))
                        .expect("own sprite in step");
                    assert_eq!(me.label_text.as_deref(), Some("alice"));
                }
                other => panic!("expected step, got {:?}", other),
            }

            send(&socket, &Packet::Leave, server_addr).await;
        };

        tokio::select! {
            result = server.run() => panic!("server stopped: {:?}", result.err()),
            _ = client => {}
        }
    }

    /// Requests from strangers and invalid joins are answered with errors
    #[tokio::test]
    async fn errors_over_udp() {
        let mut server = test_server(false).await;
        let server_addr = server.local_addr().unwrap();

        let client = async move {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

            send(&socket, &Packet::PlayerAction, server_addr).await;
            assert!(matches!(recv(&socket).await, Packet::Error { result } if result == NOT_JOINED));

            let long_name = Packet::JoinRequest {
                game: "demo".to_string(),
                display_name: "a name that is far too long".to_string(),
            };
            send(&socket, &long_name, server_addr).await;
            assert!(matches!(recv(&socket).await, Packet::Error { .. }));

            let wrong_game = Packet::JoinRequest {
                game: "other".to_string(),
                display_name: "alice".to_string(),
            };
            send(&socket, &wrong_game, server_addr).await;
            match recv(&socket).await {
                Packet::Error { result } => assert_eq!(
                    result,
                    "Client and Server are not running the same game: client->other, server->demo"
                ),
                other => panic!("expected error, got {:?}", other),
            }

            // garbage is dropped without an answer
            socket.send_to(&[0xff, 0xff, 0xff], server_addr).await.unwrap();
            send(&socket, &Packet::Leave, server_addr).await;
            assert!(matches!(recv(&socket).await, Packet::Error { .. }));
        };

        tokio::select! {
            result = server.run() => panic!("server stopped: {:?}", result.err()),
            _ = client => {}
        }
    }
}
