//! Performance benchmarks for the hot paths of a session

use client::config::SimulationConfig;
use client::game::{ControlInput, LocalSimulation};
use client::reconcile::reconcile;
use client::scheduler::{Scheduler, TimerKind};
use client::store::PlayerStore;
use server::room::RoomManager;
use shared::{decode, encode, ClientMessage, PlayerState, SafeZone, ServerMessage, Vec2, WireFormat};
use std::time::{Duration, Instant};

fn crowded_store(remotes: usize) -> PlayerStore {
    let mut store = PlayerStore::new(PlayerState::new("me", Vec2::new(450.0, 350.0)));
    for i in 0..remotes {
        let angle = i as f32 / remotes as f32 * std::f32::consts::TAU;
        let position = Vec2::new(450.0 + angle.cos() * 30.0, 350.0 + angle.sin() * 30.0);
        store.upsert_remote(PlayerState::new(format!("p{}", i), position));
    }
    store
}

/// Benchmarks the local step with many overlapping remotes
#[test]
fn benchmark_local_step() {
    let sim = LocalSimulation::new(SimulationConfig::default());
    let zone = SafeZone::new(Vec2::new(450.0, 350.0), 400.0, 25.0, 180.0);
    let control = ControlInput::pointer(Vec2::new(600.0, 200.0));
    let mut store = crowded_store(32);

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        sim.step(&mut store, &zone, &control, 1.0 / 60.0);
    }

    let duration = start.elapsed();
    println!(
        "Local step (32 remotes): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks remote reconciliation across a large roster
#[test]
fn benchmark_reconciliation() {
    let mut store = crowded_store(64);
    for i in 0..64 {
        store.upsert_remote(PlayerState::new(format!("p{}", i), Vec2::new(100.0, 100.0)));
    }

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        reconcile(&mut store, 1.0 / 60.0, 10.0, 20);
    }

    let duration = start.elapsed();
    println!(
        "Reconciliation (64 remotes): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks encoding and decoding a full sync in both wire formats
#[test]
fn benchmark_sync_codec() {
    let participants: Vec<PlayerState> = (0..16)
        .map(|i| PlayerState::new(format!("p{}", i), Vec2::new(i as f32 * 10.0, 50.0)))
        .collect();
    let message = ServerMessage::Sync { participants };

    for format in [WireFormat::Json, WireFormat::Binary] {
        let iterations = 2_000;
        let start = Instant::now();

        for _ in 0..iterations {
            let frame = encode(&message, format).unwrap();
            let decoded: ServerMessage = decode(&frame).unwrap();
            assert!(matches!(decoded, ServerMessage::Sync { .. }));
        }

        let duration = start.elapsed();
        println!(
            "Sync codec {:?}: {} iterations in {:?} ({:.2} μs/iter)",
            format,
            iterations,
            duration,
            duration.as_micros() as f64 / iterations as f64
        );

        assert!(duration.as_millis() < 3000);
    }
}

/// Benchmarks relay fan-out for a busy room
#[test]
fn benchmark_relay_fanout() {
    let now = Instant::now();
    let mut rooms = RoomManager::new();
    for connection in 0..16u64 {
        rooms.handle(
            connection,
            ClientMessage::Join {
                session_id: "bench".to_string(),
                participant_id: format!("p{}", connection),
            },
            now,
        );
    }

    let iterations = 10_000u64;
    let start = Instant::now();
    let mut delivered = 0;

    for i in 0..iterations {
        let sender = i % 16;
        let id = format!("p{}", sender);
        delivered += rooms
            .handle(
                sender,
                ClientMessage::Update {
                    participant_id: id.clone(),
                    state: PlayerState::new(id, Vec2::new(i as f32 % 900.0, 10.0)),
                },
                now,
            )
            .len();
    }

    let duration = start.elapsed();
    println!(
        "Relay fan-out: {} updates ({} deliveries) in {:?}",
        iterations, delivered, duration
    );

    assert_eq!(delivered, iterations as usize * 15);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks scheduler polling with every timer armed
#[test]
fn benchmark_scheduler_poll() {
    let start = Instant::now();
    let mut scheduler = Scheduler::new();
    scheduler.schedule_repeating(TimerKind::Heartbeat, start, Duration::from_secs(20));
    scheduler.schedule_repeating(TimerKind::Ping, start, Duration::from_secs(5));
    scheduler.schedule_repeating(TimerKind::ZoneShrink, start, Duration::from_millis(100));
    scheduler.schedule_once(TimerKind::SpeedExpiry, start, Duration::from_secs(10));
    scheduler.schedule_once(TimerKind::ShieldExpiry, start, Duration::from_secs(8));

    let iterations = 100_000u64;
    let timer = Instant::now();
    let mut fired = 0;

    for i in 0..iterations {
        fired += scheduler.poll(start + Duration::from_millis(i)).len();
    }

    let duration = timer.elapsed();
    println!(
        "Scheduler poll: {} polls, {} timers fired in {:?}",
        iterations, fired, duration
    );

    assert!(fired > 1000);
    assert!(duration.as_millis() < 1000);
}
