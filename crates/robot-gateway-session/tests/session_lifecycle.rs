//! End-to-end session behaviour against the simulated robot.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use robot_gateway_core::{CommandKind, GatewayError, OperationLogStore, UserId};
use robot_gateway_driver::SimulatedRobot;
use robot_gateway_session::{Gateway, SessionStatus, storage::MemoryLogStore};

type TestGateway = Gateway<Arc<SimulatedRobot>, Arc<MemoryLogStore>>;

fn setup(robot: SimulatedRobot) -> (TestGateway, Arc<SimulatedRobot>, Arc<MemoryLogStore>) {
    let robot = Arc::new(robot);
    let store = Arc::new(MemoryLogStore::new());
    let gw = Gateway::new(Arc::clone(&robot), Arc::clone(&store));
    (gw, robot, store)
}

async fn operations(store: &MemoryLogStore) -> Vec<String> {
    let mut ops: Vec<String> = store
        .query(usize::MAX)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.operation)
        .collect();
    ops.reverse();
    ops
}

#[tokio::test]
async fn connect_command_terminate_scenario() {
    let (gw, robot, store) = setup(SimulatedRobot::new());
    let operator = UserId::new("operator@example.com");

    gw.connect("192.168.1.100", &operator).await.unwrap();
    gw.send("standup", &operator).await.unwrap();
    gw.send("sitdown", &operator).await.unwrap();
    gw.terminate(&operator).await.unwrap();

    assert_eq!(
        operations(&store).await,
        [
            "Session established: 192.168.1.100",
            "Sent command: standup",
            "Sent command: sitdown",
            "Session terminated",
        ]
    );
    assert!(
        store
            .query(10)
            .await
            .unwrap()
            .iter()
            .all(|e| e.user_id == operator)
    );
    assert_eq!(gw.status(), SessionStatus::Disconnected);
    assert_eq!(
        robot.sent_commands(),
        [CommandKind::Standup, CommandKind::Sitdown]
    );
}

#[tokio::test]
async fn every_command_appends_one_entry() {
    let (gw, _, store) = setup(SimulatedRobot::new());
    let user = UserId::new("dave");
    gw.connect("10.1.2.3", &user).await.unwrap();

    for kind in CommandKind::all() {
        let before = store.len().unwrap();
        gw.send(kind.as_ref(), &user).await.unwrap();
        assert_eq!(store.len().unwrap(), before + 1);
        assert_eq!(
            store.query(1).await.unwrap()[0].operation,
            format!("Sent command: {kind}")
        );
    }

    assert_eq!(
        gw.send("fly", &user).await.unwrap_err(),
        GatewayError::UnknownCommand("fly".into())
    );
}

#[tokio::test]
async fn well_formed_addresses_connect_once() {
    let (gw, _, _) = setup(SimulatedRobot::new());
    let user = UserId::new("erin");
    for address in ["0.0.0.0", "255.255.255.255", "192.168.001.010", "8.8.8.8"] {
        gw.connect(address, &user).await.unwrap();
        assert!(matches!(
            gw.connect(address, &user).await,
            Err(GatewayError::AlreadyConnected(_))
        ));
        gw.terminate(&user).await.unwrap();
    }
}

#[tokio::test]
async fn fetches_are_idempotent() {
    let (gw, _, store) = setup(SimulatedRobot::with_test_pattern());
    let user = UserId::new("frank");
    gw.connect("192.168.1.100", &user).await.unwrap();

    let first = gw.get_snapshot().await.unwrap();
    assert_eq!(gw.get_snapshot().await.unwrap(), first);
    let frame = gw.get_frame().await.unwrap();
    assert_eq!(gw.get_frame().await.unwrap(), frame);

    // Fetches are not logged.
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn unsubscribe_stops_callbacks() {
    let (gw, _, _) = setup(SimulatedRobot::new());
    gw.connect("192.168.1.100", &UserId::new("grace"))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handle = gw
        .subscribe_telemetry(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(100),
        )
        .await
        .unwrap();
    handle.stop().await;

    let settled = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(calls.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn reconnect_after_terminate_starts_fresh() {
    let (gw, robot, _) = setup(SimulatedRobot::new());
    let user = UserId::new("heidi");

    gw.connect("10.0.0.1", &user).await.unwrap();
    let handle = gw
        .subscribe_frames(|_| {}, Duration::from_millis(10))
        .await
        .unwrap();
    gw.terminate(&user).await.unwrap();
    assert!(!handle.is_active());

    let session = gw.connect("10.0.0.2", &user).await.unwrap();
    assert_eq!(session.robot_address.to_string(), "10.0.0.2");
    assert_eq!(robot.connect_count(), 2);
    assert_eq!(gw.status(), SessionStatus::Connected(session));
}
