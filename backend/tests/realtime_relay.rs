//! End-to-end tests for the realtime relay talking to the server hub over a
//! real WebSocket.

#[path = "support/poll.rs"]
mod poll;

use std::net::TcpListener;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer, web};
use mfi_backend::domain::ports::EventPublisher;
use mfi_backend::domain::realtime::{EventCallback, RealtimeRelay, RelayError, ServerEvent};
use mfi_backend::inbound::ws;
use mfi_backend::inbound::ws::hub::RealtimeHub;
use mfi_backend::inbound::ws::state::WsState;
use mfi_backend::outbound::realtime::AwcTransport;
use poll::wait_for;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

const WAIT: Duration = Duration::from_secs(5);

struct HubServer {
    url: String,
    hub: Arc<RealtimeHub>,
    handle: ServerHandle,
}

impl HubServer {
    fn relay(&self) -> RealtimeRelay {
        RealtimeRelay::new(Arc::new(AwcTransport::new(format!("{}/ws", self.url))))
    }
}

impl Drop for HubServer {
    fn drop(&mut self) {
        drop(self.handle.stop(false));
    }
}

#[fixture]
fn hub_server() -> HubServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let hub = Arc::new(RealtimeHub::new());
    let ws_state = WsState::new(Arc::clone(&hub));
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        actix_rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(ws_state.clone()))
                    .service(ws::ws_entry)
            })
            .workers(1)
            .listen(listener)
            .expect("listen on test socket")
            .disable_signals()
            .run();
            tx.send(server.handle()).expect("send server handle");
            server.await.expect("server runs");
        });
    });

    HubServer {
        url: format!("ws://{addr}"),
        hub,
        handle: rx.recv_timeout(WAIT).expect("server handle"),
    }
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Value>>>);

impl Recorder {
    fn callback(&self) -> EventCallback {
        let seen = Arc::clone(&self.0);
        Arc::new(move |payload: &Value| {
            seen.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(payload.clone());
        })
    }

    fn payloads(&self) -> Vec<Value> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn wait_for(&self, expected: &Value) -> bool {
        wait_for(WAIT, || self.payloads().contains(expected))
    }
}

fn connected(relay: &RealtimeRelay, member: &str) {
    let status = Recorder::default();
    let _subscription = relay.on("connection_status", status.callback());
    relay.connect(member).expect("credential accepted");
    assert!(
        status.wait_for(&json!({ "connected": true })),
        "{member} never connected"
    );
}

#[rstest]
fn connecting_twice_reuses_the_live_connection(hub_server: HubServer) {
    let relay = hub_server.relay();
    connected(&relay, "alice");

    let first = relay.connect("alice").expect("connected");
    let second = relay.connect("someone-else").expect("connected");

    assert!(first.same_as(&second));
    assert!(relay.is_connected());
    assert!(wait_for(WAIT, || hub_server.hub.connection_count() == 1));
}

#[rstest]
fn blank_credentials_are_refused(hub_server: HubServer) {
    let relay = hub_server.relay();

    assert!(matches!(relay.connect("  "), Err(RelayError::EmptyCredential)));
    assert!(!relay.is_connected());
}

#[rstest]
fn typing_in_a_room_reaches_the_other_member(hub_server: HubServer) {
    let alice = hub_server.relay();
    let bob = hub_server.relay();
    connected(&alice, "alice");
    connected(&bob, "bob");
    let typing = Recorder::default();
    let _subscription = bob.on("typing_start", typing.callback());

    alice.join_room("group:7");
    bob.join_room("group:7");
    assert!(wait_for(WAIT, || hub_server.hub.room_size("group:7") == 2));
    alice.start_typing("group:7");

    assert!(typing.wait_for(&json!({ "room": "group:7", "member": "alice" })));
}

#[rstest]
fn status_updates_are_broadcast(hub_server: HubServer) {
    let alice = hub_server.relay();
    let bob = hub_server.relay();
    connected(&alice, "alice");
    connected(&bob, "bob");
    let statuses = Recorder::default();
    let _subscription = bob.on("status_update", statuses.callback());

    alice.update_status("away");

    assert!(statuses.wait_for(&json!({ "member": "alice", "status": "away" })));
}

#[rstest]
fn published_events_reach_room_subscribers(hub_server: HubServer) {
    let relay = hub_server.relay();
    connected(&relay, "alice");
    let created = Recorder::default();
    let _subscription = relay.on("transaction_created", created.callback());
    relay.join_room("group:3");
    assert!(wait_for(WAIT, || hub_server.hub.room_size("group:3") == 1));

    let delivered = futures::executor::block_on(hub_server.hub.publish_to_room(
        "group:3",
        ServerEvent::TransactionCreated,
        json!({ "amount": 1200 }),
    ));

    assert_eq!(delivered, Ok(1));
    assert!(created.wait_for(&json!({ "amount": 1200 })));
}

#[rstest]
fn presence_follows_connect_and_disconnect(hub_server: HubServer) {
    let alice = hub_server.relay();
    connected(&alice, "alice");
    let online = Recorder::default();
    let offline = Recorder::default();
    let _online = alice.on("user_online", online.callback());
    let _offline = alice.on("user_offline", offline.callback());

    let bob = hub_server.relay();
    connected(&bob, "bob");
    assert!(online.wait_for(&json!({ "member": "bob" })));

    bob.disconnect();
    assert!(offline.wait_for(&json!({ "member": "bob" })));
    assert!(!bob.is_connected());
    assert_eq!(bob.subscriber_count("connection_status"), 0);
}

#[rstest]
fn unreachable_endpoint_reports_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    let relay = RealtimeRelay::new(Arc::new(
        AwcTransport::new(format!("ws://{addr}/ws")).with_connect_timeout(Duration::from_secs(2)),
    ));
    let errors = Recorder::default();
    let _subscription = relay.on("connection_error", errors.callback());

    relay.connect("alice").expect("credential accepted");

    assert!(wait_for(WAIT, || !errors.payloads().is_empty()));
    assert!(errors.payloads()[0]["message"].is_string());
}
