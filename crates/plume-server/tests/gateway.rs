//! End-to-end gateway exercise: a real WebSocket listener, a real client
//! session, and a routed echo handler behind the message listener.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use plume_client::{Client, ClientOptions, LoginDialer};
use plume_core::{
    marshal, unmarshal, Context, Dispatcher, Flag, HandlerFunc, OpCode, Packet, PlumeError,
    PlumeResult, Status, META_DEST_SERVER,
};
use plume_server::{
    Agent, GatewayConfig, GatewayServer, LoginAcceptor, MessageListener, StateListener,
};

const SECRET: &[u8] = b"integration-secret";
const GATE_ID: &str = "gate-test";

/// Runs each inbound packet through a handler chain that echoes the body
/// back to the origin channel.
struct EchoListener {
    dispatcher: OnceLock<Arc<dyn Dispatcher>>,
}

impl MessageListener for EchoListener {
    fn receive(&self, agent: Arc<dyn Agent>, payload: &[u8]) {
        let Some(dispatcher) = self.dispatcher.get().cloned() else {
            return;
        };
        let mut packet = match unmarshal(payload) {
            Ok(packet) => packet,
            Err(_) => return,
        };
        packet.channel_id = agent.id().to_string();
        packet.set_meta(META_DEST_SERVER, GATE_ID);

        let handler: HandlerFunc = Arc::new(|ctx: &mut Context| {
            let text: String = match ctx.read_body() {
                Ok(text) => text,
                Err(_) => return,
            };
            let _ = ctx.resp(Status::Success, &format!("echo: {text}"));
        });
        let mut ctx = Context::new(dispatcher, packet, vec![handler]);
        ctx.next();
    }
}

#[derive(Default)]
struct Disconnects(Mutex<Vec<String>>);

impl StateListener for Disconnects {
    fn disconnect(&self, channel_id: &str) -> PlumeResult<()> {
        self.0.lock().unwrap().push(channel_id.to_string());
        Ok(())
    }
}

async fn start_gateway(disconnects: Arc<Disconnects>) -> (SocketAddr, Arc<GatewayServer>) {
    let config = GatewayConfig {
        service_id: GATE_ID.to_string(),
        listen: "127.0.0.1:0".to_string(),
        ..GatewayConfig::default()
    };
    let echo = Arc::new(EchoListener {
        dispatcher: OnceLock::new(),
    });
    let server = Arc::new(GatewayServer::new(
        &config,
        Arc::new(LoginAcceptor::new(SECRET.to_vec())),
        echo.clone(),
        disconnects,
    ));
    let _ = echo.dispatcher.set(Arc::new(server.dispatcher()));
    let addr = server.clone().start().await.unwrap();
    (addr, server)
}

fn quiet_client(account: &str, secret: &[u8]) -> Client {
    let options = ClientOptions {
        heartbeat: Duration::ZERO,
        ..ClientOptions::default()
    };
    Client::new(
        account,
        "integration",
        Box::new(LoginDialer::new(secret.to_vec())),
        options,
    )
}

#[tokio::test]
async fn routed_echo_round_trip() {
    let disconnects = Arc::new(Disconnects::default());
    let (addr, server) = start_gateway(disconnects.clone()).await;

    let client = quiet_client("alice", SECRET);
    client.connect(&format!("ws://{addr}")).await.unwrap();
    let channel_id = client.channel_id();
    assert!(!channel_id.is_empty());
    assert_eq!(server.registry().len(), 1);

    let mut talk = Packet::new("chat.talk");
    talk.write_body(&"hello".to_string()).unwrap();
    client.send(&marshal(&talk).unwrap()).await.unwrap();

    let frame = client.read().await.unwrap();
    assert_eq!(frame.op, OpCode::Binary);
    let response = unmarshal(&frame.payload).unwrap();
    assert_eq!(response.header.command, "chat.talk");
    assert_eq!(response.header.sequence, talk.header.sequence);
    assert_eq!(response.header.flag, Flag::Response);
    assert_eq!(response.header.status, Status::Success);
    let body: String = response.read_body().unwrap();
    assert_eq!(body, "echo: hello");

    client.close().await;
    // Let the gateway observe the close handshake.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.registry().is_empty());
    assert_eq!(disconnects.0.lock().unwrap().as_slice(), &[channel_id]);
}

#[tokio::test]
async fn rejects_a_forged_token() {
    let (addr, server) = start_gateway(Arc::new(Disconnects::default())).await;

    let client = quiet_client("mallory", b"not-the-secret");
    let err = client.connect(&format!("ws://{addr}")).await.unwrap_err();
    assert!(matches!(err, PlumeError::Handshake(_)));
    assert!(!client.is_connected());
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn server_initiated_push_reaches_the_client() {
    let (addr, server) = start_gateway(Arc::new(Disconnects::default())).await;

    let client = quiet_client("alice", SECRET);
    client.connect(&format!("ws://{addr}")).await.unwrap();

    let mut push = Packet::new("notify.system");
    push.header.flag = Flag::Push;
    push.write_body(&"maintenance at noon".to_string()).unwrap();
    server
        .dispatcher()
        .push(GATE_ID, &[client.channel_id()], &push)
        .unwrap();

    let frame = client.read().await.unwrap();
    let packet = unmarshal(&frame.payload).unwrap();
    assert_eq!(packet.header.command, "notify.system");
    assert_eq!(packet.header.flag, Flag::Push);
    let body: String = packet.read_body().unwrap();
    assert_eq!(body, "maintenance at noon");

    client.close().await;
}

#[tokio::test]
async fn gateway_answers_heartbeat_pings() {
    let (addr, _server) = start_gateway(Arc::new(Disconnects::default())).await;

    let options = ClientOptions {
        heartbeat: Duration::from_millis(30),
        read_wait: Duration::from_secs(5),
        ..ClientOptions::default()
    };
    let client = Client::new(
        "alice",
        "integration",
        Box::new(LoginDialer::new(SECRET.to_vec())),
        options,
    );
    client.connect(&format!("ws://{addr}")).await.unwrap();

    let frame = client.read().await.unwrap();
    assert_eq!(frame.op, OpCode::Pong);

    client.close().await;
}

#[tokio::test]
async fn two_clients_are_tracked_independently() {
    let (addr, server) = start_gateway(Arc::new(Disconnects::default())).await;

    let alice = quiet_client("alice", SECRET);
    let bob = quiet_client("bob", SECRET);
    alice.connect(&format!("ws://{addr}")).await.unwrap();
    bob.connect(&format!("ws://{addr}")).await.unwrap();

    assert_ne!(alice.channel_id(), bob.channel_id());
    assert_eq!(server.registry().len(), 2);

    alice.close().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.registry().len(), 1);
    assert!(server.registry().get(&bob.channel_id()).is_some());

    bob.close().await;
}
