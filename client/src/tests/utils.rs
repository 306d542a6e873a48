use std::{sync::Arc, time::Duration};

use stagelink::api::server::Server;
use stagelink_server::{
    config::Config, error::Error, identity::ServerIdentity, relay::Relay, start, AppState,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{ClientError, Notice, Participant};

/// How long we wait before deciding nothing else is coming.
pub const QUIET: Duration = Duration::from_millis(300);

/// A relay running in this process on a random local port.
pub struct TestServer {
    pub server: Server,
    pub relay: Arc<Relay>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), Error>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    pub async fn start_with(config: Config) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("can bind a local port");
        let server = Server::from(listener.local_addr().expect("bound"));

        let shutdown = CancellationToken::new();
        let state = AppState::new(&config, ServerIdentity::generate(), shutdown.clone());
        let relay = state.relay.clone();

        let task = tokio::spawn(start(listener, state));

        Self {
            server,
            relay,
            shutdown,
            task,
        }
    }

    pub fn url(&self) -> String {
        self.server.ws_url()
    }

    pub async fn join(&self, name: &str) -> Participant {
        Participant::connect(self.url(), name)
            .await
            .expect("joining works")
    }

    /// Waits until the relay no longer knows `name`.
    pub async fn wait_until_gone(&self, name: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.relay.registry().lookup(name).is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("member is removed");
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.task
            .await
            .expect("server task doesn't panic")
            .expect("server stops cleanly");
    }
}

/// The next notice that isn't a key announcement, or `None` if nothing
/// arrives for [`QUIET`].
pub async fn next_non_key(participant: &mut Participant) -> Option<Notice> {
    loop {
        match tokio::time::timeout(QUIET, participant.next_notice()).await {
            Err(_) => return None,
            Ok(Ok(Notice::ServerKey(_))) => {}
            Ok(Ok(notice)) => return Some(notice),
            Ok(Err(err)) => panic!("{} lost its connection: {err}", participant.name()),
        }
    }
}

pub async fn closed(participant: &mut Participant) -> bool {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), participant.next_notice()).await {
            Err(_) => return false,
            Ok(Ok(_)) => {}
            Ok(Err(ClientError::Closed | ClientError::Websocket(_))) => return true,
            Ok(Err(err)) => panic!("unexpected error: {err}"),
        }
    }
}
