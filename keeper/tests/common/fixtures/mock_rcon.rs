//! Fake RCON server for testing
//!
//! Speaks the real wire framing on a loopback port so the control channel
//! is exercised end to end without a game server.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use keeper::rcon::packet::{
    Packet, AUTH_FAILED_ID, PACKET_AUTH_RESPONSE, PACKET_LOGIN, PACKET_RESPONSE,
};

pub const DEFAULT_LIST_REPLY: &str = "There are 0/20 players online:";

struct MockState {
    password: String,
    list_replies: VecDeque<String>,
    default_list_reply: String,
    commands: Vec<String>,
    silent: HashSet<String>,
    hang_up_on: HashSet<String>,
}

/// Mock RCON server that records every command it receives
pub struct MockRconServer {
    pub host: String,
    pub port: u16,
    state: Arc<Mutex<MockState>>,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockRconServer {
    /// Start listening on an ephemeral loopback port
    pub async fn start(password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(MockState {
            password: password.to_string(),
            list_replies: VecDeque::new(),
            default_list_reply: DEFAULT_LIST_REPLY.to_string(),
            commands: Vec::new(),
            silent: HashSet::new(),
            hang_up_on: HashSet::new(),
        }));
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_state = state.clone();
        let accept_count = connections.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, accept_state.clone()));
            }
        });

        Self {
            host: "127.0.0.1".to_string(),
            port,
            state,
            connections,
            handle,
        }
    }

    /// Queue the reply for the next `list` command
    pub fn push_list_reply(&self, reply: impl Into<String>) {
        self.state.lock().unwrap().list_replies.push_back(reply.into());
    }

    /// Queue `There are <n>/20 players online:` replies
    pub fn push_user_counts(&self, counts: &[u32]) {
        for count in counts {
            self.push_list_reply(format!("There are {}/20 players online:", count));
        }
    }

    /// Reply used once the queue is empty
    pub fn set_default_list_reply(&self, reply: impl Into<String>) {
        self.state.lock().unwrap().default_list_reply = reply.into();
    }

    /// Read `command` but never answer it
    pub fn never_answer(&self, command: &str) {
        self.state.lock().unwrap().silent.insert(command.to_string());
    }

    /// Close the connection when `command` arrives
    pub fn hang_up_on(&self, command: &str) {
        self.state
            .lock()
            .unwrap()
            .hang_up_on
            .insert(command.to_string());
    }

    /// Commands received so far, across all connections, in order
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Number of TCP connections accepted
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockRconServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum Action {
    Reply(String),
    Ignore,
    HangUp,
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<MockState>>) {
    loop {
        let packet = match Packet::read_from(&mut stream).await {
            Ok(packet) => packet,
            Err(_) => return,
        };

        if packet.kind == PACKET_LOGIN {
            let accepted = state.lock().unwrap().password == packet.body;
            let id = if accepted { packet.request_id } else { AUTH_FAILED_ID };
            // Real servers lead with an empty response packet
            let leading = Packet::new(packet.request_id, PACKET_RESPONSE, "");
            let auth = Packet::new(id, PACKET_AUTH_RESPONSE, "");
            if leading.write_to(&mut stream).await.is_err()
                || auth.write_to(&mut stream).await.is_err()
            {
                return;
            }
            continue;
        }

        let action = {
            let mut state = state.lock().unwrap();
            state.commands.push(packet.body.clone());
            if state.hang_up_on.contains(&packet.body) {
                Action::HangUp
            } else if state.silent.contains(&packet.body) {
                Action::Ignore
            } else if packet.body == "list" {
                let reply = state
                    .list_replies
                    .pop_front()
                    .unwrap_or_else(|| state.default_list_reply.clone());
                Action::Reply(reply)
            } else {
                Action::Reply(format!("ran {}", packet.body))
            }
        };

        match action {
            Action::Reply(body) => {
                let reply = Packet::new(packet.request_id, PACKET_RESPONSE, body);
                if reply.write_to(&mut stream).await.is_err() {
                    return;
                }
            }
            Action::Ignore => {}
            Action::HangUp => return,
        }
    }
}
