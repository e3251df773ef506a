//! Shared test fixture: a scripted projector bridge on a local TCP socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Duration;

use crate::client::ProjectorClient;
use crate::link::{DeviceLink, LinkConfig};

#[derive(Debug, Default)]
struct DeviceState {
    values: HashMap<String, String>,
    power_blocked: bool,
    reject_sets: bool,
    garble_replies: bool,
    seen: Vec<String>,
}

/// A fake projector speaking the wire grammar, with a mutable value table so
/// sets really change what later reads return. Serves connections one after
/// another, which also covers link redials.
pub(crate) struct FakeProjector {
    addr: SocketAddr,
    state: Arc<Mutex<DeviceState>>,
}

impl FakeProjector {
    /// Starts the fake on an ephemeral local port with stock values: power
    /// OFF, volume 5, picture mode preset, brightness/contrast 50, sharpness
    /// 10, temperature 41, fan 1420 rpm, lamp hours 803.
    pub(crate) async fn start() -> FakeProjector {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut values = HashMap::new();
        for (key, value) in [
            ("pow", "OFF"),
            ("vol", "5"),
            ("appmod", "PRESET"),
            ("bri", "50"),
            ("con", "50"),
            ("sha", "10"),
            ("tmp", "41"),
            ("fan", "1420"),
            ("ltim", "803"),
        ] {
            values.insert(key.to_string(), value.to_string());
        }

        let state = Arc::new(Mutex::new(DeviceState {
            values,
            ..Default::default()
        }));
        let serve_state = Arc::clone(&state);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };

                let mut buf: Vec<u8> = Vec::new();
                let mut chunk = [0u8; 256];

                loop {
                    let n = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);

                    while let Some(pos) = buf.iter().position(|b| *b == b'\r') {
                        let segment: Vec<u8> = buf.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&segment[..pos]).trim().to_string();
                        if line.is_empty() {
                            continue;
                        }

                        let reply = serve_state.lock().unwrap().respond(&line);
                        if socket
                            .write_all(format!("{reply}\r").as_bytes())
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        FakeProjector { addr, state }
    }

    pub(crate) fn link_config(&self) -> LinkConfig {
        LinkConfig::new(self.addr.to_string()).with_response_timeout(Duration::from_millis(500))
    }

    /// A client wired to this fake through a fresh link.
    pub(crate) fn client(&self) -> ProjectorClient {
        ProjectorClient::new(DeviceLink::start(self.link_config()))
    }

    pub(crate) fn set_value(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .values
            .insert(key.to_string(), value.to_string());
    }

    pub(crate) fn clear_value(&self, key: &str) {
        self.state.lock().unwrap().values.remove(key);
    }

    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().values.get(key).cloned()
    }

    /// When set, `pow=?` queries answer `*Block item#`.
    pub(crate) fn set_power_blocked(&self, blocked: bool) {
        self.state.lock().unwrap().power_blocked = blocked;
    }

    /// When set, every set command answers `*Block item#`.
    pub(crate) fn set_reject_sets(&self, reject: bool) {
        self.state.lock().unwrap().reject_sets = reject;
    }

    /// When set, every reply is an unparseable line.
    pub(crate) fn set_garble_replies(&self, garble: bool) {
        self.state.lock().unwrap().garble_replies = garble;
    }

    /// Every frame received so far, in arrival order.
    pub(crate) fn seen(&self) -> Vec<String> {
        self.state.lock().unwrap().seen.clone()
    }
}

impl DeviceState {
    fn respond(&mut self, line: &str) -> String {
        self.seen.push(line.to_string());

        if self.garble_replies {
            return "~~noise~~".to_string();
        }

        let Some(body) = line.strip_prefix('*').and_then(|rest| rest.strip_suffix('#')) else {
            return "*Illegal format#".to_string();
        };
        let Some((key, arg)) = body.split_once('=') else {
            return "*Illegal format#".to_string();
        };
        let key = key.to_ascii_lowercase();

        if arg == "?" {
            if key == "pow" && self.power_blocked {
                return "*Block item#".to_string();
            }
            return match self.values.get(&key) {
                Some(value) => format!("*{}={}#", key.to_ascii_uppercase(), value),
                None => "*Unsupported item#".to_string(),
            };
        }

        if self.reject_sets {
            return "*Block item#".to_string();
        }
        if !self.values.contains_key(&key) {
            return "*Unsupported item#".to_string();
        }

        let stored = match (key.as_str(), arg) {
            ("bri", "+") | ("bri", "-") => {
                let current: i32 = self
                    .values
                    .get("bri")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(0);
                let next = if arg == "+" { current + 1 } else { current - 1 };
                next.clamp(0, 100).to_string()
            }
            ("pow", _) => arg.to_ascii_uppercase(),
            _ => arg.to_string(),
        };

        self.values.insert(key.clone(), stored.clone());
        format!("*{}={}#", key.to_ascii_uppercase(), stored)
    }
}
