/*!
Asynchronous control daemon for projectors on serial-over-TCP bridges.

`beamctl` drives a single projector over its RS232 port, exposed on the
network by a serial bridge. It keeps a live model of the projector's power
state and serves a small REST API for operators and home automation.

## Features

* One owned, lazily-established TCP connection to the serial bridge, with
  reconnect on next use after a failure.
* Strictly serialized request/reply exchanges (RS232 has no framing to match
  concurrent replies to their requests).
* Typed commands: power, volume, temperature, fan speed, lamp hours,
  picture mode, brightness, contrast, sharpness.
* A power state machine covering the lamp's 30s warm-up and 90s cool-down,
  with a `remainingSeconds` countdown derived on read.
* Fixed-period power polling plus on/off-gated metric pollers feeding
  shared caches, so HTTP reads never queue extra device round trips.
* REST surface with a uniform `{ error, data }` envelope.

## Overview

The crate is built in layers:

1. [`DeviceLink`] owns the connection. Callers submit one request frame and
   get the matching reply line back; exchanges run one at a time in
   submission order.
2. [`ProjectorClient`] speaks the wire grammar: typed operations in, parsed
   readings out, with rejections and malformed replies mapped to
   [`CommandError`].
3. [`PowerTracker`] folds raw power readings and operator requests into one
   of `UNKNOWN`, `OFF`, `WARMING_UP`, `ON`, `COOLING_DOWN`. A `pow=on` is
   acknowledged by the device immediately, but the lamp takes its time, so
   the timed phases bridge the gap until readings and reality agree. See
   [`PowerTracker`] for the transition diagram.
4. [`ProjectorMonitor`] polls power every 2 seconds, derives a deduplicated
   settled-on signal, and gates the metric pollers (temperature, fan speed,
   volume, picture mode, picture settings, lamp hours) on it. While the
   projector is off the metric caches hold `None`.
5. [`router`] serves the caches and commands over HTTP.

## Running the daemon

Configuration comes from the environment; host and port are required:

```sh
PROJECTOR_HOST=10.0.0.17 PROJECTOR_PORT=4661 beamctl
```

`PROJECTOR_TIMEOUT_MS` (default 5000) bounds the wait for a device reply,
and `BEAMCTL_LISTEN` (default `0.0.0.0:8080`) picks the HTTP bind address.
Logging uses `env_logger`, so `RUST_LOG=debug` shows every frame exchanged.

## Embedding

The same layers can be assembled in-process:

```no_run
use std::sync::Arc;

use beamctl::{Config, DeviceLink, ProjectorClient, ProjectorMonitor};

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("projector host and port are required");

    let link = DeviceLink::start(config.link_config());
    let client = ProjectorClient::new(link.clone());
    let monitor = Arc::new(ProjectorMonitor::start(client.clone()));

    // Direct commands and cached readings, no HTTP involved.
    let _ = client.set_power(true).await;
    println!("temperature: {:?}", monitor.temperature());

    monitor.shutdown().await;
    link.shut_down();
}
```
*/

mod api;
mod client;
mod commands;
mod config;
mod error;
mod link;
mod monitor;
mod power;
#[cfg(test)]
mod test_support;
mod wire;

pub use api::router;
pub use client::{PictureSettings, ProjectorClient};
pub use commands::{Command, Direction, PictureMode};
pub use config::Config;
pub use error::{CommandError, ConfigError, LinkError, Result};
pub use link::{DeviceLink, LinkConfig};
pub use monitor::{ProjectorMonitor, POLL_PERIOD};
pub use power::{PowerPhase, PowerSnapshot, PowerStateInfo, PowerTracker, COOL_DOWN, WARM_UP};
