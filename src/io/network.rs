//! UDP transport of measurements.
//!
//! A datagram carries one measurement as `<networkId> <encoded measurement>`.
//! [`NetworkSink`] sends them; all [`NetworkSource`] components listening
//! on the same `networkPort` share one [`NetworkSourceModule`], which owns
//! the socket and hands each datagram to the source registered under its
//! id. Datagrams for unknown ids and malformed payloads are logged and
//! dropped; receiving goes on.

use crate::config::{SubgraphConfig, DEFAULT_NETWORK_PORT};
use crate::dataflow::{
    BuildContext, Component, ComponentCore, ComponentFactory, ComponentTable, Construct, DataflowError,
    DataflowResult, Module, ModuleHandle, PushSupplier, StopSignal, WorkerSlot,
};
use crate::measurement::codec::{decode, encode_datagram, split_datagram};
use crate::measurement::{
    Button, ErrorPose, Matrix3x3, Matrix3x4f, Matrix4x4, Payload, Pose, Position, Position2D, Rotation,
    Timestamp,
};
use std::marker::PhantomData;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = 65_536;

const SOURCE_CLASSES: [&str; 12] = [
    "NetworkSourcePose",
    "NetworkSourceErrorPose",
    "NetworkSourceRotation",
    "NetworkSourcePosition",
    "NetworkSourcePosition2D",
    "NetworkSourcePoseList",
    "NetworkSourcePositionList",
    "NetworkSourcePositionList2",
    "NetworkSourceEvent",
    "NetworkSourceMatrix3x3",
    "NetworkSourceMatrix3x4",
    "NetworkSourceMatrix4x4",
];

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register_module::<NetworkSourceModule>(&SOURCE_CLASSES);

    factory.register::<NetworkSink<Pose>>("NetworkSinkPose");
    factory.register::<NetworkSink<ErrorPose>>("NetworkSinkErrorPose");
    factory.register::<NetworkSink<Rotation>>("NetworkSinkRotation");
    factory.register::<NetworkSink<Position>>("NetworkSinkPosition");
    factory.register::<NetworkSink<Position2D>>("NetworkSinkPosition2D");
    factory.register::<NetworkSink<Vec<Pose>>>("NetworkSinkPoseList");
    factory.register::<NetworkSink<Vec<Position>>>("NetworkSinkPositionList");
    factory.register::<NetworkSink<Vec<Position2D>>>("NetworkSinkPositionList2");
    factory.register::<NetworkSink<Button>>("NetworkSinkEvent");
    factory.register::<NetworkSink<Matrix3x3>>("NetworkSinkMatrix3x3");
    factory.register::<NetworkSink<Matrix3x4f>>("NetworkSinkMatrix3x4");
    factory.register::<NetworkSink<Matrix4x4>>("NetworkSinkMatrix4x4");
}

/// Id a sink sends with and a source listens for; defaults to the
/// component id.
fn network_id(config: &SubgraphConfig) -> DataflowResult<String> {
    config.attr_or("networkId", config.id.clone())
}

// ==================== source ====================

/// A source as seen by the receiving thread.
pub trait Deliver: Component {
    /// Decode `body` and push it; `received` is the arrival time.
    fn deliver(&self, body: &str, received: Timestamp) -> DataflowResult<()>;
}

pub struct NetworkSourceModule {
    port: u16,
    sources: Arc<ComponentTable<String, dyn Deliver>>,
    worker: WorkerSlot,
}

impl NetworkSourceModule {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Module for NetworkSourceModule {
    type Key = u16;

    fn module_key(config: &SubgraphConfig) -> DataflowResult<u16> {
        config.attr_or("networkPort", DEFAULT_NETWORK_PORT)
    }

    fn create(key: &u16, _config: &SubgraphConfig, _ctx: &BuildContext) -> DataflowResult<Self> {
        Ok(Self {
            port: *key,
            sources: Arc::new(ComponentTable::new()),
            worker: WorkerSlot::new(),
        })
    }

    fn create_component(
        module: &Arc<ModuleHandle<Self>>,
        config: &SubgraphConfig,
        ctx: &BuildContext,
    ) -> DataflowResult<Arc<dyn Component>> {
        match config.class.as_str() {
            "NetworkSourcePose" => NetworkSource::<Pose>::attach(module, config, ctx),
            "NetworkSourceErrorPose" => NetworkSource::<ErrorPose>::attach(module, config, ctx),
            "NetworkSourceRotation" => NetworkSource::<Rotation>::attach(module, config, ctx),
            "NetworkSourcePosition" => NetworkSource::<Position>::attach(module, config, ctx),
            "NetworkSourcePosition2D" => NetworkSource::<Position2D>::attach(module, config, ctx),
            "NetworkSourcePoseList" => NetworkSource::<Vec<Pose>>::attach(module, config, ctx),
            "NetworkSourcePositionList" => NetworkSource::<Vec<Position>>::attach(module, config, ctx),
            "NetworkSourcePositionList2" => NetworkSource::<Vec<Position2D>>::attach(module, config, ctx),
            "NetworkSourceEvent" => NetworkSource::<Button>::attach(module, config, ctx),
            "NetworkSourceMatrix3x3" => NetworkSource::<Matrix3x3>::attach(module, config, ctx),
            "NetworkSourceMatrix3x4" => NetworkSource::<Matrix3x4f>::attach(module, config, ctx),
            "NetworkSourceMatrix4x4" => NetworkSource::<Matrix4x4>::attach(module, config, ctx),
            other => Err(DataflowError::UnknownComponentType(format!(
                "{other} is not supported by the network source module"
            ))),
        }
    }

    fn start_module(&self) -> DataflowResult<()> {
        let socket = UdpSocket::bind(("0.0.0.0", self.port))
            .map_err(|e| DataflowError::Network(format!("cannot bind UDP port {}: {}", self.port, e)))?;
        socket.set_nonblocking(true)?;
        tracing::info!("Receiving on UDP port {}", self.port);
        let sources = self.sources.clone();
        self.worker.start(format!("network-source-{}", self.port), move |stop| {
            receive(socket, &sources, stop)
        })
    }

    fn stop_module(&self) {
        self.worker.stop();
        tracing::info!("Stopped receiving on UDP port {}", self.port);
    }
}

/// Receiving thread: a current-thread runtime serving one socket until
/// the stop signal fires.
fn receive(socket: UdpSocket, sources: &ComponentTable<String, dyn Deliver>, stop: StopSignal) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_io().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Could not start network runtime: {}", e);
            return;
        }
    };

    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    runtime.spawn_blocking(move || {
        // returns once the worker's stop sender is dropped
        let _ = stop.receiver().recv();
        let _ = stop_tx.send(());
    });

    runtime.block_on(async move {
        let socket = match tokio::net::UdpSocket::from_std(socket) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Could not register socket: {}", e);
                return;
            }
        };
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        let now = Timestamp::now();
                        tracing::trace!("Received {} bytes from {}", len, from);
                        dispatch(sources, &buf[..len], now);
                    }
                    Err(e) => tracing::error!("Error receiving from socket: {}", e),
                },
            }
        }
    });
}

/// Hand one datagram to its source.
fn dispatch(sources: &ComponentTable<String, dyn Deliver>, datagram: &[u8], received: Timestamp) {
    let result = std::str::from_utf8(datagram)
        .map_err(|e| DataflowError::Serialization(e.to_string()))
        .and_then(split_datagram)
        .and_then(|(id, body)| match sources.get(&id.to_string()) {
            Some(source) => source.deliver(body, received),
            None => {
                tracing::warn!(
                    "Sender uses id \"{}\", found no network source with the same id",
                    id
                );
                Ok(())
            }
        });
    if let Err(e) = result {
        tracing::error!("Dropped datagram: {}", e);
    }
}

pub struct NetworkSource<T: Payload> {
    core: ComponentCore,
    key: String,
    output: PushSupplier<T>,
    receive_time: bool,
    module: Arc<ModuleHandle<NetworkSourceModule>>,
}

impl<T: Payload> NetworkSource<T> {
    fn attach(
        module: &Arc<ModuleHandle<NetworkSourceModule>>,
        config: &SubgraphConfig,
        ctx: &BuildContext,
    ) -> DataflowResult<Arc<dyn Component>> {
        let key = network_id(config)?;
        let receive_time = match config.edge_text("Output", "timestamp").as_deref() {
            None | Some("send") => false,
            Some("receive") => true,
            Some(other) => {
                return Err(DataflowError::invalid_attribute(
                    &config.id,
                    "timestamp",
                    format!("expected \"send\" or \"receive\", got \"{other}\""),
                ))
            }
        };
        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<T>("Output")?;
        let source = Arc::new(Self {
            core,
            key: key.clone(),
            output,
            receive_time,
            module: module.clone(),
        });
        let deliver: Arc<dyn Deliver> = source.clone();
        module.sources.register(key, &deliver)?;
        Ok(source)
    }
}

impl<T: Payload> Component for NetworkSource<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_start(&self) -> DataflowResult<()> {
        self.module.ensure_started()
    }
}

impl<T: Payload> Deliver for NetworkSource<T> {
    fn deliver(&self, body: &str, received: Timestamp) -> DataflowResult<()> {
        let measurement = decode::<T>(body)?;
        if !self.is_running() {
            return Ok(());
        }
        let measurement = if self.receive_time {
            measurement.retimed(received)
        } else {
            measurement
        };
        self.output.send(measurement);
        Ok(())
    }
}

impl<T: Payload> Drop for NetworkSource<T> {
    fn drop(&mut self) {
        self.module.sources.release(&self.key);
    }
}

// ==================== sink ====================

pub struct NetworkSink<T> {
    core: ComponentCore,
    destination: SocketAddr,
    _payload: PhantomData<fn() -> T>,
}

impl<T> NetworkSink<T> {
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl<T: Payload> Construct for NetworkSink<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let host: String = config.attr_or("networkDestination", "127.0.0.1".to_string())?;
        let port: u16 = config.attr_or("networkPort", DEFAULT_NETWORK_PORT)?;
        let destination = (host.as_str(), port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| {
                DataflowError::invalid_attribute(&config.id, "networkDestination", format!("cannot resolve {host}"))
            })?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| DataflowError::Network(format!("cannot open UDP socket: {e}")))?;
        let id = network_id(config)?;

        let mut core = ComponentCore::new(config, ctx);
        core.push_consumer::<T, _>("Input", move |m| {
            let datagram = encode_datagram(&id, &m)?;
            socket
                .send_to(datagram.as_bytes(), destination)
                .map_err(|e| DataflowError::Network(format!("sending to {destination}: {e}")))?;
            Ok(())
        })?;
        tracing::debug!("Sending to {}", destination);
        Ok(Self {
            core,
            destination,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for NetworkSink<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::{at, values, Collected, Harness};
    use crate::config::EdgeMode;
    use crate::measurement::codec::encode;
    use serial_test::serial;
    use std::time::{Duration, Instant};

    const TEST_PORT: u16 = 47_311;

    fn wait_for<T>(seen: &Collected<T>, count: usize) {
        let started = Instant::now();
        while seen.lock().len() < count && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn source(id: &str, class: &str) -> SubgraphConfig {
        SubgraphConfig::new(id, class)
            .with_attribute("networkPort", TEST_PORT as i64)
            .with_output("Output", EdgeMode::Push)
    }

    #[test]
    #[serial]
    fn test_sink_to_source() {
        let h = Harness::new();
        let positions = h.build(&source("tracker", "NetworkSourcePosition")).unwrap();
        let buttons = h.build(&source("buttons", "NetworkSourceEvent")).unwrap();
        let seen_positions = h.collect::<Position>(positions.as_ref(), "Output");
        let seen_buttons = h.collect::<Button>(buttons.as_ref(), "Output");
        positions.start().unwrap();
        buttons.start().unwrap();

        let sink_config = SubgraphConfig::new("tracker", "NetworkSinkPosition")
            .with_attribute("networkPort", TEST_PORT as i64)
            .with_open_input("Input", EdgeMode::Push);
        let sink = h.build(&sink_config).unwrap();
        let feed = h.feed::<Position>(sink.as_ref(), "Input");
        feed.send(at(7, Position::new(1.0, 2.0, 3.0)));

        let raw = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
        let target = ("127.0.0.1", TEST_PORT);
        raw.send_to(b"nobody {\"time\":1,\"value\":1}", target).unwrap();
        raw.send_to(b"buttons not-json", target).unwrap();
        let event = encode_datagram("buttons", &at(9, 32)).unwrap();
        raw.send_to(event.as_bytes(), target).unwrap();

        wait_for(&seen_positions, 1);
        wait_for(&seen_buttons, 1);
        assert_eq!(values(&seen_positions), vec![Position::new(1.0, 2.0, 3.0)]);
        assert_eq!(seen_positions.lock()[0].time(), Timestamp::from_millis(7));
        assert_eq!(values(&seen_buttons), vec![32]);
        positions.stop();
        buttons.stop();
    }

    #[test]
    #[serial]
    fn test_receive_timestamp() {
        let h = Harness::new();
        let config = source("pose", "NetworkSourcePose").with_edge_attribute("timestamp", "receive");
        let c = h.build(&config).unwrap();
        let seen = h.collect::<Pose>(c.as_ref(), "Output");
        c.start().unwrap();

        let before = Timestamp::now();
        let datagram = format!("pose {}", encode(&at(1, Pose::identity())).unwrap());
        UdpSocket::bind(("127.0.0.1", 0))
            .unwrap()
            .send_to(datagram.as_bytes(), ("127.0.0.1", TEST_PORT))
            .unwrap();
        wait_for(&seen, 1);
        assert!(seen.lock()[0].time() >= before);
        c.stop();
    }

    #[test]
    fn test_bad_timestamp_mode() {
        let h = Harness::new();
        let config = source("pose", "NetworkSourcePose")
            .with_attribute("networkPort", 47_399i64)
            .with_edge_attribute("timestamp", "later");
        assert!(matches!(h.build(&config), Err(DataflowError::InvalidAttribute { .. })));
    }
}
