//! Signals and input ports: the producer side readers attach to

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::debug;

use super::ConnectionQueue;
use crate::types::{DataDescriptor, DataPacket, EventPacket, Packet, Sample, Scalar};
use crate::{ReaderError, Result};

#[derive(Debug, Default)]
struct Descriptors {
    value: Option<Arc<DataDescriptor>>,
    domain: Option<Arc<DataDescriptor>>,
}

/// A producer of packets with a value and (optional) domain descriptor.
///
/// Every connection gets its own queue; [`send`](Self::send) fans a packet out to all
/// live connections. Connecting enqueues the current descriptors as an initial
/// descriptor-changed event so readers learn the layout before the first data.
#[derive(Debug)]
pub struct Signal {
    id: String,
    descriptors: RwLock<Descriptors>,
    connections: Mutex<Vec<Weak<ConnectionQueue>>>,
}

impl Signal {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Signal {
            id: id.into(),
            descriptors: RwLock::new(Descriptors::default()),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn with_descriptors(
        id: impl Into<String>,
        value: Arc<DataDescriptor>,
        domain: Option<Arc<DataDescriptor>>,
    ) -> Arc<Self> {
        Arc::new(Signal {
            id: id.into(),
            descriptors: RwLock::new(Descriptors { value: Some(value), domain }),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.descriptors.read().value.clone()
    }

    pub fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.descriptors.read().domain.clone()
    }

    /// Open a new connection queue to this signal.
    pub fn connect(&self) -> Arc<ConnectionQueue> {
        let mut connections = self.connections.lock();
        let queue = Arc::new(ConnectionQueue::new());
        let descriptors = self.descriptors.read();
        if descriptors.value.is_some() || descriptors.domain.is_some() {
            queue.enqueue(
                EventPacket::data_descriptor_changed(
                    descriptors.value.clone(),
                    descriptors.domain.clone(),
                )
                .into(),
            );
        }
        connections.retain(|c| c.strong_count() > 0);
        connections.push(Arc::downgrade(&queue));
        debug!(signal = %self.id, connections = connections.len(), "connection opened");
        queue
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().iter().filter(|c| c.strong_count() > 0).count()
    }

    /// Publish new descriptors; `None` keeps the current one.
    pub fn set_descriptors(
        &self,
        value: Option<Arc<DataDescriptor>>,
        domain: Option<Arc<DataDescriptor>>,
    ) {
        let connections = self.connections.lock();
        {
            let mut descriptors = self.descriptors.write();
            if let Some(value) = &value {
                descriptors.value = Some(value.clone());
            }
            if let Some(domain) = &domain {
                descriptors.domain = Some(domain.clone());
            }
        }
        debug!(signal = %self.id, "descriptor changed");
        let event = Packet::from(EventPacket::data_descriptor_changed(value, domain));
        for queue in connections.iter().filter_map(Weak::upgrade) {
            queue.enqueue(event.clone());
        }
    }

    /// Fan a packet out to every live connection.
    pub fn send(&self, packet: impl Into<Packet>) {
        let packet = packet.into();
        let connections = self.connections.lock();
        for queue in connections.iter().filter_map(Weak::upgrade) {
            queue.enqueue(packet.clone());
        }
    }

    fn require_value_descriptor(&self) -> Result<Arc<DataDescriptor>> {
        self.value_descriptor().ok_or_else(|| {
            ReaderError::invalid_descriptor(format!("signal '{}' has no value descriptor", self.id))
        })
    }

    /// Send explicit values with an implicit domain packet starting at `domain_offset`.
    pub fn send_samples<T: Sample>(&self, values: &[T], domain_offset: Scalar) -> Result<()> {
        let value = self.require_value_descriptor()?;
        let domain = match self.domain_descriptor() {
            Some(domain) => {
                Some(Arc::new(DataPacket::implicit(domain, values.len(), domain_offset, None)?))
            }
            None => None,
        };
        self.send(DataPacket::from_samples(value, values, domain)?);
        Ok(())
    }

    /// Send explicit values together with explicit domain values.
    pub fn send_with_domain<T: Sample, D: Sample>(&self, values: &[T], domain: &[D]) -> Result<()> {
        let value = self.require_value_descriptor()?;
        let domain_descriptor = self.domain_descriptor().ok_or_else(|| {
            ReaderError::invalid_descriptor(format!(
                "signal '{}' has no domain descriptor",
                self.id
            ))
        })?;
        let domain = Arc::new(DataPacket::from_samples(domain_descriptor, domain, None)?);
        self.send(DataPacket::from_samples(value, values, Some(domain))?);
        Ok(())
    }
}

/// A consumer-side port that can be (re)connected to a signal.
#[derive(Debug)]
pub struct InputPort {
    id: String,
    connection: Mutex<Option<(Arc<Signal>, Arc<ConnectionQueue>)>>,
}

impl InputPort {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(InputPort { id: id.into(), connection: Mutex::new(None) })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connect(&self, signal: &Arc<Signal>) {
        let queue = signal.connect();
        debug!(port = %self.id, signal = %signal.id(), "input port connected");
        *self.connection.lock() = Some((signal.clone(), queue));
    }

    pub fn disconnect(&self) {
        *self.connection.lock() = None;
    }

    pub fn signal(&self) -> Option<Arc<Signal>> {
        self.connection.lock().as_ref().map(|(signal, _)| signal.clone())
    }

    pub fn connection(&self) -> Option<Arc<ConnectionQueue>> {
        self.connection.lock().as_ref().map(|(_, queue)| queue.clone())
    }
}

/// Where a reader takes its packets from.
#[derive(Debug, Clone)]
pub enum ReaderSource {
    Signal(Arc<Signal>),
    InputPort(Arc<InputPort>),
}

impl ReaderSource {
    /// Identifier used in multi-reader status maps.
    pub fn id(&self) -> String {
        match self {
            ReaderSource::Signal(signal) => signal.id().to_string(),
            ReaderSource::InputPort(port) => {
                port.signal().map_or_else(|| port.id().to_string(), |s| s.id().to_string())
            }
        }
    }
}

impl From<Arc<Signal>> for ReaderSource {
    fn from(signal: Arc<Signal>) -> Self {
        ReaderSource::Signal(signal)
    }
}

impl From<&Arc<Signal>> for ReaderSource {
    fn from(signal: &Arc<Signal>) -> Self {
        ReaderSource::Signal(signal.clone())
    }
}

impl From<Arc<InputPort>> for ReaderSource {
    fn from(port: Arc<InputPort>) -> Self {
        ReaderSource::InputPort(port)
    }
}

impl From<&Arc<InputPort>> for ReaderSource {
    fn from(port: &Arc<InputPort>) -> Self {
        ReaderSource::InputPort(port.clone())
    }
}
