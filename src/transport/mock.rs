//! Scripted transport for tests.
//!
//! `MockTransport` replays a fixed sequence of response frames and
//! records every request written to it. `MockConnector` hands one out
//! per cycle and counts handle opens/closes so tests can assert the
//! acquire/release discipline.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::config::NodeConfig;
use crate::error::TransportError;
use crate::transport::{Connector, Transport};

/// One scripted response step.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Reply with this frame payload.
    Reply(Bytes),
    /// Simulate an exhausted read budget.
    Hang,
}

/// Shared open/close accounting across every transport a connector
/// hands out.
#[derive(Debug, Default)]
pub(crate) struct HandleCounter {
    opens: AtomicUsize,
    closes: AtomicUsize,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl HandleCounter {
    fn opened(&self) {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.concurrent.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockTransport {
    script: VecDeque<Script>,
    writes: Arc<Mutex<Vec<Bytes>>>,
    counter: Arc<HandleCounter>,
    open: bool,
}

impl MockTransport {
    pub(crate) fn new(script: Vec<Script>) -> Self {
        Self::with_shared(
            script,
            Arc::new(Mutex::new(Vec::new())),
            Arc::new(HandleCounter::default()),
        )
    }

    fn with_shared(
        script: Vec<Script>,
        writes: Arc<Mutex<Vec<Bytes>>>,
        counter: Arc<HandleCounter>,
    ) -> Self {
        counter.opened();
        Self {
            script: script.into(),
            writes,
            counter,
            open: true,
        }
    }

    pub(crate) fn writes(&self) -> Arc<Mutex<Vec<Bytes>>> {
        Arc::clone(&self.writes)
    }
}

impl Transport for MockTransport {
    fn send_frame(
        &mut self,
        payload: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            if !self.open {
                return Err(TransportError::NotConnected);
            }
            self.writes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(payload);
            Ok(())
        })
    }

    fn recv_frame(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send + '_>> {
        Box::pin(async move {
            if !self.open {
                return Err(TransportError::NotConnected);
            }
            match self.script.pop_front() {
                Some(Script::Reply(frame)) => Ok(frame),
                Some(Script::Hang) | None => Err(TransportError::Timeout { timeout_ms: 0 }),
            }
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            if self.open {
                self.open = false;
                self.counter.closed();
            }
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// What the next connect attempt should do.
#[derive(Debug, Clone)]
pub(crate) enum MockOutcome {
    /// Fail the connect (unreachable host).
    Refuse,
    /// Never complete the connect (unresponsive host).
    Stall,
    /// Hand out a transport with this script.
    Frames(Vec<Script>),
}

pub(crate) struct MockConnector {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    /// Used once explicit outcomes run out.
    default_outcome: MockOutcome,
    writes: Arc<Mutex<Vec<Bytes>>>,
    counter: Arc<HandleCounter>,
}

impl MockConnector {
    pub(crate) fn new(default_outcome: MockOutcome) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome,
            writes: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(HandleCounter::default()),
        }
    }

    /// Queues an outcome for the next connect attempt.
    pub(crate) fn push_outcome(&self, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(outcome);
    }

    pub(crate) fn counter(&self) -> Arc<HandleCounter> {
        Arc::clone(&self.counter)
    }

    pub(crate) fn writes(&self) -> Arc<Mutex<Vec<Bytes>>> {
        Arc::clone(&self.writes)
    }
}

impl Connector for MockConnector {
    fn connect<'a>(
        &'a self,
        config: &'a NodeConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Transport>, TransportError>> + Send + 'a>>
    {
        Box::pin(async move {
            let outcome = self
                .outcomes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .unwrap_or_else(|| self.default_outcome.clone());

            match outcome {
                MockOutcome::Refuse => Err(TransportError::Unreachable {
                    host: config.node_id(),
                }),
                MockOutcome::Stall => std::future::pending().await,
                MockOutcome::Frames(script) => Ok(Box::new(MockTransport::with_shared(
                    script,
                    Arc::clone(&self.writes),
                    Arc::clone(&self.counter),
                )) as Box<dyn Transport>),
            }
        })
    }
}

/// Response frame builders matching the parser formats.
pub(crate) mod frames {
    use bytes::{BufMut, Bytes, BytesMut};

    use crate::protocol::PacketType;

    fn put_string(buf: &mut BytesMut, s: &str) {
        buf.put_u8(u8::try_from(s.len()).unwrap());
        buf.put_slice(s.as_bytes());
    }

    pub(crate) fn ok() -> Bytes {
        Bytes::from_static(&[PacketType::Ok as u8])
    }

    pub(crate) fn error(message: &str) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::Error as u8);
        buf.put_slice(message.as_bytes());
        buf.freeze()
    }

    pub(crate) fn node_info(node_num: u32, firmware: &str, hw_model: &str, name: &str) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::NodeInfo as u8);
        buf.put_u32_le(node_num);
        put_string(&mut buf, firmware);
        put_string(&mut buf, hw_model);
        put_string(&mut buf, name);
        buf.put_u8(0); // no BLE block
        buf.freeze()
    }

    pub(crate) fn channels(names: &[&str]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::Channels as u8);
        buf.put_u8(u8::try_from(names.len()).unwrap());
        for name in names {
            put_string(&mut buf, name);
        }
        buf.freeze()
    }

    pub(crate) fn metrics(rssi: i16, snr_quarter_db: i16) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::Metrics as u8);
        buf.put_i16_le(rssi);
        buf.put_i16_le(snr_quarter_db);
        buf.put_u16_le(315); // 3.15% air util
        buf.put_u8(87); // battery %
        buf.put_u16_le(4012); // 4.012 V
        buf.put_i16_le(2150); // 21.5 C
        buf.put_u32_le(86400); // uptime
        buf.freeze()
    }

    pub(crate) fn routing(count: u16) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::Routing as u8);
        buf.put_u16_le(count);
        buf.freeze()
    }

    pub(crate) fn text_message(sender: u32, text: &str, rx_time: u32) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::TextMessage as u8);
        buf.put_u32_le(sender);
        buf.put_u32_le(0); // no gateway
        buf.put_u8(1); // text port
        buf.put_u32_le(rx_time);
        buf.put_slice(text.as_bytes());
        buf.freeze()
    }

    pub(crate) fn no_message() -> Bytes {
        Bytes::from_static(&[PacketType::NoMessage as u8])
    }

    /// The full happy-path poll cycle script.
    pub(crate) fn poll_cycle() -> Vec<super::Script> {
        use super::Script::Reply;
        vec![
            Reply(node_info(0xa1b2_c3d4, "2.2.27", "HELTEC_V3", "Rooftop")),
            Reply(channels(&["Primary", "Secondary"])),
            Reply(metrics(-72, 30)),
            Reply(routing(17)),
            Reply(no_message()),
        ]
    }
}
