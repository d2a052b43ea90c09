//! In-memory media engine for Room Controller testing.
//!
//! `MockMediaEngine` implements the media adapter traits without any RTP.
//! It can be configured to:
//! - Fail router, transport, connect, produce, consume or resume calls
//! - Add latency to the slow calls (router/transport creation, produce, consume)
//!
//! Closing cascades like a real engine: router -> transports -> producers and
//! consumers, and producer -> its consumers. Every object created is tracked
//! so tests can assert nothing leaked.
//!
//! # Example
//!
//! ```rust,ignore
//! use rc_test_utils::MockMediaEngine;
//!
//! let engine = MockMediaEngine::builder()
//!     .latency(Duration::from_millis(20))
//!     .fail_consume()
//!     .build();
//!
//! let registry = RoomRegistry::new(engine.as_engine(), RoomSettings::default());
//! // ... drive the registry ...
//! assert_eq!(engine.live_transports(), 0);
//! ```

use async_trait::async_trait;
use common::types::MediaKind;
use rc_service::media::{
    AppData, CloseSignal, CloseTrigger, Consumer, EngineError, MediaEngine, Producer, Router,
    RtpCodecCapability, WebRtcTransport, WebRtcTransportOptions,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct MockConfig {
    fail_router_creation: bool,
    fail_transport_creation: bool,
    fail_connect: bool,
    fail_produce: bool,
    fail_consume: bool,
    fail_resume: bool,
    latency: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    next_id: AtomicU64,
    routers_created: AtomicUsize,
    routers: Mutex<HashMap<String, Arc<MockRouter>>>,
    transports: Mutex<HashMap<String, Arc<MockTransport>>>,
    producers: Mutex<HashMap<String, Arc<MockProducer>>>,
    consumers: Mutex<HashMap<String, Arc<MockConsumer>>>,
}

impl MockState {
    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n}")
    }

    fn live_producer(&self, producer_id: &str) -> Option<Arc<MockProducer>> {
        self.producers
            .lock()
            .unwrap()
            .get(producer_id)
            .filter(|p| !p.trigger.is_fired())
            .cloned()
    }
}

/// Mock media engine. Clones share state.
#[derive(Clone, Default)]
pub struct MockMediaEngine {
    config: Arc<MockConfig>,
    state: Arc<MockState>,
}

impl MockMediaEngine {
    /// Create a new `MockMediaEngine` builder.
    #[must_use]
    pub fn builder() -> MockMediaEngineBuilder {
        MockMediaEngineBuilder::default()
    }

    /// An engine where every call succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This engine as the trait object the registry takes.
    #[must_use]
    pub fn as_engine(&self) -> Arc<dyn MediaEngine> {
        Arc::new(self.clone())
    }

    #[must_use]
    pub fn routers_created(&self) -> usize {
        self.state.routers_created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn live_routers(&self) -> usize {
        count_live(&self.state.routers, |r| &r.trigger)
    }

    #[must_use]
    pub fn live_transports(&self) -> usize {
        count_live(&self.state.transports, |t| &t.trigger)
    }

    #[must_use]
    pub fn live_producers(&self) -> usize {
        count_live(&self.state.producers, |p| &p.trigger)
    }

    #[must_use]
    pub fn live_consumers(&self) -> usize {
        count_live(&self.state.consumers, |c| &c.trigger)
    }

    /// Whether the transport has completed `connect`.
    #[must_use]
    pub fn transport_connected(&self, transport_id: &str) -> Option<bool> {
        self.state
            .transports
            .lock()
            .unwrap()
            .get(transport_id)
            .map(|t| t.connected.load(Ordering::SeqCst))
    }

    /// Paused state of a consumer, if it exists.
    #[must_use]
    pub fn consumer_paused(&self, consumer_id: &str) -> Option<bool> {
        self.state
            .consumers
            .lock()
            .unwrap()
            .get(consumer_id)
            .map(|c| c.paused.load(Ordering::SeqCst))
    }

    /// `appData` the consumer was created with.
    #[must_use]
    pub fn consumer_app_data(&self, consumer_id: &str) -> Option<AppData> {
        self.state
            .consumers
            .lock()
            .unwrap()
            .get(consumer_id)
            .map(|c| c.app_data.clone())
    }

    /// `appData` the producer was created with.
    #[must_use]
    pub fn producer_app_data(&self, producer_id: &str) -> Option<AppData> {
        self.state
            .producers
            .lock()
            .unwrap()
            .get(producer_id)
            .map(|p| p.app_data.clone())
    }

    /// Simulate the engine closing a transport on its own (e.g. ICE failure).
    pub fn close_transport(&self, transport_id: &str) {
        if let Some(transport) = self.state.transports.lock().unwrap().get(transport_id) {
            transport.trigger.fire();
        }
    }

    /// Simulate the engine closing a producer on its own.
    pub fn close_producer(&self, producer_id: &str) {
        if let Some(producer) = self.state.producers.lock().unwrap().get(producer_id) {
            producer.trigger.fire();
        }
    }

    async fn delay(&self) {
        if let Some(latency) = self.config.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn count_live<T>(map: &Mutex<HashMap<String, Arc<T>>>, trigger: impl Fn(&T) -> &CloseTrigger) -> usize {
    map.lock()
        .unwrap()
        .values()
        .filter(|v| !trigger(&**v).is_fired())
        .count()
}

fn rejected(operation: &'static str) -> EngineError {
    EngineError::Rejected {
        operation,
        reason: "mock configured to fail".to_string(),
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn create_router(
        &self,
        codecs: &[RtpCodecCapability],
    ) -> Result<Arc<dyn Router>, EngineError> {
        self.delay().await;
        if self.config.fail_router_creation {
            return Err(EngineError::Unavailable("mock has no workers".to_string()));
        }

        let router = Arc::new(MockRouter {
            id: self.state.next_id("router"),
            codecs: codecs.to_vec(),
            trigger: CloseTrigger::new(),
            engine: self.clone(),
        });
        self.state.routers_created.fetch_add(1, Ordering::SeqCst);
        self.state
            .routers
            .lock()
            .unwrap()
            .insert(router.id.clone(), Arc::clone(&router));
        Ok(router)
    }
}

struct MockRouter {
    id: String,
    codecs: Vec<RtpCodecCapability>,
    trigger: CloseTrigger,
    engine: MockMediaEngine,
}

impl MockRouter {
    fn mime_type_for(&self, kind: MediaKind) -> Option<&str> {
        self.codecs
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.mime_type.as_str())
    }
}

#[async_trait]
impl Router for MockRouter {
    fn id(&self) -> &str {
        &self.id
    }

    fn rtp_capabilities(&self) -> Value {
        json!({
            "codecs": self.codecs,
            "headerExtensions": [],
        })
    }

    fn can_consume(&self, producer_id: &str, rtp_capabilities: &Value) -> bool {
        let Some(producer) = self.engine.state.live_producer(producer_id) else {
            return false;
        };
        let Some(mime_type) = self.mime_type_for(producer.kind) else {
            return false;
        };

        rtp_capabilities
            .get("codecs")
            .and_then(Value::as_array)
            .is_some_and(|codecs| {
                codecs.iter().any(|codec| {
                    codec
                        .get("mimeType")
                        .and_then(Value::as_str)
                        .is_some_and(|m| m.eq_ignore_ascii_case(mime_type))
                })
            })
    }

    async fn create_webrtc_transport(
        &self,
        options: &WebRtcTransportOptions,
    ) -> Result<Arc<dyn WebRtcTransport>, EngineError> {
        self.engine.delay().await;
        if self.engine.config.fail_transport_creation {
            return Err(rejected("create_transport"));
        }
        if self.trigger.is_fired() {
            return Err(EngineError::Closed(format!("router {}", self.id)));
        }

        let id = self.engine.state.next_id("transport");
        let candidates: Vec<Value> = options
            .listen_ips
            .iter()
            .map(|listen| {
                json!({
                    "foundation": "udpcandidate",
                    "ip": listen.announced_ip.unwrap_or(listen.ip).to_string(),
                    "port": 40000,
                    "priority": 1_076_302_079_u64,
                    "protocol": if options.prefer_udp { "udp" } else { "tcp" },
                    "type": "host",
                })
            })
            .collect();

        let transport = Arc::new(MockTransport {
            ice_parameters: json!({
                "usernameFragment": format!("ufrag-{id}"),
                "password": format!("pwd-{id}"),
                "iceLite": true,
            }),
            ice_candidates: Value::Array(candidates),
            dtls_parameters: json!({
                "role": "auto",
                "fingerprints": [{"algorithm": "sha-256", "value": format!("AA:BB:{id}")}],
            }),
            id,
            trigger: self.trigger.child(),
            connected: AtomicBool::new(false),
            router_codecs: self.codecs.clone(),
            engine: self.engine.clone(),
        });
        self.engine
            .state
            .transports
            .lock()
            .unwrap()
            .insert(transport.id.clone(), Arc::clone(&transport));
        Ok(transport)
    }

    fn close(&self) {
        self.trigger.fire();
    }
}

struct MockTransport {
    id: String,
    ice_parameters: Value,
    ice_candidates: Value,
    dtls_parameters: Value,
    trigger: CloseTrigger,
    connected: AtomicBool,
    router_codecs: Vec<RtpCodecCapability>,
    engine: MockMediaEngine,
}

impl MockTransport {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.trigger.is_fired() {
            Err(EngineError::Closed(format!("transport {}", self.id)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WebRtcTransport for MockTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn ice_parameters(&self) -> Value {
        self.ice_parameters.clone()
    }

    fn ice_candidates(&self) -> Value {
        self.ice_candidates.clone()
    }

    fn dtls_parameters(&self) -> Value {
        self.dtls_parameters.clone()
    }

    async fn connect(&self, dtls_parameters: Value) -> Result<(), EngineError> {
        if self.engine.config.fail_connect {
            return Err(rejected("connect"));
        }
        self.ensure_open()?;
        if dtls_parameters.get("fingerprints").is_none() {
            return Err(EngineError::Rejected {
                operation: "connect",
                reason: "missing fingerprints".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        _rtp_parameters: Value,
        app_data: AppData,
    ) -> Result<Arc<dyn Producer>, EngineError> {
        self.engine.delay().await;
        if self.engine.config.fail_produce {
            return Err(rejected("produce"));
        }
        self.ensure_open()?;

        let producer = Arc::new(MockProducer {
            id: self.engine.state.next_id("producer"),
            kind,
            app_data,
            trigger: self.trigger.child(),
        });
        self.engine
            .state
            .producers
            .lock()
            .unwrap()
            .insert(producer.id.clone(), Arc::clone(&producer));
        Ok(producer)
    }

    async fn consume(
        &self,
        producer_id: &str,
        _rtp_capabilities: Value,
        paused: bool,
        app_data: AppData,
    ) -> Result<Arc<dyn Consumer>, EngineError> {
        self.engine.delay().await;
        if self.engine.config.fail_consume {
            return Err(rejected("consume"));
        }
        self.ensure_open()?;

        let producer = self
            .engine
            .state
            .live_producer(producer_id)
            .ok_or_else(|| EngineError::Rejected {
                operation: "consume",
                reason: format!("unknown producer {producer_id}"),
            })?;

        let mime_type = self
            .router_codecs
            .iter()
            .find(|c| c.kind == producer.kind)
            .map_or("", |c| c.mime_type.as_str());

        let consumer = Arc::new(MockConsumer {
            id: self.engine.state.next_id("consumer"),
            producer_id: producer_id.to_string(),
            kind: producer.kind,
            rtp_parameters: json!({
                "codecs": [{"mimeType": mime_type}],
                "encodings": [{"ssrc": self.engine.state.next_id.load(Ordering::Relaxed)}],
            }),
            paused: AtomicBool::new(paused),
            app_data,
            trigger: self.trigger.child(),
            fail_resume: self.engine.config.fail_resume,
        });

        // Closing the producer closes its consumers
        let producer_closed = producer.trigger.signal();
        let consumer_trigger = consumer.trigger.clone();
        let consumer_closed = consumer.trigger.signal();
        tokio::spawn(async move {
            tokio::select! {
                () = producer_closed.closed() => consumer_trigger.fire(),
                () = consumer_closed.closed() => {}
            }
        });

        self.engine
            .state
            .consumers
            .lock()
            .unwrap()
            .insert(consumer.id.clone(), Arc::clone(&consumer));
        Ok(consumer)
    }

    fn close(&self) {
        self.trigger.fire();
    }

    fn closed(&self) -> CloseSignal {
        self.trigger.signal()
    }
}

struct MockProducer {
    id: String,
    kind: MediaKind,
    app_data: AppData,
    trigger: CloseTrigger,
}

impl Producer for MockProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn close(&self) {
        self.trigger.fire();
    }

    fn closed(&self) -> CloseSignal {
        self.trigger.signal()
    }
}

struct MockConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    rtp_parameters: Value,
    paused: AtomicBool,
    app_data: AppData,
    trigger: CloseTrigger,
    fail_resume: bool,
}

#[async_trait]
impl Consumer for MockConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn producer_id(&self) -> &str {
        &self.producer_id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn rtp_parameters(&self) -> Value {
        self.rtp_parameters.clone()
    }

    fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), EngineError> {
        if self.trigger.is_fired() {
            return Err(EngineError::Closed(format!("consumer {}", self.id)));
        }
        if self.fail_resume {
            return Err(rejected("resume"));
        }
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.trigger.fire();
    }

    fn closed(&self) -> CloseSignal {
        self.trigger.signal()
    }
}

/// Builder for [`MockMediaEngine`].
#[derive(Debug, Default)]
pub struct MockMediaEngineBuilder {
    config: MockConfig,
}

impl MockMediaEngineBuilder {
    /// `create_router` returns `Unavailable`.
    #[must_use]
    pub fn fail_router_creation(mut self) -> Self {
        self.config.fail_router_creation = true;
        self
    }

    #[must_use]
    pub fn fail_transport_creation(mut self) -> Self {
        self.config.fail_transport_creation = true;
        self
    }

    #[must_use]
    pub fn fail_connect(mut self) -> Self {
        self.config.fail_connect = true;
        self
    }

    #[must_use]
    pub fn fail_produce(mut self) -> Self {
        self.config.fail_produce = true;
        self
    }

    #[must_use]
    pub fn fail_consume(mut self) -> Self {
        self.config.fail_consume = true;
        self
    }

    #[must_use]
    pub fn fail_resume(mut self) -> Self {
        self.config.fail_resume = true;
        self
    }

    /// Delay router/transport creation, produce and consume.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn build(self) -> MockMediaEngine {
        MockMediaEngine {
            config: Arc::new(self.config),
            state: Arc::new(MockState::default()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rc_service::media::media_codecs;

    async fn router(engine: &MockMediaEngine) -> Arc<dyn Router> {
        engine.create_router(&media_codecs(1000)).await.unwrap()
    }

    #[tokio::test]
    async fn test_router_close_cascades() {
        let engine = MockMediaEngine::new();
        let router = router(&engine).await;
        let transport = router
            .create_webrtc_transport(&WebRtcTransportOptions::default())
            .await
            .unwrap();
        let producer = transport
            .produce(MediaKind::Audio, json!({}), AppData::new())
            .await
            .unwrap();

        assert_eq!(engine.live_transports(), 1);
        assert_eq!(engine.live_producers(), 1);

        router.close();

        assert_eq!(engine.live_routers(), 0);
        assert_eq!(engine.live_transports(), 0);
        assert!(producer.closed().is_closed());
    }

    #[tokio::test]
    async fn test_producer_close_closes_consumers() {
        let engine = MockMediaEngine::new();
        let router = router(&engine).await;
        let options = WebRtcTransportOptions::default();
        let send = router.create_webrtc_transport(&options).await.unwrap();
        let recv = router.create_webrtc_transport(&options).await.unwrap();

        let producer = send
            .produce(MediaKind::Video, json!({}), AppData::new())
            .await
            .unwrap();
        let consumer = recv
            .consume(producer.id(), json!({}), true, AppData::new())
            .await
            .unwrap();
        assert!(consumer.paused());

        producer.close();
        tokio::time::timeout(Duration::from_secs(1), consumer.closed().closed())
            .await
            .unwrap();
        assert!(!recv.closed().is_closed());
    }

    #[tokio::test]
    async fn test_can_consume_matches_mime_type() {
        let engine = MockMediaEngine::new();
        let router = router(&engine).await;
        let transport = router
            .create_webrtc_transport(&WebRtcTransportOptions::default())
            .await
            .unwrap();
        let producer = transport
            .produce(MediaKind::Video, json!({}), AppData::new())
            .await
            .unwrap();

        let vp8 = json!({"codecs": [{"mimeType": "video/vp8"}]});
        let h264 = json!({"codecs": [{"mimeType": "video/H264"}]});
        assert!(router.can_consume(producer.id(), &vp8));
        assert!(!router.can_consume(producer.id(), &h264));
        assert!(!router.can_consume("producer-missing", &vp8));
    }

    #[tokio::test]
    async fn test_configured_failures() {
        let engine = MockMediaEngine::builder().fail_router_creation().build();
        let result = engine.create_router(&media_codecs(1000)).await;
        assert!(matches!(result, Err(EngineError::Unavailable(_))));
        assert_eq!(engine.routers_created(), 0);
    }
}
