// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use parking_lot::Mutex;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use tokio::sync::mpsc;
use tokio::time;

use probe_descriptor::{DescriptorRegistry, MessageDescriptor, MethodDescriptor, Value};
use probe_dispatch::{
    CallStatus, Channel, Dispatcher, DispatchError, HostBridge, HostChannel, MessageCodec,
    UnaryReply,
};
use probe_memory::{AdaptiveMemory, InMemoryStorage};

fn registry() -> Arc<DescriptorRegistry> {
    let message = |name: &str| DescriptorProto {
        name: Some(name.to_string()),
        field: vec![FieldDescriptorProto {
            name: Some("text".to_string()),
            number: Some(1),
            label: Some(Label::Optional as i32),
            r#type: Some(Type::String as i32),
            ..Default::default()
        }],
        ..Default::default()
    };
    let method = |name: &str, client: bool, server: bool| MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(".demo.Ping".to_string()),
        output_type: Some(".demo.Pong".to_string()),
        client_streaming: Some(client),
        server_streaming: Some(server),
        ..Default::default()
    };
    let set = FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("demo.proto".to_string()),
            package: Some("demo".to_string()),
            message_type: vec![message("Ping"), message("Pong")],
            service: vec![ServiceDescriptorProto {
                name: Some("Echo".to_string()),
                method: vec![
                    method("Ping", false, false),
                    method("Watch", false, true),
                    method("Push", true, false),
                    method("Chat", true, true),
                ],
                ..Default::default()
            }],
            ..Default::default()
        }],
    };
    Arc::new(DescriptorRegistry::from_descriptor_set(&set).unwrap())
}

fn find_method(registry: &DescriptorRegistry, name: &str) -> MethodDescriptor {
    registry.services()[0]
        .methods
        .iter()
        .find(|m| m.name == name)
        .unwrap()
        .clone()
}

fn text_message(text: &str) -> Value {
    Value::Message(vec![("text".to_string(), Value::String(text.to_string()))])
}

/// JSON stand-in for the real wire codec; the dispatcher treats payload
/// bytes as opaque either way.
struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, _message: &MessageDescriptor, value: &Value) -> Result<Bytes, DispatchError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| DispatchError::Codec(e.to_string()))
    }

    fn decode(&self, _message: &MessageDescriptor, payload: &[u8]) -> Result<Value, DispatchError> {
        serde_json::from_slice(payload).map_err(|e| DispatchError::Codec(e.to_string()))
    }
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

#[derive(Default)]
struct FakeBridge {
    unary_response: Mutex<Option<Result<Vec<u8>, String>>>,
    calls: Mutex<Vec<String>>,
    opens: Mutex<Vec<(String, String)>>,
    cancels: Mutex<Vec<String>>,
    topics: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
    unsubscribed: Mutex<Vec<String>>,
    open_never_completes: AtomicBool,
}

impl FakeBridge {
    fn emit(&self, topic: &str, payload: String) {
        if let Some(tx) = self.topics.lock().get(topic) {
            let _ = tx.send(payload);
        }
    }

    fn opened_stream_id(&self) -> Option<String> {
        self.opens.lock().first().map(|(_, id)| id.clone())
    }

    /// Drop every topic sender, as a host going away would.
    fn detach(&self) {
        self.topics.lock().clear();
    }
}

#[async_trait]
impl HostBridge for FakeBridge {
    async fn call(&self, method: &str, _payload: Vec<u8>) -> Result<Vec<u8>, DispatchError> {
        self.calls.lock().push(method.to_string());
        match self.unary_response.lock().take() {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(message)) => Err(DispatchError::transport("host", message)),
            None => Err(DispatchError::transport("host", "no scripted response")),
        }
    }

    async fn open_stream(
        &self,
        method: &str,
        stream_id: &str,
        _payload: Vec<u8>,
    ) -> Result<(), DispatchError> {
        self.opens
            .lock()
            .push((method.to_string(), stream_id.to_string()));
        if self.open_never_completes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn cancel_stream(&self, stream_id: &str) -> Result<(), DispatchError> {
        self.cancels.lock().push(stream_id.to_string());
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.lock().insert(topic.to_string(), tx);
        rx
    }

    fn unsubscribe(&self, topic: &str) {
        self.topics.lock().remove(topic);
        self.unsubscribed.lock().push(topic.to_string());
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}

async fn dispatcher(registry: Arc<DescriptorRegistry>) -> (Dispatcher, Arc<AdaptiveMemory>) {
    let memory = Arc::new(AdaptiveMemory::load(Arc::new(InMemoryStorage::new())).await);
    (
        Dispatcher::new(registry, Arc::new(JsonCodec), memory.clone()),
        memory,
    )
}

#[tokio::test(start_paused = true)]
async fn test_host_unary_call_completes() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let bridge = Arc::new(FakeBridge::default());
    *bridge.unary_response.lock() = Some(Ok(encode(&text_message("pong"))));
    let channel = Arc::new(HostChannel::new(bridge.clone()));

    let handle = dispatcher
        .dispatch(
            &find_method(&registry, "Ping"),
            text_message("hi"),
            channel,
            vec![],
            None,
        )
        .unwrap();
    handle.wait().await;

    let call = handle.snapshot();
    assert_eq!(call.status, CallStatus::Complete);
    assert_eq!(call.output, Some(text_message("pong")));
    assert_eq!(call.error, None);
    assert_eq!(bridge.calls.lock().as_slice(), ["/demo.Echo/Ping"]);

    // Request and response both fed the adaptive memory.
    assert_eq!(
        memory.best_for_field("demo.Ping", "text"),
        Some(Value::String("hi".to_string()))
    );
    assert_eq!(
        memory.best_for_field("demo.Pong", "text"),
        Some(Value::String("pong".to_string()))
    );
    memory.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_unary_transport_error_fails_call() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let bridge = Arc::new(FakeBridge::default());
    *bridge.unary_response.lock() = Some(Err("bridge detached".to_string()));
    let channel = Arc::new(HostChannel::new(bridge));

    let handle = dispatcher
        .dispatch(
            &find_method(&registry, "Ping"),
            text_message("hi"),
            channel,
            vec![],
            None,
        )
        .unwrap();
    handle.wait().await;

    let call = handle.snapshot();
    assert_eq!(call.status, CallStatus::Failed);
    assert_eq!(
        call.error,
        Some(DispatchError::transport("host", "bridge detached"))
    );
    assert_eq!(call.output, None);
    memory.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_modes_fail_before_any_host_activity() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let bridge = Arc::new(FakeBridge::default());
    let channel = Arc::new(HostChannel::new(bridge.clone()));

    for name in ["Push", "Chat"] {
        let err = dispatcher
            .dispatch(
                &find_method(&registry, name),
                text_message("hi"),
                channel.clone(),
                vec![],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unsupported(_)));
    }

    assert!(bridge.calls.lock().is_empty());
    assert!(bridge.opens.lock().is_empty());
    assert!(bridge.topics.lock().is_empty());
    memory.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_host_server_stream_delivers_messages_then_completes() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let bridge = Arc::new(FakeBridge::default());
    let channel = Arc::new(HostChannel::new(bridge.clone()));

    let handle = dispatcher
        .dispatch(
            &find_method(&registry, "Watch"),
            text_message("hi"),
            channel,
            vec![],
            None,
        )
        .unwrap();

    eventually(|| bridge.opened_stream_id().is_some()).await;
    let stream_id = bridge.opened_stream_id().unwrap();
    let topic = format!("stream:{stream_id}");

    bridge.emit(&topic, BASE64_STANDARD.encode(encode(&text_message("one"))));
    eventually(|| handle.snapshot().output == Some(text_message("one"))).await;

    bridge.emit(&topic, BASE64_STANDARD.encode(encode(&text_message("two"))));
    eventually(|| handle.snapshot().output == Some(text_message("two"))).await;

    bridge.emit(&format!("stream:{stream_id}:end"), String::new());
    handle.wait().await;

    assert_eq!(handle.status(), CallStatus::Complete);
    // All three topic subscriptions are released.
    eventually(|| bridge.unsubscribed.lock().len() == 3).await;
    assert!(bridge.cancels.lock().is_empty());
    memory.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_host_stream_error_event_fails_call() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let bridge = Arc::new(FakeBridge::default());
    let channel = Arc::new(HostChannel::new(bridge.clone()));

    let handle = dispatcher
        .dispatch(
            &find_method(&registry, "Watch"),
            text_message("hi"),
            channel,
            vec![],
            None,
        )
        .unwrap();

    eventually(|| bridge.opened_stream_id().is_some()).await;
    let stream_id = bridge.opened_stream_id().unwrap();
    bridge.emit(&format!("stream:{stream_id}:error"), "boom".to_string());
    handle.wait().await;

    let call = handle.snapshot();
    assert_eq!(call.status, CallStatus::Failed);
    assert_eq!(call.error, Some(DispatchError::transport("host", "boom")));
    memory.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_host_stream_issues_one_cancel_command() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let bridge = Arc::new(FakeBridge::default());
    let channel = Arc::new(HostChannel::new(bridge.clone()));

    let handle = dispatcher
        .dispatch(
            &find_method(&registry, "Watch"),
            text_message("hi"),
            channel,
            vec![],
            None,
        )
        .unwrap();

    eventually(|| bridge.opened_stream_id().is_some()).await;
    let stream_id = bridge.opened_stream_id().unwrap();
    let topic = format!("stream:{stream_id}");

    bridge.emit(&topic, BASE64_STANDARD.encode(encode(&text_message("one"))));
    eventually(|| handle.snapshot().output == Some(text_message("one"))).await;

    handle.cancel();
    handle.wait().await;
    assert_eq!(handle.status(), CallStatus::Cancelled);
    // Cancellation is not an error.
    assert_eq!(handle.snapshot().error, None);

    eventually(|| bridge.cancels.lock().len() == 1).await;
    eventually(|| bridge.unsubscribed.lock().len() == 3).await;

    // Events after cancellation are not processed; a second cancel is a
    // no-op.
    bridge.emit(&topic, BASE64_STANDARD.encode(encode(&text_message("late"))));
    handle.cancel();
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.snapshot().output, Some(text_message("one")));
    assert_eq!(bridge.cancels.lock().len(), 1);
    memory.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_stream_open_releases_bridge_resources() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let bridge = Arc::new(FakeBridge::default());
    bridge.open_never_completes.store(true, Ordering::SeqCst);
    let channel = Arc::new(HostChannel::new(bridge.clone()));

    let handle = dispatcher
        .dispatch(
            &find_method(&registry, "Watch"),
            text_message("hi"),
            channel,
            vec![],
            None,
        )
        .unwrap();

    // The bridge has been asked to open but never answers.
    eventually(|| bridge.opened_stream_id().is_some()).await;
    handle.cancel();
    handle.wait().await;

    assert_eq!(handle.status(), CallStatus::Cancelled);
    assert_eq!(handle.snapshot().error, None);
    // The stream the host may have opened is cancelled and all three
    // topic subscriptions are released.
    assert_eq!(bridge.cancels.lock().len(), 1);
    assert_eq!(bridge.unsubscribed.lock().len(), 3);
    assert!(bridge.topics.lock().is_empty());
    memory.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_bridge_detach_fails_the_stream() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let bridge = Arc::new(FakeBridge::default());
    let channel = Arc::new(HostChannel::new(bridge.clone()));

    let handle = dispatcher
        .dispatch(
            &find_method(&registry, "Watch"),
            text_message("hi"),
            channel,
            vec![],
            None,
        )
        .unwrap();

    eventually(|| bridge.opened_stream_id().is_some()).await;
    let stream_id = bridge.opened_stream_id().unwrap();
    let topic = format!("stream:{stream_id}");

    bridge.emit(&topic, BASE64_STANDARD.encode(encode(&text_message("one"))));
    eventually(|| handle.snapshot().output == Some(text_message("one"))).await;

    // The host vanishes without an end or error event.
    bridge.detach();
    handle.wait().await;

    let call = handle.snapshot();
    assert_eq!(call.status, CallStatus::Failed);
    assert_eq!(
        call.error,
        Some(DispatchError::transport("host", "host event bus closed"))
    );
    // Messages delivered before the detach are kept.
    assert_eq!(call.output, Some(text_message("one")));
    memory.close().await;
}

struct ScriptedChannel {
    reply: Mutex<Option<Result<UnaryReply, DispatchError>>>,
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, mode: probe_descriptor::StreamingMode) -> bool {
        mode == probe_descriptor::StreamingMode::Unary
    }

    async fn unary(
        &self,
        _method: &MethodDescriptor,
        _request: Bytes,
        _metadata: &[(String, String)],
    ) -> Result<UnaryReply, DispatchError> {
        self.reply.lock().take().unwrap()
    }

    async fn server_stream(
        &self,
        _method: &MethodDescriptor,
        _request: Bytes,
        _metadata: &[(String, String)],
        _token: tokio_util::sync::CancellationToken,
    ) -> Result<probe_dispatch::ByteStream, DispatchError> {
        Err(DispatchError::Unsupported("scripted".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_unary_reply_metadata_lands_on_the_call() {
    let registry = registry();
    let (dispatcher, memory) = dispatcher(registry.clone()).await;
    let channel = Arc::new(ScriptedChannel {
        reply: Mutex::new(Some(Ok(UnaryReply {
            payload: Bytes::from(encode(&text_message("pong"))),
            metadata: vec![("x-request-id".to_string(), "abc".to_string())],
        }))),
    });

    let handle = dispatcher
        .dispatch(
            &find_method(&registry, "Ping"),
            text_message("hi"),
            channel,
            vec![("authorization".to_string(), "bearer t".to_string())],
            Some("http://localhost:8080".to_string()),
        )
        .unwrap();
    handle.wait().await;

    let call = handle.snapshot();
    assert_eq!(call.target_url.as_deref(), Some("http://localhost:8080"));
    assert_eq!(
        call.request_metadata,
        vec![("authorization".to_string(), "bearer t".to_string())]
    );
    assert_eq!(
        call.response_metadata,
        vec![("x-request-id".to_string(), "abc".to_string())]
    );
    memory.close().await;
}
