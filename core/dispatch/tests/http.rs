// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use serde_json::json;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use probe_compile::Protocol;
use probe_descriptor::{MethodDescriptor, StreamingMode};
use probe_dispatch::{Channel, DispatchError, HttpChannel};

fn ping_method() -> MethodDescriptor {
    MethodDescriptor {
        service: "demo.Echo".to_string(),
        name: "Ping".to_string(),
        input_type: "demo.Ping".to_string(),
        output_type: "demo.Pong".to_string(),
        mode: StreamingMode::Unary,
    }
}

#[tokio::test]
async fn test_twirp_unary_exchange_round_trips() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/twirp/demo.Echo/Ping"))
        .and(header("content-type", "application/protobuf"))
        .and(header("authorization", "bearer t"))
        .and(body_string("ping"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"pong".to_vec())
                .insert_header("x-request-id", "abc"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let channel = HttpChannel::new(Protocol::Twirp, server.uri()).unwrap();
    let reply = channel
        .unary(
            &ping_method(),
            Bytes::from_static(b"ping"),
            &[("authorization".to_string(), "bearer t".to_string())],
        )
        .await
        .unwrap();

    assert_eq!(reply.payload, Bytes::from_static(b"pong"));
    assert!(
        reply
            .metadata
            .iter()
            .any(|(k, v)| k == "x-request-id" && v == "abc")
    );
}

#[tokio::test]
async fn test_twirp_error_status_maps_to_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/twirp/demo.Echo/Ping"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "msg": "no such user" })))
        .mount(&server)
        .await;

    let channel = HttpChannel::new(Protocol::Twirp, server.uri()).unwrap();
    let err = channel
        .unary(&ping_method(), Bytes::new(), &[])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DispatchError::Protocol {
            code: "404".to_string(),
            message: "no such user".to_string(),
        }
    );
}

#[tokio::test]
async fn test_twirp_error_without_json_body_falls_back_to_status_line() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/twirp/demo.Echo/Ping"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let channel = HttpChannel::new(Protocol::Twirp, server.uri()).unwrap();
    let err = channel
        .unary(&ping_method(), Bytes::new(), &[])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DispatchError::Protocol {
            code: "500".to_string(),
            message: "HTTP 500 Internal Server Error".to_string(),
        }
    );
}
