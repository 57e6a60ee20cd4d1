#![cfg(feature = "reqwest")]

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use httpmock::prelude::*;
use lfsync_store::Oid;
use lfsync_transfer::{
    Action, BatchApi, BatchAuthorizer, Direction, HttpClient, LFS_MEDIA_TYPE, ObjectSpec, ReqwestClient,
    TransferError,
};
use serde_json::json;

const OID_A: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
const OID_B: &str = "486ea46224d1bb4fb680f34f7c9ad96a8f24ec88be73ea8e5a6c65260e9cb8a7";
const OID_C: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

fn spec(oid: &str, size: u64) -> ObjectSpec {
    ObjectSpec {
        oid: oid.parse::<Oid>().unwrap(),
        size,
    }
}

#[tokio::test]
async fn batch_api_maps_per_object_results() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/repo/objects/batch")
            .header("accept", LFS_MEDIA_TYPE)
            .header("authorization", "Bearer token");
        then.status(200)
            .header("content-type", LFS_MEDIA_TYPE)
            .json_body(json!({
                "objects": [
                    {
                        "oid": OID_A,
                        "size": 5,
                        "actions": {
                            "upload": {
                                "href": "https://storage.example.com/a",
                                "header": { "x-signature": "abc" },
                                "expires_at": "2099-01-01T00:00:00Z"
                            }
                        }
                    },
                    { "oid": OID_B, "size": 5 },
                    {
                        "oid": OID_C,
                        "size": 0,
                        "error": { "code": 422, "message": "object too large" }
                    }
                ]
            }));
    });

    let api = BatchApi::new(server.url("/repo/")).header("authorization", "Bearer token");
    let objects = [spec(OID_A, 5), spec(OID_B, 5), spec(OID_C, 0)];
    let authorization = api.authorize(Direction::Upload, &objects).await.unwrap();
    mock.assert();

    let a = authorization[&objects[0].oid].as_ref().unwrap();
    let upload = a.action("upload").unwrap();
    assert_eq!(upload.href, "https://storage.example.com/a");
    assert_eq!(upload.headers["x-signature"], "abc");
    assert!(!upload.is_expired());

    let b = authorization[&objects[1].oid].as_ref().unwrap();
    assert!(b.actions.is_empty());

    let c = authorization[&objects[2].oid].as_ref().unwrap_err();
    assert_eq!(c.code, 422);
    assert_eq!(c.message, "object too large");
}

#[tokio::test]
async fn batch_api_reports_objects_missing_from_response() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/objects/batch");
        then.status(200).json_body(json!({ "objects": [] }));
    });

    let api = BatchApi::new(server.base_url());
    let objects = [spec(OID_A, 5)];
    let authorization = api.authorize(Direction::Download, &objects).await.unwrap();
    let error = authorization[&objects[0].oid].as_ref().unwrap_err();
    assert_eq!(error.code, 404);
}

#[tokio::test]
async fn batch_api_request_failure_fails_batch() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/objects/batch");
        then.status(401)
            .json_body(json!({ "message": "credentials required" }));
    });

    let api = BatchApi::new(server.base_url());
    let err = api
        .authorize(Direction::Upload, &[spec(OID_A, 5)])
        .await
        .unwrap_err();
    match &err {
        TransferError::Authorization(message) => assert!(message.contains("credentials required")),
        other => panic!("expected Authorization, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn reqwest_client_sends_action_headers() {
    let server = MockServer::start_async().await;
    let get = server.mock(|when, then| {
        when.method(GET).path("/objects/a").header("x-signature", "abc");
        then.status(200).body("hello");
    });
    let put = server.mock(|when, then| {
        when.method(PUT)
            .path("/objects/a")
            .header("x-signature", "abc")
            .body("hello");
        then.status(200);
    });
    let verify = server.mock(|when, then| {
        when.method(POST)
            .path("/verify")
            .header("content-type", LFS_MEDIA_TYPE);
        then.status(200);
    });

    let client = ReqwestClient::new();
    let action = Action::new(server.url("/objects/a")).with_header("x-signature", "abc");

    let mut body = Vec::new();
    let mut chunks = client.get(&action).await.unwrap();
    while let Some(chunk) = chunks.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"hello");

    let upload = stream::iter([
        Ok::<_, std::io::Error>(Bytes::from_static(b"hel")),
        Ok(Bytes::from_static(b"lo")),
    ]);
    client.put(&action, Box::pin(upload), 5).await.unwrap();

    client
        .verify(&Action::new(server.url("/verify")), &spec(OID_A, 5))
        .await
        .unwrap();

    get.assert();
    put.assert();
    verify.assert();
}

#[tokio::test]
async fn reqwest_client_maps_error_status() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/gone");
        then.status(404);
    });

    let client = ReqwestClient::new();
    assert!(client.get(&Action::new(server.url("/gone"))).await.is_err());
}
