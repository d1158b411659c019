//! End-to-end wire scenarios against a real listener on a loopback socket:
//! EthProxy login/getWork, NiceHash subscribe/authorize/push, and stale-share
//! resolution across a job rotation.

#[path = "common/mod.rs"]
mod common;

use common::{connect, sample_template, spawn_gateway, Client};

#[tokio::test]
async fn ethproxy_login_then_get_work() {
    let gateway = spawn_gateway(4_000_000_000, 64).await;
    gateway.work_source.set_template(sample_template()).await;

    let mut client = Client::new(connect(gateway.addr).await);

    client.send(r#"{"id":1,"method":"eth_submitLogin","params":["0xabc","x"]}"#).await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["jsonrpc"], "2.0");
    assert_eq!(reply["result"], true);
    assert!(reply["error"].is_null());

    client.send(r#"{"id":2,"method":"eth_getWork","params":[]}"#).await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], 2);
    let result = reply["result"].as_array().expect("result is an array");
    assert_eq!(result.len(), 4);
    assert_eq!(result[0], sample_template().header);
    assert_eq!(result[1], sample_template().seed);
    assert_eq!(result[2], sample_template().current_difficulty_hex);
    assert_eq!(result[3], sample_template().height);
}

#[tokio::test]
async fn nicehash_subscribe_then_authorize_pushes_difficulty_and_job() {
    let gateway = spawn_gateway(2, 64).await;
    let mut client = Client::new(connect(gateway.addr).await);

    client
        .send(r#"{"id":1,"method":"mining.subscribe","params":["miner/1","EthereumStratum/1.0.0"]}"#)
        .await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], 1);
    assert!(reply.get("jsonrpc").is_none(), "NH reply must not carry a jsonrpc field");
    let result = reply["result"].as_array().expect("result is an array");
    let notify_info = result[0].as_array().expect("first element is the notify-info pair");
    assert_eq!(notify_info[0], "mining.notify");
    assert_eq!(notify_info[2], "EthereumStratum/1.0.0");
    assert!(result[1].as_str().is_some(), "second element is the session extranonce");

    gateway.work_source.set_template(sample_template()).await;
    client.send(r#"{"id":2,"method":"mining.authorize","params":["0xabc.rig1","x"]}"#).await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"], true);

    let difficulty_push = client.recv().await;
    assert_eq!(difficulty_push["method"], "mining.set_difficulty");
    assert!(difficulty_push["params"][0].as_f64().is_some());

    let notify_push = client.recv().await;
    assert_eq!(notify_push["method"], "mining.notify");
    let params = notify_push["params"].as_array().expect("notify params array");
    assert_eq!(params.len(), 4);
    assert_eq!(params[3], true, "targeted sends always set clean_jobs=true");
    assert!(notify_push["height"].is_string());
    assert!(notify_push["algo"].is_string());
}

#[tokio::test]
async fn stale_share_resolves_against_cache_then_is_rejected_after_eviction() {
    let gateway = spawn_gateway(2, 64).await;
    gateway.work_source.set_template(sample_template()).await;
    let mut client = Client::new(connect(gateway.addr).await);

    client
        .send(r#"{"id":1,"method":"mining.subscribe","params":["miner/1","EthereumStratum/1.0.0"]}"#)
        .await;
    client.recv().await; // flattened subscribe reply, carrying the first job inline
    client.send(r#"{"id":2,"method":"mining.authorize","params":["0xabc.rig1","x"]}"#).await;
    client.recv().await; // authorize result
    client.recv().await; // set_difficulty push
    client.recv().await; // mining.notify push (authorize always sends one when a template exists)

    let session = gateway.registry.snapshot().into_iter().next().expect("one live session");
    let job1 = session.current_job_id().expect("authorize installed a job");

    // One rotation: job1 becomes stale but is still within MAX_STALE.
    session.send_job(&sample_template(), true).await.unwrap();
    client.recv().await; // drain the mining.notify push from the rotation

    client.send(&format!(r#"{{"id":3,"method":"mining.submit","params":["0xabc.rig1","{job1}","1234567890abcdef"]}}"#)).await;
    let reply = client.recv().await;
    assert_eq!(reply["result"], true, "job1 is still in the stale cache and should be accepted");

    // Rotate enough times to push job1 out of the bounded stale cache.
    for _ in 0..12 {
        session.send_job(&sample_template(), true).await.unwrap();
        client.recv().await;
    }

    client.send(&format!(r#"{{"id":4,"method":"mining.submit","params":["0xabc.rig1","{job1}","1234567890abcdef"]}}"#)).await;
    let reply = client.recv().await;
    assert_eq!(reply["error"][0], "21");
    assert_eq!(reply["error"][1], "Stale share.");

    let fresh_notify = client.recv().await;
    assert_eq!(fresh_notify["method"], "mining.notify", "a stale rejection is followed by a fresh job");
}

#[tokio::test]
async fn malformed_submit_work_closes_the_connection() {
    let gateway = spawn_gateway(4_000_000_000, 64).await;
    let mut client = Client::new(connect(gateway.addr).await);

    client.send(r#"{"id":1,"method":"eth_submitLogin","params":["0xabc","x"]}"#).await;
    client.recv().await;

    // Nonce is too short; expected lengths are (18, 66, 66).
    client.send(r#"{"id":2,"method":"eth_submitWork","params":["0x01","0xaa","0xbb"]}"#).await;
    client.expect_closed().await;
}

#[tokio::test]
async fn submit_hashrate_without_0x_prefix_closes_the_connection() {
    let gateway = spawn_gateway(4_000_000_000, 64).await;
    let mut client = Client::new(connect(gateway.addr).await);

    client.send(r#"{"id":1,"method":"eth_submitLogin","params":["0xabc","x"]}"#).await;
    client.recv().await;

    client.send(r#"{"id":2,"method":"eth_submitHashrate","params":["500000"]}"#).await;
    client.expect_closed().await;
}

#[tokio::test]
async fn extranonce_subscribe_with_params_is_rejected_but_session_continues() {
    let gateway = spawn_gateway(4_000_000_000, 64).await;
    let mut client = Client::new(connect(gateway.addr).await);

    client.send(r#"{"id":1,"method":"mining.extranonce.subscribe","params":["unexpected"]}"#).await;
    let reply = client.recv().await;
    assert_eq!(reply["error"][0], "20");
    assert_eq!(reply["error"][1], "Not supported.");

    client.send(r#"{"id":2,"method":"mining.extranonce.subscribe","params":[]}"#).await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"], true, "session must still be alive after the rejection");
}
