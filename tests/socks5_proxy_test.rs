//! Integration tests for the SOCKS5 proxy mode

mod common;

use common::*;
use dualproxy::ProxyKind;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_ipv4_connect_reply_and_relay() {
    let echo = spawn_echo_server().await;
    let proxy = start_proxy(ProxyKind::Socks5).await;

    let mut client = proxy.connect().await;
    let reply = socks5_connect_ipv4(&mut client, echo).await;

    let mut expected = vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0];
    expected.extend_from_slice(&proxy.addr.port().to_be_bytes());
    assert_eq!(reply, expected);

    client.write_all(b"hello socks").await.unwrap();
    assert_eq!(read_exact_n(&mut client, 11).await, b"hello socks");

    let manager = &proxy.manager;
    assert!(
        wait_until(|| {
            let snapshot = manager.snapshot();
            snapshot.total_bytes == 22 && snapshot.active_connections.len() == 1
        })
        .await
    );
    assert_eq!(manager.snapshot().active_connections[0].target, echo.to_string());

    drop(client);
    assert!(wait_until(|| manager.registry().is_empty()).await);
}

#[tokio::test]
async fn test_domain_connect() {
    let echo = spawn_echo_server().await;
    let proxy = start_proxy(ProxyKind::Socks5).await;

    let mut client = proxy.connect().await;
    client.write_all(&[0x05, 0x02, 0x00, 0x02]).await.unwrap();
    assert_eq!(read_exact_n(&mut client, 2).await, vec![0x05, 0x00]);

    let mut request = vec![0x05, 0x01, 0x00, 0x03, b"localhost".len() as u8];
    request.extend_from_slice(b"localhost");
    request.extend_from_slice(&echo.port().to_be_bytes());
    client.write_all(&request).await.unwrap();

    let reply = read_exact_n(&mut client, 10).await;
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);

    client.write_all(b"abc").await.unwrap();
    assert_eq!(read_exact_n(&mut client, 3).await, b"abc");

    let snapshot = proxy.manager.snapshot();
    assert_eq!(snapshot.active_connections[0].target, format!("localhost:{}", echo.port()));
}

#[tokio::test]
async fn test_unsupported_command_closes_without_reply() {
    let proxy = start_proxy(ProxyKind::Socks5).await;

    let mut client = proxy.connect().await;
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    assert_eq!(read_exact_n(&mut client, 2).await, vec![0x05, 0x00]);

    // BIND; the proxy stops reading after the header.
    client.write_all(&[0x05, 0x02, 0x00, 0x01]).await.unwrap();
    assert!(read_to_close(&mut client).await.is_empty());
    assert!(wait_until(|| proxy.manager.registry().is_empty()).await);
}

#[tokio::test]
async fn test_ipv6_address_type_closes_without_reply() {
    let proxy = start_proxy(ProxyKind::Socks5).await;

    let mut client = proxy.connect().await;
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    assert_eq!(read_exact_n(&mut client, 2).await, vec![0x05, 0x00]);

    client.write_all(&[0x05, 0x01, 0x00, 0x04]).await.unwrap();
    assert!(read_to_close(&mut client).await.is_empty());
}

#[tokio::test]
async fn test_wrong_version_closes_without_reply() {
    let proxy = start_proxy(ProxyKind::Socks5).await;

    let mut client = proxy.connect().await;
    client.write_all(&[0x04, 0x01]).await.unwrap();
    assert!(read_to_close(&mut client).await.is_empty());
}

#[tokio::test]
async fn test_dial_failure_closes_without_reply() {
    let port = closed_port().await;
    let proxy = start_proxy(ProxyKind::Socks5).await;

    let mut client = proxy.connect().await;
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    assert_eq!(read_exact_n(&mut client, 2).await, vec![0x05, 0x00]);

    let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
    request.extend_from_slice(&port.to_be_bytes());
    client.write_all(&request).await.unwrap();

    assert!(read_to_close(&mut client).await.is_empty());
    assert!(wait_until(|| proxy.manager.registry().is_empty()).await);
}

#[tokio::test]
async fn test_request_trickled_byte_by_byte() {
    let echo = spawn_echo_server().await;
    let proxy = start_proxy(ProxyKind::Socks5).await;

    let mut client = proxy.connect().await;
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    assert_eq!(read_exact_n(&mut client, 2).await, vec![0x05, 0x00]);

    let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
    request.extend_from_slice(&echo.port().to_be_bytes());
    for byte in request {
        client.write_all(&[byte]).await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let reply = read_exact_n(&mut client, 10).await;
    assert_eq!(reply[1], 0x00);
}
