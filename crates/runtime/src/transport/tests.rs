use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::*;

#[tokio::test]
async fn test_tcp_connect_and_exchange_bytes() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();

	let server = tokio::spawn(async move {
		let (mut socket, _) = listener.accept().await.unwrap();
		let mut buf = [0u8; 5];
		socket.read_exact(&mut buf).await.unwrap();
		socket.write_all(b"world").await.unwrap();
		buf
	});

	let mut io = TcpTransport
		.connect(&Endpoint::new("127.0.0.1", port), &TransportOptions::default())
		.await
		.unwrap();
	io.write_all(b"hello").await.unwrap();
	let mut reply = [0u8; 5];
	io.read_exact(&mut reply).await.unwrap();

	assert_eq!(&server.await.unwrap(), b"hello");
	assert_eq!(&reply, b"world");
}

#[tokio::test]
async fn test_tcp_connect_refused() {
	// Grab a free port, then release it so nothing is listening.
	let port = {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		listener.local_addr().unwrap().port()
	};

	let err = match TcpTransport
		.connect(&Endpoint::new("127.0.0.1", port), &TransportOptions::default())
		.await
	{
		Ok(_) => panic!("connect to a closed port must fail"),
		Err(err) => err,
	};
	assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
}
