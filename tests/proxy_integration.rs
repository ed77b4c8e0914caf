//! End-to-end tests over loopback sockets: a real proxy in front of a real
//! tiny origin server.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use cacheproxy::cache::ObjectCache;
use cacheproxy::config::ProxyConfig;
use cacheproxy::proxy::Proxy;
use cacheproxy::server::Server;
use cacheproxy::tiny::Tiny;

struct DocRoot(PathBuf);

impl DocRoot {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "cacheproxy-it-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self(path)
    }
}

impl Drop for DocRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

async fn start_tiny(root: &DocRoot) -> SocketAddr {
    let tiny = Arc::new(Tiny::new(&root.0));
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(move |stream, peer| {
        let tiny = Arc::clone(&tiny);
        async move { tiny.serve(stream, peer).await }
    }));
    addr
}

async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Arc<ObjectCache>) {
    config.validate().unwrap();
    let cache = Arc::new(ObjectCache::new(config.cache_limits(), config.cache_key).unwrap());
    let connector = config.connector().unwrap();
    let proxy = Arc::new(Proxy::new(config, Arc::clone(&cache), connector));

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(move |stream, peer| {
        let proxy = Arc::clone(&proxy);
        async move { proxy.serve(stream, peer).await.map(drop) }
    }));
    (addr, cache)
}

async fn fetch(proxy: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn miss_then_hit_through_real_sockets() {
    let root = DocRoot::new("miss-hit");
    fs::write(root.0.join("home.html"), "<h1>tiny</h1>").unwrap();
    let origin = start_tiny(&root).await;
    let (proxy, cache) = start_proxy(ProxyConfig::default()).await;

    let request = format!("GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n");

    let first = fetch(proxy, &request).await;
    assert_eq!(
        first,
        "HTTP/1.0 200 OK\r\n\
         Server: Tiny Web Server\r\n\
         Connection: close\r\n\
         Content-length: 13\r\n\
         Content-type: text/html\r\n\r\n\
         <h1>tiny</h1>"
    );

    // Remove the file so only the cache can answer.
    fs::remove_file(root.0.join("home.html")).unwrap();

    let second = fetch(proxy, &request).await;
    assert_eq!(
        second,
        "HTTP/1.0 200 OK\r\n\
         Server: Tiny Web Server\r\n\
         Connection: close\r\n\
         Content-length: 13\r\n\r\n\
         <h1>tiny</h1>"
    );

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_size, 13);
}

#[tokio::test]
async fn head_is_relayed_without_body_or_caching() {
    let root = DocRoot::new("head");
    fs::write(root.0.join("a.gif"), [0u8; 32]).unwrap();
    let origin = start_tiny(&root).await;
    let (proxy, cache) = start_proxy(ProxyConfig::default()).await;

    let response = fetch(proxy, &format!("HEAD http://{origin}/a.gif HTTP/1.0\r\n\r\n")).await;

    assert!(response.contains("Content-length: 32\r\n"));
    assert!(response.ends_with("Content-type: image/gif\r\n\r\n"));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn origin_override_redirects_misses() {
    let root = DocRoot::new("override");
    fs::write(root.0.join("page.html"), "redirected").unwrap();
    let origin = start_tiny(&root).await;
    let config = ProxyConfig {
        origin_override: Some(origin.to_string()),
        ..ProxyConfig::default()
    };
    let (proxy, _cache) = start_proxy(config).await;

    let response = fetch(
        proxy,
        "GET http://www.example.invalid/page.html HTTP/1.0\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(response.ends_with("redirected"));
}

#[tokio::test]
async fn dead_origin_yields_502() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);
    let (proxy, cache) = start_proxy(ProxyConfig::default()).await;

    let response = fetch(proxy, &format!("GET http://{dead}/x HTTP/1.0\r\n\r\n")).await;

    assert!(response.starts_with("HTTP/1.0 502 Bad Gateway\r\n"));
    assert!(response.contains("Content-type: text/html\r\n"));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn post_is_refused_by_the_proxy() {
    let (proxy, _cache) = start_proxy(ProxyConfig::default()).await;

    let response = fetch(
        proxy,
        "POST http://127.0.0.1:1/form HTTP/1.0\r\nContent-Length: 0\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.0 501 Not implemented\r\n"));
    assert!(response.contains("POST"));
}

#[tokio::test]
async fn small_budget_evicts_least_recently_used() {
    let root = DocRoot::new("evict");
    for name in ["a", "b", "c"] {
        fs::write(root.0.join(format!("{name}.txt")), vec![b'x'; 400]).unwrap();
    }
    let origin = start_tiny(&root).await;
    let config = ProxyConfig {
        max_cache_size: 900,
        max_object_size: 500,
        ..ProxyConfig::default()
    };
    let (proxy, cache) = start_proxy(config).await;

    for name in ["a", "b", "a", "c"] {
        fetch(proxy, &format!("GET http://{origin}/{name}.txt HTTP/1.0\r\n\r\n")).await;
    }

    // `a` was touched by its hit, so `b` is the one evicted for `c`.
    assert!(cache.contains("/a.txt"));
    assert!(!cache.contains("/b.txt"));
    assert!(cache.contains("/c.txt"));
    assert_eq!(cache.total_size(), 800);
}

#[tokio::test]
async fn many_clients_at_once() {
    let root = DocRoot::new("many");
    for i in 0..10 {
        fs::write(root.0.join(format!("{i}.txt")), format!("object {i}")).unwrap();
    }
    let origin = start_tiny(&root).await;
    let (proxy, cache) = start_proxy(ProxyConfig::default()).await;

    let mut clients = Vec::new();
    for n in 0..50 {
        let request = format!("GET http://{origin}/{}.txt HTTP/1.0\r\n\r\n", n % 10);
        clients.push(tokio::spawn(async move {
            let response = fetch(proxy, &request).await;
            assert!(response.ends_with(&format!("object {}", n % 10)));
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    assert_eq!(cache.len(), 10);
}
