use super::*;
use crate::candidate::CandidateType;
use crate::element::{JingleTransportInfo, StreamHost};
use socks::ProxyConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const STREAM_ID: &str = "vj3hs98y";
const TIMEOUT: Duration = Duration::from_secs(5);

fn romeo() -> Jid {
    "romeo@montague.lit/orchard".parse().unwrap()
}

fn juliet() -> Jid {
    "juliet@capulet.lit/balcony".parse().unwrap()
}

fn proxy_jid() -> Jid {
    "streamer.montague.lit".parse().unwrap()
}

fn loopback_proxy() -> Arc<Socks5Proxy> {
    Arc::new(Socks5Proxy::new(
        ProxyConfig::default()
            .with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
            .with_port_search(false),
    ))
}

/// Accepts or refuses every proxy activation, remembering the requests.
struct ActivatingXmpp {
    local: Jid,
    refuses: bool,
    activations: Mutex<Vec<ProxyActivation>>,
}

impl ActivatingXmpp {
    fn new(refuses: bool) -> Arc<Self> {
        Arc::new(Self {
            local: romeo(),
            refuses,
            activations: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl XmppConnection for ActivatingXmpp {
    fn local_jid(&self) -> Jid {
        self.local.clone()
    }

    async fn send(&self, _info: JingleTransportInfo) -> Result<()> {
        Ok(())
    }

    async fn send_and_await(&self, _info: JingleTransportInfo) -> Result<()> {
        Ok(())
    }

    async fn activate_proxy(&self, activation: ProxyActivation) -> Result<()> {
        self.activations.lock()?.push(activation);
        if self.refuses {
            return Err(Error::ErrStanza("not-allowed".to_owned()));
        }
        Ok(())
    }

    async fn discover_proxies(&self) -> Result<Vec<Jid>> {
        Ok(vec![])
    }

    async fn query_stream_hosts(&self, _proxy: &Jid) -> Result<Vec<StreamHost>> {
        Ok(vec![])
    }
}

fn own_role() -> ConnectRole {
    ConnectRole::OwnCandidate {
        stream_id: STREAM_ID.to_owned(),
        target: juliet(),
    }
}

/// Starts a stand-in for a server-side proxy that expects our digest.
async fn external_proxy(digest: &Digest) -> (Arc<Socks5Proxy>, Candidate) {
    let external = loopback_proxy();
    let addr = external.start().await.unwrap();
    external.register_digest(digest.clone()).unwrap();
    let candidate = Candidate::with_local_preference(
        "127.0.0.1",
        addr.port(),
        proxy_jid(),
        CandidateType::Proxy,
        0,
    );
    (external, candidate)
}

#[tokio::test]
async fn test_own_proxy_candidate_is_activated() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let digest = Digest::new(STREAM_ID, romeo(), juliet());
    let (external, candidate) = external_proxy(&digest).await;
    let xmpp = ActivatingXmpp::new(false);
    let connector = Socks5Connector::new(loopback_proxy(), xmpp.clone());

    let mut ours = connector
        .connect(&candidate, &digest, &own_role(), TIMEOUT)
        .await?;

    assert_eq!(
        *xmpp.activations.lock()?,
        vec![ProxyActivation {
            from: romeo(),
            proxy: proxy_jid(),
            sid: STREAM_ID.to_owned(),
            target: juliet(),
        }]
    );

    let mut relayed = external.accepted_socket_for(&digest, TIMEOUT).await?;
    ours.write_all(b"ping").await?;
    let mut buf = [0u8; 4];
    relayed.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"ping");

    external.stop().await
}

#[tokio::test]
async fn test_own_proxy_refusing_activation() -> Result<()> {
    let digest = Digest::new(STREAM_ID, romeo(), juliet());
    let (external, candidate) = external_proxy(&digest).await;
    let xmpp = ActivatingXmpp::new(true);
    let connector = Socks5Connector::new(loopback_proxy(), xmpp.clone());

    let result = connector
        .connect(&candidate, &digest, &own_role(), TIMEOUT)
        .await;

    assert!(
        matches!(result, Err(Error::ErrProxyActivation(_))),
        "{result:?}"
    );
    assert_eq!(xmpp.activations.lock()?.len(), 1);

    external.stop().await
}

#[tokio::test]
async fn test_own_proxy_unreachable_skips_activation() -> Result<()> {
    let digest = Digest::new(STREAM_ID, romeo(), juliet());
    let (external, candidate) = external_proxy(&digest).await;
    external.stop().await?;
    let xmpp = ActivatingXmpp::new(false);
    let connector = Socks5Connector::new(loopback_proxy(), xmpp.clone());

    let result = connector
        .connect(&candidate, &digest, &own_role(), TIMEOUT)
        .await;

    assert!(result.is_err());
    assert!(xmpp.activations.lock()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_own_local_candidate_collects_parked_socket() -> Result<()> {
    let digest = Digest::new(STREAM_ID, romeo(), juliet());
    let local = loopback_proxy();
    let addr = local.start().await?;
    local.register_digest(digest.clone())?;
    let candidate = Candidate::with_local_preference(
        "127.0.0.1",
        addr.port(),
        romeo(),
        CandidateType::Direct,
        100,
    );
    let xmpp = ActivatingXmpp::new(false);
    let connector = Socks5Connector::new(Arc::clone(&local), xmpp.clone());

    // the peer dials our candidate with our digest
    let mut theirs = client::connect("127.0.0.1", addr.port(), &digest, TIMEOUT).await?;

    let mut ours = connector
        .connect(&candidate, &digest, &own_role(), TIMEOUT)
        .await?;
    assert!(xmpp.activations.lock()?.is_empty());

    theirs.write_all(b"pong").await?;
    let mut buf = [0u8; 4];
    ours.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"pong");

    // parked once
    assert_eq!(
        connector
            .connect(&candidate, &digest, &own_role(), TIMEOUT)
            .await
            .err(),
        Some(Error::ErrTargetNotConnected)
    );

    local.stop().await
}

#[tokio::test]
async fn test_peer_candidate_without_registration_is_refused() -> Result<()> {
    let local = loopback_proxy();
    let addr = local.start().await?;
    let candidate = Candidate::with_local_preference(
        "127.0.0.1",
        addr.port(),
        juliet(),
        CandidateType::Direct,
        100,
    );
    let connector = Socks5Connector::new(loopback_proxy(), ActivatingXmpp::new(false));
    let digest = Digest::new(STREAM_ID, juliet(), romeo());

    let result = connector
        .connect(&candidate, &digest, &ConnectRole::PeerCandidate, TIMEOUT)
        .await;
    assert!(result.is_err());

    local.stop().await
}
