use super::builder::*;
use super::*;
use crate::connector::ConnectRole;
use crate::element::{CandidateElement, ContentInfo, Creator, Mode, Senders, TransportInfo};
use async_trait::async_trait;
use shared::Jid;
use socks::{Digest, ProxyConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn romeo() -> Jid {
    "romeo@montague.lit/orchard".parse().unwrap()
}

fn juliet() -> Jid {
    "juliet@capulet.lit/balcony".parse().unwrap()
}

fn content() -> ContentInfo {
    ContentInfo {
        creator: Creator::Initiator,
        name: "ex".to_owned(),
        senders: Senders::Initiator,
    }
}

fn romeo_ctx() -> SessionContext {
    SessionContext::new("a73sjjvkla37jfea", romeo(), juliet(), romeo(), content())
}

fn juliet_ctx() -> SessionContext {
    SessionContext::new("a73sjjvkla37jfea", juliet(), romeo(), romeo(), content())
}

#[derive(Default)]
struct MockXmpp {
    local: Option<Jid>,
    discovery_fails: bool,
    proxies: Vec<Jid>,
    hosts: HashMap<Jid, Vec<StreamHost>>,
    discoveries: AtomicUsize,
    sent: Mutex<Vec<JingleTransportInfo>>,
}

impl MockXmpp {
    fn new(local: Jid) -> Self {
        Self {
            local: Some(local),
            ..Default::default()
        }
    }

    fn with_proxy(mut self, proxy: &str, host: &str, port: u16) -> Self {
        let jid: Jid = proxy.parse().unwrap();
        self.proxies.push(jid.clone());
        self.hosts.insert(
            jid.clone(),
            vec![StreamHost {
                jid,
                host: host.to_owned(),
                port,
            }],
        );
        self
    }

    fn with_silent_proxy(mut self, proxy: &str) -> Self {
        self.proxies.push(proxy.parse().unwrap());
        self
    }

    /// Waits until the session driver handed over `n` transport-info.
    async fn wait_sent(&self, n: usize) -> Vec<TransportInfo> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let sent = self.sent();
                if sent.len() >= n {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("transport-info sent")
    }

    fn sent(&self) -> Vec<TransportInfo> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.info.clone())
            .collect()
    }
}

#[async_trait]
impl XmppConnection for MockXmpp {
    fn local_jid(&self) -> Jid {
        self.local.clone().unwrap()
    }

    async fn send(&self, info: JingleTransportInfo) -> Result<()> {
        self.sent.lock()?.push(info);
        Ok(())
    }

    async fn send_and_await(&self, info: JingleTransportInfo) -> Result<()> {
        self.sent.lock()?.push(info);
        Ok(())
    }

    async fn activate_proxy(&self, _activation: crate::element::ProxyActivation) -> Result<()> {
        Ok(())
    }

    async fn discover_proxies(&self) -> Result<Vec<Jid>> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        if self.discovery_fails {
            return Err(Error::ErrNoResponse);
        }
        Ok(self.proxies.clone())
    }

    async fn query_stream_hosts(&self, proxy: &Jid) -> Result<Vec<StreamHost>> {
        self.hosts.get(proxy).cloned().ok_or(Error::ErrNoResponse)
    }
}

/// Connects to the candidates listed as reachable, without any network.
struct MockConnector {
    reachable: Vec<&'static str>,
}

#[async_trait]
impl Connector for MockConnector {
    type Socket = String;

    async fn connect(
        &self,
        candidate: &Candidate,
        _digest: &Digest,
        role: &ConnectRole,
        _timeout: Duration,
    ) -> Result<String> {
        if !self.reachable.iter().any(|id| *id == candidate.id()) {
            return Err(Error::ErrTimeout);
        }
        match role {
            ConnectRole::PeerCandidate => Ok(format!("peer:{}", candidate.id())),
            ConnectRole::OwnCandidate { .. } => Ok(format!("own:{}", candidate.id())),
        }
    }
}

fn loopback_proxy() -> Arc<Socks5Proxy> {
    Arc::new(Socks5Proxy::new(
        ProxyConfig::default()
            .with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
            .with_port_search(false),
    ))
}

fn offline_config() -> S5bConfig {
    S5bConfig::default()
        .with_use_local_candidates(false)
        .with_use_external_candidates(false)
}

fn mock_manager(
    xmpp: Arc<MockXmpp>,
    reachable: Vec<&'static str>,
    config: S5bConfig,
) -> S5bTransportManager<String> {
    S5bTransportManager::with_connector(
        xmpp,
        loopback_proxy(),
        Arc::new(MockConnector { reachable }),
        config,
    )
}

fn romeo_offer() -> TransportElement {
    TransportElement {
        sid: "vj3hs98y".to_owned(),
        mode: Mode::Tcp,
        dstaddr: Digest::new("vj3hs98y", romeo(), juliet()).to_string(),
        candidates: vec![CandidateElement {
            cid: "hft54dqy".to_owned(),
            host: "192.168.4.1".to_owned(),
            port: Some(5086),
            jid: romeo(),
            priority: 8257636,
            candidate_type: CandidateType::Direct,
        }],
    }
}

fn from_romeo(stream_id: &str, info: TransportInfo) -> JingleTransportInfo {
    create_transport_info(&romeo_ctx(), stream_id, info)
}

#[test]
fn test_builders_name_our_role() {
    let ours = create_candidate_used(&romeo_ctx(), "vj3hs98y", "hr65dqyd");
    assert_eq!(ours.from, romeo());
    assert_eq!(ours.to, juliet());
    assert_eq!(ours.initiator, Some(romeo()));
    assert_eq!(ours.responder, None);
    assert_eq!(ours.session_id, "a73sjjvkla37jfea");
    assert_eq!(ours.stream_id, "vj3hs98y");
    assert_eq!(ours.content, content());
    assert_eq!(
        ours.info,
        TransportInfo::CandidateUsed {
            cid: "hr65dqyd".to_owned()
        }
    );

    let theirs = create_candidate_activated(&juliet_ctx(), "vj3hs98y", "hr65dqyd");
    assert_eq!(theirs.from, juliet());
    assert_eq!(theirs.initiator, None);
    assert_eq!(theirs.responder, Some(juliet()));

    assert_eq!(
        create_candidate_error(&juliet_ctx(), "vj3hs98y").info,
        TransportInfo::CandidateError
    );
    assert_eq!(
        create_proxy_error(&romeo_ctx(), "vj3hs98y").info,
        TransportInfo::ProxyError
    );
}

#[tokio::test]
async fn test_collect_candidates() -> Result<()> {
    let xmpp = Arc::new(
        MockXmpp::new(romeo())
            .with_proxy("proxy.montague.lit", "24.24.24.1", 5999)
            .with_silent_proxy("proxy.down.lit"),
    );
    let manager = S5bTransportManager::new(xmpp, loopback_proxy(), S5bConfig::default());

    let candidates = manager.collect_candidates().await;
    assert_eq!(candidates.len(), 2);

    let local = &candidates[0];
    assert_eq!(local.candidate_type(), CandidateType::Direct);
    assert_eq!(local.host(), "127.0.0.1");
    assert_eq!(local.jid(), &romeo());
    assert_eq!(local.priority(), 8257636);
    assert_eq!(Some(local.port()), manager.proxy().port().await);

    let external = &candidates[1];
    assert_eq!(external.candidate_type(), CandidateType::Proxy);
    assert_eq!(external.host(), "24.24.24.1");
    assert_eq!(external.port(), 5999);
    assert_eq!(external.priority(), 655360);

    manager.on_connection_closed().await?;
    Ok(())
}

#[tokio::test]
async fn test_candidate_flags() -> Result<()> {
    let xmpp = Arc::new(MockXmpp::new(romeo()).with_proxy("proxy.montague.lit", "24.24.24.1", 5999));
    let manager = S5bTransportManager::new(
        xmpp.clone(),
        loopback_proxy(),
        S5bConfig::default().with_use_local_candidates(false),
    );

    let candidates = manager.collect_candidates().await;
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].is_proxy());
    assert!(!manager.proxy().is_running().await);

    let manager = S5bTransportManager::new(
        xmpp.clone(),
        loopback_proxy(),
        S5bConfig::default().with_use_external_candidates(false),
    );
    let candidates = manager.collect_candidates().await;
    assert_eq!(candidates.len(), 1);
    assert!(!candidates[0].is_proxy());
    assert_eq!(xmpp.discoveries.load(Ordering::SeqCst), 1);

    manager.on_connection_closed().await?;
    Ok(())
}

#[tokio::test]
async fn test_discovery_failure_degrades_to_local() -> Result<()> {
    let xmpp = Arc::new(MockXmpp {
        discovery_fails: true,
        ..MockXmpp::new(romeo())
    });
    let manager = S5bTransportManager::new(xmpp.clone(), loopback_proxy(), S5bConfig::default());

    let candidates = manager.collect_candidates().await;
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].candidate_type(), CandidateType::Direct);

    // failures are not cached
    manager.available_stream_hosts().await;
    assert_eq!(xmpp.discoveries.load(Ordering::SeqCst), 2);

    manager.on_connection_closed().await?;
    Ok(())
}

#[tokio::test]
async fn test_stream_hosts_cached_per_connection() -> Result<()> {
    let xmpp = Arc::new(MockXmpp::new(romeo()).with_proxy("proxy.montague.lit", "24.24.24.1", 5999));
    let manager = S5bTransportManager::new(xmpp.clone(), loopback_proxy(), S5bConfig::default());

    manager.on_authenticated().await?;
    assert!(manager.proxy().is_running().await);
    let first = manager.available_stream_hosts().await;
    let second = manager.available_stream_hosts().await;
    assert_eq!(first, second);
    assert_eq!(xmpp.discoveries.load(Ordering::SeqCst), 1);

    manager.on_connection_closed().await?;
    assert!(!manager.proxy().is_running().await);

    manager.available_stream_hosts().await;
    assert_eq!(xmpp.discoveries.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_offer_registers_digest() -> Result<()> {
    let xmpp = Arc::new(MockXmpp::new(romeo()));
    let manager = mock_manager(xmpp, vec![], offline_config());

    let session = manager.create_transport_for_initiator(romeo_ctx()).await?;
    let digest = session.transport().our_digest().clone();
    assert!(manager.proxy().is_registered(&digest));
    assert!(manager.has_session("a73sjjvkla37jfea"));

    let offer = session.transport_element();
    assert_eq!(offer.dstaddr, digest.to_string());
    assert_eq!(
        digest,
        Digest::new(session.transport().stream_id(), romeo(), juliet())
    );

    drop(session);
    assert!(!manager.has_session("a73sjjvkla37jfea"));
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.proxy().is_registered(&digest) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("digest released after drop");
    Ok(())
}

#[tokio::test]
async fn test_unknown_session() {
    let manager = mock_manager(Arc::new(MockXmpp::new(juliet())), vec![], offline_config());
    let result = manager
        .handle_transport_info(from_romeo("vj3hs98y", TransportInfo::CandidateError))
        .await;
    assert_eq!(result, Err(Error::ErrUnknownSession));
}

#[tokio::test]
async fn test_establish_without_peer_offer() -> Result<()> {
    let manager = mock_manager(Arc::new(MockXmpp::new(romeo())), vec![], offline_config());
    let mut session = manager.create_transport_for_initiator(romeo_ctx()).await?;
    assert_eq!(
        session.establish().await.map(|_| ()),
        Err(Error::ErrMissingPeerOffer)
    );
    Ok(())
}

#[tokio::test]
async fn test_inbound_ordering_errors() -> Result<()> {
    let xmpp = Arc::new(MockXmpp::new(juliet()));
    let manager = mock_manager(xmpp, vec![], S5bConfig::default().with_use_external_candidates(false));

    let session = manager
        .create_transport_for_responder(juliet_ctx(), &romeo_offer())
        .await?;
    let cid = session.transport().our_candidates()[0].id().to_owned();

    let unknown = manager
        .handle_transport_info(from_romeo(
            "vj3hs98y",
            TransportInfo::CandidateUsed {
                cid: "nope".to_owned(),
            },
        ))
        .await;
    assert_eq!(unknown, Err(Error::ErrUnknownCandidate("nope".to_owned())));

    let wrong_stream = manager
        .handle_transport_info(from_romeo("other", TransportInfo::CandidateError))
        .await;
    assert_eq!(wrong_stream, Err(Error::ErrUnknownSession));

    manager
        .handle_transport_info(from_romeo("vj3hs98y", TransportInfo::CandidateUsed { cid }))
        .await?;
    let duplicate = manager
        .handle_transport_info(from_romeo("vj3hs98y", TransportInfo::CandidateError))
        .await;
    assert_eq!(duplicate, Err(Error::ErrOutOfOrder));

    manager.on_connection_closed().await?;
    Ok(())
}

#[tokio::test]
async fn test_responder_establishes_over_our_selection() -> Result<()> {
    let xmpp = Arc::new(MockXmpp::new(juliet()));
    let manager = mock_manager(xmpp.clone(), vec!["hft54dqy"], offline_config());

    let mut session = manager
        .create_transport_for_responder(juliet_ctx(), &romeo_offer())
        .await?;

    // Romeo could not reach Juliet; this may well arrive before Juliet starts racing.
    manager
        .handle_transport_info(from_romeo("vj3hs98y", TransportInfo::CandidateError))
        .await?;

    let stream = session.establish().await?;
    assert_eq!(stream.socket(), "peer:hft54dqy");
    assert!(stream.is_direct());
    assert_eq!(
        xmpp.wait_sent(1).await,
        vec![TransportInfo::CandidateUsed {
            cid: "hft54dqy".to_owned()
        }]
    );

    assert_eq!(
        session.establish().await.map(|_| ()),
        Err(Error::ErrAlreadyEstablishing)
    );
    Ok(())
}

#[tokio::test]
async fn test_silent_peer_times_out() -> Result<()> {
    let xmpp = Arc::new(MockXmpp::new(juliet()));
    let manager = mock_manager(
        xmpp,
        vec!["hft54dqy"],
        offline_config().with_establish_timeout(Duration::from_millis(200)),
    );

    let mut session = manager
        .create_transport_for_responder(juliet_ctx(), &romeo_offer())
        .await?;
    let digest = session.transport().our_digest().clone();

    let result = session.establish().await;
    assert_eq!(result.map(|_| ()), Err(Error::ErrTimeout));
    assert!(!manager.proxy().is_registered(&digest));
    Ok(())
}

#[tokio::test]
async fn test_connection_closed_cancels_sessions() -> Result<()> {
    let manager = mock_manager(Arc::new(MockXmpp::new(juliet())), vec![], offline_config());
    let mut session = manager
        .create_transport_for_responder(juliet_ctx(), &romeo_offer())
        .await?;

    let establish = tokio::spawn(async move { session.establish().await.map(|_| ()) });
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.on_connection_closed().await?;

    let result = tokio::time::timeout(Duration::from_secs(5), establish)
        .await
        .expect("establish returns")
        .expect("task completes");
    assert_eq!(result, Err(Error::ErrSessionCancelled));
    assert!(!manager.has_session("a73sjjvkla37jfea"));
    Ok(())
}
