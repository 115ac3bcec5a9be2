use super::net_desc::NetDesc;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;

/// Total search attempts per lookup; the first try plus five retries.
const SEARCH_ATTEMPTS: usize = 6;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Failed to establish a connection to any configured LDAP server")]
    NoServerAvailable,

    #[error("LDAP connection failed: {0}")]
    Connection(String),

    #[error("LDAP search failed: {0}")]
    Search(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapHost {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for LdapHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    type Conn: DirectoryConnection;

    async fn connect(&self, host: &LdapHost) -> std::result::Result<Self::Conn, DirectoryError>;
}

#[async_trait]
pub trait DirectoryConnection: Send {
    async fn is_connected(&mut self) -> bool;

    async fn reconnect(&mut self) -> std::result::Result<(), DirectoryError>;

    /// Raw `orclNetDescString` values of every net service entry named `common_name`.
    async fn search_net_descs(
        &mut self,
        base_dn: &str,
        common_name: &str,
    ) -> std::result::Result<Vec<String>, DirectoryError>;
}

/// Resolves a net service name to exactly one descriptor.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    async fn require_singular_net_desc(&self, common_name: &str) -> Result<NetDesc>;
}

/// Directory client holding one shared connection behind a single lock.
pub struct LdapClient<C: DirectoryConnector> {
    hosts: Vec<LdapHost>,
    base_dn: String,
    connector: C,
    connection: Mutex<Option<C::Conn>>,
}

impl<C: DirectoryConnector> LdapClient<C> {
    pub fn new(hosts: Vec<LdapHost>, base_dn: String, connector: C) -> Result<Self> {
        if hosts.is_empty() {
            return Err(AppError::IllegalState(
                "LDAP client requires at least one host".to_string(),
            ));
        }
        Ok(Self {
            hosts,
            base_dn,
            connector,
            connection: Mutex::new(None),
        })
    }

    pub async fn lookup_net_descs(&self, common_name: &str) -> Result<Vec<NetDesc>> {
        let mut last_error = None;

        for attempt in 1..=SEARCH_ATTEMPTS {
            let mut slot = self.connection.lock().await;
            let conn = self.acquire(&mut slot).await?;

            match conn.search_net_descs(&self.base_dn, common_name).await {
                Ok(values) => {
                    return values.iter().map(|value| NetDesc::parse(value)).collect();
                }
                Err(e) => {
                    tracing::warn!("Failed to search LDAP {} times: {}", attempt, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DirectoryError::NoServerAvailable).into())
    }

    /// Returns the shared connection, reconnecting it or opening a fresh one as needed.
    async fn acquire<'a>(
        &self,
        slot: &'a mut Option<C::Conn>,
    ) -> std::result::Result<&'a mut C::Conn, DirectoryError> {
        let reusable = match slot.as_mut() {
            Some(conn) => {
                if conn.is_connected().await {
                    true
                } else {
                    match conn.reconnect().await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::debug!("LDAP reconnect failed: {}", e);
                            false
                        }
                    }
                }
            }
            None => false,
        };

        if !reusable {
            *slot = None;
            *slot = Some(self.connect_any().await?);
        }

        slot.as_mut().ok_or(DirectoryError::NoServerAvailable)
    }

    async fn connect_any(&self) -> std::result::Result<C::Conn, DirectoryError> {
        tracing::debug!("Attempting to establish a connection to a configured LDAP server");
        for host in &self.hosts {
            match self.connector.connect(host).await {
                Ok(conn) => {
                    tracing::debug!("Connected to {}", host);
                    return Ok(conn);
                }
                Err(e) => tracing::debug!("Failed to connect to {}: {}", host, e),
            }
        }

        tracing::error!("Failed to establish a connection to any configured LDAP server");
        Err(DirectoryError::NoServerAvailable)
    }
}

#[async_trait]
impl<C: DirectoryConnector> DirectoryLookup for LdapClient<C> {
    async fn require_singular_net_desc(&self, common_name: &str) -> Result<NetDesc> {
        let mut found = self.lookup_net_descs(common_name).await?;
        match found.len() {
            0 => Err(AppError::LookupNotFound(common_name.to_string())),
            1 => Ok(found.remove(0)),
            _ => Err(AppError::AmbiguousLookup(common_name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DESC: &str = "(HOST=db.example.org)(PORT=1521)(SERVICE_NAME=plas.world)";

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        searches: AtomicUsize,
        reconnects: AtomicUsize,
    }

    struct FakeConnector {
        counters: Arc<Counters>,
        reachable: Vec<String>,
        search_failures: usize,
        results: Vec<String>,
        connected: bool,
        reconnect_ok: bool,
    }

    impl FakeConnector {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                reachable: vec!["ldap-a".to_string()],
                search_failures: 0,
                results: vec![DESC.to_string()],
                connected: true,
                reconnect_ok: true,
            }
        }
    }

    struct FakeConnection {
        counters: Arc<Counters>,
        search_failures: usize,
        results: Vec<String>,
        connected: bool,
        reconnect_ok: bool,
    }

    #[async_trait]
    impl DirectoryConnector for FakeConnector {
        type Conn = FakeConnection;

        async fn connect(&self, host: &LdapHost) -> std::result::Result<FakeConnection, DirectoryError> {
            if !self.reachable.contains(&host.host) {
                return Err(DirectoryError::Connection(format!("{} unreachable", host)));
            }
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConnection {
                counters: self.counters.clone(),
                search_failures: self.search_failures,
                results: self.results.clone(),
                connected: self.connected,
                reconnect_ok: self.reconnect_ok,
            })
        }
    }

    #[async_trait]
    impl DirectoryConnection for FakeConnection {
        async fn is_connected(&mut self) -> bool {
            self.connected
        }

        async fn reconnect(&mut self) -> std::result::Result<(), DirectoryError> {
            self.counters.reconnects.fetch_add(1, Ordering::SeqCst);
            if self.reconnect_ok {
                self.connected = true;
                Ok(())
            } else {
                Err(DirectoryError::Connection("reconnect refused".to_string()))
            }
        }

        async fn search_net_descs(
            &mut self,
            _base_dn: &str,
            _common_name: &str,
        ) -> std::result::Result<Vec<String>, DirectoryError> {
            let n = self.counters.searches.fetch_add(1, Ordering::SeqCst);
            if n < self.search_failures {
                return Err(DirectoryError::Search("server busy".to_string()));
            }
            Ok(self.results.clone())
        }
    }

    fn hosts() -> Vec<LdapHost> {
        vec![
            LdapHost { host: "ldap-down".to_string(), port: 389 },
            LdapHost { host: "ldap-a".to_string(), port: 389 },
        ]
    }

    fn client(connector: FakeConnector) -> LdapClient<FakeConnector> {
        LdapClient::new(hosts(), "ou=OracleContext,dc=example,dc=org".to_string(), connector)
            .unwrap()
    }

    #[tokio::test]
    async fn succeeds_after_transient_search_failures() {
        let counters = Arc::new(Counters::default());
        let mut connector = FakeConnector::new(counters.clone());
        connector.search_failures = 3;

        let desc = client(connector).require_singular_net_desc("plas").await.unwrap();

        assert_eq!(desc.host, "db.example.org");
        assert_eq!(counters.searches.load(Ordering::SeqCst), 4);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_six_attempts() {
        let counters = Arc::new(Counters::default());
        let mut connector = FakeConnector::new(counters.clone());
        connector.search_failures = usize::MAX;

        let err = client(connector).require_singular_net_desc("plas").await.unwrap_err();

        assert_matches!(err, AppError::Directory(DirectoryError::Search(_)));
        assert_eq!(counters.searches.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn fails_without_retry_when_no_host_accepts() {
        let counters = Arc::new(Counters::default());
        let mut connector = FakeConnector::new(counters.clone());
        connector.reachable.clear();

        let err = client(connector).require_singular_net_desc("plas").await.unwrap_err();

        assert_matches!(err, AppError::Directory(DirectoryError::NoServerAvailable));
        assert_eq!(counters.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dead_connection_is_reconnected_in_place() {
        let counters = Arc::new(Counters::default());
        let mut connector = FakeConnector::new(counters.clone());
        connector.connected = false;

        let client = client(connector);

        client.require_singular_net_desc("plas").await.unwrap();
        client.require_singular_net_desc("plas").await.unwrap();

        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.reconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_reconnect_opens_a_fresh_connection() {
        let counters = Arc::new(Counters::default());
        let mut connector = FakeConnector::new(counters.clone());
        connector.connected = false;
        connector.reconnect_ok = false;
        let client = client(connector);

        client.require_singular_net_desc("plas").await.unwrap();
        client.require_singular_net_desc("plas").await.unwrap();

        assert_eq!(counters.reconnects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_or_many_entries_are_errors() {
        let counters = Arc::new(Counters::default());
        let mut none = FakeConnector::new(counters.clone());
        none.results.clear();
        assert_matches!(
            client(none).require_singular_net_desc("plas").await,
            Err(AppError::LookupNotFound(name)) if name == "plas"
        );

        let mut many = FakeConnector::new(counters);
        many.results.push(DESC.to_string());
        assert_matches!(
            client(many).require_singular_net_desc("plas").await,
            Err(AppError::AmbiguousLookup(_))
        );
    }
}
