use super::client::{DirectoryConnection, DirectoryConnector, DirectoryError, LdapHost};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::time::Duration;

const NET_DESC_ATTRIBUTE: &str = "orclNetDescString";
const NET_SERVICE_CLASS: &str = "orclNetService";

/// Opens plain LDAP connections with `ldap3`.
#[derive(Debug, Clone)]
pub struct Ldap3Connector {
    connect_timeout: Duration,
}

impl Ldap3Connector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

pub struct Ldap3Connection {
    url: String,
    connect_timeout: Duration,
    ldap: Ldap,
}

async fn open(url: &str, connect_timeout: Duration) -> Result<Ldap, DirectoryError> {
    let settings = LdapConnSettings::new().set_conn_timeout(connect_timeout);
    let (conn, ldap) = LdapConnAsync::with_settings(settings, url)
        .await
        .map_err(|e| DirectoryError::Connection(format!("{}: {}", url, e)))?;

    let url = url.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            tracing::warn!("LDAP connection to {} closed: {}", url, e);
        }
    });

    Ok(ldap)
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    type Conn = Ldap3Connection;

    async fn connect(&self, host: &LdapHost) -> Result<Ldap3Connection, DirectoryError> {
        let url = format!("ldap://{}", host);
        let ldap = open(&url, self.connect_timeout).await?;
        Ok(Ldap3Connection {
            url,
            connect_timeout: self.connect_timeout,
            ldap,
        })
    }
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn is_connected(&mut self) -> bool {
        !self.ldap.is_closed()
    }

    async fn reconnect(&mut self) -> Result<(), DirectoryError> {
        self.ldap = open(&self.url, self.connect_timeout).await?;
        Ok(())
    }

    async fn search_net_descs(
        &mut self,
        base_dn: &str,
        common_name: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let filter = format!(
            "(&(cn={})(objectClass={}))",
            ldap3::ldap_escape(common_name),
            NET_SERVICE_CLASS
        );

        let (entries, _result) = self
            .ldap
            .search(base_dn, Scope::Subtree, &filter, vec![NET_DESC_ATTRIBUTE])
            .await
            .map_err(|e| DirectoryError::Search(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Search(e.to_string()))?;

        let mut values = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = SearchEntry::construct(entry);
            match entry.attrs.get(NET_DESC_ATTRIBUTE).and_then(|v| v.first()) {
                Some(value) => values.push(value.clone()),
                None => tracing::warn!("Entry {} has no {} attribute", entry.dn, NET_DESC_ATTRIBUTE),
            }
        }
        Ok(values)
    }
}
