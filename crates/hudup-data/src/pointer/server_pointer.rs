use hudup_core::config::{ACCOUNT_NAME_KEY, DataConfig, SERVER_HOST_KEY, SERVER_PORT_KEY};

use super::{Pointer, PointerDataset};

/// Points at a dataset served by another server.
#[derive(Debug)]
pub struct Server;

impl Pointer for Server {
    const NAME: &'static str = "server";

    /// `account@host:port`, or `host:port` without an account.
    fn target(config: &DataConfig) -> Option<String> {
        let host = config.server_host()?;
        let port = config.server_port()?;
        Some(match config.account_name() {
            Some(account) => format!("{account}@{host}:{port}"),
            None => format!("{host}:{port}"),
        })
    }
}

pub type ServerPointer = PointerDataset<Server>;

impl ServerPointer {
    pub fn to_server(host: impl Into<String>, port: u16, account: Option<String>) -> Self {
        let mut config = DataConfig::new();
        config.put(SERVER_HOST_KEY, host.into());
        config.put(SERVER_PORT_KEY, port);
        if let Some(account) = account {
            config.put(ACCOUNT_NAME_KEY, account);
        }
        Self::new(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn target_names_host_and_port() {
        let anonymous = ServerPointer::to_server("localhost", 10151, None);
        assert_eq!(anonymous.target().await.as_deref(), Some("localhost:10151"));

        let named = ServerPointer::to_server("localhost", 10151, Some("admin".into()));
        assert_eq!(named.target().await.as_deref(), Some("admin@localhost:10151"));

        assert!(ServerPointer::new(None).target().await.is_none());
    }
}
