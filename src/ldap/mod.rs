pub mod client;
pub mod directory;
pub mod net_desc;

pub use client::{DirectoryError, DirectoryLookup, LdapClient, LdapHost};
pub use directory::Ldap3Connector;
