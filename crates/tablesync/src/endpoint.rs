//! Endpoint resolution.
//!
//! Turns a profile name plus the `Connections` table into a concrete
//! [`Endpoint`]. Profiles flagged as `dblink` borrow the credentials of the
//! profile named by `avail_from`; their tables are then addressed through the
//! link suffix.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{ConnectionProfile, DEFAULT_PORT};
use crate::core::TableRef;
use crate::error::{Result, SyncError};

/// A resolved, connectable database location.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Profile name this endpoint was resolved from.
    pub profile: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub service_name: String,
    /// Empty or `"SCHEMA."`.
    pub schema_prefix: String,
    /// Empty or `"@link"`.
    pub link_suffix: String,
}

impl Endpoint {
    /// Resolve `name` against the configured profiles.
    pub fn resolve(name: &str, profiles: &BTreeMap<String, ConnectionProfile>) -> Result<Self> {
        let profile = profiles
            .get(name)
            .ok_or_else(|| SyncError::Config(format!("unknown connection profile '{}'", name)))?;

        let effective = match (&profile.avail_from, profile.dblink) {
            (Some(via), true) => {
                let carrier = profiles.get(via).ok_or_else(|| {
                    SyncError::Config(format!(
                        "profile '{}' is reachable from unknown profile '{}'",
                        name, via
                    ))
                })?;
                profile.merged_with(carrier)
            }
            _ => profile.clone(),
        };

        Ok(Self::from_profile(name, &effective))
    }

    /// Extract endpoint fields, applying defaults and qualifier punctuation.
    pub fn from_profile(name: &str, profile: &ConnectionProfile) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();

        let scheme = text(&profile.scheme_name);
        let postfix = text(&profile.postfix);

        Self {
            profile: name.to_string(),
            user: text(&profile.db_user),
            password: text(&profile.db_password),
            host: text(&profile.db_host),
            port: profile.db_port.unwrap_or(DEFAULT_PORT),
            service_name: text(&profile.db_name),
            schema_prefix: if scheme.is_empty() {
                scheme
            } else {
                format!("{}.", scheme)
            },
            link_suffix: if postfix.is_empty() {
                postfix
            } else {
                format!("@{}", postfix)
            },
        }
    }

    /// Check the attributes required to open a connection.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("db_user", self.user.as_str()),
            ("db_password", self.password.as_str()),
            ("db_host", self.host.as_str()),
            ("db_name", self.service_name.as_str()),
        ];
        for (attr, value) in required {
            if value.is_empty() {
                return Err(SyncError::Config(format!(
                    "the required attribute {} could not be found for connection '{}'",
                    attr, self.profile
                )));
            }
        }
        if self.port == 0 {
            return Err(SyncError::Config(format!(
                "the required attribute db_port could not be found for connection '{}'",
                self.profile
            )));
        }
        Ok(())
    }

    /// Easy Connect string: `host:port/service`.
    pub fn connect_string(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.service_name)
    }

    /// Full connection identity, including credentials.
    ///
    /// Two endpoints with equal DSNs are the same physical instance.
    pub fn dsn(&self) -> String {
        format!(
            "oracle://{}:{}@{}",
            self.user,
            self.password,
            self.connect_string()
        )
    }

    /// Whether both endpoints reach the same physical instance.
    pub fn same_instance(&self, other: &Endpoint) -> bool {
        self.dsn() == other.dsn()
    }

    /// Address `name` on this endpoint.
    pub fn table(&self, name: &str) -> TableRef {
        TableRef::new(name, self.schema_prefix.clone(), self.link_suffix.clone())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("profile", &self.profile)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("service_name", &self.service_name)
            .field("schema_prefix", &self.schema_prefix)
            .field("link_suffix", &self.link_suffix)
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.connect_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles() -> BTreeMap<String, ConnectionProfile> {
        let mut map = BTreeMap::new();
        map.insert(
            "pl_db".to_string(),
            ConnectionProfile {
                db_user: Some("pl".into()),
                db_password: Some("pw".into()),
                db_host: Some("pl-host".into()),
                db_name: Some("PLSVC".into()),
                ..Default::default()
            },
        );
        map.insert(
            "prod".to_string(),
            ConnectionProfile {
                db_user: Some("app".into()),
                db_password: Some("pw".into()),
                db_host: Some("prod-host".into()),
                db_port: Some(1530),
                db_name: Some("PRODSVC".into()),
                scheme_name: Some("SALES".into()),
                ..Default::default()
            },
        );
        map.insert(
            "prod_link".to_string(),
            ConnectionProfile {
                scheme_name: Some("SALES".into()),
                postfix: Some("PROD".into()),
                dblink: true,
                avail_from: Some("pl_db".into()),
                ..Default::default()
            },
        );
        map
    }

    #[test]
    fn test_resolve_applies_defaults_and_punctuation() {
        let pl = Endpoint::resolve("pl_db", &profiles()).unwrap();
        assert_eq!(pl.port, 1521);
        assert_eq!(pl.schema_prefix, "");
        assert_eq!(pl.link_suffix, "");

        let prod = Endpoint::resolve("prod", &profiles()).unwrap();
        assert_eq!(prod.port, 1530);
        assert_eq!(prod.schema_prefix, "SALES.");
        assert_eq!(prod.table("orders").qualified(), "SALES.ORDERS");
    }

    #[test]
    fn test_link_profile_borrows_credentials() {
        let link = Endpoint::resolve("prod_link", &profiles()).unwrap();
        assert_eq!(link.user, "pl");
        assert_eq!(link.host, "pl-host");
        assert_eq!(link.link_suffix, "@PROD");
        assert_eq!(link.table("orders").qualified(), "SALES.ORDERS@PROD");

        let pl = Endpoint::resolve("pl_db", &profiles()).unwrap();
        assert!(link.same_instance(&pl));
        let prod = Endpoint::resolve("prod", &profiles()).unwrap();
        assert!(!prod.same_instance(&pl));
    }

    #[test]
    fn test_validate_reports_missing_attribute() {
        let mut map = profiles();
        map.get_mut("pl_db").unwrap().db_host = None;
        let endpoint = Endpoint::resolve("pl_db", &map).unwrap();
        let err = endpoint.validate().unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("db_host"));
    }

    #[test]
    fn test_unknown_profile() {
        assert!(Endpoint::resolve("missing", &profiles()).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let endpoint = Endpoint::resolve("prod", &profiles()).unwrap();
        let debug_output = format!("{:?}", endpoint);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("pw\""));
        assert_eq!(endpoint.to_string(), "app@prod-host:1530/PRODSVC");
    }
}
