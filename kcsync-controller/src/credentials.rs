//! Connection resolution: ProviderConfig + credential source into one
//! concrete endpoint and credential pair per reconcile cycle.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ConnectorResource;
use crate::store::StoreError;

/// ProviderConfig used when a connector does not name one.
pub const DEFAULT_PROVIDER_CONFIG: &str = "default";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialsSource {
    #[default]
    None,
    Secret,
    InjectedIdentity,
    Environment,
    Filesystem,
}

impl fmt::Display for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialsSource::None => "None",
            CredentialsSource::Secret => "Secret",
            CredentialsSource::InjectedIdentity => "InjectedIdentity",
            CredentialsSource::Environment => "Environment",
            CredentialsSource::Filesystem => "Filesystem",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSelector {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSelector {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    #[serde(default)]
    pub source: CredentialsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// PEM encoded CA bundle used to verify the server certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
}

impl TlsConfig {
    pub fn is_default(&self) -> bool {
        !self.insecure_skip_verify && self.ca_bundle.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    pub kafka_connect_url: String,
    #[serde(default)]
    pub credentials: ProviderCredentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

/// How to reach and authenticate against one Kafka Connect cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub spec: ProviderConfigSpec,
}

/// Opaque key/value material referenced by a [`SecretKeySelector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Endpoint and credentials for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub endpoint: String,
    pub basic_auth: Option<BasicAuth>,
    pub tls: TlsConfig,
}

/// Resolution failures. All of them are configuration problems, not
/// transport failures.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("provider config {0} not found")]
    ProviderConfigNotFound(String),

    #[error("credentials source {credentials_source} requires {selector}")]
    MissingSelector {
        credentials_source: CredentialsSource,
        selector: &'static str,
    },

    #[error("secret {0} not found")]
    SecretNotFound(String),

    #[error("secret {name} has no key {key}")]
    SecretKeyNotFound { name: String, key: String },

    #[error("environment variable {0} is not set")]
    EnvNotSet(String),

    #[error("failed to read credentials from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid credentials payload: {0}")]
    InvalidCredentials(String),

    #[error("credentials source {0} is not supported")]
    Unsupported(CredentialsSource),

    #[error("no Kafka Connect endpoint configured")]
    NoEndpoint,

    #[error("tls: {0}")]
    Tls(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Read access to ProviderConfigs and Secrets.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn provider_config(&self, name: &str) -> Result<Option<ProviderConfig>, StoreError>;
    async fn secret(&self, name: &str) -> Result<Option<Secret>, StoreError>;
}

/// Resolves the connection for a resource, once per cycle.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(
        &self,
        resource: &ConnectorResource,
    ) -> Result<ResolvedConnection, CredentialError>;
}

/// [`ConnectionResolver`] backed by a [`ConfigSource`].
pub struct SourceResolver<S> {
    source: Arc<S>,
}

impl<S: ConfigSource> SourceResolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    async fn basic_auth(
        &self,
        creds: &ProviderCredentials,
    ) -> Result<Option<BasicAuth>, CredentialError> {
        let raw = match creds.source {
            CredentialsSource::None => return Ok(None),
            CredentialsSource::InjectedIdentity => {
                return Err(CredentialError::Unsupported(creds.source));
            }
            CredentialsSource::Secret => {
                let selector = creds.secret_ref.as_ref().ok_or(CredentialError::MissingSelector {
                    credentials_source: creds.source,
                    selector: "secretRef",
                })?;
                let secret = self
                    .source
                    .secret(&selector.name)
                    .await?
                    .ok_or_else(|| CredentialError::SecretNotFound(selector.name.clone()))?;
                secret.data.get(&selector.key).cloned().ok_or_else(|| {
                    CredentialError::SecretKeyNotFound {
                        name: selector.name.clone(),
                        key: selector.key.clone(),
                    }
                })?
            }
            CredentialsSource::Environment => {
                let selector = creds.env.as_ref().ok_or(CredentialError::MissingSelector {
                    credentials_source: creds.source,
                    selector: "env",
                })?;
                std::env::var(&selector.name)
                    .map_err(|_| CredentialError::EnvNotSet(selector.name.clone()))?
            }
            CredentialsSource::Filesystem => {
                let selector = creds.fs.as_ref().ok_or(CredentialError::MissingSelector {
                    credentials_source: creds.source,
                    selector: "fs",
                })?;
                tokio::fs::read_to_string(&selector.path)
                    .await
                    .map_err(|e| CredentialError::Read {
                        path: selector.path.clone(),
                        source: e,
                    })?
            }
        };

        serde_json::from_str::<BasicAuth>(&raw)
            .map(Some)
            .map_err(|e| CredentialError::InvalidCredentials(e.to_string()))
    }
}

#[async_trait]
impl<S: ConfigSource> ConnectionResolver for SourceResolver<S> {
    async fn resolve(
        &self,
        resource: &ConnectorResource,
    ) -> Result<ResolvedConnection, CredentialError> {
        let provider_config = match &resource.spec.provider_config_ref {
            Some(name) => Some(
                self.source
                    .provider_config(name)
                    .await?
                    .ok_or_else(|| CredentialError::ProviderConfigNotFound(name.clone()))?,
            ),
            None => self.source.provider_config(DEFAULT_PROVIDER_CONFIG).await?,
        };

        let override_url = resource
            .desired()
            .kafka_connect_url
            .clone()
            .filter(|url| !url.is_empty());

        match provider_config {
            Some(pc) => Ok(ResolvedConnection {
                endpoint: override_url.unwrap_or(pc.spec.kafka_connect_url),
                basic_auth: self.basic_auth(&pc.spec.credentials).await?,
                tls: pc.spec.tls.unwrap_or_default(),
            }),
            None => Ok(ResolvedConnection {
                endpoint: override_url.ok_or(CredentialError::NoEndpoint)?,
                basic_auth: None,
                tls: TlsConfig::default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConnectorSpec, DeletionPolicy, DesiredConnector};
    use std::collections::HashMap;
    use std::io::Write;

    #[derive(Default)]
    struct StaticSource {
        configs: HashMap<String, ProviderConfig>,
        secrets: HashMap<String, Secret>,
    }

    #[async_trait]
    impl ConfigSource for StaticSource {
        async fn provider_config(&self, name: &str) -> Result<Option<ProviderConfig>, StoreError> {
            Ok(self.configs.get(name).cloned())
        }

        async fn secret(&self, name: &str) -> Result<Option<Secret>, StoreError> {
            Ok(self.secrets.get(name).cloned())
        }
    }

    fn resource(provider_config_ref: Option<&str>, url: Option<&str>) -> ConnectorResource {
        ConnectorResource::new(
            "sink1",
            ConnectorSpec {
                for_provider: DesiredConnector {
                    name: "sink1".to_string(),
                    connector_class: "FileStreamSink".to_string(),
                    tasks_max: 1,
                    config: BTreeMap::new(),
                    kafka_connect_url: url.map(str::to_string),
                },
                provider_config_ref: provider_config_ref.map(str::to_string),
                deletion_policy: DeletionPolicy::Delete,
            },
        )
    }

    fn provider_config(name: &str, credentials: ProviderCredentials) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            spec: ProviderConfigSpec {
                kafka_connect_url: "http://connect:8083".to_string(),
                credentials,
                tls: None,
            },
        }
    }

    fn resolver(source: StaticSource) -> SourceResolver<StaticSource> {
        SourceResolver::new(Arc::new(source))
    }

    #[tokio::test]
    async fn test_anonymous_with_connector_url() {
        let r = resolver(StaticSource::default());
        let conn = r
            .resolve(&resource(None, Some("http://other:8083")))
            .await
            .unwrap();
        assert_eq!(conn.endpoint, "http://other:8083");
        assert!(conn.basic_auth.is_none());
    }

    #[tokio::test]
    async fn test_no_endpoint_is_config_error() {
        let r = resolver(StaticSource::default());
        let err = r.resolve(&resource(None, None)).await.unwrap_err();
        assert!(matches!(err, CredentialError::NoEndpoint));
    }

    #[tokio::test]
    async fn test_named_provider_config_must_exist() {
        let r = resolver(StaticSource::default());
        let err = r.resolve(&resource(Some("prod"), None)).await.unwrap_err();
        assert!(matches!(err, CredentialError::ProviderConfigNotFound(name) if name == "prod"));
    }

    #[tokio::test]
    async fn test_default_provider_config_with_secret() {
        let mut source = StaticSource::default();
        source.configs.insert(
            DEFAULT_PROVIDER_CONFIG.to_string(),
            provider_config(
                DEFAULT_PROVIDER_CONFIG,
                ProviderCredentials {
                    source: CredentialsSource::Secret,
                    secret_ref: Some(SecretKeySelector {
                        name: "connect-creds".to_string(),
                        key: "credentials".to_string(),
                    }),
                    ..Default::default()
                },
            ),
        );
        source.secrets.insert(
            "connect-creds".to_string(),
            Secret {
                name: "connect-creds".to_string(),
                data: BTreeMap::from([(
                    "credentials".to_string(),
                    r#"{"username":"admin","password":"s3cret"}"#.to_string(),
                )]),
            },
        );

        let conn = resolver(source).resolve(&resource(None, None)).await.unwrap();
        assert_eq!(conn.endpoint, "http://connect:8083");
        let auth = conn.basic_auth.unwrap();
        assert_eq!(auth.username, "admin");
        assert_eq!(auth.password, "s3cret");
        assert!(!format!("{:?}", auth).contains("s3cret"));
    }

    #[tokio::test]
    async fn test_connector_url_overrides_provider_config() {
        let mut source = StaticSource::default();
        source.configs.insert(
            "prod".to_string(),
            provider_config("prod", ProviderCredentials::default()),
        );
        let conn = resolver(source)
            .resolve(&resource(Some("prod"), Some("http://override:8083")))
            .await
            .unwrap();
        assert_eq!(conn.endpoint, "http://override:8083");
    }

    #[tokio::test]
    async fn test_secret_missing_key() {
        let mut source = StaticSource::default();
        source.configs.insert(
            "prod".to_string(),
            provider_config(
                "prod",
                ProviderCredentials {
                    source: CredentialsSource::Secret,
                    secret_ref: Some(SecretKeySelector {
                        name: "creds".to_string(),
                        key: "missing".to_string(),
                    }),
                    ..Default::default()
                },
            ),
        );
        source.secrets.insert(
            "creds".to_string(),
            Secret {
                name: "creds".to_string(),
                data: BTreeMap::new(),
            },
        );
        let err = resolver(source)
            .resolve(&resource(Some("prod"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::SecretKeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_filesystem_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"username":"fs-user","password":"fs-pass"}}"#).unwrap();

        let mut source = StaticSource::default();
        source.configs.insert(
            "prod".to_string(),
            provider_config(
                "prod",
                ProviderCredentials {
                    source: CredentialsSource::Filesystem,
                    fs: Some(FsSelector {
                        path: file.path().to_path_buf(),
                    }),
                    ..Default::default()
                },
            ),
        );
        let conn = resolver(source)
            .resolve(&resource(Some("prod"), None))
            .await
            .unwrap();
        assert_eq!(conn.basic_auth.unwrap().username, "fs-user");
    }

    #[tokio::test]
    async fn test_environment_credentials() {
        let var = "KCSYNC_TEST_ENV_CREDENTIALS";
        std::env::set_var(var, r#"{"username":"env-user","password":"env-pass"}"#);

        let mut source = StaticSource::default();
        source.configs.insert(
            "prod".to_string(),
            provider_config(
                "prod",
                ProviderCredentials {
                    source: CredentialsSource::Environment,
                    env: Some(EnvSelector {
                        name: var.to_string(),
                    }),
                    ..Default::default()
                },
            ),
        );
        let conn = resolver(source)
            .resolve(&resource(Some("prod"), None))
            .await
            .unwrap();
        assert_eq!(conn.basic_auth.unwrap().password, "env-pass");
    }

    #[tokio::test]
    async fn test_injected_identity_unsupported() {
        let mut source = StaticSource::default();
        source.configs.insert(
            "prod".to_string(),
            provider_config(
                "prod",
                ProviderCredentials {
                    source: CredentialsSource::InjectedIdentity,
                    ..Default::default()
                },
            ),
        );
        let err = resolver(source)
            .resolve(&resource(Some("prod"), None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CredentialError::Unsupported(CredentialsSource::InjectedIdentity)
        ));
    }

    #[tokio::test]
    async fn test_missing_selector() {
        let mut source = StaticSource::default();
        source.configs.insert(
            "prod".to_string(),
            provider_config(
                "prod",
                ProviderCredentials {
                    source: CredentialsSource::Environment,
                    ..Default::default()
                },
            ),
        );
        let err = resolver(source)
            .resolve(&resource(Some("prod"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::MissingSelector { selector: "env", .. }));
    }
}
