//! Kubeconfig generation for the helm client.
//!
//! The generated file holds a single cluster, user and context, all named
//! `helm`, authenticating either with a bearer token or through
//! `aws-iam-authenticator` for EKS clusters.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const NAME: &str = "helm";
const EKS_AUTH_API_VERSION: &str = "client.authentication.k8s.io/v1alpha1";
const EKS_AUTHENTICATOR: &str = "aws-iam-authenticator";

#[derive(Debug, Error)]
pub enum KubeConfigError {
    #[error("no path to kubeconfig provided")]
    MissingPath,

    #[error("no kubernetes api server provided")]
    MissingApiServer,

    #[error("no kubernetes token provided")]
    MissingCredentials,

    #[error("token cannot be used simultaneously with eksCluster")]
    ConflictingCredentials,

    #[error("no namespace provided")]
    MissingNamespace,

    #[error("unable to render kubeconfig: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("unable to write kubeconfig {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How the helm user authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Token(String),
    Eks {
        cluster: String,
        role_arn: Option<String>,
    },
}

/// How the api server certificate is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// System trust store.
    Verify,
    /// Base64 encoded CA bundle.
    CertificateAuthority(String),
    SkipVerify,
}

/// Raw settings, validated by [`KubeConfig::from_parts`].
#[derive(Debug, Clone, Default)]
pub struct KubeConfigParts {
    pub path: PathBuf,
    pub api_server: String,
    pub token: String,
    pub certificate: String,
    pub skip_tls: bool,
    pub namespace: String,
    pub eks_cluster: String,
    pub eks_role_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeConfig {
    path: PathBuf,
    api_server: String,
    auth: Auth,
    namespace: String,
    tls: TlsPolicy,
}

impl KubeConfig {
    pub fn from_parts(parts: KubeConfigParts) -> Result<Self, KubeConfigError> {
        if parts.path.as_os_str().is_empty() {
            return Err(KubeConfigError::MissingPath);
        }
        if parts.api_server.is_empty() {
            return Err(KubeConfigError::MissingApiServer);
        }
        let auth = match (parts.token.is_empty(), parts.eks_cluster.is_empty()) {
            (true, true) => return Err(KubeConfigError::MissingCredentials),
            (false, false) => return Err(KubeConfigError::ConflictingCredentials),
            (false, true) => Auth::Token(parts.token),
            (true, false) => Auth::Eks {
                cluster: parts.eks_cluster,
                role_arn: Some(parts.eks_role_arn).filter(|arn| !arn.is_empty()),
            },
        };
        if parts.namespace.is_empty() {
            return Err(KubeConfigError::MissingNamespace);
        }
        let tls = if parts.skip_tls {
            TlsPolicy::SkipVerify
        } else if !parts.certificate.is_empty() {
            TlsPolicy::CertificateAuthority(parts.certificate)
        } else {
            TlsPolicy::Verify
        };

        Ok(Self {
            path: parts.path,
            api_server: parts.api_server,
            auth,
            namespace: parts.namespace,
            tls,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn tls(&self) -> &TlsPolicy {
        &self.tls
    }

    /// The kubeconfig document as YAML.
    pub fn render(&self) -> Result<String, KubeConfigError> {
        Ok(serde_yaml::to_string(&self.document())?)
    }

    /// Render and write the file, readable by the owner only.
    pub fn write(&self) -> Result<(), KubeConfigError> {
        let rendered = self.render()?;
        let to_write_error = |source| KubeConfigError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(to_write_error)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(to_write_error)?;
        file.write_all(rendered.as_bytes())
            .map_err(to_write_error)?;

        info!("kubeconfig written to {}", self.path.display());
        debug!(api_server = %self.api_server, namespace = %self.namespace, "kubeconfig context");
        Ok(())
    }

    fn document(&self) -> Document<'_> {
        let cluster = Cluster {
            server: &self.api_server,
            insecure_skip_tls_verify: matches!(self.tls, TlsPolicy::SkipVerify).then_some(true),
            certificate_authority_data: match &self.tls {
                TlsPolicy::CertificateAuthority(data) => Some(data.as_str()),
                _ => None,
            },
        };
        let user = match &self.auth {
            Auth::Token(token) => User {
                token: Some(token.as_str()),
                exec: None,
            },
            Auth::Eks { cluster, role_arn } => {
                let mut args = vec!["token", "-i", cluster.as_str()];
                if let Some(role_arn) = role_arn {
                    args.extend(["-r", role_arn.as_str()]);
                }
                User {
                    token: None,
                    exec: Some(Exec {
                        api_version: EKS_AUTH_API_VERSION,
                        command: EKS_AUTHENTICATOR,
                        args,
                    }),
                }
            }
        };

        Document {
            api_version: "v1",
            kind: "Config",
            current_context: NAME,
            preferences: BTreeMap::new(),
            clusters: vec![Named {
                name: NAME,
                cluster: Some(cluster),
                user: None,
                context: None,
            }],
            users: vec![Named {
                name: NAME,
                cluster: None,
                user: Some(user),
                context: None,
            }],
            contexts: vec![Named {
                name: NAME,
                cluster: None,
                user: None,
                context: Some(Context {
                    cluster: NAME,
                    namespace: &self.namespace,
                    user: NAME,
                }),
            }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Document<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    current_context: &'static str,
    preferences: BTreeMap<String, String>,
    clusters: Vec<Named<'a>>,
    users: Vec<Named<'a>>,
    contexts: Vec<Named<'a>>,
}

/// A named list entry holding exactly one of cluster, user or context.
#[derive(Serialize)]
struct Named<'a> {
    name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<Cluster<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Context<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster<'a> {
    server: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    insecure_skip_tls_verify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_authority_data: Option<&'a str>,
}

#[derive(Serialize)]
struct User<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exec: Option<Exec<'a>>,
}

#[derive(Serialize)]
struct Exec<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    command: &'static str,
    args: Vec<&'a str>,
}

#[derive(Serialize)]
struct Context<'a> {
    cluster: &'static str,
    namespace: &'a str,
    user: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn parts() -> KubeConfigParts {
        KubeConfigParts {
            path: PathBuf::from("/tmp/kubeconfig"),
            api_server: "https://example.com".into(),
            token: "token".into(),
            namespace: "myapp".into(),
            ..Default::default()
        }
    }

    fn rendered(parts: KubeConfigParts) -> Value {
        let config = KubeConfig::from_parts(parts).unwrap();
        serde_yaml::from_str(&config.render().unwrap()).unwrap()
    }

    #[test]
    fn test_token_config() {
        let doc = rendered(parts());

        assert_eq!(doc["apiVersion"], "v1");
        assert_eq!(doc["kind"], "Config");
        assert_eq!(doc["current-context"], "helm");
        assert_eq!(doc["clusters"][0]["name"], "helm");
        assert_eq!(doc["clusters"][0]["cluster"]["server"], "https://example.com");
        assert!(doc["clusters"][0]["cluster"]
            .get("certificate-authority-data")
            .is_none());
        assert!(doc["clusters"][0]["cluster"]
            .get("insecure-skip-tls-verify")
            .is_none());
        assert_eq!(doc["users"][0]["user"]["token"], "token");
        assert_eq!(doc["contexts"][0]["context"]["namespace"], "myapp");
        assert_eq!(doc["contexts"][0]["context"]["cluster"], "helm");
        assert_eq!(doc["contexts"][0]["context"]["user"], "helm");
    }

    #[test]
    fn test_certificate_config() {
        let doc = rendered(KubeConfigParts {
            certificate: "CERTDATA".into(),
            ..parts()
        });
        assert_eq!(
            doc["clusters"][0]["cluster"]["certificate-authority-data"],
            "CERTDATA"
        );
    }

    #[test]
    fn test_skip_tls_wins_over_certificate() {
        let doc = rendered(KubeConfigParts {
            certificate: "CERTDATA".into(),
            skip_tls: true,
            ..parts()
        });
        let cluster = &doc["clusters"][0]["cluster"];
        assert_eq!(cluster["insecure-skip-tls-verify"], true);
        assert!(cluster.get("certificate-authority-data").is_none());
    }

    #[test]
    fn test_eks_config() {
        let doc = rendered(KubeConfigParts {
            token: String::new(),
            eks_cluster: "my-cluster".into(),
            eks_role_arn: "arn:aws:iam::123:role/deploy".into(),
            ..parts()
        });

        let exec = &doc["users"][0]["user"]["exec"];
        assert_eq!(exec["apiVersion"], EKS_AUTH_API_VERSION);
        assert_eq!(exec["command"], "aws-iam-authenticator");
        let args: Vec<&str> = exec["args"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(
            args,
            ["token", "-i", "my-cluster", "-r", "arn:aws:iam::123:role/deploy"]
        );
        assert!(doc["users"][0]["user"].get("token").is_none());
    }

    #[test]
    fn test_eks_without_role() {
        let config = KubeConfig::from_parts(KubeConfigParts {
            token: String::new(),
            eks_cluster: "my-cluster".into(),
            ..parts()
        })
        .unwrap();
        assert_eq!(
            config.auth(),
            &Auth::Eks {
                cluster: "my-cluster".into(),
                role_arn: None
            }
        );
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            (
                KubeConfigParts {
                    path: PathBuf::new(),
                    ..parts()
                },
                "no path to kubeconfig provided",
            ),
            (
                KubeConfigParts {
                    api_server: String::new(),
                    ..parts()
                },
                "no kubernetes api server provided",
            ),
            (
                KubeConfigParts {
                    token: String::new(),
                    ..parts()
                },
                "no kubernetes token provided",
            ),
            (
                KubeConfigParts {
                    eks_cluster: "my-cluster".into(),
                    ..parts()
                },
                "token cannot be used simultaneously with eksCluster",
            ),
            (
                KubeConfigParts {
                    namespace: String::new(),
                    ..parts()
                },
                "no namespace provided",
            ),
        ];

        for (parts, expected) in cases {
            let err = KubeConfig::from_parts(parts).unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_write_creates_private_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".kube").join("config");
        let config = KubeConfig::from_parts(KubeConfigParts {
            path: path.clone(),
            ..parts()
        })
        .unwrap();

        config.write().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let doc: Value = serde_yaml::from_str(&content).unwrap();
        assert_eq!(doc["users"][0]["user"]["token"], "token");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "x".repeat(10_000)).unwrap();

        KubeConfig::from_parts(KubeConfigParts {
            path: path.clone(),
            ..parts()
        })
        .unwrap()
        .write()
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("xxx"));
    }
}
