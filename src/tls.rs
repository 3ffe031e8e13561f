//! Mutual TLS for validator clients.
//!
//! When `SIGNER_MTLS_*` paths are configured, the server only accepts clients
//! presenting a certificate issued by the configured CA:
//!
//! ```ignore
//! if let Some(config) = server_config(&settings)? {
//!     server.bind_rustls_0_23(addr, config)?.run().await
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::config::Settings;
use crate::error::{SignerError, SignerResult};

fn open(path: &Path, what: &str) -> SignerResult<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        SignerError::TlsConfig(format!("Failed to open {what} file {}: {e}", path.display()))
    })
}

fn load_certs(path: &Path) -> SignerResult<Vec<CertificateDer<'static>>> {
    let mut reader = open(path, "certificate")?;

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            SignerError::TlsConfig(format!(
                "Failed to parse certificates from {}: {e}",
                path.display()
            ))
        })?;

    if certs.is_empty() {
        return Err(SignerError::TlsConfig(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// PKCS#8, RSA, or SEC1 private key.
fn load_private_key(path: &Path) -> SignerResult<PrivateKeyDer<'static>> {
    let mut reader = open(path, "key")?;

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            SignerError::TlsConfig(format!(
                "Failed to parse private key from {}: {e}",
                path.display()
            ))
        })?
        .ok_or_else(|| {
            SignerError::TlsConfig(format!("No private key found in {}", path.display()))
        })
}

/// Build the rustls server config requiring client certificates from `ca_path`.
pub fn load_server_config(
    ca_path: &Path,
    cert_path: &Path,
    key_path: &Path,
) -> SignerResult<ServerConfig> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots.add(cert).map_err(|e| {
            SignerError::TlsConfig(format!("Failed to add CA certificate to root store: {e}"))
        })?;
    }

    let cert_chain = load_certs(cert_path)?;
    check_key_permissions(key_path);
    let private_key = load_private_key(key_path)?;

    let client_verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| SignerError::TlsConfig(format!("Failed to build client verifier: {e}")))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| SignerError::TlsConfig(format!("Failed to build server config: {e}")))?;

    tracing::info!(
        ca = %ca_path.display(),
        cert = %cert_path.display(),
        "Loaded mTLS server configuration"
    );
    Ok(config)
}

/// Server config from settings, or `None` when mTLS is not configured.
pub fn server_config(settings: &Settings) -> SignerResult<Option<ServerConfig>> {
    match (
        settings.mtls_ca_path(),
        settings.mtls_cert_path(),
        settings.mtls_key_path(),
    ) {
        (Some(ca), Some(cert), Some(key)) => load_server_config(ca, cert, key).map(Some),
        (None, None, None) => Ok(None),
        _ => Err(SignerError::TlsConfig(
            "SIGNER_MTLS_CA_PATH, SIGNER_MTLS_CERT_PATH and SIGNER_MTLS_KEY_PATH must be set together"
                .to_string(),
        )),
    }
}

/// Warn when a secret file is readable by group or others.
///
/// Returns `true` when the permissions are acceptable or cannot be checked.
#[cfg(unix)]
pub fn check_key_permissions(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = std::fs::metadata(path) else {
        return true;
    };
    let mode = metadata.permissions().mode();
    if mode & 0o044 != 0 {
        tracing::warn!(
            path = %path.display(),
            mode = format!("{mode:o}"),
            "Secret file is readable by group or others. Consider running: chmod 600 {}",
            path.display()
        );
        return false;
    }
    true
}

#[cfg(not(unix))]
pub fn check_key_permissions(_path: &Path) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer,
        KeyPair, KeyUsagePurpose,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// CA plus a server certificate signed by it: (ca, cert, key).
    fn generate_server_certs(temp_dir: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
        let ca_key_pair = KeyPair::generate().expect("CA key generation failed");
        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "Validator Client CA");
        ca_params.key_usages.push(KeyUsagePurpose::KeyCertSign);
        let ca_cert = ca_params
            .self_signed(&ca_key_pair)
            .expect("CA generation failed");
        let ca_issuer = Issuer::from_params(&ca_params, &ca_key_pair);

        let server_key_pair = KeyPair::generate().expect("Server key generation failed");
        let mut server_params = CertificateParams::default();
        server_params
            .distinguished_name
            .push(DnType::CommonName, "validator-signer");
        server_params
            .key_usages
            .push(KeyUsagePurpose::DigitalSignature);
        server_params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ServerAuth);
        let server_cert = server_params
            .signed_by(&server_key_pair, &ca_issuer)
            .expect("Server cert generation failed");

        let ca_path = temp_dir.path().join("ca.pem");
        let cert_path = temp_dir.path().join("server.pem");
        let key_path = temp_dir.path().join("server.key");
        std::fs::write(&ca_path, ca_cert.pem()).expect("Write CA failed");
        std::fs::write(&cert_path, server_cert.pem()).expect("Write server cert failed");
        std::fs::write(&key_path, server_key_pair.serialize_pem()).expect("Write key failed");

        (ca_path, cert_path, key_path)
    }

    #[test]
    fn test_load_server_config() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (ca, cert, key) = generate_server_certs(&temp_dir);

        let config = load_server_config(&ca, &cert, &key);
        assert!(config.is_ok(), "Failed to load server config: {config:?}");
    }

    #[test]
    fn test_server_config_disabled_without_paths() {
        let config = server_config(&Settings::for_tests()).expect("no mTLS settings");
        assert!(config.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_certs(Path::new("/nonexistent/path.pem")).unwrap_err();
        assert!(err.to_string().contains("Failed to open certificate file"));
    }

    #[test]
    fn test_load_empty_cert_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let empty_path = temp_dir.path().join("empty.pem");
        std::fs::write(&empty_path, "").expect("Write failed");

        let err = load_certs(&empty_path).unwrap_err();
        assert!(err.to_string().contains("No certificates"));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_key_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("secret.key");
        std::fs::write(&path, "secret").expect("Write failed");

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(check_key_permissions(&path));

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!check_key_permissions(&path));
    }
}
