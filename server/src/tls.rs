use crate::configuration::LdapsOptions;
use anyhow::{anyhow, Context, Result};
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

pub fn load_certificates(filename: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(filename)
        .with_context(|| format!("Unable to open or read certificate file: {}", filename))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Error parsing certificates in {}", filename))?;

    if certs.is_empty() {
        return Err(anyhow!("No certificates found in {}", filename));
    }

    Ok(certs)
}

pub fn load_private_key(filename: &str) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(filename)
        .with_context(|| format!("Unable to load private key from {}", filename))
}

/// Builds the acceptor wrapping LDAPS connections from the configured PEM
/// files.
pub fn get_tls_acceptor(ldaps_options: &LdapsOptions) -> Result<TlsAcceptor> {
    let certs = load_certificates(&ldaps_options.cert_file)?;
    let private_key = load_private_key(&ldaps_options.key_file)?;
    let server_config = rustls::ServerConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .context("Failed to set default protocol versions")?
    .with_no_client_auth()
    .with_single_cert(certs, private_key)
    .context("Invalid certificate or private key")?;
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
