use crate::{configuration::LdapsOptions, tls};
use anyhow::{anyhow, bail, ensure, Context, Result};
use futures_util::SinkExt;
use ldap3_proto::{
    proto::{LdapMsg, LdapOp, LdapResultCode, LdapWhoamiRequest},
    LdapCodec,
};
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    DigitallySignedStruct, SignatureScheme,
};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, instrument};

/// Sends an anonymous WhoAmI and expects an empty, successful answer. It
/// needs no credentials and never reaches the identity store.
async fn check_ldap_endpoint<Stream>(stream: Stream) -> Result<()>
where
    Stream: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    use tokio_stream::StreamExt;
    let (r, w) = tokio::io::split(stream);
    let mut responses = FramedRead::new(r, LdapCodec::default());
    let mut requests = FramedWrite::new(w, LdapCodec::default());

    requests
        .send(LdapMsg {
            msgid: 1,
            op: LdapOp::ExtendedRequest(LdapWhoamiRequest {}.into()),
            ctrl: vec![],
        })
        .await?;
    requests.flush().await?;

    let invalid_answer = "Invalid answer from LDAP server";
    let msg = responses
        .next()
        .await
        .ok_or_else(|| anyhow!("No answer from LDAP server"))?
        .context(invalid_answer)?;
    debug!("Received message: {:?}", &msg);
    match msg.op {
        LdapOp::ExtendedResponse(response) => ensure!(
            msg.msgid == 1 && response.res.code == LdapResultCode::Success,
            invalid_answer
        ),
        _ => bail!(invalid_answer),
    }
    requests
        .send(LdapMsg {
            msgid: 2,
            op: LdapOp::UnbindRequest,
            ctrl: vec![],
        })
        .await?;
    info!("Success");
    requests.close().await?;
    Ok(())
}

#[instrument(level = "info", err)]
pub async fn check_ldap(host: &str, port: u16) -> Result<()> {
    check_ldap_endpoint(TcpStream::connect((host, port)).await?).await
}

/// Accepts exactly the certificate configured for the LDAPS listener.
#[derive(Debug)]
struct PinnedCertificateVerifier {
    certificate: CertificateDer<'static>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedCertificateVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if end_entity != &self.certificate {
            return Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::NotValidForName,
            ));
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn get_tls_connector(ldaps_options: &LdapsOptions) -> Result<TlsConnector> {
    let certificate = tls::load_certificates(&ldaps_options.cert_file)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty certificate chain in {}", ldaps_options.cert_file))?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(PinnedCertificateVerifier {
        certificate,
        provider: provider.clone(),
    });
    let client_config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("Failed to set default protocol versions")?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok(Arc::new(client_config).into())
}

#[instrument(skip_all, level = "info", err, fields(host = %host, port = %ldaps_options.port))]
pub async fn check_ldaps(host: &str, ldaps_options: &LdapsOptions) -> Result<()> {
    if !ldaps_options.enabled {
        info!("LDAPS not enabled");
        return Ok(());
    };
    let tls_connector =
        get_tls_connector(ldaps_options).context("while preparing the tls connection")?;

    let domain = ServerName::try_from(host.to_string())
        .map_err(|_| anyhow!("Invalid DNS name: {}", host))?;

    check_ldap_endpoint(
        tls_connector
            .connect(
                domain,
                TcpStream::connect((host, ldaps_options.port))
                    .await
                    .context("while connecting TCP")?,
            )
            .await
            .context("while connecting TLS")?,
    )
    .await
}
