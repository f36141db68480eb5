use crate::{configuration::Configuration, tls};
use anyhow::{Context, Result};
use idbridge_domain_handlers::handler::BackendHandler;
use idbridge_ldap::LdapHandler;
use ldap3_proto::{
    control::LdapControl,
    proto::{LdapMsg, LdapOp},
    LdapCodec,
};
use std::collections::VecDeque;
use tokio::{net::TcpListener, task::JoinSet};
use tokio_rustls::TlsAcceptor;
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

#[instrument(skip_all, level = "info", name = "LDAP request", fields(session_id = %session.session_uuid(), msgid = msg.msgid))]
async fn handle_ldap_message<Backend, Writer>(
    msg: LdapMsg,
    resp: &mut Writer,
    session: &mut LdapHandler<Backend>,
    request_cancellation: CancellationToken,
) -> Result<bool>
where
    Backend: BackendHandler,
    Writer: futures_util::Sink<LdapMsg> + Unpin,
    <Writer as futures_util::Sink<LdapMsg>>::Error: std::error::Error + Send + Sync + 'static,
{
    use futures_util::SinkExt;
    for control in msg.ctrl.iter() {
        if let LdapControl::Unknown { oid, .. } = control {
            info!("Received unknown control: {}, ignoring", oid);
        }
    }
    debug!(?msg);
    match session
        .handle_cancellable_ldap_message(msg.op, request_cancellation)
        .await
    {
        None => return Ok(false),
        Some(result) => {
            if result.is_empty() {
                debug!("No response");
                return Ok(true);
            }
            for response in result.into_iter() {
                debug!(?response);
                resp.send(LdapMsg {
                    msgid: msg.msgid,
                    op: response,
                    ctrl: vec![],
                })
                .await
                .context("while sending a response")?
            }

            resp.flush().await.context("while flushing responses")?
        }
    }
    Ok(true)
}

/// Serves one client connection until it unbinds, disconnects or the server
/// shuts down.
///
/// Requests are answered one at a time. While one is running, the stream is
/// still read: an end of stream cancels the session token, an abandon of the
/// running request cancels only that request, and anything else is queued.
async fn handle_ldap_stream<Stream, Backend>(
    stream: Stream,
    backend_handler: Backend,
    cancellation: CancellationToken,
) -> Result<()>
where
    Backend: BackendHandler,
    Stream: tokio::io::AsyncRead + tokio::io::AsyncWrite + std::marker::Unpin,
{
    use tokio_stream::StreamExt;
    let (r, w) = tokio::io::split(stream);
    let mut requests = FramedRead::new(r, LdapCodec::default());
    let mut resp = FramedWrite::new(w, LdapCodec::default());

    let session_uuid = Uuid::new_v4();
    let mut session = LdapHandler::new(backend_handler, session_uuid, cancellation.clone());

    info!("LDAP session start: {}", session_uuid);
    let mut pending: VecDeque<LdapMsg> = VecDeque::new();
    let mut disconnected = false;
    let result = async {
        loop {
            let msg = match pending.pop_front() {
                Some(msg) if !cancellation.is_cancelled() => msg,
                _ => tokio::select! {
                    _ = cancellation.cancelled() => {
                        debug!("Session cancelled, closing it");
                        break;
                    }
                    msg = requests.next() => match msg {
                        Some(msg) => msg.context("while receiving LDAP op")?,
                        None => break,
                    },
                },
            };
            let msgid = msg.msgid;
            let request_cancellation = cancellation.child_token();
            let handling = handle_ldap_message(
                msg,
                &mut resp,
                &mut session,
                request_cancellation.clone(),
            );
            tokio::pin!(handling);
            let keep_going = loop {
                tokio::select! {
                    keep_going = &mut handling => {
                        break keep_going.context("while handling incoming messages")?;
                    }
                    next = requests.next(), if !disconnected => match next {
                        None => {
                            debug!("Client disconnected during message {}", msgid);
                            disconnected = true;
                            cancellation.cancel();
                        }
                        Some(Ok(LdapMsg {
                            op: LdapOp::AbandonRequest(abandoned),
                            ..
                        })) if abandoned == msgid => {
                            debug!("Abandoning message {}", msgid);
                            request_cancellation.cancel();
                        }
                        Some(next) => {
                            pending.push_back(next.context("while receiving LDAP op")?);
                        }
                    },
                }
            };
            if !keep_going || disconnected {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;
    cancellation.cancel();
    info!("LDAP session end: {}", session_uuid);
    result
}

async fn serve<Backend>(
    name: &'static str,
    listener: TcpListener,
    backend_handler: Backend,
    tls_acceptor: Option<TlsAcceptor>,
    shutdown: CancellationToken,
) where
    Backend: BackendHandler + Clone + 'static,
{
    let mut connections = JoinSet::new();
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("[{}] Error accepting a connection: {:#}", name, e);
                    continue;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
        };
        debug!("[{}] New connection from {}", name, peer);
        let backend_handler = backend_handler.clone();
        let tls_acceptor = tls_acceptor.clone();
        let cancellation = shutdown.child_token();
        connections.spawn(async move {
            let result = match tls_acceptor {
                Some(tls_acceptor) => match tls_acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        handle_ldap_stream(tls_stream, backend_handler, cancellation).await
                    }
                    Err(e) => Err(anyhow::Error::from(e).context("during the TLS handshake")),
                },
                None => handle_ldap_stream(stream, backend_handler, cancellation).await,
            };
            if let Err(e) = result {
                error!("[{}] Service Error: {:#}", name, e);
            }
        });
    }
    info!("[{}] Waiting for {} open sessions", name, connections.len());
    while connections.join_next().await.is_some() {}
}

/// Binds the LDAP listener, and the LDAPS one if enabled, then spawns their
/// accept loops. The returned set completes once `shutdown` is cancelled
/// and every open session has ended.
pub async fn build_ldap_server<Backend>(
    config: &Configuration,
    backend_handler: Backend,
    shutdown: CancellationToken,
) -> Result<JoinSet<()>>
where
    Backend: BackendHandler + Clone + 'static,
{
    let mut servers = JoinSet::new();

    info!("Starting the LDAP server on port {}", config.ldap_port);
    let listener = TcpListener::bind((config.ldap_host.as_str(), config.ldap_port))
        .await
        .with_context(|| format!("while binding to the port {}", config.ldap_port))?;
    servers.spawn(serve(
        "LDAP",
        listener,
        backend_handler.clone(),
        None,
        shutdown.clone(),
    ));

    if config.ldaps_options.enabled {
        let tls_acceptor = tls::get_tls_acceptor(&config.ldaps_options)
            .context("while setting up the SSL certificate")?;
        info!(
            "Starting the LDAPS server on port {}",
            config.ldaps_options.port
        );
        let listener = TcpListener::bind((config.ldap_host.as_str(), config.ldaps_options.port))
            .await
            .with_context(|| format!("while binding to the port {}", config.ldaps_options.port))?;
        servers.spawn(serve(
            "LDAPS",
            listener,
            backend_handler,
            Some(tls_acceptor),
            shutdown,
        ));
    }
    Ok(servers)
}
