//! SOAP transport.
//!
//! The client only depends on the [`Transport`] trait; [`HttpTransport`] is
//! the default blocking implementation with mutual TLS and optional proxy.

use crate::config::ProxySettings;
use crate::envelope::{render_soap_envelope, SoapBinding};
use crate::error::{NfseError, TransportError};
use crate::header::SoapHeader;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use ureq::tls::{Certificate as TlsCertificate, ClientCert, PrivateKey, TlsConfig};
use ureq::{Agent, Proxy};

/// Identity material for mutual TLS. Never inspected by the dispatcher.
#[derive(Clone, Default)]
pub struct Certificate {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl Certificate {
    pub fn from_pem(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    /// Read a PEM certificate and its PEM private key from disk.
    pub fn from_pem_files(cert: &Path, key: &Path) -> Result<Self, NfseError> {
        Ok(Self::from_pem(std::fs::read(cert)?, std::fs::read(key)?))
    }

    pub fn is_empty(&self) -> bool {
        self.cert_pem.is_empty()
    }

    fn client_cert(&self) -> Result<Option<ClientCert>, TransportError> {
        if self.is_empty() {
            return Ok(None);
        }
        let cert = TlsCertificate::from_pem(&self.cert_pem)
            .map_err(|e| TransportError::Certificate(format!("invalid certificate: {}", e)))?;
        let key = PrivateKey::from_pem(&self.key_pem)
            .map_err(|e| TransportError::Certificate(format!("invalid private key: {}", e)))?;
        Ok(Some(ClientCert::new_with_certs(&[cert], key)))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Everything a transport needs to send one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub url: String,
    pub method: String,
    /// Quoted SOAP action
    pub action: String,
    pub binding: SoapBinding,
    /// Extra HTTP headers
    pub headers: Vec<(String, String)>,
    /// Namespace declarations for the outer envelope
    pub namespaces: Vec<(String, String)>,
    /// Operation envelope placed inside the SOAP Body
    pub body: String,
    pub header: Option<SoapHeader>,
}

impl SoapRequest {
    /// Render the document that goes on the wire.
    pub fn render(&self) -> String {
        render_soap_envelope(self.binding, &self.namespaces, self.header.as_ref(), &self.body)
    }
}

/// Exact bytes exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapExchange {
    /// Outbound document
    pub request: String,
    /// Raw inbound body
    pub response: String,
}

/// A SOAP-capable transport.
pub trait Transport {
    fn send(&mut self, request: &SoapRequest) -> Result<SoapExchange, TransportError>;
}

/// Blocking HTTPS transport backed by `ureq`.
pub struct HttpTransport {
    agent: Agent,
}

impl HttpTransport {
    /// Build the agent once, bound to the certificate and proxy settings.
    pub fn new(
        certificate: &Certificate,
        proxy: &ProxySettings,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut tls = TlsConfig::builder();
        if let Some(client_cert) = certificate.client_cert()? {
            tls = tls.client_cert(Some(client_cert));
        }

        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .tls_config(tls.build());

        if let Some(url) = proxy.url() {
            debug!(host = ?proxy.proxy_host, port = ?proxy.proxy_port, "Using proxy");
            let proxy = Proxy::new(&url).map_err(|e| TransportError::Proxy(e.to_string()))?;
            builder = builder.proxy(Some(proxy));
        }

        Ok(Self {
            agent: builder.build().into(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, request: &SoapRequest) -> Result<SoapExchange, TransportError> {
        let envelope = request.render();
        let content_type = match request.binding {
            SoapBinding::Soap12 => format!(
                "application/soap+xml;charset=utf-8;action={}",
                request.action
            ),
            SoapBinding::Soap11 => "text/xml; charset=utf-8".to_string(),
        };

        let mut http = self
            .agent
            .post(request.url.as_str())
            .header("Content-Type", content_type.as_str());
        if request.binding == SoapBinding::Soap11 {
            http = http.header("SOAPAction", request.action.as_str());
        }
        for (name, value) in &request.headers {
            http = http.header(name.as_str(), value.as_str());
        }

        debug!(
            url = %request.url,
            method = %request.method,
            bytes = envelope.len(),
            "Sending SOAP request"
        );

        let mut response = http
            .send(envelope.clone())
            .map_err(|e| TransportError::Request {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::Request {
                url: request.url.clone(),
                message: format!("failed to read response body: {}", e),
            })?;

        debug!(url = %request.url, status = status.as_u16(), bytes = body.len(), "SOAP response received");

        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                url: request.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(SoapExchange {
            request: envelope,
            response: body,
        })
    }
}
