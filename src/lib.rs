//! SimplISS NFSe client
//!
//! Dispatches requests to the SimplISS family of municipal electronic
//! service invoice (NFSe) web services over SOAP 1.2.
//!
//! # Features
//!
//! - Per-municipality service catalog lookup (production and staging)
//! - `cabecalho` header and CDATA-wrapped request envelope assembly
//! - Validate-if-present schema checks, advisory or enforced
//! - Blocking HTTPS transport with mutual TLS and optional proxy
//! - Response normalization across server envelope variants
//! - Single-slot audit of the last request and response
//!
//! # Example
//!
//! ```ignore
//! use simpliss_nfse::{Certificate, ClientConfig, NfseClient};
//!
//! let config = ClientConfig::from_path("config.json".as_ref())?;
//! let certificate = Certificate::from_pem_files("cert.pem".as_ref(), "key.pem".as_ref())?;
//! let mut client = NfseClient::new(config, certificate)?;
//!
//! let result = client.dispatch("ConsultarNfseServicoTomado", &request_xml)?;
//! if let Some(fault) = result.fault() {
//!     eprintln!("{}: {}", fault.code, fault.reason);
//! }
//! println!("{}", result.cleaned);
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod documents;
pub mod envelope;
pub mod error;
pub mod header;
pub mod normalizer;
pub mod timezone;
pub mod transport;
pub mod validator;

pub use catalog::{Catalog, ServiceDescriptor};
pub use client::{DispatchContext, DispatchResult, NfseClient};
pub use config::{ClientConfig, Environment, ProtocolVersion};
pub use error::{NfseError, TransportError};
pub use transport::{Certificate, HttpTransport, Transport};
