//! NFSe client: service resolution, envelope assembly and dispatch.
//!
//! A client owns the session settings (layout version, environment), the
//! cached service catalog, the transport and the single-slot audit log.
//! Every dispatch takes `&mut self`, so one instance serves one caller at a
//! time; share it across threads behind a `Mutex` if needed.

use crate::catalog::{catalog_path, Catalog, ServiceDescriptor};
use crate::config::{ClientConfig, Environment, ProtocolVersion, ValidationPolicy};
use crate::documents::ServicoTomadoQuery;
use crate::envelope::{build_envelope, envelope_namespaces, soap_action, SoapBinding, PORTAL_NAMESPACE};
use crate::error::{NfseError, TransportError};
use crate::header::SoapHeader;
use crate::normalizer::{clean_with, parse_fault, SoapFault};
use crate::timezone::timezone_for_uf;
use crate::transport::{Certificate, HttpTransport, SoapExchange, SoapRequest, Transport};
use crate::validator::{validate_if_present, SchemaValidator, WellFormedValidator};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-call values derived from a resolved service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    pub namespace: String,
    /// Quoted SOAP action
    pub action: String,
    /// `cabecalho` fragment embedded in the request
    pub header_xml: String,
    pub soap_header: SoapHeader,
}

impl DispatchContext {
    pub fn for_service(descriptor: &ServiceDescriptor, version: ProtocolVersion) -> Self {
        let digit = version.header_digit();
        let soap_header = SoapHeader::cabecalho(PORTAL_NAMESPACE, digit);
        Self {
            namespace: PORTAL_NAMESPACE.to_string(),
            action: soap_action(&descriptor.method),
            header_xml: soap_header.xml.clone(),
            soap_header,
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub descriptor: ServiceDescriptor,
    pub context: DispatchContext,
    /// Document sent to the server
    pub request: String,
    /// Body received, untouched
    pub raw_response: String,
    /// Body with the SOAP envelope and vendor prefixes removed
    pub cleaned: String,
    /// Advisory schema issues; empty when valid or unchecked
    pub validation_issues: Vec<String>,
    pub sent_at: DateTime<Utc>,
}

impl DispatchResult {
    /// SOAP Fault carried by the response, if any.
    pub fn fault(&self) -> Option<SoapFault> {
        parse_fault(&self.cleaned)
    }
}

/// Last request and response, overwritten on every exchange that reached
/// the server, including HTTP error responses.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    last_request: String,
    last_response: String,
}

impl AuditLog {
    fn record(&mut self, exchange: &SoapExchange) {
        self.last_request.clone_from(&exchange.request);
        self.last_response.clone_from(&exchange.response);
    }

    pub fn last_request(&self) -> &str {
        &self.last_request
    }

    pub fn last_response(&self) -> &str {
        &self.last_response
    }
}

/// SimplISS NFSe client.
pub struct NfseClient {
    config: ClientConfig,
    version: ProtocolVersion,
    environment: Environment,
    timezone: &'static str,
    certificate: Certificate,
    transport: Option<Box<dyn Transport>>,
    validator: Box<dyn SchemaValidator>,
    /// Catalog parsed for `version`
    catalog: Option<Catalog>,
    audit: AuditLog,
}

impl NfseClient {
    /// Create a client, validating the configuration.
    pub fn new(config: ClientConfig, certificate: Certificate) -> Result<Self, NfseError> {
        let version: ProtocolVersion = config.version.parse()?;
        let timezone = timezone_for_uf(&config.jurisdiction).ok_or_else(|| {
            NfseError::Config(format!(
                "Unknown state acronym [{}], cannot determine time zone",
                config.jurisdiction
            ))
        })?;

        let mut client = Self {
            config,
            version,
            environment: Environment::default(),
            timezone,
            certificate,
            transport: None,
            validator: Box::new(WellFormedValidator),
            catalog: None,
            audit: AuditLog::default(),
        };

        if let Some(flag) = client.config.environment {
            client.set_environment_flag(flag);
        }

        info!(
            version = %client.version,
            environment = %client.environment,
            municipality = %client.config.municipality,
            timezone = client.timezone,
            "NFSe client initialized"
        );

        Ok(client)
    }

    /// Attach a transport; otherwise an [`HttpTransport`] is created on first dispatch.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Replace the schema validator.
    pub fn with_validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Switch the layout version. On error nothing changes.
    pub fn set_version(&mut self, version: &str) -> Result<ProtocolVersion, NfseError> {
        let version: ProtocolVersion = version.parse()?;
        if version != self.version {
            info!(from = %self.version, to = %version, "Switching layout version");
            self.catalog = None;
        }
        self.version = version;
        Ok(version)
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    /// Set the environment from its numeric flag. Values other than 1 or 2
    /// are ignored and `false` is returned.
    pub fn set_environment_flag(&mut self, flag: i64) -> bool {
        match Environment::from_flag(flag) {
            Some(environment) => {
                self.environment = environment;
                true
            }
            None => {
                warn!(flag, current = %self.environment, "Ignoring invalid environment flag");
                false
            }
        }
    }

    /// Time zone of the configured state.
    pub fn timezone(&self) -> &'static str {
        self.timezone
    }

    /// Catalog file for the active version.
    pub fn catalog_path(&self) -> PathBuf {
        catalog_path(&self.config.storage_dir, self.version)
    }

    /// Schema directory for the active version.
    pub fn schema_dir(&self) -> PathBuf {
        self.config.schemes_dir.join(self.version.scheme_set())
    }

    /// Drop the cached catalog so the next call re-reads it.
    pub fn reload_catalog(&mut self) {
        self.catalog = None;
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn last_request(&self) -> &str {
        self.audit.last_request()
    }

    pub fn last_response(&self) -> &str {
        self.audit.last_response()
    }

    /// Resolve an operation and derive its dispatch context.
    pub fn resolve_service(
        &mut self,
        service: &str,
        municipality: &str,
        environment: Environment,
    ) -> Result<(ServiceDescriptor, DispatchContext), NfseError> {
        let version = self.version;
        let descriptor = self.catalog()?.resolve(service, municipality, environment)?;
        let context = DispatchContext::for_service(&descriptor, version);

        debug!(
            service,
            municipality,
            environment = %environment,
            url = %descriptor.url,
            method = %descriptor.method,
            action = %context.action,
            "Service resolved"
        );

        Ok((descriptor, context))
    }

    /// Send a request body to an operation and return the raw response.
    pub fn call(
        &mut self,
        operation: &str,
        municipality: &str,
        environment: Environment,
        body_xml: &str,
        extra_headers: &[(String, String)],
    ) -> Result<String, NfseError> {
        self.execute(operation, municipality, environment, body_xml, extra_headers)
            .map(|result| result.raw_response)
    }

    /// Send a request body for the configured municipality and active
    /// environment; the response comes back normalized.
    pub fn dispatch(&mut self, operation: &str, body_xml: &str) -> Result<DispatchResult, NfseError> {
        let municipality = self.config.municipality.clone();
        let environment = self.environment;
        self.execute(operation, &municipality, environment, body_xml, &[])
    }

    /// Query invoices taken by the consulting party.
    pub fn consultar_nfse_servico_tomado(
        &mut self,
        query: &ServicoTomadoQuery,
    ) -> Result<DispatchResult, NfseError> {
        self.dispatch(ServicoTomadoQuery::OPERATION, &query.to_xml())
    }

    fn execute(
        &mut self,
        operation: &str,
        municipality: &str,
        environment: Environment,
        body_xml: &str,
        extra_headers: &[(String, String)],
    ) -> Result<DispatchResult, NfseError> {
        let (descriptor, context) = self.resolve_service(operation, municipality, environment)?;

        let validation_issues = match validate_if_present(
            self.validator.as_ref(),
            &self.config.schemes_dir,
            self.version,
            &descriptor.method,
            body_xml,
        ) {
            Ok(()) => Vec::new(),
            Err(issues) => match self.config.validation {
                ValidationPolicy::Enforce => {
                    warn!(operation, issues = issues.len(), "Request rejected by schema validation");
                    return Err(NfseError::Validation {
                        operation: operation.to_string(),
                        version: self.version.to_string(),
                        issues,
                    });
                }
                ValidationPolicy::Advisory => {
                    warn!(
                        operation,
                        issues = issues.len(),
                        "Request failed schema validation, sending anyway (validation=advisory)"
                    );
                    issues
                }
            },
        };

        let request = SoapRequest {
            url: descriptor.url.clone(),
            method: descriptor.method.clone(),
            action: context.action.clone(),
            binding: SoapBinding::Soap12,
            headers: extra_headers.to_vec(),
            namespaces: envelope_namespaces(SoapBinding::Soap12),
            body: build_envelope(&descriptor.operation, body_xml, &context.header_xml),
            header: Some(context.soap_header.clone()),
        };

        info!(
            operation,
            municipality,
            environment = %environment,
            url = %descriptor.url,
            "Dispatching NFSe request"
        );

        let sent_at = Utc::now();
        let sent = self.transport()?.send(&request);
        let exchange = match sent {
            Ok(exchange) => exchange,
            Err(err) => {
                // The server answered; keep what went out and what came back.
                if let TransportError::HttpStatus { ref body, .. } = err {
                    self.audit.record(&SoapExchange {
                        request: request.render(),
                        response: body.clone(),
                    });
                }
                return Err(err.into());
            }
        };
        self.audit.record(&exchange);

        let cleaned = clean_with(&exchange.response, self.config.body_extraction);
        debug!(
            operation,
            response_bytes = exchange.response.len(),
            cleaned_bytes = cleaned.len(),
            "Response normalized"
        );

        Ok(DispatchResult {
            descriptor,
            context,
            request: exchange.request,
            raw_response: exchange.response,
            cleaned,
            validation_issues,
            sent_at,
        })
    }

    fn catalog(&mut self) -> Result<&Catalog, NfseError> {
        let catalog = match self.catalog.take() {
            Some(catalog) => catalog,
            None => {
                let path = self.catalog_path();
                debug!(path = %path.display(), version = %self.version, "Loading service catalog");
                Catalog::load(&path)?
            }
        };
        Ok(self.catalog.insert(catalog))
    }

    fn transport(&mut self) -> Result<&mut (dyn Transport + 'static), NfseError> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                debug!("No transport attached, creating HTTP transport");
                Box::new(HttpTransport::new(
                    &self.certificate,
                    &self.config.proxy,
                    Duration::from_secs(self.config.timeout_secs),
                )?)
            }
        };
        Ok(self.transport.insert(transport).as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const CATALOG: &str = r#"<WS>
  <UF>
    <sigla>3538709</sigla>
    <homologacao>
      <ConsultarNfseServicoTomado method="ConsultarNfseServicoTomado" operation="ConsultarNfseServicoTomado" version="2.03">https://homologacao.example.org/nfse</ConsultarNfseServicoTomado>
      <GerarNfse method="GerarNfse" operation="GerarNfse" version="2.03"></GerarNfse>
    </homologacao>
    <producao>
      <ConsultarNfseServicoTomado method="ConsultarNfseServicoTomado" operation="ConsultarNfseServicoTomado" version="2.03">https://producao.example.org/nfse</ConsultarNfseServicoTomado>
    </producao>
  </UF>
</WS>"#;

    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Rc<RefCell<Vec<SoapRequest>>>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, request: &SoapRequest) -> Result<SoapExchange, TransportError> {
            self.sent.borrow_mut().push(request.clone());
            Ok(SoapExchange {
                request: request.render(),
                response: "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
                           <soap:Body><ns2:Resposta>ok</ns2:Resposta></soap:Body></soap:Envelope>"
                    .to_string(),
            })
        }
    }

    fn fixture() -> (tempfile::TempDir, ClientConfig) {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("storage");
        std::fs::create_dir_all(&storage).unwrap();
        std::fs::write(storage.join("wsnfe_2.03_mod.xml"), CATALOG).unwrap();

        let mut config = ClientConfig::new("2.03", "SP", "3538709");
        config.storage_dir = storage;
        config.schemes_dir = dir.path().join("schemes");
        (dir, config)
    }

    #[test]
    fn test_new_defaults_to_staging() {
        let (_dir, config) = fixture();
        let client = NfseClient::new(config, Certificate::default()).unwrap();
        assert_eq!(client.environment(), Environment::Staging);
        assert_eq!(client.version(), ProtocolVersion::V2_03);
        assert_eq!(client.timezone(), "America/Sao_Paulo");
    }

    #[test]
    fn test_new_rejects_unknown_version() {
        let (_dir, mut config) = fixture();
        config.version = "1.00".to_string();
        let err = NfseClient::new(config, Certificate::default()).err().unwrap();
        assert!(matches!(err, NfseError::Config(_)));
    }

    #[test]
    fn test_new_rejects_unknown_state() {
        let (_dir, mut config) = fixture();
        config.jurisdiction = "ZZ".to_string();
        let err = NfseClient::new(config, Certificate::default()).err().unwrap();
        assert!(err.to_string().contains("ZZ"));
    }

    #[test]
    fn test_environment_flag_from_config() {
        let (_dir, mut config) = fixture();
        config.environment = Some(1);
        let client = NfseClient::new(config, Certificate::default()).unwrap();
        assert_eq!(client.environment(), Environment::Production);
    }

    #[test]
    fn test_invalid_environment_flag_is_ignored() {
        let (_dir, mut config) = fixture();
        config.environment = Some(7);
        let mut client = NfseClient::new(config, Certificate::default()).unwrap();
        assert_eq!(client.environment(), Environment::Staging);

        assert!(client.set_environment_flag(1));
        assert!(!client.set_environment_flag(0));
        assert_eq!(client.environment(), Environment::Production);
    }

    #[test]
    fn test_set_version_unsupported_keeps_state() {
        let (_dir, config) = fixture();
        let mut client = NfseClient::new(config, Certificate::default()).unwrap();
        let catalog_before = client.catalog_path();
        let schema_before = client.schema_dir();

        let err = client.set_version("9.99").unwrap_err();
        assert!(matches!(err, NfseError::Config(_)));
        assert_eq!(client.version(), ProtocolVersion::V2_03);
        assert_eq!(client.catalog_path(), catalog_before);
        assert_eq!(client.schema_dir(), schema_before);

        assert_eq!(client.set_version("2.03").unwrap(), ProtocolVersion::V2_03);
    }

    #[test]
    fn test_dispatch_context() {
        let descriptor = ServiceDescriptor {
            version: "2.03".to_string(),
            url: "https://x".to_string(),
            method: "GerarNfse".to_string(),
            operation: "GerarNfse".to_string(),
        };
        let context = DispatchContext::for_service(&descriptor, ProtocolVersion::V2_03);
        assert_eq!(context.action, "\"http://nfse.abrasf.org.br/GerarNfse\"");
        assert_eq!(context.namespace, "http://nfse.abrasf.org.br");
        assert_eq!(context.soap_header.version_digit, "2");
        assert!(context.header_xml.contains("versao=\"2\""));
    }

    #[test]
    fn test_dispatch_records_audit() {
        let (_dir, config) = fixture();
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let mut client = NfseClient::new(config, Certificate::default())
            .unwrap()
            .with_transport(transport);

        let result = client
            .dispatch("ConsultarNfseServicoTomado", "<Consulta/>")
            .unwrap();

        assert_eq!(result.cleaned, "<Resposta>ok</Resposta>");
        assert_eq!(result.descriptor.url, "https://homologacao.example.org/nfse");
        assert!(result.validation_issues.is_empty());
        assert_eq!(client.last_request(), result.request);
        assert_eq!(client.last_response(), result.raw_response);

        let sent = sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].binding, SoapBinding::Soap12);
        assert!(sent[0].body.contains("<![CDATA[<Consulta/>]]>"));
    }

    #[test]
    fn test_resolver_failure_sends_nothing() {
        let (_dir, config) = fixture();
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let mut client = NfseClient::new(config, Certificate::default())
            .unwrap()
            .with_transport(transport);

        let err = client.dispatch("GerarNfse", "<x/>").unwrap_err();
        assert!(matches!(err, NfseError::ServiceUnavailable { .. }));
        let err = client
            .call("GerarNfse", "0000000", Environment::Staging, "<x/>", &[])
            .unwrap_err();
        assert!(matches!(err, NfseError::CatalogNotFound { .. }));

        assert!(sent.borrow().is_empty());
        assert_eq!(client.last_request(), "");
    }

    #[test]
    fn test_default_transport_is_created_lazily() {
        let (_dir, config) = fixture();
        let garbage = Certificate::from_pem(b"garbage".to_vec(), b"garbage".to_vec());
        let mut client = NfseClient::new(config, garbage).unwrap();

        // Resolution fails first: no transport is built.
        let err = client.dispatch("GerarNfse", "<x/>").unwrap_err();
        assert!(matches!(err, NfseError::ServiceUnavailable { .. }));

        // A resolvable call builds the transport, which rejects the certificate.
        let err = client
            .dispatch("ConsultarNfseServicoTomado", "<x/>")
            .unwrap_err();
        assert!(matches!(
            err,
            NfseError::Transport(TransportError::Certificate(_))
        ));
    }

    #[test]
    fn test_version_switch_reloads_catalog() {
        let (_dir, config) = fixture();
        let mut client = NfseClient::new(config, Certificate::default()).unwrap();
        assert!(client
            .resolve_service("ConsultarNfseServicoTomado", "3538709", Environment::Production)
            .is_ok());
        assert!(client.catalog.is_some());

        client.set_version("2.03").unwrap();
        assert!(client.catalog.is_some());

        client.reload_catalog();
        assert!(client.catalog.is_none());
    }
}
