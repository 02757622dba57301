//! Request envelope assembly.
//!
//! Two layers are produced here: the operation envelope that carries the
//! header and data payloads as CDATA, and the outer SOAP envelope the
//! transport puts on the wire.

use crate::header::SoapHeader;

/// Portal namespace used for SOAP actions and the request element.
pub const PORTAL_NAMESPACE: &str = "http://nfse.abrasf.org.br";

pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// SOAP protocol binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapBinding {
    Soap11,
    Soap12,
}

impl SoapBinding {
    /// Prefix used for the outer envelope elements.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Soap11 => "soap",
            Self::Soap12 => "soap12",
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }
}

/// Namespace declarations placed on the outer envelope.
pub fn envelope_namespaces(binding: SoapBinding) -> Vec<(String, String)> {
    vec![
        ("xmlns:xsi".to_string(), XSI_NS.to_string()),
        ("xmlns:xsd".to_string(), XSD_NS.to_string()),
        (format!("xmlns:{}", binding.prefix()), binding.namespace().to_string()),
        ("xmlns:nfse".to_string(), PORTAL_NAMESPACE.to_string()),
    ]
}

/// Quoted SOAP action for a method, e.g. `"http://nfse.abrasf.org.br/GerarNfse"`.
pub fn soap_action(method: &str) -> String {
    format!("\"{}/{}\"", PORTAL_NAMESPACE, method)
}

/// Wrap the header and request body into the operation envelope.
///
/// Neither payload is validated or escaped: both are copied byte for byte
/// into their CDATA sections.
pub fn build_envelope(operation: &str, request_body: &str, header_xml: &str) -> String {
    let mut xml = String::with_capacity(request_body.len() + header_xml.len() + 160);
    xml.push_str("<nfse:");
    xml.push_str(operation);
    xml.push_str("Request xmlns:tns=\"");
    xml.push_str(PORTAL_NAMESPACE);
    xml.push_str("\">");
    xml.push_str("<nfseCabecMsg><![CDATA[");
    xml.push_str(header_xml);
    xml.push_str("]]></nfseCabecMsg>");
    xml.push_str("<nfseDadosMsg><![CDATA[");
    xml.push_str(request_body);
    xml.push_str("]]></nfseDadosMsg>");
    xml.push_str("</nfse:");
    xml.push_str(operation);
    xml.push_str("Request>");
    xml
}

/// Render the outer SOAP envelope sent over HTTP.
pub fn render_soap_envelope(
    binding: SoapBinding,
    namespaces: &[(String, String)],
    header: Option<&SoapHeader>,
    body: &str,
) -> String {
    let prefix = binding.prefix();
    let attributes = namespaces
        .iter()
        .map(|(name, uri)| format!("{}=\"{}\"", name, uri))
        .collect::<Vec<_>>()
        .join(" ");

    let mut xml = format!("<{}:Envelope {}>", prefix, attributes);
    if let Some(header) = header {
        xml.push_str(&format!("<{p}:Header>{}</{p}:Header>", header.xml, p = prefix));
    }
    xml.push_str(&format!("<{p}:Body>{}</{p}:Body></{p}:Envelope>", body, p = prefix));
    xml
}
