//! The `cabecalho` header sent with every request.

/// Build the `cabecalho` fragment for a layout version digit.
///
/// The output is embedded verbatim inside a CDATA section, so it is fixed
/// text with no escaping applied.
pub fn build_header(version_digit: &str) -> String {
    format!(
        "<cabecalho versao=\"{v}\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\" \
         xmlns=\"http://www.abrasf.org.br/nfse.xsd\">\
         <versaoDados>{v}</versaoDados>\
         </cabecalho>",
        v = version_digit
    )
}

/// SOAP header object handed to the transport alongside the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapHeader {
    /// Namespace the header belongs to
    pub namespace: String,
    /// Header element name
    pub name: String,
    /// `versao` attribute value
    pub version_digit: String,
    /// Rendered header XML
    pub xml: String,
}

impl SoapHeader {
    /// Header object for the `cabecalho` element.
    pub fn cabecalho(namespace: impl Into<String>, version_digit: &str) -> Self {
        Self {
            namespace: namespace.into(),
            name: "cabecalho".to_string(),
            version_digit: version_digit.to_string(),
            xml: build_header(version_digit),
        }
    }
}
