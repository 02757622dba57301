//! SOAP response normalization.
//!
//! Servers in the SimplISS family answer with different envelope prefixes
//! and sprinkle `ns2:`..`ns5:` prefixes over the payload. [`clean`] strips
//! both so downstream parsing sees a plain ABRASF fragment.

use crate::config::BodyExtraction;
use crate::envelope::{SOAP_11_NS, SOAP_12_NS};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Reader};
use serde::Serialize;

/// Known body wrappers, in priority order: detection marker, opening tag, closing tag.
const BODY_WRAPPERS: [(&str, &str, &str); 6] = [
    ("<soap:Body>", "<soap:Body>", "</soap:Body>"),
    ("<soapenv:Body>", "<soapenv:Body>", "</soapenv:Body>"),
    ("<soap12:Body>", "<soap12:Body>", "</soap12:Body>"),
    ("<env:Body>", "<env:Body>", "</env:Body>"),
    (
        "<env:Body",
        "<env:Body xmlns:env='http://www.w3.org/2003/05/soap-envelope'>",
        "</env:Body>",
    ),
    ("<S:Body>", "<S:Body>", "</S:Body>"),
];

/// Vendor prefixes removed from the payload, in application order.
const VENDOR_PREFIXES: [&str; 4] = ["ns3:", "ns2:", "ns4:", "ns5:"];

/// Normalize a raw SOAP response with the default strategy.
pub fn clean(raw: &str) -> String {
    clean_with(raw, BodyExtraction::default())
}

/// Normalize a raw SOAP response.
///
/// The body is unwrapped first; vendor prefixes are then stripped from the
/// unwrapped fragment only. Unrecognized framing passes through unchanged.
pub fn clean_with(raw: &str, mode: BodyExtraction) -> String {
    let inner = match mode {
        BodyExtraction::NamespaceAware => extract_body(raw).or_else(|| extract_body_literal(raw)),
        BodyExtraction::Literal => extract_body_literal(raw),
    };
    strip_vendor_prefixes(inner.unwrap_or(raw))
}

/// Content of the first `Body` element bound to a SOAP envelope namespace,
/// whatever its prefix. `None` when there is no such element or the input
/// is not well-formed up to the end of the body.
pub fn extract_body(raw: &str) -> Option<&str> {
    let mut reader = NsReader::from_str(raw);
    let mut depth = 0usize;
    let mut body: Option<(usize, usize)> = None;

    loop {
        let (ns, event) = reader.read_resolved_event().ok()?;
        let is_body = match &event {
            Event::Start(e) | Event::Empty(e) => {
                body.is_none() && is_soap_body(&ns, e.local_name().as_ref())
            }
            _ => false,
        };

        match event {
            Event::Start(_) => {
                depth += 1;
                if is_body {
                    body = Some((depth, reader.buffer_position() as usize));
                }
            }
            Event::Empty(_) if is_body => return Some(""),
            Event::End(_) => {
                if let Some((body_depth, start)) = body {
                    if body_depth == depth {
                        let after_close = reader.buffer_position() as usize;
                        let close = raw.get(..after_close)?.rfind("</")?;
                        return raw.get(start..close);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn is_soap_body(ns: &ResolveResult, local_name: &[u8]) -> bool {
    local_name == b"Body"
        && matches!(
            ns,
            ResolveResult::Bound(Namespace(uri))
                if *uri == SOAP_11_NS.as_bytes() || *uri == SOAP_12_NS.as_bytes()
        )
}

/// Content of the first known literal body wrapper.
///
/// Only the first wrapper whose marker appears is tried. A missing closing
/// tag keeps everything after the opening tag instead of yielding an empty
/// body, so a truncated response can still be inspected.
pub fn extract_body_literal(raw: &str) -> Option<&str> {
    let (_, open, close) = BODY_WRAPPERS
        .iter()
        .find(|(marker, _, _)| raw.contains(marker))?;
    let start = raw.find(open)? + open.len();
    let rest = &raw[start..];
    let end = rest.find(close).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Remove `ns2:`..`ns5:` by plain text substitution.
///
/// This also rewrites text content and attribute values containing those
/// substrings; existing consumers rely on that.
pub fn strip_vendor_prefixes(xml: &str) -> String {
    VENDOR_PREFIXES
        .iter()
        .fold(xml.to_string(), |acc, prefix| {
            if acc.contains(prefix) {
                acc.replace(prefix, "")
            } else {
                acc
            }
        })
}

/// A SOAP Fault found in a normalized response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoapFault {
    /// `faultcode` (SOAP 1.1) or `Code/Value` (SOAP 1.2)
    pub code: String,
    /// `faultstring` (SOAP 1.1) or `Reason/Text` (SOAP 1.2)
    pub reason: String,
}

/// Detect a SOAP Fault in a normalized response.
pub fn parse_fault(xml: &str) -> Option<SoapFault> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut in_fault = false;
    let mut code: Option<String> = None;
    let mut reason: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"Fault" {
                    in_fault = true;
                }
                stack.push(name);
            }
            Ok(Event::End(_)) => {
                if stack.pop().as_deref() == Some(b"Fault".as_slice()) {
                    break;
                }
            }
            Ok(Event::Text(t)) if in_fault => {
                let Ok(text) = t.unescape() else { continue };
                let text = text.trim().to_string();
                match stack.last().map(Vec::as_slice) {
                    Some(b"faultcode") | Some(b"Value") if code.is_none() => code = Some(text),
                    Some(b"faultstring") | Some(b"Text") if reason.is_none() => {
                        reason = Some(text)
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    in_fault.then(|| SoapFault {
        code: code.unwrap_or_default(),
        reason: reason.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INNER: &str = "<ConsultarNfseServicoTomadoResposta><Pagina>1</Pagina></ConsultarNfseServicoTomadoResposta>";

    fn wrapped_variants() -> Vec<String> {
        vec![
            format!(
                "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>{}</soap:Body></soap:Envelope>",
                INNER
            ),
            format!(
                "<soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\"><soapenv:Header/><soapenv:Body>{}</soapenv:Body></soapenv:Envelope>",
                INNER
            ),
            format!(
                "<soap12:Envelope xmlns:soap12=\"http://www.w3.org/2003/05/soap-envelope\"><soap12:Body>{}</soap12:Body></soap12:Envelope>",
                INNER
            ),
            format!(
                "<env:Envelope xmlns:env=\"http://www.w3.org/2003/05/soap-envelope\"><env:Body>{}</env:Body></env:Envelope>",
                INNER
            ),
            format!(
                "<env:Envelope xmlns:env='http://www.w3.org/2003/05/soap-envelope'><env:Header/><env:Body xmlns:env='http://www.w3.org/2003/05/soap-envelope'>{}</env:Body></env:Envelope>",
                INNER
            ),
            format!(
                "<?xml version='1.0' encoding='UTF-8'?><S:Envelope xmlns:S=\"http://schemas.xmlsoap.org/soap/envelope/\"><S:Body>{}</S:Body></S:Envelope>",
                INNER
            ),
        ]
    }

    #[test]
    fn test_every_wrapper_variant_namespace_aware() {
        for raw in wrapped_variants() {
            assert_eq!(clean_with(&raw, BodyExtraction::NamespaceAware), INNER, "{}", raw);
        }
    }

    #[test]
    fn test_every_wrapper_variant_literal() {
        for raw in wrapped_variants() {
            assert_eq!(clean_with(&raw, BodyExtraction::Literal), INNER, "{}", raw);
        }
    }

    #[test]
    fn test_unrecognized_framing_passes_through() {
        let raw = "<Resposta><Codigo>E1</Codigo></Resposta>";
        assert_eq!(clean(raw), raw);
        assert_eq!(clean_with(raw, BodyExtraction::Literal), raw);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let raw = &wrapped_variants()[0];
        let once = clean(raw);
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn test_not_xml_passes_through() {
        let raw = "Service Unavailable";
        assert_eq!(clean(raw), raw);
    }

    #[test]
    fn test_prefix_stripping() {
        let raw = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>\
                   <ns3:Foo><ns2:Bar>1</ns2:Bar><ns4:Baz/><ns5:Qux>2</ns5:Qux></ns3:Foo>\
                   </soap:Body></soap:Envelope>";
        let cleaned = clean(raw);
        assert_eq!(cleaned, "<Foo><Bar>1</Bar><Baz/><Qux>2</Qux></Foo>");
        for prefix in VENDOR_PREFIXES {
            assert!(!cleaned.contains(prefix));
        }
    }

    #[test]
    fn test_prefix_stripping_touches_text_content() {
        assert_eq!(
            strip_vendor_prefixes("<Msg>see ns2:Code</Msg>"),
            "<Msg>see Code</Msg>"
        );
    }

    #[test]
    fn test_prefix_stripping_never_touches_outside_body() {
        let raw = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\" xmlns:ns2=\"urn:x\">\
                   <soap:Body><ns2:A/></soap:Body></soap:Envelope>";
        assert_eq!(clean(raw), "<A/>");
    }

    #[test]
    fn test_namespace_aware_handles_unlisted_prefix() {
        let raw = "<e:Envelope xmlns:e=\"http://www.w3.org/2003/05/soap-envelope\"><e:Body><X/></e:Body></e:Envelope>";
        assert_eq!(clean(raw), "<X/>");
        assert_eq!(clean_with(raw, BodyExtraction::Literal), raw);
    }

    #[test]
    fn test_namespace_aware_ignores_foreign_body() {
        let raw = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
                   <soap:Header><x:Body xmlns:x=\"urn:other\">no</x:Body></soap:Header>\
                   <soap:Body><Yes/></soap:Body></soap:Envelope>";
        assert_eq!(extract_body(raw), Some("<Yes/>"));
    }

    #[test]
    fn test_empty_body() {
        let raw = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body/></soap:Envelope>";
        assert_eq!(clean(raw), "");
    }

    #[test]
    fn test_nested_body_named_elements() {
        let raw = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>\
                   <R><Body>x</Body></R></soap:Body></soap:Envelope>";
        assert_eq!(extract_body(raw), Some("<R><Body>x</Body></R>"));
    }

    #[test]
    fn test_cdata_preserved() {
        let raw = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>\
                   <outputXML><![CDATA[<a>1</a>]]></outputXML></soap:Body></soap:Envelope>";
        assert_eq!(clean(raw), "<outputXML><![CDATA[<a>1</a>]]></outputXML>");
    }

    #[test]
    fn test_literal_first_match_only() {
        // soap: wins even though S: also appears.
        let raw = "<soap:Body><S:Body>in</S:Body></soap:Body>";
        assert_eq!(extract_body_literal(raw), Some("<S:Body>in</S:Body>"));
    }

    #[test]
    fn test_literal_missing_close_keeps_rest() {
        assert_eq!(extract_body_literal("<soap:Body><a/>"), Some("<a/>"));
    }

    #[test]
    fn test_literal_env_declaration_form_mismatch_passes_through() {
        let raw = "<env:Body xmlns:env=\"urn:other\"><a/></env:Body>";
        assert_eq!(extract_body_literal(raw), None);
    }

    #[test]
    fn test_parse_soap11_fault() {
        let raw = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>\
                   <soap:Fault><faultcode>soap:Client</faultcode><faultstring>Bad request</faultstring></soap:Fault>\
                   </soap:Body></soap:Envelope>";
        let fault = parse_fault(&clean(raw)).unwrap();
        assert_eq!(fault.code, "soap:Client");
        assert_eq!(fault.reason, "Bad request");
    }

    #[test]
    fn test_parse_soap12_fault() {
        let raw = "<s:Envelope xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\"><s:Body>\
                   <s:Fault><s:Code><s:Value>s:Receiver</s:Value><s:Subcode><s:Value>a:Internal</s:Value></s:Subcode></s:Code>\
                   <s:Reason><s:Text xml:lang=\"pt-BR\">Erro interno</s:Text></s:Reason></s:Fault>\
                   </s:Body></s:Envelope>";
        let fault = parse_fault(&clean(raw)).unwrap();
        assert_eq!(fault.code, "s:Receiver");
        assert_eq!(fault.reason, "Erro interno");
    }

    #[test]
    fn test_no_fault() {
        assert_eq!(parse_fault(INNER), None);
    }
}
