//! Request documents.

use chrono::NaiveDate;
use quick_xml::escape::escape;

/// Default namespace declarations placed on request roots.
const ROOT_NAMESPACES: [&str; 3] = [
    "xmlns=\"http://www.abrasf.org.br/nfse.xsd\"",
    "xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"",
    "xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\"",
];

/// Taxpayer document number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpfCnpj {
    Cpf(String),
    Cnpj(String),
}

impl CpfCnpj {
    fn write(&self, xml: &mut String) {
        xml.push_str("<CpfCnpj>");
        match self {
            Self::Cpf(cpf) => push_element(xml, "Cpf", cpf),
            Self::Cnpj(cnpj) => push_element(xml, "Cnpj", cnpj),
        }
        xml.push_str("</CpfCnpj>");
    }
}

/// A party identified by document number and optional municipal registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identificacao {
    pub cpf_cnpj: CpfCnpj,
    pub inscricao_municipal: Option<String>,
}

impl Identificacao {
    pub fn cnpj(cnpj: impl Into<String>) -> Self {
        Self {
            cpf_cnpj: CpfCnpj::Cnpj(cnpj.into()),
            inscricao_municipal: None,
        }
    }

    pub fn cpf(cpf: impl Into<String>) -> Self {
        Self {
            cpf_cnpj: CpfCnpj::Cpf(cpf.into()),
            inscricao_municipal: None,
        }
    }

    pub fn with_inscricao_municipal(mut self, inscricao: impl Into<String>) -> Self {
        self.inscricao_municipal = Some(inscricao.into());
        self
    }

    fn write(&self, xml: &mut String, element: &str) {
        xml.push('<');
        xml.push_str(element);
        xml.push('>');
        self.cpf_cnpj.write(xml);
        if let Some(ref inscricao) = self.inscricao_municipal {
            push_element(xml, "InscricaoMunicipal", inscricao);
        }
        xml.push_str("</");
        xml.push_str(element);
        xml.push('>');
    }
}

/// Date range filter: by emission date or by competence date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Periodo {
    Emissao { inicial: NaiveDate, fim: NaiveDate },
    Competencia { inicial: NaiveDate, fim: NaiveDate },
}

impl Periodo {
    fn write(&self, xml: &mut String) {
        let (element, inicial, fim) = match self {
            Self::Emissao { inicial, fim } => ("PeriodoEmissao", inicial, fim),
            Self::Competencia { inicial, fim } => ("PeriodoCompetencia", inicial, fim),
        };
        xml.push('<');
        xml.push_str(element);
        xml.push('>');
        push_element(xml, "DataInicial", &inicial.format("%Y-%m-%d").to_string());
        push_element(xml, "DataFinal", &fim.format("%Y-%m-%d").to_string());
        xml.push_str("</");
        xml.push_str(element);
        xml.push('>');
    }
}

/// Query for invoices where the consulting party is the service taker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicoTomadoQuery {
    pub consulente: Identificacao,
    pub numero_nfse: Option<String>,
    pub periodo: Option<Periodo>,
    pub prestador: Option<Identificacao>,
    pub tomador: Option<Identificacao>,
    pub intermediario: Option<Identificacao>,
    /// Result page, starting at 1
    pub pagina: u32,
}

impl ServicoTomadoQuery {
    /// Operation the query is sent to.
    pub const OPERATION: &'static str = "ConsultarNfseServicoTomado";

    pub fn new(consulente: Identificacao) -> Self {
        Self {
            consulente,
            numero_nfse: None,
            periodo: None,
            prestador: None,
            tomador: None,
            intermediario: None,
            pagina: 1,
        }
    }

    /// Render the `ConsultarNfseServicoTomadoEnvio` document.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(512);
        xml.push_str("<ConsultarNfseServicoTomadoEnvio ");
        xml.push_str(&ROOT_NAMESPACES.join(" "));
        xml.push('>');

        self.consulente.write(&mut xml, "Consulente");
        if let Some(ref numero) = self.numero_nfse {
            push_element(&mut xml, "NumeroNfse", numero);
        }
        if let Some(ref periodo) = self.periodo {
            periodo.write(&mut xml);
        }
        if let Some(ref prestador) = self.prestador {
            prestador.write(&mut xml, "Prestador");
        }
        if let Some(ref tomador) = self.tomador {
            tomador.write(&mut xml, "Tomador");
        }
        if let Some(ref intermediario) = self.intermediario {
            intermediario.write(&mut xml, "Intermediario");
        }
        push_element(&mut xml, "Pagina", &self.pagina.max(1).to_string());

        xml.push_str("</ConsultarNfseServicoTomadoEnvio>");
        xml
    }
}

fn push_element(xml: &mut String, name: &str, value: &str) {
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape(value.trim()));
    xml.push_str("</");
    xml.push_str(name);
    xml.push('>');
}
