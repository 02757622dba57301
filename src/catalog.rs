//! Per-municipality service catalog.
//!
//! One XML document per layout version lists, for every municipality code
//! and environment, the URL and SOAP names of each operation:
//!
//! ```xml
//! <WS>
//!   <UF>
//!     <sigla>3538709</sigla>
//!     <homologacao>
//!       <GerarNfse method="GerarNfse" operation="GerarNfse" version="2.03">https://...</GerarNfse>
//!     </homologacao>
//!   </UF>
//! </WS>
//! ```

use crate::config::{Environment, ProtocolVersion};
use crate::error::NfseError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Endpoint and SOAP names for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub version: String,
    pub url: String,
    pub method: String,
    pub operation: String,
}

impl ServiceDescriptor {
    fn is_complete(&self) -> bool {
        !(self.version.is_empty()
            || self.url.is_empty()
            || self.method.is_empty()
            || self.operation.is_empty())
    }
}

type ServiceTable = HashMap<String, ServiceDescriptor>;

/// Parsed catalog document.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    municipalities: HashMap<String, HashMap<Environment, ServiceTable>>,
}

/// Location of the catalog for a layout version.
pub fn catalog_path(storage_dir: &Path, version: ProtocolVersion) -> PathBuf {
    storage_dir.join(format!("wsnfe_{}_mod.xml", version.as_str()))
}

impl Catalog {
    /// Load a catalog file. A missing file yields an empty catalog.
    pub fn load(path: &Path) -> Result<Self, NfseError> {
        if !path.is_file() {
            debug!(path = %path.display(), "Catalog file not found, using empty catalog");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a catalog document.
    pub fn parse(xml: &str) -> Result<Self, NfseError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut catalog = Catalog::default();
        let mut path: Vec<String> = Vec::new();

        let mut sigla: Option<String> = None;
        let mut environments: HashMap<Environment, ServiceTable> = HashMap::new();
        let mut current_env: Option<Environment> = None;
        let mut current_service: Option<(String, ServiceDescriptor)> = None;
        let mut text = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let name = local_name(e);
                    path.push(name.clone());
                    text.clear();
                    match path.len() {
                        2 => {
                            sigla = None;
                            environments.clear();
                        }
                        3 => {
                            current_env = environment_block(&name);
                            if let Some(env) = current_env {
                                environments.entry(env).or_default();
                            }
                        }
                        4 if current_env.is_some() => {
                            current_service = Some((name, descriptor_from_attributes(e)?));
                        }
                        _ => {}
                    }
                }

                Ok(Event::Empty(ref e)) => {
                    let name = local_name(e);
                    match path.len() + 1 {
                        3 => {
                            if let Some(env) = environment_block(&name) {
                                environments.entry(env).or_default();
                            }
                        }
                        4 => {
                            if let Some(env) = current_env {
                                let service = descriptor_from_attributes(e)?;
                                environments.entry(env).or_default().insert(name, service);
                            }
                        }
                        _ => {}
                    }
                }

                Ok(Event::Text(ref e)) => {
                    let value = e.unescape().map_err(|e| NfseError::Xml(e.to_string()))?;
                    text.push_str(&value);
                }

                Ok(Event::CData(e)) => {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }

                Ok(Event::End(_)) => {
                    match path.len() {
                        2 => {
                            if let Some(code) = sigla.take() {
                                let entry = catalog.municipalities.entry(code).or_default();
                                for (env, services) in environments.drain() {
                                    entry.entry(env).or_default().extend(services);
                                }
                            }
                            environments.clear();
                        }
                        3 => {
                            if path.last().map(String::as_str) == Some("sigla") {
                                sigla = Some(text.trim().to_string());
                            }
                            current_env = None;
                        }
                        4 => {
                            if let (Some(env), Some((name, mut service))) =
                                (current_env, current_service.take())
                            {
                                service.url = text.trim().to_string();
                                environments.entry(env).or_default().insert(name, service);
                            }
                        }
                        _ => {}
                    }
                    path.pop();
                    text.clear();
                }

                Ok(Event::Eof) => break,

                Err(e) => {
                    return Err(NfseError::Xml(format!(
                        "Catalog parse error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }

                _ => {}
            }
        }

        Ok(catalog)
    }

    /// Look up an operation for a municipality and environment.
    pub fn resolve(
        &self,
        service: &str,
        municipality: &str,
        environment: Environment,
    ) -> Result<ServiceDescriptor, NfseError> {
        let services = self
            .municipalities
            .get(municipality)
            .and_then(|envs| envs.get(&environment))
            .ok_or_else(|| NfseError::CatalogNotFound {
                municipality: municipality.to_string(),
                environment: environment.to_string(),
            })?;

        services
            .get(service)
            .filter(|descriptor| descriptor.is_complete())
            .cloned()
            .ok_or_else(|| NfseError::ServiceUnavailable {
                service: service.to_string(),
                municipality: municipality.to_string(),
            })
    }

    /// Number of municipalities in the catalog.
    pub fn len(&self) -> usize {
        self.municipalities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.municipalities.is_empty()
    }
}

fn environment_block(name: &str) -> Option<Environment> {
    match name {
        "producao" => Some(Environment::Production),
        "homologacao" => Some(Environment::Staging),
        _ => None,
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn descriptor_from_attributes(e: &BytesStart) -> Result<ServiceDescriptor, NfseError> {
    let mut descriptor = ServiceDescriptor {
        version: String::new(),
        url: String::new(),
        method: String::new(),
        operation: String::new(),
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| NfseError::Xml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| NfseError::Xml(e.to_string()))?
            .trim()
            .to_string();
        match attr.key.local_name().as_ref() {
            b"version" => descriptor.version = value,
            b"method" => descriptor.method = value,
            b"operation" => descriptor.operation = value,
            b"url" => descriptor.url = value,
            _ => {}
        }
    }
    Ok(descriptor)
}
