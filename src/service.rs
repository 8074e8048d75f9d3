// src/service.rs

//! Build service source service directives
//!
//! A source service is a named step the build service runs on the package
//! sources. Images only emit these directives into their `_service` file;
//! they are interpreted by the build service, never by this crate.

use crate::error::{Error, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::fmt;

/// When a source service runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceMode {
    #[default]
    Buildtime,
}

impl ServiceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceMode::Buildtime => "buildtime",
        }
    }
}

/// An arbitrary source service with its ordered parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Service {
    pub name: String,
    pub mode: ServiceMode,
    pub params: Vec<(String, String)>,
}

fn xml_error(e: impl fmt::Display) -> Error {
    Error::ParseError(format!("Failed to write service XML: {}", e))
}

impl Service {
    pub fn new(name: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            mode: ServiceMode::Buildtime,
            params,
        }
    }

    /// Value of the first parameter called `name`
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let start = BytesStart::new("service")
            .with_attributes([("name", self.name.as_str()), ("mode", self.mode.as_str())]);
        writer
            .write_event(Event::Start(start))
            .map_err(xml_error)?;

        for (name, value) in &self.params {
            let param = BytesStart::new("param").with_attributes([("name", name.as_str())]);
            writer.write_event(Event::Start(param)).map_err(xml_error)?;
            writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::End(BytesEnd::new("param")))
                .map_err(xml_error)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("service")))
            .map_err(xml_error)?;
        Ok(())
    }

    /// Render this service as an indented `<service>` element
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(xml_error)
    }
}

/// The contents of an image's `_service` file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceManifest {
    pub services: Vec<Service>,
}

impl ServiceManifest {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Render the `<services>` document
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Start(BytesStart::new("services")))
            .map_err(xml_error)?;
        for service in &self.services {
            service.write_to(&mut writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("services")))
            .map_err(xml_error)?;

        let mut xml = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
        xml.push('\n');
        Ok(xml)
    }
}
