//! Axis VAPIX transport
//! SOAP 1.2 envelope for the `/vapix/services` web service endpoint

use log::debug;

use crate::device::Device;
use crate::error::{ Result, VapixError };
use crate::transport::{ RequestDescriptor, ResponseBody, ResponseKind, Transport };

/// Web service endpoint on the device
pub const SOAP_PATH: &str = "/vapix/services";

/// Shortest fragment accepted, anything smaller cannot be a SOAP operation
pub const MIN_FRAGMENT_LEN: usize = 10;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

const ENVELOPE_OPEN: &str = concat!(
    r#"<SOAP-ENV:Envelope "#,
    r#"xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" "#,
    r#"xmlns:xs="http://www.w3.org/2001/XMLSchema" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
    r#"xmlns:tt="http://www.onvif.org/ver10/schema" "#,
    r#"xmlns:onvif="http://www.onvif.org/ver10/schema" "#,
    r#"xmlns:tds="http://www.onvif.org/ver10/device/wsdl" "#,
    r#"xmlns:tev="http://www.onvif.org/ver10/event/wsdl" "#,
    r#"xmlns:tns1="http://www.onvif.org/ver10/topics" "#,
    r#"xmlns:acertificates="http://www.axis.com/vapix/ws/certificates" "#,
    r#"xmlns:acert="http://www.axis.com/vapix/ws/cert" "#,
    r#"xmlns:aev="http://www.axis.com/vapix/ws/event1" "#,
    r#"xmlns:aweb="http://www.axis.com/vapix/ws/webserver" "#,
    r#"xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope">"#,
    "\n"
);

/// Wrap an operation fragment in the envelope and body elements
pub fn wrap(fragment: &str) -> String {
    format!("{}<SOAP-ENV:Body>{}</SOAP-ENV:Body>\n</SOAP-ENV:Envelope>\n", ENVELOPE_OPEN, fragment)
}

/// Inner content of the envelope's `Body` element.
///
/// Namespace prefixes vary between firmware versions, so elements are
/// matched on their local name.
pub fn unwrap(xml: &str) -> Result<String> {
    let missing = |what: &str| {
        VapixError::parse_error(format!("SOAP parse error: no {} element", what)).with_body(
            ResponseBody::Text(xml.to_string())
        )
    };

    let envelope = find_start_tag(xml, "Envelope", 0).ok_or_else(|| missing("Envelope"))?;
    let body = find_start_tag(xml, "Body", envelope.end).ok_or_else(|| missing("Body"))?;
    if body.self_closing {
        return Ok(String::new());
    }

    let closing = format!("</{}>", body.name);
    let end = xml
        .rfind(&closing)
        .filter(|&i| i >= body.end)
        .ok_or_else(|| missing("closing Body"))?;

    Ok(xml[body.end..end].trim().to_string())
}

/// Reason text of a SOAP fault, if `inner` is one
fn fault_reason(inner: &str) -> Option<String> {
    let fault = find_start_tag(inner, "Fault", 0).filter(|tag| tag.start == 0)?;
    let reason = element_text(&inner[fault.end..], "Text")
        .or_else(|| element_text(&inner[fault.end..], "faultstring"))
        .unwrap_or("SOAP fault");
    Some(reason.trim().to_string())
}

#[derive(Debug)]
struct StartTag<'a> {
    start: usize,
    /// Offset just past the closing `>`
    end: usize,
    /// Qualified name including any prefix
    name: &'a str,
    self_closing: bool,
}

fn find_start_tag<'a>(xml: &'a str, local: &str, from: usize) -> Option<StartTag<'a>> {
    let mut pos = from;
    while let Some(offset) = xml.get(pos..)?.find('<') {
        let start = pos + offset;
        let rest = &xml[start + 1..];
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        let local_name = name.rsplit(':').next().unwrap_or(name);

        if !name.is_empty() && !name.starts_with(|c: char| matches!(c, '?' | '!')) && local_name == local {
            let close = start + xml[start..].find('>')?;
            return Some(StartTag {
                start,
                end: close + 1,
                name,
                self_closing: xml[..close].ends_with('/'),
            });
        }
        pos = start + 1;
    }
    None
}

fn element_text<'a>(xml: &'a str, local: &str) -> Option<&'a str> {
    let tag = find_start_tag(xml, local, 0)?;
    if tag.self_closing {
        return Some("");
    }
    let closing = format!("</{}>", tag.name);
    let end = xml[tag.end..].find(&closing)? + tag.end;
    Some(&xml[tag.end..end])
}

impl Transport {
    /// POST `fragment` to the device's SOAP service and return the inner
    /// content of the response body element
    pub async fn soap(&self, device: &Device, fragment: &str) -> Result<ResponseBody> {
        if fragment.trim().len() < MIN_FRAGMENT_LEN {
            return Err(VapixError::invalid_input("Missing or too short SOAP body"));
        }

        let descriptor = RequestDescriptor::post(SOAP_PATH, wrap(fragment))
            .with_content_type(SOAP_CONTENT_TYPE)
            .decode_as(ResponseKind::Text);
        let reply = self.request(device, &descriptor).await?.into_text()?;
        let inner = unwrap(&reply)?;

        if let Some(reason) = fault_reason(&inner) {
            debug!("SOAP fault from {}: {}", device.address, reason);
            return Err(VapixError::application(reason).with_body(ResponseBody::Text(reply)));
        }
        Ok(ResponseBody::Text(inner))
    }
}
