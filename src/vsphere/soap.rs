//! vim25 SOAP calls
//!
//! The Automation REST API has no VM search by BIOS UUID and no access to
//! `config.flags`, so those two lookups go through the `/sdk` endpoint.
//! Managed object ids are shared between both APIs.

use crate::cluster::Credentials;
use crate::error::{Error, Result};
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::Client;
use tracing::debug;

/// SOAPAction of every request
pub const SOAP_ACTION: &str = "urn:vim25/7.0";

/// Name of the session cookie set by `Login`
pub const SESSION_COOKIE: &str = "vmware_soap_session";

const SESSION_MANAGER: &str = "SessionManager";
const SEARCH_INDEX: &str = "SearchIndex";
const PROPERTY_COLLECTOR: &str = "propertyCollector";

/// Path of the disk UUID flag on a VirtualMachine
pub const DISK_UUID_PROPERTY: &str = "config.flags.diskUuidEnabled";

/// Logged-in vim25 session
pub struct SoapSession {
    client: Client,
    url: String,
    cookie: String,
}

impl SoapSession {
    pub async fn login(client: Client, base_url: &str, credentials: &Credentials) -> Result<Self> {
        let url = format!("{}/sdk", base_url);
        let body = format!(
            "<Login xmlns=\"urn:vim25\">{}<userName>{}</userName><password>{}</password></Login>",
            this(SESSION_MANAGER, SESSION_MANAGER),
            escape(&credentials.username),
            escape(&credentials.password),
        );
        let response = client
            .post(&url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope(&body))
            .send()
            .await?;

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(session_cookie);
        let status = response.status();
        let text = response.text().await?;
        check_fault("soap login", status, &text)?;
        let cookie = cookie.ok_or_else(|| Error::Transport {
            operation: "soap login".into(),
            reason: format!("no {} cookie in response", SESSION_COOKIE),
        })?;

        debug!("Logged in to {}", url);
        Ok(Self { client, url, cookie })
    }

    pub async fn logout(&self) -> Result<()> {
        let body = format!(
            "<Logout xmlns=\"urn:vim25\">{}</Logout>",
            this(SESSION_MANAGER, SESSION_MANAGER)
        );
        self.invoke("soap logout", &body).await?;
        Ok(())
    }

    /// `SearchIndex.FindByUuid` restricted to VMs of one datacenter
    pub async fn find_vm_by_uuid(&self, datacenter: &str, uuid: &str) -> Result<Option<String>> {
        let body = format!(
            "<FindByUuid xmlns=\"urn:vim25\">{}<datacenter type=\"Datacenter\">{}</datacenter>\
             <uuid>{}</uuid><vmSearch>true</vmSearch></FindByUuid>",
            this(SEARCH_INDEX, SEARCH_INDEX),
            escape(datacenter),
            escape(uuid),
        );
        let response = self.invoke("find vm by uuid", &body).await?;
        Ok(element_text(&response, "returnval")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }

    /// `config.flags.diskUuidEnabled` of a VM; `None` when unset
    pub async fn disk_uuid_enabled(&self, vm: &str) -> Result<Option<bool>> {
        let body = format!(
            "<RetrievePropertiesEx xmlns=\"urn:vim25\">{}<specSet>\
             <propSet><type>VirtualMachine</type><pathSet>{}</pathSet></propSet>\
             <objectSet><obj type=\"VirtualMachine\">{}</obj></objectSet>\
             </specSet><options/></RetrievePropertiesEx>",
            this("PropertyCollector", PROPERTY_COLLECTOR),
            DISK_UUID_PROPERTY,
            escape(vm),
        );
        let response = self.invoke("retrieve vm flags", &body).await?;
        parse_flag(&response, DISK_UUID_PROPERTY)
    }

    async fn invoke(&self, operation: &str, body: &str) -> Result<String> {
        debug!("vCenter SOAP {}", operation);
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, self.cookie))
            .body(envelope(body))
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        check_fault(operation, status, &text)?;
        Ok(text)
    }
}

// =============================================================================
// XML Helpers
// =============================================================================

fn envelope(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
         <soapenv:Body>{}</soapenv:Body></soapenv:Envelope>",
        body
    )
}

fn this(kind: &str, value: &str) -> String {
    format!("<_this type=\"{}\">{}</_this>", kind, value)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Text of the first `<tag>` element, ignoring any namespace prefix
fn element_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let mut rest = xml;
    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let end = rest.find('>')?;
        let head = &rest[..end];
        let name = head.split_whitespace().next().unwrap_or_default();
        let local = name.rsplit(':').next().unwrap_or_default();
        if local == tag && !head.starts_with('/') {
            if head.ends_with('/') {
                return Some("");
            }
            let content = &rest[end + 1..];
            let close = content.find(&format!("</{}>", name))?;
            return Some(&content[..close]);
        }
        rest = &rest[end + 1..];
    }
    None
}

fn session_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .next()
        .and_then(|pair| pair.trim().strip_prefix(SESSION_COOKIE))
        .and_then(|rest| rest.strip_prefix('='))
        .map(|value| value.trim_matches('"').to_string())
}

fn check_fault(operation: &str, status: reqwest::StatusCode, body: &str) -> Result<()> {
    if let Some(fault) = element_text(body, "faultstring") {
        return Err(Error::Transport {
            operation: operation.to_string(),
            reason: unescape(fault.trim()),
        });
    }
    if !status.is_success() {
        return Err(Error::Transport {
            operation: operation.to_string(),
            reason: format!("HTTP {}", status),
        });
    }
    Ok(())
}

fn parse_flag(response: &str, property: &str) -> Result<Option<bool>> {
    for chunk in response.split("<propSet>").skip(1) {
        let prop = chunk.split("</propSet>").next().unwrap_or_default();
        if element_text(prop, "name").map(str::trim) != Some(property) {
            continue;
        }
        return match element_text(prop, "val").map(str::trim) {
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(Error::Transport {
                operation: "retrieve vm flags".into(),
                reason: format!("unexpected {} value {:?}", property, other),
            }),
            None => Ok(None),
        };
    }
    Ok(None)
}
